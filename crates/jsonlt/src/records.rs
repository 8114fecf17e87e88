//! Record and tombstone validation, key extraction, tombstone construction.
//!
//! Pure functions over a parsed object and a key specifier. Key-shape
//! problems are [`Error::InvalidKey`]; tombstone shape problems are
//! [`Error::Parse`].

use serde_json::Value;

use crate::error::{Error, Result};
use crate::json::{self, JsonObject};
use crate::keys::{self, Key, KeyElement, KeySpecifier};

/// Marker field distinguishing tombstones from records.
pub const TOMBSTONE_FIELD: &str = "$deleted";

/// Maximum canonical serialization of a record, in bytes.
pub const MAX_RECORD_SIZE: usize = 1024 * 1024;

/// True iff the object is a tombstone: `$deleted` present and exactly `true`.
pub fn is_tombstone(object: &JsonObject) -> bool {
    matches!(object.get(TOMBSTONE_FIELD), Some(Value::Bool(true)))
}

/// Validate a data record against the specifier: key fields present and of
/// key shape, no reserved top-level field names.
pub fn validate_record(record: &JsonObject, spec: &KeySpecifier) -> Result<()> {
    for name in record.keys() {
        if name.starts_with('$') {
            return Err(Error::InvalidKey(format!(
                "record contains reserved field name '{name}'"
            )));
        }
    }
    if spec.names().is_empty() {
        return Err(Error::InvalidKey(
            "key specifier cannot be empty".to_owned(),
        ));
    }
    for name in spec.names() {
        let value = record.get(name).ok_or_else(|| {
            Error::InvalidKey(format!("missing required key field '{name}'"))
        })?;
        check_key_value(name, value)?;
    }
    Ok(())
}

/// Validate a tombstone: `$deleted` must be literal `true`, key fields as
/// for records.
pub fn validate_tombstone(tombstone: &JsonObject, spec: &KeySpecifier) -> Result<()> {
    match tombstone.get(TOMBSTONE_FIELD) {
        None => {
            return Err(Error::Parse(
                "tombstone missing $deleted field".to_owned(),
            ));
        }
        Some(Value::Bool(true)) => {}
        Some(Value::Bool(false)) => {
            return Err(Error::Parse("$deleted must be true, got false".to_owned()));
        }
        Some(other) => {
            return Err(Error::Parse(format!(
                "$deleted must be true, got {}",
                json::json_type_name(other)
            )));
        }
    }
    for name in spec.names() {
        let value = tombstone.get(name).ok_or_else(|| {
            Error::InvalidKey(format!(
                "tombstone missing required key field '{name}'"
            ))
        })?;
        check_key_value(name, value)?;
    }
    Ok(())
}

/// Extract the key named by the specifier. A one-field specifier yields a
/// scalar key; a compound one yields a tuple of matching arity.
/// Integer-valued floats normalise to integers.
pub fn extract_key(object: &JsonObject, spec: &KeySpecifier) -> Result<Key> {
    let names = spec.names();
    if names.is_empty() {
        return Err(Error::InvalidKey(
            "key specifier cannot be empty".to_owned(),
        ));
    }
    let mut elements = Vec::with_capacity(names.len());
    for name in names {
        let value = object.get(name).ok_or_else(|| {
            Error::InvalidKey(format!("missing required key field '{name}'"))
        })?;
        check_key_value(name, value)?;
        elements.push(key_element(name, value)?);
    }
    if elements.len() == 1 {
        Ok(match elements.remove(0) {
            KeyElement::Int(i) => Key::Int(i),
            KeyElement::Str(s) => Key::Str(s),
        })
    } else {
        Ok(Key::Tuple(elements))
    }
}

/// Check that a key's shape matches the specifier's arity, without touching
/// any record.
pub fn ensure_key_matches_specifier(key: &Key, spec: &KeySpecifier) -> Result<()> {
    match (spec, key) {
        (KeySpecifier::Field(_), Key::Tuple(_)) => Err(Error::InvalidKey(
            "key arity mismatch: expected scalar key".to_owned(),
        )),
        (KeySpecifier::Field(_), _) => Ok(()),
        (KeySpecifier::Fields(names), Key::Tuple(elements)) => {
            if elements.len() == names.len() {
                Ok(())
            } else {
                Err(Error::InvalidKey(format!(
                    "key arity mismatch: expected tuple of {} elements, got {}",
                    names.len(),
                    elements.len()
                )))
            }
        }
        (KeySpecifier::Fields(_), _) => Err(Error::InvalidKey(
            "key arity mismatch: expected tuple key".to_owned(),
        )),
    }
}

/// Build the minimal tombstone for a key.
pub fn build_tombstone(key: &Key, spec: &KeySpecifier) -> Result<JsonObject> {
    ensure_key_matches_specifier(key, spec)?;
    let mut tombstone = JsonObject::new();
    tombstone.insert(TOMBSTONE_FIELD.to_owned(), Value::Bool(true));
    match (spec, key) {
        (KeySpecifier::Field(name), Key::Int(i)) => {
            tombstone.insert(name.clone(), Value::from(*i));
        }
        (KeySpecifier::Field(name), Key::Str(s)) => {
            tombstone.insert(name.clone(), Value::String(s.clone()));
        }
        (KeySpecifier::Fields(names), Key::Tuple(elements)) => {
            for (name, element) in names.iter().zip(elements) {
                tombstone.insert(name.clone(), element.to_value());
            }
        }
        // arity already checked above
        _ => {
            return Err(Error::InvalidKey(
                "key arity mismatch".to_owned(),
            ));
        }
    }
    Ok(tombstone)
}

/// Byte length of the record's canonical serialization.
pub fn record_size(object: &JsonObject) -> usize {
    json::serialize_object(object).len()
}

fn check_key_value(name: &str, value: &Value) -> Result<()> {
    match value {
        Value::Null => Err(Error::InvalidKey(format!(
            "key field '{name}' value is null"
        ))),
        Value::Bool(_) => Err(Error::InvalidKey(format!(
            "key field '{name}' value is boolean"
        ))),
        Value::Array(_) => Err(Error::InvalidKey(format!(
            "key field '{name}' value is an array"
        ))),
        Value::Object(_) => Err(Error::InvalidKey(format!(
            "key field '{name}' value is an object"
        ))),
        Value::String(_) => Ok(()),
        Value::Number(n) => {
            if keys::integer_from_number(n).is_some() {
                return Ok(());
            }
            if n.as_f64().is_some_and(|f| f.fract() != 0.0) {
                Err(Error::InvalidKey(format!(
                    "key field '{name}' value is not an integer"
                )))
            } else {
                Err(Error::InvalidKey(format!(
                    "key field '{name}' value is outside valid integer range"
                )))
            }
        }
    }
}

fn key_element(name: &str, value: &Value) -> Result<KeyElement> {
    match value {
        Value::String(s) => Ok(KeyElement::Str(s.clone())),
        Value::Number(n) => keys::integer_from_number(n).map(KeyElement::Int).ok_or_else(|| {
            Error::InvalidKey(format!("key field '{name}' value is not an integer"))
        }),
        _ => Err(Error::InvalidKey(format!(
            "key field '{name}' value has invalid type"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{MAX_INTEGER_KEY, MIN_INTEGER_KEY};
    use serde_json::json;

    fn obj(value: serde_json::Value) -> JsonObject {
        value.as_object().expect("fixture must be an object").clone()
    }

    fn spec(name: &str) -> KeySpecifier {
        KeySpecifier::from(name)
    }

    #[test]
    fn valid_records_pass() {
        let cases = [
            json!({"id": "alice", "name": "Alice"}),
            json!({"id": 42, "name": "Item"}),
            json!({"id": "", "name": "Default"}),
            json!({"id": MAX_INTEGER_KEY, "data": "max"}),
            json!({"id": MIN_INTEGER_KEY, "data": "min"}),
            json!({"id": 0, "data": "zero"}),
            json!({"id": -1, "data": "negative"}),
        ];
        for case in cases {
            assert!(validate_record(&obj(case), &spec("id")).is_ok());
        }
    }

    #[test]
    fn invalid_records_fail_with_specific_messages() {
        let cases = [
            (json!({"name": "Alice"}), "missing required key field 'id'"),
            (json!({"id": null}), "key field 'id' value is null"),
            (json!({"id": true}), "key field 'id' value is boolean"),
            (json!({"id": {"nested": 1}}), "key field 'id' value is an object"),
            (json!({"id": [1, 2, 3]}), "key field 'id' value is an array"),
            (json!({"id": 3.14}), "value is not an integer"),
            (
                json!({"id": MAX_INTEGER_KEY + 1}),
                "outside valid integer range",
            ),
            (
                json!({"id": MIN_INTEGER_KEY - 1}),
                "outside valid integer range",
            ),
            (
                json!({"id": "alice", "$custom": "value"}),
                "record contains reserved field name",
            ),
        ];
        for (case, fragment) in cases {
            match validate_record(&obj(case.clone()), &spec("id")) {
                Err(Error::InvalidKey(message)) => {
                    assert!(message.contains(fragment), "{case}: {message}");
                }
                other => panic!("expected invalid-key error for {case}, got {other:?}"),
            }
        }
    }

    #[test]
    fn compound_key_records() {
        let two = KeySpecifier::from(["org", "id"]);
        assert!(validate_record(&obj(json!({"org": "acme", "id": "alice"})), &two).is_ok());
        assert!(validate_record(&obj(json!({"org": "acme", "id": 42})), &two).is_ok());

        match validate_record(&obj(json!({"id": "alice"})), &two) {
            Err(Error::InvalidKey(message)) => {
                assert!(message.contains("missing required key field 'org'"));
            }
            other => panic!("expected invalid-key error, got {other:?}"),
        }
        match validate_record(&obj(json!({"org": "acme"})), &two) {
            Err(Error::InvalidKey(message)) => {
                assert!(message.contains("missing required key field 'id'"));
            }
            other => panic!("expected invalid-key error, got {other:?}"),
        }
    }

    #[test]
    fn tombstone_detection_requires_exact_true() {
        assert!(is_tombstone(&obj(json!({"$deleted": true, "id": "a"}))));
        assert!(!is_tombstone(&obj(json!({"$deleted": false, "id": "a"}))));
        assert!(!is_tombstone(&obj(json!({"$deleted": null, "id": "a"}))));
        assert!(!is_tombstone(&obj(json!({"$deleted": "true", "id": "a"}))));
        assert!(!is_tombstone(&obj(json!({"$deleted": 1, "id": "a"}))));
        assert!(!is_tombstone(&obj(json!({"id": "a"}))));
    }

    #[test]
    fn valid_tombstones_pass() {
        assert!(validate_tombstone(&obj(json!({"$deleted": true, "id": "alice"})), &spec("id")).is_ok());
        assert!(validate_tombstone(&obj(json!({"$deleted": true, "id": 42})), &spec("id")).is_ok());
        assert!(
            validate_tombstone(
                &obj(json!({"$deleted": true, "org": "acme", "id": "alice"})),
                &KeySpecifier::from(["org", "id"]),
            )
            .is_ok()
        );
    }

    #[test]
    fn malformed_tombstones_are_parse_errors() {
        let cases = [
            (json!({"id": "alice"}), "tombstone missing $deleted field"),
            (json!({"$deleted": false, "id": "a"}), "$deleted must be true, got false"),
            (json!({"$deleted": null, "id": "a"}), "$deleted must be true, got null"),
            (json!({"$deleted": "true", "id": "a"}), "$deleted must be true, got string"),
            (json!({"$deleted": 1, "id": "a"}), "$deleted must be true, got number"),
            (json!({"$deleted": {"nested": true}, "id": "a"}), "$deleted must be true, got object"),
        ];
        for (case, fragment) in cases {
            match validate_tombstone(&obj(case.clone()), &spec("id")) {
                Err(Error::Parse(message)) => {
                    assert!(message.contains(fragment), "{case}: {message}");
                }
                other => panic!("expected parse error for {case}, got {other:?}"),
            }
        }
    }

    #[test]
    fn tombstone_key_problems_are_invalid_key_errors() {
        match validate_tombstone(&obj(json!({"$deleted": true})), &spec("id")) {
            Err(Error::InvalidKey(message)) => {
                assert!(message.contains("tombstone missing required key field 'id'"));
            }
            other => panic!("expected invalid-key error, got {other:?}"),
        }
        assert!(matches!(
            validate_tombstone(&obj(json!({"$deleted": true, "id": null})), &spec("id")),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn extract_scalar_keys() {
        assert_eq!(
            extract_key(&obj(json!({"id": "alice", "name": "Alice"})), &spec("id")).unwrap(),
            Key::from("alice")
        );
        assert_eq!(
            extract_key(&obj(json!({"id": ""})), &spec("id")).unwrap(),
            Key::from("")
        );
        assert_eq!(
            extract_key(&obj(json!({"id": 42})), &spec("id")).unwrap(),
            Key::from(42)
        );
        assert_eq!(
            extract_key(&obj(json!({"id": MIN_INTEGER_KEY})), &spec("id")).unwrap(),
            Key::from(MIN_INTEGER_KEY)
        );
    }

    #[test]
    fn extract_compound_keys() {
        let two = KeySpecifier::from(["org", "id"]);
        assert_eq!(
            extract_key(&obj(json!({"org": "acme", "id": "alice"})), &two).unwrap(),
            Key::Tuple(vec![KeyElement::from("acme"), KeyElement::from("alice")])
        );
        assert_eq!(
            extract_key(&obj(json!({"org": "acme", "id": 42})), &two).unwrap(),
            Key::Tuple(vec![KeyElement::from("acme"), KeyElement::from(42)])
        );
        // a single-field compound specifier extracts a scalar key
        let one = KeySpecifier::Fields(vec!["id".to_owned()]);
        assert_eq!(
            extract_key(&obj(json!({"id": "alice"})), &one).unwrap(),
            Key::from("alice")
        );
        assert_eq!(
            extract_key(&obj(json!({"id": 42})), &one).unwrap(),
            Key::from(42)
        );
    }

    #[test]
    fn extract_normalises_integer_valued_floats() {
        assert_eq!(
            extract_key(&obj(json!({"id": 1.0})), &spec("id")).unwrap(),
            Key::from(1)
        );
        assert_eq!(
            extract_key(&obj(json!({"id": 1e2})), &spec("id")).unwrap(),
            Key::from(100)
        );
        assert_eq!(
            extract_key(&obj(json!({"id": -5.0})), &spec("id")).unwrap(),
            Key::from(-5)
        );
        assert!(matches!(
            extract_key(&obj(json!({"id": 1.5})), &spec("id")),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn extract_errors() {
        assert!(matches!(
            extract_key(&obj(json!({"name": "x"})), &spec("id")),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            extract_key(&obj(json!({"id": null})), &spec("id")),
            Err(Error::InvalidKey(_))
        ));
        match extract_key(&obj(json!({"id": "x"})), &KeySpecifier::Fields(vec![])) {
            Err(Error::InvalidKey(message)) => {
                assert!(message.contains("key specifier cannot be empty"));
            }
            other => panic!("expected invalid-key error, got {other:?}"),
        }
    }

    #[test]
    fn record_size_is_canonical_byte_length() {
        let cases = [
            (json!({"id": "a"}), 10),
            (json!({"id": "alice", "name": "Alice"}), 29),
            (json!({"id": 42}), 9),
            (json!({"id": "a", "data": {"x": 1}}), 25),
            (json!({"id": "café"}), 14),
            (json!({}), 2),
            (json!({"id": "a", "tags": ["x", "y"]}), 27),
            (json!({"id": "a", "active": true}), 24),
            (json!({"id": "a", "data": null}), 22),
        ];
        for (case, expected) in cases {
            assert_eq!(record_size(&obj(case.clone())), expected, "{case}");
        }
    }

    #[test]
    fn build_tombstone_for_each_key_shape() {
        assert_eq!(
            Value::Object(build_tombstone(&"alice".into(), &spec("id")).unwrap()),
            json!({"$deleted": true, "id": "alice"})
        );
        assert_eq!(
            Value::Object(build_tombstone(&42.into(), &spec("id")).unwrap()),
            json!({"$deleted": true, "id": 42})
        );
        let compound = KeySpecifier::from(["org", "id"]);
        let key = Key::Tuple(vec![KeyElement::from("acme"), KeyElement::from("alice")]);
        assert_eq!(
            Value::Object(build_tombstone(&key, &compound).unwrap()),
            json!({"$deleted": true, "org": "acme", "id": "alice"})
        );
    }

    #[test]
    fn build_tombstone_rejects_arity_mismatch() {
        let compound = KeySpecifier::from(["org", "id"]);
        match build_tombstone(&Key::tuple(["a", "b"]), &spec("id")) {
            Err(Error::InvalidKey(message)) => assert!(message.contains("expected scalar key")),
            other => panic!("expected arity error, got {other:?}"),
        }
        match build_tombstone(&"alice".into(), &compound) {
            Err(Error::InvalidKey(message)) => assert!(message.contains("expected tuple")),
            other => panic!("expected arity error, got {other:?}"),
        }
        match build_tombstone(&Key::tuple(["a", "b", "c"]), &compound) {
            Err(Error::InvalidKey(message)) => {
                assert!(message.contains("expected tuple of 2"));
            }
            other => panic!("expected arity error, got {other:?}"),
        }
    }
}
