//! Canonical JSON codec.
//!
//! Parsing is stricter than serde_json's defaults: duplicate object members
//! and nesting past the depth cap are rejected while the line is still being
//! parsed, via a [`DeserializeSeed`] threaded through the deserializer.
//!
//! Serialization is deterministic. `serde_json::Map` keeps members ordered
//! by key (ascending Unicode code point for UTF-8 strings), and
//! `serde_json::to_string` emits no whitespace, escapes `"` `\` and control
//! characters, keeps non-ASCII as raw UTF-8, and prints floats in shortest
//! round-trip form. [`serialize_object`] is the single function producing
//! bytes destined for disk.

use std::cell::Cell;
use std::fmt;

use serde::de::{self, DeserializeSeed, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A parsed JSON object, members in canonical (ascending key) order.
pub type JsonObject = Map<String, Value>;

/// Maximum value nesting depth. A primitive or empty container has depth 1;
/// each wrapping container adds 1.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Parse one text line holding a single JSON object, at the default depth cap.
pub fn parse_line(text: &str) -> Result<JsonObject> {
    parse_line_with_depth(text, MAX_NESTING_DEPTH)
}

/// Parse one text line holding a single JSON object.
///
/// Fails with [`Error::Parse`] when the text is not valid JSON, the value is
/// not an object, or any object at any depth repeats a member name; with
/// [`Error::Limit`] when nesting exceeds `max_depth`. serde_json's own
/// recursion guard is folded into the depth violation, so runaway nesting
/// never surfaces as anything else.
pub fn parse_line_with_depth(text: &str, max_depth: usize) -> Result<JsonObject> {
    let violation = Cell::new(None);
    let mut deserializer = serde_json::Deserializer::from_str(text);
    let seed = ValueSeed {
        level: 0,
        max_depth,
        violation: &violation,
    };
    let parsed = seed
        .deserialize(&mut deserializer)
        .and_then(|value| deserializer.end().map(|()| value));

    match parsed {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(Error::Parse(format!(
            "expected JSON object, got {}",
            json_type_name(&other)
        ))),
        Err(err) => Err(match violation.take() {
            Some(StrictViolation::DuplicateKey(name)) => {
                Error::Parse(format!("duplicate key: '{name}'"))
            }
            Some(StrictViolation::DepthExceeded(depth)) => Error::Limit(format!(
                "nesting depth {depth} exceeds maximum {max_depth}"
            )),
            None if err.to_string().contains("recursion limit") => Error::Limit(format!(
                "nesting depth exceeds maximum {max_depth}"
            )),
            None => Error::Parse(format!("invalid JSON: {err}")),
        }),
    }
}

/// Canonical serialization of any JSON value.
pub fn serialize_value(value: &Value) -> String {
    serde_json::to_string(value).expect("serializing an in-memory JSON value cannot fail")
}

/// Canonical serialization of a JSON object.
pub fn serialize_object(object: &JsonObject) -> String {
    serde_json::to_string(object).expect("serializing an in-memory JSON value cannot fail")
}

/// Nesting depth of an already-parsed value. Iterative, so adversarially
/// deep values measured post-parse cannot overflow the stack.
pub fn nesting_depth(value: &Value) -> usize {
    let mut max = 1;
    let mut pending = vec![(value, 1)];
    while let Some((value, depth)) = pending.pop() {
        max = max.max(depth);
        match value {
            Value::Array(items) => pending.extend(items.iter().map(|item| (item, depth + 1))),
            Value::Object(object) => {
                pending.extend(object.values().map(|member| (member, depth + 1)));
            }
            _ => {}
        }
    }
    max
}

/// Human name of a JSON value's type, for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

enum StrictViolation {
    DuplicateKey(String),
    DepthExceeded(usize),
}

struct ValueSeed<'a> {
    level: usize,
    max_depth: usize,
    violation: &'a Cell<Option<StrictViolation>>,
}

impl<'de> DeserializeSeed<'de> for ValueSeed<'_> {
    type Value = Value;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Value, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        if self.level >= self.max_depth {
            self.violation
                .set(Some(StrictViolation::DepthExceeded(self.level + 1)));
            return Err(de::Error::custom("nesting depth exceeded"));
        }
        deserializer.deserialize_any(StrictVisitor {
            level: self.level,
            max_depth: self.max_depth,
            violation: self.violation,
        })
    }
}

struct StrictVisitor<'a> {
    level: usize,
    max_depth: usize,
    violation: &'a Cell<Option<StrictViolation>>,
}

impl<'a> StrictVisitor<'a> {
    fn child_seed(&self) -> ValueSeed<'a> {
        ValueSeed {
            level: self.level + 1,
            max_depth: self.max_depth,
            violation: self.violation,
        }
    }
}

impl<'de> Visitor<'de> for StrictVisitor<'_> {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON value")
    }

    fn visit_bool<E>(self, v: bool) -> std::result::Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> std::result::Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::from(v))
    }

    fn visit_u64<E>(self, v: u64) -> std::result::Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::from(v))
    }

    fn visit_f64<E>(self, v: f64) -> std::result::Result<Value, E>
    where
        E: de::Error,
    {
        serde_json::Number::from_f64(v)
            .map(Value::Number)
            .ok_or_else(|| E::custom("non-finite number"))
    }

    fn visit_str<E>(self, v: &str) -> std::result::Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::String(v.to_owned()))
    }

    fn visit_unit<E>(self) -> std::result::Result<Value, E>
    where
        E: de::Error,
    {
        Ok(Value::Null)
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element_seed(self.child_seed())? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut object = JsonObject::new();
        while let Some(name) = map.next_key::<String>()? {
            let value = map.next_value_seed(self.child_seed())?;
            if object.insert(name.clone(), value).is_some() {
                self.violation.set(Some(StrictViolation::DuplicateKey(name)));
                return Err(de::Error::custom("duplicate object member"));
            }
        }
        Ok(Value::Object(object))
    }
}
