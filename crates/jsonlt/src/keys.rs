//! Key model: the `Key` sum type, its total order, and key specifiers.
//!
//! Ordering is the public iteration order of the whole store: type buckets
//! `Int < Str < Tuple`, numeric order within integers, Unicode code-point
//! order within strings, element-wise comparison within tuples with the
//! shorter tuple first when one is a prefix of the other. `Ord` implements
//! exactly this, so a `BTreeMap<Key, _>` iterates in the store's key order.

use std::cmp::Ordering;
use std::fmt;

use serde_json::{Number, Value};

use crate::error::{Error, Result};
use crate::json;

/// Largest integer a key may hold: 2^53 - 1, the contiguous integer range
/// of an IEEE 754 double.
pub const MAX_INTEGER_KEY: i64 = (1 << 53) - 1;
/// Smallest integer a key may hold.
pub const MIN_INTEGER_KEY: i64 = -MAX_INTEGER_KEY;
/// Maximum number of elements in a tuple key or compound specifier.
pub const MAX_TUPLE_ELEMENTS: usize = 16;
/// Maximum serialized key length in bytes.
pub const MAX_KEY_LENGTH: usize = 1024;

/// One element of a tuple key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyElement {
    Int(i64),
    Str(String),
}

impl KeyElement {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Str(s) => Value::String(s.clone()),
        }
    }
}

impl Ord for KeyElement {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Int(_), Self::Str(_)) => Ordering::Less,
            (Self::Str(_), Self::Int(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for KeyElement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<i64> for KeyElement {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for KeyElement {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for KeyElement {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// A record key: an integer, a string, or a tuple of scalars.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(String),
    Tuple(Vec<KeyElement>),
}

impl Key {
    /// Build a tuple key from elements.
    pub fn tuple<I>(elements: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<KeyElement>,
    {
        Self::Tuple(elements.into_iter().map(Into::into).collect())
    }

    /// Structural validity: integer magnitude, tuple arity.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Int(i) => validate_integer(*i),
            Self::Str(_) => Ok(()),
            Self::Tuple(elements) => {
                if elements.is_empty() {
                    return Err(Error::InvalidKey(
                        "empty tuple is not a valid key".to_owned(),
                    ));
                }
                if elements.len() > MAX_TUPLE_ELEMENTS {
                    return Err(Error::Limit(format!(
                        "tuple key has {} elements, maximum is {MAX_TUPLE_ELEMENTS}",
                        elements.len()
                    )));
                }
                for element in elements {
                    if let KeyElement::Int(i) = element {
                        validate_integer(*i)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// The JSON value this key round-trips through.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Str(s) => Value::String(s.clone()),
            Self::Tuple(elements) => {
                Value::Array(elements.iter().map(KeyElement::to_value).collect())
            }
        }
    }

    fn bucket(&self) -> u8 {
        match self {
            Self::Int(_) => 0,
            Self::Str(_) => 1,
            Self::Tuple(_) => 2,
        }
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            // Vec ordering is element-wise with the shorter prefix first,
            // which is exactly the tuple rule.
            (Self::Tuple(a), Self::Tuple(b)) => a.cmp(b),
            _ => self.bucket().cmp(&other.bucket()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&serialize_key(self))
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

fn validate_integer(i: i64) -> Result<()> {
    if !(MIN_INTEGER_KEY..=MAX_INTEGER_KEY).contains(&i) {
        return Err(Error::InvalidKey(format!(
            "integer key {i} is outside valid integer range"
        )));
    }
    Ok(())
}

/// Serialize a key: decimal for integers, canonical JSON string for strings,
/// canonical JSON array for tuples.
pub fn serialize_key(key: &Key) -> String {
    match key {
        Key::Int(i) => i.to_string(),
        Key::Str(s) => {
            serde_json::to_string(s).expect("serializing a string cannot fail")
        }
        Key::Tuple(_) => json::serialize_value(&key.to_value()),
    }
}

/// Byte length of a key's serialization.
pub fn key_length(key: &Key) -> usize {
    serialize_key(key).len()
}

/// Map a parsed JSON value back to a key. Strings and in-range non-bool
/// integers pass through; integer-valued floats normalise; arrays recurse
/// element-wise. Anything else is a shape error.
pub fn key_from_json(value: &Value) -> Result<Key> {
    match value {
        Value::String(s) => Ok(Key::Str(s.clone())),
        Value::Number(n) => integer_from_number(n)
            .map(Key::Int)
            .ok_or_else(|| invalid_conversion(value)),
        Value::Array(items) => {
            let mut elements = Vec::with_capacity(items.len());
            for item in items {
                elements.push(key_element_from_json(item)?);
            }
            Ok(Key::Tuple(elements))
        }
        _ => Err(invalid_conversion(value)),
    }
}

fn key_element_from_json(value: &Value) -> Result<KeyElement> {
    match value {
        Value::String(s) => Ok(KeyElement::Str(s.clone())),
        Value::Number(n) => integer_from_number(n)
            .map(KeyElement::Int)
            .ok_or_else(|| {
                Error::InvalidKey(format!(
                    "cannot convert {} to key element",
                    json::json_type_name(value)
                ))
            }),
        _ => Err(Error::InvalidKey(format!(
            "cannot convert {} to key element",
            json::json_type_name(value)
        ))),
    }
}

fn invalid_conversion(value: &Value) -> Error {
    Error::InvalidKey(format!(
        "cannot convert {} to key",
        json::json_type_name(value)
    ))
}

/// The in-range integer a JSON number denotes, if any. Integer-valued
/// floats normalise; fractional values and out-of-range magnitudes do not.
pub(crate) fn integer_from_number(number: &Number) -> Option<i64> {
    if let Some(i) = number.as_i64() {
        return (MIN_INTEGER_KEY..=MAX_INTEGER_KEY).contains(&i).then_some(i);
    }
    if number.as_u64().is_some() {
        // above i64::MAX, so far outside the 53-bit range
        return None;
    }
    let f = number.as_f64()?;
    if f.fract() != 0.0 {
        return None;
    }
    let limit = MAX_INTEGER_KEY as f64;
    (-limit..=limit).contains(&f).then_some(f as i64)
}

/// Which record field(s) form the key: one field name, or 2..=16 distinct
/// names extracting a tuple key of matching arity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySpecifier {
    Field(String),
    Fields(Vec<String>),
}

impl KeySpecifier {
    /// Collapse a one-element compound specifier to a scalar one.
    pub fn normalize(self) -> Self {
        match self {
            Self::Fields(mut names) if names.len() == 1 => {
                Self::Field(names.remove(0))
            }
            other => other,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let names = self.names();
        if names.is_empty() {
            return Err(Error::InvalidKey(
                "key specifier cannot be empty".to_owned(),
            ));
        }
        if names.len() > MAX_TUPLE_ELEMENTS {
            return Err(Error::Limit(format!(
                "key specifier has {} fields, maximum is {MAX_TUPLE_ELEMENTS}",
                names.len()
            )));
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(Error::InvalidKey(format!(
                    "key specifier contains duplicate field name '{name}'"
                )));
            }
        }
        Ok(())
    }

    /// The field names, in key order.
    pub fn names(&self) -> &[String] {
        match self {
            Self::Field(name) => std::slice::from_ref(name),
            Self::Fields(names) => names.as_slice(),
        }
    }

    pub fn arity(&self) -> usize {
        self.names().len()
    }

    /// Equality up to single-element normalisation.
    pub fn matches(&self, other: &KeySpecifier) -> bool {
        self.names() == other.names()
    }
}

impl fmt::Display for KeySpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, "'{name}'"),
            Self::Fields(names) => {
                write!(f, "(")?;
                for (i, name) in names.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "'{name}'")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<&str> for KeySpecifier {
    fn from(name: &str) -> Self {
        Self::Field(name.to_owned())
    }
}

impl From<String> for KeySpecifier {
    fn from(name: String) -> Self {
        Self::Field(name)
    }
}

impl<const N: usize> From<[&str; N]> for KeySpecifier {
    fn from(names: [&str; N]) -> Self {
        Self::Fields(names.iter().map(|&n| n.to_owned()).collect()).normalize()
    }
}

impl From<&[&str]> for KeySpecifier {
    fn from(names: &[&str]) -> Self {
        Self::Fields(names.iter().map(|&n| n.to_owned()).collect()).normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_keys_pass_validation() {
        for key in [
            Key::from("alice"),
            Key::from(""),
            Key::from(42),
            Key::from(MAX_INTEGER_KEY),
            Key::from(MIN_INTEGER_KEY),
            Key::tuple(["a"]),
            Key::Tuple(vec![KeyElement::from("a"), KeyElement::from(1)]),
            Key::tuple((0..MAX_TUPLE_ELEMENTS as i64).collect::<Vec<_>>()),
        ] {
            assert!(key.validate().is_ok(), "{key}");
        }
    }

    #[test]
    fn invalid_keys_fail_validation() {
        assert!(matches!(
            Key::from(MAX_INTEGER_KEY + 1).validate(),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            Key::from(MIN_INTEGER_KEY - 1).validate(),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            Key::Tuple(vec![]).validate(),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            Key::tuple((0..17i64).collect::<Vec<_>>()).validate(),
            Err(Error::Limit(_))
        ));
        assert!(matches!(
            Key::tuple([MAX_INTEGER_KEY + 1]).validate(),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn comparison_follows_type_buckets_and_values() {
        let cases: Vec<(Key, Key, Ordering)> = vec![
            (1.into(), 2.into(), Ordering::Less),
            (2.into(), 1.into(), Ordering::Greater),
            ((-10).into(), (-5).into(), Ordering::Less),
            ("alice".into(), "bob".into(), Ordering::Less),
            ("Alice".into(), "alice".into(), Ordering::Less),
            ("Zebra".into(), "apple".into(), Ordering::Less),
            // int < str < tuple across buckets
            (99.into(), "".into(), Ordering::Less),
            ("zzz".into(), Key::tuple(["a"]), Ordering::Less),
        ];
        for (a, b, expected) in cases {
            assert_eq!(a.cmp(&b), expected, "{a} vs {b}");
        }
    }

    #[test]
    fn tuple_comparison_is_element_wise_with_prefix_first() {
        let ab1 = Key::Tuple(vec![KeyElement::from("a"), KeyElement::from(1)]);
        let ab2 = Key::Tuple(vec![KeyElement::from("a"), KeyElement::from(2)]);
        let b1 = Key::Tuple(vec![KeyElement::from("b"), KeyElement::from(1)]);
        let a = Key::tuple(["a"]);
        assert!(ab1 < ab2);
        assert!(ab2 < b1);
        assert!(a < ab1);
        // int sorts before string inside a tuple slot
        let int_first = Key::Tuple(vec![KeyElement::from(1), KeyElement::from("a")]);
        let str_first = Key::Tuple(vec![KeyElement::from("a"), KeyElement::from(1)]);
        assert!(int_first < str_first);
    }

    #[test]
    fn serialization_is_canonical() {
        let cases: Vec<(Key, &str)> = vec![
            ("alice".into(), "\"alice\""),
            ("".into(), "\"\""),
            ("hello\nworld".into(), "\"hello\\nworld\""),
            ("tab\there".into(), "\"tab\\there\""),
            (42.into(), "42"),
            ((-100).into(), "-100"),
            (0.into(), "0"),
            (
                Key::Tuple(vec![KeyElement::from("a"), KeyElement::from(1)]),
                "[\"a\",1]",
            ),
            (
                Key::Tuple(vec![
                    KeyElement::from("alice"),
                    KeyElement::from("bob"),
                    KeyElement::from(123),
                ]),
                "[\"alice\",\"bob\",123]",
            ),
        ];
        for (key, expected) in cases {
            assert_eq!(serialize_key(&key), expected);
        }
    }

    #[test]
    fn key_length_counts_serialized_bytes() {
        assert_eq!(key_length(&"alice".into()), 7);
        assert_eq!(key_length(&"".into()), 2);
        assert_eq!(key_length(&42.into()), 2);
        assert_eq!(key_length(&(-100).into()), 4);
        assert_eq!(
            key_length(&Key::Tuple(vec![KeyElement::from("a"), KeyElement::from(1)])),
            7
        );
        // é is two UTF-8 bytes
        assert_eq!(key_length(&"café".into()), 7);
        // "\n" serializes as "\\n" inside quotes
        assert_eq!(key_length(&"\n".into()), 4);
    }

    #[test]
    fn key_from_json_conversions() {
        assert_eq!(key_from_json(&json!("alice")).unwrap(), Key::from("alice"));
        assert_eq!(key_from_json(&json!(42)).unwrap(), Key::from(42));
        assert_eq!(key_from_json(&json!(1.0)).unwrap(), Key::from(1));
        assert_eq!(
            key_from_json(&json!(["a", 1])).unwrap(),
            Key::Tuple(vec![KeyElement::from("a"), KeyElement::from(1)])
        );
        assert_eq!(key_from_json(&json!([])).unwrap(), Key::Tuple(vec![]));
    }

    #[test]
    fn key_from_json_rejects_other_shapes() {
        for value in [json!(true), json!(null), json!({"a": 1}), json!(3.14)] {
            assert!(matches!(
                key_from_json(&value),
                Err(Error::InvalidKey(_))
            ), "{value}");
        }
        for value in [json!(["ok", 3.14]), json!(["ok", null]), json!(["ok", true])] {
            match key_from_json(&value) {
                Err(Error::InvalidKey(message)) => {
                    assert!(message.contains("key element"), "{message}");
                }
                other => panic!("expected invalid-key error, got {other:?}"),
            }
        }
    }

    #[test]
    fn integer_float_equivalence() {
        assert_eq!(key_from_json(&json!(1)).unwrap(), key_from_json(&json!(1.0)).unwrap());
        assert_eq!(key_from_json(&json!(1e2)).unwrap(), Key::from(100));
        assert_eq!(key_from_json(&json!(-5.0)).unwrap(), Key::from(-5));
    }

    #[test]
    fn specifier_normalization_and_matching() {
        let scalar = KeySpecifier::from("id");
        let single = KeySpecifier::Fields(vec!["id".to_owned()]).normalize();
        assert_eq!(single, scalar);
        assert!(scalar.matches(&KeySpecifier::Fields(vec!["id".to_owned()])));
        let compound = KeySpecifier::from(["org", "id"]);
        assert!(compound.matches(&compound.clone()));
        assert!(!compound.matches(&KeySpecifier::from(["id", "org"])));
        assert!(!compound.matches(&scalar));
    }

    #[test]
    fn specifier_validation() {
        assert!(KeySpecifier::from("id").validate().is_ok());
        assert!(KeySpecifier::from("").validate().is_ok());
        assert!(KeySpecifier::from(["org", "id"]).validate().is_ok());
        assert!(matches!(
            KeySpecifier::Fields(vec![]).validate(),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            KeySpecifier::from(["id", "id"]).validate(),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            KeySpecifier::from(["a", "b", "a"]).validate(),
            Err(Error::InvalidKey(_))
        ));
        let seventeen: Vec<String> = (0..17).map(|i| format!("field{i}")).collect();
        assert!(matches!(
            KeySpecifier::Fields(seventeen).validate(),
            Err(Error::Limit(_))
        ));
    }
}
