//! Format header: the `$jsonlt` line.
//!
//! A header, when present, is the first line of the file. It declares the
//! format version, optionally the key specifier, schema metadata (a URL or
//! an inline object, never both), and free-form meta. The engine consumes
//! only `version` and `key`; schema and meta ride along for consumers.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::json::{self, JsonObject};
use crate::keys::{KeySpecifier, MAX_TUPLE_ELEMENTS};

/// Top-level field marking a header line.
pub const HEADER_FIELD: &str = "$jsonlt";

/// The only format version this engine reads and writes.
pub const FORMAT_VERSION: i64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub version: i64,
    pub key: Option<KeySpecifier>,
    pub schema_url: Option<String>,
    pub schema: Option<JsonObject>,
    pub meta: Option<JsonObject>,
}

impl Header {
    /// A current-version header with no key or metadata.
    pub fn new() -> Self {
        Self {
            version: FORMAT_VERSION,
            key: None,
            schema_url: None,
            schema: None,
            meta: None,
        }
    }

    /// A current-version header declaring a key specifier.
    pub fn with_key(key: KeySpecifier) -> Self {
        Self {
            key: Some(key),
            ..Self::new()
        }
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

/// True iff the object carries a top-level `$jsonlt` field.
pub fn is_header_line(object: &JsonObject) -> bool {
    object.contains_key(HEADER_FIELD)
}

/// Parse and validate a header line.
pub fn parse_header(object: &JsonObject) -> Result<Header> {
    for name in object.keys() {
        if name != HEADER_FIELD && name.starts_with('$') {
            return Err(Error::Parse(format!(
                "header contains unrecognised reserved field '{name}'"
            )));
        }
    }
    let body = match object.get(HEADER_FIELD) {
        Some(Value::Object(body)) => body,
        Some(_) => {
            return Err(Error::Parse(
                "$jsonlt value must be an object".to_owned(),
            ));
        }
        None => {
            return Err(Error::Parse(
                "header missing $jsonlt field".to_owned(),
            ));
        }
    };

    let version = parse_version(body)?;
    let key = match body.get("key") {
        None => None,
        Some(value) => Some(parse_key_specifier(value)?),
    };

    let schema_url = match body.get("$schema") {
        None => None,
        Some(Value::String(url)) => Some(url.clone()),
        Some(_) => return Err(Error::Parse("$schema must be a string".to_owned())),
    };
    let schema = match body.get("schema") {
        None => None,
        Some(Value::Object(schema)) => Some(schema.clone()),
        Some(_) => return Err(Error::Parse("schema must be an object".to_owned())),
    };
    if schema_url.is_some() && schema.is_some() {
        return Err(Error::Parse(
            "'$schema' and 'schema' are mutually exclusive".to_owned(),
        ));
    }

    let meta = match body.get("meta") {
        None => None,
        Some(Value::Object(meta)) => Some(meta.clone()),
        Some(_) => return Err(Error::Parse("meta must be an object".to_owned())),
    };

    Ok(Header {
        version,
        key,
        schema_url,
        schema,
        meta,
    })
}

/// Canonical serialization of the `$jsonlt` wrapper.
pub fn serialize_header(header: &Header) -> String {
    let mut body = JsonObject::new();
    body.insert("version".to_owned(), Value::from(header.version));
    match &header.key {
        Some(KeySpecifier::Field(name)) => {
            body.insert("key".to_owned(), Value::String(name.clone()));
        }
        Some(KeySpecifier::Fields(names)) => {
            body.insert(
                "key".to_owned(),
                Value::Array(names.iter().map(|n| Value::String(n.clone())).collect()),
            );
        }
        None => {}
    }
    if let Some(url) = &header.schema_url {
        body.insert("$schema".to_owned(), Value::String(url.clone()));
    }
    if let Some(schema) = &header.schema {
        body.insert("schema".to_owned(), Value::Object(schema.clone()));
    }
    if let Some(meta) = &header.meta {
        body.insert("meta".to_owned(), Value::Object(meta.clone()));
    }
    let mut wrapper = JsonObject::new();
    wrapper.insert(HEADER_FIELD.to_owned(), Value::Object(body));
    json::serialize_object(&wrapper)
}

fn parse_version(body: &JsonObject) -> Result<i64> {
    let value = body.get("version").ok_or_else(|| {
        Error::Parse("header missing required 'version' field".to_owned())
    })?;
    let version = match value {
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
    .ok_or_else(|| Error::Parse("version must be an integer".to_owned()))?;
    if version != FORMAT_VERSION {
        return Err(Error::Parse(format!("unsupported version {version}")));
    }
    Ok(version)
}

fn parse_key_specifier(value: &Value) -> Result<KeySpecifier> {
    match value {
        Value::String(name) => Ok(KeySpecifier::Field(name.clone())),
        Value::Array(items) => {
            if items.is_empty() {
                return Err(Error::Parse(
                    "key specifier cannot be an empty array".to_owned(),
                ));
            }
            if items.len() > MAX_TUPLE_ELEMENTS {
                return Err(Error::Parse(format!(
                    "key specifier exceeds maximum of {MAX_TUPLE_ELEMENTS} elements"
                )));
            }
            let mut names = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(name) => names.push(name.clone()),
                    _ => {
                        return Err(Error::Parse(
                            "key specifier array must contain only strings".to_owned(),
                        ));
                    }
                }
            }
            for (i, name) in names.iter().enumerate() {
                if names[..i].contains(name) {
                    return Err(Error::Parse(format!(
                        "key specifier contains duplicate field names: '{name}'"
                    )));
                }
            }
            Ok(KeySpecifier::Fields(names).normalize())
        }
        _ => Err(Error::Parse(
            "key specifier must be a string or array of strings".to_owned(),
        )),
    }
}
