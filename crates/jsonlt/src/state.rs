//! Logical state: the left-to-right fold of the operation log.
//!
//! Each record sets its key, each tombstone removes it. The resulting
//! `BTreeMap` iterates in the total key order, so callers never sort.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::json::JsonObject;
use crate::keys::{Key, KeySpecifier};
use crate::records;

/// Fold operations into `Key → record`. Every operation is validated on the
/// way in; tombstones never appear in the result.
pub fn compute_logical_state(
    operations: Vec<JsonObject>,
    spec: &KeySpecifier,
) -> Result<BTreeMap<Key, JsonObject>> {
    let mut state = BTreeMap::new();
    for operation in operations {
        if records::is_tombstone(&operation) {
            records::validate_tombstone(&operation, spec)?;
            let key = records::extract_key(&operation, spec)?;
            state.remove(&key);
        } else {
            records::validate_record(&operation, spec)?;
            let key = records::extract_key(&operation, spec)?;
            state.insert(key, operation);
        }
    }
    Ok(state)
}
