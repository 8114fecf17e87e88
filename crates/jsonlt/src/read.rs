//! The shared read surface of tables and transactions.
//!
//! Both serve reads from a `Key → record` map: the table from its live
//! state (refreshed on demand when auto-reload is on), the transaction from
//! its snapshot. Implementors provide the prepared view and a sorted-key
//! cache; everything else is defined here once.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::json::JsonObject;
use crate::keys::Key;

pub trait TableRead {
    /// Prepare for a read (reload if stale, check lifecycle), then expose
    /// the state map.
    fn read_view(&mut self) -> Result<&BTreeMap<Key, JsonObject>>;

    /// The sorted key list, lazily rebuilt after any mutation or reload.
    fn sorted_keys(&mut self) -> Result<&[Key]>;

    /// Look up one record.
    fn get(&mut self, key: &Key) -> Result<Option<&JsonObject>> {
        validate_lookup_key(key)?;
        Ok(self.read_view()?.get(key))
    }

    /// Whether the key is present.
    fn has(&mut self, key: &Key) -> Result<bool> {
        validate_lookup_key(key)?;
        Ok(self.read_view()?.contains_key(key))
    }

    /// Number of live records.
    fn count(&mut self) -> Result<usize> {
        Ok(self.read_view()?.len())
    }

    fn is_empty(&mut self) -> Result<bool> {
        Ok(self.read_view()?.is_empty())
    }

    /// All keys, in key order.
    fn keys(&mut self) -> Result<Vec<Key>> {
        Ok(self.sorted_keys()?.to_vec())
    }

    /// All records, in key order.
    fn all(&mut self) -> Result<Vec<&JsonObject>> {
        Ok(self.read_view()?.values().collect())
    }

    /// Alias of [`TableRead::all`], mirroring the mapping vocabulary.
    fn values(&mut self) -> Result<Vec<&JsonObject>> {
        self.all()
    }

    /// All `(key, record)` pairs, in key order.
    fn items(&mut self) -> Result<Vec<(&Key, &JsonObject)>> {
        Ok(self.read_view()?.iter().collect())
    }

    /// Records matching the predicate, in key order, stopping early once
    /// `limit` matches are collected.
    fn find<P>(&mut self, mut predicate: P, limit: Option<usize>) -> Result<Vec<&JsonObject>>
    where
        Self: Sized,
        P: FnMut(&JsonObject) -> bool,
    {
        let mut matches = Vec::new();
        for record in self.read_view()?.values() {
            if predicate(record) {
                matches.push(record);
                if let Some(limit) = limit
                    && matches.len() >= limit
                {
                    break;
                }
            }
        }
        Ok(matches)
    }

    /// First record matching the predicate, in key order.
    fn find_one<P>(&mut self, mut predicate: P) -> Result<Option<&JsonObject>>
    where
        Self: Sized,
        P: FnMut(&JsonObject) -> bool,
    {
        Ok(self.read_view()?.values().find(|record| predicate(record)))
    }
}

fn validate_lookup_key(key: &Key) -> Result<()> {
    if matches!(key, Key::Tuple(elements) if elements.is_empty()) {
        return Err(Error::InvalidKey(
            "empty tuple is not a valid key".to_owned(),
        ));
    }
    Ok(())
}
