//! Snapshot-isolated, optimistic transactions.
//!
//! A transaction deep-copies the table's logical state at creation and
//! serves every read from that snapshot with its own writes overlaid; no
//! file I/O happens until commit. Writes accumulate in an
//! insertion-ordered buffer holding the net effect per key, so commit
//! appends exactly one line per effectively-written key. Commit re-reads
//! the file under the lock and fails with [`Error::Conflict`] when any
//! buffered key's on-disk value no longer matches the snapshot base.
//!
//! The transaction mutably borrows its table, which is what makes "at most
//! one active transaction per table" hold: a second one cannot be created
//! while this one is alive.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::json::{self, JsonObject};
use crate::keys::{Key, KeySpecifier};
use crate::read::TableRead;
use crate::reader;
use crate::records;
use crate::state;
use crate::table::{Table, check_key_length, check_record_size};

enum Pending {
    Put(JsonObject),
    Delete,
}

pub struct Transaction<'t> {
    table: &'t mut Table,
    spec: KeySpecifier,
    /// State as it was when the transaction began; conflict detection
    /// compares the file against this.
    base: BTreeMap<Key, JsonObject>,
    /// Working view: base plus buffered writes.
    snapshot: BTreeMap<Key, JsonObject>,
    /// Net pending operation per key, in first-buffered order.
    buffer: Vec<(Key, Pending)>,
    key_cache: Option<Vec<Key>>,
    finalized: bool,
}

impl<'t> Transaction<'t> {
    pub(crate) fn new(table: &'t mut Table, spec: KeySpecifier) -> Self {
        let base = table.state.clone();
        let snapshot = base.clone();
        Self {
            table,
            spec,
            base,
            snapshot,
            buffer: Vec::new(),
            key_cache: None,
            finalized: false,
        }
    }

    /// Buffer an insert or update. The record is owned by the transaction
    /// from here on, so later caller-side copies cannot leak in.
    pub fn put(&mut self, record: JsonObject) -> Result<()> {
        self.ensure_active()?;
        records::validate_record(&record, &self.spec)?;
        let key = records::extract_key(&record, &self.spec)?;
        check_key_length(&key)?;
        check_record_size(&record)?;

        match self.buffer.iter_mut().find(|(k, _)| *k == key) {
            Some((_, pending)) => *pending = Pending::Put(record.clone()),
            None => self.buffer.push((key.clone(), Pending::Put(record.clone()))),
        }
        self.snapshot.insert(key, record);
        self.key_cache = None;
        Ok(())
    }

    /// Buffer a deletion. Returns whether the key existed in the
    /// transaction's view. Deleting a key that only exists as a buffered
    /// put (absent in the base) cancels the put instead of emitting a
    /// tombstone, so the commit appends nothing for it.
    pub fn delete(&mut self, key: &Key) -> Result<bool> {
        self.ensure_active()?;
        records::ensure_key_matches_specifier(key, &self.spec)?;
        check_key_length(key)?;

        if !self.snapshot.contains_key(key) {
            return Ok(false);
        }
        self.snapshot.remove(key);

        let cancels_buffered_put = !self.base.contains_key(key)
            && self
                .buffer
                .iter()
                .any(|(k, pending)| k == key && matches!(pending, Pending::Put(_)));
        if cancels_buffered_put {
            self.buffer.retain(|(k, _)| k != key);
        } else {
            match self.buffer.iter_mut().find(|(k, _)| *k == *key) {
                Some((_, pending)) => *pending = Pending::Delete,
                None => self.buffer.push((key.clone(), Pending::Delete)),
            }
        }
        self.key_cache = None;
        Ok(true)
    }

    /// Commit the buffered operations: take the file lock, re-read the
    /// file, check every buffered key for conflicts against the snapshot
    /// base, then append the effective lines in one write. The table's
    /// state is refreshed from what the commit observed, on conflict too,
    /// so subsequent table reads see external changes either way.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        let lock = self
            .table
            .fs
            .lock_exclusive(&self.table.path, self.table.lock_timeout)?;
        let result = self.commit_under_lock();
        drop(lock);
        self.finalized = true;
        result
    }

    /// Discard the buffer and snapshot without touching the file.
    pub fn abort(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.buffer.clear();
        self.snapshot.clear();
        self.base.clear();
        self.key_cache = None;
        self.finalized = true;
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn key_specifier(&self) -> &KeySpecifier {
        &self.spec
    }

    fn ensure_active(&self) -> Result<()> {
        if self.finalized {
            return Err(Error::Transaction(
                "transaction has already been committed or aborted".to_owned(),
            ));
        }
        Ok(())
    }

    fn commit_under_lock(&mut self) -> Result<()> {
        let stat = self.table.fs.stat(&self.table.path)?;
        let (header, operations) = match stat {
            None => (None, Vec::new()),
            Some(stat) => {
                if let Some(limit) = self.table.max_file_size
                    && stat.size > limit
                {
                    return Err(Error::Limit(format!(
                        "file size {} exceeds maximum {limit} bytes",
                        stat.size
                    )));
                }
                let bytes = self.table.fs.read_bytes(&self.table.path)?;
                reader::parse_table_bytes(&bytes)?
            }
        };
        let informative = header.is_some() || !operations.is_empty();
        let current = state::compute_logical_state(operations, &self.spec)?;

        let mut conflict = None;
        for (key, _) in &self.buffer {
            let expected = self.base.get(key);
            let actual = current.get(key);
            let unchanged = match (expected, actual) {
                (None, None) => true,
                (Some(a), Some(b)) => json::serialize_object(a) == json::serialize_object(b),
                _ => false,
            };
            if !unchanged {
                conflict = Some(Error::Conflict {
                    key: key.clone(),
                    expected: expected.cloned(),
                    actual: actual.cloned(),
                });
                break;
            }
        }
        if let Some(conflict) = conflict {
            self.table.state = current;
            if informative {
                self.table.header = header;
            }
            self.table.key_cache = None;
            self.table.try_update_signature();
            return Err(conflict);
        }

        let mut lines = Vec::with_capacity(self.buffer.len());
        for (key, pending) in &self.buffer {
            let line = match pending {
                Pending::Put(record) => json::serialize_object(record),
                Pending::Delete => {
                    json::serialize_object(&records::build_tombstone(key, &self.spec)?)
                }
            };
            lines.push(line);
        }
        self.table.fs.append_lines(&self.table.path, &lines)?;

        let mut new_state = current;
        for (key, pending) in &self.buffer {
            match pending {
                Pending::Put(record) => {
                    new_state.insert(key.clone(), record.clone());
                }
                Pending::Delete => {
                    new_state.remove(key);
                }
            }
        }
        self.table.state = new_state;
        if informative {
            self.table.header = header;
        }
        self.table.key_cache = None;
        self.table.try_update_signature();
        Ok(())
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("path", &self.table.path)
            .field("key_spec", &self.spec)
            .field("pending", &self.buffer.len())
            .field(
                "state",
                &if self.finalized { "finalized" } else { "active" },
            )
            .finish()
    }
}

impl TableRead for Transaction<'_> {
    fn read_view(&mut self) -> Result<&BTreeMap<Key, JsonObject>> {
        self.ensure_active()?;
        Ok(&self.snapshot)
    }

    fn sorted_keys(&mut self) -> Result<&[Key]> {
        self.ensure_active()?;
        if self.key_cache.is_none() {
            self.key_cache = Some(self.snapshot.keys().cloned().collect());
        }
        Ok(self.key_cache.as_deref().unwrap_or(&[]))
    }
}
