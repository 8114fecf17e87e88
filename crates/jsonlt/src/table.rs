//! The table: a key-addressed view over one append-only JSONL file.
//!
//! Reads are served from in-memory logical state, re-derived from the file
//! whenever the `(mtime, size)` signature changes (auto-reload). Mutations
//! take the advisory file lock, refresh state under it, write (append or
//! atomic replace), then update state and caches in place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::fs::{FileStat, FileSystem, StdFileSystem};
use crate::header::{self, Header};
use crate::json::{self, JsonObject};
use crate::keys::{self, Key, KeySpecifier, MAX_KEY_LENGTH};
use crate::read::TableRead;
use crate::reader;
use crate::records::{self, MAX_RECORD_SIZE};
use crate::state;
use crate::transaction::Transaction;

/// How long mutations wait for the file lock before failing with
/// [`Error::Lock`]. Contention surfaces rather than hanging; pass
/// `lock_timeout(None)` to wait indefinitely.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for opening a table.
#[derive(Debug, Clone)]
pub struct TableOptions {
    key: Option<KeySpecifier>,
    auto_reload: bool,
    max_file_size: Option<u64>,
    lock_timeout: Option<Duration>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            key: None,
            auto_reload: true,
            max_file_size: None,
            lock_timeout: Some(DEFAULT_LOCK_TIMEOUT),
        }
    }
}

impl TableOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key specifier to use when the file's header does not declare one.
    /// Must agree with the header when both are present.
    pub fn key(mut self, spec: impl Into<KeySpecifier>) -> Self {
        self.key = Some(spec.into());
        self
    }

    /// Re-read the file before each read when its signature changed.
    /// Defaults to on.
    pub fn auto_reload(mut self, enabled: bool) -> Self {
        self.auto_reload = enabled;
        self
    }

    /// Refuse to read files larger than this many bytes.
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    /// How long to wait for the file lock; `None` waits indefinitely.
    /// Defaults to [`DEFAULT_LOCK_TIMEOUT`].
    pub fn lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

/// A single-file record store.
pub struct Table {
    pub(crate) path: PathBuf,
    pub(crate) fs: Arc<dyn FileSystem>,
    pub(crate) auto_reload: bool,
    pub(crate) max_file_size: Option<u64>,
    pub(crate) lock_timeout: Option<Duration>,
    pub(crate) header: Option<Header>,
    pub(crate) key_spec: Option<KeySpecifier>,
    pub(crate) state: BTreeMap<Key, JsonObject>,
    pub(crate) key_cache: Option<Vec<Key>>,
    pub(crate) signature: Option<FileStat>,
}

impl Table {
    /// Open (or initialise) the table at `path` against the real
    /// filesystem.
    pub fn open(path: impl Into<PathBuf>, options: TableOptions) -> Result<Self> {
        Self::open_with_fs(path, options, Arc::new(StdFileSystem))
    }

    /// Open against an injected filesystem.
    pub fn open_with_fs(
        path: impl Into<PathBuf>,
        options: TableOptions,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self> {
        let TableOptions {
            key,
            auto_reload,
            max_file_size,
            lock_timeout,
        } = options;
        let key = match key {
            Some(spec) => {
                let spec = spec.normalize();
                spec.validate()?;
                Some(spec)
            }
            None => None,
        };
        let mut table = Self {
            path: path.into(),
            fs,
            auto_reload,
            max_file_size,
            lock_timeout,
            header: None,
            key_spec: key,
            state: BTreeMap::new(),
            key_cache: None,
            signature: None,
        };
        table.reload()?;
        Ok(table)
    }

    /// Create the file from scratch: validate every record, fold
    /// last-write-wins, write a keyed header plus the live records in key
    /// order, and open the result. Nothing is written when validation
    /// fails.
    pub fn from_records(
        path: impl Into<PathBuf>,
        records: Vec<JsonObject>,
        key: impl Into<KeySpecifier>,
    ) -> Result<Self> {
        Self::from_records_with_fs(path, records, key, Arc::new(StdFileSystem))
    }

    pub fn from_records_with_fs(
        path: impl Into<PathBuf>,
        records: Vec<JsonObject>,
        key: impl Into<KeySpecifier>,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self> {
        let path = path.into();
        let spec = key.into().normalize();
        spec.validate()?;

        for (index, record) in records.iter().enumerate() {
            let context = format!("record at index {index}");
            records::validate_record(record, &spec).map_err(|e| e.with_context(&context))?;
            let key = records::extract_key(record, &spec).map_err(|e| e.with_context(&context))?;
            check_key_length(&key).map_err(|e| e.with_context(&context))?;
            check_record_size(record).map_err(|e| e.with_context(&context))?;
        }

        let mut folded: BTreeMap<Key, JsonObject> = BTreeMap::new();
        for record in records {
            let key = records::extract_key(&record, &spec)?;
            folded.insert(key, record);
        }

        fs.ensure_parent_dir(&path)?;
        let mut lines = Vec::with_capacity(folded.len() + 1);
        lines.push(header::serialize_header(&Header::with_key(spec.clone())));
        lines.extend(folded.values().map(json::serialize_object));
        fs.atomic_replace(&path, &lines)?;

        Self::open_with_fs(path, TableOptions::new().key(spec), fs)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    pub fn key_specifier(&self) -> Option<&KeySpecifier> {
        self.key_spec.as_ref()
    }

    /// Insert or update a record. Appends its canonical serialization and
    /// updates in-memory state.
    pub fn put(&mut self, record: JsonObject) -> Result<()> {
        let spec = self.require_key_specifier()?.clone();
        records::validate_record(&record, &spec)?;
        let key = records::extract_key(&record, &spec)?;
        check_key_length(&key)?;
        let line = json::serialize_object(&record);
        if line.len() > MAX_RECORD_SIZE {
            return Err(Error::Limit(format!(
                "record size {} exceeds maximum {MAX_RECORD_SIZE} bytes",
                line.len()
            )));
        }

        let _lock = self.fs.lock_exclusive(&self.path, self.lock_timeout)?;
        self.refresh_if_changed()?;
        self.fs
            .append_lines(&self.path, std::slice::from_ref(&line))?;
        self.state.insert(key, record);
        self.key_cache = None;
        self.try_update_signature();
        Ok(())
    }

    /// Delete by key. Appends a tombstone only when the key exists; returns
    /// whether it did.
    pub fn delete(&mut self, key: &Key) -> Result<bool> {
        let spec = self.require_key_specifier()?.clone();
        records::ensure_key_matches_specifier(key, &spec)?;
        check_key_length(key)?;

        let _lock = self.fs.lock_exclusive(&self.path, self.lock_timeout)?;
        self.refresh_if_changed()?;
        if !self.state.contains_key(key) {
            return Ok(false);
        }
        let tombstone = records::build_tombstone(key, &spec)?;
        let line = json::serialize_object(&tombstone);
        self.fs
            .append_lines(&self.path, std::slice::from_ref(&line))?;
        self.state.remove(key);
        self.key_cache = None;
        self.try_update_signature();
        Ok(true)
    }

    /// Drop every record, atomically rewriting the file to just the header
    /// line (or empty when there is none).
    pub fn clear(&mut self) -> Result<()> {
        let _lock = self.fs.lock_exclusive(&self.path, self.lock_timeout)?;
        self.refresh_if_changed()?;
        let lines: Vec<String> = match &self.header {
            Some(h) => vec![header::serialize_header(h)],
            None => Vec::new(),
        };
        self.fs.atomic_replace(&self.path, &lines)?;
        self.state.clear();
        self.key_cache = None;
        self.try_update_signature();
        Ok(())
    }

    /// Rewrite the file to the header (if any) followed by every live
    /// record in key order, dropping tombstones and historical versions.
    pub fn compact(&mut self) -> Result<()> {
        let _lock = self.fs.lock_exclusive(&self.path, self.lock_timeout)?;
        self.refresh_if_changed()?;
        let mut lines = Vec::with_capacity(self.state.len() + 1);
        if let Some(h) = &self.header {
            lines.push(header::serialize_header(h));
        }
        lines.extend(self.state.values().map(json::serialize_object));
        self.fs.atomic_replace(&self.path, &lines)?;
        self.key_cache = None;
        self.try_update_signature();
        Ok(())
    }

    /// Unconditionally re-read the file and rebuild state.
    pub fn reload(&mut self) -> Result<()> {
        let stat = self.fs.stat(&self.path)?;
        self.reload_from(stat)
    }

    /// Begin a snapshot-isolated transaction. The transaction mutably
    /// borrows the table, so at most one can be live at a time.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        let spec = self.require_key_specifier()?.clone();
        {
            let _lock = self.fs.lock_exclusive(&self.path, self.lock_timeout)?;
            self.refresh_if_changed()?;
        }
        Ok(Transaction::new(self, spec))
    }

    pub(crate) fn require_key_specifier(&self) -> Result<&KeySpecifier> {
        self.key_spec.as_ref().ok_or_else(|| {
            Error::InvalidKey("key specifier is required for this operation".to_owned())
        })
    }

    /// Reload when the cached `(mtime, size)` signature no longer matches
    /// the file.
    pub(crate) fn refresh_if_changed(&mut self) -> Result<()> {
        let stat = self.fs.stat(&self.path)?;
        if stat != self.signature {
            self.reload_from(stat)?;
        }
        Ok(())
    }

    fn reload_from(&mut self, stat: Option<FileStat>) -> Result<()> {
        let Some(stat) = stat else {
            // file vanished: state empties, header and specifier survive in
            // memory so the next write can recreate the file
            self.state.clear();
            self.key_cache = None;
            self.signature = None;
            return Ok(());
        };
        if let Some(limit) = self.max_file_size
            && stat.size > limit
        {
            return Err(Error::Limit(format!(
                "file size {} exceeds maximum {limit} bytes",
                stat.size
            )));
        }
        let bytes = self.fs.read_bytes(&self.path)?;
        let (header, operations) = reader::parse_table_bytes(&bytes)?;
        self.apply_parsed(header, operations)?;
        self.signature = Some(stat);
        Ok(())
    }

    /// Merge a freshly parsed file into the table, resolving the effective
    /// key specifier: the header's declaration is canonical, the existing
    /// (caller-resolved) specifier must agree with it, and operations
    /// without any specifier are an error.
    fn apply_parsed(
        &mut self,
        header: Option<Header>,
        operations: Vec<JsonObject>,
    ) -> Result<()> {
        let header_key = header
            .as_ref()
            .and_then(|h| h.key.clone())
            .map(KeySpecifier::normalize);
        let effective = match (header_key, self.key_spec.clone()) {
            (Some(from_header), Some(existing)) => {
                if !from_header.matches(&existing) {
                    return Err(Error::InvalidKey(format!(
                        "key specifier mismatch: header declares {from_header}, caller supplied {existing}"
                    )));
                }
                Some(from_header)
            }
            (Some(from_header), None) => Some(from_header),
            (None, existing) => {
                if existing.is_none() && !operations.is_empty() {
                    return Err(Error::InvalidKey(
                        "no key specifier: the file contains operations but neither \
                         the header nor the caller provides one"
                            .to_owned(),
                    ));
                }
                existing
            }
        };
        let informative = header.is_some() || !operations.is_empty();
        let state = match &effective {
            Some(spec) => state::compute_logical_state(operations, spec)?,
            None => BTreeMap::new(),
        };
        // a zero-byte file carries no information; keep the in-memory
        // header so a later clear/compact can write it back, matching the
        // vanished-file rule
        if informative {
            self.header = header;
        }
        self.key_spec = effective;
        self.state = state;
        self.key_cache = None;
        Ok(())
    }

    /// Refresh the cached signature after a durable write, swallowing stat
    /// failures: the bytes are on disk, and a later signature mismatch will
    /// reload anyway.
    pub(crate) fn try_update_signature(&mut self) {
        if let Ok(stat) = self.fs.stat(&self.path) {
            self.signature = stat;
        }
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("path", &self.path)
            .field("key_spec", &self.key_spec)
            .field("records", &self.state.len())
            .finish()
    }
}

impl TableRead for Table {
    fn read_view(&mut self) -> Result<&BTreeMap<Key, JsonObject>> {
        if self.auto_reload {
            self.refresh_if_changed()?;
        }
        Ok(&self.state)
    }

    fn sorted_keys(&mut self) -> Result<&[Key]> {
        if self.auto_reload {
            self.refresh_if_changed()?;
        }
        if self.key_cache.is_none() {
            self.key_cache = Some(self.state.keys().cloned().collect());
        }
        Ok(self.key_cache.as_deref().unwrap_or(&[]))
    }
}

pub(crate) fn check_key_length(key: &Key) -> Result<()> {
    let length = keys::key_length(key);
    if length > MAX_KEY_LENGTH {
        return Err(Error::Limit(format!(
            "key length {length} exceeds maximum {MAX_KEY_LENGTH} bytes"
        )));
    }
    Ok(())
}

pub(crate) fn check_record_size(record: &JsonObject) -> Result<()> {
    let size = records::record_size(record);
    if size > MAX_RECORD_SIZE {
        return Err(Error::Limit(format!(
            "record size {size} exceeds maximum {MAX_RECORD_SIZE} bytes"
        )));
    }
    Ok(())
}
