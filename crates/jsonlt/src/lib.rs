//! # jsonlt
//!
//! An embedded, single-file, append-only record store. The on-disk format
//! is newline-delimited canonical JSON: an optional `$jsonlt` header line,
//! then one record or tombstone per line. The store maps keys (integers,
//! strings, or tuples of both) to JSON objects with durable appends,
//! snapshot-isolated optimistic transactions, and compaction.
//!
//! ## Data model
//!
//! ```text
//! JSONL file (header? + append-only operation log)
//!     ↕  fold / append / atomic replace, under an advisory file lock
//! Table (Key → record, derived state + (mtime, size) signature)
//!     ↕  snapshot / buffered writes / optimistic commit
//! Transaction
//! ```
//!
//! Reads always iterate in the total key order (`Int < Str < Tuple`,
//! numeric / code-point / element-wise within buckets). Writes append the
//! canonical serialization, so byte equality is value equality everywhere:
//! dedup, conflict detection, and the record-size limit all hang off it.
//!
//! ## Example
//!
//! ```no_run
//! use jsonlt::{Table, TableOptions, TableRead};
//! use serde_json::json;
//!
//! # fn main() -> jsonlt::Result<()> {
//! let mut table = Table::open("users.jsonlt", TableOptions::new().key("id"))?;
//! table.put(json!({"id": "alice", "role": "admin"}).as_object().unwrap().clone())?;
//!
//! let mut tx = table.transaction()?;
//! tx.put(json!({"id": "bob", "role": "user"}).as_object().unwrap().clone())?;
//! tx.commit()?;
//! # Ok(())
//! # }
//! ```

pub mod encoding;
pub mod error;
pub mod fs;
pub mod header;
pub mod json;
pub mod keys;
pub mod lock;
pub mod read;
pub mod reader;
pub mod records;
pub mod state;
pub mod table;
pub mod transaction;
pub mod writer;

pub use error::{Error, Result};
pub use fs::{FileLock, FileStat, FileSystem, StdFileSystem};
pub use header::{FORMAT_VERSION, Header, is_header_line, parse_header, serialize_header};
pub use json::{JsonObject, MAX_NESTING_DEPTH, parse_line, serialize_object, serialize_value};
pub use keys::{
    Key, KeyElement, KeySpecifier, MAX_INTEGER_KEY, MAX_KEY_LENGTH, MAX_TUPLE_ELEMENTS,
    MIN_INTEGER_KEY, key_from_json, key_length, serialize_key,
};
pub use read::TableRead;
pub use records::{
    MAX_RECORD_SIZE, TOMBSTONE_FIELD, build_tombstone, extract_key, is_tombstone, record_size,
    validate_record, validate_tombstone,
};
pub use state::compute_logical_state;
pub use table::{DEFAULT_LOCK_TIMEOUT, Table, TableOptions};
pub use transaction::Transaction;
