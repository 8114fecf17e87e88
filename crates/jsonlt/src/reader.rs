//! File bytes → (header, operation log).
//!
//! One JSON object per LF-terminated line. Blank lines are tolerated on
//! input (never emitted), a missing trailing LF is tolerated, and a header
//! is recognised only on the first non-empty line.

use std::path::Path;

use crate::encoding;
use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::header::{self, Header};
use crate::json::{self, JsonObject};

/// Parse raw file bytes into the optional header and the operation list in
/// file order. Operations are not validated here; the state fold does that
/// once the key specifier is known.
pub fn parse_table_bytes(bytes: &[u8]) -> Result<(Option<Header>, Vec<JsonObject>)> {
    let text = encoding::prepare_input(bytes)?;
    parse_table_text(&text)
}

/// Parse prepared text (LF line endings, validated UTF-8).
pub fn parse_table_text(text: &str) -> Result<(Option<Header>, Vec<JsonObject>)> {
    let mut header = None;
    let mut operations = Vec::new();
    let mut seen_content = false;

    for (index, line) in text.split('\n').enumerate() {
        if line.is_empty() {
            continue;
        }
        let line_no = index + 1;
        let object =
            json::parse_line(line).map_err(|e| e.with_context(&format!("line {line_no}")))?;
        if header::is_header_line(&object) {
            if seen_content {
                return Err(Error::Parse(format!(
                    "line {line_no}: header must be on first line"
                )));
            }
            header = Some(
                header::parse_header(&object)
                    .map_err(|e| e.with_context(&format!("line {line_no}")))?,
            );
        } else {
            operations.push(object);
        }
        seen_content = true;
    }

    Ok((header, operations))
}

/// Stat and read the table file, enforcing the optional size cap before the
/// bytes are pulled in.
pub fn read_table_file(
    fs: &dyn FileSystem,
    path: &Path,
    max_file_size: Option<u64>,
) -> Result<(Option<Header>, Vec<JsonObject>)> {
    let stat = fs.stat(path)?.ok_or_else(|| {
        Error::File(format!("cannot read file {}: not found", path.display()))
    })?;
    if let Some(limit) = max_file_size
        && stat.size > limit
    {
        return Err(Error::Limit(format!(
            "file size {} exceeds maximum {limit} bytes",
            stat.size
        )));
    }
    let bytes = fs.read_bytes(path)?;
    parse_table_bytes(&bytes)
}
