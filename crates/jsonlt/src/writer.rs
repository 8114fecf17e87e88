//! Durable append and atomic replacement of the table file.
//!
//! Appends issue a single write call followed by a sync, so a reader either
//! sees the previous length or the whole batch (a torn tail can only appear
//! while the write is in flight, and the strict reader reports it as a
//! parse error the caller may retry). Replacement goes through a sibling
//! temporary file renamed over the target.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Append one line plus trailing LF. Creates the file if missing.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    append_lines(path, std::slice::from_ref(&line.to_owned()))
}

/// Append lines joined by LF with a trailing LF, in one write call,
/// then flush and sync. An empty slice is a no-op.
pub fn append_lines(path: &Path, lines: &[String]) -> Result<()> {
    if lines.is_empty() {
        return Ok(());
    }
    let mut payload = lines.join("\n");
    payload.push('\n');

    let io_result = (|| -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        file.sync_all()
    })();
    io_result.map_err(|e| Error::File(format!("cannot append to file {}: {e}", path.display())))
}

/// Atomically replace the file's contents with the given lines (LF joined,
/// trailing LF; empty input produces an empty file).
///
/// Writes a sibling temporary file, syncs it, renames it over the target,
/// then syncs the parent directory. On any failure the target is untouched
/// and the temporary is best-effort removed.
pub fn atomic_replace(path: &Path, lines: &[String]) -> Result<()> {
    let payload = if lines.is_empty() {
        String::new()
    } else {
        let mut joined = lines.join("\n");
        joined.push('\n');
        joined
    };

    let tmp_path = tmp_write_path(path);
    let write_result = (|| -> io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(payload.as_bytes())?;
        file.sync_all()
    })();
    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(Error::File(format!(
            "cannot write file atomically {}: {e}",
            path.display()
        )));
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(Error::File(format!(
            "cannot write file atomically {}: {e}",
            path.display()
        )));
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        let dir = File::open(parent).map_err(|e| {
            Error::File(format!("cannot sync directory {}: {e}", parent.display()))
        })?;
        dir.sync_all().map_err(|e| {
            Error::File(format!("cannot sync directory {}: {e}", parent.display()))
        })?;
    }

    Ok(())
}

fn tmp_write_path(path: &Path) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(format!(".tmp.{}.{}", std::process::id(), unique));
    PathBuf::from(tmp)
}
