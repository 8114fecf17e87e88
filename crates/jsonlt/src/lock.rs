//! Scoped advisory exclusive lock on an open file handle.
//!
//! The lock is a whole-file `flock`-style advisory lock, so it serialises
//! writers across processes that agree to take it, including external tools
//! touching the same table file. Released on drop regardless of outcome.

use std::fs::File;
use std::io;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{Error, Result};

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Holds the exclusive lock for its lifetime.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Acquire an advisory exclusive lock on `file`.
///
/// - `Some(Duration::ZERO)`: one non-blocking attempt; [`Error::Lock`]
///   immediately if the lock is held elsewhere.
/// - `None`: wait indefinitely.
/// - `Some(t)`: poll at a bounded interval until the deadline, then
///   [`Error::Lock`].
pub fn exclusive_lock(file: File, timeout: Option<Duration>) -> Result<LockGuard> {
    match timeout {
        None => {
            file.lock_exclusive()
                .map_err(|e| Error::Lock(format!("could not acquire file lock: {e}")))?;
        }
        Some(limit) if limit.is_zero() => {
            file.try_lock_exclusive().map_err(|e| {
                if is_contended(&e) {
                    Error::Lock("could not acquire file lock: already held".to_owned())
                } else {
                    Error::Lock(format!("could not acquire file lock: {e}"))
                }
            })?;
        }
        Some(limit) => {
            let deadline = Instant::now() + limit;
            loop {
                match file.try_lock_exclusive() {
                    Ok(()) => break,
                    Err(e) if is_contended(&e) => {
                        let now = Instant::now();
                        if now >= deadline {
                            return Err(Error::Lock(format!(
                                "could not acquire file lock within {limit:?}"
                            )));
                        }
                        std::thread::sleep(RETRY_INTERVAL.min(deadline - now));
                    }
                    Err(e) => {
                        return Err(Error::Lock(format!(
                            "could not acquire file lock: {e}"
                        )));
                    }
                }
            }
        }
    }
    Ok(LockGuard { file })
}

fn is_contended(error: &io::Error) -> bool {
    error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
