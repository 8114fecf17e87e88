//! Input byte preparation: BOM handling, newline normalisation, strict UTF-8.
//!
//! Everything the reader consumes passes through [`prepare_input`] first, so
//! parsing downstream only ever sees LF-terminated, validated UTF-8 text.

use std::borrow::Cow;

use crate::error::{Error, Result};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Remove a UTF-8 byte order mark iff it sits at offset 0.
pub fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

/// Map every CR LF pair to LF. Stand-alone CR bytes are preserved.
///
/// Borrows when the input contains no CR LF.
pub fn normalize_crlf(bytes: &[u8]) -> Cow<'_, [u8]> {
    if !bytes.windows(2).any(|pair| pair == b"\r\n") {
        return Cow::Borrowed(bytes);
    }
    let mut normalized = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
            i += 1;
            continue;
        }
        normalized.push(bytes[i]);
        i += 1;
    }
    Cow::Owned(normalized)
}

/// Strict UTF-8 decode.
///
/// `std::str::from_utf8` already rejects overlong encodings, code points in
/// `[U+D800, U+DFFF]`, and truncated sequences; this wrapper classifies the
/// failure so surrogate smuggling is named in the error. Rust strings cannot
/// hold surrogates at all, so this byte boundary is the only place the check
/// can live.
pub fn decode_utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|err| {
        let offset = err.valid_up_to();
        if encoded_surrogate_at(bytes, offset) {
            Error::Parse(format!(
                "invalid UTF-8 at byte {offset}: surrogate code point"
            ))
        } else {
            Error::Parse(format!("invalid UTF-8 at byte {offset}"))
        }
    })
}

/// Whether the bytes at `offset` start a UTF-8-shaped encoding of a
/// surrogate code point (ED A0..BF trailing).
pub fn encoded_surrogate_at(bytes: &[u8], offset: usize) -> bool {
    bytes.get(offset) == Some(&0xED)
        && matches!(bytes.get(offset + 1), Some(b) if (0xA0..=0xBF).contains(b))
}

/// Full input preparation: strip BOM, normalise CR LF, decode strictly.
pub fn prepare_input(bytes: &[u8]) -> Result<String> {
    let stripped = strip_bom(bytes);
    let normalized = normalize_crlf(stripped);
    Ok(decode_utf8(&normalized)?.to_owned())
}
