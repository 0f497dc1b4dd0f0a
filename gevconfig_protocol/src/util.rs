//! # Internal utilities
use std::borrow::Cow;

/// Parses a fixed-size, null-padded string field, ignoring all bytes after
/// the first null and trailing whitespace.
///
/// Devices are supposed to send ASCII, but some leak uninitialised memory or
/// vendor-specific encodings into these fields, so invalid UTF-8 is replaced
/// rather than rejected.
pub fn string_from_nul_padded(p: &[u8]) -> String {
    let p = p.split(|c| *c == 0).next().unwrap_or(p);
    let s = String::from_utf8_lossy(p);
    if let Cow::Owned(_) = &s {
        debug!("replaced invalid UTF-8 in string field: {p:02x?}");
    }
    s.trim_end().to_string()
}
