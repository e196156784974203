//! Source text decoding for historical files
//!
//! Old Java sources are frequently stored in legacy Japanese encodings.
//! Decoding tries a fixed priority list strictly (no replacement characters)
//! and only falls back to lossy UTF-8 when every candidate rejects the bytes.

use encoding_rs::{Encoding, EUC_JP, ISO_2022_JP, SHIFT_JIS, UTF_8};

/// Encodings attempted in order
pub const ENCODING_PRIORITY: [&Encoding; 4] = [UTF_8, SHIFT_JIS, EUC_JP, ISO_2022_JP];

/// Decode raw file bytes into text.
///
/// Returns the text together with the name of the encoding that accepted it
/// (`"lossy-utf-8"` for the fallback).
pub fn decode_source(bytes: &[u8]) -> (String, &'static str) {
    for encoding in ENCODING_PRIORITY {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return (strip_bom(text.into_owned()), encoding.name());
        }
    }

    (
        strip_bom(String::from_utf8_lossy(bytes).into_owned()),
        "lossy-utf-8",
    )
}

fn strip_bom(text: String) -> String {
    match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}
