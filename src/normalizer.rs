//! Text normalization
//!
//! Site descriptors in the exported records look like
//! `"BR 21-0001 - JARDIM SÃO JOSÉ - SP"`. The locality key is the accent-free
//! middle segment (`"JARDIM SAO JOSE"`).

use crate::error::ReportError;
use unicode_normalization::UnicodeNormalization;
use unicode_properties::{GeneralCategory, UnicodeGeneralCategory};

/// Delimiter between the segments of a composite site descriptor
pub const SEGMENT_DELIMITER: &str = " - ";

/// Normalizer for turning site descriptors into locality keys
pub struct Normalizer;

impl Normalizer {
    /// Derive the canonical locality key from a raw site field
    pub fn locality_key(site: &str) -> String {
        extract_locality_key(&remove_diacritics(site)).to_string()
    }
}

/// Strip diacritics: canonical decomposition, drop non-spacing marks, recompose.
pub fn remove_diacritics(input: &str) -> String {
    input
        .nfd()
        .filter(|c| !is_nonspacing_mark(*c))
        .nfc()
        .collect()
}

/// Return the second `" - "` segment, or the whole input when there is none.
///
/// No trimming is applied beyond what the split implies.
pub fn extract_locality_key(input: &str) -> &str {
    input.split(SEGMENT_DELIMITER).nth(1).unwrap_or(input)
}

/// Check that a locality key can name a single file or directory
///
/// Rejects empty keys, `.` and `..`, and keys containing a path separator
/// or NUL.
pub fn file_stem(key: &str) -> Result<&str, ReportError> {
    let unusable = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0']);
    if unusable {
        return Err(ReportError::InvalidLocality);
    }
    Ok(key)
}

fn is_nonspacing_mark(c: char) -> bool {
    c.general_category() == GeneralCategory::NonspacingMark
}
