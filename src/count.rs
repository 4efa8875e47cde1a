use std::sync::LazyLock;

use compact_str::CompactString;
use regex::Regex;

#[allow(clippy::unwrap_used)]
static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Count shown when the label is missing or carries no number.
pub const ZERO: &str = "0";

/// Pulls the result count out of a free-text label such as `結果 (共 18 件)`.
///
/// The portal renders the count as the trailing number, and earlier numbers
/// (page info and the like) may precede it, so the **last** digit run wins.
pub fn extract_count(text: Option<&str>) -> CompactString {
    text.and_then(|text| DIGITS.find_iter(text).last())
        .map_or_else(|| CompactString::const_new(ZERO), |m| m.as_str().into())
}
