//! Serial number extraction from source filenames.
//!
//! A serial number is the integer ordering key used for range filtering and
//! the default catalog order. Matchers are tried in priority order and the
//! first one that produces a value wins; a filename nothing matches simply has
//! no serial number.

use regex::Regex;
use std::sync::LazyLock;

static EXPLICIT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)sno[ _]?(\d+)").expect("valid marker regex"));

static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)").expect("valid leading regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// `sno_12`, `sno12`, `SNO 12`
    ExplicitMarker,
    /// `001_file.pdf`
    LeadingNumber,
    /// first purely numeric `_` segment of the stem: `a_123_b.pdf`
    UnderscoreToken,
}

/// Priority order.
pub const MATCHERS: [Matcher; 3] = [
    Matcher::ExplicitMarker,
    Matcher::LeadingNumber,
    Matcher::UnderscoreToken,
];

impl Matcher {
    pub fn name(self) -> &'static str {
        match self {
            Matcher::ExplicitMarker => "explicit_marker",
            Matcher::LeadingNumber => "leading_number",
            Matcher::UnderscoreToken => "underscore_token",
        }
    }

    /// `None` when the pattern is absent or the digits overflow `u64`.
    pub fn try_match(self, filename: &str) -> Option<u64> {
        match self {
            Matcher::ExplicitMarker => capture_number(&EXPLICIT_MARKER, filename),
            Matcher::LeadingNumber => capture_number(&LEADING_NUMBER, filename),
            Matcher::UnderscoreToken => {
                let stem = match filename.rsplit_once('.') {
                    Some((stem, _)) => stem,
                    None => filename,
                };
                let token = stem
                    .split('_')
                    .find(|seg| !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit()))?;
                token.parse().ok()
            }
        }
    }
}

fn capture_number(re: &Regex, filename: &str) -> Option<u64> {
    let caps = re.captures(filename)?;
    caps.get(1)?.as_str().parse().ok()
}

/// Serial number of `filename`, or `None`. Never fails.
pub fn extract(filename: &str) -> Option<u64> {
    extract_with_matcher(filename).map(|(_, n)| n)
}

/// Same as [`extract`] but also reports which matcher fired.
pub fn extract_with_matcher(filename: &str) -> Option<(Matcher, u64)> {
    MATCHERS
        .iter()
        .find_map(|m| m.try_match(filename).map(|n| (*m, n)))
}
