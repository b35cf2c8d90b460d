//! Call-type normalization: determinant code + complaint.
//!
//! Pages carry the call type as `<code> - <complaint>` (`A - Falls`) or
//! `<code>-<complaint>` (`B-Falls`). The single-letter EMD determinant is
//! always translated to its phonetic name before anything downstream sees
//! it; unmapped codes become [`Determinant::Unknown`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static RE_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*-\s*").unwrap());

// ── Determinant ─────────────────────────────────────────────────────────

/// EMD priority determinant, phonetic form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Determinant {
    Alpha,
    Bravo,
    Charlie,
    Delta,
    Echo,
    Unknown,
}

impl Determinant {
    /// Translate a raw determinant code. Exact, case-sensitive match on the
    /// single letters A–E; everything else is `Unknown`.
    pub fn from_code(code: &str) -> Self {
        match code {
            "A" => Self::Alpha,
            "B" => Self::Bravo,
            "C" => Self::Charlie,
            "D" => Self::Delta,
            "E" => Self::Echo,
            _ => Self::Unknown,
        }
    }

    /// Phonetic name as shown in notifications.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alpha => "Alpha",
            Self::Bravo => "Bravo",
            Self::Charlie => "Charlie",
            Self::Delta => "Delta",
            Self::Echo => "Echo",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for Determinant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── CallType ────────────────────────────────────────────────────────────

/// A normalized call type: resolved determinant plus free-text complaint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallType {
    pub determinant: Determinant,
    pub complaint: String,
}

impl CallType {
    /// Parse a raw call-type string.
    ///
    /// Splits on a hyphen optionally surrounded by whitespace. Exactly two
    /// parts → (code, complaint); any other shape leaves the whole string
    /// as the complaint with no determinant code to resolve.
    pub fn parse(raw: &str) -> Self {
        let parts: Vec<&str> = RE_SEPARATOR.split(raw).collect();
        if parts.len() == 2 {
            Self {
                determinant: Determinant::from_code(parts[0].trim()),
                complaint: parts[1].trim().to_string(),
            }
        } else {
            Self {
                determinant: Determinant::Unknown,
                complaint: raw.trim().to_string(),
            }
        }
    }

    /// Headline form: `Alpha - Falls`.
    pub fn headline(&self) -> String {
        format!("{} - {}", self.determinant, self.complaint)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spaced_hyphen_resolves_determinant() {
        let ct = CallType::parse("A - Falls");
        assert_eq!(ct.determinant, Determinant::Alpha);
        assert_eq!(ct.complaint, "Falls");
    }

    #[test]
    fn tight_hyphen_resolves_determinant() {
        let ct = CallType::parse("B-Falls");
        assert_eq!(ct.determinant, Determinant::Bravo);
        assert_eq!(ct.complaint, "Falls");
    }

    #[test]
    fn all_five_codes_map() {
        for (code, expected) in [
            ("A", Determinant::Alpha),
            ("B", Determinant::Bravo),
            ("C", Determinant::Charlie),
            ("D", Determinant::Delta),
            ("E", Determinant::Echo),
        ] {
            assert_eq!(Determinant::from_code(code), expected);
        }
    }

    #[test]
    fn unmapped_code_becomes_unknown() {
        let ct = CallType::parse("Z - Weird");
        assert_eq!(ct.determinant, Determinant::Unknown);
        assert_eq!(ct.complaint, "Weird");
    }

    #[test]
    fn lowercase_code_is_not_matched() {
        // The mapping is exact and case-sensitive.
        assert_eq!(Determinant::from_code("a"), Determinant::Unknown);
    }

    #[test]
    fn no_separator_keeps_whole_string_as_complaint() {
        let ct = CallType::parse("NoSeparatorHere");
        assert_eq!(ct.determinant, Determinant::Unknown);
        assert_eq!(ct.complaint, "NoSeparatorHere");
    }

    #[test]
    fn multiple_separators_keep_whole_string_as_complaint() {
        // Three parts is not a code/complaint pair.
        let ct = CallType::parse("A - Sick - Person");
        assert_eq!(ct.determinant, Determinant::Unknown);
        assert_eq!(ct.complaint, "A - Sick - Person");
    }

    #[test]
    fn headline_uses_phonetic_name() {
        let ct = CallType::parse("D - Cardiac Arrest");
        assert_eq!(ct.headline(), "Delta - Cardiac Arrest");
    }
}
