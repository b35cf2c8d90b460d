//! Coordinate normalization for the legacy CAD paging format.
//!
//! The pager encodes coordinates as bare digit strings with an implied
//! decimal point after the second digit (`42729787` → `42.729787`), and the
//! longitude is transmitted unsigned: it is always forced negative on the
//! assumption of a western-hemisphere deployment. This is knowingly lossy
//! and region-specific; it must stay bit-for-bit compatible with the paging
//! format, so do not generalize the 2-digit integer part or the sign fixup.

use serde::{Deserialize, Serialize};

// ── Coordinates ─────────────────────────────────────────────────────────

/// Signed decimal-degree coordinates. Latitude and longitude are always
/// present together; a message either has both or neither.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// `lat,lng` as used in map-link query parameters.
    pub fn query_param(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }

    /// Decode a compact digit pair. Returns `None` unless both strings
    /// decode, so a partial pair never produces half a coordinate.
    pub fn from_compact(lat: &str, lng: &str) -> Option<Self> {
        let latitude = compact_to_degrees(lat)?;
        let longitude = -compact_to_degrees(lng)?;
        Some(Self {
            latitude,
            longitude,
        })
    }
}

/// Reformat one compact digit string into decimal degrees: decimal point
/// inserted after the 2nd digit. Anything other than 3+ ASCII digits is
/// unusable.
fn compact_to_degrees(digits: &str) -> Option<f64> {
    let digits = digits.trim();
    if digits.len() < 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    format!("{}.{}", &digits[..2], &digits[2..]).parse().ok()
}

// ── Tests ───────────────────────────────────────────────────────────────
