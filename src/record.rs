//! `DispatchRecord`: the normalized view of one inbound page.
//!
//! Built fresh per message from the extracted [`FieldMap`], optionally
//! enriched with coordinates, handed to the formatter and the webhook sink,
//! then discarded. Never persisted.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::calltype::CallType;
use crate::coords::Coordinates;
use crate::extract::{FieldMap, FormatMode};
use crate::geocode::{GeocodeBias, GeocodeOutcome, Geocoder};

/// Agency prefix stripped from the business field ("RPI - Darrin..." →
/// "Darrin...").
static RE_BUSINESS_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*RPI\s*-\s*").unwrap());

// ── DispatchRecord ──────────────────────────────────────────────────────

/// One normalized dispatch page.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchRecord {
    /// Which page layout this record came from.
    pub variant: FormatMode,
    /// Normalized call type (determinant always resolved).
    pub call_type: CallType,
    /// Street address of the incident.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Business/building name, agency prefix stripped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business: Option<String>,
    /// Apartment/floor/room detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cross_streets: Option<String>,
    /// Units the page went out to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    /// CAD incident / run number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emd_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_areas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    /// Canonical place string from the geocoder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geocoded_place: Option<String>,
    /// Raw extracted fields, document order, for downstream consumers.
    pub fields: FieldMap,
}

impl DispatchRecord {
    /// Assemble a record from extracted fields.
    ///
    /// Field roles differ between the two layouts: the labeled variant's
    /// `Location` is the street address and `Business` the building, while
    /// the fixed CAD variant uses `ADDRESS` for the street address and
    /// `LOCATION` for the building. Compact-digit coordinates are decoded
    /// here; geocoding happens later in [`DispatchRecord::enrich`].
    pub fn from_fields(fields: FieldMap, variant: FormatMode) -> Self {
        let (location, business, additional_info, cross_streets, units) = match variant {
            FormatMode::LabeledLines => (
                owned(fields.first_nonempty(&["Location"])),
                owned(fields.first_nonempty(&["Business"])),
                owned(fields.first_nonempty(&["Additional Location Info"])),
                owned(fields.first_nonempty(&["Cross Street", "Cross Streets"])),
                owned(fields.first_nonempty(&["Dispatched Units"])),
            ),
            FormatMode::FixedFields => (
                owned(fields.first_nonempty(&["ADDRESS"])),
                owned(fields.first_nonempty(&["LOCATION"])),
                owned(fields.first_nonempty(&["APT / FLR"])),
                owned(fields.first_nonempty(&["CROSS STREETS"])),
                owned(fields.first_nonempty(&["PAGE SENT TO"])),
            ),
        };

        let call_type = fields
            .first_nonempty(&["Call Type", "CALL TYPE"])
            .map(CallType::parse)
            .unwrap_or_else(|| CallType {
                determinant: crate::calltype::Determinant::Unknown,
                complaint: "Unknown".to_string(),
            });

        let coordinates = match (fields.get("LATITUDE"), fields.get("LONGITUDE")) {
            (Some(lat), Some(lng)) => Coordinates::from_compact(lat, lng),
            _ => None,
        };

        Self {
            variant,
            call_type,
            location,
            business: business.map(|b| normalize_business(&b)),
            additional_info,
            cross_streets,
            units,
            incident: owned(fields.first_nonempty(&["INCIDENT"])),
            emd_code: owned(fields.first_nonempty(&["EMD CODE"])),
            response_areas: owned(fields.first_nonempty(&["Response Areas"])),
            coordinates,
            geocoded_place: None,
            fields,
        }
    }

    /// Resolve coordinates for records that arrived without them, via the
    /// biased-then-fallback geocoder. Failure of any kind leaves the record
    /// unenriched; the notification simply omits map links.
    pub fn enrich(&mut self, geocoder: &dyn Geocoder, bias: Option<&GeocodeBias>) {
        if self.coordinates.is_some() {
            return;
        }
        let Some(address) = self.location.clone() else {
            return;
        };

        match geocoder.resolve(&address, bias) {
            Ok(GeocodeOutcome::Found(place)) => {
                self.coordinates = Some(Coordinates::new(place.latitude, place.longitude));
                self.geocoded_place = Some(place.formatted);
            }
            Ok(GeocodeOutcome::NotFound) => {
                tracing::info!(address = %address, "no geocoding result, continuing without coordinates");
            }
            Err(e) => {
                tracing::warn!(address = %address, error = %e, "geocoding failed, continuing without coordinates");
            }
        }
    }
}

/// Strip the agency prefix from a business string.
fn normalize_business(raw: &str) -> String {
    RE_BUSINESS_PREFIX.replace(raw, "").trim().to_string()
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

// ── Tests ───────────────────────────────────────────────────────────────
