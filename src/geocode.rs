//! Geocoding adapter: free-text address → coordinates + canonical place.
//!
//! `Geocoder` is the boundary the pipeline consumes. The provided
//! `resolve()` implements the biased-then-fallback lookup: query with the
//! configured regional bias first, and if that yields nothing usable, retry
//! once without the bias. Callers treat an `Err` exactly like `NotFound`;
//! a page is never dropped because enrichment failed.
//!
//! `GoogleGeocoder` speaks the Maps Geocoding JSON API over ureq (sync
//! HTTP, request timeout on the agent). `MockGeocoder` scripts outcomes and
//! records lookups for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GeocodeError, GeocodeResult};

/// Default Maps Geocoding endpoint.
const GOOGLE_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

// ── GeocodeBias ─────────────────────────────────────────────────────────

/// Regional bias filter: prefer results in a locality/region/country
/// without strictly excluding others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeocodeBias {
    pub locality: String,
    pub administrative_area: String,
    pub country: String,
}

impl GeocodeBias {
    /// The `components` filter string for the Maps API.
    pub fn components(&self) -> String {
        format!(
            "locality:{}|administrative_area:{}|country:{}",
            self.locality, self.administrative_area, self.country
        )
    }
}

impl Default for GeocodeBias {
    fn default() -> Self {
        Self {
            locality: "Troy".to_string(),
            administrative_area: "NY".to_string(),
            country: "US".to_string(),
        }
    }
}

// ── Outcome ─────────────────────────────────────────────────────────────

/// A successfully geocoded address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodedPlace {
    pub latitude: f64,
    pub longitude: f64,
    /// Canonical formatted address from the geocoder.
    pub formatted: String,
}

/// What a lookup produced. "No result" is an ordinary outcome, not an
/// error; errors are reserved for transport/parse failures.
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeOutcome {
    Found(GeocodedPlace),
    NotFound,
}

// ── Geocoder trait ──────────────────────────────────────────────────────

/// Address-resolution boundary consumed by the pipeline.
pub trait Geocoder: Send + Sync {
    /// A single lookup, optionally constrained by a regional bias.
    fn lookup(
        &self,
        address: &str,
        bias: Option<&GeocodeBias>,
    ) -> GeocodeResult<GeocodeOutcome>;

    /// Biased-then-fallback resolution: if the biased lookup finds nothing
    /// and a bias was in play, retry once unbiased.
    fn resolve(
        &self,
        address: &str,
        bias: Option<&GeocodeBias>,
    ) -> GeocodeResult<GeocodeOutcome> {
        match self.lookup(address, bias)? {
            GeocodeOutcome::Found(place) => Ok(GeocodeOutcome::Found(place)),
            GeocodeOutcome::NotFound if bias.is_some() => self.lookup(address, None),
            GeocodeOutcome::NotFound => Ok(GeocodeOutcome::NotFound),
        }
    }
}

// ── Google response model ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResultEntry>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResultEntry {
    geometry: Geometry,
    formatted_address: String,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

/// Best-match extraction: status must be OK and at least one result
/// present; everything else (ZERO_RESULTS, REQUEST_DENIED, ...) is simply
/// no result, and the caller falls back or proceeds without coordinates.
fn outcome_from(response: GeocodeResponse) -> GeocodeOutcome {
    if response.status != "OK" {
        return GeocodeOutcome::NotFound;
    }
    match response.results.into_iter().next() {
        Some(entry) => GeocodeOutcome::Found(GeocodedPlace {
            latitude: entry.geometry.location.lat,
            longitude: entry.geometry.location.lng,
            formatted: entry.formatted_address,
        }),
        None => GeocodeOutcome::NotFound,
    }
}

// ── GoogleGeocoder ──────────────────────────────────────────────────────

/// Maps Geocoding API client.
pub struct GoogleGeocoder {
    agent: ureq::Agent,
    api_key: String,
    endpoint: String,
}

impl GoogleGeocoder {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(timeout)
                .build(),
            api_key: api_key.into(),
            endpoint: GOOGLE_GEOCODE_URL.to_string(),
        }
    }

    /// Point the client at a different endpoint (tests, proxies).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Geocoder for GoogleGeocoder {
    fn lookup(
        &self,
        address: &str,
        bias: Option<&GeocodeBias>,
    ) -> GeocodeResult<GeocodeOutcome> {
        if self.api_key.is_empty() {
            return Err(GeocodeError::MissingKey);
        }

        let mut request = self
            .agent
            .get(&self.endpoint)
            .query("address", address)
            .query("key", &self.api_key);
        if let Some(bias) = bias {
            request = request.query("components", &bias.components());
        }

        let response = request.call().map_err(|e| GeocodeError::Transport {
            message: e.to_string(),
        })?;

        let parsed: GeocodeResponse =
            response.into_json().map_err(|e| GeocodeError::Response {
                message: e.to_string(),
            })?;

        Ok(outcome_from(parsed))
    }
}

// ── DisabledGeocoder ────────────────────────────────────────────────────

/// Stand-in used when no API key is configured: every lookup is a clean
/// `NotFound`, so messages flow through without map links and without
/// per-message error noise.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGeocoder;

impl Geocoder for DisabledGeocoder {
    fn lookup(
        &self,
        _address: &str,
        _bias: Option<&GeocodeBias>,
    ) -> GeocodeResult<GeocodeOutcome> {
        Ok(GeocodeOutcome::NotFound)
    }
}

// ── MockGeocoder ────────────────────────────────────────────────────────

/// One recorded call against a [`MockGeocoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedLookup {
    pub address: String,
    pub biased: bool,
}

/// Scripted geocoder for tests: pops pre-loaded outcomes in order and
/// records every lookup. An exhausted script answers `NotFound`.
#[derive(Debug, Default)]
pub struct MockGeocoder {
    script: Mutex<VecDeque<GeocodeResult<GeocodeOutcome>>>,
    calls: Mutex<Vec<RecordedLookup>>,
}

impl MockGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_found(&self, latitude: f64, longitude: f64, formatted: &str) {
        self.push(Ok(GeocodeOutcome::Found(GeocodedPlace {
            latitude,
            longitude,
            formatted: formatted.to_string(),
        })));
    }

    pub fn push_not_found(&self) {
        self.push(Ok(GeocodeOutcome::NotFound));
    }

    pub fn push_error(&self, message: &str) {
        self.push(Err(GeocodeError::Transport {
            message: message.to_string(),
        }));
    }

    fn push(&self, outcome: GeocodeResult<GeocodeOutcome>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// Every lookup made so far, in order.
    pub fn calls(&self) -> Vec<RecordedLookup> {
        self.calls.lock().unwrap().clone()
    }
}

impl Geocoder for MockGeocoder {
    fn lookup(
        &self,
        address: &str,
        bias: Option<&GeocodeBias>,
    ) -> GeocodeResult<GeocodeOutcome> {
        self.calls.lock().unwrap().push(RecordedLookup {
            address: address.to_string(),
            biased: bias.is_some(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(GeocodeOutcome::NotFound))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bias_components_string() {
        let bias = GeocodeBias::default();
        assert_eq!(
            bias.components(),
            "locality:Troy|administrative_area:NY|country:US"
        );
    }

    #[test]
    fn outcome_from_ok_response_takes_first_result() {
        let json = r#"{
            "status": "OK",
            "results": [
                {
                    "geometry": {"location": {"lat": 42.7298, "lng": -73.6789}},
                    "formatted_address": "51 College Ave, Troy, NY 12180, USA"
                },
                {
                    "geometry": {"location": {"lat": 0.0, "lng": 0.0}},
                    "formatted_address": "elsewhere"
                }
            ]
        }"#;
        let response: GeocodeResponse = serde_json::from_str(json).unwrap();
        match outcome_from(response) {
            GeocodeOutcome::Found(place) => {
                assert_eq!(place.latitude, 42.7298);
                assert_eq!(place.longitude, -73.6789);
                assert!(place.formatted.starts_with("51 College Ave"));
            }
            GeocodeOutcome::NotFound => panic!("expected a match"),
        }
    }

    #[test]
    fn outcome_from_zero_results_is_not_found() {
        let json = r#"{"status": "ZERO_RESULTS", "results": []}"#;
        let response: GeocodeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(outcome_from(response), GeocodeOutcome::NotFound);
    }

    #[test]
    fn outcome_from_ok_but_empty_results_is_not_found() {
        let json = r#"{"status": "OK", "results": []}"#;
        let response: GeocodeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(outcome_from(response), GeocodeOutcome::NotFound);
    }

    #[test]
    fn resolve_falls_back_to_unbiased_lookup() {
        let mock = MockGeocoder::new();
        mock.push_not_found();
        mock.push_found(42.73, -73.68, "1649 15th St, Troy, NY, USA");

        let bias = GeocodeBias::default();
        let outcome = mock.resolve("1649 15th Street", Some(&bias)).unwrap();

        match outcome {
            GeocodeOutcome::Found(place) => {
                assert_eq!(place.formatted, "1649 15th St, Troy, NY, USA");
                assert_eq!(place.latitude, 42.73);
            }
            GeocodeOutcome::NotFound => panic!("fallback result expected"),
        }

        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].biased);
        assert!(!calls[1].biased);
        assert_eq!(calls[0].address, calls[1].address);
    }

    #[test]
    fn resolve_biased_hit_short_circuits() {
        let mock = MockGeocoder::new();
        mock.push_found(42.73, -73.68, "somewhere in Troy");

        let bias = GeocodeBias::default();
        let outcome = mock.resolve("51 College Ave", Some(&bias)).unwrap();

        assert!(matches!(outcome, GeocodeOutcome::Found(_)));
        assert_eq!(mock.calls().len(), 1);
    }

    #[test]
    fn resolve_without_bias_does_not_retry() {
        let mock = MockGeocoder::new();
        mock.push_not_found();

        let outcome = mock.resolve("nowhere", None).unwrap();
        assert_eq!(outcome, GeocodeOutcome::NotFound);
        assert_eq!(mock.calls().len(), 1);
    }

    #[test]
    fn resolve_propagates_lookup_errors() {
        let mock = MockGeocoder::new();
        mock.push_error("connection refused");

        let err = mock.resolve("51 College Ave", None).unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn google_geocoder_without_key_reports_missing_key() {
        let geocoder = GoogleGeocoder::new("", Duration::from_secs(5));
        let err = geocoder.lookup("51 College Ave", None).unwrap_err();
        assert!(matches!(err, GeocodeError::MissingKey));
    }

    #[test]
    fn disabled_geocoder_always_answers_not_found() {
        let outcome = DisabledGeocoder
            .resolve("51 College Ave", Some(&GeocodeBias::default()))
            .unwrap();
        assert_eq!(outcome, GeocodeOutcome::NotFound);
    }

    #[test]
    fn exhausted_mock_answers_not_found() {
        let mock = MockGeocoder::new();
        assert_eq!(mock.lookup("x", None).unwrap(), GeocodeOutcome::NotFound);
    }
}
