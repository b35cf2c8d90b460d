//! The relay pipeline: body text in, notifications out.
//!
//! Degrade-gracefully policy: a body that matches no dispatch marker, or
//! one that matches but fails extraction, is forwarded verbatim instead
//! of being dropped; geocoding failures just omit map links; sink failures
//! are logged and the message is done. Nothing here is fatal to the
//! listener.

use std::sync::Arc;

use crate::config::RelayConfig;
use crate::extract::{self, FieldMap};
use crate::geocode::Geocoder;
use crate::notify::{NotificationPayload, format_dispatch, format_passthrough};
use crate::record::DispatchRecord;
use crate::sink::{SlackSink, WebhookSink};

// ── Notification ────────────────────────────────────────────────────────

/// The outcome of processing one body.
#[derive(Debug, Clone)]
pub enum Notification {
    /// A parsed dispatch page: structured payload plus the record the
    /// webhook sink forwards.
    Dispatch {
        record: Box<DispatchRecord>,
        payload: NotificationPayload,
    },
    /// Anything else: forwarded verbatim.
    PassThrough { payload: NotificationPayload },
}

impl Notification {
    pub fn payload(&self) -> &NotificationPayload {
        match self {
            Self::Dispatch { payload, .. } => payload,
            Self::PassThrough { payload } => payload,
        }
    }
}

// ── Relay ───────────────────────────────────────────────────────────────

/// One configured relay instance. Cheap to clone; every message thread
/// gets its own handle onto the shared config, geocoder, and HTTP agents.
#[derive(Clone)]
pub struct Relay {
    config: Arc<RelayConfig>,
    geocoder: Arc<dyn Geocoder>,
    slack: SlackSink,
    webhook: Option<WebhookSink>,
}

impl Relay {
    pub fn new(config: Arc<RelayConfig>, geocoder: Arc<dyn Geocoder>) -> Self {
        let timeout = config.http_timeout();
        let slack = SlackSink::new(&config.slack_token, &config.slack_channel, timeout);
        let webhook = config.webhook_url.as_ref().map(|url| {
            WebhookSink::new(
                url,
                config.webhook_token.clone().unwrap_or_default(),
                timeout,
            )
        });
        Self {
            config,
            geocoder,
            slack,
            webhook,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Run the parse/normalize/enrich/format pipeline for one body.
    ///
    /// Never fails: anything unparseable becomes a pass-through notice.
    pub fn process(&self, body: &str) -> Notification {
        let Some(mode) =
            extract::recognize(body, &self.config.markers, self.config.format)
        else {
            tracing::info!("body matches no dispatch marker, forwarding verbatim");
            return Notification::PassThrough {
                payload: format_passthrough(body),
            };
        };

        let fields = match extract::extract(body, mode, &self.config.fixed_labels) {
            Ok(fields) if !fields.is_empty() => fields,
            Ok(_) => {
                tracing::info!(%mode, "marker matched but nothing extracted, forwarding verbatim");
                return Notification::PassThrough {
                    payload: format_passthrough(body),
                };
            }
            Err(e) => {
                tracing::warn!(%mode, error = %e, "extraction failed, forwarding verbatim");
                return Notification::PassThrough {
                    payload: format_passthrough(body),
                };
            }
        };

        self.dispatch_from(fields, mode)
    }

    fn dispatch_from(&self, fields: FieldMap, mode: extract::FormatMode) -> Notification {
        let mut record = DispatchRecord::from_fields(fields, mode);
        record.enrich(self.geocoder.as_ref(), self.config.bias.as_ref());
        let payload = format_dispatch(&record);
        Notification::Dispatch {
            record: Box::new(record),
            payload,
        }
    }

    /// Process one body and deliver the result to the sinks.
    pub fn handle(&self, body: &str) {
        let notification = self.process(body);

        match self.slack.post(notification.payload()) {
            Ok(()) => tracing::info!(text = %notification.payload().text, "posted to Slack"),
            Err(e) => tracing::error!(error = %e, "Slack delivery failed"),
        }

        if let (Notification::Dispatch { record, .. }, Some(webhook)) =
            (&notification, &self.webhook)
        {
            match webhook.post(record) {
                Ok(()) => tracing::info!("dispatched to webhook"),
                Err(e) => tracing::error!(error = %e, "webhook delivery failed"),
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calltype::Determinant;
    use crate::extract::FormatMode;
    use crate::geocode::MockGeocoder;

    const LABELED_BODY: &str = "Call Type: A - Falls\n\
Location: 51 COLLEGE AVE, TROY CITY\n\
Business: RPI - Darrin Communications Center (DCC)";

    const FIXED_BODY: &str = "PAGE SENT TO RE59 INCIDENT 22-184838 CALL TYPE \
B-Falls ADDRESS 1649 15th Street APT / FLR LOCATION  RPI - Russel Sage \
Dining Hall (RPI) CROSS STREETS  Bouton Road/Sage Avenue EMD CODE 17B04 \
LATITUDE 42729787 LONGITUDE 73678242";

    fn test_config() -> Arc<RelayConfig> {
        Arc::new(RelayConfig {
            recipient: "tmd@herald.example.org".to_string(),
            slack_token: "xoxb-test".to_string(),
            slack_channel: "C0123".to_string(),
            ..RelayConfig::default()
        })
    }

    fn relay_with(mock: MockGeocoder) -> Relay {
        Relay::new(test_config(), Arc::new(mock))
    }

    #[test]
    fn labeled_body_becomes_dispatch_notification() {
        let mock = MockGeocoder::new();
        mock.push_found(42.7298, -73.6789, "51 College Ave, Troy, NY 12180, USA");
        let relay = relay_with(mock);

        match relay.process(LABELED_BODY) {
            Notification::Dispatch { record, payload } => {
                assert_eq!(payload.text, "alpha falls at 51 COLLEGE AVE, TROY CITY");
                assert_eq!(record.variant, FormatMode::LabeledLines);
                assert!(record.coordinates.is_some());
            }
            Notification::PassThrough { .. } => panic!("expected dispatch"),
        }
    }

    #[test]
    fn fixed_body_skips_geocoding_entirely() {
        let mock = MockGeocoder::new();
        let relay = relay_with(mock);

        match relay.process(FIXED_BODY) {
            Notification::Dispatch { record, .. } => {
                assert_eq!(record.variant, FormatMode::FixedFields);
                let coords = record.coordinates.unwrap();
                assert_eq!(coords.latitude, 42.729787);
                assert_eq!(coords.longitude, -73.678242);
            }
            Notification::PassThrough { .. } => panic!("expected dispatch"),
        }
    }

    #[test]
    fn unmarked_body_passes_through_verbatim() {
        let relay = relay_with(MockGeocoder::new());
        let body = "Scheduled maintenance on the paging system tonight.";

        match relay.process(body) {
            Notification::PassThrough { payload } => {
                assert_eq!(payload.text, body);
                assert!(payload.blocks.is_empty());
            }
            Notification::Dispatch { .. } => panic!("expected pass-through"),
        }
    }

    #[test]
    fn field_count_mismatch_degrades_to_passthrough() {
        let relay = relay_with(MockGeocoder::new());
        // Marker matches, but the page is truncated mid-field-list.
        let body = "PAGE SENT TO RE59 INCIDENT 22-184838";

        match relay.process(body) {
            Notification::PassThrough { payload } => {
                assert_eq!(payload.text, body);
            }
            Notification::Dispatch { .. } => panic!("expected pass-through"),
        }
    }

    #[test]
    fn geocode_failure_still_produces_dispatch() {
        let mock = MockGeocoder::new();
        mock.push_error("timeout");
        let relay = relay_with(mock);

        match relay.process(LABELED_BODY) {
            Notification::Dispatch { record, payload } => {
                assert!(record.coordinates.is_none());
                // No actions block without coordinates.
                assert_eq!(payload.blocks.len(), 5);
            }
            Notification::PassThrough { .. } => panic!("expected dispatch"),
        }
    }

    #[test]
    fn determinant_is_always_resolved_before_formatting() {
        let relay = relay_with(MockGeocoder::new());
        match relay.process("Call Type: Q - Mystery\nLocation: somewhere") {
            Notification::Dispatch { record, .. } => {
                assert_eq!(record.call_type.determinant, Determinant::Unknown);
            }
            Notification::PassThrough { .. } => panic!("expected dispatch"),
        }
    }

    #[test]
    fn pinned_format_ignores_other_variant() {
        let config = Arc::new(RelayConfig {
            format: Some(FormatMode::FixedFields),
            ..(*test_config()).clone()
        });
        let relay = Relay::new(config, Arc::new(MockGeocoder::new()));

        // A labeled body is not recognized when fixed is pinned.
        match relay.process(LABELED_BODY) {
            Notification::PassThrough { .. } => {}
            Notification::Dispatch { .. } => panic!("expected pass-through"),
        }
    }
}
