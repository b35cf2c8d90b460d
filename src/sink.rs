//! Outbound delivery: the Slack channel post and the optional downstream
//! webhook.
//!
//! Both sinks share the fire-and-forget policy: a failed delivery is
//! logged by the caller and dropped, never retried, never fatal to the
//! listener. All calls go through a ureq agent with a request timeout so a
//! stuck endpoint cannot wedge a message thread indefinitely.

use std::time::Duration;

use serde_json::json;

use crate::error::{SinkError, SinkResult};
use crate::notify::NotificationPayload;
use crate::record::DispatchRecord;

const SLACK_POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

// ── SlackSink ───────────────────────────────────────────────────────────

/// Posts notifications to a Slack channel via `chat.postMessage`.
#[derive(Clone)]
pub struct SlackSink {
    agent: ureq::Agent,
    token: String,
    channel: String,
    endpoint: String,
}

impl SlackSink {
    pub fn new(token: impl Into<String>, channel: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            token: token.into(),
            channel: channel.into(),
            endpoint: SLACK_POST_MESSAGE_URL.to_string(),
        }
    }

    /// Point the sink at a different endpoint (tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// The `chat.postMessage` request body.
    fn message_body(&self, payload: &NotificationPayload) -> serde_json::Value {
        json!({
            "channel": self.channel,
            "text": payload.text,
            "blocks": payload.blocks,
            "unfurl_links": false,
        })
    }

    /// Deliver one notification. Slack answers HTTP 200 even for refused
    /// posts, so the body's `ok` flag is the real verdict.
    pub fn post(&self, payload: &NotificationPayload) -> SinkResult<()> {
        let response = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.token))
            .send_json(self.message_body(payload))
            .map_err(|e| SinkError::Transport {
                sink: "slack",
                message: e.to_string(),
            })?;

        let body: serde_json::Value =
            response.into_json().map_err(|e| SinkError::Api {
                sink: "slack",
                message: format!("unreadable response: {e}"),
            })?;

        if body["ok"] == true {
            Ok(())
        } else {
            Err(SinkError::Api {
                sink: "slack",
                message: body["error"]
                    .as_str()
                    .unwrap_or("unknown error")
                    .to_string(),
            })
        }
    }
}

// ── WebhookSink ─────────────────────────────────────────────────────────

/// POSTs the enriched record as JSON to a downstream consumer.
#[derive(Clone)]
pub struct WebhookSink {
    agent: ureq::Agent,
    endpoint: String,
    token: String,
}

impl WebhookSink {
    pub fn new(
        base_url: impl AsRef<str>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            endpoint: dispatch_endpoint(base_url.as_ref()),
            token: token.into(),
        }
    }

    /// Deliver one record. Any non-2xx answer is a delivery failure.
    pub fn post(&self, record: &DispatchRecord) -> SinkResult<()> {
        self.agent
            .post(&self.endpoint)
            .query("token", &self.token)
            .send_json(record)
            .map_err(|e| SinkError::Transport {
                sink: "webhook",
                message: e.to_string(),
            })?;
        Ok(())
    }
}

/// `<base>/dispatch`, tolerant of a trailing slash on the base URL.
fn dispatch_endpoint(base_url: &str) -> String {
    format!("{}/dispatch", base_url.trim_end_matches('/'))
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::format_passthrough;

    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;

    /// One-shot HTTP responder: accepts a single connection, reads the
    /// request, answers with the given JSON body, and returns the request
    /// head + body it saw.
    fn one_shot_server(body: &'static str) -> (String, std::thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(rest) = line
                    .to_ascii_lowercase()
                    .strip_prefix("content-length:")
                    .map(str::trim)
                    .map(str::to_string)
                {
                    content_length = rest.parse().unwrap();
                }
                let done = line == "\r\n" || line == "\n";
                request.push_str(&line);
                if done {
                    break;
                }
            }
            let mut payload = vec![0u8; content_length];
            reader.read_exact(&mut payload).unwrap();
            request.push_str(&String::from_utf8_lossy(&payload));

            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            )
            .unwrap();
            stream.flush().unwrap();
            request
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn slack_body_carries_channel_text_blocks_and_no_unfurl() {
        let sink = SlackSink::new("xoxb-test", "C0123", Duration::from_secs(5));
        let body = sink.message_body(&format_passthrough("hello"));
        assert_eq!(body["channel"], "C0123");
        assert_eq!(body["text"], "hello");
        assert_eq!(body["unfurl_links"], false);
        assert!(body["blocks"].as_array().unwrap().is_empty());
    }

    #[test]
    fn slack_post_succeeds_on_ok_true() {
        let (url, server) = one_shot_server(r#"{"ok":true}"#);
        let sink =
            SlackSink::new("xoxb-test", "C0123", Duration::from_secs(5)).with_endpoint(url);

        sink.post(&format_passthrough("hello")).unwrap();

        let request = server.join().unwrap();
        assert!(request.starts_with("POST / "));
        assert!(request.contains("Bearer xoxb-test"));
        assert!(request.contains("\"channel\":\"C0123\""));
    }

    #[test]
    fn slack_post_treats_ok_false_as_api_error() {
        let (url, server) = one_shot_server(r#"{"ok":false,"error":"invalid_auth"}"#);
        let sink =
            SlackSink::new("xoxb-bad", "C0123", Duration::from_secs(5)).with_endpoint(url);

        let err = sink.post(&format_passthrough("hello")).unwrap_err();
        assert!(err.to_string().contains("invalid_auth"));
        server.join().unwrap();
    }

    #[test]
    fn slack_post_maps_connection_failure_to_transport_error() {
        // Nothing listens on this port.
        let sink = SlackSink::new("xoxb-test", "C0123", Duration::from_secs(1))
            .with_endpoint("http://127.0.0.1:1/chat.postMessage");
        let err = sink.post(&format_passthrough("hello")).unwrap_err();
        assert!(matches!(err, SinkError::Transport { sink: "slack", .. }));
    }

    #[test]
    fn webhook_endpoint_tolerates_trailing_slash() {
        assert_eq!(
            dispatch_endpoint("https://headsup.example.org/"),
            "https://headsup.example.org/dispatch"
        );
        assert_eq!(
            dispatch_endpoint("https://headsup.example.org"),
            "https://headsup.example.org/dispatch"
        );
    }

    #[test]
    fn webhook_posts_record_json_with_token() {
        use crate::extract::{FieldMap, FormatMode};
        use crate::record::DispatchRecord;

        let (url, server) = one_shot_server("{}");
        let sink = WebhookSink::new(&url, "sekrit", Duration::from_secs(5));

        let mut fields = FieldMap::new();
        fields.insert("Call Type", "A - Falls");
        let record = DispatchRecord::from_fields(fields, FormatMode::LabeledLines);
        sink.post(&record).unwrap();

        let request = server.join().unwrap();
        assert!(request.starts_with("POST /dispatch?token=sekrit "));
        assert!(request.contains("\"determinant\":\"Alpha\""));
    }
}
