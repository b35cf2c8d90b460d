//! Runtime configuration for the relay.
//!
//! One explicit struct, validated at startup and passed into the pipeline;
//! no ad-hoc environment lookups inside logic. Values come from an
//! optional TOML file overlaid by the environment variables the deployment
//! has always used (`RECEIVE_EMAIL`, `SLACK_BOT_TOKEN`, `SLACK_CHANNEL`,
//! `GOOGLE_MAPS_API_KEY`, `PORT`, `HEADSUP_URL`, `HEADSUP_TOKEN`).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::extract::{DispatchMarker, FormatMode, default_fixed_labels, default_markers};
use crate::geocode::GeocodeBias;

/// Default SMTP listening port.
const DEFAULT_PORT: u16 = 25;

/// Default request timeout for geocoding and sink posts.
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

// ── RelayConfig ─────────────────────────────────────────────────────────

/// Everything the relay needs to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// The only RCPT TO address the listener accepts (case-insensitive).
    pub recipient: String,
    /// Slack bot token for `chat.postMessage`.
    pub slack_token: String,
    /// Slack channel id to post into.
    pub slack_channel: String,
    /// Maps Geocoding API key; absent disables enrichment.
    pub geocode_api_key: Option<String>,
    /// Downstream webhook base URL; absent disables the webhook sink.
    pub webhook_url: Option<String>,
    /// Token appended to webhook posts as a query parameter.
    pub webhook_token: Option<String>,
    /// SMTP listening port.
    pub port: u16,
    /// Bind address for the listener.
    pub bind: String,
    /// Hostname announced in the SMTP greeting.
    pub hostname: String,
    /// Pin parsing to one layout; absent = decide per message by marker.
    pub format: Option<FormatMode>,
    /// Ordered label list for the fixed-fields layout.
    pub fixed_labels: Vec<String>,
    /// Markers that identify dispatch pages and select their layout.
    pub markers: Vec<DispatchMarker>,
    /// Regional bias for geocoding; absent queries unbiased only.
    pub bias: Option<GeocodeBias>,
    /// Request timeout (seconds) for geocoding and sink posts.
    pub http_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            recipient: String::new(),
            slack_token: String::new(),
            slack_channel: String::new(),
            geocode_api_key: None,
            webhook_url: None,
            webhook_token: None,
            port: DEFAULT_PORT,
            bind: "0.0.0.0".to_string(),
            hostname: "herald".to_string(),
            format: None,
            fixed_labels: default_fixed_labels(),
            markers: default_markers(),
            bias: Some(GeocodeBias::default()),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl RelayConfig {
    /// Load from an optional TOML file, then overlay the environment.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parse a TOML config file. Absent keys keep their defaults.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: ConfigFile =
            toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        Ok(file.into_config())
    }

    /// Overlay environment variables onto this config. `lookup` is the
    /// environment accessor, injectable so tests never mutate the process
    /// environment.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ConfigResult<()> {
        if let Some(v) = lookup("RECEIVE_EMAIL") {
            self.recipient = v;
        }
        if let Some(v) = lookup("SLACK_BOT_TOKEN") {
            self.slack_token = v;
        }
        if let Some(v) = lookup("SLACK_CHANNEL") {
            self.slack_channel = v;
        }
        if let Some(v) = lookup("GOOGLE_MAPS_API_KEY") {
            self.geocode_api_key = Some(v);
        }
        if let Some(v) = lookup("HEADSUP_URL") {
            if !v.is_empty() {
                self.webhook_url = Some(v);
            }
        }
        if let Some(v) = lookup("HEADSUP_TOKEN") {
            self.webhook_token = Some(v);
        }
        if let Some(v) = lookup("PORT") {
            self.port = v.parse().map_err(|_| ConfigError::Invalid {
                name: "PORT".to_string(),
                message: format!("\"{v}\" is not a valid port number"),
            })?;
        }
        Ok(())
    }

    /// Fail fast on anything the relay cannot run without.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.recipient.is_empty() {
            return Err(ConfigError::Missing {
                name: "RECEIVE_EMAIL".to_string(),
            });
        }
        if self.slack_token.is_empty() {
            return Err(ConfigError::Missing {
                name: "SLACK_BOT_TOKEN".to_string(),
            });
        }
        if self.slack_channel.is_empty() {
            return Err(ConfigError::Missing {
                name: "SLACK_CHANNEL".to_string(),
            });
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid {
                name: "PORT".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }
        if self.fixed_labels.is_empty() {
            return Err(ConfigError::Invalid {
                name: "fixed_labels".to_string(),
                message: "the fixed-fields label list must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Whether geocoding is configured at all.
    pub fn geocoding_enabled(&self) -> bool {
        self.geocode_api_key
            .as_deref()
            .is_some_and(|k| !k.is_empty())
    }
}

// ── File form ───────────────────────────────────────────────────────────

/// The TOML file schema: everything optional, defaults fill the rest.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    recipient: Option<String>,
    slack_token: Option<String>,
    slack_channel: Option<String>,
    geocode_api_key: Option<String>,
    webhook_url: Option<String>,
    webhook_token: Option<String>,
    port: Option<u16>,
    bind: Option<String>,
    hostname: Option<String>,
    format: Option<FormatMode>,
    fixed_labels: Option<Vec<String>>,
    markers: Option<Vec<DispatchMarker>>,
    bias: Option<GeocodeBias>,
    http_timeout_secs: Option<u64>,
}

impl ConfigFile {
    fn into_config(self) -> RelayConfig {
        let defaults = RelayConfig::default();
        RelayConfig {
            recipient: self.recipient.unwrap_or(defaults.recipient),
            slack_token: self.slack_token.unwrap_or(defaults.slack_token),
            slack_channel: self.slack_channel.unwrap_or(defaults.slack_channel),
            geocode_api_key: self.geocode_api_key.or(defaults.geocode_api_key),
            webhook_url: self.webhook_url.or(defaults.webhook_url),
            webhook_token: self.webhook_token.or(defaults.webhook_token),
            port: self.port.unwrap_or(defaults.port),
            bind: self.bind.unwrap_or(defaults.bind),
            hostname: self.hostname.unwrap_or(defaults.hostname),
            format: self.format.or(defaults.format),
            fixed_labels: self.fixed_labels.unwrap_or(defaults.fixed_labels),
            markers: self.markers.unwrap_or(defaults.markers),
            bias: self.bias.or(defaults.bias),
            http_timeout_secs: self
                .http_timeout_secs
                .unwrap_or(defaults.http_timeout_secs),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn valid_config() -> RelayConfig {
        RelayConfig {
            recipient: "tmd@herald.example.org".to_string(),
            slack_token: "xoxb-test".to_string(),
            slack_channel: "C0123".to_string(),
            ..RelayConfig::default()
        }
    }

    #[test]
    fn defaults_are_sensible() {
        let config = RelayConfig::default();
        assert_eq!(config.port, 25);
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.hostname, "herald");
        assert!(config.format.is_none());
        assert_eq!(config.fixed_labels.len(), 10);
        assert!(config.bias.is_some());
    }

    #[test]
    fn env_overlay_fills_required_values() {
        let mut config = RelayConfig::default();
        config
            .apply_env(env_from(&[
                ("RECEIVE_EMAIL", "tmd@herald.example.org"),
                ("SLACK_BOT_TOKEN", "xoxb-test"),
                ("SLACK_CHANNEL", "C0123"),
                ("PORT", "2525"),
            ]))
            .unwrap();

        assert_eq!(config.recipient, "tmd@herald.example.org");
        assert_eq!(config.port, 2525);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overlay_rejects_bad_port() {
        let mut config = RelayConfig::default();
        let err = config
            .apply_env(env_from(&[("PORT", "not-a-port")]))
            .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn empty_headsup_url_means_no_webhook() {
        let mut config = RelayConfig::default();
        config
            .apply_env(env_from(&[("HEADSUP_URL", "")]))
            .unwrap();
        assert!(config.webhook_url.is_none());
    }

    #[test]
    fn validate_requires_recipient() {
        let config = RelayConfig {
            recipient: String::new(),
            ..valid_config()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("RECEIVE_EMAIL"));
    }

    #[test]
    fn validate_requires_slack_credentials() {
        let config = RelayConfig {
            slack_token: String::new(),
            ..valid_config()
        };
        assert!(config.validate().is_err());

        let config = RelayConfig {
            slack_channel: String::new(),
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_missing_geocode_key() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert!(!config.geocoding_enabled());
    }

    #[test]
    fn file_values_load_and_env_overrides_them() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
recipient = "file@herald.example.org"
slack_token = "xoxb-file"
slack_channel = "CFILE"
port = 2600
hostname = "pager"

[bias]
locality = "Troy"
administrative_area = "NY"
country = "US"
"#
        )
        .unwrap();

        let mut config = RelayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.recipient, "file@herald.example.org");
        assert_eq!(config.port, 2600);
        assert_eq!(config.hostname, "pager");

        config
            .apply_env(env_from(&[("RECEIVE_EMAIL", "env@herald.example.org")]))
            .unwrap();
        assert_eq!(config.recipient, "env@herald.example.org");
        assert_eq!(config.port, 2600);
    }

    #[test]
    fn file_with_unknown_key_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "recipint = \"typo@example.org\"").unwrap();
        assert!(RelayConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn listen_addr_joins_bind_and_port() {
        let config = RelayConfig {
            bind: "127.0.0.1".to_string(),
            port: 2525,
            ..valid_config()
        };
        assert_eq!(config.listen_addr(), "127.0.0.1:2525");
    }
}
