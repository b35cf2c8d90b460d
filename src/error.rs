//! Rich diagnostic error types for herald.
//!
//! Each subsystem defines its own error enum with miette `#[diagnostic]`
//! derives (error codes, help text, source chains); a transparent top-level
//! `HeraldError` wraps them so diagnostics survive all the way to the CLI.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for herald.
#[derive(Debug, Error, Diagnostic)]
pub enum HeraldError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Geocode(#[from] GeocodeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Smtp(#[from] SmtpError),
}

/// Convenience alias for fallible herald operations.
pub type HeraldResult<T> = std::result::Result<T, HeraldError>;

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("required configuration value \"{name}\" is missing")]
    #[diagnostic(
        code(herald::config::missing),
        help(
            "Set the {name} environment variable or the matching key in the \
             TOML config file. Required values: RECEIVE_EMAIL, \
             SLACK_BOT_TOKEN, SLACK_CHANNEL."
        )
    )]
    Missing { name: String },

    #[error("configuration value \"{name}\" is invalid: {message}")]
    #[diagnostic(
        code(herald::config::invalid),
        help("Check the value of {name}; see the README for accepted forms.")
    )]
    Invalid { name: String, message: String },

    #[error("failed to read config file {path}: {source}")]
    #[diagnostic(
        code(herald::config::io),
        help("Check that the file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    #[diagnostic(
        code(herald::config::parse),
        help("The file must be valid TOML; see the sample config in the README.")
    )]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Convenience alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Format / extraction errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum FormatError {
    #[error(
        "fixed-field split produced {actual} value segment(s), expected {expected}"
    )]
    #[diagnostic(
        code(herald::format::field_count),
        help(
            "The message body does not line up with the configured field-label \
             list. Either the dispatch center changed its page layout or the \
             label list in the config is out of date."
        )
    )]
    FieldCountMismatch { expected: usize, actual: usize },

    #[error("message body matches no known dispatch format")]
    #[diagnostic(
        code(herald::format::unrecognized),
        help(
            "The body does not start with a configured dispatch marker. \
             Non-dispatch notices are forwarded verbatim; this error only \
             surfaces when a dispatch parse was explicitly requested."
        )
    )]
    Unrecognized,
}

/// Convenience alias for extraction operations.
pub type FormatResult<T> = std::result::Result<T, FormatError>;

// ---------------------------------------------------------------------------
// Geocoding errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GeocodeError {
    #[error("geocoding request failed: {message}")]
    #[diagnostic(
        code(herald::geocode::transport),
        help(
            "The geocoding endpoint could not be reached or timed out. \
             Messages are still forwarded, just without map links."
        )
    )]
    Transport { message: String },

    #[error("geocoding response could not be parsed: {message}")]
    #[diagnostic(
        code(herald::geocode::response),
        help("The geocoding API returned a body that does not match the expected JSON shape.")
    )]
    Response { message: String },

    #[error("geocoding API key is not configured")]
    #[diagnostic(
        code(herald::geocode::missing_key),
        help("Set GOOGLE_MAPS_API_KEY to enable location enrichment.")
    )]
    MissingKey,
}

/// Convenience alias for geocoding operations.
pub type GeocodeResult<T> = std::result::Result<T, GeocodeError>;

// ---------------------------------------------------------------------------
// Sink errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SinkError {
    #[error("{sink} delivery failed: {message}")]
    #[diagnostic(
        code(herald::sink::transport),
        help(
            "The outbound POST failed (network, TLS, or timeout). Deliveries \
             are not retried; the failure is logged and the message dropped."
        )
    )]
    Transport { sink: &'static str, message: String },

    #[error("{sink} rejected the request: {message}")]
    #[diagnostic(
        code(herald::sink::api),
        help(
            "The remote service answered but refused the payload. For Slack, \
             check the bot token and that the bot is in the target channel."
        )
    )]
    Api { sink: &'static str, message: String },
}

/// Convenience alias for sink operations.
pub type SinkResult<T> = std::result::Result<T, SinkError>;

// ---------------------------------------------------------------------------
// SMTP errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SmtpError {
    #[error("failed to bind SMTP listener on {addr}: {source}")]
    #[diagnostic(
        code(herald::smtp::bind),
        help(
            "Check that the port is free and that herald has permission to \
             bind it (ports below 1024 need elevated privileges)."
        )
    )]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("SMTP connection error: {source}")]
    #[diagnostic(
        code(herald::smtp::connection),
        help("The client connection failed mid-session; the session was dropped.")
    )]
    Connection {
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for SMTP operations.
pub type SmtpResult<T> = std::result::Result<T, SmtpError>;

// ── Tests ───────────────────────────────────────────────────────────────
