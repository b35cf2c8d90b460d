//! herald CLI: SMTP → Slack dispatch relay.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use herald::config::RelayConfig;
use herald::geocode::{DisabledGeocoder, Geocoder, GoogleGeocoder};
use herald::relay::Relay;
use herald::smtp;

/// The labeled-layout page used by `parse --sample`.
const SAMPLE_PAGE: &str = "Call Type: A - Falls
Location: 51 COLLEGE AVE, TROY CITY
Business: RPI - Darrin Communications Center (DCC)
Additional Location Info: RM 308
Cross Street: 13TH ST / 8TH ST
Dispatched Units: E59
Response Areas: Troy FD 2640/Troy EMS 8243";

/// The fixed-layout CAD page sent by `send-test`.
const TEST_PAGE: &str = "PAGE SENT TO RE59 INCIDENT 22-184838 CALL TYPE \
B-Falls ADDRESS 1649 15th Street APT / FLR LOCATION  RPI - Russel Sage \
Dining Hall (RPI) CROSS STREETS  Bouton Road/Sage Avenue EMD CODE 17B04 \
LATITUDE 42729787 LONGITUDE 73678242";

#[derive(Parser)]
#[command(name = "herald", version, about = "SMTP relay for dispatch pager emails")]
struct Cli {
    /// TOML config file; environment variables override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the SMTP listener and relay loop.
    Serve {
        /// Override the listening port.
        #[arg(long)]
        port: Option<u16>,
    },

    /// Parse one message body and print the notification payload as JSON.
    Parse {
        /// File to read the body from (stdin when omitted).
        file: Option<PathBuf>,

        /// Use the built-in sample page instead of reading input.
        #[arg(long)]
        sample: bool,

        /// Deliver the result to the configured sinks instead of printing.
        #[arg(long)]
        post: bool,
    },

    /// Send the sample CAD page to a running herald over SMTP.
    SendTest {
        /// Target host.
        #[arg(long, default_value = "localhost")]
        host: String,

        /// Target port.
        #[arg(long, default_value_t = 25)]
        port: u16,

        /// Recipient address (defaults to the configured RECEIVE_EMAIL).
        #[arg(long)]
        to: Option<String>,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = RelayConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port } => serve(config, port),
        Commands::Parse { file, sample, post } => parse(config, file, sample, post),
        Commands::SendTest { host, port, to } => send_test(&config, &host, port, to),
    }
}

fn serve(mut config: RelayConfig, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.port = port;
    }
    config.validate()?;

    let config = Arc::new(config);
    let relay = Arc::new(Relay::new(Arc::clone(&config), build_geocoder(&config)));

    tracing::info!(
        port = config.port,
        "herald v{} starting",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!(recipient = %config.recipient, "accepting messages for");

    let handler = {
        let relay = Arc::clone(&relay);
        Arc::new(move |raw: String| {
            let body = smtp::select_body(&raw);
            relay.handle(&body);
        })
    };

    smtp::serve(
        &config.listen_addr(),
        &config.hostname,
        &config.recipient,
        handler,
    )?;
    Ok(())
}

fn parse(
    config: RelayConfig,
    file: Option<PathBuf>,
    sample: bool,
    post: bool,
) -> Result<()> {
    let body = if sample {
        SAMPLE_PAGE.to_string()
    } else {
        match file {
            Some(path) => std::fs::read_to_string(&path).into_diagnostic()?,
            None => std::io::read_to_string(std::io::stdin()).into_diagnostic()?,
        }
    };

    if post {
        config.validate()?;
    }

    let config = Arc::new(config);
    let relay = Relay::new(Arc::clone(&config), build_geocoder(&config));

    if post {
        relay.handle(&body);
    } else {
        let notification = relay.process(&body);
        let json =
            serde_json::to_string_pretty(notification.payload()).into_diagnostic()?;
        println!("{json}");
    }
    Ok(())
}

fn send_test(config: &RelayConfig, host: &str, port: u16, to: Option<String>) -> Result<()> {
    use lettre::message::header::ContentType;
    use lettre::{Message, SmtpTransport, Transport};

    let recipient = match to {
        Some(to) => to,
        None if !config.recipient.is_empty() => config.recipient.clone(),
        None => miette::bail!("no recipient: pass --to or set RECEIVE_EMAIL"),
    };

    let email = Message::builder()
        .from("test@localhost".parse().into_diagnostic()?)
        .to(recipient.parse().into_diagnostic()?)
        .subject("cadpaging")
        .header(ContentType::TEXT_PLAIN)
        .body(TEST_PAGE.to_string())
        .into_diagnostic()?;

    // Plaintext SMTP on purpose: this talks to a local herald, not a relay.
    let mailer = SmtpTransport::builder_dangerous(host).port(port).build();
    mailer.send(&email).into_diagnostic()?;

    println!("sent test page to {recipient} via {host}:{port}");
    Ok(())
}

fn build_geocoder(config: &RelayConfig) -> Arc<dyn Geocoder> {
    if config.geocoding_enabled() {
        let key = config.geocode_api_key.clone().unwrap_or_default();
        Arc::new(GoogleGeocoder::new(key, config.http_timeout()))
    } else {
        tracing::warn!("GOOGLE_MAPS_API_KEY not set, geocoding disabled");
        Arc::new(DisabledGeocoder)
    }
}
