//! Inbound SMTP listener.
//!
//! Just enough ESMTP to receive pages from the dispatch center's mail
//! gateway: HELO/EHLO, MAIL, RCPT, DATA, RSET, NOOP, QUIT. The recipient
//! gate lives at RCPT time: only the configured address is accepted, so a
//! message for anyone else is refused with a 550 before any content is
//! read. The protocol logic is a pure [`SmtpSession`] state machine; the
//! server loop around it is one thread per connection, so a slow geocode
//! or Slack post for one message never stalls acceptance of the next.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use mail_parser::MessageParser;

use crate::error::{SmtpError, SmtpResult};

/// Hard cap on DATA size, same 10 MiB the old relay enforced.
const MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;

// ── SmtpSession ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Command,
    Data,
}

/// What one input line produced.
#[derive(Debug, Default)]
pub struct Step {
    /// Reply to send, if any (may contain multiple CRLF-joined lines).
    pub reply: Option<String>,
    /// A completed message (raw RFC 5322 text), ready for processing.
    pub message: Option<String>,
    /// The client said QUIT; close after sending the reply.
    pub close: bool,
}

impl Step {
    fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: Some(text.into()),
            ..Self::default()
        }
    }

    fn silent() -> Self {
        Self::default()
    }
}

/// Pure SMTP session state machine: feed it lines, get replies and
/// completed messages. No I/O in here.
#[derive(Debug)]
pub struct SmtpSession {
    hostname: String,
    recipient: String,
    state: SessionState,
    have_mail_from: bool,
    have_rcpt: bool,
    data: String,
    oversize: bool,
    max_bytes: usize,
}

impl SmtpSession {
    pub fn new(hostname: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            recipient: recipient.into(),
            state: SessionState::Command,
            have_mail_from: false,
            have_rcpt: false,
            data: String::new(),
            oversize: false,
            max_bytes: MAX_MESSAGE_BYTES,
        }
    }

    /// Lower the DATA size cap (tests).
    #[cfg(test)]
    fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// The banner sent when the connection opens.
    pub fn greeting(&self) -> String {
        format!("220 {} herald ESMTP service ready", self.hostname)
    }

    /// Process one line (CRLF already stripped).
    pub fn advance(&mut self, line: &str) -> Step {
        match self.state {
            SessionState::Command => self.command(line),
            SessionState::Data => self.data_line(line),
        }
    }

    fn command(&mut self, line: &str) -> Step {
        let verb = line
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_uppercase();

        match verb.as_str() {
            "HELO" => Step::reply(format!("250 {}", self.hostname)),
            "EHLO" => Step::reply(format!(
                "250-{}\r\n250 SIZE {}",
                self.hostname, self.max_bytes
            )),
            "MAIL" => {
                self.reset_envelope();
                self.have_mail_from = true;
                Step::reply("250 OK")
            }
            "RCPT" => {
                if !self.have_mail_from {
                    return Step::reply("503 bad sequence of commands");
                }
                match parse_address(line) {
                    Some(addr) if addr.eq_ignore_ascii_case(&self.recipient) => {
                        self.have_rcpt = true;
                        Step::reply("250 OK")
                    }
                    Some(_) => Step::reply("550 recipient not accepted"),
                    None => Step::reply("501 syntax error in recipient"),
                }
            }
            "DATA" => {
                if !self.have_rcpt {
                    return Step::reply("503 bad sequence of commands");
                }
                self.state = SessionState::Data;
                self.data.clear();
                self.oversize = false;
                Step::reply("354 end data with <CRLF>.<CRLF>")
            }
            "RSET" => {
                self.reset_envelope();
                Step::reply("250 OK")
            }
            "NOOP" => Step::reply("250 OK"),
            "QUIT" => Step {
                reply: Some(format!("221 {} closing transmission channel", self.hostname)),
                message: None,
                close: true,
            },
            "" => Step::reply("500 empty command"),
            _ => Step::reply("502 command not implemented"),
        }
    }

    fn data_line(&mut self, line: &str) -> Step {
        if line == "." {
            self.state = SessionState::Command;
            let oversize = self.oversize;
            let message = std::mem::take(&mut self.data);
            self.reset_envelope();
            if oversize {
                return Step::reply("552 message size exceeds fixed maximum");
            }
            return Step {
                reply: Some("250 OK message accepted".to_string()),
                message: Some(message),
                close: false,
            };
        }

        // Transparency: a leading ".." was an escaped dot.
        let line = if line.starts_with("..") { &line[1..] } else { line };

        if self.data.len() + line.len() + 2 > self.max_bytes {
            self.oversize = true;
            return Step::silent();
        }
        self.data.push_str(line);
        self.data.push_str("\r\n");
        Step::silent()
    }

    fn reset_envelope(&mut self) {
        self.have_mail_from = false;
        self.have_rcpt = false;
    }
}

/// Pull the address out of `MAIL FROM:<...>` / `RCPT TO:<...>` forms,
/// with or without angle brackets.
fn parse_address(line: &str) -> Option<String> {
    let (_, rest) = line.split_once(':')?;
    let addr = rest
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim();
    if addr.is_empty() {
        None
    } else {
        Some(addr.to_string())
    }
}

// ── Body selection ──────────────────────────────────────────────────────

/// Pick the text to parse out of a raw message: the plain-text MIME part
/// when there is one, otherwise everything after the header/body blank
/// line, otherwise the raw content as-is.
pub fn select_body(raw: &str) -> String {
    if let Some(message) = MessageParser::default().parse(raw.as_bytes()) {
        if let Some(text) = message.body_text(0) {
            let text = text.trim();
            if !text.is_empty() {
                return text.to_string();
            }
        }
    }

    match raw.split_once("\r\n\r\n").or_else(|| raw.split_once("\n\n")) {
        Some((_, body)) if !body.trim().is_empty() => body.trim().to_string(),
        _ => raw.trim().to_string(),
    }
}

// ── Server loop ─────────────────────────────────────────────────────────

/// Run the listener until the process exits. `handler` is invoked with the
/// raw message text for every accepted DATA payload; it runs on the
/// connection's own thread, and its panics/failures never reach the accept
/// loop.
pub fn serve<F>(
    addr: &str,
    hostname: &str,
    recipient: &str,
    handler: Arc<F>,
) -> SmtpResult<()>
where
    F: Fn(String) + Send + Sync + 'static,
{
    let listener = TcpListener::bind(addr).map_err(|source| SmtpError::Bind {
        addr: addr.to_string(),
        source,
    })?;
    tracing::info!(addr, "SMTP listener ready");

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let hostname = hostname.to_string();
                let recipient = recipient.to_string();
                let handler = Arc::clone(&handler);
                std::thread::spawn(move || {
                    let peer = stream
                        .peer_addr()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|_| "unknown".to_string());
                    if let Err(e) = handle_connection(stream, &hostname, &recipient, &*handler) {
                        tracing::warn!(peer = %peer, error = %e, "SMTP session ended with error");
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to accept connection");
            }
        }
    }

    Ok(())
}

fn handle_connection<F>(
    stream: TcpStream,
    hostname: &str,
    recipient: &str,
    handler: &F,
) -> SmtpResult<()>
where
    F: Fn(String),
{
    let mut session = SmtpSession::new(hostname, recipient);
    let mut reader = BufReader::new(
        stream
            .try_clone()
            .map_err(|source| SmtpError::Connection { source })?,
    );
    let mut writer = stream;

    send_line(&mut writer, &session.greeting())?;

    let mut line = String::new();
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|source| SmtpError::Connection { source })?;
        if read == 0 {
            break; // Client hung up.
        }

        let step = session.advance(line.trim_end_matches(['\r', '\n']));
        if let Some(message) = step.message {
            handler(message);
        }
        if let Some(reply) = step.reply {
            send_line(&mut writer, &reply)?;
        }
        if step.close {
            break;
        }
    }

    Ok(())
}

fn send_line(stream: &mut TcpStream, text: &str) -> SmtpResult<()> {
    write!(stream, "{text}\r\n").map_err(|source| SmtpError::Connection { source })?;
    stream
        .flush()
        .map_err(|source| SmtpError::Connection { source })
}

// ── Tests ───────────────────────────────────────────────────────────────
