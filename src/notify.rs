//! Notification formatting: dispatch record → chat payload.
//!
//! Produces the Slack Block Kit layout the crew is used to: header,
//! location/business section, cross-streets/additional-info section,
//! divider, navigate section, and (only when coordinates are known) an
//! actions row with Apple Maps and Google Maps buttons. Non-dispatch
//! notices skip all of this and go out verbatim.

use serde::Serialize;

use crate::record::DispatchRecord;

const NOT_AVAILABLE: &str = "N/A";

// ── Block Kit model ─────────────────────────────────────────────────────

/// A Slack Block Kit text object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String, emoji: bool },
    #[serde(rename = "mrkdwn")]
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain {
            text: text.into(),
            emoji: true,
        }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }
}

/// A button in an actions block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ButtonElement {
    #[serde(rename = "type")]
    kind: &'static str,
    pub text: TextObject,
    pub url: String,
}

impl ButtonElement {
    pub fn link(label: &str, url: impl Into<String>) -> Self {
        Self {
            kind: "button",
            text: TextObject::plain(label),
            url: url.into(),
        }
    }
}

/// A Slack layout block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header { text: TextObject },
    Section { text: TextObject },
    Divider,
    Actions { elements: Vec<ButtonElement> },
}

/// What gets posted: short text (mobile notification line) plus blocks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPayload {
    pub text: String,
    pub blocks: Vec<Block>,
}

// ── Formatting ──────────────────────────────────────────────────────────

/// Format a normalized dispatch record.
pub fn format_dispatch(record: &DispatchRecord) -> NotificationPayload {
    NotificationPayload {
        text: short_summary(record),
        blocks: build_blocks(record),
    }
}

/// Forward a non-dispatch notice verbatim: no parsing, no blocks.
pub fn format_passthrough(body: &str) -> NotificationPayload {
    NotificationPayload {
        text: body.to_string(),
        blocks: Vec::new(),
    }
}

/// The one-line summary: `"alpha falls at 51 COLLEGE AVE, TROY CITY"`.
pub fn short_summary(record: &DispatchRecord) -> String {
    format!(
        "{} {} at {}",
        record.call_type.determinant.as_str().to_lowercase(),
        record.call_type.complaint.to_lowercase(),
        record.location.as_deref().unwrap_or(NOT_AVAILABLE)
    )
}

fn build_blocks(record: &DispatchRecord) -> Vec<Block> {
    let mut blocks = vec![
        Block::Header {
            text: TextObject::plain(header_line(record)),
        },
        Block::Section {
            text: TextObject::mrkdwn(format!(
                "*Location:* {}\n*Business:* {}",
                record.location.as_deref().unwrap_or(NOT_AVAILABLE),
                record.business.as_deref().unwrap_or(NOT_AVAILABLE),
            )),
        },
        Block::Section {
            text: TextObject::mrkdwn(format!(
                "*Cross Streets:* {}\n*Additional Info:* {}",
                record.cross_streets.as_deref().unwrap_or(NOT_AVAILABLE),
                record.additional_info.as_deref().unwrap_or(NOT_AVAILABLE),
            )),
        },
        Block::Divider,
        Block::Section {
            text: TextObject::mrkdwn(format!("Navigate:\n{}", navigate_target(record))),
        },
    ];

    if let Some(coords) = record.coordinates {
        let param = coords.query_param();
        blocks.push(Block::Actions {
            elements: vec![
                ButtonElement::link(
                    "Apple Maps",
                    format!("http://maps.apple.com/?daddr={param}"),
                ),
                ButtonElement::link(
                    "Google Maps",
                    format!("https://maps.google.com/?daddr={param}"),
                ),
            ],
        });
    }

    blocks
}

/// Headline: the call type, or the run number when the page carried no
/// usable call type.
fn header_line(record: &DispatchRecord) -> String {
    let ct = &record.call_type;
    if ct.complaint == "Unknown" {
        if let Some(ref incident) = record.incident {
            return format!("Call received: Run {incident}");
        }
    }
    format!("Call received: {}", ct.headline())
}

/// Where the navigate section points: prefer the canonical geocoded place,
/// fall back to the raw street address.
fn navigate_target(record: &DispatchRecord) -> &str {
    record
        .geocoded_place
        .as_deref()
        .or(record.location.as_deref())
        .unwrap_or(NOT_AVAILABLE)
}

// ── Tests ───────────────────────────────────────────────────────────────
