// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # herald
//!
//! An SMTP relay that turns dispatch-center pager emails into Slack
//! notifications. It accepts mail for exactly one address, extracts the
//! structured fields out of the page text (two historical layouts, unified
//! behind one strategy table), normalizes the EMD determinant and the
//! legacy compact coordinates, optionally geocodes the street address, and
//! posts a Block Kit message to the crew channel plus an optional JSON
//! webhook downstream.
//!
//! ## Architecture
//!
//! - **Extraction** (`extract`): dispatch markers + labeled-line /
//!   fixed-field strategies → ordered [`extract::FieldMap`]
//! - **Normalization** (`calltype`, `coords`, `record`): determinant
//!   translation, compact-digit coordinates, canonical `DispatchRecord`
//! - **Enrichment** (`geocode`): biased-then-fallback address resolution
//! - **Formatting** (`notify`): Block Kit payload or verbatim pass-through
//! - **Glue** (`smtp`, `sink`, `relay`, `config`): listener, deliveries,
//!   pipeline wiring, validated configuration
//!
//! ## Library usage
//!
//! ```
//! use herald::extract::{FormatMode, extract_labeled};
//! use herald::notify::format_dispatch;
//! use herald::record::DispatchRecord;
//!
//! let fields =
//!     extract_labeled("Call Type: A - Falls\nLocation: 51 COLLEGE AVE, TROY CITY");
//! let record = DispatchRecord::from_fields(fields, FormatMode::LabeledLines);
//! let payload = format_dispatch(&record);
//! assert_eq!(payload.text, "alpha falls at 51 COLLEGE AVE, TROY CITY");
//! ```

pub mod calltype;
pub mod config;
pub mod coords;
pub mod error;
pub mod extract;
pub mod geocode;
pub mod notify;
pub mod record;
pub mod relay;
pub mod sink;
pub mod smtp;
