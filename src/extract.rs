//! Field extraction from dispatch page bodies.
//!
//! The dispatch center has used two page layouts over the years:
//!
//! - **Labeled lines**: `Call Type: A - Falls` style, one `Label: value`
//!   per line, with wrapped lines continuing the previous value.
//! - **Fixed fields**: a single run-on line where an ordered list of known
//!   ALL-CAPS labels (`PAGE SENT TO`, `INCIDENT`, `CALL TYPE`, ...) delimits
//!   positional values.
//!
//! Both produce a [`FieldMap`], an insertion-ordered label → raw-value map.
//! Which layout applies is decided per message by its leading dispatch
//! marker, so the two historical pipelines collapse into one strategy table.

use std::sync::LazyLock;

use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{FormatError, FormatResult};

// ── Regex patterns ──────────────────────────────────────────────────────

static RE_LABELED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:]+):\s*(.*)$").unwrap());

// ── FormatMode ──────────────────────────────────────────────────────────

/// Which page layout to parse a body with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatMode {
    /// `Label: value` lines with continuation-line folding.
    LabeledLines,
    /// Positional values delimited by a configured ordered label list.
    FixedFields,
}

impl std::fmt::Display for FormatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LabeledLines => write!(f, "labeled-lines"),
            Self::FixedFields => write!(f, "fixed-fields"),
        }
    }
}

// ── Dispatch markers ────────────────────────────────────────────────────

/// A leading marker that identifies a body as a dispatch page and selects
/// the layout used to parse it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchMarker {
    /// Case-insensitive prefix the trimmed body must start with.
    pub prefix: String,
    /// Layout this marker selects.
    pub mode: FormatMode,
}

impl DispatchMarker {
    pub fn new(prefix: impl Into<String>, mode: FormatMode) -> Self {
        Self {
            prefix: prefix.into(),
            mode,
        }
    }
}

/// The marker table for the two known page layouts.
pub fn default_markers() -> Vec<DispatchMarker> {
    vec![
        DispatchMarker::new("Call Type:", FormatMode::LabeledLines),
        DispatchMarker::new("PAGE SENT TO", FormatMode::FixedFields),
    ]
}

/// Decide whether `body` is a dispatch page, and if so which layout it uses.
///
/// A body is recognized iff its trimmed text starts (case-insensitively)
/// with one of the configured markers. `mode_filter` restricts recognition
/// to a single layout when the deployment pins one.
pub fn recognize(
    body: &str,
    markers: &[DispatchMarker],
    mode_filter: Option<FormatMode>,
) -> Option<FormatMode> {
    let trimmed = body.trim_start();
    markers
        .iter()
        .filter(|m| mode_filter.is_none_or(|want| m.mode == want))
        .find(|m| starts_with_ignore_case(trimmed, &m.prefix))
        .map(|m| m.mode)
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

// ── FieldMap ────────────────────────────────────────────────────────────

/// Insertion-ordered mapping from field label to raw value.
///
/// Order reflects document order. Re-inserting an existing label replaces
/// its value in place (last value wins, first position kept), matching how
/// the labeled-line layout has always behaved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value for `label`.
    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<String>) {
        let label = label.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == label) {
            Some((_, v)) => *v = value,
            None => self.entries.push((label, value)),
        }
    }

    /// Append `extra` to an existing value with a single space separator
    /// (continuation-line folding). No-op if `label` is absent.
    pub fn append(&mut self, label: &str, extra: &str) {
        if let Some((_, v)) = self.entries.iter_mut().find(|(k, _)| k == label) {
            if v.is_empty() {
                v.push_str(extra);
            } else {
                v.push(' ');
                v.push_str(extra);
            }
        }
    }

    /// Exact-match lookup.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == label)
            .map(|(_, v)| v.as_str())
    }

    /// First present *non-empty* value out of several aliases (e.g.
    /// `Cross Street` / `Cross Streets`).
    pub fn first_nonempty<'a>(&'a self, labels: &[&str]) -> Option<&'a str> {
        labels
            .iter()
            .find_map(|l| self.get(l).filter(|v| !v.is_empty()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ── Extraction ──────────────────────────────────────────────────────────

/// Extract fields from `body` using the given layout.
///
/// `labels` is only consulted in fixed-fields mode.
pub fn extract(body: &str, mode: FormatMode, labels: &[String]) -> FormatResult<FieldMap> {
    match mode {
        FormatMode::LabeledLines => Ok(extract_labeled(body)),
        FormatMode::FixedFields => extract_fixed(body, labels),
    }
}

/// Parse `Label: value` lines.
///
/// A line without a colon continues the previous field's value, appended
/// with one space. Blank lines are skipped. Labels are discovered from the
/// text, not pre-declared.
pub fn extract_labeled(body: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    let mut current: Option<String> = None;

    for raw_line in body.replace('\r', "").lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = RE_LABELED_LINE.captures(line) {
            let label = caps[1].trim().to_string();
            let value = caps[2].trim().to_string();
            fields.insert(label.clone(), value);
            current = Some(label);
        } else if let Some(ref label) = current {
            fields.append(label, line);
        }
        // A continuation line before any label is dropped.
    }

    fields
}

/// Split a run-on body on an ordered label list and assign values
/// positionally.
///
/// The first split segment (empty, or preamble before the first label) is
/// discarded; the remaining segments must match the label count exactly.
/// Empty values between adjacent labels are preserved as empty strings.
pub fn extract_fixed(body: &str, labels: &[String]) -> FormatResult<FieldMap> {
    let trimmed = body.trim();
    if trimmed.is_empty() || labels.is_empty() {
        return Ok(FieldMap::new());
    }

    let splitter = fixed_splitter(labels);
    if !splitter.is_match(trimmed) {
        // No recognized delimiter at all: not an extraction error, just
        // nothing to extract.
        return Ok(FieldMap::new());
    }

    let mut segments: Vec<&str> = splitter.split(trimmed).collect();
    // Everything before the first label is preamble (usually empty).
    segments.remove(0);

    if segments.len() != labels.len() {
        return Err(FormatError::FieldCountMismatch {
            expected: labels.len(),
            actual: segments.len(),
        });
    }

    let mut fields = FieldMap::new();
    for (label, segment) in labels.iter().zip(segments) {
        fields.insert(label.clone(), segment.trim());
    }
    Ok(fields)
}

/// Build the delimiter regex for a fixed label list: any label, with
/// surrounding whitespace consumed. Longer labels are tried first so a
/// label that prefixes another can never shadow it.
fn fixed_splitter(labels: &[String]) -> Regex {
    let mut ordered: Vec<&String> = labels.iter().collect();
    ordered.sort_by_key(|l| std::cmp::Reverse(l.len()));
    let alternation = ordered
        .iter()
        .map(|l| regex::escape(l))
        .collect::<Vec<_>>()
        .join("|");
    // Labels are config-provided at startup; an invalid pattern cannot be
    // produced from escaped literals.
    Regex::new(&format!(r"\s*(?:{alternation})\s*")).unwrap()
}

/// The CAD-paging label list used by the fixed layout, in page order.
pub fn default_fixed_labels() -> Vec<String> {
    [
        "PAGE SENT TO",
        "INCIDENT",
        "CALL TYPE",
        "ADDRESS",
        "APT / FLR",
        "LOCATION",
        "CROSS STREETS",
        "EMD CODE",
        "LATITUDE",
        "LONGITUDE",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

// ── Tests ───────────────────────────────────────────────────────────────
