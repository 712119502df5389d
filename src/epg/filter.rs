//! Guide reconciliation
//!
//! Merge → match → window → prune. Every stage is a pure function of its
//! inputs; the per-channel programme counts travel from the window filter
//! to the pruner as a returned value.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use super::document::{ChannelEntry, EpgDocument, ProgrammeEntry};
use crate::error::{GrabberError, GrabberResult, TimestampParseError};
use crate::m3u_parser::LineupIndex;
use crate::normalize::normalize;

/// Forward window applied to programme start times
pub const DEFAULT_HORIZON_DAYS: u32 = 2;

/// Core filter settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterOptions {
    /// Forward cutoff in days
    pub horizon_days: u32,
    /// Fixed "now" (UTC) instead of the wall clock
    pub reference_time: Option<NaiveDateTime>,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            horizon_days: DEFAULT_HORIZON_DAYS,
            reference_time: None,
        }
    }
}

impl FilterOptions {
    pub fn now(&self) -> NaiveDateTime {
        self.reference_time
            .unwrap_or_else(|| Utc::now().naive_utc())
    }

    /// Latest start time still retained. `None` when the horizon does not fit
    /// the calendar, in which case nothing is cut off.
    pub fn cutoff(&self) -> Option<NaiveDateTime> {
        TimeDelta::try_days(i64::from(self.horizon_days))
            .and_then(|horizon| self.now().checked_add_signed(horizon))
    }
}

/// Parse the leading `YYYYMMDDHHMMSS` of an XMLTV start attribute.
/// Anything after the 14th digit (usually a timezone offset) is ignored.
pub fn parse_start_time(value: &str) -> Result<NaiveDateTime, TimestampParseError> {
    let fail = || TimestampParseError {
        value: value.to_string(),
    };

    let bytes = value.as_bytes();
    if bytes.len() < 14 || !bytes[..14].iter().all(u8::is_ascii_digit) {
        return Err(fail());
    }

    let field = |range: std::ops::Range<usize>| -> u32 {
        bytes[range]
            .iter()
            .fold(0, |acc, b| acc * 10 + u32::from(b - b'0'))
    };

    let year = i32::try_from(field(0..4)).map_err(|_| fail())?;
    NaiveDate::from_ymd_opt(year, field(4..6), field(6..8))
        .and_then(|date| date.and_hms_opt(field(8..10), field(10..12), field(12..14)))
        .ok_or_else(fail)
}

/// Identifiers of guide channels that correspond to lineup entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidChannelSet {
    ids: HashSet<String>,
}

impl ValidChannelSet {
    /// Takes a raw or normalized identifier
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(&normalize(id))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<String> for ValidChannelSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(|id| normalize(&id)).collect(),
        }
    }
}

/// Concatenate feeds in the order given. No deduplication happens here.
/// Every feed must carry at least one `<channel>`.
pub fn merge<I>(docs: I) -> GrabberResult<EpgDocument>
where
    I: IntoIterator<Item = EpgDocument>,
{
    let mut merged = EpgDocument::new("merged");
    let mut first = true;

    for doc in docs {
        if doc.channels.is_empty() {
            return Err(GrabberError::schema(
                &doc.source_name,
                "document has no <channel> elements",
            ));
        }

        info!(
            "Feed {}: {} channels, {} programmes",
            doc.source_name,
            doc.channels.len(),
            doc.programmes.len()
        );

        if first {
            merged.root_attributes = doc.root_attributes;
            first = false;
        }
        merged.channels.extend(doc.channels);
        merged.programmes.extend(doc.programmes);
    }

    Ok(merged)
}

/// True when the entry's identifier or any of its display names is in the lineup
pub fn channel_matches(channel: &ChannelEntry, index: &LineupIndex) -> bool {
    index.contains_identifier(&normalize(&channel.id))
        || channel
            .name_keys()
            .iter()
            .any(|name| index.contains_display_name(name))
}

/// Collect identifiers of every matching channel entry. Entries sharing an
/// identifier are judged separately, but one match validates the identifier.
pub fn match_channels(doc: &EpgDocument, index: &LineupIndex) -> ValidChannelSet {
    doc.channels
        .iter()
        .filter(|channel| channel_matches(channel, index))
        .map(|channel| normalize(&channel.id))
        .collect()
}

/// Programmes that survived the window, plus per-identifier counts
#[derive(Debug, Clone, Default)]
pub struct WindowOutcome<'a> {
    pub retained: Vec<&'a ProgrammeEntry>,
    /// Keyed by normalized channel identifier
    pub per_channel_counts: HashMap<String, usize>,
    /// Retained despite an unparsable start time
    pub unparsable: usize,
}

impl WindowOutcome<'_> {
    pub fn count_for(&self, id: &str) -> usize {
        self.per_channel_counts
            .get(&normalize(id))
            .copied()
            .unwrap_or(0)
    }
}

/// Keep programmes of valid channels that start no later than the cutoff.
/// There is no lower bound. A start time that cannot be parsed keeps the
/// programme.
pub fn filter_window<'a>(
    doc: &'a EpgDocument,
    valid: &ValidChannelSet,
    options: &FilterOptions,
) -> WindowOutcome<'a> {
    let cutoff = options.cutoff();
    let mut outcome = WindowOutcome::default();

    for programme in &doc.programmes {
        let channel_id = normalize(&programme.channel);
        if !valid.contains(&channel_id) {
            continue;
        }

        let keep = match parse_start_time(&programme.start) {
            Ok(start) => cutoff.map_or(true, |cutoff| start <= cutoff),
            Err(e) => {
                debug!("Keeping programme on {}: {}", channel_id, e);
                outcome.unparsable += 1;
                true
            }
        };

        if keep {
            outcome.retained.push(programme);
            *outcome.per_channel_counts.entry(channel_id).or_insert(0) += 1;
        }
    }

    outcome
}

/// Build the output document: valid channels with at least one retained
/// programme, and exactly the retained programmes. Input order is kept.
pub fn prune(doc: &EpgDocument, valid: &ValidChannelSet, window: &WindowOutcome<'_>) -> EpgDocument {
    let channels = doc
        .channels
        .iter()
        .filter(|channel| valid.contains(&channel.id) && window.count_for(&channel.id) > 0)
        .cloned()
        .collect();

    EpgDocument {
        source_name: doc.source_name.clone(),
        root_attributes: doc.root_attributes.clone(),
        channels,
        programmes: window.retained.iter().map(|p| (*p).clone()).collect(),
    }
}

/// Counters reported after a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub channels_in: usize,
    pub programmes_in: usize,
    pub matched_channels: usize,
    pub programmes_retained: usize,
    pub unparsable_starts: usize,
    pub channels_pruned: usize,
    pub channels_out: usize,
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub document: EpgDocument,
    pub stats: ReconcileStats,
}

/// Run the whole pipeline over parsed feeds
pub fn reconcile(
    index: &LineupIndex,
    docs: Vec<EpgDocument>,
    options: &FilterOptions,
) -> GrabberResult<ReconcileOutcome> {
    let merged = merge(docs)?;
    Ok(reconcile_merged(index, &merged, options))
}

/// Match, window and prune an already merged document
pub fn reconcile_merged(
    index: &LineupIndex,
    merged: &EpgDocument,
    options: &FilterOptions,
) -> ReconcileOutcome {
    let valid = match_channels(merged, index);
    let matched_channels = merged
        .channels
        .iter()
        .filter(|channel| valid.contains(&channel.id))
        .count();
    info!(
        "Matched {} EPG channel entries ({} distinct ids) against the lineup",
        matched_channels,
        valid.len()
    );
    if valid.is_empty() {
        warn!("No EPG channel matches the lineup by tvg-id or name");
    }

    let window = filter_window(merged, &valid, options);
    info!(
        "Retained {} programmes within {} days ({} with unparsable start)",
        window.retained.len(),
        options.horizon_days,
        window.unparsable
    );

    let document = prune(merged, &valid, &window);
    let channels_pruned = matched_channels - document.channels.len();
    info!(
        "Pruned {} channels without programmes, {} channels remain",
        channels_pruned,
        document.channels.len()
    );

    let stats = ReconcileStats {
        channels_in: merged.channels.len(),
        programmes_in: merged.programmes.len(),
        matched_channels,
        programmes_retained: window.retained.len(),
        unparsable_starts: window.unparsable,
        channels_pruned,
        channels_out: document.channels.len(),
    };

    ReconcileOutcome { document, stats }
}
