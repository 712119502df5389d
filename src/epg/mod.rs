//! EPG (Electronic Program Guide) module
//!
//! Contains the XMLTV document model, its reader and writer, and the
//! lineup reconciliation engine.

mod document;
mod filter;
mod parser;
mod writer;


// Re-export public types
pub use document::{
    flatten_display_names,
    ChannelEntry,
    DisplayName,
    EpgDocument,
    NameValue,
    ProgrammeEntry,
    XmlElement,
    XmlNode,
};
pub use filter::{
    channel_matches,
    filter_window,
    match_channels,
    merge,
    parse_start_time,
    prune,
    reconcile,
    reconcile_merged,
    FilterOptions,
    ReconcileOutcome,
    ReconcileStats,
    ValidChannelSet,
    WindowOutcome,
    DEFAULT_HORIZON_DAYS,
};
pub use parser::EpgParser;
pub use writer::{to_xml_bytes, to_xml_string, write_document};

/// Format a UTC instant in the XMLTV start-time layout
pub fn format_xmltv_time(ts: chrono::NaiveDateTime) -> String {
    ts.format("%Y%m%d%H%M%S +0000").to_string()
}
