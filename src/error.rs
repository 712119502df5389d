//! Error types for the guide grabber
//!
//! `GrabberError` covers every failure that aborts a run. Timestamp problems
//! never reach it: the window filter absorbs them.

use std::fmt;
use thiserror::Error;

/// Which input a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStage {
    Playlist,
    Epg,
}

impl fmt::Display for InputStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputStage::Playlist => f.write_str("playlist"),
            InputStage::Epg => f.write_str("EPG"),
        }
    }
}

#[derive(Error, Debug)]
pub enum GrabberError {
    /// Source file missing or unreadable
    #[error("{stage} source unavailable: {source_name} - {message}")]
    Input {
        stage: InputStage,
        source_name: String,
        message: String,
    },

    /// Remote retrieval failed
    #[error("Fetch failed for {address}: {message}")]
    Fetch { address: String, message: String },

    #[error("Decompression failed for {address}: {message}")]
    Decompress { address: String, message: String },

    /// Guide markup is not well-formed
    #[error("EPG parse error in {source_name}: {message}")]
    Parse { source_name: String, message: String },

    /// Guide document lacks a required container
    #[error("EPG schema error in {source_name}: {message}")]
    Schema { source_name: String, message: String },

    #[error("Failed to write {path}: {message}")]
    Write { path: String, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl GrabberError {
    pub fn input(stage: InputStage, source_name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Input {
            stage,
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    pub fn parse(source_name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    pub fn schema(source_name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Schema {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    pub fn write(path: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Write {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub type GrabberResult<T> = Result<T, GrabberError>;

/// A programme start time that does not carry 14 leading digits of a valid
/// calendar instant. Never leaves the window filter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unparsable start time {value:?}")]
pub struct TimestampParseError {
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_stage() {
        let err = GrabberError::input(InputStage::Playlist, "playlist.m3u", "No such file");
        assert_eq!(
            err.to_string(),
            "playlist source unavailable: playlist.m3u - No such file"
        );

        let err = GrabberError::schema("epg_1", "no <channel> elements");
        assert!(err.to_string().starts_with("EPG schema error in epg_1"));
    }
}
