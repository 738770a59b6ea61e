//! Timestamped transcript segments.

use serde::{Deserialize, Serialize};

use crate::sanitize::format_timestamp;

/// A span of transcribed speech. Times are absolute seconds from media start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into().trim().to_string(),
        }
    }
}

/// Time window handed to the transcriber.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    /// `f64::INFINITY` means "until the end of the media".
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// The whole media, used when the source reported no duration.
    pub fn full() -> Self {
        Self {
            start: 0.0,
            end: f64::INFINITY,
        }
    }

    pub fn is_full(&self) -> bool {
        self.start <= 0.0 && self.end.is_infinite()
    }
}

/// Renders segments as `[HH:MM:SS] text` lines.
pub fn format_transcript(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|segment| format!("{} {}", format_timestamp(segment.start), segment.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Plain text of all segments, space separated.
pub fn full_text(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|segment| segment.text.as_str())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
