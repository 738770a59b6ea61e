//! Markdown documents written for transcripts and summaries.

use chrono::{NaiveDate, Utc};

use crate::job::MediaMetadata;
use crate::sanitize;

/// Longest description excerpt kept in a transcript header.
pub const DESCRIPTION_EXCERPT_CHARS: usize = 500;

/// Parses an upload date as reported by media sites (`20240131` or `2024-01-31`).
pub fn parse_upload_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// Date used in file names: the upload date when known, otherwise today.
pub fn document_date(metadata: &MediaMetadata) -> NaiveDate {
    metadata
        .upload_date
        .as_deref()
        .and_then(parse_upload_date)
        .unwrap_or_else(|| Utc::now().date_naive())
}

fn display_date(metadata: &MediaMetadata) -> String {
    match metadata.upload_date.as_deref() {
        Some(raw) => match parse_upload_date(raw) {
            Some(date) => date.format("%Y-%m-%d").to_string(),
            None => raw.to_string(),
        },
        None => "Unknown".to_string(),
    }
}

fn title(metadata: &MediaMetadata) -> &str {
    if metadata.title.trim().is_empty() {
        "Untitled"
    } else {
        metadata.title.trim()
    }
}

fn description_excerpt(description: &str) -> String {
    let description = description.trim();
    if description.chars().count() > DESCRIPTION_EXCERPT_CHARS {
        let excerpt: String = description.chars().take(DESCRIPTION_EXCERPT_CHARS).collect();
        format!("{}...", excerpt)
    } else {
        description.to_string()
    }
}

/// Transcript document: metadata header, description excerpt, then the
/// `[HH:MM:SS] text` lines.
pub fn transcript_document(metadata: &MediaMetadata, transcript: &str) -> String {
    let mut doc = format!("# {}\n\n", title(metadata));
    doc.push_str(&format!("**Author**: {}\n", metadata.author));
    doc.push_str(&format!("**Date**: {}\n", display_date(metadata)));
    doc.push_str(&format!("**URL**: {}\n", metadata.url));
    doc.push_str(&format!(
        "**Duration**: {}\n",
        sanitize::format_duration(metadata.duration_secs)
    ));

    let description = description_excerpt(&metadata.description);
    if !description.is_empty() {
        doc.push_str("\n## Description\n");
        doc.push_str(&description);
        doc.push('\n');
    }

    doc.push_str("\n## Transcript\n\n");
    doc.push_str(transcript);
    doc.push('\n');
    doc
}

pub fn summary_document(metadata: &MediaMetadata, summary: &str) -> String {
    format!(
        "# {} - Summary\n\n**Author**: {}\n**Date**: {}\n**Processed**: {}\n\n---\n\n{}\n",
        title(metadata),
        metadata.author,
        display_date(metadata),
        Utc::now().format("%Y-%m-%d"),
        summary.trim()
    )
}
