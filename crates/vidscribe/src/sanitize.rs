//! Helpers for sanitizing data before it reaches file names or span fields.
//!
//! Media URLs can carry signed query strings or credentials; span fields only
//! ever see the redacted form.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

/// Maximum size in UTF-8 bytes of a slug produced by [`slugify`]. Leaves room
/// for the date prefix, kind suffix and conflict counter under the usual
/// 255-byte file name limit.
pub const MAX_SLUG_BYTES: usize = 200;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Strips userinfo, query string and fragment from a URL.
///
/// - `https://user:pw@host/watch?v=1&sig=abc` → `https://****@host/watch`
/// - `https://host/path` → `https://host/path` (no change)
pub fn redact_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);

    if let Some(scheme_end) = without_query.find("://") {
        let after_scheme = &without_query[scheme_end + 3..];
        let authority_end = after_scheme.find('/').unwrap_or(after_scheme.len());
        if let Some(at_pos) = after_scheme[..authority_end].rfind('@') {
            let scheme = &without_query[..scheme_end + 3];
            return format!("{}****@{}", scheme, &after_scheme[at_pos + 1..]);
        }
    }

    without_query.to_string()
}

fn strip_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\w\s-]").expect("static regex is valid"))
}

fn dash_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[-\s]+").expect("static regex is valid"))
}

/// Turns a media title into a filesystem-safe slug of at most `max_bytes`
/// UTF-8 bytes, cut on a character boundary.
pub fn slugify(title: &str, max_bytes: usize) -> String {
    let lowered = title.to_lowercase();
    let stripped = strip_pattern().replace_all(&lowered, "");
    let dashed = dash_pattern().replace_all(&stripped, "-");
    let mut slug = dashed.trim_matches('-').to_string();

    if slug.len() > max_bytes {
        let cut = slug
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .take_while(|&end| end <= max_bytes)
            .last()
            .unwrap_or(0);
        let truncated = &slug[..cut];
        slug = match truncated.rsplit_once('-') {
            Some((head, _)) if !head.is_empty() => head.to_string(),
            _ => truncated.to_string(),
        };
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// Formats seconds as `[HH:MM:SS]`.
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!(
        "[{:02}:{:02}:{:02}]",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Formats seconds as a human readable duration like `1h 23m 45s`.
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{}s", secs));
    }
    parts.join(" ")
}
