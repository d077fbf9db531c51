//! Utility functions for sizes, titles and links

use url::Url;

const BYTE_UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

/// Render a byte count for log messages
///
/// # Examples
///
/// ```
/// use audio_relay::utils::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.0 GB");
/// ```
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, BYTE_UNITS[unit])
}

/// Normalize a media title or file name for fuzzy matching
///
/// Drops ASCII punctuation and spaces. Other characters, including non-Latin
/// letters, are kept as they are.
///
/// # Examples
///
/// ```
/// use audio_relay::utils::normalize_title;
///
/// assert_eq!(normalize_title("Song Title"), "SongTitle");
/// assert_eq!(normalize_title("Song_Title_x.mp3"), "SongTitlexmp3");
/// ```
#[must_use]
pub fn normalize_title(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_ascii_punctuation() && *c != ' ')
        .collect()
}

/// Parse a submitted link, accepting only absolute http and https URLs
#[must_use]
pub fn parse_http_link(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let url = Url::parse(trimmed).ok()?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Some(url),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024 + 512 * 1024), "3.5 MB");
        // Largest unit is PB
        assert_eq!(format_bytes(u64::MAX), "16384.0 PB");
    }

    #[test]
    fn test_normalize_title_strips_ascii_punctuation() {
        assert_eq!(normalize_title("Don't Stop (Live) - 2024!"), "DontStopLive2024");
        assert_eq!(normalize_title("Песня: Title"), "ПесняTitle");
        assert_eq!(normalize_title(""), "");
    }

    #[test]
    fn test_parse_http_link() {
        assert!(parse_http_link("http://a").is_some());
        assert!(parse_http_link("  https://www.youtube.com/watch?v=abc  ").is_some());
        assert!(parse_http_link("").is_none());
        assert!(parse_http_link("ftp://example.com/file").is_none());
        assert!(parse_http_link("httpfoo").is_none());
        assert!(parse_http_link("not a url").is_none());
    }
}
