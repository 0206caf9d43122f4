use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

const MAX_FILENAME_CHARS: usize = 100;

static INVALID_CHARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\\/:*?"<>|]"#).expect("invalid chars regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static DASH_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").expect("dash run regex"));

/// Filesystem-safe stem for a conversation title. Keeps non-ASCII text; only
/// characters that are invalid in filenames are dropped.
pub fn sanitize_filename(title: &str) -> String {
    sanitize_filename_at(title, Utc::now())
}

pub fn sanitize_filename_at(title: &str, now: DateTime<Utc>) -> String {
    let stem = INVALID_CHARS_RE.replace_all(title, "");
    let stem = WHITESPACE_RE.replace_all(&stem, "-");
    let stem = DASH_RUN_RE.replace_all(&stem, "-");
    let stem: String = stem.trim_matches('-').chars().take(MAX_FILENAME_CHARS).collect();

    if stem.chars().count() < 2 {
        return format!("gemini-chat-{}", now.format("%Y-%m-%dT%H-%M-%S"));
    }
    stem
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn strips_invalid_and_dashes_whitespace() {
        assert_eq!(
            sanitize_filename_at("  What is: a \"monad\"?  ", fixed()),
            "What-is-a-monad"
        );
        assert_eq!(sanitize_filename_at("a - b", fixed()), "a-b");
    }

    #[test]
    fn keeps_unicode() {
        assert_eq!(sanitize_filename_at("平台型公司讨论", fixed()), "平台型公司讨论");
    }

    #[test]
    fn truncates_by_chars() {
        let long = "é".repeat(150);
        assert_eq!(sanitize_filename_at(&long, fixed()).chars().count(), 100);
    }

    #[test]
    fn too_short_gets_timestamp() {
        assert_eq!(
            sanitize_filename_at("?/", fixed()),
            "gemini-chat-2025-03-09T14-05-07"
        );
        assert_eq!(sanitize_filename_at("x", fixed()), "gemini-chat-2025-03-09T14-05-07");
    }
}
