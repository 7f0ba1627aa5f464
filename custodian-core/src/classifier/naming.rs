use once_cell::sync::Lazy;
use regex::Regex;

static COLLAPSE_WHITESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex should compile"));

static ILLEGAL_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("illegal-char regex should compile"));

/// Collapse repeated whitespace sequences into single spaces while trimming ends.
pub fn collapse_whitespace(value: &str) -> String {
    COLLAPSE_WHITESPACE_REGEX.replace_all(value.trim(), " ").to_string()
}

/// Normalize a parsed title by collapsing punctuation separators and redundant whitespace.
pub fn clean_title(title: &str) -> String {
    let collapsed = title.replace(['.', '_'], " ");
    collapse_whitespace(&collapsed)
}

/// Strip characters that cannot appear in a filename on common host filesystems.
pub fn strip_illegal_chars(value: &str) -> String {
    ILLEGAL_FILENAME_CHARS.replace_all(value, "").to_string()
}

/// Build a destination-safe path segment: cleaned, illegal characters stripped, re-collapsed.
pub fn sanitize_path_segment(value: &str) -> String {
    collapse_whitespace(&strip_illegal_chars(&clean_title(value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace() {
        assert_eq!(collapse_whitespace("  a   b\tc  "), "a b c");
    }

    #[test]
    fn cleans_separators() {
        assert_eq!(clean_title("The.Wire_S01"), "The Wire S01");
    }

    #[test]
    fn strips_illegal_characters() {
        assert_eq!(strip_illegal_chars(r#"Who: What?"#), "Who What");
    }

    #[test]
    fn sanitizes_path_segment() {
        assert_eq!(sanitize_path_segment("The.Wire: Season_1"), "The Wire Season 1");
    }
}
