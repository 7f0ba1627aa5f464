//! Title and year extraction shared by both movie and episode classification paths.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use super::naming::clean_title;

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|[^\d])(19\d{2}|20\d{2})(?:[^\d]|$)").unwrap());
static FOLDER_TITLE_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)\s*\((\d{4})\)\s*$").unwrap());

static QUALITY_CUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(2160p|1080p|720p|480p|576p|360p|4k|uhd|bluray|bdrip|brrip|webrip|web-?dl|hdtv|sdtv|dvdrip|dvd|x264|x265|hevc|10bit|aac|dts|flac|remux)\b",
    )
    .unwrap()
});
static EDITION_CUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(unrated|extended|director'?s cut|theatrical|remastered|special edition)\b")
        .unwrap()
});
static PAREN_CONTENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^()]*\)").unwrap());
static BRACKET_CONTENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\[\]]*\]").unwrap());
static RELEASE_GROUP_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"-[A-Za-z0-9]+$").unwrap());
static TRAILING_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s._-]+$").unwrap());

/// Extract the rightmost plausible release year (1900..=current+2), validated against a
/// whitespace/punctuation boundary so "1999" inside a longer number is not mistaken for one.
pub fn extract_year(text: &str) -> Option<u32> {
    let current_plus = chrono::Utc::now().format("%Y").to_string().parse::<u32>().unwrap_or(2100) + 2;
    YEAR.captures_iter(text)
        .filter_map(|c| c[1].parse::<u32>().ok())
        .filter(|y| (1900..=current_plus).contains(y))
        .last()
}

/// Parse a movie title and year, preferring the enclosing folder's `Title (Year)` convention
/// when present, falling back to the filename itself.
pub fn parse_movie_title(path: &Path) -> (String, Option<u32>) {
    if let Some(parent_name) = path.parent().and_then(|p| p.file_name()) {
        let parent_name = parent_name.to_string_lossy();
        if let Some(caps) = FOLDER_TITLE_YEAR.captures(&parent_name) {
            let year: u32 = caps[2].parse().unwrap_or(0);
            if (1900..=2100).contains(&year) {
                return (clean_movie_title(&caps[1]), Some(year));
            }
        }
    }

    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let year = extract_year(&stem);
    (clean_movie_title(&stem), year)
}

/// Strip quality/source/codec noise, edition tags, bracketed/parenthetical content, and a
/// trailing release-group suffix, leaving a bare display title.
pub fn clean_movie_title(raw: &str) -> String {
    let mut working = raw.replace(['.', '_'], " ");

    if let Some(m) = QUALITY_CUT.find(&working) {
        working.truncate(m.start());
    }
    working = EDITION_CUT.replace_all(&working, "").to_string();
    working = BRACKET_CONTENT.replace_all(&working, "").to_string();

    loop {
        let before = working.len();
        working = PAREN_CONTENT.replace_all(&working, "").to_string();
        if working.len() == before {
            break;
        }
    }

    working = YEAR.replace_all(&working, " ").to_string();
    working = RELEASE_GROUP_SUFFIX.replace(&working, "").to_string();
    working = TRAILING_PUNCT.replace(&working, "").to_string();

    clean_title(&working)
}

/// Strip a trailing `(YYYY)` suffix and punctuation noise from a raw series title, truncating at
/// the first season/episode/part/chapter indicator if one trails the title.
static SERIES_TRUNCATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+(season|episode|part|chapter)\b.*$").unwrap());
static SERIES_YEAR_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(\d{4}\)\s*$").unwrap());

pub fn clean_series_title(raw: &str) -> String {
    let mut working = raw.replace(['.', '_'], " ");
    working = SERIES_YEAR_SUFFIX.replace(&working, "").to_string();
    working = SERIES_TRUNCATE.replace(&working, "").to_string();
    working = RELEASE_GROUP_SUFFIX.replace(&working, "").to_string();
    clean_title(&working)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_year() {
        assert_eq!(extract_year("Movie.Title.2019.1080p.mkv"), Some(2019));
        assert_eq!(extract_year("no year here"), None);
    }

    #[test]
    fn parses_movie_from_folder() {
        let (title, year) = parse_movie_title(Path::new("/movies/Arrival (2016)/Arrival.mkv"));
        assert_eq!(title, "Arrival");
        assert_eq!(year, Some(2016));
    }

    #[test]
    fn parses_movie_from_filename_fallback() {
        let (title, year) =
            parse_movie_title(Path::new("/movies/Arrival.2016.1080p.BluRay.x264-GROUP.mkv"));
        assert_eq!(title, "Arrival");
        assert_eq!(year, Some(2016));
    }

    #[test]
    fn cleans_edition_tags() {
        let title = clean_movie_title("Blade.Runner.2049.Directors.Cut.2017.1080p");
        assert!(title.starts_with("Blade Runner 2049"));
    }

    #[test]
    fn cleans_series_title_with_year_suffix() {
        assert_eq!(clean_series_title("The Wire (2002)"), "The Wire");
    }
}
