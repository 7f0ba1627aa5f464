//! Path classification: decide whether an incoming file is a movie or a TV episode and parse
//! its title, year, and (for episodes) season/episode coordinates.

pub mod naming;
pub mod quality;
pub mod title;
pub mod tv;

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

pub use quality::QualityDescriptor;

const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "m2ts", "ts",
];

/// Which watch root a file was discovered under. Movies and episodes are never reclassified
/// against each other purely from the hint alone — see [`classify`] for the tie-break rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceHint {
    Tv,
    Movie,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Movie,
    Episode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMethod {
    Regex,
    FolderName,
    ExternalHint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    Certain,
    Heuristic,
}

/// Episode coordinates attached to a [`ClassifiedFile`] when `kind == MediaKind::Episode`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeCoordinates {
    pub season: u32,
    pub episode: u32,
    pub end_episode: Option<u32>,
    pub absolute_episode: Option<u32>,
    pub is_daily: bool,
    pub air_month: Option<u32>,
    pub air_day: Option<u32>,
}

/// The immutable outcome of classifying a single filesystem path.
#[derive(Debug, Clone)]
pub struct ClassifiedFile {
    pub source_path: PathBuf,
    pub kind: MediaKind,
    pub title: String,
    pub year: Option<u32>,
    pub episode: Option<EpisodeCoordinates>,
    pub parse_method: ParseMethod,
    pub confidence: Confidence,
    pub extension: String,
}

/// Why a path was rejected by the classifier. Carried back to the orchestrator for logging;
/// never retried automatically.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason}")]
pub struct RejectionReason {
    pub reason: String,
}

fn reject(reason: impl Into<String>) -> RejectionReason {
    RejectionReason { reason: reason.into() }
}

static OBFUSCATED_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{8,}$").unwrap());

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase())
}

/// Cheap pre-filter the sweeper uses to skip non-media files before paying for a full classify.
pub fn has_video_extension(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

fn is_obfuscated(stem: &str) -> bool {
    stem.len() >= 8 && OBFUSCATED_NAME.is_match(stem) && !stem.contains(['.', '_', '-', ' '])
}

/// Classify a single path given the watch-root hint it was discovered under.
///
/// Follows the order laid out in the spec: extension gate, obfuscated-name substitution,
/// TV-signature detection (filename and path), title/year parse, then the movie/episode
/// tie-break (episode marker wins; absent one, the watch-root hint decides).
pub fn classify(path: &Path, hint: SourceHint) -> Result<ClassifiedFile, RejectionReason> {
    let extension = extension_of(path).ok_or_else(|| reject("no file extension"))?;
    if !VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        return Err(reject(format!("extension .{extension} is not a recognized video type")));
    }

    let effective_path = obfuscation_substitute(path);

    let tv_signature = tv::parse_episode_info(&effective_path, tv::is_likely_anime(&effective_path));
    let in_tv_structure = tv::is_in_tv_structure(&effective_path);

    let is_episode = tv_signature.is_some() || in_tv_structure || hint == SourceHint::Tv;

    if is_episode {
        classify_as_episode(path, &effective_path, tv_signature, extension)
    } else {
        classify_as_movie(path, &effective_path, extension)
    }
}

/// Obfuscated release names (a bare hex blob with no separators) carry no information; when one
/// is detected, classification proceeds against the enclosing directory name instead while the
/// original path is preserved for the transfer step.
fn obfuscation_substitute(path: &Path) -> PathBuf {
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
        return path.to_path_buf();
    };
    if !is_obfuscated(&stem) {
        return path.to_path_buf();
    }
    let Some(parent) = path.parent() else {
        return path.to_path_buf();
    };
    let Some(parent_name) = parent.file_name() else {
        return path.to_path_buf();
    };
    let extension = path.extension().map(|e| e.to_string_lossy().to_string()).unwrap_or_default();
    let mut substituted = PathBuf::from(parent_name);
    if extension.is_empty() {
        substituted
    } else {
        substituted.set_extension(extension);
        substituted
    }
}

fn classify_as_episode(
    original_path: &Path,
    effective_path: &Path,
    tv_signature: Option<tv::EpisodeInfo>,
    extension: String,
) -> Result<ClassifiedFile, RejectionReason> {
    let series_name = tv::extract_series_name(effective_path)
        .map(|name| title::clean_series_title(&name))
        .filter(|name| !name.is_empty());

    let info = match tv_signature {
        Some(info) => info,
        None => return Err(reject("could not determine season/episode from path")),
    };

    if info.is_daily() {
        let title = series_name
            .or_else(|| {
                effective_path
                    .parent()
                    .and_then(|p| p.file_name())
                    .map(|n| title::clean_series_title(&n.to_string_lossy()))
            })
            .ok_or_else(|| reject("no series name available for daily episode"))?;
        return Ok(ClassifiedFile {
            source_path: original_path.to_path_buf(),
            kind: MediaKind::Episode,
            title,
            year: info.year,
            episode: Some(EpisodeCoordinates {
                season: 0,
                episode: 0,
                end_episode: None,
                absolute_episode: None,
                is_daily: true,
                air_month: info.month,
                air_day: info.day,
            }),
            parse_method: ParseMethod::Regex,
            confidence: Confidence::Certain,
            extension,
        });
    }

    let title = series_name
        .or_else(|| {
            effective_path
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| title::clean_series_title(&n.to_string_lossy()))
        })
        .ok_or_else(|| reject("no series name available"))?;

    if title.is_empty() {
        return Err(reject("series name resolved to an empty title"));
    }

    let season = match (info.season, info.absolute_episode) {
        (Some(season), _) => season,
        (None, Some(_)) => 1,
        (None, None) => return Err(reject("no season number found")),
    };
    let episode = match (info.episode, info.absolute_episode) {
        (Some(episode), _) => episode,
        (None, Some(absolute)) => absolute,
        (None, None) => return Err(reject("no episode number found")),
    };

    Ok(ClassifiedFile {
        source_path: original_path.to_path_buf(),
        kind: MediaKind::Episode,
        title,
        year: None,
        episode: Some(EpisodeCoordinates {
            season,
            episode,
            end_episode: info.end_episode,
            absolute_episode: info.absolute_episode,
            is_daily: false,
            air_month: None,
            air_day: None,
        }),
        parse_method: if info.season.is_some() { ParseMethod::Regex } else { ParseMethod::FolderName },
        confidence: Confidence::Certain,
        extension,
    })
}

fn classify_as_movie(
    original_path: &Path,
    effective_path: &Path,
    extension: String,
) -> Result<ClassifiedFile, RejectionReason> {
    let (title, year) = title::parse_movie_title(effective_path);
    if title.is_empty() {
        return Err(reject("could not determine a movie title"));
    }
    Ok(ClassifiedFile {
        source_path: original_path.to_path_buf(),
        kind: MediaKind::Movie,
        title,
        year,
        episode: None,
        parse_method: ParseMethod::Regex,
        confidence: if year.is_some() { Confidence::Certain } else { Confidence::Heuristic },
        extension,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_video_extension() {
        let err = classify(Path::new("/downloads/file.txt"), SourceHint::Unknown).unwrap_err();
        assert!(err.reason.contains("extension"));
    }

    #[test]
    fn classifies_movie_from_folder_convention() {
        let file = classify(Path::new("/movies/Arrival (2016)/Arrival.mkv"), SourceHint::Movie).unwrap();
        assert_eq!(file.kind, MediaKind::Movie);
        assert_eq!(file.title, "Arrival");
        assert_eq!(file.year, Some(2016));
    }

    #[test]
    fn classifies_episode_with_season_folder() {
        let file = classify(
            Path::new("/tv/Breaking Bad/Season 01/Breaking Bad S01E03.mkv"),
            SourceHint::Tv,
        )
        .unwrap();
        assert_eq!(file.kind, MediaKind::Episode);
        assert_eq!(file.title, "Breaking Bad");
        let ep = file.episode.unwrap();
        assert_eq!(ep.season, 1);
        assert_eq!(ep.episode, 3);
    }

    #[test]
    fn episode_marker_wins_over_movie_hint() {
        let file = classify(Path::new("/downloads/Show.S02E04.1080p.mkv"), SourceHint::Movie).unwrap();
        assert_eq!(file.kind, MediaKind::Episode);
    }

    #[test]
    fn daily_show_date_parses_as_episode() {
        let file = classify(
            Path::new("/tv/Late Show/Late Show 2024-03-02.mkv"),
            SourceHint::Tv,
        )
        .unwrap();
        assert_eq!(file.kind, MediaKind::Episode);
        assert!(file.episode.unwrap().is_daily);
    }

    #[test]
    fn obfuscated_filename_uses_parent_directory() {
        let file = classify(
            Path::new("/movies/Dune Part Two (2024)/a1b2c3d4e5f60789.mkv"),
            SourceHint::Movie,
        )
        .unwrap();
        assert_eq!(file.kind, MediaKind::Movie);
        assert_eq!(file.title, "Dune Part Two");
        assert_eq!(file.year, Some(2024));
    }

    #[test]
    fn movie_without_year_is_heuristic_confidence() {
        let file = classify(Path::new("/downloads/asdf.mkv"), SourceHint::Unknown).unwrap();
        assert_eq!(file.kind, MediaKind::Movie);
        assert_eq!(file.confidence, Confidence::Heuristic);
        assert!(file.year.is_none());
    }
}
