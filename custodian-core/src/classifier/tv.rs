//! Television episode signature detection: `SxxExx`, `xxXxx`, `Season N` folders, daily-show
//! dates, and absolute numbering. Ported from the filename-parsing half of a Jellyfin-style
//! scanner and generalized to the custodian's classifier contract.

use std::path::Path;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// Parsed episode coordinates. `season`/`episode` are `None` for a daily-dated episode that
/// carries only a date, not a season/episode pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeInfo {
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub end_episode: Option<u32>,
    pub year: Option<u32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub absolute_episode: Option<u32>,
    pub is_special: bool,
}

impl EpisodeInfo {
    pub fn is_daily(&self) -> bool {
        self.year.is_some() && self.month.is_some() && self.day.is_some()
    }
}

struct EpisodePattern {
    name: &'static str,
    regex: Lazy<Regex>,
}

macro_rules! episode_pattern {
    ($name:literal, $re:literal) => {
        EpisodePattern {
            name: $name,
            regex: Lazy::new(|| Regex::new($re).expect("episode pattern should compile")),
        }
    };
}

static MULTI_EPISODE_DASH: EpisodePattern =
    episode_pattern!("multi_episode_dash", r"(?i)[Ss](\d{1,3})[Ee](\d{1,4})(?:-[Ee]?(\d{1,4}))?");
static MULTI_EPISODE_CONCAT: EpisodePattern =
    episode_pattern!("multi_episode_concat", r"(?i)[Ss](\d{1,3})[Ee](\d{1,4})[Ee](\d{1,4})");
static MULTI_EPISODE_X: EpisodePattern =
    episode_pattern!("multi_episode_x", r"(\d{1,3})[xX](\d{1,4})(?:-[xX]?(\d{1,4}))?");
static SEASON_EPISODE_WORDS: EpisodePattern =
    episode_pattern!("season_episode", r"(?i)season\s*(\d{1,3})\s*episode\s*(\d{1,4})");
static SEASON_UNDERSCORE_EPISODE: EpisodePattern =
    episode_pattern!("s00_e00", r"(?i)[Ss](\d{1,3})[\s_-]+[Ee](\d{1,4})");
static EP_PREFIXED: EpisodePattern =
    episode_pattern!("ep000", r"(?i)(?:ep|episode)\s*(\d)(\d{2})");
static BARE_TRIPLET: EpisodePattern = episode_pattern!("000", r"(?:^|\D)(\d)(\d{2})(?:\D|$)");
static ABSOLUTE_NUMBER: EpisodePattern =
    episode_pattern!("absolute", r"(?:^|\D)(\d{2,4})(?:\D|$)");

static DATE_YMD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)(\d{4})[.\-](\d{2})[.\-](\d{2})(?:\D|$)").unwrap());
static DATE_DMY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)(\d{2})[.\-](\d{2})[.\-](\d{4})(?:\D|$)").unwrap());
static DATE_COMPACT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)(\d{4})(\d{2})(\d{2})(?:\D|$)").unwrap());

static SEASON_FOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:season\s*(\d{1,3})|s(\d{1,3})|series\s*(\d{1,3}))$").unwrap());
static SPECIALS_FOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^specials?$").unwrap());

fn episode_patterns() -> [&'static EpisodePattern; 8] {
    [
        &MULTI_EPISODE_DASH,
        &MULTI_EPISODE_CONCAT,
        &MULTI_EPISODE_X,
        &SEASON_EPISODE_WORDS,
        &SEASON_UNDERSCORE_EPISODE,
        &EP_PREFIXED,
        &BARE_TRIPLET,
        &ABSOLUTE_NUMBER,
    ]
}

/// Try date-based patterns first (daily shows), then season/episode patterns, falling back to
/// the enclosing folder structure. `allow_absolute` gates the bare-number absolute-numbering
/// pattern, which is only trustworthy when the caller already suspects anime-style numbering.
pub fn parse_episode_info(path: &Path, allow_absolute: bool) -> Option<EpisodeInfo> {
    let filename = path.file_name()?.to_string_lossy().to_string();

    if let Some(info) = parse_date(&filename) {
        return Some(info);
    }

    if let Some(info) = parse_with_patterns(&filename, allow_absolute) {
        return Some(info);
    }

    parse_from_folder_structure(path, allow_absolute)
}

fn parse_date(text: &str) -> Option<EpisodeInfo> {
    for re in [&*DATE_YMD, &*DATE_COMPACT] {
        if let Some(caps) = re.captures(text) {
            let year: u32 = caps[1].parse().ok()?;
            let month: u32 = caps[2].parse().ok()?;
            let day: u32 = caps[3].parse().ok()?;
            if NaiveDate::from_ymd_opt(year as i32, month, day).is_some() {
                return Some(EpisodeInfo {
                    season: None,
                    episode: None,
                    end_episode: None,
                    year: Some(year),
                    month: Some(month),
                    day: Some(day),
                    absolute_episode: None,
                    is_special: false,
                });
            }
        }
    }
    if let Some(caps) = DATE_DMY.captures(text) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year: u32 = caps[3].parse().ok()?;
        if NaiveDate::from_ymd_opt(year as i32, month, day).is_some() {
            return Some(EpisodeInfo {
                season: None,
                episode: None,
                end_episode: None,
                year: Some(year),
                month: Some(month),
                day: Some(day),
                absolute_episode: None,
                is_special: false,
            });
        }
    }
    None
}

fn parse_with_patterns(text: &str, allow_absolute: bool) -> Option<EpisodeInfo> {
    for pattern in episode_patterns() {
        if pattern.name == "absolute" && !allow_absolute {
            continue;
        }
        let Some(caps) = pattern.regex.captures(text) else {
            continue;
        };
        match pattern.name {
            "multi_episode_dash" | "multi_episode_concat" | "multi_episode_x" | "season_episode"
            | "s00_e00" => {
                let season: u32 = caps[1].parse().ok()?;
                let episode: u32 = caps[2].parse().ok()?;
                let end_episode = caps.get(3).and_then(|m| m.as_str().parse().ok());
                return Some(EpisodeInfo {
                    season: Some(season),
                    episode: Some(episode),
                    end_episode,
                    year: None,
                    month: None,
                    day: None,
                    absolute_episode: None,
                    is_special: season == 0,
                });
            }
            "ep000" | "000" => {
                let season: u32 = caps[1].parse().ok()?;
                let episode: u32 = caps[2].parse().ok()?;
                return Some(EpisodeInfo {
                    season: Some(season),
                    episode: Some(episode),
                    end_episode: None,
                    year: None,
                    month: None,
                    day: None,
                    absolute_episode: None,
                    is_special: season == 0,
                });
            }
            "absolute" => {
                let absolute: u32 = caps[1].parse().ok()?;
                return Some(EpisodeInfo {
                    season: None,
                    episode: None,
                    end_episode: None,
                    year: None,
                    month: None,
                    day: None,
                    absolute_episode: Some(absolute),
                    is_special: false,
                });
            }
            _ => unreachable!(),
        }
    }
    None
}

fn parse_from_folder_structure(path: &Path, allow_absolute: bool) -> Option<EpisodeInfo> {
    let parent_name = path.parent()?.file_name()?.to_string_lossy().to_string();
    let season = parse_season_folder(&parent_name)?;
    let filename = path.file_name()?.to_string_lossy().to_string();
    let mut info = parse_with_patterns(&filename, allow_absolute)?;
    if info.season.is_none() {
        info.season = Some(season);
    }
    Some(info)
}

/// Parse a season-folder name (`Season 02`, `S02`, `Specials`, `Series 2`) into a season number.
pub fn parse_season_folder(name: &str) -> Option<u32> {
    if SPECIALS_FOLDER.is_match(name) {
        return Some(0);
    }
    let caps = SEASON_FOLDER.captures(name)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .and_then(|m| m.as_str().parse().ok())
}

/// Walk up from a season-folder parent to find the series name, falling back to the immediate
/// parent directory name when no season folder is present in the path.
pub fn extract_series_name(path: &Path) -> Option<String> {
    let parent = path.parent()?;
    let parent_name = parent.file_name()?.to_string_lossy().to_string();
    if parse_season_folder(&parent_name).is_some() || SPECIALS_FOLDER.is_match(&parent_name) {
        let grandparent = parent.parent()?;
        return Some(grandparent.file_name()?.to_string_lossy().to_string());
    }
    Some(parent_name)
}

/// Heuristic check for TV-series folder structure: season folder in the ancestry, or
/// season/episode-shaped tokens embedded directly in the filename.
pub fn is_in_tv_structure(path: &Path) -> bool {
    if let Some(parent) = path.parent() {
        if let Some(name) = parent.file_name() {
            let name = name.to_string_lossy();
            if parse_season_folder(&name).is_some() || SPECIALS_FOLDER.is_match(&name) {
                return true;
            }
        }
        if let Some(grandparent) = parent.parent().and_then(|p| p.file_name()) {
            let name = grandparent.to_string_lossy();
            if parse_season_folder(&name).is_some() {
                return true;
            }
        }
    }
    let filename = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    MULTI_EPISODE_DASH.regex.is_match(&filename) || MULTI_EPISODE_X.regex.is_match(&filename)
}

static ANIME_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)anime|subbed|dubbed|\[BD\]|\[DVD\]|\[[A-Za-z0-9_-]+\]").unwrap()
});

/// Heuristic check for anime-style releases, where absolute episode numbering is common and a
/// bare bracketed release-group prefix is the norm.
pub fn is_likely_anime(path: &Path) -> bool {
    let text = path.to_string_lossy();
    ANIME_HINT.is_match(&text)
}

static EPISODE_TITLE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^.*?(?:[Ss]\d{1,3}[Ee]\d{1,4}|\d{1,3}[xX]\d{1,4}|\d{1,3})[\s._-]*").unwrap()
});

/// Strip the leading season/episode token from a filename stem, leaving the episode title.
pub fn extract_episode_title(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy().to_string();
    let stripped = EPISODE_TITLE_PREFIX.replace(&stem, "").to_string();
    let cleaned = stripped.replace(['.', '_'], " ");
    let trimmed = cleaned.trim().trim_start_matches('-').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
