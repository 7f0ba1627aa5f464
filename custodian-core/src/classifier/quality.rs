//! Quality-descriptor extraction used to decide whether an incoming file should replace an
//! existing destination file of the same title.

use once_cell::sync::Lazy;
use regex::Regex;

const RESOLUTIONS: &[&str] = &["2160p", "4K", "UHD", "1080p", "720p", "480p", "576p", "360p"];
const SOURCES: &[&str] = &[
    "BluRay", "Bluray", "BDRip", "BRRip", "WEBRip", "WEB-DL", "WebDl", "HDTV", "SDTV", "DVDRip",
    "DVD", "CAM", "TS", "HC", "HDCAM", "HDRip",
];

static RELEASE_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"-(\w+)(?:\.\w+)?$").unwrap());

/// A coarse ranking of resolution tiers, used only to compare candidate files, never persisted.
fn resolution_rank(res: &str) -> u8 {
    match res {
        "2160p" | "4K" | "UHD" => 4,
        "1080p" => 3,
        "720p" => 2,
        "576p" | "480p" => 1,
        _ => 0,
    }
}

fn source_rank(source: &str) -> u8 {
    match source {
        "BluRay" | "Bluray" | "BDRip" | "BRRip" => 3,
        "WEBRip" | "WEB-DL" | "WebDl" => 2,
        "HDTV" => 1,
        _ => 0,
    }
}

/// Structured comparison key derived from resolution/source/release-group tokens in a filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityDescriptor {
    pub resolution: Option<String>,
    pub source: Option<String>,
    pub release_group: Option<String>,
}

impl QualityDescriptor {
    pub fn from_filename(name: &str) -> Self {
        QualityDescriptor {
            resolution: extract_token(name, RESOLUTIONS),
            source: extract_token(name, SOURCES),
            release_group: RELEASE_GROUP.captures(name).map(|c| c[1].to_string()),
        }
    }

    /// `true` when `self` is a strict improvement over `other` — used to decide whether an
    /// incoming file should overwrite an existing destination file.
    pub fn is_better_than(&self, other: &QualityDescriptor) -> bool {
        let self_res = self.resolution.as_deref().map(resolution_rank).unwrap_or(0);
        let other_res = other.resolution.as_deref().map(resolution_rank).unwrap_or(0);
        if self_res != other_res {
            return self_res > other_res;
        }
        let self_src = self.source.as_deref().map(source_rank).unwrap_or(0);
        let other_src = other.source.as_deref().map(source_rank).unwrap_or(0);
        self_src > other_src
    }
}

impl std::fmt::Display for QualityDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.resolution.as_deref().unwrap_or("unknown resolution"))
    }
}

fn extract_token(name: &str, candidates: &[&str]) -> Option<String> {
    let lower = name.to_ascii_lowercase();
    candidates
        .iter()
        .find(|candidate| lower.contains(&candidate.to_ascii_lowercase()))
        .map(|candidate| candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_resolution_and_source() {
        let q = QualityDescriptor::from_filename("Movie.2020.1080p.BluRay.x264-GROUP.mkv");
        assert_eq!(q.resolution.as_deref(), Some("1080p"));
        assert_eq!(q.source.as_deref(), Some("BluRay"));
        assert_eq!(q.release_group.as_deref(), Some("GROUP"));
    }

    #[test]
    fn higher_resolution_wins() {
        let better = QualityDescriptor::from_filename("Movie.2020.2160p.WEB-DL.mkv");
        let worse = QualityDescriptor::from_filename("Movie.2020.720p.HDTV.mkv");
        assert!(better.is_better_than(&worse));
        assert!(!worse.is_better_than(&better));
    }

    #[test]
    fn equal_resolution_breaks_on_source() {
        let bluray = QualityDescriptor::from_filename("Movie.2020.1080p.BluRay.mkv");
        let webdl = QualityDescriptor::from_filename("Movie.2020.1080p.WEB-DL.mkv");
        assert!(bluray.is_better_than(&webdl));
    }
}
