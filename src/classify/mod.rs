//! Media classifier
//!
//! A pure, rule-ordered function over `(full_path, filename)` that yields a
//! media category and the canonical on-disk destination directory. No I/O:
//! everything an execution needs is in the path strings and the configured
//! rule tables.

pub mod cleanup;
pub mod rules;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::config::RulesConfig;

/// Media category assigned to one file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
    Variety,
    Video,
    Other,
}

impl MediaType {
    #[allow(dead_code)]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
            Self::Variety => "variety",
            Self::Video => "video",
            Self::Other => "other",
        }
    }
}

/// Classifier output: category plus canonical destination directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub media_type: MediaType,
    pub download_dir: String,
}

/// Keyword tables evaluated in order over a lowercased filename
const MOVIE_KEYWORDS: &[&str] = &[
    "movie", "film", "电影", "蓝光", "bluray", "bd", "4k", "1080p", "720p",
];
const TV_KEYWORDS: &[&str] = &[
    "tv", "series", "episode", "ep", "s01", "s02", "s03", "season", "电视剧", "连续剧",
];
const VARIETY_KEYWORDS: &[&str] = &["variety", "show", "综艺", "娱乐"];
const VIDEO_KEYWORDS: &[&str] = &["videos", "video", "视频"];

const VARIETY_PATH_MARKERS: &[&str] = &["/variety/", "/show/", "/综艺/", "/娱乐/"];
const VIDEO_PATH_MARKERS: &[&str] = &["/videos/", "/video/", "/视频/"];

/// Segments equal to any of these never survive into a canonical path;
/// they are category labels, not content names
const CATEGORY_KEYWORDS: &[&str] = &[
    "tvs", "movies", "variety", "show", "综艺", "娱乐", "videos", "video", "视频",
];

/// ASCII-case-insensitive substring search returning a byte offset valid in
/// the original string
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

fn is_category_keyword(segment: &str) -> bool {
    let lower = segment.to_lowercase();
    CATEGORY_KEYWORDS.iter().any(|k| lower == *k)
}

/// The media classifier and path rewriter
pub struct Classifier {
    base_dir: PathBuf,
    video_extensions: HashSet<String>,
    variety_shows: Vec<String>,
    special_series: Vec<String>,
}

impl Classifier {
    pub fn new(base_dir: PathBuf, rules: &RulesConfig) -> Self {
        Self {
            base_dir,
            video_extensions: rules
                .video_extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            variety_shows: rules.variety_shows.clone(),
            special_series: rules.special_series.clone(),
        }
    }

    /// Classify one file. Deterministic; never fails — unknown inputs land
    /// in `other` under `<base>/others`.
    pub fn classify(&self, full_path: &str, filename: &str) -> Classification {
        let media_type = self
            .classify_by_path(full_path)
            .unwrap_or_else(|| self.classify_by_filename(full_path, filename));

        let download_dir = match media_type {
            MediaType::Tv => self
                .smart_tv_dir(full_path, filename)
                .unwrap_or_else(|| self.generic_dir(media_type, full_path, filename)),
            MediaType::Movie | MediaType::Variety | MediaType::Video => {
                self.generic_dir(media_type, full_path, filename)
            }
            MediaType::Other => self.join_base(&["others"]),
        };

        Classification {
            media_type,
            download_dir,
        }
    }

    pub fn is_video(&self, filename: &str) -> bool {
        filename
            .rsplit_once('.')
            .map(|(_, ext)| self.video_extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }

    /// Step 1: category tokens in the path decide outright
    fn classify_by_path(&self, full_path: &str) -> Option<MediaType> {
        let tv_idx = find_ci(full_path, "tvs");
        let movie_idx = find_ci(full_path, "movies");

        match (tv_idx, movie_idx) {
            // both present: the shallower segment wins
            (Some(t), Some(m)) => Some(if t <= m { MediaType::Tv } else { MediaType::Movie }),
            (Some(_), None) => Some(MediaType::Tv),
            (None, Some(_)) => Some(MediaType::Movie),
            (None, None) => {
                if VARIETY_PATH_MARKERS
                    .iter()
                    .any(|m| find_ci(full_path, m).is_some())
                {
                    Some(MediaType::Variety)
                } else if VIDEO_PATH_MARKERS
                    .iter()
                    .any(|m| find_ci(full_path, m).is_some())
                {
                    Some(MediaType::Video)
                } else {
                    None
                }
            }
        }
    }

    /// Step 2: filename heuristics for paths without category tokens
    fn classify_by_filename(&self, full_path: &str, filename: &str) -> MediaType {
        if !self.is_video(filename) {
            return MediaType::Other;
        }

        // strong TV evidence beats any movie-looking quality keyword
        if self.has_strong_tv_indicator(full_path, filename) {
            return MediaType::Tv;
        }

        let lower = filename.to_lowercase();
        if MOVIE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            MediaType::Movie
        } else if TV_KEYWORDS.iter().any(|k| lower.contains(k)) {
            MediaType::Tv
        } else if VARIETY_KEYWORDS.iter().any(|k| lower.contains(k)) {
            MediaType::Variety
        } else {
            MediaType::Video
        }
    }

    fn has_strong_tv_indicator(&self, full_path: &str, filename: &str) -> bool {
        if rules::has_season_episode_marker(filename)
            || rules::has_season_marker(filename)
            || rules::is_episode_number(cleanup::file_stem(filename))
            || rules::has_episode_token(filename)
            || rules::has_date_token(filename)
        {
            return true;
        }

        if find_ci(full_path, "/tvs/").is_some() || find_ci(full_path, "/series/").is_some() {
            return true;
        }

        self.variety_shows.iter().any(|s| full_path.contains(s))
    }

    /// Season-aware layout `tvs/<show>/S<NN>`. Returns None when the path
    /// gives no usable show/season shape; the generic extraction then runs.
    fn smart_tv_dir(&self, full_path: &str, filename: &str) -> Option<String> {
        let segments: Vec<&str> = full_path.split('/').filter(|s| !s.is_empty()).collect();
        let dirs: &[&str] = match segments.split_last() {
            Some((last, rest)) if *last == filename => rest,
            _ => &segments[..],
        };

        if let Some(tvs_pos) = dirs.iter().position(|s| s.eq_ignore_ascii_case("tvs")) {
            let parts = &dirs[tvs_pos + 1..];
            if parts.is_empty() {
                return None;
            }

            // deepest directory first; version directories fail the season
            // match and we keep walking outward
            let season = parts
                .iter()
                .rev()
                .find_map(|s| rules::season_from_segment(s))
                .or_else(|| rules::season_from_filename(filename));

            if let Some(n) = season {
                let show = cleanup::clean_show_name(parts[0]);
                return Some(self.join_base(&["tvs", &show, &format!("S{:02}", n)]));
            }

            if let Some(series) = parts
                .iter()
                .find(|s| self.special_series.iter().any(|m| s.contains(m)))
            {
                return Some(self.join_base(&["tvs", &cleanup::clean_show_name(series)]));
            }

            return None;
        }

        // no tvs anchor: the show folder is the nearest segment that is
        // neither a season nor a version directory
        let show_seg = dirs
            .iter()
            .rev()
            .find(|s| !rules::is_season_dir(s) && !rules::is_version_dir(s))?;
        let show = cleanup::clean_show_name(show_seg);

        if self.special_series.iter().any(|m| show_seg.contains(m)) {
            return Some(self.join_base(&["tvs", &show]));
        }

        let season_dir = dirs
            .iter()
            .rev()
            .find_map(|s| rules::season_from_segment(s))
            .or_else(|| rules::season_from_filename(filename))
            .map(|n| format!("S{:02}", n))
            .unwrap_or_else(|| "S1".to_string());

        Some(self.join_base(&["tvs", &show, &season_dir]))
    }

    /// Generic path-structure extraction: keep the path shape after the
    /// category keyword, minus category-labelled segments
    fn generic_dir(&self, media_type: MediaType, full_path: &str, filename: &str) -> String {
        let (keywords, target): (&[&str], &str) = match media_type {
            MediaType::Tv => (&["tvs"], "tvs"),
            MediaType::Movie => (&["movies"], "movies"),
            MediaType::Variety => (VARIETY_KEYWORDS, "variety"),
            MediaType::Video => (VIDEO_KEYWORDS, "videos"),
            MediaType::Other => return self.join_base(&["others"]),
        };

        let mut segments: Vec<String> = Vec::new();
        if let Some((idx, len)) = keywords
            .iter()
            .find_map(|k| find_ci(full_path, k).map(|i| (i, k.len())))
        {
            let after = full_path[idx + len..].trim_start_matches('/');
            let dir_part = after.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
            segments = dir_part
                .split('/')
                .filter(|s| !s.is_empty() && !is_category_keyword(s))
                .map(|s| s.to_string())
                .collect();
        }

        if segments.is_empty() {
            // a movie directly under its category dir gets a folder named
            // after the cleaned filename
            if media_type == MediaType::Movie {
                let name = cleanup::clean_show_name(cleanup::file_stem(filename));
                if !name.is_empty() {
                    return self.join_base(&["movies", &name]);
                }
            }
            return self.join_base(&[target]);
        }

        segments[0] = cleanup::clean_show_name(&segments[0]);
        let mut parts: Vec<&str> = Vec::with_capacity(segments.len() + 1);
        parts.push(target);
        parts.extend(segments.iter().map(|s| s.as_str()));
        self.join_base(&parts)
    }

    fn join_base(&self, parts: &[&str]) -> String {
        let mut path = self.base_dir.clone();
        for part in parts {
            path.push(part);
        }
        path.to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn classifier() -> Classifier {
        Classifier::new(PathBuf::from("/downloads"), &RulesConfig::default())
    }

    #[test]
    fn test_pure_episode_number_is_tv() {
        // filename is purely an episode number; no season token anywhere
        let c = classifier().classify("/data/来自：分享/不眠日/08.mp4", "08.mp4");
        assert_eq!(c.media_type, MediaType::Tv);
        assert_eq!(c.download_dir, "/downloads/tvs/不眠日/S1");
    }

    #[test]
    fn test_se_marker_under_tvs() {
        let c = classifier().classify("/data/tvs/Breaking.Bad/S01E01.mp4", "S01E01.mp4");
        assert_eq!(c.media_type, MediaType::Tv);
        assert_eq!(c.download_dir, "/downloads/tvs/Breaking.Bad/S01");
    }

    #[test]
    fn test_version_dir_rejected_as_season() {
        // the S08.2025.* segment is a version directory; the season comes
        // from the outer show segment
        let c = classifier().classify(
            "/data/来自：分享/tvs/向往的生活 第八季/S08.2025.2160p.WEB-DL.H265.AAC/向往的生活 第八季.EP01.mp4",
            "向往的生活 第八季.EP01.mp4",
        );
        assert_eq!(c.media_type, MediaType::Tv);
        assert_eq!(c.download_dir, "/downloads/tvs/向往的生活/S08");
    }

    #[test]
    fn test_movie_under_category_dir() {
        let c = classifier().classify(
            "/data/movies/Avatar.2022.4K.BluRay.mp4",
            "Avatar.2022.4K.BluRay.mp4",
        );
        assert_eq!(c.media_type, MediaType::Movie);
        assert_eq!(c.download_dir, "/downloads/movies/Avatar");
    }

    #[test]
    fn test_dated_variety_show() {
        let c = classifier().classify(
            "/data/来自：分享/喜人奇妙夜/20250919先导1：团长集结.mp4",
            "20250919先导1：团长集结.mp4",
        );
        assert_eq!(c.media_type, MediaType::Tv);
        assert_eq!(c.download_dir, "/downloads/tvs/喜人奇妙夜/S1");
    }

    #[test]
    fn test_deterministic() {
        let c = classifier();
        let a = c.classify("/data/tvs/Show/S01E01.mp4", "S01E01.mp4");
        let b = c.classify("/data/tvs/Show/S01E01.mp4", "S01E01.mp4");
        assert_eq!(a.media_type, b.media_type);
        assert_eq!(a.download_dir, b.download_dir);
    }

    #[test]
    fn test_both_tokens_shallower_wins() {
        let c = classifier().classify("/data/tvs/movies-collection/file.S01E02.mkv", "file.S01E02.mkv");
        assert_eq!(c.media_type, MediaType::Tv);

        let c = classifier().classify("/data/movies/old-tvs-rips/Heat.1995.mkv", "Heat.1995.mkv");
        assert_eq!(c.media_type, MediaType::Movie);
    }

    #[test]
    fn test_variety_path_marker() {
        let c = classifier().classify("/data/综艺/歌手2024/第3期.mp4", "第3期.mp4");
        assert_eq!(c.media_type, MediaType::Variety);
        assert_eq!(c.download_dir, "/downloads/variety/歌手");
    }

    #[test]
    fn test_video_path_marker() {
        let c = classifier().classify("/data/视频/旅行记录/day1.mp4", "day1.mp4");
        assert_eq!(c.media_type, MediaType::Video);
        assert_eq!(c.download_dir, "/downloads/videos/旅行记录");
    }

    #[test]
    fn test_non_video_is_other() {
        let c = classifier().classify("/data/docs/readme.txt", "readme.txt");
        assert_eq!(c.media_type, MediaType::Other);
        assert_eq!(c.download_dir, "/downloads/others");
    }

    #[test]
    fn test_unknown_video_defaults_to_video() {
        let c = classifier().classify("/data/misc/clip.mp4", "clip.mp4");
        assert_eq!(c.media_type, MediaType::Video);
        assert_eq!(c.download_dir, "/downloads/videos");
    }

    #[test]
    fn test_movie_keywords_in_filename() {
        let c = classifier().classify("/data/share/Heat.1995.BluRay.mkv", "Heat.1995.BluRay.mkv");
        assert_eq!(c.media_type, MediaType::Movie);
    }

    #[test]
    fn test_strong_tv_beats_quality_keywords() {
        // 1080p alone says movie; the SxxEyy marker overrides
        let c = classifier().classify(
            "/data/share/Show.S02E05.1080p.mkv",
            "Show.S02E05.1080p.mkv",
        );
        assert_eq!(c.media_type, MediaType::Tv);
    }

    #[test]
    fn test_nested_category_segment_dropped() {
        let c = classifier().classify("/data/tvs/综艺/某某秀/file.mkv", "file.mkv");
        assert_eq!(c.media_type, MediaType::Tv);
        assert_eq!(c.download_dir, "/downloads/tvs/某某秀");
    }

    #[test]
    fn test_version_dir_preserved_under_show() {
        let c = classifier().classify("/data/tvs/某剧/4K.WEB-DL版/file.mkv", "file.mkv");
        assert_eq!(c.media_type, MediaType::Tv);
        assert_eq!(c.download_dir, "/downloads/tvs/某剧/4K.WEB-DL版");
    }

    #[test]
    fn test_special_series_leaf() {
        let c = classifier().classify(
            "/data/tvs/极限挑战宝藏行/第1期.mp4",
            "第1期.mp4",
        );
        assert_eq!(c.media_type, MediaType::Tv);
        assert_eq!(c.download_dir, "/downloads/tvs/极限挑战宝藏行");
    }

    #[test]
    fn test_category_prefix_stability() {
        // every non-other classification roots under its category dir
        let cases = [
            ("/data/tvs/Show/S01E01.mp4", "S01E01.mp4", "/downloads/tvs/"),
            ("/data/movies/Heat.1995.mkv", "Heat.1995.mkv", "/downloads/movies/"),
            ("/data/综艺/某秀/01.mp4", "01.mp4", "/downloads/variety/"),
            ("/data/视频/家庭/clip.mp4", "clip.mp4", "/downloads/videos/"),
        ];
        let c = classifier();
        for (path, name, prefix) in cases {
            let result = c.classify(path, name);
            assert!(
                result.download_dir.starts_with(prefix)
                    || result.download_dir == prefix.trim_end_matches('/'),
                "{} -> {}",
                path,
                result.download_dir
            );
        }
    }

    #[test]
    fn test_chinese_season_in_parent() {
        let c = classifier().classify("/data/某剧 第二季/03.mp4", "03.mp4");
        assert_eq!(c.media_type, MediaType::Tv);
        assert_eq!(c.download_dir, "/downloads/tvs/某剧/S02");
    }
}
