//! Classification predicates
//!
//! Season, episode, date and version-directory detection shared by the
//! classifier pipeline. All matching is pure string work.

use once_cell::sync::Lazy;
use regex::Regex;

static SE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)S(\d{1,2})E(\d{1,3})").unwrap());
static EP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(?:EP|E)(\d{1,3})\b").unwrap());
static SEASON_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bSeason\s*(\d{1,2})\b").unwrap());
static SEASON_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^S(\d{1,2})$").unwrap());
static CN_SEASON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"第([0-9零一二三四五六七八九十]{1,3})季").unwrap());
static SEASON_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:s|season ?)(\d{1,2})$").unwrap());
static CN_SEASON_DIR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^第.{1,2}季$").unwrap());
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:19|20)\d{2}(?:0[1-9]|1[0-2])(?:0[1-9]|[12]\d|3[01])").unwrap());
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:19|20)\d{2}").unwrap());

/// Tokens that mark a segment as encoding/resolution metadata
const VERSION_TOKENS: &[&str] = &[
    "4K", "1080P", "1080p", "720P", "720p", "BluRay", "BDRip", "WEBRip", "HDTV", "WEB-DL",
    "60帧", "高码率", "DV", "HDR", "H265", "H264", "AAC", "DTS", "REMUX", "2160p",
];

/// Parse a season numeral, Arabic or Chinese (零 through 二十 and beyond)
pub fn parse_numeral(raw: &str) -> Option<u32> {
    if let Ok(n) = raw.parse::<u32>() {
        return Some(n);
    }

    let digit = |c: char| -> Option<u32> {
        "零一二三四五六七八九".chars().position(|d| d == c).map(|p| p as u32)
    };

    let chars: Vec<char> = raw.chars().collect();
    match chars.as_slice() {
        [c] if *c == '十' => Some(10),
        [c] => digit(*c),
        ['十', u] => digit(*u).map(|u| 10 + u),
        [t, c] if *c == '十' => digit(*t).map(|t| t * 10),
        [t, c, u] if *c == '十' => match (digit(*t), digit(*u)) {
            (Some(t), Some(u)) => Some(t * 10 + u),
            _ => None,
        },
        _ => None,
    }
}

/// Extract a season number from one path segment.
/// `S08` standalone matches; `S08.2025.2160p.WEB-DL` does not (that is a
/// version directory, not a season directory).
pub fn season_from_segment(segment: &str) -> Option<u32> {
    let trimmed = segment.trim();

    if let Some(caps) = CN_SEASON_RE.captures(trimmed) {
        if let Some(n) = parse_numeral(&caps[1]) {
            if (1..=99).contains(&n) {
                return Some(n);
            }
        }
    }

    if let Some(caps) = SEASON_WORD_RE.captures(trimmed) {
        if let Ok(n) = caps[1].parse::<u32>() {
            if (1..=99).contains(&n) {
                return Some(n);
            }
        }
    }

    if let Some(caps) = SEASON_TOKEN_RE.captures(trimmed) {
        if let Ok(n) = caps[1].parse::<u32>() {
            if (1..=99).contains(&n) {
                return Some(n);
            }
        }
    }

    None
}

/// Extract a season number from a filename (`S01E01`, `第二季`, `Season 3`)
pub fn season_from_filename(filename: &str) -> Option<u32> {
    if let Some(caps) = SE_RE.captures(filename) {
        if let Ok(n) = caps[1].parse::<u32>() {
            if (1..=99).contains(&n) {
                return Some(n);
            }
        }
    }

    if let Some(caps) = CN_SEASON_RE.captures(filename) {
        if let Some(n) = parse_numeral(&caps[1]) {
            if (1..=99).contains(&n) {
                return Some(n);
            }
        }
    }

    if let Some(caps) = SEASON_WORD_RE.captures(filename) {
        if let Ok(n) = caps[1].parse::<u32>() {
            if (1..=99).contains(&n) {
                return Some(n);
            }
        }
    }

    None
}

/// Whole-segment season directory predicate: `S01`, `Season 2`, `第三季`
pub fn is_season_dir(segment: &str) -> bool {
    let trimmed = segment.trim();
    if let Some(caps) = SEASON_DIR_RE.captures(trimmed) {
        return caps[1]
            .parse::<u32>()
            .map(|n| (1..=99).contains(&n))
            .unwrap_or(false);
    }
    CN_SEASON_DIR_RE.is_match(trimmed)
}

/// The trimmed filename stem is purely a 1-3 digit episode number in [1, 999]
pub fn is_episode_number(stem: &str) -> bool {
    let trimmed = stem.trim();
    if trimmed.is_empty() || trimmed.len() > 3 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    trimmed.parse::<u32>().map(|n| n >= 1).unwrap_or(false)
}

/// `S01E01`-style marker anywhere in the filename
pub fn has_season_episode_marker(filename: &str) -> bool {
    SE_RE.is_match(filename)
}

/// `EP01` or `E01` as a standalone token
pub fn has_episode_token(filename: &str) -> bool {
    EP_RE.is_match(filename)
}

/// `第N季` or `Season N` anywhere in the string
pub fn has_season_marker(text: &str) -> bool {
    CN_SEASON_RE.is_match(text) || SEASON_WORD_RE.is_match(text)
}

/// An 8-digit `YYYYMMDD` token (not part of a longer digit run)
pub fn has_date_token(filename: &str) -> bool {
    DATE_RE.find_iter(filename).any(|m| {
        let before_ok = filename[..m.start()]
            .chars()
            .next_back()
            .map(|c| !c.is_ascii_digit())
            .unwrap_or(true);
        let after_ok = filename[m.end()..]
            .chars()
            .next()
            .map(|c| !c.is_ascii_digit())
            .unwrap_or(true);
        before_ok && after_ok
    })
}

/// First standalone 4-digit year (1900-2099) not embedded in a digit run
pub fn find_year(text: &str) -> Option<usize> {
    YEAR_RE.find_iter(text).find_map(|m| {
        let before_ok = text[..m.start()]
            .chars()
            .next_back()
            .map(|c| !c.is_ascii_digit())
            .unwrap_or(true);
        let after_ok = text[m.end()..]
            .chars()
            .next()
            .map(|c| !c.is_ascii_digit())
            .unwrap_or(true);
        if before_ok && after_ok {
            Some(m.start())
        } else {
            None
        }
    })
}

/// Version/quality directory: bracketed group tags, known encoding tokens,
/// or dot-separated release-name shapes
pub fn is_version_dir(segment: &str) -> bool {
    if let (Some(open), Some(close)) = (segment.find('['), segment.rfind(']')) {
        if open < close {
            return true;
        }
    }

    if VERSION_TOKENS.iter().any(|t| segment.contains(t)) {
        return true;
    }

    segment.contains('.')
        && (segment.contains("p.")
            || segment.contains("WEB")
            || segment.contains("BluRay")
            || segment.contains("H26"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeral() {
        assert_eq!(parse_numeral("3"), Some(3));
        assert_eq!(parse_numeral("08"), Some(8));
        assert_eq!(parse_numeral("一"), Some(1));
        assert_eq!(parse_numeral("八"), Some(8));
        assert_eq!(parse_numeral("十"), Some(10));
        assert_eq!(parse_numeral("十三"), Some(13));
        assert_eq!(parse_numeral("二十"), Some(20));
        assert_eq!(parse_numeral("甲"), None);
    }

    #[test]
    fn test_season_from_segment() {
        assert_eq!(season_from_segment("S08"), Some(8));
        assert_eq!(season_from_segment("s2"), Some(2));
        assert_eq!(season_from_segment("Season 4"), Some(4));
        assert_eq!(season_from_segment("第八季"), Some(8));
        assert_eq!(season_from_segment("向往的生活 第八季"), Some(8));
        // embedded S## inside a version directory is rejected
        assert_eq!(season_from_segment("S08.2025.2160p.WEB-DL.H265.AAC"), None);
        assert_eq!(season_from_segment("Breaking.Bad"), None);
    }

    #[test]
    fn test_season_from_filename() {
        assert_eq!(season_from_filename("S01E01.mp4"), Some(1));
        assert_eq!(season_from_filename("Show.S03E12.1080p.mkv"), Some(3));
        assert_eq!(season_from_filename("向往的生活 第八季.EP01.mp4"), Some(8));
        assert_eq!(season_from_filename("08.mp4"), None);
    }

    #[test]
    fn test_is_season_dir() {
        assert!(is_season_dir("S01"));
        assert!(is_season_dir("season 3"));
        assert!(is_season_dir("Season3"));
        assert!(is_season_dir("第二季"));
        assert!(!is_season_dir("S08.2025.2160p.WEB-DL"));
        assert!(!is_season_dir("S100"));
    }

    #[test]
    fn test_is_episode_number() {
        assert!(is_episode_number("08"));
        assert!(is_episode_number("1"));
        assert!(is_episode_number("156"));
        assert!(is_episode_number("999"));
        assert!(!is_episode_number("0"));
        assert!(!is_episode_number("00"));
        assert!(!is_episode_number("1000"));
        assert!(!is_episode_number("1a"));
        assert!(!is_episode_number(""));
    }

    #[test]
    fn test_episode_token() {
        assert!(has_episode_token("向往的生活 第八季.EP01.mp4"));
        assert!(has_episode_token("show E12.mkv"));
        assert!(!has_episode_token("sleeper.mkv"));
        assert!(!has_episode_token("EP.mkv"));
    }

    #[test]
    fn test_date_token() {
        assert!(has_date_token("20250919先导1：团长集结.mp4"));
        assert!(has_date_token("show.20240101.mp4"));
        // part of a longer digit run
        assert!(!has_date_token("12025091999.mp4"));
        // month 13 is not a date
        assert!(!has_date_token("20251319.mp4"));
    }

    #[test]
    fn test_find_year() {
        assert_eq!(find_year("Avatar.2022.4K.BluRay"), Some(7));
        assert_eq!(find_year("歌手2024"), Some("歌手".len()));
        assert_eq!(find_year("no year here"), None);
        // 5-digit run is not a year
        assert_eq!(find_year("id-20223-x"), None);
    }

    #[test]
    fn test_is_version_dir() {
        assert!(is_version_dir("S08.2025.2160p.WEB-DL.H265.AAC"));
        assert!(is_version_dir("[YYDS] 1080P"));
        assert!(is_version_dir("4K 高码率"));
        assert!(is_version_dir("BluRay.REMUX"));
        assert!(!is_version_dir("Breaking.Bad"));
        assert!(!is_version_dir("不眠日"));
    }
}
