//! Show-name cleanup
//!
//! Turns a raw directory or filename segment into a stable library folder
//! name: metadata suffixes are cut away, season suffixes stripped, and
//! filesystem-unfriendly characters normalized.

use once_cell::sync::Lazy;
use regex::Regex;

use super::rules::find_year;

static TRAILING_SEASON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"第[0-9零一二三四五六七八九十]{1,3}季\s*$").unwrap());

/// Markers that begin trailing metadata; the name is cut at the earliest one
const CUT_MARKERS: &[&str] = &["（", "(", "[", "【", "期全", "完结", "全"];

fn trim_separators(s: &str) -> &str {
    s.trim_matches(|c: char| c == '.' || c == '-' || c == '_' || c.is_whitespace())
}

/// Clean a show name for use as a library directory
pub fn clean_show_name(name: &str) -> String {
    let original = name.trim();

    let mut cut = original.len();
    for marker in CUT_MARKERS {
        if let Some(idx) = original.find(marker) {
            cut = cut.min(idx);
        }
    }
    if let Some(idx) = find_year(original) {
        cut = cut.min(idx);
    }

    let mut cleaned = trim_separators(&original[..cut]).to_string();
    cleaned = TRAILING_SEASON_RE.replace(&cleaned, "").to_string();
    cleaned = trim_separators(&cleaned).to_string();

    // a cut that ate nearly everything is worse than the raw name
    if cleaned.chars().count() < 2 {
        cleaned = original.to_string();
    }

    sanitize_dir_name(&cleaned)
}

/// Normalize characters that cannot appear in a directory name
pub fn sanitize_dir_name(name: &str) -> String {
    name.chars()
        .filter_map(|c| match c {
            ':' | '：' => Some('-'),
            '?' | '*' | '<' | '>' | '|' | '\\' | '/' | '"' => None,
            _ => Some(c),
        })
        .collect()
}

/// Filename without its extension
pub fn file_stem(filename: &str) -> &str {
    filename.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cut_markers() {
        assert_eq!(clean_show_name("不眠日（2024）"), "不眠日");
        assert_eq!(clean_show_name("Show (complete)"), "Show");
        assert_eq!(clean_show_name("show [web]"), "show");
        assert_eq!(clean_show_name("某综艺 全12期"), "某综艺");
        assert_eq!(clean_show_name("老剧 完结"), "老剧");
    }

    #[test]
    fn test_year_cut() {
        assert_eq!(clean_show_name("Avatar.2022.4K.BluRay"), "Avatar");
        assert_eq!(clean_show_name("歌手2024"), "歌手");
    }

    #[test]
    fn test_trailing_season_stripped() {
        assert_eq!(clean_show_name("向往的生活 第八季"), "向往的生活");
        assert_eq!(clean_show_name("某某 第二十季"), "某某");
    }

    #[test]
    fn test_short_result_falls_back() {
        // cutting at 全 would leave a single rune
        assert_eq!(clean_show_name("一全集"), "一全集");
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_dir_name("a:b"), "a-b");
        assert_eq!(sanitize_dir_name("先导：团长集结"), "先导-团长集结");
        assert_eq!(sanitize_dir_name("w?h*a<t>"), "what");
        assert_eq!(sanitize_dir_name(r#"a\b/c"d"#), "abcd");
    }

    #[test]
    fn test_untouched_names() {
        assert_eq!(clean_show_name("Breaking.Bad"), "Breaking.Bad");
        assert_eq!(clean_show_name("不眠日"), "不眠日");
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("08.mp4"), "08");
        assert_eq!(file_stem("Avatar.2022.4K.BluRay.mp4"), "Avatar.2022.4K.BluRay");
        assert_eq!(file_stem("noext"), "noext");
    }
}
