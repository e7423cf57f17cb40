//! File service
//!
//! Composes walker and classifier into the scan operations the scheduler
//! and the HTTP surface run: window scans, subtree scans, plain listings.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;

use crate::classify::{Classifier, MediaType};
use crate::config::RulesConfig;
use crate::error::AppResult;
use crate::index::IndexProvider;
use crate::walker::{FileItem, TimeWindow, Walker};

pub struct FileService {
    index: Arc<dyn IndexProvider>,
    walker: Walker,
    classifier: Arc<Classifier>,
    rules: RulesConfig,
}

impl FileService {
    pub fn new(
        index: Arc<dyn IndexProvider>,
        classifier: Arc<Classifier>,
        rules: RulesConfig,
    ) -> Self {
        let walker = Walker::new(Arc::clone(&index), Arc::clone(&classifier));
        Self {
            index,
            walker,
            classifier,
            rules,
        }
    }

    /// Walk `path`, classify every candidate and apply dominant-movie
    /// promotion. This is the scan every execution path goes through.
    pub async fn collect(
        &self,
        path: &str,
        window: Option<TimeWindow>,
        video_only: bool,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<FileItem>> {
        let mut files = self.walker.walk(path, window, video_only, cancel).await?;
        files.retain(|f| self.passes_rules(f));

        for file in files.iter_mut() {
            if !file.is_dir {
                file.apply(self.classifier.classify(&file.path, &file.name));
            }
        }
        promote_dominant_movies(&mut files);

        Ok(files)
    }

    /// Size and extension bounds from the download rules
    fn passes_rules(&self, file: &FileItem) -> bool {
        if let Some((_, ext)) = file.name.rsplit_once('.') {
            let ext = ext.to_lowercase();
            if self
                .rules
                .exclude_extensions
                .iter()
                .any(|x| x.to_lowercase() == ext)
            {
                return false;
            }
        }
        if self.rules.min_file_size > 0 && file.size < self.rules.min_file_size {
            return false;
        }
        if self.rules.max_file_size > 0 && file.size > self.rules.max_file_size {
            return false;
        }
        true
    }

    /// Files modified during the previous calendar day
    pub async fn collect_yesterday(
        &self,
        path: &str,
        video_only: bool,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<FileItem>> {
        let window = yesterday_window(Utc::now());
        self.collect(path, Some(window), video_only, cancel).await
    }

    /// Direct children of `path` only, resolved and classified. The
    /// non-recursive variant of a subtree scan.
    pub async fn collect_shallow(
        &self,
        path: &str,
        video_only: bool,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<FileItem>> {
        let mut files = Vec::new();
        let mut page = 1u32;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let listing = self.index.list(path, page, 100).await?;
            let short_page = listing.entries.len() < 100;

            for entry in listing.entries.iter().filter(|e| !e.is_dir) {
                if video_only && !self.classifier.is_video(&entry.name) {
                    continue;
                }
                match self.index.resolve(&entry.path).await {
                    Ok(link) => {
                        let mut item = FileItem::from_entry(entry).with_link(link);
                        if !self.passes_rules(&item) {
                            continue;
                        }
                        item.apply(self.classifier.classify(&item.path, &item.name));
                        files.push(item);
                    }
                    Err(e) => {
                        tracing::warn!("resolving {} failed: {}, skipping file", entry.path, e);
                    }
                }
            }

            if short_page {
                break;
            }
            page += 1;
        }

        promote_dominant_movies(&mut files);
        Ok(files)
    }

    /// One listing page, classified but not resolved or filtered by window
    pub async fn list(
        &self,
        path: &str,
        page: u32,
        per_page: u32,
        video_only: bool,
    ) -> AppResult<(Vec<FileItem>, u64)> {
        let listing = self.index.list(path, page, per_page).await?;
        let total = listing.total;

        let files = listing
            .entries
            .iter()
            .filter(|e| e.is_dir || !video_only || self.classifier.is_video(&e.name))
            .map(|entry| {
                let mut item = FileItem::from_entry(entry);
                if !item.is_dir {
                    item.apply(self.classifier.classify(&item.path, &item.name));
                }
                item
            })
            .collect();

        Ok((files, total))
    }
}

/// The calendar day before `now`, in UTC
pub fn yesterday_window(now: DateTime<Utc>) -> TimeWindow {
    let today = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc();
    TimeWindow {
        start: today - Duration::days(1),
        end: today,
    }
}

/// Extras travel with the movie: when any file in a directory classifies as
/// a movie, every sibling is promoted to the same movie destination.
/// Runs after per-file classification; files are not re-classified.
pub fn promote_dominant_movies(files: &mut [FileItem]) {
    let mut movie_dirs: HashMap<String, String> = HashMap::new();
    for file in files.iter() {
        if !file.is_dir && file.media_type == MediaType::Movie {
            movie_dirs
                .entry(parent_dir(&file.path).to_string())
                .or_insert_with(|| file.download_dir.clone());
        }
    }

    if movie_dirs.is_empty() {
        return;
    }

    for file in files.iter_mut() {
        if file.is_dir {
            continue;
        }
        if let Some(dir) = movie_dirs.get(parent_dir(&file.path)) {
            file.media_type = MediaType::Movie;
            file.download_dir = dir.clone();
        }
    }
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn item(path: &str, media_type: MediaType, download_dir: &str) -> FileItem {
        FileItem {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            size: 10,
            modified: Utc::now(),
            is_dir: false,
            media_type,
            original_url: String::new(),
            internal_url: String::new(),
            download_dir: download_dir.to_string(),
        }
    }

    #[test]
    fn test_promotion_aligns_siblings() {
        let mut files = vec![
            item("/m/Avatar/Avatar.2022.mkv", MediaType::Movie, "/downloads/movies/Avatar"),
            item("/m/Avatar/sample.mkv", MediaType::Video, "/downloads/videos"),
            item("/m/Avatar/extras.srt", MediaType::Other, "/downloads/others"),
        ];
        promote_dominant_movies(&mut files);

        for file in &files {
            assert_eq!(file.media_type, MediaType::Movie);
            assert_eq!(file.download_dir, "/downloads/movies/Avatar");
        }
    }

    #[test]
    fn test_promotion_scoped_to_directory() {
        let mut files = vec![
            item("/m/Avatar/Avatar.2022.mkv", MediaType::Movie, "/downloads/movies/Avatar"),
            item("/t/Show/01.mp4", MediaType::Tv, "/downloads/tvs/Show/S1"),
        ];
        promote_dominant_movies(&mut files);

        assert_eq!(files[0].media_type, MediaType::Movie);
        // different parent directory is untouched
        assert_eq!(files[1].media_type, MediaType::Tv);
        assert_eq!(files[1].download_dir, "/downloads/tvs/Show/S1");
    }

    #[test]
    fn test_promotion_without_movies_is_noop() {
        let mut files = vec![
            item("/t/Show/01.mp4", MediaType::Tv, "/downloads/tvs/Show/S1"),
            item("/t/Show/02.mp4", MediaType::Tv, "/downloads/tvs/Show/S1"),
        ];
        promote_dominant_movies(&mut files);
        assert!(files.iter().all(|f| f.media_type == MediaType::Tv));
    }

    #[test]
    fn test_size_and_extension_rules() {
        let rules = RulesConfig {
            exclude_extensions: vec!["iso".to_string()],
            min_file_size: 100,
            max_file_size: 10_000,
            ..RulesConfig::default()
        };
        let classifier = Arc::new(Classifier::new("/downloads".into(), &rules));
        let index: Arc<dyn IndexProvider> = Arc::new(NoopIndex);
        let service = FileService::new(index, classifier, rules);

        let mut small = item("/x/a.mp4", MediaType::Video, "");
        small.size = 10;
        let mut big = item("/x/b.mp4", MediaType::Video, "");
        big.size = 100_000;
        let mut excluded = item("/x/c.iso", MediaType::Other, "");
        excluded.size = 500;
        let mut fine = item("/x/d.mp4", MediaType::Video, "");
        fine.size = 500;

        assert!(!service.passes_rules(&small));
        assert!(!service.passes_rules(&big));
        assert!(!service.passes_rules(&excluded));
        assert!(service.passes_rules(&fine));
    }

    struct NoopIndex;

    #[async_trait::async_trait]
    impl IndexProvider for NoopIndex {
        async fn list(
            &self,
            _path: &str,
            _page: u32,
            _per_page: u32,
        ) -> AppResult<crate::index::ListPage> {
            Ok(crate::index::ListPage::default())
        }
        async fn resolve(&self, path: &str) -> AppResult<crate::index::FileLink> {
            Ok(crate::index::FileLink::new(path.to_string()))
        }
    }

    #[test]
    fn test_yesterday_window() {
        let now = Utc.with_ymd_and_hms(2026, 7, 30, 15, 45, 0).unwrap();
        let window = yesterday_window(now);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2026, 7, 29, 0, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2026, 7, 30, 0, 0, 0).unwrap());
        assert_eq!(window.start.hour(), 0);
    }
}
