//! Batch dispatcher
//!
//! Bounded-concurrency fan-out of walker candidates to the fetcher, with
//! per-item success/failure aggregation. A failed item never aborts the
//! batch; `fail_fast` only stops accepting new items while running workers
//! drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::fetcher::{DownloadEngine, EnqueueOptions};
use crate::walker::FileItem;

pub const DEFAULT_CONCURRENCY: usize = 5;

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Number of concurrent enqueue calls
    pub concurrency: usize,
    /// Stop accepting further items once any error is seen
    pub fail_fast: bool,
    /// Enqueue one item at a time, preserving input order in the results
    pub sequential: bool,
    /// Extra engine options forwarded with every item
    pub extra: Map<String, Value>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            fail_fast: false,
            sequential: false,
            extra: Map::new(),
        }
    }
}

/// Per-item dispatch result
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub path: String,
    pub name: String,
    pub size: u64,
    /// Fetcher-assigned id on success
    pub task_id: Option<String>,
    pub error: Option<String>,
}

impl DispatchOutcome {
    fn ok(file: &FileItem, task_id: String) -> Self {
        Self {
            path: file.path.clone(),
            name: file.name.clone(),
            size: file.size,
            task_id: Some(task_id),
            error: None,
        }
    }

    fn failed(file: &FileItem, error: String) -> Self {
        Self {
            path: file.path.clone(),
            name: file.name.clone(),
            size: file.size,
            task_id: None,
            error: Some(error),
        }
    }
}

/// Aggregated batch result; `total == success + fail` always holds
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub success: usize,
    pub fail: usize,
    pub results: Vec<DispatchOutcome>,
}

impl BatchResult {
    fn collect(results: Vec<DispatchOutcome>) -> Self {
        let success = results.iter().filter(|r| r.task_id.is_some()).count();
        Self {
            total: results.len(),
            success,
            fail: results.len() - success,
            results,
        }
    }

    pub fn total_size(&self) -> u64 {
        self.results
            .iter()
            .filter(|r| r.task_id.is_some())
            .map(|r| r.size)
            .sum()
    }
}

pub struct Dispatcher {
    engine: Arc<dyn DownloadEngine>,
}

impl Dispatcher {
    pub fn new(engine: Arc<dyn DownloadEngine>) -> Self {
        Self { engine }
    }

    /// Enqueue every file, fanning out up to `options.concurrency` calls.
    /// Result order is unspecified in parallel mode.
    pub async fn dispatch(
        &self,
        files: Vec<FileItem>,
        options: DispatchOptions,
        cancel: &CancellationToken,
    ) -> BatchResult {
        if files.is_empty() {
            return BatchResult::collect(Vec::new());
        }

        if options.sequential {
            return self.dispatch_sequential(files, options, cancel).await;
        }

        let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
        let stop = Arc::new(AtomicBool::new(false));
        let mut set: JoinSet<DispatchOutcome> = JoinSet::new();

        for file in files {
            let engine = Arc::clone(&self.engine);
            let semaphore = Arc::clone(&semaphore);
            let stop = Arc::clone(&stop);
            let cancel = cancel.clone();
            let fail_fast = options.fail_fast;
            let extra = options.extra.clone();

            set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return DispatchOutcome::failed(&file, "dispatcher shut down".into()),
                };

                if cancel.is_cancelled() {
                    return DispatchOutcome::failed(&file, "cancelled".into());
                }
                if fail_fast && stop.load(Ordering::SeqCst) {
                    return DispatchOutcome::failed(&file, "skipped: earlier item failed".into());
                }

                match enqueue_file(engine.as_ref(), &file, extra).await {
                    Ok(id) => DispatchOutcome::ok(&file, id),
                    Err(e) => {
                        stop.store(true, Ordering::SeqCst);
                        tracing::warn!("enqueue of {} failed: {}", file.path, e);
                        DispatchOutcome::failed(&file, e)
                    }
                }
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => results.push(outcome),
                Err(e) => tracing::error!("dispatch worker panicked: {}", e),
            }
        }

        BatchResult::collect(results)
    }

    /// Deterministic-order variant for callers that need it
    async fn dispatch_sequential(
        &self,
        files: Vec<FileItem>,
        options: DispatchOptions,
        cancel: &CancellationToken,
    ) -> BatchResult {
        let mut results = Vec::with_capacity(files.len());
        let mut seen_error = false;

        for file in files {
            if cancel.is_cancelled() {
                results.push(DispatchOutcome::failed(&file, "cancelled".into()));
                continue;
            }
            if options.fail_fast && seen_error {
                results.push(DispatchOutcome::failed(
                    &file,
                    "skipped: earlier item failed".into(),
                ));
                continue;
            }

            match enqueue_file(self.engine.as_ref(), &file, options.extra.clone()).await {
                Ok(id) => results.push(DispatchOutcome::ok(&file, id)),
                Err(e) => {
                    seen_error = true;
                    tracing::warn!("enqueue of {} failed: {}", file.path, e);
                    results.push(DispatchOutcome::failed(&file, e));
                }
            }
        }

        BatchResult::collect(results)
    }
}

async fn enqueue_file(
    engine: &dyn DownloadEngine,
    file: &FileItem,
    extra: Map<String, Value>,
) -> Result<String, String> {
    let url = if file.internal_url.is_empty() {
        &file.original_url
    } else {
        &file.internal_url
    };
    if url.is_empty() {
        return Err("no download URL".to_string());
    }

    let options = EnqueueOptions {
        dir: (!file.download_dir.is_empty()).then(|| file.download_dir.clone()),
        out: Some(file.name.clone()),
        extra,
    };

    engine
        .add_uri(url, &options)
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::MediaType;
    use crate::error::{AppError, AppResult};
    use crate::fetcher::{DownloadRecord, GlobalStat};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Mutex;

    struct FakeEngine {
        counter: AtomicUsize,
        fail_urls: Vec<String>,
        seen: Mutex<Vec<String>>,
    }

    impl FakeEngine {
        fn new(fail_urls: Vec<String>) -> Self {
            Self {
                counter: AtomicUsize::new(0),
                fail_urls,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DownloadEngine for FakeEngine {
        async fn add_uri(&self, url: &str, options: &EnqueueOptions) -> AppResult<String> {
            self.seen.lock().await.push(format!(
                "{}|{}",
                url,
                options.dir.clone().unwrap_or_default()
            ));
            if self.fail_urls.iter().any(|f| f == url) {
                return Err(AppError::unavailable("fetcher", "boom"));
            }
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(format!("gid-{n}"))
        }

        async fn get_status(&self, _id: &str) -> AppResult<DownloadRecord> {
            Err(AppError::NotFound("not implemented".into()))
        }
        async fn get_active(&self) -> AppResult<Vec<DownloadRecord>> {
            Ok(Vec::new())
        }
        async fn get_waiting(&self, _offset: i64, _limit: i64) -> AppResult<Vec<DownloadRecord>> {
            Ok(Vec::new())
        }
        async fn get_stopped(&self, _offset: i64, _limit: i64) -> AppResult<Vec<DownloadRecord>> {
            Ok(Vec::new())
        }
        async fn pause(&self, _id: &str) -> AppResult<()> {
            Ok(())
        }
        async fn resume(&self, _id: &str) -> AppResult<()> {
            Ok(())
        }
        async fn remove(&self, _id: &str) -> AppResult<()> {
            Ok(())
        }
        async fn pause_all(&self) -> AppResult<()> {
            Ok(())
        }
        async fn resume_all(&self) -> AppResult<()> {
            Ok(())
        }
        async fn global_stat(&self) -> AppResult<GlobalStat> {
            Ok(GlobalStat::default())
        }
        async fn version(&self) -> AppResult<String> {
            Ok("1.37.0".into())
        }
    }

    fn file(name: &str) -> FileItem {
        FileItem {
            name: name.to_string(),
            path: format!("/data/{name}"),
            size: 1000,
            modified: Utc::now(),
            is_dir: false,
            media_type: MediaType::Video,
            original_url: format!("https://fcalist-public/d/{name}"),
            internal_url: format!("https://fcalist-internal/d/{name}"),
            download_dir: "/downloads/videos".to_string(),
        }
    }

    #[tokio::test]
    async fn test_totals_add_up() {
        let engine = Arc::new(FakeEngine::new(vec![
            "https://fcalist-internal/d/b.mp4".to_string(),
        ]));
        let dispatcher = Dispatcher::new(engine);

        let files = vec![file("a.mp4"), file("b.mp4"), file("c.mp4")];
        let result = dispatcher
            .dispatch(files, DispatchOptions::default(), &CancellationToken::new())
            .await;

        assert_eq!(result.total, 3);
        assert_eq!(result.success, 2);
        assert_eq!(result.fail, 1);
        assert_eq!(result.success + result.fail, result.total);
    }

    #[tokio::test]
    async fn test_uses_internal_url_and_dir() {
        let engine = Arc::new(FakeEngine::new(Vec::new()));
        let dispatcher = Dispatcher::new(Arc::clone(&engine) as Arc<dyn DownloadEngine>);

        dispatcher
            .dispatch(
                vec![file("a.mp4")],
                DispatchOptions::default(),
                &CancellationToken::new(),
            )
            .await;

        let seen = engine.seen.lock().await;
        assert_eq!(
            seen[0],
            "https://fcalist-internal/d/a.mp4|/downloads/videos"
        );
    }

    #[tokio::test]
    async fn test_sequential_preserves_order() {
        let engine = Arc::new(FakeEngine::new(Vec::new()));
        let dispatcher = Dispatcher::new(engine);

        let files = vec![file("a.mp4"), file("b.mp4"), file("c.mp4")];
        let options = DispatchOptions {
            sequential: true,
            ..Default::default()
        };
        let result = dispatcher
            .dispatch(files, options, &CancellationToken::new())
            .await;

        let names: Vec<&str> = result.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a.mp4", "b.mp4", "c.mp4"]);
        assert_eq!(result.success, 3);
    }

    #[tokio::test]
    async fn test_fail_fast_sequential_skips_rest() {
        let engine = Arc::new(FakeEngine::new(vec![
            "https://fcalist-internal/d/a.mp4".to_string(),
        ]));
        let dispatcher = Dispatcher::new(engine);

        let files = vec![file("a.mp4"), file("b.mp4"), file("c.mp4")];
        let options = DispatchOptions {
            sequential: true,
            fail_fast: true,
            ..Default::default()
        };
        let result = dispatcher
            .dispatch(files, options, &CancellationToken::new())
            .await;

        assert_eq!(result.total, 3);
        assert_eq!(result.success, 0);
        assert_eq!(result.fail, 3);
    }

    #[tokio::test]
    async fn test_cancelled_batch_enqueues_nothing() {
        let engine = Arc::new(FakeEngine::new(Vec::new()));
        let dispatcher = Dispatcher::new(Arc::clone(&engine) as Arc<dyn DownloadEngine>);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = dispatcher
            .dispatch(vec![file("a.mp4")], DispatchOptions::default(), &cancel)
            .await;

        assert_eq!(result.success, 0);
        assert_eq!(result.fail, 1);
        assert!(engine.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let engine = Arc::new(FakeEngine::new(Vec::new()));
        let dispatcher = Dispatcher::new(engine);
        let result = dispatcher
            .dispatch(Vec::new(), DispatchOptions::default(), &CancellationToken::new())
            .await;
        assert_eq!(result.total, 0);
    }

    #[tokio::test]
    async fn test_total_size_counts_successes() {
        let engine = Arc::new(FakeEngine::new(vec![
            "https://fcalist-internal/d/b.mp4".to_string(),
        ]));
        let dispatcher = Dispatcher::new(engine);

        let result = dispatcher
            .dispatch(
                vec![file("a.mp4"), file("b.mp4")],
                DispatchOptions::default(),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.total_size(), 1000);
    }
}
