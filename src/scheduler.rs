//! Scheduler
//!
//! Binds persisted task records to cron-driven executions of the
//! walk-classify-dispatch pipeline. Each registration is its own spawned
//! loop waiting on `cancel OR tick`, so cron timing is never blocked by a
//! running scan and two tasks firing together run concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::notify::{format_size, Notifier};
use crate::services::{DownloadService, FileService};
use crate::tasks::{parse_cron, ScheduledTask, TaskStore};
use crate::walker::{FileItem, TimeWindow};

/// Sample filenames shown in a preview notification
const PREVIEW_SAMPLES: usize = 10;
/// Sample filenames shown in a dispatch summary
const SUMMARY_SAMPLES: usize = 5;

struct SchedulerCtx {
    store: Arc<TaskStore>,
    files: Arc<FileService>,
    downloads: Arc<DownloadService>,
    notifier: Arc<dyn Notifier>,
}

struct Registration {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    ctx: Arc<SchedulerCtx>,
    registrations: Mutex<HashMap<String, Registration>>,
    running: AtomicBool,
    root: Mutex<CancellationToken>,
}

impl Scheduler {
    pub fn new(
        store: Arc<TaskStore>,
        files: Arc<FileService>,
        downloads: Arc<DownloadService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            ctx: Arc::new(SchedulerCtx {
                store,
                files,
                downloads,
                notifier,
            }),
            registrations: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            root: Mutex::new(CancellationToken::new()),
        }
    }

    /// Load all records and register every enabled task. Stored tasks with
    /// invalid cron expressions are logged and skipped, not fatal.
    pub async fn start(&self) -> AppResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AppError::Conflict("scheduler already running".into()));
        }
        *self.root.lock().await = CancellationToken::new();

        let mut registered = 0;
        for task in self.ctx.store.get_all() {
            if !task.enabled {
                continue;
            }
            match self.register(&task).await {
                Ok(()) => registered += 1,
                Err(e) => {
                    tracing::warn!("not registering task '{}' ({}): {}", task.name, task.id, e);
                }
            }
        }

        tracing::info!("scheduler started with {} registrations", registered);
        Ok(())
    }

    /// Stop the cron engine and drop all registrations. Records persist.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.root.lock().await.cancel();

        let mut registrations = self.registrations.lock().await;
        for (id, registration) in registrations.drain() {
            registration.cancel.cancel();
            if let Err(e) = registration.handle.await {
                if !e.is_cancelled() {
                    tracing::warn!("task loop {} ended abnormally: {}", id, e);
                }
            }
        }
        tracing::info!("scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn is_registered(&self, id: &str) -> bool {
        self.registrations.lock().await.contains_key(id)
    }

    /// Validate, persist and (when running) register a new task. A failed
    /// registration rolls the persist back.
    pub async fn create(&self, task: ScheduledTask) -> AppResult<ScheduledTask> {
        parse_cron(&task.cron)?;
        self.ctx.store.create(task.clone())?;

        if self.is_running() && task.enabled {
            if let Err(e) = self.register(&task).await {
                let _ = self.ctx.store.delete(&task.id);
                return Err(e);
            }
        }
        Ok(task)
    }

    /// Persist an updated task and swap its registration
    pub async fn update(&self, task: ScheduledTask) -> AppResult<ScheduledTask> {
        parse_cron(&task.cron)?;
        self.ctx.store.update(task.clone())?;

        self.unregister(&task.id).await;
        if task.enabled {
            if self.is_running() {
                self.register(&task).await?;
            }
        } else {
            // disabled tasks carry no next firing
            self.ctx.store.update_next_run(&task.id, None)?;
        }

        self.ctx
            .store
            .get(&task.id)
            .ok_or_else(|| AppError::NotFound(format!("task {}", task.id)))
    }

    pub async fn delete(&self, id: &str) -> AppResult<ScheduledTask> {
        self.unregister(id).await;
        self.ctx.store.delete(id)
    }

    /// Shorthand update flipping only `enabled`
    pub async fn toggle(&self, id: &str, enabled: bool) -> AppResult<ScheduledTask> {
        let mut task = self
            .ctx
            .store
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("task {id}")))?;
        task.enabled = enabled;
        self.update(task).await
    }

    /// Immediate asynchronous execution; cron timing is unaffected
    pub async fn run_now(&self, id: &str) -> AppResult<()> {
        let task = self
            .ctx
            .store
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("task {id}")))?;

        let ctx = Arc::clone(&self.ctx);
        let cancel = self.root.lock().await.child_token();
        tokio::spawn(async move {
            execute(&ctx, &task.id, &cancel).await;
        });
        Ok(())
    }

    /// Walk and classify on the task's window without enqueueing
    pub async fn preview(&self, id: &str) -> AppResult<(ScheduledTask, Vec<FileItem>)> {
        let task = self
            .ctx
            .store
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("task {id}")))?;

        let window = TimeWindow::last_hours(Utc::now(), task.hours_ago);
        let cancel = self.root.lock().await.child_token();
        let files = self
            .ctx
            .files
            .collect(&task.path, Some(window), task.video_only, &cancel)
            .await?;
        Ok((task, files))
    }

    async fn register(&self, task: &ScheduledTask) -> AppResult<()> {
        let schedule = parse_cron(&task.cron)?;
        let cancel = self.root.lock().await.child_token();
        let ctx = Arc::clone(&self.ctx);
        let id = task.id.clone();

        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            run_task_loop(ctx, schedule, id, loop_cancel).await;
        });

        self.registrations
            .lock()
            .await
            .insert(task.id.clone(), Registration { cancel, handle });
        Ok(())
    }

    async fn unregister(&self, id: &str) {
        if let Some(registration) = self.registrations.lock().await.remove(id) {
            registration.cancel.cancel();
            registration.handle.abort();
        }
    }
}

/// One registration: publish the next firing, sleep until it, execute
async fn run_task_loop(
    ctx: Arc<SchedulerCtx>,
    schedule: Schedule,
    id: String,
    cancel: CancellationToken,
) {
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            tracing::warn!("task {} has no future firings, dropping loop", id);
            break;
        };
        if let Err(e) = ctx.store.update_next_run(&id, Some(next)) {
            tracing::warn!("updating next_run for {}: {}", id, e);
        }

        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
        if cancel.is_cancelled() {
            break;
        }

        execute(&ctx, &id, &cancel).await;
    }
}

/// One execution: window scan, classification, dispatch or preview, report
async fn execute(ctx: &SchedulerCtx, id: &str, cancel: &CancellationToken) {
    let Some(task) = ctx.store.get(id) else {
        tracing::warn!("task {} vanished before execution", id);
        return;
    };

    let now = Utc::now();
    if let Err(e) = ctx.store.update_last_run(id, now) {
        tracing::warn!("updating last_run for {}: {}", id, e);
    }

    let window = TimeWindow::last_hours(now, task.hours_ago);
    tracing::info!(
        "executing task '{}' over {} (last {}h, video_only={})",
        task.name,
        task.path,
        task.hours_ago,
        task.video_only
    );

    match ctx
        .files
        .collect(&task.path, Some(window), task.video_only, cancel)
        .await
    {
        Err(e) => {
            tracing::error!("task '{}' scan failed: {}", task.name, e);
            let _ = ctx
                .notifier
                .send(&format!("Task '{}' failed: {}", task.name, e))
                .await;
        }
        Ok(files) => {
            if task.auto_preview {
                let message = preview_message(&task, &files);
                if let Err(e) = ctx.notifier.send(&message).await {
                    tracing::warn!("preview notification for '{}' failed: {}", task.name, e);
                }
            } else if files.is_empty() {
                tracing::info!("task '{}' found nothing new", task.name);
            } else {
                let result = ctx.downloads.dispatch_files(files, cancel).await;
                let message = summary_message(&task, &result);
                if let Err(e) = ctx.notifier.send(&message).await {
                    tracing::warn!("summary notification for '{}' failed: {}", task.name, e);
                }
            }
        }
    }

    if task.enabled {
        if let Err(e) = ctx.store.update_next_run(id, task.next_fire()) {
            tracing::warn!("refreshing next_run for {}: {}", id, e);
        }
    }
}

fn preview_message(task: &ScheduledTask, files: &[FileItem]) -> String {
    let total_size: u64 = files.iter().map(|f| f.size).sum();
    let mut message = format!(
        "Task '{}' preview\npath: {}\nwindow: last {}h\nfound: {} files, {}",
        task.name,
        task.path,
        task.hours_ago,
        files.len(),
        format_size(total_size),
    );
    for file in files.iter().take(PREVIEW_SAMPLES) {
        message.push_str(&format!("\n- {}", file.name));
    }
    if files.len() > PREVIEW_SAMPLES {
        message.push_str(&format!("\n… and {} more", files.len() - PREVIEW_SAMPLES));
    }
    message
}

fn summary_message(task: &ScheduledTask, result: &crate::dispatcher::BatchResult) -> String {
    let mut message = format!(
        "Task '{}' finished\npath: {}\nwindow: last {}h\nenqueued: {}/{} ({})",
        task.name,
        task.path,
        task.hours_ago,
        result.success,
        result.total,
        format_size(result.total_size()),
    );
    for outcome in result.results.iter().take(SUMMARY_SAMPLES) {
        message.push_str(&format!("\n- {}", outcome.name));
    }
    if result.results.len() > SUMMARY_SAMPLES {
        message.push_str(&format!(
            "\n… and {} more",
            result.results.len() - SUMMARY_SAMPLES
        ));
    }
    message
}
