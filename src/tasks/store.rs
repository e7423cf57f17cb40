//! Task store
//!
//! Persistent mapping `task_id -> record`, one JSON file per task under
//! `<data_dir>/tasks/`. Writes go to a temp file and rename into place.
//! The in-memory map takes many readers and one writer; a persistence
//! failure rolls the in-memory change back.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::ScheduledTask;
use crate::error::{AppError, AppResult};

pub struct TaskStore {
    dir: PathBuf,
    tasks: RwLock<HashMap<String, ScheduledTask>>,
}

impl TaskStore {
    /// Open the store, loading every record under `<data_dir>/tasks/`.
    /// Unreadable records are logged and skipped.
    pub fn open(data_dir: &PathBuf) -> AppResult<Self> {
        let dir = data_dir.join("tasks");
        fs::create_dir_all(&dir)
            .map_err(|e| AppError::Internal(format!("creating {}: {e}", dir.display())))?;

        let mut tasks = HashMap::new();
        let entries = fs::read_dir(&dir)
            .map_err(|e| AppError::Internal(format!("reading {}: {e}", dir.display())))?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str::<ScheduledTask>(&raw).map_err(|e| e.to_string()))
            {
                Ok(task) => {
                    tasks.insert(task.id.clone(), task);
                }
                Err(e) => {
                    tracing::warn!("skipping unreadable task record {}: {}", path.display(), e);
                }
            }
        }

        tracing::info!("task store loaded {} records from {}", tasks.len(), dir.display());
        Ok(Self {
            dir,
            tasks: RwLock::new(tasks),
        })
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Atomic per-record write: temp file, then rename
    fn persist(&self, task: &ScheduledTask) -> AppResult<()> {
        let raw = serde_json::to_string_pretty(task)
            .map_err(|e| AppError::Internal(format!("serializing task {}: {e}", task.id)))?;
        let tmp = self.dir.join(format!("{}.json.tmp", task.id));
        fs::write(&tmp, raw)
            .map_err(|e| AppError::Internal(format!("writing {}: {e}", tmp.display())))?;
        fs::rename(&tmp, self.record_path(&task.id))
            .map_err(|e| AppError::Internal(format!("renaming {}: {e}", tmp.display())))
    }

    pub fn create(&self, task: ScheduledTask) -> AppResult<()> {
        {
            let mut tasks = self.tasks.write().expect("task store lock poisoned");
            if tasks.contains_key(&task.id) {
                return Err(AppError::Conflict(format!("task {} already exists", task.id)));
            }
            tasks.insert(task.id.clone(), task.clone());
        }

        if let Err(e) = self.persist(&task) {
            self.tasks
                .write()
                .expect("task store lock poisoned")
                .remove(&task.id);
            return Err(e);
        }
        Ok(())
    }

    pub fn update(&self, task: ScheduledTask) -> AppResult<()> {
        let previous = {
            let mut tasks = self.tasks.write().expect("task store lock poisoned");
            let previous = tasks
                .get(&task.id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("task {}", task.id)))?;
            tasks.insert(task.id.clone(), task.clone());
            previous
        };

        if let Err(e) = self.persist(&task) {
            self.tasks
                .write()
                .expect("task store lock poisoned")
                .insert(previous.id.clone(), previous);
            return Err(e);
        }
        Ok(())
    }

    pub fn delete(&self, id: &str) -> AppResult<ScheduledTask> {
        let removed = {
            let mut tasks = self.tasks.write().expect("task store lock poisoned");
            tasks
                .remove(id)
                .ok_or_else(|| AppError::NotFound(format!("task {id}")))?
        };

        if let Err(e) = fs::remove_file(self.record_path(id)) {
            if e.kind() != std::io::ErrorKind::NotFound {
                self.tasks
                    .write()
                    .expect("task store lock poisoned")
                    .insert(removed.id.clone(), removed);
                return Err(AppError::Internal(format!("deleting task {id}: {e}")));
            }
        }
        Ok(removed)
    }

    pub fn get(&self, id: &str) -> Option<ScheduledTask> {
        self.tasks
            .read()
            .expect("task store lock poisoned")
            .get(id)
            .cloned()
    }

    pub fn get_all(&self) -> Vec<ScheduledTask> {
        let mut all: Vec<ScheduledTask> = self
            .tasks
            .read()
            .expect("task store lock poisoned")
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }

    pub fn get_by_user(&self, user: &str) -> Vec<ScheduledTask> {
        self.get_all()
            .into_iter()
            .filter(|t| t.created_by == user)
            .collect()
    }

    pub fn update_last_run(&self, id: &str, at: DateTime<Utc>) -> AppResult<()> {
        self.mutate(id, |task| task.last_run_at = Some(at))
    }

    pub fn update_next_run(&self, id: &str, at: Option<DateTime<Utc>>) -> AppResult<()> {
        self.mutate(id, |task| task.next_run_at = at)
    }

    fn mutate(&self, id: &str, apply: impl FnOnce(&mut ScheduledTask)) -> AppResult<()> {
        let mut task = self
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("task {id}")))?;
        apply(&mut task);
        self.update(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn task(name: &str) -> ScheduledTask {
        ScheduledTask::new(
            name.to_string(),
            "alice".to_string(),
            "0 2 * * *".to_string(),
            "/data".to_string(),
            24,
        )
    }

    #[test]
    fn test_create_and_reload() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().to_path_buf();

        let created = task("nightly");
        {
            let store = TaskStore::open(&data_dir).unwrap();
            store.create(created.clone()).unwrap();
        }

        // records survive a restart
        let store = TaskStore::open(&data_dir).unwrap();
        let loaded = store.get(&created.id).expect("task should persist");
        assert_eq!(loaded.name, "nightly");
        assert_eq!(loaded.cron, "0 2 * * *");
        assert_eq!(loaded.hours_ago, 24);
    }

    #[test]
    fn test_create_duplicate_conflicts() {
        let dir = tempdir().unwrap();
        let store = TaskStore::open(&dir.path().to_path_buf()).unwrap();

        let t = task("dup");
        store.create(t.clone()).unwrap();
        assert!(matches!(store.create(t), Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_update_and_delete() {
        let dir = tempdir().unwrap();
        let store = TaskStore::open(&dir.path().to_path_buf()).unwrap();

        let mut t = task("edit-me");
        store.create(t.clone()).unwrap();

        t.enabled = false;
        t.hours_ago = 48;
        store.update(t.clone()).unwrap();
        let stored = store.get(&t.id).unwrap();
        assert!(!stored.enabled);
        assert_eq!(stored.hours_ago, 48);

        store.delete(&t.id).unwrap();
        assert!(store.get(&t.id).is_none());
        assert!(matches!(store.delete(&t.id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_update_missing_task() {
        let dir = tempdir().unwrap();
        let store = TaskStore::open(&dir.path().to_path_buf()).unwrap();
        assert!(matches!(store.update(task("ghost")), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_get_by_user() {
        let dir = tempdir().unwrap();
        let store = TaskStore::open(&dir.path().to_path_buf()).unwrap();

        let mut t1 = task("a");
        let mut t2 = task("b");
        t1.created_by = "alice".into();
        t2.created_by = "bob".into();
        store.create(t1).unwrap();
        store.create(t2).unwrap();

        let mine = store.get_by_user("alice");
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].name, "a");
    }

    #[test]
    fn test_run_timestamps() {
        let dir = tempdir().unwrap();
        let store = TaskStore::open(&dir.path().to_path_buf()).unwrap();

        let t = task("stamps");
        store.create(t.clone()).unwrap();

        let now = Utc::now();
        store.update_last_run(&t.id, now).unwrap();
        store.update_next_run(&t.id, Some(now + chrono::Duration::hours(1))).unwrap();

        let stored = store.get(&t.id).unwrap();
        assert_eq!(stored.last_run_at, Some(now));
        assert!(stored.next_run_at.unwrap() > now);

        store.update_next_run(&t.id, None).unwrap();
        assert!(store.get(&t.id).unwrap().next_run_at.is_none());
    }

    #[test]
    fn test_unreadable_record_skipped() {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().to_path_buf();
        let tasks_dir = data_dir.join("tasks");
        std::fs::create_dir_all(&tasks_dir).unwrap();
        std::fs::write(tasks_dir.join("garbage.json"), "{not json").unwrap();

        let store = TaskStore::open(&data_dir).unwrap();
        assert!(store.get_all().is_empty());
    }
}
