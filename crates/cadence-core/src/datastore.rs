use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::countdown::SnapshotSource;
use crate::reminder::{MainReminderConfig, Snapshot, TaskId, TaskReminder};

#[derive(Debug, Clone)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub main_path: PathBuf,
    pub tasks_path: PathBuf,
}

/// Fields to change on an existing task; `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub message: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub active: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.message.is_none() && self.timestamp.is_none() && self.active.is_none()
    }

    fn apply(&self, task: &mut TaskReminder) {
        if let Some(message) = &self.message {
            task.message = message.clone();
        }
        if let Some(timestamp) = self.timestamp {
            task.timestamp = timestamp;
        }
        if let Some(active) = self.active {
            task.active = active;
        }
    }
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let main_path = data_dir.join("main.json");
        let tasks_path = data_dir.join("tasks.data");

        if !main_path.exists() {
            info!("no main reminder stored; writing default");
            write_atomic(&main_path, |out| {
                serde_json::to_writer_pretty(&mut *out, &MainReminderConfig::default())?;
                writeln!(out)?;
                Ok(())
            })?;
        }
        if !tasks_path.exists() {
            fs::write(&tasks_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            main = %main_path.display(),
            tasks = %tasks_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            main_path,
            tasks_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_main(&self) -> anyhow::Result<MainReminderConfig> {
        let raw = fs::read_to_string(&self.main_path)
            .with_context(|| format!("failed reading {}", self.main_path.display()))?;
        if raw.trim().is_empty() {
            return Ok(MainReminderConfig::default());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.main_path.display()))
    }

    /// Replaces the stored main reminder wholesale.
    #[tracing::instrument(skip(self, config), fields(active = config.active))]
    pub fn save_main(&self, config: &MainReminderConfig) -> anyhow::Result<()> {
        write_atomic(&self.main_path, |out| {
            serde_json::to_writer_pretty(&mut *out, config)?;
            writeln!(out)?;
            Ok(())
        })
        .context("failed to save main.json")?;
        info!(repeat = ?config.repeat_type, "saved main reminder");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<TaskReminder>> {
        load_jsonl(&self.tasks_path).context("failed to load tasks.data")
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_tasks(&self, tasks: &[TaskReminder]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.data")
    }

    pub fn next_id(&self, tasks: &[TaskReminder]) -> anyhow::Result<TaskId> {
        let max = tasks.iter().map(|t| t.id).max().unwrap_or(0);
        max.checked_add(1)
            .ok_or_else(|| anyhow!("task id space exhausted (highest id is {max})"))
    }

    #[tracing::instrument(skip(self, message, timestamp), fields(timestamp = %timestamp))]
    pub fn add_task(
        &self,
        message: String,
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<TaskReminder> {
        if message.trim().is_empty() {
            return Err(anyhow!("task message cannot be empty"));
        }

        let mut tasks = self.load_tasks()?;
        let task = TaskReminder::new(self.next_id(&tasks)?, message, timestamp);
        tasks.push(task.clone());
        self.save_tasks(&tasks)?;
        info!(id = task.id, "added task");
        Ok(task)
    }

    #[tracing::instrument(skip(self, patch))]
    pub fn update_task(&self, id: TaskId, patch: &TaskPatch) -> anyhow::Result<TaskReminder> {
        if patch.is_empty() {
            return Err(anyhow!("no fields to update"));
        }
        if patch.message.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(anyhow!("task message cannot be empty"));
        }

        let mut tasks = self.load_tasks()?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| anyhow!("task not found: {id}"))?;
        patch.apply(task);
        let updated = task.clone();

        self.save_tasks(&tasks)?;
        info!(id, "updated task");
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_task(&self, id: TaskId) -> anyhow::Result<TaskReminder> {
        let mut tasks = self.load_tasks()?;
        let idx = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| anyhow!("task not found: {id}"))?;
        let removed = tasks.remove(idx);

        self.save_tasks(&tasks)?;
        info!(id, remaining = tasks.len(), "deleted task");
        Ok(removed)
    }
}

impl SnapshotSource for DataStore {
    fn snapshot(&self) -> anyhow::Result<Snapshot> {
        Ok(Snapshot {
            main: self.load_main()?,
            tasks: self.load_tasks()?,
        })
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> anyhow::Result<Vec<TaskReminder>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let task: TaskReminder = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(task);
    }

    debug!(count = out.len(), "loaded tasks from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");
    write_atomic(path, |out| {
        for record in records {
            let serialized = serde_json::to_string(record)?;
            writeln!(out, "{serialized}")?;
        }
        Ok(())
    })
}

fn write_atomic<F>(path: &Path, write: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> anyhow::Result<()>,
{
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    write(&mut temp)?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
