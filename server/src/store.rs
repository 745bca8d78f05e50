//! GitHub-backed task store.
//!
//! [`TaskStore`] combines the pure task operations from [`crate::tasks`]
//! with the repository calls of [`GitHubClient`]. It is also the
//! [`TaskSource`] the reminder bootstrap reads from.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use todolist_reminders::{ReminderError, TaskReminders, TaskSource};

use crate::error::StoreError;
use crate::github::{FileContent, GitHubClient, GitHubError};
use crate::tasks::{
    archive_path, generate_filename, list_tasks, task_path, StoredTask, Task, TaskFilter,
    TaskPage, TASKS_DIR,
};

/// Task persistence on top of a GitHub repository.
#[derive(Debug, Clone)]
pub struct TaskStore {
    client: GitHubClient,
}

impl TaskStore {
    /// Creates a store using `client` for every repository call.
    #[must_use]
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }

    /// The underlying GitHub client.
    #[must_use]
    pub fn client(&self) -> &GitHubClient {
        &self.client
    }

    /// Creates a new task file.
    ///
    /// `filename` defaults to `<slug>-<8 hex>.yaml` derived from the title.
    /// Timestamps are set from `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::GitHub`] with a conflict if the file exists.
    pub async fn create(
        &self,
        mut task: Task,
        filename: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<StoredTask, StoreError> {
        task.validate()?;
        task.stamp_created(now);

        let filename = filename
            .filter(|name| !name.trim().is_empty())
            .map_or_else(|| generate_filename(&task.title), str::to_string);
        let path = task_path(&filename);

        let file = self
            .client
            .create_file(&path, &task.to_yaml()?, Some(&format!("Create task {path}")))
            .await?;

        Ok(StoredTask {
            path: file.path,
            sha: file.sha,
            task,
        })
    }

    /// Reads one task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::GitHub`] for missing files and
    /// [`StoreError::Corrupt`] when the file is not a valid task.
    pub async fn read(&self, filename: &str) -> Result<StoredTask, StoreError> {
        let file = self.client.read_file(&task_path(filename)).await?;
        parse_file(file)
    }

    /// Merges `fields` into the stored task and writes it back.
    ///
    /// The write carries the sha that was read, so a concurrent change
    /// surfaces as a conflict instead of being overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Task`] when the merged task is invalid, or the
    /// repository error of the read or write.
    pub async fn update(
        &self,
        filename: &str,
        fields: &Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<StoredTask, StoreError> {
        let existing = self.read(filename).await?;
        let task = existing.task.merge(fields, now)?;

        let file = self
            .client
            .update_file(
                &existing.path,
                &task.to_yaml()?,
                Some(&existing.sha),
                Some(&format!("Update task {}", existing.path)),
            )
            .await?;

        Ok(StoredTask {
            path: file.path,
            sha: file.sha,
            task,
        })
    }

    /// Moves a task into `archive/`, returning the archive path.
    ///
    /// # Errors
    ///
    /// Returns the repository error of the move.
    pub async fn archive(&self, filename: &str) -> Result<String, StoreError> {
        let source = task_path(filename);
        let target = archive_path(filename);
        let moved = self
            .client
            .move_file(&source, &target, Some(&format!("Archive task {source}")))
            .await?;
        info!(from = %source, to = %moved.path, "Archived task");
        Ok(moved.path)
    }

    /// Every active task. A missing `tasks/` directory is an empty store.
    ///
    /// Files that do not parse as tasks are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::GitHub`] if the directory cannot be read.
    pub async fn list_all(&self) -> Result<Vec<StoredTask>, StoreError> {
        let files = self.client.read_directory_files(TASKS_DIR).await;
        collect_tasks(files)
    }

    /// Filters, sorts and paginates the active tasks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the tasks cannot be loaded or rendered.
    pub async fn list(&self, filter: &TaskFilter) -> Result<TaskPage, StoreError> {
        let tasks = self.list_all().await?;
        Ok(list_tasks(tasks, filter)?)
    }
}

#[async_trait]
impl TaskSource for TaskStore {
    async fn task_reminders(&self) -> todolist_reminders::Result<Vec<TaskReminders>> {
        let files = self.client.read_directory_files_with_retry(TASKS_DIR).await;
        let tasks = collect_tasks(files).map_err(|e| ReminderError::Source(e.to_string()))?;
        Ok(tasks
            .iter()
            .map(|stored| stored.task.reminder_view(&stored.path))
            .collect())
    }
}

fn is_task_file(path: &str) -> bool {
    path.ends_with(".yaml") || path.ends_with(".yml")
}

fn parse_file(file: FileContent) -> Result<StoredTask, StoreError> {
    match Task::from_yaml(&file.content) {
        Ok(task) => Ok(StoredTask {
            path: file.path,
            sha: file.sha,
            task,
        }),
        Err(source) => Err(StoreError::Corrupt {
            path: file.path,
            source,
        }),
    }
}

fn collect_tasks(
    files: Result<Vec<FileContent>, GitHubError>,
) -> Result<Vec<StoredTask>, StoreError> {
    let files = match files {
        Ok(files) => files,
        Err(GitHubError::NotADirectory(dir)) => {
            debug!(directory = %dir, "Task directory missing; treating as empty");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let tasks = files
        .into_iter()
        .filter(|file| is_task_file(&file.path))
        .filter_map(|file| match parse_file(file) {
            Ok(stored) => Some(stored),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable task file");
                None
            }
        })
        .collect();

    Ok(tasks)
}
