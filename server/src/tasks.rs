//! Task model and the pure operations on it.
//!
//! A task is one YAML file in the repository. Active tasks live under
//! `tasks/`, archived ones under `archive/`. Fields are written in a fixed
//! order so diffs in the repository stay readable:
//!
//! ```yaml
//! title: Review PR
//! description: null
//! status: open
//! priority: high
//! urgency: medium
//! time_estimate: 2.5
//! due_date: 2026-01-15T10:00:00Z
//! tags:
//! - code-review
//! assignee: null
//! reminders:
//! - 2026-01-15T09:00:00Z
//! created_at: 2026-01-10T08:00:00+00:00
//! updated_at: 2026-01-10T08:00:00+00:00
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use todolist_reminders::{parse_instant, TaskReminders};

/// Directory holding active tasks.
pub const TASKS_DIR: &str = "tasks";

/// Directory holding archived tasks.
pub const ARCHIVE_DIR: &str = "archive";

/// Default page size for listings.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Largest accepted page size.
pub const MAX_PAGE_SIZE: usize = 100;

/// Errors raised while decoding, validating or filtering tasks.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The YAML file could not be parsed or produced.
    #[error("invalid task YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON payload did not match the task schema.
    #[error("invalid task payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// A field value is not acceptable.
    #[error("invalid {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl TaskError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Workflow state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Done,
}

impl FromStr for Status {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "open" => Ok(Self::Open),
            "in-progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            other => Err(TaskError::invalid(
                "status",
                format!("expected open, in-progress or done, got '{other}'"),
            )),
        }
    }
}

/// Three-step scale used for both priority and urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// Urgency shares the priority scale.
pub type Urgency = Priority;

impl Priority {
    /// Sort rank, highest first.
    fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

impl FromStr for Priority {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(TaskError::invalid(
                "priority",
                format!("expected low, medium or high, got '{other}'"),
            )),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

/// A task as stored in the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub urgency: Urgency,
    /// Estimated effort in hours.
    #[serde(default)]
    pub time_estimate: Option<f64>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    /// Reminder instants as written by the user.
    #[serde(default, deserialize_with = "string_list")]
    pub reminders: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Task {
    /// Decodes a task from a JSON request payload.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Payload`] when the payload does not match the
    /// schema and [`TaskError::Invalid`] when the title is blank.
    pub fn from_json(value: Value) -> Result<Self, TaskError> {
        let task: Self = serde_json::from_value(value)?;
        task.validate()?;
        Ok(task)
    }

    /// Parses a task file.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Yaml`] for malformed YAML or schema mismatches.
    pub fn from_yaml(content: &str) -> Result<Self, TaskError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Renders the task file.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Yaml`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String, TaskError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Checks constraints the schema cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), TaskError> {
        if self.title.trim().is_empty() {
            return Err(TaskError::invalid("title", "must not be empty"));
        }
        if let Some(estimate) = self.time_estimate {
            if !estimate.is_finite() || estimate < 0.0 {
                return Err(TaskError::invalid(
                    "time_estimate",
                    format!("must be a non-negative number of hours, got {estimate}"),
                ));
            }
        }
        Ok(())
    }

    /// Sets creation and update timestamps for a newly created task.
    pub fn stamp_created(&mut self, now: DateTime<Utc>) {
        let now = now.to_rfc3339();
        if self.created_at.is_none() {
            self.created_at = Some(now.clone());
        }
        self.updated_at = Some(now);
    }

    /// Applies a partial update.
    ///
    /// Fields present in `fields` replace the stored ones, `filename` is
    /// ignored, and `updated_at` is always refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError`] when the merged task no longer matches the
    /// schema.
    pub fn merge(&self, fields: &Map<String, Value>, now: DateTime<Utc>) -> Result<Self, TaskError> {
        let mut merged = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        for (key, value) in fields {
            if key != "filename" {
                merged.insert(key.clone(), value.clone());
            }
        }

        let mut task = Self::from_json(Value::Object(merged))?;
        if task.created_at.is_none() {
            task.created_at = self.created_at.clone().or_else(|| Some(now.to_rfc3339()));
        }
        task.updated_at = Some(now.to_rfc3339());
        Ok(task)
    }

    /// Due date as an instant, if present and parseable.
    #[must_use]
    pub fn due_instant(&self) -> Option<DateTime<Utc>> {
        self.due_date.as_deref().and_then(|d| parse_instant(d).ok())
    }

    /// The reminder view of this task stored at `path`.
    #[must_use]
    pub fn reminder_view(&self, path: &str) -> TaskReminders {
        TaskReminders {
            identifier: path.to_string(),
            title: Some(self.title.clone()),
            description: self.description.clone(),
            reminders: self.reminders.clone(),
        }
    }
}

/// Accepts a list, a single string, or null.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
    })
}

/// Lowercase, dash-separated form of `text`, `"task"` when nothing is left.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let trimmed = slug.trim_matches('-');
    if trimmed.is_empty() {
        "task".to_string()
    } else {
        trimmed.to_string()
    }
}

/// A fresh filename for a task titled `title`.
#[must_use]
pub fn generate_filename(title: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}.yaml", slugify(title), &suffix[..8])
}

/// Repository path for a task filename. Paths already under `tasks/` or
/// `archive/` are kept.
#[must_use]
pub fn task_path(filename: &str) -> String {
    let filename = filename.trim_start_matches('/');
    if filename.starts_with("tasks/") || filename.starts_with("archive/") {
        filename.to_string()
    } else {
        format!("{TASKS_DIR}/{filename}")
    }
}

/// Archive path for a task filename.
#[must_use]
pub fn archive_path(filename: &str) -> String {
    let name = filename.rsplit('/').next().unwrap_or(filename);
    format!("{ARCHIVE_DIR}/{name}")
}

/// A task together with the path it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTask {
    pub path: String,
    pub sha: String,
    pub task: Task,
}

/// Query parameters of a task listing. List filters are comma-separated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub urgency: Option<String>,
    pub tags: Option<String>,
    pub assignee: Option<String>,
    pub due_before: Option<String>,
    pub due_after: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub include_description: Option<bool>,
}

/// Parsed form of a [`ListQuery`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub status: Vec<Status>,
    pub priority: Vec<Priority>,
    pub urgency: Vec<Urgency>,
    pub tags: Vec<String>,
    pub assignee: Option<String>,
    pub due_before: Option<DateTime<Utc>>,
    pub due_after: Option<DateTime<Utc>>,
    pub page: usize,
    pub page_size: usize,
    pub include_description: bool,
}

impl ListQuery {
    /// Validates and parses the query.
    ///
    /// Page numbers below 1 become 1 and page sizes are clamped to
    /// `1..=100`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Invalid`] for unknown enum values or unparseable
    /// date bounds.
    pub fn parse(&self) -> Result<TaskFilter, TaskError> {
        let due_before = parse_bound("due_before", self.due_before.as_deref())?;
        let due_after = parse_bound("due_after", self.due_after.as_deref())?;

        Ok(TaskFilter {
            status: parse_list(self.status.as_deref())?,
            priority: parse_list(self.priority.as_deref())?,
            urgency: parse_list(self.urgency.as_deref())?,
            tags: split_list(self.tags.as_deref())
                .map(str::to_string)
                .collect(),
            assignee: self.assignee.clone().filter(|a| !a.is_empty()),
            due_before,
            due_after,
            page: self.page.unwrap_or(1).max(1),
            page_size: self
                .page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
            include_description: self.include_description.unwrap_or(true),
        })
    }
}

fn split_list(value: Option<&str>) -> impl Iterator<Item = &str> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
}

fn parse_list<T: FromStr<Err = TaskError>>(value: Option<&str>) -> Result<Vec<T>, TaskError> {
    split_list(value).map(|item| item.parse::<T>()).collect()
}

fn parse_bound(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, TaskError> {
    match value.filter(|v| !v.trim().is_empty()) {
        Some(v) => parse_instant(v)
            .map(Some)
            .map_err(|e| TaskError::invalid(field, e.to_string())),
        None => Ok(None),
    }
}

impl TaskFilter {
    /// Whether `task` passes every filter.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        if !self.status.is_empty() && !self.status.contains(&task.status) {
            return false;
        }
        if !self.priority.is_empty() && !self.priority.contains(&task.priority) {
            return false;
        }
        if !self.urgency.is_empty() && !self.urgency.contains(&task.urgency) {
            return false;
        }
        if let Some(assignee) = &self.assignee {
            if task.assignee.as_ref() != Some(assignee) {
                return false;
            }
        }
        if !self.tags.iter().all(|tag| task.tags.contains(tag)) {
            return false;
        }

        if self.due_before.is_some() || self.due_after.is_some() {
            let Some(due) = task.due_instant() else {
                return false;
            };
            if self.due_before.is_some_and(|before| due > before) {
                return false;
            }
            if self.due_after.is_some_and(|after| due < after) {
                return false;
            }
        }

        true
    }
}

/// One row of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct ListedTask {
    pub filename: String,
    pub task: Value,
}

/// A page of tasks.
#[derive(Debug, Clone, Serialize)]
pub struct TaskPage {
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub tasks: Vec<ListedTask>,
}

impl TaskPage {
    /// An empty first page.
    #[must_use]
    pub fn empty(page_size: usize) -> Self {
        Self {
            total: 0,
            page: 1,
            page_size,
            tasks: Vec::new(),
        }
    }
}

/// Filters, sorts and paginates `tasks`.
///
/// Sort order is priority high to low, then due date earliest first with
/// undated tasks last. The sort is stable, so ties keep repository order.
///
/// # Errors
///
/// Returns [`TaskError::Payload`] if a task cannot be rendered to JSON.
pub fn list_tasks(tasks: Vec<StoredTask>, filter: &TaskFilter) -> Result<TaskPage, TaskError> {
    let mut selected: Vec<StoredTask> = tasks
        .into_iter()
        .filter(|stored| filter.matches(&stored.task))
        .collect();

    selected.sort_by_key(|stored| {
        let due = stored.task.due_instant();
        (stored.task.priority.rank(), due.is_none(), due)
    });

    let total = selected.len();
    let start = (filter.page - 1).saturating_mul(filter.page_size);

    let tasks = selected
        .into_iter()
        .skip(start)
        .take(filter.page_size)
        .map(|stored| -> Result<ListedTask, TaskError> {
            let mut value = serde_json::to_value(&stored.task)?;
            if !filter.include_description {
                if let Value::Object(map) = &mut value {
                    map.remove("description");
                }
            }
            Ok(ListedTask {
                filename: stored.path,
                task: value,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TaskPage {
        total,
        page: filter.page,
        page_size: filter.page_size,
        tasks,
    })
}
