#![forbid(unsafe_code)]

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::common::validate_text;
use crate::ph1n::Priority;
use crate::{ContractViolation, Validate};

pub const DEFAULT_TASK_TYPE: &str = "General";

const MAX_NAME_LEN: usize = 256;
const MAX_WHEN_LEN: usize = 128;
const MAX_NOTES_LEN: usize = 1_024;

/// Workflow state of a task. New tasks start as `ToDo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    ToDo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::ToDo => "To Do",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Done => "Done",
        }
    }

    /// Accepts spoken forms such as "to do", "todo", "in progress", "done".
    pub fn parse(text: &str) -> Option<Self> {
        let squashed: String = text
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        match squashed.as_str() {
            "todo" => Some(TaskStatus::ToDo),
            "inprogress" | "started" | "doing" => Some(TaskStatus::InProgress),
            "done" | "finished" | "complete" | "completed" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task as dispatched to, and listed by, the task service.
///
/// `due` keeps the user's phrase; `due_at` is set only when it resolved to a local time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    pub task_type: String,
    pub priority: Priority,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub due: Option<String>,
    #[serde(default)]
    pub due_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TaskRecord {
    pub fn v1(
        name: impl Into<String>,
        task_type: impl Into<String>,
        priority: Priority,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            name: name.into(),
            task_type: task_type.into(),
            priority,
            status: TaskStatus::default(),
            due: None,
            due_at: None,
            notes: None,
        };
        r.validate()?;
        Ok(r)
    }

    pub fn with_due(
        mut self,
        phrase: impl Into<String>,
        resolved_at: Option<NaiveDateTime>,
    ) -> Result<Self, ContractViolation> {
        self.due = Some(phrase.into());
        self.due_at = resolved_at;
        self.validate()?;
        Ok(self)
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Result<Self, ContractViolation> {
        self.notes = Some(notes.into());
        self.validate()?;
        Ok(self)
    }

    pub fn spoken_summary(&self) -> String {
        let due = match (&self.due, self.due_at) {
            (Some(phrase), Some(at)) => format!("{phrase} ({})", at.format("%Y-%m-%d %H:%M")),
            (Some(phrase), None) => phrase.clone(),
            (None, _) => "none".to_string(),
        };
        let mut out = format!(
            "Task: {}, Type: {}, Status: {}, Priority: {}, Due: {}.",
            self.name, self.task_type, self.status, self.priority, due
        );
        if let Some(notes) = &self.notes {
            out.push_str(&format!(" Notes: {notes}."));
        }
        out
    }
}

impl Validate for TaskRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("task_record.name", &self.name, MAX_NAME_LEN)?;
        validate_text("task_record.task_type", &self.task_type, 64)?;
        if let Some(due) = &self.due {
            validate_text("task_record.due", due, MAX_WHEN_LEN)?;
        } else if self.due_at.is_some() {
            return Err(ContractViolation::InvalidValue {
                field: "task_record.due_at",
                reason: "requires a due phrase",
            });
        }
        if let Some(notes) = &self.notes {
            validate_text("task_record.notes", notes, MAX_NOTES_LEN)?;
        }
        Ok(())
    }
}

/// A calendar event. `when` keeps the user's phrase; `resolved_at` is set only when
/// the phrase resolved to a concrete local time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventRecord {
    pub name: String,
    pub when: String,
    pub resolved_at: Option<NaiveDateTime>,
    pub priority: Priority,
}

impl EventRecord {
    pub fn v1(
        name: impl Into<String>,
        when: impl Into<String>,
        resolved_at: Option<NaiveDateTime>,
        priority: Priority,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            name: name.into(),
            when: when.into(),
            resolved_at,
            priority,
        };
        r.validate()?;
        Ok(r)
    }

    pub fn spoken_summary(&self) -> String {
        match self.resolved_at {
            Some(at) => format!(
                "Event: {}, When: {} ({}), Priority: {}.",
                self.name,
                self.when,
                at.format("%Y-%m-%d %H:%M"),
                self.priority
            ),
            None => format!(
                "Event: {}, When: {}, Priority: {}.",
                self.name, self.when, self.priority
            ),
        }
    }
}

impl Validate for EventRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("event_record.name", &self.name, MAX_NAME_LEN)?;
        validate_text("event_record.when", &self.when, MAX_WHEN_LEN)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub location: String,
    pub text: String,
}

impl WeatherReport {
    pub fn v1(
        location: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<Self, ContractViolation> {
        let r = Self {
            location: location.into(),
            text: text.into(),
        };
        r.validate()?;
        Ok(r)
    }
}

impl Validate for WeatherReport {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("weather_report.location", &self.location, MAX_NAME_LEN)?;
        validate_text("weather_report.text", &self.text, 1_024)?;
        Ok(())
    }
}

/// Failure classes a collaborator can report. The retry layer decides which are retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
    /// Connection refused/reset, DNS, TLS: transient network trouble.
    Network,
    Timeout,
    RateLimited,
    Unavailable,
    NotFound,
    Rejected,
    Internal,
}

impl ServiceErrorKind {
    pub const TRANSIENT: [ServiceErrorKind; 4] = [
        ServiceErrorKind::Network,
        ServiceErrorKind::Timeout,
        ServiceErrorKind::RateLimited,
        ServiceErrorKind::Unavailable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceErrorKind::Network => "network",
            ServiceErrorKind::Timeout => "timeout",
            ServiceErrorKind::RateLimited => "rate_limited",
            ServiceErrorKind::Unavailable => "unavailable",
            ServiceErrorKind::NotFound => "not_found",
            ServiceErrorKind::Rejected => "rejected",
            ServiceErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} error: {detail}", kind.as_str())]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub detail: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Network, detail)
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Rejected, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::NotFound, detail)
    }
}

impl From<ContractViolation> for ServiceError {
    fn from(value: ContractViolation) -> Self {
        ServiceError::rejected(value.to_string())
    }
}
