#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::ph1e::{EventRecord, TaskRecord};
use crate::ph1n::{Entities, IntentKind, Priority, SlotKey};
use crate::{ContractViolation, Validate};

/// Conversation memory for one session. Written only after a successful dispatch,
/// read at slot-filling time of later turns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    last_task: Option<TaskRecord>,
    last_event: Option<EventRecord>,
    last_location: Option<String>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_task(&self) -> Option<&TaskRecord> {
        self.last_task.as_ref()
    }

    pub fn last_event(&self) -> Option<&EventRecord> {
        self.last_event.as_ref()
    }

    pub fn last_location(&self) -> Option<&str> {
        self.last_location.as_deref()
    }

    pub fn commit_task(&mut self, task: TaskRecord) -> Result<(), ContractViolation> {
        task.validate()?;
        self.last_task = Some(task);
        Ok(())
    }

    pub fn commit_event(&mut self, event: EventRecord) -> Result<(), ContractViolation> {
        event.validate()?;
        self.last_event = Some(event);
        Ok(())
    }

    pub fn commit_location(&mut self, location: &str) -> Result<(), ContractViolation> {
        let location = location.trim();
        if location.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "session_context.last_location",
                reason: "must not be empty",
            });
        }
        self.last_location = Some(location.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueState {
    Idle,
    AwaitingUtterance,
    Matched {
        intent: IntentKind,
        entities: Entities,
        priority: Priority,
    },
    SlotFilling {
        intent: IntentKind,
        slot: SlotKey,
    },
    Dispatching {
        intent: IntentKind,
    },
    SpeakingResult,
    Exited,
}

impl DialogueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialogueState::Idle => "idle",
            DialogueState::AwaitingUtterance => "awaiting_utterance",
            DialogueState::Matched { .. } => "matched",
            DialogueState::SlotFilling { .. } => "slot_filling",
            DialogueState::Dispatching { .. } => "dispatching",
            DialogueState::SpeakingResult => "speaking_result",
            DialogueState::Exited => "exited",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DialogueState::Exited)
    }
}

/// One-way update for an observing display. Every variant carries the full replacement payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Notification {
    TasksUpdated(Vec<TaskRecord>),
    EventsUpdated(Vec<EventRecord>),
    WeatherUpdated(String),
}
