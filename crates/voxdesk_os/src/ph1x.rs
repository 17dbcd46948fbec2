#![forbid(unsafe_code)]

use chrono::NaiveDateTime;
use voxdesk_engines::ph1n_time::resolve_when;
use voxdesk_kernel_contracts::ph1c::CaptureOutcome;
use voxdesk_kernel_contracts::ph1e::{
    EventRecord, ServiceError, ServiceErrorKind, TaskRecord, DEFAULT_TASK_TYPE,
};
use voxdesk_kernel_contracts::ph1n::{Entities, IntentKind, Priority, SlotKey};
use voxdesk_kernel_contracts::ph1sched::RetrySchedule;
use voxdesk_kernel_contracts::ph1x::{DialogueState, Notification, SessionContext};
use voxdesk_kernel_contracts::{ContractViolation, ReasonCodeId, Validate};

use crate::ph1c::UtteranceSource;
use crate::ph1e::{EventService, NotificationSink, TaskService, WeatherService};
use crate::ph1n::Interpreter;
use crate::ph1sched::{RetryPolicy, Sleeper, ThreadSleeper};
use crate::ph1tts::SpeechSink;

pub mod reason_codes {
    use voxdesk_kernel_contracts::ReasonCodeId;

    // Dialogue reason-code namespace.
    pub const X_DISPATCHED: ReasonCodeId = ReasonCodeId(0x5800_0001);
    pub const X_EXIT: ReasonCodeId = ReasonCodeId(0x5800_0002);
    pub const X_NO_UTTERANCE: ReasonCodeId = ReasonCodeId(0x5800_0003);
    pub const X_NO_MATCH: ReasonCodeId = ReasonCodeId(0x5800_0010);
    pub const X_MISSING_REQUIRED_SLOT: ReasonCodeId = ReasonCodeId(0x5800_0011);
    pub const X_HANDLER_FAILURE: ReasonCodeId = ReasonCodeId(0x5800_0012);
    pub const X_CONTRACT_VIOLATION: ReasonCodeId = ReasonCodeId(0x5800_00F1);
}

pub const GREETING: &str = "Hello! How can I assist you today?";
pub const FAREWELL: &str = "Exiting assistant. Goodbye!";
pub const REPEAT_APOLOGY: &str = "Sorry, I did not understand that. Please repeat.";
pub const NETWORK_APOLOGY: &str =
    "Could not request results; please check your network connection.";

const CANCEL_WORDS: &[&str] = &["cancel", "never mind", "nevermind", "forget it"];
const SKIP_WORDS: &[&str] = &["skip", "no", "none", "default", "nothing"];

#[derive(Debug, Clone, PartialEq)]
pub struct DialogueConfig {
    pub default_task_type: String,
    /// Ask for a task type when the command did not carry one.
    pub prompt_task_type: bool,
    /// Ends the session after this many turns in a row without a usable utterance.
    pub max_consecutive_silences: Option<u32>,
    pub retry: RetrySchedule,
}

impl DialogueConfig {
    pub fn mvp_v1() -> Self {
        Self {
            default_task_type: DEFAULT_TASK_TYPE.to_string(),
            prompt_task_type: true,
            max_consecutive_silences: None,
            retry: RetrySchedule::mvp_v1(),
        }
    }
}

impl Validate for DialogueConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.default_task_type.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "dialogue_config.default_task_type",
                reason: "must not be empty",
            });
        }
        if self.max_consecutive_silences == Some(0) {
            return Err(ContractViolation::InvalidValue {
                field: "dialogue_config.max_consecutive_silences",
                reason: "must be > 0 when set",
            });
        }
        self.retry.validate()
    }
}

/// Why a turn ended without dispatching. Every variant is spoken, then the loop continues.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TurnError {
    #[error("no intent matched {heard:?}")]
    NoMatch { heard: String },
    #[error("required slot {0} is still missing")]
    MissingRequiredSlot(SlotKey),
    #[error("{operation} failed after retries: {kind:?}: {detail}")]
    HandlerFailure {
        operation: &'static str,
        kind: ServiceErrorKind,
        detail: String,
    },
    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),
}

impl TurnError {
    pub fn reason_code(&self) -> ReasonCodeId {
        match self {
            TurnError::NoMatch { .. } => reason_codes::X_NO_MATCH,
            TurnError::MissingRequiredSlot(_) => reason_codes::X_MISSING_REQUIRED_SLOT,
            TurnError::HandlerFailure { .. } => reason_codes::X_HANDLER_FAILURE,
            TurnError::Contract(_) => reason_codes::X_CONTRACT_VIOLATION,
        }
    }

    pub fn spoken(&self) -> String {
        match self {
            TurnError::NoMatch { heard } => {
                format!("Sorry, I can't help with that yet. You said: {heard}")
            }
            TurnError::MissingRequiredSlot(slot) => refusal_for(*slot).to_string(),
            TurnError::HandlerFailure { operation, .. } => format!("Failed to {operation}."),
            TurnError::Contract(_) => REPEAT_APOLOGY.to_string(),
        }
    }

    fn handler(operation: &'static str, err: ServiceError) -> Self {
        TurnError::HandlerFailure {
            operation,
            kind: err.kind,
            detail: err.detail,
        }
    }
}

fn prompt_for(slot: SlotKey) -> &'static str {
    match slot {
        SlotKey::TaskName => "Please provide the task name.",
        SlotKey::TaskType => "What type of task is this? Say skip for the default.",
        SlotKey::EventName => "What should I call the event?",
        SlotKey::Time => "When is the event?",
        SlotKey::Location => "Which city do you want the weather for?",
    }
}

fn refusal_for(slot: SlotKey) -> &'static str {
    match slot {
        SlotKey::TaskName => "I can't add a task without a name.",
        SlotKey::TaskType => "I can't add a task without a type.",
        SlotKey::EventName => "I can't add an event without a name.",
        SlotKey::Time => "I can't add an event without a time.",
        SlotKey::Location => "I can't check the weather without a location.",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    NoUtterance,
    Dispatched(IntentKind),
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    ExitCommand,
    InputClosed,
    SilenceLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub turns: u32,
    pub dispatched: u32,
    pub aborted: u32,
    pub end: SessionEnd,
}

/// External collaborators a session dispatches to.
pub struct DialogueServices {
    pub tasks: Box<dyn TaskService + Send>,
    pub events: Box<dyn EventService + Send>,
    pub weather: Box<dyn WeatherService + Send>,
    pub notifications: Box<dyn NotificationSink + Send>,
}

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Slot-filling dialogue loop. Owns the session context; one utterance is handled
/// completely before the next capture.
pub struct DialogueController<S = ThreadSleeper>
where
    S: Sleeper,
{
    config: DialogueConfig,
    interpreter: Interpreter,
    services: DialogueServices,
    retry: RetryPolicy<S>,
    context: SessionContext,
    state: DialogueState,
    clock: fn() -> NaiveDateTime,
}

impl DialogueController<ThreadSleeper> {
    pub fn mvp_v1(services: DialogueServices) -> Result<Self, ContractViolation> {
        Self::new(
            DialogueConfig::mvp_v1(),
            Interpreter::mvp_v1(),
            services,
            ThreadSleeper,
        )
    }
}

impl<S> DialogueController<S>
where
    S: Sleeper,
{
    pub fn new(
        config: DialogueConfig,
        interpreter: Interpreter,
        services: DialogueServices,
        sleeper: S,
    ) -> Result<Self, ContractViolation> {
        config.validate()?;
        let retry = RetryPolicy::new(config.retry.clone(), sleeper)?;
        Ok(Self {
            config,
            interpreter,
            services,
            retry,
            context: SessionContext::new(),
            state: DialogueState::Idle,
            clock: local_now,
        })
    }

    /// Overrides the wall clock used to resolve event times.
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> &DialogueState {
        &self.state
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn retry(&self) -> &RetryPolicy<S> {
        &self.retry
    }

    fn transition(&mut self, next: DialogueState) {
        if self.state != next {
            tracing::info!(
                from = self.state.as_str(),
                to = next.as_str(),
                "dialogue transition"
            );
        }
        self.state = next;
    }

    /// Greets, runs turns until exit or end of input, says goodbye.
    pub fn run(
        &mut self,
        source: &mut dyn UtteranceSource,
        speech: &mut dyn SpeechSink,
    ) -> SessionSummary {
        self.transition(DialogueState::AwaitingUtterance);
        speech.say(GREETING);

        let mut turns = 0;
        let mut dispatched = 0;
        let mut aborted = 0;
        let mut silences = 0;
        let end = loop {
            turns += 1;
            match self.run_turn(source, speech) {
                Ok(TurnOutcome::Exit) => break SessionEnd::ExitCommand,
                Ok(TurnOutcome::NoUtterance) => {
                    if source.is_closed() {
                        break SessionEnd::InputClosed;
                    }
                    silences += 1;
                    if self
                        .config
                        .max_consecutive_silences
                        .is_some_and(|max| silences >= max)
                    {
                        break SessionEnd::SilenceLimit;
                    }
                    continue;
                }
                Ok(TurnOutcome::Dispatched(_)) => dispatched += 1,
                Err(_) => aborted += 1,
            }
            silences = 0;
            if source.is_closed() {
                break SessionEnd::InputClosed;
            }
        };

        speech.say(FAREWELL);
        self.transition(DialogueState::Exited);
        let summary = SessionSummary {
            turns,
            dispatched,
            aborted,
            end,
        };
        tracing::info!(?summary, "session ended");
        summary
    }

    /// One capture-to-speech turn. Failures are spoken before they are returned.
    pub fn run_turn(
        &mut self,
        source: &mut dyn UtteranceSource,
        speech: &mut dyn SpeechSink,
    ) -> Result<TurnOutcome, TurnError> {
        let out = self.turn(source, speech);
        match &out {
            Ok(outcome) => {
                tracing::debug!(?outcome, "turn finished");
            }
            Err(err) => {
                match err {
                    TurnError::HandlerFailure { .. } => tracing::error!(
                        reason_code = err.reason_code().0,
                        error = %err,
                        "handler failed"
                    ),
                    _ => tracing::warn!(
                        reason_code = err.reason_code().0,
                        error = %err,
                        "turn aborted"
                    ),
                }
                self.transition(DialogueState::SpeakingResult);
                speech.say(&err.spoken());
            }
        }
        if !self.state.is_terminal() && !matches!(out, Ok(TurnOutcome::Exit)) {
            self.transition(DialogueState::AwaitingUtterance);
        }
        out
    }

    fn turn(
        &mut self,
        source: &mut dyn UtteranceSource,
        speech: &mut dyn SpeechSink,
    ) -> Result<TurnOutcome, TurnError> {
        self.transition(DialogueState::AwaitingUtterance);
        let captured = source.capture();
        let network_trouble = matches!(captured, CaptureOutcome::TransportError(_));
        let Some(text) = captured.into_text() else {
            if !source.is_closed() {
                speech.say(if network_trouble {
                    NETWORK_APOLOGY
                } else {
                    REPEAT_APOLOGY
                });
            }
            return Ok(TurnOutcome::NoUtterance);
        };

        let interp = self.interpreter.interpret(&text)?;
        let Some(intent) = interp.intent() else {
            return Err(TurnError::NoMatch { heard: text });
        };
        self.transition(DialogueState::Matched {
            intent,
            entities: interp.entities.clone(),
            priority: interp.priority,
        });

        let entities = interp.entities;
        let priority = interp.priority;
        match intent {
            IntentKind::Exit => return Ok(TurnOutcome::Exit),
            IntentKind::AddTask => self.add_task(&entities, priority, source, speech)?,
            IntentKind::ListTasks => self.list_tasks(speech)?,
            IntentKind::AddEvent => self.add_event(&entities, priority, source, speech)?,
            IntentKind::ListEvents => self.list_events(speech)?,
            IntentKind::GetWeather => self.get_weather(&entities, source, speech)?,
        }
        tracing::info!(
            intent = intent.as_str(),
            reason_code = reason_codes::X_DISPATCHED.0,
            "turn dispatched"
        );
        Ok(TurnOutcome::Dispatched(intent))
    }

    /// Prompts for one slot and listens once. `None` when nothing usable came back.
    fn ask(
        &mut self,
        intent: IntentKind,
        slot: SlotKey,
        source: &mut dyn UtteranceSource,
        speech: &mut dyn SpeechSink,
    ) -> Option<String> {
        self.transition(DialogueState::SlotFilling { intent, slot });
        speech.say(prompt_for(slot));
        let text = source.capture().into_text()?;
        let lower = text.to_lowercase();
        if CANCEL_WORDS.contains(&lower.as_str()) {
            return None;
        }
        let value = match slot {
            SlotKey::Time | SlotKey::Location => {
                let extractor = self.interpreter.extractor();
                self.interpreter.annotate(&text).ok().and_then(|u| {
                    if slot == SlotKey::Time {
                        extractor.time_phrase(&u)
                    } else {
                        extractor.location(&u)
                    }
                })
            }
            _ => None,
        };
        Some(value.unwrap_or(text))
    }

    fn require(
        &mut self,
        intent: IntentKind,
        slot: SlotKey,
        found: Option<&str>,
        source: &mut dyn UtteranceSource,
        speech: &mut dyn SpeechSink,
    ) -> Result<String, TurnError> {
        if let Some(v) = found {
            return Ok(v.to_string());
        }
        self.ask(intent, slot, source, speech)
            .ok_or(TurnError::MissingRequiredSlot(slot))
    }

    fn add_task(
        &mut self,
        entities: &Entities,
        priority: Priority,
        source: &mut dyn UtteranceSource,
        speech: &mut dyn SpeechSink,
    ) -> Result<(), TurnError> {
        let intent = IntentKind::AddTask;
        let name = self.require(
            intent,
            SlotKey::TaskName,
            entities.get(SlotKey::TaskName),
            source,
            speech,
        )?;
        let task_type = match entities.get(SlotKey::TaskType) {
            Some(t) => t.to_string(),
            None if self.config.prompt_task_type => self
                .ask(intent, SlotKey::TaskType, source, speech)
                .filter(|t| !SKIP_WORDS.contains(&t.to_lowercase().as_str()))
                .unwrap_or_else(|| self.config.default_task_type.clone()),
            None => self.config.default_task_type.clone(),
        };
        let mut task = TaskRecord::v1(name, task_type, priority)?;
        if let Some(due) = entities.get(SlotKey::Time) {
            let due_at = resolve_when(due, (self.clock)());
            task = task.with_due(due, due_at)?;
        }

        self.transition(DialogueState::Dispatching { intent });
        let tasks = &mut self.services.tasks;
        let message = self
            .retry
            .call("add_task", || tasks.add(&task))
            .map_err(|e| TurnError::handler("add task", e))?;
        self.context.commit_task(task)?;
        self.notify_tasks();

        self.transition(DialogueState::SpeakingResult);
        speech.say(&message);
        Ok(())
    }

    fn list_tasks(&mut self, speech: &mut dyn SpeechSink) -> Result<(), TurnError> {
        self.transition(DialogueState::Dispatching {
            intent: IntentKind::ListTasks,
        });
        let tasks = &mut self.services.tasks;
        let list = self
            .retry
            .call("list_tasks", || tasks.list())
            .map_err(|e| TurnError::handler("read tasks", e))?;
        self.services
            .notifications
            .notify(Notification::TasksUpdated(list.clone()));

        self.transition(DialogueState::SpeakingResult);
        if list.is_empty() {
            speech.say("There are no tasks.");
        } else {
            speech.say("Here are your tasks:");
            for t in &list {
                speech.say(&t.spoken_summary());
            }
        }
        Ok(())
    }

    fn add_event(
        &mut self,
        entities: &Entities,
        priority: Priority,
        source: &mut dyn UtteranceSource,
        speech: &mut dyn SpeechSink,
    ) -> Result<(), TurnError> {
        let intent = IntentKind::AddEvent;
        let name = self.require(
            intent,
            SlotKey::EventName,
            entities.get(SlotKey::EventName),
            source,
            speech,
        )?;
        let when = self.require(
            intent,
            SlotKey::Time,
            entities.get(SlotKey::Time),
            source,
            speech,
        )?;
        let resolved_at = resolve_when(&when, (self.clock)());
        let event = EventRecord::v1(name, when, resolved_at, priority)?;

        self.transition(DialogueState::Dispatching { intent });
        let events = &mut self.services.events;
        let message = self
            .retry
            .call("add_event", || events.add(&event))
            .map_err(|e| TurnError::handler("add event", e))?;
        self.context.commit_event(event)?;
        self.notify_events();

        self.transition(DialogueState::SpeakingResult);
        speech.say(&message);
        Ok(())
    }

    fn list_events(&mut self, speech: &mut dyn SpeechSink) -> Result<(), TurnError> {
        self.transition(DialogueState::Dispatching {
            intent: IntentKind::ListEvents,
        });
        let events = &mut self.services.events;
        let list = self
            .retry
            .call("list_events", || events.list())
            .map_err(|e| TurnError::handler("read events", e))?;
        self.services
            .notifications
            .notify(Notification::EventsUpdated(list.clone()));

        self.transition(DialogueState::SpeakingResult);
        if list.is_empty() {
            speech.say("There are no events on your calendar.");
        } else {
            speech.say("Here are your events:");
            for e in &list {
                speech.say(&e.spoken_summary());
            }
        }
        Ok(())
    }

    fn get_weather(
        &mut self,
        entities: &Entities,
        source: &mut dyn UtteranceSource,
        speech: &mut dyn SpeechSink,
    ) -> Result<(), TurnError> {
        let intent = IntentKind::GetWeather;
        let carried = entities
            .get(SlotKey::Location)
            .or(self.context.last_location())
            .map(str::to_string);
        let location =
            self.require(intent, SlotKey::Location, carried.as_deref(), source, speech)?;

        self.transition(DialogueState::Dispatching { intent });
        let weather = &mut self.services.weather;
        let report = self
            .retry
            .call("get_weather", || weather.lookup(&location))
            .map_err(|e| TurnError::handler("get the weather", e))?;
        self.context.commit_location(&location)?;
        self.services
            .notifications
            .notify(Notification::WeatherUpdated(report.text.clone()));

        self.transition(DialogueState::SpeakingResult);
        speech.say(&report.text);
        Ok(())
    }

    /// Full-list refresh after a change. A failed refresh is logged, not spoken.
    fn notify_tasks(&mut self) {
        let tasks = &mut self.services.tasks;
        match self.retry.call("list_tasks", || tasks.list()) {
            Ok(list) => self
                .services
                .notifications
                .notify(Notification::TasksUpdated(list)),
            Err(err) => tracing::warn!(error = %err, "task list refresh failed"),
        }
    }

    fn notify_events(&mut self) {
        let events = &mut self.services.events;
        match self.retry.call("list_events", || events.list()) {
            Ok(list) => self
                .services
                .notifications
                .notify(Notification::EventsUpdated(list)),
            Err(err) => tracing::warn!(error = %err, "event list refresh failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ph1c::ScriptedSource;
    use crate::ph1sched::RecordingSleeper;
    use crate::ph1tts::SpeechTranscript;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use voxdesk_engines::ph1e::{InMemoryEventCalendar, InMemoryTaskBoard, OfflineWeather};
    use voxdesk_kernel_contracts::ph1e::{TaskStatus, WeatherReport};

    fn fixed_now() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 3, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[derive(Clone, Default)]
    struct SharedNotifications(Arc<Mutex<Vec<Notification>>>);

    impl NotificationSink for SharedNotifications {
        fn notify(&mut self, notification: Notification) {
            self.0.lock().unwrap().push(notification);
        }
    }

    /// Fails with the given kinds first, then answers from the offline table.
    struct FlakyWeather {
        failures: Vec<ServiceErrorKind>,
        calls: Arc<Mutex<u32>>,
        inner: OfflineWeather,
    }

    impl WeatherService for FlakyWeather {
        fn lookup(&mut self, location: &str) -> Result<WeatherReport, ServiceError> {
            *self.calls.lock().unwrap() += 1;
            if !self.failures.is_empty() {
                let kind = self.failures.remove(0);
                return Err(ServiceError::new(kind, "scripted failure"));
            }
            self.inner.lookup(location)
        }
    }

    struct Harness {
        controller: DialogueController<RecordingSleeper>,
        notifications: SharedNotifications,
        weather_calls: Arc<Mutex<u32>>,
    }

    fn harness(weather_failures: Vec<ServiceErrorKind>, config: DialogueConfig) -> Harness {
        let notifications = SharedNotifications::default();
        let weather_calls = Arc::new(Mutex::new(0));
        let services = DialogueServices {
            tasks: Box::new(InMemoryTaskBoard::new()),
            events: Box::new(InMemoryEventCalendar::new()),
            weather: Box::new(FlakyWeather {
                failures: weather_failures,
                calls: weather_calls.clone(),
                inner: OfflineWeather::mvp_v1()
                    .without_fallback()
                    .with_report("paris", "sunny, 21°C")
                    .with_report("london", "rain, 12°C"),
            }),
            notifications: Box::new(notifications.clone()),
        };
        let controller = DialogueController::new(
            config,
            Interpreter::mvp_v1(),
            services,
            RecordingSleeper::default(),
        )
        .unwrap()
        .with_clock(fixed_now);
        Harness {
            controller,
            notifications,
            weather_calls,
        }
    }

    fn session(lines: &[&str]) -> (Harness, SpeechTranscript, SessionSummary) {
        session_with(lines, vec![], DialogueConfig::mvp_v1())
    }

    fn session_with(
        lines: &[&str],
        weather_failures: Vec<ServiceErrorKind>,
        config: DialogueConfig,
    ) -> (Harness, SpeechTranscript, SessionSummary) {
        let mut h = harness(weather_failures, config);
        let mut source = ScriptedSource::from_lines(lines.iter().copied());
        let mut speech = SpeechTranscript::new();
        let summary = h.controller.run(&mut source, &mut speech);
        (h, speech, summary)
    }

    #[test]
    fn at_x_01_greets_and_exits_on_exit_word() {
        let (h, speech, summary) = session(&["quit", "add task never reached"]);
        assert_eq!(
            speech.lines(),
            &[GREETING.to_string(), FAREWELL.to_string()]
        );
        assert_eq!(summary.end, SessionEnd::ExitCommand);
        assert_eq!(h.controller.state(), &DialogueState::Exited);
    }

    #[test]
    fn at_x_02_add_task_commits_context_and_notifies() {
        let (h, speech, summary) = session(&["add urgent task buy groceries", "Errands", "exit"]);
        assert!(speech.contains("What type of task is this? Say skip for the default."));
        assert!(speech.contains("Task added successfully!"));
        assert_eq!(summary.dispatched, 1);
        let task = h.controller.context().last_task().unwrap();
        assert_eq!(task.name, "buy groceries");
        assert_eq!(task.task_type, "Errands");
        assert_eq!(task.priority, Priority::High);
        assert!(h.controller.context().last_location().is_none());
        let notes = h.notifications.0.lock().unwrap();
        assert_eq!(notes.len(), 1);
        assert!(matches!(&notes[0], Notification::TasksUpdated(list) if list.len() == 1));
    }

    #[test]
    fn at_x_03_skipped_task_type_uses_default() {
        let (h, _, _) = session(&["add task water plants", "skip", "exit"]);
        assert_eq!(
            h.controller.context().last_task().unwrap().task_type,
            DEFAULT_TASK_TYPE
        );
    }

    #[test]
    fn at_x_04_missing_event_name_is_prompted_then_refused() {
        let (h, speech, summary) = session(&["schedule meeting tomorrow at 3pm", "", "exit"]);
        assert!(speech.contains("What should I call the event?"));
        assert!(speech.contains("I can't add an event without a name."));
        assert_eq!(summary.aborted, 1);
        assert_eq!(summary.dispatched, 0);
        assert!(h.controller.context().last_event().is_none());
    }

    #[test]
    fn at_x_05_event_follow_up_fills_name_and_resolves_time() {
        let (h, speech, _) = session(&["schedule meeting tomorrow at 3pm", "design review", "exit"]);
        assert!(speech.contains("Event added to your calendar."));
        let event = h.controller.context().last_event().unwrap();
        assert_eq!(event.name, "design review");
        assert_eq!(event.when, "tomorrow at 3pm");
        assert_eq!(
            event.resolved_at,
            chrono::NaiveDate::from_ymd_opt(2026, 3, 5)
                .unwrap()
                .and_hms_opt(15, 0, 0)
        );
    }

    #[test]
    fn at_x_06_weather_without_location_or_context_is_not_dispatched() {
        let (h, speech, _) = session(&["what's the weather", "", "exit"]);
        assert!(speech.contains("Which city do you want the weather for?"));
        assert!(speech.contains("I can't check the weather without a location."));
        assert_eq!(*h.weather_calls.lock().unwrap(), 0);
    }

    #[test]
    fn at_x_07_weather_reuses_last_location_not_last_task() {
        let (h, speech, _) = session(&[
            "what is the weather in Paris",
            "add task call london office",
            "skip",
            "what's the weather",
            "exit",
        ]);
        let reports: Vec<&String> = speech
            .lines()
            .iter()
            .filter(|l| l.starts_with("paris:") || l.starts_with("Paris:"))
            .collect();
        assert_eq!(reports.len(), 2);
        assert_eq!(h.controller.context().last_location(), Some("Paris"));
        assert_eq!(*h.weather_calls.lock().unwrap(), 2);
    }

    #[test]
    fn at_x_08_transient_weather_failure_is_retried() {
        let (h, speech, _) = session_with(
            &["weather in London", "exit"],
            vec![ServiceErrorKind::Timeout, ServiceErrorKind::Network],
            DialogueConfig::mvp_v1(),
        );
        assert!(speech.contains("London: rain, 12°C."));
        assert_eq!(*h.weather_calls.lock().unwrap(), 3);
        assert_eq!(
            h.controller.retry().sleeper().total(),
            Duration::from_millis(500 + 1_000)
        );
    }

    #[test]
    fn at_x_09_exhausted_handler_failure_is_spoken_and_session_continues() {
        let (h, speech, summary) = session_with(
            &["weather in London", "exit"],
            vec![ServiceErrorKind::Unavailable; 3],
            DialogueConfig::mvp_v1(),
        );
        assert!(speech.contains("Failed to get the weather."));
        assert_eq!(summary.end, SessionEnd::ExitCommand);
        assert!(h.controller.context().last_location().is_none());
    }

    #[test]
    fn at_x_10_unknown_command_gets_fallback() {
        let (_, speech, summary) = session(&["purple elephants dance", "exit"]);
        assert!(speech
            .contains("Sorry, I can't help with that yet. You said: purple elephants dance"));
        assert_eq!(summary.aborted, 1);
    }

    #[test]
    fn at_x_11_silence_apologises_and_limit_ends_session() {
        let mut config = DialogueConfig::mvp_v1();
        config.max_consecutive_silences = Some(2);
        let (_, speech, summary) = session_with(&["", "", "exit"], vec![], config);
        assert_eq!(summary.end, SessionEnd::SilenceLimit);
        assert_eq!(
            speech
                .lines()
                .iter()
                .filter(|l| l.as_str() == REPEAT_APOLOGY)
                .count(),
            2
        );
    }

    #[test]
    fn at_x_12_input_closed_ends_session() {
        let (_, speech, summary) = session(&["read my tasks"]);
        assert!(speech.contains("There are no tasks."));
        assert_eq!(summary.end, SessionEnd::InputClosed);
        assert_eq!(speech.last(), Some(FAREWELL));
    }

    #[test]
    fn at_x_13_list_tasks_speaks_each_task() {
        let (_, speech, _) = session(&[
            "add task pay rent",
            "Finance",
            "list my tasks",
            "exit",
        ]);
        let start = speech
            .lines()
            .iter()
            .position(|l| l == "Here are your tasks:")
            .unwrap();
        assert_eq!(
            speech.lines()[start + 1],
            "Task: pay rent, Type: Finance, Status: To Do, Priority: normal, Due: none."
        );
    }

    #[test]
    fn at_x_14_invalid_config_is_rejected() {
        let mut config = DialogueConfig::mvp_v1();
        config.max_consecutive_silences = Some(0);
        let services = DialogueServices {
            tasks: Box::new(InMemoryTaskBoard::new()),
            events: Box::new(InMemoryEventCalendar::new()),
            weather: Box::new(OfflineWeather::mvp_v1()),
            notifications: Box::new(crate::ph1e::NoNotifications),
        };
        assert!(DialogueController::new(
            config,
            Interpreter::mvp_v1(),
            services,
            RecordingSleeper::default()
        )
        .is_err());
    }

    #[test]
    fn at_x_15_task_time_phrase_becomes_due_date() {
        let (h, speech, _) = session(&[
            "add task pay rent tomorrow at 5pm",
            "skip",
            "read my tasks",
            "exit",
        ]);
        let task = h.controller.context().last_task().unwrap();
        assert_eq!(task.name, "pay rent");
        assert_eq!(task.status, TaskStatus::ToDo);
        assert_eq!(task.due.as_deref(), Some("tomorrow at 5pm"));
        assert_eq!(
            task.due_at,
            chrono::NaiveDate::from_ymd_opt(2026, 3, 5)
                .unwrap()
                .and_hms_opt(17, 0, 0)
        );
        assert!(speech.contains(
            "Task: pay rent, Type: General, Status: To Do, Priority: normal, \
             Due: tomorrow at 5pm (2026-03-05 17:00)."
        ));
    }

    #[test]
    fn at_x_16_task_with_long_url_is_added() {
        let url = format!("https://example.com/{}", "a".repeat(120));
        let command = format!("add task read {url}");
        let (h, speech, summary) = session(&[command.as_str(), "skip", "exit"]);
        assert!(speech.contains("Task added successfully!"));
        assert_eq!(summary.dispatched, 1);
        assert_eq!(summary.aborted, 0);
        assert!(h.controller.context().last_task().unwrap().name.ends_with(&url));
    }

    #[test]
    fn at_x_17_exit_word_inside_a_sentence_does_not_end_session() {
        let (h, speech, summary) = session(&[
            "stop by the bank tomorrow",
            "add task buy milk",
            "skip",
            "exit",
        ]);
        assert!(speech.contains(
            "Sorry, I can't help with that yet. You said: stop by the bank tomorrow"
        ));
        assert_eq!(summary.aborted, 1);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(summary.end, SessionEnd::ExitCommand);
        assert_eq!(h.controller.context().last_task().unwrap().name, "buy milk");
    }

    #[test]
    fn at_x_18_command_after_long_preamble_is_dispatched() {
        let filler: Vec<String> = (0..70).map(|i| format!("word{i}")).collect();
        let command = format!("{} add task buy milk", filler.join(" "));
        let (h, _, summary) = session(&[command.as_str(), "skip", "exit"]);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(h.controller.context().last_task().unwrap().name, "buy milk");
    }
}
