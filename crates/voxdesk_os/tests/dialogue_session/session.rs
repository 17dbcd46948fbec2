#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};
use voxdesk_engines::ph1e::{InMemoryEventCalendar, InMemoryTaskBoard, OfflineWeather};
use voxdesk_engines::ph1n::PatternTable;
use voxdesk_kernel_contracts::ph1c::CaptureOutcome;
use voxdesk_kernel_contracts::ph1e::{
    EventRecord, ServiceError, ServiceErrorKind, TaskRecord, WeatherReport,
};
use voxdesk_kernel_contracts::ph1n::Priority;
use voxdesk_kernel_contracts::ph1sched::RetrySchedule;
use voxdesk_kernel_contracts::ph1x::Notification;
use voxdesk_os::ph1c::ScriptedSource;
use voxdesk_os::ph1e::{EventService, NotificationSink, TaskService, WeatherService};
use voxdesk_os::ph1n::Interpreter;
use voxdesk_os::ph1sched::RecordingSleeper;
use voxdesk_os::ph1tts::SpeechTranscript;
use voxdesk_os::ph1x::{
    DialogueConfig, DialogueController, DialogueServices, SessionEnd, FAREWELL, GREETING,
    NETWORK_APOLOGY,
};

fn friday_morning() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 5, 15)
        .unwrap()
        .and_hms_opt(8, 30, 0)
        .unwrap()
}

#[derive(Clone, Default)]
struct Display(Arc<Mutex<Vec<Notification>>>);

impl NotificationSink for Display {
    fn notify(&mut self, notification: Notification) {
        self.0.lock().unwrap().push(notification);
    }
}

impl Display {
    fn snapshot(&self) -> Vec<Notification> {
        self.0.lock().unwrap().clone()
    }
}

/// Task board whose first `fail_adds` add calls time out.
struct SlowTaskBoard {
    fail_adds: u32,
    inner: InMemoryTaskBoard,
}

impl TaskService for SlowTaskBoard {
    fn add(&mut self, task: &TaskRecord) -> Result<String, ServiceError> {
        if self.fail_adds > 0 {
            self.fail_adds -= 1;
            return Err(ServiceError::new(ServiceErrorKind::Timeout, "board busy"));
        }
        self.inner.add(task.clone())
    }

    fn list(&mut self) -> Result<Vec<TaskRecord>, ServiceError> {
        Ok(self.inner.list())
    }
}

/// Calendar that refuses every write.
struct ReadOnlyCalendar;

impl EventService for ReadOnlyCalendar {
    fn add(&mut self, _event: &EventRecord) -> Result<String, ServiceError> {
        Err(ServiceError::rejected("calendar is read-only"))
    }

    fn list(&mut self) -> Result<Vec<EventRecord>, ServiceError> {
        Ok(Vec::new())
    }
}

struct CountingWeather {
    calls: Arc<Mutex<Vec<String>>>,
    inner: OfflineWeather,
}

impl WeatherService for CountingWeather {
    fn lookup(&mut self, location: &str) -> Result<WeatherReport, ServiceError> {
        self.calls.lock().unwrap().push(location.to_string());
        self.inner.lookup(location)
    }
}

struct Session {
    controller: DialogueController<RecordingSleeper>,
    display: Display,
    weather_calls: Arc<Mutex<Vec<String>>>,
}

fn session(
    tasks: Box<dyn TaskService + Send>,
    events: Box<dyn EventService + Send>,
    config: DialogueConfig,
    interpreter: Interpreter,
) -> Session {
    let display = Display::default();
    let weather_calls = Arc::new(Mutex::new(Vec::new()));
    let services = DialogueServices {
        tasks,
        events,
        weather: Box::new(CountingWeather {
            calls: weather_calls.clone(),
            inner: OfflineWeather::mvp_v1()
                .with_report("berlin", "overcast, 9°C")
                .with_report("tokyo", "clear, 24°C"),
        }),
        notifications: Box::new(display.clone()),
    };
    let controller =
        DialogueController::new(config, interpreter, services, RecordingSleeper::default())
            .unwrap()
            .with_clock(friday_morning);
    Session {
        controller,
        display,
        weather_calls,
    }
}

fn default_session() -> Session {
    session(
        Box::new(InMemoryTaskBoard::new()),
        Box::new(InMemoryEventCalendar::new()),
        DialogueConfig::mvp_v1(),
        Interpreter::mvp_v1(),
    )
}

#[test]
fn at_session_01_mixed_session_keeps_context_and_display_in_step() {
    let mut s = default_session();
    let mut source = ScriptedSource::from_lines([
        "add important task renew passport",
        "Errands",
        "schedule a dentist appointment on monday at 9am",
        "what is the weather in Berlin",
        "what's on my calendar",
        "goodbye",
    ]);
    let mut speech = SpeechTranscript::new();
    let summary = s.controller.run(&mut source, &mut speech);

    assert_eq!(summary.end, SessionEnd::ExitCommand);
    assert_eq!(summary.dispatched, 4);
    assert_eq!(summary.aborted, 0);
    assert_eq!(speech.lines().first().map(String::as_str), Some(GREETING));
    assert_eq!(speech.last(), Some(FAREWELL));
    assert!(speech.contains("Berlin: overcast, 9°C."));

    let ctx = s.controller.context();
    let task = ctx.last_task().unwrap();
    assert_eq!(task.name, "renew passport");
    assert_eq!(task.priority, Priority::High);
    let event = ctx.last_event().unwrap();
    assert_eq!(
        event.resolved_at,
        NaiveDate::from_ymd_opt(2026, 5, 18)
            .unwrap()
            .and_hms_opt(9, 0, 0)
    );
    assert_eq!(ctx.last_location(), Some("Berlin"));

    let kinds: Vec<&'static str> = s
        .display
        .snapshot()
        .iter()
        .map(|n| match n {
            Notification::TasksUpdated(_) => "tasks",
            Notification::EventsUpdated(_) => "events",
            Notification::WeatherUpdated(_) => "weather",
        })
        .collect();
    assert_eq!(kinds, vec!["tasks", "events", "weather", "events"]);
}

#[test]
fn at_session_02_nameless_event_follow_up_aborts_only_that_turn() {
    let mut s = default_session();
    let mut source = ScriptedSource::new([
        CaptureOutcome::Heard("schedule meeting tomorrow at 3pm".to_string()),
        CaptureOutcome::Timeout,
        CaptureOutcome::Heard("list my events".to_string()),
        CaptureOutcome::Heard("exit".to_string()),
    ]);
    let mut speech = SpeechTranscript::new();
    let summary = s.controller.run(&mut source, &mut speech);

    assert_eq!(summary.aborted, 1);
    assert_eq!(summary.dispatched, 1);
    assert!(speech.contains("I can't add an event without a name."));
    assert!(speech.contains("There are no events on your calendar."));
    assert!(s.controller.context().last_event().is_none());
}

#[test]
fn at_session_03_weather_without_location_prompts_and_never_dispatches() {
    let mut s = default_session();
    let mut source = ScriptedSource::new([
        CaptureOutcome::Heard("how is the weather".to_string()),
        CaptureOutcome::Unintelligible,
        CaptureOutcome::Heard("exit".to_string()),
    ]);
    let mut speech = SpeechTranscript::new();
    s.controller.run(&mut source, &mut speech);

    assert!(speech.contains("Which city do you want the weather for?"));
    assert!(s.weather_calls.lock().unwrap().is_empty());
    assert!(s.controller.context().last_location().is_none());
}

#[test]
fn at_session_04_location_answer_is_remembered_for_next_request() {
    let mut s = default_session();
    let mut source = ScriptedSource::from_lines([
        "weather forecast",
        "Tokyo",
        "add task pack umbrella",
        "skip",
        "weather please",
        "exit",
    ]);
    let mut speech = SpeechTranscript::new();
    s.controller.run(&mut source, &mut speech);

    assert_eq!(
        *s.weather_calls.lock().unwrap(),
        vec!["Tokyo".to_string(), "Tokyo".to_string()]
    );
    assert_eq!(
        s.controller.context().last_task().unwrap().name,
        "pack umbrella"
    );
}

#[test]
fn at_session_05_timeouts_are_retried_with_backoff() {
    let mut s = session(
        Box::new(SlowTaskBoard {
            fail_adds: 2,
            inner: InMemoryTaskBoard::new(),
        }),
        Box::new(InMemoryEventCalendar::new()),
        DialogueConfig::mvp_v1(),
        Interpreter::mvp_v1(),
    );
    let mut source = ScriptedSource::from_lines(["add task sort mail", "skip", "exit"]);
    let mut speech = SpeechTranscript::new();
    let summary = s.controller.run(&mut source, &mut speech);

    assert_eq!(summary.dispatched, 1);
    assert!(speech.contains("Task added successfully!"));
    assert_eq!(s.controller.retry().sleeper().waits.len(), 2);
}

#[test]
fn at_session_06_rejected_write_fails_once_without_retry() {
    let mut s = session(
        Box::new(InMemoryTaskBoard::new()),
        Box::new(ReadOnlyCalendar),
        DialogueConfig::mvp_v1(),
        Interpreter::mvp_v1(),
    );
    let mut source =
        ScriptedSource::from_lines(["schedule standup tomorrow at 10am", "exit"]);
    let mut speech = SpeechTranscript::new();
    let summary = s.controller.run(&mut source, &mut speech);

    assert_eq!(summary.aborted, 1);
    assert!(speech.contains("Failed to add event."));
    assert!(s.controller.retry().sleeper().waits.is_empty());
    assert!(s.display.snapshot().is_empty());
}

#[test]
fn at_session_07_transport_error_gets_network_apology() {
    let mut s = default_session();
    let mut source = ScriptedSource::new([
        CaptureOutcome::TransportError("recognizer unreachable".to_string()),
        CaptureOutcome::Heard("exit".to_string()),
    ]);
    let mut speech = SpeechTranscript::new();
    s.controller.run(&mut source, &mut speech);
    assert!(speech.contains(NETWORK_APOLOGY));
}

#[test]
fn at_session_08_custom_patterns_and_no_type_prompt() {
    let table = PatternTable::from_json_str(
        r#"[
            {"intent": "add_task", "patterns": [[{"LOWER": "put"}, {"OP": "+"}]]},
            {"intent": "exit", "patterns": [[{"LOWER": "done"}]]}
        ]"#,
    )
    .unwrap();
    let mut config = DialogueConfig::mvp_v1();
    config.prompt_task_type = false;
    config.retry = RetrySchedule::single_attempt();
    let mut s = session(
        Box::new(InMemoryTaskBoard::new()),
        Box::new(InMemoryEventCalendar::new()),
        config,
        Interpreter::with_patterns(table),
    );
    let mut source = ScriptedSource::from_lines(["put task water the garden", "done"]);
    let mut speech = SpeechTranscript::new();
    let summary = s.controller.run(&mut source, &mut speech);

    assert_eq!(summary.end, SessionEnd::ExitCommand);
    assert_eq!(summary.dispatched, 1);
    let task = s.controller.context().last_task().unwrap();
    assert_eq!(task.name, "water the garden");
    assert_eq!(task.task_type, "General");
}
