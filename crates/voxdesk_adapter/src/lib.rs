#![forbid(unsafe_code)]

use std::io::{self, BufRead, Write};
use std::process::Command;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use voxdesk_engines::ph1e::{
    InMemoryEventCalendar, InMemoryTaskBoard, OfflineWeather, OpenMeteoConfig, OpenMeteoWeather,
};
use voxdesk_engines::ph1n::PatternTable;
use voxdesk_kernel_contracts::ph1c::CaptureOutcome;
use voxdesk_kernel_contracts::ph1e::ServiceErrorKind;
use voxdesk_kernel_contracts::ph1sched::RetrySchedule;
use voxdesk_kernel_contracts::ph1x::Notification;
use voxdesk_os::ph1c::UtteranceSource;
use voxdesk_os::ph1e::{NotificationSink, WeatherService};
use voxdesk_os::ph1n::Interpreter;
use voxdesk_os::ph1tts::SpeechSink;
use voxdesk_os::ph1x::{DialogueConfig, DialogueServices};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum WeatherBackend {
    Offline,
    OpenMeteo,
}

/// Everything the runtime needs, already parsed from flags and environment.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterConfig {
    pub patterns_path: Option<String>,
    pub weather: WeatherBackend,
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff: f64,
    pub prompt_task_type: bool,
    pub max_silences: Option<u32>,
    pub speak: bool,
    pub display_json: bool,
}

impl AdapterConfig {
    pub fn mvp_v1() -> Self {
        Self {
            patterns_path: None,
            weather: WeatherBackend::Offline,
            max_attempts: 3,
            initial_delay_ms: 500,
            backoff: 2.0,
            prompt_task_type: true,
            max_silences: None,
            speak: false,
            display_json: false,
        }
    }

    pub fn dialogue_config(&self) -> anyhow::Result<DialogueConfig> {
        let retry = RetrySchedule::v1(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            self.backoff,
            ServiceErrorKind::TRANSIENT.to_vec(),
        )
        .context("invalid retry settings")?;
        Ok(DialogueConfig {
            prompt_task_type: self.prompt_task_type,
            max_consecutive_silences: self.max_silences,
            retry,
            ..DialogueConfig::mvp_v1()
        })
    }

    pub fn interpreter(&self) -> anyhow::Result<Interpreter> {
        match &self.patterns_path {
            None => Ok(Interpreter::mvp_v1()),
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading pattern table {path}"))?;
                let table = PatternTable::from_json_str(&raw)
                    .with_context(|| format!("parsing pattern table {path}"))?;
                tracing::info!(path = %path, intents = ?table.intents(), "custom pattern table loaded");
                Ok(Interpreter::with_patterns(table))
            }
        }
    }

    pub fn services(
        &self,
        notifications: Box<dyn NotificationSink + Send>,
    ) -> anyhow::Result<DialogueServices> {
        let weather: Box<dyn WeatherService + Send> = match self.weather {
            WeatherBackend::Offline => Box::new(OfflineWeather::mvp_v1()),
            WeatherBackend::OpenMeteo => {
                let provider = OpenMeteoWeather::new(OpenMeteoConfig::mvp_v1())
                    .context("building open-meteo client")?;
                Box::new(provider)
            }
        };
        Ok(DialogueServices {
            tasks: Box::new(InMemoryTaskBoard::new()),
            events: Box::new(InMemoryEventCalendar::new()),
            weather,
            notifications,
        })
    }
}

/// Line-per-utterance stdin source. EOF closes it.
pub struct ConsoleSource<R> {
    input: R,
    prompt: bool,
    closed: bool,
}

impl ConsoleSource<io::StdinLock<'static>> {
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock(), true)
    }
}

impl<R: BufRead> ConsoleSource<R> {
    pub fn new(input: R, prompt: bool) -> Self {
        Self {
            input,
            prompt,
            closed: false,
        }
    }
}

impl<R: BufRead> UtteranceSource for ConsoleSource<R> {
    fn capture(&mut self) -> CaptureOutcome {
        if self.closed {
            return CaptureOutcome::Timeout;
        }
        if self.prompt {
            print!("> ");
            let _ = io::stdout().flush();
        }
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => {
                self.closed = true;
                CaptureOutcome::Timeout
            }
            Ok(_) if line.trim().is_empty() => CaptureOutcome::Unintelligible,
            Ok(_) => CaptureOutcome::Heard(line.trim().to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                self.closed = true;
                CaptureOutcome::TransportError(e.to_string())
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSpeech;

impl SpeechSink for ConsoleSpeech {
    fn say(&mut self, text: &str) {
        println!("[voxdesk] {text}");
    }
}

/// Speaks through the macOS `say` command. A missing binary is logged once and then ignored.
#[derive(Debug, Default)]
pub struct SaySpeech {
    broken: bool,
}

impl SpeechSink for SaySpeech {
    fn say(&mut self, text: &str) {
        if self.broken {
            return;
        }
        match Command::new("say").arg(text).status() {
            Ok(status) if status.success() => {}
            Ok(status) => tracing::warn!(%status, "say exited with failure"),
            Err(e) => {
                tracing::warn!(error = %e, "say unavailable, speech output disabled");
                self.broken = true;
            }
        }
    }
}

/// Forwards notifications to the display task. A dropped receiver is not an error for the dialogue.
pub struct ChannelNotifier {
    tx: UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new(tx: UnboundedSender<Notification>) -> Self {
        Self { tx }
    }
}

impl NotificationSink for ChannelNotifier {
    fn notify(&mut self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("display receiver gone, notification dropped");
        }
    }
}

/// Display lines for one notification.
pub fn render_notification(notification: &Notification, json: bool) -> Vec<String> {
    if json {
        return match serde_json::to_string(notification) {
            Ok(line) => vec![line],
            Err(e) => {
                tracing::warn!(error = %e, "notification encode failed");
                Vec::new()
            }
        };
    }
    match notification {
        Notification::TasksUpdated(tasks) => {
            let mut out = vec![format!("== tasks ({}) ==", tasks.len())];
            out.extend(tasks.iter().map(|t| {
                let line = format!(
                    "  [{}] {} ({}, {})",
                    t.priority, t.name, t.task_type, t.status
                );
                match (t.due_at, &t.due) {
                    (Some(at), _) => format!("{line} due {}", at.format("%a %Y-%m-%d %H:%M")),
                    (None, Some(due)) => format!("{line} due {due}"),
                    (None, None) => line,
                }
            }));
            out
        }
        Notification::EventsUpdated(events) => {
            let mut out = vec![format!("== events ({}) ==", events.len())];
            out.extend(events.iter().map(|e| match e.resolved_at {
                Some(at) => format!("  {} {} ({})", at.format("%a %Y-%m-%d %H:%M"), e.name, e.when),
                None => format!("  {} ({})", e.name, e.when),
            }));
            out
        }
        Notification::WeatherUpdated(text) => vec![format!("== weather == {text}")],
    }
}

/// Drains notifications until every sender is dropped.
pub async fn run_display(mut rx: UnboundedReceiver<Notification>, json: bool) -> usize {
    let mut shown = 0;
    while let Some(n) = rx.recv().await {
        for line in render_notification(&n, json) {
            println!("{line}");
        }
        shown += 1;
    }
    shown
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use voxdesk_kernel_contracts::ph1e::TaskRecord;
    use voxdesk_kernel_contracts::ph1n::Priority;

    #[test]
    fn at_adapter_01_console_source_closes_on_eof() {
        let mut src = ConsoleSource::new(io::Cursor::new("add task x\n\n"), false);
        assert_eq!(src.capture(), CaptureOutcome::Heard("add task x".to_string()));
        assert_eq!(src.capture(), CaptureOutcome::Unintelligible);
        assert!(!src.is_closed());
        assert_eq!(src.capture(), CaptureOutcome::Timeout);
        assert!(src.is_closed());
    }

    #[test]
    fn at_adapter_02_config_builds_retry_schedule() {
        let mut cfg = AdapterConfig::mvp_v1();
        cfg.max_attempts = 5;
        cfg.initial_delay_ms = 50;
        let d = cfg.dialogue_config().unwrap();
        assert_eq!(d.retry.max_attempts, 5);
        assert_eq!(d.retry.initial_delay, Duration::from_millis(50));

        cfg.max_attempts = 0;
        assert!(cfg.dialogue_config().is_err());
    }

    #[test]
    fn at_adapter_03_render_tasks_for_display() {
        let t = TaskRecord::v1("pay rent", "Finance", Priority::High).unwrap();
        let due = TaskRecord::v1("file taxes", "Finance", Priority::Normal)
            .unwrap()
            .with_due("next month", None)
            .unwrap();
        let lines = render_notification(&Notification::TasksUpdated(vec![t, due]), false);
        assert_eq!(
            lines,
            vec![
                "== tasks (2) ==".to_string(),
                "  [high] pay rent (Finance, To Do)".to_string(),
                "  [normal] file taxes (Finance, To Do) due next month".to_string(),
            ]
        );
        let json = render_notification(&Notification::WeatherUpdated("Sunny".into()), true);
        assert_eq!(json, vec![r#"{"kind":"weather_updated","payload":"Sunny"}"#.to_string()]);
    }

    #[tokio::test]
    async fn at_adapter_04_channel_notifier_feeds_display() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let mut notifier = ChannelNotifier::new(tx);
        notifier.notify(Notification::WeatherUpdated("a".into()));
        notifier.notify(Notification::TasksUpdated(vec![]));
        drop(notifier);
        assert_eq!(run_display(rx, true).await, 2);
    }
}
