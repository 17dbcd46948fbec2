#![forbid(unsafe_code)]

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use voxdesk_adapter::{
    run_display, AdapterConfig, ChannelNotifier, ConsoleSource, ConsoleSpeech, SaySpeech,
    WeatherBackend,
};
use voxdesk_os::ph1sched::ThreadSleeper;
use voxdesk_os::ph1tts::{SpeechSink, TeeSpeech};
use voxdesk_os::ph1x::DialogueController;

/// Console voice-command assistant: one line per utterance, replies on stdout.
#[derive(Parser, Debug)]
#[command(name = "voxdesk")]
struct Args {
    /// JSON intent pattern table replacing the built-in one
    #[arg(long, env = "VOXDESK_PATTERNS")]
    patterns: Option<String>,

    #[arg(long, env = "VOXDESK_WEATHER", value_enum, default_value = "offline")]
    weather: WeatherBackend,

    #[arg(long, env = "VOXDESK_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    #[arg(long, env = "VOXDESK_INITIAL_DELAY_MS", default_value_t = 500)]
    initial_delay_ms: u64,

    #[arg(long, env = "VOXDESK_BACKOFF", default_value_t = 2.0)]
    backoff: f64,

    /// Do not ask for a task type; use the default one
    #[arg(long, env = "VOXDESK_NO_TYPE_PROMPT", default_value = "false")]
    no_type_prompt: bool,

    /// End the session after this many silent turns in a row
    #[arg(long, env = "VOXDESK_MAX_SILENCES")]
    max_silences: Option<u32>,

    /// Also speak replies through the system `say` command
    #[arg(long, env = "VOXDESK_SPEAK", default_value = "false")]
    speak: bool,

    /// Print display updates as JSON lines
    #[arg(long, env = "VOXDESK_DISPLAY_JSON", default_value = "false")]
    display_json: bool,
}

impl Args {
    fn into_config(self) -> AdapterConfig {
        AdapterConfig {
            patterns_path: self.patterns,
            weather: self.weather,
            max_attempts: self.max_attempts,
            initial_delay_ms: self.initial_delay_ms,
            backoff: self.backoff,
            prompt_task_type: !self.no_type_prompt,
            max_silences: self.max_silences,
            speak: self.speak,
            display_json: self.display_json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voxdesk=info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = Args::parse().into_config();
    tracing::info!(?config, "starting voxdesk");

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let display = tokio::spawn(run_display(rx, config.display_json));

    let services = config.services(Box::new(ChannelNotifier::new(tx)))?;
    let mut controller = DialogueController::new(
        config.dialogue_config()?,
        config.interpreter()?,
        services,
        ThreadSleeper,
    )
    .context("invalid dialogue configuration")?;
    let speak = config.speak;

    // The notifier sender lives in the controller; the display task ends when it is dropped.
    let summary = tokio::task::spawn_blocking(move || {
        let mut source = ConsoleSource::stdin();
        let mut console = ConsoleSpeech;
        let mut voice = SaySpeech::default();
        let summary = if speak {
            let mut tee = TeeSpeech::new(vec![&mut console as &mut dyn SpeechSink, &mut voice]);
            controller.run(&mut source, &mut tee)
        } else {
            controller.run(&mut source, &mut console)
        };
        drop(controller);
        summary
    })
    .await
    .context("dialogue worker panicked")?;

    let shown = display.await.context("display task panicked")?;
    tracing::info!(
        turns = summary.turns,
        dispatched = summary.dispatched,
        aborted = summary.aborted,
        end = ?summary.end,
        notifications = shown,
        "voxdesk finished"
    );
    Ok(())
}
