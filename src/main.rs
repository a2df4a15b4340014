use anyhow::{Context, Result, bail};
use clap::Parser;
use owo_colors::OwoColorize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use synchronia::cli::{Cli, Commands, ConfigAction};
use synchronia::config::Config;
use synchronia::output::TerminalObserver;
use synchronia::session::{DefaultBackends, Session};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    #[cfg(feature = "cpal-audio")]
    synchronia::audio::capture::suppress_audio_warnings();

    let cli = Cli::parse();
    init_logging(cli.verbose);
    tracing::debug!(version = %synchronia::version_string(), "synchronia starting");

    match cli.command {
        Commands::Devices => list_audio_devices()?,
        Commands::Listen {
            device,
            batch_secs,
            goal,
            save_audio,
            save_transcript,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if device.is_some() {
                config.audio.device = device;
            }
            if let Some(secs) = batch_secs {
                config.audio.batch_secs = secs;
            }
            if goal.is_some() {
                config.advisor.goal = goal;
            }
            config.validate()?;

            let color = !cli.no_color && std::io::stdout().is_terminal();
            let options = ListenOptions {
                quiet: cli.quiet,
                color,
                show_emotions: cli.verbose > 0,
                save_audio,
                save_transcript,
            };
            run_listen(config, options).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = load_config(cli.config.as_deref())?;
                print!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigAction::Path => {
                let path = cli.config.unwrap_or_else(Config::default_path);
                println!("{}", path.display());
            }
        },
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `-v` raises the default level.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file with environment overrides.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        Config::load_or_default(&Config::default_path())?
    };
    Ok(config.with_env_overrides())
}

/// List available audio input devices.
#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = synchronia::audio::capture::list_devices()?;

    if devices.is_empty() {
        bail!("No audio input devices found");
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_audio_devices() -> Result<()> {
    bail!("Audio capture not available. Rebuild with --features cpal-audio")
}

struct ListenOptions {
    quiet: bool,
    color: bool,
    show_emotions: bool,
    save_audio: Option<PathBuf>,
    save_transcript: Option<PathBuf>,
}

/// Run one session until Ctrl-C or end of stdin.
///
/// While listening, stdin accepts `goal <text>`, `clear` and `advice`.
async fn run_listen(config: Config, options: ListenOptions) -> Result<()> {
    let device = config.audio.device.clone();
    let batch_secs = config.audio.batch_secs;
    let backends = DefaultBackends::new(config.clone())?;
    let session = Session::new(Box::new(backends), config);

    let observer: Box<dyn synchronia::pipeline::PipelineObserver> = if options.quiet {
        Box::new(TerminalObserver::new(std::io::sink(), false, false))
    } else {
        Box::new(TerminalObserver::stdout(options.color, options.show_emotions))
    };
    // Model loading and device start block; keep them off the runtime.
    let (mut session, started) = blocking(session, move |session| {
        session.start_processing(device.as_deref(), batch_secs, observer)
    })
    .await?;
    started?;

    if !options.quiet {
        let hint = "Listening. Commands: goal <text> | clear | advice. Ctrl-C to stop.";
        if options.color {
            eprintln!("{}", hint.dimmed());
        } else {
            eprintln!("{hint}");
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    session = blocking(session, move |session| handle_input(session, &line))
                        .await?
                        .0;
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    stdin_open = false;
                }
            },
        }
    }

    let (session, stopped) = blocking(session, |session| session.stop_processing().is_some()).await?;
    if !stopped {
        bail!("Session was not running");
    }
    let summary = session
        .last_summary()
        .context("Session summary missing")?;
    if !summary.clean_shutdown {
        tracing::warn!("some workers did not stop in time");
    }
    if let Some(stats) = &summary.stats {
        tracing::info!(
            words = stats.word_count,
            turns = stats.turns,
            dominant = %stats.dominant_emotion,
            "session finished"
        );
    }

    if let Some(path) = &options.save_audio {
        session
            .save_audio(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("Audio saved to {}", path.display());
    }
    if let Some(path) = &options.save_transcript {
        session
            .save_transcript(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("Transcript saved to {}", path.display());
    }

    Ok(())
}

/// Run a blocking session operation on the blocking pool and hand the
/// session back with the result.
async fn blocking<R, F>(mut session: Session, op: F) -> Result<(Session, R)>
where
    R: Send + 'static,
    F: FnOnce(&mut Session) -> R + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(move || {
        let result = op(&mut session);
        (session, result)
    });
    handle.await.context("Session task failed")
}

fn handle_input(session: &mut Session, line: &str) {
    let line = line.trim();
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "" => {}
        "goal" => {
            session.set_goal(rest);
            match session.goal() {
                Some(goal) => eprintln!("Goal set: {goal}"),
                None => eprintln!("Goal cleared"),
            }
        }
        "clear" => {
            session.clear_goal();
            eprintln!("Goal cleared");
        }
        "advice" => {
            if !session.request_advice() {
                eprintln!("Advice not available yet (needs a goal, speech, and no request in flight)");
            }
        }
        other => eprintln!("Unknown command: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use synchronia::advisor::{AdvisoryService, MockAdvisor};
    use synchronia::audio::AudioSource;
    use synchronia::emotion::{EmotionModel, MockEmotionModel};
    use synchronia::error::SynchroniaError;
    use synchronia::session::Backends;
    use synchronia::stt::{MockRecognizer, SpeechRecognizer};

    /// Mock models but no input device, so processing never starts.
    struct NoDevice;

    impl Backends for NoDevice {
        fn open_audio(
            &self,
            _device_id: Option<&str>,
        ) -> synchronia::error::Result<Box<dyn AudioSource>> {
            Err(SynchroniaError::DeviceUnavailable {
                device: "none".to_string(),
            })
        }

        fn emotion_model(&self) -> synchronia::error::Result<Box<dyn EmotionModel>> {
            Ok(Box::new(MockEmotionModel::new()))
        }

        fn recognizer(&self) -> synchronia::error::Result<Box<dyn SpeechRecognizer>> {
            Ok(Box::new(MockRecognizer::new("mock")))
        }

        fn advisor(&self) -> Arc<dyn AdvisoryService> {
            Arc::new(MockAdvisor::new("unused"))
        }
    }

    fn idle_session() -> Session {
        Session::new(Box::new(NoDevice), Config::default())
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_blocking_runs_off_the_runtime_thread() {
        let runtime_thread = std::thread::current().id();
        let (_session, op_thread) = blocking(idle_session(), |_| std::thread::current().id())
            .await
            .unwrap();
        assert_ne!(op_thread, runtime_thread);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_blocking_hands_back_the_mutated_session() {
        let (session, ()) = blocking(idle_session(), |session| {
            handle_input(session, "goal  agree on a date ")
        })
        .await
        .unwrap();
        assert_eq!(session.goal(), Some("agree on a date"));

        let (session, ()) = blocking(session, |session| handle_input(session, "clear"))
            .await
            .unwrap();
        assert_eq!(session.goal(), None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_blocking_reports_start_failure() {
        let observer = Box::new(TerminalObserver::new(std::io::sink(), false, false));
        let (session, started) = blocking(idle_session(), move |session| {
            session.start_processing(None, 3, observer)
        })
        .await
        .unwrap();
        assert!(matches!(
            started,
            Err(SynchroniaError::DeviceUnavailable { .. })
        ));
        assert!(!session.is_running());
    }
}
