//! sipbot daemon - answers SIP calls with a speech-to-speech assistant
//!
//! Spawns baresip, watches its output for call events and, while a call is
//! up, loops listen → transcribe → reply → speak, driving playback through
//! baresip's control socket.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sipbot_assist::{
    ElevenLabsSynthesizer, OpenAiResponder, OpenAiTranscriber, Responder, Synthesizer, Transcriber,
};
use sipbot_audio::{AudioConfig, AudioInput, CaptureBuffer, CAPTURE_SAMPLE_RATE};
use sipbot_daemon::config::SipbotConfig;
use sipbot_daemon::session::{CallController, Greeting, GREETING_FILE};
use sipbot_daemon::turn::{Collaborators, TurnLoop, TurnSettings};
use sipbot_daemon::version::version_long;
use sipbot_signaling::{
    spawn_blocking_monitor, write_baresip_config, BaresipOptions, CommandSink, ControlChannel,
    EventMonitor, SignalingProcess,
};

#[derive(Parser, Debug)]
#[command(name = "sipbot-daemon", version, about = "Answers SIP calls with a speech-to-speech assistant")]
struct Cli {
    /// Configuration file (default: <config dir>/sipbot/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Print available audio input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Do not spawn baresip; read its output from stdin instead
    #[arg(long)]
    no_spawn: bool,
}

/// Console plus append-only file logging. Returns the log file path.
fn init_logging(verbose: bool) -> Result<PathBuf> {
    let filter = if verbose {
        EnvFilter::new("debug,hyper=info,hyper_util=info,rustls=info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let log_path = sipbot_paths::get_logs_dir()
        .context("Failed to prepare log directory")?
        .join(sipbot_paths::LOG_FILE_NAME);
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_level(true))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .init();

    Ok(log_path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_devices {
        AudioInput::print_devices().context("Failed to list audio devices")?;
        return Ok(());
    }

    let log_path = init_logging(cli.verbose)?;

    info!("☎️ Starting sipbot daemon v{}", env!("CARGO_PKG_VERSION"));
    debug!("{}", version_long());
    info!("📝 Logging to {}", log_path.display());

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => SipbotConfig::load_from(path),
        None => SipbotConfig::load(),
    }
    .context("Failed to load configuration")?;
    info!("📋 Configuration loaded from {}", config.config_path.display());

    let overridden = config.apply_env();
    if !overridden.is_empty() {
        info!("   Environment overrides: {}", overridden.join(", "));
    }
    for warning in config.validate().context("Invalid configuration")? {
        warn!("⚠️ {}", warning);
    }

    let audio_dir = sipbot_paths::get_audio_dir().context("Failed to prepare audio directory")?;
    let control = config.control_endpoint()?;

    // Signaling process and its event stream
    let (process, mut monitor, events) = if cli.no_spawn {
        info!("🔗 Reading baresip output from stdin");
        let (monitor, events) = spawn_blocking_monitor(std::io::stdin());
        (None, monitor, events)
    } else {
        let options = BaresipOptions {
            sip_listen: config.signaling.listen.clone(),
            sample_rate: CAPTURE_SAMPLE_RATE,
            control: control.clone(),
        };
        write_baresip_config(&config.signaling.config_dir, &config.sip.account(), &options)
            .context("Failed to write baresip configuration")?;

        let (process, stdout) = SignalingProcess::spawn(
            &config.signaling.binary,
            &config.signaling.startup_args,
            &config.signaling.config_dir,
            &control,
        )
        .context("Failed to start baresip")?;
        let (monitor, events) = EventMonitor::spawn(stdout);

        info!(
            "⏳ Giving baresip {}ms to register",
            config.signaling.startup_grace_ms
        );
        tokio::time::sleep(config.startup_grace()).await;
        (Some(process), monitor, events)
    };

    // Audio capture runs for the lifetime of the daemon
    let capture = Arc::new(CaptureBuffer::new(CAPTURE_SAMPLE_RATE));
    let audio_config = AudioConfig {
        device_index: config.audio.device_index,
        ..AudioConfig::default()
    };
    let mut audio =
        AudioInput::start(audio_config, capture.clone()).context("Failed to open audio input")?;
    info!("🎙️ Capturing from {}", audio.device_name());

    // Collaborators
    let timeout = config.collaborator_timeout();
    let assist = &config.assist;
    let transcriber: Arc<dyn Transcriber> = Arc::new(
        OpenAiTranscriber::new(
            &assist.openai_key,
            &assist.openai_base_url,
            &assist.transcription_model,
            timeout,
        )
        .context("Failed to build transcription client")?,
    );
    let responder: Arc<dyn Responder> = Arc::new(
        OpenAiResponder::new(&assist.openai_key, &assist.openai_base_url, &assist.chat_model, timeout)
            .context("Failed to build chat client")?,
    );
    let synthesizer: Arc<dyn Synthesizer> = Arc::new(
        ElevenLabsSynthesizer::new(
            &assist.elevenlabs_key,
            &assist.elevenlabs_base_url,
            &assist.tts_voice,
            &assist.tts_model,
            timeout,
        )
        .context("Failed to build speech synthesis client")?,
    );
    info!(
        "  - STT: {} | Chat: {} | TTS voice: {}",
        assist.transcription_model, assist.chat_model, assist.tts_voice
    );

    let sink: Arc<dyn CommandSink> = Arc::new(ControlChannel::new(control.clone()));
    info!("🔌 Control endpoint {}", control);

    let turn_loop = TurnLoop::new(
        capture.clone(),
        sink.clone(),
        Collaborators {
            transcriber,
            responder,
            synthesizer: synthesizer.clone(),
        },
        TurnSettings {
            listen_window: config.listen_window(),
            collaborator_timeout: timeout,
            history_turns: assist.history_turns,
            audio_dir: audio_dir.clone(),
            keep_last_clip: config.audio.keep_last_clip,
        },
    );

    let greeting = match config.greeting_file() {
        Some(file) => Greeting::File(file),
        None if !config.greeting.text.trim().is_empty() => Greeting::Spoken {
            text: config.greeting.text.clone(),
            output: audio_dir.join(GREETING_FILE),
        },
        None => Greeting::None,
    };

    let mut controller = CallController::new(
        sink,
        synthesizer,
        turn_loop,
        greeting,
        config.accept_delay(),
    );

    info!("🚀 sipbot ready");
    let mut machine = tokio::spawn(async move { controller.run(events).await });

    let finished = tokio::select! {
        result = &mut machine => Some(result),
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Received shutdown signal");
            None
        }
    };

    // Cleanup
    info!("🧹 Shutting down...");
    if let Some(process) = process {
        if let Err(e) = process.shutdown().await {
            warn!("Failed to stop baresip cleanly: {}", e);
        }
    }

    // Killing baresip ends the monitor. An idle stdin never ends it; its reader
    // thread is detached and abort stops the task side.
    match tokio::time::timeout(Duration::from_secs(2), &mut monitor).await {
        Ok(Ok(summary)) => debug!(
            "Monitor read {} lines ({} incoming calls, {} call ends)",
            summary.lines, summary.incoming_calls, summary.call_ends
        ),
        Ok(Err(e)) => warn!("Monitor task failed: {}", e),
        Err(_) => monitor.abort(),
    }

    let last_session = match finished {
        Some(result) => result,
        None => machine.await,
    }
    .context("State machine task failed")?;

    audio.stop();

    if let Some(summary) = last_session {
        info!(
            "Last call {} ({}) had {} turns",
            summary.id,
            summary.caller.as_deref().unwrap_or("unknown caller"),
            summary.turn_count
        );
    }
    info!("👋 sipbot stopped");

    Ok(())
}
