//! Application entry point: headless voice satellite.
//!
//! # Startup sequence
//!
//! 1. Parse the command line and load [`AppConfig`] (defaults on first run).
//! 2. Initialise logging.
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Connect the WebSocket transport.
//! 5. Open the microphone through the cpal backend.
//! 6. Start the fixed-channel pipeline streaming.
//! 7. Feed `hidden` / `visible` lines from stdin to the visibility
//!    controller until `quit`, end of input or Ctrl-C.
//! 8. Tear down: pipeline, microphone, socket.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use voice_satellite::{
    audio::{AudioManager, CaptureConstraints, CpalBackend},
    config::{AppConfig, AppPaths},
    logging,
    pipeline::{new_shared_state, FixedChannelPipeline, Pipeline},
    session::{StateHost, Visibility, VisibilityController},
    transport::{Transport, WebSocketTransport},
};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "voice-satellite", version, about = "Stream the microphone to a voice server")]
struct Cli {
    /// Settings file (defaults to the platform config directory).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// WebSocket endpoint, overrides `transport.url`.
    #[arg(long, env = "VOICE_SATELLITE_URL")]
    url: Option<String>,

    /// Binary handler id, overrides `transport.handler_id`.
    #[arg(long)]
    handler_id: Option<u8>,

    /// Verbose diagnostic logging.
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(url) = &self.url {
            config.transport.url = url.clone();
        }
        if self.handler_id.is_some() {
            config.transport.handler_id = self.handler_id;
        }
        if self.debug {
            config.debug = true;
        }
    }
}

// ---------------------------------------------------------------------------
// Stdin commands
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Signal(Visibility),
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "hidden" | "hide" => Some(Command::Signal(Visibility::Hidden)),
        "visible" | "show" => Some(Command::Signal(Visibility::Visible)),
        "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

/// Forward stdin lines until `quit`, end of input or a closed controller.
async fn read_commands(tx: mpsc::Sender<Visibility>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::warn!("stdin read failed: {e}");
                break;
            }
        };
        match parse_command(&line) {
            Some(Command::Signal(visibility)) => {
                if tx.send(visibility).await.is_err() {
                    break;
                }
            }
            Some(Command::Quit) => break,
            None if line.trim().is_empty() => {}
            None => log::warn!("unknown command {line:?} (expected hidden, visible or quit)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Satellite
// ---------------------------------------------------------------------------

async fn run(config: AppConfig) -> Result<()> {
    let transport = Arc::new(
        WebSocketTransport::connect(&config.transport.url)
            .await
            .context("connecting to the voice server")?,
    );
    let dyn_transport: Arc<dyn Transport> = transport.clone();

    let audio = Arc::new(AudioManager::new(
        Arc::new(CpalBackend),
        dyn_transport,
        config.streaming.send_interval(),
    ));

    let constraints = CaptureConstraints::from_config(&config.microphone);
    let starter = Arc::clone(&audio);
    let settings = tokio::task::spawn_blocking(move || starter.start_microphone(&constraints))
        .await
        .context("microphone start task panicked")?
        .context("opening the microphone")?;
    log::info!(
        "mic: capturing from {:?} via {} ({} Hz, {} ch)",
        settings.device,
        settings.tier,
        settings.sample_rate,
        settings.channels
    );

    let handler_id = config.transport.handler_id;
    let session_delay = config.session.hide_debounce();
    let host = Arc::new(StateHost::new(new_shared_state()));
    let pipeline = Arc::new(FixedChannelPipeline::new(
        handler_id,
        Arc::clone(&audio),
        host.clone(),
    ));
    pipeline.restart(Duration::ZERO);

    let controller =
        VisibilityController::new(Arc::clone(&audio), pipeline.clone(), host, session_delay);
    let (tx, rx) = mpsc::channel::<Visibility>(16);
    let controller_task = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.run(rx).await })
    };

    tokio::select! {
        _ = read_commands(tx) => log::info!("input closed, shutting down"),
        _ = tokio::signal::ctrl_c() => log::info!("interrupted, shutting down"),
    }

    // The sender is gone either way; the controller drains and exits.
    if let Err(e) = controller_task.await {
        log::warn!("visibility controller ended abnormally: {e}");
    }

    pipeline.stop();
    audio.stop_microphone();
    transport.close();
    log::info!("voice satellite stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();

    // An explicit --config must load; the default location may be broken.
    let settings_file = AppPaths::new().settings_file_or(cli.config.as_deref());
    let mut config = match AppConfig::load_from(&settings_file) {
        Ok(config) => config,
        Err(e) if cli.config.is_none() => {
            eprintln!("failed to load config ({e:#}); using defaults");
            AppConfig::default()
        }
        Err(e) => return Err(e),
    };
    cli.apply(&mut config);

    logging::init(config.debug);
    log::info!("voice satellite starting up ({})", config.transport.url);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let result = rt.block_on(run(config));
    // A pending stdin read would otherwise hold the runtime open.
    rt.shutdown_timeout(Duration::from_millis(500));
    result
}
