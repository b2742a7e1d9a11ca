//! Lumen headless client — entry point.
//!
//! ```text
//! lumen                         Stream with defaults
//! lumen --config <path>         Use custom config TOML
//! lumen --host <addr>           Override the host address
//! lumen --frames <n>            Override the loopback frame count
//! lumen --gen-config            Dump default config and exit
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lumen_core::{
    InputEvent, KeyAction, Modifiers, MouseButton, RemoteInputKeys, StreamRouter,
};

use lumen_cli::config::ClientConfig;
use lumen_cli::loopback::{LoopbackEngine, RawPcmDecoder};
use lumen_cli::sink::{LogListener, NullAudioRenderer, NullVideoRenderer, SinkTally};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lumen", about = "Lumen game-streaming client")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "lumen.toml")]
    config: PathBuf,

    /// Host address (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Number of loopback frames to stream (overrides config).
    #[arg(short, long)]
    frames: Option<u32>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        println!("{}", ClientConfig::default_toml()?);
        return Ok(());
    }

    let mut config = ClientConfig::load(&cli.config);
    if let Some(host) = cli.host {
        config.host.address = host;
    }
    if let Some(frames) = cli.frames {
        config.loopback.frames = frames;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("lumen v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Build the router ─────────────────────────────────────

    let engine = Arc::new(LoopbackEngine::new(config.loopback.clone()));
    let router = StreamRouter::with_reassembly(
        engine.clone(),
        Arc::new(RawPcmDecoder::factory),
        config.buffer,
    );

    // ── 2. Connect ──────────────────────────────────────────────

    let tally = Arc::new(SinkTally::default());
    let stream = config
        .stream
        .clone()
        .with_remote_input(RemoteInputKeys::generate());
    router.start_connection(
        &config.host.address,
        stream,
        Arc::new(LogListener::new(Arc::clone(&tally))),
        Box::new(NullVideoRenderer::new(Arc::clone(&tally))),
        Box::new(NullAudioRenderer::new(Arc::clone(&tally))),
    )?;

    // ── 3. Input and progress ───────────────────────────────────

    for event in [
        InputEvent::mouse_move(12, -4),
        InputEvent::press(MouseButton::Left),
        InputEvent::release(MouseButton::Left),
        InputEvent::key_down(0x41, Modifiers::SHIFT),
        InputEvent::key_up(0x41, Modifiers::SHIFT),
        InputEvent::scroll_from_wheel_delta(-240),
    ] {
        if let Err(e) = router.send_input(event) {
            warn!("failed to send input: {e}");
        }
    }
    router.send_keyboard_event(0x1B, KeyAction::Down, Modifiers::empty())?;

    let mut stats_rx = router.stats_receiver();
    let reporter = tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.tick().await;
        loop {
            tick.tick().await;
            if stats_rx.has_changed().is_err() {
                break;
            }
            let stats = stats_rx.borrow_and_update().clone();
            info!(
                frames = stats.frames_submitted,
                keyframes = stats.keyframe_requests,
                buffer = stats.buffer_capacity,
                "streaming"
            );
        }
    });

    tokio::select! {
        _ = engine.wait_finished() => info!("stream complete"),
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    // ── 4. Shutdown ─────────────────────────────────────────────

    if router.is_connected() {
        router.stop_connection()?;
    }
    reporter.abort();
    let _ = reporter.await;

    let stats = router.stats();
    info!(
        frames = stats.frames_submitted,
        rendered = tally.frames(),
        bytes = stats.bytes_reassembled,
        rejected = stats.frames_rejected,
        keyframe_requests = stats.keyframe_requests,
        buffer_capacity = stats.buffer_capacity,
        reallocations = stats.buffer_reallocations,
        audio_played = stats.audio_packets_played,
        audio_dropped = stats.audio_packets_dropped,
        inputs = stats.input_events_sent,
        input_bytes = engine.input_bytes(),
        "session summary"
    );

    Ok(())
}
