use clap::{Args as ClapArgs, Parser, Subcommand};
use crossbeam::channel::unbounded;
use std::sync::Arc;

use spatial_backend::automation::AutomationBank;
use spatial_backend::config::{BackendConfig, CONFIG};
use spatial_backend::events::{event_channel, EngineEvent};
use spatial_backend::models::SessionData;
use spatial_backend::params::ParameterStore;
use spatial_backend::realtime::RealtimeEngine;
use spatial_backend::render::{OfflineRenderEngine, WavFileSink};

/// CLI for streaming or rendering a spatial entrainment session
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a session live to the default output device
    Play(PlayArgs),
    /// Render a session offline to a WAV file
    Render(RenderArgs),
    /// Generate a default config file and exit
    GenerateConfig(ConfigArgs),
}

#[derive(ClapArgs)]
struct PlayArgs {
    /// Path to the session JSON file
    #[arg(long)]
    path: String,
}

#[derive(ClapArgs)]
struct RenderArgs {
    /// Path to the session JSON file
    #[arg(long)]
    path: String,
    /// Output WAV path (relative paths land in the configured output dir)
    #[arg(long)]
    out: String,
    /// Render length in seconds; defaults to the session's recording duration
    #[arg(long)]
    duration: Option<f64>,
}

#[derive(ClapArgs)]
struct ConfigArgs {
    /// Output path for the generated configuration
    #[arg(long, default_value = "config.toml")]
    out: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Play(args) => play_command(args)?,
        Commands::Render(args) => render_command(args)?,
        Commands::GenerateConfig(cfg) => {
            BackendConfig::generate_default(&cfg.out)?;
            println!("Generated default config at {}", cfg.out);
        }
    }
    Ok(())
}

fn load_session(path: &str) -> Result<(SessionData, Arc<ParameterStore>), Box<dyn std::error::Error>> {
    let json_str = std::fs::read_to_string(path)?;
    let session: SessionData = serde_json::from_str(&json_str)?;

    let store = ParameterStore::new();
    store.set_max_frequency(CONFIG.max_frequency);
    store.set_displayed_channels(session.settings.displayed_channels);
    store.load_channels(&session.channels)?;
    Ok((session, Arc::new(store)))
}

fn play_command(args: PlayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (_, store) = load_session(&args.path)?;

    let (event_tx, event_rx) = event_channel();
    let mut engine = RealtimeEngine::new(store);
    engine.set_event_sink(event_tx);
    engine.start()?;

    let (tx, rx) = unbounded();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    println!("Streaming {}... press Ctrl+C to stop", args.path);
    loop {
        crossbeam::select! {
            recv(rx) -> _ => break,
            recv(event_rx) -> event => {
                if let Ok(EngineEvent::Elapsed { seconds }) = event {
                    print!("\relapsed: {seconds} s  ");
                    use std::io::Write;
                    let _ = std::io::stdout().flush();
                }
            }
        }
    }
    println!();

    if let Err(e) = engine.stop() {
        // Join timeouts are reportable, not fatal.
        tracing::warn!("{e}");
    }
    Ok(())
}

fn render_command(args: RenderArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (session, store) = load_session(&args.path)?;
    let duration = args.duration.unwrap_or(session.settings.render_duration);
    let automation = AutomationBank::from_session(&session.settings.automation)?;

    let sink = WavFileSink::new(&args.out);
    let out_path = sink.path().to_path_buf();

    let (event_tx, event_rx) = event_channel();
    let mut engine = OfflineRenderEngine::new(store);
    engine.start(duration, Box::new(sink), automation, Some(event_tx))?;

    let progress_printer = std::thread::spawn(move || {
        for event in event_rx {
            match &event {
                EngineEvent::Progress { .. } => {
                    if let Some(pct) = event.progress_percent() {
                        print!("\rrendering: {pct:5.1}%");
                        use std::io::Write;
                        let _ = std::io::stdout().flush();
                    }
                }
                EngineEvent::Status(msg) => println!("\r{msg}"),
                EngineEvent::Completed | EngineEvent::Cancelled | EngineEvent::Failed(_) => break,
                EngineEvent::Elapsed { .. } => {}
            }
        }
        println!();
    });

    let result = engine.wait();
    let _ = progress_printer.join();
    result?;
    println!("Rendered {duration} s to {}", out_path.display());
    Ok(())
}
