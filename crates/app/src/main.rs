use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stemplay_core::{
    AudioOutput, Config, CpalOutput, DirCatalog, PlaybackError, StageDirector, TransportEvent,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod http;

use commands::{Command, HELP};
use http::{HttpCatalog, HttpFetcher};

#[derive(Parser, Debug)]
#[command(name = "stemplay")]
#[command(about = "Reveal a song one stem at a time")]
#[command(version)]
struct Args {
    /// Config file to use instead of the user config
    #[arg(long, env = "STEMPLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Stage to start on, counted from 1
    #[arg(long)]
    stage: Option<usize>,

    /// Master volume, 0 to 1
    #[arg(long)]
    volume: Option<f32>,

    /// Seconds per stage
    #[arg(long)]
    duration: Option<f64>,

    #[command(subcommand)]
    source: Source,
}

#[derive(Subcommand, Debug)]
enum Source {
    /// Play a directory of stem files named by stage
    Local { dir: PathBuf },
    /// Play the current song of a game session
    Remote {
        #[arg(long, env = "STEMPLAY_SERVER")]
        server: Option<String>,
        #[arg(long)]
        session: String,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if let Some(duration) = args.duration {
        config.stage_duration_secs = duration;
    }
    if let Some(volume) = args.volume {
        config.master_gain = volume;
    }
    Ok(config)
}

/// Persist a volume changed during the session, leaving other settings as stored.
fn remember_volume(args: &Args, volume: f32) {
    let saved = match &args.config {
        Some(path) => Config::load_from(path).and_then(|mut stored| {
            stored.master_gain = volume;
            stored.save_to(path)
        }),
        None => {
            let mut stored = Config::load();
            stored.master_gain = volume;
            stored.save()
        }
    };
    match saved {
        Ok(()) => debug!(volume, "saved master volume"),
        Err(err) => warn!(error = %err, "could not save master volume"),
    }
}

fn report(err: &PlaybackError) {
    error!(error = %err, "playback error");
    eprintln!("{err}");
    if matches!(err, PlaybackError::Output(_)) {
        eprintln!("the audio output is not running, press p to try again");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stemplay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let output: Rc<dyn AudioOutput> =
        Rc::new(CpalOutput::open().context("Failed to open audio output")?);
    let client = http::client()?;
    let fetcher = Arc::new(HttpFetcher::new(client.clone()));
    let mut director = StageDirector::new(output, fetcher, config.clone());
    let start_volume = director.master_volume();

    let loaded = match &args.source {
        Source::Local { dir } => director.load_from_catalog(&DirCatalog::new(dir), "").await?,
        Source::Remote { server, session } => {
            let server = server
                .clone()
                .or_else(|| config.server_url.clone())
                .context("no game server, pass --server or set server_url in the config")?;
            let catalog = HttpCatalog::new(client, server);
            director.load_from_catalog(&catalog, session).await?
        }
    };
    let song_name = loaded.song_name;
    debug!(song = %song_name, "song loaded");

    let (tx, mut ready) = mpsc::unbounded_channel();
    loaded.loads.forward(tx);

    if let Some(stage) = args.stage {
        director.set_stage(stage.saturating_sub(1))?;
    }
    if let Some(progress) = director.progress() {
        info!(
            stage = progress.stage + 1,
            total_stages = progress.total_stages,
            "ready to play"
        );
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        if let Err(err) = command.apply(&mut director, &song_name).await {
                            report(&err);
                        }
                    }
                    Err(message) => eprintln!("{message}"),
                }
            }
            _ = ticker.tick() => {
                if director.poll() == Some(TransportEvent::Ended) {
                    println!("\nstage over, press p to hear it again or s to skip");
                }
                if let Some(progress) = director.progress().filter(|p| p.state.is_playing()) {
                    let last = if progress.is_final_stage() { "  (all stems)" } else { "" };
                    print!("\r{progress}{last}");
                    let _ = std::io::stdout().flush();
                }
            }
            Some(buffer) = ready.recv() => {
                if director.accept_loaded(&buffer) {
                    debug!(
                        stem = %buffer.stem,
                        fallback = buffer.outcome.is_fallback(),
                        "stem ready"
                    );
                }
            }
        }
    }

    director.stop();
    if director.master_volume() != start_volume {
        remember_volume(&args, director.master_volume());
    }
    info!("bye");
    Ok(())
}
