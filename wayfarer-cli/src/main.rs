//! Wayfarer CLI
//!
//! Replays a chat transcript through the map engine and prints the
//! resulting map.
//!
//! # Usage
//!
//! ```bash
//! # Replay a transcript and print the map as text
//! wayfarer replay --transcript chat.json
//!
//! # Seed lore, fast-travel to a discovered place, save a snapshot
//! wayfarer replay --transcript chat.yaml --lore lore.yaml \
//!     --travel "Silver Lake" --snapshot-out map.json
//!
//! # Show which locations a line of text mentions
//! wayfarer extract "They arrive at the Silver Lake."
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use wayfarer_core::{
    extract_locations, EventHub, HostEvent, InMemoryLog, JsonFileSnapshotStore, LoreEntry,
    MapSession, MapView, MessageLog, StaticLore, TravelError, TravelStart, WayfarerConfig,
};

#[derive(Parser)]
#[command(name = "wayfarer")]
#[command(version)]
#[command(about = "Fog-of-war world map and fast travel over a chat transcript")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML config file (defaults apply when omitted)
    #[arg(long, short, global = true, env = "WAYFARER_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', global = true, default_value = "text", value_enum)]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a transcript and print the map
    Replay {
        /// JSON or YAML list of messages (strings or `{text}` objects)
        #[arg(short, long)]
        transcript: PathBuf,

        /// JSON or YAML list of world-knowledge entries (`{tags, text}`)
        #[arg(short, long)]
        lore: Option<PathBuf>,

        /// Fast-travel to the latest discovered waypoint with this name
        #[arg(long)]
        travel: Option<String>,

        /// Cancel the journey after this many milliseconds
        #[arg(long, requires = "travel")]
        cancel_after_ms: Option<u64>,

        /// Reveal every waypoint before printing
        #[arg(long)]
        reveal_all: bool,

        /// Write the final map snapshot here
        #[arg(long)]
        snapshot_out: Option<PathBuf>,
    },

    /// Print the location names found in text (reads stdin if omitted)
    Extract { text: Option<String> },
}

/// Transcript entries may be bare strings or message objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum TranscriptEntry {
    Plain(String),
    Message { text: String },
}

impl TranscriptEntry {
    fn into_text(self) -> String {
        match self {
            TranscriptEntry::Plain(text) | TranscriptEntry::Message { text } => text,
        }
    }
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wayfarer_core=debug".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => WayfarerConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => WayfarerConfig::default(),
    }
    .with_env_overrides();
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Replay {
            transcript,
            lore,
            travel,
            cancel_after_ms,
            reveal_all,
            snapshot_out,
        } => {
            let options = ReplayOptions {
                transcript,
                lore,
                travel,
                cancel_after: cancel_after_ms.map(Duration::from_millis),
                reveal_all,
                snapshot_out,
            };
            replay(config, options, cli.format).await
        }
        Commands::Extract { text } => extract(text, cli.format),
    }
}

// =============================================================================
// REPLAY
// =============================================================================

struct ReplayOptions {
    transcript: PathBuf,
    lore: Option<PathBuf>,
    travel: Option<String>,
    cancel_after: Option<Duration>,
    reveal_all: bool,
    snapshot_out: Option<PathBuf>,
}

async fn replay(config: WayfarerConfig, options: ReplayOptions, format: OutputFormat) -> Result<()> {
    let messages: Vec<TranscriptEntry> = read_list(&options.transcript)?;
    let lore: Vec<LoreEntry> = match &options.lore {
        Some(path) => read_list(path)?,
        None => Vec::new(),
    };

    let log = Arc::new(InMemoryLog::new());
    let mut builder = MapSession::builder(config, Arc::clone(&log) as Arc<dyn MessageLog>)
        .lore(Arc::new(StaticLore::new(lore)));
    if let Some(path) = &options.snapshot_out {
        builder = builder.snapshot_store(Arc::new(JsonFileSnapshotStore::new(path)));
    }
    let session = builder.build();

    let hub = EventHub::new();
    let _subscriptions = session.attach(&hub);
    session.scan_lore();

    for entry in messages {
        let index = log.push(entry.into_text());
        hub.emit(HostEvent::MessageAppended { index });
    }
    info!("Replayed {} messages", log.len());

    if options.reveal_all {
        session.reveal_all();
    }
    if let Some(name) = &options.travel {
        fast_travel(&session, name, options.cancel_after).await?;
    }

    if options.snapshot_out.is_some() {
        session.save().await.context("Failed to write snapshot")?;
    }

    print_map(&session.map_view(), format)
}

async fn fast_travel(session: &MapSession, name: &str, cancel_after: Option<Duration>) -> Result<()> {
    let lower = name.to_lowercase();
    let Some(target) = session.with_state(|s| {
        s.store()
            .iter()
            .rev()
            .find(|wp| wp.name().to_lowercase() == lower)
            .map(|wp| wp.id())
    }) else {
        bail!("No waypoint named '{}' on the map", name);
    };

    let journey = match session.travel_to(target) {
        Ok(TravelStart::Arrived(arrival)) => {
            info!("Arrived instantly at {}", arrival.name);
            return Ok(());
        }
        Ok(TravelStart::Journey(journey)) => journey,
        Err(err) => {
            warn!("{}", err);
            return Ok(());
        }
    };

    let mut progress = journey.subscribe();
    let reporter = tokio::spawn(async move {
        let mut last_stage = None;
        while progress.changed().await.is_ok() {
            let report = *progress.borrow_and_update();
            if last_stage != Some(report.stage) {
                info!("{} ({:.0}%)", report.stage, report.fraction * 100.0);
                last_stage = Some(report.stage);
            }
        }
    });

    if let Some(delay) = cancel_after {
        let handle = journey.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            handle.cancel();
        });
    }

    match journey.finish().await {
        Ok(arrival) => {
            if let Some(warning) = &arrival.warning {
                warn!("{}", warning);
            }
            info!(
                "Arrived at {} ({} new discoveries)",
                arrival.name,
                arrival.revealed.len()
            );
        }
        Err(TravelError::Cancelled) => info!("Journey cancelled"),
        Err(err) => warn!("{}", err),
    }
    reporter.await.context("Progress reporter failed")?;
    Ok(())
}

fn print_map(view: &MapView, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(view)?);
        }
        OutputFormat::Text => {
            println!(
                "Discovered: {}/{}   position: {}   fog: {}",
                view.stats.discovered,
                view.stats.total,
                view.current_position,
                if view.fog_enabled { "on" } else { "off" }
            );
            for visible in &view.waypoints {
                let wp = &visible.waypoint;
                let marker = match (visible.discovered, visible.is_current) {
                    (true, true) => '@',
                    (true, false) => '*',
                    (false, _) => '?',
                };
                let name = if visible.discovered { wp.name() } else { "???" };
                println!(
                    "  {} {:<24} {:<9} msg {:>4}  ({:>7.1}, {:>7.1})",
                    marker,
                    name,
                    wp.category(),
                    wp.position_index(),
                    wp.coordinates().x,
                    wp.coordinates().y
                );
            }
            if view.nearby > 0 {
                println!("{} undiscovered location(s) nearby", view.nearby);
            }
        }
    }
    Ok(())
}

// =============================================================================
// EXTRACT
// =============================================================================

fn extract(text: Option<String>, format: OutputFormat) -> Result<()> {
    let text = match text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };
    let names = extract_locations(&text);
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&names)?),
        OutputFormat::Text => {
            for name in names {
                println!("{name}");
            }
        }
    }
    Ok(())
}

/// Read a JSON or YAML list, chosen by file extension.
fn read_list<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let parsed = if is_json {
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))?
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("Invalid YAML in {}", path.display()))?
    };
    Ok(parsed)
}
