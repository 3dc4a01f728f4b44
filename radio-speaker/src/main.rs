//! Radio Speaker demo player - Main entry point
//!
//! Plays a TOML playlist through the speaker engine on the simulated
//! (clock-driven) backend, crossfading between tracks, and logs every sound
//! event. Each track is created as soon as its predecessor starts playing, so
//! its media is preloaded into the preparing slot, and played when the
//! predecessor finishes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use radio_speaker::platform::SimulatedBackend;
use radio_speaker::playlist::Playlist;
use radio_speaker::{Sound, Speaker, SpeakerConfig, SpeakerEvent};
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for radio-speaker
#[derive(Parser, Debug)]
#[command(name = "radio-speaker")]
#[command(about = "Crossfading playlist player on the simulated audio backend")]
#[command(version)]
struct Args {
    /// Playlist file (TOML, one [[track]] table per entry)
    #[arg(short, long)]
    playlist: PathBuf,

    /// Configuration file (overrides RADIO_SPEAKER_CONFIG and the user config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Session volume (0-100), overrides initial_volume
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    volume: Option<u8>,
}

/// Progress notifications from sound handlers to the main loop
#[derive(Debug)]
enum TrackEvent {
    Started(usize),
    Finished { index: usize, error: bool },
}

/// Build the log filter: RUST_LOG wins, otherwise the configured level
fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = if level.contains('=') {
            level.to_string()
        } else {
            format!("radio_speaker={},radio_common={}", level, level)
        };
        EnvFilter::try_new(&directive)
            .unwrap_or_else(|_| EnvFilter::new("radio_speaker=debug,radio_common=info"))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let config = SpeakerConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(log_filter(&config.logging.level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let playlist = Playlist::load(&args.playlist)
        .with_context(|| format!("Failed to load playlist {}", args.playlist.display()))?;
    info!(
        "Starting radio-speaker with {} tracks from {}",
        playlist.len(),
        args.playlist.display()
    );

    let backend = SimulatedBackend::with_capacity(config.position_interval(), config.event_capacity);
    playlist.register_media(&backend);

    let speaker = Speaker::new(Arc::new(backend), config);
    if let Some(volume) = args.volume {
        speaker.set_volume(volume);
    }

    speaker
        .initialize_audio()
        .await
        .context("Failed to initialize audio")?;

    tokio::spawn(log_speaker_events(speaker.clone()));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut sounds: HashMap<usize, Sound> = HashMap::new();

    let first = create_track(&speaker, &playlist, 0, &tx)?;
    first.play();
    sounds.insert(0, first);

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    TrackEvent::Started(index) => {
                        let next = index + 1;
                        if next < playlist.len() && !sounds.contains_key(&next) {
                            sounds.insert(next, create_track(&speaker, &playlist, next, &tx)?);
                        }
                    }
                    TrackEvent::Finished { index, error } => {
                        if error {
                            warn!("Track {} ({}) failed", index, playlist.tracks[index].url);
                        }
                        sounds.remove(&index);
                        let next = index + 1;
                        if next >= playlist.len() {
                            info!("End of playlist");
                            break;
                        }
                        let sound = match sounds.remove(&next) {
                            Some(sound) => sound,
                            None => create_track(&speaker, &playlist, next, &tx)?,
                        };
                        sound.play();
                        sounds.insert(next, sound);
                    }
                }
            }
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    speaker.flush();
    info!("Playback stopped");
    Ok(())
}

/// Create the sound for playlist entry `index`, wiring its handlers to `tx`
fn create_track(
    speaker: &Speaker,
    playlist: &Playlist,
    index: usize,
    tx: &mpsc::UnboundedSender<TrackEvent>,
) -> Result<Sound> {
    let entry = &playlist.tracks[index];
    let started = tx.clone();
    let finished = tx.clone();
    let config = entry
        .sound_config()
        .on_play(move || {
            let _ = started.send(TrackEvent::Started(index));
        })
        .on_finish(move |error| {
            let _ = finished.send(TrackEvent::Finished { index, error });
        });

    speaker
        .create(entry.url.clone(), config)
        .with_context(|| format!("Failed to create sound for {}", entry.url))
}

/// Log speaker-level events until the speaker goes away
async fn log_speaker_events(speaker: Speaker) {
    let mut rx = speaker.subscribe();
    drop(speaker);
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Event logger skipped {} events", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match event {
            SpeakerEvent::Sound { id, event, .. } => debug!("Sound {}: {:?}", id, event),
            SpeakerEvent::Rotated {
                active, previous, ..
            } => info!(
                "Rotated: active={} previous={}",
                active.as_deref().unwrap_or("<silence>"),
                previous.as_deref().unwrap_or("<silence>")
            ),
            SpeakerEvent::VolumeChanged { volume, .. } => info!("Volume {}", volume),
        }
    }
}
