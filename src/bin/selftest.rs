//! Audio self-test
//!
//! Plays synthetic voice packets back through the loopback user, the way
//! the client's audio wizard does, and reports what the playback engine
//! received.

use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voice_pipeline::{
    audio::SourceId,
    codec::{Negotiation, SystemCodecBackend},
    config::AppConfig,
    loopback::VoiceSink,
    protocol::VoicePacket,
    AudioContext,
};

/// One synthetic packet per 10 ms frame
const PACKET_INTERVAL: Duration = Duration::from_millis(10);
const STATS_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting audio self-test");

    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => AppConfig::load_or_default().context("loading configuration")?,
    };
    tracing::info!(
        packet_loss = config.loopback.packet_loss,
        max_delay_ms = config.loopback.max_packet_delay_ms,
        "Simulated link"
    );

    let context = AudioContext::new(config);
    context.init(&SystemCodecBackend);

    let message_type = match context.select_codec(&Negotiation::default()) {
        Ok(choice) => {
            tracing::info!(codec = ?choice.family, "Encoding with");
            choice.message_type
        }
        Err(e) => {
            tracing::warn!("{}, tagging packets as Opus", e);
            voice_pipeline::protocol::MessageType::Opus
        }
    };

    let (capturing, playing) = context.start_audio();
    if !playing {
        anyhow::bail!("no playback engine could be started");
    }
    if !capturing {
        tracing::warn!("No capture engine, continuing with synthetic packets only");
    }

    let user = context.loopback_user();
    let mut packets = tokio::time::interval(PACKET_INTERVAL);
    let mut stats = tokio::time::interval(STATS_INTERVAL);
    let mut sequence: u64 = 1;
    let mut sent: u64 = 0;
    let mut delivered: u64 = 0;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutting down...");
                break;
            }
            _ = packets.tick() => {
                let packet = VoicePacket {
                    flags: message_type.to_flags(),
                    sequence,
                    payload: Bytes::from(sequence.to_be_bytes().to_vec()),
                };
                user.add_frame(&packet.encode())?;
                sequence += 1;
                sent += 1;

                delivered += user.fetch_frames() as u64;

                // Stand-in for the decoder: drain what the engine buffered
                if let Some(buffers) = context.engines().playback().and_then(|p| p.buffers()) {
                    while buffers.pop(SourceId::Loopback).is_some() {}
                }
            }
            _ = stats.tick() => {
                let buffer = context
                    .engines()
                    .playback()
                    .and_then(|p| p.buffers())
                    .and_then(|b| b.stats(SourceId::Loopback));
                match buffer {
                    Some(s) => tracing::info!(
                        sent,
                        delivered,
                        pending = user.pending_len(),
                        lost = s.lost,
                        late = s.late,
                        restarts = s.restarts,
                        loss = format_args!("{:.1}%", s.loss_rate() * 100.0),
                        "Loopback stats"
                    ),
                    None => tracing::info!(
                        sent,
                        delivered,
                        pending = user.pending_len(),
                        "Loopback stats"
                    ),
                }
            }
        }
    }

    drop(user);
    context.shutdown();
    tracing::info!("Self-test finished");
    Ok(())
}
