use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{forward, forward_placeholder, PendingPackets, VoiceSink};
use crate::audio::engine::{PlaybackEngine, SourceId};
use crate::audio::slot::EngineSlot;
use crate::clock::{Clock, MonotonicClock};
use crate::config::LoopbackConfig;
use crate::constants::{MAX_PENDING_PACKETS, RESTART_THRESHOLD};
use crate::error::PacketError;

/// `last_drain` value before the first drain pass
const NEVER_DRAINED: u64 = u64::MAX;

/// Synthetic user that plays the local user's own voice back through a
/// simulated network link.
///
/// Packets are dropped with probability `packet_loss` and otherwise held
/// back for a random delay below `max_packet_delay_ms`. [`fetch_frames`]
/// must be polled by the audio output path; it releases every packet whose
/// time has come to the playback engine, in release order.
///
/// After more than [`RESTART_THRESHOLD`] without a drain the stream counts
/// as restarted: the next packet is queued without delay and the playback
/// engine is told to reset the source.
///
/// [`fetch_frames`]: LoopbackUser::fetch_frames
pub struct LoopbackUser {
    playback: Arc<EngineSlot<dyn PlaybackEngine>>,
    config: RwLock<LoopbackConfig>,
    clock: Arc<dyn Clock>,
    ticker_start: Duration,
    rng: Mutex<StdRng>,
    pending: Mutex<PendingPackets>,
    /// Ticker nanos of the last drain pass
    last_drain: AtomicU64,
}

impl LoopbackUser {
    pub fn new(playback: Arc<EngineSlot<dyn PlaybackEngine>>, config: LoopbackConfig) -> Self {
        Self::with_parts(
            playback,
            config,
            Arc::new(MonotonicClock::new()),
            StdRng::from_entropy(),
        )
    }

    /// Construct with an explicit time source and random generator
    pub fn with_parts(
        playback: Arc<EngineSlot<dyn PlaybackEngine>>,
        config: LoopbackConfig,
        clock: Arc<dyn Clock>,
        rng: StdRng,
    ) -> Self {
        let ticker_start = clock.now();
        Self {
            playback,
            config: RwLock::new(config),
            clock,
            ticker_start,
            rng: Mutex::new(rng),
            pending: Mutex::new(PendingPackets::new()),
            last_drain: AtomicU64::new(NEVER_DRAINED),
        }
    }

    fn elapsed(&self) -> Duration {
        self.clock.now().saturating_sub(self.ticker_start)
    }

    /// Best effort: read without the pending lock
    fn is_cold(&self, now: Duration) -> bool {
        match self.last_drain.load(Ordering::Acquire) {
            NEVER_DRAINED => true,
            nanos => now.saturating_sub(Duration::from_nanos(nanos)) > RESTART_THRESHOLD,
        }
    }

    /// Release every due packet to the playback engine. Returns how many
    /// packets were delivered.
    ///
    /// Does nothing when no playback engine is running or nothing is
    /// pending.
    pub fn fetch_frames(&self) -> usize {
        let mut pending = self.pending.lock();

        let Some(playback) = self.playback.get() else {
            return 0;
        };
        if pending.is_empty() {
            return 0;
        }

        let now = self.elapsed();
        let mut delivered = 0;
        for (_, packet) in pending.drain_due(now) {
            match forward(playback.as_ref(), SourceId::Loopback, &packet) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(len = packet.len(), "Discarding malformed loopback packet: {}", e),
            }
        }

        self.last_drain
            .store(now.as_nanos() as u64, Ordering::Release);
        delivered
    }

    /// Swap the simulated link settings; packets already queued keep their
    /// release times
    pub fn set_config(&self, config: LoopbackConfig) {
        *self.config.write() = config;
    }

    pub fn config(&self) -> LoopbackConfig {
        *self.config.read()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

impl VoiceSink for LoopbackUser {
    fn source(&self) -> SourceId {
        SourceId::Loopback
    }

    fn add_frame(&self, packet: &[u8]) -> Result<(), PacketError> {
        let flags = *packet.first().ok_or(PacketError::Empty)?;
        let config = self.config();

        if self.rng.lock().gen::<f64>() < config.packet_loss {
            tracing::trace!("Loopback packet dropped");
            return Ok(());
        }

        let now = self.elapsed();
        let restart = self.is_cold(now);
        let delay = if restart {
            Duration::ZERO
        } else {
            config.max_packet_delay().mul_f64(self.rng.lock().gen::<f64>())
        };

        {
            let mut pending = self.pending.lock();
            // Nothing drains while no playback engine runs
            if pending.len() >= MAX_PENDING_PACKETS {
                pending.pop_earliest();
                tracing::debug!("Loopback queue full, dropping oldest packet");
            }
            pending.insert(now + delay, Bytes::copy_from_slice(packet));
        }

        if restart {
            if let Some(playback) = self.playback.get() {
                tracing::debug!("Loopback stream restarting");
                forward_placeholder(playback.as_ref(), SourceId::Loopback, flags);
            }
        }
        Ok(())
    }
}

impl Drop for LoopbackUser {
    fn drop(&mut self) {
        if let Some(playback) = self.playback.get() {
            playback.remove_buffer(SourceId::Loopback);
        }
    }
}
