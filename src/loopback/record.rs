use std::sync::Arc;

use super::{forward, VoiceSink};
use crate::audio::engine::{PlaybackEngine, SourceId};
use crate::audio::slot::EngineSlot;
use crate::error::PacketError;

/// Forwards the local user's packets straight to the playback engine, for
/// the recorder's own track. No loss, no delay.
pub struct RecordFeed {
    playback: Arc<EngineSlot<dyn PlaybackEngine>>,
}

impl RecordFeed {
    pub fn new(playback: Arc<EngineSlot<dyn PlaybackEngine>>) -> Self {
        Self { playback }
    }
}

impl VoiceSink for RecordFeed {
    fn source(&self) -> SourceId {
        SourceId::Recorder
    }

    /// Packets arriving while no playback engine runs are ignored
    fn add_frame(&self, packet: &[u8]) -> Result<(), PacketError> {
        let Some(playback) = self.playback.get() else {
            return Ok(());
        };
        forward(playback.as_ref(), SourceId::Recorder, packet)
    }
}

impl Drop for RecordFeed {
    fn drop(&mut self) {
        if let Some(playback) = self.playback.get() {
            playback.remove_buffer(SourceId::Recorder);
        }
    }
}
