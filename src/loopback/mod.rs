//! Local voice users
//!
//! Outgoing audio can be routed back into the playback engine instead of the
//! network. [`LoopbackUser`] does so through a simulated lossy, jittered
//! link for the audio self-test; [`RecordFeed`] forwards without delay for
//! the recorder. Both feed the playback engine through the same ingestion
//! contract as a remote user.

mod pending;
mod record;
mod user;

pub use pending::PendingPackets;
pub use record::RecordFeed;
pub use user::LoopbackUser;

use bytes::Bytes;

use crate::audio::engine::{PlaybackEngine, SourceId};
use crate::error::PacketError;
use crate::protocol::VoicePacket;

/// Destination for locally encoded voice packets
pub trait VoiceSink: Send + Sync {
    /// Source identity this sink feeds into the playback engine
    fn source(&self) -> SourceId;

    /// Accept one encoded packet: flags byte, varint sequence, payload
    fn add_frame(&self, packet: &[u8]) -> Result<(), PacketError>;
}

/// Split `packet` and hand it to `playback` as `source`
fn forward(playback: &dyn PlaybackEngine, source: SourceId, packet: &[u8]) -> Result<(), PacketError> {
    let packet = VoicePacket::parse(packet)?;
    playback.add_frame_to_buffer(
        source,
        packet.playback_payload(),
        packet.sequence,
        packet.message_type(),
    );
    Ok(())
}

/// Announce a stream restart to `playback`
fn forward_placeholder(playback: &dyn PlaybackEngine, source: SourceId, flags: u8) {
    playback.add_frame_to_buffer(
        source,
        Bytes::new(),
        crate::protocol::PLACEHOLDER_SEQUENCE,
        crate::protocol::MessageType::from_flags(flags),
    );
}
