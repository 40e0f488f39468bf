//! Engine interfaces shared by every device backend

use std::sync::Arc;

use bytes::Bytes;

use super::buffer::SharedRingBuffer;
use super::source_buffer::BufferTable;
use super::priority::ThreadPriority;
use crate::error::AudioError;
use crate::protocol::MessageType;

/// Logical origin of a stream of voice frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceId {
    /// A remote user, by server session id
    Session(u32),
    /// The local self-test loopback user
    Loopback,
    /// The local recorder
    Recorder,
}

/// Audio capture engine
pub trait CaptureEngine: Send + Sync {
    /// Backend name, e.g. `"cpal"`
    fn name(&self) -> &str;

    /// Start the capture loop on its own thread at `priority`
    fn start(&self, priority: ThreadPriority) -> Result<(), AudioError>;

    /// Captured PCM frames, consumed by the encoder
    fn output(&self) -> SharedRingBuffer;
}

/// Audio playback engine
pub trait PlaybackEngine: Send + Sync {
    /// Backend name, e.g. `"cpal"`
    fn name(&self) -> &str;

    /// Start the playback loop on its own thread at `priority`
    fn start(&self, priority: ThreadPriority) -> Result<(), AudioError>;

    /// Queue one encoded frame for `source`.
    ///
    /// `payload` is the flags byte followed by the codec payload. An empty
    /// payload with [`PLACEHOLDER_SEQUENCE`] announces a stream restart.
    ///
    /// [`PLACEHOLDER_SEQUENCE`]: crate::protocol::PLACEHOLDER_SEQUENCE
    fn add_frame_to_buffer(
        &self,
        source: SourceId,
        payload: Bytes,
        sequence: u64,
        message_type: MessageType,
    );

    /// Forget everything buffered for `source`
    fn remove_buffer(&self, source: SourceId);

    /// Per-source frame buffers, for backends that keep them
    fn buffers(&self) -> Option<Arc<BufferTable>> {
        None
    }
}

pub type CaptureHandle = Arc<dyn CaptureEngine>;
pub type PlaybackHandle = Arc<dyn PlaybackEngine>;
