//! Backend without a device
//!
//! Accepts everything, produces silence. Lets the pipeline run end to end on
//! machines with no audio hardware or no device backend compiled in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use super::buffer::{create_shared_buffer, SharedRingBuffer};
use super::engine::{CaptureEngine, PlaybackEngine, SourceId};
use super::priority::ThreadPriority;
use super::source_buffer::{BufferTable, BufferedFrame};
use crate::constants::RING_BUFFER_CAPACITY;
use crate::error::AudioError;
use crate::protocol::MessageType;

pub const NULL_BACKEND: &str = "null";

/// Capture engine that never produces frames
pub struct NullCapture {
    running: AtomicBool,
    output: SharedRingBuffer,
}

impl NullCapture {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            output: create_shared_buffer(RING_BUFFER_CAPACITY),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for NullCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureEngine for NullCapture {
    fn name(&self) -> &str {
        NULL_BACKEND
    }

    fn start(&self, priority: ThreadPriority) -> Result<(), AudioError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AudioError::AlreadyRunning);
        }
        tracing::info!(?priority, "Null capture started");
        Ok(())
    }

    fn output(&self) -> SharedRingBuffer {
        self.output.clone()
    }
}

/// Playback engine that buffers frames per source and never plays them
pub struct NullPlayback {
    running: AtomicBool,
    buffers: Arc<BufferTable>,
}

impl NullPlayback {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            buffers: Arc::new(BufferTable::default()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for NullPlayback {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackEngine for NullPlayback {
    fn name(&self) -> &str {
        NULL_BACKEND
    }

    fn start(&self, priority: ThreadPriority) -> Result<(), AudioError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AudioError::AlreadyRunning);
        }
        tracing::info!(?priority, "Null playback started");
        Ok(())
    }

    fn add_frame_to_buffer(
        &self,
        source: SourceId,
        payload: Bytes,
        sequence: u64,
        message_type: MessageType,
    ) {
        self.buffers.push(
            source,
            BufferedFrame {
                sequence,
                payload,
                message_type,
            },
        );
    }

    fn remove_buffer(&self, source: SourceId) {
        self.buffers.remove(source);
    }

    fn buffers(&self) -> Option<Arc<BufferTable>> {
        Some(self.buffers.clone())
    }
}

impl Drop for NullPlayback {
    fn drop(&mut self) {
        tracing::debug!(sources = self.buffers.sources().len(), "Null playback stopped");
    }
}
