//! Test doubles for codecs and engines

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::audio::buffer::{create_shared_buffer, SharedRingBuffer};
use crate::audio::engine::{CaptureEngine, PlaybackEngine, SourceId};
use crate::audio::priority::ThreadPriority;
use crate::codec::{AudioCodec, CodecBackend, CodecFamily};
use crate::error::AudioError;
use crate::protocol::MessageType;

/// Codec with a scripted self-check result
pub struct FakeCodec {
    family: CodecFamily,
    bitstream_version: i32,
    valid: bool,
    version: String,
    live: Arc<AtomicUsize>,
}

impl FakeCodec {
    fn new(
        family: CodecFamily,
        bitstream_version: i32,
        valid: bool,
        version: &str,
        live: &Arc<AtomicUsize>,
    ) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            family,
            bitstream_version,
            valid,
            version: version.to_string(),
            live: live.clone(),
        }
    }
}

impl Drop for FakeCodec {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AudioCodec for FakeCodec {
    fn family(&self) -> CodecFamily {
        self.family
    }

    fn bitstream_version(&self) -> i32 {
        self.bitstream_version
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn library_version(&self) -> &str {
        &self.version
    }
}

/// Backend whose candidates are configured per test. Records the order in
/// which candidates were opened and how many are still alive.
#[derive(Default)]
pub struct FakeCodecBackend {
    modern: Option<bool>,
    external: Option<(i32, bool)>,
    builtin: HashMap<String, (i32, bool)>,
    opened: Mutex<Vec<String>>,
    live: Arc<AtomicUsize>,
}

impl FakeCodecBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn modern(mut self, valid: bool) -> Self {
        self.modern = Some(valid);
        self
    }

    pub fn external(mut self, bitstream_version: i32, valid: bool) -> Self {
        self.external = Some((bitstream_version, valid));
        self
    }

    pub fn builtin(mut self, version: &str, bitstream_version: i32, valid: bool) -> Self {
        self.builtin
            .insert(version.to_string(), (bitstream_version, valid));
        self
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    /// Codec instances not yet dropped
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl CodecBackend for FakeCodecBackend {
    fn open_modern(&self) -> Option<Box<dyn AudioCodec>> {
        let valid = self.modern?;
        self.opened.lock().push("opus".to_string());
        Some(Box::new(FakeCodec::new(
            CodecFamily::Opus,
            0,
            valid,
            "fake-opus",
            &self.live,
        )))
    }

    fn open_external_legacy(&self) -> Option<Box<dyn AudioCodec>> {
        let (bitstream_version, valid) = self.external?;
        self.opened.lock().push("external".to_string());
        Some(Box::new(FakeCodec::new(
            CodecFamily::Celt,
            bitstream_version,
            valid,
            "external",
            &self.live,
        )))
    }

    fn open_builtin_legacy(&self, version: &str) -> Box<dyn AudioCodec> {
        self.opened.lock().push(version.to_string());
        // Unconfigured versions fail their self-check
        let (bitstream_version, valid) = self.builtin.get(version).copied().unwrap_or((0, false));
        Box::new(FakeCodec::new(
            CodecFamily::Celt,
            bitstream_version,
            valid,
            version,
            &self.live,
        ))
    }
}

/// One frame as seen by [`RecordingPlayback::add_frame_to_buffer`]
pub type RecordedFrame = (SourceId, Bytes, u64, MessageType);

#[derive(Default)]
struct RecorderState {
    priorities: Vec<ThreadPriority>,
    frames: Vec<RecordedFrame>,
    removed: Vec<SourceId>,
    dropped_on: Vec<ThreadId>,
    live: usize,
}

/// Shared observation point for recording engines
#[derive(Clone, Default)]
pub struct EngineRecorder {
    state: Arc<Mutex<RecorderState>>,
}

impl EngineRecorder {
    pub fn priorities(&self) -> Vec<ThreadPriority> {
        self.state.lock().priorities.clone()
    }

    pub fn frames(&self) -> Vec<RecordedFrame> {
        self.state.lock().frames.clone()
    }

    pub fn removed(&self) -> Vec<SourceId> {
        self.state.lock().removed.clone()
    }

    pub fn drops(&self) -> usize {
        self.state.lock().dropped_on.len()
    }

    /// Thread each engine was destroyed on, in drop order
    pub fn dropped_on(&self) -> Vec<ThreadId> {
        self.state.lock().dropped_on.clone()
    }

    /// Engines created and not yet dropped
    pub fn live(&self) -> usize {
        self.state.lock().live
    }

    fn created(&self) {
        self.state.lock().live += 1;
    }

    fn destroyed(&self) {
        let mut state = self.state.lock();
        state.live -= 1;
        state.dropped_on.push(thread::current().id());
    }
}

pub struct RecordingCapture {
    recorder: EngineRecorder,
    fail_start: bool,
    output: SharedRingBuffer,
}

impl RecordingCapture {
    pub fn new(recorder: EngineRecorder) -> Self {
        recorder.created();
        Self {
            recorder,
            fail_start: false,
            output: create_shared_buffer(4),
        }
    }

    /// Capture engine whose start always fails
    pub fn failing(recorder: EngineRecorder) -> Self {
        let mut capture = Self::new(recorder);
        capture.fail_start = true;
        capture
    }
}

impl CaptureEngine for RecordingCapture {
    fn name(&self) -> &str {
        "recording"
    }

    fn start(&self, priority: ThreadPriority) -> Result<(), AudioError> {
        if self.fail_start {
            return Err(AudioError::DeviceNotFound("recording".into()));
        }
        self.recorder.state.lock().priorities.push(priority);
        Ok(())
    }

    fn output(&self) -> SharedRingBuffer {
        self.output.clone()
    }
}

impl Drop for RecordingCapture {
    fn drop(&mut self) {
        self.recorder.destroyed();
    }
}

/// Playback engine that records everything it is handed
pub struct RecordingPlayback {
    recorder: EngineRecorder,
}

impl RecordingPlayback {
    pub fn new(recorder: EngineRecorder) -> Self {
        recorder.created();
        Self { recorder }
    }
}

impl PlaybackEngine for RecordingPlayback {
    fn name(&self) -> &str {
        "recording"
    }

    fn start(&self, priority: ThreadPriority) -> Result<(), AudioError> {
        self.recorder.state.lock().priorities.push(priority);
        Ok(())
    }

    fn add_frame_to_buffer(
        &self,
        source: SourceId,
        payload: Bytes,
        sequence: u64,
        message_type: MessageType,
    ) {
        self.recorder
            .state
            .lock()
            .frames
            .push((source, payload, sequence, message_type));
    }

    fn remove_buffer(&self, source: SourceId) {
        self.recorder.state.lock().removed.push(source);
    }
}

impl Drop for RecordingPlayback {
    fn drop(&mut self) {
        self.recorder.destroyed();
    }
}
