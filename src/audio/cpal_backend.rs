//! cpal-backed capture and playback engines
//!
//! Each engine owns one stream thread. The stream is built on that thread
//! (cpal streams are not `Send` everywhere) and lives until the engine is
//! dropped, which joins the thread. Dropping therefore has to happen on the
//! controlling thread, see [`crate::audio::slot`].

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use super::buffer::{create_shared_buffer, AudioFrame, SharedRingBuffer};
use super::device::{find_device, Direction};
use super::engine::{CaptureEngine, PlaybackEngine, SourceId};
use super::priority::ThreadPriority;
use super::source_buffer::{BufferTable, BufferedFrame};
use crate::constants::{RING_BUFFER_CAPACITY, SAMPLE_RATE};
use crate::error::AudioError;
use crate::protocol::MessageType;

pub const CPAL_BACKEND: &str = "cpal";

/// Stream thread bookkeeping shared by both engines
struct StreamThread {
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    error_rx: Receiver<AudioError>,
    error_tx: Sender<AudioError>,
}

impl StreamThread {
    fn new() -> Self {
        let (error_tx, error_rx) = bounded(16);
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
            error_rx,
            error_tx,
        }
    }

    /// Spawn `name`, raise its priority, build the stream with `build` and
    /// keep it playing until stopped.
    ///
    /// Returns once the stream is playing. If building or starting the
    /// stream fails, the thread is joined and the error returned.
    fn spawn<F>(&self, name: &str, priority: ThreadPriority, build: F) -> Result<(), AudioError>
    where
        F: FnOnce(Sender<AudioError>) -> Result<cpal::Stream, AudioError> + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AudioError::AlreadyRunning);
        }

        let running = self.running.clone();
        let error_tx = self.error_tx.clone();
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                priority.apply_to_current_thread();

                let stream = match build(error_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while running.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
                // Stream is dropped here, on its own thread
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                AudioError::ThreadSpawn(e.to_string())
            })?;

        // A disconnected channel means the thread died before reporting
        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(AudioError::StreamError(format!("{} exited during startup", name)))
        });

        match ready {
            Ok(()) => {
                *self.handle.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                let _ = handle.join();
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.try_recv().ok()
    }
}

/// Device default config with the pipeline sample rate
fn stream_config(device: &cpal::Device, direction: Direction) -> Result<StreamConfig, AudioError> {
    let default_config = match direction {
        Direction::Input => device.default_input_config(),
        Direction::Output => device.default_output_config(),
    }
    .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;

    Ok(StreamConfig {
        channels: default_config.channels(),
        sample_rate: cpal::SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    })
}

/// Microphone capture into a PCM ring buffer
pub struct CpalCapture {
    device_id: Option<String>,
    stream: StreamThread,
    output: SharedRingBuffer,
    sequence: Arc<AtomicU32>,
}

impl CpalCapture {
    /// `None` when the device does not exist
    pub fn new(device_id: Option<String>) -> Option<Self> {
        if let Err(e) = find_device(Direction::Input, device_id.as_deref()) {
            tracing::warn!("Capture device unavailable: {}", e);
            return None;
        }

        Some(Self {
            device_id,
            stream: StreamThread::new(),
            output: create_shared_buffer(RING_BUFFER_CAPACITY),
            sequence: Arc::new(AtomicU32::new(0)),
        })
    }

    pub fn check_errors(&self) -> Option<AudioError> {
        self.stream.check_errors()
    }
}

impl CaptureEngine for CpalCapture {
    fn name(&self) -> &str {
        CPAL_BACKEND
    }

    fn start(&self, priority: ThreadPriority) -> Result<(), AudioError> {
        let device_id = self.device_id.clone();
        let output = self.output.clone();
        let sequence = self.sequence.clone();

        self.stream.spawn("audio-capture", priority, move |error_tx| {
            let device = find_device(Direction::Input, device_id.as_deref())?;
            let config = stream_config(&device, Direction::Input)?;
            let channels = config.channels;
            let start_time = Instant::now();

            device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let timestamp = start_time.elapsed().as_micros() as u64;
                        let seq = sequence.fetch_add(1, Ordering::Relaxed);
                        // Overflow is counted by the ring buffer
                        let _ = output.push(AudioFrame::new(data.to_vec(), channels, timestamp, seq));
                    },
                    move |err| {
                        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                    },
                    None,
                )
                .map_err(|e| AudioError::StreamError(e.to_string()))
        })
    }

    fn output(&self) -> SharedRingBuffer {
        self.output.clone()
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stream.stop();
        tracing::debug!("Capture engine torn down");
    }
}

/// Speaker playback of decoded PCM, with per-source encoded frame buffers
/// for the decoder
pub struct CpalPlayback {
    device_id: Option<String>,
    stream: StreamThread,
    buffers: Arc<BufferTable>,
    pcm: SharedRingBuffer,
}

impl CpalPlayback {
    /// `None` when the device does not exist
    pub fn new(device_id: Option<String>) -> Option<Self> {
        if let Err(e) = find_device(Direction::Output, device_id.as_deref()) {
            tracing::warn!("Playback device unavailable: {}", e);
            return None;
        }

        Some(Self {
            device_id,
            stream: StreamThread::new(),
            buffers: Arc::new(BufferTable::default()),
            pcm: create_shared_buffer(RING_BUFFER_CAPACITY),
        })
    }

    /// Mixed PCM to play. Frames must use the device's channel count.
    pub fn pcm_input(&self) -> SharedRingBuffer {
        self.pcm.clone()
    }

    pub fn check_errors(&self) -> Option<AudioError> {
        self.stream.check_errors()
    }
}

impl PlaybackEngine for CpalPlayback {
    fn name(&self) -> &str {
        CPAL_BACKEND
    }

    fn start(&self, priority: ThreadPriority) -> Result<(), AudioError> {
        let device_id = self.device_id.clone();
        let pcm = self.pcm.clone();

        self.stream.spawn("audio-playback", priority, move |error_tx| {
            let device = find_device(Direction::Output, device_id.as_deref())?;
            let config = stream_config(&device, Direction::Output)?;

            let mut carry: Vec<f32> = Vec::new();
            let mut pos = 0;

            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut filled = 0;
                        while filled < data.len() {
                            if pos >= carry.len() {
                                match pcm.pop() {
                                    Some(frame) => {
                                        carry = frame.samples;
                                        pos = 0;
                                        continue;
                                    }
                                    None => break,
                                }
                            }
                            let n = (carry.len() - pos).min(data.len() - filled);
                            data[filled..filled + n].copy_from_slice(&carry[pos..pos + n]);
                            pos += n;
                            filled += n;
                        }
                        // Underrun: silence
                        data[filled..].fill(0.0);
                    },
                    move |err| {
                        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                    },
                    None,
                )
                .map_err(|e| AudioError::StreamError(e.to_string()))
        })
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

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.stream.stop();
        tracing::debug!("Playback engine torn down");
    }
}
