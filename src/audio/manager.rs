//! Start/stop of the capture and playback engines
//!
//! One canonical slot per engine kind. Starting retires whatever the slot
//! held before installing the new engine; stopping runs the retire protocol
//! from [`super::slot`], so engines are always destroyed on the thread that
//! stopped them.

use std::sync::Arc;

use parking_lot::Mutex;

use super::engine::{CaptureEngine, CaptureHandle, PlaybackEngine, PlaybackHandle};
use super::null::{NullCapture, NullPlayback, NULL_BACKEND};
use super::priority::ThreadPriority;
use super::registrar::EngineRegistrar;
use super::slot::{is_sole_owner, retire, spin_until, EngineSlot};
use crate::config::DeviceConfig;

/// Capture is the most latency sensitive path
pub const CAPTURE_PRIORITY: ThreadPriority = ThreadPriority::Highest;
pub const PLAYBACK_PRIORITY: ThreadPriority = ThreadPriority::High;

/// Owns the canonical capture and playback slots
pub struct EngineManager {
    capture: Arc<EngineSlot<dyn CaptureEngine>>,
    playback: Arc<EngineSlot<dyn PlaybackEngine>>,
    capture_backends: EngineRegistrar<dyn CaptureEngine>,
    playback_backends: EngineRegistrar<dyn PlaybackEngine>,
    // Serialize start/stop per engine kind; lock capture before playback
    capture_control: Mutex<()>,
    playback_control: Mutex<()>,
}

impl EngineManager {
    pub fn new(
        capture_backends: EngineRegistrar<dyn CaptureEngine>,
        playback_backends: EngineRegistrar<dyn PlaybackEngine>,
    ) -> Self {
        Self {
            capture: Arc::new(EngineSlot::new()),
            playback: Arc::new(EngineSlot::new()),
            capture_backends,
            playback_backends,
            capture_control: Mutex::new(()),
            playback_control: Mutex::new(()),
        }
    }

    /// Manager with every backend compiled into this build: `null` always,
    /// `cpal` with the `cpal-backend` feature (preferred)
    pub fn with_default_backends(devices: &DeviceConfig) -> Self {
        let mut capture: EngineRegistrar<dyn CaptureEngine> = EngineRegistrar::new();
        let mut playback: EngineRegistrar<dyn PlaybackEngine> = EngineRegistrar::new();

        capture.register(NULL_BACKEND, 0, || {
            Some(Arc::new(NullCapture::new()) as CaptureHandle)
        });
        playback.register(NULL_BACKEND, 0, || {
            Some(Arc::new(NullPlayback::new()) as PlaybackHandle)
        });

        #[cfg(feature = "cpal-backend")]
        {
            use super::cpal_backend::{CpalCapture, CpalPlayback, CPAL_BACKEND};

            let input_device = devices.input_device.clone();
            capture.register(CPAL_BACKEND, 10, move || {
                CpalCapture::new(input_device.clone()).map(|e| Arc::new(e) as CaptureHandle)
            });
            let output_device = devices.output_device.clone();
            playback.register(CPAL_BACKEND, 10, move || {
                CpalPlayback::new(output_device.clone()).map(|e| Arc::new(e) as PlaybackHandle)
            });
        }
        #[cfg(not(feature = "cpal-backend"))]
        let _ = devices;

        Self::new(capture, playback)
    }

    /// Start a capture engine for `choice`. Returns `false` and leaves the
    /// slot empty when no engine could be created or started.
    pub fn start_capture(&self, choice: &str) -> bool {
        let _control = self.capture_control.lock();
        self.capture.retire();

        let Some(engine) = self.capture_backends.new_from_choice(choice) else {
            tracing::warn!(choice, "No capture engine available");
            return false;
        };

        if let Err(e) = engine.start(CAPTURE_PRIORITY) {
            tracing::error!(backend = engine.name(), "Failed to start capture: {}", e);
            retire(Some(engine));
            return false;
        }

        tracing::info!(backend = engine.name(), "Capture started");
        self.capture.install(engine);
        true
    }

    /// Start a playback engine for `choice`. Returns `false` and leaves the
    /// slot empty when no engine could be created or started.
    pub fn start_playback(&self, choice: &str) -> bool {
        let _control = self.playback_control.lock();
        self.playback.retire();

        let Some(engine) = self.playback_backends.new_from_choice(choice) else {
            tracing::warn!(choice, "No playback engine available");
            return false;
        };

        if let Err(e) = engine.start(PLAYBACK_PRIORITY) {
            tracing::error!(backend = engine.name(), "Failed to start playback: {}", e);
            retire(Some(engine));
            return false;
        }

        tracing::info!(backend = engine.name(), "Playback started");
        self.playback.install(engine);
        true
    }

    /// Retire the capture engine; returns once it has been destroyed on
    /// this thread
    pub fn stop_capture(&self) {
        let _control = self.capture_control.lock();
        self.capture.retire();
        tracing::debug!("Capture stopped");
    }

    /// Retire the playback engine; returns once it has been destroyed on
    /// this thread
    pub fn stop_playback(&self) {
        let _control = self.playback_control.lock();
        self.playback.retire();
        tracing::debug!("Playback stopped");
    }

    /// Start capture from `input` and playback to `output`
    pub fn start(&self, input: &str, output: &str) -> (bool, bool) {
        (self.start_capture(input), self.start_playback(output))
    }

    /// Stop both engines, waiting on both handles in a single loop
    pub fn stop(&self) {
        let _capture_control = self.capture_control.lock();
        let _playback_control = self.playback_control.lock();

        let capture = self.capture.take();
        let playback = self.playback.take();

        spin_until(|| is_sole_owner(&capture) && is_sole_owner(&playback));

        drop(capture);
        drop(playback);
        tracing::debug!("Audio engines stopped");
    }

    /// Shared copy of the running capture engine
    pub fn capture(&self) -> Option<CaptureHandle> {
        self.capture.get()
    }

    /// Shared copy of the running playback engine
    pub fn playback(&self) -> Option<PlaybackHandle> {
        self.playback.get()
    }

    /// The playback slot itself, for feeds that look the engine up per call
    pub fn playback_slot(&self) -> Arc<EngineSlot<dyn PlaybackEngine>> {
        self.playback.clone()
    }

    pub fn is_capturing(&self) -> bool {
        !self.capture.is_empty()
    }

    pub fn is_playing(&self) -> bool {
        !self.playback.is_empty()
    }
}

impl Drop for EngineManager {
    fn drop(&mut self) {
        self.stop();
    }
}
