//! Process-wide audio state
//!
//! [`AudioContext`] owns everything the voice pipeline shares across
//! threads: the configuration, the codec registry and the engine manager.
//! It is created once by the client and passed around explicitly.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{RwLock, RwLockReadGuard};

use crate::audio::EngineManager;
use crate::codec::{CodecBackend, CodecChoice, CodecRegistry, Negotiation};
use crate::config::AppConfig;
use crate::error::CodecError;
use crate::loopback::{LoopbackUser, RecordFeed};

pub struct AudioContext {
    config: AppConfig,
    codecs: RwLock<CodecRegistry>,
    engines: EngineManager,
    initialized: AtomicBool,
}

impl AudioContext {
    /// Context with every backend compiled into this build
    pub fn new(config: AppConfig) -> Self {
        let engines = EngineManager::with_default_backends(&config.devices);
        Self::with_engines(config, engines)
    }

    pub fn with_engines(config: AppConfig, engines: EngineManager) -> Self {
        Self {
            config,
            codecs: RwLock::new(CodecRegistry::new()),
            engines,
            initialized: AtomicBool::new(false),
        }
    }

    /// Load the configuration from its default location
    pub fn from_default_config() -> crate::Result<Self> {
        Ok(Self::new(AppConfig::load_or_default()?))
    }

    /// Discover codecs. Later calls are ignored until [`shutdown`].
    ///
    /// [`shutdown`]: AudioContext::shutdown
    pub fn init(&self, backend: &dyn CodecBackend) {
        let mut codecs = self.codecs.write();
        if self.initialized.load(Ordering::Acquire) {
            tracing::debug!("Audio context already initialized");
            return;
        }

        codecs.initialize(backend, &self.config.codec);
        self.initialized.store(true, Ordering::Release);
        tracing::info!(codecs = ?codecs.descriptors(), "Audio context initialized");
    }

    /// Stop both engines, then release every codec
    pub fn shutdown(&self) {
        self.engines.stop();

        let mut codecs = self.codecs.write();
        codecs.destroy();
        self.initialized.store(false, Ordering::Release);
        tracing::info!("Audio context shut down");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Start the configured capture and playback backends
    pub fn start_audio(&self) -> (bool, bool) {
        let devices = &self.config.devices;
        self.engines.start(&devices.input, &devices.output)
    }

    /// Pick the codec to encode with for the server's announcement
    pub fn select_codec(&self, negotiation: &Negotiation) -> Result<CodecChoice, CodecError> {
        if !self.is_initialized() {
            return Err(CodecError::NotInitialized);
        }
        self.codecs.read().select(negotiation)
    }

    /// Read access to the codec registry. Holding the guard blocks
    /// [`AudioContext::shutdown`].
    pub fn codecs(&self) -> RwLockReadGuard<'_, CodecRegistry> {
        self.codecs.read()
    }

    pub fn engines(&self) -> &EngineManager {
        &self.engines
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Self-test user with the configured simulated link
    pub fn loopback_user(&self) -> LoopbackUser {
        LoopbackUser::new(self.engines.playback_slot(), self.config.loopback)
    }

    pub fn record_feed(&self) -> RecordFeed {
        RecordFeed::new(self.engines.playback_slot())
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        if self.is_initialized() {
            self.shutdown();
        }
    }
}
