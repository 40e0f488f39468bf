//! Process-wide codec registry
//!
//! Checked once at startup, read during the session, torn down at shutdown.
//! Mutation only happens in [`CodecRegistry::initialize`] and
//! [`CodecRegistry::destroy`]; the owner guarantees no lookups run
//! concurrently with either.

use std::collections::BTreeMap;

use super::legacy::{CELT_COMPAT_VERSION, CELT_CURRENT_VERSION};
use super::{
    AudioCodec, CodecBackend, CodecDescriptor, CodecFamily, CELT_0_11_0_BITSTREAM,
    CELT_0_7_0_BITSTREAM,
};
use crate::config::CodecConfig;
use crate::error::CodecError;
use crate::protocol::MessageType;

/// Codec capabilities announced by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiation {
    /// Every client in the channel can decode Opus
    pub opus_allowed: bool,
    /// Bitstream version for the alpha legacy slot
    pub alpha: i32,
    /// Bitstream version for the beta legacy slot
    pub beta: i32,
    /// Try the alpha slot before the beta slot
    pub prefer_alpha: bool,
}

impl Default for Negotiation {
    fn default() -> Self {
        Self {
            opus_allowed: true,
            alpha: CELT_0_7_0_BITSTREAM,
            beta: CELT_0_11_0_BITSTREAM,
            prefer_alpha: true,
        }
    }
}

/// Result of codec selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecChoice {
    pub family: CodecFamily,
    pub bitstream_version: i32,
    /// Message type to stamp into outgoing packets
    pub message_type: MessageType,
}

/// Owns every codec that passed its self-check
#[derive(Default)]
pub struct CodecRegistry {
    preferred: Option<Box<dyn AudioCodec>>,
    legacy: BTreeMap<i32, Box<dyn AudioCodec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check codecs in priority order: Opus first, then the legacy family
    /// unless disabled. Ending up with no codec at all is not an error.
    pub fn initialize(&mut self, backend: &dyn CodecBackend, config: &CodecConfig) {
        match backend.open_modern() {
            Some(codec) if codec.is_valid() => {
                codec.report();
                self.preferred = Some(codec);
            }
            Some(_) => {
                tracing::error!(
                    "Failed to load Opus, it will not be available for encoding/decoding audio"
                );
            }
            None => tracing::debug!("Opus support not compiled in"),
        }

        if config.disable_legacy {
            tracing::info!("Legacy codec disabled by configuration");
            return;
        }

        if let Some(codec) = backend.open_external_legacy() {
            self.register_legacy(codec);
            return;
        }

        let current = backend.open_builtin_legacy(CELT_CURRENT_VERSION);
        if !self.register_legacy(current) {
            let compat = backend.open_builtin_legacy(CELT_COMPAT_VERSION);
            self.register_legacy(compat);
        }
    }

    /// Keep `codec` if it is valid and its bitstream version is new.
    /// A rejected candidate is dropped before this returns.
    fn register_legacy(&mut self, codec: Box<dyn AudioCodec>) -> bool {
        if !codec.is_valid() {
            tracing::debug!(version = codec.library_version(), "Legacy codec rejected");
            return false;
        }

        let version = codec.bitstream_version();
        if self.legacy.contains_key(&version) {
            tracing::debug!(
                bitstream = format_args!("{:#x}", version),
                "Legacy codec version already registered"
            );
            return false;
        }

        codec.report();
        self.legacy.insert(version, codec);
        true
    }

    /// Release every codec instance
    pub fn destroy(&mut self) {
        self.preferred = None;
        self.legacy.clear();
    }

    pub fn preferred(&self) -> Option<&dyn AudioCodec> {
        self.preferred.as_deref()
    }

    pub fn legacy(&self, bitstream_version: i32) -> Option<&dyn AudioCodec> {
        self.legacy.get(&bitstream_version).map(|c| c.as_ref())
    }

    /// The legacy codec with the highest bitstream version
    pub fn highest_legacy(&self) -> Option<&dyn AudioCodec> {
        self.legacy
            .iter()
            .max_by_key(|(version, _)| **version as u32)
            .map(|(_, codec)| codec.as_ref())
    }

    pub fn legacy_versions(&self) -> Vec<i32> {
        self.legacy.keys().copied().collect()
    }

    pub fn descriptors(&self) -> Vec<CodecDescriptor> {
        self.preferred
            .iter()
            .chain(self.legacy.values())
            .map(|c| c.descriptor())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.preferred.is_none() && self.legacy.is_empty()
    }

    /// Pick the codec to encode with: Opus when allowed, then the preferred
    /// legacy slot, then the other one.
    pub fn select(&self, negotiation: &Negotiation) -> Result<CodecChoice, CodecError> {
        if negotiation.opus_allowed {
            if let Some(codec) = self.preferred() {
                return Ok(CodecChoice {
                    family: CodecFamily::Opus,
                    bitstream_version: codec.bitstream_version(),
                    message_type: MessageType::Opus,
                });
            }
        }

        let alpha = (negotiation.alpha, MessageType::CeltAlpha);
        let beta = (negotiation.beta, MessageType::CeltBeta);
        let order = if negotiation.prefer_alpha {
            [alpha, beta]
        } else {
            [beta, alpha]
        };

        order
            .into_iter()
            .find(|(version, _)| self.legacy.contains_key(version))
            .map(|(version, message_type)| CodecChoice {
                family: CodecFamily::Celt,
                bitstream_version: version,
                message_type,
            })
            .ok_or(CodecError::NoCodecAvailable)
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("descriptors", &self.descriptors())
            .finish()
    }
}
