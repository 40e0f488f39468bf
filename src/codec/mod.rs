//! Audio codec discovery and selection
//!
//! Codec math lives in external libraries. This module only decides which
//! codecs are usable in this process and which one to encode with once the
//! server has announced what it supports.

pub mod backend;
pub mod legacy;
#[cfg(feature = "opus-codec")]
pub mod opus_codec;
pub mod registry;

pub use backend::{CodecBackend, SystemCodecBackend};
pub use registry::{CodecChoice, CodecRegistry, Negotiation};

/// Codec families understood by the voice protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecFamily {
    Opus,
    /// The legacy CELT family, identified by bitstream version
    Celt,
}

/// CELT 0.7.0 bitstream version, the protocol's "alpha" codec
pub const CELT_0_7_0_BITSTREAM: i32 = 0x8000_000Bu32 as i32;

/// CELT 0.11.0 bitstream version, the protocol's "beta" codec
pub const CELT_0_11_0_BITSTREAM: i32 = 0x8000_0010u32 as i32;

/// Capability record of a discovered codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecDescriptor {
    pub family: CodecFamily,
    pub bitstream_version: i32,
    pub valid: bool,
}

/// A loaded codec implementation.
///
/// Instances are created by a [`CodecBackend`] and, once they pass
/// [`AudioCodec::is_valid`], owned by the [`CodecRegistry`] until shutdown.
pub trait AudioCodec: Send + Sync {
    fn family(&self) -> CodecFamily;

    /// Bitstream version; Opus has a single bitstream and reports 0
    fn bitstream_version(&self) -> i32;

    /// Self-check run right after construction
    fn is_valid(&self) -> bool;

    /// Library version string, for diagnostics
    fn library_version(&self) -> &str;

    /// Log what this codec can do
    fn report(&self) {
        tracing::info!(
            family = ?self.family(),
            bitstream = format_args!("{:#x}", self.bitstream_version()),
            version = self.library_version(),
            "Codec loaded"
        );
    }

    fn descriptor(&self) -> CodecDescriptor {
        CodecDescriptor {
            family: self.family(),
            bitstream_version: self.bitstream_version(),
            valid: self.is_valid(),
        }
    }
}
