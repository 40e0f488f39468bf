//! Codec construction seam used by the registry's discovery chain

use super::legacy::BuiltinCelt;
use super::AudioCodec;

/// Constructs codec candidates for [`CodecRegistry::initialize`].
///
/// Candidates are returned unchecked; the registry runs `is_valid` and drops
/// whatever fails.
///
/// [`CodecRegistry::initialize`]: super::CodecRegistry::initialize
pub trait CodecBackend {
    /// The modern (Opus) codec, `None` when not compiled in
    fn open_modern(&self) -> Option<Box<dyn AudioCodec>>;

    /// A dedicated external CELT decoder, `None` when not compiled in
    fn open_external_legacy(&self) -> Option<Box<dyn AudioCodec>>;

    /// The built-in CELT decoder for a library version string
    fn open_builtin_legacy(&self, version: &str) -> Box<dyn AudioCodec>;
}

/// Backend for the codecs compiled into this build
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCodecBackend;

impl CodecBackend for SystemCodecBackend {
    fn open_modern(&self) -> Option<Box<dyn AudioCodec>> {
        #[cfg(feature = "opus-codec")]
        {
            Some(Box::new(super::opus_codec::OpusCodec::load()))
        }
        #[cfg(not(feature = "opus-codec"))]
        {
            None
        }
    }

    fn open_external_legacy(&self) -> Option<Box<dyn AudioCodec>> {
        None
    }

    fn open_builtin_legacy(&self, version: &str) -> Box<dyn AudioCodec> {
        Box::new(BuiltinCelt::load(version))
    }
}
