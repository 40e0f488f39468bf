//! Legacy CELT codec candidates
//!
//! The built-in CELT decoder is identified by the library version it was
//! built from. This build links no CELT library, so every built-in candidate
//! fails its self-check and the registry discards it. Clients that ship a
//! CELT decoder provide it through their own [`CodecBackend`].
//!
//! [`CodecBackend`]: super::CodecBackend

use super::{AudioCodec, CodecFamily, CELT_0_7_0_BITSTREAM};

/// Current built-in CELT version
pub const CELT_CURRENT_VERSION: &str = "0.7.0";

/// Compatibility version tried when the current one fails
pub const CELT_COMPAT_VERSION: &str = "0.0.0";

/// Built-in CELT decoder candidate for one library version string
#[derive(Debug)]
pub struct BuiltinCelt {
    version: String,
    loaded: bool,
}

impl BuiltinCelt {
    pub fn load(version: &str) -> Self {
        tracing::debug!(version, "No CELT library linked, candidate unavailable");
        Self {
            version: version.to_string(),
            loaded: false,
        }
    }
}

impl AudioCodec for BuiltinCelt {
    fn family(&self) -> CodecFamily {
        CodecFamily::Celt
    }

    fn bitstream_version(&self) -> i32 {
        // Both 0.7.0 and the 0.0.0 compatibility build speak the 0.7 bitstream
        CELT_0_7_0_BITSTREAM
    }

    fn is_valid(&self) -> bool {
        self.loaded
    }

    fn library_version(&self) -> &str {
        &self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_candidates_are_unavailable() {
        for version in [CELT_CURRENT_VERSION, CELT_COMPAT_VERSION] {
            let codec = BuiltinCelt::load(version);
            assert!(!codec.is_valid());
            assert_eq!(codec.library_version(), version);
            assert_eq!(codec.descriptor().family, CodecFamily::Celt);
        }
    }
}
