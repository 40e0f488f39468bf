//! Opus codec self-check
//!
//! Loads libopus through the `opus` crate and keeps a VoIP-tuned encoder and
//! decoder pair for the process lifetime.

use bytes::Bytes;
use opus::{Application, Bitrate, Channels, Decoder, Encoder};
use parking_lot::Mutex;

use super::{AudioCodec, CodecFamily};
use crate::constants::{OPUS_BITRATE, OPUS_PACKET_LOSS_PERC, SAMPLE_RATE};
use crate::error::CodecError;

/// Opus has one bitstream; the descriptor reports this value
pub const OPUS_BITSTREAM_VERSION: i32 = 0;

/// Maximum size of one encoded frame
const MAX_PACKET_SIZE: usize = 4000;

/// 120ms at 48kHz mono, the largest frame Opus can decode into
const MAX_DECODE_SAMPLES: usize = SAMPLE_RATE as usize * 120 / 1000;

struct OpusState {
    encoder: Encoder,
    decoder: Decoder,
    encode_buffer: Vec<u8>,
    decode_buffer: Vec<f32>,
}

/// Opus codec instance
pub struct OpusCodec {
    state: Option<Mutex<OpusState>>,
    version: String,
}

impl OpusCodec {
    /// Construct the encoder and decoder. Failure is not an error here: the
    /// instance reports `is_valid() == false` and the registry drops it.
    pub fn load() -> Self {
        let version = opus::version().to_string();
        match Self::open() {
            Ok(state) => Self {
                state: Some(Mutex::new(state)),
                version,
            },
            Err(e) => {
                tracing::debug!("Opus self-check failed: {}", e);
                Self {
                    state: None,
                    version,
                }
            }
        }
    }

    fn open() -> Result<OpusState, CodecError> {
        let mut encoder = Encoder::new(SAMPLE_RATE, Channels::Mono, Application::Voip)
            .map_err(|e| CodecError::Init(e.to_string()))?;

        encoder
            .set_bitrate(Bitrate::Bits(OPUS_BITRATE))
            .map_err(|e| CodecError::Init(format!("Failed to set bitrate: {}", e)))?;
        encoder
            .set_vbr(true)
            .map_err(|e| CodecError::Init(format!("Failed to set VBR: {}", e)))?;
        encoder
            .set_inband_fec(true)
            .map_err(|e| CodecError::Init(format!("Failed to set FEC: {}", e)))?;
        encoder
            .set_packet_loss_perc(OPUS_PACKET_LOSS_PERC)
            .map_err(|e| CodecError::Init(format!("Failed to set packet loss: {}", e)))?;

        let decoder = Decoder::new(SAMPLE_RATE, Channels::Mono)
            .map_err(|e| CodecError::Init(e.to_string()))?;

        Ok(OpusState {
            encoder,
            decoder,
            encode_buffer: vec![0u8; MAX_PACKET_SIZE],
            decode_buffer: vec![0.0f32; MAX_DECODE_SAMPLES],
        })
    }

    /// Encode one frame of mono f32 samples
    pub fn encode(&self, samples: &[f32]) -> Result<Bytes, CodecError> {
        let state = self.state.as_ref().ok_or(CodecError::NotInitialized)?;
        let mut state = state.lock();
        let OpusState {
            encoder,
            encode_buffer,
            ..
        } = &mut *state;

        let size = encoder
            .encode_float(samples, encode_buffer)
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;
        Ok(Bytes::copy_from_slice(&encode_buffer[..size]))
    }

    /// Decode one packet; an empty packet runs packet loss concealment
    pub fn decode(&self, data: &[u8]) -> Result<Vec<f32>, CodecError> {
        let state = self.state.as_ref().ok_or(CodecError::NotInitialized)?;
        let mut state = state.lock();
        let OpusState {
            decoder,
            decode_buffer,
            ..
        } = &mut *state;

        let samples = decoder
            .decode_float(data, decode_buffer, false)
            .map_err(|e| CodecError::DecodingFailed(e.to_string()))?;
        Ok(decode_buffer[..samples].to_vec())
    }
}

impl AudioCodec for OpusCodec {
    fn family(&self) -> CodecFamily {
        CodecFamily::Opus
    }

    fn bitstream_version(&self) -> i32 {
        OPUS_BITSTREAM_VERSION
    }

    fn is_valid(&self) -> bool {
        self.state.is_some()
    }

    fn library_version(&self) -> &str {
        &self.version
    }
}
