//! # Voice Pipeline
//!
//! Audio pipeline lifecycle for a voice chat client: codec discovery and
//! negotiation, a self-test loopback path and the start/stop protocol of
//! the capture and playback engines.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                          AudioContext (context)                          │
//! │                                                                          │
//! │  ┌──────────────────────┐     ┌──────────────────────────────────────┐   │
//! │  │ CodecRegistry        │     │ EngineManager (audio::manager)       │   │
//! │  │  (codec::registry)   │     │                                      │   │
//! │  │                      │     │  EngineRegistrar ── new_from_choice  │   │
//! │  │  Opus ──┐            │     │        │                             │   │
//! │  │  CELT ──┴─► select() │     │        ▼                             │   │
//! │  └──────────────────────┘     │  ┌──────────────┐  ┌──────────────┐  │   │
//! │                               │  │ capture slot │  │playback slot │  │   │
//! │                               │  └──────┬───────┘  └──────┬───────┘  │   │
//! │                               └─────────┼─────────────────┼──────────┘   │
//! │                                         │                 │              │
//! └─────────────────────────────────────────┼─────────────────┼──────────────┘
//!                                           │                 │ Arc copies
//!                                           ▼                 │
//!                                    ┌─────────────┐          │
//!                                    │   Capture   │          │
//!                                    │   Engine    │          │
//!                                    └──────┬──────┘          │
//!                                           │ PCM             │
//!                                           ▼                 │
//!                                    ┌─────────────┐          │
//!                                    │  Encoder    │          │
//!                                    └──────┬──────┘          │
//!                    [flags|seq|payload]    │                 │
//!                 ┌─────────────────────────┼──────────┐      │
//!                 ▼                         ▼          ▼      ▼
//!          ┌─────────────┐          ┌─────────────┐  ┌─────────────────────┐
//!          │  Network    │          │LoopbackUser │  │    RecordFeed       │
//!          │ (external)  │          │ loss/jitter │  │    (no delay)       │
//!          └─────────────┘          └──────┬──────┘  └──────────┬──────────┘
//!                                          │ fetch_frames()     │
//!                                          ▼                    ▼
//!                              ┌─────────────────────────────────────────┐
//!                              │ PlaybackEngine::add_frame_to_buffer     │
//!                              │   per-source SourceBuffer (BufferTable) │
//!                              └─────────────────────────────────────────┘
//! ```
//!
//! Engines are reference counted and copied out of their slot by whoever
//! needs them. Stopping an engine waits until the stopping thread holds the
//! last copy and destroys it there, see [`audio::slot`].

pub mod audio;
pub mod clock;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod loopback;
pub mod protocol;

#[cfg(test)]
pub(crate) mod testing;

pub use context::AudioContext;
pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Sample rate of every engine and codec
    pub const SAMPLE_RATE: u32 = 48000;

    /// Samples per channel in one 10 ms frame
    pub const FRAME_SIZE: usize = 480;

    /// Opus bitrate in bits per second
    pub const OPUS_BITRATE: i32 = 40_000;

    /// Expected packet loss the Opus encoder prepares FEC for
    pub const OPUS_PACKET_LOSS_PERC: i32 = 5;

    /// Idle time after which the loopback stream counts as restarted
    pub const RESTART_THRESHOLD: Duration = Duration::from_millis(100);

    /// Loopback packets held back at most; the oldest go first when full
    pub const MAX_PENDING_PACKETS: usize = 512;

    /// Backend tried first for both engines
    pub const DEFAULT_BACKEND: &str = "cpal";

    /// Lock-free ring buffer capacity (in frames)
    pub const RING_BUFFER_CAPACITY: usize = 256;

    /// Per-source reorder slots, must be a power of 2
    pub const SOURCE_BUFFER_CAPACITY: usize = 64;
}
