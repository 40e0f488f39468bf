//! Audio engines and their lifecycle

pub mod buffer;
#[cfg(feature = "cpal-backend")]
pub mod cpal_backend;
#[cfg(feature = "cpal-backend")]
pub mod device;
pub mod engine;
pub mod manager;
pub mod null;
pub mod priority;
pub mod registrar;
pub mod slot;
pub mod source_buffer;

pub use buffer::{AudioFrame, RingBuffer, SharedRingBuffer};
pub use engine::{CaptureEngine, CaptureHandle, PlaybackEngine, PlaybackHandle, SourceId};
pub use manager::EngineManager;
pub use priority::ThreadPriority;
pub use registrar::EngineRegistrar;
pub use slot::EngineSlot;
pub use source_buffer::{BufferTable, BufferedFrame, SourceBuffer, SourceBufferStats};
