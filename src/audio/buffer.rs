//! Lock-free ring buffer for PCM frames
//!
//! Single producer, single consumer: the capture callback pushes, the
//! encoder pops (and the decoder/mixer pushes, the playback callback pops).

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Block of interleaved PCM samples
#[derive(Clone, Debug)]
pub struct AudioFrame {
    /// Interleaved audio samples (f32)
    pub samples: Vec<f32>,
    /// Number of channels
    pub channels: u16,
    /// Capture time in microseconds since the engine started
    pub timestamp: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, channels: u16, timestamp: u64, sequence: u32) -> Self {
        Self {
            samples,
            channels,
            timestamp,
            sequence,
        }
    }

    /// Samples per channel
    pub fn samples_per_channel(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

/// Bounded lock-free queue of frames with overflow/underrun counters
pub struct RingBuffer {
    queue: ArrayQueue<AudioFrame>,
    overflow_count: AtomicUsize,
    underrun_count: AtomicUsize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            overflow_count: AtomicUsize::new(0),
            underrun_count: AtomicUsize::new(0),
        }
    }

    /// Push a frame; `false` when full (the frame is dropped)
    pub fn push(&self, frame: AudioFrame) -> bool {
        match self.queue.push(frame) {
            Ok(()) => true,
            Err(_) => {
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Pop a frame, counting an underrun when empty
    pub fn pop(&self) -> Option<AudioFrame> {
        match self.queue.pop() {
            Some(frame) => Some(frame),
            None => {
                self.underrun_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }
}

/// Thread-safe handle to a ring buffer
pub type SharedRingBuffer = Arc<RingBuffer>;

pub fn create_shared_buffer(capacity: usize) -> SharedRingBuffer {
    Arc::new(RingBuffer::new(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_fifo() {
        let buffer = RingBuffer::new(4);

        assert!(buffer.push(AudioFrame::new(vec![0.0; 480], 1, 0, 0)));
        assert!(buffer.push(AudioFrame::new(vec![1.0; 480], 1, 10_000, 1)));
        assert_eq!(buffer.len(), 2);

        assert_eq!(buffer.pop().unwrap().sequence, 0);
        assert_eq!(buffer.pop().unwrap().sequence, 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_overflow_and_underrun_are_counted() {
        let buffer = RingBuffer::new(1);
        assert!(buffer.push(AudioFrame::new(vec![], 1, 0, 0)));
        assert!(!buffer.push(AudioFrame::new(vec![], 1, 0, 1)));
        assert_eq!(buffer.overflow_count(), 1);

        buffer.pop();
        assert!(buffer.pop().is_none());
        assert_eq!(buffer.underrun_count(), 1);
    }

    #[test]
    fn test_samples_per_channel() {
        let frame = AudioFrame::new(vec![0.0; 960], 2, 0, 0);
        assert_eq!(frame.samples_per_channel(), 480);
    }
}
