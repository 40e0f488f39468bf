//! Per-source buffers of encoded voice frames
//!
//! Playback engines keep one [`SourceBuffer`] per talking source, keyed in a
//! [`BufferTable`]. Frames are slotted by sequence number so the decoder
//! pulls them in order regardless of arrival order.

use bytes::Bytes;
use dashmap::DashMap;

use super::engine::SourceId;
use crate::protocol::{MessageType, PLACEHOLDER_SEQUENCE};

/// One encoded frame waiting for the decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedFrame {
    pub sequence: u64,
    /// Flags byte followed by the codec payload
    pub payload: Bytes,
    pub message_type: MessageType,
}

impl BufferedFrame {
    /// The stream-restart sentinel
    pub fn is_placeholder(&self) -> bool {
        self.payload.is_empty() && self.sequence == PLACEHOLDER_SEQUENCE
    }
}

/// Sequence-indexed reorder buffer for a single source
pub struct SourceBuffer {
    /// Slots indexed by sequence modulo capacity
    slots: Vec<Option<BufferedFrame>>,
    capacity: usize,
    mask: usize,
    /// Next sequence the decoder expects, unset until the first frame
    next_sequence: Option<u64>,
    /// Frames currently slotted
    level: usize,
    received: usize,
    lost: usize,
    late: usize,
    restarts: usize,
    last_message_type: Option<MessageType>,
}

impl SourceBuffer {
    /// `capacity` is rounded up to a power of 2
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();

        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        Self {
            slots,
            capacity,
            mask: capacity - 1,
            next_sequence: None,
            level: 0,
            received: 0,
            lost: 0,
            late: 0,
            restarts: 0,
            last_message_type: None,
        }
    }

    /// Slot a frame. Returns `false` if it was dropped as late.
    ///
    /// A placeholder frame resets the buffer: the next real frame defines
    /// the expected sequence again.
    pub fn insert(&mut self, frame: BufferedFrame) -> bool {
        self.last_message_type = Some(frame.message_type);

        if frame.is_placeholder() {
            self.reset();
            self.restarts += 1;
            return true;
        }

        let seq = frame.sequence;
        let next = *self.next_sequence.get_or_insert(seq);

        if seq < next {
            self.late += 1;
            return false;
        }

        // Too far ahead: skip the gap and resync on this frame
        if seq - next >= self.capacity as u64 {
            self.reset();
            self.next_sequence = Some(seq);
        }

        let index = (seq as usize) & self.mask;
        if self.slots[index].replace(frame).is_none() {
            self.level += 1;
        }
        self.received += 1;
        true
    }

    /// Next frame in sequence order. A hole is counted as lost and skipped.
    pub fn pop_next(&mut self) -> Option<BufferedFrame> {
        while self.level > 0 {
            let next = self.next_sequence?;
            let index = (next as usize) & self.mask;
            self.next_sequence = Some(next.wrapping_add(1));

            match self.slots[index].take() {
                Some(frame) => {
                    self.level -= 1;
                    return Some(frame);
                }
                None => self.lost += 1,
            }
        }
        None
    }

    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.next_sequence = None;
        self.level = 0;
    }

    pub fn len(&self) -> usize {
        self.level
    }

    pub fn is_empty(&self) -> bool {
        self.level == 0
    }

    pub fn stats(&self) -> SourceBufferStats {
        SourceBufferStats {
            level: self.level,
            capacity: self.capacity,
            received: self.received,
            lost: self.lost,
            late: self.late,
            restarts: self.restarts,
            last_message_type: self.last_message_type,
        }
    }
}

/// Source buffer statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBufferStats {
    pub level: usize,
    pub capacity: usize,
    pub received: usize,
    pub lost: usize,
    pub late: usize,
    pub restarts: usize,
    pub last_message_type: Option<MessageType>,
}

impl SourceBufferStats {
    pub fn loss_rate(&self) -> f32 {
        if self.received + self.lost == 0 {
            0.0
        } else {
            self.lost as f32 / (self.received + self.lost) as f32
        }
    }
}

/// Buffers of every active source, safe to use from the network, loopback
/// and playback threads at once
pub struct BufferTable {
    buffers: DashMap<SourceId, SourceBuffer>,
    capacity: usize,
}

impl BufferTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: DashMap::new(),
            capacity,
        }
    }

    pub fn push(&self, source: SourceId, frame: BufferedFrame) -> bool {
        self.buffers
            .entry(source)
            .or_insert_with(|| SourceBuffer::new(self.capacity))
            .insert(frame)
    }

    pub fn pop(&self, source: SourceId) -> Option<BufferedFrame> {
        self.buffers.get_mut(&source)?.pop_next()
    }

    /// Drop a source's buffer; `true` if it existed
    pub fn remove(&self, source: SourceId) -> bool {
        self.buffers.remove(&source).is_some()
    }

    pub fn contains(&self, source: SourceId) -> bool {
        self.buffers.contains_key(&source)
    }

    pub fn sources(&self) -> Vec<SourceId> {
        self.buffers.iter().map(|entry| *entry.key()).collect()
    }

    pub fn stats(&self, source: SourceId) -> Option<SourceBufferStats> {
        self.buffers.get(&source).map(|buffer| buffer.stats())
    }
}

impl Default for BufferTable {
    fn default() -> Self {
        Self::new(crate::constants::SOURCE_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence: u64) -> BufferedFrame {
        BufferedFrame {
            sequence,
            payload: Bytes::from_static(b"\x80data"),
            message_type: MessageType::Opus,
        }
    }

    fn placeholder() -> BufferedFrame {
        BufferedFrame {
            sequence: PLACEHOLDER_SEQUENCE,
            payload: Bytes::new(),
            message_type: MessageType::Opus,
        }
    }

    #[test]
    fn test_reorders_by_sequence() {
        let mut buffer = SourceBuffer::new(16);
        buffer.insert(frame(10));
        buffer.insert(frame(12));
        buffer.insert(frame(11));

        assert_eq!(buffer.pop_next().unwrap().sequence, 10);
        assert_eq!(buffer.pop_next().unwrap().sequence, 11);
        assert_eq!(buffer.pop_next().unwrap().sequence, 12);
        assert!(buffer.pop_next().is_none());
    }

    #[test]
    fn test_late_frame_dropped_and_hole_counted() {
        let mut buffer = SourceBuffer::new(16);
        buffer.insert(frame(5));
        assert!(!buffer.insert(frame(4)));
        buffer.insert(frame(7));

        assert_eq!(buffer.pop_next().unwrap().sequence, 5);
        assert_eq!(buffer.pop_next().unwrap().sequence, 7);

        let stats = buffer.stats();
        assert_eq!(stats.late, 1);
        assert_eq!(stats.lost, 1);
    }

    #[test]
    fn test_placeholder_resets_expected_sequence() {
        let mut buffer = SourceBuffer::new(16);
        buffer.insert(frame(100));
        buffer.insert(placeholder());
        assert!(buffer.is_empty());

        // lower sequence after a restart is accepted, not late
        assert!(buffer.insert(frame(3)));
        assert_eq!(buffer.pop_next().unwrap().sequence, 3);
        assert_eq!(buffer.stats().restarts, 1);
    }

    #[test]
    fn test_far_future_frame_resyncs() {
        let mut buffer = SourceBuffer::new(4);
        buffer.insert(frame(1));
        buffer.insert(frame(50));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.pop_next().unwrap().sequence, 50);
    }

    #[test]
    fn test_capacity_rounded_to_power_of_two() {
        assert_eq!(SourceBuffer::new(5).stats().capacity, 8);
        assert_eq!(SourceBuffer::new(0).stats().capacity, 1);

        let table = BufferTable::new(3);
        assert!(table.push(SourceId::Loopback, frame(2)));
        assert!(table.push(SourceId::Loopback, frame(3)));
        assert_eq!(table.stats(SourceId::Loopback).unwrap().capacity, 4);
        assert_eq!(table.pop(SourceId::Loopback).unwrap().sequence, 2);
    }

    #[test]
    fn test_table_per_source() {
        let table = BufferTable::new(8);
        table.push(SourceId::Loopback, frame(1));
        table.push(SourceId::Session(7), frame(9));

        assert_eq!(table.sources().len(), 2);
        assert_eq!(table.pop(SourceId::Session(7)).unwrap().sequence, 9);
        assert!(table.remove(SourceId::Loopback));
        assert!(!table.remove(SourceId::Loopback));
        assert!(table.pop(SourceId::Loopback).is_none());
    }
}
