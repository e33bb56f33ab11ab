//! Fixed-Capacity Byte Ring Buffer

use crate::error::RingBufferError;
use crate::scanner::{Terminator, TerminatorScanner};
use serde::{Deserialize, Serialize};

/// What happens to bytes that do not fit into the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Keep what is buffered, reject the incoming bytes that do not fit
    DropNewest,
    /// Discard the unflushed accumulation, then store as much of the incoming bytes as fits
    DropAccumulated,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::DropNewest
    }
}

/// Byte ring buffer with power-of-two capacity.
///
/// Read and write cursors run modulo `2 * capacity`, so a full buffer
/// (`head - tail == capacity`) is distinguishable from an empty one
/// without sacrificing a slot.
pub struct RingBuffer {
    /// Pre-allocated storage, never resized
    storage: Box<[u8]>,
    /// Capacity of the buffer (power of two)
    capacity: usize,
    /// Mask for cursor arithmetic modulo 2 * capacity
    cursor_mask: usize,
    /// Write cursor
    head: usize,
    /// Read cursor
    tail: usize,
    /// Overflow handling
    policy: OverflowPolicy,
    /// Total bytes accepted (for statistics)
    total_written: u64,
    /// Total bytes rejected or discarded on overflow
    dropped: u64,
}

impl RingBuffer {
    /// Create a new ring buffer with given capacity
    pub fn new(capacity: usize) -> Result<Self, RingBufferError> {
        Self::with_policy(capacity, OverflowPolicy::default())
    }

    /// Create a new ring buffer with an explicit overflow policy
    pub fn with_policy(capacity: usize, policy: OverflowPolicy) -> Result<Self, RingBufferError> {
        if !capacity.is_power_of_two() {
            return Err(RingBufferError::NotPowerOfTwo(capacity));
        }

        Ok(Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            capacity,
            cursor_mask: (capacity << 1) - 1,
            head: 0,
            tail: 0,
            policy,
            total_written: 0,
            dropped: 0,
        })
    }

    /// Write bytes, returning how many of them were stored.
    ///
    /// A return value smaller than `data.len()` signals overflow.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }

        if data.len() > self.free_space()
            && self.policy == OverflowPolicy::DropAccumulated
            && !self.is_empty()
        {
            self.dropped += self.len() as u64;
            self.tail = self.head;
        }

        let count = data.len().min(self.free_space());
        let start = self.head & (self.capacity - 1);
        let first = count.min(self.capacity - start);

        self.storage[start..start + first].copy_from_slice(&data[..first]);
        self.storage[..count - first].copy_from_slice(&data[first..count]);

        self.head = (self.head + count) & self.cursor_mask;
        self.total_written += count as u64;
        self.dropped += (data.len() - count) as u64;
        count
    }

    /// View of the unread bytes in logical order.
    ///
    /// The second slice is non-empty only when the data wraps around the
    /// end of storage.
    pub fn read_available(&self) -> (&[u8], &[u8]) {
        let len = self.len();
        let start = self.tail & (self.capacity - 1);
        let first = len.min(self.capacity - start);
        (&self.storage[start..start + first], &self.storage[..len - first])
    }

    /// Advance the read cursor by `count` bytes
    pub fn consume(&mut self, count: usize) -> Result<(), RingBufferError> {
        let available = self.len();
        if count > available {
            return Err(RingBufferError::InvalidArgument {
                requested: count,
                available,
            });
        }
        self.tail = (self.tail + count) & self.cursor_mask;
        Ok(())
    }

    /// Copy out and consume the first `count` bytes
    pub fn take(&mut self, count: usize) -> Result<Vec<u8>, RingBufferError> {
        let available = self.len();
        if count > available {
            return Err(RingBufferError::InvalidArgument {
                requested: count,
                available,
            });
        }

        let (first, second) = self.read_available();
        let mut out = Vec::with_capacity(count);
        let from_first = count.min(first.len());
        out.extend_from_slice(&first[..from_first]);
        out.extend_from_slice(&second[..count - from_first]);

        self.consume(count)?;
        Ok(out)
    }

    /// Copy out and consume everything that is buffered
    pub fn take_all(&mut self) -> Vec<u8> {
        let (first, second) = self.read_available();
        let mut out = Vec::with_capacity(first.len() + second.len());
        out.extend_from_slice(first);
        out.extend_from_slice(second);
        self.tail = self.head;
        out
    }

    /// Find the end offset of the first occurrence of `terminator`
    pub fn find(&self, terminator: &Terminator) -> Option<usize> {
        TerminatorScanner::new(*terminator).scan(self)
    }

    /// Get the number of bytes currently buffered
    pub fn len(&self) -> usize {
        self.head.wrapping_sub(self.tail) & self.cursor_mask
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Remaining room in bytes
    pub fn free_space(&self) -> usize {
        self.capacity - self.len()
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f64 {
        self.len() as f64 / self.capacity as f64
    }

    /// Current overflow policy
    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Get total bytes written (for statistics)
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Get total bytes lost to overflow
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(buffer: &RingBuffer) -> Vec<u8> {
        let (a, b) = buffer.read_available();
        [a, b].concat()
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        assert_eq!(RingBuffer::new(255).unwrap_err(), RingBufferError::NotPowerOfTwo(255));
        assert_eq!(RingBuffer::new(257).unwrap_err(), RingBufferError::NotPowerOfTwo(257));
        assert!(RingBuffer::new(0).is_err());
        assert_eq!(RingBuffer::new(256).unwrap().capacity(), 256);
    }

    #[test]
    fn test_write_and_read() {
        let mut buffer = RingBuffer::new(16).unwrap();
        assert_eq!(buffer.write(b"hello"), 5);
        assert_eq!(buffer.len(), 5);
        assert_eq!(contents(&buffer), b"hello");
    }

    #[test]
    fn test_full_buffer_uses_every_slot() {
        let mut buffer = RingBuffer::new(8).unwrap();
        assert_eq!(buffer.write(b"12345678"), 8);
        assert!(buffer.is_full());
        assert_eq!(buffer.free_space(), 0);
        assert_eq!(contents(&buffer), b"12345678");
    }

    #[test]
    fn test_overflow_drops_newest() {
        let mut buffer = RingBuffer::new(8).unwrap();
        assert_eq!(buffer.write(b"123456789"), 8);
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.dropped_bytes(), 1);
        assert_eq!(contents(&buffer), b"12345678");

        // Nothing more fits
        assert_eq!(buffer.write(b"x"), 0);
        assert_eq!(buffer.dropped_bytes(), 2);
    }

    #[test]
    fn test_overflow_drops_accumulation() {
        let mut buffer = RingBuffer::with_policy(8, OverflowPolicy::DropAccumulated).unwrap();
        buffer.write(b"abcdef");
        assert_eq!(buffer.write(b"WXYZ"), 4);
        assert_eq!(contents(&buffer), b"WXYZ");
        assert_eq!(buffer.dropped_bytes(), 6);

        // C+1 into an empty buffer still reports one byte lost
        buffer.clear();
        assert_eq!(buffer.write(b"123456789"), 8);
        assert_eq!(buffer.len(), 8);
    }

    #[test]
    fn test_wrap_around() {
        let mut buffer = RingBuffer::new(8).unwrap();
        buffer.write(b"abcdef");
        buffer.consume(5).unwrap();
        buffer.write(b"ghijk");

        let (first, second) = buffer.read_available();
        assert_eq!(first, b"fgh");
        assert_eq!(second, b"ijk");
        assert_eq!(buffer.take(4).unwrap(), b"fghi");
        assert_eq!(buffer.take_all(), b"jk");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_consume_past_end_fails() {
        let mut buffer = RingBuffer::new(4).unwrap();
        buffer.write(b"ab");
        assert_eq!(
            buffer.consume(3),
            Err(RingBufferError::InvalidArgument {
                requested: 3,
                available: 2
            })
        );
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_find_across_wrap() {
        let mut buffer = RingBuffer::new(8).unwrap();
        buffer.write(b"xxxxxx");
        buffer.consume(6).unwrap();
        buffer.write(b"ok\r\n");

        let crlf = Terminator::new(b"\r\n").unwrap();
        assert_eq!(buffer.find(&crlf), Some(4));
    }

    #[test]
    fn test_fill_ratio() {
        let mut buffer = RingBuffer::new(64).unwrap();
        assert_eq!(buffer.fill_ratio(), 0.0);
        buffer.write(&[0u8; 32]);
        assert!((buffer.fill_ratio() - 0.5).abs() < 0.01);
    }
}
