//! Fixed-Size Circular Byte Buffer for Per-Connection Streaming
//!
//! ## Overview
//!
//! Each active sensor connection accumulates notification payloads in its own
//! ring until a complete frame is available. The ring performs no
//! interpretation; it only hands byte ranges to the frame codec.
//!
//! ## Design
//!
//! Capacity is a compile-time constant, so a garment's worth of connections
//! has a fixed memory ceiling regardless of how bursty the transport gets:
//!
//! - `write()` is O(n) in the chunk size and overwrites the oldest bytes
//!   when full. Recent data is more valuable than old data on a live
//!   stream, so overflow discards history instead of failing.
//! - `read(n)` drains up to `n` bytes and returns fewer when less is
//!   buffered. It never blocks; an underfull ring is the transient
//!   "wait for more notifications" state, not an error.
//! - `peek()` copies from the front without consuming, which is how the
//!   pipeline asks the codec whether a full frame has accumulated yet.
//!
//! ## Thread Safety
//!
//! `ByteRing` itself is not synchronized. [`SharedByteRing`] wraps it in a
//! mutex for the one-producer (transport notification) / one-consumer
//! (dispatch) pair each connection gets.

use std::sync::Mutex;

/// Fixed-capacity circular byte buffer
///
/// ## Internal Invariants
///
/// - `read_pos < N` and `write_pos < N`
/// - `len <= N`
/// - bytes are returned in the order they were written, minus anything
///   overwritten while the ring was full
pub struct ByteRing<const N: usize> {
    data: Box<[u8; N]>,
    /// Index of the oldest unread byte
    read_pos: usize,
    /// Index where the next byte will be written
    write_pos: usize,
    /// Current number of unread bytes
    len: usize,
}

impl<const N: usize> ByteRing<N> {
    /// Create an empty ring
    pub fn new() -> Self {
        Self {
            data: Box::new([0u8; N]),
            read_pos: 0,
            write_pos: 0,
            len: 0,
        }
    }

    /// Number of unread bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no unread bytes are buffered
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fixed capacity in bytes
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Append bytes, overwriting the oldest data when full.
    ///
    /// A chunk larger than the whole ring keeps only its tail; everything
    /// before it would have been overwritten anyway.
    pub fn write(&mut self, bytes: &[u8]) {
        let bytes = if bytes.len() > N {
            &bytes[bytes.len() - N..]
        } else {
            bytes
        };

        for &b in bytes {
            self.data[self.write_pos] = b;
            self.write_pos = (self.write_pos + 1) % N;

            if self.len < N {
                self.len += 1;
            } else {
                // Full: the oldest byte was just overwritten
                self.read_pos = (self.read_pos + 1) % N;
            }
        }
    }

    /// Drain up to `out.len()` bytes into `out`, returning how many were
    /// copied. Never blocks; returns fewer bytes when less is buffered.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = self.peek(out);
        self.skip(n);
        n
    }

    /// Copy up to `out.len()` bytes from the front without consuming them
    pub fn peek(&self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len);
        for (i, slot) in out.iter_mut().enumerate().take(n) {
            *slot = self.data[(self.read_pos + i) % N];
        }
        n
    }

    /// Discard up to `n` bytes from the front
    pub fn skip(&mut self, n: usize) {
        let n = n.min(self.len);
        self.read_pos = (self.read_pos + n) % N;
        self.len -= n;
    }

    /// Drop all buffered bytes
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.len = 0;
    }
}

impl<const N: usize> Default for ByteRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutex-protected ring for the single-producer/single-consumer pair each
/// sensor connection gets
///
/// The transport thread calls [`write`](Self::write); the dispatch side
/// calls [`peek`](Self::peek)/[`skip`](Self::skip)/[`read`](Self::read).
/// Every operation holds the lock for one bounded copy, so neither side
/// can stall the other for longer than a frame's worth of bytes.
pub struct SharedByteRing<const N: usize> {
    inner: Mutex<ByteRing<N>>,
}

impl<const N: usize> SharedByteRing<N> {
    /// Create an empty shared ring
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ByteRing::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ByteRing<N>> {
        // A poisoned lock only means a panic elsewhere; the byte ring is
        // always structurally valid, so keep serving data.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append bytes, overwriting the oldest data when full
    pub fn write(&self, bytes: &[u8]) {
        self.lock().write(bytes);
    }

    /// Drain up to `out.len()` bytes; never blocks
    pub fn read(&self, out: &mut [u8]) -> usize {
        self.lock().read(out)
    }

    /// Copy from the front without consuming
    pub fn peek(&self, out: &mut [u8]) -> usize {
        self.lock().peek(out)
    }

    /// Discard up to `n` bytes from the front
    pub fn skip(&self, n: usize) {
        self.lock().skip(n);
    }

    /// Number of unread bytes
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no unread bytes are buffered
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop all buffered bytes
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl<const N: usize> Default for SharedByteRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ring() {
        let ring: ByteRing<8> = ByteRing::new();
        assert!(ring.is_empty());
        assert_eq!(ring.capacity(), 8);

        let mut out = [0u8; 4];
        let mut ring = ring;
        assert_eq!(ring.read(&mut out), 0);
    }

    #[test]
    fn write_then_read() {
        let mut ring: ByteRing<8> = ByteRing::new();
        ring.write(&[1, 2, 3]);
        assert_eq!(ring.len(), 3);

        let mut out = [0u8; 8];
        let n = ring.read(&mut out);
        assert_eq!(n, 3);
        assert_eq!(&out[..3], &[1, 2, 3]);
        assert!(ring.is_empty());
    }

    #[test]
    fn overwrites_oldest_when_full() {
        let mut ring: ByteRing<4> = ByteRing::new();
        ring.write(&[1, 2, 3, 4]);
        ring.write(&[5, 6]);

        // 1 and 2 were overwritten
        let mut out = [0u8; 4];
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(out, [3, 4, 5, 6]);
    }

    #[test]
    fn oversized_chunk_keeps_tail() {
        let mut ring: ByteRing<4> = ByteRing::new();
        ring.write(&[1, 2, 3, 4, 5, 6, 7]);

        let mut out = [0u8; 4];
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(out, [4, 5, 6, 7]);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut ring: ByteRing<8> = ByteRing::new();
        ring.write(&[9, 8, 7]);

        let mut out = [0u8; 2];
        assert_eq!(ring.peek(&mut out), 2);
        assert_eq!(out, [9, 8]);
        assert_eq!(ring.len(), 3);

        ring.skip(1);
        assert_eq!(ring.peek(&mut out), 2);
        assert_eq!(out, [8, 7]);
    }

    #[test]
    fn read_returns_partial_when_underfull() {
        let mut ring: ByteRing<8> = ByteRing::new();
        ring.write(&[1, 2]);

        let mut out = [0u8; 6];
        assert_eq!(ring.read(&mut out), 2);
    }

    #[test]
    fn shared_ring_concurrent_producer_consumer() {
        use std::sync::Arc;
        use std::thread;

        let ring = Arc::new(SharedByteRing::<1024>::new());
        let producer_ring = Arc::clone(&ring);

        let producer = thread::spawn(move || {
            for i in 0..100u8 {
                producer_ring.write(&[i; 8]);
            }
        });

        let mut drained = 0usize;
        let mut out = [0u8; 64];
        while drained < 800 {
            let n = ring.read(&mut out);
            if n == 0 && producer.is_finished() && ring.is_empty() {
                break;
            }
            drained += n;
        }

        producer.join().expect("producer panicked");
        drained += {
            let mut rest = [0u8; 1024];
            ring.read(&mut rest)
        };
        assert_eq!(drained, 800);
    }
}
