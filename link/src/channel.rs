//! # Circular Byte Channel
//!
//! Bounded single-producer/single-consumer byte FIFO shared between the
//! UART interrupt, the capture callback and the periodic tick task.
//!
//! ## Low-Latency Design Principles
//!
//! 1. **Static Allocation**: storage is a fixed `[u8; N]`, sized once.
//!
//! 2. **Lock-Free Access**: the producer alone stores `head`, the consumer
//!    alone stores `tail`. Each index update is a single word-sized atomic
//!    store, so the two halves may live in different execution contexts.
//!
//! 3. **Lossy Backpressure**: a full channel drops the newest bytes and
//!    counts them. Nothing ever blocks and nothing ever fails loudly.
//!
//! ## Memory Layout
//!
//! ```text
//! ┌──────────┬───────────────────────┬──────────────────────┬───┐
//! │   free   │    readable data      │        free          │ R │
//! └──────────┴───────────────────────┴──────────────────────┴───┘
//!            ▲                       ▲                        ▲
//!          tail                    head            reserved slot
//! ```
//!
//! One slot always stays empty so that `head == tail` means empty and
//! `head + 1 == tail` means full. A channel of capacity `N` holds at most
//! `N - 1` bytes.

use core::cell::UnsafeCell;
use core::ptr;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::counters::bump;

/// Fixed-capacity SPSC byte channel.
///
/// `N` must be a power of two (checked at compile time) so index
/// wrap-around is a mask instead of a division.
///
/// # Example
///
/// ```rust
/// use rawlink::channel::CircularChannel;
///
/// let mut channel: CircularChannel<16> = CircularChannel::new();
/// let (mut producer, mut consumer) = channel.split();
///
/// assert_eq!(producer.write(b"hello"), 5);
///
/// let mut out = [0u8; 8];
/// let n = consumer.read(&mut out);
/// assert_eq!(&out[..n], b"hello");
/// ```
pub struct CircularChannel<const N: usize> {
    data: UnsafeCell<[u8; N]>,
    /// Next slot the producer writes
    head: AtomicUsize,
    /// Next slot the consumer reads
    tail: AtomicUsize,
    /// Bytes refused because the channel was full
    overflow: AtomicU32,
}

// SAFETY: the producer only writes slots in the free region and the consumer
// only reads slots in the readable region; the regions are published to each
// other through Release stores and Acquire loads of `head` and `tail`.
unsafe impl<const N: usize> Sync for CircularChannel<N> {}

impl<const N: usize> CircularChannel<N> {
    const MASK: usize = N - 1;

    const CAPACITY_CHECK: () = assert!(
        N >= 2 && N.is_power_of_two(),
        "channel capacity must be a power of two"
    );

    /// Create an empty channel
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAPACITY_CHECK;
        Self {
            data: UnsafeCell::new([0u8; N]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            overflow: AtomicU32::new(0),
        }
    }

    /// Split into the producing and consuming halves.
    ///
    /// Taking `&mut self` guarantees there is exactly one of each.
    pub fn split(&mut self) -> (Producer<'_, N>, Consumer<'_, N>) {
        self.split_shared()
    }

    /// Split through a shared reference. The caller must guarantee no other
    /// halves of this channel exist for the lifetime of the returned pair.
    pub(crate) fn split_shared(&self) -> (Producer<'_, N>, Consumer<'_, N>) {
        (Producer { channel: self }, Consumer { channel: self })
    }

    /// Storage size `N`; usable space is one byte less
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of bytes ready to read
    #[inline]
    pub fn available(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail) & Self::MASK
    }

    /// Number of bytes that can be written before the channel is full
    #[inline]
    pub fn free(&self) -> usize {
        N - 1 - self.available()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.free() == 0
    }

    /// Total bytes dropped because the channel was full
    pub fn overflow_count(&self) -> u32 {
        self.overflow.load(Ordering::Relaxed)
    }

    /// Zero the overflow counter.
    ///
    /// Runs from the tick context while the producer may be interrupting it,
    /// so callers wrap it in a critical section together with the other
    /// counter resets.
    pub fn reset_overflow(&self) {
        self.overflow.store(0, Ordering::Relaxed);
    }

    fn record_overflow(&self, refused: usize) {
        bump(&self.overflow, refused as u32);
    }

    /// Discard all buffered bytes. Only valid while no halves exist.
    pub fn clear(&mut self) {
        *self.head.get_mut() = 0;
        *self.tail.get_mut() = 0;
    }
}

impl<const N: usize> Default for CircularChannel<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Writing half of a [`CircularChannel`]
pub struct Producer<'a, const N: usize> {
    channel: &'a CircularChannel<N>,
}

impl<'a, const N: usize> Producer<'a, N> {
    /// Free space, in bytes
    #[inline]
    pub fn free(&self) -> usize {
        self.channel.free()
    }

    /// Storage size `N`
    #[inline]
    pub fn capacity(&self) -> usize {
        N
    }

    /// Copy as much of `data` as fits and return the number of bytes taken.
    ///
    /// Bytes that do not fit are dropped and added to the overflow count.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let head = self.channel.head.load(Ordering::Relaxed);
        let tail = self.channel.tail.load(Ordering::Acquire);
        let free = N - 1 - (head.wrapping_sub(tail) & CircularChannel::<N>::MASK);
        let len = data.len().min(free);

        // Copy in at most two runs: up to the end of storage, then from 0.
        let first = len.min(N - head);
        let base = self.channel.data.get() as *mut u8;
        // SAFETY: `head..head+first` and `0..len-first` lie inside the free
        // region, which the consumer does not touch until `head` moves.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), base.add(head), first);
            ptr::copy_nonoverlapping(data.as_ptr().add(first), base, len - first);
        }

        self.channel
            .head
            .store((head + len) & CircularChannel::<N>::MASK, Ordering::Release);

        if len < data.len() {
            self.channel.record_overflow(data.len() - len);
        }
        len
    }

    /// Write one byte; `false` (and one overflow) if the channel is full
    pub fn write_byte(&mut self, byte: u8) -> bool {
        self.write(&[byte]) == 1
    }

    /// Append `[LEN_HI][LEN_LO][payload]` as one unit.
    ///
    /// Either the whole packet goes in or nothing does, so a full channel
    /// never leaves a torn packet on the serial line. A refused packet adds
    /// its full encoded size to the overflow count.
    pub fn write_packet(&mut self, payload: &[u8]) -> bool {
        let encoded = payload.len() + 2;
        let Ok(len) = u16::try_from(payload.len()) else {
            self.channel.record_overflow(encoded);
            return false;
        };
        if self.free() < encoded {
            self.channel.record_overflow(encoded);
            return false;
        }

        self.write(&len.to_be_bytes());
        self.write(payload);
        true
    }
}

/// Reading half of a [`CircularChannel`]
pub struct Consumer<'a, const N: usize> {
    channel: &'a CircularChannel<N>,
}

impl<'a, const N: usize> Consumer<'a, N> {
    /// Number of bytes ready to read
    #[inline]
    pub fn available(&self) -> usize {
        self.channel.available()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    /// Storage size `N`
    #[inline]
    pub fn capacity(&self) -> usize {
        N
    }

    /// Copy up to `buf.len()` buffered bytes into `buf`, oldest first.
    ///
    /// Returns the number copied, which is zero when the channel is empty.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let tail = self.channel.tail.load(Ordering::Relaxed);
        let head = self.channel.head.load(Ordering::Acquire);
        let available = head.wrapping_sub(tail) & CircularChannel::<N>::MASK;
        let len = buf.len().min(available);

        let first = len.min(N - tail);
        let base = self.channel.data.get() as *const u8;
        // SAFETY: `tail..tail+first` and `0..len-first` lie inside the
        // readable region published by the producer's Release store.
        unsafe {
            ptr::copy_nonoverlapping(base.add(tail), buf.as_mut_ptr(), first);
            ptr::copy_nonoverlapping(base, buf.as_mut_ptr().add(first), len - first);
        }

        self.channel
            .tail
            .store((tail + len) & CircularChannel::<N>::MASK, Ordering::Release);
        len
    }

    /// Read one byte, if any
    pub fn read_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        (self.read(&mut byte) == 1).then_some(byte[0])
    }
}
