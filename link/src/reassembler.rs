//! # Serial Packet Reassembler
//!
//! Turns the continuous serial byte stream into discrete payloads.
//!
//! ```text
//!                 ≥ 2 bytes, 0 < L ≤ MAX
//!   ┌─────────────┐ ───────────────────────► ┌──────────────┐
//!   │ WAIT_HEADER │                          │  ACCUMULATE  │
//!   └─────────────┘ ◄─────────────────────── └──────────────┘
//!     ▲        │        received == L            │   ▲
//!     └────────┘                                 └───┘
//!   L == 0 or L > MAX                       bytes still missing
//! ```
//!
//! State survives unchanged across polls that bring too little data, so one
//! poll per tick is enough and nothing ever waits. Payload bytes land
//! directly in a [`FrameBuffer`], behind the space reserved for the radio
//! header.

use crate::channel::Consumer;
use crate::frame::FrameBuffer;

/// Non-blocking source of serial bytes
pub trait ByteSource {
    /// Bytes that can be read right now
    fn available(&self) -> usize;

    /// Copy up to `buf.len()` bytes, returning how many were copied
    fn read(&mut self, buf: &mut [u8]) -> usize;
}

impl<const N: usize> ByteSource for Consumer<'_, N> {
    fn available(&self) -> usize {
        Consumer::available(self)
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        Consumer::read(self, buf)
    }
}

/// Reading from a slice consumes it from the front
impl ByteSource for &[u8] {
    fn available(&self) -> usize {
        self.len()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.len());
        let (head, tail) = self.split_at(n);
        buf[..n].copy_from_slice(head);
        *self = tail;
        n
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum State {
    WaitHeader,
    Accumulate { expected: u16, received: u16 },
}

/// Result of one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Poll {
    /// Not enough data yet
    Pending,
    /// A payload of this length is complete in the frame buffer
    Complete(u16),
    /// A length prefix of zero or above the limit was read and discarded
    Malformed(u16),
}

/// Length-prefix state machine over a fixed payload buffer of `MAX` bytes
pub struct Reassembler<const MAX: usize> {
    state: State,
    max_payload: u16,
    buffer: FrameBuffer<MAX>,
}

impl<const MAX: usize> Reassembler<MAX> {
    /// `max_payload` is clamped to the buffer size `MAX`
    pub fn new(max_payload: u16) -> Self {
        Self {
            state: State::WaitHeader,
            max_payload: max_payload.min(MAX.min(u16::MAX as usize) as u16),
            buffer: FrameBuffer::new(),
        }
    }

    pub fn max_payload(&self) -> u16 {
        self.max_payload
    }

    /// True while part of a payload has been announced but not received
    pub fn is_accumulating(&self) -> bool {
        matches!(self.state, State::Accumulate { .. })
    }

    /// Drop any partial packet and wait for a new header
    pub fn reset(&mut self) {
        self.state = State::WaitHeader;
    }

    /// Advance the state machine with whatever `source` has right now.
    ///
    /// A header and its payload may both be consumed in one call. After
    /// [`Poll::Complete`] the payload stays in [`Self::payload`] until the
    /// next poll.
    pub fn poll<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> Poll {
        if self.state == State::WaitHeader {
            if source.available() < 2 {
                return Poll::Pending;
            }
            let mut prefix = [0u8; 2];
            source.read(&mut prefix);
            let len = u16::from_be_bytes(prefix);

            if len == 0 || len > self.max_payload {
                return Poll::Malformed(len);
            }
            self.state = State::Accumulate {
                expected: len,
                received: 0,
            };
        }

        let State::Accumulate {
            expected,
            mut received,
        } = self.state
        else {
            return Poll::Pending;
        };

        let wanted = (expected - received) as usize;
        let to_read = wanted.min(source.available());
        if to_read > 0 {
            let start = received as usize;
            let dest = &mut self.buffer.payload_mut()[start..start + to_read];
            received += source.read(dest) as u16;
        }

        if received >= expected {
            self.state = State::WaitHeader;
            Poll::Complete(expected)
        } else {
            self.state = State::Accumulate { expected, received };
            Poll::Pending
        }
    }

    /// First `len` bytes of the payload buffer
    pub fn payload(&self, len: u16) -> &[u8] {
        &self.buffer.payload()[..(len as usize).min(MAX)]
    }

    /// The frame buffer holding the last completed payload
    pub fn frame_buffer_mut(&mut self) -> &mut FrameBuffer<MAX> {
        &mut self.buffer
    }
}
