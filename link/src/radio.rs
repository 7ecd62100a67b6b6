//! # Radio Transmit Path
//!
//! The wireless transport is a capability the core consumes:
//!
//! - `transmit(frame)` queues one complete 802.11 frame and reports only
//!   whether the driver accepted it
//! - completion arrives later, asynchronously, and must be forwarded to
//!   [`TxGate::complete`]
//! - captured frames are pushed into the capture half of the bridge by the
//!   platform's promiscuous callback
//!
//! [`TxGate`] allows at most one frame in flight. It is cleared when a frame
//! is handed to the driver and set again only by the completion
//! notification, or immediately if the driver refuses the frame.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::counters::Counters;
use crate::error::{ChannelError, TransmitError};
use crate::frame::{FrameBuffer, FrameBuilder, MacAddress};

/// Lowest valid 2.4 GHz channel
pub const MIN_CHANNEL: u8 = 1;

/// Highest valid 2.4 GHz channel
pub const MAX_CHANNEL: u8 = 14;

/// Check a channel number against the 2.4 GHz range
pub fn validate_channel(channel: u8) -> Result<u8, ChannelError> {
    if (MIN_CHANNEL..=MAX_CHANNEL).contains(&channel) {
        Ok(channel)
    } else {
        Err(ChannelError::OutOfRange(channel))
    }
}

/// Raw 802.11 radio as seen by the bridge
///
/// # Example
///
/// ```ignore
/// struct SdkRadio;
///
/// impl WirelessTransport for SdkRadio {
///     fn transmit(&mut self, frame: &[u8]) -> Result<(), TransmitError> {
///         match unsafe { wifi_send_pkt_freedom(frame.as_ptr(), frame.len() as u16, false) } {
///             0 => Ok(()),
///             _ => Err(TransmitError::Rejected),
///         }
///     }
///     // ...
/// }
/// ```
pub trait WirelessTransport {
    /// Queue one complete frame; success means queued, not sent
    fn transmit(&mut self, frame: &[u8]) -> Result<(), TransmitError>;

    /// Switch to `channel`, already validated to be in 1-14
    fn set_channel(&mut self, channel: u8) -> Result<(), ChannelError>;

    /// Channel currently in use
    fn channel(&self) -> u8;

    /// This device's station address, used as the frame source
    fn mac_address(&self) -> MacAddress;
}

/// One-outstanding-frame flag shared with the completion notification
#[derive(Debug)]
pub struct TxGate {
    ready: AtomicBool,
}

impl TxGate {
    pub const fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Claim the gate for a new transmission.
    ///
    /// Check-and-clear runs with the event context masked, so a completion
    /// notification cannot slip in between the two steps.
    pub fn try_acquire(&self) -> bool {
        critical_section::with(|_| {
            if self.ready.load(Ordering::Acquire) {
                self.ready.store(false, Ordering::Release);
                true
            } else {
                false
            }
        })
    }

    /// Transmit completion notification; call from the driver callback
    pub fn complete(&self) {
        self.ready.store(true, Ordering::Release);
    }
}

impl Default for TxGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame construction plus the one-in-flight transmit discipline
pub struct Transmitter<'a> {
    builder: FrameBuilder,
    gate: &'a TxGate,
    max_payload: u16,
}

impl<'a> Transmitter<'a> {
    pub fn new(builder: FrameBuilder, gate: &'a TxGate, max_payload: u16) -> Self {
        Self {
            builder,
            gate,
            max_payload,
        }
    }

    /// Sequence number the next frame will carry
    pub fn next_sequence(&self) -> u16 {
        self.builder.sequence()
    }

    /// Send the first `len` payload bytes of `buffer`.
    ///
    /// No retry on any failure: the packet is dropped and `tx_error` counted.
    /// Returns the sequence number the frame went out with.
    pub fn send<T: WirelessTransport, const MAX: usize>(
        &mut self,
        transport: &mut T,
        buffer: &mut FrameBuffer<MAX>,
        len: u16,
        counters: &Counters,
    ) -> Result<u16, TransmitError> {
        let result = self.try_send(transport, buffer, len);
        match result {
            Ok(sequence) => {
                counters.record_tx_ok();
                trace!("tx: len={} seq={}", len, sequence);
            }
            Err(TransmitError::Busy) => {
                counters.record_tx_error();
                debug!("tx: busy, {} bytes dropped", len);
            }
            Err(_) => {
                counters.record_tx_error();
                warn!("tx: failed, {} bytes dropped", len);
            }
        }
        result
    }

    fn try_send<T: WirelessTransport, const MAX: usize>(
        &mut self,
        transport: &mut T,
        buffer: &mut FrameBuffer<MAX>,
        len: u16,
    ) -> Result<u16, TransmitError> {
        if len == 0 {
            return Err(TransmitError::Empty);
        }
        if len > self.max_payload || len as usize > MAX {
            return Err(TransmitError::Oversized);
        }
        if !self.gate.try_acquire() {
            return Err(TransmitError::Busy);
        }

        let sequence = self.builder.write_header(buffer.header_mut());
        if let Err(e) = transport.transmit(buffer.frame(len as usize)) {
            // Nothing is in flight, so no completion will come to re-arm us
            self.gate.complete();
            return Err(e);
        }
        Ok(sequence)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use heapless::Vec;

    /// Records every frame handed to the radio
    pub struct RecordingTransport {
        pub frames: Vec<Vec<u8, 300>, 16>,
        pub channel: u8,
        pub mac: MacAddress,
        pub refuse: bool,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self {
                frames: Vec::new(),
                channel: 1,
                mac: MacAddress([0x5C, 0xCF, 0x7F, 0xAB, 0xCD, 0xEF]),
                refuse: false,
            }
        }
    }

    impl WirelessTransport for RecordingTransport {
        fn transmit(&mut self, frame: &[u8]) -> Result<(), TransmitError> {
            if self.refuse {
                return Err(TransmitError::Rejected);
            }
            let mut copy = Vec::new();
            copy.extend_from_slice(frame).map_err(|_| TransmitError::Rejected)?;
            self.frames.push(copy).map_err(|_| TransmitError::Rejected)
        }

        fn set_channel(&mut self, channel: u8) -> Result<(), ChannelError> {
            self.channel = channel;
            Ok(())
        }

        fn channel(&self) -> u8 {
            self.channel
        }

        fn mac_address(&self) -> MacAddress {
            self.mac
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingTransport;
    use super::*;
    use crate::frame::{LinkHeader, HEADER_LEN};

    const LINK: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x00]);

    fn setup(gate: &TxGate) -> (Transmitter<'_>, RecordingTransport, FrameBuffer<64>, Counters) {
        let transport = RecordingTransport::new();
        let builder = FrameBuilder::new(transport.mac, LINK);
        (
            Transmitter::new(builder, gate, 64),
            transport,
            FrameBuffer::new(),
            Counters::new(),
        )
    }

    #[test]
    fn test_send_builds_full_frame() {
        let gate = TxGate::new();
        let (mut tx, mut radio, mut buffer, counters) = setup(&gate);
        buffer.payload_mut()[..3].copy_from_slice(&[1, 2, 3]);

        assert_eq!(tx.send(&mut radio, &mut buffer, 3, &counters), Ok(0));
        assert_eq!(radio.frames.len(), 1);
        let frame = &radio.frames[0];
        assert_eq!(frame.len(), HEADER_LEN + 3);
        let header = LinkHeader::parse(frame).unwrap();
        assert_eq!(header.link_id, LINK);
        assert_eq!(header.source, radio.mac);
        assert!(header.destination.is_broadcast());
        assert_eq!(&frame[HEADER_LEN..], &[1, 2, 3]);
        assert_eq!(counters.tx_ok(), 1);
        assert!(!gate.is_ready());
    }

    #[test]
    fn test_busy_until_completion() {
        let gate = TxGate::new();
        let (mut tx, mut radio, mut buffer, counters) = setup(&gate);

        assert!(tx.send(&mut radio, &mut buffer, 1, &counters).is_ok());
        assert_eq!(
            tx.send(&mut radio, &mut buffer, 1, &counters),
            Err(TransmitError::Busy)
        );
        assert_eq!(counters.tx_error(), 1);
        // Busy attempts do not consume a sequence number
        assert_eq!(tx.next_sequence(), 1);

        gate.complete();
        assert_eq!(tx.send(&mut radio, &mut buffer, 1, &counters), Ok(1));
        assert_eq!(radio.frames.len(), 2);
    }

    #[test]
    fn test_invalid_lengths_rejected() {
        let gate = TxGate::new();
        let (mut tx, mut radio, mut buffer, counters) = setup(&gate);

        assert_eq!(
            tx.send(&mut radio, &mut buffer, 0, &counters),
            Err(TransmitError::Empty)
        );
        assert_eq!(
            tx.send(&mut radio, &mut buffer, 65, &counters),
            Err(TransmitError::Oversized)
        );
        assert_eq!(counters.tx_error(), 2);
        assert!(radio.frames.is_empty());
        assert!(gate.is_ready());
    }

    #[test]
    fn test_driver_refusal_rearms_gate() {
        let gate = TxGate::new();
        let (mut tx, mut radio, mut buffer, counters) = setup(&gate);
        radio.refuse = true;

        assert_eq!(
            tx.send(&mut radio, &mut buffer, 4, &counters),
            Err(TransmitError::Rejected)
        );
        assert!(gate.is_ready());
        assert_eq!(counters.tx_error(), 1);
        // The header was built, so the sequence number is spent
        assert_eq!(tx.next_sequence(), 1);
    }

    #[test]
    fn test_validate_channel() {
        assert_eq!(validate_channel(1), Ok(1));
        assert_eq!(validate_channel(14), Ok(14));
        assert_eq!(validate_channel(0), Err(ChannelError::OutOfRange(0)));
        assert_eq!(validate_channel(15), Err(ChannelError::OutOfRange(15)));
    }
}
