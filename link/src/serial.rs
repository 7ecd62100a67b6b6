//! # Serial Transport Boundary
//!
//! The UART runs 8N1 at a configured rate. On top of it both directions carry
//! the same packet format:
//!
//! ```text
//! ┌────────┬────────┬──────────────────────┐
//! │ LEN_HI │ LEN_LO │  payload (LEN bytes) │   0 < LEN ≤ MAX_PAYLOAD
//! └────────┴────────┴──────────────────────┘
//! ```
//!
//! [`SerialPort`] is the interrupt-side half of the bridge: it moves bytes
//! between the hardware FIFOs and the two circular channels. The free
//! functions at the bottom are for the peer above the serial boundary, which
//! speaks the same packet format over any `embedded-io` stream.

use core::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::channel::{Consumer, Producer};
use crate::error::PacketError;

/// Depth of the UART transmit FIFO
pub const TX_FIFO_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// UART line settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SerialLine {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

impl SerialLine {
    /// 8 data bits, no parity, 1 stop bit
    pub const fn new_8n1(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
        }
    }

    /// Clock divider for a UART clocked at `clock_hz`; `None` for a zero rate
    pub const fn clock_divider(&self, clock_hz: u32) -> Option<u32> {
        clock_hz.checked_div(self.baud_rate)
    }
}

/// "Outbound data waiting" flag that gates the UART TX-empty interrupt.
///
/// Raised whenever bytes are queued for the serial line and lowered by the
/// TX interrupt once the outbound channel is drained.
#[derive(Debug, Default)]
pub struct OutboundSignal {
    pending: AtomicBool,
}

impl OutboundSignal {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    pub fn raise(&self) {
        self.pending.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub(crate) fn lower(&self) {
        self.pending.store(false, Ordering::Release);
    }
}

/// Interrupt-side serial half: RX FIFO → inbound, outbound → TX FIFO
pub struct SerialPort<'a, const RX: usize, const TX: usize> {
    inbound: Producer<'a, RX>,
    outbound: Consumer<'a, TX>,
    signal: &'a OutboundSignal,
}

impl<'a, const RX: usize, const TX: usize> SerialPort<'a, RX, TX> {
    pub fn new(
        inbound: Producer<'a, RX>,
        outbound: Consumer<'a, TX>,
        signal: &'a OutboundSignal,
    ) -> Self {
        Self {
            inbound,
            outbound,
            signal,
        }
    }

    /// RX threshold/timeout interrupt: store bytes drained from the FIFO.
    ///
    /// Bytes that do not fit are dropped and counted as inbound overflow.
    pub fn on_receive(&mut self, fifo: &[u8]) -> usize {
        self.inbound.write(fifo)
    }

    pub fn on_receive_byte(&mut self, byte: u8) -> bool {
        self.inbound.write_byte(byte)
    }

    /// TX-empty interrupt: move up to `fifo_space` outbound bytes into `sink`.
    ///
    /// When the outbound channel runs dry the signal is lowered; the empty
    /// check and the lowering happen inside one critical section so a packet
    /// queued by the capture callback cannot be stranded.
    pub fn fill_tx_fifo(&mut self, fifo_space: usize, mut sink: impl FnMut(u8)) -> usize {
        let mut moved = 0;
        while moved < fifo_space {
            match self.outbound.read_byte() {
                Some(byte) => {
                    sink(byte);
                    moved += 1;
                }
                None => break,
            }
        }

        critical_section::with(|_| {
            if self.outbound.is_empty() {
                self.signal.lower();
            }
        });
        moved
    }

    /// Whether the TX-empty interrupt should be enabled
    pub fn tx_pending(&self) -> bool {
        self.signal.is_raised() && !self.outbound.is_empty()
    }

    /// Bytes waiting to go out on the serial line
    pub fn outbound_len(&self) -> usize {
        self.outbound.available()
    }

    /// Free space in the inbound channel
    pub fn inbound_free(&self) -> usize {
        self.inbound.free()
    }
}

/// Big-endian length prefix for a payload
pub fn encode_prefix(len: u16) -> [u8; 2] {
    len.to_be_bytes()
}

fn checked_len<E>(payload: &[u8], max_payload: u16) -> Result<u16, PacketError<E>> {
    match u16::try_from(payload.len()) {
        Ok(len) if len > 0 && len <= max_payload => Ok(len),
        Ok(len) => Err(PacketError::InvalidLength(len)),
        Err(_) => Err(PacketError::InvalidLength(u16::MAX)),
    }
}

/// Write one length-prefixed packet to a blocking serial writer
pub fn write_packet<W: embedded_io::Write>(
    writer: &mut W,
    payload: &[u8],
    max_payload: u16,
) -> Result<(), PacketError<W::Error>> {
    let len = checked_len(payload, max_payload)?;
    writer.write_all(&encode_prefix(len)).map_err(PacketError::Io)?;
    writer.write_all(payload).map_err(PacketError::Io)?;
    Ok(())
}

/// Read one length-prefixed packet into `buf`, returning the payload length.
///
/// A bad prefix is reported without consuming anything past it, so the caller
/// can keep reading and pick up the next header.
pub fn read_packet<R: embedded_io::Read>(
    reader: &mut R,
    buf: &mut [u8],
    max_payload: u16,
) -> Result<usize, PacketError<R::Error>> {
    let mut prefix = [0u8; 2];
    reader.read_exact(&mut prefix)?;
    let len = u16::from_be_bytes(prefix);
    if len == 0 || len > max_payload {
        return Err(PacketError::InvalidLength(len));
    }
    let dest = buf.get_mut(..len as usize).ok_or(PacketError::BufferTooSmall)?;
    reader.read_exact(dest)?;
    Ok(len as usize)
}

/// Async variant of [`write_packet`]
pub async fn write_packet_async<W: embedded_io_async::Write>(
    writer: &mut W,
    payload: &[u8],
    max_payload: u16,
) -> Result<(), PacketError<W::Error>> {
    let len = checked_len(payload, max_payload)?;
    writer
        .write_all(&encode_prefix(len))
        .await
        .map_err(PacketError::Io)?;
    writer.write_all(payload).await.map_err(PacketError::Io)?;
    Ok(())
}

/// Async variant of [`read_packet`]
pub async fn read_packet_async<R: embedded_io_async::Read>(
    reader: &mut R,
    buf: &mut [u8],
    max_payload: u16,
) -> Result<usize, PacketError<R::Error>> {
    let mut prefix = [0u8; 2];
    reader.read_exact(&mut prefix).await?;
    let len = u16::from_be_bytes(prefix);
    if len == 0 || len > max_payload {
        return Err(PacketError::InvalidLength(len));
    }
    let dest = buf.get_mut(..len as usize).ok_or(PacketError::BufferTooSmall)?;
    reader.read_exact(dest).await?;
    Ok(len as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::CircularChannel;

    #[test]
    fn test_line_settings() {
        let line = SerialLine::new_8n1(460_800);
        assert_eq!(line.data_bits, 8);
        assert_eq!(line.parity, Parity::None);
        assert_eq!(line.stop_bits, 1);
        assert_eq!(line.clock_divider(80_000_000), Some(173));
        assert_eq!(SerialLine::new_8n1(0).clock_divider(80_000_000), None);
    }

    #[test]
    fn test_rx_fifo_overflow_counted_per_byte() {
        let mut inbound: CircularChannel<8> = CircularChannel::new();
        let mut outbound: CircularChannel<8> = CircularChannel::new();
        let signal = OutboundSignal::new();
        let (rx_prod, _rx_cons) = inbound.split();
        let (_tx_prod, tx_cons) = outbound.split();
        let mut port = SerialPort::new(rx_prod, tx_cons, &signal);

        assert_eq!(port.on_receive(&[0u8; 10]), 7);
        assert!(!port.on_receive_byte(0xFF));
        assert_eq!(inbound.overflow_count(), 4);
    }

    #[test]
    fn test_tx_fifo_fill_and_signal() {
        let mut inbound: CircularChannel<8> = CircularChannel::new();
        let mut outbound: CircularChannel<16> = CircularChannel::new();
        let signal = OutboundSignal::new();
        let (rx_prod, _rx_cons) = inbound.split();
        let (mut tx_prod, tx_cons) = outbound.split();
        let mut port = SerialPort::new(rx_prod, tx_cons, &signal);

        assert!(tx_prod.write_packet(&[0xA1, 0xA2, 0xA3]));
        signal.raise();
        assert!(port.tx_pending());

        let mut wire = [0u8; 8];
        let mut at = 0;
        assert_eq!(
            port.fill_tx_fifo(2, |b| {
                wire[at] = b;
                at += 1;
            }),
            2
        );
        assert!(signal.is_raised());

        let moved = port.fill_tx_fifo(TX_FIFO_DEPTH, |b| {
            wire[at] = b;
            at += 1;
        });
        assert_eq!(moved, 3);
        assert_eq!(&wire[..5], &[0x00, 0x03, 0xA1, 0xA2, 0xA3]);
        assert!(!signal.is_raised());
        assert!(!port.tx_pending());
    }

    #[test]
    fn test_blocking_packet_codec() {
        let mut wire = [0u8; 32];
        let mut writer: &mut [u8] = &mut wire;
        write_packet(&mut writer, &[1, 2, 3], 256).unwrap();
        write_packet(&mut writer, &[4], 256).unwrap();
        assert_eq!(
            write_packet(&mut writer, &[], 256),
            Err(PacketError::InvalidLength(0))
        );

        let mut reader: &[u8] = &wire[..];
        let mut buf = [0u8; 16];
        assert_eq!(read_packet(&mut reader, &mut buf, 256), Ok(3));
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(read_packet(&mut reader, &mut buf, 256), Ok(1));
        assert_eq!(buf[0], 4);
    }

    #[test]
    fn test_read_packet_rejects_bad_prefix() {
        let mut reader: &[u8] = &[0x01, 0x01, 0x00, 0x01, 0x09];
        let mut buf = [0u8; 300];
        assert_eq!(
            read_packet(&mut reader, &mut buf, 256),
            Err(PacketError::InvalidLength(257))
        );
        assert_eq!(read_packet(&mut reader, &mut buf, 256), Ok(1));
        assert_eq!(buf[0], 0x09);

        let mut short: &[u8] = &[0x00, 0x05, 0x01];
        assert_eq!(
            read_packet(&mut short, &mut buf, 256),
            Err(PacketError::UnexpectedEof)
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_async_packet_codec() {
        let mut wire = [0u8; 16];
        let mut writer: &mut [u8] = &mut wire;
        write_packet_async(&mut writer, &[0x11, 0x22], 256).await.unwrap();

        let mut reader: &[u8] = &wire[..4];
        let mut buf = [0u8; 8];
        assert_eq!(read_packet_async(&mut reader, &mut buf, 256).await, Ok(2));
        assert_eq!(&buf[..2], &[0x11, 0x22]);
    }
}
