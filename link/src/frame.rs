//! # 802.11 Link Frame Codec
//!
//! Builds the header of outgoing frames and parses the metadata and header
//! of captured ones.
//!
//! ## Frame Format
//!
//! ```text
//! ┌────────┬──────────┬───────────┬───────────┬───────────┬─────────┬─────────┐
//! │   FC   │ Duration │   Addr1   │   Addr2   │   Addr3   │ SeqCtrl │ Payload │
//! │ 2 (LE) │  2 (LE)  │ broadcast │ our MAC   │ link key  │ 2 (LE)  │  ≤ MAX  │
//! └────────┴──────────┴───────────┴───────────┴───────────┴─────────┴─────────┘
//! ```
//!
//! Frames go out as probe requests (management type 0, subtype 4). The radio
//! only captures management frames with their payload intact: data frames
//! are truncated to a few bytes and beacons get their first 8 payload bytes
//! overwritten with the TSF timestamp.
//!
//! ## Captured Buffer
//!
//! ```text
//! ┌──────────────────┬───────────────┬──────────────────────┐
//! │  RxMetadata (12) │  Header (24)  │  Payload ... [FCS 4] │
//! └──────────────────┴───────────────┴──────────────────────┘
//! ```

use core::fmt;
use core::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{AddressParseError, FrameError};

/// Size of the 802.11 MAC header we emit and expect
pub const HEADER_LEN: usize = 24;

/// Trailing frame check sequence counted in the reported frame length
pub const FCS_LEN: usize = 4;

/// Receive metadata block the radio prepends to every capture
pub const METADATA_LEN: usize = 12;

/// Smallest capture worth parsing: metadata, header and FCS
pub const MIN_CAPTURE_LEN: usize = METADATA_LEN + HEADER_LEN + FCS_LEN;

/// Frame control for a probe request, as the little-endian u16 on air
pub const FC_PROBE_REQUEST: u16 = 0x0040;

/// Type bits of the frame control field
pub const FC_TYPE_MASK: u16 = 0x000C;

/// Management frame type
pub const FC_TYPE_MANAGEMENT: u16 = 0x0000;

/// Sequence numbers wrap at 12 bits
pub const SEQUENCE_MODULO: u16 = 4096;

/// Six-byte 802.11 address
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);

    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    fn from_slice(bytes: &[u8]) -> Self {
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&bytes[..6]);
        Self(octets)
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({})", self)
    }
}

impl FromStr for MacAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or(AddressParseError)?;
            if part.len() != 2 {
                return Err(AddressParseError);
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| AddressParseError)?;
        }
        if parts.next().is_some() {
            return Err(AddressParseError);
        }
        Ok(Self(octets))
    }
}

// Text formats get "AA:BB:CC:DD:EE:00", binary formats get the raw octets.
impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MacVisitor;

        impl<'de> Visitor<'de> for MacVisitor {
            type Value = MacAddress;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a MAC address like \"AA:BB:CC:DD:EE:00\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<MacAddress, E> {
                v.parse().map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_str(MacVisitor)
        } else {
            <[u8; 6]>::deserialize(deserializer).map(MacAddress)
        }
    }
}

/// Parsed 24-byte 802.11 MAC header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkHeader {
    pub frame_control: u16,
    pub duration: u16,
    /// Addr1: receiver
    pub destination: MacAddress,
    /// Addr2: transmitter
    pub source: MacAddress,
    /// Addr3: the logical link identifier (filter key)
    pub link_id: MacAddress,
    /// `[15:4]` sequence number, `[3:0]` fragment number
    pub sequence_control: u16,
}

impl LinkHeader {
    /// Parse the header from the first 24 bytes of `bytes`
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_LEN {
            return Err(FrameError::TooShort);
        }

        Ok(Self {
            frame_control: u16::from_le_bytes([bytes[0], bytes[1]]),
            duration: u16::from_le_bytes([bytes[2], bytes[3]]),
            destination: MacAddress::from_slice(&bytes[4..10]),
            source: MacAddress::from_slice(&bytes[10..16]),
            link_id: MacAddress::from_slice(&bytes[16..22]),
            sequence_control: u16::from_le_bytes([bytes[22], bytes[23]]),
        })
    }

    /// Serialize into the fixed on-air layout
    pub fn write_to(&self, out: &mut [u8; HEADER_LEN]) {
        out[0..2].copy_from_slice(&self.frame_control.to_le_bytes());
        out[2..4].copy_from_slice(&self.duration.to_le_bytes());
        out[4..10].copy_from_slice(&self.destination.0);
        out[10..16].copy_from_slice(&self.source.0);
        out[16..22].copy_from_slice(&self.link_id.0);
        out[22..24].copy_from_slice(&self.sequence_control.to_le_bytes());
    }

    /// Type bits of the frame control field
    pub fn frame_type(&self) -> u16 {
        self.frame_control & FC_TYPE_MASK
    }

    pub fn is_management(&self) -> bool {
        self.frame_type() == FC_TYPE_MANAGEMENT
    }

    /// 12-bit sequence number
    pub fn sequence(&self) -> u16 {
        self.sequence_control >> 4
    }

    pub fn fragment(&self) -> u8 {
        (self.sequence_control & 0x000F) as u8
    }
}

/// Receive metadata the radio prepends to each capture.
///
/// Three little-endian words of packed bitfields; only the fields the
/// bridge uses are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxMetadata {
    /// Signal strength in dBm
    pub rssi: i8,
    /// PHY rate code
    pub rate: u8,
    /// Group-addressed frame
    pub is_group: bool,
    /// 0 = legacy 802.11b/g, non-zero = 802.11n
    pub sig_mode: u8,
    /// Over-the-air frame length: header + payload + FCS
    pub legacy_length: u16,
    /// Channel the frame was received on
    pub channel: u8,
}

impl RxMetadata {
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < METADATA_LEN {
            return Err(FrameError::TooShort);
        }

        let word0 = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let word2 = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);

        Ok(Self {
            rssi: (word0 & 0xFF) as u8 as i8,
            rate: ((word0 >> 8) & 0x0F) as u8,
            is_group: (word0 >> 12) & 0x01 != 0,
            sig_mode: ((word0 >> 14) & 0x03) as u8,
            legacy_length: ((word0 >> 16) & 0x0FFF) as u16,
            channel: ((word2 >> 16) & 0x0F) as u8,
        })
    }

    /// Pack into the radio's layout. Fields not modelled are left zero.
    pub fn write_to(&self, out: &mut [u8; METADATA_LEN]) {
        let word0 = (self.rssi as u8 as u32)
            | ((self.rate as u32 & 0x0F) << 8)
            | ((self.is_group as u32) << 12)
            | ((self.sig_mode as u32 & 0x03) << 14)
            | ((self.legacy_length as u32 & 0x0FFF) << 16);
        let word2 = (self.channel as u32 & 0x0F) << 16;

        out[0..4].copy_from_slice(&word0.to_le_bytes());
        out[4..8].fill(0);
        out[8..12].copy_from_slice(&word2.to_le_bytes());
    }

    /// Baseline legacy modulation
    pub fn is_legacy(&self) -> bool {
        self.sig_mode == 0
    }
}

/// A captured buffer split into metadata, header and what follows it
#[derive(Debug, Clone, Copy)]
pub struct CapturedFrame<'a> {
    pub metadata: RxMetadata,
    pub header: LinkHeader,
    body: &'a [u8],
}

impl<'a> CapturedFrame<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, FrameError> {
        if buf.len() < METADATA_LEN + HEADER_LEN {
            return Err(FrameError::TooShort);
        }
        let metadata = RxMetadata::parse(buf)?;
        let header = LinkHeader::parse(&buf[METADATA_LEN..])?;

        Ok(Self {
            metadata,
            header,
            body: &buf[METADATA_LEN + HEADER_LEN..],
        })
    }

    /// Payload length derived from the reported frame length.
    ///
    /// Assumes the radio's legacy length always includes the FCS. Signed so
    /// that runt frames come out non-positive; callers validate the result.
    pub fn payload_len(&self) -> i32 {
        self.metadata.legacy_length as i32 - HEADER_LEN as i32 - FCS_LEN as i32
    }

    /// The first `len` bytes after the header, if the capture holds them
    pub fn payload(&self, len: usize) -> Option<&'a [u8]> {
        self.body.get(..len)
    }
}

/// Contiguous storage for one outgoing frame.
///
/// The reassembler fills `payload` straight from the serial channel and the
/// transmitter writes `header` in front of it, so the frame goes to the radio
/// without another copy.
#[repr(C)]
pub struct FrameBuffer<const MAX: usize> {
    header: [u8; HEADER_LEN],
    payload: [u8; MAX],
}

impl<const MAX: usize> FrameBuffer<MAX> {
    pub const fn new() -> Self {
        Self {
            header: [0u8; HEADER_LEN],
            payload: [0u8; MAX],
        }
    }

    pub fn header_mut(&mut self) -> &mut [u8; HEADER_LEN] {
        &mut self.header
    }

    pub fn payload(&self) -> &[u8; MAX] {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut [u8; MAX] {
        &mut self.payload
    }

    /// Header followed by the first `payload_len` payload bytes
    pub fn frame(&self, payload_len: usize) -> &[u8] {
        let len = HEADER_LEN + payload_len.min(MAX);
        // SAFETY: repr(C) with two u8 arrays has no padding, so `header` and
        // `payload` are one contiguous run of HEADER_LEN + MAX bytes.
        unsafe { core::slice::from_raw_parts(self as *const Self as *const u8, len) }
    }
}

impl<const MAX: usize> Default for FrameBuffer<MAX> {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds outgoing frame headers and owns the running sequence number
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    sequence: u16,
    source: MacAddress,
    link_id: MacAddress,
}

impl FrameBuilder {
    pub const fn new(source: MacAddress, link_id: MacAddress) -> Self {
        Self {
            sequence: 0,
            source,
            link_id,
        }
    }

    /// Sequence number the next build will use
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn source(&self) -> MacAddress {
        self.source
    }

    pub fn link_id(&self) -> MacAddress {
        self.link_id
    }

    /// Get the next sequence number and increment (mod 4096)
    pub fn next_sequence(&mut self) -> u16 {
        let seq = self.sequence;
        self.sequence = (self.sequence + 1) % SEQUENCE_MODULO;
        seq
    }

    /// Write a fresh header and return the sequence number it carries
    pub fn write_header(&mut self, out: &mut [u8; HEADER_LEN]) -> u16 {
        let sequence = self.next_sequence();
        let header = LinkHeader {
            frame_control: FC_PROBE_REQUEST,
            duration: 0,
            destination: MacAddress::BROADCAST,
            source: self.source,
            link_id: self.link_id,
            sequence_control: (sequence << 4) & 0xFFF0,
        };
        header.write_to(out);
        sequence
    }

    /// Build a complete frame (header + payload) into `out`.
    ///
    /// The sequence number advances on every call, including ones that fail.
    /// Returns the number of bytes written.
    pub fn build(&mut self, payload: &[u8], out: &mut [u8]) -> Result<usize, FrameError> {
        let mut header = [0u8; HEADER_LEN];
        self.write_header(&mut header);

        let total = HEADER_LEN + payload.len();
        if out.len() < total {
            return Err(FrameError::BufferTooSmall);
        }
        out[..HEADER_LEN].copy_from_slice(&header);
        out[HEADER_LEN..total].copy_from_slice(payload);
        Ok(total)
    }
}
