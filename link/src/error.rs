//! Error types for the setup surfaces and the radio boundary.
//!
//! The bridging data path itself never reports errors upward; failures there
//! become counter increments. These types cover construction, configuration,
//! frame building and the transport capability.

use core::fmt;

/// Errors during frame building/parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Output buffer too small for header plus payload
    BufferTooSmall,
    /// Input too short to hold the requested structure
    TooShort,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::BufferTooSmall => f.write_str("output buffer too small for frame"),
            FrameError::TooShort => f.write_str("input too short"),
        }
    }
}

/// Reasons a payload did not make it onto the air
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitError {
    /// Zero-length payload
    Empty,
    /// Payload above the configured maximum
    Oversized,
    /// Previous frame still waiting for its completion notification
    Busy,
    /// The radio driver refused to queue the frame
    Rejected,
}

impl fmt::Display for TransmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransmitError::Empty => f.write_str("empty payload"),
            TransmitError::Oversized => f.write_str("payload exceeds maximum size"),
            TransmitError::Busy => f.write_str("previous transmission still outstanding"),
            TransmitError::Rejected => f.write_str("radio refused the frame"),
        }
    }
}

/// Radio channel change failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelError {
    /// Outside the 2.4 GHz range 1-14
    OutOfRange(u8),
    /// The radio driver refused the change
    Rejected,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::OutOfRange(ch) => write!(f, "channel {} outside 1-14", ch),
            ChannelError::Rejected => f.write_str("radio refused channel change"),
        }
    }
}

/// Invalid configuration inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Baud rate of zero
    InvalidBaudRate,
    /// Radio channel outside 1-14
    InvalidChannel(u8),
    /// Payload limit of zero or above what the build supports
    InvalidMaxPayload { requested: u16, supported: u16 },
    /// Channel capacity not a power of two
    CapacityNotPowerOfTwo(u32),
    /// Configured capacity differs from the compiled buffer size
    CapacityMismatch { configured: u32, compiled: u32 },
    /// Tick period of zero
    InvalidTickPeriod,
    /// Config blob could not be encoded or decoded
    Encoding,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidBaudRate => f.write_str("baud rate must be non-zero"),
            ConfigError::InvalidChannel(ch) => write!(f, "channel {} outside 1-14", ch),
            ConfigError::InvalidMaxPayload {
                requested,
                supported,
            } => write!(
                f,
                "max payload {} must be between 1 and {}",
                requested, supported
            ),
            ConfigError::CapacityNotPowerOfTwo(cap) => {
                write!(f, "channel capacity {} is not a power of two", cap)
            }
            ConfigError::CapacityMismatch {
                configured,
                compiled,
            } => write!(
                f,
                "configured capacity {} does not match compiled capacity {}",
                configured, compiled
            ),
            ConfigError::InvalidTickPeriod => f.write_str("tick period must be non-zero"),
            ConfigError::Encoding => f.write_str("config encoding failed"),
        }
    }
}

impl From<postcard::Error> for ConfigError {
    fn from(_: postcard::Error) -> Self {
        ConfigError::Encoding
    }
}

/// Malformed textual MAC address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressParseError;

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("expected six hex octets separated by ':'")
    }
}

/// Errors reading or writing length-prefixed packets on a serial stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketError<E> {
    /// Underlying I/O error
    Io(E),
    /// Stream ended in the middle of a packet
    UnexpectedEof,
    /// Length prefix of zero or above the limit
    InvalidLength(u16),
    /// Destination buffer smaller than the announced packet
    BufferTooSmall,
}

impl<E: fmt::Debug> fmt::Display for PacketError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::Io(e) => write!(f, "I/O error: {:?}", e),
            PacketError::UnexpectedEof => f.write_str("stream ended mid-packet"),
            PacketError::InvalidLength(len) => write!(f, "invalid packet length {}", len),
            PacketError::BufferTooSmall => f.write_str("buffer too small for packet"),
        }
    }
}

impl<E> From<embedded_io::ReadExactError<E>> for PacketError<E> {
    fn from(e: embedded_io::ReadExactError<E>) -> Self {
        match e {
            embedded_io::ReadExactError::UnexpectedEof => PacketError::UnexpectedEof,
            embedded_io::ReadExactError::Other(e) => PacketError::Io(e),
        }
    }
}

#[cfg(feature = "std")]
mod std_impls {
    use super::*;

    impl std::error::Error for FrameError {}
    impl std::error::Error for TransmitError {}
    impl std::error::Error for ChannelError {}
    impl std::error::Error for ConfigError {}
    impl std::error::Error for AddressParseError {}
    impl<E: fmt::Debug> std::error::Error for PacketError<E> {}
}
