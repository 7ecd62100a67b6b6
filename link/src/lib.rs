//! # Raw 802.11 Link Bridge
//!
//! This crate is the core of a transparent UART ↔ radio bridge:
//!
//! - **Circular Channels**: Lock-free SPSC byte channels between interrupt
//!   context and the tick task
//! - **Frame Codec**: 802.11 probe-request headers and captured-frame metadata
//! - **Receive Filter**: Accept only management frames carrying our link id
//! - **Reassembler**: Length-prefixed packets out of the serial byte stream
//!
//! ## Architecture
//!
//! ```text
//! UART RX ──► inbound channel ──► Reassembler ──► FrameBuilder ──► radio TX
//!
//! UART TX ◄── outbound channel ◄── ReceiveFilter ◄──────────────── radio RX
//! ```
//!
//! Payloads are opaque. Encryption, integrity and retransmission are the
//! business of the peer above the serial boundary.
//!
//! ## Execution Model
//!
//! 1. The UART interrupt only moves bytes between FIFOs and channels
//! 2. The capture callback filters and appends whole packets
//! 3. A periodic tick reassembles at most one packet and sends it
//! 4. Nothing allocates after [`Bridge::new`]

#![cfg_attr(not(feature = "std"), no_std)]

#[macro_use]
mod fmt;

pub mod bridge;
pub mod channel;
pub mod config;
pub mod counters;
pub mod error;
pub mod filter;
pub mod frame;
pub mod radio;
pub mod reassembler;
pub mod serial;

// Re-export main types for convenience
pub use bridge::{Bridge, BridgeHandles, Downlink, Tick, Uplink};
pub use channel::{CircularChannel, Consumer, Producer};
pub use config::BridgeConfig;
pub use counters::{CounterSnapshot, Counters};
pub use error::{AddressParseError, ChannelError, ConfigError, FrameError, PacketError, TransmitError};
pub use filter::{DropReason, ReceiveFilter, Verdict};
pub use frame::{CapturedFrame, FrameBuffer, FrameBuilder, LinkHeader, MacAddress, RxMetadata};
pub use radio::{TxGate, WirelessTransport};
pub use reassembler::{ByteSource, Poll, Reassembler};
pub use serial::{read_packet, write_packet, OutboundSignal, SerialPort};

/// Library version for peer compatibility checks
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Largest payload carried in one frame
pub const DEFAULT_MAX_PAYLOAD: usize = 256;

/// Bridge with the default channel and payload sizes
pub type DefaultBridge = Bridge<1024, 1024, DEFAULT_MAX_PAYLOAD>;
