//! # Bridge Host Simulation
//!
//! Runs `rawlink` bridges on a desktop host so two peers can talk end to end
//! without hardware:
//!
//! - **Ether**: shared air medium, delivers frames per channel
//! - **SimRadio**: `WirelessTransport` on top of the ether
//! - **SimNode**: tick thread plus event thread around one bridge, with the
//!   serial peer side exposed as `send_packet` / `recv_packet`
//! - **config**: JSON configuration files
//!
//! ## Architecture
//!
//! ```text
//! peer A ──serial──► SimNode A ──radio──►┐
//!                                        Ether
//! peer B ◄─serial─── SimNode B ◄─radio───┘
//! ```

pub mod air;
pub mod config;
pub mod error;
pub mod node;
pub mod radio;

pub use air::{Ether, NodeEvent};
pub use error::HostError;
pub use node::SimNode;
pub use radio::SimRadio;
