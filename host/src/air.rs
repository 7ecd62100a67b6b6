//! # Simulated Air Medium
//!
//! Every transmitted frame is delivered to each other station tuned to the
//! same channel, wrapped the way the radio driver hands captures to the
//! promiscuous callback:
//!
//! ```text
//! ┌──────────────┬─────────────────────────┬─────────┐
//! │ RxMetadata   │ 802.11 frame            │ FCS     │
//! │ 12 bytes     │ header + payload        │ 4 bytes │
//! └──────────────┴─────────────────────────┴─────────┘
//! ```
//!
//! The FCS bytes are zero; nothing above the driver checks them.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::trace;
use rawlink::frame::{FCS_LEN, METADATA_LEN};
use rawlink::RxMetadata;

/// Signal strength reported for every simulated capture
pub const DEFAULT_RSSI: i8 = -40;

/// Everything that can wake a node's event thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// Bytes drained from the UART RX FIFO
    SerialRx(Vec<u8>),
    /// A frame captured in promiscuous mode, metadata first
    Capture(Vec<u8>),
    /// The radio finished the frame in flight
    TxDone,
    Shutdown,
}

struct Station {
    id: usize,
    channel: Arc<AtomicU8>,
    events: Sender<NodeEvent>,
}

struct Medium {
    stations: Vec<Station>,
    next_id: usize,
    rssi: i8,
}

/// Shared broadcast medium; clones refer to the same air
#[derive(Clone)]
pub struct Ether {
    inner: Arc<Mutex<Medium>>,
}

impl Ether {
    pub fn new() -> Self {
        Self::with_rssi(DEFAULT_RSSI)
    }

    pub fn with_rssi(rssi: i8) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Medium {
                stations: Vec::new(),
                next_id: 0,
                rssi,
            })),
        }
    }

    fn medium(&self) -> MutexGuard<'_, Medium> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a station listening on `channel`
    pub(crate) fn attach(&self, channel: Arc<AtomicU8>, events: Sender<NodeEvent>) -> usize {
        let mut medium = self.medium();
        let id = medium.next_id;
        medium.next_id += 1;
        medium.stations.push(Station {
            id,
            channel,
            events,
        });
        id
    }

    pub(crate) fn detach(&self, id: usize) {
        self.medium().stations.retain(|s| s.id != id);
    }

    /// Number of attached stations
    pub fn station_count(&self) -> usize {
        self.medium().stations.len()
    }

    /// Deliver `frame` from station `from` to every other station on
    /// `channel`, returning how many heard it
    pub(crate) fn broadcast(&self, from: usize, channel: u8, frame: &[u8]) -> usize {
        let medium = self.medium();
        let capture = capture_buffer(frame, medium.rssi, channel);
        let mut heard = 0;
        for station in &medium.stations {
            if station.id == from || station.channel.load(Ordering::Acquire) != channel {
                continue;
            }
            if station.events.send(NodeEvent::Capture(capture.clone())).is_ok() {
                heard += 1;
            }
        }
        trace!("air: {} bytes on channel {} heard by {}", frame.len(), channel, heard);
        heard
    }
}

impl Default for Ether {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap a frame in the driver's capture layout
pub fn capture_buffer(frame: &[u8], rssi: i8, channel: u8) -> Vec<u8> {
    let metadata = RxMetadata {
        rssi,
        rate: 0,
        is_group: frame.get(4).is_some_and(|b| b & 0x01 != 0),
        sig_mode: 0,
        legacy_length: (frame.len() + FCS_LEN) as u16,
        channel,
    };
    let mut header = [0u8; METADATA_LEN];
    metadata.write_to(&mut header);

    let mut buf = Vec::with_capacity(METADATA_LEN + frame.len() + FCS_LEN);
    buf.extend_from_slice(&header);
    buf.extend_from_slice(frame);
    buf.extend_from_slice(&[0u8; FCS_LEN]);
    buf
}
