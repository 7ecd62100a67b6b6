//! Receive filter for captured frames.
//!
//! Runs inside the capture callback, so every stage is a handful of
//! compares and the first failing stage ends the work:
//!
//! 1. modulation and minimum size
//! 2. frame type
//! 3. link identity (addr3 == filter key), which rejects almost all
//!    ambient traffic on a shared channel
//! 4. payload length sanity
//!
//! An accepted payload is appended to the serial-outbound channel as
//! `[LEN_HI][LEN_LO][payload]`. Payload bytes are never inspected.

use crate::channel::Producer;
use crate::counters::Counters;
use crate::frame::{CapturedFrame, MacAddress, RxMetadata, MIN_CAPTURE_LEN};

/// Why a captured frame was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DropReason {
    /// Shorter than metadata + header + FCS
    TooShort,
    /// Not legacy 802.11b/g modulation
    Modulation,
    /// Not a management frame
    FrameType,
    /// Addr3 differs from the filter key
    ForeignLink,
    /// Derived payload length non-positive, too large, or past the capture
    Length,
}

/// Outcome of one captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Verdict {
    /// Forwarded to the serial line
    Accepted { len: u16, rssi: i8 },
    Dropped(DropReason),
}

/// Accept/drop decision for captured frames on one logical link
#[derive(Debug, Clone, Copy)]
pub struct ReceiveFilter {
    link_id: MacAddress,
    max_payload: u16,
}

impl ReceiveFilter {
    pub const fn new(link_id: MacAddress, max_payload: u16) -> Self {
        Self {
            link_id,
            max_payload,
        }
    }

    pub fn link_id(&self) -> MacAddress {
        self.link_id
    }

    pub fn max_payload(&self) -> u16 {
        self.max_payload
    }

    /// Run the filter stages and return the payload of an accepted frame
    pub fn inspect<'a>(&self, captured: &'a [u8]) -> Result<(&'a [u8], RxMetadata), DropReason> {
        if captured.len() < MIN_CAPTURE_LEN {
            return Err(DropReason::TooShort);
        }
        let frame = CapturedFrame::parse(captured).map_err(|_| DropReason::TooShort)?;
        if !frame.metadata.is_legacy() {
            return Err(DropReason::Modulation);
        }

        if !frame.header.is_management() {
            return Err(DropReason::FrameType);
        }

        if frame.header.link_id != self.link_id {
            return Err(DropReason::ForeignLink);
        }

        let len = frame.payload_len();
        if len <= 0 || len > self.max_payload as i32 {
            return Err(DropReason::Length);
        }
        let payload = frame.payload(len as usize).ok_or(DropReason::Length)?;

        Ok((payload, frame.metadata))
    }

    /// Filter one capture and forward it to the serial-outbound channel.
    ///
    /// A drop bumps `rx_drop`; an accept bumps `rx_ok` even when the outbound
    /// channel is full (that loss shows up as outbound overflow instead).
    pub fn process<const N: usize>(
        &self,
        captured: &[u8],
        outbound: &mut Producer<'_, N>,
        counters: &Counters,
    ) -> Verdict {
        match self.inspect(captured) {
            Ok((payload, metadata)) => {
                counters.record_rx_ok();
                if !outbound.write_packet(payload) {
                    trace!("rx: outbound full, {} bytes lost", payload.len());
                }
                trace!("rx: {} bytes rssi={}", payload.len(), metadata.rssi);
                Verdict::Accepted {
                    len: payload.len() as u16,
                    rssi: metadata.rssi,
                }
            }
            Err(reason) => {
                counters.record_rx_drop();
                if reason == DropReason::Length {
                    trace!("rx: bad payload length");
                }
                Verdict::Dropped(reason)
            }
        }
    }
}
