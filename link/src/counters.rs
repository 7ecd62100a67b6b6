//! Bridge statistics.
//!
//! Every counter has exactly one incrementing context: the capture callback
//! owns `rx_ok`/`rx_drop`, the tick task owns `tx_ok`/`tx_error`/
//! `framing_errors`. A reset can still come from another context, so targets
//! with atomic read-modify-write increment with `fetch_add`. Targets without
//! it (the ESP8266's Xtensa LX106) fall back to a load and store, where a
//! reset racing an increment may be lost.

use core::sync::atomic::{AtomicU32, Ordering};

use heapless::Vec;
use serde::{Deserialize, Serialize};

/// Largest postcard encoding of a [`CounterSnapshot`]
pub const SNAPSHOT_BLOB_MAX: usize = 35;

/// Add `n` to a counter
#[inline]
#[cfg(target_has_atomic = "32")]
pub(crate) fn bump(counter: &AtomicU32, n: u32) {
    counter.fetch_add(n, Ordering::Relaxed);
}

/// Add `n` to a counter that only one context ever increments
#[inline]
#[cfg(not(target_has_atomic = "32"))]
pub(crate) fn bump(counter: &AtomicU32, n: u32) {
    let current = counter.load(Ordering::Relaxed);
    counter.store(current.wrapping_add(n), Ordering::Relaxed);
}

/// Monotonic statistics shared by the tick task and the event context
#[derive(Debug, Default)]
pub struct Counters {
    tx_ok: AtomicU32,
    tx_error: AtomicU32,
    rx_ok: AtomicU32,
    rx_drop: AtomicU32,
    framing_errors: AtomicU32,
}

impl Counters {
    pub const fn new() -> Self {
        Self {
            tx_ok: AtomicU32::new(0),
            tx_error: AtomicU32::new(0),
            rx_ok: AtomicU32::new(0),
            rx_drop: AtomicU32::new(0),
            framing_errors: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn record_tx_ok(&self) {
        bump(&self.tx_ok, 1);
    }

    #[inline]
    pub fn record_tx_error(&self) {
        bump(&self.tx_error, 1);
    }

    #[inline]
    pub fn record_rx_ok(&self) {
        bump(&self.rx_ok, 1);
    }

    #[inline]
    pub fn record_rx_drop(&self) {
        bump(&self.rx_drop, 1);
    }

    /// A serial length prefix of zero or above the payload limit
    #[inline]
    pub fn record_framing_error(&self) {
        bump(&self.framing_errors, 1);
    }

    pub fn tx_ok(&self) -> u32 {
        self.tx_ok.load(Ordering::Relaxed)
    }

    pub fn tx_error(&self) -> u32 {
        self.tx_error.load(Ordering::Relaxed)
    }

    pub fn rx_ok(&self) -> u32 {
        self.rx_ok.load(Ordering::Relaxed)
    }

    pub fn rx_drop(&self) -> u32 {
        self.rx_drop.load(Ordering::Relaxed)
    }

    pub fn framing_errors(&self) -> u32 {
        self.framing_errors.load(Ordering::Relaxed)
    }

    /// Zero every counter at once.
    ///
    /// Masks the event context so no increment lands between two stores.
    pub fn reset(&self) {
        critical_section::with(|_| self.clear());
    }

    /// Zero every counter; caller already holds a critical section
    pub(crate) fn clear(&self) {
        self.tx_ok.store(0, Ordering::Relaxed);
        self.tx_error.store(0, Ordering::Relaxed);
        self.rx_ok.store(0, Ordering::Relaxed);
        self.rx_drop.store(0, Ordering::Relaxed);
        self.framing_errors.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of all bridge counters, including channel overflows
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CounterSnapshot {
    /// Frames handed to the radio
    pub tx_ok: u32,
    /// Packets dropped on the way out (invalid, busy, radio refused)
    pub tx_error: u32,
    /// Captured frames forwarded to the serial line
    pub rx_ok: u32,
    /// Captured frames rejected by the filter
    pub rx_drop: u32,
    /// Serial bytes lost because the inbound channel was full
    pub rx_overflow: u32,
    /// Serial bytes lost because the outbound channel was full
    pub tx_overflow: u32,
    /// Rejected serial length prefixes
    pub framing_errors: u32,
}

impl CounterSnapshot {
    /// Encode with postcard for a diagnostics link
    pub fn encode<'a>(&self, buf: &'a mut [u8]) -> Result<&'a mut [u8], postcard::Error> {
        postcard::to_slice(self, buf)
    }

    /// Encode into a fixed-capacity blob
    pub fn to_vec(&self) -> Result<Vec<u8, SNAPSHOT_BLOB_MAX>, postcard::Error> {
        postcard::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let counters = Counters::new();
        assert_eq!(counters.tx_ok(), 0);
        assert_eq!(counters.tx_error(), 0);
        assert_eq!(counters.rx_ok(), 0);
        assert_eq!(counters.rx_drop(), 0);
        assert_eq!(counters.framing_errors(), 0);
    }

    #[test]
    fn test_record_and_reset() {
        let counters = Counters::new();
        counters.record_tx_ok();
        counters.record_tx_ok();
        counters.record_tx_error();
        counters.record_rx_ok();
        counters.record_rx_drop();
        counters.record_rx_drop();
        counters.record_rx_drop();
        counters.record_framing_error();

        assert_eq!(counters.tx_ok(), 2);
        assert_eq!(counters.tx_error(), 1);
        assert_eq!(counters.rx_ok(), 1);
        assert_eq!(counters.rx_drop(), 3);
        assert_eq!(counters.framing_errors(), 1);

        counters.reset();
        assert_eq!(counters.tx_ok(), 0);
        assert_eq!(counters.rx_drop(), 0);
        assert_eq!(counters.framing_errors(), 0);
    }

    #[test]
    fn test_snapshot_encoding() {
        let snapshot = CounterSnapshot {
            tx_ok: 10,
            tx_error: 1,
            rx_ok: 7,
            rx_drop: 300,
            rx_overflow: 0,
            tx_overflow: 2,
            framing_errors: 1,
        };
        let mut buf = [0u8; 64];
        let encoded = snapshot.encode(&mut buf).unwrap();
        assert_eq!(CounterSnapshot::decode(encoded).unwrap(), snapshot);

        let saturated = CounterSnapshot {
            tx_ok: u32::MAX,
            tx_error: u32::MAX,
            rx_ok: u32::MAX,
            rx_drop: u32::MAX,
            rx_overflow: u32::MAX,
            tx_overflow: u32::MAX,
            framing_errors: u32::MAX,
        };
        let blob = saturated.to_vec().unwrap();
        assert_eq!(CounterSnapshot::decode(&blob).unwrap(), saturated);
    }

    #[test]
    fn test_reset_while_counting_from_another_thread() {
        let counters = Counters::new();
        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..20_000 {
                    counters.record_rx_drop();
                }
            });
            for _ in 0..20_000 {
                counters.record_rx_drop();
            }
        });
        // Two incrementing contexts: nothing is lost with fetch_add
        assert_eq!(counters.rx_drop(), 40_000);

        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..1_000 {
                    counters.record_rx_ok();
                }
            });
            s.spawn(|| counters.reset());
        });
        counters.reset();
        assert_eq!(counters.rx_ok(), 0);
        assert_eq!(counters.rx_drop(), 0);
    }
}
