//! # Bridge Composition
//!
//! [`Bridge`] owns every piece of state shared between execution contexts.
//! [`Bridge::split`] hands out one handle per context:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                              Bridge                              │
//! │                                                                  │
//! │  SerialPort (UART ISR)                                           │
//! │   RX FIFO ──► inbound ──► Uplink (tick) ──► WirelessTransport    │
//! │                            reassembler        transmit           │
//! │                            transmitter                           │
//! │                                                                  │
//! │  TX FIFO ◄── outbound ◄── Downlink (capture / tx-done callbacks) │
//! │                            receive filter                        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The handles touch shared state only through the channels (SPSC) and the
//! atomic counters and flags, so none of them needs a lock.

use crate::channel::{CircularChannel, Consumer, Producer};
use crate::config::BridgeConfig;
use crate::counters::{CounterSnapshot, Counters};
use crate::error::{ChannelError, ConfigError, TransmitError};
use crate::filter::{ReceiveFilter, Verdict};
use crate::frame::{FrameBuilder, MacAddress};
use crate::radio::{validate_channel, Transmitter, TxGate, WirelessTransport};
use crate::reassembler::{Poll, Reassembler};
use crate::serial::{OutboundSignal, SerialPort};

/// Shared state of one bridge instance.
///
/// `RX`/`TX` are the serial-inbound and serial-outbound channel sizes and
/// `MAX` the largest payload the buffers can hold.
pub struct Bridge<const RX: usize, const TX: usize, const MAX: usize> {
    config: BridgeConfig,
    inbound: CircularChannel<RX>,
    outbound: CircularChannel<TX>,
    counters: Counters,
    gate: TxGate,
    signal: OutboundSignal,
}

/// Per-context handles produced by [`Bridge::split`]
pub struct BridgeHandles<'a, T, const RX: usize, const TX: usize, const MAX: usize> {
    pub serial: SerialPort<'a, RX, TX>,
    pub downlink: Downlink<'a, TX>,
    pub uplink: Uplink<'a, T, RX, TX, MAX>,
}

impl<const RX: usize, const TX: usize, const MAX: usize> Bridge<RX, TX, MAX> {
    /// Validate `config` against the compiled sizes and build the bridge
    pub fn new(config: BridgeConfig) -> Result<Self, ConfigError> {
        config.validate(MAX)?;
        for (configured, compiled) in [(config.rx_capacity, RX), (config.tx_capacity, TX)] {
            if configured as usize != compiled {
                return Err(ConfigError::CapacityMismatch {
                    configured,
                    compiled: compiled as u32,
                });
            }
        }

        Ok(Self {
            config,
            inbound: CircularChannel::new(),
            outbound: CircularChannel::new(),
            counters: Counters::new(),
            gate: TxGate::new(),
            signal: OutboundSignal::new(),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Tune the radio and hand out the per-context handles.
    ///
    /// Buffered bytes from an earlier split are discarded and the transmit
    /// gate re-armed; counters keep running.
    pub fn split<T: WirelessTransport>(
        &mut self,
        mut transport: T,
    ) -> Result<BridgeHandles<'_, T, RX, TX, MAX>, ChannelError> {
        let channel = validate_channel(self.config.channel)?;
        transport.set_channel(channel)?;

        self.inbound.clear();
        self.outbound.clear();
        self.gate.complete();
        self.signal.lower();

        let source = transport.mac_address();
        info!("bridge: channel {} max payload {}", channel, self.config.max_payload);

        // `self` stays mutably borrowed for the lifetime of the handles, so
        // each channel has exactly one producer and one consumer.
        let this: &Self = self;
        let (inbound_tx, inbound_rx) = this.inbound.split_shared();
        let (outbound_tx, outbound_rx) = this.outbound.split_shared();

        let max_payload = this.config.max_payload;
        let filter_key = this.config.filter_key;

        Ok(BridgeHandles {
            serial: SerialPort::new(inbound_tx, outbound_rx, &this.signal),
            downlink: Downlink {
                outbound: outbound_tx,
                filter: ReceiveFilter::new(filter_key, max_payload),
                counters: &this.counters,
                gate: &this.gate,
                signal: &this.signal,
            },
            uplink: Uplink {
                inbound: inbound_rx,
                reassembler: Reassembler::new(max_payload),
                transmitter: Transmitter::new(
                    FrameBuilder::new(source, filter_key),
                    &this.gate,
                    max_payload,
                ),
                transport,
                bridge: this,
            },
        })
    }

    /// All counters, including channel overflows
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            tx_ok: self.counters.tx_ok(),
            tx_error: self.counters.tx_error(),
            rx_ok: self.counters.rx_ok(),
            rx_drop: self.counters.rx_drop(),
            rx_overflow: self.inbound.overflow_count(),
            tx_overflow: self.outbound.overflow_count(),
            framing_errors: self.counters.framing_errors(),
        }
    }

    /// Zero every counter in one critical section
    pub fn reset_counters(&self) {
        critical_section::with(|_| {
            self.counters.clear();
            self.inbound.reset_overflow();
            self.outbound.reset_overflow();
        });
        info!("bridge: counters reset");
    }
}

/// Outcome of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Tick {
    /// Nothing completed this tick
    Idle,
    /// A payload went to the radio with this sequence number
    Sent { len: u16, sequence: u16 },
    /// A payload was complete but could not be sent
    Dropped { len: u16, reason: TransmitError },
    /// A bad length prefix was discarded
    Malformed(u16),
}

/// Tick-context handle: serial-inbound → reassembler → radio
pub struct Uplink<'a, T, const RX: usize, const TX: usize, const MAX: usize> {
    inbound: Consumer<'a, RX>,
    reassembler: Reassembler<MAX>,
    transmitter: Transmitter<'a>,
    transport: T,
    bridge: &'a Bridge<RX, TX, MAX>,
}

impl<'a, T: WirelessTransport, const RX: usize, const TX: usize, const MAX: usize>
    Uplink<'a, T, RX, TX, MAX>
{
    /// Periodic task body: advance reassembly and send a completed packet
    pub fn tick(&mut self) -> Tick {
        match self.reassembler.poll(&mut self.inbound) {
            Poll::Pending => Tick::Idle,
            Poll::Malformed(len) => {
                self.bridge.counters.record_framing_error();
                debug!("uart: bad length {}", len);
                Tick::Malformed(len)
            }
            Poll::Complete(len) => {
                let result = self.transmitter.send(
                    &mut self.transport,
                    self.reassembler.frame_buffer_mut(),
                    len,
                    &self.bridge.counters,
                );
                match result {
                    Ok(sequence) => Tick::Sent { len, sequence },
                    Err(reason) => Tick::Dropped { len, reason },
                }
            }
        }
    }

    /// Change the radio channel at runtime
    pub fn set_channel(&mut self, channel: u8) -> Result<(), ChannelError> {
        let channel = validate_channel(channel).inspect_err(|_| {
            warn!("radio: invalid channel {}", channel);
        })?;
        self.transport.set_channel(channel)?;
        info!("radio: channel changed to {}", channel);
        Ok(())
    }

    pub fn channel(&self) -> u8 {
        self.transport.channel()
    }

    pub fn mac_address(&self) -> MacAddress {
        self.transport.mac_address()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.bridge.snapshot()
    }

    pub fn reset_counters(&self) {
        self.bridge.reset_counters();
    }

    /// Whether the radio is free for the next frame
    pub fn tx_ready(&self) -> bool {
        self.bridge.gate.is_ready()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

/// Event-context handle: captured frames → filter → serial-outbound
pub struct Downlink<'a, const TX: usize> {
    outbound: Producer<'a, TX>,
    filter: ReceiveFilter,
    counters: &'a Counters,
    gate: &'a TxGate,
    signal: &'a OutboundSignal,
}

impl<'a, const TX: usize> Downlink<'a, TX> {
    /// Promiscuous capture callback body
    pub fn on_capture(&mut self, captured: &[u8]) -> Verdict {
        let verdict = self.filter.process(captured, &mut self.outbound, self.counters);
        if let Verdict::Accepted { .. } = verdict {
            self.signal.raise();
        }
        verdict
    }

    /// Transmit completion callback body
    pub fn on_transmit_complete(&self) {
        self.gate.complete();
    }

    /// The gate itself, for platforms that register the completion callback
    /// separately from the capture callback
    pub fn tx_gate(&self) -> &'a TxGate {
        self.gate
    }

    pub fn filter(&self) -> &ReceiveFilter {
        &self.filter
    }
}
