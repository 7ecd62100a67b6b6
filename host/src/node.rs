//! # Threaded Node Runner
//!
//! Each [`SimNode`] drives one bridge the way the radio module does:
//!
//! ```text
//!   node thread (tick)                 event thread (interrupts/callbacks)
//!  ┌────────────────────────┐         ┌───────────────────────────────────┐
//!  │ every tick_period_ms:  │         │ SerialRx  → SerialPort::on_receive│
//!  │   Uplink::tick()       │         │ Capture   → Downlink::on_capture  │
//!  │ control requests       │         │ TxDone    → on_transmit_complete  │
//!  └────────────────────────┘         │ then drain TX FIFO → serial out   │
//!                                     └───────────────────────────────────┘
//! ```
//!
//! The test side plays the serial peer: it writes length-prefixed packets
//! into the node and decodes what comes back out.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rawlink::serial::TX_FIFO_DEPTH;
use rawlink::{
    write_packet, BridgeConfig, BridgeHandles, ChannelError, CounterSnapshot, DefaultBridge,
    MacAddress, Poll, Reassembler, Tick, DEFAULT_MAX_PAYLOAD,
};

use crate::air::{Ether, NodeEvent};
use crate::error::HostError;
use crate::radio::SimRadio;

enum Control {
    SetChannel(u8, Sender<Result<(), ChannelError>>),
    Counters(Sender<CounterSnapshot>),
    ResetCounters,
    Shutdown,
}

/// One simulated radio module plus the serial peer attached to it
pub struct SimNode {
    name: String,
    mac: MacAddress,
    max_payload: u16,
    events: Sender<NodeEvent>,
    control: Sender<Control>,
    serial_out: Receiver<Vec<u8>>,
    decoder: Reassembler<DEFAULT_MAX_PAYLOAD>,
    inbox: Vec<u8>,
    received: VecDeque<Vec<u8>>,
    refuse: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<CounterSnapshot, HostError>>>,
}

impl SimNode {
    /// Build a bridge from `config`, attach its radio to `ether` and start it
    pub fn spawn(
        name: &str,
        ether: &Ether,
        mac: MacAddress,
        config: BridgeConfig,
    ) -> Result<Self, HostError> {
        let bridge = Box::new(DefaultBridge::new(config)?);

        let (events_tx, events_rx) = mpsc::channel();
        let (control_tx, control_rx) = mpsc::channel();
        let (serial_tx, serial_rx) = mpsc::channel();

        let radio = SimRadio::attach(ether, mac, config.channel, events_tx.clone());
        let refuse = radio.refusal();
        let wake = events_tx.clone();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(bridge, radio, events_rx, wake, control_rx, serial_tx))?;

        info!("{}: started as {} on channel {}", name, mac, config.channel);

        Ok(Self {
            name: name.to_string(),
            mac,
            max_payload: config.max_payload,
            events: events_tx,
            control: control_tx,
            serial_out: serial_rx,
            decoder: Reassembler::new(config.max_payload),
            inbox: Vec::new(),
            received: VecDeque::new(),
            refuse,
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    /// Write one length-prefixed packet onto the node's serial input
    pub fn send_packet(&self, payload: &[u8]) -> Result<(), HostError> {
        let mut wire = vec![0u8; payload.len() + 2];
        let mut writer: &mut [u8] = &mut wire;
        write_packet(&mut writer, payload, self.max_payload)
            .map_err(|_| HostError::InvalidPayload(payload.len()))?;
        self.send_raw(&wire)
    }

    /// Write raw bytes onto the node's serial input, framing included
    pub fn send_raw(&self, bytes: &[u8]) -> Result<(), HostError> {
        self.events
            .send(NodeEvent::SerialRx(bytes.to_vec()))
            .map_err(|_| HostError::Disconnected)
    }

    /// Next packet the node wrote to its serial output, or `None` on timeout
    pub fn recv_packet(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, HostError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(packet) = self.received.pop_front() {
                return Ok(Some(packet));
            }
            match self
                .serial_out
                .recv_timeout(deadline.saturating_duration_since(Instant::now()))
            {
                Ok(chunk) => self.decode(&chunk),
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(HostError::Disconnected),
            }
        }
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.inbox.extend_from_slice(chunk);
        let mut source: &[u8] = &self.inbox;
        loop {
            match self.decoder.poll(&mut source) {
                Poll::Complete(len) => self.received.push_back(self.decoder.payload(len).to_vec()),
                Poll::Malformed(len) => warn!("{}: bad length {} on serial output", self.name, len),
                Poll::Pending => break,
            }
        }
        let consumed = self.inbox.len() - source.len();
        self.inbox.drain(..consumed);
    }

    pub fn set_channel(&self, channel: u8) -> Result<(), HostError> {
        self.request(|reply| Control::SetChannel(channel, reply))??;
        Ok(())
    }

    pub fn counters(&self) -> Result<CounterSnapshot, HostError> {
        self.request(Control::Counters)
    }

    pub fn reset_counters(&self) -> Result<(), HostError> {
        self.control
            .send(Control::ResetCounters)
            .map_err(|_| HostError::Disconnected)
    }

    /// Make the radio driver refuse every frame while set
    pub fn set_refusing(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::Release);
    }

    /// Stop both threads and return the final counters
    pub fn shutdown(mut self) -> Result<CounterSnapshot, HostError> {
        self.stop()
    }

    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> Control) -> Result<T, HostError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.control
            .send(make(reply_tx))
            .map_err(|_| HostError::Disconnected)?;
        reply_rx.recv().map_err(|_| HostError::Disconnected)
    }

    fn stop(&mut self) -> Result<CounterSnapshot, HostError> {
        let thread = self.thread.take().ok_or(HostError::Disconnected)?;
        let _ = self.control.send(Control::Shutdown);
        let counters = thread.join().map_err(|_| HostError::Disconnected)??;
        info!("{}: stopped, {:?}", self.name, counters);
        Ok(counters)
    }
}

impl Drop for SimNode {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.stop() {
                warn!("{}: {}", self.name, e);
            }
        }
    }
}

fn run(
    mut bridge: Box<DefaultBridge>,
    radio: SimRadio,
    events: Receiver<NodeEvent>,
    wake: Sender<NodeEvent>,
    control: Receiver<Control>,
    serial_out: Sender<Vec<u8>>,
) -> Result<CounterSnapshot, HostError> {
    let tick = Duration::from_millis(bridge.config().tick_period_ms.into());
    let BridgeHandles {
        mut serial,
        mut downlink,
        mut uplink,
    } = bridge.split(radio)?;

    thread::scope(|s| {
        s.spawn(move || {
            for event in events.iter() {
                match event {
                    NodeEvent::SerialRx(bytes) => {
                        serial.on_receive(&bytes);
                    }
                    NodeEvent::Capture(buf) => {
                        downlink.on_capture(&buf);
                    }
                    NodeEvent::TxDone => downlink.on_transmit_complete(),
                    NodeEvent::Shutdown => break,
                }

                // TX-empty interrupt fires until the outbound channel is dry
                while serial.tx_pending() {
                    let mut chunk = Vec::with_capacity(TX_FIFO_DEPTH);
                    serial.fill_tx_fifo(TX_FIFO_DEPTH, |b| chunk.push(b));
                    if chunk.is_empty() || serial_out.send(chunk).is_err() {
                        break;
                    }
                }
            }
        });

        let mut deadline = Instant::now() + tick;
        loop {
            match control.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(Control::SetChannel(channel, reply)) => {
                    let _ = reply.send(uplink.set_channel(channel));
                }
                Ok(Control::Counters(reply)) => {
                    let _ = reply.send(uplink.counters());
                }
                Ok(Control::ResetCounters) => uplink.reset_counters(),
                Ok(Control::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    match uplink.tick() {
                        Tick::Malformed(len) => warn!("uart: dropped bad length {}", len),
                        Tick::Dropped { len, reason } => debug!("tx: {} bytes dropped: {}", len, reason),
                        Tick::Sent { .. } | Tick::Idle => {}
                    }
                    deadline += tick;
                }
            }
        }
        let _ = wake.send(NodeEvent::Shutdown);
    });

    Ok(uplink.counters())
}
