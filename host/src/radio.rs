//! Simulated radio driver.
//!
//! Transmits straight onto an [`Ether`] and reports completion through the
//! node's event queue, like the SDK's send-done callback.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use log::debug;
use rawlink::{ChannelError, MacAddress, TransmitError, WirelessTransport};

use crate::air::{Ether, NodeEvent};

/// Radio attached to a simulated [`Ether`].
///
/// Completion is reported back to the owning node as [`NodeEvent::TxDone`]
/// right after the frame has been put on the air.
pub struct SimRadio {
    id: usize,
    ether: Ether,
    channel: Arc<AtomicU8>,
    mac: MacAddress,
    events: Sender<NodeEvent>,
    refuse: Arc<AtomicBool>,
}

impl SimRadio {
    pub fn attach(ether: &Ether, mac: MacAddress, channel: u8, events: Sender<NodeEvent>) -> Self {
        let channel = Arc::new(AtomicU8::new(channel));
        let id = ether.attach(channel.clone(), events.clone());
        Self {
            id,
            ether: ether.clone(),
            channel,
            mac,
            events,
            refuse: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle that makes the driver refuse frames while set
    pub fn refusal(&self) -> Arc<AtomicBool> {
        self.refuse.clone()
    }
}

impl WirelessTransport for SimRadio {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), TransmitError> {
        if self.refuse.load(Ordering::Acquire) {
            return Err(TransmitError::Rejected);
        }
        self.ether
            .broadcast(self.id, self.channel.load(Ordering::Acquire), frame);
        self.events
            .send(NodeEvent::TxDone)
            .map_err(|_| TransmitError::Rejected)
    }

    fn set_channel(&mut self, channel: u8) -> Result<(), ChannelError> {
        self.channel.store(channel, Ordering::Release);
        debug!("{}: tuned to channel {}", self.mac, channel);
        Ok(())
    }

    fn channel(&self) -> u8 {
        self.channel.load(Ordering::Acquire)
    }

    fn mac_address(&self) -> MacAddress {
        self.mac
    }
}

impl Drop for SimRadio {
    fn drop(&mut self) {
        self.ether.detach(self.id);
    }
}
