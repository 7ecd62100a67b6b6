//! End-to-end exchanges between simulated peers

use std::time::{Duration, Instant};

use rawlink::{BridgeConfig, ChannelError, CounterSnapshot, MacAddress};
use rawlink_host::{Ether, HostError, SimNode};

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(200);

const MAC_A: MacAddress = MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x0A]);
const MAC_B: MacAddress = MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x0B]);
const MAC_C: MacAddress = MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x0C]);

fn pair(ether: &Ether) -> (SimNode, SimNode) {
    let a = SimNode::spawn("node-a", ether, MAC_A, BridgeConfig::default()).unwrap();
    let b = SimNode::spawn("node-b", ether, MAC_B, BridgeConfig::default()).unwrap();
    (a, b)
}

/// Poll counters until `check` passes or the wait runs out
fn wait_for(node: &SimNode, check: impl Fn(&CounterSnapshot) -> bool) -> CounterSnapshot {
    let deadline = Instant::now() + WAIT;
    loop {
        let counters = node.counters().unwrap();
        if check(&counters) || Instant::now() > deadline {
            return counters;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_bidirectional_exchange() {
    let ether = Ether::new();
    let (mut a, mut b) = pair(&ether);

    a.send_packet(&[0xAA, 0xBB, 0xCC]).unwrap();
    assert_eq!(b.recv_packet(WAIT).unwrap(), Some(vec![0xAA, 0xBB, 0xCC]));

    b.send_packet(b"pong").unwrap();
    assert_eq!(a.recv_packet(WAIT).unwrap(), Some(b"pong".to_vec()));

    let counters_a = a.shutdown().unwrap();
    let counters_b = b.shutdown().unwrap();
    assert_eq!(counters_a.tx_ok, 1);
    assert_eq!(counters_a.rx_ok, 1);
    assert_eq!(counters_b.tx_ok, 1);
    assert_eq!(counters_b.rx_ok, 1);
    assert_eq!(ether.station_count(), 0);
}

#[test]
fn test_full_size_packets_arrive_in_order() {
    let ether = Ether::new();
    let (a, mut b) = pair(&ether);

    // Three full packets fit the inbound channel at once
    let packets: Vec<Vec<u8>> = (0..3u8)
        .map(|n| (0..256).map(|i| (i as u8).wrapping_mul(3).wrapping_add(n)).collect())
        .collect();
    for packet in &packets {
        a.send_packet(packet).unwrap();
    }
    for packet in &packets {
        assert_eq!(b.recv_packet(WAIT).unwrap().as_ref(), Some(packet));
    }
}

#[test]
fn test_foreign_link_is_dropped() {
    let ether = Ether::new();
    let (_a, mut b) = pair(&ether);
    let foreign = BridgeConfig {
        filter_key: MacAddress([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]),
        ..BridgeConfig::default()
    };
    let c = SimNode::spawn("node-c", &ether, MAC_C, foreign).unwrap();

    c.send_packet(&[1, 2, 3]).unwrap();
    assert_eq!(b.recv_packet(QUIET).unwrap(), None);

    let counters = wait_for(&b, |c| c.rx_drop >= 1);
    assert_eq!(counters.rx_drop, 1);
    assert_eq!(counters.rx_ok, 0);
}

#[test]
fn test_other_channel_not_heard() {
    let ether = Ether::new();
    let (a, mut b) = pair(&ether);

    a.set_channel(6).unwrap();
    a.send_packet(&[7]).unwrap();
    assert_eq!(b.recv_packet(QUIET).unwrap(), None);
    assert_eq!(b.counters().unwrap(), CounterSnapshot::default());

    b.set_channel(6).unwrap();
    a.send_packet(&[8]).unwrap();
    assert_eq!(b.recv_packet(WAIT).unwrap(), Some(vec![8]));
}

#[test]
fn test_channel_out_of_range() {
    let ether = Ether::new();
    let a = SimNode::spawn("node-a", &ether, MAC_A, BridgeConfig::default()).unwrap();

    assert!(matches!(
        a.set_channel(15),
        Err(HostError::Channel(ChannelError::OutOfRange(15)))
    ));
    assert!(matches!(
        a.set_channel(0),
        Err(HostError::Channel(ChannelError::OutOfRange(0)))
    ));
}

#[test]
fn test_bad_length_prefix_recovers() {
    let ether = Ether::new();
    let (a, mut b) = pair(&ether);

    // 0x0101 = 257 is above the limit; the packet after it still goes out
    a.send_raw(&[0x01, 0x01, 0x00, 0x01, 0x42]).unwrap();
    assert_eq!(b.recv_packet(WAIT).unwrap(), Some(vec![0x42]));

    let counters = wait_for(&a, |c| c.framing_errors >= 1);
    assert_eq!(counters.framing_errors, 1);
    assert_eq!(counters.tx_ok, 1);

    a.reset_counters().unwrap();
    assert_eq!(wait_for(&a, |c| c.tx_ok == 0), CounterSnapshot::default());
}

#[test]
fn test_driver_refusal_counts_tx_error() {
    let ether = Ether::new();
    let (a, mut b) = pair(&ether);

    a.set_refusing(true);
    a.send_packet(&[1]).unwrap();
    let counters = wait_for(&a, |c| c.tx_error >= 1);
    assert_eq!(counters.tx_error, 1);
    assert_eq!(b.recv_packet(QUIET).unwrap(), None);

    a.set_refusing(false);
    a.send_packet(&[2]).unwrap();
    assert_eq!(b.recv_packet(WAIT).unwrap(), Some(vec![2]));
}

#[test]
fn test_invalid_payloads_rejected_locally() {
    let ether = Ether::new();
    let a = SimNode::spawn("node-a", &ether, MAC_A, BridgeConfig::default()).unwrap();

    assert!(matches!(a.send_packet(&[]), Err(HostError::InvalidPayload(0))));
    assert!(matches!(
        a.send_packet(&[0u8; 257]),
        Err(HostError::InvalidPayload(257))
    ));
}
