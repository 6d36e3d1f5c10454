use pcap::{Active, Capture};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, info_span};

use crate::conntrack::ConnectionTable;
use crate::forward::Forwarder;
use crate::packet;

#[derive(Default)]
pub struct RelayStats {
    /// Console-side IPv4/UDP frames accepted.
    pub outbound_frames: AtomicU64,
    /// Internet-side IPv4/UDP frames accepted.
    pub inbound_frames: AtomicU64,
    /// Responses dropped because no client ever sent to their source.
    pub unmatched_responses: AtomicU64,
}

/// The relay core: two symmetric capture listeners sharing one connection
/// table and one forwarder.
///
/// Console-side frames teach the table which client talks to which server
/// endpoint and are forwarded toward that endpoint; internet-side frames are
/// reverse-routed through the table back to the recorded client.
pub struct Relay {
    table: Arc<ConnectionTable>,
    forwarder: Arc<Forwarder>,
    stats: RelayStats,
}

impl Relay {
    pub fn new(table: Arc<ConnectionTable>, forwarder: Arc<Forwarder>) -> Self {
        Self {
            table,
            forwarder,
            stats: RelayStats::default(),
        }
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    pub fn table(&self) -> &ConnectionTable {
        &self.table
    }

    /// Consume the console-facing capture source until it closes.
    pub fn run_outbound(&self, capture: Capture<Active>) {
        self.pump(capture, "console", |data| self.handle_outbound_frame(data));
    }

    /// Consume the internet-facing capture source until it closes.
    pub fn run_inbound(&self, capture: Capture<Active>) {
        self.pump(capture, "internet", |data| self.handle_inbound_frame(data));
    }

    /// One console-side frame: learn the return path, forward the payload on
    /// toward the server endpoint. Non-UDP frames fall through untouched.
    pub fn handle_outbound_frame(&self, data: &[u8]) {
        let Some(frame) = packet::decode(data) else {
            return;
        };

        self.stats.outbound_frames.fetch_add(1, Ordering::Relaxed);
        debug!(
            "console frame {} -> {} ({} bytes)",
            frame.src,
            frame.dst,
            frame.payload.len()
        );

        self.table.upsert(frame.dst, frame.src);
        self.forwarder.dispatch(frame.dst, frame.payload);
    }

    /// One internet-side frame: reverse-route the payload to whichever
    /// client last talked to the frame's source. A response from an endpoint
    /// no client ever contacted is dropped without comment.
    pub fn handle_inbound_frame(&self, data: &[u8]) {
        let Some(frame) = packet::decode(data) else {
            return;
        };

        self.stats.inbound_frames.fetch_add(1, Ordering::Relaxed);

        match self.table.lookup(frame.src) {
            Some(client) => {
                debug!(
                    "response {} -> {} ({} bytes)",
                    frame.src,
                    client,
                    frame.payload.len()
                );
                self.forwarder.dispatch(client, frame.payload);
            }
            None => {
                self.stats.unmatched_responses.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn pump(&self, mut capture: Capture<Active>, side: &'static str, handle: impl Fn(&[u8])) {
        let _span = info_span!("capture", side).entered();
        info!("listening on {} capture source", side);

        loop {
            match capture.next_packet() {
                Ok(packet) => handle(packet.data),
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(pcap::Error::NoMorePackets) => break,
                Err(e) => {
                    error!("capture read failed on {} side: {}", side, e);
                    break;
                }
            }
        }

        info!("{} capture source closed", side);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::testutil::{tcp_frame, udp_frame};
    use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
    use std::time::Duration;

    fn loopback_receiver() -> (UdpSocket, SocketAddrV4) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let addr = match socket.local_addr().unwrap() {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => unreachable!(),
        };
        (socket, addr)
    }

    fn make_relay() -> (Relay, Arc<ConnectionTable>, Arc<Forwarder>) {
        let table = Arc::new(ConnectionTable::new());
        let forwarder = Arc::new(Forwarder::new(2, 64));
        let relay = Relay::new(table.clone(), forwarder.clone());
        (relay, table, forwarder)
    }

    fn recv_payload(socket: &UdpSocket) -> Vec<u8> {
        let mut buf = [0u8; 2048];
        let (len, _) = socket.recv_from(&mut buf).unwrap();
        buf[..len].to_vec()
    }

    #[test]
    fn outbound_frame_learns_mapping_and_forwards() {
        let (relay, table, _forwarder) = make_relay();
        let (server_socket, server) = loopback_receiver();
        let client: SocketAddrV4 = "10.0.0.5:40000".parse().unwrap();

        relay.handle_outbound_frame(&udp_frame(client, server, &[0x01, 0x02]));

        assert_eq!(
            table.lookup(SocketAddr::V4(server)),
            Some(SocketAddr::V4(client))
        );
        assert_eq!(recv_payload(&server_socket), vec![0x01, 0x02]);
    }

    #[test]
    fn response_round_trips_to_original_client() {
        let (relay, _table, _forwarder) = make_relay();
        let (server_socket, server) = loopback_receiver();
        let (client_socket, client) = loopback_receiver();

        relay.handle_outbound_frame(&udp_frame(client, server, &[0x01, 0x02]));
        assert_eq!(recv_payload(&server_socket), vec![0x01, 0x02]);

        relay.handle_inbound_frame(&udp_frame(server, client, &[0x99]));
        assert_eq!(recv_payload(&client_socket), vec![0x99]);
    }

    #[test]
    fn unknown_server_endpoint_is_dropped_silently() {
        let (relay, table, forwarder) = make_relay();
        let unknown: SocketAddrV4 = "8.8.8.8:53".parse().unwrap();
        let somewhere: SocketAddrV4 = "10.0.0.5:40000".parse().unwrap();

        relay.handle_inbound_frame(&udp_frame(unknown, somewhere, &[0x42]));

        assert_eq!(forwarder.stats().dispatched.load(Ordering::Relaxed), 0);
        assert_eq!(relay.stats().unmatched_responses.load(Ordering::Relaxed), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn non_udp_frames_touch_nothing() {
        let (relay, table, forwarder) = make_relay();
        let client: SocketAddrV4 = "10.0.0.5:40000".parse().unwrap();
        let server: SocketAddrV4 = "93.184.1.1:80".parse().unwrap();
        let frame = tcp_frame(client, server);

        relay.handle_outbound_frame(&frame);
        relay.handle_inbound_frame(&frame);

        assert!(table.is_empty());
        assert_eq!(forwarder.stats().dispatched.load(Ordering::Relaxed), 0);
        assert_eq!(relay.stats().outbound_frames.load(Ordering::Relaxed), 0);
        assert_eq!(relay.stats().inbound_frames.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn reconnecting_client_takes_over_the_mapping() {
        let (relay, table, _forwarder) = make_relay();
        let (_server_socket, server) = loopback_receiver();
        let first: SocketAddrV4 = "10.0.0.5:40000".parse().unwrap();
        let second: SocketAddrV4 = "10.0.0.5:40001".parse().unwrap();

        relay.handle_outbound_frame(&udp_frame(first, server, &[0x01]));
        relay.handle_outbound_frame(&udp_frame(second, server, &[0x02]));

        assert_eq!(
            table.lookup(SocketAddr::V4(server)),
            Some(SocketAddr::V4(second))
        );
    }
}
