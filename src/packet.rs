use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;
use std::net::{SocketAddr, SocketAddrV4};

/// One captured UDP datagram with the addresses it travelled between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpFrame {
    pub src: SocketAddr,
    pub dst: SocketAddr,
    pub payload: Vec<u8>,
}

/// Decode a raw Ethernet frame down to its UDP datagram.
///
/// Returns `None` for anything that is not Ethernet/IPv4/UDP. The capture
/// source runs without a filter, so rejected frames are expected in bulk and
/// are not worth logging.
pub fn decode(data: &[u8]) -> Option<UdpFrame> {
    let ethernet = EthernetPacket::new(data)?;

    if ethernet.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }

    let ipv4 = Ipv4Packet::new(ethernet.payload())?;

    if ipv4.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
        return None;
    }

    let udp = UdpPacket::new(ipv4.payload())?;

    let src = SocketAddr::V4(SocketAddrV4::new(ipv4.get_source(), udp.get_source()));
    let dst = SocketAddr::V4(SocketAddrV4::new(ipv4.get_destination(), udp.get_destination()));

    Some(UdpFrame {
        src,
        dst,
        payload: udp.payload().to_vec(),
    })
}
