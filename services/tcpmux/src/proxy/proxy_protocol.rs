//! PROXY protocol v2 header encoding.
//!
//! Written to the backend before any payload when a class has proxy
//! protocol enabled, so the backend learns the original client address.
//!
//! Wire format (HAProxy PROXY protocol, version 2):
//! - 12 bytes signature
//! - 1 byte version and command
//! - 1 byte address family and transport protocol
//! - 2 bytes address block length (big endian)
//! - address block: source addr, destination addr, source port, destination port

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{BufMut, Bytes, BytesMut};

/// PROXY protocol v2 signature.
pub const SIGNATURE: [u8; 12] = [
    0x0D, 0x0A, 0x0D, 0x0A, 0x00, 0x0D, 0x0A, 0x51, 0x55, 0x49, 0x54, 0x0A,
];

/// Version 2, PROXY command.
const VERSION_COMMAND_PROXY: u8 = 0x21;

const AF_INET: u8 = 0x10;
const AF_INET6: u8 = 0x20;
const TRANSPORT_STREAM: u8 = 0x01;

/// Fixed part: signature, version/command, family/transport, length.
const FIXED_LEN: usize = 16;

/// 4 + 4 + 2 + 2
const IPV4_BLOCK_LEN: u16 = 12;

/// 16 + 16 + 2 + 2
const IPV6_BLOCK_LEN: u16 = 36;

/// Addresses of one proxied TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyHeader {
    /// Original client address.
    pub source: SocketAddr,
    /// Address the client connected to.
    pub destination: SocketAddr,
}

enum AddressPair {
    V4(Ipv4Addr, Ipv4Addr),
    V6(Ipv6Addr, Ipv6Addr),
}

impl ProxyHeader {
    pub fn new(source: SocketAddr, destination: SocketAddr) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Encode the header.
    ///
    /// IPv4-mapped IPv6 addresses (dual-stack listeners) are sent as TCP4.
    /// A v4/v6 mix that cannot be expressed as TCP4 is sent as TCP6 with the
    /// IPv4 side mapped.
    pub fn encode(&self) -> Bytes {
        let pair = address_pair(self.source.ip(), self.destination.ip());
        let mut buf = BytesMut::with_capacity(encoded_len(&pair));

        buf.put_slice(&SIGNATURE);
        buf.put_u8(VERSION_COMMAND_PROXY);

        match pair {
            AddressPair::V4(src, dst) => {
                buf.put_u8(AF_INET | TRANSPORT_STREAM);
                buf.put_u16(IPV4_BLOCK_LEN);
                buf.put_slice(&src.octets());
                buf.put_slice(&dst.octets());
            }
            AddressPair::V6(src, dst) => {
                buf.put_u8(AF_INET6 | TRANSPORT_STREAM);
                buf.put_u16(IPV6_BLOCK_LEN);
                buf.put_slice(&src.octets());
                buf.put_slice(&dst.octets());
            }
        }

        buf.put_u16(self.source.port());
        buf.put_u16(self.destination.port());
        buf.freeze()
    }

    /// Length of [`encode`](Self::encode)'s output.
    pub fn encoded_len(&self) -> usize {
        encoded_len(&address_pair(self.source.ip(), self.destination.ip()))
    }
}

/// Header for a connection from `remote` accepted on `local`.
pub fn encode_proxy_header_v2(remote: SocketAddr, local: SocketAddr) -> Bytes {
    ProxyHeader::new(remote, local).encode()
}

fn encoded_len(pair: &AddressPair) -> usize {
    FIXED_LEN
        + match pair {
            AddressPair::V4(..) => IPV4_BLOCK_LEN as usize,
            AddressPair::V6(..) => IPV6_BLOCK_LEN as usize,
        }
}

fn address_pair(source: IpAddr, destination: IpAddr) -> AddressPair {
    match (source, destination) {
        (IpAddr::V4(src), IpAddr::V4(dst)) => AddressPair::V4(src, dst),
        (IpAddr::V6(src), IpAddr::V6(dst)) => match (src.to_ipv4_mapped(), dst.to_ipv4_mapped()) {
            (Some(src), Some(dst)) => AddressPair::V4(src, dst),
            _ => AddressPair::V6(src, dst),
        },
        (IpAddr::V4(src), IpAddr::V6(dst)) => match dst.to_ipv4_mapped() {
            Some(dst) => AddressPair::V4(src, dst),
            None => AddressPair::V6(src.to_ipv6_mapped(), dst),
        },
        (IpAddr::V6(src), IpAddr::V4(dst)) => match src.to_ipv4_mapped() {
            Some(src) => AddressPair::V4(src, dst),
            None => AddressPair::V6(src, dst.to_ipv6_mapped()),
        },
    }
}
