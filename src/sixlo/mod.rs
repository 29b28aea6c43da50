//! 6LoWPAN adaptation layer
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte
//
// Provides an IP-compatible interface over a packet-oriented link device:
// dispatch classification, HC1 header (de)compression, and fragmentation
// and reassembly, per [RFC4944](https://tools.ietf.org/html/rfc4944).

use rand_core::RngCore;

use crate::collections::{vec, Vec};
use crate::error::SixLoError;
use crate::log::{debug, warn, FmtError};

pub mod addr;
pub mod buffer;
pub mod config;
pub mod dispatch;
pub mod frag;
pub mod hc1;
pub mod headers;
pub mod reassembly;

use addr::LinkAddr;
pub use config::SixLoConfig;
use dispatch::Variant;
use headers::{FragHeader, Header, HeaderStorage, Ipv6Header, UdpHeader};
pub use reassembly::DropReason;
use reassembly::{Key, Reassembler, Ts};

/// A packet-oriented link device this core can adapt IPv6 traffic over.
pub trait LinkDevice {
    type Error;

    /// Maximum frame size this link can carry, including any link-layer
    /// header the implementation itself adds.
    fn mtu(&self) -> usize;

    /// This device's own link-layer address.
    fn address(&self) -> LinkAddr;

    fn is_link_up(&self) -> bool {
        true
    }

    fn send(&mut self, dst: LinkAddr, protocol: u16, frame: &[u8]) -> Result<(), Self::Error>;

    /// Poll for a received frame, writing it into `buf`. Returns the
    /// length written along with the sender's address and how the frame
    /// was addressed to us.
    fn poll_receive(&mut self, buf: &mut [u8]) -> Result<Option<(usize, LinkAddr, PacketType)>, Self::Error>;
}

/// How a received frame was addressed.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketType {
    Host,
    Broadcast,
    Multicast,
    OtherHost,
}

/// Observability hook for frames sent, received, and dropped. Mirrors the
/// trace callbacks of the reference network stack this core's interfaces
/// are grounded on.
pub trait Trace {
    fn tx(&mut self, _frame: &[u8]) {}
    fn rx(&mut self, _frame: &[u8]) {}
    fn drop(&mut self, _reason: DropReason) {}
}

/// No-op [`Trace`] implementation, the default when the caller doesn't
/// need observability.
#[derive(Copy, Clone, Default, Debug)]
pub struct NullTrace;

impl Trace for NullTrace {}

/// A fully reassembled and decompressed IPv6 datagram delivered to the
/// upper layer, carried as plain wire-format bytes (40-byte IPv6 header,
/// any transport header, then body) so callers can hand it directly to an
/// IPv6 stack.
pub type Datagram = Vec<u8>;

/// 6LoWPAN adaptation device: dispatch classification, HC1 compression,
/// and fragmentation/reassembly over a generic [`LinkDevice`].
pub struct SixLo<L: LinkDevice, R: RngCore, T: Trace = NullTrace> {
    link: L,
    rng: R,
    trace: T,
    config: SixLoConfig,
    reassembler: Reassembler,
}

impl<L: LinkDevice, R: RngCore, T: Trace> SixLo<L, R, T>
where
    L::Error: FmtError,
{
    pub fn new(link: L, rng: R, trace: T, config: SixLoConfig) -> Self {
        let reassembler = Reassembler::new(config.reassembly);
        Self {
            link,
            rng,
            trace,
            config,
            reassembler,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Send a wire-format IPv6 datagram (as produced by [`Ipv6Header::encode`]
    /// followed by any transport header and body) from this device's own
    /// address to `dst`.
    pub fn send(&mut self, dst: LinkAddr, datagram: &[u8]) -> Result<(), SixLoError<L::Error>> {
        let src = self.link.address();
        self.send_from(src, dst, datagram)
    }

    /// Send a datagram as if it originated from `src`, used when relaying
    /// traffic rather than originating it locally.
    pub fn send_from(&mut self, src: LinkAddr, dst: LinkAddr, datagram: &[u8]) -> Result<(), SixLoError<L::Error>> {
        let mut r = buffer::Reader::new(datagram);
        let ipv6 = Ipv6Header::decode(&mut r)?;

        let udp = if ipv6.next_header == headers::NextHeader::Udp {
            Some(UdpHeader::decode(&mut r)?)
        } else {
            None
        };

        let body = r.rest();

        let mut header_buf = vec![0u8; 64];
        let header_len = {
            let mut w = buffer::Writer::new(&mut header_buf);
            hc1::compress(&mut w, &ipv6, udp.as_ref(), &src, &dst)?;
            w.position()
        };
        let compressed_header = &header_buf[..header_len];

        let mtu = self.config.mtu.min(self.link.mtu());
        let decompressed_header_size = if udp.is_some() { 48 } else { 40 };

        if compressed_header.len() + body.len() <= mtu {
            let mut frame = Vec::with_capacity(compressed_header.len() + body.len());
            frame.extend_from_slice(compressed_header);
            frame.extend_from_slice(body);
            self.trace.tx(&frame);
            self.link.send(dst, self.config.protocol_selector, &frame).map_err(|e| {
                debug!("link send failed: {:?}", e);
                SixLoError::Link(e)
            })?;
            return Ok(());
        }

        let frames = frag::fragment::<L::Error>(
            &mut self.rng,
            mtu,
            compressed_header,
            body,
            decompressed_header_size,
        )?;

        for frame in &frames {
            self.trace.tx(frame);
            self.link.send(dst, self.config.protocol_selector, frame).map_err(|e| {
                debug!("link send failed: {:?}", e);
                SixLoError::Link(e)
            })?;
        }

        Ok(())
    }

    /// Process one received frame, driving dispatch classification, HC1
    /// decompression and fragment reassembly. Returns `Some(datagram)`
    /// once a complete datagram is available (immediately for
    /// unfragmented frames, or once the last fragment arrives).
    pub fn recv(
        &mut self,
        now_ms: Ts,
        frame: &[u8],
        src: LinkAddr,
    ) -> Result<Option<Datagram>, SixLoError<L::Error>> {
        self.trace.rx(frame);

        let dispatch = *frame.first().ok_or(SixLoError::TruncatedBuffer)?;
        let variant = Variant::classify(dispatch);
        let dst = self.link.address();

        match variant {
            Variant::Uncompressed => {
                let mut r = buffer::Reader::new(frame);
                r.skip(1)?;
                Ok(Some(Vec::from(r.rest())))
            }

            Variant::Hc1 => {
                let mut r = buffer::Reader::new(frame);
                r.skip(1)?;
                let (ipv6, udp) = hc1::decompress(&mut r, &src, &dst, frame.len() - 1)?;
                Ok(Some(self.rebuild_datagram(&ipv6, udp.as_ref(), r.rest())))
            }

            Variant::Frag1 => {
                let mut r = buffer::Reader::new(frame);
                let fh = FragHeader::decode(&mut r)?;
                let key = Key {
                    src,
                    dst,
                    datagram_size: fh.datagram_size,
                    datagram_tag: fh.datagram_tag,
                };

                let (headers, body_start) = self.decode_inner_headers(&mut r, &src, &dst)?;
                let compressed_header_len = body_start - FragHeader::FRAG1_WIRE_SIZE;
                let payload = &frame[body_start..];

                let evicted = self
                    .reassembler
                    .on_frag1(now_ms, key.clone(), headers, compressed_header_len, payload);
                if evicted.is_some() {
                    self.trace.drop(DropReason::FragmentBufferFull);
                }

                Ok(self.complete_if_ready(&key))
            }

            Variant::FragN => {
                let mut r = buffer::Reader::new(frame);
                let fh = FragHeader::decode(&mut r)?;
                let offset = fh.datagram_offset.unwrap_or(0);
                let key = Key {
                    src,
                    dst,
                    datagram_size: fh.datagram_size,
                    datagram_tag: fh.datagram_tag,
                };

                let payload = r.rest();
                let evicted = self.reassembler.on_fragn(now_ms, key.clone(), offset, payload);
                if evicted.is_some() {
                    self.trace.drop(DropReason::FragmentBufferFull);
                }

                Ok(self.complete_if_ready(&key))
            }

            Variant::Nalp | Variant::Bc0 | Variant::Iphc | Variant::Mesh | Variant::Unsupported => {
                warn!("unsupported 6LoWPAN dispatch byte {:x}", dispatch);
                Err(SixLoError::UnsupportedEncoding)
            }
        }
    }

    /// Decode the inner dispatch-classified headers carried by a FRAG1
    /// frame's first chunk, so the reassembly entry retains enough
    /// context (e.g. HC1 compression choices) to rebuild the datagram
    /// once complete. Returns the decoded headers and the offset in
    /// `frame` at which the raw payload bytes begin.
    fn decode_inner_headers(
        &self,
        r: &mut buffer::Reader,
        src: &LinkAddr,
        dst: &LinkAddr,
    ) -> Result<(HeaderStorage, usize), SixLoError<L::Error>> {
        let mut storage = HeaderStorage::new();
        let inner_dispatch = r.read_u8()?;

        match Variant::classify(inner_dispatch) {
            Variant::Hc1 => {
                // `original_buffer_size` isn't known until reassembly
                // completes; store the encoding as-is and recompute the
                // payload length at assembly time instead.
                let start = r.position();
                let (mut ipv6, udp) = hc1::decompress(r, src, dst, usize::MAX - start)?;
                ipv6.payload_length = 0;
                storage.push(Header::Ipv6(ipv6));
                if let Some(udp) = udp {
                    storage.push(Header::Udp(udp));
                }
            }
            Variant::Uncompressed => {
                let ipv6 = Ipv6Header::decode(r)?;
                let udp = if ipv6.next_header == headers::NextHeader::Udp {
                    Some(UdpHeader::decode(r)?)
                } else {
                    None
                };
                storage.push(Header::Ipv6(ipv6));
                if let Some(udp) = udp {
                    storage.push(Header::Udp(udp));
                }
            }
            _ => {
                storage.push(Header::Dispatch(inner_dispatch));
            }
        }

        Ok((storage, r.position()))
    }

    fn complete_if_ready(&mut self, key: &Key) -> Option<Datagram> {
        let entry = self.reassembler.try_complete(key)?;
        let body = entry.assemble();

        match entry.headers.ipv6() {
            Some(ipv6) => {
                let udp = entry.headers.udp().cloned();
                Some(self.rebuild_datagram(ipv6, udp.as_ref(), &body))
            }
            None => Some(body),
        }
    }

    /// Re-encode a decompressed IPv6 (+ optional UDP) header as wire
    /// bytes, recomputing `payload_length` (and the UDP `length` field,
    /// when present) from the body now that it's fully known.
    fn rebuild_datagram(&self, ipv6: &Ipv6Header, udp: Option<&UdpHeader>, body: &[u8]) -> Datagram {
        let mut ipv6 = ipv6.clone();
        let header_len = udp.map(|_| UdpHeader::WIRE_SIZE).unwrap_or(0);
        ipv6.payload_length = (header_len + body.len()) as u16;

        let mut out = vec![0u8; Ipv6Header::WIRE_SIZE + header_len];
        {
            let mut w = buffer::Writer::new(&mut out);
            ipv6.encode(&mut w).ok();
            if let Some(udp) = udp {
                let mut udp = *udp;
                udp.length = (UdpHeader::WIRE_SIZE + body.len()) as u16;
                udp.encode(&mut w).ok();
            }
        }
        out.extend_from_slice(body);
        out
    }

    /// Drive background work: expire stale reassemblies and poll the link
    /// device for a received frame, dispatching it through [`recv`].
    pub fn tick(&mut self, now_ms: Ts, buf: &mut [u8]) -> Result<Option<Datagram>, SixLoError<L::Error>> {
        for _key in self.reassembler.poll_timeouts(now_ms) {
            self.trace.drop(DropReason::FragmentTimeout);
        }

        match self.link.poll_receive(buf).map_err(SixLoError::Link)? {
            Some((len, src, packet_type)) => {
                if packet_type == PacketType::OtherHost {
                    return Ok(None);
                }
                self.recv(now_ms, &buf[..len], src)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sixlo::headers::{NextHeader, V6Addr};
    use ieee802154::mac::{ExtendedAddress, PanId};
    use rand::rngs::mock::StepRng;

    struct LoopbackLink {
        addr: LinkAddr,
        mtu: usize,
        inbox: Vec<(Vec<u8>, LinkAddr)>,
    }

    impl LinkDevice for LoopbackLink {
        type Error = ();

        fn mtu(&self) -> usize {
            self.mtu
        }

        fn address(&self) -> LinkAddr {
            self.addr
        }

        fn send(&mut self, _dst: LinkAddr, _protocol: u16, frame: &[u8]) -> Result<(), ()> {
            self.inbox.push((Vec::from(frame), self.addr));
            Ok(())
        }

        fn poll_receive(&mut self, buf: &mut [u8]) -> Result<Option<(usize, LinkAddr, PacketType)>, ()> {
            if let Some((frame, src)) = self.inbox.pop() {
                buf[..frame.len()].copy_from_slice(&frame);
                Ok(Some((frame.len(), src, PacketType::Host)))
            } else {
                Ok(None)
            }
        }
    }

    fn make_device(mtu: usize) -> SixLo<LoopbackLink, StepRng, NullTrace> {
        let link = LoopbackLink {
            addr: LinkAddr::Extended(PanId(0), ExtendedAddress(1)),
            mtu,
            inbox: Vec::new(),
        };
        let rng = StepRng::new(0x42, 1);
        let mut config = SixLoConfig::default();
        config.mtu = mtu;
        SixLo::new(link, rng, NullTrace, config)
    }

    fn build_datagram(next_header: NextHeader, body: &[u8]) -> Vec<u8> {
        let ipv6 = Ipv6Header {
            version: 6,
            traffic_class: 0,
            flow_label: 0,
            payload_length: body.len() as u16,
            next_header,
            hop_limit: 64,
            source: V6Addr([0xfe, 0x80, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0xff, 0xfe, 0, 0, 1]),
            destination: V6Addr([0xfe, 0x80, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0xff, 0xfe, 0, 0, 2]),
        };
        let mut buf = vec![0u8; Ipv6Header::WIRE_SIZE + body.len()];
        {
            let mut w = buffer::Writer::new(&mut buf);
            ipv6.encode(&mut w).unwrap();
            w.write(body).unwrap();
        }
        buf
    }

    fn build_udp_datagram(udp: &UdpHeader, payload: &[u8]) -> Vec<u8> {
        let ipv6 = Ipv6Header {
            version: 6,
            traffic_class: 0,
            flow_label: 0,
            payload_length: (UdpHeader::WIRE_SIZE + payload.len()) as u16,
            next_header: NextHeader::Udp,
            hop_limit: 64,
            source: V6Addr([0xfe, 0x80, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0xff, 0xfe, 0, 0, 1]),
            destination: V6Addr([0xfe, 0x80, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0xff, 0xfe, 0, 0, 2]),
        };
        let mut buf = vec![0u8; Ipv6Header::WIRE_SIZE + UdpHeader::WIRE_SIZE + payload.len()];
        {
            let mut w = buffer::Writer::new(&mut buf);
            ipv6.encode(&mut w).unwrap();
            udp.encode(&mut w).unwrap();
            w.write(payload).unwrap();
        }
        buf
    }

    #[test]
    fn udp_send_recv_round_trip_keeps_udp_header() {
        let mut dev = make_device(102);
        let dst = LinkAddr::Extended(PanId(0), ExtendedAddress(2));
        let udp = UdpHeader {
            source_port: 61630,
            destination_port: 61630,
            length: (UdpHeader::WIRE_SIZE + 32) as u16,
            checksum: 0xBEEF,
        };
        let payload = [0x11u8; 32];
        let datagram = build_udp_datagram(&udp, &payload);

        dev.send(dst, &datagram).unwrap();

        let mut buf = [0u8; 200];
        let out = dev.tick(0, &mut buf).unwrap().expect("datagram");

        let mut r = buffer::Reader::new(&out);
        let ipv6_out = Ipv6Header::decode(&mut r).unwrap();
        let udp_out = UdpHeader::decode(&mut r).unwrap();
        assert_eq!(ipv6_out.next_header, NextHeader::Udp);
        assert_eq!(udp_out.source_port, udp.source_port);
        assert_eq!(udp_out.destination_port, udp.destination_port);
        assert_eq!(udp_out.length, udp.length);
        assert_eq!(r.rest(), &payload[..]);
    }

    #[test]
    fn unfragmented_send_recv_round_trip() {
        let mut dev = make_device(102);
        let dst = LinkAddr::Extended(PanId(0), ExtendedAddress(2));
        let body = [0xAAu8; 20];
        let datagram = build_datagram(NextHeader::Icmpv6, &body);

        dev.send(dst, &datagram).unwrap();

        let mut buf = [0u8; 200];
        let out = dev.tick(0, &mut buf).unwrap().expect("datagram");
        assert_eq!(&out[Ipv6Header::WIRE_SIZE..], &body[..]);
    }

    #[test]
    fn fragmented_send_recv_round_trip() {
        let mut dev = make_device(48);
        let dst = LinkAddr::Extended(PanId(0), ExtendedAddress(2));
        let body: Vec<u8> = (0..200u16).map(|v| v as u8).collect();
        let datagram = build_datagram(NextHeader::Icmpv6, &body);

        dev.send(dst, &datagram).unwrap();

        let mut buf = [0u8; 200];
        let mut reassembled = None;
        for now in 0..10u64 {
            if let Some(datagram) = dev.tick(now, &mut buf).unwrap() {
                reassembled = Some(datagram);
                break;
            }
        }

        let out = reassembled.expect("datagram reassembled");
        assert_eq!(&out[Ipv6Header::WIRE_SIZE..], &body[..]);
    }

    #[test]
    fn unsupported_dispatch_is_rejected_without_trace_drop() {
        let mut dev = make_device(102);
        let src = LinkAddr::Extended(PanId(0), ExtendedAddress(2));
        let frame = [0x80u8, 0x01, 0x02];

        let err = dev.recv(0, &frame, src).unwrap_err();
        assert_eq!(err, SixLoError::UnsupportedEncoding);
    }
}
