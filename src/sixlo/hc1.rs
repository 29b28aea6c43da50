//! LOWPAN_HC1 IPv6 header compression
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte
//
// Per [RFC4944 Section 10.1](https://tools.ietf.org/html/rfc4944#section-10.1)

use bitflags::bitflags;

use super::addr::{Eui64, LinkAddr};
use super::buffer::{Reader, TruncatedBuffer, Writer};
use super::dispatch::DISPATCH_HC1;
use super::headers::{Ipv6Header, NextHeader, UdpHeader, V6Addr};

/// Compression applied independently to the source and destination IPv6
/// addresses. The 2-bit codes are taken from the wire encoding, bit 1
/// (0b10) elides the prefix, bit 0 (0b01) elides the interface identifier.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddrCompression {
    /// Prefix in-line, IID in-line.
    Piii = 0b00,
    /// Prefix in-line, IID elided (derived from the link-layer address).
    Piic = 0b01,
    /// Prefix elided (link-local), IID in-line.
    Pcii = 0b10,
    /// Prefix elided (link-local), IID elided.
    Pcic = 0b11,
}

impl AddrCompression {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => AddrCompression::Piii,
            0b01 => AddrCompression::Piic,
            0b10 => AddrCompression::Pcii,
            _ => AddrCompression::Pcic,
        }
    }

    fn prefix_elided(&self) -> bool {
        (*self as u8) & 0b10 != 0
    }

    fn iid_elided(&self) -> bool {
        (*self as u8) & 0b01 != 0
    }
}

/// Next-header compression code carried in the HC1 encoding byte.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NextHeaderCompression {
    /// Not compressed; next header byte follows in-line.
    Nc = 0b00,
    Udp = 0b01,
    Icmp = 0b10,
    Tcp = 0b11,
}

impl NextHeaderCompression {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => NextHeaderCompression::Nc,
            0b01 => NextHeaderCompression::Udp,
            0b10 => NextHeaderCompression::Icmp,
            _ => NextHeaderCompression::Tcp,
        }
    }
}

bitflags! {
    /// Low two flag bits of the HC1 encoding byte.
    pub struct Hc1Flags: u8 {
        /// HC2 (transport-layer compression) header follows.
        const HC2_FOLLOWS = 0b0000_0001;
        /// Traffic class and flow label are both zero and elided.
        const TC_FL_ELIDED = 0b0000_1000;
    }
}

/// Decoded HC1 encoding byte plus the hop limit octet that always follows
/// it in-line.
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Hc1Header {
    pub src_compression: AddrCompression,
    pub dst_compression: AddrCompression,
    pub flags: Hc1Flags,
    pub next_header: NextHeaderCompression,
    pub hop_limit: u8,
}

impl Hc1Header {
    pub fn encoding_byte(&self) -> u8 {
        ((self.src_compression as u8) << 6)
            | ((self.dst_compression as u8) << 4)
            | (self.flags.bits() & Hc1Flags::TC_FL_ELIDED.bits())
            | ((self.next_header as u8) << 1)
            | (self.flags.bits() & Hc1Flags::HC2_FOLLOWS.bits())
    }

    pub fn from_encoding_byte(byte: u8) -> Self {
        let mut flags = Hc1Flags::empty();
        if byte & Hc1Flags::TC_FL_ELIDED.bits() != 0 {
            flags |= Hc1Flags::TC_FL_ELIDED;
        }
        if byte & Hc1Flags::HC2_FOLLOWS.bits() != 0 {
            flags |= Hc1Flags::HC2_FOLLOWS;
        }

        Self {
            src_compression: AddrCompression::from_bits(byte >> 6),
            dst_compression: AddrCompression::from_bits(byte >> 4),
            flags,
            next_header: NextHeaderCompression::from_bits(byte >> 1),
            hop_limit: 0,
        }
    }
}

/// Classify how `addr` compresses relative to the peer's link-layer
/// address: prefix elision requires a matching `fe80::/10` link-local
/// prefix, IID elision requires the address's interface identifier to
/// equal the one derivable from `link`.
fn classify_address(addr: &V6Addr, link: &LinkAddr) -> AddrCompression {
    let link_local = addr.is_link_local();
    let iid_matches = addr.iid() == Eui64::from(*link).0.to_le_bytes();

    match (link_local, iid_matches) {
        (true, true) => AddrCompression::Pcic,
        (true, false) => AddrCompression::Pcii,
        (false, true) => AddrCompression::Piic,
        (false, false) => AddrCompression::Piii,
    }
}

/// Compress an IPv6 (+ optional UDP) header, writing the dispatch byte,
/// HC1 encoding byte, and surviving in-line fields. Returns the number of
/// header bytes consumed from the original decompressed datagram (40, or
/// 48 when a UDP header was compressed alongside it).
pub fn compress(
    w: &mut Writer,
    ipv6: &Ipv6Header,
    udp: Option<&UdpHeader>,
    link_src: &LinkAddr,
    link_dst: &LinkAddr,
) -> Result<usize, TruncatedBuffer> {
    let src_compression = classify_address(&ipv6.source, link_src);
    let dst_compression = classify_address(&ipv6.destination, link_dst);

    let tc_fl_elided = ipv6.traffic_class == 0 && ipv6.flow_label == 0;

    let next_header = match (udp.is_some(), ipv6.next_header) {
        (true, _) => NextHeaderCompression::Udp,
        (false, NextHeader::Icmpv6) => NextHeaderCompression::Icmp,
        (false, NextHeader::Tcp) => NextHeaderCompression::Tcp,
        (false, _) => NextHeaderCompression::Nc,
    };

    let mut flags = Hc1Flags::empty();
    if tc_fl_elided {
        flags |= Hc1Flags::TC_FL_ELIDED;
    }
    if udp.is_some() {
        flags |= Hc1Flags::HC2_FOLLOWS;
    }

    let hc1 = Hc1Header {
        src_compression,
        dst_compression,
        flags,
        next_header,
        hop_limit: ipv6.hop_limit,
    };

    w.write_u8(DISPATCH_HC1)?;
    w.write_u8(hc1.encoding_byte())?;
    w.write_u8(hc1.hop_limit)?;

    if !src_compression.prefix_elided() {
        w.write(&ipv6.source.0[0..8])?;
    }
    if !src_compression.iid_elided() {
        w.write(&ipv6.source.0[8..16])?;
    }
    if !dst_compression.prefix_elided() {
        w.write(&ipv6.destination.0[0..8])?;
    }
    if !dst_compression.iid_elided() {
        w.write(&ipv6.destination.0[8..16])?;
    }

    if !tc_fl_elided {
        // Traffic class (8 bits) followed by the 20-bit flow label, packed
        // little-endian across 3 octets as carried by the reference form.
        let fl = ipv6.flow_label & 0x000F_FFFF;
        w.write_u8(ipv6.traffic_class)?;
        w.write_u8((fl & 0xFF) as u8)?;
        w.write_u8(((fl >> 8) & 0xFF) as u8)?;
        w.write_u8(((fl >> 16) & 0xFF) as u8)?;
    }

    if matches!(next_header, NextHeaderCompression::Nc) {
        w.write_u8(ipv6.next_header.as_byte())?;
    }

    let mut consumed = 40;

    if let Some(udp) = udp {
        udp.encode(w)?;
        consumed += 8;
    }

    Ok(consumed)
}

/// Inverse of [`compress`]. `original_buffer_size` is the number of octets
/// the compressed header + body occupied before link-layer fragmentation,
/// counted from the encoding byte `r` is positioned at on entry (not from
/// the start of whatever larger buffer `r` happens to be reading), used to
/// recompute the payload length that HC1 elides.
pub fn decompress(
    r: &mut Reader,
    link_src: &LinkAddr,
    link_dst: &LinkAddr,
    original_buffer_size: usize,
) -> Result<(Ipv6Header, Option<UdpHeader>), TruncatedBuffer> {
    let start = r.position();
    let encoding = r.read_u8()?;
    let mut hc1 = Hc1Header::from_encoding_byte(encoding);
    hc1.hop_limit = r.read_u8()?;

    let mut source = [0u8; 16];
    let mut destination = [0u8; 16];

    if hc1.src_compression.prefix_elided() {
        source[0] = 0xfe;
        source[1] = 0x80;
    } else {
        source[0..8].copy_from_slice(r.read(8)?);
    }
    if hc1.src_compression.iid_elided() {
        source[8..16].copy_from_slice(&Eui64::from(*link_src).0.to_le_bytes());
    } else {
        source[8..16].copy_from_slice(r.read(8)?);
    }

    if hc1.dst_compression.prefix_elided() {
        destination[0] = 0xfe;
        destination[1] = 0x80;
    } else {
        destination[0..8].copy_from_slice(r.read(8)?);
    }
    if hc1.dst_compression.iid_elided() {
        destination[8..16].copy_from_slice(&Eui64::from(*link_dst).0.to_le_bytes());
    } else {
        destination[8..16].copy_from_slice(r.read(8)?);
    }

    let (traffic_class, flow_label) = if hc1.flags.contains(Hc1Flags::TC_FL_ELIDED) {
        (0u8, 0u32)
    } else {
        let tc = r.read_u8()?;
        let fl_lo = r.read_u8()? as u32;
        let fl_mid = r.read_u8()? as u32;
        let fl_hi = r.read_u8()? as u32;
        (tc, fl_lo | (fl_mid << 8) | (fl_hi << 16))
    };

    // The next-header compression code is authoritative unless it names
    // Nc, in which case the in-line byte that follows is consulted.
    let mut next_header = match hc1.next_header {
        NextHeaderCompression::Udp => NextHeader::Udp,
        NextHeaderCompression::Icmp => NextHeader::Icmpv6,
        NextHeaderCompression::Tcp => NextHeader::Tcp,
        NextHeaderCompression::Nc => NextHeader::Other(0),
    };
    if matches!(hc1.next_header, NextHeaderCompression::Nc) {
        next_header = NextHeader::from_byte(r.read_u8()?);
    }

    let header_consumed = r.position() - start;

    let udp = if hc1.flags.contains(Hc1Flags::HC2_FOLLOWS) {
        Some(UdpHeader::decode(r)?)
    } else {
        None
    };

    let payload_length = original_buffer_size.saturating_sub(header_consumed) as u16;

    let ipv6 = Ipv6Header {
        version: Ipv6Header::VERSION,
        traffic_class,
        flow_label,
        payload_length,
        next_header,
        hop_limit: hc1.hop_limit,
        source: V6Addr(source),
        destination: V6Addr(destination),
    };

    Ok((ipv6, udp))
}
