//! Link-layer addresses and EUI-64 derivation
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte
//
// Per [RFC4944 Section 6](https://tools.ietf.org/html/rfc4944#section-6)

use ieee802154::mac::{ExtendedAddress, PanId, ShortAddress};

/// An opaque link-layer address. Supports the two IEEE 802.15.4 widths plus
/// a 48-bit variant for interop with non-15.4 link layers used in test
/// topologies.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkAddr {
    Short(PanId, ShortAddress),
    Extended(PanId, ExtendedAddress),
    Mac48([u8; 6]),
}

/// A 64-bit interface identifier, used to fill elided IPv6 interface
/// identifiers during HC1 decompression.
///
/// Stored so that `self.0.to_le_bytes()` yields the IID's 8 octets in
/// transmission order (byte 0 first) — every constructor below follows
/// that convention, matching `V6Addr`'s use of it.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Eui64(pub u64);

impl From<LinkAddr> for Eui64 {
    fn from(addr: LinkAddr) -> Self {
        match addr {
            LinkAddr::Extended(_pan, e) => Eui64::from(e),
            LinkAddr::Short(pan, short) => Eui64::from((pan, short)),
            LinkAddr::Mac48(mac) => Eui64::from(mac),
        }
    }
}

impl From<(PanId, ShortAddress)> for Eui64 {
    /// Create an EUI-64 interface identifier from an 802.15.4 PAN ID and
    /// short address, per [RFC4944 Section 6](https://tools.ietf.org/html/rfc4944#section-6).
    fn from(a: (PanId, ShortAddress)) -> Self {
        let pan_id = a.0;
        let short_addr = a.1;

        Eui64(u64::from_le_bytes([
            0,
            0,
            pan_id.0 as u8,
            (pan_id.0 >> 8) as u8,
            0,
            0,
            short_addr.0 as u8,
            (short_addr.0 >> 8) as u8,
        ]))
    }
}

impl From<ExtendedAddress> for Eui64 {
    /// Create an EUI-64 interface identifier from an 802.15.4 extended
    /// address: a direct copy of all 8 octets with the universal/local bit
    /// of the first transmitted octet flipped.
    fn from(extended: ExtendedAddress) -> Self {
        let mut bytes = extended.0.to_le_bytes();
        bytes[0] ^= 0b10;
        Eui64(u64::from_le_bytes(bytes))
    }
}

impl From<[u8; 6]> for Eui64 {
    /// Create an EUI-64 interface identifier from a 48-bit MAC address,
    /// per [RFC2464 Section 4](https://tools.ietf.org/html/rfc2464): the
    /// `0xFF 0xFE` pair is inserted in the middle and the universal/local
    /// bit of the first octet is flipped.
    fn from(mac: [u8; 6]) -> Self {
        Eui64(u64::from_le_bytes([
            mac[0] ^ 0b10,
            mac[1],
            mac[2],
            0xFF,
            0xFE,
            mac[3],
            mac[4],
            mac[5],
        ]))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn eui64_from_mac48() {
        let mac = [0x00, 0x02, 0x03, 0x04, 0x05, 0x06];
        let eui = Eui64::from(mac);
        let bytes = eui.0.to_le_bytes();
        assert_eq!(bytes, [0x02, 0x02, 0x03, 0xFF, 0xFE, 0x04, 0x05, 0x06]);
    }

    #[test]
    fn eui64_from_extended_keeps_all_bits() {
        let ext = ExtendedAddress(0x0001_0203_0405_0607);
        let eui = Eui64::from(ext);
        let bytes = eui.0.to_le_bytes();
        let mut expect = ext.0.to_le_bytes();
        expect[0] ^= 0b10;
        assert_eq!(bytes, expect);
    }
}
