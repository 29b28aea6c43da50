//! Dispatch byte classification
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte
//
// Per [RFC4944 Section 5.1](https://tools.ietf.org/html/rfc4944#section-5.1)

use strum::EnumIter;

use super::buffer::{TruncatedBuffer, Writer};

pub const DISPATCH_UNCOMPRESSED: u8 = 0x41;
pub const DISPATCH_HC1: u8 = 0x42;
pub const DISPATCH_BC0: u8 = 0x50;

/// Classification of a 6LoWPAN dispatch byte.
#[derive(Copy, Clone, PartialEq, Eq, Debug, EnumIter)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Variant {
    /// Not a LoWPAN frame, `0x00..=0x3F` — reject.
    Nalp,
    /// Full IPv6 header follows verbatim, `0x41`.
    Uncompressed,
    /// LOWPAN_HC1 compressed IPv6 header follows, `0x42`.
    Hc1,
    /// LOWPAN_BC0 broadcast header, `0x50` — unsupported in core.
    Bc0,
    /// IPHC, `0x60..=0x7F` — recognized, not implemented.
    Iphc,
    /// Mesh header, `0x80..=0xBF` — unsupported in core.
    Mesh,
    /// First fragment, `0xC0..=0xC7`.
    Frag1,
    /// Subsequent fragment, `0xE0..=0xE7`.
    FragN,
    /// Sentinel for an unrecognized byte.
    Unsupported,
}

impl Variant {
    /// Classify the leading dispatch byte of a 6LoWPAN payload.
    pub fn classify(byte: u8) -> Self {
        match byte {
            0x00..=0x3F => Variant::Nalp,
            DISPATCH_UNCOMPRESSED => Variant::Uncompressed,
            DISPATCH_HC1 => Variant::Hc1,
            DISPATCH_BC0 => Variant::Bc0,
            0x60..=0x7F => Variant::Iphc,
            0x80..=0xBF => Variant::Mesh,
            0xC0..=0xC7 => Variant::Frag1,
            0xE0..=0xE7 => Variant::FragN,
            _ => Variant::Unsupported,
        }
    }

    /// Whether this variant is implemented by the core codecs, as opposed
    /// to being recognized only to be rejected with `UnsupportedEncoding`.
    pub fn is_supported(&self) -> bool {
        matches!(self, Variant::Uncompressed | Variant::Hc1 | Variant::Frag1 | Variant::FragN)
    }
}

/// Emit the dispatch prefix for variants that carry one standalone. HC1 and
/// FRAG1/FRAGN embed their dispatch byte(s) within their own header encode
/// and do not go through this path.
pub fn emit(variant: Variant, w: &mut Writer) -> Result<(), TruncatedBuffer> {
    match variant {
        Variant::Uncompressed => w.write_u8(DISPATCH_UNCOMPRESSED),
        _ => Ok(()),
    }
}
