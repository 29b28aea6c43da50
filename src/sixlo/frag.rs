//! 6LoWPAN fragmentation (transmit side)
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte
//
// Per [RFC4944 Section 5.3](https://tools.ietf.org/html/rfc4944#section-5.3)

use rand_core::RngCore;

use crate::collections::{vec, Vec};
use crate::error::SixLoError;

use super::buffer::Writer;
use super::headers::FragHeader;

/// Split a compressed datagram into a sequence of fully-encoded 6LoWPAN
/// frames, each at or under `mtu` octets.
///
/// `compressed_header` is the dispatch+HC1(+HC2) byte sequence, already
/// written by the caller; `compressed_body` is everything after it.
/// `decompressed_header_size` is the size (40, or 48 with a compressed
/// UDP header) of the header HC1 elided, used to seed the FRAGN datagram
/// offset accounting, which runs in decompressed-datagram byte space.
pub fn fragment<E>(
    rng: &mut impl RngCore,
    mtu: usize,
    compressed_header: &[u8],
    compressed_body: &[u8],
    decompressed_header_size: usize,
) -> Result<Vec<Vec<u8>>, SixLoError<E>> {
    if FragHeader::FRAG1_WIRE_SIZE + compressed_header.len() >= mtu {
        return Err(SixLoError::HeadersExceedMtu);
    }

    let datagram_tag = rng.next_u32() as u16;
    let datagram_size = (compressed_header.len() + compressed_body.len()) as u16;

    let first_body_len = ((mtu - FragHeader::FRAG1_WIRE_SIZE - compressed_header.len()) & !0x07)
        .min(compressed_body.len());

    let mut frames = Vec::new();

    {
        let frag1 = FragHeader {
            datagram_size,
            datagram_tag,
            datagram_offset: None,
        };
        let mut frame = vec![0u8; FragHeader::FRAG1_WIRE_SIZE + compressed_header.len() + first_body_len];
        let mut w = Writer::new(&mut frame);
        frag1.encode(&mut w).map_err(|_| SixLoError::TruncatedBuffer)?;
        w.write(compressed_header).map_err(|_| SixLoError::TruncatedBuffer)?;
        w.write(&compressed_body[..first_body_len])
            .map_err(|_| SixLoError::TruncatedBuffer)?;
        frames.push(frame);
    }

    let mut body_offset = first_body_len;
    let mut datagram_offset = decompressed_header_size + first_body_len;

    let fragn_body_max = (mtu - FragHeader::FRAGN_WIRE_SIZE) & !0x07;

    while body_offset < compressed_body.len() {
        let remaining = compressed_body.len() - body_offset;
        let chunk_len = remaining.min(fragn_body_max);

        let fragn = FragHeader {
            datagram_size,
            datagram_tag,
            datagram_offset: Some((datagram_offset >> 3) as u8),
        };
        let mut frame = vec![0u8; FragHeader::FRAGN_WIRE_SIZE + chunk_len];
        let mut w = Writer::new(&mut frame);
        fragn.encode(&mut w).map_err(|_| SixLoError::TruncatedBuffer)?;
        w.write(&compressed_body[body_offset..body_offset + chunk_len])
            .map_err(|_| SixLoError::TruncatedBuffer)?;
        frames.push(frame);

        body_offset += chunk_len;
        datagram_offset += chunk_len;
    }

    Ok(frames)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn fragments_under_mtu() {
        let mut rng = StepRng::new(0x1234, 1);
        let header = [0x42u8, 0xFB, 0x40];
        let body: Vec<u8> = (0..200u16).map(|v| v as u8).collect();

        let frames = fragment::<()>(&mut rng, 48, &header, &body, 40).unwrap();

        assert!(frames.len() > 1);
        for f in &frames {
            assert!(f.len() <= 48);
        }

        // First frame carries the compressed header verbatim.
        assert_eq!(&frames[0][4..4 + header.len()], &header);

        // Every fragment body length is a multiple of 8, except possibly
        // the trailing remainder of the final fragment.
        for f in &frames[..frames.len() - 1] {
            let body_len = if f[0] & 0xE0 == 0xE0 {
                f.len() - FragHeader::FRAGN_WIRE_SIZE
            } else {
                f.len() - FragHeader::FRAG1_WIRE_SIZE - header.len()
            };
            assert_eq!(body_len % 8, 0);
        }
    }

    #[test]
    fn single_frame_when_it_fits() {
        let mut rng = StepRng::new(0x9999, 1);
        let header = [0x42u8, 0xFB, 0x40];
        let body = [1u8, 2, 3, 4];

        let frames = fragment::<()>(&mut rng, 102, &header, &body, 40).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn errors_when_headers_exceed_mtu() {
        let mut rng = StepRng::new(0x1, 1);
        let header = vec![0u8; 100];
        let body = [1u8, 2, 3];

        let err = fragment::<()>(&mut rng, 48, &header, &body, 40).unwrap_err();
        assert_eq!(err, SixLoError::HeadersExceedMtu);
    }
}
