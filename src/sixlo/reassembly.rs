//! Fragment reassembly (receive side)
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte
//
// Per [RFC4944 Section 5.3](https://tools.ietf.org/html/rfc4944#section-5.3)

use crate::collections::{vec, HashMap, Vec};

use super::addr::LinkAddr;
use super::headers::HeaderStorage;

pub type Ts = u64;

/// Identifies one in-progress reassembly: the fragment source/destination
/// pair plus the datagram size and tag a sender reuses across all
/// fragments of one datagram.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Key {
    pub src: LinkAddr,
    pub dst: LinkAddr,
    pub datagram_size: u16,
    pub datagram_tag: u16,
}

/// Reasons a received frame or in-progress reassembly was dropped.
/// `TtlExpired`, `NoRoute`, `BadChecksum`, `InterfaceDown` and `RouteError`
/// are carried for interface parity with upstream network stacks; only
/// `FragmentTimeout` and `FragmentBufferFull` are ever raised by this
/// core.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DropReason {
    TtlExpired,
    NoRoute,
    BadChecksum,
    InterfaceDown,
    RouteError,
    FragmentTimeout,
    FragmentBufferFull,
}

/// One in-progress reassembly.
///
/// Fragment offsets live in decompressed-datagram byte space: FRAGN's
/// wire offset counts from the start of the logical header, and FRAG1's
/// own body picks up right after it. `header_size` is the width of that
/// header prefix (40, or 48 with a compressed UDP header) — it is not
/// itself covered by any fragment, so coverage checks and assembly treat
/// it as a fixed offset rather than a gap.
#[derive(Clone, Debug)]
pub struct Entry {
    /// Rough upper-bound buffer size reserved before FRAG1 arrives.
    capacity_hint: usize,
    /// Exact decompressed datagram size (header + body), known once
    /// FRAG1 has been seen and its actual compressed header length
    /// observed.
    exact_total: Option<usize>,
    header_size: usize,
    /// Fragments kept sorted by offset; `(offset, payload)`.
    fragments: Vec<(usize, Vec<u8>)>,
    pub headers: HeaderStorage,
    last_access: Ts,
}

impl Entry {
    fn new(now_ms: Ts, capacity_hint: usize) -> Self {
        Self {
            capacity_hint,
            exact_total: None,
            header_size: 0,
            fragments: Vec::new(),
            headers: HeaderStorage::new(),
            last_access: now_ms,
        }
    }

    /// Insert a fragment payload at `offset`, keeping the fragment list
    /// sorted. A later-arriving fragment that starts at an offset already
    /// covered by an earlier one is trimmed rather than rejected, so the
    /// earliest-arrived bytes win within any overlapping region.
    fn insert(&mut self, offset: usize, payload: &[u8]) {
        let pos = self
            .fragments
            .iter()
            .position(|(o, _)| *o > offset)
            .unwrap_or(self.fragments.len());
        self.fragments.insert(pos, (offset, Vec::from(payload)));
    }

    /// Whether the received fragments cover `[header_size, exact_total)`
    /// with no gaps, per the source's `IsEntire()` check. Always false
    /// until FRAG1 (which alone carries the logical header and pins down
    /// the exact total) has arrived.
    pub fn is_entire(&self) -> bool {
        let exact_total = match self.exact_total {
            Some(total) => total,
            None => return false,
        };

        let mut covered_to = self.header_size;
        for (offset, payload) in &self.fragments {
            if *offset > covered_to {
                return false;
            }
            covered_to = covered_to.max(offset + payload.len());
        }
        covered_to >= exact_total
    }

    /// Concatenate the covered fragments in offset order, trimming the
    /// overlapped prefix of any fragment whose start was already covered
    /// by an earlier (and therefore, by our earliest-wins policy,
    /// authoritative) one, and dropping the leading `header_size` bytes
    /// that belong to the logical header rather than the body.
    pub fn assemble(&self) -> Vec<u8> {
        let capacity = self.exact_total.unwrap_or(self.capacity_hint).saturating_sub(self.header_size);
        let mut out = Vec::with_capacity(capacity);
        for (offset, payload) in &self.fragments {
            let start = out.len() + self.header_size;
            if *offset < start {
                let skip = start - offset;
                if skip < payload.len() {
                    out.extend_from_slice(&payload[skip..]);
                }
            } else {
                if *offset > start {
                    out.resize(out.len() + (*offset - start), 0);
                }
                out.extend_from_slice(payload);
            }
        }
        out
    }
}

/// Reassembly engine tuning.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ReassemblyConfig {
    /// Maximum number of concurrent in-progress reassemblies. `0` means
    /// unbounded.
    pub list_size: usize,
    /// Time, in milliseconds, an in-progress reassembly may sit idle
    /// before it is dropped.
    pub expiration_ms: Ts,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            list_size: 0,
            expiration_ms: 180_000,
        }
    }
}

/// Tracks in-progress datagram reassemblies keyed by fragment source,
/// destination, compressed datagram size and tag.
pub struct Reassembler {
    config: ReassemblyConfig,
    fragments: HashMap<Key, Entry>,
    timers: HashMap<Key, Ts>,
}

impl Reassembler {
    pub fn new(config: ReassemblyConfig) -> Self {
        Self {
            config,
            fragments: HashMap::new(),
            timers: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// `datagram_size - 7 + 48`, the wire-compatible reassembly buffer
    /// sizing formula used as a capacity hint before FRAG1 arrives:
    /// `datagram_size` is the compressed datagram size, 7 is the
    /// minimum HC1 dispatch+encoding+hop-limit prefix, 48 is the
    /// worst-case decompressed header (40-byte IPv6 + 8-byte UDP). Once
    /// FRAG1 is seen this is superseded by an exact total computed from
    /// the actually observed compressed header length.
    fn capacity_hint(datagram_size: u16) -> usize {
        (datagram_size as isize - 7 + 48).max(0) as usize
    }

    fn evict_oldest(&mut self) -> Option<Key> {
        let oldest = self
            .fragments
            .iter()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, _)| k.clone())?;
        self.fragments.remove(&oldest);
        self.timers.remove(&oldest);
        Some(oldest)
    }

    fn ensure_entry(&mut self, key: &Key, now_ms: Ts) -> Option<Key> {
        if self.fragments.contains_key(key) {
            return None;
        }

        let evicted = if self.config.list_size != 0 && self.fragments.len() >= self.config.list_size {
            self.evict_oldest()
        } else {
            None
        };

        let capacity_hint = Self::capacity_hint(key.datagram_size);
        self.fragments.insert(key.clone(), Entry::new(now_ms, capacity_hint));
        self.timers.insert(key.clone(), now_ms + self.config.expiration_ms);
        evicted
    }

    /// Record the first fragment of a datagram, including its already
    /// decoded headers and the number of bytes its compressed header
    /// actually occupied on the wire (used to convert the wire
    /// `datagram_size`, the compressed total, into the exact decompressed
    /// total this reassembly must reach). Returns the key of any entry
    /// evicted to make room.
    pub fn on_frag1(
        &mut self,
        now_ms: Ts,
        key: Key,
        headers: HeaderStorage,
        compressed_header_len: usize,
        payload: &[u8],
    ) -> Option<Key> {
        let evicted = self.ensure_entry(&key, now_ms);
        let header_size = match (headers.ipv6().is_some(), headers.udp().is_some()) {
            (true, true) => 48,
            (true, false) => 40,
            (false, _) => 0,
        };

        if let Some(entry) = self.fragments.get_mut(&key) {
            entry.headers = headers;
            entry.header_size = header_size;
            entry.exact_total =
                Some(header_size + (key.datagram_size as usize).saturating_sub(compressed_header_len));
            entry.insert(header_size, payload);
            entry.last_access = now_ms;
        }
        evicted
    }

    /// Record a subsequent fragment. `datagram_offset` is the wire FRAGN
    /// offset field, in 8-octet units.
    pub fn on_fragn(&mut self, now_ms: Ts, key: Key, datagram_offset: u8, payload: &[u8]) -> Option<Key> {
        let evicted = self.ensure_entry(&key, now_ms);
        let offset = (datagram_offset as usize) << 3;
        if let Some(entry) = self.fragments.get_mut(&key) {
            entry.insert(offset, payload);
            entry.last_access = now_ms;
        }
        evicted
    }

    /// If the reassembly named by `key` is complete, remove and return it.
    pub fn try_complete(&mut self, key: &Key) -> Option<Entry> {
        let is_entire = self.fragments.get(key).map(Entry::is_entire).unwrap_or(false);
        if !is_entire {
            return None;
        }
        self.timers.remove(key);
        self.fragments.remove(key)
    }

    /// Expire and remove reassemblies whose timer has elapsed, returning
    /// the keys dropped this tick.
    pub fn poll_timeouts(&mut self, now_ms: Ts) -> Vec<Key> {
        let expired: Vec<Key> = self
            .timers
            .iter()
            .filter(|(_, &deadline)| now_ms >= deadline)
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired {
            self.timers.remove(key);
            self.fragments.remove(key);
        }

        expired
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sixlo::headers::{Header, Ipv6Header, NextHeader, V6Addr};
    use ieee802154::mac::{ExtendedAddress, PanId};

    fn key(tag: u16, size: u16) -> Key {
        Key {
            src: LinkAddr::Extended(PanId(0), ExtendedAddress(1)),
            dst: LinkAddr::Extended(PanId(0), ExtendedAddress(2)),
            datagram_size: size,
            datagram_tag: tag,
        }
    }

    fn headers_with_ipv6() -> HeaderStorage {
        let mut h = HeaderStorage::new();
        h.push(Header::Ipv6(Ipv6Header {
            version: 6,
            traffic_class: 0,
            flow_label: 0,
            payload_length: 0,
            next_header: NextHeader::Icmpv6,
            hop_limit: 64,
            source: V6Addr::UNSPECIFIED,
            destination: V6Addr::UNSPECIFIED,
        }));
        h
    }

    /// `header_size = 40` (no UDP), a 3-byte compressed header (dispatch +
    /// encoding + hop limit, both addresses and next header elided) and a
    /// 16-octet body: `datagram_size = 3 + 16 = 19`, so
    /// `exact_total = 40 + (19 - 3) = 56`.
    #[test]
    fn completes_after_all_fragments_arrive() {
        let mut r = Reassembler::new(ReassemblyConfig::default());
        let k = key(1, 19);

        r.on_frag1(0, k.clone(), headers_with_ipv6(), 3, &[0u8; 8]);
        assert!(r.try_complete(&k).is_none());

        r.on_fragn(1, k.clone(), 6, &[1u8; 8]);
        let entry = r.try_complete(&k).expect("complete");
        assert_eq!(entry.assemble(), {
            let mut v = vec![0u8; 8];
            v.extend_from_slice(&[1u8; 8]);
            v
        });
        assert_eq!(r.len(), 0);
    }

    #[test]
    fn overlap_keeps_earliest_arrived_bytes() {
        let mut r = Reassembler::new(ReassemblyConfig::default());
        let k = key(2, 19);

        r.on_frag1(0, k.clone(), headers_with_ipv6(), 3, &[1u8; 8]);
        // Overlapping fragment claiming the FRAG1 body's offset again with
        // different data.
        r.on_fragn(1, k.clone(), 5, &[9u8; 8]);
        r.on_fragn(2, k.clone(), 6, &[2u8; 8]);

        let entry = r.try_complete(&k).expect("complete");
        let data = entry.assemble();
        assert_eq!(&data[0..8], &[1u8; 8]);
        assert_eq!(&data[8..16], &[2u8; 8]);
    }

    #[test]
    fn expires_after_timeout() {
        let mut config = ReassemblyConfig::default();
        config.expiration_ms = 1000;
        let mut r = Reassembler::new(config);
        let k = key(3, 64);

        r.on_frag1(0, k.clone(), headers_with_ipv6(), 3, &[0u8; 8]);
        assert!(r.poll_timeouts(500).is_empty());

        let expired = r.poll_timeouts(1000);
        assert_eq!(expired, vec![k.clone()]);
        assert_eq!(r.len(), 0);
    }

    #[test]
    fn evicts_oldest_when_list_full() {
        let config = ReassemblyConfig {
            list_size: 1,
            expiration_ms: 180_000,
        };
        let mut r = Reassembler::new(config);

        let k1 = key(1, 64);
        let k2 = key(2, 64);

        r.on_frag1(0, k1.clone(), headers_with_ipv6(), 3, &[0u8; 8]);
        let evicted = r.on_frag1(10, k2.clone(), headers_with_ipv6(), 3, &[0u8; 8]);

        assert_eq!(evicted, Some(k1));
        assert_eq!(r.len(), 1);
    }
}
