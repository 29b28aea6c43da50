//! Adaptation device configuration
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use super::reassembly::ReassemblyConfig;

/// Protocol selector 6LoWPAN frames are sent under, per
/// [RFC4944 Section 6](https://tools.ietf.org/html/rfc4944#section-6) as
/// assigned for IEEE 802.15.4 link layers.
pub const PROTOCOL_SELECTOR: u16 = 0x809A;

/// Default link MTU this core targets, per
/// [RFC4944 Section 4](https://tools.ietf.org/html/rfc4944#section-4).
pub const DEFAULT_MTU: usize = 102;

/// Tuning for one [`super::SixLo`] adaptation device instance.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SixLoConfig {
    /// Maximum link-layer frame size fragmentation will target.
    pub mtu: usize,
    /// Reassembly engine tuning.
    pub reassembly: ReassemblyConfig,
    /// Protocol/ethertype value frames are sent and expected under.
    pub protocol_selector: u16,
}

impl Default for SixLoConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            reassembly: ReassemblyConfig::default(),
            protocol_selector: PROTOCOL_SELECTOR,
        }
    }
}
