//! Convenience re-exports of the public adaptation-layer surface.

pub use crate::error::SixLoError;

pub use crate::sixlo::addr::{Eui64, LinkAddr};
pub use crate::sixlo::config::{SixLoConfig, DEFAULT_MTU, PROTOCOL_SELECTOR};
pub use crate::sixlo::dispatch::Variant;
pub use crate::sixlo::hc1::Hc1Header;
pub use crate::sixlo::headers::{
    FragHeader, Header, HeaderStorage, Ipv6Header, NextHeader, UdpHeader, V6Addr,
};
pub use crate::sixlo::{Datagram, DropReason, LinkDevice, NullTrace, PacketType, SixLo, Trace};

pub use ieee802154::mac::{Address, AddressMode, ExtendedAddress, PanId, ShortAddress};
