//! Logging shim
//
// Re-exports either `log`'s or `defmt`'s macros depending on the active
// feature, so the rest of the crate never imports either directly.

#[cfg(not(feature = "defmt"))]
pub use log::{debug, error, info, trace, warn};

#[cfg(feature = "defmt")]
pub use defmt::{debug, error, info, trace, warn};

/// Helper bound for formatting a link device's associated error in either
/// logging mode.
#[cfg(not(feature = "defmt"))]
pub trait FmtError: core::fmt::Debug {}
#[cfg(not(feature = "defmt"))]
impl<T: core::fmt::Debug> FmtError for T {}

#[cfg(feature = "defmt")]
pub trait FmtError: defmt::Format {}
#[cfg(feature = "defmt")]
impl<T: defmt::Format> FmtError for T {}
