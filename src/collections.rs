//! std/alloc collection compatibility shim
//
// Mirrors the teacher crate's own `std`/`alloc` feature split (see its
// `bytes/std` feature wiring and the `#[cfg(any(feature = "alloc", feature
// = "std"))]` gates in `sixlo::headers`), generalized to one place so the
// rest of the crate imports `Vec`/`HashMap`/`String` from here instead of
// picking a feature gate at every call site.

#[cfg(feature = "std")]
pub use std::collections::HashMap;
#[cfg(feature = "std")]
pub use std::string::String;
#[cfg(feature = "std")]
pub use std::vec::Vec;
#[cfg(feature = "std")]
pub use std::vec;

#[cfg(all(feature = "alloc", not(feature = "std")))]
pub use alloc::collections::BTreeMap as HashMap;
#[cfg(all(feature = "alloc", not(feature = "std")))]
pub use alloc::string::String;
#[cfg(all(feature = "alloc", not(feature = "std")))]
pub use alloc::vec;
#[cfg(all(feature = "alloc", not(feature = "std")))]
pub use alloc::vec::Vec;
