
#![no_std]

#[cfg(any(feature = "alloc", feature = "std"))]
extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod collections;

pub mod log;

pub mod error;

pub mod sixlo;

pub mod prelude;
