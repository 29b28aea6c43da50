//! Error surface
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use crate::sixlo::buffer::TruncatedBuffer;

/// Errors raised by the adaptation device, generic over the underlying
/// link device's associated error type.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SixLoError<E> {
    /// Dispatch byte names a variant this core does not implement
    /// (NALP, BC0, MESH, IPHC, or an unrecognized byte).
    UnsupportedEncoding,

    /// Compressed headers plus the FRAG1 header would not fit under the
    /// configured MTU; fragmentation cannot proceed.
    HeadersExceedMtu,

    /// Buffer cursor over-read or over-write.
    TruncatedBuffer,

    /// Wrapper for the underlying link device's error.
    Link(E),
}

impl<E> From<TruncatedBuffer> for SixLoError<E> {
    fn from(_: TruncatedBuffer) -> Self {
        SixLoError::TruncatedBuffer
    }
}
