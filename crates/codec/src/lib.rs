//! ## RTP stream codecs
//!
//! [RFC3550]: https://tools.ietf.org/html/rfc3550
//! [RFC3551]: https://tools.ietf.org/html/rfc3551
//!
//! This crate decodes and encodes the two binary layouts an RTP stream
//! passes through on its way between a capture file and the wire:
//!
//! * the `rtpplay1.0` dump format, an ASCII magic line followed by a
//!   binary file header and a sequence of length-prefixed packet
//!   records, every multi-byte field in network byte order;
//! * the RTP fixed header [RFC3550] with its variable-length CSRC list
//!   and optional header extension, exposed as a borrowed view that
//!   never copies packet bytes.
//!
//! It also carries the static payload-type table of [RFC3551], which
//! maps a payload-type number to the media clock rate that replay
//! pacing needs.
//!
//! All decoding converts to host byte order at the boundary and all
//! encoding converts back; no buffer is ever aliased as both wire
//! bytes and a typed header.

pub mod dump;
pub mod payload;
pub mod rtp;

use std::array::TryFromSliceError;

#[derive(Debug)]
pub enum Error {
    /// The `#!rtpplay1.0 ` magic line is missing or unterminated.
    BadMagic,
    /// The magic line does not carry a valid dotted-quad address.
    BadAddress,
    /// The magic line does not carry a decimal port in 1..=65535.
    BadPort,
    /// A fixed-size header or a declared payload length could not be
    /// satisfied by the remaining bytes of the stream.
    ShortRead,
    /// A declared CSRC list or header extension runs past the end of
    /// the captured bytes.
    Malformed,
    TryFromSliceError(TryFromSliceError),
    Io(std::io::Error),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<TryFromSliceError> for Error {
    fn from(value: TryFromSliceError) -> Self {
        Self::TryFromSliceError(value)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}
