//! Crate-wide error type.
//!
//! Follows the error-handling style used throughout this codebase's entropy-coding
//! primitives: a single hand-rolled, `#[non_exhaustive]` enum that implements
//! `Display` and `std::error::Error` directly rather than through a derive macro.
//! Only conditions that the driver cannot recover from locally are represented
//! here; see the module documentation in [`crate::codebook`] for the two
//! recoverable conditions (`RateInfeasible`, `EmptyContext`) that are logged and
//! handled in place instead of being propagated as errors.

use std::fmt;
use std::io;

/// Fatal errors produced by this crate.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The underlying byte stream could not be read from or written to.
    Io(io::Error),

    /// A codebook file violated the grammar or an invariant while being
    /// parsed (unexpected EOF, a line exceeding `MAX_CODEBOOK_LINE_LENGTH`, a
    /// symbol byte outside the alphabet, a union-alphabet mismatch between
    /// adjacent columns, ...).
    MalformedCodebook(String),

    /// A quantizer was asked for the state index of a reconstruction symbol that
    /// does not appear in its own output alphabet. Unreachable for any quantizer
    /// produced by [`crate::quantizer::LloydMaxDesigner`] or
    /// [`crate::codebook::generate_codebooks`]; indicates either a bug in this
    /// crate or a tampered/corrupted codebook file.
    InconsistentAlphabet { symbol: u8, column: u32 },

    /// [`crate::driver::Driver`] decoded or was handed a cluster id with no
    /// matching entry in the [`crate::codebook::ClusterSet`] — either a
    /// corrupted cluster-id symbol or a codebook built for a different
    /// cluster count than the stream.
    UnknownCluster(u32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::MalformedCodebook(msg) => write!(f, "malformed codebook: {msg}"),
            Error::InconsistentAlphabet { symbol, column } => write!(
                f,
                "symbol {symbol} not found in the output alphabet of column {column}"
            ),
            Error::UnknownCluster(cluster_id) => {
                write!(f, "cluster id {cluster_id} has no matching codebook")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
