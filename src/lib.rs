//! A lossy, context-adaptive compressor for fixed-width quality-score streams
//! from short-read sequencing data (FASTQ quality lines and similar).
//!
//! The design couples three pieces tightly enough that they have to be read
//! together:
//!
//! - [`quantizer`]/[`codebook`]: for every column and every left-context
//!   symbol, a pair of Lloyd–Max scalar quantizers ("low" and "high" rate)
//!   bracketing a column-wise rate target derived from the training corpus's
//!   conditional symbol distribution ([`cond_pmf`]).
//! - [`codebook`]'s `choose`: at encode/decode time, a deterministic
//!   pseudorandom draw from a [`prng::Well512`] shared bit-for-bit between
//!   encoder and decoder selects between the two codebooks, so no selector
//!   bit has to be transmitted.
//! - [`coder`]/[`freq`]: the selected quantizer's state index is then
//!   arithmetic-coded under an adaptive frequency model keyed by
//!   `(cluster, column, left-context)`.
//!
//! [`driver::Driver`] is the only place all three meet: it threads one line
//! at a time through quantizer selection, dequantization, and arithmetic
//! coding, in lockstep on both the encode and decode side.
//!
//! Record-block I/O, FASTQ/line parsing, cluster assignment (k-means over
//! line fingerprints), and stream framing are explicitly out of scope here —
//! see the [`collab`] module for the trait seams a caller plugs those in at.

pub mod alphabet;
pub mod coder;
pub mod codebook;
pub mod codebook_io;
pub mod collab;
pub mod cond_pmf;
pub mod config;
pub mod distortion;
pub mod driver;
pub mod error;
pub mod freq;
pub mod pmf;
pub mod prng;
pub mod quantizer;

pub use codebook::{ClusterCodebookSet, ClusterSet, QuantizerPair};
pub use collab::{DistortionProvider, LineSink, LineSource};
pub use config::CompressorConfig;
pub use distortion::{Distortion, DistortionKind};
pub use driver::{Driver, EncodeStats};
pub use error::{Error, Result};
pub use prng::Well512;
