//! The per-line encode/decode state machine that threads the quantizer and
//! codebook layer through the adaptive arithmetic coder.
//!
//! The driver is deliberately generic over its PRNG (`Rng: RngCore`) rather
//! than hard-wired to [`Well512`]: production code always instantiates
//! `Driver<Well512>` (bit-identical cross-platform output is only guaranteed
//! for that generator), but tests can inject any `rand_core::RngCore`.

use std::io::{Read, Write};

use rand_core::RngCore;

use crate::coder::{RangeDecoder, RangeEncoder};
use crate::codebook::{ClusterSet, NULL_CONTEXT};
use crate::collab::{DistortionProvider, LineSink, LineSource};
use crate::config::CLUSTER_ALPHABET_MAX;
use crate::error::{Error, Result};
use crate::freq::{ModelBank, ModelKey};
use crate::prng::Well512;

/// Result of [`Driver::encode_all`]: the encoded byte count and the running
/// distortion accumulated over every encoded symbol, averaged per symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodeStats {
    pub bytes_written: u64,
    pub symbols_encoded: u64,
    pub mean_distortion: f64,
}

/// Counts bytes written through it without otherwise touching them; lets
/// [`Driver::encode_all`] report `bytes_written` without the coder itself
/// needing to know anything about byte accounting.
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Threads the codebook/quantizer layer, the adaptive frequency models, and
/// the shared PRNG through a per-line state machine. Owns the [`ModelBank`]
/// (one per process/run, reused across lines) and the PRNG state, which is
/// advanced only from [`crate::codebook::ClusterCodebookSet::choose`] calls
/// issued here.
pub struct Driver<Rng: RngCore = Well512> {
    rng: Rng,
    models: ModelBank,
    r_max: u32,
}

impl Driver<Well512> {
    /// Seeds the production PRNG from the codebook's stored seed.
    pub fn new(seed: u32, r_max: u32) -> Self {
        Self::with_rng(Well512::from_seed_u32(seed), r_max)
    }
}

impl<Rng: RngCore> Driver<Rng> {
    pub fn with_rng(rng: Rng, r_max: u32) -> Self {
        Self {
            rng,
            models: ModelBank::new(),
            r_max,
        }
    }

    /// Encodes every line yielded by `lines` against `cluster_set`, writing
    /// the arithmetic-coded stream body to `sink`: per line, the state
    /// machine runs `start -> col0 -> colN -> end`, with a single `flush`
    /// after the very last symbol of the very last line.
    ///
    /// Framing (record count, column count, cluster count, codebook offset)
    /// is the caller's responsibility; this only ever writes the raw coded
    /// body.
    ///
    /// `trace`, if supplied, receives each line's dequantized reconstruction
    /// (the same bytes the decoder is expected to later reproduce), terminated
    /// by a trailing `\n` exactly like [`Driver::decode_all`]'s own output, as
    /// it is computed, so a caller can diff `trace`'s output against a real
    /// decode run to localize a divergence without recompiling anything.
    pub fn encode_all<W: Write>(
        &mut self,
        lines: &mut dyn LineSource,
        cluster_set: &ClusterSet,
        distortion: &dyn DistortionProvider,
        sink: W,
        mut trace: Option<&mut dyn LineSink>,
    ) -> Result<EncodeStats> {
        let columns = cluster_set.columns();
        let mut encoder = RangeEncoder::new(CountingWriter { inner: sink, count: 0 });
        let mut symbols_encoded = 0u64;
        let mut distortion_sum = 0f64;
        let mut trace_line = vec![0u8; columns as usize + 1];
        trace_line[columns as usize] = b'\n';

        while let Some((cluster_id, line)) = lines.next_line() {
            if line.len() != columns as usize {
                return Err(Error::MalformedCodebook(format!(
                    "line has {} columns, codebook expects {columns}",
                    line.len()
                )));
            }
            if cluster_id as usize >= CLUSTER_ALPHABET_MAX {
                return Err(Error::UnknownCluster(cluster_id));
            }
            let cluster = cluster_set
                .clusters
                .get(cluster_id as usize)
                .ok_or(Error::UnknownCluster(cluster_id))?;

            let cluster_model = self.models.get_or_init(ModelKey::ClusterId, CLUSTER_ALPHABET_MAX, self.r_max);
            encoder.step(cluster_model, cluster_id as usize)?;

            let mut prev_v = NULL_CONTEXT;
            for c in 0..columns {
                let ctx = if c == 0 { NULL_CONTEXT } else { prev_v };
                let (quantizer, ctx_id) = cluster
                    .choose(c, ctx, &mut self.rng)
                    .ok_or(Error::InconsistentAlphabet { symbol: ctx, column: c })?;

                let input_symbol = line[c as usize];
                let v = quantizer
                    .apply(input_symbol)
                    .ok_or(Error::InconsistentAlphabet { symbol: input_symbol, column: c })?;
                let s = quantizer.find_state_encoding(v, c)?;

                let model = self.models.get_or_init(
                    ModelKey::Symbol { cluster: cluster_id, column: c, ctx_id },
                    quantizer.output_alphabet().size(),
                    self.r_max,
                );
                encoder.step(model, s as usize)?;

                let cost = distortion.cost(input_symbol as usize, v as usize);
                distortion_sum += cost;
                symbols_encoded += 1;
                trace_line[c as usize] = v;
                prev_v = v;
            }

            if let Some(sink) = trace.as_deref_mut() {
                sink.write_line(&trace_line)?;
            }
        }

        let sink = encoder.flush()?;
        Ok(EncodeStats {
            bytes_written: sink.count,
            symbols_encoded,
            mean_distortion: if symbols_encoded > 0 {
                distortion_sum / symbols_encoded as f64
            } else {
                0.0
            },
        })
    }

    /// Decodes `record_count` lines of `columns` symbols each from `source`
    /// against `cluster_set`, writing each reconstructed line to `sink`.
    ///
    /// `record_count` and `columns` come from the caller's stream framing.
    /// The special `last_step` handling applies only to the very last symbol
    /// of the very last line — every other symbol, including the cluster-id
    /// symbol of the last line, uses the ordinary `step`.
    pub fn decode_all<R: Read>(
        &mut self,
        source: R,
        cluster_set: &ClusterSet,
        record_count: u64,
        sink: &mut dyn LineSink,
    ) -> Result<()> {
        let columns = cluster_set.columns();
        let mut decoder = RangeDecoder::new(source)?;
        let mut line = vec![0u8; columns as usize + 1];
        line[columns as usize] = b'\n';

        for line_index in 0..record_count {
            let is_last_line = line_index + 1 == record_count;

            let cluster_model = self.models.get_or_init(ModelKey::ClusterId, CLUSTER_ALPHABET_MAX, self.r_max);
            let cluster_id = decoder.step(cluster_model)? as u32;
            if cluster_id as usize >= CLUSTER_ALPHABET_MAX {
                return Err(Error::UnknownCluster(cluster_id));
            }
            let cluster = cluster_set
                .clusters
                .get(cluster_id as usize)
                .ok_or(Error::UnknownCluster(cluster_id))?;

            let mut prev_v = NULL_CONTEXT;
            for c in 0..columns {
                let ctx = if c == 0 { NULL_CONTEXT } else { prev_v };
                let (quantizer, ctx_id) = cluster
                    .choose(c, ctx, &mut self.rng)
                    .ok_or(Error::InconsistentAlphabet { symbol: ctx, column: c })?;

                let model = self.models.get_or_init(
                    ModelKey::Symbol { cluster: cluster_id, column: c, ctx_id },
                    quantizer.output_alphabet().size(),
                    self.r_max,
                );

                let is_last_symbol = is_last_line && c + 1 == columns;
                let state = if is_last_symbol {
                    decoder.last_step(model)?
                } else {
                    decoder.step(model)?
                };

                let v = quantizer
                    .output_alphabet()
                    .symbol_at(state)
                    .ok_or(Error::InconsistentAlphabet { symbol: state as u8, column: c })?;

                line[c as usize] = v;
                prev_v = v;
            }

            sink.write_line(&line)?;
        }

        Ok(())
    }
}
