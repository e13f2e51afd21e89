//! The two-rate codebook pair per `(column, context)`, and the rate allocator
//! that builds a whole cluster's worth of them from a conditional-PMF chain.
//!
//! Each cluster's quantizer pairs live in one flat arena (`pairs`) addressed
//! through a `column_offset` side table, rather than as a
//! `Vec<Vec<QuantizerPair>>` of ragged per-column vectors.

use std::rc::Rc;

use log::debug;

use crate::alphabet::Alphabet;
use crate::cond_pmf::CondPmfList;
use crate::config::CompressorConfig;
use crate::distortion::Distortion;
use crate::prng::Well512;
use crate::quantizer::{LloydMaxDesigner, Quantizer};

/// The sentinel left-context symbol used for column 0, which has no
/// preceding column.
pub const NULL_CONTEXT: u8 = 0;

/// Two Lloyd–Max quantizers of adjacent state counts bracketing a column's rate
/// target, plus the mixing weight `alpha` (the probability of drawing `hi`).
#[derive(Debug, Clone)]
pub struct QuantizerPair {
    pub lo: Quantizer,
    pub hi: Quantizer,
    pub alpha: f64,
}

impl QuantizerPair {
    /// The output alphabets of `lo` and `hi`, unioned — what the next
    /// column's input union alphabet is built from.
    fn union_output_symbols(&self, into: &mut Vec<u8>) {
        into.extend_from_slice(self.lo.output_alphabet().symbols());
        into.extend_from_slice(self.hi.output_alphabet().symbols());
    }
}

/// One cluster's full set of per-column, per-context quantizer pairs.
#[derive(Debug, Clone)]
pub struct ClusterCodebookSet {
    input_alphabet: Rc<Alphabet>,
    columns: u32,
    /// The input union alphabet for each column, ordered ascending (so contexts
    /// are visited in alphabet order, per ordering rule).
    unions: Vec<Rc<Alphabet>>,
    /// Flat arena of all quantizer pairs across all columns.
    pairs: Vec<QuantizerPair>,
    /// `pairs[column_offset[c] .. column_offset[c + 1]]` holds column `c`'s
    /// pairs, aligned with `unions[c]`'s symbol order.
    column_offset: Vec<usize>,
}

impl ClusterCodebookSet {
    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn input_alphabet(&self) -> &Rc<Alphabet> {
        &self.input_alphabet
    }

    pub fn union_alphabet(&self, column: u32) -> &Rc<Alphabet> {
        &self.unions[column as usize]
    }

    /// Total number of distinct contexts stored for `column` — the size of the
    /// context dimension the adaptive frequency model needs for this column.
    pub fn context_count(&self, column: u32) -> usize {
        self.unions[column as usize].size()
    }

    /// Rebuilds a codebook set from its stored parts; used by
    /// [`crate::codebook_io::read_codebook`] to reassemble what
    /// [`generate_codebooks`] would have produced.
    pub(crate) fn from_parts(
        input_alphabet: Rc<Alphabet>,
        columns: u32,
        unions: Vec<Rc<Alphabet>>,
        pairs: Vec<QuantizerPair>,
        column_offset: Vec<usize>,
    ) -> Self {
        Self {
            input_alphabet,
            columns,
            unions,
            pairs,
            column_offset,
        }
    }

    fn pair_at(&self, column: u32, position: u32) -> &QuantizerPair {
        &self.pairs[self.column_offset[column as usize] + position as usize]
    }

    /// Looks up the stored pair for left-context symbol `ctx` at `column`,
    /// returning it along with the context's position in the column's union
    /// alphabet (the `ctx_id` used to index the frequency model).
    pub fn pair_for_context(&self, column: u32, ctx: u8) -> Option<(&QuantizerPair, u32)> {
        let position = self.unions[column as usize].position_of(ctx)?;
        Some((self.pair_at(column, position), position))
    }

    /// Draws `hi` with probability `alpha`, else `lo`; returns the chosen
    /// quantizer and the context index to use for the frequency model. The
    /// draw is the *only* call site allowed to advance `rng`.
    ///
    /// Generic over `rand_core::RngCore` rather than tied to [`Well512`]
    /// specifically: an injectable PRNG handle is threaded through every
    /// `choose` call, and production encode/decode always instantiates this
    /// with [`Well512`] since bit-identical cross-platform output is required
    /// there, but tests can supply a deterministic fake.
    pub fn choose(
        &self,
        column: u32,
        ctx: u8,
        rng: &mut impl rand_core::RngCore,
    ) -> Option<(&Quantizer, u32)> {
        let (pair, ctx_id) = self.pair_for_context(column, ctx)?;
        let draw = (rng.next_u32() as f64) / (u32::MAX as f64 + 1.0);
        let quantizer = if draw < pair.alpha { &pair.hi } else { &pair.lo };
        Some((quantizer, ctx_id))
    }
}

/// One codebook set per cluster, all sharing the same column count and input
/// alphabet.
#[derive(Debug, Clone)]
pub struct ClusterSet {
    pub seed: u32,
    pub rate: f64,
    pub clusters: Vec<ClusterCodebookSet>,
}

impl ClusterSet {
    pub fn columns(&self) -> u32 {
        self.clusters.first().map_or(0, ClusterCodebookSet::columns)
    }
}

/// Per-column rate targets `r_c`, distributing `comp * columns` proportionally
/// to column marginal entropy. Falls back to a uniform split when every
/// column has zero marginal entropy (e.g. a degenerate, constant-valued
/// column).
fn column_rate_targets(cond_pmfs: &CondPmfList, comp: f64) -> Vec<f64> {
    let columns = cond_pmfs.columns() as usize;
    let entropies: Vec<f64> = (0..columns as u32)
        .map(|c| cond_pmfs.marginal(c).entropy())
        .collect();
    let total: f64 = entropies.iter().sum();

    if total <= 0.0 {
        vec![comp; columns]
    } else {
        entropies.iter().map(|&h| comp * columns as f64 * h / total).collect()
    }
}

/// Binary/linear search over state counts bracketing the rate target (
/// step 3). `N` is small enough in this domain (quality alphabets top out in
/// the low hundreds) that a linear scan over `1..=size` is simpler than an
/// explicit binary search and costs nothing observable; the search itself
/// already visits states in increasing order, which gives the "equidistant ->
/// lower s" tie-break for free.
fn rate_allocate(
    pmf: &crate::pmf::Pmf,
    distortion: &Distortion,
    target_rate: f64,
    max_iter: u32,
    designer: &mut LloydMaxDesigner,
) -> QuantizerPair {
    let size = pmf.alphabet().size();
    let mut entropies = Vec::with_capacity(size);
    let mut quantizers = Vec::with_capacity(size);
    for states in 1..=size {
        let (q, _) = designer.design(pmf, distortion, states, max_iter);
        let propagated = q.propagate(pmf);
        entropies.push(propagated.entropy());
        quantizers.push(q);
    }

    for idx in 0..entropies.len().saturating_sub(1) {
        let (lo_e, hi_e) = (entropies[idx], entropies[idx + 1]);
        if lo_e <= target_rate && target_rate <= hi_e {
            let alpha = if (hi_e - lo_e).abs() < 1e-12 {
                0.0
            } else {
                ((target_rate - lo_e) / (hi_e - lo_e)).clamp(0.0, 1.0)
            };
            return QuantizerPair {
                lo: quantizers[idx].clone(),
                hi: quantizers[idx + 1].clone(),
                alpha,
            };
        }
    }

    // No bracket exists: `RateInfeasible`, recovered by collapsing to a
    // single constant quantizer at whichever extreme is closest to the target.
    debug!(
        "rate target {target_rate:.4} infeasible (entropies range [{:.4}, {:.4}]); \
         collapsing to a constant quantizer",
        entropies.first().copied().unwrap_or(0.0),
        entropies.last().copied().unwrap_or(0.0),
    );
    let nearest = if target_rate <= entropies.first().copied().unwrap_or(0.0) {
        quantizers.first().cloned().unwrap()
    } else {
        quantizers.last().cloned().unwrap()
    };
    QuantizerPair {
        lo: nearest.clone(),
        hi: nearest,
        alpha: 0.0,
    }
}

/// Builds a single cluster's codebook set from its conditional-PMF chain.
/// Called once per cluster during training; the resulting
/// [`ClusterCodebookSet`] is what the driver consults at encode/decode time.
pub fn generate_codebooks(
    cond_pmfs: &CondPmfList,
    distortion: &Distortion,
    config: &CompressorConfig,
) -> ClusterCodebookSet {
    let columns = cond_pmfs.columns();
    let input_alphabet = Rc::clone(cond_pmfs.alphabet());
    let rate_targets = column_rate_targets(cond_pmfs, config.comp);

    let mut designer = LloydMaxDesigner::new();
    let mut unions: Vec<Rc<Alphabet>> = Vec::with_capacity(columns as usize);
    let mut pairs = Vec::new();
    let mut column_offset = Vec::with_capacity(columns as usize + 1);

    // Column 0 has a single sentinel context.
    unions.push(Rc::new(Alphabet::from_symbols(vec![NULL_CONTEXT])));

    for c in 0..columns {
        column_offset.push(pairs.len());
        let union = Rc::clone(&unions[c as usize]);

        let mut next_union_symbols = Vec::new();
        for &ctx in union.symbols() {
            let pmf = cond_pmfs.conditional(c, ctx);
            let pair = if pmf.is_synthetic() {
                // `EmptyContext`: this context was never observed in
                // training. Recover with a passthrough (identity) quantizer so
                // decode of corrupt/unseen input still terminates.
                debug!("column {c} context {ctx} never observed in training; using passthrough");
                let identity = Quantizer::identity(Rc::clone(&input_alphabet));
                QuantizerPair {
                    lo: identity.clone(),
                    hi: identity,
                    alpha: 0.0,
                }
            } else {
                rate_allocate(
                    pmf,
                    distortion,
                    rate_targets[c as usize],
                    config.quantizer_max_iter,
                    &mut designer,
                )
            };

            pair.union_output_symbols(&mut next_union_symbols);
            pairs.push(pair);
        }

        if c + 1 < columns {
            unions.push(Rc::new(Alphabet::from_symbols(next_union_symbols)));
        }
    }
    column_offset.push(pairs.len());

    ClusterCodebookSet {
        input_alphabet,
        columns,
        unions,
        pairs,
        column_offset,
    }
}
