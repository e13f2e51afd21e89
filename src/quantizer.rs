//! The scalar quantizer type and the Lloyd–Max designer that produces one from
//! a PMF, a distortion table, and a target state count.

use std::rc::Rc;

use crate::alphabet::Alphabet;
use crate::distortion::Distortion;
use crate::error::{Error, Result};
use crate::pmf::Pmf;

/// A map from an input alphabet to a (generally smaller) output alphabet of
/// reconstruction symbols, immutable once designed.
///
/// `q[i]` always lies in `output_alphabet`; `output_alphabet` is
/// exactly `{q[i] : 0 <= i < N}` with duplicates removed and positions
/// reassigned densely, which [`Alphabet::from_symbols`] gives us for free.
#[derive(Debug, Clone)]
pub struct Quantizer {
    input_alphabet: Rc<Alphabet>,
    /// Indexed by input-alphabet *position*; value is the reconstruction symbol.
    q: Vec<u8>,
    output_alphabet: Rc<Alphabet>,
}

impl Quantizer {
    /// The identity quantizer on `alphabet`: every symbol reconstructs as
    /// itself. Used as the "passthrough" quantizer for contexts that were never
    /// observed in training (the `EmptyContext` recovery path).
    pub fn identity(alphabet: Rc<Alphabet>) -> Self {
        let q = alphabet.symbols().to_vec();
        Self {
            output_alphabet: Rc::new(Alphabet::from_symbols(q.clone())),
            input_alphabet: alphabet,
            q,
        }
    }

    /// A single-state quantizer mapping every input symbol to `value`. Used for
    /// the degenerate `lo = hi` collapse when no feasible rate bracket exists
    /// (the `RateInfeasible` recovery path).
    pub fn constant(alphabet: Rc<Alphabet>, value: u8) -> Self {
        let q = vec![value; alphabet.size()];
        Self {
            output_alphabet: Rc::new(Alphabet::from_symbols(vec![value])),
            input_alphabet: alphabet,
            q,
        }
    }

    pub fn input_alphabet(&self) -> &Rc<Alphabet> {
        &self.input_alphabet
    }

    pub fn output_alphabet(&self) -> &Rc<Alphabet> {
        &self.output_alphabet
    }

    /// `q[position] -> reconstruction symbol`, indexed by input-alphabet
    /// position. This is exactly the per-line map the codebook file format
    /// serializes.
    pub fn reconstruction_map(&self) -> &[u8] {
        &self.q
    }

    /// Rebuilds a quantizer from a previously serialized reconstruction map
    /// (the `q_lo`/`q_hi` lines of the codebook file format). `map.len()` must
    /// equal `input_alphabet.size()`.
    pub fn from_map(input_alphabet: Rc<Alphabet>, map: Vec<u8>) -> Self {
        debug_assert_eq!(map.len(), input_alphabet.size());
        let output_alphabet = Rc::new(Alphabet::from_symbols(map.clone()));
        Self {
            input_alphabet,
            q: map,
            output_alphabet,
        }
    }

    /// `apply(input_symbol) -> reconstruction`. Returns `None` if `input_symbol`
    /// does not belong to this quantizer's input alphabet.
    pub fn apply(&self, input_symbol: u8) -> Option<u8> {
        let position = self.input_alphabet.position_of(input_symbol)?;
        self.q.get(position as usize).copied()
    }

    /// The position of `reconstruction` within the output alphabet — what the
    /// arithmetic coder actually encodes.
    pub fn state_index(&self, reconstruction: u8) -> Option<u32> {
        self.output_alphabet.position_of(reconstruction)
    }

    /// Same as [`Quantizer::state_index`] but turns a miss into
    /// [`Error::InconsistentAlphabet`], which should be unreachable for any
    /// quantizer produced by this crate.
    pub fn find_state_encoding(&self, reconstruction: u8, column: u32) -> Result<u32> {
        self.state_index(reconstruction).ok_or(Error::InconsistentAlphabet {
            symbol: reconstruction,
            column,
        })
    }

    /// Propagates an input PMF through this quantizer, producing the PMF of the
    /// reconstructed symbol. Accumulates into `output.pmf[q[i]]`, not
    /// `output[q[i]]` as a naive pointer-arithmetic reading might suggest.
    pub fn propagate(&self, input: &Pmf) -> Pmf {
        let mut output = Pmf::new(Rc::clone(&self.output_alphabet));
        for (position, &symbol) in self.input_alphabet.symbols().iter().enumerate() {
            let weight = input.probability_at(position);
            if weight > 0.0 {
                output.add(self.q[position], weight);
            }
        }
        output.normalize();
        output
    }
}

/// Designs Lloyd–Max quantizers. Holds reusable scratch buffers so repeated
/// calls (one per column, per context, during codebook generation) don't
/// reallocate, rather than allocating fresh bound/reconstruction buffers on
/// every call.
#[derive(Debug, Default)]
pub struct LloydMaxDesigner {
    bounds: Vec<usize>,
    reconstruction: Vec<usize>,
}

impl LloydMaxDesigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Designs a quantizer with at most `states` distinct reconstructions for
    /// `pmf` under `distortion`, returning the quantizer and its achieved
    /// expected distortion.
    pub fn design(
        &mut self,
        pmf: &Pmf,
        distortion: &Distortion,
        states: usize,
        max_iter: u32,
    ) -> (Quantizer, f64) {
        let alphabet = Rc::clone(pmf.alphabet());
        let size = alphabet.size();
        assert!(states >= 1 && states <= size.max(1));

        if states <= 1 || size <= 1 {
            return self.design_single_state(&alphabet, pmf, distortion);
        }

        self.bounds.clear();
        self.bounds.resize(states + 1, 0);
        self.reconstruction.clear();
        self.reconstruction.resize(states, 0);

        self.bounds[0] = 0;
        self.bounds[states] = size;
        for j in 1..states {
            self.bounds[j] = (j * size) / states;
        }
        for j in 0..states {
            self.reconstruction[j] = (self.bounds[j] + self.bounds[j + 1] - 1) / 2;
        }

        let mut changed = true;
        let mut iter = 0;
        while changed && iter < max_iter {
            changed = false;
            iter += 1;

            for j in 0..states {
                let (lo, hi) = (self.bounds[j], self.bounds[j + 1]);
                let mut min_mse = f64::MAX;
                let mut min_r = lo;
                for r in lo..hi {
                    let mut mse = 0.0;
                    for i in lo..hi {
                        mse += pmf.probability_at(i) * distortion.cost(i, r);
                    }
                    if mse < min_mse {
                        min_mse = mse;
                        min_r = r;
                    }
                }
                if min_r != self.reconstruction[j] {
                    changed = true;
                    self.reconstruction[j] = min_r;
                }
            }

            let mut r = 0;
            for j in 1..size.saturating_sub(1) {
                if r >= states - 1 {
                    break;
                }
                let mse = distortion.cost(j, self.reconstruction[r]);
                let next_mse = distortion.cost(j, self.reconstruction[r + 1]);
                if next_mse < mse {
                    r += 1;
                    self.bounds[r] = j;
                }
            }
        }

        let mut q = vec![0u8; size];
        let mut achieved = 0.0;
        for j in 0..states {
            let reconstruction_symbol = alphabet.symbol_at(self.reconstruction[j]).unwrap_or(0);
            for i in self.bounds[j]..self.bounds[j + 1] {
                q[i] = reconstruction_symbol;
                achieved += pmf.probability_at(i) * distortion.cost(i, self.reconstruction[j]);
            }
        }

        let output_alphabet = Rc::new(Alphabet::from_symbols(q.clone()));
        (
            Quantizer {
                input_alphabet: alphabet,
                q,
                output_alphabet,
            },
            achieved,
        )
    }

    fn design_single_state(
        &self,
        alphabet: &Rc<Alphabet>,
        pmf: &Pmf,
        distortion: &Distortion,
    ) -> (Quantizer, f64) {
        let size = alphabet.size();
        let mut best_r = 0;
        let mut best_mse = f64::MAX;
        for r in 0..size {
            let mse: f64 = (0..size)
                .map(|i| pmf.probability_at(i) * distortion.cost(i, r))
                .sum();
            if mse < best_mse {
                best_mse = mse;
                best_r = r;
            }
        }
        let value = alphabet.symbol_at(best_r).unwrap_or(0);
        (Quantizer::constant(Rc::clone(alphabet), value), best_mse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distortion::DistortionKind;

    #[test]
    fn single_state_picks_mode() {
        let alphabet = Alphabet::dense(5);
        let mut pmf = Pmf::new(Rc::clone(&alphabet));
        pmf.add(4, 10.0);
        pmf.normalize();
        let distortion = Distortion::new(5, DistortionKind::SquaredError);
        let mut designer = LloydMaxDesigner::new();
        let (q, dist) = designer.design(&pmf, &distortion, 1, 25);
        assert_eq!(q.apply(0), Some(4));
        assert_eq!(q.apply(4), Some(4));
        assert_eq!(dist, 0.0);
    }

    #[test]
    fn monotone_distortion_with_more_states() {
        let alphabet = Alphabet::dense(20);
        let mut pmf = Pmf::new(Rc::clone(&alphabet));
        for s in 0..20u8 {
            pmf.add(s, 1.0 + (s as f64));
        }
        pmf.normalize();
        let distortion = Distortion::new(20, DistortionKind::SquaredError);
        let mut designer = LloydMaxDesigner::new();

        let mut previous = f64::MAX;
        for states in 1..=20 {
            let (_, dist) = designer.design(&pmf, &distortion, states, 25);
            assert!(dist <= previous + 1e-9, "states={states} dist={dist} prev={previous}");
            previous = dist;
        }
    }

    #[test]
    fn output_alphabet_shrinks_when_regions_collapse() {
        let alphabet = Alphabet::dense(3);
        let mut pmf = Pmf::new(Rc::clone(&alphabet));
        pmf.add(1, 1.0);
        pmf.normalize();
        let distortion = Distortion::new(3, DistortionKind::SquaredError);
        let mut designer = LloydMaxDesigner::new();
        let (q, _) = designer.design(&pmf, &distortion, 3, 25);
        assert!(q.output_alphabet().size() <= 3);
    }

    #[test]
    fn identity_quantizer_is_lossless() {
        let alphabet = Alphabet::dense(10);
        let q = Quantizer::identity(alphabet);
        for s in 0..10u8 {
            assert_eq!(q.apply(s), Some(s));
            assert_eq!(q.state_index(s), Some(s as u32));
        }
    }
}
