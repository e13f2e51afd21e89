//! A discrete probability mass function over an [`Alphabet`], with lazy
//! normalization.

use std::rc::Rc;

use crate::alphabet::Alphabet;

/// A vector of nonnegative weights over an alphabet.
///
/// Constructed empty via [`Pmf::new`], mutated by [`Pmf::add`] during a training
/// scan, then frozen by [`Pmf::normalize`] before being handed to the Lloyd–Max
/// designer. [`Pmf::probability`] will normalize on demand if the caller forgot
/// to, so reading from an unnormalized PMF is never unsound, just (once) more
/// expensive.
#[derive(Debug, Clone)]
pub struct Pmf {
    alphabet: Rc<Alphabet>,
    weights: Vec<f64>,
    normalized: bool,
    /// Set by [`Pmf::normalize`] when the accumulated total was zero, i.e. this
    /// context was never observed. The codebook generator uses this flag to
    /// recognize empty contexts rather than re-deriving it from the
    /// weights each time.
    synthetic: bool,
}

impl Pmf {
    pub fn new(alphabet: Rc<Alphabet>) -> Self {
        let size = alphabet.size();
        Self {
            alphabet,
            weights: vec![0.0; size],
            normalized: false,
            synthetic: false,
        }
    }

    pub fn alphabet(&self) -> &Rc<Alphabet> {
        &self.alphabet
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Adds `weight` (typically `1.0` for a raw symbol count) to `symbol`'s slot.
    /// Un-normalizes the PMF, since the total has changed.
    pub fn add(&mut self, symbol: u8, weight: f64) {
        if let Some(position) = self.alphabet.position_of(symbol) {
            self.weights[position as usize] += weight;
        }
        self.normalized = false;
    }

    /// Divides every weight by the accumulated total. If the total is zero (the
    /// context was never observed), produces a uniform distribution instead and
    /// sets [`Pmf::is_synthetic`].
    pub fn normalize(&mut self) {
        let total: f64 = self.weights.iter().sum();
        if total <= 0.0 {
            let uniform = 1.0 / self.weights.len().max(1) as f64;
            self.weights.fill(uniform);
            self.synthetic = true;
        } else {
            for w in &mut self.weights {
                *w /= total;
            }
            self.synthetic = false;
        }
        self.normalized = true;
    }

    /// The probability of `symbol`'s position in this PMF's alphabet, implicitly
    /// normalizing first if needed.
    pub fn probability(&mut self, symbol: u8) -> f64 {
        if !self.normalized {
            self.normalize();
        }
        self.probability_at(self.alphabet.position_of(symbol).unwrap_or(0) as usize)
    }

    /// Same as [`Pmf::probability`] but indexed by alphabet position rather than
    /// symbol value; does not normalize on demand (callers in the hot decode/design
    /// loops always normalize up front).
    pub fn probability_at(&self, position: usize) -> f64 {
        self.weights.get(position).copied().unwrap_or(0.0)
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Shannon entropy in bits, assuming the PMF is already normalized.
    pub fn entropy(&self) -> f64 {
        self.weights
            .iter()
            .filter(|&&p| p > 0.0)
            .map(|&p| -p * p.log2())
            .sum()
    }
}
