//! The conditional-PMF chain built from a single pass over the training
//! corpus.

use std::rc::Rc;

use crate::alphabet::Alphabet;
use crate::pmf::Pmf;

/// For each column `c > 0`, a flat array of `N` PMFs indexed by the *previous*
/// column's reconstruction symbol; column `0` holds a single marginal PMF since
/// there is no left context there. Also holds the per-column marginal PMF,
/// aggregated left-to-right as a weighted sum of conditional rows — not
/// recomputed from raw counts, since the point is to have a PMF over the
/// *reconstructed* chain, consistent with how the rate allocator walks it.
#[derive(Debug)]
pub struct CondPmfList {
    alphabet: Rc<Alphabet>,
    columns: u32,
    /// `conditionals[c][prev_position]` for `c >= 1`; `conditionals[0]` is empty.
    conditionals: Vec<Vec<Pmf>>,
    /// `marginals[c]`, one per column.
    marginals: Vec<Pmf>,
    finalized: bool,
}

impl CondPmfList {
    pub fn new(alphabet: Rc<Alphabet>, columns: u32) -> Self {
        let size = alphabet.size();
        let mut conditionals = Vec::with_capacity(columns as usize);
        conditionals.push(Vec::new()); // column 0: no left context.
        for _ in 1..columns {
            conditionals.push((0..size).map(|_| Pmf::new(Rc::clone(&alphabet))).collect());
        }
        let marginals = (0..columns).map(|_| Pmf::new(Rc::clone(&alphabet))).collect();

        Self {
            alphabet,
            columns,
            conditionals,
            marginals,
            finalized: false,
        }
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn alphabet(&self) -> &Rc<Alphabet> {
        &self.alphabet
    }

    /// Folds one training line into the running counts. Must be called for
    /// every line before [`CondPmfList::finalize`].
    pub fn observe_line(&mut self, line: &[u8]) {
        assert_eq!(line.len(), self.columns as usize);

        self.marginals[0].add(line[0], 1.0);
        for c in 1..self.columns as usize {
            if let Some(prev_position) = self.alphabet.position_of(line[c - 1]) {
                self.conditionals[c][prev_position as usize].add(line[c], 1.0);
            }
        }
    }

    /// Normalizes every conditional slot and derives the per-column marginal
    /// PMFs. Idempotent; safe to call once after all training lines have been
    /// observed.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.marginals[0].normalize();

        for c in 1..self.columns as usize {
            for pmf in &mut self.conditionals[c] {
                pmf.normalize();
            }

            let size = self.alphabet.size();
            let mut marginal = Pmf::new(Rc::clone(&self.alphabet));
            for prev_position in 0..size {
                let weight = self.marginals[c - 1].probability_at(prev_position);
                if weight <= 0.0 {
                    continue;
                }
                let conditional = &self.conditionals[c][prev_position];
                for symbol_position in 0..size {
                    let symbol = self.alphabet.symbol_at(symbol_position).unwrap();
                    marginal.add(symbol, weight * conditional.probability_at(symbol_position));
                }
            }
            marginal.normalize();
            self.marginals[c] = marginal;
        }

        self.finalized = true;
    }

    /// `get_cond_pmf` in vocabulary: the PMF of column `c`'s symbol given
    /// that the previous column's reconstruction was `prev`. For `c == 0`,
    /// `prev` is ignored and the column's marginal is returned.
    pub fn conditional(&self, column: u32, prev: u8) -> &Pmf {
        if column == 0 {
            return &self.marginals[0];
        }
        let position = self.alphabet.position_of(prev).unwrap_or(0);
        &self.conditionals[column as usize][position as usize]
    }

    pub fn marginal(&self, column: u32) -> &Pmf {
        &self.marginals[column as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marginal_matches_direct_counts_for_column_zero() {
        let alphabet = Alphabet::dense(5);
        let mut list = CondPmfList::new(Rc::clone(&alphabet), 3);
        list.observe_line(&[4, 4, 4]);
        list.observe_line(&[0, 0, 0]);
        list.finalize();
        assert!((list.marginal(0).probability_at(0) - 0.5).abs() < 1e-12);
        assert!((list.marginal(0).probability_at(4) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn conditional_is_deterministic_when_unambiguous() {
        let alphabet = Alphabet::dense(5);
        let mut list = CondPmfList::new(Rc::clone(&alphabet), 3);
        for _ in 0..10 {
            list.observe_line(&[4, 4, 4]);
        }
        for _ in 0..10 {
            list.observe_line(&[0, 0, 0]);
        }
        list.finalize();
        assert!((list.conditional(1, 4).probability_at(4) - 1.0).abs() < 1e-12);
        assert!((list.conditional(1, 0).probability_at(0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unseen_context_is_synthetic() {
        let alphabet = Alphabet::dense(5);
        let mut list = CondPmfList::new(Rc::clone(&alphabet), 2);
        list.observe_line(&[0, 0]);
        list.finalize();
        // Context `prev=3` was never observed at column 1.
        assert!(list.conditional(1, 3).is_synthetic());
    }
}
