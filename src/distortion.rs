//! The symmetric distortion (cost) matrix `d(i, j)` over the input alphabet.

/// Which closed-form distortion measure to build the cost table from. `UserTable`
/// covers an externally supplied matrix, e.g. one empirically derived from
/// base quality recalibration, rather than a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistortionKind {
    SquaredError,
    AbsoluteError,
    LogShiftedSquaredError,
}

/// An `N x N` matrix of nonnegative costs with `d(i, i) = 0`, immutable once
/// built.
#[derive(Debug, Clone)]
pub struct Distortion {
    size: usize,
    table: Vec<f64>,
}

impl Distortion {
    /// Builds a table from one of the closed-form variants.
    pub fn new(size: usize, kind: DistortionKind) -> Self {
        let mut table = vec![0.0; size * size];
        for i in 0..size {
            for j in 0..size {
                table[i * size + j] = Self::formula(kind, i, j);
            }
        }
        Self { size, table }
    }

    /// Wraps an externally supplied cost matrix (the "user-table" variant).
    /// `table` must be `size * size` entries in row-major order.
    pub fn from_user_table(size: usize, table: Vec<f64>) -> Self {
        assert_eq!(table.len(), size * size, "user distortion table size mismatch");
        Self { size, table }
    }

    fn formula(kind: DistortionKind, i: usize, j: usize) -> f64 {
        if i == j {
            return 0.0;
        }
        let diff = i as f64 - j as f64;
        match kind {
            DistortionKind::SquaredError => diff * diff,
            DistortionKind::AbsoluteError => diff.abs(),
            DistortionKind::LogShiftedSquaredError => (1.0 + diff * diff).ln(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// `d(i, j)`, the cost of reconstructing input symbol `i` as `j`.
    pub fn cost(&self, i: usize, j: usize) -> f64 {
        self.table[i * self.size + j]
    }
}
