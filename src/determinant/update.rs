//! Single-electron test values via the determinant-ratio lemma.
//!
//! Replacing electron `e`'s row of a determinant's matrix by a new orbital
//! row `v` multiplies the determinant by `v · inverse[:, e]`. Each row of the
//! input is one such substitution: the value row gives the move ratio, and
//! gradient or Hessian rows of the orbitals give derivatives of Ψ relative to
//! the old value, since Ψ is linear in the substituted row.

use nalgebra::{DMatrix, DVector};
use super::combine::{reference, sign_of, term_values, weighted_sum};
use super::evaluate::{substituted_slogdet, SpinState};
use super::expansion::{DeterminantExpansion, Spin};

/// Determinant ratios for every row of `mo_rows` (rows × orbitals).
///
/// Result has shape (rows × determinants of this spin).
pub fn determinant_ratios(mo_rows: &DMatrix<f64>, state: &SpinState, determinants: &[Vec<usize>], e: usize) -> DMatrix<f64> {
    let mut ratios = DMatrix::zeros(mo_rows.nrows(), determinants.len());
    for (d, det) in determinants.iter().enumerate() {
        let inverse_col = state.inverses[d].column(e);
        for k in 0..mo_rows.nrows() {
            ratios[(k, d)] = det.iter()
                .enumerate()
                .map(|(a, &orb)| mo_rows[(k, orb)] * inverse_col[a])
                .sum();
        }
    }
    ratios
}

/// Substituted values of Ψ for each row of a test, sharing one log reference.
#[derive(Debug, Clone)]
pub struct TestValues {
    /// Σₜ cₜ sₜ exp(Lₜ - ref) with each row substituted
    pub values: DVector<f64>,
    /// The same sum for the current configuration
    pub current: f64,
    /// Ratio of each determinant of the moving spin, per row (±∞ when leaving a node)
    pub det_ratios: DMatrix<f64>,
}

impl TestValues {
    /// Ψ(row k) / Ψ(current). Leaving a node gives ±∞; staying on one gives 0.
    pub fn ratio(&self, k: usize) -> f64 {
        if self.current == 0.0 {
            if self.values[k] == 0.0 {
                0.0
            } else {
                self.values[k].signum() * f64::INFINITY
            }
        } else {
            self.values[k] / self.current
        }
    }

    /// Row `k` relative to the substituted value row, e.g. ∇Ψ/Ψ at the new position.
    pub fn relative(&self, k: usize) -> f64 {
        self.values[k] / self.values[0]
    }
}

/// Substitute every row of `mo_rows` for electron `e` and evaluate Ψ.
///
/// `moving` is the state of the spin that electron `e` belongs to, `other`
/// the unchanged opposite spin. Determinants currently on a node have no
/// inverse, so they are evaluated directly from the substituted matrix.
pub fn testvalue(
    expansion: &DeterminantExpansion,
    ci: &DVector<f64>,
    spin: Spin,
    moving: &SpinState,
    other: &SpinState,
    e: usize,
    mo_rows: &DMatrix<f64>,
) -> TestValues {
    let determinants = expansion.determinants(spin);
    let mut det_ratios = determinant_ratios(mo_rows, moving, determinants, e);
    let nrows = mo_rows.nrows();
    let ndet = moving.num_determinants();

    let mut new_signs = DMatrix::zeros(nrows, ndet);
    let mut new_logs = DMatrix::zeros(nrows, ndet);
    for d in 0..ndet {
        for k in 0..nrows {
            if moving.signs[d] == 0.0 {
                let (sign, logabs, _) = substituted_slogdet(&moving.mo_values, e, &mo_rows.row(k), &determinants[d]);
                new_signs[(k, d)] = sign;
                new_logs[(k, d)] = logabs;
                det_ratios[(k, d)] = if sign == 0.0 { 0.0 } else { sign * f64::INFINITY };
            } else {
                let ratio = det_ratios[(k, d)];
                new_signs[(k, d)] = sign_of(ratio) * moving.signs[d];
                new_logs[(k, d)] = moving.logabs[d] + ratio.abs().ln();
            }
        }
    }

    let term_values_for = |signs: &DVector<f64>, logs: &DVector<f64>| match spin {
        Spin::Up => term_values(expansion, signs, logs, &other.signs, &other.logabs),
        Spin::Down => term_values(expansion, &other.signs, &other.logabs, signs, logs),
    };

    let (old_signs, old_logs) = term_values_for(&moving.signs, &moving.logabs);
    let new_terms: Vec<(DVector<f64>, DVector<f64>)> = (0..nrows)
        .map(|k| term_values_for(&new_signs.row(k).transpose(), &new_logs.row(k).transpose()))
        .collect();

    let shared_ref = new_terms.iter()
        .map(|(_, logs)| reference(logs))
        .fold(reference(&old_logs), f64::max);
    TestValues {
        values: DVector::from_fn(nrows, |k, _| {
            let (signs, logs) = &new_terms[k];
            weighted_sum(ci, signs, logs, shared_ref)
        }),
        current: weighted_sum(ci, &old_signs, &old_logs, shared_ref),
        det_ratios,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::determinant::evaluate::compute_determinants;

    #[test]
    fn test_lemma_matches_direct_determinant() {
        let mos = DMatrix::from_row_slice(3, 4, &[
            0.9, 0.1, -0.4, 0.3,
            0.2, 1.1, 0.5, -0.2,
            -0.3, 0.4, 0.8, 0.6,
        ]);
        let dets = vec![vec![0, 1, 2], vec![0, 1, 3], vec![3, 2, 1]];
        let state = compute_determinants(mos.clone(), &dets);
        let row = DMatrix::from_row_slice(1, 4, &[0.5, -0.7, 0.2, 0.9]);

        let ratios = determinant_ratios(&row, &state, &dets, 1);
        for (d, det) in dets.iter().enumerate() {
            let mut moved = mos.clone();
            moved.set_row(1, &row.row(0));
            let old = mos.select_columns(det.iter()).determinant();
            let new = moved.select_columns(det.iter()).determinant();
            assert_relative_eq!(ratios[(0, d)], new / old, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_current_row_gives_unit_ratio() {
        let mos = DMatrix::from_row_slice(2, 3, &[
            0.9, 0.1, -0.4,
            0.2, 1.1, 0.5,
        ]);
        let up = compute_determinants(mos.clone(), &[vec![0, 1], vec![0, 2]]);
        let down = compute_determinants(DMatrix::zeros(0, 3), &[vec![]]);
        let expansion = DeterminantExpansion::new(
            (2, 0),
            vec![vec![0, 1], vec![0, 2]],
            vec![vec![]],
            vec![0, 1],
            vec![0, 0],
        ).unwrap();
        let ci = DVector::from_vec(vec![0.8, -0.6]);
        let row = mos.rows(0, 1).into_owned();
        let test = testvalue(&expansion, &ci, Spin::Up, &up, &down, 0, &row);
        assert_relative_eq!(test.ratio(0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(test.det_ratios[(0, 1)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_leaving_a_node() {
        // both electrons on the same orbital row
        let mos = DMatrix::from_row_slice(2, 3, &[
            0.9, 0.1, -0.4,
            0.9, 0.1, -0.4,
        ]);
        let dets = vec![vec![0, 1], vec![0, 2]];
        let up = compute_determinants(mos.clone(), &dets);
        let down = compute_determinants(DMatrix::zeros(0, 3), &[vec![]]);
        assert!(up.has_node());
        let expansion = DeterminantExpansion::new((2, 0), dets.clone(), vec![vec![]], vec![0, 1], vec![0, 0]).unwrap();
        let ci = DVector::from_vec(vec![0.8, -0.6]);

        let row = DMatrix::from_row_slice(1, 3, &[0.2, 1.1, 0.5]);
        let test = testvalue(&expansion, &ci, Spin::Up, &up, &down, 1, &row);
        let mut moved = mos.clone();
        moved.set_row(1, &row.row(0));
        let direct: f64 = dets.iter()
            .zip(ci.iter())
            .map(|(det, c)| c * moved.select_columns(det.iter()).determinant())
            .sum();
        assert_eq!(test.ratio(0), direct.signum() * f64::INFINITY);
        assert!(test.det_ratios.iter().all(|r| r.is_infinite()));
        assert_eq!(test.current, 0.0);

        // staying on the node
        let test = testvalue(&expansion, &ci, Spin::Up, &up, &down, 1, &mos.rows(0, 1).into_owned());
        assert_eq!(test.ratio(0), 0.0);
    }
}
