//! Sherman-Morrison maintenance of cached inverses after an accepted move.
//!
//! Inverses are stored as (orbitals × electrons), so electron `e`'s slot is
//! column `e`. Replacing row `e` of the orbital matrix by `v`:
//!
//!   tmp = v · A⁻¹,  ratio = tmp[e]
//!   A'⁻¹ = A⁻¹ - (A⁻¹[:, e] / ratio) ⊗ tmp,  then  A'⁻¹[:, e] = A⁻¹[:, e] / ratio

use nalgebra::{DMatrix, DVector, RowDVector};
use super::combine::sign_of;
use super::evaluate::{slogdet_inverse, SpinState};

/// Rank-1 update of one inverse. Returns the determinant ratio and the new inverse.
pub fn sherman_morrison_row(e: usize, inverse: &DMatrix<f64>, mo_row: &DVector<f64>, determinant: &[usize]) -> (f64, DMatrix<f64>) {
    let vec = RowDVector::from_iterator(determinant.len(), determinant.iter().map(|&o| mo_row[o]));
    let tmp = &vec * inverse;
    let ratio = tmp[e];
    let inv_ratio = inverse.column(e) / ratio;
    let mut updated = inverse - &inv_ratio * &tmp;
    updated.set_column(e, &inv_ratio);
    (ratio, updated)
}

/// New state of one spin after electron `e` moved to orbitals `mo_row`.
///
/// Determinants sitting on a node before the move have no inverse to update
/// and are refactorized directly. Returns `None` if a determinant lands on a
/// node through the rank-1 update; the caller must recompute from scratch.
pub fn update_spin_state(state: &SpinState, e: usize, mo_row: &DVector<f64>, determinants: &[Vec<usize>]) -> Option<SpinState> {
    let ndet = determinants.len();
    let mut mo_values = state.mo_values.clone();
    mo_values.set_row(e, &mo_row.transpose());
    let mut signs = DVector::zeros(ndet);
    let mut logabs = DVector::zeros(ndet);
    let mut inverses = Vec::with_capacity(ndet);
    for (d, det) in determinants.iter().enumerate() {
        if state.signs[d] == 0.0 {
            let (sign, log, inverse) = slogdet_inverse(mo_values.select_columns(det.iter()));
            signs[d] = sign;
            logabs[d] = log;
            inverses.push(inverse);
            continue;
        }
        let (ratio, inverse) = sherman_morrison_row(e, &state.inverses[d], mo_row, det);
        if ratio == 0.0 || !ratio.is_finite() {
            return None;
        }
        signs[d] = sign_of(ratio) * state.signs[d];
        logabs[d] = state.logabs[d] + ratio.abs().ln();
        inverses.push(inverse);
    }
    Some(SpinState { mo_values, signs, logabs, inverses })
}

/// Largest relative Frobenius-norm deviation between two sets of inverses.
pub fn inverse_deviation(maintained: &SpinState, fresh: &SpinState) -> f64 {
    maintained.inverses.iter()
        .zip(fresh.inverses.iter())
        .filter(|(_, f)| !f.is_empty())
        .map(|(m, f)| (m - f).norm() / f.norm())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::determinant::evaluate::compute_determinants;

    #[test]
    fn test_update_matches_fresh_inverse() {
        let mos = DMatrix::from_row_slice(3, 4, &[
            0.9, 0.1, -0.4, 0.3,
            0.2, 1.1, 0.5, -0.2,
            -0.3, 0.4, 0.8, 0.6,
        ]);
        let dets = vec![vec![0, 1, 2], vec![1, 3, 0]];
        let state = compute_determinants(mos.clone(), &dets);
        let row = DVector::from_vec(vec![0.5, -0.7, 0.2, 0.9]);

        let updated = update_spin_state(&state, 2, &row, &dets).unwrap();

        let mut moved = mos;
        moved.set_row(2, &row.transpose());
        let fresh = compute_determinants(moved, &dets);
        assert_eq!(updated.mo_values, fresh.mo_values);
        assert_eq!(updated.signs, fresh.signs);
        assert_relative_eq!(updated.logabs, fresh.logabs, epsilon = 1e-12);
        assert!(inverse_deviation(&updated, &fresh) < 1e-12);
    }

    #[test]
    fn test_singular_update_requests_recompute() {
        let mos = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let dets = vec![vec![0, 1]];
        let state = compute_determinants(mos, &dets);
        // new row for electron 1 parallel to electron 0's row
        let row = DVector::from_vec(vec![2.0, 0.0]);
        assert!(update_spin_state(&state, 1, &row, &dets).is_none());
    }

    #[test]
    fn test_update_off_a_node() {
        let mos = DMatrix::from_row_slice(2, 3, &[
            0.9, 0.1, -0.4,
            0.9, 0.1, -0.4,
        ]);
        let dets = vec![vec![0, 1], vec![2, 0]];
        let state = compute_determinants(mos.clone(), &dets);
        assert!(state.has_node());
        let row = DVector::from_vec(vec![0.2, 1.1, 0.5]);

        let updated = update_spin_state(&state, 0, &row, &dets).unwrap();

        let mut moved = mos;
        moved.set_row(0, &row.transpose());
        let fresh = compute_determinants(moved, &dets);
        assert!(!updated.has_node());
        assert_eq!(updated.signs, fresh.signs);
        assert_relative_eq!(updated.logabs, fresh.logabs, epsilon = 1e-12);
        assert!(inverse_deviation(&updated, &fresh) < 1e-12);
    }
}
