//! Full evaluation of every determinant in an expansion.
//!
//! Determinants are factorized with LU and reported as (sign, ln|det|) so
//! that large electron counts neither overflow nor underflow. A singular
//! submatrix is a node: sign 0, log-magnitude −∞ and a zero inverse.

use nalgebra::{DMatrix, DVector, Vector3};
use rayon::prelude::*;
use crate::error::{check_len, Result};
use crate::wavefunction::OrbitalEvaluator;
use super::combine::{combine, term_values};
use super::expansion::{DeterminantExpansion, Spin};
use super::parameters::DeterminantParameters;

/// Cached determinant data of one spin channel for one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SpinState {
    /// Molecular orbitals at the electron positions (electrons × orbitals)
    pub mo_values: DMatrix<f64>,
    /// Sign of each determinant of this spin (±1, or 0 at a node)
    pub signs: DVector<f64>,
    /// ln|det| of each determinant of this spin
    pub logabs: DVector<f64>,
    /// Inverse of each determinant's occupied submatrix (orbitals × electrons)
    pub inverses: Vec<DMatrix<f64>>,
}

impl SpinState {
    pub fn num_determinants(&self) -> usize {
        self.signs.len()
    }

    /// True if any determinant of this channel sits on a node.
    pub fn has_node(&self) -> bool {
        self.signs.iter().any(|&s| s == 0.0)
    }
}

/// Sign, ln|det| and inverse of a square matrix via LU.
pub fn slogdet_inverse(m: DMatrix<f64>) -> (f64, f64, DMatrix<f64>) {
    let n = m.nrows();
    if n == 0 {
        return (1.0, 0.0, DMatrix::zeros(0, 0));
    }
    let lu = m.lu();
    let diag = lu.u().diagonal();
    if diag.iter().any(|&d| d == 0.0 || !d.is_finite()) {
        return (0.0, f64::NEG_INFINITY, DMatrix::zeros(n, n));
    }
    let mut sign: f64 = lu.p().determinant();
    let mut logabs = 0.0;
    for &d in diag.iter() {
        sign *= d.signum();
        logabs += d.abs().ln();
    }
    match lu.try_inverse() {
        Some(inverse) => (sign, logabs, inverse),
        None => (0.0, f64::NEG_INFINITY, DMatrix::zeros(n, n)),
    }
}

/// Evaluate every determinant of one spin given its orbital values.
pub fn compute_determinants(mo_values: DMatrix<f64>, determinants: &[Vec<usize>]) -> SpinState {
    let ndet = determinants.len();
    let mut signs = DVector::zeros(ndet);
    let mut logabs = DVector::zeros(ndet);
    let mut inverses = Vec::with_capacity(ndet);
    for (d, det) in determinants.iter().enumerate() {
        let (s, l, inv) = slogdet_inverse(mo_values.select_columns(det.iter()));
        signs[d] = s;
        logabs[d] = l;
        inverses.push(inv);
    }
    SpinState { mo_values, signs, logabs, inverses }
}

/// `slogdet_inverse` of one determinant with electron `e`'s orbital row replaced by `row`.
pub fn substituted_slogdet<R>(mo_values: &DMatrix<f64>, e: usize, row: &R, determinant: &[usize]) -> (f64, f64, DMatrix<f64>)
where
    R: std::ops::Index<usize, Output = f64>,
{
    let mut matrix = mo_values.select_columns(determinant.iter());
    for (a, &orb) in determinant.iter().enumerate() {
        matrix[(e, a)] = row[orb];
    }
    slogdet_inverse(matrix)
}

/// Full evaluation of one configuration.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub sign: f64,
    pub logabs: f64,
    pub up: SpinState,
    pub down: SpinState,
}

impl Evaluation {
    pub fn spin(&self, spin: Spin) -> &SpinState {
        match spin {
            Spin::Up => &self.up,
            Spin::Down => &self.down,
        }
    }
}

/// Combine two spin states through the CI mapping.
pub fn combine_states(
    expansion: &DeterminantExpansion,
    params: &DeterminantParameters,
    up: &SpinState,
    down: &SpinState,
) -> (f64, f64) {
    let (signs, logs) = term_values(expansion, &up.signs, &up.logabs, &down.signs, &down.logabs);
    combine(&params.ci_coeff, &signs, &logs)
}

/// Evaluate the expansion given atomic orbitals at all electrons (up rows first).
pub fn evaluate_from_aos(
    aos: &DMatrix<f64>,
    expansion: &DeterminantExpansion,
    params: &DeterminantParameters,
) -> Evaluation {
    let (nup, ndown) = expansion.nelec;
    let up = compute_determinants(
        aos.rows(0, nup) * &params.mo_coeff_alpha,
        &expansion.determinants_up,
    );
    let down = compute_determinants(
        aos.rows(nup, ndown) * &params.mo_coeff_beta,
        &expansion.determinants_down,
    );
    let (sign, logabs) = combine_states(expansion, params, &up, &down);
    Evaluation { sign, logabs, up, down }
}

/// Evaluate the expansion for one configuration.
pub fn evaluate_expansion<B: OrbitalEvaluator>(
    basis: &B,
    expansion: &DeterminantExpansion,
    params: &DeterminantParameters,
    positions: &[Vector3<f64>],
) -> Result<Evaluation> {
    check_len("configuration electrons", expansion.num_electrons(), positions.len())?;
    check_len("basis functions", basis.num_basis(), params.mo_coeff_alpha.nrows())?;
    let aos = basis.evaluate(positions);
    Ok(evaluate_from_aos(&aos, expansion, params))
}

/// Evaluate a batch of configurations in parallel.
pub fn evaluate_batch<B: OrbitalEvaluator>(
    basis: &B,
    expansion: &DeterminantExpansion,
    params: &DeterminantParameters,
    configs: &[Vec<Vector3<f64>>],
) -> Result<Vec<Evaluation>> {
    configs
        .par_iter()
        .map(|positions| evaluate_expansion(basis, expansion, params, positions))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_slogdet_matches_determinant() {
        let m = DMatrix::from_row_slice(3, 3, &[
            0.2, 1.5, -0.3,
            -1.1, 0.4, 0.9,
            0.7, -0.8, 0.25,
        ]);
        let det = m.determinant();
        let (sign, logabs, inverse) = slogdet_inverse(m.clone());
        assert_eq!(sign, det.signum());
        assert_relative_eq!(logabs, det.abs().ln(), epsilon = 1e-12);
        assert_relative_eq!(&m * inverse, DMatrix::identity(3, 3), epsilon = 1e-12);
    }

    #[test]
    fn test_slogdet_large_magnitude() {
        // det = 1e-200^40 underflows in direct space
        let m = DMatrix::from_diagonal_element(40, 40, 1e-200);
        let (sign, logabs, _) = slogdet_inverse(m);
        assert_eq!(sign, 1.0);
        assert_relative_eq!(logabs, 40.0 * (1e-200f64).ln(), max_relative = 1e-12);
    }

    #[test]
    fn test_singular_is_node() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let (sign, logabs, inverse) = slogdet_inverse(m);
        assert_eq!(sign, 0.0);
        assert_eq!(logabs, f64::NEG_INFINITY);
        assert_eq!(inverse, DMatrix::zeros(2, 2));
    }

    #[test]
    fn test_empty_channel() {
        let state = compute_determinants(DMatrix::zeros(0, 3), &[vec![]]);
        assert_eq!(state.signs[0], 1.0);
        assert_eq!(state.logabs[0], 0.0);
    }

    #[test]
    fn test_column_selection() {
        let mos = DMatrix::from_row_slice(2, 3, &[
            1.0, 5.0, 2.0,
            3.0, 7.0, 4.0,
        ]);
        let state = compute_determinants(mos, &[vec![0, 2], vec![2, 0]]);
        // det [[1,2],[3,4]] = -2, swapping columns flips the sign
        assert_eq!(state.signs.as_slice(), &[-1.0, 1.0]);
        assert_relative_eq!(state.logabs[0], 2f64.ln(), epsilon = 1e-14);
        assert_relative_eq!(state.logabs[1], 2f64.ln(), epsilon = 1e-14);
    }
}
