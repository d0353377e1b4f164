//! Variational parameters of the determinant expansion.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use crate::error::{check_len, Result};
use super::expansion::Spin;

/// Names under which parameter gradients are reported.
pub const PARAMETER_NAMES: [&str; 3] = ["det_coeff", "mo_coeff_alpha", "mo_coeff_beta"];

/// CI coefficients and per-spin orbital coefficients.
///
/// Orbital matrices have shape (basis functions × molecular orbitals); the
/// molecular orbitals at a set of positions are `aos · mo_coeff`.
///
/// The engine never mutates these; changing parameters means building a new
/// value and handing it to `MultiSlater::replace_parameters`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeterminantParameters {
    pub ci_coeff: DVector<f64>,
    pub mo_coeff_alpha: DMatrix<f64>,
    pub mo_coeff_beta: DMatrix<f64>,
}

impl DeterminantParameters {
    pub fn new(ci_coeff: DVector<f64>, mo_coeff_alpha: DMatrix<f64>, mo_coeff_beta: DMatrix<f64>) -> Self {
        Self { ci_coeff, mo_coeff_alpha, mo_coeff_beta }
    }

    /// Same orbitals for both spins.
    pub fn restricted(ci_coeff: DVector<f64>, mo_coeff: DMatrix<f64>) -> Self {
        Self { ci_coeff, mo_coeff_beta: mo_coeff.clone(), mo_coeff_alpha: mo_coeff }
    }

    pub fn mo_coeff(&self, spin: Spin) -> &DMatrix<f64> {
        match spin {
            Spin::Up => &self.mo_coeff_alpha,
            Spin::Down => &self.mo_coeff_beta,
        }
    }

    pub fn num_params(&self) -> usize {
        self.ci_coeff.len() + self.mo_coeff_alpha.len() + self.mo_coeff_beta.len()
    }

    /// Flat view: CI coefficients, then alpha and beta orbital matrices in
    /// column-major order.
    pub fn to_vec(&self) -> Vec<f64> {
        self.ci_coeff.iter()
            .chain(self.mo_coeff_alpha.iter())
            .chain(self.mo_coeff_beta.iter())
            .copied()
            .collect()
    }

    /// A copy with every parameter replaced from a flat vector laid out as in [`to_vec`](Self::to_vec).
    pub fn with_values(&self, values: &[f64]) -> Result<Self> {
        check_len("flat parameter vector", self.num_params(), values.len())?;
        let nci = self.ci_coeff.len();
        let na = self.mo_coeff_alpha.len();
        let (ci, rest) = values.split_at(nci);
        let (alpha, beta) = rest.split_at(na);
        Ok(Self {
            ci_coeff: DVector::from_column_slice(ci),
            mo_coeff_alpha: DMatrix::from_column_slice(
                self.mo_coeff_alpha.nrows(),
                self.mo_coeff_alpha.ncols(),
                alpha,
            ),
            mo_coeff_beta: DMatrix::from_column_slice(
                self.mo_coeff_beta.nrows(),
                self.mo_coeff_beta.ncols(),
                beta,
            ),
        })
    }
}
