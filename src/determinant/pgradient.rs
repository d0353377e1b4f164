//! Closed-form derivatives of ln|Ψ| with respect to the parameters.
//!
//! With wₜ = cₜ sₜ exp(Lₜ - ref) / Σ cₜ sₜ exp(Lₜ - ref):
//!
//! - ∂ ln|Ψ| / ∂cₜ = wₜ / cₜ, computed without the division as sₜ exp(Lₜ - ref) / S
//! - ∂ ln|Ψ| / ∂C[μ, o] = Σ_d W_d Σ_{a: det_d[a] = o} Σᵢ aos[i, μ] A_d⁻¹[a, i]
//!
//! where W_d sums wₜ over the terms using determinant d, and the last factor
//! is the closed form ∂ ln|det A| / ∂A = (A⁻¹)ᵀ chained through A = aos · C.
//!
//! A determinant on a node has no inverse but still has a derivative,
//! ∂ det A / ∂A = adj(A)ᵀ. Its terms vanish from Ψ, so it enters only through
//! the adjugate, weighted by cₜ times the opposite-spin determinant of each term.
//! The adjugate comes from the SVD A = U Σ Vᵀ:
//!
//!   adj(A) = det(U) det(V) V diag(Π_{j≠i} σⱼ) Uᵀ
//!
//! kept as exp(scale) · M so that the products of singular values stay finite.

use std::collections::BTreeMap;
use nalgebra::{DMatrix, DVector};
use super::combine::{reference, sign_of, term_values, weighted_sum};
use super::evaluate::{Evaluation, SpinState};
use super::expansion::{DeterminantExpansion, Spin};
use super::parameters::{DeterminantParameters, PARAMETER_NAMES};

/// ∂ ln|Ψ| / ∂p for one configuration, shaped like the parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigGradient {
    pub det_coeff: DVector<f64>,
    pub mo_coeff_alpha: DMatrix<f64>,
    pub mo_coeff_beta: DMatrix<f64>,
}

impl ConfigGradient {
    /// Flattened in the order of `DeterminantParameters::to_vec`.
    pub fn to_vec(&self) -> Vec<f64> {
        self.det_coeff.iter()
            .chain(self.mo_coeff_alpha.iter())
            .chain(self.mo_coeff_beta.iter())
            .copied()
            .collect()
    }
}

/// Parameter gradients for a batch of configurations.
#[derive(Debug, Clone, Default)]
pub struct ParameterGradient {
    pub configs: Vec<ConfigGradient>,
}

impl ParameterGradient {
    /// Gradient arrays keyed by parameter name. CI gradients are stored as
    /// (terms × 1) matrices.
    pub fn by_name(&self) -> BTreeMap<&'static str, Vec<DMatrix<f64>>> {
        let mut map = BTreeMap::new();
        map.insert(
            PARAMETER_NAMES[0],
            self.configs.iter()
                .map(|g| DMatrix::from_column_slice(g.det_coeff.len(), 1, g.det_coeff.as_slice()))
                .collect(),
        );
        map.insert(PARAMETER_NAMES[1], self.configs.iter().map(|g| g.mo_coeff_alpha.clone()).collect());
        map.insert(PARAMETER_NAMES[2], self.configs.iter().map(|g| g.mo_coeff_beta.clone()).collect());
        map
    }

    pub fn flattened(&self) -> Vec<Vec<f64>> {
        self.configs.iter().map(ConfigGradient::to_vec).collect()
    }
}

/// Adjugate of a square matrix as (ln scale, M) with adj(m) = exp(scale) · M.
///
/// Returns `None` when the rank is below n - 1, where the adjugate vanishes.
pub(crate) fn scaled_adjugate(m: DMatrix<f64>) -> Option<(f64, DMatrix<f64>)> {
    let n = m.nrows();
    if n == 0 {
        return None;
    }
    if n == 1 {
        return Some((0.0, DMatrix::from_element(1, 1, 1.0)));
    }
    let svd = m.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let logs: Vec<f64> = svd.singular_values.iter().map(|s| s.ln()).collect();
    let cofactor_logs: Vec<f64> = (0..n)
        .map(|i| logs.iter().enumerate().filter(|&(j, _)| j != i).map(|(_, l)| l).sum())
        .collect();
    let scale = cofactor_logs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !scale.is_finite() {
        return None;
    }
    let sign = sign_of(u.determinant()) * sign_of(v_t.determinant());
    let diag = DVector::from_iterator(n, cofactor_logs.iter().map(|l| (l - scale).exp()));
    let adjugate = v_t.transpose() * DMatrix::from_diagonal(&diag) * u.transpose() * sign;
    Some((scale, adjugate))
}

/// Σ_d W_d · scatter(aosᵀ M_dᵀ), where M_d is A_d⁻¹ or a scaled adjugate.
fn scatter(grad: &mut DMatrix<f64>, aos: &DMatrix<f64>, det: &[usize], weight: f64, m: &DMatrix<f64>) {
    let local = aos.transpose() * m.transpose();
    for (a, &orb) in det.iter().enumerate() {
        let mut column = grad.column_mut(orb);
        column.axpy(weight, &local.column(a), 1.0);
    }
}

/// Orbital-coefficient gradient of one spin.
///
/// `weights` apply to determinants with an inverse; `node_weights` are the
/// weights of determinants on a node, before the adjugate scale.
fn orbital_gradient(
    aos: &DMatrix<f64>,
    state: &SpinState,
    determinants: &[Vec<usize>],
    weights: &DVector<f64>,
    node_weights: &DVector<f64>,
    norb: usize,
) -> DMatrix<f64> {
    let mut grad = DMatrix::zeros(aos.ncols(), norb);
    for (d, det) in determinants.iter().enumerate() {
        if det.is_empty() {
            continue;
        }
        if state.signs[d] != 0.0 {
            if weights[d] != 0.0 {
                scatter(&mut grad, aos, det, weights[d], &state.inverses[d]);
            }
        } else if node_weights[d] != 0.0 {
            if let Some((scale, adjugate)) = scaled_adjugate(state.mo_values.select_columns(det.iter())) {
                scatter(&mut grad, aos, det, node_weights[d] * scale.exp(), &adjugate);
            }
        }
    }
    grad
}

/// Parameter gradient of one configuration from its atomic orbitals and evaluation.
pub fn config_gradient(
    aos: &DMatrix<f64>,
    expansion: &DeterminantExpansion,
    params: &DeterminantParameters,
    evaluation: &Evaluation,
) -> ConfigGradient {
    let (up, down) = (&evaluation.up, &evaluation.down);
    let (signs, logs) = term_values(expansion, &up.signs, &up.logabs, &down.signs, &down.logabs);
    let ci = &params.ci_coeff;
    let shift = reference(&logs);
    let total = weighted_sum(ci, &signs, &logs, shift);

    let scaled = DVector::from_fn(expansion.num_terms(), |t, _| {
        if signs[t] == 0.0 {
            0.0
        } else {
            signs[t] * (logs[t] - shift).exp() / total
        }
    });

    let mut weights_up = DVector::zeros(up.num_determinants());
    let mut weights_down = DVector::zeros(down.num_determinants());
    let mut node_up = DVector::zeros(up.num_determinants());
    let mut node_down = DVector::zeros(down.num_determinants());
    for t in 0..expansion.num_terms() {
        let (du, dd) = (expansion.mapping_up[t], expansion.mapping_down[t]);
        let w = ci[t] * scaled[t];
        weights_up[du] += w;
        weights_down[dd] += w;
        // exp(scale) of the adjugate is applied in orbital_gradient
        if up.signs[du] == 0.0 && down.signs[dd] != 0.0 {
            node_up[du] += ci[t] * down.signs[dd] * (down.logabs[dd] - shift).exp() / total;
        }
        if down.signs[dd] == 0.0 && up.signs[du] != 0.0 {
            node_down[dd] += ci[t] * up.signs[du] * (up.logabs[du] - shift).exp() / total;
        }
    }

    let (nup, ndown) = expansion.nelec;
    let aos_up = aos.rows(0, nup).into_owned();
    let aos_down = aos.rows(nup, ndown).into_owned();
    ConfigGradient {
        det_coeff: scaled,
        mo_coeff_alpha: orbital_gradient(
            &aos_up,
            up,
            expansion.determinants(Spin::Up),
            &weights_up,
            &node_up,
            params.mo_coeff_alpha.ncols(),
        ),
        mo_coeff_beta: orbital_gradient(
            &aos_down,
            down,
            expansion.determinants(Spin::Down),
            &weights_down,
            &node_down,
            params.mo_coeff_beta.ncols(),
        ),
    }
}
