//! Multi-determinant Slater wavefunction over a batch of walkers.
//!
//! `MultiSlater` owns the orbital basis, the expansion, the parameters and an
//! arena of walker states, one per configuration. Walkers are independent, so
//! every batch operation runs over them with rayon. Within one walker the
//! sampler must call `propose`, decide, then `commit` exactly once per move.

use nalgebra::{DMatrix, DVector, Vector3};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use crate::determinant::{
    combine_states, config_gradient, evaluate_batch, evaluate_expansion, evaluate_from_aos, inverse_deviation, testvalue,
    update_spin_state, ConfigGradient, DeterminantExpansion, DeterminantParameters, Evaluation,
    ParameterGradient, Spin, SpinState, TestValues,
};
use crate::error::{check_len, Result, SlaterError};
use super::traits::{MultiWfn, OptimizableWfn, OrbitalEvaluator};

/// Knobs for incremental updates.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct EngineSettings {
    /// Accepted moves of one electron after which a walker is recomputed from scratch
    pub recompute_interval: usize,
    /// Relative deviation above which `check_drift` reports a problem
    pub drift_tolerance: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            recompute_interval: 100,
            drift_tolerance: 1e-6,
        }
    }
}

/// Cached state of one configuration.
#[derive(Debug, Clone)]
pub struct WalkerState {
    pub positions: Vec<Vector3<f64>>,
    pub up: SpinState,
    pub down: SpinState,
    pub sign: f64,
    pub logabs: f64,
    /// Accepted commits since `recompute` created this walker
    stamp: u64,
    accepted: Vec<usize>,
}

impl WalkerState {
    fn from_evaluation(positions: Vec<Vector3<f64>>, evaluation: Evaluation) -> Self {
        let nelec = positions.len();
        Self {
            positions,
            up: evaluation.up,
            down: evaluation.down,
            sign: evaluation.sign,
            logabs: evaluation.logabs,
            stamp: 0,
            accepted: vec![0; nelec],
        }
    }

    fn spin(&self, spin: Spin) -> (&SpinState, &SpinState) {
        match spin {
            Spin::Up => (&self.up, &self.down),
            Spin::Down => (&self.down, &self.up),
        }
    }

    pub fn stamp(&self) -> u64 {
        self.stamp
    }
}

/// Result of `propose` for one walker; consumed by `commit`.
#[derive(Debug, Clone)]
pub struct Proposal {
    /// Ψ(new) / Ψ(old), ±∞ when the walker leaves a node
    pub ratio: f64,
    /// Ratio of each determinant of the moving electron's spin
    pub det_ratios: DVector<f64>,
    /// Molecular orbitals at the new position
    pub mo_row: DVector<f64>,
    pub position: Vector3<f64>,
    electron: usize,
    stamp: u64,
}

impl Proposal {
    /// Smallest |ratio| over the determinants of the moving spin.
    pub fn min_det_ratio(&self) -> f64 {
        self.det_ratios.iter().fold(f64::INFINITY, |m, r| m.min(r.abs()))
    }
}

/// Outcome of comparing maintained walker states with a fresh evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriftReport {
    pub max_inverse_error: f64,
    pub max_logabs_error: f64,
    pub exceeded: bool,
}

/// Multi-determinant Slater wavefunction with a walker arena.
pub struct MultiSlater<B: OrbitalEvaluator> {
    basis: B,
    expansion: DeterminantExpansion,
    parameters: DeterminantParameters,
    pub settings: EngineSettings,
    walkers: Vec<WalkerState>,
}

impl<B: OrbitalEvaluator> MultiSlater<B> {
    pub fn new(basis: B, expansion: DeterminantExpansion, parameters: DeterminantParameters) -> Result<Self> {
        check_len("basis functions", basis.num_basis(), parameters.mo_coeff_alpha.nrows())?;
        expansion.validate_parameters(&parameters)?;
        Ok(Self {
            basis,
            expansion,
            parameters,
            settings: EngineSettings::default(),
            walkers: Vec::new(),
        })
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn basis(&self) -> &B {
        &self.basis
    }

    pub fn expansion(&self) -> &DeterminantExpansion {
        &self.expansion
    }

    pub fn parameters(&self) -> &DeterminantParameters {
        &self.parameters
    }

    pub fn num_electrons(&self) -> usize {
        self.expansion.num_electrons()
    }

    pub fn walkers(&self) -> &[WalkerState] {
        &self.walkers
    }

    /// Current (sign, ln|Ψ|) of every walker.
    pub fn values(&self) -> Vec<(f64, f64)> {
        self.walkers.iter().map(|w| (w.sign, w.logabs)).collect()
    }

    /// Current position of electron `e` in every walker.
    pub fn electron_positions(&self, e: usize) -> Result<Vec<Vector3<f64>>> {
        self.expansion.locate(e)?;
        Ok(self.walkers.iter().map(|w| w.positions[e]).collect())
    }

    /// Replace the parameters wholesale. All walker state is discarded.
    pub fn replace_parameters(&mut self, parameters: DeterminantParameters) -> Result<()> {
        check_len("basis functions", self.basis.num_basis(), parameters.mo_coeff_alpha.nrows())?;
        self.expansion.validate_parameters(&parameters)?;
        self.parameters = parameters;
        if !self.walkers.is_empty() {
            info!("parameters replaced, invalidating {} walkers", self.walkers.len());
        }
        self.walkers.clear();
        Ok(())
    }

    /// Full evaluation of every configuration. Resets the walker arena.
    pub fn recompute(&mut self, configs: &[Vec<Vector3<f64>>]) -> Result<Vec<(f64, f64)>> {
        let evaluations = evaluate_batch(&self.basis, &self.expansion, &self.parameters, configs)?;
        let walkers: Vec<WalkerState> = configs.iter()
            .cloned()
            .zip(evaluations)
            .map(|(positions, evaluation)| WalkerState::from_evaluation(positions, evaluation))
            .collect();
        debug!("recomputed {} walkers", walkers.len());
        self.walkers = walkers;
        Ok(self.values())
    }

    /// Full evaluation of every walker at its current positions.
    pub fn refresh(&mut self) -> Result<()> {
        let configs: Vec<Vec<Vector3<f64>>> = self.walkers.iter().map(|w| w.positions.clone()).collect();
        self.recompute(&configs)?;
        Ok(())
    }

    fn check_batch(&self, what: &'static str, found: usize) -> Result<()> {
        if self.walkers.is_empty() {
            return Err(SlaterError::StaleState);
        }
        check_len(what, self.walkers.len(), found)
    }

    /// Ψ with electron `e` substituted by each row of `ao_rows`, alongside
    /// the walker's current Ψ.
    fn test_rows(&self, walker: &WalkerState, spin: Spin, e: usize, ao_rows: &DMatrix<f64>) -> (TestValues, DMatrix<f64>) {
        let mo_rows = ao_rows * self.parameters.mo_coeff(spin);
        let (moving, other) = walker.spin(spin);
        let test = testvalue(&self.expansion, &self.parameters.ci_coeff, spin, moving, other, e, &mo_rows);
        (test, mo_rows)
    }

    /// Value row stacked on top of `derivative_rows`.
    fn stacked_rows(&self, position: &Vector3<f64>, derivative_rows: Option<DMatrix<f64>>) -> DMatrix<f64> {
        let value = self.basis.evaluate(std::slice::from_ref(position));
        match derivative_rows {
            None => value,
            Some(rows) => {
                let nb = value.ncols();
                let mut stacked = DMatrix::zeros(1 + rows.nrows(), nb);
                stacked.rows_mut(0, 1).copy_from(&value);
                stacked.rows_mut(1, rows.nrows()).copy_from(&rows);
                stacked
            }
        }
    }

    fn make_proposal(walker: &WalkerState, e: usize, position: Vector3<f64>, test: &TestValues, mo_rows: &DMatrix<f64>) -> Proposal {
        Proposal {
            ratio: test.ratio(0),
            det_ratios: test.det_ratios.row(0).transpose(),
            mo_row: mo_rows.row(0).transpose(),
            position,
            electron: e,
            stamp: walker.stamp,
        }
    }

    /// Ratio Ψ(new)/Ψ(old) for moving electron `e` of every walker to `positions`.
    ///
    /// Pure: walker state is untouched until `commit`.
    pub fn propose(&self, e: usize, positions: &[Vector3<f64>]) -> Result<Vec<Proposal>> {
        let (spin, local) = self.expansion.locate(e)?;
        self.check_batch("proposed positions", positions.len())?;
        Ok(self.walkers
            .par_iter()
            .zip(positions.par_iter())
            .map(|(walker, position)| {
                let rows = self.stacked_rows(position, None);
                let (test, mo_rows) = self.test_rows(walker, spin, local, &rows);
                Self::make_proposal(walker, e, *position, &test, &mo_rows)
            })
            .collect())
    }

    /// Ratios Ψ(new)/Ψ(old) for several candidate positions of electron `e` per walker.
    ///
    /// `positions[i]` lists the candidates of walker `i`; all of them share one
    /// orbital evaluation and one reference. An empty list skips the walker.
    /// Pure, like `propose`.
    pub fn testvalue_many(&self, e: usize, positions: &[Vec<Vector3<f64>>]) -> Result<Vec<DVector<f64>>> {
        let (spin, local) = self.expansion.locate(e)?;
        self.check_batch("candidate position lists", positions.len())?;
        Ok(self.walkers
            .par_iter()
            .zip(positions.par_iter())
            .map(|(walker, candidates)| {
                let rows = self.basis.evaluate(candidates);
                let (test, _) = self.test_rows(walker, spin, local, &rows);
                DVector::from_fn(candidates.len(), |k, _| test.ratio(k))
            })
            .collect())
    }

    /// Apply accepted proposals. Walkers with `accept[i] == false` keep their state.
    ///
    /// Every proposal is validated before any walker is touched, so a stale
    /// proposal leaves the whole batch unchanged.
    pub fn commit(&mut self, e: usize, proposals: &[Proposal], accept: &[bool]) -> Result<()> {
        let (spin, local) = self.expansion.locate(e)?;
        self.check_batch("proposals", proposals.len())?;
        check_len("acceptance mask", self.walkers.len(), accept.len())?;
        for (i, (walker, proposal)) in self.walkers.iter().zip(proposals).enumerate() {
            if proposal.electron != e || proposal.stamp != walker.stamp {
                return Err(SlaterError::StaleProposal {
                    walker: i,
                    electron: proposal.electron,
                    stamp: proposal.stamp,
                    current: walker.stamp,
                });
            }
        }

        let (basis, expansion, parameters) = (&self.basis, &self.expansion, &self.parameters);
        let interval = self.settings.recompute_interval;
        let determinants = expansion.determinants(spin);
        let refreshed: usize = self.walkers
            .par_iter_mut()
            .zip(proposals.par_iter())
            .zip(accept.par_iter())
            .filter(|item| *item.1)
            .map(|((walker, proposal), _)| {
                walker.positions[e] = proposal.position;
                walker.stamp += 1;
                walker.accepted[e] += 1;

                let updated = if walker.accepted[e] >= interval {
                    None
                } else {
                    let (moving, _) = walker.spin(spin);
                    update_spin_state(moving, local, &proposal.mo_row, determinants)
                };
                match updated {
                    Some(state) => {
                        match spin {
                            Spin::Up => walker.up = state,
                            Spin::Down => walker.down = state,
                        }
                        let (sign, logabs) = combine_states(expansion, parameters, &walker.up, &walker.down);
                        walker.sign = sign;
                        walker.logabs = logabs;
                        0
                    }
                    None => {
                        let aos = basis.evaluate(&walker.positions);
                        let evaluation = evaluate_from_aos(&aos, expansion, parameters);
                        let stamp = walker.stamp;
                        *walker = WalkerState::from_evaluation(std::mem::take(&mut walker.positions), evaluation);
                        walker.stamp = stamp;
                        1
                    }
                }
            })
            .sum();
        if refreshed > 0 {
            debug!("electron {}: {} walkers recomputed from scratch", e, refreshed);
        }
        Ok(())
    }

    /// ∇ₑ ln|Ψ| with electron `e` of every walker placed at `positions`.
    pub fn gradient(&self, e: usize, positions: &[Vector3<f64>]) -> Result<Vec<Vector3<f64>>> {
        Ok(self.gradient_value(e, positions)?.0)
    }

    /// Gradient, value ratio and proposal at `positions` in one pass.
    pub fn gradient_value(&self, e: usize, positions: &[Vector3<f64>]) -> Result<(Vec<Vector3<f64>>, Vec<f64>, Vec<Proposal>)> {
        let (spin, local) = self.expansion.locate(e)?;
        self.check_batch("positions", positions.len())?;
        let results: Vec<(Vector3<f64>, Proposal)> = self.walkers
            .par_iter()
            .zip(positions.par_iter())
            .map(|(walker, position)| {
                let rows = self.stacked_rows(position, Some(self.basis.evaluate_gradient(position)));
                let (test, mo_rows) = self.test_rows(walker, spin, local, &rows);
                let grad = Vector3::new(test.relative(1), test.relative(2), test.relative(3));
                (grad, Self::make_proposal(walker, e, *position, &test, &mo_rows))
            })
            .collect();
        let ratios: Vec<f64> = results.iter().map(|(_, p)| p.ratio).collect();
        let (grads, proposals) = results.into_iter().unzip();
        Ok((grads, ratios, proposals))
    }

    /// ∇ₑ²Ψ / Ψ with electron `e` of every walker placed at `positions`.
    pub fn laplacian(&self, e: usize, positions: &[Vector3<f64>]) -> Result<Vec<f64>> {
        Ok(self.gradient_laplacian(e, positions)?.1)
    }

    /// ∇ₑ ln|Ψ| and ∇ₑ²Ψ / Ψ in one pass.
    pub fn gradient_laplacian(&self, e: usize, positions: &[Vector3<f64>]) -> Result<(Vec<Vector3<f64>>, Vec<f64>)> {
        let (spin, local) = self.expansion.locate(e)?;
        self.check_batch("positions", positions.len())?;
        Ok(self.walkers
            .par_iter()
            .zip(positions.par_iter())
            .map(|(walker, position)| {
                let derivs = self.basis.evaluate_gradient(position);
                let hessian = self.basis.evaluate_hessian(position);
                let mut rows = DMatrix::zeros(12, derivs.ncols());
                rows.rows_mut(0, 3).copy_from(&derivs);
                rows.rows_mut(3, 9).copy_from(&hessian);
                let rows = self.stacked_rows(position, Some(rows));
                let (test, _) = self.test_rows(walker, spin, local, &rows);
                let grad = Vector3::new(test.relative(1), test.relative(2), test.relative(3));
                // Hessian rows start at 4; diagonal entries are 3i + i
                let lap = (0..3).map(|i| test.relative(4 + 4 * i)).sum::<f64>();
                (grad, lap)
            })
            .unzip())
    }

    /// ∂ ln|Ψ| / ∂p for each configuration. Does not touch the walker arena.
    pub fn parameter_gradient(&self, configs: &[Vec<Vector3<f64>>]) -> Result<ParameterGradient> {
        let configs = configs
            .par_iter()
            .map(|positions| self.config_gradient(positions))
            .collect::<Result<Vec<_>>>()?;
        Ok(ParameterGradient { configs })
    }

    fn config_gradient(&self, positions: &[Vector3<f64>]) -> Result<ConfigGradient> {
        check_len("configuration electrons", self.num_electrons(), positions.len())?;
        let aos = self.basis.evaluate(positions);
        let evaluation = evaluate_from_aos(&aos, &self.expansion, &self.parameters);
        Ok(config_gradient(&aos, &self.expansion, &self.parameters, &evaluation))
    }

    /// Compare maintained inverses and log-values with a fresh evaluation.
    ///
    /// Exceeding `settings.drift_tolerance` is logged as a warning; recovery is
    /// `refresh`.
    pub fn check_drift(&self) -> Result<DriftReport> {
        if self.walkers.is_empty() {
            return Err(SlaterError::StaleState);
        }
        let (basis, expansion, parameters) = (&self.basis, &self.expansion, &self.parameters);
        let mut report = self.walkers
            .par_iter()
            .map(|walker| {
                let fresh = evaluate_expansion(basis, expansion, parameters, &walker.positions)?;
                let inverse_error = inverse_deviation(&walker.up, &fresh.up)
                    .max(inverse_deviation(&walker.down, &fresh.down));
                let logabs_error = if fresh.logabs.is_finite() {
                    (walker.logabs - fresh.logabs).abs() / fresh.logabs.abs().max(1.0)
                } else {
                    0.0
                };
                Ok((inverse_error, logabs_error))
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .fold(DriftReport::default(), |r, (inv, log)| DriftReport {
                max_inverse_error: r.max_inverse_error.max(inv),
                max_logabs_error: r.max_logabs_error.max(log),
                exceeded: false,
            });
        let tolerance = self.settings.drift_tolerance;
        report.exceeded = report.max_inverse_error > tolerance || report.max_logabs_error > tolerance;
        if report.exceeded {
            warn!(
                "inverse drift {:.2e} / log drift {:.2e} exceeds tolerance {:e}; walkers need a full recompute",
                report.max_inverse_error, report.max_logabs_error, tolerance
            );
        }
        Ok(report)
    }

    /// Single-configuration evaluation for the `MultiWfn` view.
    ///
    /// The trait methods are infallible, so callers must pass exactly
    /// `num_electrons()` positions; the batch API checks this and returns
    /// `ShapeMismatch` instead.
    fn evaluate_config(&self, r: &[Vector3<f64>]) -> Evaluation {
        debug_assert_eq!(r.len(), self.num_electrons(), "configuration has the wrong electron count");
        let aos = self.basis.evaluate(r);
        evaluate_from_aos(&aos, &self.expansion, &self.parameters)
    }

    /// Ratios for every electron of one configuration, substituting at its own position.
    fn per_electron_ratios<F>(&self, r: &[Vector3<f64>], rows_for: F) -> Vec<TestValues>
    where
        F: Fn(&Vector3<f64>) -> DMatrix<f64>,
    {
        let evaluation = self.evaluate_config(r);
        let walker = WalkerState::from_evaluation(r.to_vec(), evaluation);
        let nup = self.expansion.nelec.0;
        (0..r.len())
            .map(|e| {
                let (spin, local) = if e < nup { (Spin::Up, e) } else { (Spin::Down, e - nup) };
                let rows = self.stacked_rows(&r[e], Some(rows_for(&r[e])));
                self.test_rows(&walker, spin, local, &rows).0
            })
            .collect()
    }
}

impl<B: OrbitalEvaluator> MultiWfn for MultiSlater<B> {
    fn initialize(&self) -> Vec<Vector3<f64>> {
        let mut rng = rand::thread_rng();
        (0..self.num_electrons())
            .map(|_| Vector3::<f64>::from_distribution(&StandardNormal, &mut rng))
            .collect()
    }

    fn sign_logabs(&self, r: &[Vector3<f64>]) -> (f64, f64) {
        let evaluation = self.evaluate_config(r);
        (evaluation.sign, evaluation.logabs)
    }

    fn grad_log(&self, r: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        self.per_electron_ratios(r, |p| self.basis.evaluate_gradient(p))
            .into_iter()
            .map(|test| Vector3::new(test.relative(1), test.relative(2), test.relative(3)))
            .collect()
    }

    fn laplacian(&self, r: &[Vector3<f64>]) -> Vec<f64> {
        self.per_electron_ratios(r, |p| self.basis.evaluate_hessian(p))
            .into_iter()
            .map(|test| (0..3).map(|i| test.relative(1 + 4 * i)).sum::<f64>())
            .collect()
    }
}

impl<B: OrbitalEvaluator> OptimizableWfn for MultiSlater<B> {
    fn num_params(&self) -> usize {
        self.parameters.num_params()
    }

    fn get_params(&self) -> Vec<f64> {
        self.parameters.to_vec()
    }

    fn set_params(&mut self, params: &[f64]) -> Result<()> {
        let replaced = self.parameters.with_values(params)?;
        self.replace_parameters(replaced)
    }

    fn log_derivatives(&self, r: &[Vector3<f64>]) -> Result<Vec<f64>> {
        Ok(self.config_gradient(r)?.to_vec())
    }
}
