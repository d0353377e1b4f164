//! Variational Monte Carlo with single-electron Metropolis moves.
//!
//! Each step moves every electron once in every walker. Moves are evaluated
//! with `propose`, accepted with probability min(1, |ratio|²) and applied with
//! `commit`, so the determinant inverses are maintained incrementally.

use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Normal, StandardNormal};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use crate::error::{Result, SlaterError};
use crate::wavefunction::{DriftReport, MultiSlater, OrbitalEvaluator};

/// Parameters for the VMC run.
#[derive(Serialize, Deserialize, Copy, Clone, Debug)]
#[serde(default)]
pub struct VmcParams {
    pub n_walkers: usize,
    pub n_steps: usize,
    pub n_equilibrate: usize,
    pub initial_step_size: f64,
    pub max_step_size: f64,
    pub min_step_size: f64,
    pub target_acceptance: f64,
    pub adaptation_interval: usize,
    /// Steps between consistency checks of the maintained inverses
    pub drift_check_interval: usize,
    pub seed: u64,
}

impl Default for VmcParams {
    fn default() -> Self {
        Self {
            n_walkers: 16,
            n_steps: 1000,
            n_equilibrate: 100,
            initial_step_size: 0.5,
            max_step_size: 2.0,
            min_step_size: 0.05,
            target_acceptance: 0.5,
            adaptation_interval: 50,
            drift_check_interval: 200,
            seed: 42,
        }
    }
}

/// Results of a VMC run.
#[derive(Debug, Clone)]
pub struct VmcResults {
    pub acceptance_rate: f64,
    /// ⟨-½ Σᵢ ∇ᵢ²Ψ/Ψ⟩
    pub kinetic_energy: f64,
    pub kinetic_error: f64,
    pub mean_logabs: f64,
    pub autocorrelation_time: f64,
    pub step_size: f64,
    /// Worst drift seen by the periodic consistency checks
    pub drift: DriftReport,
}

/// VMC driver borrowing a wavefunction for the duration of the run.
pub struct VmcSimulation<'a, B: OrbitalEvaluator> {
    wavefunction: &'a mut MultiSlater<B>,
    params: VmcParams,
    rng: StdRng,
    step_size: f64,
}

impl<'a, B: OrbitalEvaluator> VmcSimulation<'a, B> {
    pub fn new(wavefunction: &'a mut MultiSlater<B>, params: VmcParams) -> Self {
        Self {
            wavefunction,
            params,
            rng: StdRng::seed_from_u64(params.seed),
            step_size: params.initial_step_size,
        }
    }

    /// Random starting configurations for all walkers.
    pub fn initial_configs(&mut self) -> Vec<Vec<Vector3<f64>>> {
        let nelec = self.wavefunction.num_electrons();
        (0..self.params.n_walkers)
            .map(|_| {
                (0..nelec)
                    .map(|_| Vector3::<f64>::from_distribution(&StandardNormal, &mut self.rng))
                    .collect()
            })
            .collect()
    }

    /// Run equilibration and production.
    pub fn run(&mut self) -> Result<VmcResults> {
        if self.params.n_walkers == 0 || self.params.n_steps == 0 {
            return Err(SlaterError::Config("VMC needs at least one walker and one step".into()));
        }
        if self.params.adaptation_interval == 0 || self.params.drift_check_interval == 0 {
            return Err(SlaterError::Config("adaptation and drift check intervals must be positive".into()));
        }
        let configs = self.initial_configs();
        self.wavefunction.recompute(&configs)?;

        info!("Starting the equilibration phase ({} steps).", self.params.n_equilibrate);
        for _ in 0..self.params.n_equilibrate {
            self.sweep()?;
        }

        info!("Starting the sampling phase ({} steps).", self.params.n_steps);
        let mut kinetic = Vec::with_capacity(self.params.n_steps);
        let mut logabs = Vec::with_capacity(self.params.n_steps);
        let mut acceptance_count = 0;
        let mut total_accepted = 0;
        let mut drift = DriftReport::default();

        for step in 0..self.params.n_steps {
            let accepted = self.sweep()?;
            acceptance_count += accepted;
            total_accepted += accepted;

            kinetic.push(self.kinetic_energy()?);
            let values = self.wavefunction.values();
            logabs.push(values.iter().map(|(_, l)| l).sum::<f64>() / values.len() as f64);

            if (step + 1) % self.params.adaptation_interval == 0 {
                self.adapt_step_size(acceptance_count);
                acceptance_count = 0;
            }

            if (step + 1) % self.params.drift_check_interval == 0 {
                let report = self.wavefunction.check_drift()?;
                drift.max_inverse_error = drift.max_inverse_error.max(report.max_inverse_error);
                drift.max_logabs_error = drift.max_logabs_error.max(report.max_logabs_error);
                drift.exceeded |= report.exceeded;
                if report.exceeded {
                    self.wavefunction.refresh()?;
                }
                debug!("step {}: step size {:.3}, inverse drift {:.2e}", step + 1, self.step_size, report.max_inverse_error);
            }
        }

        let moves = self.params.n_steps * self.params.n_walkers * self.wavefunction.num_electrons();
        let autocorrelation_time = autocorrelation_time(&kinetic);
        let block = ((2.0 * autocorrelation_time).ceil() as usize).max(1);
        let (kinetic_energy, kinetic_error) = block_average(&kinetic, block);
        let results = VmcResults {
            acceptance_rate: total_accepted as f64 / moves as f64,
            kinetic_energy,
            kinetic_error,
            mean_logabs: logabs.iter().sum::<f64>() / logabs.len() as f64,
            autocorrelation_time,
            step_size: self.step_size,
            drift,
        };
        info!("Final kinetic energy: {:.6} ± {:.6}", results.kinetic_energy, results.kinetic_error);
        Ok(results)
    }

    /// Move every electron once in every walker. Returns the number of accepted moves.
    fn sweep(&mut self) -> Result<usize> {
        let normal = Normal::new(0.0, self.step_size)
            .map_err(|err| SlaterError::Config(format!("step size {}: {}", self.step_size, err)))?;
        let mut accepted = 0;
        for e in 0..self.wavefunction.num_electrons() {
            let current = self.wavefunction.electron_positions(e)?;
            let proposed: Vec<Vector3<f64>> = current.iter()
                .map(|pos| pos + Vector3::<f64>::from_distribution(&normal, &mut self.rng))
                .collect();
            let proposals = self.wavefunction.propose(e, &proposed)?;
            let accept: Vec<bool> = proposals.iter()
                .map(|p| self.rng.gen::<f64>() < p.ratio * p.ratio)
                .collect();
            accepted += accept.iter().filter(|&&a| a).count();
            self.wavefunction.commit(e, &proposals, &accept)?;
        }
        Ok(accepted)
    }

    /// -½ Σᵢ ∇ᵢ²Ψ/Ψ of every walker.
    fn kinetic_energy(&self) -> Result<Vec<f64>> {
        let nwalkers = self.params.n_walkers;
        let mut total = vec![0.0; nwalkers];
        for e in 0..self.wavefunction.num_electrons() {
            let positions = self.wavefunction.electron_positions(e)?;
            let lap = self.wavefunction.laplacian(e, &positions)?;
            for (t, l) in total.iter_mut().zip(lap) {
                *t += -0.5 * l;
            }
        }
        Ok(total)
    }

    /// Adapt the step size to achieve target acceptance rate.
    fn adapt_step_size(&mut self, acceptance_count: usize) {
        let total_moves = self.params.n_walkers * self.params.adaptation_interval * self.wavefunction.num_electrons();
        let acceptance_rate = acceptance_count as f64 / total_moves as f64;
        let adjustment = (acceptance_rate / self.params.target_acceptance).sqrt();
        self.step_size = (self.step_size * adjustment)
            .clamp(self.params.min_step_size, self.params.max_step_size);
    }
}

/// Integrated autocorrelation time of one series, τ = 1 + 2 Σₜ ρ(t).
///
/// The sum is cut at the first lag M with M ≥ 5τ(M) (Sokal's window).
/// Clamped to at least 1.
pub fn integrated_autocorrelation(series: &[f64]) -> f64 {
    let n = series.len();
    if n < 2 {
        return 1.0;
    }
    let mean = series.iter().sum::<f64>() / n as f64;
    let var = series.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n as f64;
    if var == 0.0 {
        return 1.0;
    }

    let mut tau = 1.0;
    for t in 1..n {
        let rho = series[..n - t].iter()
            .zip(series[t..].iter())
            .map(|(&x, &y)| (x - mean) * (y - mean))
            .sum::<f64>() / (n as f64 * var);
        tau += 2.0 * rho;
        if t as f64 >= 5.0 * tau {
            break;
        }
    }
    tau.max(1.0)
}

/// Autocorrelation time of (steps × walkers) samples, averaged over the walkers.
pub fn autocorrelation_time(samples: &[Vec<f64>]) -> f64 {
    let nwalkers = samples.first().map_or(0, Vec::len);
    if nwalkers == 0 {
        return 1.0;
    }
    (0..nwalkers)
        .map(|w| {
            let series: Vec<f64> = samples.iter().map(|step| step[w]).collect();
            integrated_autocorrelation(&series)
        })
        .sum::<f64>() / nwalkers as f64
}

/// Mean and standard error of (steps × walkers) samples.
///
/// Each walker's series is cut into blocks of `block` steps; walkers are
/// independent and blocks longer than the autocorrelation time nearly so,
/// so the error comes from the spread of the per-walker block means.
/// Trailing steps that do not fill a block only enter the mean.
pub fn block_average(samples: &[Vec<f64>], block: usize) -> (f64, f64) {
    let count: usize = samples.iter().map(Vec::len).sum();
    if count == 0 {
        return (f64::NAN, 0.0);
    }
    let mean = samples.iter().flatten().sum::<f64>() / count as f64;

    let block = block.max(1);
    let nwalkers = samples[0].len();
    let block_means: Vec<f64> = samples
        .chunks_exact(block)
        .flat_map(|steps| {
            (0..nwalkers).map(move |w| steps.iter().map(|step| step[w]).sum::<f64>() / block as f64)
        })
        .collect();
    let n = block_means.len();
    if n < 2 {
        return (mean, 0.0);
    }
    let block_mean = block_means.iter().sum::<f64>() / n as f64;
    let variance = block_means.iter()
        .map(|&x| (x - block_mean).powi(2))
        .sum::<f64>() / (n - 1) as f64;
    (mean, (variance / n as f64).sqrt())
}
