// System description read from YAML
/*
    nelec: [3, 2]
    basis:
      - center: [0.0, 0.0, 0.0]
        l: 0
        primitives:
          - { exponent: 1.2, coefficient: 1.0 }
    determinants:
      - { coeff: 0.95, up: [0, 1, 2], down: [0, 1] }
    mo_coeff_alpha:
      - [ ... one row per basis function ... ]
 */

use std::path::Path;
use nalgebra::{DMatrix, Vector3};
use serde::{Deserialize, Serialize};
use tracing::info;
use crate::determinant::{DeterminantExpansion, DeterminantParameters, DeterminantTerm};
use crate::error::{Result, SlaterError};
use crate::sampling::VmcParams;
use crate::wavefunction::{EngineSettings, GaussianBasis, GaussianPrimitive, MultiSlater};

/// One shell of contracted Gaussians on a center.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BasisShell {
    pub center: [f64; 3],
    pub l: u32,
    pub primitives: Vec<GaussianPrimitive>,
}

fn default_ci_tolerance() -> f64 {
    0.0
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SystemConfig {
    /// Electron counts [up, down]
    pub nelec: [usize; 2],
    pub basis: Vec<BasisShell>,
    pub determinants: Vec<DeterminantTerm>,
    /// Terms with |coeff| below this are dropped
    #[serde(default = "default_ci_tolerance")]
    pub ci_tolerance: f64,
    /// Rows are basis functions, columns molecular orbitals
    pub mo_coeff_alpha: Vec<Vec<f64>>,
    /// Defaults to `mo_coeff_alpha`
    #[serde(default)]
    pub mo_coeff_beta: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub vmc: VmcParams,
}

fn to_matrix(name: &str, rows: &[Vec<f64>]) -> Result<DMatrix<f64>> {
    let ncols = rows.first().map_or(0, Vec::len);
    if let Some(bad) = rows.iter().position(|row| row.len() != ncols) {
        return Err(SlaterError::Config(format!(
            "{}: row {} has {} entries, expected {}",
            name, bad, rows[bad].len(), ncols
        )));
    }
    Ok(DMatrix::from_row_iterator(rows.len(), ncols, rows.iter().flatten().copied()))
}

impl SystemConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn basis(&self) -> Result<GaussianBasis> {
        let mut basis = GaussianBasis::default();
        for shell in &self.basis {
            basis.push_shell(Vector3::from(shell.center), shell.l, &shell.primitives)?;
        }
        Ok(basis)
    }

    /// Assemble the wavefunction described by this file.
    pub fn build(&self) -> Result<MultiSlater<GaussianBasis>> {
        let basis = self.basis()?;
        let nelec = (self.nelec[0], self.nelec[1]);
        let (ci, expansion) = DeterminantExpansion::from_determinants(nelec, &self.determinants, self.ci_tolerance)?;
        let alpha = to_matrix("mo_coeff_alpha", &self.mo_coeff_alpha)?;
        let beta = match &self.mo_coeff_beta {
            Some(rows) => to_matrix("mo_coeff_beta", rows)?,
            None => alpha.clone(),
        };
        info!(
            "{} basis functions, {} CI terms ({} up / {} down determinants)",
            alpha.nrows(),
            expansion.num_terms(),
            expansion.determinants_up.len(),
            expansion.determinants_down.len()
        );
        let parameters = DeterminantParameters::new(ci, alpha, beta);
        Ok(MultiSlater::new(basis, expansion, parameters)?.with_settings(self.engine))
    }
}

pub fn read_config<P: AsRef<Path>>(filename: P) -> Result<SystemConfig> {
    let file = std::fs::File::open(filename)?;
    let reader = std::io::BufReader::new(file);
    Ok(serde_yaml::from_reader(reader)?)
}
