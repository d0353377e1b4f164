//! Error type for the determinant engine.
//!
//! Numerical singularities (wavefunction nodes) are never errors; they flow
//! through the results as sign 0 and log-magnitude −∞. Everything here is a
//! structural problem that stops the call.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlaterError {
    #[error("shape mismatch in {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("electron index {index} out of range for {nelec} electrons")]
    ElectronIndex { index: usize, nelec: usize },

    #[error("determinant {det} references orbital {orbital}, but only {norb} orbitals are available")]
    OrbitalIndex {
        det: usize,
        orbital: usize,
        norb: usize,
    },

    #[error("CI term {term} maps to determinant {index}, but only {ndet} determinants exist")]
    MappingIndex {
        term: usize,
        index: usize,
        ndet: usize,
    },

    #[error("no cached walker state; call recompute first")]
    StaleState,

    #[error("proposal for walker {walker} is stale (electron {electron}, stamp {stamp}, walker stamp {current})")]
    StaleProposal {
        walker: usize,
        electron: usize,
        stamp: u64,
        current: u64,
    },

    #[error("unsupported angular momentum l = {0} (only s and p shells)")]
    AngularMomentum(u32),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, SlaterError>;

/// Fails with [`SlaterError::ShapeMismatch`] unless `found == expected`.
pub(crate) fn check_len(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(SlaterError::ShapeMismatch { what, expected, found });
    }
    Ok(())
}
