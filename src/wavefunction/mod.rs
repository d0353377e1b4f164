//! Wavefunction module - orbital traits, Gaussian basis and the
//! multi-determinant Slater wavefunction.

mod traits;
mod gaussian;
mod multislater;

pub use traits::{SingleWfn, MultiWfn, OptimizableWfn, OrbitalEvaluator};
pub use gaussian::{GaussianPrimitive, CGTO, GaussianBasis};
pub use multislater::{MultiSlater, EngineSettings, WalkerState, Proposal, DriftReport};
