//! Slater QMC - multi-determinant Slater wavefunctions for quantum Monte Carlo.
//!
//! The crate evaluates Ψ(R) = Σₜ cₜ det(A↑ₜ) det(A↓ₜ) in the log domain for a
//! batch of walkers, keeps determinant inverses up to date through
//! single-electron moves, and provides value ratios, electron derivatives and
//! parameter gradients. A small VMC driver exercises the engine end to end.

pub mod error;
pub mod wavefunction;
pub mod determinant;
pub mod sampling;
pub mod io;

// Re-export commonly used types at crate root
pub use error::{Result, SlaterError};
pub use wavefunction::{
    SingleWfn, MultiWfn, OptimizableWfn, OrbitalEvaluator, GaussianPrimitive, CGTO, GaussianBasis,
    MultiSlater, EngineSettings, WalkerState, Proposal, DriftReport,
};
pub use determinant::{
    DeterminantExpansion, DeterminantTerm, DeterminantParameters, Spin, ParameterGradient, ConfigGradient,
    PARAMETER_NAMES,
};
pub use sampling::{VmcParams, VmcResults, VmcSimulation};
pub use io::{read_config, BasisShell, SystemConfig};
