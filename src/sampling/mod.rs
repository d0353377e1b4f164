//! Sampling module - Monte Carlo drivers over the multi-determinant engine.

mod vmc;

pub use vmc::{autocorrelation_time, block_average, integrated_autocorrelation, VmcParams, VmcResults, VmcSimulation};
