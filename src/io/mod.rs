//! IO module - YAML system descriptions.

mod config;

pub use config::{read_config, BasisShell, SystemConfig};
