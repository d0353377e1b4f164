//! Multi-determinant evaluation: expansion layout, batch evaluation,
//! log-domain combination, single-electron updates and parameter gradients.

mod expansion;
mod parameters;
mod evaluate;
mod combine;
mod update;
mod inverse;
mod pgradient;

pub use expansion::{DeterminantExpansion, DeterminantTerm, Spin};
pub use parameters::{DeterminantParameters, PARAMETER_NAMES};
pub use evaluate::{
    combine_states, compute_determinants, evaluate_batch, evaluate_expansion, evaluate_from_aos,
    slogdet_inverse, substituted_slogdet, Evaluation, SpinState,
};
pub use combine::{combine, reference, sign_of, term_values, weighted_sum};
pub use update::{determinant_ratios, testvalue, TestValues};
pub use inverse::{inverse_deviation, sherman_morrison_row, update_spin_state};
pub use pgradient::{config_gradient, ConfigGradient, ParameterGradient};
