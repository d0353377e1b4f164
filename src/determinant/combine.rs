//! Log-domain combination of CI terms.
//!
//! Ψ = Σₜ cₜ sₜ exp(Lₜ) is evaluated as exp(ref) Σₜ cₜ sₜ exp(Lₜ - ref) with
//! ref = maxₜ Lₜ, so terms of wildly different magnitude never overflow.

use nalgebra::DVector;
use super::expansion::DeterminantExpansion;

/// Sign of `x` as ±1, and 0 for exactly zero (unlike `f64::signum`).
pub fn sign_of(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Per-term signs and log-magnitudes: products of the mapped up and down determinants.
pub fn term_values(
    expansion: &DeterminantExpansion,
    up_signs: &DVector<f64>,
    up_logabs: &DVector<f64>,
    down_signs: &DVector<f64>,
    down_logabs: &DVector<f64>,
) -> (DVector<f64>, DVector<f64>) {
    let nterms = expansion.num_terms();
    let signs = DVector::from_fn(nterms, |t, _| {
        up_signs[expansion.mapping_up[t]] * down_signs[expansion.mapping_down[t]]
    });
    let logs = DVector::from_fn(nterms, |t, _| {
        up_logabs[expansion.mapping_up[t]] + down_logabs[expansion.mapping_down[t]]
    });
    (signs, logs)
}

/// Largest log-magnitude, −∞ if every term vanishes.
pub fn reference(logs: &DVector<f64>) -> f64 {
    logs.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Σₜ cₜ sₜ exp(Lₜ - ref).
pub fn weighted_sum(ci: &DVector<f64>, signs: &DVector<f64>, logs: &DVector<f64>, reference: f64) -> f64 {
    if reference == f64::NEG_INFINITY {
        return 0.0;
    }
    ci.iter()
        .zip(signs.iter())
        .zip(logs.iter())
        .filter(|((_, &s), _)| s != 0.0)
        .map(|((&c, &s), &l)| c * s * (l - reference).exp())
        .sum()
}

/// Combined (sign, ln|Ψ|) of the CI sum.
pub fn combine(ci: &DVector<f64>, signs: &DVector<f64>, logs: &DVector<f64>) -> (f64, f64) {
    let reference = reference(logs);
    let value = weighted_sum(ci, signs, logs, reference);
    if value == 0.0 {
        return (0.0, f64::NEG_INFINITY);
    }
    (sign_of(value), value.abs().ln() + reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_term_has_no_shift() {
        let ci = DVector::from_element(1, 1.0);
        let signs = DVector::from_element(1, -1.0);
        let logs = DVector::from_element(1, -37.123456789);
        let (sign, logabs) = combine(&ci, &signs, &logs);
        assert_eq!(sign, -1.0);
        assert_eq!(logabs, -37.123456789);
    }

    #[test]
    fn test_magnitude_spread_of_fifty() {
        let ci = DVector::from_vec(vec![0.7, -0.2]);
        let signs = DVector::from_vec(vec![1.0, 1.0]);
        let logs = DVector::from_vec(vec![0.0, 50.0]);
        let (sign, logabs) = combine(&ci, &signs, &logs);
        // -0.2 e^50 + 0.7 = -e^50 (0.2 - 0.7 e^-50)
        let expected = 50.0 + (0.2f64).ln() + (-3.5 * (-50.0f64).exp()).ln_1p();
        assert_eq!(sign, -1.0);
        assert_relative_eq!(logabs, expected, max_relative = 1e-14);
    }

    #[test]
    fn test_beyond_f64_range() {
        let ci = DVector::from_vec(vec![0.5, 0.25]);
        let signs = DVector::from_vec(vec![-1.0, -1.0]);
        let logs = DVector::from_vec(vec![800.0, 750.0]);
        let (sign, logabs) = combine(&ci, &signs, &logs);
        let expected = 800.0 + (0.5 + 0.25 * (-50.0f64).exp()).ln();
        assert_eq!(sign, -1.0);
        assert!(logabs.is_finite());
        assert_relative_eq!(logabs, expected, max_relative = 1e-14);

        let logs = DVector::from_vec(vec![-800.0, -750.0]);
        let (_, logabs) = combine(&ci, &signs, &logs);
        assert_relative_eq!(logabs, -750.0 + (0.25 + 0.5 * (-50.0f64).exp()).ln(), max_relative = 1e-14);
    }

    #[test]
    fn test_cancellation_is_node() {
        let ci = DVector::from_vec(vec![1.0, 1.0]);
        let signs = DVector::from_vec(vec![1.0, -1.0]);
        let logs = DVector::from_vec(vec![2.0, 2.0]);
        assert_eq!(combine(&ci, &signs, &logs), (0.0, f64::NEG_INFINITY));
    }

    #[test]
    fn test_all_terms_on_node() {
        let ci = DVector::from_vec(vec![1.0, 2.0]);
        let signs = DVector::zeros(2);
        let logs = DVector::from_element(2, f64::NEG_INFINITY);
        assert_eq!(combine(&ci, &signs, &logs), (0.0, f64::NEG_INFINITY));
    }
}
