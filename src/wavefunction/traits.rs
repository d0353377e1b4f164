//! Wave function traits for QMC calculations.
//!
//! Provides `SingleWfn` for single-center functions (atomic orbitals),
//! `OrbitalEvaluator` for a whole basis evaluated at electron positions,
//! and `MultiWfn` for many-electron wavefunctions in the log domain.

use nalgebra::{DMatrix, Matrix3, Vector3};

/// Single-center function trait (e.g., a contracted Gaussian).
pub trait SingleWfn {
    /// Evaluate the function at position `r`.
    fn evaluate(&self, r: &Vector3<f64>) -> f64;

    /// Compute the gradient at position `r`.
    fn derivative(&self, r: &Vector3<f64>) -> Vector3<f64>;

    /// Compute the Hessian at position `r`.
    fn hessian(&self, r: &Vector3<f64>) -> Matrix3<f64>;

    /// Compute the Laplacian at position `r`.
    fn laplacian(&self, r: &Vector3<f64>) -> f64 {
        self.hessian(r).trace()
    }

    /// Numerical gradient using central difference.
    fn numerical_derivative(&self, r: &Vector3<f64>, h: f64) -> Vector3<f64> {
        let mut grad = Vector3::zeros();
        for axis in 0..3 {
            let mut r_fwd = *r;
            let mut r_bwd = *r;
            r_fwd[axis] += h;
            r_bwd[axis] -= h;
            grad[axis] = (self.evaluate(&r_fwd) - self.evaluate(&r_bwd)) / (2.0 * h);
        }
        grad
    }

    /// Numerical Laplacian using central difference.
    fn numerical_laplacian(&self, r: &Vector3<f64>, h: f64) -> f64 {
        let psi = self.evaluate(r);
        let mut laplacian = 0.0;
        for axis in 0..3 {
            let mut r_fwd = *r;
            let mut r_bwd = *r;
            r_fwd[axis] += h;
            r_bwd[axis] -= h;
            laplacian += (self.evaluate(&r_fwd) - 2.0 * psi + self.evaluate(&r_bwd)) / (h * h);
        }
        laplacian
    }
}

/// A basis of orbitals that can be evaluated at electron positions.
///
/// Rows of the returned matrices index positions (for `evaluate`) or
/// derivative components (for the single-position variants); columns index
/// basis functions.
pub trait OrbitalEvaluator: Send + Sync {
    /// Number of basis functions (columns of every returned matrix).
    fn num_basis(&self) -> usize;

    /// Values at each position, shape `(positions.len(), num_basis)`.
    fn evaluate(&self, positions: &[Vector3<f64>]) -> DMatrix<f64>;

    /// Gradient at one position, shape `(3, num_basis)`.
    fn evaluate_gradient(&self, position: &Vector3<f64>) -> DMatrix<f64>;

    /// Hessian at one position, shape `(9, num_basis)`; row `3 * i + j` holds ∂ᵢ∂ⱼ.
    fn evaluate_hessian(&self, position: &Vector3<f64>) -> DMatrix<f64>;
}

/// Many-electron wavefunction evaluated in the log domain.
///
/// `sign_logabs` returns `(sign, ln|Ψ|)`; a node is `(0.0, -inf)`.
pub trait MultiWfn {
    /// Generate initial random electron positions.
    fn initialize(&self) -> Vec<Vector3<f64>>;

    /// Sign and log-magnitude of the wavefunction at positions `r`.
    fn sign_logabs(&self, r: &[Vector3<f64>]) -> (f64, f64);

    /// ∇ᵢ ln|Ψ| for every electron.
    fn grad_log(&self, r: &[Vector3<f64>]) -> Vec<Vector3<f64>>;

    /// ∇ᵢ²Ψ / Ψ for every electron.
    fn laplacian(&self, r: &[Vector3<f64>]) -> Vec<f64>;

    /// Numerical ∇ᵢ ln|Ψ| using central difference.
    fn numerical_grad_log(&self, r: &[Vector3<f64>], h: f64) -> Vec<Vector3<f64>> {
        let mut grad = vec![Vector3::zeros(); r.len()];
        for i in 0..r.len() {
            for axis in 0..3 {
                let mut r_fwd = r.to_vec();
                let mut r_bwd = r.to_vec();
                r_fwd[i][axis] += h;
                r_bwd[i][axis] -= h;
                let (_, log_fwd) = self.sign_logabs(&r_fwd);
                let (_, log_bwd) = self.sign_logabs(&r_bwd);
                grad[i][axis] = (log_fwd - log_bwd) / (2.0 * h);
            }
        }
        grad
    }

    /// Numerical ∇ᵢ²Ψ / Ψ using central difference on the signed ratio.
    fn numerical_laplacian(&self, r: &[Vector3<f64>], h: f64) -> Vec<f64> {
        let (sign, logabs) = self.sign_logabs(r);
        let ratio = |pos: &[Vector3<f64>]| {
            let (s, l) = self.sign_logabs(pos);
            s * sign * (l - logabs).exp()
        };
        let mut laplacian = vec![0.0; r.len()];
        for i in 0..r.len() {
            for axis in 0..3 {
                let mut r_fwd = r.to_vec();
                let mut r_bwd = r.to_vec();
                r_fwd[i][axis] += h;
                r_bwd[i][axis] -= h;
                laplacian[i] += (ratio(&r_fwd) - 2.0 + ratio(&r_bwd)) / (h * h);
            }
        }
        laplacian
    }
}

/// Trait for wavefunctions with optimizable variational parameters.
///
/// Provides access to parameter log-derivatives O_i = ∂ ln|Ψ(R)| / ∂p_i,
/// the quantities consumed by gradient-based and SR optimizers.
pub trait OptimizableWfn: MultiWfn {
    /// Number of variational parameters.
    fn num_params(&self) -> usize;

    /// Get current parameter values.
    fn get_params(&self) -> Vec<f64>;

    /// Set parameter values. Invalidates any cached evaluation state.
    fn set_params(&mut self, params: &[f64]) -> crate::Result<()>;

    /// Compute O_i = ∂ ln|Ψ(R)| / ∂p_i for all parameters.
    fn log_derivatives(&self, r: &[Vector3<f64>]) -> crate::Result<Vec<f64>>;
}
