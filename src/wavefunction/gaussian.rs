//! Contracted Cartesian Gaussian basis functions.
//!
//! Only s and p shells are supported. Values, gradients and Hessians are
//! analytic.

use nalgebra::{DMatrix, Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use crate::error::{Result, SlaterError};
use super::traits::{OrbitalEvaluator, SingleWfn};

/// Gaussian primitive: c · exp(-α r²)
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct GaussianPrimitive {
    pub exponent: f64,
    pub coefficient: f64,
}

/// Contracted Gaussian-type orbital.
///
/// φ(r) = A(d) Σᵥ cᵥ exp(-αᵥ |d|²), d = r - center, with A = 1 for s shells
/// and A = d_m for p shells (m = 0, 1, 2 for x, y, z).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CGTO {
    pub center: Vector3<f64>,
    pub primitives: Vec<GaussianPrimitive>,
    pub l: u32,
    pub m: usize,
}

impl CGTO {
    pub fn new(center: Vector3<f64>, primitives: Vec<GaussianPrimitive>, l: u32, m: usize) -> Result<Self> {
        if l > 1 {
            return Err(SlaterError::AngularMomentum(l));
        }
        if l == 1 && m > 2 {
            return Err(SlaterError::Config(format!("p shell component {} out of range", m)));
        }
        Ok(Self { center, primitives, l, m })
    }

    /// Radial sums R, R₁ = Σ -2α c e, R₂ = Σ 4α² c e at squared distance `r2`.
    ///
    /// ∇R = d R₁ and ∂ᵢ∂ⱼR = dᵢdⱼ R₂ + δᵢⱼ R₁.
    fn radial(&self, r2: f64) -> (f64, f64, f64) {
        self.primitives.iter().fold((0.0, 0.0, 0.0), |(r0, r1, r2_acc), p| {
            let e = p.coefficient * (-p.exponent * r2).exp();
            (r0 + e, r1 - 2.0 * p.exponent * e, r2_acc + 4.0 * p.exponent * p.exponent * e)
        })
    }
}

impl SingleWfn for CGTO {
    fn evaluate(&self, r: &Vector3<f64>) -> f64 {
        let d = r - self.center;
        let (radial, _, _) = self.radial(d.norm_squared());
        match self.l {
            0 => radial,
            _ => d[self.m] * radial,
        }
    }

    fn derivative(&self, r: &Vector3<f64>) -> Vector3<f64> {
        let d = r - self.center;
        let (r0, r1, _) = self.radial(d.norm_squared());
        match self.l {
            0 => d * r1,
            _ => {
                let mut grad = d * (d[self.m] * r1);
                grad[self.m] += r0;
                grad
            }
        }
    }

    fn hessian(&self, r: &Vector3<f64>) -> Matrix3<f64> {
        let d = r - self.center;
        let (_, r1, r2) = self.radial(d.norm_squared());
        let s_hess = d * d.transpose() * r2 + Matrix3::identity() * r1;
        match self.l {
            0 => s_hess,
            _ => {
                let m = self.m;
                let mut hess = s_hess * d[m];
                for i in 0..3 {
                    hess[(i, m)] += d[i] * r1;
                    hess[(m, i)] += d[i] * r1;
                }
                hess
            }
        }
    }
}

/// A list of contracted Gaussians forming an atomic-orbital basis.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct GaussianBasis {
    pub functions: Vec<CGTO>,
}

impl GaussianBasis {
    pub fn new(functions: Vec<CGTO>) -> Self {
        Self { functions }
    }

    /// Append a full shell on `center`: one function for s, three for p.
    pub fn push_shell(&mut self, center: Vector3<f64>, l: u32, primitives: &[GaussianPrimitive]) -> Result<()> {
        let components = match l {
            0 => 1,
            1 => 3,
            _ => return Err(SlaterError::AngularMomentum(l)),
        };
        for m in 0..components {
            self.functions.push(CGTO::new(center, primitives.to_vec(), l, m)?);
        }
        Ok(())
    }
}

impl OrbitalEvaluator for GaussianBasis {
    fn num_basis(&self) -> usize {
        self.functions.len()
    }

    fn evaluate(&self, positions: &[Vector3<f64>]) -> DMatrix<f64> {
        DMatrix::from_fn(positions.len(), self.functions.len(), |i, mu| {
            self.functions[mu].evaluate(&positions[i])
        })
    }

    fn evaluate_gradient(&self, position: &Vector3<f64>) -> DMatrix<f64> {
        let mut out = DMatrix::zeros(3, self.functions.len());
        for (mu, f) in self.functions.iter().enumerate() {
            out.set_column(mu, &f.derivative(position));
        }
        out
    }

    fn evaluate_hessian(&self, position: &Vector3<f64>) -> DMatrix<f64> {
        let mut out = DMatrix::zeros(9, self.functions.len());
        for (mu, f) in self.functions.iter().enumerate() {
            let hess = f.hessian(position);
            for i in 0..3 {
                for j in 0..3 {
                    out[(3 * i + j, mu)] = hess[(i, j)];
                }
            }
        }
        out
    }
}
