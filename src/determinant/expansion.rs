//! Static description of a multi-determinant expansion.
//!
//! Each spin channel has its own list of unique determinants (orbital
//! occupations). A CI term pairs one up determinant with one down
//! determinant; the coefficient of that term lives in
//! [`DeterminantParameters`](super::DeterminantParameters).

use std::collections::HashMap;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use crate::error::{check_len, Result, SlaterError};
use super::parameters::DeterminantParameters;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Spin {
    Up,
    Down,
}

/// One CI term before packing: coefficient and occupied orbitals per spin.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeterminantTerm {
    pub coeff: f64,
    pub up: Vec<usize>,
    pub down: Vec<usize>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeterminantExpansion {
    /// Electron counts (up, down). Electrons `0..nup` are up, the rest down.
    pub nelec: (usize, usize),
    pub determinants_up: Vec<Vec<usize>>,
    pub determinants_down: Vec<Vec<usize>>,
    /// CI term → index into `determinants_up`
    pub mapping_up: Vec<usize>,
    /// CI term → index into `determinants_down`
    pub mapping_down: Vec<usize>,
}

impl DeterminantExpansion {
    pub fn new(
        nelec: (usize, usize),
        determinants_up: Vec<Vec<usize>>,
        determinants_down: Vec<Vec<usize>>,
        mapping_up: Vec<usize>,
        mapping_down: Vec<usize>,
    ) -> Result<Self> {
        check_len("CI mapping", mapping_up.len(), mapping_down.len())?;
        if mapping_up.is_empty() {
            return Err(SlaterError::Config("expansion has no CI terms".into()));
        }
        for det in &determinants_up {
            check_len("up determinant", nelec.0, det.len())?;
        }
        for det in &determinants_down {
            check_len("down determinant", nelec.1, det.len())?;
        }
        for (term, (&iu, &id)) in mapping_up.iter().zip(mapping_down.iter()).enumerate() {
            if iu >= determinants_up.len() {
                return Err(SlaterError::MappingIndex { term, index: iu, ndet: determinants_up.len() });
            }
            if id >= determinants_down.len() {
                return Err(SlaterError::MappingIndex { term, index: id, ndet: determinants_down.len() });
            }
        }
        Ok(Self { nelec, determinants_up, determinants_down, mapping_up, mapping_down })
    }

    /// Pack a list of CI terms into unique per-spin determinants and a mapping.
    ///
    /// Terms with |coeff| < `tol` are dropped. Returns the CI coefficients of
    /// the surviving terms together with the expansion.
    pub fn from_determinants(nelec: (usize, usize), terms: &[DeterminantTerm], tol: f64) -> Result<(DVector<f64>, Self)> {
        let mut unique_up: HashMap<Vec<usize>, usize> = HashMap::new();
        let mut unique_down: HashMap<Vec<usize>, usize> = HashMap::new();
        let mut determinants_up = Vec::new();
        let mut determinants_down = Vec::new();
        let mut mapping_up = Vec::new();
        let mut mapping_down = Vec::new();
        let mut coeffs = Vec::new();

        for term in terms.iter().filter(|t| t.coeff.abs() >= tol) {
            let iu = *unique_up.entry(term.up.clone()).or_insert_with(|| {
                determinants_up.push(term.up.clone());
                determinants_up.len() - 1
            });
            let id = *unique_down.entry(term.down.clone()).or_insert_with(|| {
                determinants_down.push(term.down.clone());
                determinants_down.len() - 1
            });
            mapping_up.push(iu);
            mapping_down.push(id);
            coeffs.push(term.coeff);
        }

        let expansion = Self::new(nelec, determinants_up, determinants_down, mapping_up, mapping_down)?;
        Ok((DVector::from_vec(coeffs), expansion))
    }

    pub fn num_terms(&self) -> usize {
        self.mapping_up.len()
    }

    pub fn num_electrons(&self) -> usize {
        self.nelec.0 + self.nelec.1
    }

    pub fn determinants(&self, spin: Spin) -> &[Vec<usize>] {
        match spin {
            Spin::Up => &self.determinants_up,
            Spin::Down => &self.determinants_down,
        }
    }

    /// Spin channel of electron `e` and its index within that channel.
    pub fn locate(&self, e: usize) -> Result<(Spin, usize)> {
        let (nup, ndown) = self.nelec;
        if e < nup {
            Ok((Spin::Up, e))
        } else if e < nup + ndown {
            Ok((Spin::Down, e - nup))
        } else {
            Err(SlaterError::ElectronIndex { index: e, nelec: nup + ndown })
        }
    }

    /// Check that `params` fits this expansion.
    pub fn validate_parameters(&self, params: &DeterminantParameters) -> Result<()> {
        check_len("CI coefficients", self.num_terms(), params.ci_coeff.len())?;
        check_len(
            "orbital coefficient rows",
            params.mo_coeff_alpha.nrows(),
            params.mo_coeff_beta.nrows(),
        )?;
        for spin in [Spin::Up, Spin::Down] {
            let norb = params.mo_coeff(spin).ncols();
            for (det, occ) in self.determinants(spin).iter().enumerate() {
                if let Some(&orbital) = occ.iter().find(|&&o| o >= norb) {
                    return Err(SlaterError::OrbitalIndex { det, orbital, norb });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn term(coeff: f64, up: &[usize], down: &[usize]) -> DeterminantTerm {
        DeterminantTerm { coeff, up: up.to_vec(), down: down.to_vec() }
    }

    #[test]
    fn test_packing_deduplicates_and_drops() {
        let terms = vec![
            term(0.9, &[0, 1], &[0]),
            term(-0.3, &[0, 2], &[0]),
            term(1e-12, &[1, 2], &[1]),
            term(0.2, &[0, 1], &[1]),
        ];
        let (ci, exp) = DeterminantExpansion::from_determinants((2, 1), &terms, 1e-9).unwrap();
        assert_eq!(ci.as_slice(), &[0.9, -0.3, 0.2]);
        assert_eq!(exp.determinants_up, vec![vec![0, 1], vec![0, 2]]);
        assert_eq!(exp.determinants_down, vec![vec![0], vec![1]]);
        assert_eq!(exp.mapping_up, vec![0, 1, 0]);
        assert_eq!(exp.mapping_down, vec![0, 0, 1]);
    }

    #[test]
    fn test_mapping_out_of_range() {
        let err = DeterminantExpansion::new((1, 1), vec![vec![0]], vec![vec![0]], vec![0, 1], vec![0, 0]).unwrap_err();
        assert!(matches!(err, SlaterError::MappingIndex { term: 1, index: 1, ndet: 1 }));
    }

    #[test]
    fn test_mapping_length_mismatch() {
        let err = DeterminantExpansion::new((1, 1), vec![vec![0]], vec![vec![0]], vec![0, 0], vec![0]).unwrap_err();
        assert!(matches!(err, SlaterError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_locate() {
        let exp = DeterminantExpansion::new((2, 1), vec![vec![0, 1]], vec![vec![0]], vec![0], vec![0]).unwrap();
        assert_eq!(exp.locate(1).unwrap(), (Spin::Up, 1));
        assert_eq!(exp.locate(2).unwrap(), (Spin::Down, 0));
        assert!(matches!(exp.locate(3), Err(SlaterError::ElectronIndex { index: 3, nelec: 3 })));
    }

    #[test]
    fn test_validate_parameters() {
        let exp = DeterminantExpansion::new((2, 1), vec![vec![0, 3]], vec![vec![0]], vec![0], vec![0]).unwrap();
        let params = DeterminantParameters::restricted(DVector::from_element(1, 1.0), DMatrix::identity(4, 3));
        assert!(matches!(
            exp.validate_parameters(&params),
            Err(SlaterError::OrbitalIndex { det: 0, orbital: 3, norb: 3 })
        ));

        let params = DeterminantParameters::restricted(DVector::from_element(2, 1.0), DMatrix::identity(4, 4));
        assert!(matches!(exp.validate_parameters(&params), Err(SlaterError::ShapeMismatch { .. })));
    }
}
