//! Standard-Model Extension (Lorentz/CPT-violating) Hamiltonian terms.
//!
//! Coefficients are N×N Hermitian matrices: `a` in eV (CPT-odd), `c` and `e`
//! dimensionless (CPT-even). The isotropic model contributes
//! `H = a - E·c`. The directional model takes one matrix per spatial
//! component and projects onto the propagation direction `N̂`:
//!
//! `H = Σ_j N̂_j (a_j - E·c_j) - E · Σ_j N̂_j² e_j`
//!
//! where `N̂ = -(cos δ cos α, cos δ sin α, sin δ)` points from the source at
//! right ascension α and declination δ toward Earth. Antineutrinos see
//! `a → -a*`, `c → c*` and `e → e*`.

use nalgebra::DMatrix;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{OscError, Result};

/// Basis the coefficient matrices are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmeBasis {
    Mass,
    Flavor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SmeModel {
    Isotropic {
        basis: SmeBasis,
        a_ev: DMatrix<Complex64>,
        c: DMatrix<Complex64>,
    },
    Directional {
        basis: SmeBasis,
        a_ev: [DMatrix<Complex64>; 3],
        c: [DMatrix<Complex64>; 3],
        e: [DMatrix<Complex64>; 3],
        /// Unit propagation vector, pointing away from the source.
        direction: [f64; 3],
    },
}

const HERMITIAN_TOLERANCE: f64 = 1e-12;

fn check_coefficient(name: &str, m: &DMatrix<Complex64>, num_flavors: usize) -> Result<()> {
    if m.nrows() != num_flavors || m.ncols() != num_flavors {
        return Err(OscError::invalid(format!(
            "SME `{name}` must be {num_flavors}x{num_flavors}, got {}x{}",
            m.nrows(),
            m.ncols()
        )));
    }
    if m.iter().any(|z| !(z.re.is_finite() && z.im.is_finite())) {
        return Err(OscError::invalid(format!("SME `{name}` must be finite")));
    }
    let scale = m.iter().map(|z| z.norm()).fold(0.0, f64::max).max(f64::MIN_POSITIVE);
    if (m - m.adjoint()).iter().any(|z| z.norm() > HERMITIAN_TOLERANCE * scale) {
        return Err(OscError::invalid(format!("SME `{name}` must be Hermitian")));
    }
    Ok(())
}

fn into_components(
    name: &str,
    parts: Vec<DMatrix<Complex64>>,
    num_flavors: usize,
) -> Result<[DMatrix<Complex64>; 3]> {
    for part in &parts {
        check_coefficient(name, part, num_flavors)?;
    }
    <[DMatrix<Complex64>; 3]>::try_from(parts).map_err(|parts| {
        OscError::invalid(format!(
            "directional SME `{name}` needs 3 spatial components, got {}",
            parts.len()
        ))
    })
}

impl SmeModel {
    pub fn isotropic(
        basis: SmeBasis,
        a_ev: DMatrix<Complex64>,
        c: DMatrix<Complex64>,
        num_flavors: usize,
    ) -> Result<Self> {
        check_coefficient("a", &a_ev, num_flavors)?;
        check_coefficient("c", &c, num_flavors)?;
        Ok(SmeModel::Isotropic { basis, a_ev, c })
    }

    /// Directional coefficients, shape 3×N×N each. Both sky angles are required.
    pub fn directional(
        basis: SmeBasis,
        a_ev: Vec<DMatrix<Complex64>>,
        c: Vec<DMatrix<Complex64>>,
        e: Vec<DMatrix<Complex64>>,
        ra_rad: Option<f64>,
        dec_rad: Option<f64>,
        num_flavors: usize,
    ) -> Result<Self> {
        let (Some(ra_rad), Some(dec_rad)) = (ra_rad, dec_rad) else {
            return Err(OscError::invalid(
                "directional SME needs both right ascension and declination",
            ));
        };
        if !(ra_rad.is_finite() && dec_rad.is_finite()) {
            return Err(OscError::invalid("sky direction must be finite"));
        }
        let (sd, cd) = dec_rad.sin_cos();
        let (sa, ca) = ra_rad.sin_cos();
        Ok(SmeModel::Directional {
            basis,
            a_ev: into_components("a", a_ev, num_flavors)?,
            c: into_components("c", c, num_flavors)?,
            e: into_components("e", e, num_flavors)?,
            direction: [-cd * ca, -cd * sa, -sd],
        })
    }

    pub fn basis(&self) -> SmeBasis {
        match self {
            SmeModel::Isotropic { basis, .. } | SmeModel::Directional { basis, .. } => *basis,
        }
    }

    /// Number of flavors the coefficients are written for.
    pub fn dim(&self) -> usize {
        match self {
            SmeModel::Isotropic { a_ev, .. } => a_ev.nrows(),
            SmeModel::Directional { a_ev, .. } => a_ev[0].nrows(),
        }
    }

    pub fn is_directional(&self) -> bool {
        matches!(self, SmeModel::Directional { .. })
    }

    /// Unit propagation direction for the directional model.
    pub fn propagation_direction(&self) -> Option<[f64; 3]> {
        match *self {
            SmeModel::Directional { direction, .. } => Some(direction),
            SmeModel::Isotropic { .. } => None,
        }
    }

    /// Hamiltonian term in eV at `energy_ev`, in the model's own basis.
    pub fn hamiltonian(&self, energy_ev: f64, nubar: bool) -> DMatrix<Complex64> {
        let cpt_odd = |m: &DMatrix<Complex64>| if nubar { -m.conjugate() } else { m.clone() };
        let cpt_even = |m: &DMatrix<Complex64>| if nubar { m.conjugate() } else { m.clone() };
        let e_c = Complex64::new(energy_ev, 0.0);

        match self {
            SmeModel::Isotropic { a_ev, c, .. } => cpt_odd(a_ev) - cpt_even(c) * e_c,
            SmeModel::Directional {
                a_ev,
                c,
                e,
                direction: n_hat,
                ..
            } => {
                let dim = a_ev[0].nrows();
                let mut h = DMatrix::<Complex64>::zeros(dim, dim);
                for j in 0..3 {
                    let nj = Complex64::new(n_hat[j], 0.0);
                    let nj2 = Complex64::new(n_hat[j] * n_hat[j], 0.0);
                    h += (cpt_odd(&a_ev[j]) - cpt_even(&c[j]) * e_c) * nj;
                    h -= cpt_even(&e[j]) * (e_c * nj2);
                }
                h
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn diag(values: &[f64]) -> DMatrix<Complex64> {
        DMatrix::from_fn(values.len(), values.len(), |i, j| {
            if i == j {
                Complex64::new(values[i], 0.0)
            } else {
                Complex64::new(0.0, 0.0)
            }
        })
    }

    #[test]
    fn test_isotropic_hamiltonian_and_cpt() {
        let a = diag(&[1e-22, 0.0, -1e-22]);
        let c = diag(&[0.0, 1e-26, 0.0]);
        let sme = SmeModel::isotropic(SmeBasis::Flavor, a, c, 3).unwrap();
        let h = sme.hamiltonian(1e12, false);
        assert_relative_eq!(h[(0, 0)].re, 1e-22);
        assert_relative_eq!(h[(1, 1)].re, -1e-14);
        let hbar = sme.hamiltonian(1e12, true);
        assert_relative_eq!(hbar[(0, 0)].re, -1e-22);
        assert_relative_eq!(hbar[(1, 1)].re, -1e-14);
    }

    #[test]
    fn test_shape_must_match_flavors() {
        let err = SmeModel::isotropic(SmeBasis::Mass, diag(&[0.0, 0.0]), diag(&[0.0; 3]), 3);
        assert!(err.is_err());
    }

    #[test]
    fn test_non_hermitian_rejected() {
        let mut a = diag(&[0.0, 0.0]);
        a[(0, 1)] = Complex64::new(0.0, 1e-22);
        assert!(SmeModel::isotropic(SmeBasis::Flavor, a, diag(&[0.0, 0.0]), 2).is_err());
    }

    #[test]
    fn test_directional_requires_both_angles() {
        let parts = || vec![diag(&[0.0, 0.0]); 3];
        assert!(SmeModel::directional(
            SmeBasis::Mass,
            parts(),
            parts(),
            parts(),
            Some(0.1),
            None,
            2
        )
        .is_err());
        assert!(SmeModel::directional(
            SmeBasis::Mass,
            parts(),
            parts(),
            vec![diag(&[0.0, 0.0]); 2],
            Some(0.1),
            Some(0.2),
            2
        )
        .is_err());
        assert!(SmeModel::directional(
            SmeBasis::Mass,
            parts(),
            parts(),
            parts(),
            Some(0.1),
            Some(0.2),
            2
        )
        .is_ok());
    }

    #[test]
    fn test_direction_points_from_source() {
        let parts = || vec![diag(&[0.0, 0.0]); 3];
        let sme = SmeModel::directional(
            SmeBasis::Mass,
            parts(),
            parts(),
            parts(),
            Some(0.0),
            Some(core::f64::consts::FRAC_PI_2),
            2,
        )
        .unwrap();
        let n = sme.propagation_direction().unwrap();
        assert_relative_eq!(n[2], -1.0);
        assert_relative_eq!(n[0].hypot(n[1]), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_directional_hamiltonian_follows_stored_direction() {
        // from the north celestial pole the beam travels along -z
        let zero = || diag(&[0.0, 0.0]);
        let a = vec![zero(), zero(), diag(&[2e-23, -2e-23])];
        let e = vec![zero(), zero(), diag(&[1e-27, 0.0])];
        let sme = SmeModel::directional(
            SmeBasis::Flavor,
            a,
            vec![zero(), zero(), zero()],
            e,
            Some(0.3),
            Some(core::f64::consts::FRAC_PI_2),
            2,
        )
        .unwrap();
        let h = sme.hamiltonian(1e9, false);
        assert_relative_eq!(h[(0, 0)].re, -2e-23 - 1e-18, max_relative = 1e-12);
        assert_relative_eq!(h[(1, 1)].re, 2e-23, max_relative = 1e-12);
        let hbar = sme.hamiltonian(1e9, true);
        assert_relative_eq!(hbar[(1, 1)].re, -2e-23, max_relative = 1e-12);
    }
}
