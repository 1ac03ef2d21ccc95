//! Mixing angles, mass splittings and the PMNS matrix.

use core::f64::consts::PI;

use nalgebra::DMatrix;
use num_complex::Complex64;

use crate::error::{OscError, Result};
use crate::flavor::{Flavor, FlavorSystem};

/// Mixing angles and CP phase, all in radians.
///
/// `theta13`, `theta23` and a non-zero `deltacp` only exist for three flavors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixingAngles {
    pub theta12: f64,
    pub theta13: Option<f64>,
    pub theta23: Option<f64>,
    pub deltacp: f64,
}

impl MixingAngles {
    /// Angles as a list in (12, 13, 23) order, skipping absent ones.
    pub fn as_vec(&self) -> Vec<f64> {
        [Some(self.theta12), self.theta13, self.theta23]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Mass-squared splittings in eV².
///
/// `dm31` is positive for normal ordering and negative for inverted ordering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassSplittings {
    pub dm21: f64,
    pub dm31: Option<f64>,
}

impl MassSplittings {
    /// Reduced mass-squared diagonal `(0, Δm²21[, Δm²31])` in eV².
    pub fn mass_squared_diagonal(&self) -> Vec<f64> {
        let mut diag = vec![0.0, self.dm21];
        if let Some(dm31) = self.dm31 {
            diag.push(dm31);
        }
        diag
    }
}

/// NuFit 5.2 best fit, normal ordering, as sin²θ values.
const NUFIT52_NO_S12SQ: f64 = 0.307;
const NUFIT52_NO_S13SQ: f64 = 0.02203;
const NUFIT52_NO_S23SQ: f64 = 0.546;
const NUFIT52_NO_DELTA: f64 = 1.36 * PI;
const NUFIT52_NO_DMSQ21: f64 = 7.42e-5;
const NUFIT52_NO_DMSQ31: f64 = 2.517e-3;

/// The oscillation parameter record owned by one calculator.
///
/// Each setter replaces its whole sub-record; nothing is ever half-updated.
#[derive(Debug, Clone, PartialEq)]
pub struct OscillationParameters {
    num_flavors: usize,
    angles: Option<MixingAngles>,
    splittings: Option<MassSplittings>,
}

impl OscillationParameters {
    /// Unset parameters for an `num_flavors`-flavor system.
    pub fn unset(num_flavors: usize) -> Self {
        Self {
            num_flavors,
            angles: None,
            splittings: None,
        }
    }

    /// NuFit 5.2 normal-ordering best fit (three flavors).
    pub fn nufit52_no() -> Self {
        Self {
            num_flavors: 3,
            angles: Some(MixingAngles {
                theta12: NUFIT52_NO_S12SQ.sqrt().asin(),
                theta13: Some(NUFIT52_NO_S13SQ.sqrt().asin()),
                theta23: Some(NUFIT52_NO_S23SQ.sqrt().asin()),
                deltacp: NUFIT52_NO_DELTA,
            }),
            splittings: Some(MassSplittings {
                dm21: NUFIT52_NO_DMSQ21,
                dm31: Some(NUFIT52_NO_DMSQ31),
            }),
        }
    }

    pub fn num_flavors(&self) -> usize {
        self.num_flavors
    }

    pub fn set_mixing_angles(
        &mut self,
        theta12: f64,
        theta13: Option<f64>,
        theta23: Option<f64>,
        deltacp: Option<f64>,
    ) -> Result<()> {
        match (self.num_flavors, theta13, theta23) {
            (2, None, None) => {
                if deltacp.is_some_and(|d| d != 0.0) {
                    return Err(OscError::invalid("CP phase only exists for three flavors"));
                }
            }
            (2, _, _) => {
                return Err(OscError::invalid(
                    "theta13/theta23 must not be given for a two-flavor system",
                ))
            }
            (3, Some(_), Some(_)) => {}
            (3, _, _) => {
                return Err(OscError::invalid(
                    "theta13 and theta23 are required for a three-flavor system",
                ))
            }
            (n, _, _) => {
                return Err(OscError::invalid(format!("unsupported flavor count {n}")));
            }
        }
        let angles = MixingAngles {
            theta12,
            theta13,
            theta23,
            deltacp: deltacp.unwrap_or(0.0),
        };
        if angles.as_vec().iter().chain([&angles.deltacp]).any(|v| !v.is_finite()) {
            return Err(OscError::invalid("mixing angles must be finite"));
        }
        self.angles = Some(angles);
        Ok(())
    }

    /// Replace only the CP phase, keeping the angles.
    pub fn set_deltacp(&mut self, deltacp: f64) -> Result<()> {
        if self.num_flavors != 3 {
            return Err(OscError::invalid("CP phase only exists for three flavors"));
        }
        let angles = self.mixing_angles()?;
        if !deltacp.is_finite() {
            return Err(OscError::invalid("CP phase must be finite"));
        }
        self.angles = Some(MixingAngles { deltacp, ..*angles });
        Ok(())
    }

    pub fn set_mass_splittings(&mut self, dm21: f64, dm31: Option<f64>) -> Result<()> {
        match (self.num_flavors, dm31) {
            (2, None) | (3, Some(_)) => {}
            (2, Some(_)) => {
                return Err(OscError::invalid(
                    "dm31 must not be given for a two-flavor system",
                ))
            }
            (3, None) => {
                return Err(OscError::invalid("dm31 is required for a three-flavor system"))
            }
            (n, _) => return Err(OscError::invalid(format!("unsupported flavor count {n}"))),
        }
        if !dm21.is_finite() || dm31.is_some_and(|d| !d.is_finite()) {
            return Err(OscError::invalid("mass splittings must be finite"));
        }
        self.splittings = Some(MassSplittings { dm21, dm31 });
        Ok(())
    }

    pub fn mixing_angles(&self) -> Result<&MixingAngles> {
        self.angles
            .as_ref()
            .ok_or(OscError::ParametersNotSet("mixing angles"))
    }

    pub fn mass_splittings(&self) -> Result<&MassSplittings> {
        self.splittings
            .as_ref()
            .ok_or(OscError::ParametersNotSet("mass splittings"))
    }

    pub fn deltacp(&self) -> Result<f64> {
        Ok(self.mixing_angles()?.deltacp)
    }

    /// Both sub-records, or the first missing one as an error.
    pub fn require(&self) -> Result<(&MixingAngles, &MassSplittings)> {
        Ok((self.mixing_angles()?, self.mass_splittings()?))
    }

    /// PMNS matrix with rows in `system` order and columns in mass order.
    pub fn pmns(&self, system: &FlavorSystem) -> Result<DMatrix<Complex64>> {
        let angles = self.mixing_angles()?;
        if system.len() != self.num_flavors {
            return Err(OscError::invalid("flavor system does not match parameter record"));
        }
        Ok(pmns_matrix(angles, system.flavors()))
    }
}

/// Standard PDG parameterization `U = R23 · U13(δ) · R12`.
///
/// For two flavors this is the plain rotation by `theta12`.
pub fn pmns_matrix(angles: &MixingAngles, flavors: &[Flavor]) -> DMatrix<Complex64> {
    let re = |x: f64| Complex64::new(x, 0.0);
    let (s12, c12) = angles.theta12.sin_cos();

    let (theta13, theta23) = match (angles.theta13, angles.theta23) {
        (Some(t13), Some(t23)) => (t13, t23),
        _ => {
            return DMatrix::from_row_slice(2, 2, &[re(c12), re(s12), re(-s12), re(c12)]);
        }
    };

    let (s13, c13) = theta13.sin_cos();
    let (s23, c23) = theta23.sin_cos();
    let eid = Complex64::from_polar(1.0, angles.deltacp);
    let emid = eid.conj();

    let canonical = [
        [re(c12 * c13), re(s12 * c13), emid * s13],
        [
            re(-s12 * c23) - eid * (c12 * s23 * s13),
            re(c12 * c23) - eid * (s12 * s23 * s13),
            re(s23 * c13),
        ],
        [
            re(s12 * s23) - eid * (c12 * c23 * s13),
            re(-c12 * s23) - eid * (s12 * c23 * s13),
            re(c23 * c13),
        ],
    ];

    let n = flavors.len();
    DMatrix::from_fn(n, n, |row, col| {
        let canonical_row = match flavors[row] {
            Flavor::E => 0,
            Flavor::Mu => 1,
            Flavor::Tau => 2,
        };
        canonical[canonical_row][col]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-12;

    #[test]
    fn test_round_trip_is_exact() {
        let mut p = OscillationParameters::unset(3);
        p.set_mixing_angles(0.5837, Some(0.1496), Some(0.8587), Some(3.4))
            .unwrap();
        p.set_mass_splittings(7.53e-5, Some(-2.45e-3)).unwrap();
        let angles = p.mixing_angles().unwrap();
        assert_eq!(angles.theta12.to_bits(), 0.5837f64.to_bits());
        assert_eq!(angles.theta13, Some(0.1496));
        assert_eq!(angles.theta23, Some(0.8587));
        assert_eq!(angles.deltacp, 3.4);
        let dm = p.mass_splittings().unwrap();
        assert_eq!(dm.dm21, 7.53e-5);
        assert_eq!(dm.dm31, Some(-2.45e-3));
    }

    #[test]
    fn test_getter_before_setter_fails() {
        let p = OscillationParameters::unset(2);
        assert_eq!(
            p.mixing_angles().unwrap_err(),
            OscError::ParametersNotSet("mixing angles")
        );
        assert!(p.mass_splittings().is_err());
    }

    #[test]
    fn test_argument_count_must_match_flavors() {
        let mut two = OscillationParameters::unset(2);
        assert!(two.set_mixing_angles(0.5, Some(0.1), None, None).is_err());
        assert!(two.set_mass_splittings(7.5e-5, Some(2.5e-3)).is_err());
        assert!(two.set_mixing_angles(0.5, None, None, Some(1.0)).is_err());
        assert!(two.set_mixing_angles(0.5, None, None, None).is_ok());

        let mut three = OscillationParameters::unset(3);
        assert!(three.set_mixing_angles(0.5, Some(0.1), None, None).is_err());
        assert!(three.set_mass_splittings(7.5e-5, None).is_err());
        assert!(three.mixing_angles().is_err(), "failed setter must not write");
    }

    #[test]
    fn test_pmns_is_unitary() {
        let p = OscillationParameters::nufit52_no();
        let u = p.pmns(&FlavorSystem::three_flavor()).unwrap();
        let prod = &u * u.adjoint();
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (prod[(i, j)] - Complex64::new(expected, 0.0)).norm() < EPSILON,
                    "U U^† [{}][{}] = {}",
                    i,
                    j,
                    prod[(i, j)]
                );
            }
        }
    }

    #[test]
    fn test_pmns_rows_follow_system_order() {
        let p = OscillationParameters::nufit52_no();
        let canonical = p.pmns(&FlavorSystem::three_flavor()).unwrap();
        let permuted = p
            .pmns(&FlavorSystem::new(&[Flavor::Tau, Flavor::E, Flavor::Mu]).unwrap())
            .unwrap();
        assert_eq!(permuted.row(0), canonical.row(2));
        assert_eq!(permuted.row(1), canonical.row(0));
    }

    #[test]
    fn test_nufit_matches_sin_squared_inputs() {
        let angles = *OscillationParameters::nufit52_no().mixing_angles().unwrap();
        let s12sq = angles.theta12.sin().powi(2);
        assert!((s12sq - NUFIT52_NO_S12SQ).abs() < EPSILON);
    }
}
