//! Decoherence (damping) matrices and their physical-validity checks.
//!
//! A damping matrix `D` acts on the SU(N) coefficient vector of the density
//! matrix, `dr/dt = ... - D·r`, with row/column 0 belonging to the identity
//! component. For three flavors the diagonal entries are the γ1..γ8 rates and
//! the off-diagonal entries the β couplings. Complete positivity of the
//! generated map constrains them; the checks here follow the SU(3) analysis of
//! arXiv:1811.04982 (appendix B) and refuse, never clamp, offending matrices.

use nalgebra::DMatrix;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{Constraint, OscError, Result};

/// Largest total imaginary part still treated as numerical noise.
pub const IMAGINARY_NOISE_FLOOR: f64 = 1e-12;

/// Tolerance for the `D[i][j] == D[j][i]` pairing.
const SYMMETRY_TOLERANCE: f64 = 1e-12;

/// A real N²×N² damping matrix in eV, expressed in the mass-basis SU(N) basis.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoherenceMatrix(DMatrix<f64>);

impl DecoherenceMatrix {
    pub fn new(matrix: DMatrix<f64>) -> Self {
        Self(matrix)
    }

    pub fn zeros(num_flavors: usize) -> Self {
        let dim = num_flavors * num_flavors;
        Self(DMatrix::zeros(dim, dim))
    }

    pub fn from_diagonal(diagonal: &[f64]) -> Self {
        Self(DMatrix::from_diagonal(&nalgebra::DVector::from_column_slice(
            diagonal,
        )))
    }

    /// Accept a complex matrix whose imaginary part is numerical noise.
    pub fn from_complex(matrix: &DMatrix<Complex64>) -> Result<Self> {
        let imaginary: f64 = matrix.iter().map(|z| z.im.abs()).sum();
        if imaginary > IMAGINARY_NOISE_FLOOR {
            return Err(OscError::PhysicallyInvalidDecoherenceMatrix {
                constraint: Constraint::Reality,
                value: imaginary,
            });
        }
        Ok(Self(matrix.map(|z| z.re)))
    }

    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.0
    }

    pub fn dim(&self) -> usize {
        self.0.nrows()
    }

    pub fn scaled(&self, factor: f64) -> DMatrix<f64> {
        &self.0 * factor
    }
}

/// Whether the validator actually checked a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Checked,
    /// No inequality set is known for this dimension.
    Unchecked,
}

fn violation(constraint: Constraint, value: f64) -> OscError {
    OscError::PhysicallyInvalidDecoherenceMatrix { constraint, value }
}

/// Validate `matrix` as the damping matrix of a `num_flavors` system.
///
/// Two flavors get the reality and non-negativity checks only. Three flavors
/// get the full sequence: shape, reality, non-negative diagonal, symmetric
/// pairing, the linear bounds a1..a8, the three quadratic β bounds and the
/// β38 coupling bound, stopping at the first violation.
pub fn validate(matrix: &DecoherenceMatrix, num_flavors: usize) -> Result<ValidationOutcome> {
    let d = matrix.as_matrix();
    match num_flavors {
        2 | 3 => {}
        n => {
            tracing::warn!(
                num_flavors = n,
                "no decoherence matrix constraints implemented for this flavor count; matrix NOT validated"
            );
            return Ok(ValidationOutcome::Unchecked);
        }
    }

    let dim = num_flavors * num_flavors;
    if d.nrows() != dim || d.ncols() != dim {
        return Err(violation(Constraint::Shape, d.nrows() as f64));
    }
    if let Some(bad) = d.iter().find(|v| !v.is_finite()) {
        return Err(OscError::invalid(format!(
            "decoherence matrix entries must be finite, found {bad}"
        )));
    }
    for index in 0..dim {
        if d[(index, index)] < 0.0 {
            return Err(violation(Constraint::Negativity { index }, d[(index, index)]));
        }
    }
    if num_flavors == 2 {
        return Ok(ValidationOutcome::Checked);
    }

    for row in 1..dim {
        for col in (row + 1)..dim {
            let diff = d[(row, col)] - d[(col, row)];
            if diff.abs() > SYMMETRY_TOLERANCE {
                return Err(violation(Constraint::Symmetry { row, col }, diff));
            }
        }
    }

    check_su3_inequalities(d)?;
    Ok(ValidationOutcome::Checked)
}

fn check_su3_inequalities(d: &DMatrix<f64>) -> Result<()> {
    let g = |k: usize| d[(k, k)];
    let b = |i: usize, j: usize| d[(i, j)];
    let sqrt3 = 3f64.sqrt();

    let (g1, g2, g3, g4, g5, g6, g7, g8) = (g(1), g(2), g(3), g(4), g(5), g(6), g(7), g(8));
    let b38 = b(3, 8);

    let a = [
        -g1 + g2 + g3 - g8 / 3.0,
        g1 - g2 + g3 - g8 / 3.0,
        g1 + g2 - g3 - g8 / 3.0,
        -g4 + g5 + g3 + 2.0 * g8 / 3.0 - 2.0 * b38 / sqrt3,
        g4 - g5 + g3 + 2.0 * g8 / 3.0 - 2.0 * b38 / sqrt3,
        -g6 + g7 + g3 + 2.0 * g8 / 3.0 + 2.0 * b38 / sqrt3,
        g6 - g7 + g3 + 2.0 * g8 / 3.0 + 2.0 * b38 / sqrt3,
        -(g1 + g2 + g3) / 3.0 + 2.0 * (g4 + g5 + g6 + g7) / 3.0 - g8,
    ];
    for (k, &value) in a.iter().enumerate() {
        if value < 0.0 {
            return Err(violation(Constraint::Linear(k as u8 + 1), value));
        }
    }

    // (i, j, the γ paired with γ8 on the right-hand side, the γ pair differenced)
    let quadratic = [
        (1, 2, g3, g1 - g2),
        (1, 3, g2, g1 - g3),
        (2, 3, g1, g2 - g3),
    ];
    for (i, j, gk, gdiff) in quadratic {
        let bound = (gk - g8 / 3.0).powi(2) - gdiff.powi(2);
        let lhs = 4.0 * b(i, j).powi(2);
        if lhs > bound {
            return Err(violation(Constraint::Quadratic { i, j }, lhs - bound));
        }
    }

    let coupling = (4.0 * b38 * b38 + (g4 + g5 - g6 - g7) / sqrt3).powi(2);
    let bound = a[2] * a[7];
    if coupling > bound {
        return Err(violation(Constraint::Beta38Coupling, coupling - bound));
    }
    Ok(())
}

/// Named ν–VBH interaction models, each scaled by a single rate Γ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedModel {
    /// Phase perturbation: only the mass-basis coherences are damped.
    RandomizePhase,
    /// State selection: every non-identity component relaxes.
    RandomizeState,
    /// Loss: the identity component decays too, so the norm is not kept.
    NeutrinoLoss,
}

impl NamedModel {
    pub fn matrix(self, num_flavors: usize, gamma_ev: f64) -> Result<DecoherenceMatrix> {
        let pattern: Vec<f64> = match (self, num_flavors) {
            // coherences live on the off-diagonal generators: λ1,λ2 for SU(2);
            // λ1,λ2,λ4..λ7 for SU(3)
            (NamedModel::RandomizePhase, 2) => vec![0.0, 1.0, 1.0, 0.0],
            (NamedModel::RandomizePhase, 3) => {
                vec![0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0]
            }
            (NamedModel::RandomizeState, 2 | 3) => {
                let mut diag = vec![1.0; num_flavors * num_flavors];
                diag[0] = 0.0;
                diag
            }
            (NamedModel::NeutrinoLoss, 2 | 3) => vec![1.0; num_flavors * num_flavors],
            (_, n) => {
                return Err(OscError::invalid(format!(
                    "named decoherence models need 2 or 3 flavors, got {n}"
                )))
            }
        };
        if !(gamma_ev.is_finite() && gamma_ev >= 0.0) {
            return Err(OscError::invalid("decoherence rate must be finite and >= 0"));
        }
        let scaled: Vec<f64> = pattern.into_iter().map(|p| p * gamma_ev).collect();
        Ok(DecoherenceMatrix::from_diagonal(&scaled))
    }

    /// Whether the model keeps `Σ P = 1`.
    pub fn preserves_norm(self) -> bool {
        !matches!(self, NamedModel::NeutrinoLoss)
    }
}

/// A validated damping matrix with its energy dependence
/// `D(E) = D0 · (E / E0)^n`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoherenceModel {
    matrix: DecoherenceMatrix,
    pub n: f64,
    pub e0_ev: f64,
}

impl DecoherenceModel {
    /// Validate and wrap. Fails if the matrix is physically invalid or
    /// `e0_ev` is not a positive energy.
    pub fn new(
        matrix: DecoherenceMatrix,
        n: f64,
        e0_ev: f64,
        num_flavors: usize,
    ) -> Result<Self> {
        if !(e0_ev.is_finite() && e0_ev > 0.0) {
            return Err(OscError::invalid(format!(
                "reference energy must be > 0 eV, got {e0_ev}"
            )));
        }
        if !n.is_finite() {
            return Err(OscError::invalid("energy-dependence exponent must be finite"));
        }
        validate(&matrix, num_flavors)?;
        Ok(Self { matrix, n, e0_ev })
    }

    pub fn named(
        model: NamedModel,
        gamma0_ev: f64,
        n: f64,
        e0_ev: f64,
        num_flavors: usize,
    ) -> Result<Self> {
        Self::new(model.matrix(num_flavors, gamma0_ev)?, n, e0_ev, num_flavors)
    }

    pub fn matrix(&self) -> &DecoherenceMatrix {
        &self.matrix
    }

    /// Damping matrix in eV at `energy_ev`.
    pub fn at_energy(&self, energy_ev: f64) -> DMatrix<f64> {
        self.matrix.scaled((energy_ev / self.e0_ev).powf(self.n))
    }

    /// True when the identity component is undamped, so `Σ P` stays 1.
    pub fn preserves_norm(&self) -> bool {
        let d = self.matrix.as_matrix();
        (0..d.ncols()).all(|k| d[(0, k)] == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn three_flavor_diag(g: [f64; 8]) -> DecoherenceMatrix {
        let mut diag = vec![0.0];
        diag.extend_from_slice(&g);
        DecoherenceMatrix::from_diagonal(&diag)
    }

    #[test]
    fn test_all_zeros_is_valid() {
        for n in [2, 3] {
            assert_eq!(
                validate(&DecoherenceMatrix::zeros(n), n).unwrap(),
                ValidationOutcome::Checked
            );
        }
    }

    #[test]
    fn test_single_negative_diagonal_is_rejected() {
        let mut d = DMatrix::zeros(9, 9);
        d[(5, 5)] = -1e-3;
        let err = validate(&DecoherenceMatrix::new(d), 3).unwrap_err();
        assert_eq!(
            err,
            OscError::PhysicallyInvalidDecoherenceMatrix {
                constraint: Constraint::Negativity { index: 5 },
                value: -1e-3
            }
        );
    }

    #[test]
    fn test_two_flavor_negative_diagonal_is_rejected() {
        let d = DecoherenceMatrix::from_diagonal(&[0.0, 1.0, -1.0, 0.0]);
        assert!(validate(&d, 2).is_err());
    }

    #[test]
    fn test_wrong_shape() {
        let err = validate(&DecoherenceMatrix::zeros(2), 3).unwrap_err();
        assert!(matches!(
            err,
            OscError::PhysicallyInvalidDecoherenceMatrix {
                constraint: Constraint::Shape,
                ..
            }
        ));
    }

    #[test]
    fn test_non_finite_entry_is_invalid_configuration() {
        for bad in [f64::NAN, f64::INFINITY] {
            let mut d = three_flavor_diag([1.0; 8]).as_matrix().clone();
            d[(4, 4)] = bad;
            assert!(matches!(
                validate(&DecoherenceMatrix::new(d), 3),
                Err(OscError::InvalidConfiguration(_))
            ));
        }
        let mut d = DMatrix::zeros(4, 4);
        d[(1, 1)] = f64::NAN;
        assert!(matches!(
            validate(&DecoherenceMatrix::new(d), 2),
            Err(OscError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_asymmetric_pair_is_rejected() {
        let mut d = three_flavor_diag([1.0; 8]).as_matrix().clone();
        d[(1, 2)] = 0.1;
        let err = validate(&DecoherenceMatrix::new(d), 3).unwrap_err();
        assert!(matches!(
            err,
            OscError::PhysicallyInvalidDecoherenceMatrix {
                constraint: Constraint::Symmetry { row: 1, col: 2 },
                ..
            }
        ));
    }

    #[test]
    fn test_linear_inequality_names_violation() {
        // γ1 large against γ2, γ3: a1 = -γ1 + γ2 + γ3 - γ8/3 < 0
        let d = three_flavor_diag([5.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0]);
        let err = validate(&d, 3).unwrap_err();
        assert!(matches!(
            err,
            OscError::PhysicallyInvalidDecoherenceMatrix {
                constraint: Constraint::Linear(1),
                ..
            }
        ));
        assert!(err.to_string().contains("a1"));
    }

    #[test]
    fn test_quadratic_bound() {
        let mut d = three_flavor_diag([1.0; 8]).as_matrix().clone();
        // (γ3 - γ8/3)² - (γ1 - γ2)² = 4/9, so β12 = 0.5 breaks it
        d[(1, 2)] = 0.5;
        d[(2, 1)] = 0.5;
        let err = validate(&DecoherenceMatrix::new(d), 3).unwrap_err();
        assert!(matches!(
            err,
            OscError::PhysicallyInvalidDecoherenceMatrix {
                constraint: Constraint::Quadratic { i: 1, j: 2 },
                ..
            }
        ));
    }

    #[test]
    fn test_beta38_coupling_bound() {
        let mut d = three_flavor_diag([1.0; 8]).as_matrix().clone();
        // small enough for a4..a7, large enough for the coupling bound
        d[(3, 8)] = 0.5;
        d[(8, 3)] = 0.5;
        let err = validate(&DecoherenceMatrix::new(d), 3).unwrap_err();
        assert!(matches!(
            err,
            OscError::PhysicallyInvalidDecoherenceMatrix {
                constraint: Constraint::Beta38Coupling,
                ..
            }
        ));
    }

    #[test]
    fn test_unsupported_dimension_is_unchecked() {
        let d = DecoherenceMatrix::zeros(4);
        assert_eq!(validate(&d, 4).unwrap(), ValidationOutcome::Unchecked);
    }

    #[test]
    fn test_complex_input_reality() {
        let mut m = DMatrix::from_element(4, 4, Complex64::new(0.0, 0.0));
        m[(1, 1)] = Complex64::new(1.0, 1e-15);
        assert!(DecoherenceMatrix::from_complex(&m).is_ok());
        m[(2, 2)] = Complex64::new(1.0, 1e-3);
        assert!(DecoherenceMatrix::from_complex(&m).is_err());
    }

    #[test]
    fn test_named_models_are_valid() {
        for model in [
            NamedModel::RandomizePhase,
            NamedModel::RandomizeState,
            NamedModel::NeutrinoLoss,
        ] {
            for n in [2, 3] {
                let m = DecoherenceModel::named(model, 1e-23, 0.0, 1e9, n).unwrap();
                assert_eq!(m.preserves_norm(), model.preserves_norm());
            }
        }
    }

    #[test]
    fn test_energy_scaling() {
        let m = DecoherenceModel::named(NamedModel::RandomizeState, 2e-24, 2.0, 1e9, 3).unwrap();
        let d = m.at_energy(1e10);
        assert!((d[(1, 1)] - 2e-22).abs() < 1e-36);
        assert!(DecoherenceModel::named(NamedModel::RandomizeState, 1e-24, 2.0, 0.0, 3).is_err());
    }

    proptest! {
        #[test]
        fn prop_uniform_diagonal_is_valid(gamma in 0.0f64..1e-20) {
            let d = three_flavor_diag([gamma; 8]);
            prop_assert_eq!(validate(&d, 3).unwrap(), ValidationOutcome::Checked);
        }

        #[test]
        fn prop_any_negative_rate_is_rejected(index in 1usize..9, rate in -1.0f64..-1e-9) {
            let mut g = [1.0; 8];
            g[index - 1] = rate;
            let is_rejected = validate(&three_flavor_diag(g), 3).is_err();
            prop_assert!(is_rejected);
        }
    }
}
