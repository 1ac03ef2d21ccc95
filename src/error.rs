//! Error taxonomy for oscillation calculations.
//!
//! Every failure here is a caller, configuration or physics problem, never a
//! transient one, so nothing in the crate retries.

use std::fmt;

/// A physical-validity check on the decoherence (damping) matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// Matrix is not N²×N² for the flavor count in use.
    Shape,
    /// Imaginary part above the numerical-noise floor.
    Reality,
    /// A diagonal rate is negative.
    Negativity { index: usize },
    /// `D[row][col] != D[col][row]`.
    Symmetry { row: usize, col: usize },
    /// One of the eight SU(3) linear bounds a1..a8 (1-based).
    Linear(u8),
    /// `4 β_ij² <= (γ_k - γ8/3)² - (γ_i - γ_j)²` for the off-diagonal pair (i, j).
    Quadratic { i: usize, j: usize },
    /// Bound of the β38 coupling against `a3 · a8`.
    Beta38Coupling,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shape => write!(f, "shape"),
            Self::Reality => write!(f, "reality"),
            Self::Negativity { index } => write!(f, "non-negativity of D[{index}][{index}]"),
            Self::Symmetry { row, col } => write!(f, "symmetry of D[{row}][{col}]"),
            Self::Linear(k) => write!(f, "inequality a{k} >= 0"),
            Self::Quadratic { i, j } => write!(f, "quadratic bound on beta{i}{j}"),
            Self::Beta38Coupling => write!(f, "beta38 coupling bound against a3*a8"),
        }
    }
}

/// Errors produced while configuring a calculator or computing probabilities.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OscError {
    /// Malformed, missing or mutually exclusive parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The selected backend cannot express the requested feature.
    #[error("backend `{backend}` does not support {feature}")]
    UnsupportedByBackend {
        backend: &'static str,
        feature: String,
    },

    /// The decoherence matrix violates a positivity constraint.
    #[error("physically invalid decoherence matrix: {constraint} violated (value {value:.6e})")]
    PhysicallyInvalidDecoherenceMatrix { constraint: Constraint, value: f64 },

    /// Matter layers end before the requested path length.
    #[error("matter layers end at {final_endpoint_km} km but the path is {requested_km} km long")]
    IncompleteLayerCoverage {
        final_endpoint_km: f64,
        requested_km: f64,
    },

    /// A computed probability is NaN or infinite.
    #[error("non-finite probability at energy {energy_index}, distance {distance_index}, flavor {flavor_index}")]
    NonFiniteResult {
        energy_index: usize,
        distance_index: usize,
        flavor_index: usize,
    },

    /// Probabilities summed over final flavor drifted from the initial norm.
    #[error("probability not conserved at energy {energy_index}, distance {distance_index}: sum = {sum}")]
    ProbabilityNotConserved {
        energy_index: usize,
        distance_index: usize,
        sum: f64,
    },

    /// A getter was called before the matching setter.
    #[error("{0} have not been set")]
    ParametersNotSet(&'static str),
}

impl OscError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub(crate) fn unsupported(backend: &'static str, feature: impl Into<String>) -> Self {
        Self::UnsupportedByBackend {
            backend,
            feature: feature.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OscError>;
