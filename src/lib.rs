//! # nuosc
//!
//! Neutrino oscillation probabilities in vacuum, matter, and beyond the
//! Standard Model, behind one calculator API with interchangeable
//! propagation backends.
//!
//! ## Features
//!
//! - **Two or three flavors**: any ordered subset of e, μ, τ
//! - **Matter effects (MSW)**: constant density, user layers, the four-shell
//!   Earth model or a custom radial profile for atmospheric tracks
//! - **Decoherence**: open-system damping with an energy power law, checked
//!   against the complete-positivity inequalities for three flavors
//! - **SME**: isotropic and sidereal Lorentz/CPT-violating Hamiltonian terms
//! - **Backends**:
//!   - **grid**: amplitude evolution on energy nodes with log-energy interpolation
//!   - **density_matrix**: SU(N) coherence vector, the only backend with decoherence
//!   - **analytic**: NuFast closed-form probabilities in a single medium
//!
//! ## Quick Start
//!
//! ```rust
//! use nuosc::{BackendKind, CalculatorConfig, Flavor, MatterModel, OscCalculator, PropagationRequest};
//!
//! let mut calc = OscCalculator::new(CalculatorConfig::new(BackendKind::Grid)).unwrap();
//! calc.set_matter(MatterModel::uniform(2.848, 0.5)).unwrap();
//!
//! let request = PropagationRequest::new(2.5, Flavor::Mu).distance_km(1300.0);
//! let probs = calc.calc_osc_prob(&request).unwrap();
//!
//! // P(νμ → νe), P(νμ → νμ), P(νμ → ντ)
//! let total: f64 = probs.iter().sum();
//! assert!((total - 1.0).abs() < 1e-6);
//! ```
//!
//! Results are shaped `[energy][distance][flavor]`, with a singleton energy
//! or distance axis dropped.

pub mod analytic;
pub mod backend;
pub mod calculator;
pub mod config;
pub mod decoherence;
pub mod error;
pub mod flavor;
pub mod geometry;
pub mod hamiltonian;
pub mod matter;
pub mod params;
pub mod sequencer;
pub mod sme;

pub use backend::{BackendAdapter, PropagationBackend, Segment};
pub use calculator::{Grid, InitialState, OscCalculator, PropagationRequest};
pub use config::{AnalyticOptions, BackendKind, CalculatorConfig, DetectorSite, GridOptions, ModelConfig};
pub use decoherence::{DecoherenceMatrix, DecoherenceModel, NamedModel, ValidationOutcome};
pub use error::{Constraint, OscError, Result};
pub use flavor::{Flavor, FlavorSystem};
pub use geometry::AtmosphereGeometry;
pub use matter::{MatterLayer, MatterModel, Medium, RadialProfile};
pub use params::{MassSplittings, MixingAngles, OscillationParameters};
pub use sme::{SmeBasis, SmeModel};

/// Conversion factor: eV² × km → GeV (divided by 4)
///
/// This combines ħc and unit conversions for the oscillation phase:
/// Δ = Δm² × L / (4E) in natural units
pub const EV_SQ_KM_TO_GEV_OVER4: f64 = 1e-9 / 1.97327e-7 * 1e3 / 4.0;

/// Matter potential conversion factor: Y_e × ρ × E → A
///
/// A = 2√2 G_F N_e E where N_e = Y_e × ρ × N_A / m_nucleon.
/// Approximately 1.52 × 10⁻⁴ eV² / (g/cm³ × GeV).
pub const YE_RHO_E_TO_A: f64 = 1.52e-4;

/// Mean Earth radius in km.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

pub const GEV_TO_EV: f64 = 1e9;

/// One km in natural units (1/eV), from ħc = 1.97327e-7 eV·m.
pub const KM_TO_INV_EV: f64 = 1e3 / 1.97327e-7;
