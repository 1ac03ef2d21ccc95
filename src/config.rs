//! Calculator options and the versioned physics-model snapshot.

use serde::{Deserialize, Serialize};

use crate::decoherence::DecoherenceModel;
use crate::error::{OscError, Result};
use crate::flavor::{Flavor, FlavorSystem};
use crate::geometry::AtmosphereGeometry;
use crate::matter::MatterModel;
use crate::params::OscillationParameters;
use crate::sme::SmeModel;

/// Which propagation engine a calculator drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Pure-state amplitudes evolved on an energy grid.
    Grid,
    /// SU(N) density-matrix evolution, with damping.
    DensityMatrix,
    /// Closed-form probabilities.
    Analytic,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Grid => "grid",
            BackendKind::DensityMatrix => "density_matrix",
            BackendKind::Analytic => "analytic",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridOptions {
    /// Evolve only on these energies (GeV) and interpolate in log-energy;
    /// `None` evolves every requested energy exactly.
    pub energy_nodes_gev: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticOptions {
    /// Newton refinements of the DMP eigenvalue (0 is plain DMP).
    pub newton_iterations: u8,
}

impl Default for AnalyticOptions {
    fn default() -> Self {
        Self {
            newton_iterations: 2,
        }
    }
}

/// Known detector locations; only their depth enters the track geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorSite {
    IceCube,
    Dune,
    Arca,
    Equator,
}

impl DetectorSite {
    pub fn depth_km(self) -> f64 {
        match self {
            DetectorSite::IceCube => 1.4,
            DetectorSite::Dune => 1.5,
            DetectorSite::Arca => 1.5,
            DetectorSite::Equator => 0.0,
        }
    }
}

/// Construction-time options; fixed for a calculator's lifetime except for
/// the atmosphere geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculatorConfig {
    pub backend: BackendKind,
    pub atmospheric: bool,
    /// Ordered flavors; defaults to e, μ, τ (or e, μ for two flavors).
    pub flavors: Option<Vec<Flavor>>,
    pub num_flavors: Option<usize>,
    pub atmosphere: AtmosphereGeometry,
    pub grid: GridOptions,
    pub analytic: AnalyticOptions,
    /// Allowed `|Σ P - Σ w|` when the calculation must conserve probability.
    pub unitarity_tolerance: f64,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Grid,
            atmospheric: false,
            flavors: None,
            num_flavors: None,
            atmosphere: AtmosphereGeometry::default(),
            grid: GridOptions::default(),
            analytic: AnalyticOptions::default(),
            unitarity_tolerance: 1e-6,
        }
    }
}

impl CalculatorConfig {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    pub fn atmospheric(mut self, atmospheric: bool) -> Self {
        self.atmospheric = atmospheric;
        self
    }

    pub fn with_flavors(mut self, flavors: &[Flavor]) -> Self {
        self.flavors = Some(flavors.to_vec());
        self
    }

    pub fn with_num_flavors(mut self, n: usize) -> Self {
        self.num_flavors = Some(n);
        self
    }

    /// Resolve `flavors`/`num_flavors` into a flavor system.
    pub fn flavor_system(&self) -> Result<FlavorSystem> {
        match (&self.flavors, self.num_flavors) {
            (Some(flavors), Some(n)) if flavors.len() != n => Err(OscError::invalid(format!(
                "{} flavors listed but num_flavors is {n}",
                flavors.len()
            ))),
            (Some(flavors), _) => FlavorSystem::new(flavors),
            (None, Some(n)) => FlavorSystem::new(&Flavor::ALL[..n.min(Flavor::ALL.len())])
                .and_then(|sys| {
                    if sys.len() == n {
                        Ok(sys)
                    } else {
                        Err(OscError::invalid(format!("unsupported flavor count {n}")))
                    }
                }),
            (None, None) => Ok(FlavorSystem::three_flavor()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.flavor_system()?;
        self.atmosphere.validate()?;
        if !(self.unitarity_tolerance.is_finite() && self.unitarity_tolerance > 0.0) {
            return Err(OscError::invalid("unitarity tolerance must be > 0"));
        }
        if let Some(nodes) = &self.grid.energy_nodes_gev {
            if nodes.len() < 2 {
                return Err(OscError::invalid("grid energy nodes need at least two values"));
            }
            if nodes.iter().any(|e| !(e.is_finite() && *e > 0.0)) {
                return Err(OscError::invalid("grid energy nodes must be > 0"));
            }
            if nodes.windows(2).any(|w| w[1] <= w[0]) {
                return Err(OscError::invalid("grid energy nodes must be strictly ascending"));
            }
        }
        Ok(())
    }
}

/// Snapshot of every physics setting a calculation depends on.
///
/// Setters never mutate a snapshot in place: they derive a new one with a
/// higher `version`, so a snapshot handed to a calculation stays valid.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub version: u64,
    pub parameters: OscillationParameters,
    pub matter: MatterModel,
    pub decoherence: Option<DecoherenceModel>,
    pub sme: Option<SmeModel>,
}

impl ModelConfig {
    /// NuFit defaults for three flavors; unset parameters for two.
    pub fn initial(system: &FlavorSystem) -> Self {
        let parameters = if system.len() == 3 {
            OscillationParameters::nufit52_no()
        } else {
            OscillationParameters::unset(system.len())
        };
        Self {
            version: 0,
            parameters,
            matter: MatterModel::Vacuum,
            decoherence: None,
            sme: None,
        }
    }

    /// Apply `change` to a copy and bump the version.
    pub fn derive(&self, change: impl FnOnce(&mut ModelConfig) -> Result<()>) -> Result<Self> {
        let mut next = self.clone();
        change(&mut next)?;
        next.version = self.version + 1;
        Ok(next)
    }

    /// Whether `Σ P` must equal the initial norm. Damping that leaves the
    /// trace component untouched keeps the norm.
    pub fn conserves_probability(&self) -> bool {
        self.decoherence
            .as_ref()
            .map_or(true, DecoherenceModel::preserves_norm)
    }
}
