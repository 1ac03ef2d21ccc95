//! Propagation backends.
//!
//! Every backend exposes the same operation set: accept a model snapshot
//! (refusing what it cannot express), prepare a state for a set of energies,
//! evolve that state across one homogeneous segment at a time, and evaluate
//! per-flavor probabilities. The state lives outside the backend, in a value
//! owned by the caller, so chaining segments is explicit.

mod analytic;
mod density;
mod grid;

pub use analytic::{AnalyticBackend, AnalyticState};
pub use density::{DensityMatrixBackend, DensityState};
pub use grid::{GridBackend, GridState};

use crate::config::{BackendKind, CalculatorConfig, ModelConfig};
use crate::decoherence::DecoherenceModel;
use crate::error::{OscError, Result};
use crate::flavor::FlavorSystem;
use crate::matter::{MatterModel, Medium};
use crate::sme::SmeModel;

/// One contiguous homogeneous stretch of the path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub length_km: f64,
    pub medium: Medium,
}

/// Per-energy, per-final-flavor probabilities: `probs[energy][flavor]`.
pub type EnergyFlavorProbabilities = Vec<Vec<f64>>;

mod sealed {
    use crate::config::ModelConfig;

    pub trait Sealed {
        fn store(&mut self, model: ModelConfig);
    }
}

/// The closed set of propagation engines.
pub trait PropagationBackend: sealed::Sealed {
    /// Backend-owned propagation state carried between segments.
    type State;

    fn name(&self) -> &'static str;

    fn system(&self) -> &FlavorSystem;

    fn check_matter(&self, matter: &MatterModel) -> Result<()>;

    fn check_decoherence(&self, _model: &DecoherenceModel) -> Result<()> {
        Err(OscError::unsupported(self.name(), "decoherence"))
    }

    fn check_sme(&self, _model: &SmeModel) -> Result<()> {
        Err(OscError::unsupported(self.name(), "SME"))
    }

    /// Loaded snapshot, if any.
    fn model(&self) -> Option<&ModelConfig>;

    /// Accept `model` or leave the backend untouched. Re-applying the
    /// loaded version is a no-op.
    fn configure(&mut self, model: &ModelConfig) -> Result<()> {
        if self.model().is_some_and(|m| m.version == model.version && m == model) {
            return Ok(());
        }
        self.check_matter(&model.matter)?;
        if let Some(decoherence) = &model.decoherence {
            self.check_decoherence(decoherence)?;
        }
        if let Some(sme) = &model.sme {
            self.check_sme(sme)?;
        }
        tracing::debug!(backend = self.name(), version = model.version, "model configured");
        self.store(model.clone());
        Ok(())
    }

    /// Fresh state: an incoherent mixture of flavors with `weights`
    /// (one entry per flavor of the system) at every energy.
    fn prepare(&self, weights: &[f64], energies_gev: &[f64], nubar: bool) -> Result<Self::State>;

    /// Advance `state` across one segment. `segment.length_km` must be > 0.
    fn evolve(&self, state: &mut Self::State, segment: &Segment) -> Result<()>;

    fn evaluate(&self, state: &Self::State) -> Result<EnergyFlavorProbabilities>;

    /// One unit of work: a single segment, then the probabilities after it.
    fn evolve_and_evaluate(
        &self,
        state: &mut Self::State,
        segment: &Segment,
    ) -> Result<EnergyFlavorProbabilities> {
        self.evolve(state, segment)?;
        self.evaluate(state)
    }
}

fn loaded<'a>(model: Option<&'a ModelConfig>, backend: &'static str) -> Result<&'a ModelConfig> {
    model.ok_or_else(|| OscError::invalid(format!("backend `{backend}` has no model loaded")))
}

/// A backend chosen at run time.
#[derive(Debug, Clone)]
pub enum BackendAdapter {
    Grid(GridBackend),
    DensityMatrix(DensityMatrixBackend),
    Analytic(AnalyticBackend),
}

impl BackendAdapter {
    pub fn new(config: &CalculatorConfig) -> Result<Self> {
        let system = config.flavor_system()?;
        Ok(match config.backend {
            BackendKind::Grid => Self::Grid(GridBackend::new(system, config.grid.clone())),
            BackendKind::DensityMatrix => Self::DensityMatrix(DensityMatrixBackend::new(system)),
            BackendKind::Analytic => Self::Analytic(AnalyticBackend::new(system, config.analytic)),
        })
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Grid(_) => BackendKind::Grid,
            Self::DensityMatrix(_) => BackendKind::DensityMatrix,
            Self::Analytic(_) => BackendKind::Analytic,
        }
    }

    pub fn configure(&mut self, model: &ModelConfig) -> Result<()> {
        match self {
            Self::Grid(b) => b.configure(model),
            Self::DensityMatrix(b) => b.configure(model),
            Self::Analytic(b) => b.configure(model),
        }
    }
}

pub(crate) fn check_weights(weights: &[f64], system: &FlavorSystem) -> Result<()> {
    if weights.len() != system.len() {
        return Err(OscError::invalid(format!(
            "initial state has {} entries for a {}-flavor system",
            weights.len(),
            system.len()
        )));
    }
    Ok(())
}
