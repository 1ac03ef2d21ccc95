//! Analytic backend: closed-form probabilities for a single medium.
//!
//! There are no amplitudes to carry between segments, so chained segments
//! must share one medium; their lengths simply add up.

use super::{check_weights, loaded, EnergyFlavorProbabilities, PropagationBackend, Segment};
use crate::analytic::{probability_matter, transition_two_flavor, ThreeFlavorInputs};
use crate::config::{AnalyticOptions, ModelConfig};
use crate::error::{OscError, Result};
use crate::flavor::{Flavor, FlavorSystem};
use crate::matter::{MatterModel, Medium};

#[derive(Debug, Clone)]
pub struct AnalyticBackend {
    system: FlavorSystem,
    options: AnalyticOptions,
    model: Option<ModelConfig>,
}

impl AnalyticBackend {
    pub fn new(system: FlavorSystem, options: AnalyticOptions) -> Self {
        Self {
            system,
            options,
            model: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyticState {
    weights: Vec<f64>,
    energies_gev: Vec<f64>,
    nubar: bool,
    traveled_km: f64,
    medium: Option<Medium>,
}

fn canonical_index(flavor: Flavor) -> usize {
    match flavor {
        Flavor::E => 0,
        Flavor::Mu => 1,
        Flavor::Tau => 2,
    }
}

impl super::sealed::Sealed for AnalyticBackend {
    fn store(&mut self, model: ModelConfig) {
        self.model = Some(model);
    }
}

impl PropagationBackend for AnalyticBackend {
    type State = AnalyticState;

    fn name(&self) -> &'static str {
        "analytic"
    }

    fn system(&self) -> &FlavorSystem {
        &self.system
    }

    fn check_matter(&self, matter: &MatterModel) -> Result<()> {
        match matter {
            MatterModel::Vacuum | MatterModel::Uniform { .. } => Ok(()),
            other => Err(OscError::unsupported(
                self.name(),
                format!("`{}` matter", other.name()),
            )),
        }
    }

    fn model(&self) -> Option<&ModelConfig> {
        self.model.as_ref()
    }

    fn prepare(&self, weights: &[f64], energies_gev: &[f64], nubar: bool) -> Result<AnalyticState> {
        let model = loaded(self.model(), self.name())?;
        check_weights(weights, &self.system)?;
        model.parameters.require()?;
        Ok(AnalyticState {
            weights: weights.to_vec(),
            energies_gev: energies_gev.to_vec(),
            nubar,
            traveled_km: 0.0,
            medium: None,
        })
    }

    fn evolve(&self, state: &mut AnalyticState, segment: &Segment) -> Result<()> {
        if state.medium.is_some_and(|m| m != segment.medium) {
            return Err(OscError::unsupported(
                self.name(),
                "propagation through more than one medium",
            ));
        }
        state.medium = Some(segment.medium);
        state.traveled_km += segment.length_km;
        Ok(())
    }

    fn evaluate(&self, state: &AnalyticState) -> Result<EnergyFlavorProbabilities> {
        let model = loaded(self.model(), self.name())?;
        let (angles, splittings) = model.parameters.require()?;
        let medium = state.medium.unwrap_or(Medium::Vacuum);
        let sign = if state.nubar { -1.0 } else { 1.0 };
        let n = self.system.len();
        let length = state.traveled_km;

        let mut out = Vec::with_capacity(state.energies_gev.len());
        for &energy in &state.energies_gev {
            let potential = sign * medium.reduced_potential(energy);
            // transition[α][β] in system order
            let transition: Vec<Vec<f64>> = if n == 3 {
                let inputs = ThreeFlavorInputs::from_parameters(angles, splittings, state.nubar)
                    .ok_or_else(|| OscError::invalid("three-flavor parameters are incomplete"))?;
                let probs = probability_matter(
                    &inputs,
                    length,
                    energy,
                    potential,
                    self.options.newton_iterations,
                );
                let flavors = self.system.flavors();
                flavors
                    .iter()
                    .map(|&a| {
                        flavors
                            .iter()
                            .map(|&b| probs[canonical_index(a)][canonical_index(b)])
                            .collect()
                    })
                    .collect()
            } else {
                let a_diff = match self.system.electron_index() {
                    Some(0) => potential,
                    Some(_) => -potential,
                    None => 0.0,
                };
                let p = transition_two_flavor(
                    angles.theta12,
                    splittings.dm21,
                    length,
                    energy,
                    a_diff,
                );
                vec![vec![1.0 - p, p], vec![p, 1.0 - p]]
            };

            out.push(
                (0..n)
                    .map(|beta| {
                        state
                            .weights
                            .iter()
                            .zip(&transition)
                            .map(|(w, row)| w * row[beta])
                            .sum::<f64>()
                    })
                    .collect(),
            );
        }
        Ok(out)
    }
}
