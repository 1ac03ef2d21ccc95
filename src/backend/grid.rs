//! Grid backend: flavor amplitudes evolved exactly on a set of energy nodes.

use nalgebra::DVector;
use num_complex::Complex64;

use super::{check_weights, loaded, EnergyFlavorProbabilities, PropagationBackend, Segment};
use crate::config::{GridOptions, ModelConfig};
use crate::error::{OscError, Result};
use crate::flavor::FlavorSystem;
use crate::hamiltonian::{evolution_operator, phase_per_ev2, HamiltonianModel};
use crate::matter::MatterModel;
use crate::sme::{SmeBasis, SmeModel};

#[derive(Debug, Clone)]
pub struct GridBackend {
    system: FlavorSystem,
    options: GridOptions,
    model: Option<ModelConfig>,
}

impl GridBackend {
    pub fn new(system: FlavorSystem, options: GridOptions) -> Self {
        Self {
            system,
            options,
            model: None,
        }
    }

    /// Node energies to evolve for the requested ones.
    fn nodes_for(&self, energies_gev: &[f64]) -> Result<(Vec<f64>, bool)> {
        let Some(nodes) = &self.options.energy_nodes_gev else {
            return Ok((energies_gev.to_vec(), false));
        };
        if nodes.len() < 2 {
            return Err(OscError::invalid("grid energy nodes need at least two values"));
        }
        let (lo, hi) = (nodes[0], nodes[nodes.len() - 1]);
        if let Some(&outside) = energies_gev.iter().find(|&&e| e < lo || e > hi) {
            tracing::warn!(
                energy_gev = outside,
                lo,
                hi,
                "requested energy outside the grid nodes"
            );
            return Err(OscError::invalid(format!(
                "energy {outside} GeV lies outside the grid nodes [{lo}, {hi}] GeV"
            )));
        }
        Ok((nodes.clone(), true))
    }
}

#[derive(Debug, Clone)]
pub struct GridState {
    hamiltonian: HamiltonianModel,
    energies_gev: Vec<f64>,
    nodes_gev: Vec<f64>,
    interpolate: bool,
    /// `(initial flavor weight, amplitude)` per node.
    amplitudes: Vec<Vec<(f64, DVector<Complex64>)>>,
}

impl super::sealed::Sealed for GridBackend {
    fn store(&mut self, model: ModelConfig) {
        self.model = Some(model);
    }
}

impl PropagationBackend for GridBackend {
    type State = GridState;

    fn name(&self) -> &'static str {
        "grid"
    }

    fn system(&self) -> &FlavorSystem {
        &self.system
    }

    fn check_matter(&self, _matter: &MatterModel) -> Result<()> {
        Ok(())
    }

    fn check_sme(&self, model: &SmeModel) -> Result<()> {
        if !model.is_directional() {
            return Err(OscError::unsupported(self.name(), "isotropic SME"));
        }
        if model.basis() != SmeBasis::Mass {
            return Err(OscError::unsupported(self.name(), "SME in the flavor basis"));
        }
        Ok(())
    }

    fn model(&self) -> Option<&ModelConfig> {
        self.model.as_ref()
    }

    fn prepare(&self, weights: &[f64], energies_gev: &[f64], nubar: bool) -> Result<GridState> {
        let model = loaded(self.model(), self.name())?;
        check_weights(weights, &self.system)?;
        let hamiltonian =
            HamiltonianModel::new(&model.parameters, &self.system, model.sme.as_ref(), nubar)?;
        let (nodes_gev, interpolate) = self.nodes_for(energies_gev)?;

        let n = self.system.len();
        let initial: Vec<(f64, DVector<Complex64>)> = weights
            .iter()
            .enumerate()
            .filter(|&(_, &w)| w > 0.0)
            .map(|(alpha, &w)| {
                let mut ket = DVector::from_element(n, Complex64::new(0.0, 0.0));
                ket[alpha] = Complex64::new(1.0, 0.0);
                (w, ket)
            })
            .collect();

        Ok(GridState {
            hamiltonian,
            energies_gev: energies_gev.to_vec(),
            amplitudes: vec![initial; nodes_gev.len()],
            nodes_gev,
            interpolate,
        })
    }

    fn evolve(&self, state: &mut GridState, segment: &Segment) -> Result<()> {
        for (&energy, amplitudes) in state.nodes_gev.iter().zip(state.amplitudes.iter_mut()) {
            let k = state.hamiltonian.reduced(energy, &segment.medium);
            let s = evolution_operator(&k, phase_per_ev2(segment.length_km, energy));
            for (_, psi) in amplitudes.iter_mut() {
                *psi = &s * &*psi;
            }
        }
        Ok(())
    }

    fn evaluate(&self, state: &GridState) -> Result<EnergyFlavorProbabilities> {
        let n = self.system.len();
        let at_nodes: Vec<Vec<f64>> = state
            .amplitudes
            .iter()
            .map(|amplitudes| {
                (0..n)
                    .map(|beta| {
                        amplitudes
                            .iter()
                            .map(|(w, psi)| w * psi[beta].norm_sqr())
                            .sum::<f64>()
                    })
                    .collect()
            })
            .collect();

        if !state.interpolate {
            return Ok(at_nodes);
        }
        Ok(state
            .energies_gev
            .iter()
            .map(|&e| interpolate_log_energy(&state.nodes_gev, &at_nodes, e))
            .collect())
    }
}

/// Linear interpolation in `ln E` between the bracketing nodes.
fn interpolate_log_energy(nodes: &[f64], values: &[Vec<f64>], energy: f64) -> Vec<f64> {
    let hi = nodes.partition_point(|&x| x < energy).clamp(1, nodes.len() - 1);
    let lo = hi - 1;
    let t = (energy.ln() - nodes[lo].ln()) / (nodes[hi].ln() - nodes[lo].ln());
    values[lo]
        .iter()
        .zip(&values[hi])
        .map(|(a, b)| a + t * (b - a))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytic::transition_two_flavor;
    use crate::flavor::Flavor;
    use crate::matter::Medium;
    use approx::assert_abs_diff_eq;

    fn two_flavor_backend(options: GridOptions) -> GridBackend {
        let system = FlavorSystem::new(&[Flavor::E, Flavor::Mu]).unwrap();
        let mut model = ModelConfig::initial(&system);
        model.parameters.set_mixing_angles(0.3, None, None, None).unwrap();
        model.parameters.set_mass_splittings(2.5e-3, None).unwrap();
        let mut backend = GridBackend::new(system, options);
        backend.configure(&model).unwrap();
        backend
    }

    #[test]
    fn test_matches_two_flavor_formula_in_matter() {
        let backend = two_flavor_backend(GridOptions::default());
        let medium = Medium::Constant {
            density: 3.0,
            electron_fraction: 0.5,
        };
        let energies = [0.5, 2.0, 8.0];
        let mut state = backend.prepare(&[1.0, 0.0], &energies, false).unwrap();
        let probs = backend
            .evolve_and_evaluate(
                &mut state,
                &Segment {
                    length_km: 1000.0,
                    medium,
                },
            )
            .unwrap();
        for (i, &e) in energies.iter().enumerate() {
            let expected =
                transition_two_flavor(0.3, 2.5e-3, 1000.0, e, medium.reduced_potential(e));
            assert_abs_diff_eq!(probs[i][1], expected, epsilon = 1e-9);
            assert_abs_diff_eq!(probs[i][0] + probs[i][1], 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_segments_compose() {
        let backend = two_flavor_backend(GridOptions::default());
        let seg = |length_km| Segment {
            length_km,
            medium: Medium::Vacuum,
        };
        let mut whole = backend.prepare(&[0.0, 1.0], &[1.0], true).unwrap();
        backend.evolve(&mut whole, &seg(700.0)).unwrap();
        let mut split = backend.prepare(&[0.0, 1.0], &[1.0], true).unwrap();
        backend.evolve(&mut split, &seg(300.0)).unwrap();
        backend.evolve(&mut split, &seg(400.0)).unwrap();
        let a = backend.evaluate(&whole).unwrap();
        let b = backend.evaluate(&split).unwrap();
        assert_abs_diff_eq!(a[0][0], b[0][0], epsilon = 1e-12);
    }

    #[test]
    fn test_energy_nodes_interpolate_and_bound() {
        let backend = two_flavor_backend(GridOptions {
            energy_nodes_gev: Some(vec![1.0, 10.0, 100.0]),
        });
        assert!(backend.prepare(&[1.0, 0.0], &[0.5], false).is_err());
        let state = backend.prepare(&[1.0, 0.0], &[1.0, 10.0, 30.0], false).unwrap();
        let probs = backend.evaluate(&state).unwrap();
        assert_eq!(probs.len(), 3);
        assert_abs_diff_eq!(probs[2][0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_prepare_requires_model() {
        let backend = GridBackend::new(FlavorSystem::three_flavor(), GridOptions::default());
        assert!(backend.prepare(&[1.0, 0.0, 0.0], &[1.0], false).is_err());
    }
}
