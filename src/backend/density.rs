//! Density-matrix backend: the SU(N) coherence vector evolved with the
//! commutator generator plus damping, `r(t) = exp((M - D)·t)·r(0)`.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use super::{check_weights, loaded, EnergyFlavorProbabilities, PropagationBackend, Segment};
use crate::config::ModelConfig;
use crate::decoherence::DecoherenceModel;
use crate::error::{OscError, Result};
use crate::flavor::FlavorSystem;
use crate::hamiltonian::{
    commutator_generator, phase_per_ev2, sun_basis, to_sun_vector, HamiltonianModel,
};
use crate::matter::MatterModel;
use crate::sme::SmeModel;
use crate::{GEV_TO_EV, KM_TO_INV_EV};

#[derive(Debug, Clone)]
pub struct DensityMatrixBackend {
    system: FlavorSystem,
    basis: Vec<DMatrix<Complex64>>,
    model: Option<ModelConfig>,
}

impl DensityMatrixBackend {
    pub fn new(system: FlavorSystem) -> Self {
        Self {
            basis: sun_basis(system.len()),
            system,
            model: None,
        }
    }

    /// Mass-basis projector onto `|ket⟩`.
    fn projector(ket: &DVector<Complex64>) -> DMatrix<Complex64> {
        ket * ket.adjoint()
    }
}

#[derive(Debug, Clone)]
pub struct DensityState {
    hamiltonian: HamiltonianModel,
    decoherence: Option<DecoherenceModel>,
    energies_gev: Vec<f64>,
    /// Coherence vector per energy.
    coherence: Vec<DVector<f64>>,
    /// `½ Tr(λ_μ Π_β)` per final flavor, so that `P_β = readout_β · r`.
    readout: Vec<DVector<f64>>,
}

impl super::sealed::Sealed for DensityMatrixBackend {
    fn store(&mut self, model: ModelConfig) {
        self.model = Some(model);
    }
}

impl PropagationBackend for DensityMatrixBackend {
    type State = DensityState;

    fn name(&self) -> &'static str {
        "density_matrix"
    }

    fn system(&self) -> &FlavorSystem {
        &self.system
    }

    fn check_matter(&self, matter: &MatterModel) -> Result<()> {
        match matter {
            MatterModel::Vacuum | MatterModel::Uniform { .. } | MatterModel::Layered(_) => Ok(()),
            other => Err(OscError::unsupported(
                self.name(),
                format!("`{}` matter", other.name()),
            )),
        }
    }

    fn check_decoherence(&self, model: &DecoherenceModel) -> Result<()> {
        if model.matrix().dim() != self.basis.len() {
            return Err(OscError::invalid(format!(
                "decoherence matrix must be {n}x{n}",
                n = self.basis.len()
            )));
        }
        Ok(())
    }

    fn check_sme(&self, _model: &SmeModel) -> Result<()> {
        Ok(())
    }

    fn model(&self) -> Option<&ModelConfig> {
        self.model.as_ref()
    }

    fn prepare(&self, weights: &[f64], energies_gev: &[f64], nubar: bool) -> Result<DensityState> {
        let model = loaded(self.model(), self.name())?;
        check_weights(weights, &self.system)?;
        let hamiltonian =
            HamiltonianModel::new(&model.parameters, &self.system, model.sme.as_ref(), nubar)?;

        let n = self.system.len();
        let mut rho = DMatrix::from_element(n, n, Complex64::new(0.0, 0.0));
        let mut readout = Vec::with_capacity(n);
        for (alpha, &w) in weights.iter().enumerate() {
            let projector = Self::projector(&hamiltonian.flavor_ket(alpha));
            rho += &projector * Complex64::new(w, 0.0);
            readout.push(to_sun_vector(&projector, &self.basis) * 0.5);
        }
        let r0 = to_sun_vector(&rho, &self.basis);

        Ok(DensityState {
            hamiltonian,
            decoherence: model.decoherence.clone(),
            coherence: vec![r0; energies_gev.len()],
            energies_gev: energies_gev.to_vec(),
            readout,
        })
    }

    fn evolve(&self, state: &mut DensityState, segment: &Segment) -> Result<()> {
        let time_inv_ev = segment.length_km * KM_TO_INV_EV;
        for (&energy, r) in state.energies_gev.iter().zip(state.coherence.iter_mut()) {
            let k_mass = state
                .hamiltonian
                .to_mass_basis(&state.hamiltonian.reduced(energy, &segment.medium));
            let mut generator = commutator_generator(&k_mass, &self.basis)
                * phase_per_ev2(segment.length_km, energy);
            if !resolvable(&generator) {
                tracing::warn!(energy_gev = energy, "oscillation phase out of range");
                r.fill(f64::NAN);
                continue;
            }
            if let Some(decoherence) = &state.decoherence {
                generator -= decoherence.at_energy(energy * GEV_TO_EV) * time_inv_ev;
            }
            *r = generator.exp() * &*r;
        }
        Ok(())
    }

    fn evaluate(&self, state: &DensityState) -> Result<EnergyFlavorProbabilities> {
        Ok(state
            .coherence
            .iter()
            .map(|r| state.readout.iter().map(|p| p.dot(r)).collect())
            .collect())
    }
}

/// Phases past `1/ε` radians keep no significant digits, and the scaling
/// step of the matrix exponential overflows well before `f64::MAX`.
const MAX_PHASE: f64 = 1.0 / f64::EPSILON;

fn resolvable(generator: &DMatrix<f64>) -> bool {
    generator.iter().all(|v| v.is_finite() && v.abs() <= MAX_PHASE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoherence::NamedModel;
    use crate::matter::Medium;
    use approx::assert_abs_diff_eq;

    fn configured(decoherence: Option<DecoherenceModel>) -> DensityMatrixBackend {
        let system = FlavorSystem::three_flavor();
        let mut model = ModelConfig::initial(&system);
        model.decoherence = decoherence;
        let mut backend = DensityMatrixBackend::new(system);
        backend.configure(&model).unwrap();
        backend
    }

    #[test]
    fn test_initial_state_reads_back() {
        let backend = configured(None);
        let state = backend.prepare(&[0.0, 1.0, 0.0], &[1.0], false).unwrap();
        let probs = backend.evaluate(&state).unwrap();
        assert_abs_diff_eq!(probs[0][0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(probs[0][1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pure_evolution_conserves_probability() {
        let backend = configured(None);
        let mut state = backend.prepare(&[0.0, 1.0, 0.0], &[0.7, 3.0], true).unwrap();
        let seg = Segment {
            length_km: 1300.0,
            medium: Medium::Constant {
                density: 2.8,
                electron_fraction: 0.5,
            },
        };
        for row in backend.evolve_and_evaluate(&mut state, &seg).unwrap() {
            assert_abs_diff_eq!(row.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
            assert!(row.iter().all(|p| *p > -1e-12));
        }
    }

    #[test]
    fn test_state_randomization_tends_to_equal_mixture() {
        // Γ·t ≫ 1 leaves the maximally mixed state: P = 1/N for every flavor
        let decoherence =
            DecoherenceModel::named(NamedModel::RandomizeState, 1e-11, 0.0, 1e9, 3).unwrap();
        let backend = configured(Some(decoherence));
        let mut state = backend.prepare(&[1.0, 0.0, 0.0], &[10.0], false).unwrap();
        let seg = Segment {
            length_km: 1000.0,
            medium: Medium::Vacuum,
        };
        let probs = backend.evolve_and_evaluate(&mut state, &seg).unwrap();
        for p in &probs[0] {
            assert_abs_diff_eq!(*p, 1.0 / 3.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_neutrino_loss_drains_norm() {
        let decoherence =
            DecoherenceModel::named(NamedModel::NeutrinoLoss, 1e-13, 0.0, 1e9, 3).unwrap();
        let backend = configured(Some(decoherence));
        let mut state = backend.prepare(&[1.0, 0.0, 0.0], &[1.0], false).unwrap();
        let seg = Segment {
            length_km: 1.0,
            medium: Medium::Vacuum,
        };
        let probs = backend.evolve_and_evaluate(&mut state, &seg).unwrap();
        let total: f64 = probs[0].iter().sum();
        // exp(-Γ·t) with Γ·t = 1e-13 · 5.07e9
        assert_abs_diff_eq!(total, (-1e-13 * KM_TO_INV_EV).exp(), epsilon = 1e-9);
    }

    #[test]
    fn test_unresolvable_phase_yields_nan() {
        let system = FlavorSystem::three_flavor();
        let mut model = ModelConfig::initial(&system);
        model
            .parameters
            .set_mass_splittings(7.4e-5, Some(1e300))
            .unwrap();
        let mut backend = DensityMatrixBackend::new(system);
        backend.configure(&model).unwrap();
        let mut state = backend.prepare(&[0.0, 1.0, 0.0], &[1.0], false).unwrap();
        let seg = Segment {
            length_km: 1e5,
            medium: Medium::Vacuum,
        };
        let probs = backend.evolve_and_evaluate(&mut state, &seg).unwrap();
        assert!(probs[0].iter().all(|p| p.is_nan()));
    }

    #[test]
    fn test_earth_profile_unsupported() {
        let backend = configured(None);
        assert!(matches!(
            backend.check_matter(&MatterModel::EarthProfile),
            Err(OscError::UnsupportedByBackend { .. })
        ));
    }
}
