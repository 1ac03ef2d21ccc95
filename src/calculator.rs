//! The oscillation calculator: one physics API over every backend.

use ndarray::{Array3, ArrayD, Axis};
use tracing::{debug, info};

use crate::backend::{BackendAdapter, EnergyFlavorProbabilities, PropagationBackend};
use crate::config::{BackendKind, CalculatorConfig, DetectorSite, ModelConfig};
use crate::decoherence::{DecoherenceMatrix, DecoherenceModel, NamedModel};
use crate::error::{OscError, Result};
use crate::flavor::{Flavor, FlavorSystem};
use crate::geometry::{path_length_km, AtmosphereGeometry};
use crate::matter::MatterModel;
use crate::params::{MassSplittings, MixingAngles};
use crate::sequencer::{advance, check_coverage, propagate, Propagation};
use crate::sme::SmeModel;

/// What the neutrino starts as.
#[derive(Debug, Clone, PartialEq)]
pub enum InitialState {
    /// Pure flavor by position in the flavor system.
    Index(usize),
    /// Pure flavor by name.
    Label(Flavor),
    /// Incoherent mixture, one non-negative weight per flavor.
    Mixture(Vec<f64>),
}

impl From<usize> for InitialState {
    fn from(index: usize) -> Self {
        InitialState::Index(index)
    }
}

impl From<Flavor> for InitialState {
    fn from(flavor: Flavor) -> Self {
        InitialState::Label(flavor)
    }
}

impl From<Vec<f64>> for InitialState {
    fn from(weights: Vec<f64>) -> Self {
        InitialState::Mixture(weights)
    }
}

impl InitialState {
    fn weights(&self, system: &FlavorSystem) -> Result<Vec<f64>> {
        let pure = |index: usize| {
            let mut w = vec![0.0; system.len()];
            w[index] = 1.0;
            w
        };
        match self {
            InitialState::Index(i) if *i < system.len() => Ok(pure(*i)),
            InitialState::Index(i) => Err(OscError::invalid(format!(
                "initial flavor index {i} out of range for {} flavors",
                system.len()
            ))),
            InitialState::Label(flavor) => Ok(pure(system.index_of(*flavor)?)),
            InitialState::Mixture(weights) => {
                if weights.len() != system.len() {
                    return Err(OscError::invalid(format!(
                        "initial state needs {} weights, got {}",
                        system.len(),
                        weights.len()
                    )));
                }
                if weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
                    return Err(OscError::invalid("initial state weights must be finite and >= 0"));
                }
                if weights.iter().sum::<f64>() <= 0.0 {
                    return Err(OscError::invalid("initial state weights are all zero"));
                }
                Ok(weights.clone())
            }
        }
    }
}

/// A scalar or a list of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid(pub Vec<f64>);

impl From<f64> for Grid {
    fn from(value: f64) -> Self {
        Grid(vec![value])
    }
}

impl From<Vec<f64>> for Grid {
    fn from(values: Vec<f64>) -> Self {
        Grid(values)
    }
}

impl From<&[f64]> for Grid {
    fn from(values: &[f64]) -> Self {
        Grid(values.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for Grid {
    fn from(values: [f64; N]) -> Self {
        Grid(values.to_vec())
    }
}

/// One calculation: energies, a start state, and either distances
/// (baseline mode) or cos(zenith) values (atmospheric mode).
#[derive(Debug, Clone, PartialEq)]
pub struct PropagationRequest {
    pub energies_gev: Vec<f64>,
    pub initial: InitialState,
    pub distance_km: Option<Vec<f64>>,
    pub coszen: Option<Vec<f64>>,
    pub nubar: bool,
}

impl PropagationRequest {
    pub fn new(energies_gev: impl Into<Grid>, initial: impl Into<InitialState>) -> Self {
        Self {
            energies_gev: energies_gev.into().0,
            initial: initial.into(),
            distance_km: None,
            coszen: None,
            nubar: false,
        }
    }

    pub fn distance_km(mut self, distance_km: impl Into<Grid>) -> Self {
        self.distance_km = Some(distance_km.into().0);
        self
    }

    pub fn coszen(mut self, coszen: impl Into<Grid>) -> Self {
        self.coszen = Some(coszen.into().0);
        self
    }

    pub fn nubar(mut self, nubar: bool) -> Self {
        self.nubar = nubar;
        self
    }
}

/// Path lengths in the caller's order, plus the cos(zenith) each came from.
struct Track {
    length_km: f64,
    coszen: Option<f64>,
}

/// Oscillation probability calculator.
///
/// The calculation mode (baseline or atmospheric) and backend are fixed at
/// construction. Physics settings live in a versioned [`ModelConfig`]; each
/// setter derives a new snapshot, has the backend accept it, and only then
/// replaces the current one.
///
/// # Example
///
/// ```rust
/// use nuosc::{BackendKind, CalculatorConfig, Flavor, OscCalculator, PropagationRequest};
///
/// let calc = OscCalculator::new(CalculatorConfig::new(BackendKind::Grid)).unwrap();
/// let request = PropagationRequest::new(vec![1.0, 2.0, 3.0], Flavor::Mu).distance_km(1300.0);
/// let probs = calc.calc_osc_prob(&request).unwrap();
/// assert_eq!(probs.shape(), &[3, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct OscCalculator {
    config: CalculatorConfig,
    system: FlavorSystem,
    model: ModelConfig,
    adapter: BackendAdapter,
}

impl OscCalculator {
    pub fn new(config: CalculatorConfig) -> Result<Self> {
        config.validate()?;
        let system = config.flavor_system()?;
        let model = ModelConfig::initial(&system);
        let mut adapter = BackendAdapter::new(&config)?;
        adapter.configure(&model)?;
        info!(
            backend = config.backend.name(),
            atmospheric = config.atmospheric,
            num_flavors = system.len(),
            "oscillation calculator ready"
        );
        Ok(Self {
            config,
            system,
            model,
            adapter,
        })
    }

    pub fn config(&self) -> &CalculatorConfig {
        &self.config
    }

    pub fn system(&self) -> &FlavorSystem {
        &self.system
    }

    pub fn backend(&self) -> BackendKind {
        self.adapter.kind()
    }

    /// Current physics snapshot.
    pub fn model(&self) -> &ModelConfig {
        &self.model
    }

    fn update(
        &mut self,
        what: &str,
        change: impl FnOnce(&mut ModelConfig) -> Result<()>,
    ) -> Result<()> {
        let next = self.model.derive(change)?;
        self.adapter.configure(&next)?;
        debug!(version = next.version, "{what} updated");
        self.model = next;
        Ok(())
    }

    pub fn set_mixing_angles(
        &mut self,
        theta12: f64,
        theta13: Option<f64>,
        theta23: Option<f64>,
        deltacp: Option<f64>,
    ) -> Result<()> {
        self.update("mixing angles", |m| {
            m.parameters
                .set_mixing_angles(theta12, theta13, theta23, deltacp)
        })
    }

    pub fn set_deltacp(&mut self, deltacp: f64) -> Result<()> {
        self.update("CP phase", |m| m.parameters.set_deltacp(deltacp))
    }

    pub fn set_mass_splittings(&mut self, dm21: f64, dm31: Option<f64>) -> Result<()> {
        self.update("mass splittings", |m| {
            m.parameters.set_mass_splittings(dm21, dm31)
        })
    }

    pub fn mixing_angles(&self) -> Result<MixingAngles> {
        self.model.parameters.mixing_angles().copied()
    }

    pub fn mass_splittings(&self) -> Result<MassSplittings> {
        self.model.parameters.mass_splittings().copied()
    }

    pub fn deltacp(&self) -> Result<f64> {
        self.model.parameters.deltacp()
    }

    pub fn pmns(&self) -> Result<nalgebra::DMatrix<num_complex::Complex64>> {
        self.model.parameters.pmns(&self.system)
    }

    /// Replace the propagation medium.
    pub fn set_matter(&mut self, matter: MatterModel) -> Result<()> {
        matter.validate(self.config.atmospheric)?;
        self.update("matter", |m| {
            m.matter = matter;
            Ok(())
        })
    }

    /// Explicit damping matrix D0 (eV) with `D(E) = D0 · (E / E0)^n`.
    pub fn set_decoherence(&mut self, matrix: DecoherenceMatrix, n: f64, e0_ev: f64) -> Result<()> {
        let model = DecoherenceModel::new(matrix, n, e0_ev, self.system.len())?;
        self.update("decoherence", |m| {
            m.decoherence = Some(model);
            Ok(())
        })
    }

    pub fn set_decoherence_model(
        &mut self,
        model: NamedModel,
        gamma0_ev: f64,
        n: f64,
        e0_ev: f64,
    ) -> Result<()> {
        let model = DecoherenceModel::named(model, gamma0_ev, n, e0_ev, self.system.len())?;
        self.update("decoherence", |m| {
            m.decoherence = Some(model);
            Ok(())
        })
    }

    pub fn set_sme(&mut self, sme: SmeModel) -> Result<()> {
        if sme.dim() != self.system.len() {
            return Err(OscError::invalid(format!(
                "SME coefficients are {n}x{n} but the calculator has {} flavors",
                self.system.len(),
                n = sme.dim()
            )));
        }
        self.update("SME", |m| {
            m.sme = Some(sme);
            Ok(())
        })
    }

    /// Back to standard oscillations: drop decoherence and SME.
    pub fn set_std_osc(&mut self) -> Result<()> {
        self.update("standard oscillation", |m| {
            m.decoherence = None;
            m.sme = None;
            Ok(())
        })
    }

    /// Use the depth of a known detector site for atmospheric tracks.
    pub fn set_detector(&mut self, site: DetectorSite) -> Result<()> {
        self.set_atmosphere(AtmosphereGeometry {
            detector_depth_km: site.depth_km(),
            ..self.config.atmosphere
        })
    }

    pub fn set_atmosphere(&mut self, geometry: AtmosphereGeometry) -> Result<()> {
        geometry.validate()?;
        debug!(
            production_height_km = geometry.production_height_km,
            detector_depth_km = geometry.detector_depth_km,
            "atmosphere geometry updated"
        );
        self.config.atmosphere = geometry;
        Ok(())
    }

    /// Probabilities shaped `[energy][distance][flavor]`, with a singleton
    /// energy or distance axis squeezed out. The flavor axis always stays.
    pub fn calc_osc_prob(&self, request: &PropagationRequest) -> Result<ArrayD<f64>> {
        self.run(&self.adapter, &self.model, request)
    }

    /// As [`calc_osc_prob`](Self::calc_osc_prob), against an explicit
    /// snapshot instead of the current one.
    pub fn calc_osc_prob_with(
        &self,
        model: &ModelConfig,
        request: &PropagationRequest,
    ) -> Result<ArrayD<f64>> {
        if model.parameters.num_flavors() != self.system.len() {
            return Err(OscError::invalid(
                "model snapshot is for a different flavor count",
            ));
        }
        model.matter.validate(self.config.atmospheric)?;
        if model == &self.model {
            return self.run(&self.adapter, model, request);
        }
        let mut adapter = self.adapter.clone();
        adapter.configure(model)?;
        self.run(&adapter, model, request)
    }

    fn tracks(&self, request: &PropagationRequest) -> Result<Vec<Track>> {
        let atmospheric = self.config.atmospheric;
        match (&request.distance_km, &request.coszen) {
            (Some(_), _) if atmospheric => Err(OscError::invalid(
                "distance_km given, but the calculator works in atmospheric mode (use coszen)",
            )),
            (_, Some(_)) if !atmospheric => Err(OscError::invalid(
                "coszen given, but the calculator works in baseline mode (use distance_km)",
            )),
            (Some(distances), None) => {
                check_grid("distance_km", distances)?;
                if distances.iter().any(|d| !(d.is_finite() && *d >= 0.0)) {
                    return Err(OscError::invalid("distances must be finite and >= 0"));
                }
                Ok(distances
                    .iter()
                    .map(|&length_km| Track {
                        length_km,
                        coszen: None,
                    })
                    .collect())
            }
            (None, Some(coszen)) => {
                check_grid("coszen", coszen)?;
                coszen
                    .iter()
                    .map(|&cz| {
                        Ok(Track {
                            length_km: path_length_km(cz, &self.config.atmosphere)?,
                            coszen: Some(cz),
                        })
                    })
                    .collect()
            }
            (None, None) if atmospheric => {
                Err(OscError::invalid("coszen is required in atmospheric mode"))
            }
            _ => Err(OscError::invalid("distance_km is required in baseline mode")),
        }
    }

    fn run(
        &self,
        adapter: &BackendAdapter,
        model: &ModelConfig,
        request: &PropagationRequest,
    ) -> Result<ArrayD<f64>> {
        let tracks = self.tracks(request)?;
        let energies = &request.energies_gev;
        check_grid("energies_gev", energies)?;
        if energies.iter().any(|e| !(e.is_finite() && *e > 0.0)) {
            return Err(OscError::invalid("energies must be finite and > 0"));
        }
        let weights = request.initial.weights(&self.system)?;

        let mut order: Vec<usize> = (0..tracks.len()).collect();
        order.sort_by(|&a, &b| tracks[a].length_km.total_cmp(&tracks[b].length_km));
        let sorted: Vec<&Track> = order.iter().map(|&i| &tracks[i]).collect();

        debug!(
            backend = adapter.kind().name(),
            version = model.version,
            energies = energies.len(),
            tracks = tracks.len(),
            nubar = request.nubar,
            "calculating oscillation probabilities"
        );

        let rows = match adapter {
            BackendAdapter::Grid(b) => self.compute(b, model, &weights, energies, request.nubar, &sorted),
            BackendAdapter::DensityMatrix(b) => {
                self.compute(b, model, &weights, energies, request.nubar, &sorted)
            }
            BackendAdapter::Analytic(b) => {
                self.compute(b, model, &weights, energies, request.nubar, &sorted)
            }
        }?;

        let n = self.system.len();
        let mut out = Array3::<f64>::zeros((energies.len(), tracks.len(), n));
        for (row, &track_index) in rows.iter().zip(&order) {
            for (i_e, probs) in row.iter().enumerate() {
                for (i_f, &p) in probs.iter().enumerate() {
                    out[[i_e, track_index, i_f]] = p;
                }
            }
        }

        self.check_result(&out, model, weights.iter().sum())?;

        let mut out = out.into_dyn();
        if tracks.len() == 1 {
            out = out.remove_axis(Axis(1));
        }
        if energies.len() == 1 {
            out = out.remove_axis(Axis(0));
        }
        Ok(out)
    }

    /// Probabilities per track in ascending track-length order.
    fn compute<B: PropagationBackend>(
        &self,
        backend: &B,
        model: &ModelConfig,
        weights: &[f64],
        energies: &[f64],
        nubar: bool,
        tracks: &[&Track],
    ) -> Result<Vec<EnergyFlavorProbabilities>> {
        if let Some(layers) = model.matter.linear_layers() {
            // same layering for every track: carry one state outward
            let longest = tracks.last().map_or(0.0, |t| t.length_km);
            check_coverage(&layers, longest)?;
            let mut propagation = Propagation::new(backend.prepare(weights, energies, nubar)?);
            let mut rows = Vec::with_capacity(tracks.len());
            for track in tracks {
                advance(backend, &mut propagation, &layers, track.length_km)?;
                rows.push(backend.evaluate(propagation.state())?);
            }
            return Ok(rows);
        }

        tracks
            .iter()
            .map(|track| {
                let coszen = track.coszen.ok_or_else(|| {
                    OscError::invalid(format!(
                        "`{}` matter needs atmospheric tracks",
                        model.matter.name()
                    ))
                })?;
                let layers = model.matter.track_layers(coszen, &self.config.atmosphere)?;
                propagate(backend, weights, energies, nubar, &layers, track.length_km)
            })
            .collect()
    }

    fn check_result(&self, out: &Array3<f64>, model: &ModelConfig, norm: f64) -> Result<()> {
        for ((energy_index, distance_index, flavor_index), p) in out.indexed_iter() {
            if !p.is_finite() {
                return Err(OscError::NonFiniteResult {
                    energy_index,
                    distance_index,
                    flavor_index,
                });
            }
        }
        if !model.conserves_probability() {
            return Ok(());
        }
        for ((energy_index, distance_index), sum) in out.sum_axis(Axis(2)).indexed_iter() {
            if (sum - norm).abs() > self.config.unitarity_tolerance {
                return Err(OscError::ProbabilityNotConserved {
                    energy_index,
                    distance_index,
                    sum: *sum,
                });
            }
        }
        Ok(())
    }
}

fn check_grid(name: &str, values: &[f64]) -> Result<()> {
    if values.is_empty() {
        return Err(OscError::invalid(format!("`{name}` needs at least one value")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytic::survival_two_flavor;
    use approx::assert_abs_diff_eq;

    fn two_flavor(backend: BackendKind) -> OscCalculator {
        let mut calc = OscCalculator::new(
            CalculatorConfig::new(backend).with_flavors(&[Flavor::E, Flavor::Mu]),
        )
        .unwrap();
        calc.set_mixing_angles(0.85f64.sqrt().asin() / 2.0, None, None, None)
            .unwrap();
        calc.set_mass_splittings(7.53e-5, None).unwrap();
        calc
    }

    #[test]
    fn test_output_shapes() {
        let calc = OscCalculator::new(CalculatorConfig::default()).unwrap();
        let req = PropagationRequest::new(vec![1.0, 2.0], 0usize).distance_km(vec![10.0, 20.0, 30.0]);
        assert_eq!(calc.calc_osc_prob(&req).unwrap().shape(), &[2, 3, 3]);
        let req = PropagationRequest::new(1.0, 0usize).distance_km(vec![10.0, 20.0]);
        assert_eq!(calc.calc_osc_prob(&req).unwrap().shape(), &[2, 3]);
        let req = PropagationRequest::new(1.0, 0usize).distance_km(10.0);
        assert_eq!(calc.calc_osc_prob(&req).unwrap().shape(), &[3]);
    }

    #[test]
    fn test_mode_mismatch_fails_before_compute() {
        let baseline = OscCalculator::new(CalculatorConfig::default()).unwrap();
        let req = PropagationRequest::new(1.0, 0usize).coszen(-0.5);
        assert!(matches!(
            baseline.calc_osc_prob(&req),
            Err(OscError::InvalidConfiguration(_))
        ));
        let atmospheric =
            OscCalculator::new(CalculatorConfig::default().atmospheric(true)).unwrap();
        let req = PropagationRequest::new(1.0, 0usize).distance_km(100.0);
        assert!(matches!(
            atmospheric.calc_osc_prob(&req),
            Err(OscError::InvalidConfiguration(_))
        ));
        let req = PropagationRequest::new(1.0, 0usize);
        assert!(atmospheric.calc_osc_prob(&req).is_err());
    }

    #[test]
    fn test_descending_grid_is_transparent() {
        let calc = OscCalculator::new(CalculatorConfig::default()).unwrap();
        let up = PropagationRequest::new(2.0, Flavor::Mu).distance_km(vec![100.0, 500.0, 1300.0]);
        let down = PropagationRequest::new(2.0, Flavor::Mu).distance_km(vec![1300.0, 500.0, 100.0]);
        let a = calc.calc_osc_prob(&up).unwrap();
        let b = calc.calc_osc_prob(&down).unwrap();
        for i in 0..3 {
            for f in 0..3 {
                assert_abs_diff_eq!(a[[i, f]], b[[2 - i, f]], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_reactor_survival_matches_reference() {
        let calc = two_flavor(BackendKind::Grid);
        let theta = calc.mixing_angles().unwrap().theta12;
        let req = PropagationRequest::new(1e-3, Flavor::E).distance_km(180.0);
        let p = calc.calc_osc_prob(&req).unwrap();
        assert_abs_diff_eq!(
            p[[0]],
            survival_two_flavor(theta, 7.53e-5, 180.0, 1e-3),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_failed_setter_keeps_model() {
        let mut calc = two_flavor(BackendKind::Analytic);
        let version = calc.model().version;
        let layers = MatterModel::layered(&[10.0], &[1.0], &[0.5]).unwrap();
        assert!(matches!(
            calc.set_matter(layers),
            Err(OscError::UnsupportedByBackend { .. })
        ));
        assert_eq!(calc.model().version, version);
        assert_eq!(calc.model().matter, MatterModel::Vacuum);
        assert!(calc.set_matter(MatterModel::EarthProfile).is_err());
    }

    #[test]
    fn test_snapshot_calculation() {
        let mut calc = OscCalculator::new(CalculatorConfig::default()).unwrap();
        let before = calc.model().clone();
        calc.set_matter(MatterModel::uniform(2.8, 0.5)).unwrap();
        let req = PropagationRequest::new(2.5, Flavor::Mu).distance_km(1300.0);
        let vacuum = calc.calc_osc_prob_with(&before, &req).unwrap();
        let matter = calc.calc_osc_prob(&req).unwrap();
        assert!((vacuum[[0]] - matter[[0]]).abs() > 1e-3);
        assert_eq!(calc.model().version, 1);
    }

    #[test]
    fn test_mixture_initial_state() {
        let calc = OscCalculator::new(CalculatorConfig::default()).unwrap();
        let req = PropagationRequest::new(1.0, vec![1.0, 2.0, 0.0]).distance_km(800.0);
        let p = calc.calc_osc_prob(&req).unwrap();
        assert_abs_diff_eq!(p.sum(), 3.0, epsilon = 1e-9);
        let bad = PropagationRequest::new(1.0, vec![1.0, 2.0]).distance_km(800.0);
        assert!(calc.calc_osc_prob(&bad).is_err());
    }

    #[test]
    fn test_detector_site_changes_path() {
        let mut calc = OscCalculator::new(CalculatorConfig::default().atmospheric(true)).unwrap();
        calc.set_detector(DetectorSite::IceCube).unwrap();
        assert_eq!(calc.config().atmosphere.detector_depth_km, 1.4);
        let req = PropagationRequest::new(vec![5.0, 20.0], Flavor::Mu).coszen(vec![-1.0, 0.2]);
        assert_eq!(calc.calc_osc_prob(&req).unwrap().shape(), &[2, 2, 3]);
    }
}
