//! Propagation media and their decomposition into homogeneous path layers.

use crate::error::{OscError, Result};
use crate::geometry::{AtmosphereGeometry, Chord};
use crate::{EARTH_RADIUS_KM, YE_RHO_E_TO_A};

/// A homogeneous medium for one propagation segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Medium {
    Vacuum,
    Constant {
        /// g/cm³
        density: f64,
        electron_fraction: f64,
    },
}

impl Medium {
    /// Reduced charged-current potential `A = Ye·ρ·E·1.52e-4` in eV² (E in GeV).
    pub fn reduced_potential(&self, energy_gev: f64) -> f64 {
        match *self {
            Medium::Vacuum => 0.0,
            Medium::Constant {
                density,
                electron_fraction,
            } => electron_fraction * density * energy_gev * YE_RHO_E_TO_A,
        }
    }

    fn from_density(density: f64, electron_fraction: f64) -> Self {
        if density == 0.0 {
            Medium::Vacuum
        } else {
            Medium::Constant {
                density,
                electron_fraction,
            }
        }
    }
}

/// One constant-density layer of a [`MatterModel::Layered`] medium.
///
/// The layer starts where the previous one ends (or at 0 km).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatterLayer {
    pub endpoint_km: f64,
    pub density: f64,
    pub electron_fraction: f64,
}

/// Radial density profile, radii in units of the Earth radius.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialProfile {
    pub radius_fraction: Vec<f64>,
    pub density: Vec<f64>,
    pub electron_fraction: Vec<f64>,
    /// Longest homogeneous step used when sampling the profile along a track.
    pub max_step_km: f64,
}

/// Default sampling step for radial profiles.
pub const DEFAULT_PROFILE_STEP_KM: f64 = 50.0;

/// Shells of the stepped Earth model: (outer radius km, density g/cm³, Ye).
///
/// Inner core, outer core, mantle, crust.
pub const EARTH_SHELLS: [(f64, f64, f64); 4] = [
    (1221.5, 13.0, 0.468),
    (3480.0, 11.3, 0.468),
    (5701.0, 5.0, 0.497),
    (EARTH_RADIUS_KM, 3.3, 0.497),
];

/// The medium a calculator propagates through. Replaced wholesale on each
/// `set_matter`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MatterModel {
    #[default]
    Vacuum,
    Uniform {
        density: f64,
        electron_fraction: f64,
    },
    EarthProfile,
    Layered(Vec<MatterLayer>),
    ExternalProfile(RadialProfile),
}

/// A homogeneous stretch of the path ending at `endpoint_km`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathLayer {
    pub endpoint_km: f64,
    pub medium: Medium,
}

fn check_density(density: f64, electron_fraction: f64) -> Result<()> {
    if !(density.is_finite() && density >= 0.0) {
        return Err(OscError::invalid(format!(
            "matter density must be finite and >= 0, got {density}"
        )));
    }
    if !(0.0..=1.0).contains(&electron_fraction) {
        return Err(OscError::invalid(format!(
            "electron fraction must lie in [0, 1], got {electron_fraction}"
        )));
    }
    Ok(())
}

impl MatterModel {
    pub fn uniform(density: f64, electron_fraction: f64) -> Self {
        MatterModel::Uniform {
            density,
            electron_fraction,
        }
    }

    /// Build layers from three parallel sequences, one entry per layer.
    pub fn layered(
        endpoint_km: &[f64],
        density: &[f64],
        electron_fraction: &[f64],
    ) -> Result<Self> {
        if endpoint_km.len() != density.len() || endpoint_km.len() != electron_fraction.len() {
            return Err(OscError::invalid(
                "layer endpoints, densities and electron fractions must have one entry per layer",
            ));
        }
        let layers = endpoint_km
            .iter()
            .zip(density)
            .zip(electron_fraction)
            .map(|((&endpoint_km, &density), &electron_fraction)| MatterLayer {
                endpoint_km,
                density,
                electron_fraction,
            })
            .collect();
        let model = MatterModel::Layered(layers);
        model.check_fields()?;
        Ok(model)
    }

    pub fn external_profile(
        radius_fraction: &[f64],
        density: &[f64],
        electron_fraction: &[f64],
    ) -> Result<Self> {
        let model = MatterModel::ExternalProfile(RadialProfile {
            radius_fraction: radius_fraction.to_vec(),
            density: density.to_vec(),
            electron_fraction: electron_fraction.to_vec(),
            max_step_km: DEFAULT_PROFILE_STEP_KM,
        });
        model.check_fields()?;
        Ok(model)
    }

    pub fn name(&self) -> &'static str {
        match self {
            MatterModel::Vacuum => "vacuum",
            MatterModel::Uniform { .. } => "uniform",
            MatterModel::EarthProfile => "earth",
            MatterModel::Layered(_) => "layers",
            MatterModel::ExternalProfile(_) => "external profile",
        }
    }

    /// Layering along a track depends only on distance, not on the track.
    pub fn is_track_independent(&self) -> bool {
        !matches!(
            self,
            MatterModel::EarthProfile | MatterModel::ExternalProfile(_)
        )
    }

    /// Check field presence/shape and that the variant fits the calculation mode.
    pub fn validate(&self, atmospheric: bool) -> Result<()> {
        self.check_fields()?;
        if !atmospheric && !self.is_track_independent() {
            return Err(OscError::invalid(format!(
                "`{}` matter is only an option in atmospheric mode",
                self.name()
            )));
        }
        Ok(())
    }

    fn check_fields(&self) -> Result<()> {
        match self {
            MatterModel::Vacuum | MatterModel::EarthProfile => Ok(()),
            MatterModel::Uniform {
                density,
                electron_fraction,
            } => check_density(*density, *electron_fraction),
            MatterModel::Layered(layers) => {
                if layers.is_empty() {
                    return Err(OscError::invalid("layered matter needs at least one layer"));
                }
                for layer in layers {
                    if !(layer.endpoint_km.is_finite() && layer.endpoint_km >= 0.0) {
                        return Err(OscError::invalid("layer endpoints must be finite and >= 0"));
                    }
                    check_density(layer.density, layer.electron_fraction)?;
                }
                if layers.windows(2).any(|w| w[1].endpoint_km < w[0].endpoint_km) {
                    return Err(OscError::invalid("layer endpoints must be ascending"));
                }
                Ok(())
            }
            MatterModel::ExternalProfile(profile) => {
                let n = profile.radius_fraction.len();
                if profile.density.len() != n || profile.electron_fraction.len() != n {
                    return Err(OscError::invalid(
                        "radius, density and electron fraction arrays must have equal length",
                    ));
                }
                if n < 2 {
                    return Err(OscError::invalid("radial profile needs at least two nodes"));
                }
                if profile.radius_fraction.iter().any(|r| !(r.is_finite() && *r >= 0.0)) {
                    return Err(OscError::invalid("radius fractions must be finite and >= 0"));
                }
                if profile.radius_fraction.windows(2).any(|w| w[1] <= w[0]) {
                    return Err(OscError::invalid("radius fractions must be strictly ascending"));
                }
                for (&d, &ye) in profile.density.iter().zip(&profile.electron_fraction) {
                    check_density(d, ye)?;
                }
                if !(profile.max_step_km > 0.0) {
                    return Err(OscError::invalid("profile sampling step must be > 0"));
                }
                Ok(())
            }
        }
    }

    /// Layers for a one-dimensional (track-independent) medium.
    ///
    /// Vacuum and uniform media are a single layer without an end.
    pub fn linear_layers(&self) -> Option<Vec<PathLayer>> {
        match self {
            MatterModel::Vacuum => Some(vec![PathLayer {
                endpoint_km: f64::INFINITY,
                medium: Medium::Vacuum,
            }]),
            MatterModel::Uniform {
                density,
                electron_fraction,
            } => Some(vec![PathLayer {
                endpoint_km: f64::INFINITY,
                medium: Medium::from_density(*density, *electron_fraction),
            }]),
            MatterModel::Layered(layers) => Some(
                layers
                    .iter()
                    .map(|l| PathLayer {
                        endpoint_km: l.endpoint_km,
                        medium: Medium::from_density(l.density, l.electron_fraction),
                    })
                    .collect(),
            ),
            MatterModel::EarthProfile | MatterModel::ExternalProfile(_) => None,
        }
    }

    /// Layers along the atmospheric track arriving at `coszen`.
    pub fn track_layers(
        &self,
        coszen: f64,
        geometry: &AtmosphereGeometry,
    ) -> Result<Vec<PathLayer>> {
        if let Some(layers) = self.linear_layers() {
            return Ok(layers);
        }
        let chord = Chord::new(coszen, geometry)?;
        match self {
            MatterModel::EarthProfile => {
                let radii: Vec<f64> = EARTH_SHELLS.iter().map(|s| s.0).collect();
                Ok(sample_chord(&chord, &radii, f64::INFINITY, |r| {
                    EARTH_SHELLS
                        .iter()
                        .find(|s| r <= s.0)
                        .map_or(Medium::Vacuum, |s| Medium::from_density(s.1, s.2))
                }))
            }
            MatterModel::ExternalProfile(profile) => {
                let radii: Vec<f64> = profile
                    .radius_fraction
                    .iter()
                    .map(|f| f * EARTH_RADIUS_KM)
                    .collect();
                Ok(sample_chord(&chord, &radii, profile.max_step_km, |r| {
                    profile.medium_at(r / EARTH_RADIUS_KM)
                }))
            }
            _ => Err(OscError::invalid("unreachable matter variant")),
        }
    }
}

impl RadialProfile {
    /// Linear interpolation in radius; flat below the first node, vacuum
    /// beyond the last.
    fn medium_at(&self, fraction: f64) -> Medium {
        let r = &self.radius_fraction;
        let last = r.len() - 1;
        if fraction > r[last] {
            return Medium::Vacuum;
        }
        if fraction <= r[0] {
            return Medium::from_density(self.density[0], self.electron_fraction[0]);
        }
        let hi = r.partition_point(|&x| x < fraction).min(last);
        let lo = hi - 1;
        let t = (fraction - r[lo]) / (r[hi] - r[lo]);
        let lerp = |v: &[f64]| v[lo] + t * (v[hi] - v[lo]);
        Medium::from_density(lerp(&self.density), lerp(&self.electron_fraction))
    }
}

/// Cut a chord at every shell crossing (and at `max_step_km` within a
/// shell), taking each piece's medium at its midpoint radius.
fn sample_chord(
    chord: &Chord,
    radii: &[f64],
    max_step_km: f64,
    medium_at: impl Fn(f64) -> Medium,
) -> Vec<PathLayer> {
    let mut cuts: Vec<f64> = radii.iter().flat_map(|&r| chord.crossings(r)).collect();
    cuts.push(chord.length_km);
    cuts.sort_by(f64::total_cmp);
    cuts.dedup();

    let mut layers = Vec::with_capacity(cuts.len());
    let mut start = 0.0;
    for end in cuts {
        let span = end - start;
        if span <= 0.0 {
            continue;
        }
        let pieces = if max_step_km.is_finite() {
            (span / max_step_km).ceil().max(1.0) as usize
        } else {
            1
        };
        for k in 1..=pieces {
            let piece_end = if k == pieces {
                end
            } else {
                start + span * k as f64 / pieces as f64
            };
            let piece_start = start + span * (k - 1) as f64 / pieces as f64;
            let mid = 0.5 * (piece_start + piece_end);
            layers.push(PathLayer {
                endpoint_km: piece_end,
                medium: medium_at(chord.radius_at(mid)),
            });
        }
        start = end;
    }
    layers
}
