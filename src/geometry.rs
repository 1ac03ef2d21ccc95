//! Atmospheric track geometry: cos(zenith) → path length, and where a track
//! crosses spherical shells of the Earth.

use serde::{Deserialize, Serialize};

use crate::error::{OscError, Result};
use crate::EARTH_RADIUS_KM;

/// Typical atmospheric-neutrino production height above the surface.
pub const DEFAULT_PRODUCTION_HEIGHT_KM: f64 = 22.0;

/// Depth of the detector below the surface when no site is chosen.
pub const DEFAULT_DETECTOR_DEPTH_KM: f64 = 1.0;

/// Production height and detector depth for atmospheric tracks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtmosphereGeometry {
    pub production_height_km: f64,
    pub detector_depth_km: f64,
}

impl Default for AtmosphereGeometry {
    fn default() -> Self {
        Self {
            production_height_km: DEFAULT_PRODUCTION_HEIGHT_KM,
            detector_depth_km: DEFAULT_DETECTOR_DEPTH_KM,
        }
    }
}

impl AtmosphereGeometry {
    pub fn validate(&self) -> Result<()> {
        if !(self.production_height_km >= 0.0 && self.production_height_km.is_finite()) {
            return Err(OscError::invalid("production height must be finite and >= 0"));
        }
        if !(self.detector_depth_km >= 0.0 && self.detector_depth_km < EARTH_RADIUS_KM) {
            return Err(OscError::invalid(
                "detector depth must be >= 0 and below the Earth radius",
            ));
        }
        Ok(())
    }

    fn detector_radius_km(&self) -> f64 {
        EARTH_RADIUS_KM - self.detector_depth_km
    }
}

/// Path length from the production point to the detector.
///
/// `L = sqrt((R+h)² - (R-d)²·(1-cz²)) - (R-d)·cz`
pub fn path_length_km(coszen: f64, geometry: &AtmosphereGeometry) -> Result<f64> {
    if !(-1.0..=1.0).contains(&coszen) {
        return Err(OscError::invalid(format!(
            "cos(zenith) must lie in [-1, 1], got {coszen}"
        )));
    }
    let r_det = geometry.detector_radius_km();
    let r_prod = EARTH_RADIUS_KM + geometry.production_height_km;
    Ok((r_prod * r_prod - r_det * r_det * (1.0 - coszen * coszen)).sqrt() - r_det * coszen)
}

/// A straight atmospheric track, parameterized by distance from the
/// production point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chord {
    pub coszen: f64,
    pub length_km: f64,
    detector_radius_km: f64,
}

impl Chord {
    pub fn new(coszen: f64, geometry: &AtmosphereGeometry) -> Result<Self> {
        Ok(Self {
            coszen,
            length_km: path_length_km(coszen, geometry)?,
            detector_radius_km: geometry.detector_radius_km(),
        })
    }

    /// Radius (km from the Earth's center) at `x` km from the production point.
    pub fn radius_at(&self, x: f64) -> f64 {
        // s is the distance back from the detector toward the source
        let s = self.length_km - x;
        let rd = self.detector_radius_km;
        (rd * rd + s * s + 2.0 * rd * s * self.coszen).max(0.0).sqrt()
    }

    /// Distances from the production point where the track crosses the
    /// sphere of `radius_km`, strictly inside the track.
    pub fn crossings(&self, radius_km: f64) -> Vec<f64> {
        let rd = self.detector_radius_km;
        let b = rd * self.coszen;
        let disc = b * b - rd * rd + radius_km * radius_km;
        if disc < 0.0 {
            return Vec::new();
        }
        let root = disc.sqrt();
        [-b - root, -b + root]
            .into_iter()
            .filter(|&s| s > 0.0 && s < self.length_km)
            .map(|s| self.length_km - s)
            .collect()
    }
}
