//! Drives a backend through consecutive homogeneous layers.

use crate::backend::{EnergyFlavorProbabilities, PropagationBackend, Segment};
use crate::error::{OscError, Result};
use crate::matter::PathLayer;

/// Backend state plus how far along the path it has been carried.
///
/// A state after segment k is the only valid input for segment k+1, so the
/// handle is moved through [`advance`] rather than rebuilt.
#[derive(Debug, Clone)]
pub struct Propagation<S> {
    state: S,
    traveled_km: f64,
}

impl<S> Propagation<S> {
    pub fn new(state: S) -> Self {
        Self {
            state,
            traveled_km: 0.0,
        }
    }

    pub fn traveled_km(&self) -> f64 {
        self.traveled_km
    }

    pub fn state(&self) -> &S {
        &self.state
    }
}

/// Fail unless the last layer reaches `target_km`.
pub fn check_coverage(layers: &[PathLayer], target_km: f64) -> Result<()> {
    let final_endpoint_km = layers.last().map_or(0.0, |l| l.endpoint_km);
    if final_endpoint_km < target_km {
        return Err(OscError::IncompleteLayerCoverage {
            final_endpoint_km,
            requested_km: target_km,
        });
    }
    Ok(())
}

/// Carry `propagation` from where it stands to `target_km`, one backend call
/// per layer piece. Layers wholly behind the current position are skipped
/// and no zero-length segment is ever evolved.
pub fn advance<B: PropagationBackend>(
    backend: &B,
    propagation: &mut Propagation<B::State>,
    layers: &[PathLayer],
    target_km: f64,
) -> Result<()> {
    check_coverage(layers, target_km)?;
    if target_km < propagation.traveled_km {
        return Err(OscError::invalid(format!(
            "cannot propagate back from {} km to {} km",
            propagation.traveled_km, target_km
        )));
    }

    for layer in layers {
        if propagation.traveled_km >= target_km {
            break;
        }
        if layer.endpoint_km <= propagation.traveled_km {
            continue;
        }
        let end = layer.endpoint_km.min(target_km);
        let segment = Segment {
            length_km: end - propagation.traveled_km,
            medium: layer.medium,
        };
        tracing::trace!(from_km = propagation.traveled_km, to_km = end, "segment");
        backend.evolve(&mut propagation.state, &segment)?;
        propagation.traveled_km = end;
    }
    Ok(())
}

/// Fresh state through `layers` up to `length_km`, then probabilities.
pub fn propagate<B: PropagationBackend>(
    backend: &B,
    weights: &[f64],
    energies_gev: &[f64],
    nubar: bool,
    layers: &[PathLayer],
    length_km: f64,
) -> Result<EnergyFlavorProbabilities> {
    check_coverage(layers, length_km)?;
    let mut propagation = Propagation::new(backend.prepare(weights, energies_gev, nubar)?);
    advance(backend, &mut propagation, layers, length_km)?;
    backend.evaluate(propagation.state())
}
