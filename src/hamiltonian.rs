//! Reduced Hamiltonian `K = 2E·H` (eV²) and the SU(N) basis used by the
//! density-matrix backend.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use crate::error::Result;
use crate::flavor::FlavorSystem;
use crate::matter::Medium;
use crate::params::OscillationParameters;
use crate::sme::{SmeBasis, SmeModel};
use crate::{EV_SQ_KM_TO_GEV_OVER4, GEV_TO_EV};

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);
const I: Complex64 = Complex64::new(0.0, 1.0);

/// Phase accumulated per eV² of reduced Hamiltonian over `length_km` at
/// `energy_gev`: `L / 2E` in natural units.
pub fn phase_per_ev2(length_km: f64, energy_gev: f64) -> f64 {
    2.0 * EV_SQ_KM_TO_GEV_OVER4 * length_km / energy_gev
}

/// Everything needed to build `K` at any energy and medium, for one
/// neutrino/antineutrino choice.
#[derive(Debug, Clone)]
pub struct HamiltonianModel {
    /// Mixing matrix as seen by this particle type (conjugated for ν̄).
    mixing: DMatrix<Complex64>,
    vacuum: DMatrix<Complex64>,
    electron_index: Option<usize>,
    nubar: bool,
    sme: Option<SmeModel>,
}

impl HamiltonianModel {
    pub fn new(
        parameters: &OscillationParameters,
        system: &FlavorSystem,
        sme: Option<&SmeModel>,
        nubar: bool,
    ) -> Result<Self> {
        let (_, splittings) = parameters.require()?;
        let pmns = parameters.pmns(system)?;
        let mixing = if nubar { pmns.conjugate() } else { pmns };
        let mass_sq = DMatrix::from_diagonal(&DVector::from_iterator(
            system.len(),
            splittings
                .mass_squared_diagonal()
                .into_iter()
                .map(|m| Complex64::new(m, 0.0)),
        ));
        let vacuum = &mixing * mass_sq * mixing.adjoint();
        Ok(Self {
            mixing,
            vacuum,
            electron_index: system.electron_index(),
            nubar,
            sme: sme.cloned(),
        })
    }

    pub fn mixing(&self) -> &DMatrix<Complex64> {
        &self.mixing
    }

    pub fn nubar(&self) -> bool {
        self.nubar
    }

    /// Flavor-basis reduced Hamiltonian in eV².
    pub fn reduced(&self, energy_gev: f64, medium: &Medium) -> DMatrix<Complex64> {
        let mut k = self.vacuum.clone();
        if let Some(e) = self.electron_index {
            let potential = medium.reduced_potential(energy_gev);
            k[(e, e)] += if self.nubar { -potential } else { potential };
        }
        if let Some(sme) = &self.sme {
            let energy_ev = energy_gev * GEV_TO_EV;
            let mut term =
                sme.hamiltonian(energy_ev, self.nubar) * Complex64::new(2.0 * energy_ev, 0.0);
            if sme.basis() == SmeBasis::Mass {
                term = self.to_flavor_basis(&term);
            }
            k += term;
        }
        k
    }

    /// `U† O U`
    pub fn to_mass_basis(&self, flavor_op: &DMatrix<Complex64>) -> DMatrix<Complex64> {
        self.mixing.adjoint() * flavor_op * &self.mixing
    }

    /// `U O U†`
    pub fn to_flavor_basis(&self, mass_op: &DMatrix<Complex64>) -> DMatrix<Complex64> {
        &self.mixing * mass_op * self.mixing.adjoint()
    }

    /// `|ν_α⟩` expressed in the mass basis: components `U*_αi`.
    pub fn flavor_ket(&self, flavor_index: usize) -> DVector<Complex64> {
        self.mixing.row(flavor_index).transpose().map(|z| z.conj())
    }
}

/// Unitary `exp(-i·K·phase)` from the eigen-decomposition of `K`.
pub fn evolution_operator(k: &DMatrix<Complex64>, phase: f64) -> DMatrix<Complex64> {
    let eigen = k.clone().symmetric_eigen();
    let phases = DMatrix::from_diagonal(&eigen.eigenvalues.map(|lambda| {
        Complex64::from_polar(1.0, -lambda * phase)
    }));
    &eigen.eigenvectors * phases * eigen.eigenvectors.adjoint()
}

/// The N² Hermitian generators of U(N): `λ0 = √(2/N)·I` followed by the
/// generalized Gell-Mann matrices in the usual order (Pauli for N = 2,
/// λ1..λ8 for N = 3). All satisfy `Tr(λ_μ λ_ν) = 2 δ_μν`.
pub fn sun_basis(n: usize) -> Vec<DMatrix<Complex64>> {
    let mut basis = Vec::with_capacity(n * n);
    basis.push(DMatrix::identity(n, n) * Complex64::new((2.0 / n as f64).sqrt(), 0.0));
    for k in 1..n {
        for j in 0..k {
            let mut sym = DMatrix::from_element(n, n, ZERO);
            sym[(j, k)] = ONE;
            sym[(k, j)] = ONE;
            basis.push(sym);

            let mut anti = DMatrix::from_element(n, n, ZERO);
            anti[(j, k)] = -I;
            anti[(k, j)] = I;
            basis.push(anti);
        }
        let norm = (2.0 / (k * (k + 1)) as f64).sqrt();
        let mut diag = DMatrix::from_element(n, n, ZERO);
        for m in 0..k {
            diag[(m, m)] = Complex64::new(norm, 0.0);
        }
        diag[(k, k)] = Complex64::new(-(k as f64) * norm, 0.0);
        basis.push(diag);
    }
    basis
}

/// Real coefficients `r_μ = Tr(ρ λ_μ)`, so that `ρ = ½ Σ r_μ λ_μ`.
pub fn to_sun_vector(rho: &DMatrix<Complex64>, basis: &[DMatrix<Complex64>]) -> DVector<f64> {
    DVector::from_iterator(basis.len(), basis.iter().map(|l| (rho * l).trace().re))
}

/// Generator of `dr/dt` for `dρ/dt = -i[H, ρ]`:
/// `M_kj = ½ Tr(λ_k · (-i)[H, λ_j])`.
pub fn commutator_generator(h: &DMatrix<Complex64>, basis: &[DMatrix<Complex64>]) -> DMatrix<f64> {
    let dim = basis.len();
    let images: Vec<DMatrix<Complex64>> = basis
        .iter()
        .map(|lj| (h * lj - lj * h) * (-I))
        .collect();
    DMatrix::from_fn(dim, dim, |k, j| 0.5 * (&basis[k] * &images[j]).trace().re)
}
