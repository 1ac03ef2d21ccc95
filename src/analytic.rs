//! Closed-form oscillation probabilities.
//!
//! The three-flavor formulas follow NuFast (P. Denton): vacuum probabilities
//! from |U|² elements and the Jarlskog invariant, matter probabilities from
//! the DMP approximation of λ3 with optional Newton refinement and the
//! eigenvector-eigenvalue ("Rosetta") identity. These are the engine of the
//! analytic backend and the reference the numerical backends are checked
//! against.

// Physics naming conventions (standard in neutrino oscillation literature)
#![allow(non_snake_case)]

use crate::params::{MassSplittings, MixingAngles};
use crate::EV_SQ_KM_TO_GEV_OVER4;

/// 3×3 probability matrix in canonical (e, μ, τ) order.
///
/// Indexed as `probs[α][β]` = P(ν_α → ν_β).
pub type ProbabilityMatrix = [[f64; 3]; 3];

/// Mixing inputs for the three-flavor formulas, as sin²θ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThreeFlavorInputs {
    pub s12sq: f64,
    pub s13sq: f64,
    pub s23sq: f64,
    /// CP phase δ in radians (already sign-flipped for antineutrinos)
    pub delta: f64,
    pub Dmsq21: f64,
    pub Dmsq31: f64,
}

impl ThreeFlavorInputs {
    /// Convert angle/splitting records; `None` if they are two-flavor.
    pub fn from_parameters(
        angles: &MixingAngles,
        splittings: &MassSplittings,
        nubar: bool,
    ) -> Option<Self> {
        let sinsq = |t: f64| t.sin() * t.sin();
        Some(Self {
            s12sq: sinsq(angles.theta12),
            s13sq: sinsq(angles.theta13?),
            s23sq: sinsq(angles.theta23?),
            delta: if nubar { -angles.deltacp } else { angles.deltacp },
            Dmsq21: splittings.dm21,
            Dmsq31: splittings.dm31?,
        })
    }
}

/// Fill the rows not computed directly using unitarity.
fn assemble(Pee: f64, Pem: f64, Pme: f64, Pmm: f64) -> ProbabilityMatrix {
    let mut probs = [[0.0; 3]; 3];

    probs[0][0] = Pee;
    probs[0][1] = Pem;
    probs[0][2] = 1.0 - Pee - Pem;

    probs[1][0] = Pme;
    probs[1][1] = Pmm;
    probs[1][2] = 1.0 - Pme - Pmm;

    probs[2][0] = 1.0 - Pee - Pme;
    probs[2][1] = 1.0 - Pem - Pmm;
    probs[2][2] = 1.0 - probs[0][2] - probs[1][2];

    probs
}

/// Three-flavor vacuum probabilities over baseline `L` (km) at energy `E` (GeV).
pub fn probability_vacuum(inputs: &ThreeFlavorInputs, L: f64, E: f64) -> ProbabilityMatrix {
    let ThreeFlavorInputs {
        s12sq,
        s13sq,
        s23sq,
        delta,
        Dmsq21,
        Dmsq31,
    } = *inputs;

    let c13sq = 1.0 - s13sq;

    let Ue3sq = s13sq;
    let Ue2sq = c13sq * s12sq;

    // Um2sq and Ut2sq are temporaries until unitarity fixes them below
    let Um3sq = c13sq * s23sq;
    let Ut2sq = s13sq * s12sq * s23sq;
    let Um2sq = (1.0 - s12sq) * (1.0 - s23sq);

    let Jrr = (Um2sq * Ut2sq).sqrt();
    let (sind, cosd) = delta.sin_cos();
    let Um2sq = Um2sq + Ut2sq - 2.0 * Jrr * cosd;
    let Jvac = 8.0 * Jrr * c13sq * sind;

    let Ue1sq = 1.0 - Ue3sq - Ue2sq;
    let Um1sq = 1.0 - Um3sq - Um2sq;

    let Ut3sq = 1.0 - Um3sq - Ue3sq;
    let Ut2sq = 1.0 - Um2sq - Ue2sq;
    let Ut1sq = 1.0 - Um1sq - Ue1sq;

    let Lover4E = EV_SQ_KM_TO_GEV_OVER4 * L / E;

    let D21 = Dmsq21 * Lover4E;
    let D31 = Dmsq31 * Lover4E;

    let sinD21 = D21.sin();
    let sinD31 = D31.sin();
    let sinD32 = (D31 - D21).sin();

    let triple_sin = sinD21 * sinD31 * sinD32;

    let sinsqD21_2 = 2.0 * sinD21 * sinD21;
    let sinsqD31_2 = 2.0 * sinD31 * sinD31;
    let sinsqD32_2 = 2.0 * sinD32 * sinD32;

    let Pme_CPC = (Ut3sq - Um2sq * Ue1sq - Um1sq * Ue2sq) * sinsqD21_2
        + (Ut2sq - Um3sq * Ue1sq - Um1sq * Ue3sq) * sinsqD31_2
        + (Ut1sq - Um3sq * Ue2sq - Um2sq * Ue3sq) * sinsqD32_2;
    let Pme_CPV = -Jvac * triple_sin;

    let Pmm = 1.0
        - 2.0
            * (Um2sq * Um1sq * sinsqD21_2
                + Um3sq * Um1sq * sinsqD31_2
                + Um3sq * Um2sq * sinsqD32_2);

    let Pee = 1.0
        - 2.0
            * (Ue2sq * Ue1sq * sinsqD21_2
                + Ue3sq * Ue1sq * sinsqD31_2
                + Ue3sq * Ue2sq * sinsqD32_2);

    assemble(Pee, Pme_CPC - Pme_CPV, Pme_CPC + Pme_CPV, Pmm)
}

/// Three-flavor constant-density probabilities.
///
/// `Amatter` is the signed reduced potential `±Ye·ρ·E·1.52e-4` in eV²
/// (negative for antineutrinos). `n_newton = 0` is plain DMP.
pub fn probability_matter(
    inputs: &ThreeFlavorInputs,
    L: f64,
    E: f64,
    Amatter: f64,
    n_newton: u8,
) -> ProbabilityMatrix {
    let ThreeFlavorInputs {
        s12sq,
        s13sq,
        s23sq,
        delta,
        Dmsq21,
        Dmsq31,
    } = *inputs;

    if Amatter == 0.0 {
        return probability_vacuum(inputs, L, E);
    }

    let c13sq = 1.0 - s13sq;

    let Ue2sq = c13sq * s12sq;
    let Ue3sq = s13sq;

    let Um3sq = c13sq * s23sq;
    let Ut2sq = s13sq * s12sq * s23sq;
    let Um2sq = (1.0 - s12sq) * (1.0 - s23sq);

    let Jrr = (Um2sq * Ut2sq).sqrt();
    let (sind, cosd) = delta.sin_cos();

    let Um2sq = Um2sq + Ut2sq - 2.0 * Jrr * cosd;
    let Jmatter = 8.0 * Jrr * c13sq * sind;
    let Dmsqee = Dmsq31 - s12sq * Dmsq21;

    // Characteristic polynomial coefficients and the See/Tee pieces
    let A_sum = Dmsq21 + Dmsq31;
    let See = A_sum - Dmsq21 * Ue2sq - Dmsq31 * Ue3sq;
    let Tmm_base = Dmsq21 * Dmsq31;
    let Tee = Tmm_base * (1.0 - Ue3sq - Ue2sq);
    let C = Amatter * Tee;
    let A = A_sum + Amatter;

    // λ3 from λ+ of DMP
    let xmat = Amatter / Dmsqee;
    let tmp = 1.0 - xmat;
    let mut lambda3 = Dmsq31 + 0.5 * Dmsqee * (xmat - 1.0 + (tmp * tmp + 4.0 * s13sq * xmat).sqrt());

    let B = Tmm_base + Amatter * See;
    for _ in 0..n_newton {
        lambda3 = (lambda3 * lambda3 * (lambda3 - A) + C) / (lambda3 * (2.0 * lambda3 - A) + B);
    }

    let tmp = A - lambda3;
    let Dlambda21 = (tmp * tmp - 4.0 * C / lambda3).sqrt();
    let lambda2 = 0.5 * (A - lambda3 + Dlambda21);
    let Dlambda32 = lambda3 - lambda2;
    let Dlambda31 = Dlambda32 + Dlambda21;

    let PiDlambdaInv = 1.0 / (Dlambda31 * Dlambda32 * Dlambda21);
    let Xp3 = PiDlambdaInv * Dlambda21;
    let Xp2 = -PiDlambdaInv * Dlambda31;

    let Ue3sq = (lambda3 * (lambda3 - See) + Tee) * Xp3;
    let Ue2sq = (lambda2 * (lambda2 - See) + Tee) * Xp2;

    let Smm = A - Dmsq21 * Um2sq - Dmsq31 * Um3sq;
    let Tmm = Tmm_base * (1.0 - Um3sq - Um2sq) + Amatter * (See + Smm - A_sum);

    let Um3sq = (lambda3 * (lambda3 - Smm) + Tmm) * Xp3;
    let Um2sq = (lambda2 * (lambda2 - Smm) + Tmm) * Xp2;

    // Naumov-Harrison-Scott for the matter Jarlskog
    let Jmatter = Jmatter * Dmsq21 * Dmsq31 * (Dmsq31 - Dmsq21) * PiDlambdaInv;

    let Ue1sq = 1.0 - Ue3sq - Ue2sq;
    let Um1sq = 1.0 - Um3sq - Um2sq;

    let Ut3sq = 1.0 - Um3sq - Ue3sq;
    let Ut2sq = 1.0 - Um2sq - Ue2sq;
    let Ut1sq = 1.0 - Um1sq - Ue1sq;

    let Lover4E = EV_SQ_KM_TO_GEV_OVER4 * L / E;

    let D21 = Dlambda21 * Lover4E;
    let D32 = Dlambda32 * Lover4E;

    let sinD21 = D21.sin();
    let sinD31 = (D32 + D21).sin();
    let sinD32 = D32.sin();

    let triple_sin = sinD21 * sinD31 * sinD32;

    let sinsqD21_2 = 2.0 * sinD21 * sinD21;
    let sinsqD31_2 = 2.0 * sinD31 * sinD31;
    let sinsqD32_2 = 2.0 * sinD32 * sinD32;

    let Pme_CPC = (Ut3sq - Um2sq * Ue1sq - Um1sq * Ue2sq) * sinsqD21_2
        + (Ut2sq - Um3sq * Ue1sq - Um1sq * Ue3sq) * sinsqD31_2
        + (Ut1sq - Um3sq * Ue2sq - Um2sq * Ue3sq) * sinsqD32_2;
    let Pme_CPV = -Jmatter * triple_sin;

    let Pmm = 1.0
        - 2.0
            * (Um2sq * Um1sq * sinsqD21_2
                + Um3sq * Um1sq * sinsqD31_2
                + Um3sq * Um2sq * sinsqD32_2);

    let Pee = 1.0
        - 2.0
            * (Ue2sq * Ue1sq * sinsqD21_2
                + Ue3sq * Ue1sq * sinsqD31_2
                + Ue3sq * Ue2sq * sinsqD32_2);

    assemble(Pee, Pme_CPC - Pme_CPV, Pme_CPC + Pme_CPV, Pmm)
}

/// Two-flavor transition probability P(ν_a → ν_b), a ≠ b.
///
/// `A_diff` is the reduced potential of the first flavor minus that of the
/// second, in eV² (zero in vacuum).
pub fn transition_two_flavor(theta: f64, Dmsq: f64, L: f64, E: f64, A_diff: f64) -> f64 {
    let (sin2t, cos2t) = (2.0 * theta).sin_cos();
    let along = Dmsq * cos2t - A_diff;
    let across = Dmsq * sin2t;
    let Dmsq_m = (along * along + across * across).sqrt();
    if Dmsq_m == 0.0 {
        return 0.0;
    }
    let sinsq2theta_m = (across * across) / (Dmsq_m * Dmsq_m);
    let phase = Dmsq_m * EV_SQ_KM_TO_GEV_OVER4 * L / E;
    sinsq2theta_m * phase.sin() * phase.sin()
}

/// Reference vacuum survival probability
/// `P = 1 - sin²(2θ)·sin²(Δm²·L/4E)` with L in km and E in GeV.
///
/// # Example
///
/// ```rust
/// use nuosc::analytic::survival_two_flavor;
///
/// let theta = 0.85f64.sqrt().asin() / 2.0;
/// let p = survival_two_flavor(theta, 7.53e-5, 180.0, 1e-3);
/// assert!((0.0..=1.0).contains(&p));
/// ```
pub fn survival_two_flavor(theta: f64, Dmsq: f64, L: f64, E: f64) -> f64 {
    1.0 - transition_two_flavor(theta, Dmsq, L, E, 0.0)
}
