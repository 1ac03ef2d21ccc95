//! Neutrino flavors and the ordered flavor system a calculator works in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OscError, Result};

/// One of the three active neutrino flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    E,
    Mu,
    Tau,
}

impl Flavor {
    /// All known flavors in canonical order.
    pub const ALL: [Flavor; 3] = [Flavor::E, Flavor::Mu, Flavor::Tau];

    pub fn label(self) -> &'static str {
        match self {
            Flavor::E => "e",
            Flavor::Mu => "mu",
            Flavor::Tau => "tau",
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Flavor::E => 'e',
            Flavor::Mu => 'μ',
            Flavor::Tau => 'τ',
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Flavor {
    type Err = OscError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "e" | "nue" => Ok(Flavor::E),
            "mu" | "numu" => Ok(Flavor::Mu),
            "tau" | "nutau" => Ok(Flavor::Tau),
            other => Err(OscError::invalid(format!("unknown flavor `{other}`"))),
        }
    }
}

/// Ordered set of 2 or 3 distinct flavors.
///
/// Position in the set is the flavor index used for initial states and for
/// the last axis of every probability tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlavorSystem {
    flavors: Vec<Flavor>,
}

impl FlavorSystem {
    pub fn new(flavors: &[Flavor]) -> Result<Self> {
        if !(2..=3).contains(&flavors.len()) {
            return Err(OscError::invalid(format!(
                "flavor system must hold 2 or 3 flavors, got {}",
                flavors.len()
            )));
        }
        for (i, f) in flavors.iter().enumerate() {
            if flavors[..i].contains(f) {
                return Err(OscError::invalid(format!("duplicate flavor `{f}`")));
            }
        }
        Ok(Self {
            flavors: flavors.to_vec(),
        })
    }

    /// e, μ, τ.
    pub fn three_flavor() -> Self {
        Self {
            flavors: Flavor::ALL.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.flavors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flavors.is_empty()
    }

    pub fn flavors(&self) -> &[Flavor] {
        &self.flavors
    }

    pub fn get(&self, index: usize) -> Option<Flavor> {
        self.flavors.get(index).copied()
    }

    pub fn index_of(&self, flavor: Flavor) -> Result<usize> {
        self.flavors
            .iter()
            .position(|&f| f == flavor)
            .ok_or_else(|| OscError::invalid(format!("flavor `{flavor}` is not part of this system")))
    }

    /// Number of generators of U(N), including the identity: N².
    pub fn num_sun_basis_vectors(&self) -> usize {
        self.len() * self.len()
    }

    /// Index of νe, if present; only νe feels the charged-current potential.
    pub fn electron_index(&self) -> Option<usize> {
        self.flavors.iter().position(|&f| f == Flavor::E)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_contiguous() {
        let sys = FlavorSystem::new(&[Flavor::Mu, Flavor::Tau]).unwrap();
        assert_eq!(sys.index_of(Flavor::Mu).unwrap(), 0);
        assert_eq!(sys.index_of(Flavor::Tau).unwrap(), 1);
        assert!(sys.index_of(Flavor::E).is_err());
        assert_eq!(sys.electron_index(), None);
        assert_eq!(sys.num_sun_basis_vectors(), 4);
    }

    #[test]
    fn test_rejects_duplicates_and_bad_sizes() {
        assert!(FlavorSystem::new(&[Flavor::E, Flavor::E]).is_err());
        assert!(FlavorSystem::new(&[Flavor::E]).is_err());
        assert!(FlavorSystem::new(&[]).is_err());
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!("numu".parse::<Flavor>().unwrap(), Flavor::Mu);
        assert_eq!("tau".parse::<Flavor>().unwrap(), Flavor::Tau);
        assert!("sterile".parse::<Flavor>().is_err());
    }
}
