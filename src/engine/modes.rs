use std::{fmt::Display, str::FromStr};

use crate::{particles::PdgId, FfrwError};

/// A hadronic transition whose form factors can be reweighted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    /// $`B \to D^*`$
    BDstar,
}

impl Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::BDstar => write!(f, "BD*"),
        }
    }
}

impl FromStr for Transition {
    type Err = FfrwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BD*" | "BDstar" => Ok(Self::BDstar),
            _ => Err(FfrwError::ParseError {
                name: s.to_string(),
                object: "Transition".to_string(),
            }),
        }
    }
}

/// A decay amplitude which a vertex can be matched against.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DecayMode {
    /// $`B \to D^* \tau \nu_\tau`$
    BDstarTauNu,
    /// $`B \to D^* \mu \nu_\mu`$
    BDstarMuNu,
    /// $`\tau \to \ell \nu_\ell \nu_\tau`$ for $`\ell = e, \mu`$
    TauEllNuNu,
}

impl Display for DecayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecayMode::BDstarTauNu => write!(f, "BD*TauNu"),
            DecayMode::BDstarMuNu => write!(f, "BD*MuNu"),
            DecayMode::TauEllNuNu => write!(f, "TauEllNuNu"),
        }
    }
}

impl FromStr for DecayMode {
    type Err = FfrwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BD*TauNu" => Ok(Self::BDstarTauNu),
            "BD*MuNu" => Ok(Self::BDstarMuNu),
            "TauEllNuNu" => Ok(Self::TauEllNuNu),
            _ => Err(FfrwError::ParseError {
                name: s.to_string(),
                object: "DecayMode".to_string(),
            }),
        }
    }
}

/// The outcome of matching one vertex against a [`DecayMode`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VertexMatch {
    /// The matched mode.
    pub mode: DecayMode,
    /// Position (within the vertex children) of the charm meson, for semileptonic modes.
    pub hadron: Option<usize>,
}

impl DecayMode {
    /// The hadronic transition of a semileptonic mode; purely leptonic modes have none.
    pub fn transition(&self) -> Option<Transition> {
        match self {
            DecayMode::BDstarTauNu | DecayMode::BDstarMuNu => Some(Transition::BDstar),
            DecayMode::TauEllNuNu => None,
        }
    }

    /// Whether `parent` is a species this mode describes the decay of.
    pub fn accepts_parent(&self, parent: PdgId) -> bool {
        match self {
            DecayMode::BDstarTauNu | DecayMode::BDstarMuNu => {
                parent.abs() == PdgId::B0 || parent.abs() == PdgId::B_PLUS
            }
            DecayMode::TauEllNuNu => parent.abs() == PdgId::TAU,
        }
    }

    /// Match a vertex against this mode.
    ///
    /// Children may appear in any order. Besides the species content, the charge and flavour
    /// assignments must be consistent: in $`b \to c \ell \bar\nu`$ the charm meson is
    /// produced with the sign opposite to the $`B`$ code, the charged lepton carries the charm
    /// meson's sign and the neutrino the opposite one; in $`\tau \to \ell \bar\nu_\ell \nu_\tau`$
    /// the charged lepton and $`\nu_\tau`$ carry the $`\tau`$'s sign and $`\bar\nu_\ell`$ the
    /// opposite one. Total electric charge must be conserved.
    pub fn match_vertex(&self, parent: PdgId, children: &[PdgId]) -> Option<VertexMatch> {
        if !self.accepts_parent(parent) || children.len() != 3 || !conserves_charge(parent, children)
        {
            return None;
        }
        match self {
            DecayMode::BDstarTauNu | DecayMode::BDstarMuNu => {
                let (lepton, neutrino) = if *self == DecayMode::BDstarTauNu {
                    (PdgId::TAU, PdgId::NU_TAU)
                } else {
                    (PdgId::MUON, PdgId::NU_MU)
                };
                let charm = if parent.abs() == PdgId::B0 {
                    PdgId::D_STAR_PLUS
                } else {
                    PdgId::D_STAR_0
                };
                let h = position(children, charm)?;
                let l = position(children, lepton)?;
                let n = position(children, neutrino)?;
                let dst = children[h];
                let flavour_ok = dst.signum() == -parent.signum()
                    && children[l].signum() == dst.signum()
                    && children[n].signum() == -children[l].signum();
                flavour_ok.then_some(VertexMatch {
                    mode: *self,
                    hadron: Some(h),
                })
            }
            DecayMode::TauEllNuNu => {
                let nu_tau = position(children, PdgId::NU_TAU)?;
                let (lepton, nu_lepton) = match (
                    position(children, PdgId::MUON),
                    position(children, PdgId::ELECTRON),
                ) {
                    (Some(l), None) => (l, position(children, PdgId::NU_MU)?),
                    (None, Some(l)) => (l, position(children, PdgId::NU_E)?),
                    _ => return None,
                };
                let sign = parent.signum();
                let flavour_ok = children[lepton].signum() == sign
                    && children[nu_tau].signum() == sign
                    && children[nu_lepton].signum() == -sign;
                flavour_ok.then_some(VertexMatch {
                    mode: *self,
                    hadron: None,
                })
            }
        }
    }
}

fn position(children: &[PdgId], species: PdgId) -> Option<usize> {
    children.iter().position(|child| child.abs() == species)
}

/// Electric charge is conserved at the vertex, or cannot be checked for an unknown species.
pub fn conserves_charge(parent: PdgId, children: &[PdgId]) -> bool {
    let Some(initial) = parent.charge() else {
        return true;
    };
    let mut total = 0;
    for child in children {
        match child.charge() {
            Some(charge) => total += charge,
            None => return true,
        }
    }
    total == initial
}
