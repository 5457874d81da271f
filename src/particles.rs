use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::utils::vectors::Vec4;

/// A Monte Carlo particle code following the PDG numbering scheme.
///
/// The sign distinguishes a particle from its antiparticle, so two particles with equal codes are
/// the same species.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PdgId(pub i32);

impl PdgId {
    pub const B0: PdgId = PdgId(511);
    pub const B_PLUS: PdgId = PdgId(521);
    pub const D_STAR_PLUS: PdgId = PdgId(413);
    pub const D_STAR_0: PdgId = PdgId(423);
    pub const D0: PdgId = PdgId(421);
    pub const D_PLUS: PdgId = PdgId(411);
    pub const PI_PLUS: PdgId = PdgId(211);
    pub const PI_0: PdgId = PdgId(111);
    pub const K_PLUS: PdgId = PdgId(321);
    pub const GAMMA: PdgId = PdgId(22);
    pub const ELECTRON: PdgId = PdgId(11);
    pub const NU_E: PdgId = PdgId(12);
    pub const MUON: PdgId = PdgId(13);
    pub const NU_MU: PdgId = PdgId(14);
    pub const TAU: PdgId = PdgId(15);
    pub const NU_TAU: PdgId = PdgId(16);

    /// The code of the charge-conjugate particle.
    pub fn conjugate(&self) -> Self {
        PdgId(-self.0)
    }

    /// The code with its sign removed, identifying the species up to charge conjugation.
    pub fn abs(&self) -> Self {
        PdgId(self.0.abs())
    }

    /// `+1`, `-1`, or `0` for the sign of the code.
    pub fn signum(&self) -> i32 {
        self.0.signum()
    }

    /// Electric charge in units of $`e`$, if the species is known to this crate.
    pub fn charge(&self) -> Option<i32> {
        let charge = match self.0.abs() {
            511 | 423 | 421 | 111 | 22 | 12 | 14 | 16 => 0,
            521 | 413 | 411 | 211 | 321 => 1,
            11 | 13 | 15 => -1,
            _ => return None,
        };
        Some(charge * self.signum())
    }

    /// A human-readable name, if the species is known to this crate.
    pub fn name(&self) -> Option<&'static str> {
        Some(match self.0 {
            511 => "B0",
            -511 => "anti-B0",
            521 => "B+",
            -521 => "B-",
            413 => "D*+",
            -413 => "D*-",
            423 => "D*0",
            -423 => "anti-D*0",
            421 => "D0",
            -421 => "anti-D0",
            411 => "D+",
            -411 => "D-",
            211 => "pi+",
            -211 => "pi-",
            111 => "pi0",
            321 => "K+",
            -321 => "K-",
            22 => "gamma",
            11 => "e-",
            -11 => "e+",
            12 => "nu_e",
            -12 => "anti-nu_e",
            13 => "mu-",
            -13 => "mu+",
            14 => "nu_mu",
            -14 => "anti-nu_mu",
            15 => "tau-",
            -15 => "tau+",
            16 => "nu_tau",
            -16 => "anti-nu_tau",
            _ => return None,
        })
    }
}

impl Display for PdgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{}", self.0),
        }
    }
}

impl From<i32> for PdgId {
    fn from(value: i32) -> Self {
        PdgId(value)
    }
}

/// Resolve the effective code of a neutral meson which may have oscillated before decaying.
///
/// Simulation records the flavour at production, but a reweighting engine needs the flavour at
/// decay, which is fixed by the charm meson it decays into: in a $`b \to c`$ transition the two
/// codes have opposite signs. If `meson` and `daughter` carry the same sign the meson mixed, and
/// its conjugate is returned; otherwise `meson` is returned unchanged.
///
/// ```
/// use ffrw::particles::{resolve_oscillation, PdgId};
///
/// assert_eq!(resolve_oscillation(PdgId(511), PdgId(413)), PdgId(-511));
/// assert_eq!(resolve_oscillation(PdgId(511), PdgId(-413)), PdgId(511));
/// ```
pub fn resolve_oscillation(meson: PdgId, daughter: PdgId) -> PdgId {
    if i64::from(meson.0) * i64::from(daughter.0) > 0 {
        meson.conjugate()
    } else {
        meson
    }
}

/// A particle as submitted to a reweighting engine: a four-momentum with a particle code.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DecayParticle {
    /// The four-momentum, in the units configured on the engine.
    pub p4: Vec4,
    /// The particle code.
    pub id: PdgId,
}

impl DecayParticle {
    /// Pair a four-momentum with a particle code.
    pub fn new(p4: Vec4, id: PdgId) -> Self {
        Self { p4, id }
    }
}

impl Display for DecayParticle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.id, self.p4.to_p4_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_sign_codes_are_flipped() {
        assert_eq!(resolve_oscillation(PdgId(511), PdgId(413)), PdgId(-511));
        assert_eq!(resolve_oscillation(PdgId(-511), PdgId(-413)), PdgId(511));
    }

    #[test]
    fn test_opposite_sign_codes_are_kept() {
        assert_eq!(resolve_oscillation(PdgId(511), PdgId(-413)), PdgId(511));
        assert_eq!(resolve_oscillation(PdgId(-511), PdgId(413)), PdgId(-511));
    }

    #[test]
    fn test_zero_code_is_kept() {
        assert_eq!(resolve_oscillation(PdgId(511), PdgId(0)), PdgId(511));
        assert_eq!(resolve_oscillation(PdgId(0), PdgId(413)), PdgId(0));
    }

    #[test]
    fn test_charges() {
        assert_eq!(PdgId(-511).charge(), Some(0));
        assert_eq!(PdgId(413).charge(), Some(1));
        assert_eq!(PdgId(-211).charge(), Some(-1));
        assert_eq!(PdgId(15).charge(), Some(-1));
        assert_eq!(PdgId(-13).charge(), Some(1));
        assert_eq!(PdgId(-16).charge(), Some(0));
        assert_eq!(PdgId(9_000_111).charge(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(PdgId(-511).to_string(), "anti-B0");
        assert_eq!(PdgId(123_456).to_string(), "123456");
        let particle = DecayParticle::new(Vec4::new(0.0, 0.0, 0.0, 1.0), PdgId::MUON);
        assert!(particle.to_string().starts_with("mu- "));
    }
}
