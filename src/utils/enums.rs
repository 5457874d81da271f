use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::FfrwError;

/// Energy units of the four-momenta handed to a reweighting engine.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Units {
    /// Mega-electronvolts, the unit of simulation truth.
    #[default]
    MeV,
    /// Giga-electronvolts, the unit of all derived fit variables.
    GeV,
}

impl Units {
    /// The factor converting an energy in these units to GeV.
    pub fn to_gev(&self) -> f64 {
        match self {
            Units::MeV => 1e-3,
            Units::GeV => 1.0,
        }
    }
}

impl Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Units::MeV => write!(f, "MeV"),
            Units::GeV => write!(f, "GeV"),
        }
    }
}

impl FromStr for Units {
    type Err = FfrwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mev" => Ok(Self::MeV),
            "gev" => Ok(Self::GeV),
            _ => Err(FfrwError::ParseError {
                name: s.to_string(),
                object: "Units".to_string(),
            }),
        }
    }
}

/// The truth-level fit variables written next to each weight.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Observable {
    /// Momentum transfer squared, $`q^2`$.
    Q2,
    /// Missing mass squared of the neutrino system.
    MissingMass2,
    /// Charged-lepton energy in the parent rest frame.
    LeptonEnergy,
}

impl Observable {
    /// All observables, in output-column order.
    pub const ALL: [Observable; 3] = [
        Observable::Q2,
        Observable::MissingMass2,
        Observable::LeptonEnergy,
    ];

    /// Name of the output column holding this observable.
    pub fn column(&self) -> &'static str {
        match self {
            Observable::Q2 => "q2_true",
            Observable::MissingMass2 => "mm2_true",
            Observable::LeptonEnergy => "el_true",
        }
    }
}

impl Display for Observable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Observable::Q2 => write!(f, "q2"),
            Observable::MissingMass2 => write!(f, "mm2"),
            Observable::LeptonEnergy => write!(f, "el"),
        }
    }
}

impl FromStr for Observable {
    type Err = FfrwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "q2" | "q2_true" => Ok(Self::Q2),
            "mm2" | "mm2_true" | "missing_mass2" => Ok(Self::MissingMass2),
            "el" | "el_true" | "lepton_energy" => Ok(Self::LeptonEnergy),
            _ => Err(FfrwError::ParseError {
                name: s.to_string(),
                object: "Observable".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_displays() {
        assert_eq!(format!("{}", Units::MeV), "MeV");
        assert_eq!(format!("{}", Units::GeV), "GeV");
        assert_eq!(format!("{}", Observable::Q2), "q2");
        assert_eq!(format!("{}", Observable::LeptonEnergy), "el");
    }

    #[test]
    fn enum_from_str() {
        assert_eq!("MeV".parse::<Units>().unwrap(), Units::MeV);
        assert_eq!("gev".parse::<Units>().unwrap(), Units::GeV);
        assert!("keV".parse::<Units>().is_err());
        assert_eq!(
            "mm2_true".parse::<Observable>().unwrap(),
            Observable::MissingMass2
        );
        assert!("pt".parse::<Observable>().is_err());
    }
}
