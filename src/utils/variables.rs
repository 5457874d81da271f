use std::fmt::{Debug, Display};

use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};

use crate::{
    data::TruthEvent,
    topology::{DecayTemplate, Role},
    utils::{enums::Units, vectors::Vec4},
    FfrwResult,
};

/// Invariant mass squared of the sum of `p4s`, converted from `units` to $`\text{GeV}^2`$.
///
/// ```
/// use ffrw::{utils::variables::invariant_mass2, Units, Vec4};
///
/// let neutrinos = [Vec4::new(0.0, 0.0, 0.0, 100.0); 3];
/// assert!((invariant_mass2(&neutrinos, Units::MeV) - 0.09).abs() < 1e-12);
/// ```
pub fn invariant_mass2<'a, I>(p4s: I, units: Units) -> f64
where
    I: IntoIterator<Item = &'a Vec4>,
{
    p4s.into_iter().sum::<Vec4>().m2() * units.to_gev().powi(2)
}

/// Anything which can be computed from the truth record of a single event.
pub trait Variable: DynClone + Send + Sync + Debug + Display {
    /// This method takes a [`TruthEvent`] and extracts a single value (like the momentum transfer).
    ///
    /// # Errors
    ///
    /// Fails with [`FfrwError::MissingParticle`](crate::FfrwError::MissingParticle) if the event
    /// lacks a particle slot the variable needs.
    fn value(&self, event: &TruthEvent) -> FfrwResult<f64>;

    /// This method distributes [`Variable::value`] over a sequence of events.
    fn value_on(&self, events: &[TruthEvent]) -> FfrwResult<Vec<f64>> {
        events.iter().map(|event| self.value(event)).collect()
    }
}
dyn_clone::clone_trait_object!(Variable);

/// The momentum transfer squared $`q^2 = (p_B - p_{D^*})^2`$ in $`\text{GeV}^2`$.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Q2 {
    parent: Role,
    hadron: Role,
    units: Units,
}

impl Q2 {
    /// Compute $`q^2`$ from the `parent` and `hadron` slots of MeV-valued events.
    pub fn new(parent: Role, hadron: Role) -> Self {
        Self {
            parent,
            hadron,
            units: Units::MeV,
        }
    }
    /// Build the variable from the root and hadron slots of a [`DecayTemplate`].
    pub fn from_template(template: &DecayTemplate) -> Self {
        Self::new(template.root, template.hadron)
    }
    /// Interpret event four-momenta in the given units.
    pub fn in_units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }
}

impl Display for Q2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "q2({}, {})", self.parent, self.hadron)
    }
}

impl Variable for Q2 {
    fn value(&self, event: &TruthEvent) -> FfrwResult<f64> {
        let transfer = event.particle(self.parent)?.p4 - event.particle(self.hadron)?.p4;
        Ok(invariant_mass2([&transfer], self.units))
    }
}

/// The invariant mass squared of the neutrino system in $`\text{GeV}^2`$.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MissingMass2 {
    neutrinos: Vec<Role>,
    units: Units,
}

impl MissingMass2 {
    /// Compute the missing mass squared from the given slots of MeV-valued events.
    pub fn new(neutrinos: &[Role]) -> Self {
        Self {
            neutrinos: neutrinos.to_vec(),
            units: Units::MeV,
        }
    }
    /// Build the variable from the neutrino slots of a [`DecayTemplate`].
    pub fn from_template(template: &DecayTemplate) -> Self {
        Self::new(template.neutrinos)
    }
    /// Interpret event four-momenta in the given units.
    pub fn in_units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }
}

impl Display for MissingMass2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.neutrinos.iter().map(|role| role.prefix()).collect();
        write!(f, "mm2([{}])", names.join(", "))
    }
}

impl Variable for MissingMass2 {
    fn value(&self, event: &TruthEvent) -> FfrwResult<f64> {
        let p4s = self
            .neutrinos
            .iter()
            .map(|role| event.particle(*role).map(|particle| particle.p4))
            .collect::<FfrwResult<Vec<Vec4>>>()?;
        Ok(invariant_mass2(&p4s, self.units))
    }
}

/// The energy of a charged lepton in the rest frame of the decaying parent, in GeV.
///
/// The boost velocity is the parent's lab-frame $`\vec{p}/E`$, which is assumed to be
/// subluminal (see [`Vec4::boost`]).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeptonEnergy {
    lepton: Role,
    frame: Role,
    units: Units,
}

impl LeptonEnergy {
    /// Compute the energy of `lepton` in the rest frame of `frame` for MeV-valued events.
    pub fn new(lepton: Role, frame: Role) -> Self {
        Self {
            lepton,
            frame,
            units: Units::MeV,
        }
    }
    /// Build the variable from the lepton and root slots of a [`DecayTemplate`].
    pub fn from_template(template: &DecayTemplate) -> Self {
        Self::new(template.lepton, template.root)
    }
    /// Interpret event four-momenta in the given units.
    pub fn in_units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }
}

impl Display for LeptonEnergy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "el({}, {})", self.lepton, self.frame)
    }
}

impl Variable for LeptonEnergy {
    fn value(&self, event: &TruthEvent) -> FfrwResult<f64> {
        let lepton = event.particle(self.lepton)?.p4;
        let beta = event.particle(self.frame)?.p4.beta();
        // `boost` returns a new vector; the event's lab-frame lepton is never touched
        Ok(lepton.boost(&-beta).e() * self.units.to_gev())
    }
}
