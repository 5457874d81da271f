use std::fmt::Display;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::{particles::DecayParticle, FfrwError, FfrwResult};

/// A particle slot in a decay chain.
///
/// Each slot corresponds to one group of input columns, named after [`Role::prefix`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// The decaying $`B`$ meson.
    B,
    /// The excited charm meson $`D^*`$.
    Dst,
    /// The ground-state charm meson from the $`D^*`$ decay.
    D0,
    /// The soft pion accompanying the $`D^0`$.
    SlowPi,
    /// The kaon from the $`D^0`$ decay.
    K,
    /// The pion from the $`D^0`$ decay.
    Pi,
    /// The $`\tau`$ lepton.
    Tau,
    /// The neutrino produced with the $`\tau`$ at the $`B`$ vertex.
    AntiNuTau,
    /// The tau neutrino produced in the $`\tau`$ decay.
    NuTau,
    /// The muon.
    Mu,
    /// The muon neutrino.
    AntiNuMu,
}

impl Role {
    /// Column-name prefix of this slot in input tables.
    pub fn prefix(&self) -> &'static str {
        match self {
            Role::B => "b",
            Role::Dst => "dst",
            Role::D0 => "d0",
            Role::SlowPi => "spi",
            Role::K => "k",
            Role::Pi => "pi",
            Role::Tau => "tau",
            Role::AntiNuTau => "anu_tau",
            Role::NuTau => "nu_tau",
            Role::Mu => "mu",
            Role::AntiNuMu => "anu_mu",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// A declarative description of one decay mode.
///
/// The template fixes which particle slots exist, the order in which they are handed to a
/// reweighting engine, and the vertices connecting them. It also names the slots that the fit
/// variables are computed from, so the event loop never refers to a particular slot directly.
#[derive(Clone, Debug, PartialEq)]
pub struct DecayTemplate {
    /// A short name used in log messages.
    pub name: &'static str,
    /// Particle slots in insertion order.
    pub particles: &'static [Role],
    /// Vertices as `(parent, children)` pairs; children are listed in submission order.
    pub vertices: &'static [(Role, &'static [Role])],
    /// The initially produced particle.
    pub root: Role,
    /// The slot whose sign fixes the flavour of `root` at decay time.
    pub flavour_reference: Role,
    /// The hadron recoiling against the lepton system (used for $`q^2`$).
    pub hadron: Role,
    /// The charged lepton whose energy is measured in the `root` rest frame.
    pub lepton: Role,
    /// The undetected neutrinos (used for the missing mass).
    pub neutrinos: &'static [Role],
}

/// $`\bar{B}^0 \to D^{*+} (\to D^0 (\to K^- \pi^+) \pi^+) \tau^- (\to \mu^- \bar{\nu}_\mu \nu_\tau) \bar{\nu}_\tau`$
pub const B0_DSTAR_TAU_NU: DecayTemplate = DecayTemplate {
    name: "B0 -> D* tau nu",
    particles: &[
        Role::B,
        Role::Dst,
        Role::SlowPi,
        Role::D0,
        Role::K,
        Role::Pi,
        Role::Mu,
        Role::Tau,
        Role::AntiNuMu,
        Role::AntiNuTau,
        Role::NuTau,
    ],
    vertices: &[
        (Role::B, &[Role::Dst, Role::Tau, Role::AntiNuTau]),
        (Role::Tau, &[Role::Mu, Role::NuTau, Role::AntiNuMu]),
        (Role::Dst, &[Role::D0, Role::SlowPi]),
        (Role::D0, &[Role::K, Role::Pi]),
    ],
    root: Role::B,
    flavour_reference: Role::Dst,
    hadron: Role::Dst,
    lepton: Role::Mu,
    neutrinos: &[Role::NuTau, Role::AntiNuTau, Role::AntiNuMu],
};

/// $`\bar{B}^0 \to D^{*+} (\to D^0 (\to K^- \pi^+) \pi^+) \mu^- \bar{\nu}_\mu`$, the normalisation mode.
pub const B0_DSTAR_MU_NU: DecayTemplate = DecayTemplate {
    name: "B0 -> D* mu nu",
    particles: &[
        Role::B,
        Role::Dst,
        Role::SlowPi,
        Role::D0,
        Role::K,
        Role::Pi,
        Role::Mu,
        Role::AntiNuMu,
    ],
    vertices: &[
        (Role::B, &[Role::Dst, Role::Mu, Role::AntiNuMu]),
        (Role::Dst, &[Role::D0, Role::SlowPi]),
        (Role::D0, &[Role::K, Role::Pi]),
    ],
    root: Role::B,
    flavour_reference: Role::Dst,
    hadron: Role::Dst,
    lepton: Role::Mu,
    neutrinos: &[Role::AntiNuMu],
};

impl DecayTemplate {
    /// Check that the template describes a connected tree rooted at [`DecayTemplate::root`] and
    /// that every slot it refers to is declared in [`DecayTemplate::particles`].
    pub fn validate(&self) -> FfrwResult<()> {
        let declared: IndexSet<Role> = self.particles.iter().copied().collect();
        if declared.len() != self.particles.len() {
            return Err(invalid(format!("{}: duplicate particle slot", self.name)));
        }
        let referenced = self
            .vertices
            .iter()
            .flat_map(|(parent, children)| std::iter::once(parent).chain(children.iter()))
            .chain([
                &self.root,
                &self.flavour_reference,
                &self.hadron,
                &self.lepton,
            ])
            .chain(self.neutrinos.iter());
        for role in referenced {
            if !declared.contains(role) {
                return Err(invalid(format!(
                    "{}: slot \"{role}\" is used but not declared",
                    self.name
                )));
            }
        }
        let mut topology = DecayTopology::new();
        let handles: IndexMap<Role, ParticleHandle> = self
            .particles
            .iter()
            .map(|role| (*role, topology.add_particle(DecayParticle::default())))
            .collect();
        for (parent, children) in self.vertices {
            topology.add_vertex(
                handles[parent],
                children.iter().map(|child| handles[child]).collect(),
            )?;
        }
        if topology.validate()? != handles[&self.root] {
            return Err(invalid(format!(
                "{}: tree is not rooted at \"{}\"",
                self.name, self.root
            )));
        }
        Ok(())
    }

    /// Build the [`DecayTopology`] of one event from its particles, keyed by slot.
    ///
    /// Particles are added in [`DecayTemplate::particles`] order and vertices in
    /// [`DecayTemplate::vertices`] order, so the same input always yields the same topology.
    pub fn build(&self, particles: &IndexMap<Role, DecayParticle>) -> FfrwResult<DecayTopology> {
        let mut topology = DecayTopology::new();
        let mut handles = IndexMap::with_capacity(self.particles.len());
        for role in self.particles {
            let particle = particles
                .get(role)
                .ok_or(FfrwError::MissingParticle { role: *role })?;
            handles.insert(*role, topology.add_particle(*particle));
        }
        for (parent, children) in self.vertices {
            let parent = *handles
                .get(parent)
                .ok_or(FfrwError::MissingParticle { role: *parent })?;
            let children = children
                .iter()
                .map(|child| {
                    handles
                        .get(child)
                        .copied()
                        .ok_or(FfrwError::MissingParticle { role: *child })
                })
                .collect::<FfrwResult<Vec<_>>>()?;
            topology.add_vertex(parent, children)?;
        }
        Ok(topology)
    }
}

fn invalid(reason: String) -> FfrwError {
    FfrwError::InvalidTopology { reason }
}

/// An index into the particle list of a [`DecayTopology`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticleHandle(usize);

impl ParticleHandle {
    /// Position of the particle in [`DecayTopology::particles`].
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A decay vertex: one parent and its ordered children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vertex {
    /// The decaying particle.
    pub parent: ParticleHandle,
    /// The decay products, in submission order.
    pub children: Vec<ParticleHandle>,
}

/// The particles and vertices of one event's decay chain.
///
/// A topology is built fresh for every event and handed to a reweighting engine by reference,
/// so nothing submitted for one event can leak into the next.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecayTopology {
    particles: Vec<DecayParticle>,
    vertices: Vec<Vertex>,
}

impl DecayTopology {
    /// Create an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a particle and return its handle.
    pub fn add_particle(&mut self, particle: DecayParticle) -> ParticleHandle {
        self.particles.push(particle);
        ParticleHandle(self.particles.len() - 1)
    }

    /// Declare that `parent` decays into `children`.
    ///
    /// Every handle must refer to a particle already added, a particle may decay at most once,
    /// and a particle may be produced by at most one vertex.
    pub fn add_vertex(
        &mut self,
        parent: ParticleHandle,
        children: Vec<ParticleHandle>,
    ) -> FfrwResult<()> {
        let n = self.particles.len();
        if parent.0 >= n {
            return Err(invalid(format!("unknown parent particle #{}", parent.0)));
        }
        if children.is_empty() {
            return Err(invalid(format!("particle #{} has no children", parent.0)));
        }
        if self.vertices.iter().any(|vertex| vertex.parent == parent) {
            return Err(invalid(format!("particle #{} decays twice", parent.0)));
        }
        let mut seen = IndexSet::with_capacity(children.len());
        for child in &children {
            if child.0 >= n {
                return Err(invalid(format!("unknown child particle #{}", child.0)));
            }
            if *child == parent {
                return Err(invalid(format!("particle #{} decays into itself", child.0)));
            }
            if !seen.insert(*child) || self.parent_of(*child).is_some() {
                return Err(invalid(format!(
                    "particle #{} is produced more than once",
                    child.0
                )));
            }
        }
        self.vertices.push(Vertex { parent, children });
        Ok(())
    }

    /// The particles, in insertion order.
    pub fn particles(&self) -> &[DecayParticle] {
        &self.particles
    }

    /// The vertices, in declaration order.
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Look up a particle by handle.
    pub fn particle(&self, handle: ParticleHandle) -> Option<&DecayParticle> {
        self.particles.get(handle.0)
    }

    /// The vertex at which `handle` decays, if it is not a final-state particle.
    pub fn decay_of(&self, handle: ParticleHandle) -> Option<&Vertex> {
        self.vertices.iter().find(|vertex| vertex.parent == handle)
    }

    /// The particle which produced `handle`, if any.
    pub fn parent_of(&self, handle: ParticleHandle) -> Option<ParticleHandle> {
        self.vertices
            .iter()
            .find(|vertex| vertex.children.contains(&handle))
            .map(|vertex| vertex.parent)
    }

    /// Check that the topology is a single connected tree and return its root.
    pub fn validate(&self) -> FfrwResult<ParticleHandle> {
        let roots: Vec<ParticleHandle> = (0..self.particles.len())
            .map(ParticleHandle)
            .filter(|handle| self.parent_of(*handle).is_none())
            .collect();
        let root = match roots.as_slice() {
            [root] => *root,
            [] => return Err(invalid("topology has no root".to_string())),
            _ => {
                return Err(invalid(format!(
                    "topology has {} roots; expected exactly one",
                    roots.len()
                )))
            }
        };
        let mut reached = IndexSet::with_capacity(self.particles.len());
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            if !reached.insert(handle) {
                return Err(invalid(format!("particle #{} is reached twice", handle.0)));
            }
            if let Some(vertex) = self.decay_of(handle) {
                stack.extend(vertex.children.iter().rev());
            }
        }
        if reached.len() != self.particles.len() {
            return Err(invalid(format!(
                "{} particles are not connected to the root",
                self.particles.len() - reached.len()
            )));
        }
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{particles::PdgId, utils::vectors::Vec4};

    fn particles_for(template: &DecayTemplate) -> IndexMap<Role, DecayParticle> {
        template
            .particles
            .iter()
            .enumerate()
            .map(|(i, role)| {
                (
                    *role,
                    DecayParticle::new(Vec4::new(0.0, 0.0, i as f64, 100.0), PdgId(i as i32 + 1)),
                )
            })
            .collect()
    }

    #[test]
    fn test_templates_are_valid_trees() {
        B0_DSTAR_TAU_NU.validate().unwrap();
        B0_DSTAR_MU_NU.validate().unwrap();
    }

    #[test]
    fn test_tau_template_shape() {
        let topology = B0_DSTAR_TAU_NU
            .build(&particles_for(&B0_DSTAR_TAU_NU))
            .unwrap();
        assert_eq!(topology.particles().len(), 11);
        assert_eq!(topology.vertices().len(), 4);
        let ids = |handles: &[ParticleHandle]| -> Vec<i32> {
            handles
                .iter()
                .map(|h| topology.particle(*h).unwrap().id.0)
                .collect()
        };
        // ids encode insertion position + 1: b=1, dst=2, spi=3, d0=4, k=5, pi=6, mu=7, tau=8,
        // anu_mu=9, anu_tau=10, nu_tau=11
        let groups: Vec<(i32, Vec<i32>)> = topology
            .vertices()
            .iter()
            .map(|v| (ids(&[v.parent])[0], ids(&v.children)))
            .collect();
        assert_eq!(
            groups,
            vec![
                (1, vec![2, 8, 10]),
                (8, vec![7, 11, 9]),
                (2, vec![4, 3]),
                (4, vec![5, 6]),
            ]
        );
        assert_eq!(topology.validate().unwrap().index(), 0);
    }

    #[test]
    fn test_build_is_deterministic() {
        let particles = particles_for(&B0_DSTAR_TAU_NU);
        let first = B0_DSTAR_TAU_NU.build(&particles).unwrap();
        let second = B0_DSTAR_TAU_NU.build(&particles).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_build_requires_every_slot() {
        let mut particles = particles_for(&B0_DSTAR_TAU_NU);
        particles.shift_remove(&Role::NuTau);
        assert!(matches!(
            B0_DSTAR_TAU_NU.build(&particles),
            Err(FfrwError::MissingParticle { role: Role::NuTau })
        ));
    }

    #[test]
    fn test_vertex_rules() {
        let mut topology = DecayTopology::new();
        let a = topology.add_particle(DecayParticle::default());
        let b = topology.add_particle(DecayParticle::default());
        let c = topology.add_particle(DecayParticle::default());
        assert!(topology.add_vertex(a, vec![ParticleHandle(7)]).is_err());
        assert!(topology.add_vertex(a, vec![a]).is_err());
        assert!(topology.add_vertex(a, vec![b, b]).is_err());
        assert!(topology.add_vertex(a, vec![]).is_err());
        topology.add_vertex(a, vec![b]).unwrap();
        assert!(topology.add_vertex(a, vec![c]).is_err());
        assert!(topology.add_vertex(c, vec![b]).is_err());
        // c is disconnected
        assert!(topology.validate().is_err());
        topology.add_vertex(b, vec![c]).unwrap();
        assert_eq!(topology.validate().unwrap(), a);
        assert_eq!(topology.parent_of(c), Some(b));
        assert!(topology.decay_of(c).is_none());
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut topology = DecayTopology::new();
        let a = topology.add_particle(DecayParticle::default());
        let b = topology.add_particle(DecayParticle::default());
        topology.add_vertex(a, vec![b]).unwrap();
        topology.add_vertex(b, vec![a]).unwrap();
        assert!(topology.validate().is_err());
    }

    #[test]
    fn test_invalid_template_is_reported() {
        const BROKEN: DecayTemplate = DecayTemplate {
            name: "broken",
            particles: &[Role::B, Role::Dst],
            vertices: &[(Role::B, &[Role::Dst, Role::Mu])],
            root: Role::B,
            flavour_reference: Role::Dst,
            hadron: Role::Dst,
            lepton: Role::Dst,
            neutrinos: &[],
        };
        assert!(BROKEN.validate().is_err());
    }
}
