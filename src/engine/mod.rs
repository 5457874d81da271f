use std::{fmt::Display, num::NonZeroU64};

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::{
    particles::PdgId,
    topology::DecayTopology,
    utils::{enums::Units, variables::invariant_mass2},
    FfrwError, FfrwResult,
};

/// Universal form-factor shapes used by [`Engine`].
pub mod form_factors;
/// Decay amplitudes a vertex can be matched against.
pub mod modes;

use form_factors::{FormFactor, FormFactorModel};
use modes::{DecayMode, Transition};

/// Identifier of a decay process accepted by a [`Reweighter`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub NonZeroU64);

impl Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0.get())
    }
}

/// 64-bit FNV-1a fold over the matched vertices of a process.
///
/// The byte layout is fixed (mode name, then little-endian PDG codes), so ids are stable across
/// builds and platforms.
struct ProcessSignature(u64);

impl ProcessSignature {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    fn new() -> Self {
        Self(Self::OFFSET)
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 ^= u64::from(*byte);
            self.0 = self.0.wrapping_mul(Self::PRIME);
        }
    }

    fn push_vertex(&mut self, mode: &str, parent: PdgId, children: &[PdgId]) {
        self.write(mode.as_bytes());
        // mode terminator
        self.write(&[0xff]);
        self.write(&parent.0.to_le_bytes());
        self.write(&(children.len() as u32).to_le_bytes());
        for child in children {
            self.write(&child.0.to_le_bytes());
        }
    }

    fn finish(&self) -> ProcessId {
        ProcessId(NonZeroU64::new(self.0).unwrap_or(NonZeroU64::MIN))
    }
}

/// A decay-amplitude reweighting service.
///
/// A run is configured once (decay modes, form-factor schemes, units), initialised with
/// [`Reweighter::initialize_run`], and then driven event by event:
/// [`Reweighter::begin_event`], one or more calls to [`Reweighter::submit_topology`],
/// [`Reweighter::compute_event`], and finally [`Reweighter::weight`] for each scheme of interest.
pub trait Reweighter {
    /// Declare the decay amplitudes that submitted topologies may be matched against.
    fn declare_decay_modes(&mut self, modes: &[&str]) -> FfrwResult<()>;
    /// Register a named target scheme as a list of `(transition, model)` pairs.
    fn register_ff_scheme(&mut self, name: &str, models: &[(&str, &str)]) -> FfrwResult<()>;
    /// Declare the `(transition, model)` pairs the sample was generated with.
    fn set_input_ff_scheme(&mut self, models: &[(&str, &str)]) -> FfrwResult<()>;
    /// Set the energy units of submitted four-momenta.
    fn set_units(&mut self, units: &str) -> FfrwResult<()>;
    /// Freeze the configuration. Must be called exactly once, before any event.
    fn initialize_run(&mut self) -> FfrwResult<()>;
    /// Discard any previous event and start a new one.
    fn begin_event(&mut self) -> FfrwResult<()>;
    /// Submit the decay chain of the current event.
    ///
    /// Returns `Ok(None)` if the topology does not match any declared decay amplitude; this is
    /// a normal outcome, not an error.
    fn submit_topology(&mut self, topology: &DecayTopology) -> FfrwResult<Option<ProcessId>>;
    /// Evaluate the weights of all registered schemes for the current event.
    fn compute_event(&mut self) -> FfrwResult<()>;
    /// The weight of the current event under the scheme `name`.
    fn weight(&self, name: &str) -> FfrwResult<f64>;
}

type Scheme = IndexMap<Transition, Box<dyn FormFactor>>;

/// A semileptonic vertex of an accepted process, reduced to what the weight depends on.
#[derive(Clone, Debug)]
struct Recoil {
    transition: Transition,
    w: f64,
}

#[derive(Clone, Debug, Default)]
struct EventState {
    recoils: Vec<Recoil>,
    n_processes: usize,
    weights: Option<IndexMap<String, f64>>,
}

/// The built-in leading-order reweighting engine.
///
/// Each semileptonic vertex contributes the ratio $`|F_\text{target}(w)|^2 / |F_\text{input}(w)|^2`$
/// of universal form-factor shapes evaluated at the recoil
/// $`w = p_B \cdot p_{D^*} / (m_B m_{D^*})`$; purely leptonic vertices contribute unity.
/// Vertices whose parent is not described by any declared mode (strong and electromagnetic
/// decays of the hadrons) are accepted as they are.
#[derive(Clone, Debug, Default)]
pub struct Engine {
    modes: Vec<DecayMode>,
    schemes: IndexMap<String, Scheme>,
    input_scheme: Option<Scheme>,
    units: Units,
    initialized: bool,
    event: Option<EventState>,
}

impl Engine {
    /// Create an unconfigured engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target scheme built from arbitrary [`FormFactor`] shapes.
    pub fn register_custom_scheme(
        &mut self,
        name: &str,
        models: Vec<(Transition, Box<dyn FormFactor>)>,
    ) -> FfrwResult<()> {
        self.check_configurable()?;
        self.schemes
            .insert(name.to_string(), models.into_iter().collect());
        Ok(())
    }

    /// Whether [`Reweighter::initialize_run`] has been called.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn check_configurable(&self) -> FfrwResult<()> {
        if self.initialized {
            return Err(FfrwError::RunStateError(
                "the run configuration cannot change after initialisation".to_string(),
            ));
        }
        Ok(())
    }

    fn current_event(&mut self) -> FfrwResult<&mut EventState> {
        if !self.initialized {
            return Err(FfrwError::RunStateError(
                "the run has not been initialised".to_string(),
            ));
        }
        self.event
            .as_mut()
            .ok_or_else(|| FfrwError::RunStateError("no event in progress".to_string()))
    }

    /// Match every vertex; `None` means the topology is rejected.
    fn match_topology(&self, topology: &DecayTopology) -> Option<(Vec<Recoil>, ProcessId)> {
        if let Err(err) = topology.validate() {
            debug!("rejecting topology: {err}");
            return None;
        }
        let mut recoils = Vec::new();
        let mut signature = ProcessSignature::new();
        let mut matched_any = false;
        for vertex in topology.vertices() {
            let parent = topology.particle(vertex.parent)?;
            let children = vertex
                .children
                .iter()
                .map(|child| topology.particle(*child).copied())
                .collect::<Option<Vec<_>>>()?;
            let child_ids: Vec<_> = children.iter().map(|child| child.id).collect();
            let candidates: Vec<&DecayMode> = self
                .modes
                .iter()
                .filter(|mode| mode.accepts_parent(parent.id))
                .collect();
            if candidates.is_empty() {
                if !modes::conserves_charge(parent.id, &child_ids) {
                    debug!("rejecting topology: {} decay violates charge", parent.id);
                    return None;
                }
                continue;
            }
            let Some(matched) = candidates
                .iter()
                .find_map(|mode| mode.match_vertex(parent.id, &child_ids))
            else {
                debug!(
                    "rejecting topology: no declared mode matches {} -> {:?}",
                    parent.id,
                    child_ids.iter().map(|id| id.0).collect::<Vec<_>>()
                );
                return None;
            };
            matched_any = true;
            signature.push_vertex(&matched.mode.to_string(), parent.id, &child_ids);
            if let (Some(transition), Some(h)) = (matched.mode.transition(), matched.hadron) {
                let p_b = parent.p4;
                let p_h = children[h].p4;
                let w = p_b.dot(&p_h) / (p_b.m() * p_h.m());
                if !w.is_finite() {
                    debug!("rejecting topology: undefined recoil for {}", parent.id);
                    return None;
                }
                trace!(
                    mode = %matched.mode,
                    w,
                    q2 = invariant_mass2([&(p_b - p_h)], self.units),
                    "matched semileptonic vertex"
                );
                recoils.push(Recoil {
                    transition,
                    // rounding can push an at-rest configuration just below zero recoil
                    w: w.max(1.0),
                });
            }
        }
        if !matched_any {
            debug!("rejecting topology: no vertex matches a declared mode");
            return None;
        }
        Some((recoils, signature.finish()))
    }
}

fn parse_scheme(models: &[(&str, &str)]) -> FfrwResult<Scheme> {
    models
        .iter()
        .map(|(transition, model)| {
            Ok((
                transition.parse::<Transition>()?,
                model.parse::<FormFactorModel>()?.build(),
            ))
        })
        .collect()
}

impl Reweighter for Engine {
    fn declare_decay_modes(&mut self, modes: &[&str]) -> FfrwResult<()> {
        self.check_configurable()?;
        for mode in modes {
            let mode = mode.parse::<DecayMode>()?;
            if !self.modes.contains(&mode) {
                self.modes.push(mode);
            }
        }
        Ok(())
    }

    fn register_ff_scheme(&mut self, name: &str, models: &[(&str, &str)]) -> FfrwResult<()> {
        self.check_configurable()?;
        let scheme = parse_scheme(models)?;
        self.schemes.insert(name.to_string(), scheme);
        Ok(())
    }

    fn set_input_ff_scheme(&mut self, models: &[(&str, &str)]) -> FfrwResult<()> {
        self.check_configurable()?;
        self.input_scheme = Some(parse_scheme(models)?);
        Ok(())
    }

    fn set_units(&mut self, units: &str) -> FfrwResult<()> {
        self.check_configurable()?;
        self.units = units.parse()?;
        Ok(())
    }

    fn initialize_run(&mut self) -> FfrwResult<()> {
        self.check_configurable()?;
        if self.modes.is_empty() {
            return Err(FfrwError::RunStateError(
                "no decay modes were declared".to_string(),
            ));
        }
        if self.schemes.is_empty() {
            return Err(FfrwError::RunStateError(
                "no form-factor scheme was registered".to_string(),
            ));
        }
        let Some(input) = &self.input_scheme else {
            return Err(FfrwError::RunStateError(
                "no input form-factor scheme was set".to_string(),
            ));
        };
        for (name, scheme) in &self.schemes {
            if let Some(transition) = scheme.keys().find(|t| !input.contains_key(*t)) {
                return Err(FfrwError::RunStateError(format!(
                    "scheme \"{name}\" reweights {transition}, which the input scheme does not describe"
                )));
            }
        }
        debug!(
            modes = ?self.modes.iter().map(|m| m.to_string()).collect::<Vec<_>>(),
            schemes = ?self.schemes.keys().collect::<Vec<_>>(),
            units = %self.units,
            "initialised reweighting run"
        );
        self.initialized = true;
        Ok(())
    }

    fn begin_event(&mut self) -> FfrwResult<()> {
        if !self.initialized {
            return Err(FfrwError::RunStateError(
                "the run has not been initialised".to_string(),
            ));
        }
        self.event = Some(EventState::default());
        Ok(())
    }

    fn submit_topology(&mut self, topology: &DecayTopology) -> FfrwResult<Option<ProcessId>> {
        self.current_event()?;
        let Some((recoils, id)) = self.match_topology(topology) else {
            return Ok(None);
        };
        let event = self.current_event()?;
        event.recoils.extend(recoils);
        event.n_processes += 1;
        event.weights = None;
        trace!(process = %id, "accepted process");
        Ok(Some(id))
    }

    fn compute_event(&mut self) -> FfrwResult<()> {
        let event = self.current_event()?;
        if event.n_processes == 0 {
            return Err(FfrwError::RunStateError(
                "no accepted process to compute".to_string(),
            ));
        }
        let recoils = event.recoils.clone();
        let Some(input) = &self.input_scheme else {
            return Err(FfrwError::RunStateError(
                "no input form-factor scheme was set".to_string(),
            ));
        };
        let weights = self
            .schemes
            .iter()
            .map(|(name, scheme)| {
                let weight = recoils
                    .iter()
                    .filter_map(|recoil| {
                        let target = scheme.get(&recoil.transition)?;
                        let base = input.get(&recoil.transition)?;
                        Some((target.value(recoil.w) / base.value(recoil.w)).powi(2))
                    })
                    .product::<f64>();
                (name.clone(), weight)
            })
            .collect();
        self.current_event()?.weights = Some(weights);
        Ok(())
    }

    fn weight(&self, name: &str) -> FfrwResult<f64> {
        let weights = self
            .event
            .as_ref()
            .and_then(|event| event.weights.as_ref())
            .ok_or_else(|| {
                FfrwError::RunStateError("weights requested before compute_event".to_string())
            })?;
        weights
            .get(name)
            .copied()
            .ok_or_else(|| FfrwError::SchemeNotFound {
                name: name.to_string(),
            })
    }
}
