use std::fmt::Display;

use accurate::{sum::Klein, traits::*};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    data::{
        read_truth, write_weights, OutputRecord, ReadOptions, TruthTable, WeightTable,
        WriteOptions,
    },
    engine::{Engine, Reweighter},
    particles::{resolve_oscillation, DecayParticle},
    topology::{DecayTemplate, Role, B0_DSTAR_TAU_NU},
    utils::{
        enums::Units,
        variables::{LeptonEnergy, MissingMass2, Variable, Q2},
    },
    FfrwResult, TruthEvent,
};

/// Name of the input tree holding the truth records.
pub const INPUT_TREE: &str = "mc_dst_tau_aux";
/// Name of the output tree holding the weights.
pub const OUTPUT_TREE: &str = "mc_dst_tau_ff_w";
/// Name of the target form-factor scheme whose weight is written to `w_ff`.
pub const TARGET_SCHEME: &str = "SemiTauonic";
/// Weights above this value are reported, but still written.
pub const WEIGHT_SANITY_THRESHOLD: f64 = 10.0;
/// Decay amplitudes declared to the reweighting engine.
pub const DECAY_MODES: [&str; 2] = ["BD*TauNu", "TauEllNuNu"];
/// The target `(transition, model)` pairs.
pub const TARGET_MODELS: [(&str, &str); 1] = [("BD*", "CLN")];
/// The `(transition, model)` pairs the sample was simulated with.
pub const INPUT_MODELS: [(&str, &str); 1] = [("BD*", "ISGW2")];

/// Configuration of a reweighting run.
///
/// The [`Default`] reproduces the production setup: $`B \to D^* \tau \nu`$ events simulated
/// with ISGW2 form factors are reweighted to CLN.
#[derive(Clone, Debug)]
pub struct ReweightOptions {
    /// The decay chain submitted for every event.
    pub template: DecayTemplate,
    /// Decay amplitudes declared to the engine.
    pub decay_modes: Vec<String>,
    /// Name of the target scheme.
    pub target_scheme: String,
    /// `(transition, model)` pairs of the target scheme.
    pub target_models: Vec<(String, String)>,
    /// `(transition, model)` pairs of the simulated sample.
    pub input_models: Vec<(String, String)>,
    /// Units of the input four-momenta.
    pub units: Units,
    /// Weights above this value are logged as anomalous.
    pub weight_threshold: f64,
    /// Tree to read from ROOT inputs.
    pub input_tree: String,
    /// Tree to write in ROOT outputs.
    pub output_tree: String,
    /// Rows per batch in Parquet outputs.
    pub batch_size: usize,
}

fn owned_pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

impl Default for ReweightOptions {
    fn default() -> Self {
        Self {
            template: B0_DSTAR_TAU_NU,
            decay_modes: DECAY_MODES.iter().map(|mode| mode.to_string()).collect(),
            target_scheme: TARGET_SCHEME.to_string(),
            target_models: owned_pairs(&TARGET_MODELS),
            input_models: owned_pairs(&INPUT_MODELS),
            units: Units::MeV,
            weight_threshold: WEIGHT_SANITY_THRESHOLD,
            input_tree: INPUT_TREE.to_string(),
            output_tree: OUTPUT_TREE.to_string(),
            batch_size: crate::data::DEFAULT_WRITE_BATCH_SIZE,
        }
    }
}

impl ReweightOptions {
    /// Create a new [`Default`] set of [`ReweightOptions`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different decay chain.
    pub fn template(mut self, template: DecayTemplate) -> Self {
        self.template = template;
        self
    }

    /// Replace the declared decay amplitudes.
    pub fn decay_modes<I, S>(mut self, modes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.decay_modes = modes.into_iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Replace the target scheme.
    pub fn target_scheme<S: Into<String>>(mut self, name: S, models: &[(&str, &str)]) -> Self {
        self.target_scheme = name.into();
        self.target_models = owned_pairs(models);
        self
    }

    /// Replace the form factors the sample was simulated with.
    pub fn input_scheme(mut self, models: &[(&str, &str)]) -> Self {
        self.input_models = owned_pairs(models);
        self
    }

    /// Set the units of the input four-momenta.
    pub fn units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }

    /// Set the anomalous-weight threshold.
    pub fn weight_threshold(mut self, threshold: f64) -> Self {
        self.weight_threshold = threshold;
        self
    }

    /// Set the tree read from ROOT inputs.
    pub fn input_tree<S: Into<String>>(mut self, name: S) -> Self {
        self.input_tree = name.into();
        self
    }

    /// Set the tree written to ROOT outputs.
    pub fn output_tree<S: Into<String>>(mut self, name: S) -> Self {
        self.output_tree = name.into();
        self
    }

    /// Set the Parquet batch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Counters accumulated over a reweighting run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Events read from the input.
    pub n_events: usize,
    /// Events whose topology was accepted (one output row each).
    pub n_accepted: usize,
    /// Events whose topology was rejected.
    pub n_rejected: usize,
    /// Accepted events with a weight above the threshold.
    pub n_anomalous: usize,
    /// Compensated sum of all written weights.
    pub sum_weights: f64,
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} events read, {} accepted, {} rejected, {} anomalous weights, sum of weights {:.6}",
            self.n_events, self.n_accepted, self.n_rejected, self.n_anomalous, self.sum_weights
        )
    }
}

/// The three fit variables, bound to the slots of a [`DecayTemplate`].
#[derive(Clone, Debug)]
pub struct FitVariables {
    q2: Q2,
    mm2: MissingMass2,
    el: LeptonEnergy,
}

impl FitVariables {
    /// Bind $`q^2`$, the missing mass squared and $`E_\ell`$ to the slots of `template`.
    pub fn new(template: &DecayTemplate, units: Units) -> Self {
        Self {
            q2: Q2::from_template(template).in_units(units),
            mm2: MissingMass2::from_template(template).in_units(units),
            el: LeptonEnergy::from_template(template).in_units(units),
        }
    }

    /// Evaluate `(q2, mm2, el)` on one event.
    pub fn evaluate(&self, event: &TruthEvent) -> FfrwResult<(f64, f64, f64)> {
        Ok((
            self.q2.value(event)?,
            self.mm2.value(event)?,
            self.el.value(event)?,
        ))
    }
}

/// Configure and initialise a reweighting service for a run.
pub fn configure<R: Reweighter>(engine: &mut R, options: &ReweightOptions) -> FfrwResult<()> {
    fn borrow(pairs: &[(String, String)]) -> Vec<(&str, &str)> {
        pairs
            .iter()
            .map(|(a, b)| (a.as_str(), b.as_str()))
            .collect()
    }
    let modes: Vec<&str> = options.decay_modes.iter().map(String::as_str).collect();
    engine.declare_decay_modes(&modes)?;
    engine.register_ff_scheme(&options.target_scheme, &borrow(&options.target_models))?;
    engine.set_input_ff_scheme(&borrow(&options.input_models))?;
    engine.set_units(&options.units.to_string())?;
    engine.initialize_run()
}

/// The particles of `event` in the slots of `template`, with the flavour of the root fixed by
/// [`resolve_oscillation`]. All other particles are passed through unchanged.
pub fn canonical_particles(
    template: &DecayTemplate,
    event: &TruthEvent,
) -> FfrwResult<IndexMap<Role, DecayParticle>> {
    let root_id = resolve_oscillation(
        event.id(template.root)?,
        event.id(template.flavour_reference)?,
    );
    template
        .particles
        .iter()
        .map(|role| {
            let mut particle = *event.particle(*role)?;
            if *role == template.root {
                particle.id = root_id;
            }
            Ok((*role, particle))
        })
        .collect()
}

/// Reweight one event.
///
/// Returns `Ok(None)` when the engine rejects the decay chain; the event then produces no output.
pub fn reweight_event<R: Reweighter>(
    engine: &mut R,
    event: &TruthEvent,
    variables: &FitVariables,
    options: &ReweightOptions,
) -> FfrwResult<Option<OutputRecord>> {
    let particles = canonical_particles(&options.template, event)?;
    let (q2_true, mm2_true, el_true) = variables.evaluate(event)?;
    let topology = options.template.build(&particles)?;
    engine.begin_event()?;
    if engine.submit_topology(&topology)?.is_none() {
        debug!(
            event_number = event.event_number,
            run_number = event.run_number,
            "decay chain rejected"
        );
        return Ok(None);
    }
    engine.compute_event()?;
    let w_ff = engine.weight(&options.target_scheme)?;
    if w_ff > options.weight_threshold {
        warn!(
            event_number = event.event_number,
            run_number = event.run_number,
            weight = w_ff,
            "Problematic weight"
        );
    }
    Ok(Some(OutputRecord {
        event_number: event.event_number,
        run_number: event.run_number,
        w_ff,
        q2_true,
        mm2_true,
        el_true,
    }))
}

/// Reweight every event of `table` in order with an already configured engine.
///
/// # See Also
/// [`configure`]
pub fn reweight<R: Reweighter>(
    engine: &mut R,
    table: &TruthTable,
    options: &ReweightOptions,
) -> FfrwResult<(WeightTable, RunSummary)> {
    let variables = FitVariables::new(&options.template, options.units);
    let mut weights = WeightTable::new();
    let mut summary = RunSummary::default();
    for event in table.iter() {
        summary.n_events += 1;
        match reweight_event(engine, &event, &variables, options)? {
            Some(record) => {
                if record.w_ff > options.weight_threshold {
                    summary.n_anomalous += 1;
                }
                weights.push(record);
            }
            None => summary.n_rejected += 1,
        }
    }
    summary.n_accepted = weights.len();
    summary.sum_weights = weights
        .weights()
        .iter()
        .copied()
        .sum_with_accumulator::<Klein<f64>>();
    Ok((weights, summary))
}

/// Read `input`, reweight it with `engine`, and write the weights to `output`.
///
/// The input format is chosen from the file extension, as is the output format. The output file
/// is only created once the whole input has been processed.
pub fn run_with<R: Reweighter>(
    engine: &mut R,
    input: &str,
    output: &str,
    options: &ReweightOptions,
) -> FfrwResult<RunSummary> {
    info!(
        input,
        output,
        decay = options.template.name,
        "starting form-factor reweighting"
    );
    options.template.validate()?;
    let table = read_truth(
        input,
        &ReadOptions::new()
            .tree(&options.input_tree)
            .roles(options.template.particles.iter().copied()),
    )?;
    configure(engine, options)?;
    let (weights, summary) = reweight(engine, &table, options)?;
    write_weights(
        &weights,
        output,
        &WriteOptions::new()
            .tree(options.output_tree.clone())
            .batch_size(options.batch_size),
    )?;
    info!("{summary}");
    Ok(summary)
}

/// [`run_with`] using the built-in [`Engine`].
pub fn run(input: &str, output: &str, options: &ReweightOptions) -> FfrwResult<RunSummary> {
    run_with(&mut Engine::new(), input, output, options)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        data::{read_weights, tests::make_temp_dir, write_truth},
        engine::ProcessId,
        particles::PdgId,
        topology::DecayTopology,
        utils::vectors::{Vec3, Vec4},
        FfrwError,
    };

    /// A reweighting service double which accepts events according to a repeating script.
    #[derive(Default)]
    struct Scripted {
        accept: Vec<bool>,
        weights: Vec<f64>,
        calls: Vec<&'static str>,
        submitted: Vec<DecayTopology>,
        initialized: bool,
        event: Option<usize>,
    }

    impl Scripted {
        fn always(accept: bool, weight: f64) -> Self {
            Self {
                accept: vec![accept],
                weights: vec![weight],
                ..Default::default()
            }
        }

        fn scripted<T: Copy>(&self, values: &[T]) -> T {
            let index = self.event.unwrap_or_default();
            values[index % values.len()]
        }
    }

    impl Reweighter for Scripted {
        fn declare_decay_modes(&mut self, _modes: &[&str]) -> FfrwResult<()> {
            self.calls.push("modes");
            Ok(())
        }
        fn register_ff_scheme(&mut self, _name: &str, _models: &[(&str, &str)]) -> FfrwResult<()> {
            self.calls.push("scheme");
            Ok(())
        }
        fn set_input_ff_scheme(&mut self, _models: &[(&str, &str)]) -> FfrwResult<()> {
            self.calls.push("input");
            Ok(())
        }
        fn set_units(&mut self, _units: &str) -> FfrwResult<()> {
            self.calls.push("units");
            Ok(())
        }
        fn initialize_run(&mut self) -> FfrwResult<()> {
            self.calls.push("init");
            self.initialized = true;
            Ok(())
        }
        fn begin_event(&mut self) -> FfrwResult<()> {
            self.calls.push("begin");
            self.event = Some(self.event.map_or(0, |event| event + 1));
            Ok(())
        }
        fn submit_topology(&mut self, topology: &DecayTopology) -> FfrwResult<Option<ProcessId>> {
            self.calls.push("submit");
            self.submitted.push(topology.clone());
            let accepted = self.scripted(&self.accept);
            Ok(accepted.then_some(ProcessId(std::num::NonZeroU64::MIN)))
        }
        fn compute_event(&mut self) -> FfrwResult<()> {
            self.calls.push("compute");
            Ok(())
        }
        fn weight(&self, name: &str) -> FfrwResult<f64> {
            if name != TARGET_SCHEME {
                return Err(FfrwError::SchemeNotFound {
                    name: name.to_string(),
                });
            }
            Ok(self.scripted(&self.weights))
        }
    }

    fn simple_event(event_number: u64, b_id: i32, dst_id: i32) -> TruthEvent {
        let rest = |e: f64| Vec4::new(0.0, 0.0, 0.0, e);
        let particles = B0_DSTAR_TAU_NU
            .particles
            .iter()
            .map(|role| {
                let (id, p4) = match role {
                    Role::B => (b_id, rest(5000.0)),
                    Role::Dst => (dst_id, rest(2000.0)),
                    Role::NuTau | Role::AntiNuTau | Role::AntiNuMu => (16, rest(100.0)),
                    Role::Mu => (13, Vec4::new(300.0, 400.0, 0.0, 600.0)),
                    _ => (211, rest(140.0)),
                };
                (*role, DecayParticle::new(p4, PdgId(id)))
            })
            .collect();
        TruthEvent::new(event_number, 42, particles)
    }

    fn simple_table(n: u64) -> TruthTable {
        let events: Vec<TruthEvent> = (0..n).map(|i| simple_event(100 + i, 511, -413)).collect();
        TruthTable::from_events(&events, B0_DSTAR_TAU_NU.particles).unwrap()
    }

    /// A physically consistent chain: a $`\bar{B}^0`$ recorded as `b_id` decaying at rest.
    fn physical_event(event_number: u64, b_id: i32, dst_pz: f64) -> TruthEvent {
        let p = |role: Role, id: i32, p4: Vec4| (role, DecayParticle::new(p4, PdgId(id)));
        let particles = [
            p(Role::B, b_id, Vec4::new(0.0, 0.0, 0.0, 5279.65)),
            p(Role::Dst, 413, Vec3::new(0.0, 0.0, dst_pz).with_mass(2010.26)),
            p(Role::SlowPi, 211, Vec4::new(0.0, 0.0, 40.0, 150.0)),
            p(Role::D0, 421, Vec4::new(0.0, 0.0, 300.0, 1890.0)),
            p(Role::K, -321, Vec4::new(0.0, 0.0, 150.0, 520.0)),
            p(Role::Pi, 211, Vec4::new(0.0, 0.0, 150.0, 200.0)),
            p(Role::Mu, 13, Vec4::new(100.0, 0.0, 0.0, 150.0)),
            p(Role::Tau, 15, Vec4::new(0.0, 0.0, -dst_pz, 1850.0)),
            p(Role::AntiNuMu, -14, Vec4::new(0.0, 100.0, 0.0, 100.0)),
            p(Role::AntiNuTau, -16, Vec4::new(0.0, 0.0, -100.0, 100.0)),
            p(Role::NuTau, 16, Vec4::new(0.0, -100.0, 0.0, 100.0)),
        ]
        .into_iter()
        .collect();
        TruthEvent::new(event_number, 1, particles)
    }

    #[test]
    fn test_q2_and_missing_mass_scenario() {
        let mut engine = Scripted::always(true, 1.0);
        let options = ReweightOptions::default();
        let variables = FitVariables::new(&options.template, options.units);
        let record = reweight_event(&mut engine, &simple_event(1, 511, -413), &variables, &options)
            .unwrap()
            .unwrap();
        assert_relative_eq!(record.q2_true, 9.0);
        assert_relative_eq!(record.mm2_true, 0.09, epsilon = 1e-12);
        assert_relative_eq!(record.el_true, 0.6);
        assert_relative_eq!(record.w_ff, 1.0);
        assert_eq!(engine.calls, vec!["begin", "submit", "compute"]);
    }

    #[test]
    fn test_sign_fix_applies_to_root_only() {
        let mut engine = Scripted::always(true, 1.0);
        let options = ReweightOptions::default();
        let variables = FitVariables::new(&options.template, options.units);
        reweight_event(&mut engine, &simple_event(1, 511, 413), &variables, &options).unwrap();
        reweight_event(&mut engine, &simple_event(2, 511, -413), &variables, &options).unwrap();
        let ids = |topology: &DecayTopology| -> Vec<i32> {
            topology.particles().iter().map(|p| p.id.0).collect()
        };
        let flipped = ids(&engine.submitted[0]);
        let kept = ids(&engine.submitted[1]);
        assert_eq!(flipped[0], -511);
        assert_eq!(flipped[1], 413);
        assert_eq!(kept[0], 511);
        assert_eq!(&flipped[2..], &kept[2..]);
    }

    #[test]
    fn test_topology_is_the_same_for_the_same_event() {
        let mut engine = Scripted::always(true, 1.0);
        let options = ReweightOptions::default();
        let variables = FitVariables::new(&options.template, options.units);
        let event = simple_event(1, 511, -413);
        reweight_event(&mut engine, &event, &variables, &options).unwrap();
        reweight_event(&mut engine, &event, &variables, &options).unwrap();
        assert_eq!(engine.submitted[0], engine.submitted[1]);
        assert_eq!(engine.submitted[0].vertices().len(), 4);
    }

    #[test]
    fn test_rejected_events_produce_no_rows() {
        let mut engine = Scripted::always(false, 1.0);
        let (weights, summary) =
            reweight(&mut engine, &simple_table(5), &ReweightOptions::default()).unwrap();
        assert!(weights.is_empty());
        assert_eq!(summary.n_events, 5);
        assert_eq!(summary.n_rejected, 5);
        assert_eq!(summary.n_accepted, 0);
        assert!(!engine.calls.contains(&"compute"));
    }

    #[test]
    fn test_output_preserves_input_order() {
        let mut engine = Scripted {
            accept: vec![true, false, true],
            weights: vec![0.5, 0.0, 2.0],
            ..Default::default()
        };
        let table = simple_table(7);
        let (weights, summary) =
            reweight(&mut engine, &table, &ReweightOptions::default()).unwrap();
        assert_eq!(weights.event_numbers(), &[100, 102, 103, 105, 106]);
        assert_eq!(weights.weights(), &[0.5, 2.0, 0.5, 2.0, 0.5]);
        assert!(weights.run_numbers().iter().all(|run| *run == 42));
        assert_eq!(summary.n_accepted + summary.n_rejected, table.n_events());
    }

    #[test]
    fn test_anomalous_weights_are_kept() {
        let mut engine = Scripted::always(true, 12.5);
        let (weights, summary) =
            reweight(&mut engine, &simple_table(3), &ReweightOptions::default()).unwrap();
        assert_eq!(weights.len(), 3);
        assert_eq!(summary.n_anomalous, 3);
        assert_relative_eq!(summary.sum_weights, 37.5);
        let (_, summary) = reweight(
            &mut Scripted::always(true, 12.5),
            &simple_table(3),
            &ReweightOptions::default().weight_threshold(20.0),
        )
        .unwrap();
        assert_eq!(summary.n_anomalous, 0);
    }

    #[test]
    fn test_configure_call_order() {
        let mut engine = Scripted::default();
        configure(&mut engine, &ReweightOptions::default()).unwrap();
        assert_eq!(engine.calls, vec!["modes", "scheme", "input", "units", "init"]);
        assert!(engine.initialized);
    }

    #[test]
    fn test_run_with_all_rejected_still_writes_output() {
        let dir = make_temp_dir();
        let input = dir.join("input.parquet");
        let output = dir.join("output.parquet");
        write_truth(
            &simple_table(4),
            input.to_str().unwrap(),
            &WriteOptions::new(),
        )
        .unwrap();
        let summary = run_with(
            &mut Scripted::always(false, 1.0),
            input.to_str().unwrap(),
            output.to_str().unwrap(),
            &ReweightOptions::default(),
        )
        .unwrap();
        assert_eq!(summary.n_rejected, 4);
        let written = read_weights(output.to_str().unwrap(), None).unwrap();
        assert!(written.is_empty());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_unreadable_input_creates_no_output() {
        let dir = make_temp_dir();
        let output = dir.join("output.root");
        let result = run(
            dir.join("missing.root").to_str().unwrap(),
            output.to_str().unwrap(),
            &ReweightOptions::default(),
        );
        assert!(result.is_err());
        assert!(!output.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_run_with_builtin_engine() {
        let dir = make_temp_dir();
        let input = dir.join("input.root");
        let output = dir.join("output.root");
        let mut events: Vec<TruthEvent> = (0..6)
            .map(|i| {
                let b_id = if i % 2 == 0 { 511 } else { -511 };
                physical_event(i, b_id, 200.0 * i as f64)
            })
            .collect();
        // a charge-violating slow pion cannot match any amplitude
        events[3].particles[&Role::SlowPi].id = PdgId(-211);
        let table = TruthTable::from_events(&events, B0_DSTAR_TAU_NU.particles).unwrap();
        write_truth(
            &table,
            input.to_str().unwrap(),
            &WriteOptions::new().tree(INPUT_TREE),
        )
        .unwrap();
        let summary = run(
            input.to_str().unwrap(),
            output.to_str().unwrap(),
            &ReweightOptions::default(),
        )
        .unwrap();
        assert_eq!(summary.n_events, 6);
        assert_eq!(summary.n_rejected, 1);
        let written = read_weights(output.to_str().unwrap(), Some(OUTPUT_TREE)).unwrap();
        assert_eq!(written.event_numbers(), &[0, 1, 2, 4, 5]);
        // zero recoil for the first event
        assert_relative_eq!(written.weights()[0], 1.0, epsilon = 1e-9);
        assert!(written.weights().iter().all(|w| *w > 0.0 && w.is_finite()));
        assert_relative_eq!(
            summary.sum_weights,
            written.weights().iter().sum::<f64>(),
            epsilon = 1e-12
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
