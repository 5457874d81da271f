use std::fmt::Display;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    particles::{DecayParticle, PdgId},
    topology::{Role, B0_DSTAR_TAU_NU},
    utils::{enums::Observable, vectors::Vec4},
    FfrwError, FfrwResult,
};

/// Readers and writers for ROOT and Parquet tables.
pub mod io;

pub use io::{
    read_truth, read_truth_parquet, read_truth_root, read_weights, read_weights_parquet,
    read_weights_root, write_truth, write_truth_parquet, write_truth_root, write_weights,
    write_weights_parquet, write_weights_root, FileFormat,
};

/// Default number of rows per Parquet batch.
pub const DEFAULT_WRITE_BATCH_SIZE: usize = 10_000;

/// Column holding the event number in both input and output tables.
pub const EVENT_NUMBER_COLUMN: &str = "eventNumber";
/// Column holding the run number in both input and output tables.
pub const RUN_NUMBER_COLUMN: &str = "runNumber";
/// Column holding the form-factor weight in output tables.
pub const WEIGHT_COLUMN: &str = "w_ff";

/// The truth record of a single simulated event.
///
/// Particles are keyed by their [`Role`] in the decay chain, so code consuming a [`TruthEvent`]
/// never depends on column names or on the order in which columns were read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TruthEvent {
    /// The simulated event number.
    pub event_number: u64,
    /// The simulated run number.
    pub run_number: u32,
    /// Raw particle codes and lab-frame four-momenta, keyed by slot.
    pub particles: IndexMap<Role, DecayParticle>,
}

impl Display for TruthEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Event {} (run {}):", self.event_number, self.run_number)?;
        for (role, particle) in &self.particles {
            writeln!(f, "  {:<8} {}", role.prefix(), particle)?;
        }
        Ok(())
    }
}

impl TruthEvent {
    /// Create a new event.
    pub fn new(
        event_number: u64,
        run_number: u32,
        particles: IndexMap<Role, DecayParticle>,
    ) -> Self {
        Self {
            event_number,
            run_number,
            particles,
        }
    }

    /// The particle filling `role`.
    pub fn particle(&self, role: Role) -> FfrwResult<&DecayParticle> {
        self.particles
            .get(&role)
            .ok_or(FfrwError::MissingParticle { role })
    }

    /// The four-momentum of the particle filling `role`.
    pub fn p4(&self, role: Role) -> FfrwResult<Vec4> {
        Ok(self.particle(role)?.p4)
    }

    /// The raw code of the particle filling `role`.
    pub fn id(&self, role: Role) -> FfrwResult<PdgId> {
        Ok(self.particle(role)?.id)
    }
}

/// The columns of one particle slot.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ParticleColumns {
    pub(crate) id: Vec<i32>,
    pub(crate) px: Vec<f64>,
    pub(crate) py: Vec<f64>,
    pub(crate) pz: Vec<f64>,
    pub(crate) e: Vec<f64>,
}

impl ParticleColumns {
    fn check_len(&self, role: Role, expected: usize) -> FfrwResult<()> {
        for (suffix, actual) in [
            ("id", self.id.len()),
            ("true_px", self.px.len()),
            ("true_py", self.py.len()),
            ("true_pz", self.pz.len()),
            ("true_pe", self.e.len()),
        ] {
            if actual != expected {
                return Err(FfrwError::LengthMismatch {
                    context: format!("Column \"{}_{suffix}\"", role.prefix()),
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    fn particle(&self, index: usize) -> DecayParticle {
        DecayParticle::new(
            Vec4::new(self.px[index], self.py[index], self.pz[index], self.e[index]),
            PdgId(self.id[index]),
        )
    }

    fn push(&mut self, particle: &DecayParticle) {
        self.id.push(particle.id.0);
        self.px.push(particle.p4.px());
        self.py.push(particle.p4.py());
        self.pz.push(particle.p4.pz());
        self.e.push(particle.p4.e());
    }
}

/// A columnar table of truth records, as read from an input file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TruthTable {
    pub(crate) event_number: Vec<u64>,
    pub(crate) run_number: Vec<u32>,
    pub(crate) particles: IndexMap<Role, ParticleColumns>,
}

impl TruthTable {
    pub(crate) fn from_columns(
        event_number: Vec<u64>,
        run_number: Vec<u32>,
        particles: IndexMap<Role, ParticleColumns>,
    ) -> FfrwResult<Self> {
        let n_events = event_number.len();
        if run_number.len() != n_events {
            return Err(FfrwError::LengthMismatch {
                context: format!("Column \"{RUN_NUMBER_COLUMN}\""),
                expected: n_events,
                actual: run_number.len(),
            });
        }
        for (role, columns) in &particles {
            columns.check_len(*role, n_events)?;
        }
        Ok(Self {
            event_number,
            run_number,
            particles,
        })
    }

    /// Assemble a table from events; every event must fill every slot in `roles`.
    pub fn from_events(events: &[TruthEvent], roles: &[Role]) -> FfrwResult<Self> {
        let mut table = Self {
            event_number: Vec::with_capacity(events.len()),
            run_number: Vec::with_capacity(events.len()),
            particles: roles
                .iter()
                .map(|role| (*role, ParticleColumns::default()))
                .collect(),
        };
        for event in events {
            table.push(event)?;
        }
        Ok(table)
    }

    /// Append one event.
    pub fn push(&mut self, event: &TruthEvent) -> FfrwResult<()> {
        // check before touching any column so a failed push leaves the table consistent
        for role in self.particles.keys() {
            event.particle(*role)?;
        }
        self.event_number.push(event.event_number);
        self.run_number.push(event.run_number);
        for (role, columns) in self.particles.iter_mut() {
            columns.push(event.particle(*role)?);
        }
        Ok(())
    }

    /// The number of events in the table.
    pub fn n_events(&self) -> usize {
        self.event_number.len()
    }

    /// Whether the table holds no events.
    pub fn is_empty(&self) -> bool {
        self.event_number.is_empty()
    }

    /// The particle slots present in the table.
    pub fn roles(&self) -> Vec<Role> {
        self.particles.keys().copied().collect()
    }

    /// Materialise the event at `index`.
    pub fn event(&self, index: usize) -> Option<TruthEvent> {
        if index >= self.n_events() {
            return None;
        }
        Some(TruthEvent {
            event_number: self.event_number[index],
            run_number: self.run_number[index],
            particles: self
                .particles
                .iter()
                .map(|(role, columns)| (*role, columns.particle(index)))
                .collect(),
        })
    }

    /// Iterate over events in table order.
    pub fn iter(&self) -> impl Iterator<Item = TruthEvent> + '_ {
        (0..self.n_events()).filter_map(move |index| self.event(index))
    }
}

/// One row of the output table.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Event number copied from the input.
    pub event_number: u64,
    /// Run number copied from the input.
    pub run_number: u32,
    /// The form-factor weight.
    pub w_ff: f64,
    /// $`q^2`$ in $`\text{GeV}^2`$.
    pub q2_true: f64,
    /// Missing mass squared in $`\text{GeV}^2`$.
    pub mm2_true: f64,
    /// Lepton energy in the parent rest frame in GeV.
    pub el_true: f64,
}

impl OutputRecord {
    /// The value of a fit variable.
    pub fn observable(&self, observable: Observable) -> f64 {
        match observable {
            Observable::Q2 => self.q2_true,
            Observable::MissingMass2 => self.mm2_true,
            Observable::LeptonEnergy => self.el_true,
        }
    }
}

/// An append-only columnar table of [`OutputRecord`]s.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeightTable {
    pub(crate) event_number: Vec<u64>,
    pub(crate) run_number: Vec<u32>,
    pub(crate) w_ff: Vec<f64>,
    pub(crate) q2_true: Vec<f64>,
    pub(crate) mm2_true: Vec<f64>,
    pub(crate) el_true: Vec<f64>,
}

impl WeightTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn push(&mut self, record: OutputRecord) {
        self.event_number.push(record.event_number);
        self.run_number.push(record.run_number);
        self.w_ff.push(record.w_ff);
        self.q2_true.push(record.q2_true);
        self.mm2_true.push(record.mm2_true);
        self.el_true.push(record.el_true);
    }

    /// The number of rows.
    pub fn len(&self) -> usize {
        self.event_number.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.event_number.is_empty()
    }

    /// The row at `index`.
    pub fn record(&self, index: usize) -> Option<OutputRecord> {
        if index >= self.len() {
            return None;
        }
        Some(OutputRecord {
            event_number: self.event_number[index],
            run_number: self.run_number[index],
            w_ff: self.w_ff[index],
            q2_true: self.q2_true[index],
            mm2_true: self.mm2_true[index],
            el_true: self.el_true[index],
        })
    }

    /// Iterate over rows in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = OutputRecord> + '_ {
        (0..self.len()).filter_map(move |index| self.record(index))
    }

    /// The event numbers.
    pub fn event_numbers(&self) -> &[u64] {
        &self.event_number
    }

    /// The run numbers.
    pub fn run_numbers(&self) -> &[u32] {
        &self.run_number
    }

    /// The form-factor weights.
    pub fn weights(&self) -> &[f64] {
        &self.w_ff
    }

    /// The values of a fit variable.
    pub fn column(&self, observable: Observable) -> &[f64] {
        match observable {
            Observable::Q2 => &self.q2_true,
            Observable::MissingMass2 => &self.mm2_true,
            Observable::LeptonEnergy => &self.el_true,
        }
    }
}

impl FromIterator<OutputRecord> for WeightTable {
    fn from_iter<T: IntoIterator<Item = OutputRecord>>(iter: T) -> Self {
        let mut table = Self::new();
        for record in iter {
            table.push(record);
        }
        table
    }
}

/// Options for reading a [`TruthTable`] from a file.
///
/// # See Also
/// [`read_truth`]
#[derive(Clone, Debug)]
pub struct ReadOptions {
    /// Name of the tree to read when loading ROOT files. When absent and the file contains a
    /// single tree, it will be selected automatically.
    pub tree: Option<String>,
    /// Particle slots to read; each needs `<prefix>_id` and `<prefix>_true_p{e,x,y,z}` columns.
    pub roles: Vec<Role>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            tree: None,
            roles: B0_DSTAR_TAU_NU.particles.to_vec(),
        }
    }
}

impl ReadOptions {
    /// Create a new [`Default`] set of [`ReadOptions`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the tree to read when opening ROOT files.
    pub fn tree<S>(mut self, name: S) -> Self
    where
        S: AsRef<str>,
    {
        self.tree = Some(name.as_ref().to_string());
        self
    }

    /// Select the particle slots to read (defaults to every slot of the $`B \to D^* \tau \nu`$
    /// chain).
    pub fn roles<I>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = Role>,
    {
        self.roles = roles.into_iter().collect();
        self
    }
}

/// Options for writing tables to disk.
#[derive(Clone, Debug)]
pub struct WriteOptions {
    /// Number of rows to include in each batch when writing Parquet files.
    pub batch_size: usize,
    /// Tree name to use when writing ROOT files.
    pub tree: Option<String>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_WRITE_BATCH_SIZE,
            tree: None,
        }
    }
}

impl WriteOptions {
    /// Create a new [`Default`] set of [`WriteOptions`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the batch size used for writing; defaults to 10_000.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the ROOT tree name (defaults to \"events\").
    pub fn tree<S: Into<String>>(mut self, name: S) -> Self {
        self.tree = Some(name.into());
        self
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{env, fs, path::PathBuf};

    use approx::assert_relative_eq;

    use super::*;
    use crate::topology::B0_DSTAR_MU_NU;

    pub(crate) fn make_temp_dir() -> PathBuf {
        let dir = env::temp_dir().join(format!("ffrw_test_{}", fastrand::u64(..)));
        fs::create_dir(&dir).expect("temp dir should be created");
        dir
    }

    /// A set of events with distinct, role-dependent kinematics.
    pub(crate) fn sample_events(n: usize, roles: &[Role]) -> Vec<TruthEvent> {
        (0..n)
            .map(|i| {
                let particles = roles
                    .iter()
                    .enumerate()
                    .map(|(j, role)| {
                        let p4 = Vec4::new(
                            (i * 10 + j) as f64,
                            -(j as f64) * 1.5,
                            i as f64 * 0.25,
                            1000.0 + (i * 100 + j) as f64,
                        );
                        (*role, DecayParticle::new(p4, PdgId(j as i32 - 5)))
                    })
                    .collect();
                TruthEvent::new(1_000 + i as u64, 7 + (i % 3) as u32, particles)
            })
            .collect()
    }

    #[test]
    fn test_truth_table_events() {
        let events = sample_events(4, B0_DSTAR_TAU_NU.particles);
        let table = TruthTable::from_events(&events, B0_DSTAR_TAU_NU.particles).unwrap();
        assert_eq!(table.n_events(), 4);
        assert_eq!(table.roles(), B0_DSTAR_TAU_NU.particles.to_vec());
        assert_eq!(table.event(2).unwrap(), events[2]);
        assert!(table.event(4).is_none());
        assert_eq!(table.iter().collect::<Vec<_>>(), events);
    }

    #[test]
    fn test_truth_table_rejects_incomplete_event() {
        let events = sample_events(1, B0_DSTAR_MU_NU.particles);
        let mut table = TruthTable::from_events(&[], B0_DSTAR_TAU_NU.particles).unwrap();
        assert!(matches!(
            table.push(&events[0]),
            Err(FfrwError::MissingParticle { .. })
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn test_length_mismatch_is_detected() {
        let mut particles = IndexMap::new();
        particles.insert(
            Role::Mu,
            ParticleColumns {
                id: vec![13, 13],
                px: vec![0.0, 0.0],
                py: vec![0.0, 0.0],
                pz: vec![0.0],
                e: vec![105.0, 105.0],
            },
        );
        let result = TruthTable::from_columns(vec![1, 2], vec![1, 1], particles);
        assert!(matches!(
            result,
            Err(FfrwError::LengthMismatch {
                expected: 2,
                actual: 1,
                ..
            })
        ));
        assert!(TruthTable::from_columns(vec![1, 2], vec![1], IndexMap::new()).is_err());
    }

    #[test]
    fn test_truth_event_accessors() {
        let event = &sample_events(1, &[Role::B, Role::Dst])[0];
        assert_eq!(event.id(Role::Dst).unwrap(), PdgId(-4));
        assert_relative_eq!(event.p4(Role::B).unwrap().e(), 1000.0);
        assert!(event.p4(Role::Tau).is_err());
        assert!(event.to_string().starts_with("Event 1000 (run 7):"));
    }

    #[test]
    fn test_weight_table() {
        let records: Vec<OutputRecord> = (0..3)
            .map(|i| OutputRecord {
                event_number: i,
                run_number: 2,
                w_ff: 1.0 + i as f64,
                q2_true: 4.0,
                mm2_true: 1.5,
                el_true: 0.75,
            })
            .collect();
        let table: WeightTable = records.iter().copied().collect();
        assert_eq!(table.len(), 3);
        assert_eq!(table.weights(), &[1.0, 2.0, 3.0]);
        assert_eq!(table.column(Observable::LeptonEnergy), &[0.75; 3]);
        assert_eq!(table.record(1), Some(records[1]));
        assert_eq!(table.iter().count(), 3);
        assert_relative_eq!(records[0].observable(Observable::MissingMass2), 1.5);
    }

    #[test]
    fn test_options_builders() {
        let read = ReadOptions::new().tree("t").roles(B0_DSTAR_MU_NU.particles.to_vec());
        assert_eq!(read.tree.as_deref(), Some("t"));
        assert_eq!(read.roles.len(), 8);
        assert_eq!(ReadOptions::default().roles.len(), 11);
        let write = WriteOptions::new().batch_size(5).tree("out");
        assert_eq!(write.batch_size, 5);
        assert_eq!(write.tree.as_deref(), Some("out"));
        assert_eq!(WriteOptions::default().batch_size, DEFAULT_WRITE_BATCH_SIZE);
    }
}
