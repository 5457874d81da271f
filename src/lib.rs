//! # ffrw
//!
//! Form-factor reweighting of simulated $`\bar{B}^0 \to D^{*+} \tau^- \bar{\nu}_\tau`$ decays.
//!
//! Monte Carlo samples are generated with one hadronic form-factor model. To study a different
//! model without regenerating the sample, every event receives a weight equal to the ratio of the
//! decay rates predicted by the two models at the event's truth kinematics. This crate reads the
//! truth-level four-momenta and particle codes of each event, describes the decay chain to a
//! reweighting engine, and writes one row per accepted event containing the weight together with
//! the truth values of the analysis fit variables:
//!
//! | Column        | Data Type | Interpretation                                              |
//! | ------------- | --------- | ----------------------------------------------------------- |
//! | `eventNumber` | `u64`     | Event number copied from the input                          |
//! | `runNumber`   | `u32`     | Run number copied from the input                            |
//! | `w_ff`        | `f64`     | Form-factor weight (target scheme over simulated scheme)    |
//! | `q2_true`     | `f64`     | $`q^2 = (p_B - p_{D^*})^2`$ in $`\text{GeV}^2`$              |
//! | `mm2_true`    | `f64`     | Missing mass squared of the three neutrinos in $`\text{GeV}^2`$ |
//! | `el_true`     | `f64`     | Muon energy in the $`B`$ rest frame in $`\text{GeV}`$        |
//!
//! # Decay chains
//!
//! The decay chain is never assembled by hand. A [`DecayTemplate`] lists the particle slots
//! ([`Role`]s) and the vertices connecting them, and [`DecayTemplate::build`] turns one event's
//! particles into a [`DecayTopology`]. Adding a new decay mode means adding a new template:
//!
//! ```
//! use ffrw::topology::{Role, B0_DSTAR_TAU_NU};
//!
//! assert_eq!(B0_DSTAR_TAU_NU.root, Role::B);
//! assert_eq!(B0_DSTAR_TAU_NU.vertices.len(), 4);
//! ```
//!
//! # Reweighting engines
//!
//! Any type implementing [`Reweighter`] can be used to compute weights. The crate ships
//! [`Engine`], which matches the submitted decay chain against the declared decay modes and
//! evaluates the ratio of universal form-factor shapes (see [`engine::form_factors`]).
//!
//! ```no_run
//! use ffrw::{reweight::run, ReweightOptions};
//!
//! let summary = run("~/ntuples/mc.root", "weights.root", &ReweightOptions::default())?;
//! println!("{summary}");
//! # Ok::<(), ffrw::FfrwError>(())
//! ```
#![warn(clippy::perf, clippy::style)]
#![allow(clippy::excessive_precision)]

use thiserror::Error;

/// Methods for loading and storing truth-level events and reweighting results.
pub mod data;
/// The reweighting service interface and the built-in form-factor engine.
pub mod engine;
/// Particle codes and the particles submitted to a reweighting engine.
pub mod particles;
/// Comparisons between weighted and unweighted distributions.
pub mod ratio;
/// The per-event reweighting loop and its configuration.
pub mod reweight;
/// Declarative decay-chain templates and the per-event decay topology.
pub mod topology;
/// Utility functions, enums, and traits
pub mod utils;
/// Useful traits for all crate structs
pub mod traits {
    pub use crate::engine::form_factors::FormFactor;
    pub use crate::engine::Reweighter;
    pub use crate::utils::variables::Variable;
}

pub use crate::data::{OutputRecord, TruthEvent, TruthTable, WeightTable};
pub use crate::engine::{Engine, ProcessId, Reweighter};
pub use crate::particles::{DecayParticle, PdgId};
pub use crate::reweight::{ReweightOptions, RunSummary};
pub use crate::topology::{DecayTemplate, DecayTopology, Role};
pub use crate::utils::enums::{Observable, Units};
pub use crate::utils::variables::{LeptonEnergy, MissingMass2, Q2};
pub use crate::utils::vectors::{Vec3, Vec4};

/// Shorthand for results returned by this crate.
pub type FfrwResult<T> = Result<T, FfrwError>;

/// The error type used by all `ffrw` internal methods
#[derive(Error, Debug)]
pub enum FfrwError {
    /// An alias for [`std::io::Error`].
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
    /// An alias for [`parquet::errors::ParquetError`].
    #[error("Parquet Error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),
    /// An alias for [`arrow::error::ArrowError`].
    #[error("Arrow Error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),
    /// An alias for [`shellexpand::LookupError`].
    #[error("Failed to expand path: {0}")]
    LookupError(#[from] shellexpand::LookupError<std::env::VarError>),
    /// A required column is not present in the input table.
    #[error("Column \"{name}\" not found!")]
    MissingColumn {
        /// Name of the missing column
        name: String,
    },
    /// A column exists but holds a type which cannot be read as requested.
    #[error("Column \"{name}\" has unsupported type {datatype}!")]
    InvalidColumnType {
        /// Name of the column
        name: String,
        /// The type found in the file
        datatype: String,
    },
    /// Columns of the same table have different lengths.
    #[error("{context}: expected {expected} rows but found {actual}")]
    LengthMismatch {
        /// Where the mismatch was found
        context: String,
        /// Expected number of rows
        expected: usize,
        /// Actual number of rows
        actual: usize,
    },
    /// A column holds a null entry where every row needs a value.
    #[error("Column \"{name}\" contains {count} null value(s)!")]
    NullValue {
        /// Name of the column
        name: String,
        /// Number of null entries
        count: usize,
    },
    /// An integer column holds a value outside the range of its logical type.
    #[error("Value {value} in column \"{name}\" does not fit in {target}!")]
    ValueOutOfRange {
        /// Name of the column
        name: String,
        /// The offending value
        value: String,
        /// The logical type of the column
        target: &'static str,
    },
    /// An error which occurs when the user tries to parse an invalid string of text, typically
    /// into an enum variant.
    #[error("Failed to parse string: \"{name}\" does not correspond to a valid \"{object}\"!")]
    ParseError {
        /// The string which was parsed
        name: String,
        /// The name of the object it failed to parse into
        object: String,
    },
    /// A decay topology violates the tree structure required by reweighting engines.
    #[error("Invalid decay topology: {reason}")]
    InvalidTopology {
        /// What is wrong with the topology
        reason: String,
    },
    /// A particle slot needed by a template is absent from an event.
    #[error("Event has no particle in slot \"{role}\"!")]
    MissingParticle {
        /// The particle slot
        role: Role,
    },
    /// A reweighting-service call was made in the wrong phase of a run.
    #[error("Reweighting run misuse: {0}")]
    RunStateError(String),
    /// The requested form-factor scheme was never registered.
    #[error("No form-factor scheme registered with name \"{name}\"!")]
    SchemeNotFound {
        /// Name of the scheme which failed lookup
        name: String,
    },
    /// The file extension does not correspond to a supported table format.
    #[error("Unsupported file format \"{extension}\" (expected \"root\" or \"parquet\")")]
    UnsupportedFormat {
        /// The extension which was found
        extension: String,
    },
    /// A custom fallback error for errors too complex or too infrequent to warrant their own error
    /// category.
    #[error("{0}")]
    Custom(String),
}
