//! Table I/O for truth records and weights.

use std::{
    fs::File,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use arrow::{
    array::{
        Array, ArrayRef, Float32Array, Float64Array, Int32Array, Int64Array, UInt32Array,
        UInt64Array,
    },
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use indexmap::IndexMap;
use oxyroot::{Branch, Named, ReaderTree, RootFile, WriterTree};
use parquet::arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter};
use tracing::debug;

use super::{
    ParticleColumns, ReadOptions, TruthTable, WeightTable, WriteOptions, EVENT_NUMBER_COLUMN,
    RUN_NUMBER_COLUMN, WEIGHT_COLUMN,
};
use crate::{topology::Role, utils::enums::Observable, FfrwError, FfrwResult};

/// The on-disk table formats understood by this crate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileFormat {
    /// A ROOT file holding a `TTree`.
    Root,
    /// An Apache Parquet file.
    Parquet,
}

impl FromStr for FileFormat {
    type Err = FfrwError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "root" => Ok(Self::Root),
            "parquet" | "pq" => Ok(Self::Parquet),
            _ => Err(FfrwError::UnsupportedFormat {
                extension: s.to_string(),
            }),
        }
    }
}

impl FileFormat {
    /// Determine the format from the extension of `path`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> FfrwResult<Self> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .parse()
    }
}

fn canonicalize_input_path(file_path: &str) -> FfrwResult<PathBuf> {
    Ok(Path::new(&*shellexpand::full(file_path)?).canonicalize()?)
}

fn expand_output_path(file_path: &str) -> FfrwResult<PathBuf> {
    Ok(PathBuf::from(&*shellexpand::full(file_path)?))
}

fn map_root_error<E: std::fmt::Display>(context: &str, err: E) -> FfrwError {
    FfrwError::Custom(format!("{context}: {err}"))
}

fn component_columns(role: Role) -> [String; 5] {
    let prefix = role.prefix();
    [
        format!("{prefix}_id"),
        format!("{prefix}_true_px"),
        format!("{prefix}_true_py"),
        format!("{prefix}_true_pz"),
        format!("{prefix}_true_pe"),
    ]
}

/// An integer column as stored on disk, before conversion to its logical type.
enum IntColumn {
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
}

impl IntColumn {
    fn convert<T>(self, name: &str, target: &'static str) -> FfrwResult<Vec<T>>
    where
        T: TryFrom<i32> + TryFrom<u32> + TryFrom<i64> + TryFrom<u64>,
    {
        fn cast<S, T>(values: Vec<S>, name: &str, target: &'static str) -> FfrwResult<Vec<T>>
        where
            S: Copy + std::fmt::Display,
            T: TryFrom<S>,
        {
            values
                .into_iter()
                .map(|value| {
                    T::try_from(value).map_err(|_| FfrwError::ValueOutOfRange {
                        name: name.to_string(),
                        value: value.to_string(),
                        target,
                    })
                })
                .collect()
        }
        match self {
            IntColumn::I32(values) => cast(values, name, target),
            IntColumn::U32(values) => cast(values, name, target),
            IntColumn::I64(values) => cast(values, name, target),
            IntColumn::U64(values) => cast(values, name, target),
        }
    }
}

/// Random access to named columns of a table, independent of the storage backend.
trait ColumnSource {
    fn float_column(&self, name: &str) -> FfrwResult<Vec<f64>>;
    fn int_column(&self, name: &str) -> FfrwResult<IntColumn>;
}

fn truth_from_source<S: ColumnSource>(source: &S, roles: &[Role]) -> FfrwResult<TruthTable> {
    let event_number = source
        .int_column(EVENT_NUMBER_COLUMN)?
        .convert::<u64>(EVENT_NUMBER_COLUMN, "u64")?;
    let run_number = source
        .int_column(RUN_NUMBER_COLUMN)?
        .convert::<u32>(RUN_NUMBER_COLUMN, "u32")?;
    let mut particles = IndexMap::with_capacity(roles.len());
    for role in roles {
        let [id, px, py, pz, e] = component_columns(*role);
        particles.insert(
            *role,
            ParticleColumns {
                id: source.int_column(&id)?.convert::<i32>(&id, "i32")?,
                px: source.float_column(&px)?,
                py: source.float_column(&py)?,
                pz: source.float_column(&pz)?,
                e: source.float_column(&e)?,
            },
        );
    }
    TruthTable::from_columns(event_number, run_number, particles)
}

fn weights_from_source<S: ColumnSource>(source: &S) -> FfrwResult<WeightTable> {
    let table = WeightTable {
        event_number: source
            .int_column(EVENT_NUMBER_COLUMN)?
            .convert::<u64>(EVENT_NUMBER_COLUMN, "u64")?,
        run_number: source
            .int_column(RUN_NUMBER_COLUMN)?
            .convert::<u32>(RUN_NUMBER_COLUMN, "u32")?,
        w_ff: source.float_column(WEIGHT_COLUMN)?,
        q2_true: source.float_column(Observable::Q2.column())?,
        mm2_true: source.float_column(Observable::MissingMass2.column())?,
        el_true: source.float_column(Observable::LeptonEnergy.column())?,
    };
    let expected = table.event_number.len();
    for (name, actual) in [
        (RUN_NUMBER_COLUMN, table.run_number.len()),
        (WEIGHT_COLUMN, table.w_ff.len()),
        (Observable::Q2.column(), table.q2_true.len()),
        (Observable::MissingMass2.column(), table.mm2_true.len()),
        (Observable::LeptonEnergy.column(), table.el_true.len()),
    ] {
        if actual != expected {
            return Err(FfrwError::LengthMismatch {
                context: format!("Column \"{name}\""),
                expected,
                actual,
            });
        }
    }
    Ok(table)
}

struct ParquetColumns {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl ParquetColumns {
    fn open(file_path: &str) -> FfrwResult<Self> {
        let path = canonicalize_input_path(file_path)?;
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let schema = builder.schema().clone();
        let batches = builder.build()?.collect::<Result<Vec<_>, _>>()?;
        Ok(Self { schema, batches })
    }

    fn data_type(&self, name: &str) -> FfrwResult<&DataType> {
        self.schema
            .field_with_name(name)
            .map(|field| field.data_type())
            .map_err(|_| FfrwError::MissingColumn {
                name: name.to_string(),
            })
    }

    fn arrays<'a>(&'a self, name: &str) -> FfrwResult<Vec<&'a ArrayRef>> {
        self.data_type(name)?;
        let arrays = self
            .batches
            .iter()
            .map(|batch| {
                batch
                    .column_by_name(name)
                    .ok_or_else(|| FfrwError::MissingColumn {
                        name: name.to_string(),
                    })
            })
            .collect::<FfrwResult<Vec<_>>>()?;
        let count: usize = arrays.iter().map(|array| array.null_count()).sum();
        if count > 0 {
            return Err(FfrwError::NullValue {
                name: name.to_string(),
                count,
            });
        }
        Ok(arrays)
    }
}

fn invalid_type(name: &str, datatype: &DataType) -> FfrwError {
    FfrwError::InvalidColumnType {
        name: name.to_string(),
        datatype: datatype.to_string(),
    }
}

impl ColumnSource for ParquetColumns {
    fn float_column(&self, name: &str) -> FfrwResult<Vec<f64>> {
        let mut values = Vec::new();
        for array in self.arrays(name)? {
            let any = array.as_any();
            if let Some(array) = any.downcast_ref::<Float64Array>() {
                values.extend(array.values().iter().copied());
            } else if let Some(array) = any.downcast_ref::<Float32Array>() {
                values.extend(array.values().iter().map(|value| *value as f64));
            } else {
                return Err(invalid_type(name, array.data_type()));
            }
        }
        Ok(values)
    }

    fn int_column(&self, name: &str) -> FfrwResult<IntColumn> {
        let arrays = self.arrays(name)?;
        let datatype = self.data_type(name)?.clone();
        macro_rules! gather {
            ($array:ty, $variant:ident) => {{
                let mut values = Vec::new();
                for array in &arrays {
                    let array = array
                        .as_any()
                        .downcast_ref::<$array>()
                        .ok_or_else(|| invalid_type(name, array.data_type()))?;
                    values.extend(array.values().iter().copied());
                }
                Ok(IntColumn::$variant(values))
            }};
        }
        match datatype {
            DataType::Int32 => gather!(Int32Array, I32),
            DataType::UInt32 => gather!(UInt32Array, U32),
            DataType::Int64 => gather!(Int64Array, I64),
            DataType::UInt64 => gather!(UInt64Array, U64),
            other => Err(invalid_type(name, &other)),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum RootScalarKind {
    F32,
    F64,
    I32,
    U32,
    I64,
    U64,
}

fn branch_scalar_kind(branch: &Branch) -> Option<RootScalarKind> {
    let type_name = branch.item_type_name();
    let lower = type_name.to_ascii_lowercase();
    if lower.contains("vector") {
        return None;
    }
    match lower.as_str() {
        "float" | "float_t" | "float32_t" => Some(RootScalarKind::F32),
        "double" | "double_t" | "double32_t" => Some(RootScalarKind::F64),
        "int" | "int_t" | "int32_t" => Some(RootScalarKind::I32),
        "unsigned int" | "uint_t" | "uint32_t" => Some(RootScalarKind::U32),
        "long" | "long64_t" | "int64_t" | "long long" => Some(RootScalarKind::I64),
        "unsigned long" | "ulong64_t" | "uint64_t" | "unsigned long long" => {
            Some(RootScalarKind::U64)
        }
        _ => None,
    }
}

struct RootColumns {
    tree: ReaderTree,
}

impl RootColumns {
    fn open(file_path: &str, requested: Option<&str>) -> FfrwResult<Self> {
        let path = canonicalize_input_path(file_path)?;
        let mut file = RootFile::open(&path).map_err(|err| {
            FfrwError::Custom(format!(
                "Failed to open ROOT file '{}': {err}",
                path.display()
            ))
        })?;
        let tree = resolve_root_tree(&mut file, requested)?;
        Ok(Self { tree })
    }

    fn branch(&self, name: &str) -> FfrwResult<(RootScalarKind, &Branch)> {
        let branch = self
            .tree
            .branch(name)
            .ok_or_else(|| FfrwError::MissingColumn {
                name: name.to_string(),
            })?;
        let kind = branch_scalar_kind(branch).ok_or_else(|| FfrwError::InvalidColumnType {
            name: name.to_string(),
            datatype: branch.item_type_name(),
        })?;
        Ok((kind, branch))
    }
}

macro_rules! read_branch {
    ($branch:expr, $ty:ty, $name:expr) => {
        $branch
            .as_iter::<$ty>()
            .map_err(|err| map_root_error(&format!("Failed to read branch '{}'", $name), err))?
            .collect::<Vec<$ty>>()
    };
}

impl ColumnSource for RootColumns {
    fn float_column(&self, name: &str) -> FfrwResult<Vec<f64>> {
        let (kind, branch) = self.branch(name)?;
        Ok(match kind {
            RootScalarKind::F32 => read_branch!(branch, f32, name)
                .into_iter()
                .map(|value| value as f64)
                .collect(),
            RootScalarKind::F64 => read_branch!(branch, f64, name),
            _ => {
                return Err(FfrwError::InvalidColumnType {
                    name: name.to_string(),
                    datatype: branch.item_type_name(),
                })
            }
        })
    }

    fn int_column(&self, name: &str) -> FfrwResult<IntColumn> {
        let (kind, branch) = self.branch(name)?;
        Ok(match kind {
            RootScalarKind::I32 => IntColumn::I32(read_branch!(branch, i32, name)),
            RootScalarKind::U32 => IntColumn::U32(read_branch!(branch, u32, name)),
            RootScalarKind::I64 => IntColumn::I64(read_branch!(branch, i64, name)),
            RootScalarKind::U64 => IntColumn::U64(read_branch!(branch, u64, name)),
            _ => {
                return Err(FfrwError::InvalidColumnType {
                    name: name.to_string(),
                    datatype: branch.item_type_name(),
                })
            }
        })
    }
}

fn resolve_root_tree(file: &mut RootFile, requested: Option<&str>) -> FfrwResult<ReaderTree> {
    if let Some(name) = requested {
        return file
            .get_tree(name)
            .map_err(|err| map_root_error(&format!("Failed to open ROOT tree '{name}'"), err));
    }

    let tree_names: Vec<String> = file
        .keys()
        .into_iter()
        .filter(|key| key.class_name() == "TTree")
        .map(|key| key.name().to_string())
        .collect();

    match tree_names.as_slice() {
        [] => Err(FfrwError::Custom(
            "ROOT file does not contain any TTrees".to_string(),
        )),
        [selected] => file
            .get_tree(selected)
            .map_err(|err| map_root_error(&format!("Failed to open ROOT tree '{selected}'"), err)),
        _ => Err(FfrwError::Custom(format!(
            "Multiple TTrees found ({:?}); specify ReadOptions::tree to disambiguate",
            tree_names
        ))),
    }
}

/// Load a [`TruthTable`] from a Parquet file.
pub fn read_truth_parquet(file_path: &str, options: &ReadOptions) -> FfrwResult<TruthTable> {
    let table = truth_from_source(&ParquetColumns::open(file_path)?, &options.roles)?;
    debug!(
        "read {} events from Parquet file '{file_path}'",
        table.n_events()
    );
    Ok(table)
}

/// Load a [`TruthTable`] from a tree in a ROOT file.
pub fn read_truth_root(file_path: &str, options: &ReadOptions) -> FfrwResult<TruthTable> {
    let columns = RootColumns::open(file_path, options.tree.as_deref())?;
    let table = truth_from_source(&columns, &options.roles)?;
    debug!(
        "read {} events from ROOT file '{file_path}'",
        table.n_events()
    );
    Ok(table)
}

/// Load a [`TruthTable`], choosing the backend from the file extension.
pub fn read_truth(file_path: &str, options: &ReadOptions) -> FfrwResult<TruthTable> {
    match FileFormat::from_path(file_path)? {
        FileFormat::Root => read_truth_root(file_path, options),
        FileFormat::Parquet => read_truth_parquet(file_path, options),
    }
}

/// Load a [`WeightTable`] from a Parquet file.
pub fn read_weights_parquet(file_path: &str) -> FfrwResult<WeightTable> {
    weights_from_source(&ParquetColumns::open(file_path)?)
}

/// Load a [`WeightTable`] from a tree in a ROOT file.
pub fn read_weights_root(file_path: &str, tree: Option<&str>) -> FfrwResult<WeightTable> {
    weights_from_source(&RootColumns::open(file_path, tree)?)
}

/// Load a [`WeightTable`], choosing the backend from the file extension. `tree` is only used for
/// ROOT files.
pub fn read_weights(file_path: &str, tree: Option<&str>) -> FfrwResult<WeightTable> {
    match FileFormat::from_path(file_path)? {
        FileFormat::Root => read_weights_root(file_path, tree),
        FileFormat::Parquet => read_weights_parquet(file_path),
    }
}

/// Owned columns ready to be written by either backend.
enum OwnedColumn {
    U64(Vec<u64>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F64(Vec<f64>),
}

impl OwnedColumn {
    fn data_type(&self) -> DataType {
        match self {
            OwnedColumn::U64(_) => DataType::UInt64,
            OwnedColumn::U32(_) => DataType::UInt32,
            OwnedColumn::I32(_) => DataType::Int32,
            OwnedColumn::F64(_) => DataType::Float64,
        }
    }

    fn slice(&self, start: usize, end: usize) -> ArrayRef {
        match self {
            OwnedColumn::U64(values) => Arc::new(UInt64Array::from(values[start..end].to_vec())),
            OwnedColumn::U32(values) => Arc::new(UInt32Array::from(values[start..end].to_vec())),
            OwnedColumn::I32(values) => Arc::new(Int32Array::from(values[start..end].to_vec())),
            OwnedColumn::F64(values) => Arc::new(Float64Array::from(values[start..end].to_vec())),
        }
    }
}

fn truth_columns(table: &TruthTable) -> Vec<(String, OwnedColumn)> {
    let mut columns = vec![
        (
            EVENT_NUMBER_COLUMN.to_string(),
            OwnedColumn::U64(table.event_number.clone()),
        ),
        (
            RUN_NUMBER_COLUMN.to_string(),
            OwnedColumn::U32(table.run_number.clone()),
        ),
    ];
    for (role, particle) in &table.particles {
        let [id, px, py, pz, e] = component_columns(*role);
        columns.push((id, OwnedColumn::I32(particle.id.clone())));
        columns.push((px, OwnedColumn::F64(particle.px.clone())));
        columns.push((py, OwnedColumn::F64(particle.py.clone())));
        columns.push((pz, OwnedColumn::F64(particle.pz.clone())));
        columns.push((e, OwnedColumn::F64(particle.e.clone())));
    }
    columns
}

fn weight_columns(table: &WeightTable) -> Vec<(String, OwnedColumn)> {
    vec![
        (
            EVENT_NUMBER_COLUMN.to_string(),
            OwnedColumn::U64(table.event_number.clone()),
        ),
        (
            RUN_NUMBER_COLUMN.to_string(),
            OwnedColumn::U32(table.run_number.clone()),
        ),
        (
            WEIGHT_COLUMN.to_string(),
            OwnedColumn::F64(table.w_ff.clone()),
        ),
        (
            Observable::Q2.column().to_string(),
            OwnedColumn::F64(table.q2_true.clone()),
        ),
        (
            Observable::MissingMass2.column().to_string(),
            OwnedColumn::F64(table.mm2_true.clone()),
        ),
        (
            Observable::LeptonEnergy.column().to_string(),
            OwnedColumn::F64(table.el_true.clone()),
        ),
    ]
}

fn write_parquet_columns(
    columns: &[(String, OwnedColumn)],
    n_rows: usize,
    file_path: &Path,
    options: &WriteOptions,
) -> FfrwResult<()> {
    let batch_size = options.batch_size.max(1);
    let schema = Arc::new(Schema::new(
        columns
            .iter()
            .map(|(name, column)| Field::new(name.clone(), column.data_type(), false))
            .collect::<Vec<_>>(),
    ));
    let file = File::create(file_path)?;
    let mut writer = ArrowWriter::try_new(file, schema.clone(), None)
        .map_err(|err| FfrwError::Custom(format!("Failed to create Parquet writer: {err}")))?;

    let mut start = 0usize;
    while start < n_rows {
        let end = (start + batch_size).min(n_rows);
        let arrays = columns
            .iter()
            .map(|(_, column)| column.slice(start, end))
            .collect::<Vec<_>>();
        let batch = RecordBatch::try_new(schema.clone(), arrays)
            .map_err(|err| FfrwError::Custom(format!("Failed to build Parquet batch: {err}")))?;
        writer
            .write(&batch)
            .map_err(|err| FfrwError::Custom(format!("Failed to write Parquet batch: {err}")))?;
        start = end;
    }

    writer
        .close()
        .map_err(|err| FfrwError::Custom(format!("Failed to finalise Parquet file: {err}")))?;
    Ok(())
}

fn write_root_columns(
    columns: Vec<(String, OwnedColumn)>,
    file_path: &Path,
    tree_name: &str,
) -> FfrwResult<()> {
    let mut file = RootFile::create(file_path).map_err(|err| {
        FfrwError::Custom(format!(
            "Failed to create ROOT file '{}': {err}",
            file_path.display()
        ))
    })?;

    let mut tree = WriterTree::new(tree_name);
    for (name, column) in columns {
        match column {
            OwnedColumn::U64(values) => tree.new_branch(name, values.into_iter()),
            OwnedColumn::U32(values) => tree.new_branch(name, values.into_iter()),
            OwnedColumn::I32(values) => tree.new_branch(name, values.into_iter()),
            OwnedColumn::F64(values) => tree.new_branch(name, values.into_iter()),
        }
    }

    tree.write(&mut file).map_err(|err| {
        FfrwError::Custom(format!(
            "Failed to write ROOT tree '{tree_name}' to '{}': {err}",
            file_path.display()
        ))
    })?;

    file.close().map_err(|err| {
        FfrwError::Custom(format!(
            "Failed to close ROOT file '{}': {err}",
            file_path.display()
        ))
    })?;
    Ok(())
}

/// Persist a [`TruthTable`] to a Parquet file.
pub fn write_truth_parquet(
    table: &TruthTable,
    file_path: &str,
    options: &WriteOptions,
) -> FfrwResult<()> {
    let path = expand_output_path(file_path)?;
    write_parquet_columns(&truth_columns(table), table.n_events(), &path, options)
}

/// Persist a [`TruthTable`] to a ROOT file using the oxyroot backend.
pub fn write_truth_root(
    table: &TruthTable,
    file_path: &str,
    options: &WriteOptions,
) -> FfrwResult<()> {
    let path = expand_output_path(file_path)?;
    let tree_name = options.tree.as_deref().unwrap_or("events");
    write_root_columns(truth_columns(table), &path, tree_name)
}

/// Persist a [`TruthTable`], choosing the backend from the file extension.
pub fn write_truth(table: &TruthTable, file_path: &str, options: &WriteOptions) -> FfrwResult<()> {
    match FileFormat::from_path(file_path)? {
        FileFormat::Root => write_truth_root(table, file_path, options),
        FileFormat::Parquet => write_truth_parquet(table, file_path, options),
    }
}

/// Persist a [`WeightTable`] to a Parquet file, replacing any existing file.
pub fn write_weights_parquet(
    table: &WeightTable,
    file_path: &str,
    options: &WriteOptions,
) -> FfrwResult<()> {
    let path = expand_output_path(file_path)?;
    write_parquet_columns(&weight_columns(table), table.len(), &path, options)
}

/// Persist a [`WeightTable`] to a ROOT file, replacing any existing file.
pub fn write_weights_root(
    table: &WeightTable,
    file_path: &str,
    options: &WriteOptions,
) -> FfrwResult<()> {
    let path = expand_output_path(file_path)?;
    let tree_name = options.tree.as_deref().unwrap_or("events");
    write_root_columns(weight_columns(table), &path, tree_name)
}

/// Persist a [`WeightTable`], choosing the backend from the file extension.
pub fn write_weights(
    table: &WeightTable,
    file_path: &str,
    options: &WriteOptions,
) -> FfrwResult<()> {
    match FileFormat::from_path(file_path)? {
        FileFormat::Root => write_weights_root(table, file_path, options),
        FileFormat::Parquet => write_weights_parquet(table, file_path, options),
    }
}
