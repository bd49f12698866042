#![forbid(unsafe_code)]

use std::{cmp::Ordering, collections::HashMap, fmt, mem::size_of};

use bumpalo::Bump;
use fd_columnar::Column;
use fd_frame::{Dataset, FrameError};
use fd_types::{DType, ErrorKind, NullKind, Scalar, natural_cmp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator used when a composite key is rendered as a single label.
pub const KEY_SEPARATOR: &str = "→";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AggError {
    #[error("reducer set is empty")]
    EmptyReducerSet,
    #[error("bin boundaries are invalid: {reason}")]
    InvalidBoundaries { reason: String },
    #[error("{bins} bins need {bins} labels, got {labels}")]
    BinLabelCountMismatch { bins: usize, labels: usize },
    #[error("top_n must be positive, got {top_n}")]
    InvalidTopN { top_n: i64 },
    #[error("composite key needs at least one column")]
    EmptyCompositeKey,
    #[error("correlation needs at least one column")]
    EmptyColumnSet,
    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl AggError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Frame(err) => err.kind(),
            _ => ErrorKind::Parameter,
        }
    }
}

// ── Reducers and cells ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    Mean,
    Median,
    Std,
    Count,
    Sum,
}

impl Reducer {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Std => "std",
            Self::Count => "count",
            Self::Sum => "sum",
        }
    }

    /// Whether the reducer reads the target's numeric payload rather than
    /// only its presence.
    #[must_use]
    pub fn requires_numeric(self) -> bool {
        !matches!(self, Self::Count)
    }

    /// Value used for pivot cells no row lands in.
    #[must_use]
    pub fn empty_fill(self) -> Cell {
        match self {
            Self::Count | Self::Sum => Cell::Value(0.0),
            Self::Mean | Self::Median | Self::Std => Cell::Undefined,
        }
    }

    /// Reduce the present values of one group. `present` is the number of
    /// non-null target values, which is all `Count` needs.
    #[must_use]
    pub fn reduce(self, values: &[f64], present: usize) -> Cell {
        match self {
            Self::Count => Cell::Value(present as f64),
            Self::Sum => Cell::Value(fd_types::sum(values)),
            Self::Mean => fd_types::mean(values).into(),
            Self::Median => fd_types::median(values).into(),
            // Population convention: a single-member group has std 0.
            Self::Std => fd_types::std_dev(values, 0).into(),
        }
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reduced statistic; `Undefined` is emitted where the statistic does
/// not exist (empty group, zero variance pair) and serializes as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(into = "Option<f64>")]
pub enum Cell {
    Value(f64),
    Undefined,
}

impl Cell {
    #[must_use]
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(v),
            Self::Undefined => None,
        }
    }

    #[must_use]
    pub fn is_undefined(self) -> bool {
        matches!(self, Self::Undefined)
    }
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) if !v.is_nan() => Self::Value(v),
            _ => Self::Undefined,
        }
    }
}

impl From<Cell> for Option<f64> {
    fn from(cell: Cell) -> Self {
        cell.value()
    }
}

/// Sorted, de-duplicated reducer list; empty input is rejected.
pub fn normalize_reducers(reducers: &[Reducer]) -> Result<Vec<Reducer>, AggError> {
    if reducers.is_empty() {
        return Err(AggError::EmptyReducerSet);
    }
    let mut out = reducers.to_vec();
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

// ── Grouping options ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupByOptions {
    /// Drop rows whose key is null. Off by default so null keys form a
    /// trailing group and per-group counts add up to the column's count.
    pub dropna: bool,
}

pub const DEFAULT_ARENA_BUDGET_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupByExecutionOptions {
    pub use_arena: bool,
    pub arena_budget_bytes: usize,
}

impl Default for GroupByExecutionOptions {
    fn default() -> Self {
        Self {
            use_arena: true,
            arena_budget_bytes: DEFAULT_ARENA_BUDGET_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PartitionTrace {
    dense: bool,
    used_arena: bool,
}

// ── Partitioning ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum GroupKeyRef<'a> {
    Int64(i64),
    FloatBits(u64),
    Utf8(&'a str),
    Null,
}

impl<'a> GroupKeyRef<'a> {
    fn from_scalar(key: &'a Scalar) -> Self {
        match key {
            _ if key.is_missing() => Self::Null,
            Scalar::Int64(v) => Self::Int64(*v),
            // -0.0 and 0.0 land in the same group.
            Scalar::Float64(v) if *v == 0.0 => Self::FloatBits(0.0_f64.to_bits()),
            Scalar::Float64(v) => Self::FloatBits(v.to_bits()),
            Scalar::Utf8(v) => Self::Utf8(v.as_str()),
            Scalar::Null(_) => Self::Null,
        }
    }
}

/// Rows split by key, groups in emission order.
#[derive(Debug, Clone, PartialEq)]
struct Partition {
    keys: Vec<Vec<Scalar>>,
    members: Vec<Vec<usize>>,
}

impl Partition {
    fn len(&self) -> usize {
        self.keys.len()
    }

    fn reorder(&mut self, order: &[usize]) {
        self.keys = order.iter().map(|&i| self.keys[i].clone()).collect();
        self.members = order
            .iter()
            .map(|&i| std::mem::take(&mut self.members[i]))
            .collect();
    }
}

fn normalized_key(value: &Scalar) -> Scalar {
    if value.is_missing() {
        Scalar::Null(NullKind::Null)
    } else {
        value.clone()
    }
}

fn resolve_columns<'a>(ds: &'a Dataset, names: &[&str]) -> Result<Vec<&'a Column>, AggError> {
    names
        .iter()
        .map(|name| ds.column(name).map_err(AggError::from))
        .collect()
}

/// Group rows by one or more key columns.
///
/// Single keys follow the emission order rule: ascending for numeric keys,
/// declared level order for ordered categories, first encounter for plain
/// strings, null group last. Composite keys keep first-encounter order.
fn partition(
    columns: &[&Column],
    options: GroupByOptions,
    exec: GroupByExecutionOptions,
) -> (Partition, PartitionTrace) {
    if let [column] = columns {
        if column.dtype() == DType::Int64 {
            if let Some(found) = try_partition_dense_int64(column.values(), options.dropna, exec)
            {
                return found;
            }
        }
        let mut out = partition_generic(columns, options.dropna);
        order_single_key(&mut out, column);
        return (
            out,
            PartitionTrace {
                dense: false,
                used_arena: false,
            },
        );
    }
    (
        partition_generic(columns, options.dropna),
        PartitionTrace {
            dense: false,
            used_arena: false,
        },
    )
}

fn partition_generic(columns: &[&Column], dropna: bool) -> Partition {
    let len = columns.first().map_or(0, |c| c.len());
    let mut slot = HashMap::<Vec<GroupKeyRef<'_>>, usize>::new();
    let mut keys: Vec<Vec<Scalar>> = Vec::new();
    let mut members: Vec<Vec<usize>> = Vec::new();

    for pos in 0..len {
        let row: Vec<&Scalar> = columns.iter().map(|c| &c.values()[pos]).collect();
        if dropna && row.iter().any(|v| v.is_missing()) {
            continue;
        }
        let key_id: Vec<GroupKeyRef<'_>> =
            row.iter().map(|&v| GroupKeyRef::from_scalar(v)).collect();
        let group = *slot.entry(key_id).or_insert_with(|| {
            keys.push(row.iter().map(|&v| normalized_key(v)).collect());
            members.push(Vec::new());
            keys.len() - 1
        });
        members[group].push(pos);
    }

    Partition { keys, members }
}

fn key_order(column: &Column, left: &Scalar, right: &Scalar) -> Ordering {
    match (left.is_missing(), right.is_missing()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }
    match column.dtype() {
        DType::Category => {
            let rank = |v: &Scalar| v.as_str().and_then(|s| column.category_rank(s));
            rank(left).cmp(&rank(right))
        }
        DType::Utf8 => Ordering::Equal,
        DType::Int64 | DType::Float64 | DType::Null => natural_cmp(left, right),
    }
}

fn order_single_key(partition: &mut Partition, column: &Column) {
    let mut order: Vec<usize> = (0..partition.len()).collect();
    // Stable: equal keys under the rule keep first-encounter order.
    order.sort_by(|&a, &b| key_order(column, &partition.keys[a][0], &partition.keys[b][0]));
    partition.reorder(&order);
}

const DENSE_INT_KEY_RANGE_LIMIT: i128 = 65_536;

/// Scan keys and return (min, max). `None` if there is no Int64 key at all.
fn dense_int64_range(keys: &[Scalar]) -> Option<(i64, i64)> {
    let mut range: Option<(i64, i64)> = None;
    for key in keys {
        if let Scalar::Int64(v) = key {
            range = Some(match range {
                None => (*v, *v),
                Some((lo, hi)) => (lo.min(*v), hi.max(*v)),
            });
        }
    }
    range
}

/// Dense-bucket path for `Int64` keys with a bounded span. Emits groups in
/// ascending key order without a sort; the bucket table lives in a bump
/// arena when the execution options allow it.
fn try_partition_dense_int64(
    keys: &[Scalar],
    dropna: bool,
    exec: GroupByExecutionOptions,
) -> Option<(Partition, PartitionTrace)> {
    let (min_key, max_key) = dense_int64_range(keys)?;
    let span = i128::from(max_key) - i128::from(min_key) + 1;
    if span <= 0 || span > DENSE_INT_KEY_RANGE_LIMIT {
        return None;
    }
    let bucket_len = usize::try_from(span).ok()?;
    let estimated_bytes = bucket_len.saturating_mul(size_of::<Option<usize>>());

    if exec.use_arena && estimated_bytes <= exec.arena_budget_bytes {
        let arena = Bump::new();
        let slots = arena.alloc_slice_fill_copy(bucket_len, None::<usize>);
        let out = fill_dense_partition(keys, min_key, slots, dropna);
        Some((
            out,
            PartitionTrace {
                dense: true,
                used_arena: true,
            },
        ))
    } else {
        let mut slots = vec![None::<usize>; bucket_len];
        let out = fill_dense_partition(keys, min_key, &mut slots, dropna);
        Some((
            out,
            PartitionTrace {
                dense: true,
                used_arena: false,
            },
        ))
    }
}

fn fill_dense_partition(
    keys: &[Scalar],
    min_key: i64,
    slots: &mut [Option<usize>],
    dropna: bool,
) -> Partition {
    let bucket_of = |v: i64| (i128::from(v) - i128::from(min_key)) as usize;

    for key in keys {
        if let Scalar::Int64(v) = key {
            slots[bucket_of(*v)] = Some(0);
        }
    }

    let mut group_keys = Vec::new();
    for (bucket, slot) in slots.iter_mut().enumerate() {
        if slot.is_some() {
            *slot = Some(group_keys.len());
            group_keys.push(vec![Scalar::Int64(min_key + bucket as i64)]);
        }
    }

    let mut members = vec![Vec::new(); group_keys.len()];
    let mut null_members = Vec::new();
    for (pos, key) in keys.iter().enumerate() {
        match key {
            Scalar::Int64(v) => {
                if let Some(group) = slots[bucket_of(*v)] {
                    members[group].push(pos);
                }
            }
            _ => null_members.push(pos),
        }
    }

    if !dropna && !null_members.is_empty() {
        group_keys.push(vec![Scalar::Null(NullKind::Null)]);
        members.push(null_members);
    }

    Partition {
        keys: group_keys,
        members,
    }
}

/// Target column prepared once per aggregation: presence bits for `count`
/// and numeric payloads when a numeric reducer needs them.
struct Target {
    present: Vec<bool>,
    numbers: Option<Vec<Option<f64>>>,
}

impl Target {
    fn load(ds: &Dataset, column: &str, reducers: &[Reducer]) -> Result<Self, AggError> {
        let col = ds.column(column)?;
        let present = col.validity().bits().collect();
        let numbers = if reducers.iter().any(|r| r.requires_numeric()) {
            Some(ds.numeric(column)?)
        } else {
            None
        };
        Ok(Self { present, numbers })
    }

    fn gather(&self, members: &[usize]) -> (Vec<f64>, usize) {
        let present = members.iter().filter(|&&pos| self.present[pos]).count();
        let values = match &self.numbers {
            Some(numbers) => members.iter().filter_map(|&pos| numbers[pos]).collect(),
            None => Vec::new(),
        };
        (values, present)
    }

    fn reduce_all(&self, members: &[usize], reducers: &[Reducer]) -> Vec<Cell> {
        let (values, present) = self.gather(members);
        reducers
            .iter()
            .map(|reducer| reducer.reduce(&values, present))
            .collect()
    }
}

// ── Group summary ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    pub key: Scalar,
    /// Aligned with `GroupSummary::reducers`.
    pub stats: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub key_column: String,
    pub value_column: String,
    pub reducers: Vec<Reducer>,
    pub rows: Vec<GroupRow>,
}

impl GroupSummary {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Scalar> {
        self.rows.iter().map(|row| &row.key)
    }

    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.keys().map(Scalar::label).collect()
    }

    #[must_use]
    pub fn has_statistic(&self, reducer: Reducer) -> bool {
        self.reducers.contains(&reducer)
    }

    /// Column of one statistic across all groups, in group order.
    #[must_use]
    pub fn statistic(&self, reducer: Reducer) -> Option<Vec<Cell>> {
        let idx = self.reducers.iter().position(|r| *r == reducer)?;
        Some(self.rows.iter().map(|row| row.stats[idx]).collect())
    }

    #[must_use]
    pub fn get(&self, key: &Scalar, reducer: Reducer) -> Option<Cell> {
        let idx = self.reducers.iter().position(|r| *r == reducer)?;
        self.rows
            .iter()
            .find(|row| row.key.semantic_eq(key))
            .map(|row| row.stats[idx])
    }
}

pub fn group_summary(
    ds: &Dataset,
    column: &str,
    group_key: &str,
    reducers: &[Reducer],
) -> Result<GroupSummary, AggError> {
    group_summary_with_options(
        ds,
        column,
        group_key,
        reducers,
        GroupByOptions::default(),
        GroupByExecutionOptions::default(),
    )
}

pub fn group_summary_with_options(
    ds: &Dataset,
    column: &str,
    group_key: &str,
    reducers: &[Reducer],
    options: GroupByOptions,
    exec: GroupByExecutionOptions,
) -> Result<GroupSummary, AggError> {
    let reducers = normalize_reducers(reducers)?;
    let key_col = ds.column(group_key)?;
    let target = Target::load(ds, column, &reducers)?;

    let (groups, trace) = partition(&[key_col], options, exec);
    let rows: Vec<GroupRow> = groups
        .keys
        .into_iter()
        .zip(&groups.members)
        .map(|(mut key, members)| GroupRow {
            key: key.remove(0),
            stats: target.reduce_all(members, &reducers),
        })
        .collect();

    tracing::debug!(
        column,
        group_key,
        groups = rows.len(),
        dense = trace.dense,
        arena = trace.used_arena,
        "group summary"
    );

    Ok(GroupSummary {
        key_column: group_key.to_owned(),
        value_column: column.to_owned(),
        reducers,
        rows,
    })
}

// ── Grouped raw values (box / violin input) ────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueGroup {
    pub key: Scalar,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedValues {
    pub key_column: String,
    pub value_column: String,
    pub groups: Vec<ValueGroup>,
}

impl GroupedValues {
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Non-null values of `column` per key, ordered like `group_summary`.
pub fn group_values(
    ds: &Dataset,
    column: &str,
    group_key: &str,
) -> Result<GroupedValues, AggError> {
    let key_col = ds.column(group_key)?;
    let numbers = ds.numeric(column)?;
    let (groups, _) = partition(
        &[key_col],
        GroupByOptions::default(),
        GroupByExecutionOptions::default(),
    );
    let groups = groups
        .keys
        .into_iter()
        .zip(groups.members)
        .map(|(mut key, members)| ValueGroup {
            key: key.remove(0),
            values: members.iter().filter_map(|&pos| numbers[pos]).collect(),
        })
        .collect();
    Ok(GroupedValues {
        key_column: group_key.to_owned(),
        value_column: column.to_owned(),
        groups,
    })
}

// ── Pivot matrix ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotMatrix {
    pub row_key: String,
    pub col_key: String,
    pub value_column: String,
    pub reducer: Reducer,
    pub row_labels: Vec<Scalar>,
    pub col_labels: Vec<Scalar>,
    /// Row-major, `row_labels.len()` rows of `col_labels.len()` cells.
    pub cells: Vec<Vec<Cell>>,
}

impl PivotMatrix {
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.row_labels.len(), self.col_labels.len())
    }

    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<Cell> {
        self.cells.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Sum of all defined cells.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.cells
            .iter()
            .flatten()
            .filter_map(|cell| cell.value())
            .sum()
    }
}

fn sorted_distinct(values: impl Iterator<Item = Scalar>) -> Vec<Scalar> {
    let mut out: Vec<Scalar> = values.collect();
    out.sort_by(natural_cmp);
    out.dedup_by(|a, b| natural_cmp(a, b) == Ordering::Equal);
    out
}

fn label_position(labels: &[Scalar], key: &Scalar) -> Option<usize> {
    labels
        .binary_search_by(|label| natural_cmp(label, key))
        .ok()
}

pub fn pivot_matrix(
    ds: &Dataset,
    row_key: &str,
    col_key: &str,
    value_column: &str,
    reducer: Reducer,
) -> Result<PivotMatrix, AggError> {
    let columns = resolve_columns(ds, &[row_key, col_key])?;
    let target = Target::load(ds, value_column, &[reducer])?;
    let (groups, _) = partition(
        &columns,
        GroupByOptions { dropna: true },
        GroupByExecutionOptions::default(),
    );

    let row_labels = sorted_distinct(groups.keys.iter().map(|k| k[0].clone()));
    let col_labels = sorted_distinct(groups.keys.iter().map(|k| k[1].clone()));
    let mut cells = vec![vec![reducer.empty_fill(); col_labels.len()]; row_labels.len()];

    for (key, members) in groups.keys.iter().zip(&groups.members) {
        let (Some(r), Some(c)) = (
            label_position(&row_labels, &key[0]),
            label_position(&col_labels, &key[1]),
        ) else {
            continue;
        };
        let (values, present) = target.gather(members);
        cells[r][c] = reducer.reduce(&values, present);
    }

    tracing::debug!(
        row_key,
        col_key,
        value_column,
        reducer = reducer.as_str(),
        rows = row_labels.len(),
        cols = col_labels.len(),
        "pivot matrix"
    );

    Ok(PivotMatrix {
        row_key: row_key.to_owned(),
        col_key: col_key.to_owned(),
        value_column: value_column.to_owned(),
        reducer,
        row_labels,
        col_labels,
        cells,
    })
}

// ── Binned summary ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinRow {
    pub label: String,
    pub lower: f64,
    pub upper: f64,
    /// Rows assigned to this bin.
    pub count: usize,
    pub stats: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinnedSummary {
    pub column: String,
    pub value_column: String,
    pub reducers: Vec<Reducer>,
    pub bins: Vec<BinRow>,
    /// Rows that fell outside the boundaries or had a null bin value.
    pub excluded: usize,
}

impl BinnedSummary {
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.bins.iter().map(|b| b.label.clone()).collect()
    }

    #[must_use]
    pub fn statistic(&self, reducer: Reducer) -> Option<Vec<Cell>> {
        let idx = self.reducers.iter().position(|r| *r == reducer)?;
        Some(self.bins.iter().map(|bin| bin.stats[idx]).collect())
    }

    #[must_use]
    pub fn has_statistic(&self, reducer: Reducer) -> bool {
        self.reducers.contains(&reducer)
    }
}

fn validate_boundaries(boundaries: &[f64]) -> Result<(), AggError> {
    if boundaries.len() < 2 {
        return Err(AggError::InvalidBoundaries {
            reason: format!("need at least 2 boundaries, got {}", boundaries.len()),
        });
    }
    if boundaries.iter().any(|b| !b.is_finite()) {
        return Err(AggError::InvalidBoundaries {
            reason: "boundaries must be finite".to_owned(),
        });
    }
    if boundaries.windows(2).any(|w| w[0] >= w[1]) {
        return Err(AggError::InvalidBoundaries {
            reason: "boundaries must be strictly ascending".to_owned(),
        });
    }
    Ok(())
}

/// Index of the bin holding `value`: `[b[i], b[i+1])`, last bin closed.
fn bin_index(boundaries: &[f64], value: f64) -> Option<usize> {
    let last = boundaries.len() - 1;
    if value < boundaries[0] || value > boundaries[last] {
        return None;
    }
    let upper = boundaries.partition_point(|b| *b <= value);
    Some(upper.saturating_sub(1).min(last - 1))
}

pub fn binned_summary(
    ds: &Dataset,
    column: &str,
    boundaries: &[f64],
    labels: &[String],
    value_column: &str,
    reducers: &[Reducer],
) -> Result<BinnedSummary, AggError> {
    validate_boundaries(boundaries)?;
    let bin_count = boundaries.len() - 1;
    if labels.len() != bin_count {
        return Err(AggError::BinLabelCountMismatch {
            bins: bin_count,
            labels: labels.len(),
        });
    }
    let reducers = normalize_reducers(reducers)?;
    let bin_values = ds.numeric(column)?;
    let target = Target::load(ds, value_column, &reducers)?;

    let mut members = vec![Vec::new(); bin_count];
    let mut excluded = 0_usize;
    for (pos, value) in bin_values.iter().enumerate() {
        match value.and_then(|v| bin_index(boundaries, v)) {
            Some(bin) => members[bin].push(pos),
            None => excluded += 1,
        }
    }

    let bins = members
        .iter()
        .enumerate()
        .map(|(idx, rows)| BinRow {
            label: labels[idx].clone(),
            lower: boundaries[idx],
            upper: boundaries[idx + 1],
            count: rows.len(),
            stats: target.reduce_all(rows, &reducers),
        })
        .collect();

    tracing::debug!(column, value_column, bins = bin_count, excluded, "binned summary");

    Ok(BinnedSummary {
        column: column.to_owned(),
        value_column: value_column.to_owned(),
        reducers,
        bins,
        excluded,
    })
}

// ── Ranked slice ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CompositeKey(pub Vec<Scalar>);

impl CompositeKey {
    #[must_use]
    pub fn label(&self) -> String {
        self.0
            .iter()
            .map(Scalar::label)
            .collect::<Vec<_>>()
            .join(KEY_SEPARATOR)
    }

    /// Component-wise natural order.
    #[must_use]
    pub fn natural_cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(&other.0) {
            let ord = natural_cmp(a, b);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    pub key: CompositeKey,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedSlice {
    pub key_columns: Vec<String>,
    pub value_column: String,
    pub reducer: Reducer,
    pub ascending: bool,
    pub entries: Vec<RankedEntry>,
}

impl RankedSlice {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key.label()).collect()
    }

    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.value).collect()
    }
}

/// Top-N composite keys by a reduced statistic. Rows with a null key
/// component are not ranked, nor are groups whose statistic is undefined.
pub fn ranked_slice(
    ds: &Dataset,
    composite_key: &[&str],
    value_column: &str,
    reducer: Reducer,
    top_n: i64,
    ascending: bool,
) -> Result<RankedSlice, AggError> {
    if top_n <= 0 {
        return Err(AggError::InvalidTopN { top_n });
    }
    if composite_key.is_empty() {
        return Err(AggError::EmptyCompositeKey);
    }
    let columns = resolve_columns(ds, composite_key)?;
    let target = Target::load(ds, value_column, &[reducer])?;
    let (groups, _) = partition(
        &columns,
        GroupByOptions { dropna: true },
        GroupByExecutionOptions::default(),
    );

    let mut entries: Vec<RankedEntry> = groups
        .keys
        .into_iter()
        .zip(&groups.members)
        .filter_map(|(key, members)| {
            let (values, present) = target.gather(members);
            reducer.reduce(&values, present).value().map(|value| RankedEntry {
                key: CompositeKey(key),
                value,
            })
        })
        .collect();

    entries.sort_by(|a, b| {
        let by_value = if ascending {
            a.value.total_cmp(&b.value)
        } else {
            b.value.total_cmp(&a.value)
        };
        by_value.then_with(|| a.key.natural_cmp(&b.key))
    });
    entries.truncate(usize::try_from(top_n).unwrap_or(usize::MAX));

    tracing::debug!(
        keys = %composite_key.join(","),
        value_column,
        reducer = reducer.as_str(),
        top_n,
        kept = entries.len(),
        "ranked slice"
    );

    Ok(RankedSlice {
        key_columns: composite_key.iter().map(|k| (*k).to_owned()).collect(),
        value_column: value_column.to_owned(),
        reducer,
        ascending,
        entries,
    })
}

/// Number of distinct composite keys with no null component.
pub fn distinct_groups(ds: &Dataset, keys: &[&str]) -> Result<usize, AggError> {
    if keys.is_empty() {
        return Err(AggError::EmptyCompositeKey);
    }
    let columns = resolve_columns(ds, keys)?;
    let (groups, _) = partition(
        &columns,
        GroupByOptions { dropna: true },
        GroupByExecutionOptions::default(),
    );
    Ok(groups.len())
}

// ── Correlation matrix ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub cells: Vec<Vec<Cell>>,
}

impl CorrelationMatrix {
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<Cell> {
        self.cells.get(row).and_then(|r| r.get(col)).copied()
    }
}

/// Pearson correlation over rows where both values are present. Fewer than
/// two pairs or a zero-variance side gives `Undefined`.
fn pearson_pairwise(left: &[Option<f64>], right: &[Option<f64>]) -> Cell {
    let pairs: Vec<(f64, f64)> = left
        .iter()
        .zip(right)
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .collect();
    if pairs.len() < 2 {
        return Cell::Undefined;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return Cell::Undefined;
    }
    Cell::Value((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

pub fn correlation_matrix(ds: &Dataset, columns: &[&str]) -> Result<CorrelationMatrix, AggError> {
    if columns.is_empty() {
        return Err(AggError::EmptyColumnSet);
    }
    let data = columns
        .iter()
        .map(|name| ds.numeric(name))
        .collect::<Result<Vec<_>, _>>()?;

    let k = columns.len();
    let mut cells = vec![vec![Cell::Undefined; k]; k];
    for i in 0..k {
        cells[i][i] = Cell::Value(1.0);
        for j in (i + 1)..k {
            let r = pearson_pairwise(&data[i], &data[j]);
            cells[i][j] = r;
            cells[j][i] = r;
        }
    }

    tracing::debug!(columns = k, "correlation matrix");

    Ok(CorrelationMatrix {
        columns: columns.iter().map(|c| (*c).to_owned()).collect(),
        cells,
    })
}

// ── Column description ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub count: usize,
    pub mean: Cell,
    pub std: Cell,
    pub min: Cell,
    pub q25: Cell,
    pub median: Cell,
    pub q75: Cell,
    pub max: Cell,
}

pub fn describe(ds: &Dataset, column: &str) -> Result<ColumnSummary, AggError> {
    let values = ds.non_null_numeric(column)?;
    Ok(ColumnSummary {
        column: column.to_owned(),
        count: values.len(),
        mean: fd_types::mean(&values).into(),
        std: fd_types::std_dev(&values, 0).into(),
        min: fd_types::min(&values).into(),
        q25: fd_types::quantile(&values, 0.25).into(),
        median: fd_types::median(&values).into(),
        q75: fd_types::quantile(&values, 0.75).into(),
        max: fd_types::max(&values).into(),
    })
}

// ── Result union ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum AggregateResult {
    GroupSummary(GroupSummary),
    PivotMatrix(PivotMatrix),
    BinnedSummary(BinnedSummary),
    RankedSlice(RankedSlice),
    CorrelationMatrix(CorrelationMatrix),
    GroupedValues(GroupedValues),
}

impl AggregateResult {
    #[must_use]
    pub fn shape_name(&self) -> &'static str {
        match self {
            Self::GroupSummary(_) => "group_summary",
            Self::PivotMatrix(_) => "pivot_matrix",
            Self::BinnedSummary(_) => "binned_summary",
            Self::RankedSlice(_) => "ranked_slice",
            Self::CorrelationMatrix(_) => "correlation_matrix",
            Self::GroupedValues(_) => "grouped_values",
        }
    }

    /// Whether the aggregate carries a statistic that encodings can bind to.
    #[must_use]
    pub fn has_statistic(&self, reducer: Reducer) -> bool {
        match self {
            Self::GroupSummary(s) => s.has_statistic(reducer),
            Self::BinnedSummary(b) => b.has_statistic(reducer),
            Self::PivotMatrix(p) => p.reducer == reducer,
            Self::RankedSlice(r) => r.reducer == reducer,
            Self::CorrelationMatrix(_) | Self::GroupedValues(_) => false,
        }
    }
}

macro_rules! impl_from_aggregate {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for AggregateResult {
                fn from(value: $variant) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_aggregate!(
    GroupSummary,
    PivotMatrix,
    BinnedSummary,
    RankedSlice,
    CorrelationMatrix,
    GroupedValues
);
