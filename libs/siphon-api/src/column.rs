use crate::value::CellValue;

/// The four fixed leading columns every destination table carries. They are
/// the only persisted-schema contract beyond the translation order itself.
pub const PARTITION_DATE_COLUMN: &str = "partition_date";
pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const INSTRUMENT_COLUMN: &str = "instrument";
pub const TYPE_COLUMN: &str = "type";

/// Suffix of the synthetic discriminator sub-column of object groups.
pub const DISCRIMINATOR_SUFFIX: &str = "type";

pub const FIXED_COLUMN_COUNT: usize = 4;

pub const DECIMAL_PRECISION: u8 = 38;
pub const DEFAULT_DECIMAL_SCALE: u8 = 9;

/// Nanosecond precision of the fixed timestamp column.
pub const TIMESTAMP_PRECISION: u8 = 9;

/// Destination column type.
///
/// Leaf scalars map 1:1 onto destination store types. `Nullable` and
/// `Array` wrap a leaf. The group forms never reach the destination as
/// such — they flatten into their leaf sub-columns for DDL and inserts.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal { scale: u8 },
    Bool,
    String,
    /// Days since the Unix epoch.
    Date,
    /// Nanosecond-precision timestamp.
    DateTime,
    /// Milliseconds since midnight.
    Time,
    Enum16(Vec<(String, i16)>),
    Nullable(Box<ColumnType>),
    Array(Box<ColumnType>),
    /// Flattened polymorphic object: discriminator + union of the permitted
    /// types' sub-columns.
    ObjectGroup(Vec<ColumnModel>),
    /// Array of polymorphic objects: sub-columns are already array-typed,
    /// one parallel array per union leaf.
    NestedGroup(Vec<ColumnModel>),
}

impl ColumnType {
    pub fn is_group(&self) -> bool {
        matches!(self, ColumnType::ObjectGroup(_) | ColumnType::NestedGroup(_))
    }

    pub fn sub_columns(&self) -> Option<&[ColumnModel]> {
        match self {
            ColumnType::ObjectGroup(sub) | ColumnType::NestedGroup(sub) => Some(sub),
            _ => None,
        }
    }

    /// Default cell for a leaf column — what a slot holds before the codec
    /// binds it, and what an absent optional field leaves behind.
    ///
    /// Group types have no default; they never occupy a slot themselves.
    pub fn default_value(&self) -> CellValue {
        match self {
            ColumnType::Int8 => CellValue::Int8(0),
            ColumnType::Int16 => CellValue::Int16(0),
            ColumnType::Int32 => CellValue::Int32(0),
            ColumnType::Int64 => CellValue::Int64(0),
            ColumnType::Float32 => CellValue::Float32(0.0),
            ColumnType::Float64 => CellValue::Float64(0.0),
            ColumnType::Decimal { scale } => CellValue::Decimal(0, *scale),
            ColumnType::Bool => CellValue::Bool(false),
            ColumnType::String => CellValue::String(String::new()),
            ColumnType::Date => CellValue::Date(0),
            ColumnType::DateTime => CellValue::DateTime(0),
            ColumnType::Time => CellValue::Time(0),
            // First declared symbol is the placeholder ordinal.
            ColumnType::Enum16(symbols) => {
                CellValue::Enum(symbols.first().map(|(_, o)| *o).unwrap_or(0))
            }
            ColumnType::Nullable(_) => CellValue::Null,
            ColumnType::Array(_) => CellValue::Array(Vec::new()),
            ColumnType::ObjectGroup(_) | ColumnType::NestedGroup(_) => {
                debug_assert!(false, "group columns have no default value");
                CellValue::Null
            }
        }
    }
}

/// Immutable description of one destination column, possibly a group of
/// sub-columns. Positional indices live outside the model (see
/// [`PositionMap`]) so independently built insert plans can never alias
/// position state.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnModel {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnModel {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self { name: name.into(), column_type }
    }

    /// Structurally identical copy. The model is immutable, so a clone is a
    /// deep copy; the name exists to mark the intent at call sites that
    /// build per-plan column sets.
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// Number of leaf (non-group) columns this column contributes.
    pub fn leaf_count(&self) -> usize {
        match self.column_type.sub_columns() {
            Some(sub) => sub.iter().map(ColumnModel::leaf_count).sum(),
            None => 1,
        }
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a ColumnModel>) {
        match self.column_type.sub_columns() {
            Some(sub) => {
                for column in sub {
                    column.collect_leaves(out);
                }
            }
            None => out.push(self),
        }
    }
}

/// Recursively expand group columns into their leaf columns, depth-first,
/// preserving declaration order. Used both for DDL generation and for
/// insert-statement placeholders.
pub fn flatten_leaves(columns: &[ColumnModel]) -> Vec<&ColumnModel> {
    let mut leaves = Vec::new();
    for column in columns {
        column.collect_leaves(&mut leaves);
    }
    leaves
}

/// Dense 1-based positional indices for one insert plan, held in an arena
/// indexed by leaf order. Built identically for the DDL-time template and
/// for every per-type plan, so a plan's positions always match its own
/// placeholder count.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionMap {
    positions: Vec<u32>,
}

impl PositionMap {
    /// Assign sequential positions over the flattened leaf order,
    /// starting at 1.
    pub fn assign(columns: &[ColumnModel]) -> Self {
        Self::assign_from(columns, 1).0
    }

    /// Assign starting at `start`; returns the map and the next free index.
    pub fn assign_from(columns: &[ColumnModel], start: u32) -> (Self, u32) {
        let count = columns.iter().map(ColumnModel::leaf_count).sum::<usize>() as u32;
        let positions = (start..start + count).collect();
        (Self { positions }, start + count)
    }

    /// Position of the leaf at `leaf_index` in flatten order.
    pub fn position(&self, leaf_index: usize) -> u32 {
        self.positions[leaf_index]
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.positions.iter().copied()
    }
}

/// Derive a valid destination column name: invalid characters are replaced
/// by `_`, and a leading digit is shielded with `_`.
pub fn sanitize_column_name(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// The four fixed leading columns of every destination table.
pub fn fixed_columns() -> Vec<ColumnModel> {
    vec![
        ColumnModel::new(PARTITION_DATE_COLUMN, ColumnType::Date),
        ColumnModel::new(TIMESTAMP_COLUMN, ColumnType::DateTime),
        ColumnModel::new(INSTRUMENT_COLUMN, ColumnType::String),
        ColumnModel::new(TYPE_COLUMN, ColumnType::String),
    ]
}
