//! Schema translation: source record types → destination column layout.
//!
//! Built once at unit startup and used for both DDL generation and every
//! per-type insert plan, so the layout seen by `CREATE TABLE` and by the
//! inserts is always the same.

use std::collections::HashMap;

use siphon_api::column::{
    ColumnModel, ColumnType, DISCRIMINATOR_SUFFIX, fixed_columns, sanitize_column_name,
};
use siphon_api::schema::{Encoding, FieldKind, SourceField, StreamSchema, TypeTag};

use crate::error::EngineError;

/// Encode template of one concrete source type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeTemplate {
    pub tag: TypeTag,
    pub type_name: String,
    /// Effective fields, ancestors first.
    pub fields: Vec<SourceField>,
    /// Table column populated by each field, parallel to `fields`.
    /// Excludes the four fixed columns.
    pub columns: Vec<ColumnModel>,
}

/// Destination layout of one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedSchema {
    /// Table columns: the four fixed columns followed by the union of every
    /// concrete type's columns, in first-sighting order.
    pub columns: Vec<ColumnModel>,
    /// Per-concrete-type templates, indexed by [`TypeTag`].
    pub types: Vec<TypeTemplate>,
}

/// Translate the full reachable type set of a stream.
///
/// A field whose encoding has no destination mapping aborts translation —
/// this is a configuration error, not a runtime one.
pub fn translate(schema: &StreamSchema, decimal_scale: u8) -> Result<TranslatedSchema, EngineError> {
    schema.validate()?;

    let mut columns = fixed_columns();
    let mut index: HashMap<String, usize> =
        columns.iter().enumerate().map(|(i, c)| (c.name.clone(), i)).collect();

    let mut types = Vec::new();
    for ty in schema.concrete_types() {
        let tag = types.len() as TypeTag;
        let fields: Vec<SourceField> =
            schema.effective_fields(&ty.name)?.into_iter().cloned().collect();

        let mut type_columns = Vec::with_capacity(fields.len());
        for field in &fields {
            let column = field_column(None, field, schema, decimal_scale, false)
                .map_err(|e| e.with_context(format!("type '{}', field '{}'", ty.name, field.name)))?;
            let column = intern(&mut columns, &mut index, column)
                .map_err(|e| e.with_context(format!("type '{}'", ty.name)))?;
            type_columns.push(column);
        }

        types.push(TypeTemplate { tag, type_name: ty.name.clone(), fields, columns: type_columns });
    }

    Ok(TranslatedSchema { columns, types })
}

/// First column with a given derived name wins; later identically-named,
/// identically-typed declarations reuse it. A same-name different-type
/// declaration is a schema error — one table serves every subtype.
fn intern(
    columns: &mut Vec<ColumnModel>,
    index: &mut HashMap<String, usize>,
    column: ColumnModel,
) -> Result<ColumnModel, EngineError> {
    if let Some(&i) = index.get(&column.name) {
        let existing = &columns[i];
        if existing.column_type != column.column_type {
            return Err(EngineError::Schema(format!(
                "column '{}' redeclared with a different type ({:?} vs {:?})",
                column.name, existing.column_type, column.column_type
            )));
        }
        return Ok(existing.deep_copy());
    }
    index.insert(column.name.clone(), columns.len());
    columns.push(column.deep_copy());
    Ok(column)
}

/// Derived destination column name of one field: sanitized field name plus
/// the encoding's type suffix for scalars, bare for group columns. The
/// suffix keeps same-named fields with different encodings apart; group and
/// nullable wrappers contribute no suffix of their own.
pub(crate) fn derived_name(prefix: Option<&str>, field: &SourceField) -> String {
    let base = sanitize_column_name(&field.name);
    let name = match &field.kind {
        FieldKind::Scalar(enc) | FieldKind::ScalarArray(enc) => {
            format!("{base}_{}", encoding_suffix(enc))
        }
        FieldKind::Object { .. } | FieldKind::ObjectArray { .. } => base,
    };
    match prefix {
        Some(p) => format!("{p}_{name}"),
        None => name,
    }
}

fn encoding_suffix(encoding: &Encoding) -> String {
    match encoding {
        Encoding::Int8 => "i8".into(),
        Encoding::Int16 => "i16".into(),
        Encoding::Int32 => "i32".into(),
        Encoding::Int64 => "i64".into(),
        Encoding::Float32 => "f32".into(),
        Encoding::Float64 => "f64".into(),
        Encoding::FloatAuto | Encoding::Decimal64 => "dec".into(),
        Encoding::Enum(desc) => sanitize_column_name(&desc.name.to_lowercase()),
        Encoding::Utf8 => "str".into(),
        Encoding::Binary => "bin".into(),
        Encoding::Timestamp => "ts".into(),
        Encoding::TimeOfDay => "tod".into(),
        Encoding::Boolean => "bool".into(),
        Encoding::Char => "char".into(),
        Encoding::Alphanumeric(_) => "an".into(),
    }
}

/// Destination column of one field. `in_array` marks fields of object-array
/// element types, whose leaves become parallel arrays.
fn field_column(
    prefix: Option<&str>,
    field: &SourceField,
    schema: &StreamSchema,
    decimal_scale: u8,
    in_array: bool,
) -> Result<ColumnModel, EngineError> {
    let name = derived_name(prefix, field);
    let column_type = match &field.kind {
        FieldKind::Scalar(enc) => {
            let leaf = scalar_type(enc, decimal_scale)?;
            if in_array {
                // Array elements have no native null; absence is carried by
                // per-element sentinels (boolean) or the element default.
                ColumnType::Array(Box::new(leaf))
            } else if field.nullable {
                ColumnType::Nullable(Box::new(leaf))
            } else {
                leaf
            }
        }
        FieldKind::ScalarArray(enc) => {
            let leaf = scalar_type(enc, decimal_scale)?;
            if in_array {
                ColumnType::Array(Box::new(ColumnType::Array(Box::new(leaf))))
            } else {
                ColumnType::Array(Box::new(leaf))
            }
        }
        FieldKind::Object { types } => {
            if in_array {
                return Err(EngineError::Unsupported(format!(
                    "object field '{}' inside an object array — only one nesting level is supported",
                    field.name
                )));
            }
            ColumnType::ObjectGroup(union_columns(&name, types, schema, decimal_scale, false)?)
        }
        FieldKind::ObjectArray { types } => {
            if in_array {
                return Err(EngineError::Unsupported(format!(
                    "object-array field '{}' inside an object array — only one nesting level is supported",
                    field.name
                )));
            }
            ColumnType::NestedGroup(union_columns(&name, types, schema, decimal_scale, true)?)
        }
    };
    Ok(ColumnModel::new(name, column_type))
}

/// Union of the permitted types' fields under one group: a synthetic
/// discriminator sub-column first, then every field of every permitted
/// type. Identically-named, identically-typed sub-columns are shared.
fn union_columns(
    group_name: &str,
    permitted: &[String],
    schema: &StreamSchema,
    decimal_scale: u8,
    in_array: bool,
) -> Result<Vec<ColumnModel>, EngineError> {
    let discriminator_type = if in_array {
        ColumnType::Array(Box::new(ColumnType::String))
    } else {
        ColumnType::String
    };
    let mut sub = vec![ColumnModel::new(
        format!("{group_name}_{DISCRIMINATOR_SUFFIX}"),
        discriminator_type,
    )];
    let mut index: HashMap<String, usize> = HashMap::from([(sub[0].name.clone(), 0)]);

    for type_name in permitted {
        let ty = schema.get(type_name).ok_or_else(|| {
            EngineError::Schema(format!("group '{group_name}' permits unknown type '{type_name}'"))
        })?;
        if ty.is_abstract {
            return Err(EngineError::Schema(format!(
                "group '{group_name}' permits abstract type '{type_name}'"
            )));
        }
        for field in schema.effective_fields(type_name)? {
            let column = field_column(Some(group_name), field, schema, decimal_scale, in_array)
                .map_err(|e| {
                    e.with_context(format!("group '{group_name}', element type '{type_name}'"))
                })?;
            intern(&mut sub, &mut index, column)
                .map_err(|e| e.with_context(format!("group '{group_name}'")))?;
        }
    }
    Ok(sub)
}

fn scalar_type(encoding: &Encoding, decimal_scale: u8) -> Result<ColumnType, EngineError> {
    Ok(match encoding {
        Encoding::Int8 => ColumnType::Int8,
        Encoding::Int16 => ColumnType::Int16,
        Encoding::Int32 => ColumnType::Int32,
        Encoding::Int64 => ColumnType::Int64,
        Encoding::Float32 => ColumnType::Float32,
        Encoding::Float64 => ColumnType::Float64,
        // One global scale for every auto-scaled and decimal64 field.
        Encoding::FloatAuto | Encoding::Decimal64 => ColumnType::Decimal { scale: decimal_scale },
        Encoding::Enum(desc) => {
            validate_enum(desc)?;
            ColumnType::Enum16(desc.symbols.clone())
        }
        Encoding::Utf8 | Encoding::Binary | Encoding::Char => ColumnType::String,
        Encoding::Timestamp => ColumnType::DateTime,
        Encoding::TimeOfDay => ColumnType::Time,
        Encoding::Boolean => ColumnType::Bool,
        Encoding::Alphanumeric(len) => {
            return Err(EngineError::Unsupported(format!(
                "alphanumeric({len}) encoding has no destination mapping"
            )));
        }
    })
}

fn validate_enum(desc: &siphon_api::schema::EnumDescriptor) -> Result<(), EngineError> {
    for (i, (symbol, ordinal)) in desc.symbols.iter().enumerate() {
        for (other_symbol, other_ordinal) in &desc.symbols[i + 1..] {
            if symbol == other_symbol {
                return Err(EngineError::Schema(format!(
                    "enum '{}' declares symbol '{symbol}' twice",
                    desc.name
                )));
            }
            if ordinal == other_ordinal {
                return Err(EngineError::Schema(format!(
                    "enum '{}' declares ordinal {ordinal} twice ('{symbol}', '{other_symbol}')",
                    desc.name
                )));
            }
        }
    }
    Ok(())
}
