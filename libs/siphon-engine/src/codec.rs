//! Per-runtime-type codec engine.
//!
//! A record body is decoded field-by-field and bound straight into the
//! insert plan's row buffer. Bind plans are compiled lazily on first
//! sighting of a type tag and memoized; dispatch is an array lookup on the
//! tag, never a name hash or reflection.
//!
//! Construction is not safe for concurrent first-use of the same tag; a
//! replication unit is single-threaded by contract.

use std::collections::HashMap;

use siphon_api::column::{ColumnModel, ColumnType, FIXED_COLUMN_COUNT};
use siphon_api::schema::{Encoding, FieldKind, SourceField, TypeTag};
use siphon_api::value::CellValue;
use siphon_api::wire::WireCursor;

use crate::error::EngineError;
use crate::translator::{TranslatedSchema, TypeTemplate, derived_name};

/// Lazily compiled bind plans, one per concrete runtime type.
pub struct CodecCache {
    codecs: Vec<Option<RecordCodec>>,
}

impl CodecCache {
    pub fn new(type_count: usize) -> Self {
        Self { codecs: (0..type_count).map(|_| None).collect() }
    }

    /// Decode one record body and position its values into `row`.
    ///
    /// `row` must already hold the plan's default values; the codec only
    /// writes the slots the record's own fields populate.
    pub fn bind(
        &mut self,
        tag: TypeTag,
        schema: &TranslatedSchema,
        cursor: &mut WireCursor<'_>,
        row: &mut [CellValue],
    ) -> Result<(), EngineError> {
        let idx = tag as usize;
        if idx >= self.codecs.len() {
            return Err(EngineError::Decode(format!("unknown type tag {tag}")));
        }
        if self.codecs[idx].is_none() {
            self.codecs[idx] = Some(RecordCodec::compile(&schema.types[idx])?);
        }
        self.codecs[idx]
            .as_mut()
            .unwrap()
            .bind(schema, cursor, row)
            .map_err(|e| e.with_context(format!("type '{}'", schema.types[idx].type_name)))
    }
}

/// Ordered bind functions of one concrete type, field declaration order.
struct RecordCodec {
    binders: Vec<FieldBinder>,
}

impl RecordCodec {
    fn compile(template: &TypeTemplate) -> Result<Self, EngineError> {
        let mut binders = Vec::with_capacity(template.fields.len());
        let mut slot = FIXED_COLUMN_COUNT;
        for (field, column) in template.fields.iter().zip(&template.columns) {
            binders.push(FieldBinder::compile(field, column, slot)?);
            slot += column.leaf_count();
        }
        Ok(Self { binders })
    }

    fn bind(
        &mut self,
        schema: &TranslatedSchema,
        cursor: &mut WireCursor<'_>,
        row: &mut [CellValue],
    ) -> Result<(), EngineError> {
        for binder in &mut self.binders {
            binder.bind(schema, cursor, row)?;
        }
        Ok(())
    }
}

/// One field's bind function, chosen by the field's element kind.
enum FieldBinder {
    Scalar { slot: usize, nullable: bool, codec: ScalarCodec },
    ScalarArray { slot: usize, codec: ScalarCodec },
    Object(ObjectBinder),
    ObjectArray(ArrayGroupBinder),
}

impl FieldBinder {
    fn compile(field: &SourceField, column: &ColumnModel, slot: usize) -> Result<Self, EngineError> {
        match &field.kind {
            FieldKind::Scalar(enc) => {
                let nullable = matches!(column.column_type, ColumnType::Nullable(_));
                let leaf = match &column.column_type {
                    ColumnType::Nullable(inner) => inner.as_ref(),
                    other => other,
                };
                Ok(FieldBinder::Scalar { slot, nullable, codec: ScalarCodec::compile(enc, leaf)? })
            }
            FieldKind::ScalarArray(enc) => {
                let ColumnType::Array(element) = &column.column_type else {
                    return Err(EngineError::Schema(format!(
                        "column '{}' of an array field is not array-typed",
                        column.name
                    )));
                };
                Ok(FieldBinder::ScalarArray { slot, codec: ScalarCodec::compile(enc, element)? })
            }
            FieldKind::Object { types } => {
                Ok(FieldBinder::Object(ObjectBinder::compile(types.clone(), column, slot)?))
            }
            FieldKind::ObjectArray { types } => {
                Ok(FieldBinder::ObjectArray(ArrayGroupBinder::compile(types.clone(), column, slot)?))
            }
        }
    }

    fn bind(
        &mut self,
        schema: &TranslatedSchema,
        cursor: &mut WireCursor<'_>,
        row: &mut [CellValue],
    ) -> Result<(), EngineError> {
        match self {
            FieldBinder::Scalar { slot, nullable, codec } => {
                let value = codec.read(cursor)?;
                if value == CellValue::Null && !*nullable {
                    return Err(EngineError::Decode(format!(
                        "null value for non-nullable column at position {}",
                        *slot + 1
                    )));
                }
                row[*slot] = value;
            }
            FieldBinder::ScalarArray { slot, codec } => {
                row[*slot] = read_scalar_array(codec, cursor)?;
            }
            FieldBinder::Object(binder) => binder.bind(schema, cursor, row)?,
            FieldBinder::ObjectArray(binder) => binder.bind(schema, cursor, row)?,
        }
        Ok(())
    }
}

/// Bind plan of a non-array polymorphic object field.
///
/// Decode plans are resolved for the **actual** runtime nested type and
/// cached per inner tag — together with the per-field binder instance this
/// keys the cache by (outer type, field, inner type).
struct ObjectBinder {
    /// Group column name; prefixes every sub-column.
    prefix: String,
    permitted: Vec<String>,
    discriminator_slot: usize,
    /// `(slot, default)` for every leaf of the group, discriminator
    /// included — the pre-built null writers for an absent object.
    null_writers: Vec<(usize, CellValue)>,
    /// Union sub-columns with their absolute base slots, keyed by name.
    sub_slots: HashMap<String, (usize, ColumnModel)>,
    plans: HashMap<TypeTag, Vec<FieldBinder>>,
}

impl ObjectBinder {
    fn compile(
        permitted: Vec<String>,
        column: &ColumnModel,
        base_slot: usize,
    ) -> Result<Self, EngineError> {
        let ColumnType::ObjectGroup(sub) = &column.column_type else {
            return Err(EngineError::Schema(format!(
                "column '{}' of an object field is not an object group",
                column.name
            )));
        };
        let mut sub_slots = HashMap::new();
        let mut null_writers = Vec::new();
        let mut slot = base_slot;
        for c in sub {
            sub_slots.insert(c.name.clone(), (slot, c.deep_copy()));
            push_leaf_defaults(c, &mut slot, &mut null_writers);
        }
        Ok(Self {
            prefix: column.name.clone(),
            permitted,
            discriminator_slot: base_slot,
            null_writers,
            sub_slots,
            plans: HashMap::new(),
        })
    }

    fn bind(
        &mut self,
        schema: &TranslatedSchema,
        cursor: &mut WireCursor<'_>,
        row: &mut [CellValue],
    ) -> Result<(), EngineError> {
        let Some(tag) = cursor.read_object_tag()? else {
            // Absent object: write every leaf's default so values from a
            // prior row in this batch slot are never reused.
            for (slot, default) in &self.null_writers {
                row[*slot] = default.clone();
            }
            return Ok(());
        };
        self.ensure_plan(tag, schema)?;
        row[self.discriminator_slot] =
            CellValue::String(schema.types[tag as usize].type_name.clone());
        let plan = self.plans.get_mut(&tag).unwrap();
        for binder in plan {
            binder.bind(schema, cursor, row)?;
        }
        Ok(())
    }

    fn ensure_plan(&mut self, tag: TypeTag, schema: &TranslatedSchema) -> Result<(), EngineError> {
        if self.plans.contains_key(&tag) {
            return Ok(());
        }
        let template = check_permitted(tag, schema, &self.permitted, &self.prefix)?;
        let mut binders = Vec::with_capacity(template.fields.len());
        for field in &template.fields {
            let name = derived_name(Some(&self.prefix), field);
            let (slot, column) = self.sub_slots.get(&name).ok_or_else(|| {
                EngineError::Decode(format!("no sub-column '{name}' in group '{}'", self.prefix))
            })?;
            binders.push(FieldBinder::compile(field, column, *slot)?);
        }
        self.plans.insert(tag, binders);
        Ok(())
    }
}

/// Bind plan of an array-of-polymorphic-objects field.
///
/// Row-oriented source elements transpose into column-oriented destination
/// arrays: one array per union leaf, all of the source array's length,
/// plus a parallel discriminator array of element type names.
struct ArrayGroupBinder {
    prefix: String,
    permitted: Vec<String>,
    discriminator_slot: usize,
    leaves: Vec<ArrayLeaf>,
    /// Sub-column name → index into `leaves`.
    leaf_index: HashMap<String, usize>,
    plans: HashMap<TypeTag, Vec<ElementBinder>>,
}

struct ArrayLeaf {
    slot: usize,
    /// Per-element default filling positions an element's type doesn't set.
    element_default: CellValue,
    element_type: ColumnType,
}

/// Per-field bind function of one permitted element type. Element types
/// hold scalars and scalar arrays only — deeper nesting was rejected at
/// translation time.
enum ElementBinder {
    Scalar { leaf: usize, codec: ScalarCodec },
    Array { leaf: usize, codec: ScalarCodec },
}

impl ArrayGroupBinder {
    fn compile(
        permitted: Vec<String>,
        column: &ColumnModel,
        base_slot: usize,
    ) -> Result<Self, EngineError> {
        let ColumnType::NestedGroup(sub) = &column.column_type else {
            return Err(EngineError::Schema(format!(
                "column '{}' of an object-array field is not a nested group",
                column.name
            )));
        };
        let mut leaves = Vec::new();
        let mut leaf_index = HashMap::new();
        // sub[0] is the discriminator; every nested-group sub-column is a
        // leaf (one slot each).
        for (i, c) in sub.iter().enumerate().skip(1) {
            let ColumnType::Array(element) = &c.column_type else {
                return Err(EngineError::Schema(format!(
                    "nested-group sub-column '{}' is not array-typed",
                    c.name
                )));
            };
            leaf_index.insert(c.name.clone(), leaves.len());
            leaves.push(ArrayLeaf {
                slot: base_slot + i,
                element_default: element.default_value(),
                element_type: element.as_ref().clone(),
            });
        }
        Ok(Self {
            prefix: column.name.clone(),
            permitted,
            discriminator_slot: base_slot,
            leaves,
            leaf_index,
            plans: HashMap::new(),
        })
    }

    fn bind(
        &mut self,
        schema: &TranslatedSchema,
        cursor: &mut WireCursor<'_>,
        row: &mut [CellValue],
    ) -> Result<(), EngineError> {
        let Some(len) = cursor.read_len()? else {
            row[self.discriminator_slot] = CellValue::Array(Vec::new());
            for leaf in &self.leaves {
                row[leaf.slot] = CellValue::Array(Vec::new());
            }
            return Ok(());
        };
        let mut discriminators = Vec::with_capacity(len);
        let mut columns: Vec<Vec<CellValue>> =
            self.leaves.iter().map(|_| Vec::with_capacity(len)).collect();
        for j in 0..len {
            for (i, leaf) in self.leaves.iter().enumerate() {
                columns[i].push(leaf.element_default.clone());
            }
            match cursor.read_object_tag()? {
                None => discriminators.push(CellValue::String(String::new())),
                Some(tag) => {
                    self.ensure_plan(tag, schema)?;
                    discriminators
                        .push(CellValue::String(schema.types[tag as usize].type_name.clone()));
                    for binder in self.plans.get(&tag).unwrap() {
                        match binder {
                            ElementBinder::Scalar { leaf, codec } => {
                                if let Some(value) = codec.read_element(cursor)? {
                                    columns[*leaf][j] = value;
                                }
                            }
                            ElementBinder::Array { leaf, codec } => {
                                columns[*leaf][j] = read_scalar_array(codec, cursor)?;
                            }
                        }
                    }
                }
            }
        }
        row[self.discriminator_slot] = CellValue::Array(discriminators);
        for (i, leaf) in self.leaves.iter().enumerate() {
            row[leaf.slot] = CellValue::Array(std::mem::take(&mut columns[i]));
        }
        Ok(())
    }

    fn ensure_plan(&mut self, tag: TypeTag, schema: &TranslatedSchema) -> Result<(), EngineError> {
        if self.plans.contains_key(&tag) {
            return Ok(());
        }
        let template = check_permitted(tag, schema, &self.permitted, &self.prefix)?;
        let mut binders = Vec::with_capacity(template.fields.len());
        for field in &template.fields {
            let name = derived_name(Some(&self.prefix), field);
            let leaf = *self.leaf_index.get(&name).ok_or_else(|| {
                EngineError::Decode(format!("no sub-column '{name}' in group '{}'", self.prefix))
            })?;
            let element_type = &self.leaves[leaf].element_type;
            let binder = match &field.kind {
                FieldKind::Scalar(enc) => {
                    ElementBinder::Scalar { leaf, codec: ScalarCodec::compile(enc, element_type)? }
                }
                FieldKind::ScalarArray(enc) => {
                    let ColumnType::Array(inner) = element_type else {
                        return Err(EngineError::Schema(format!(
                            "sub-column '{name}' of an array field is not array-typed"
                        )));
                    };
                    ElementBinder::Array { leaf, codec: ScalarCodec::compile(enc, inner)? }
                }
                FieldKind::Object { .. } | FieldKind::ObjectArray { .. } => {
                    return Err(EngineError::Decode(format!(
                        "object nesting inside object array '{}'",
                        self.prefix
                    )));
                }
            };
            binders.push(binder);
        }
        self.plans.insert(tag, binders);
        Ok(())
    }
}

fn check_permitted<'a>(
    tag: TypeTag,
    schema: &'a TranslatedSchema,
    permitted: &[String],
    group: &str,
) -> Result<&'a TypeTemplate, EngineError> {
    let template = schema
        .types
        .get(tag as usize)
        .ok_or_else(|| EngineError::Decode(format!("unknown nested type tag {tag}")))?;
    if !permitted.iter().any(|n| n == &template.type_name) {
        return Err(EngineError::Decode(format!(
            "type '{}' is not permitted in group '{group}'",
            template.type_name
        )));
    }
    Ok(template)
}

fn push_leaf_defaults(column: &ColumnModel, slot: &mut usize, out: &mut Vec<(usize, CellValue)>) {
    match column.column_type.sub_columns() {
        Some(sub) => {
            for c in sub {
                push_leaf_defaults(c, slot, out);
            }
        }
        None => {
            out.push((*slot, column.column_type.default_value()));
            *slot += 1;
        }
    }
}

/// Whole-array read of a scalar-array field. A null array lands as an
/// empty destination array; absent elements take the element default —
/// booleans the documented out-of-range sentinel `2`.
fn read_scalar_array(
    codec: &ScalarCodec,
    cursor: &mut WireCursor<'_>,
) -> Result<CellValue, EngineError> {
    let Some(len) = cursor.read_len()? else {
        return Ok(CellValue::Array(Vec::new()));
    };
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(codec.read_element(cursor)?.unwrap_or_else(|| codec.element_default()));
    }
    Ok(CellValue::Array(out))
}

/// Scalar decode function, one per wire encoding.
#[derive(Debug, Clone)]
enum ScalarCodec {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal { scale: u8 },
    Bool,
    Char,
    Enum { default_ordinal: i16 },
    Utf8,
    Binary,
    Timestamp,
    TimeOfDay,
}

impl ScalarCodec {
    fn compile(encoding: &Encoding, leaf: &ColumnType) -> Result<Self, EngineError> {
        Ok(match encoding {
            Encoding::Int8 => ScalarCodec::Int8,
            Encoding::Int16 => ScalarCodec::Int16,
            Encoding::Int32 => ScalarCodec::Int32,
            Encoding::Int64 => ScalarCodec::Int64,
            Encoding::Float32 => ScalarCodec::Float32,
            Encoding::Float64 => ScalarCodec::Float64,
            Encoding::FloatAuto | Encoding::Decimal64 => {
                let ColumnType::Decimal { scale } = leaf else {
                    return Err(EngineError::Schema(format!(
                        "decimal encoding bound to non-decimal column type {leaf:?}"
                    )));
                };
                ScalarCodec::Decimal { scale: *scale }
            }
            Encoding::Enum(_) => {
                let ColumnType::Enum16(symbols) = leaf else {
                    return Err(EngineError::Schema(format!(
                        "enum encoding bound to non-enum column type {leaf:?}"
                    )));
                };
                ScalarCodec::Enum {
                    default_ordinal: symbols.first().map(|(_, o)| *o).unwrap_or(0),
                }
            }
            Encoding::Boolean => ScalarCodec::Bool,
            Encoding::Char => ScalarCodec::Char,
            Encoding::Utf8 => ScalarCodec::Utf8,
            Encoding::Binary => ScalarCodec::Binary,
            Encoding::Timestamp => ScalarCodec::Timestamp,
            Encoding::TimeOfDay => ScalarCodec::TimeOfDay,
            Encoding::Alphanumeric(len) => {
                return Err(EngineError::Unsupported(format!(
                    "alphanumeric({len}) encoding has no codec"
                )));
            }
        })
    }

    /// Scalar field read: the wire sentinel becomes `CellValue::Null`.
    fn read(&self, cursor: &mut WireCursor<'_>) -> Result<CellValue, EngineError> {
        Ok(match self {
            ScalarCodec::Int8 => cursor.read_i8()?.map(CellValue::Int8),
            ScalarCodec::Int16 => cursor.read_i16()?.map(CellValue::Int16),
            ScalarCodec::Int32 => cursor.read_i32()?.map(CellValue::Int32),
            ScalarCodec::Int64 => cursor.read_i64()?.map(CellValue::Int64),
            ScalarCodec::Float32 => cursor.read_f32()?.map(CellValue::Float32),
            ScalarCodec::Float64 => cursor.read_f64()?.map(CellValue::Float64),
            ScalarCodec::Decimal { scale } => match cursor.read_decimal()? {
                Some((wire_scale, mantissa)) => {
                    Some(CellValue::Decimal(rescale(mantissa, wire_scale, *scale)?, *scale))
                }
                None => None,
            },
            ScalarCodec::Bool => cursor.read_bool()?.map(CellValue::Bool),
            ScalarCodec::Char => cursor.read_char()?.map(|c| CellValue::String(c.to_string())),
            ScalarCodec::Enum { .. } => cursor.read_enum()?.map(CellValue::Enum),
            ScalarCodec::Utf8 => cursor.read_string()?.map(CellValue::String),
            ScalarCodec::Binary => cursor.read_bytes()?.map(CellValue::Bytes),
            ScalarCodec::Timestamp => cursor.read_timestamp()?.map(CellValue::DateTime),
            ScalarCodec::TimeOfDay => cursor.read_time()?.map(CellValue::Time),
        }
        .unwrap_or(CellValue::Null))
    }

    /// Array element read: `None` keeps the pre-filled element default.
    /// Booleans are 3-state on the wire and in the destination array —
    /// true/false/absent as 1/0/2, since the array element has no native
    /// null.
    fn read_element(&self, cursor: &mut WireCursor<'_>) -> Result<Option<CellValue>, EngineError> {
        if let ScalarCodec::Bool = self {
            return Ok(Some(match cursor.read_bool()? {
                Some(true) => CellValue::Int8(1),
                Some(false) => CellValue::Int8(0),
                None => CellValue::Int8(2),
            }));
        }
        match self.read(cursor)? {
            CellValue::Null => Ok(None),
            value => Ok(Some(value)),
        }
    }

    fn element_default(&self) -> CellValue {
        match self {
            ScalarCodec::Int8 => CellValue::Int8(0),
            ScalarCodec::Int16 => CellValue::Int16(0),
            ScalarCodec::Int32 => CellValue::Int32(0),
            ScalarCodec::Int64 => CellValue::Int64(0),
            ScalarCodec::Float32 => CellValue::Float32(0.0),
            ScalarCodec::Float64 => CellValue::Float64(0.0),
            ScalarCodec::Decimal { scale } => CellValue::Decimal(0, *scale),
            ScalarCodec::Bool => CellValue::Int8(0),
            ScalarCodec::Char | ScalarCodec::Utf8 => CellValue::String(String::new()),
            ScalarCodec::Enum { default_ordinal } => CellValue::Enum(*default_ordinal),
            ScalarCodec::Binary => CellValue::Bytes(Vec::new()),
            ScalarCodec::Timestamp => CellValue::DateTime(0),
            ScalarCodec::TimeOfDay => CellValue::Time(0),
        }
    }
}

/// Rescale a wire mantissa to the destination scale. Widening multiplies,
/// narrowing truncates toward zero; overflow is a decode error.
fn rescale(mantissa: i64, from_scale: u8, to_scale: u8) -> Result<i128, EngineError> {
    let m = mantissa as i128;
    if from_scale == to_scale {
        return Ok(m);
    }
    if from_scale < to_scale {
        let factor = 10i128.pow((to_scale - from_scale) as u32);
        m.checked_mul(factor).ok_or_else(|| {
            EngineError::Decode(format!(
                "decimal overflow rescaling {mantissa} from scale {from_scale} to {to_scale}"
            ))
        })
    } else {
        Ok(m / 10i128.pow((from_scale - to_scale) as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siphon_api::column::{fixed_columns, flatten_leaves};
    use siphon_api::schema::{EnumDescriptor, SourceType, StreamSchema};
    use siphon_api::wire::WireWriter;

    use crate::translator::translate;

    fn row_for(schema: &TranslatedSchema, tag: TypeTag) -> Vec<CellValue> {
        let mut columns = fixed_columns();
        columns.extend(schema.types[tag as usize].columns.iter().map(|c| c.deep_copy()));
        flatten_leaves(&columns).iter().map(|c| c.column_type.default_value()).collect()
    }

    fn nested_schema() -> StreamSchema {
        StreamSchema {
            top_types: vec!["Parent".into()],
            types: vec![
                SourceType {
                    name: "Parent".into(),
                    parent: None,
                    is_abstract: false,
                    fields: vec![
                        SourceField::scalar("seq", Encoding::Int64, false),
                        SourceField::object("leg", vec!["A".into(), "B".into()], true),
                    ],
                },
                SourceType {
                    name: "A".into(),
                    parent: None,
                    is_abstract: false,
                    fields: vec![SourceField::scalar("x", Encoding::Int32, true)],
                },
                SourceType {
                    name: "B".into(),
                    parent: None,
                    is_abstract: false,
                    fields: vec![SourceField::scalar("y", Encoding::Float64, true)],
                },
            ],
        }
    }

    #[test]
    fn scalar_fields_bind_in_declaration_order() {
        let stream = StreamSchema {
            top_types: vec!["Trade".into()],
            types: vec![SourceType {
                name: "Trade".into(),
                parent: None,
                is_abstract: false,
                fields: vec![
                    SourceField::scalar("price", Encoding::Decimal64, false),
                    SourceField::scalar("size", Encoding::Int64, true),
                    SourceField::scalar(
                        "side",
                        Encoding::Enum(EnumDescriptor {
                            name: "Side".into(),
                            symbols: vec![("BUY".into(), 0), ("SELL".into(), 1)],
                        }),
                        false,
                    ),
                ],
            }],
        };
        let schema = translate(&stream, 4).unwrap();
        let mut cache = CodecCache::new(schema.types.len());
        let mut row = row_for(&schema, 0);

        let mut w = WireWriter::new();
        w.write_decimal(2, Some(12_345)).unwrap(); // 123.45, wire scale 2
        w.write_i64(None).unwrap();
        w.write_enum(Some(1)).unwrap();
        let body = w.into_bytes();

        cache.bind(0, &schema, &mut WireCursor::new(&body), &mut row).unwrap();
        assert_eq!(row[FIXED_COLUMN_COUNT], CellValue::Decimal(1_234_500, 4));
        assert_eq!(row[FIXED_COLUMN_COUNT + 1], CellValue::Null);
        assert_eq!(row[FIXED_COLUMN_COUNT + 2], CellValue::Enum(1));
    }

    #[test]
    fn enum_ordinal_round_trips_through_descriptor() {
        let desc = EnumDescriptor {
            name: "Kind".into(),
            symbols: vec![("FIRST".into(), 0), ("SECOND".into(), 1), ("DEFAULT".into(), 2)],
        };
        let stream = StreamSchema {
            top_types: vec!["T".into()],
            types: vec![SourceType {
                name: "T".into(),
                parent: None,
                is_abstract: false,
                fields: vec![SourceField::scalar("kind", Encoding::Enum(desc.clone()), false)],
            }],
        };
        let schema = translate(&stream, 9).unwrap();
        let mut cache = CodecCache::new(1);
        let mut row = row_for(&schema, 0);

        let mut w = WireWriter::new();
        w.write_enum(desc.ordinal_of("SECOND")).unwrap();
        let body = w.into_bytes();
        cache.bind(0, &schema, &mut WireCursor::new(&body), &mut row).unwrap();

        let CellValue::Enum(ordinal) = row[FIXED_COLUMN_COUNT] else { panic!() };
        assert_eq!(desc.symbol_of(ordinal), Some("SECOND"));
    }

    #[test]
    fn null_for_non_nullable_field_is_a_decode_error() {
        let stream = StreamSchema {
            top_types: vec!["T".into()],
            types: vec![SourceType {
                name: "T".into(),
                parent: None,
                is_abstract: false,
                fields: vec![SourceField::scalar("qty", Encoding::Int64, false)],
            }],
        };
        let schema = translate(&stream, 9).unwrap();
        let mut cache = CodecCache::new(1);
        let mut row = row_for(&schema, 0);

        let mut w = WireWriter::new();
        w.write_i64(None).unwrap();
        let body = w.into_bytes();
        let err = cache.bind(0, &schema, &mut WireCursor::new(&body), &mut row).unwrap_err();
        assert!(matches!(err, EngineError::Decode(_)));
    }

    #[test]
    fn absent_object_writes_group_defaults() {
        let schema = translate(&nested_schema(), 9).unwrap();
        let tag = 0; // Parent
        let a_tag = 1;
        let mut cache = CodecCache::new(schema.types.len());
        let mut row = row_for(&schema, tag);

        // Row 1: leg present, concrete type A with x = 7.
        let mut w = WireWriter::new();
        w.write_i64(Some(1)).unwrap();
        w.write_object_tag(Some(a_tag)).unwrap();
        w.write_i32(Some(7)).unwrap();
        let body = w.into_bytes();
        cache.bind(tag, &schema, &mut WireCursor::new(&body), &mut row).unwrap();
        assert_eq!(row[FIXED_COLUMN_COUNT + 1], CellValue::String("A".into()));
        assert_eq!(row[FIXED_COLUMN_COUNT + 2], CellValue::Int32(7));

        // Row 2 reuses the same buffer with the leg absent: the codec's
        // null writers must clear every group leaf.
        let mut w = WireWriter::new();
        w.write_i64(Some(2)).unwrap();
        w.write_object_tag(None).unwrap();
        let body = w.into_bytes();
        cache.bind(tag, &schema, &mut WireCursor::new(&body), &mut row).unwrap();
        assert_eq!(row[FIXED_COLUMN_COUNT + 1], CellValue::String(String::new()));
        assert_eq!(row[FIXED_COLUMN_COUNT + 2], CellValue::Null);
        assert_eq!(row[FIXED_COLUMN_COUNT + 3], CellValue::Null);
    }

    #[test]
    fn object_array_transposes_to_parallel_arrays() {
        let stream = StreamSchema {
            top_types: vec!["Book".into()],
            types: vec![
                SourceType {
                    name: "Book".into(),
                    parent: None,
                    is_abstract: false,
                    fields: vec![SourceField::object_array(
                        "entries",
                        vec!["L2".into(), "L3".into()],
                    )],
                },
                SourceType {
                    name: "L2".into(),
                    parent: None,
                    is_abstract: false,
                    fields: vec![
                        SourceField::scalar("px", Encoding::Float64, false),
                        SourceField::scalar("active", Encoding::Boolean, true),
                    ],
                },
                SourceType {
                    name: "L3".into(),
                    parent: None,
                    is_abstract: false,
                    fields: vec![SourceField::scalar("qty", Encoding::Int64, false)],
                },
            ],
        };
        let schema = translate(&stream, 9).unwrap();
        let book = 0;
        let l2 = 1;
        let l3 = 2;
        let mut cache = CodecCache::new(schema.types.len());
        let mut row = row_for(&schema, book);

        // Three elements: L2, L3, L2 — with the middle L2 slot filled from
        // defaults for L3 elements and vice versa.
        let mut w = WireWriter::new();
        w.write_len(3).unwrap();
        w.write_object_tag(Some(l2)).unwrap();
        w.write_f64(Some(1.5)).unwrap();
        w.write_bool(Some(true));
        w.write_object_tag(Some(l3)).unwrap();
        w.write_i64(Some(40)).unwrap();
        w.write_object_tag(Some(l2)).unwrap();
        w.write_f64(Some(2.5)).unwrap();
        w.write_bool(None); // 3-state: absent → sentinel 2
        let body = w.into_bytes();
        cache.bind(book, &schema, &mut WireCursor::new(&body), &mut row).unwrap();

        // Layout: fixed(4), entries_type, entries_px_f64, entries_active_bool,
        // entries_qty_i64.
        assert_eq!(
            row[FIXED_COLUMN_COUNT],
            CellValue::Array(vec![
                CellValue::String("L2".into()),
                CellValue::String("L3".into()),
                CellValue::String("L2".into()),
            ])
        );
        assert_eq!(
            row[FIXED_COLUMN_COUNT + 1],
            CellValue::Array(vec![
                CellValue::Float64(1.5),
                CellValue::Float64(0.0),
                CellValue::Float64(2.5),
            ])
        );
        assert_eq!(
            row[FIXED_COLUMN_COUNT + 2],
            CellValue::Array(vec![
                CellValue::Int8(1),
                CellValue::Int8(0),
                CellValue::Int8(2),
            ])
        );
        assert_eq!(
            row[FIXED_COLUMN_COUNT + 3],
            CellValue::Array(vec![
                CellValue::Int64(0),
                CellValue::Int64(40),
                CellValue::Int64(0),
            ])
        );
    }

    #[test]
    fn scalar_array_substitutes_element_defaults() {
        let stream = StreamSchema {
            top_types: vec!["T".into()],
            types: vec![SourceType {
                name: "T".into(),
                parent: None,
                is_abstract: false,
                fields: vec![SourceField::array("sizes", Encoding::Int32)],
            }],
        };
        let schema = translate(&stream, 9).unwrap();
        let mut cache = CodecCache::new(1);
        let mut row = row_for(&schema, 0);

        let mut w = WireWriter::new();
        w.write_len(3).unwrap();
        w.write_i32(Some(5)).unwrap();
        w.write_i32(None).unwrap();
        w.write_i32(Some(-5)).unwrap();
        let body = w.into_bytes();
        cache.bind(0, &schema, &mut WireCursor::new(&body), &mut row).unwrap();
        assert_eq!(
            row[FIXED_COLUMN_COUNT],
            CellValue::Array(vec![
                CellValue::Int32(5),
                CellValue::Int32(0),
                CellValue::Int32(-5),
            ])
        );
    }

    #[test]
    fn unexpected_nested_tag_is_rejected() {
        let schema = translate(&nested_schema(), 9).unwrap();
        let mut cache = CodecCache::new(schema.types.len());
        let mut row = row_for(&schema, 0);

        // Tag 0 is Parent itself — not in the permitted set {A, B}.
        let mut w = WireWriter::new();
        w.write_i64(Some(1)).unwrap();
        w.write_object_tag(Some(0)).unwrap();
        let body = w.into_bytes();
        let err = cache.bind(0, &schema, &mut WireCursor::new(&body), &mut row).unwrap_err();
        assert!(matches!(err, EngineError::Decode(_)));
    }
}
