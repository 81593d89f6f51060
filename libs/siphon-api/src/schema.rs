use serde::{Deserialize, Serialize};

use crate::error::ReplicaError;

/// Stable dispatch key for one concrete source type within one stream.
///
/// Assigned densely, in schema declaration order, over the non-abstract
/// types of a [`StreamSchema`]. Records on the wire carry this tag; the
/// codec cache and the writer's insert plans are arrays indexed by it.
pub type TypeTag = u16;

/// Enumeration descriptor: ordered `(symbol, ordinal)` pairs.
///
/// Ordinals are copied verbatim into the destination enum type; the
/// translator rejects duplicate symbols and duplicate ordinals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDescriptor {
    pub name: String,
    pub symbols: Vec<(String, i16)>,
}

impl EnumDescriptor {
    pub fn symbol_of(&self, ordinal: i16) -> Option<&str> {
        self.symbols
            .iter()
            .find(|(_, o)| *o == ordinal)
            .map(|(s, _)| s.as_str())
    }

    pub fn ordinal_of(&self, symbol: &str) -> Option<i16> {
        self.symbols
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, o)| *o)
    }
}

/// Scalar field encoding on the source wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Encoding {
    Int8,
    Int16,
    Int32,
    Int64,
    /// Fixed-width IEEE binary32.
    Float32,
    /// Fixed-width IEEE binary64.
    Float64,
    /// Auto-scaled decimal: `scale u8` + `mantissa i64` on the wire.
    FloatAuto,
    /// 64-bit decimal: same wire layout as `FloatAuto`.
    Decimal64,
    Enum(EnumDescriptor),
    Utf8,
    Binary,
    /// Nanoseconds since the Unix epoch.
    Timestamp,
    /// Milliseconds since midnight.
    TimeOfDay,
    Boolean,
    Char,
    /// Packed alphanumeric of the given length. No destination mapping —
    /// translation aborts with an unsupported-type error.
    Alphanumeric(u16),
}

/// Element kind of a source field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    Scalar(Encoding),
    ScalarArray(Encoding),
    /// Polymorphic object with a closed set of permitted concrete types.
    Object { types: Vec<String> },
    /// Array of polymorphic objects. One nesting level only: the permitted
    /// element types may not themselves contain object fields.
    ObjectArray { types: Vec<String> },
}

/// A single field of a source record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceField {
    pub name: String,
    pub kind: FieldKind,
    pub nullable: bool,
}

impl SourceField {
    pub fn scalar(name: impl Into<String>, encoding: Encoding, nullable: bool) -> Self {
        Self { name: name.into(), kind: FieldKind::Scalar(encoding), nullable }
    }

    pub fn array(name: impl Into<String>, encoding: Encoding) -> Self {
        Self { name: name.into(), kind: FieldKind::ScalarArray(encoding), nullable: true }
    }

    pub fn object(name: impl Into<String>, types: Vec<String>, nullable: bool) -> Self {
        Self { name: name.into(), kind: FieldKind::Object { types }, nullable }
    }

    pub fn object_array(name: impl Into<String>, types: Vec<String>) -> Self {
        Self { name: name.into(), kind: FieldKind::ObjectArray { types }, nullable: true }
    }
}

/// One node of the source record-type DAG.
///
/// Read once from the source's metadata at startup, immutable afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceType {
    pub name: String,
    /// Single-inheritance parent, if any. Effective fields are the parent
    /// chain's fields (ancestors first) followed by this type's own.
    pub parent: Option<String>,
    pub is_abstract: bool,
    pub fields: Vec<SourceField>,
}

/// Full type set of one stream or query: the declared top-level types plus
/// everything reachable from them (ancestors, nested and array element
/// types, and their concrete subtypes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSchema {
    pub top_types: Vec<String>,
    /// All reachable types, in declaration order. Concrete (non-abstract)
    /// entries receive dense [`TypeTag`]s in this order.
    pub types: Vec<SourceType>,
}

impl StreamSchema {
    pub fn get(&self, name: &str) -> Option<&SourceType> {
        self.types.iter().find(|t| t.name == name)
    }

    /// Concrete types in declaration order — the tag assignment order.
    pub fn concrete_types(&self) -> impl Iterator<Item = &SourceType> {
        self.types.iter().filter(|t| !t.is_abstract)
    }

    pub fn tag_of(&self, name: &str) -> Option<TypeTag> {
        self.concrete_types()
            .position(|t| t.name == name)
            .map(|i| i as TypeTag)
    }

    pub fn type_by_tag(&self, tag: TypeTag) -> Option<&SourceType> {
        self.concrete_types().nth(tag as usize)
    }

    /// Effective field list of a type: parent chain first, then own fields.
    pub fn effective_fields(&self, name: &str) -> Result<Vec<&SourceField>, ReplicaError> {
        let mut chain = Vec::new();
        let mut current = Some(name);
        while let Some(n) = current {
            if chain.iter().any(|c: &&SourceType| c.name == n) {
                return Err(ReplicaError::schema(format!(
                    "inheritance cycle through type '{n}'"
                )));
            }
            let ty = self
                .get(n)
                .ok_or_else(|| ReplicaError::schema(format!("unknown type '{n}'")))?;
            chain.push(ty);
            current = ty.parent.as_deref();
        }
        let mut fields = Vec::new();
        for ty in chain.iter().rev() {
            fields.extend(ty.fields.iter());
        }
        Ok(fields)
    }

    /// Validate the type set: every referenced name resolves, parent chains
    /// are acyclic, and every concrete type is reachable from the declared
    /// top-level set (directly, as a subtype, or through an object field).
    pub fn validate(&self) -> Result<(), ReplicaError> {
        for top in &self.top_types {
            if self.get(top).is_none() {
                return Err(ReplicaError::schema(format!("unknown top-level type '{top}'")));
            }
        }
        for ty in &self.types {
            // Also checks cycles and parent resolution.
            self.effective_fields(&ty.name)?;
            for field in &ty.fields {
                if let FieldKind::Object { types } | FieldKind::ObjectArray { types } = &field.kind {
                    for name in types {
                        if self.get(name).is_none() {
                            return Err(ReplicaError::schema(format!(
                                "field '{}.{}' permits unknown type '{name}'",
                                ty.name, field.name
                            )));
                        }
                    }
                }
            }
        }

        let reachable = self.reachable_set();
        for ty in self.concrete_types() {
            if !reachable.contains(ty.name.as_str()) {
                return Err(ReplicaError::schema(format!(
                    "concrete type '{}' is not reachable from the top-level set",
                    ty.name
                )));
            }
        }
        Ok(())
    }

    /// Names reachable from the top-level set: subtypes of reachable types,
    /// their ancestors, and the permitted types of their object fields,
    /// transitively.
    fn reachable_set(&self) -> std::collections::HashSet<&str> {
        let mut reachable: std::collections::HashSet<&str> = std::collections::HashSet::new();
        let mut queue: Vec<&str> = self.top_types.iter().map(|s| s.as_str()).collect();
        while let Some(name) = queue.pop() {
            if !reachable.insert(name) {
                continue;
            }
            // Subtypes carry the top-level polymorphism.
            for ty in &self.types {
                if ty.parent.as_deref() == Some(name) {
                    queue.push(&ty.name);
                }
            }
            if let Some(ty) = self.get(name) {
                if let Some(parent) = ty.parent.as_deref() {
                    queue.push(parent);
                }
                for field in &ty.fields {
                    if let FieldKind::Object { types } | FieldKind::ObjectArray { types } =
                        &field.kind
                    {
                        queue.extend(types.iter().map(|s| s.as_str()));
                    }
                }
            }
        }
        reachable
    }
}
