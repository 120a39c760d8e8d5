//! Field descriptors and document schemas
//!
//! A [`Schema`] is the explicit field table of one collection. Every read and
//! write of a field goes through its [`FieldDef`]: coercion on assignment,
//! `serialize` on the way to the store, `deserialize` on the way back.
//!
//! ## Joins
//!
//! A join field points at documents of another collection. In memory and on
//! the wire it only ever holds identifiers, stored under `<name>_id`:
//! a single id (or null) for [`Cardinality::Single`], a list of ids for
//! [`Cardinality::Multi`]. Resolved documents are never part of a body, so
//! reference cycles cannot reach a snapshot.
//!
//! ## Snapshot schemas
//!
//! [`derive_snapshot_schema`] turns a live schema into the schema of its
//! history collection. It is a pure function of the live schema.

use crate::contract::Timestamp;
use crate::error::{VersoError, VersoResult};
use crate::value::{Document, Value};
use std::collections::BTreeMap;

/// Identity pseudo-field, never part of a stored body
pub const ID_FIELD: &str = "id";
/// Version pseudo-field, never part of a stored body
pub const VERSION_FIELD: &str = "_version";
/// Snapshot field: id of the live document
pub const DOCUMENT_ID_FIELD: &str = "_document_id";
/// Snapshot field: version of the live document being superseded
pub const DOCUMENT_VERSION_FIELD: &str = "_document_version";
/// Snapshot field: `proposal` or `entry`
pub const STATUS_FIELD: &str = "_status";
/// Soft-delete flag
pub const DELETED_FIELD: &str = "deleted";
/// Creation stamp
pub const CREATED_AT_FIELD: &str = "created_at";
/// Last-write stamp
pub const UPDATED_AT_FIELD: &str = "updated_at";
/// Suffix of history collection doc types
pub const HISTORY_SUFFIX: &str = "_version";

/// How many documents a join points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Zero or one id
    Single,
    /// A list of ids
    Multi,
}

/// Target and shape of a join field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinDef {
    /// Doc type of the referenced collection
    pub target: String,
    /// Single id or list of ids
    pub cardinality: Cardinality,
    /// Join field on the target that points back at the owner
    pub back_reference: Option<String>,
}

/// Storage type of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Exact-match string
    Keyword,
    /// Analyzed string
    Text,
    /// Point in time, RFC 3339 on the wire
    Date,
    /// Boolean
    Boolean,
    /// 64-bit integer
    Long,
    /// 64-bit float
    Double,
    /// Reference to other documents, stored as ids
    Join(JoinDef),
}

impl FieldKind {
    /// Type name used in the store mapping
    pub fn store_type(&self) -> &'static str {
        match self {
            FieldKind::Keyword | FieldKind::Join(_) => "keyword",
            FieldKind::Text => "text",
            FieldKind::Date => "date",
            FieldKind::Boolean => "boolean",
            FieldKind::Long => "long",
            FieldKind::Double => "double",
        }
    }
}

/// One entry of a schema's field table
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    name: String,
    kind: FieldKind,
    default: Option<Value>,
}

impl FieldDef {
    /// Create a field of the given kind
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        FieldDef {
            name: name.into(),
            kind,
            default: None,
        }
    }

    /// Exact-match string field
    pub fn keyword(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Keyword)
    }

    /// Analyzed string field
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    /// Date field
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Date)
    }

    /// Boolean field
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    /// Integer field
    pub fn long(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Long)
    }

    /// Float field
    pub fn double(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Double)
    }

    /// Join holding at most one id of `target`
    pub fn single_join(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Join(JoinDef {
                target: target.into(),
                cardinality: Cardinality::Single,
                back_reference: None,
            }),
        )
    }

    /// Join holding a list of ids of `target`
    pub fn multi_join(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Join(JoinDef {
                target: target.into(),
                cardinality: Cardinality::Multi,
                back_reference: None,
            }),
        )
    }

    /// Set the value used when a document does not carry this field
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Name the join field on the target that points back at this document.
    /// Has no effect on non-join fields.
    pub fn with_back_reference(mut self, field: impl Into<String>) -> Self {
        if let FieldKind::Join(join) = &mut self.kind {
            join.back_reference = Some(field.into());
        }
        self
    }

    /// Declared name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage type
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Join definition, if this is a join field
    pub fn join(&self) -> Option<&JoinDef> {
        match &self.kind {
            FieldKind::Join(join) => Some(join),
            _ => None,
        }
    }

    /// Name of the key holding this field in a stored body
    pub fn stored_name(&self) -> String {
        match self.kind {
            FieldKind::Join(_) => format!("{}_id", self.name),
            _ => self.name.clone(),
        }
    }

    /// Value of this field when nothing has been assigned
    pub fn default_value(&self) -> Value {
        if let Some(default) = &self.default {
            return default.clone();
        }
        match &self.kind {
            FieldKind::Join(JoinDef {
                cardinality: Cardinality::Multi,
                ..
            }) => Value::Array(Vec::new()),
            _ => Value::Null,
        }
    }

    /// Validate and normalize a value assigned by a caller
    pub fn coerce(&self, value: Value) -> VersoResult<Value> {
        if value.is_null() {
            return Ok(self.default_value_or_null());
        }
        let coerced = match (&self.kind, value) {
            (FieldKind::Keyword | FieldKind::Text, Value::String(s)) => Value::String(s),
            (FieldKind::Date, Value::Timestamp(ts)) => Value::Timestamp(ts),
            (FieldKind::Date, Value::String(s)) => Value::Timestamp(self.parse_date(&s, false)?),
            (FieldKind::Boolean, Value::Bool(b)) => Value::Bool(b),
            (FieldKind::Long, Value::Int(i)) => Value::Int(i),
            (FieldKind::Double, Value::Float(f)) => Value::Float(f),
            (FieldKind::Double, Value::Int(i)) => Value::Float(i as f64),
            (FieldKind::Join(join), value) => self.coerce_join(join, value)?,
            (kind, value) => {
                return Err(VersoError::invalid_input(format!(
                    "field '{}' of type {} cannot hold a {} value",
                    self.name,
                    kind.store_type(),
                    value.type_name()
                )))
            }
        };
        Ok(coerced)
    }

    fn default_value_or_null(&self) -> Value {
        // Clearing a multi join leaves an empty list, never null
        match &self.kind {
            FieldKind::Join(JoinDef {
                cardinality: Cardinality::Multi,
                ..
            }) => Value::Array(Vec::new()),
            _ => Value::Null,
        }
    }

    fn coerce_join(&self, join: &JoinDef, value: Value) -> VersoResult<Value> {
        match (join.cardinality, value) {
            (Cardinality::Single, Value::String(id)) => Ok(Value::String(id)),
            (Cardinality::Multi, Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(id) => Ok(Value::String(id)),
                    other => Err(VersoError::invalid_input(format!(
                        "join '{}' expects ids, got {}",
                        self.name,
                        other.type_name()
                    ))),
                })
                .collect::<VersoResult<Vec<_>>>()
                .map(Value::Array),
            (Cardinality::Multi, Value::String(id)) => Ok(Value::Array(vec![Value::String(id)])),
            (_, other) => Err(VersoError::invalid_input(format!(
                "join '{}' expects ids, got {}",
                self.name,
                other.type_name()
            ))),
        }
    }

    fn parse_date(&self, s: &str, stored: bool) -> VersoResult<Timestamp> {
        Timestamp::parse_rfc3339(s).ok_or_else(|| {
            let msg = format!("field '{}' holds an unparseable date '{}'", self.name, s);
            if stored {
                VersoError::serialization(msg)
            } else {
                VersoError::invalid_input(msg)
            }
        })
    }

    /// In-memory value to stored value
    pub fn serialize(&self, value: &Value) -> Value {
        match value {
            Value::Timestamp(ts) => Value::String(ts.to_rfc3339()),
            other => other.clone(),
        }
    }

    /// Stored value to in-memory value
    pub fn deserialize(&self, stored: Value) -> VersoResult<Value> {
        match (&self.kind, stored) {
            (_, Value::Null) => Ok(self.default_value()),
            (FieldKind::Date, Value::String(s)) => Ok(Value::Timestamp(self.parse_date(&s, true)?)),
            (FieldKind::Double, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (
                FieldKind::Join(JoinDef {
                    cardinality: Cardinality::Multi,
                    ..
                }),
                Value::String(id),
            ) => Ok(Value::Array(vec![Value::String(id)])),
            (_, value) => Ok(value),
        }
    }
}

/// Field table of one collection
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    doc_type: String,
    fields: BTreeMap<String, FieldDef>,
}

impl Schema {
    /// Empty schema for `doc_type`
    pub fn new(doc_type: impl Into<String>) -> Self {
        Schema {
            doc_type: doc_type.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a caller-declared field.
    ///
    /// Rejects `id`, `_version`, names starting with `_`, duplicates, and
    /// fields whose stored name collides with another field.
    pub fn add_field(&mut self, field: FieldDef) -> VersoResult<()> {
        let name = field.name();
        if name.is_empty() || name == ID_FIELD || name.starts_with('_') {
            return Err(VersoError::invalid_input(format!(
                "'{}' is reserved and cannot be declared on {}",
                name, self.doc_type
            )));
        }
        self.insert_checked(field)
    }

    fn insert_checked(&mut self, field: FieldDef) -> VersoResult<()> {
        let stored = field.stored_name();
        let clash = self
            .fields
            .values()
            .any(|f| f.name() == field.name() || f.stored_name() == stored || f.name() == stored);
        if clash {
            return Err(VersoError::invalid_input(format!(
                "field '{}' is declared twice on {}",
                field.name(),
                self.doc_type
            )));
        }
        self.fields.insert(field.name().to_string(), field);
        Ok(())
    }

    /// Collection doc type
    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    /// Look up a field by declared name
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    /// Look up a field, failing with `InvalidInput` if it is not declared
    pub fn require_field(&self, name: &str) -> VersoResult<&FieldDef> {
        self.field(name).ok_or_else(|| {
            VersoError::invalid_input(format!("{} has no field '{}'", self.doc_type, name))
        })
    }

    /// Check if a field is declared
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// All fields, by declared name
    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.values()
    }

    /// Join fields only
    pub fn joins(&self) -> impl Iterator<Item = (&FieldDef, &JoinDef)> {
        self.fields.values().filter_map(|f| f.join().map(|j| (f, j)))
    }

    /// Store mapping: stored field name to `{"type": ...}`. `id` is never mapped.
    pub fn mapping(&self) -> Value {
        let properties = self
            .fields
            .values()
            .map(|f| {
                let mut props = BTreeMap::new();
                props.insert("type".to_string(), Value::from(f.kind().store_type()));
                (f.stored_name(), Value::Object(props))
            })
            .collect();
        Value::Object(properties)
    }

    /// Default values of every field, keyed by declared name
    pub fn defaults(&self) -> BTreeMap<String, Value> {
        self.fields
            .values()
            .map(|f| (f.name().to_string(), f.default_value()))
            .collect()
    }

    /// In-memory field values to a stored body
    pub fn serialize_document(&self, values: &BTreeMap<String, Value>) -> Document {
        self.fields
            .values()
            .map(|f| {
                let value = values
                    .get(f.name())
                    .map(|v| f.serialize(v))
                    .unwrap_or_else(|| f.serialize(&f.default_value()));
                (f.stored_name(), value)
            })
            .collect()
    }

    /// Stored body to in-memory field values. Missing fields take their
    /// default, undeclared keys are ignored.
    pub fn deserialize_document(&self, body: &Document) -> VersoResult<BTreeMap<String, Value>> {
        self.fields
            .values()
            .map(|f| {
                let value = match body.get(&f.stored_name()) {
                    Some(stored) => f.deserialize(stored.clone())?,
                    None => f.default_value(),
                };
                Ok((f.name().to_string(), value))
            })
            .collect()
    }
}

/// Schema of the history collection of `live`.
///
/// Mirrors every live field (joins keep their flattened `<name>_id` ids but
/// lose back-references, snapshots never cascade) and adds `_document_id`,
/// `_document_version` and `_status`. The doc type is `<live>_version`.
pub fn derive_snapshot_schema(live: &Schema) -> Schema {
    let mut fields: BTreeMap<String, FieldDef> = live
        .fields
        .values()
        .map(|f| {
            let mut f = f.clone();
            if let FieldKind::Join(join) = &mut f.kind {
                join.back_reference = None;
            }
            (f.name.clone(), f)
        })
        .collect();

    for f in [
        FieldDef::keyword(DOCUMENT_ID_FIELD),
        FieldDef::long(DOCUMENT_VERSION_FIELD),
        FieldDef::keyword(STATUS_FIELD),
    ] {
        fields.insert(f.name.clone(), f);
    }

    Schema {
        doc_type: format!("{}{}", live.doc_type, HISTORY_SUFFIX),
        fields,
    }
}
