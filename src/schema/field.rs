//! Field Type System
//!
//! A [`Field`] is one validation/coercion rule. Scalars check shape and
//! bounds; `List`, `Map` and `Or` compose other fields; `Reference` builds a
//! nested [`Entity`](super::Entity) through the owning [`Schema`]; `Json` and
//! `Xml` parse embedded documents out of strings.
//!
//! Two properties hold for every kind:
//! - `convert` substitutes the configured default for an absent value, then
//!   validates.
//! - `convert` is idempotent: feeding it its own output returns that output
//!   unchanged.

use std::fmt;

use super::encoded::{parse_json_document, parse_xml};
use super::model::{EntityTypeId, Schema};
use super::value::{Mapping, Value};

// =============================================================================
// Errors
// =============================================================================

/// Why a single field rejected its value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldError {
    MissingRequired,
    Invalid(String),
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::MissingRequired => write!(f, "missed value for required field"),
            FieldError::Invalid(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for FieldError {}

pub type FieldResult<T> = std::result::Result<T, FieldError>;

// =============================================================================
// Field kinds
// =============================================================================

/// Target of a reference field. Declared by name, resolved to an id when the
/// schema is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Named(String),
    Resolved(EntityTypeId),
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    String {
        max_len: Option<usize>,
    },
    Bool,
    Int {
        min: Option<i64>,
        max: Option<i64>,
    },
    Float {
        min: Option<f64>,
        max: Option<f64>,
    },
    /// String restricted to an enumerated set
    Choice {
        choices: Vec<String>,
    },
    Null,
    List {
        element: Box<Field>,
        min_len: Option<usize>,
        max_len: Option<usize>,
    },
    Map {
        key: Box<Field>,
        value: Box<Field>,
    },
    Or(Vec<Field>),
    Reference(EntityRef),
    Json,
    Xml,
}

/// A typed validation/coercion rule
#[derive(Debug, Clone)]
pub struct Field {
    kind: FieldKind,
    required: bool,
    default: Option<Value>,
    field_name: Option<String>,
}

impl Field {
    fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            default: None,
            field_name: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldKind::String { max_len: None })
    }

    pub fn bounded_string(max_len: usize) -> Self {
        Self::new(FieldKind::String {
            max_len: Some(max_len),
        })
    }

    pub fn bool() -> Self {
        Self::new(FieldKind::Bool)
    }

    pub fn int() -> Self {
        Self::new(FieldKind::Int { min: None, max: None })
    }

    pub fn int_range(min: Option<i64>, max: Option<i64>) -> Self {
        Self::new(FieldKind::Int { min, max })
    }

    pub fn float() -> Self {
        Self::new(FieldKind::Float { min: None, max: None })
    }

    pub fn float_range(min: Option<f64>, max: Option<f64>) -> Self {
        Self::new(FieldKind::Float { min, max })
    }

    pub fn choice<I, S>(choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(FieldKind::Choice {
            choices: choices.into_iter().map(Into::into).collect(),
        })
    }

    pub fn null() -> Self {
        Self::new(FieldKind::Null)
    }

    pub fn list(element: Field) -> Self {
        Self::bounded_list(element, None, None)
    }

    pub fn bounded_list(element: Field, min_len: Option<usize>, max_len: Option<usize>) -> Self {
        Self::new(FieldKind::List {
            element: Box::new(element),
            min_len,
            max_len,
        })
    }

    pub fn map(key: Field, value: Field) -> Self {
        Self::new(FieldKind::Map {
            key: Box::new(key),
            value: Box::new(value),
        })
    }

    /// Union tried in declaration order. Needs at least two variants, which
    /// is checked when the owning schema is built.
    pub fn or(variants: Vec<Field>) -> Self {
        Self::new(FieldKind::Or(variants))
    }

    /// Reference to an entity type, by name. Names may refer to entities
    /// defined later (or to the entity being defined).
    pub fn reference(entity: impl Into<String>) -> Self {
        Self::new(FieldKind::Reference(EntityRef::Named(entity.into())))
    }

    pub fn json() -> Self {
        Self::new(FieldKind::Json)
    }

    pub fn xml() -> Self {
        Self::new(FieldKind::Xml)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// External key this field is read from when it differs from its name
    pub fn aliased(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Effective external name; set for every field attached to an entity
    pub fn field_name(&self) -> Option<&str> {
        self.field_name.as_deref()
    }

    pub(crate) fn set_field_name_if_absent(&mut self, name: &str) {
        if self.field_name.is_none() {
            self.field_name = Some(name.to_string());
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            FieldKind::String { .. } => "String",
            FieldKind::Bool => "Bool",
            FieldKind::Int { .. } => "Int",
            FieldKind::Float { .. } => "Float",
            FieldKind::Choice { .. } => "Choice",
            FieldKind::Null => "Null",
            FieldKind::List { .. } => "List",
            FieldKind::Map { .. } => "Map",
            FieldKind::Or(_) => "Or",
            FieldKind::Reference(_) => "Reference",
            FieldKind::Json => "JSONData",
            FieldKind::Xml => "XMLData",
        }
    }

    // =========================================================================
    // Schema resolution
    // =========================================================================

    /// Resolve named references and check `Or` arity, recursively
    pub(crate) fn resolve(
        &mut self,
        lookup: &dyn Fn(&str) -> Option<EntityTypeId>,
    ) -> Result<(), ResolveError> {
        match &mut self.kind {
            FieldKind::List { element, .. } => element.resolve(lookup),
            FieldKind::Map { key, value } => {
                key.resolve(lookup)?;
                value.resolve(lookup)
            }
            FieldKind::Or(variants) => {
                if variants.len() < 2 {
                    return Err(ResolveError::TooFewVariants(variants.len()));
                }
                variants.iter_mut().try_for_each(|v| v.resolve(lookup))
            }
            FieldKind::Reference(target) => {
                if let EntityRef::Named(name) = target {
                    let id = lookup(name).ok_or_else(|| ResolveError::Unknown(name.clone()))?;
                    *target = EntityRef::Resolved(id);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn target(&self, target: &EntityRef) -> FieldResult<EntityTypeId> {
        match target {
            EntityRef::Resolved(id) => Ok(*id),
            EntityRef::Named(name) => Err(FieldError::Invalid(format!(
                "reference to `{}` was never resolved",
                name
            ))),
        }
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check that `value` already has this field's shape
    pub fn validate(&self, value: &Value, schema: &Schema) -> FieldResult<()> {
        if value.is_null() {
            return if self.required {
                Err(FieldError::MissingRequired)
            } else {
                Ok(())
            };
        }

        match &self.kind {
            FieldKind::String { max_len } => {
                let s = match value {
                    Value::Str(s) => s,
                    Value::IncludedJson { content, .. } => content,
                    other => return Err(self.unexpected(other, "string")),
                };
                if let Some(max) = max_len {
                    let len = s.chars().count();
                    if len > *max {
                        return Err(FieldError::Invalid(format!(
                            "length of field exceeds maximum allowed: {} but expect no more than {}",
                            len, max
                        )));
                    }
                }
                Ok(())
            }
            FieldKind::Bool => match value {
                Value::Bool(_) => Ok(()),
                other => Err(self.unexpected(other, "bool")),
            },
            FieldKind::Int { min, max } => match value {
                Value::Int(i) => check_range(*i, *min, *max),
                other => Err(self.unexpected(other, "integer")),
            },
            FieldKind::Float { min, max } => match value {
                Value::Float(f) => check_range(*f, *min, *max),
                other => Err(self.unexpected(other, "float")),
            },
            FieldKind::Choice { choices } => match value {
                Value::Str(s) if choices.iter().any(|c| c == s) => Ok(()),
                Value::Str(s) => Err(FieldError::Invalid(format!(
                    "Got an unexpected value in the field `{}`: {}. Value should be one of: {}",
                    self.field_name().unwrap_or("value"),
                    s,
                    choices.join(", ")
                ))),
                other => Err(self.unexpected(other, "string")),
            },
            FieldKind::Null => Err(self.unexpected(value, "null")),
            FieldKind::List {
                min_len, max_len, ..
            } => {
                let items = match value {
                    Value::List(items) => items,
                    other => return Err(self.unexpected(other, "list")),
                };
                if let Some(max) = max_len {
                    if items.len() > *max {
                        return Err(FieldError::Invalid(format!(
                            "length of field exceeds maximum allowed: {} but expect no more than {}",
                            items.len(),
                            max
                        )));
                    }
                }
                if let Some(min) = min_len {
                    if items.len() < *min {
                        return Err(FieldError::Invalid(format!(
                            "length of field is less than minimum allowed: {} but expect no less than {}",
                            items.len(),
                            min
                        )));
                    }
                }
                Ok(())
            }
            FieldKind::Map { key, value: val } => match value {
                Value::Map(map) => validate_entries(map, key, val, schema),
                Value::List(items) => items.iter().try_for_each(|item| match item {
                    Value::Map(map) => validate_entries(map, key, val, schema),
                    _ => Err(self.unexpected(value, "mapping or list of mappings")),
                }),
                other => Err(self.unexpected(other, "mapping")),
            },
            FieldKind::Or(variants) => {
                if variants.iter().any(|v| v.validate(value, schema).is_ok()) {
                    Ok(())
                } else {
                    Err(self.no_variant_matched(value, variants))
                }
            }
            FieldKind::Reference(target) => {
                let id = self.target(target)?;
                match value {
                    Value::Entity(entity) if entity.type_id() == id => Ok(()),
                    Value::Map(_) => Ok(()),
                    other => Err(self.unexpected(other, schema.entity_type(id).name())),
                }
            }
            FieldKind::Json => match value {
                Value::Json(_) => Ok(()),
                Value::Str(s) | Value::IncludedJson { content: s, .. } => {
                    match parse_json_document(s) {
                        Some(_) => Ok(()),
                        None => Err(self.unexpected(value, "JSON document")),
                    }
                }
                other => Err(self.unexpected(other, "JSON document")),
            },
            FieldKind::Xml => match value {
                Value::Xml(_) => Ok(()),
                Value::Str(s) => parse_xml(s).map(|_| ()).map_err(FieldError::Invalid),
                other => Err(self.unexpected(other, "XML document")),
            },
        }
    }

    // =========================================================================
    // Conversion
    // =========================================================================

    /// Coerce a raw value into this field's typed value, then validate it
    pub fn convert(&self, raw: &Value, schema: &Schema) -> FieldResult<Value> {
        let raw = match (&self.default, raw) {
            (Some(default), Value::Null) => default,
            _ => raw,
        };

        let converted = match &self.kind {
            FieldKind::String { .. } => match raw {
                Value::IncludedJson { content, .. } => Value::Str(content.clone()),
                other => other.clone(),
            },
            FieldKind::List { element, .. } => match raw {
                Value::List(items) => Value::List(
                    items
                        .iter()
                        .map(|item| element.convert(item, schema))
                        .collect::<FieldResult<Vec<_>>>()?,
                ),
                other => other.clone(),
            },
            FieldKind::Map { key, value } => match raw {
                Value::Map(map) => {
                    let mut converted = Mapping::with_capacity(map.len());
                    merge_entries(&mut converted, map, key, value, schema)?;
                    Value::Map(converted)
                }
                // Sequence of single-key mappings: merged in order, so a later
                // entry overwrites an earlier key but keeps its first position.
                Value::List(items) => {
                    let mut merged = Mapping::new();
                    for item in items {
                        match item {
                            Value::Map(map) => merge_entries(&mut merged, map, key, value, schema)?,
                            _ => return Err(self.unexpected(raw, "mapping or list of mappings")),
                        }
                    }
                    Value::Map(merged)
                }
                other => other.clone(),
            },
            FieldKind::Or(variants) => return self.convert_or(raw, variants, schema),
            FieldKind::Reference(target) => return self.convert_reference(raw, target, schema),
            FieldKind::Json => match raw {
                Value::Str(s) | Value::IncludedJson { content: s, .. } => {
                    // Unparseable text stays a plain string
                    return Ok(parse_json_document(s)
                        .map(Value::Json)
                        .unwrap_or_else(|| Value::Str(s.clone())));
                }
                other => other.clone(),
            },
            FieldKind::Xml => match raw {
                Value::Str(s) => {
                    return Ok(parse_xml(s)
                        .map(Value::Xml)
                        .unwrap_or_else(|_| Value::Str(s.clone())));
                }
                other => other.clone(),
            },
            _ => raw.clone(),
        };

        self.validate(&converted, schema)?;
        Ok(converted)
    }

    fn convert_or(&self, raw: &Value, variants: &[Field], schema: &Schema) -> FieldResult<Value> {
        if raw.is_null() {
            return if self.required {
                Err(FieldError::MissingRequired)
            } else {
                Ok(Value::Null)
            };
        }
        for variant in variants {
            if variant.validate(raw, schema).is_ok() {
                if let Ok(value) = variant.convert(raw, schema) {
                    return Ok(value);
                }
            }
        }
        Err(self.no_variant_matched(raw, variants))
    }

    fn convert_reference(
        &self,
        raw: &Value,
        target: &EntityRef,
        schema: &Schema,
    ) -> FieldResult<Value> {
        let id = self.target(target)?;
        let entity_type = schema.entity_type(id);
        match raw {
            Value::Entity(entity) if entity.type_id() == id => Ok(raw.clone()),
            Value::Map(map) => schema
                .construct(id, map)
                .into_result()
                .map(|entity| Value::Entity(Box::new(entity)))
                .map_err(|report| FieldError::Invalid(report.to_string())),
            Value::Null if entity_type.has_not_null_marker() => {
                Ok(Value::Entity(Box::new(schema.not_null_instance(id))))
            }
            Value::Null if self.required => Err(FieldError::MissingRequired),
            Value::Null => Ok(Value::Null),
            other => Err(self.unexpected(other, entity_type.name())),
        }
    }

    fn unexpected(&self, value: &Value, expected: &str) -> FieldError {
        FieldError::Invalid(format!(
            "{} expected to be {} but got {}",
            value,
            expected,
            value.kind_name()
        ))
    }

    fn no_variant_matched(&self, value: &Value, variants: &[Field]) -> FieldError {
        let kinds: Vec<&str> = variants.iter().map(Field::kind_name).collect();
        FieldError::Invalid(format!(
            "{} expected to be one of: {}",
            value,
            kinds.join(", ")
        ))
    }
}

/// Failure while resolving a field against a schema under construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ResolveError {
    Unknown(String),
    TooFewVariants(usize),
}

fn check_range<T: PartialOrd + fmt::Display>(
    value: T,
    min: Option<T>,
    max: Option<T>,
) -> FieldResult<()> {
    if let Some(min) = min {
        if value < min {
            return Err(FieldError::Invalid(format!(
                "{} is less than minimum allowed {}",
                value, min
            )));
        }
    }
    if let Some(max) = max {
        if value > max {
            return Err(FieldError::Invalid(format!(
                "{} is greater than maximum allowed {}",
                value, max
            )));
        }
    }
    Ok(())
}

fn validate_entries(map: &Mapping, key: &Field, value: &Field, schema: &Schema) -> FieldResult<()> {
    for (k, v) in map {
        key.validate(&k.to_value(), schema)?;
        value.validate(v, schema)?;
    }
    Ok(())
}

fn merge_entries(
    into: &mut Mapping,
    from: &Mapping,
    key: &Field,
    value: &Field,
    schema: &Schema,
) -> FieldResult<()> {
    for (k, v) in from {
        let k = key
            .convert(&k.to_value(), schema)?
            .into_key()
            .map_err(FieldError::Invalid)?;
        let v = value.convert(v, schema)?;
        into.insert(k, v);
    }
    Ok(())
}
