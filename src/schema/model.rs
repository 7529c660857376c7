//! Entity Schema Registry
//!
//! Entity types are declared as ordered lists of named fields and built in
//! two phases: every definition is registered first, then references and
//! parents are resolved against the complete set. The resulting [`Schema`]
//! is immutable and can be shared between parses.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::field::{Field, ResolveError};
use super::value::{Key, Mapping, Value};
use crate::error::SchemaError;

/// Marker field distinguishing an explicitly null declaration from an absent one
pub const NOT_NULL_FIELD: &str = "notNull";

/// Index of an entity type within its [`Schema`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityTypeId(usize);

// =============================================================================
// Definitions
// =============================================================================

/// Declaration of one entity type
#[derive(Debug, Clone)]
pub struct EntityDef {
    name: String,
    parents: Vec<String>,
    fields: Vec<(String, Field)>,
}

impl EntityDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Inherit the structure of another entity. Earlier parents win over
    /// later ones for fields both declare.
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.push((name.into(), field));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Collects entity definitions and resolves them into a [`Schema`]
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    defs: Vec<EntityDef>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(mut self, def: EntityDef) -> Self {
        self.defs.push(def);
        self
    }

    pub fn build(self) -> Result<Schema, SchemaError> {
        // Phase 1: register names
        let mut by_name: HashMap<String, EntityTypeId> = HashMap::new();
        for (index, def) in self.defs.iter().enumerate() {
            if by_name
                .insert(def.name.clone(), EntityTypeId(index))
                .is_some()
            {
                return Err(SchemaError::DuplicateEntity(def.name.clone()));
            }
        }

        // Phase 2: resolve parents and field references
        let lookup = |name: &str| by_name.get(name).copied();
        let mut parents: Vec<Vec<usize>> = Vec::with_capacity(self.defs.len());
        let mut defs = self.defs;
        for def in &mut defs {
            let mut resolved = Vec::with_capacity(def.parents.len());
            for parent in &def.parents {
                let id = lookup(parent).ok_or_else(|| SchemaError::UnknownParent {
                    entity: def.name.clone(),
                    parent: parent.clone(),
                })?;
                resolved.push(id.0);
            }
            parents.push(resolved);

            for (field_name, field) in &mut def.fields {
                field.set_field_name_if_absent(field_name);
                field.resolve(&lookup).map_err(|err| match err {
                    ResolveError::Unknown(target) => SchemaError::UnknownReference {
                        entity: def.name.clone(),
                        target,
                    },
                    ResolveError::TooFewVariants(count) => SchemaError::TooFewVariants {
                        entity: def.name.clone(),
                        field: field_name.clone(),
                        count,
                    },
                })?;
            }
        }

        // Phase 3: merge structures along the inheritance graph
        let own: Vec<Vec<(String, Arc<Field>)>> = defs
            .iter()
            .map(|def| {
                def.fields
                    .iter()
                    .map(|(name, field)| (name.clone(), Arc::new(field.clone())))
                    .collect()
            })
            .collect();

        let mut structures: Vec<Option<Structure>> = vec![None; defs.len()];
        let mut visiting = vec![false; defs.len()];
        for index in 0..defs.len() {
            merge_structure(index, &defs, &parents, &own, &mut structures, &mut visiting)?;
        }

        let types = defs
            .iter()
            .zip(structures)
            .enumerate()
            .map(|(index, (def, structure))| {
                let structure = structure.unwrap_or_default();
                Arc::new(EntityType {
                    id: EntityTypeId(index),
                    name: Arc::from(def.name.as_str()),
                    not_null: structure.contains_key(NOT_NULL_FIELD),
                    structure,
                })
            })
            .collect();

        Ok(Schema { types, by_name })
    }
}

type Structure = IndexMap<String, Arc<Field>>;

fn merge_structure(
    index: usize,
    defs: &[EntityDef],
    parents: &[Vec<usize>],
    own: &[Vec<(String, Arc<Field>)>],
    structures: &mut Vec<Option<Structure>>,
    visiting: &mut Vec<bool>,
) -> Result<(), SchemaError> {
    if structures[index].is_some() {
        return Ok(());
    }
    if visiting[index] {
        return Err(SchemaError::InheritanceCycle(defs[index].name.clone()));
    }
    visiting[index] = true;

    let mut structure: Structure = own[index].iter().cloned().collect();
    for &parent in &parents[index] {
        merge_structure(parent, defs, parents, own, structures, visiting)?;
        if let Some(inherited) = &structures[parent] {
            for (name, field) in inherited {
                // Shared with the parent, not copied
                structure
                    .entry(name.clone())
                    .or_insert_with(|| Arc::clone(field));
            }
        }
    }

    visiting[index] = false;
    structures[index] = Some(structure);
    Ok(())
}

// =============================================================================
// Resolved schema
// =============================================================================

/// A resolved entity type: its name and merged structure
#[derive(Debug)]
pub struct EntityType {
    id: EntityTypeId,
    name: Arc<str>,
    structure: Structure,
    not_null: bool,
}

impl EntityType {
    pub fn id(&self) -> EntityTypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in structure order: own fields first, then inherited ones
    pub fn structure(&self) -> &IndexMap<String, Arc<Field>> {
        &self.structure
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.structure.get(name).map(Arc::as_ref)
    }

    pub fn has_not_null_marker(&self) -> bool {
        self.not_null
    }
}

/// Immutable set of entity types
#[derive(Debug)]
pub struct Schema {
    types: Vec<Arc<EntityType>>,
    by_name: HashMap<String, EntityTypeId>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn id_of(&self, name: &str) -> Option<EntityTypeId> {
        self.by_name.get(name).copied()
    }

    pub fn entity_type(&self, id: EntityTypeId) -> &EntityType {
        &self.types[id.0]
    }

    pub fn entity_type_named(&self, name: &str) -> Option<&EntityType> {
        self.id_of(name).map(|id| self.entity_type(id))
    }

    /// Instance with every field unset
    pub fn empty(&self, id: EntityTypeId) -> Entity {
        let entity_type = &self.types[id.0];
        Entity {
            values: entity_type
                .structure
                .keys()
                .map(|name| (name.clone(), Value::Null))
                .collect(),
            entity_type: Arc::clone(entity_type),
        }
    }

    /// Instance standing in for an explicitly null declaration
    pub fn not_null_instance(&self, id: EntityTypeId) -> Entity {
        let mut entity = self.empty(id);
        if entity.values.contains_key(NOT_NULL_FIELD) {
            entity
                .values
                .insert(NOT_NULL_FIELD.to_string(), Value::Bool(true));
        }
        entity
    }

    /// Build an instance field by field. Every field is attempted; failures
    /// leave the field unset and are collected in the report.
    pub fn construct(&self, id: EntityTypeId, raw: &Mapping) -> Constructed {
        let entity_type = &self.types[id.0];
        let mut values = IndexMap::with_capacity(entity_type.structure.len());
        let mut report = ValidationReport::new(entity_type.name());

        for (name, field) in &entity_type.structure {
            let alias = field.field_name().unwrap_or(name.as_str());
            let raw_value = raw
                .get(&Key::Str(name.clone()))
                .or_else(|| {
                    if alias != name.as_str() {
                        raw.get(&Key::Str(alias.to_string()))
                    } else {
                        None
                    }
                })
                .unwrap_or(&Value::Null);

            match field.convert(raw_value, self) {
                Ok(value) => {
                    tracing::trace!(entity = %entity_type.name, field = %name, "converted field");
                    values.insert(name.clone(), value);
                }
                Err(err) => {
                    report.push(alias, err.to_string());
                    values.insert(name.clone(), Value::Null);
                }
            }
        }

        Constructed {
            entity: Entity {
                entity_type: Arc::clone(entity_type),
                values,
            },
            report,
        }
    }
}

// =============================================================================
// Instances
// =============================================================================

/// A schema-typed record
#[derive(Debug, Clone)]
pub struct Entity {
    entity_type: Arc<EntityType>,
    values: IndexMap<String, Value>,
}

static NULL: Value = Value::Null;

impl Entity {
    pub fn type_id(&self) -> EntityTypeId {
        self.entity_type.id
    }

    pub fn type_name(&self) -> &str {
        &self.entity_type.name
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Value of a field by internal name; unknown names read as null
    pub fn get(&self, name: &str) -> &Value {
        self.values.get(name).unwrap_or(&NULL)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).as_str()
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).as_int()
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).as_bool()
    }

    pub fn list(&self, name: &str) -> Option<&[Value]> {
        self.get(name).as_list()
    }

    pub fn map(&self, name: &str) -> Option<&Mapping> {
        self.get(name).as_map()
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.get(name).as_entity()
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_not_null(&self) -> bool {
        self.bool(NOT_NULL_FIELD) == Some(true)
    }

    /// Set fields rendered under their external names
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for (name, value) in &self.values {
            if value.is_null() {
                continue;
            }
            let key = self
                .entity_type
                .field(name)
                .and_then(Field::field_name)
                .unwrap_or(name.as_str());
            object.insert(key.to_string(), value.to_json());
        }
        serde_json::Value::Object(object)
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.entity_type.id == other.entity_type.id && self.values == other.values
    }
}

/// Result of constructing an entity: the instance is always complete, the
/// report lists every field that failed.
#[derive(Debug, Clone)]
pub struct Constructed {
    pub entity: Entity,
    pub report: ValidationReport,
}

impl Constructed {
    pub fn into_result(self) -> Result<Entity, ValidationReport> {
        if self.report.is_empty() {
            Ok(self.entity)
        } else {
            Err(self.report)
        }
    }
}

/// Aggregated field failures for one entity
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    entity: String,
    errors: IndexMap<String, String>,
}

impl ValidationReport {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            errors: IndexMap::new(),
        }
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.insert(field.into(), message.into());
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.errors.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: ", self.entity)?;
        for (i, (field, message)) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", field, message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::value::mapping;

    fn thing_schema() -> Schema {
        Schema::builder()
            .define(
                EntityDef::new("Base")
                    .field("name", Field::string().with_default("unnamed"))
                    .field("kind", Field::string())
                    .field("count", Field::int()),
            )
            .define(
                EntityDef::new("Thing")
                    .extends("Base")
                    .field("kind", Field::choice(["a", "b"]))
                    .field("type_", Field::string().aliased("type"))
                    .field("child", Field::reference("Thing")),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_structure_merges_parent_fields() {
        let schema = thing_schema();
        let thing = schema.entity_type_named("Thing").unwrap();
        let names: Vec<&str> = thing.structure().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["kind", "type_", "child", "name", "count"]);
        assert_eq!(thing.field("kind").unwrap().kind_name(), "Choice");
        assert_eq!(thing.field("type_").unwrap().field_name(), Some("type"));
        assert_eq!(thing.field("count").unwrap().field_name(), Some("count"));
    }

    #[test]
    fn test_inherited_fields_are_shared() {
        let schema = thing_schema();
        let base = schema.entity_type_named("Base").unwrap();
        let thing = schema.entity_type_named("Thing").unwrap();
        assert!(Arc::ptr_eq(
            &base.structure()["count"],
            &thing.structure()["count"]
        ));
    }

    #[test]
    fn test_construct_from_empty_mapping_uses_defaults() {
        let schema = thing_schema();
        let id = schema.id_of("Thing").unwrap();
        let entity = schema.construct(id, &Mapping::new()).into_result().unwrap();
        assert_eq!(entity.str("name"), Some("unnamed"));
        assert_eq!(entity.get("kind"), &Value::Null);
        assert_eq!(entity.get("no_such_field"), &Value::Null);
    }

    #[test]
    fn test_construct_is_deterministic() {
        let schema = thing_schema();
        let id = schema.id_of("Thing").unwrap();
        let raw = mapping([
            ("kind", Value::from("a")),
            ("type", Value::from("x")),
            ("child", mapping([("count", 2i64)])),
        ]);
        let raw = raw.as_map().unwrap();
        let first = schema.construct(id, raw).into_result().unwrap();
        let second = schema.construct(id, raw).into_result().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.str("type_"), Some("x"));
        assert_eq!(first.entity("child").unwrap().int("count"), Some(2));
    }

    #[test]
    fn test_construct_aggregates_all_failures() {
        let schema = thing_schema();
        let id = schema.id_of("Thing").unwrap();
        let raw = mapping([
            ("kind", Value::from("z")),
            ("count", Value::from("many")),
            ("name", Value::from("ok")),
        ]);
        let constructed = schema.construct(id, raw.as_map().unwrap());
        assert_eq!(constructed.report.len(), 2);
        assert!(constructed.report.get("kind").is_some());
        assert!(constructed.report.get("count").is_some());
        // the rest of the entity is still built
        assert_eq!(constructed.entity.str("name"), Some("ok"));
        assert_eq!(constructed.entity.get("count"), &Value::Null);
    }

    #[test]
    fn test_internal_name_wins_over_alias() {
        let schema = thing_schema();
        let id = schema.id_of("Thing").unwrap();
        let raw = mapping([("type", "by-alias"), ("type_", "by-name")]);
        let entity = schema.construct(id, raw.as_map().unwrap()).entity;
        assert_eq!(entity.str("type_"), Some("by-name"));
    }

    #[test]
    fn test_duplicate_entity_rejected() {
        let err = Schema::builder()
            .define(EntityDef::new("A"))
            .define(EntityDef::new("A"))
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateEntity("A".to_string()));
    }

    #[test]
    fn test_unknown_reference_rejected() {
        let err = Schema::builder()
            .define(EntityDef::new("A").field("b", Field::reference("B")))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownReference { .. }));
    }

    #[test]
    fn test_single_variant_or_rejected() {
        let err = Schema::builder()
            .define(EntityDef::new("A").field("x", Field::or(vec![Field::string()])))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::TooFewVariants {
                entity: "A".to_string(),
                field: "x".to_string(),
                count: 1
            }
        );
    }

    #[test]
    fn test_inheritance_cycle_rejected() {
        let err = Schema::builder()
            .define(EntityDef::new("A").extends("B"))
            .define(EntityDef::new("B").extends("A"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InheritanceCycle(_)));
    }

    #[test]
    fn test_report_display() {
        let mut report = ValidationReport::new("RamlRoot");
        report.push("title", "missed value for required field");
        assert_eq!(
            report.to_string(),
            "invalid RamlRoot: title: missed value for required field"
        );
    }

    #[test]
    fn test_to_json_uses_external_names() {
        let schema = thing_schema();
        let id = schema.id_of("Thing").unwrap();
        let raw = mapping([("type", "x")]);
        let entity = schema.construct(id, raw.as_map().unwrap()).entity;
        assert_eq!(
            entity.to_json(),
            serde_json::json!({"type": "x", "name": "unnamed"})
        );
    }
}
