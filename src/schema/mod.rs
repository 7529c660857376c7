//! Declarative field/schema framework
//!
//! Raw values are validated and coerced by [`Field`]s; fields are composed
//! into entity types by a [`SchemaBuilder`]; the resolved [`Schema`]
//! constructs [`Entity`] instances from raw mappings.

mod encoded;
mod field;
mod model;
mod value;

pub use encoded::{parse_json_document, parse_xml, XmlElement};
pub use field::{EntityRef, Field, FieldError, FieldKind, FieldResult};
pub use model::{
    Constructed, Entity, EntityDef, EntityType, EntityTypeId, Schema, SchemaBuilder,
    ValidationReport, NOT_NULL_FIELD,
};
pub use value::{mapping, Key, Mapping, Value};
