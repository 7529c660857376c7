//! Schema Framework Tests
//!
//! Exercises the field/entity framework through its public API, independent
//! of RAML.

use raml_parser::schema::{mapping, EntityDef, Field, Schema, Value};
use raml_parser::SchemaError;

fn pet_schema() -> Schema {
    Schema::builder()
        .define(
            EntityDef::new("Named")
                .field("name", Field::string().required())
                .field("tags", Field::list(Field::string())),
        )
        .define(
            EntityDef::new("Pet")
                .extends("Named")
                .field("weight", Field::or(vec![Field::string(), Field::float()]))
                .field("kind_", Field::choice(["cat", "dog"]).aliased("kind"))
                .field("owner", Field::reference("Owner"))
                .field("toys", Field::map(Field::string(), Field::int())),
        )
        .define(
            EntityDef::new("Owner")
                .field("notNull", Field::bool())
                .field("pets", Field::list(Field::reference("Pet"))),
        )
        .build()
        .unwrap()
}

#[test]
fn test_or_order_is_a_contract() {
    let schema = pet_schema();
    let id = schema.id_of("Pet").unwrap();
    let raw = mapping([("name", Value::from("Tom")), ("weight", Value::from("3.0"))]);
    let pet = schema.construct(id, raw.as_map().unwrap()).into_result().unwrap();
    assert_eq!(pet.get("weight"), &Value::from("3.0"));

    let raw = mapping([("name", Value::from("Tom")), ("weight", Value::Float(3.0))]);
    let pet = schema.construct(id, raw.as_map().unwrap()).into_result().unwrap();
    assert_eq!(pet.get("weight"), &Value::Float(3.0));
}

#[test]
fn test_map_from_sequence_merges_in_first_insertion_order() {
    let schema = pet_schema();
    let id = schema.id_of("Pet").unwrap();
    let raw = mapping([
        ("name", Value::from("Rex")),
        (
            "toys",
            Value::List(vec![
                mapping([("a", 1i64)]),
                mapping([("b", 2i64)]),
                mapping([("a", 3i64)]),
            ]),
        ),
    ]);
    let pet = schema.construct(id, raw.as_map().unwrap()).into_result().unwrap();
    let toys: Vec<(String, i64)> = pet
        .map("toys")
        .unwrap()
        .iter()
        .map(|(k, v)| (k.to_string(), v.as_int().unwrap()))
        .collect();
    assert_eq!(toys, vec![("a".to_string(), 3), ("b".to_string(), 2)]);
}

#[test]
fn test_mutually_recursive_references() {
    let schema = pet_schema();
    let id = schema.id_of("Pet").unwrap();
    let raw = mapping([
        ("name", Value::from("Tom")),
        ("kind", Value::from("cat")),
        (
            "owner",
            mapping([(
                "pets",
                Value::List(vec![mapping([("name", "Jerry")])]),
            )]),
        ),
    ]);
    let pet = schema.construct(id, raw.as_map().unwrap()).into_result().unwrap();
    assert_eq!(pet.str("kind_"), Some("cat"));

    let owner = pet.entity("owner").unwrap();
    assert!(!owner.is_not_null());
    let pets = owner.list("pets").unwrap();
    assert_eq!(pets[0].as_entity().unwrap().str("name"), Some("Jerry"));
}

#[test]
fn test_explicit_null_reference_yields_marker_instance() {
    let schema = pet_schema();
    let id = schema.id_of("Pet").unwrap();
    let raw = mapping([("name", Value::from("Tom")), ("owner", Value::Null)]);
    let pet = schema.construct(id, raw.as_map().unwrap()).into_result().unwrap();
    assert!(pet.entity("owner").unwrap().is_not_null());
}

#[test]
fn test_every_failure_is_reported() {
    let schema = pet_schema();
    let id = schema.id_of("Pet").unwrap();
    let raw = mapping([
        ("kind", Value::from("fish")),
        ("tags", Value::from("not a list")),
    ]);
    let report = schema
        .construct(id, raw.as_map().unwrap())
        .into_result()
        .unwrap_err();

    let fields: Vec<&str> = report.iter().map(|(field, _)| field).collect();
    assert_eq!(fields, vec!["kind", "name", "tags"]);
    assert_eq!(report.get("name"), Some("missed value for required field"));
    assert_eq!(
        report.get("kind"),
        Some("Got an unexpected value in the field `kind`: fish. Value should be one of: cat, dog")
    );
}

#[test]
fn test_construct_twice_is_structurally_equal() {
    let schema = pet_schema();
    let id = schema.id_of("Pet").unwrap();
    let raw = mapping([
        ("name", Value::from("Tom")),
        ("tags", Value::from(vec!["grey", "lazy"])),
    ]);
    let first = schema.construct(id, raw.as_map().unwrap()).entity;
    let second = schema.construct(id, raw.as_map().unwrap()).entity;
    assert_eq!(first, second);
    assert_eq!(first.map("toys"), None, "unset map field reads as absent");
    assert!(
        first.entity("owner").unwrap().is_not_null(),
        "absent reference to a notNull-bearing type reads as the marker instance"
    );
}

#[test]
fn test_unknown_reference_fails_at_build_time() {
    let err = Schema::builder()
        .define(EntityDef::new("A").field("b", Field::reference("Missing")))
        .build()
        .unwrap_err();
    assert_eq!(
        err,
        SchemaError::UnknownReference {
            entity: "A".to_string(),
            target: "Missing".to_string(),
        }
    );
}

#[test]
fn test_structure_exposes_aliases() {
    let schema = pet_schema();
    let pet = schema.entity_type_named("Pet").unwrap();
    let aliases: Vec<(&str, Option<&str>)> = pet
        .structure()
        .iter()
        .map(|(name, field)| (name.as_str(), field.field_name()))
        .collect();
    assert_eq!(
        aliases,
        vec![
            ("weight", Some("weight")),
            ("kind_", Some("kind")),
            ("owner", Some("owner")),
            ("toys", Some("toys")),
            ("name", Some("name")),
            ("tags", Some("tags")),
        ]
    );
    assert_eq!(pet.field("tags").unwrap().kind_name(), "List");
}
