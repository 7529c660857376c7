//! RAML 0.8 entity definitions
//!
//! Every RAML construct is declared once as an [`EntityDef`] and resolved
//! into one shared [`Schema`].

use std::sync::OnceLock;

use crate::error::SchemaError;
use crate::schema::{EntityDef, Field, Schema};

/// HTTP verbs recognised as method keys on resources and resource types
pub const HTTP_METHODS: &[&str] = &[
    "connect", "options", "patch", "trace", "get", "post", "put", "delete", "head",
];

/// Allowed values of a named parameter's `type`
pub const NAMED_PARAMETER_TYPES: &[&str] =
    &["string", "number", "integer", "date", "boolean", "file"];

pub const VALID_PROTOCOLS: &[&str] = &["HTTP", "HTTPS"];

// Entity names
pub const ROOT: &str = "RamlRoot";
pub const DOCUMENTATION: &str = "RamlDocumentation";
pub const NAMED_PARAMETERS: &str = "RamlNamedParameters";
pub const QUERY_PARAMETER: &str = "RamlQueryParameter";
pub const HEADER: &str = "RamlHeader";
pub const BODY: &str = "RamlBody";
pub const RESPONSE: &str = "RamlResponse";
pub const TRAIT: &str = "RamlTrait";
pub const METHOD: &str = "RamlMethod";
pub const RESOURCE: &str = "RamlResource";
pub const RESOURCE_TYPE: &str = "RamlResourceType";
pub const SECURITY_SCHEME_DESCRIPTION: &str = "RamlSecuritySchemeDescription";
pub const SECURITY_SCHEME: &str = "RamlSecurityScheme";

const SECURED_ENTITY: &str = "SecuredEntity";
const TRAITED_ENTITY: &str = "TraitedEntity";
const RESOURCE_TYPED_ENTITY: &str = "ResourceTypedEntity";

/// Keys that mark a body declared directly rather than per media type
pub const BODY_FIELDS: &[&str] = &["schema", "example", "notNull", "formParameters"];

// =============================================================================
// Shared field shapes
// =============================================================================

/// Parameter name to a single declaration or a list of alternatives
fn named_parameters(target: &str) -> Field {
    Field::map(
        Field::string(),
        Field::or(vec![
            Field::reference(target),
            Field::list(Field::reference(target)),
        ]),
    )
}

fn bodies() -> Field {
    Field::map(Field::string(), Field::reference(BODY))
}

fn responses() -> Field {
    Field::map(Field::int(), Field::reference(RESPONSE))
}

fn protocols() -> Field {
    Field::list(Field::choice(VALID_PROTOCOLS.iter().copied()).aliased("protocols"))
}

fn scalar() -> Field {
    Field::or(vec![Field::string(), Field::int(), Field::float()])
}

fn schema_data() -> Field {
    Field::or(vec![Field::json(), Field::xml(), Field::string()])
}

// =============================================================================
// Entities
// =============================================================================

fn definitions() -> Vec<EntityDef> {
    vec![
        // [foo, {bar: {baz: [buz]}}, null]
        EntityDef::new(SECURED_ENTITY).field(
            "securedBy",
            Field::list(Field::or(vec![
                Field::string(),
                Field::map(
                    Field::string(),
                    Field::map(Field::string(), Field::list(Field::string())),
                ),
                Field::null(),
            ])),
        ),
        EntityDef::new(TRAITED_ENTITY).field(
            "is_",
            Field::list(Field::or(vec![
                Field::string(),
                Field::map(
                    Field::string(),
                    Field::map(Field::string(), Field::string()),
                ),
            ]))
            .aliased("is"),
        ),
        EntityDef::new(RESOURCE_TYPED_ENTITY).field(
            "type_",
            Field::or(vec![
                Field::string(),
                Field::map(
                    Field::string(),
                    Field::map(
                        Field::string(),
                        Field::or(vec![Field::string(), Field::int()]),
                    ),
                ),
            ])
            .aliased("type"),
        ),
        EntityDef::new(DOCUMENTATION)
            .field("title", Field::string().required())
            .field("content", Field::string().required()),
        EntityDef::new(NAMED_PARAMETERS)
            .field("displayName", Field::string())
            .field("description", Field::string())
            .field(
                "type",
                Field::choice(NAMED_PARAMETER_TYPES.iter().copied()).with_default("string"),
            )
            .field("name", Field::string())
            .field("example", scalar())
            .field(
                "enum",
                Field::list(Field::or(vec![
                    Field::string(),
                    Field::float(),
                    Field::int(),
                ])),
            )
            .field("pattern", Field::string())
            .field("minLength", Field::int())
            .field("maxLength", Field::int())
            .field("repeat", Field::bool())
            .field("required", Field::bool())
            .field("default", scalar())
            .field("minimum", Field::or(vec![Field::int(), Field::float()]))
            .field("maximum", Field::or(vec![Field::int(), Field::float()])),
        EntityDef::new(QUERY_PARAMETER).extends(NAMED_PARAMETERS),
        EntityDef::new(HEADER).extends(NAMED_PARAMETERS),
        EntityDef::new(BODY)
            .field("schema", schema_data())
            .field("example", Field::string())
            .field("notNull", Field::bool())
            .field("formParameters", named_parameters(NAMED_PARAMETERS)),
        EntityDef::new(RESPONSE)
            .field("notNull", Field::bool())
            .field("description", Field::string())
            .field("headers", named_parameters(HEADER))
            .field("body", bodies()),
        EntityDef::new(TRAIT)
            .field("usage", Field::string())
            .field("description", Field::string())
            .field("displayName", Field::string())
            .field("headers", named_parameters(HEADER))
            .field("queryParameters", named_parameters(QUERY_PARAMETER))
            .field("body", bodies())
            .field("responses", responses()),
        EntityDef::new(METHOD)
            .extends(TRAITED_ENTITY)
            .extends(SECURED_ENTITY)
            .field("notNull", Field::bool())
            .field("description", Field::string())
            .field("body", bodies())
            .field("responses", responses())
            .field("queryParameters", named_parameters(QUERY_PARAMETER))
            .field("baseUriParameters", named_parameters(NAMED_PARAMETERS))
            .field("headers", named_parameters(HEADER))
            .field("protocols", protocols()),
        EntityDef::new(RESOURCE)
            .extends(RESOURCE_TYPED_ENTITY)
            .extends(TRAITED_ENTITY)
            .extends(SECURED_ENTITY)
            .field("displayName", Field::string())
            .field("description", Field::string())
            .field("methods", Field::map(Field::string(), Field::reference(METHOD)))
            .field("uriParameters", named_parameters(NAMED_PARAMETERS))
            .field("baseUriParameters", named_parameters(NAMED_PARAMETERS)),
        EntityDef::new(RESOURCE_TYPE)
            .field("usage", Field::string())
            .field("description", Field::string())
            .field("methods", Field::map(Field::string(), Field::reference(METHOD))),
        EntityDef::new(SECURITY_SCHEME_DESCRIPTION)
            .field("description", Field::string())
            .field("body", bodies())
            .field("headers", named_parameters(HEADER))
            .field("queryParameters", named_parameters(QUERY_PARAMETER))
            .field("responses", responses())
            .field("baseUriParameters", named_parameters(NAMED_PARAMETERS))
            .field("protocols", protocols()),
        EntityDef::new(SECURITY_SCHEME)
            .field("description", Field::string())
            .field("type", Field::string())
            .field("describedBy", Field::reference(SECURITY_SCHEME_DESCRIPTION))
            .field(
                "settings",
                Field::map(
                    Field::string(),
                    Field::or(vec![Field::string(), Field::list(Field::string())]),
                ),
            ),
        EntityDef::new(ROOT)
            .extends(SECURED_ENTITY)
            .field("raml_version", Field::string().required())
            .field("title", Field::string().required())
            .field("version", scalar())
            .field("baseUri", Field::string())
            .field("protocols", protocols())
            .field("mediaType", Field::string())
            .field("documentation", Field::list(Field::reference(DOCUMENTATION)))
            .field("traits", Field::map(Field::string(), Field::reference(TRAIT)))
            .field(
                "resourceTypes",
                Field::map(Field::string(), Field::reference(RESOURCE_TYPE)),
            )
            .field("schemas", Field::map(Field::string(), schema_data()))
            .field("baseUriParameters", named_parameters(NAMED_PARAMETERS))
            .field(
                "securitySchemes",
                Field::map(Field::string(), Field::reference(SECURITY_SCHEME)),
            ),
    ]
}

/// Build the RAML schema from scratch
pub fn build_raml_schema() -> Result<Schema, SchemaError> {
    definitions()
        .into_iter()
        .fold(Schema::builder(), |builder, def| builder.define(def))
        .build()
}

/// Shared RAML schema, built on first use
pub fn raml_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| build_raml_schema().expect("RAML entity definitions are consistent"))
}
