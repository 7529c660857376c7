//! RAML 0.8 documents: entity catalogue, parser and the parsed graph

pub mod document;
pub mod entities;
pub mod parser;

pub use document::{
    Body, Documentation, Method, NamedParameter, Parameter, ParameterMap, RamlDocument, Resource,
    ResourceId, ResourceTree, ResourceType, Response, SecurityScheme, Trait,
};
pub use entities::{build_raml_schema, raml_schema};
pub use parser::{load, parse, RamlParser};
