//! RAML Parser
//!
//! Loads a RAML 0.8 document, expands its `!include` directives (local files
//! or HTTP(S) URLs, nested to any depth) and produces a validated, read-only
//! document graph.
//!
//! ## Features
//!
//! - **Field/Schema Framework**: declarative fields composed into entity types
//!   with inheritance, aliasing and late-bound references
//! - **Include Expansion**: RAML/YAML includes are parsed in place, JSON and
//!   other documents are substituted as text, cycles are rejected
//! - **Resource Tree**: ordered resources with parent back-links held as ids
//! - **Aggregated Validation**: every invalid field of an entity is reported
//!   at once
//!
//! ## Example
//!
//! ```no_run
//! let doc = raml_parser::load("api.raml")?;
//! println!("{} ({:?})", doc.title(), doc.protocols());
//! for resource in doc.resources() {
//!     for method in resource.methods() {
//!         println!("{} {}", method.verb(), resource.full_path());
//!     }
//! }
//! # Ok::<(), raml_parser::RamlError>(())
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod loader;
pub mod raml;
pub mod schema;

pub use config::ParserConfig;
pub use context::ParseContext;
pub use error::{RamlError, Result, SchemaError};
pub use loader::{DocumentLoader, Fetched, HttpTransport, Transport};
pub use raml::{load, parse, RamlDocument, RamlParser, Resource};
pub use schema::{Entity, Field, Schema, Value};
