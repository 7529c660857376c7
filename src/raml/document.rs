//! Parsed RAML document graph
//!
//! The document is read-only once parsed. Resources live in an arena
//! ([`ResourceTree`]): parents own their children through ordered maps of
//! ids, and a child's parent link is a plain id back into the arena.
//! Everything else is a thin typed view over an [`Entity`].

use indexmap::IndexMap;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::schema::{Entity, Key, Mapping, Value};

// =============================================================================
// Resource arena
// =============================================================================

/// Index of a resource within its [`ResourceTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(usize);

#[derive(Debug, Clone)]
struct ResourceNode {
    path: String,
    entity: Entity,
    parent: Option<ResourceId>,
    children: IndexMap<String, ResourceId>,
}

/// Ordered, rooted resource tree
#[derive(Debug, Clone, Default)]
pub struct ResourceTree {
    nodes: Vec<ResourceNode>,
    roots: IndexMap<String, ResourceId>,
}

impl ResourceTree {
    /// Append a resource under `parent` (or at the top level)
    pub(crate) fn push(
        &mut self,
        parent: Option<ResourceId>,
        path: impl Into<String>,
        entity: Entity,
    ) -> ResourceId {
        let id = ResourceId(self.nodes.len());
        let path = path.into();
        match parent {
            Some(parent) => {
                self.nodes[parent.0].children.insert(path.clone(), id);
            }
            None => {
                self.roots.insert(path.clone(), id);
            }
        }
        self.nodes.push(ResourceNode {
            path,
            entity,
            parent,
            children: IndexMap::new(),
        });
        id
    }

    /// Total number of resources at any depth
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: ResourceId) -> Option<Resource<'_>> {
        (id.0 < self.nodes.len()).then_some(Resource { tree: self, id })
    }

    /// Top-level resources in declaration order
    pub fn roots(&self) -> impl Iterator<Item = Resource<'_>> {
        self.roots.values().map(move |&id| Resource { tree: self, id })
    }

    /// Every resource, parents before children
    pub fn iter(&self) -> impl Iterator<Item = Resource<'_>> {
        (0..self.nodes.len()).map(move |i| Resource {
            tree: self,
            id: ResourceId(i),
        })
    }

    fn node(&self, id: ResourceId) -> &ResourceNode {
        &self.nodes[id.0]
    }

    fn subtree_json(&self, children: &IndexMap<String, ResourceId>) -> serde_json::Value {
        let object = children
            .iter()
            .map(|(path, &id)| {
                let node = self.node(id);
                let mut json = node.entity.to_json();
                if !node.children.is_empty() {
                    if let serde_json::Value::Object(map) = &mut json {
                        map.insert("resources".to_string(), self.subtree_json(&node.children));
                    }
                }
                (path.clone(), json)
            })
            .collect();
        serde_json::Value::Object(object)
    }
}

// =============================================================================
// Document
// =============================================================================

/// A parsed RAML document
#[derive(Debug, Clone)]
pub struct RamlDocument {
    root: Entity,
    tree: ResourceTree,
}

impl RamlDocument {
    pub(crate) fn new(root: Entity, tree: ResourceTree) -> Self {
        Self { root, tree }
    }

    /// Underlying `RamlRoot` entity
    pub fn root(&self) -> &Entity {
        &self.root
    }

    pub fn tree(&self) -> &ResourceTree {
        &self.tree
    }

    pub fn raml_version(&self) -> &str {
        self.root.str("raml_version").unwrap_or_default()
    }

    pub fn title(&self) -> &str {
        self.root.str("title").unwrap_or_default()
    }

    /// API version; numeric versions are rendered as strings
    pub fn version(&self) -> Option<String> {
        scalar_string(self.root.get("version"))
    }

    pub fn base_uri(&self) -> Option<&str> {
        self.root.str("baseUri")
    }

    pub fn media_type(&self) -> Option<&str> {
        self.root.str("mediaType")
    }

    /// Upper-case protocols, declared or derived from the base URI scheme
    pub fn protocols(&self) -> Option<Vec<&str>> {
        string_list(self.root.get("protocols"))
    }

    pub fn documentation(&self) -> Vec<Documentation<'_>> {
        entities(self.root.get("documentation"))
            .map(|entity| Documentation { entity })
            .collect()
    }

    pub fn schemas(&self) -> Option<&Mapping> {
        self.root.map("schemas")
    }

    /// A named schema: parsed JSON, parsed XML or a plain string
    pub fn schema(&self, name: &str) -> Option<&Value> {
        self.schemas()?.get(&Key::from(name))
    }

    pub fn base_uri_parameters(&self) -> ParameterMap<'_> {
        ParameterMap::of(self.root.get("baseUriParameters"))
    }

    pub fn traits(&self) -> impl Iterator<Item = Trait<'_>> {
        named_entities(self.root.get("traits")).map(|(name, entity)| Trait { name, entity })
    }

    pub fn trait_named(&self, name: &str) -> Option<Trait<'_>> {
        self.traits().find(|t| t.name == name)
    }

    pub fn resource_types(&self) -> impl Iterator<Item = ResourceType<'_>> {
        named_entities(self.root.get("resourceTypes"))
            .map(|(name, entity)| ResourceType { name, entity })
    }

    pub fn resource_type(&self, name: &str) -> Option<ResourceType<'_>> {
        self.resource_types().find(|t| t.name == name)
    }

    pub fn security_schemes(&self) -> impl Iterator<Item = SecurityScheme<'_>> {
        named_entities(self.root.get("securitySchemes"))
            .map(|(name, entity)| SecurityScheme { name, entity })
    }

    pub fn security_scheme(&self, name: &str) -> Option<SecurityScheme<'_>> {
        self.security_schemes().find(|s| s.name == name)
    }

    /// Raw `securedBy` entries: names, parameterised mappings or nulls
    pub fn secured_by(&self) -> Option<&[Value]> {
        self.root.list("securedBy")
    }

    /// Top-level resources in declaration order
    pub fn resources(&self) -> impl Iterator<Item = Resource<'_>> {
        self.tree.roots()
    }

    /// Top-level resource by its path key
    pub fn resource(&self, path: &str) -> Option<Resource<'_>> {
        let id = *self.tree.roots.get(path)?;
        self.tree.get(id)
    }

    /// Resolve a full path such as `/media/tags/search`
    pub fn find(&self, full_path: &str) -> Option<Resource<'_>> {
        self.tree.iter().find(|r| r.full_path() == full_path)
    }

    /// Whole graph as JSON, resources nested under `resources`
    pub fn to_json(&self) -> serde_json::Value {
        let mut json = self.root.to_json();
        if let serde_json::Value::Object(map) = &mut json {
            map.insert(
                "resources".to_string(),
                self.tree.subtree_json(&self.tree.roots),
            );
        }
        json
    }
}

// =============================================================================
// Resources & methods
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Resource<'a> {
    tree: &'a ResourceTree,
    id: ResourceId,
}

impl<'a> Resource<'a> {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Path key as declared, e.g. `/tags`
    pub fn path(&self) -> &'a str {
        &self.tree.node(self.id).path
    }

    pub fn entity(&self) -> &'a Entity {
        &self.tree.node(self.id).entity
    }

    pub fn display_name(&self) -> Option<&'a str> {
        self.entity().str("displayName")
    }

    pub fn description(&self) -> Option<&'a str> {
        self.entity().str("description")
    }

    pub fn parent(&self) -> Option<Resource<'a>> {
        let parent = self.tree.node(self.id).parent?;
        self.tree.get(parent)
    }

    pub fn resources(&self) -> impl Iterator<Item = Resource<'a>> {
        let tree = self.tree;
        tree.node(self.id)
            .children
            .values()
            .map(move |&id| Resource { tree, id })
    }

    pub fn resource(&self, path: &str) -> Option<Resource<'a>> {
        let id = *self.tree.node(self.id).children.get(path)?;
        self.tree.get(id)
    }

    /// Methods in declaration order
    pub fn methods(&self) -> impl Iterator<Item = Method<'a>> {
        method_views(self.entity().get("methods"))
    }

    pub fn method(&self, verb: &str) -> Option<Method<'a>> {
        self.methods().find(|m| m.verb == verb)
    }

    pub fn uri_parameters(&self) -> ParameterMap<'a> {
        ParameterMap::of(self.entity().get("uriParameters"))
    }

    pub fn base_uri_parameters(&self) -> ParameterMap<'a> {
        ParameterMap::of(self.entity().get("baseUriParameters"))
    }

    /// Applied resource type: a name or `{name: {param: value}}`
    pub fn type_(&self) -> &'a Value {
        self.entity().get("type_")
    }

    /// Applied traits
    pub fn is(&self) -> Option<&'a [Value]> {
        self.entity().list("is_")
    }

    pub fn secured_by(&self) -> Option<&'a [Value]> {
        self.entity().list("securedBy")
    }

    /// Path from the document root, joining ancestor path keys
    pub fn full_path(&self) -> String {
        let mut segments = vec![self.path()];
        let mut current = self.parent();
        while let Some(resource) = current {
            segments.push(resource.path());
            current = resource.parent();
        }
        segments.reverse();
        segments.concat()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Method<'a> {
    verb: &'a str,
    entity: &'a Entity,
}

impl<'a> Method<'a> {
    pub fn verb(&self) -> &'a str {
        self.verb
    }

    pub fn entity(&self) -> &'a Entity {
        self.entity
    }

    /// Declared with an empty body, as in `get:`
    pub fn is_not_null(&self) -> bool {
        self.entity.is_not_null()
    }

    pub fn description(&self) -> Option<&'a str> {
        self.entity.str("description")
    }

    pub fn bodies(&self) -> impl Iterator<Item = Body<'a>> {
        body_views(self.entity.get("body"))
    }

    pub fn body(&self, media_type: &str) -> Option<Body<'a>> {
        self.bodies().find(|b| b.media_type == media_type)
    }

    pub fn responses(&self) -> impl Iterator<Item = Response<'a>> {
        response_views(self.entity.get("responses"))
    }

    pub fn response(&self, code: i64) -> Option<Response<'a>> {
        self.responses().find(|r| r.code == code)
    }

    pub fn query_parameters(&self) -> ParameterMap<'a> {
        ParameterMap::of(self.entity.get("queryParameters"))
    }

    pub fn base_uri_parameters(&self) -> ParameterMap<'a> {
        ParameterMap::of(self.entity.get("baseUriParameters"))
    }

    pub fn headers(&self) -> ParameterMap<'a> {
        ParameterMap::of(self.entity.get("headers"))
    }

    pub fn protocols(&self) -> Option<Vec<&'a str>> {
        string_list(self.entity.get("protocols"))
    }

    pub fn is(&self) -> Option<&'a [Value]> {
        self.entity.list("is_")
    }

    pub fn secured_by(&self) -> Option<&'a [Value]> {
        self.entity.list("securedBy")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Body<'a> {
    media_type: &'a str,
    entity: &'a Entity,
}

impl<'a> Body<'a> {
    pub fn media_type(&self) -> &'a str {
        self.media_type
    }

    pub fn entity(&self) -> &'a Entity {
        self.entity
    }

    pub fn is_not_null(&self) -> bool {
        self.entity.is_not_null()
    }

    /// Parsed JSON, parsed XML or a named schema reference
    pub fn schema(&self) -> &'a Value {
        self.entity.get("schema")
    }

    pub fn example(&self) -> Option<&'a str> {
        self.entity.str("example")
    }

    pub fn form_parameters(&self) -> ParameterMap<'a> {
        ParameterMap::of(self.entity.get("formParameters"))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Response<'a> {
    code: i64,
    entity: &'a Entity,
}

impl<'a> Response<'a> {
    pub fn code(&self) -> i64 {
        self.code
    }

    pub fn entity(&self) -> &'a Entity {
        self.entity
    }

    pub fn is_not_null(&self) -> bool {
        self.entity.is_not_null()
    }

    pub fn description(&self) -> Option<&'a str> {
        self.entity.str("description")
    }

    pub fn headers(&self) -> ParameterMap<'a> {
        ParameterMap::of(self.entity.get("headers"))
    }

    pub fn bodies(&self) -> impl Iterator<Item = Body<'a>> {
        body_views(self.entity.get("body"))
    }

    pub fn body(&self, media_type: &str) -> Option<Body<'a>> {
        self.bodies().find(|b| b.media_type == media_type)
    }
}

// =============================================================================
// Declarations
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Trait<'a> {
    name: &'a str,
    entity: &'a Entity,
}

impl<'a> Trait<'a> {
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn entity(&self) -> &'a Entity {
        self.entity
    }

    pub fn usage(&self) -> Option<&'a str> {
        self.entity.str("usage")
    }

    pub fn description(&self) -> Option<&'a str> {
        self.entity.str("description")
    }

    pub fn display_name(&self) -> Option<&'a str> {
        self.entity.str("displayName")
    }

    pub fn headers(&self) -> ParameterMap<'a> {
        ParameterMap::of(self.entity.get("headers"))
    }

    pub fn query_parameters(&self) -> ParameterMap<'a> {
        ParameterMap::of(self.entity.get("queryParameters"))
    }

    pub fn bodies(&self) -> impl Iterator<Item = Body<'a>> {
        body_views(self.entity.get("body"))
    }

    pub fn responses(&self) -> impl Iterator<Item = Response<'a>> {
        response_views(self.entity.get("responses"))
    }

    pub fn response(&self, code: i64) -> Option<Response<'a>> {
        self.responses().find(|r| r.code == code)
    }

    /// `<<parameter>>` names used anywhere in the trait
    pub fn placeholders(&self) -> BTreeSet<String> {
        placeholders(self.entity)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResourceType<'a> {
    name: &'a str,
    entity: &'a Entity,
}

impl<'a> ResourceType<'a> {
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn entity(&self) -> &'a Entity {
        self.entity
    }

    pub fn usage(&self) -> Option<&'a str> {
        self.entity.str("usage")
    }

    pub fn description(&self) -> Option<&'a str> {
        self.entity.str("description")
    }

    pub fn methods(&self) -> impl Iterator<Item = Method<'a>> {
        method_views(self.entity.get("methods"))
    }

    pub fn method(&self, verb: &str) -> Option<Method<'a>> {
        self.methods().find(|m| m.verb == verb)
    }

    /// `<<parameter>>` names used anywhere in the resource type
    pub fn placeholders(&self) -> BTreeSet<String> {
        placeholders(self.entity)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SecurityScheme<'a> {
    name: &'a str,
    entity: &'a Entity,
}

impl<'a> SecurityScheme<'a> {
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn entity(&self) -> &'a Entity {
        self.entity
    }

    pub fn description(&self) -> Option<&'a str> {
        self.entity.str("description")
    }

    pub fn type_(&self) -> Option<&'a str> {
        self.entity.str("type")
    }

    /// The `RamlSecuritySchemeDescription` entity
    pub fn described_by(&self) -> Option<&'a Entity> {
        self.entity.entity("describedBy")
    }

    pub fn settings(&self) -> Option<&'a Mapping> {
        self.entity.map("settings")
    }

    pub fn setting(&self, name: &str) -> Option<&'a Value> {
        self.settings()?.get(&Key::from(name))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Documentation<'a> {
    entity: &'a Entity,
}

impl<'a> Documentation<'a> {
    pub fn title(&self) -> &'a str {
        self.entity.str("title").unwrap_or_default()
    }

    pub fn content(&self) -> &'a str {
        self.entity.str("content").unwrap_or_default()
    }
}

// =============================================================================
// Named parameters
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct NamedParameter<'a> {
    name: &'a str,
    entity: &'a Entity,
}

impl<'a> NamedParameter<'a> {
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn entity(&self) -> &'a Entity {
        self.entity
    }

    /// One of the named parameter types; `string` unless declared
    pub fn type_(&self) -> &'a str {
        self.entity.str("type").unwrap_or("string")
    }

    pub fn display_name(&self) -> Option<&'a str> {
        self.entity.str("displayName")
    }

    pub fn description(&self) -> Option<&'a str> {
        self.entity.str("description")
    }

    pub fn example(&self) -> &'a Value {
        self.entity.get("example")
    }

    pub fn default(&self) -> &'a Value {
        self.entity.get("default")
    }

    pub fn enum_values(&self) -> Option<&'a [Value]> {
        self.entity.list("enum")
    }

    pub fn pattern(&self) -> Option<&'a str> {
        self.entity.str("pattern")
    }

    pub fn min_length(&self) -> Option<i64> {
        self.entity.int("minLength")
    }

    pub fn max_length(&self) -> Option<i64> {
        self.entity.int("maxLength")
    }

    pub fn minimum(&self) -> Option<f64> {
        self.entity.get("minimum").as_f64()
    }

    pub fn maximum(&self) -> Option<f64> {
        self.entity.get("maximum").as_f64()
    }

    pub fn is_required(&self) -> bool {
        self.entity.bool("required").unwrap_or(false)
    }

    pub fn repeat(&self) -> bool {
        self.entity.bool("repeat").unwrap_or(false)
    }
}

/// A parameter declared once, or as a list of alternative declarations
#[derive(Debug, Clone)]
pub enum Parameter<'a> {
    Single(NamedParameter<'a>),
    Multiple(Vec<NamedParameter<'a>>),
}

impl<'a> Parameter<'a> {
    /// The only declaration, or the first alternative
    pub fn first(&self) -> Option<NamedParameter<'a>> {
        match self {
            Parameter::Single(param) => Some(*param),
            Parameter::Multiple(params) => params.first().copied(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Parameter::Single(_) => 1,
            Parameter::Multiple(params) => params.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Name to parameter mapping; empty when undeclared
#[derive(Debug, Clone, Copy)]
pub struct ParameterMap<'a> {
    map: Option<&'a Mapping>,
}

impl<'a> ParameterMap<'a> {
    fn of(value: &'a Value) -> Self {
        Self {
            map: value.as_map(),
        }
    }

    pub fn len(&self) -> usize {
        self.map.map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, name: &str) -> Option<Parameter<'a>> {
        let (key, value) = self.map?.get_key_value(&Key::from(name))?;
        parameter(key, value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, Parameter<'a>)> {
        self.map
            .into_iter()
            .flatten()
            .filter_map(|(key, value)| Some((key.as_str()?, parameter(key, value)?)))
    }
}

fn parameter<'a>(key: &'a Key, value: &'a Value) -> Option<Parameter<'a>> {
    let name = key.as_str()?;
    match value {
        Value::Entity(entity) => Some(Parameter::Single(NamedParameter { name, entity })),
        Value::List(items) => Some(Parameter::Multiple(
            items
                .iter()
                .filter_map(Value::as_entity)
                .map(|entity| NamedParameter { name, entity })
                .collect(),
        )),
        _ => None,
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn entities(value: &Value) -> impl Iterator<Item = &Entity> {
    value
        .as_list()
        .into_iter()
        .flatten()
        .filter_map(Value::as_entity)
}

fn named_entities(value: &Value) -> impl Iterator<Item = (&str, &Entity)> {
    value
        .as_map()
        .into_iter()
        .flatten()
        .filter_map(|(key, value)| Some((key.as_str()?, value.as_entity()?)))
}

fn method_views(value: &Value) -> impl Iterator<Item = Method<'_>> {
    named_entities(value).map(|(verb, entity)| Method { verb, entity })
}

fn body_views(value: &Value) -> impl Iterator<Item = Body<'_>> {
    named_entities(value).map(|(media_type, entity)| Body { media_type, entity })
}

fn response_views(value: &Value) -> impl Iterator<Item = Response<'_>> {
    value
        .as_map()
        .into_iter()
        .flatten()
        .filter_map(|(key, value)| {
            Some(Response {
                code: key.as_int()?,
                entity: value.as_entity()?,
            })
        })
}

fn string_list(value: &Value) -> Option<Vec<&str>> {
    Some(value.as_list()?.iter().filter_map(Value::as_str).collect())
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) => Some(format!("{:?}", f)),
        _ => None,
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<<\s*([A-Za-z_][\w-]*)\s*(?:\|[^>]*)?>>").unwrap())
}

/// Parameter names of every `<<name>>` or `<<name | !function>>` reference
fn placeholders(entity: &Entity) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for (_, value) in entity.values() {
        collect_placeholders(value, &mut names);
    }
    names
}

fn collect_placeholders(value: &Value, names: &mut BTreeSet<String>) {
    match value {
        Value::Str(s) => scan_placeholders(s, names),
        Value::IncludedJson { content, .. } => scan_placeholders(content, names),
        Value::List(items) => items.iter().for_each(|item| collect_placeholders(item, names)),
        Value::Map(map) => {
            for (key, item) in map {
                if let Key::Str(k) = key {
                    scan_placeholders(k, names);
                }
                collect_placeholders(item, names);
            }
        }
        Value::Entity(entity) => {
            for (_, item) in entity.values() {
                collect_placeholders(item, names);
            }
        }
        _ => {}
    }
}

fn scan_placeholders(text: &str, names: &mut BTreeSet<String>) {
    for captures in placeholder_pattern().captures_iter(text) {
        names.insert(captures[1].to_string());
    }
}
