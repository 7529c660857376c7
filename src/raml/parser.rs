//! RAML Document Parser
//!
//! One top-down pass over a document:
//! 1. validate the `#%RAML <version>` header
//! 2. parse the YAML and expand every `!include`
//! 3. normalise the raw tree into the shapes the entity schema expects
//!    (folded declarations, method maps, keyed bodies, numeric response codes)
//! 4. construct the root entity and the resource tree
//!
//! Shape problems abort with [`RamlError::Structural`]; field values that
//! fail their field rule are reported together as [`RamlError::Validation`].

use serde_yaml::Value as Yaml;

use super::document::{RamlDocument, ResourceId, ResourceTree};
use super::entities::{
    raml_schema, BODY_FIELDS, HTTP_METHODS, RESOURCE, ROOT,
};
use crate::config::{parse_version, ParserConfig};
use crate::context::ParseContext;
use crate::error::{RamlError, Result};
use crate::loader::{DocumentLoader, Transport};
use crate::schema::{Key, Mapping, Value};

const HEADER_TOKEN: &str = "#%RAML";

/// Load and parse a RAML document with the default configuration
pub fn load(uri: &str) -> Result<RamlDocument> {
    RamlParser::new(ParserConfig::default()).load(uri)
}

/// Parse RAML text whose relative includes resolve against `base`
pub fn parse(text: &str, base: &str) -> Result<RamlDocument> {
    RamlParser::new(ParserConfig::default()).parse(text, base)
}

/// A parser session: configuration plus the loader includes go through
pub struct RamlParser {
    loader: DocumentLoader,
}

impl RamlParser {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            loader: DocumentLoader::new(config),
        }
    }

    /// Use a custom transport for network documents
    pub fn with_transport(config: ParserConfig, transport: impl Transport + 'static) -> Self {
        Self {
            loader: DocumentLoader::with_transport(config, transport),
        }
    }

    pub fn loader(&self) -> &DocumentLoader {
        &self.loader
    }

    /// Load a document from a local path or URL and parse it
    pub fn load(&self, uri: &str) -> Result<RamlDocument> {
        let fetched = self.loader.load(uri)?;
        let base = self.loader.parent(uri)?;
        self.parse_document(&fetched.text, &base, Some(uri))
    }

    /// Parse document text
    pub fn parse(&self, text: &str, base: &str) -> Result<RamlDocument> {
        self.parse_document(text, base, None)
    }

    fn parse_document(&self, text: &str, base: &str, source: Option<&str>) -> Result<RamlDocument> {
        let first_line = text.lines().next().unwrap_or_default();
        let raml_version = self.validate_header(first_line)?;

        // The header is a YAML comment, so the whole text parses and error
        // positions stay accurate
        let data: Yaml = serde_yaml::from_str(text)?;
        if !data.is_mapping() {
            return Err(RamlError::structural("document root must be a mapping"));
        }

        let mut context = ParseContext::new(data, base);
        if let Some(source) = source {
            context = context.with_source(source);
        }
        let expanded = context.expand(&self.loader)?;
        let raw = match expanded {
            Value::Map(map) => map,
            _ => return Err(RamlError::structural("document root must be a mapping")),
        };

        let media_type = raw.get(&Key::from("mediaType")).and_then(Value::as_str);

        let mut root = Mapping::new();
        root.insert(Key::from("raml_version"), Value::from(raml_version));
        for (key, value) in &raw {
            let Some(name) = key.as_str() else {
                continue;
            };
            if name.starts_with('/') {
                continue;
            }
            let normalized = match name {
                "title" => required_string("title", value)?,
                "protocols" => protocols(value)?,
                "documentation" => list_property(name, value)?,
                "traits" => fold(name, value, |v| traitlike(v, media_type))?,
                "resourceTypes" => fold(name, value, |v| resource_type(v, media_type))?,
                "schemas" => fold(name, value, |v| Ok(v.clone()))?,
                "securitySchemes" => fold(name, value, |v| security_scheme(v, media_type))?,
                _ => value.clone(),
            };
            root.insert(key.clone(), normalized);
        }

        if !root.contains_key(&Key::from("title")) {
            return Err(RamlError::structural("Property `title` is required"));
        }
        if root.get(&Key::from("protocols")).map_or(true, Value::is_null) {
            if let Some(derived) = raw
                .get(&Key::from("baseUri"))
                .and_then(Value::as_str)
                .and_then(protocol_of)
            {
                root.insert(Key::from("protocols"), Value::List(vec![derived.into()]));
            }
        }

        let mut tree = ResourceTree::default();
        self.build_resources(&raw, None, "", media_type, &mut tree)?;

        let schema = raml_schema();
        let root_id = schema
            .id_of(ROOT)
            .ok_or_else(|| RamlError::structural("RAML schema has no root entity"))?;
        let root = schema.construct(root_id, &root).into_result()?;

        tracing::debug!(
            title = root.str("title").unwrap_or_default(),
            resources = tree.len(),
            "parsed RAML document"
        );
        Ok(RamlDocument::new(root, tree))
    }

    /// Check `#%RAML <major>.<minor>[.patch]` against the supported version
    fn validate_header(&self, line: &str) -> Result<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 2 {
            return Err(RamlError::Header("Invalid format of RAML header".to_string()));
        }
        if tokens[0] != HEADER_TOKEN {
            return Err(RamlError::Header("Unable to find RAML header".to_string()));
        }

        let version = tokens[1];
        let major_minor: Vec<&str> = version.split('.').take(2).collect();
        let parsed = parse_version(&major_minor.join("."))
            .ok_or_else(|| RamlError::Header(format!("Invalid RAML format version {}", version)))?;
        if parsed > self.loader.config().supported_version() {
            return Err(RamlError::Header(format!(
                "Unsupported format of RAML file {}",
                version
            )));
        }
        Ok(version.to_string())
    }

    /// Construct every resource declared at this level, then recurse into
    /// its own nested resources
    fn build_resources(
        &self,
        raw: &Mapping,
        parent: Option<ResourceId>,
        parent_path: &str,
        media_type: Option<&str>,
        tree: &mut ResourceTree,
    ) -> Result<()> {
        let schema = raml_schema();
        let resource_id = schema
            .id_of(RESOURCE)
            .ok_or_else(|| RamlError::structural("RAML schema has no resource entity"))?;

        for (key, value) in raw {
            let Some(path) = key.as_str().filter(|k| k.starts_with('/')) else {
                continue;
            };
            let empty = Mapping::new();
            let body = match value {
                Value::Null => &empty,
                Value::Map(map) => map,
                other => {
                    return Err(RamlError::structural(format!(
                        "Resource `{}` must be a mapping, got {}",
                        path,
                        other.kind_name()
                    )))
                }
            };

            let mut fields = Mapping::new();
            let mut methods = Mapping::new();
            for (key, value) in body {
                match key.as_str() {
                    Some(name) if name.starts_with('/') => {}
                    Some(verb) if HTTP_METHODS.contains(&verb) => {
                        methods.insert(key.clone(), method(verb, value, media_type)?);
                    }
                    _ => {
                        fields.insert(key.clone(), value.clone());
                    }
                }
            }
            fields.insert(Key::from("methods"), Value::Map(methods));

            let entity = schema.construct(resource_id, &fields).into_result()?;
            let full_path = format!("{}{}", parent_path, path);
            tracing::debug!(path = %full_path, "parsed resource");

            let id = tree.push(parent, path, entity);
            self.build_resources(body, Some(id), &full_path, media_type, tree)?;
        }
        Ok(())
    }
}

// =============================================================================
// Normalisation
// =============================================================================

fn required_string(name: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Str(s) if !s.is_empty() => Ok(value.clone()),
        // Unquoted scalars such as `title: 2` arrive as numbers
        Value::Int(i) => Ok(Value::Str(i.to_string())),
        // `{:?}` keeps the fractional part, so `1.0` stays "1.0"
        Value::Float(f) => Ok(Value::Str(format!("{:?}", f))),
        Value::Null | Value::Str(_) => Err(RamlError::structural(format!(
            "Property `{}` is required",
            name
        ))),
        other => Err(RamlError::structural(format!(
            "Property `{}` must be string, got {}",
            name,
            other.kind_name()
        ))),
    }
}

fn list_property(name: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Null | Value::List(_) => Ok(value.clone()),
        other => Err(RamlError::structural(format!(
            "Property `{}` must be list of objects, got {}",
            name,
            other.kind_name()
        ))),
    }
}

/// Upper-case declared protocols
fn protocols(value: &Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::List(items) => Ok(Value::List(
            items
                .iter()
                .map(|item| match item {
                    Value::Str(s) => Value::Str(s.to_uppercase()),
                    other => other.clone(),
                })
                .collect(),
        )),
        other => Err(RamlError::structural(format!(
            "Property `protocols` must be array of strings, got {}",
            other.kind_name()
        ))),
    }
}

/// Scheme of a base URI, upper-cased
fn protocol_of(base_uri: &str) -> Option<String> {
    let (scheme, _) = base_uri.split_once("://")?;
    (!scheme.is_empty()).then(|| scheme.to_uppercase())
}

/// Fold a declaration list (a sequence of single-key mappings) or a plain
/// mapping into one ordered mapping, normalising each declaration
fn fold(
    property: &str,
    value: &Value,
    normalize: impl Fn(&Value) -> Result<Value>,
) -> Result<Value> {
    let mut folded = Mapping::new();
    let mut add = |map: &Mapping| -> Result<()> {
        for (key, declaration) in map {
            let normalized = normalize(declaration)?;
            if folded.insert(key.clone(), normalized).is_some() {
                tracing::warn!(
                    property,
                    name = %key,
                    "duplicate declaration overwrites an earlier one"
                );
            } else {
                tracing::debug!(property, name = %key, "folded declaration");
            }
        }
        Ok(())
    };

    match value {
        Value::Null => return Ok(Value::Null),
        Value::Map(map) => add(map)?,
        Value::List(items) => {
            for item in items {
                match item {
                    Value::Map(map) => add(map)?,
                    other => {
                        return Err(RamlError::structural(format!(
                            "Property `{}` must be list of objects, got an item of type {}",
                            property,
                            other.kind_name()
                        )))
                    }
                }
            }
        }
        other => {
            return Err(RamlError::structural(format!(
                "Property `{}` must be a mapping or list of mappings, got {}",
                property,
                other.kind_name()
            )))
        }
    }
    Ok(Value::Map(folded))
}

fn expect_map<'a>(what: &str, value: &'a Value) -> Result<Option<&'a Mapping>> {
    match value {
        Value::Null => Ok(None),
        Value::Map(map) => Ok(Some(map)),
        other => Err(RamlError::structural(format!(
            "{} must be a mapping, got {}",
            what,
            other.kind_name()
        ))),
    }
}

/// Trait, or any other method-like partial: keyed bodies and numeric
/// response codes
fn traitlike(value: &Value, media_type: Option<&str>) -> Result<Value> {
    let Some(map) = expect_map("Trait", value)? else {
        return Ok(Value::Map(Mapping::new()));
    };
    Ok(Value::Map(method_body(map, media_type)?))
}

fn resource_type(value: &Value, media_type: Option<&str>) -> Result<Value> {
    let Some(map) = expect_map("Resource type", value)? else {
        return Ok(Value::Map(Mapping::new()));
    };
    let mut normalized = Mapping::new();
    let mut methods = Mapping::new();
    for (key, value) in map {
        match key.as_str() {
            Some(verb) if HTTP_METHODS.contains(&verb) => {
                methods.insert(key.clone(), method(verb, value, media_type)?);
            }
            _ => {
                normalized.insert(key.clone(), value.clone());
            }
        }
    }
    normalized.insert(Key::from("methods"), Value::Map(methods));
    Ok(Value::Map(normalized))
}

fn security_scheme(value: &Value, media_type: Option<&str>) -> Result<Value> {
    let Some(map) = expect_map("Security scheme", value)? else {
        return Ok(Value::Map(Mapping::new()));
    };
    let mut normalized = map.clone();
    if let Some(described_by) = map.get(&Key::from("describedBy")) {
        let described_by = match expect_map("describedBy", described_by)? {
            Some(inner) => Value::Map(method_body(inner, media_type)?),
            None => Value::Null,
        };
        normalized.insert(Key::from("describedBy"), described_by);
    }
    Ok(Value::Map(normalized))
}

/// A method under a verb key. Declared but empty stays null, which the
/// method reference turns into a `notNull` instance.
fn method(verb: &str, value: &Value, media_type: Option<&str>) -> Result<Value> {
    match value {
        v if v.is_blank() => Ok(Value::Null),
        Value::Map(map) => Ok(Value::Map(method_body(map, media_type)?)),
        other => Err(RamlError::structural(format!(
            "Method `{}` must be a mapping, got {}",
            verb,
            other.kind_name()
        ))),
    }
}

/// Normalise the `body`, `responses` and `protocols` of a method-like mapping
fn method_body(map: &Mapping, media_type: Option<&str>) -> Result<Mapping> {
    let mut normalized = map.clone();
    if let Some(body) = map.get(&Key::from("body")) {
        normalized.insert(Key::from("body"), bodies(body, media_type)?);
    }
    if let Some(responses) = map.get(&Key::from("responses")) {
        normalized.insert(Key::from("responses"), self::responses(responses, media_type)?);
    }
    if let Some(declared) = map.get(&Key::from("protocols")) {
        normalized.insert(Key::from("protocols"), protocols(declared)?);
    }
    Ok(normalized)
}

/// A body is either one body shape (filed under the global media type) or a
/// map of media type to body shape
fn bodies(value: &Value, media_type: Option<&str>) -> Result<Value> {
    let Some(map) = expect_map("Property `body`", value)? else {
        return Ok(Value::Null);
    };

    let direct = map
        .keys()
        .filter_map(Key::as_str)
        .any(|key| BODY_FIELDS.contains(&key));
    if direct {
        let media_type = media_type.ok_or_else(|| {
            RamlError::structural("body is declared without a media type and no mediaType is set")
        })?;
        let mut keyed = Mapping::new();
        keyed.insert(Key::from(media_type), value.clone());
        return Ok(Value::Map(keyed));
    }

    Ok(Value::Map(
        map.iter()
            .map(|(key, body)| {
                let body = if body.is_blank() { Value::Null } else { body.clone() };
                (key.clone(), body)
            })
            .collect(),
    ))
}

/// Response codes must be numeric; digit strings are accepted as codes
fn responses(value: &Value, media_type: Option<&str>) -> Result<Value> {
    let Some(map) = expect_map("Property `responses`", value)? else {
        return Ok(Value::Null);
    };

    let mut normalized = Mapping::with_capacity(map.len());
    for (key, response) in map {
        let code = match key {
            Key::Int(code) => *code,
            Key::Str(s) => s.trim().parse::<i64>().map_err(|_| {
                RamlError::structural(format!("Response code `{}` is not numeric", s))
            })?,
            other => {
                return Err(RamlError::structural(format!(
                    "Response code `{}` is not numeric",
                    other
                )))
            }
        };
        let response = match response {
            r if r.is_blank() => Value::Null,
            Value::Map(inner) => {
                let mut inner = inner.clone();
                if let Some(body) = inner.get(&Key::from("body")).cloned() {
                    inner.insert(Key::from("body"), bodies(&body, media_type)?);
                }
                Value::Map(inner)
            }
            other => {
                return Err(RamlError::structural(format!(
                    "Response `{}` must be a mapping, got {}",
                    code,
                    other.kind_name()
                )))
            }
        };
        // `200` and `"200"` name the same response
        if normalized.insert(Key::Int(code), response).is_some() {
            return Err(RamlError::DuplicateKey(code.to_string()));
        }
    }
    Ok(Value::Map(normalized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::mapping;

    fn parser() -> RamlParser {
        RamlParser::new(ParserConfig::default())
    }

    #[test]
    fn test_header_validation() {
        let p = parser();
        assert_eq!(p.validate_header("#%RAML 0.8").unwrap(), "0.8");
        assert_eq!(p.validate_header("#%RAML 0.8.2").unwrap(), "0.8.2");
        assert_eq!(p.validate_header("#%RAML 0.7").unwrap(), "0.7");
        assert!(matches!(p.validate_header("#%RAML"), Err(RamlError::Header(_))));
        assert!(matches!(p.validate_header("#%RAM 0.8"), Err(RamlError::Header(_))));
        assert!(matches!(p.validate_header("#%RAML 1.0"), Err(RamlError::Header(_))));
        assert!(matches!(p.validate_header("#%RAML zero"), Err(RamlError::Header(_))));
        // tuple comparison, not float comparison
        assert!(matches!(p.validate_header("#%RAML 0.10"), Err(RamlError::Header(_))));
    }

    #[test]
    fn test_supported_version_is_configurable() {
        let mut config = ParserConfig::default();
        config.raml.supported_version = "1.0".to_string();
        let p = RamlParser::new(config);
        assert_eq!(p.validate_header("#%RAML 1.0").unwrap(), "1.0");
    }

    #[test]
    fn test_protocol_of() {
        assert_eq!(protocol_of("https://api.example.com/{version}"), Some("HTTPS".to_string()));
        assert_eq!(protocol_of("api.example.com"), None);
    }

    #[test]
    fn test_fold_keeps_first_position_and_last_value() {
        let raw = Value::List(vec![
            mapping([("a", 1i64)]),
            mapping([("b", 2i64)]),
            mapping([("a", 3i64)]),
        ]);
        let folded = fold("traits", &raw, |v| Ok(v.clone())).unwrap();
        assert_eq!(folded, mapping([("a", 3i64), ("b", 2i64)]));

        assert!(matches!(
            fold("traits", &Value::from("x"), |v| Ok(v.clone())),
            Err(RamlError::Structural(_))
        ));
        assert!(matches!(
            fold("traits", &Value::List(vec![Value::Int(1)]), |v| Ok(v.clone())),
            Err(RamlError::Structural(_))
        ));
    }

    #[test]
    fn test_direct_body_uses_media_type() {
        let raw = mapping([("schema", "user")]);
        let keyed = bodies(&raw, Some("application/json")).unwrap();
        assert_eq!(keyed, mapping([("application/json", raw.clone())]));
        assert!(matches!(bodies(&raw, None), Err(RamlError::Structural(_))));
    }

    #[test]
    fn test_keyed_body_blank_entries_become_null() {
        let raw = mapping([
            ("application/json", Value::Map(Mapping::new())),
            ("text/xml", mapping([("schema", "x")])),
        ]);
        let keyed = bodies(&raw, None).unwrap();
        let map = keyed.as_map().unwrap();
        assert_eq!(map[&Key::from("application/json")], Value::Null);
        assert!(map[&Key::from("text/xml")].as_map().is_some());
    }

    #[test]
    fn test_response_codes_must_be_numeric() {
        let raw = mapping([("200", Value::Null)]);
        let normalized = responses(&raw, None).unwrap();
        assert_eq!(
            normalized.as_map().unwrap().get(&Key::Int(200)),
            Some(&Value::Null)
        );

        let raw = mapping([("ok", Value::Null)]);
        assert!(matches!(responses(&raw, None), Err(RamlError::Structural(_))));
    }

    #[test]
    fn test_method_must_be_mapping() {
        assert_eq!(method("get", &Value::Null, None).unwrap(), Value::Null);
        assert_eq!(
            method("get", &Value::Map(Mapping::new()), None).unwrap(),
            Value::Null
        );
        assert!(matches!(
            method("get", &Value::from("oops"), None),
            Err(RamlError::Structural(_))
        ));
    }

    #[test]
    fn test_title_is_required() {
        let err = parser().parse("#%RAML 0.8\nbaseUri: http://x\n", ".").unwrap_err();
        assert!(matches!(err, RamlError::Structural(_)));
        let err = parser().parse("#%RAML 0.8\ntitle: \"\"\n", ".").unwrap_err();
        assert!(matches!(err, RamlError::Structural(_)));
    }

    #[test]
    fn test_numeric_title_becomes_string() {
        let doc = parser().parse("#%RAML 0.8\ntitle: 42\n", ".").unwrap();
        assert_eq!(doc.title(), "42");
    }

    #[test]
    fn test_float_scalars_keep_their_text() {
        let doc = parser()
            .parse("#%RAML 0.8\ntitle: 1.0\nversion: 1.0\n", ".")
            .unwrap();
        assert_eq!(doc.title(), "1.0");
        assert_eq!(doc.version().as_deref(), Some("1.0"));
    }

    #[test]
    fn test_null_protocols_derive_from_base_uri() {
        let doc = parser()
            .parse("#%RAML 0.8\ntitle: T\nbaseUri: https://x.com\nprotocols:\n", ".")
            .unwrap();
        assert_eq!(doc.protocols(), Some(vec!["HTTPS"]));
    }

    #[test]
    fn test_response_codes_are_unique_after_normalisation() {
        let raw = mapping([
            (Key::Int(200), mapping([("description", "int")])),
            (Key::from("200"), mapping([("description", "str")])),
        ]);
        let err = responses(&raw, None).unwrap_err();
        assert!(matches!(err, RamlError::DuplicateKey(code) if code == "200"));

        let doc = "#%RAML 0.8\ntitle: T\n/a:\n  get:\n    responses:\n      200:\n        description: int\n      \"200\":\n        description: str\n";
        assert!(matches!(
            parser().parse(doc, "."),
            Err(RamlError::DuplicateKey(code)) if code == "200"
        ));
    }
}
