//! Parse Context & Include Expansion
//!
//! A [`ParseContext`] holds one parsed YAML tree and the directory its
//! relative includes resolve against. Expansion walks the tree depth-first,
//! replaces every `!include` node with the loaded document and lifts the
//! result into [`Value`]s. Mapping order is kept throughout.
//!
//! Included documents with a RAML/YAML content type are parsed and expanded
//! in turn against their own directory. JSON documents become
//! [`Value::IncludedJson`]; anything else is substituted as a string.

use serde_yaml::Value as Yaml;

use crate::error::{RamlError, Result};
use crate::loader::{is_json_mime, is_raml_mime, DocumentLoader};
use crate::schema::{Key, Mapping, Value};

const INCLUDE_TAG: &str = "include";

/// One parsed container plus its resolution base
#[derive(Debug, Clone)]
pub struct ParseContext {
    data: Yaml,
    base: String,
    source: Option<String>,
}

impl ParseContext {
    pub fn new(data: Yaml, base: impl Into<String>) -> Self {
        Self {
            data,
            base: base.into(),
            source: None,
        }
    }

    /// Record the document this tree was read from, so that including it
    /// again from within is reported as a cycle
    pub fn with_source(mut self, uri: impl Into<String>) -> Self {
        self.source = Some(uri.into());
        self
    }

    pub fn data(&self) -> &Yaml {
        &self.data
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Expand every include and lift the tree into values
    pub fn expand(&self, loader: &DocumentLoader) -> Result<Value> {
        let mut expander = Expander {
            loader,
            chain: Vec::new(),
            max_depth: loader.config().loader.max_include_depth,
        };
        if let Some(source) = &self.source {
            expander.chain.push(loader.canonical(source));
        }
        expander.expand(&self.data, &self.base, 0)
    }
}

struct Expander<'a> {
    loader: &'a DocumentLoader,
    /// Documents currently being expanded, outermost first
    chain: Vec<String>,
    max_depth: usize,
}

impl Expander<'_> {
    fn expand(&mut self, node: &Yaml, base: &str, depth: usize) -> Result<Value> {
        match node {
            Yaml::Null => Ok(Value::Null),
            Yaml::Bool(b) => Ok(Value::Bool(*b)),
            Yaml::Number(n) => Ok(match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            Yaml::String(s) => Ok(Value::Str(s.clone())),
            Yaml::Sequence(items) => items
                .iter()
                .map(|item| self.expand(item, base, depth))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            Yaml::Mapping(map) => {
                let mut expanded = Mapping::with_capacity(map.len());
                for (key, value) in map {
                    expanded.insert(lift_key(key)?, self.expand(value, base, depth)?);
                }
                Ok(Value::Map(expanded))
            }
            Yaml::Tagged(tagged) if tagged.tag == INCLUDE_TAG => match &tagged.value {
                Yaml::String(name) => self.include(name, base, depth),
                other => Err(RamlError::structural(format!(
                    "!include expects a file name, got {:?}",
                    other
                ))),
            },
            // Unknown tags are transparent
            Yaml::Tagged(tagged) => self.expand(&tagged.value, base, depth),
        }
    }

    fn include(&mut self, name: &str, base: &str, depth: usize) -> Result<Value> {
        let uri = self.loader.resolve(base, name)?;
        let fetched = self.loader.load(&uri)?;
        tracing::debug!(
            include = name,
            uri = %uri,
            content_type = %fetched.content_type,
            "resolved include"
        );

        if is_raml_mime(&fetched.content_type) {
            if depth >= self.max_depth {
                return Err(RamlError::IncludeDepth(self.max_depth));
            }
            let canonical = self.loader.canonical(&uri);
            if self.chain.contains(&canonical) {
                let mut cycle = self.chain.clone();
                cycle.push(canonical);
                return Err(RamlError::IncludeCycle(cycle.join(" -> ")));
            }

            let data: Yaml = serde_yaml::from_str(&fetched.text)?;
            let nested_base = self.loader.parent(&uri)?;
            self.chain.push(canonical);
            let expanded = self.expand(&data, &nested_base, depth + 1);
            self.chain.pop();
            expanded
        } else if is_json_mime(&fetched.content_type) {
            Ok(Value::IncludedJson {
                file_name: name.to_string(),
                content: fetched.text,
            })
        } else {
            Ok(Value::Str(fetched.text))
        }
    }
}

fn lift_key(key: &Yaml) -> Result<Key> {
    match key {
        Yaml::Null => Ok(Key::Null),
        Yaml::Bool(b) => Ok(Key::Bool(*b)),
        Yaml::Number(n) => Ok(match n.as_i64() {
            Some(i) => Key::Int(i),
            None => Key::Str(n.to_string()),
        }),
        Yaml::String(s) => Ok(Key::Str(s.clone())),
        other => Err(RamlError::structural(format!(
            "unsupported mapping key {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParserConfig;
    use crate::loader::tests::MockTransport;
    use std::fs;
    use std::path::Path;

    fn expand_file(dir: &Path, file: &str) -> Result<Value> {
        let path = dir.join(file);
        let text = fs::read_to_string(&path).unwrap();
        let data: Yaml = serde_yaml::from_str(&text)?;
        let loader = DocumentLoader::new(ParserConfig::default());
        ParseContext::new(data, dir.to_string_lossy())
            .with_source(path.to_string_lossy())
            .expand(&loader)
    }

    #[test]
    fn test_plain_tree_keeps_order_and_keys() {
        let data: Yaml = serde_yaml::from_str("b: 1\na: [x, 2.5]\n200: ok\n").unwrap();
        let loader = DocumentLoader::new(ParserConfig::default());
        let value = ParseContext::new(data, ".").expand(&loader).unwrap();
        let map = value.as_map().unwrap();
        let keys: Vec<&Key> = map.keys().collect();
        assert_eq!(keys, vec![&Key::from("b"), &Key::from("a"), &Key::Int(200)]);
        assert_eq!(
            map[&Key::from("a")],
            Value::List(vec!["x".into(), Value::Float(2.5)])
        );
    }

    #[test]
    fn test_nested_includes_are_fully_resolved() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(
            dir.path().join("a.yaml"),
            "title: T\ndocumentation: !include docs/b.yaml\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("docs/b.yaml"),
            "- title: Intro\n  content: !include c.md\n- title: Plain\n  content: text\n",
        )
        .unwrap();
        fs::write(dir.path().join("docs/c.md"), "Welcome").unwrap();

        let value = expand_file(dir.path(), "a.yaml").unwrap();
        let docs = value.as_map().unwrap()[&Key::from("documentation")]
            .as_list()
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(
            docs[0].as_map().unwrap()[&Key::from("content")],
            Value::from("Welcome")
        );
    }

    #[test]
    fn test_json_include_is_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("root.yaml"), "example: !include ex.json\n").unwrap();
        fs::write(dir.path().join("ex.json"), r#"{"foo": "bar"}"#).unwrap();

        let value = expand_file(dir.path(), "root.yaml").unwrap();
        assert_eq!(
            value.as_map().unwrap()[&Key::from("example")],
            Value::IncludedJson {
                file_name: "ex.json".to_string(),
                content: r#"{"foo": "bar"}"#.to_string(),
            }
        );
    }

    #[test]
    fn test_missing_include() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("root.yaml"), "x: !include nope.yaml\n").unwrap();
        let err = expand_file(dir.path(), "root.yaml").unwrap_err();
        assert!(matches!(err, RamlError::NotFound(_)));
    }

    #[test]
    fn test_include_cycle_detected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.yaml"), "next: !include b.yaml\n").unwrap();
        fs::write(dir.path().join("b.yaml"), "next: !include a.yaml\n").unwrap();

        let err = expand_file(dir.path(), "a.yaml").unwrap_err();
        match err {
            RamlError::IncludeCycle(chain) => {
                assert!(chain.contains("a.yaml -> "));
                assert!(chain.ends_with("a.yaml"));
            }
            other => panic!("expected include cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_same_file_included_twice_is_not_a_cycle() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("root.yaml"),
            "one: !include shared.yaml\ntwo: !include shared.yaml\n",
        )
        .unwrap();
        fs::write(dir.path().join("shared.yaml"), "value: 1\n").unwrap();

        let value = expand_file(dir.path(), "root.yaml").unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map[&Key::from("one")], map[&Key::from("two")]);
    }

    #[test]
    fn test_include_depth_limit() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..4 {
            fs::write(
                dir.path().join(format!("{i}.yaml")),
                format!("next: !include {}.yaml\n", i + 1),
            )
            .unwrap();
        }
        fs::write(dir.path().join("4.yaml"), "end: true\n").unwrap();

        let mut config = ParserConfig::default();
        config.loader.max_include_depth = 2;
        let loader = DocumentLoader::new(config);
        let text = fs::read_to_string(dir.path().join("0.yaml")).unwrap();
        let data: Yaml = serde_yaml::from_str(&text).unwrap();
        let err = ParseContext::new(data, dir.path().to_string_lossy())
            .expand(&loader)
            .unwrap_err();
        assert!(matches!(err, RamlError::IncludeDepth(2)));
    }

    #[test]
    fn test_duplicate_key_in_included_document() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("root.yaml"), "x: !include dup.yaml\n").unwrap();
        fs::write(dir.path().join("dup.yaml"), "a: 1\na: 2\n").unwrap();
        let err = expand_file(dir.path(), "root.yaml").unwrap_err();
        assert!(matches!(err, RamlError::DuplicateKey(key) if key == "a"));
    }

    #[test]
    fn test_network_includes_resolve_against_remote_directory() {
        let transport = MockTransport::default()
            .with(
                "http://example.com/api/types/all.raml",
                "application/raml+yaml",
                "user: !include user.schema\n",
            )
            .with(
                "http://example.com/api/types/user.schema",
                "application/json",
                r#"{"type": "object"}"#,
            );
        let loader = DocumentLoader::with_transport(ParserConfig::default(), transport);
        let data: Yaml = serde_yaml::from_str("types: !include types/all.raml\n").unwrap();
        let value = ParseContext::new(data, "http://example.com/api/")
            .expand(&loader)
            .unwrap();

        let types = value.as_map().unwrap()[&Key::from("types")].as_map().unwrap();
        assert!(matches!(
            &types[&Key::from("user")],
            Value::IncludedJson { file_name, .. } if file_name == "user.schema"
        ));
    }
}
