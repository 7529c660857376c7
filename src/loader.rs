//! Document Loader
//!
//! Resolves a URI to raw text plus a content type. Network URIs with an
//! allowed scheme go through a [`Transport`]; everything else is a local
//! path whose content type is guessed from its extension.

use reqwest::blocking::Client;
use reqwest::Url;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::config::{ParserConfig, DEFAULT_MIME_TYPE};
use crate::error::{RamlError, Result};

/// MIME types whose content is re-parsed as RAML/YAML when included
pub const RAML_MIME_TYPES: &[&str] = &[
    "application/raml+yaml",
    "text/yaml",
    "text/x-yaml",
    "application/yaml",
    "application/x-yaml",
];

pub const JSON_MIME_TYPE: &str = "application/json";

pub fn is_raml_mime(content_type: &str) -> bool {
    RAML_MIME_TYPES.contains(&content_type)
}

pub fn is_json_mime(content_type: &str) -> bool {
    content_type == JSON_MIME_TYPE
}

/// Raw document text and its content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub text: String,
    pub content_type: String,
}

// =============================================================================
// Transport
// =============================================================================

/// Network fetch. One attempt; any failure is final.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<Fetched>;
}

/// Blocking HTTP(S) transport with a bounded timeout
pub struct HttpTransport {
    timeout: Duration,
    user_agent: String,
    client: OnceLock<Client>,
}

impl HttpTransport {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            timeout: config.loader.fetch_timeout(),
            user_agent: config.loader.user_agent.clone(),
            client: OnceLock::new(),
        }
    }

    fn client(&self, url: &str) -> Result<&Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .connect_timeout(self.timeout)
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(|e| RamlError::Fetch {
                uri: url.to_string(),
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(self.client.get_or_init(|| client))
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Fetched> {
        let fetch_error = |e: reqwest::Error| RamlError::Fetch {
            uri: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client(url)?.get(url).send().map_err(fetch_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(RamlError::HttpStatus {
                uri: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(media_type)
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
        let text = response.text().map_err(fetch_error)?;

        Ok(Fetched { text, content_type })
    }
}

/// Media type of a Content-Type header value, without parameters
fn media_type(header: &str) -> String {
    header
        .split(';')
        .next()
        .unwrap_or(header)
        .trim()
        .to_ascii_lowercase()
}

// =============================================================================
// Loader
// =============================================================================

/// Loads documents and resolves relative include targets
pub struct DocumentLoader {
    config: ParserConfig,
    transport: Box<dyn Transport>,
}

impl DocumentLoader {
    pub fn new(config: ParserConfig) -> Self {
        let transport = HttpTransport::new(&config);
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: ParserConfig, transport: impl Transport + 'static) -> Self {
        Self {
            config,
            transport: Box::new(transport),
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Load a document by URI or local path
    pub fn load(&self, uri: &str) -> Result<Fetched> {
        if let Some(url) = parse_url(uri) {
            let scheme = url.scheme();
            if self.config.loader.allows_scheme(scheme) {
                let fetched = self.transport.get(uri)?;
                tracing::debug!(
                    uri,
                    content_type = %fetched.content_type,
                    bytes = fetched.text.len(),
                    "fetched remote document"
                );
                return Ok(fetched);
            }
            if scheme == "file" {
                let path = url.to_file_path().map_err(|_| RamlError::InvalidUri {
                    uri: uri.to_string(),
                    message: "not a local file path".to_string(),
                })?;
                return self.load_file(&path.to_string_lossy());
            }
        }
        self.load_file(uri)
    }

    fn load_file(&self, path: &str) -> Result<Fetched> {
        if !Path::new(path).is_file() {
            return Err(RamlError::NotFound(path.to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let content_type = self.config.mime_types.guess(path).to_string();
        tracing::debug!(
            path,
            content_type = %content_type,
            bytes = text.len(),
            "loaded local document"
        );
        Ok(Fetched { text, content_type })
    }

    /// Resolve an include target against the directory of the including
    /// document
    pub fn resolve(&self, base: &str, name: &str) -> Result<String> {
        if parse_url(name).is_some() {
            return Ok(name.to_string());
        }
        if let Some(base_url) = self.network_url(base) {
            return base_url
                .join(name)
                .map(String::from)
                .map_err(|e| RamlError::InvalidUri {
                    uri: name.to_string(),
                    message: e.to_string(),
                });
        }
        Ok(Path::new(base).join(name).to_string_lossy().into_owned())
    }

    /// Directory a document's own includes are resolved against. Network
    /// parents keep their trailing slash so further joins stay inside them.
    pub fn parent(&self, uri: &str) -> Result<String> {
        if let Some(url) = self.network_url(uri) {
            return url
                .join("./")
                .map(String::from)
                .map_err(|e| RamlError::InvalidUri {
                    uri: uri.to_string(),
                    message: e.to_string(),
                });
        }
        let parent = Path::new(uri)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Ok(parent.to_string_lossy().into_owned())
    }

    /// Stable identity of a document, used to detect include cycles
    pub fn canonical(&self, uri: &str) -> String {
        if let Some(url) = parse_url(uri) {
            return url.to_string();
        }
        std::fs::canonicalize(uri)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| uri.to_string())
    }

    fn network_url(&self, uri: &str) -> Option<Url> {
        parse_url(uri).filter(|url| self.config.loader.allows_scheme(url.scheme()))
    }
}

/// Parse as an absolute URL. Single-letter schemes are drive letters.
fn parse_url(uri: &str) -> Option<Url> {
    Url::parse(uri).ok().filter(|url| url.scheme().len() > 1)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory transport keyed by URL
    #[derive(Default)]
    pub(crate) struct MockTransport {
        documents: HashMap<String, Fetched>,
        pub(crate) requests: Mutex<Vec<String>>,
    }

    impl MockTransport {
        pub(crate) fn with(mut self, url: &str, content_type: &str, text: &str) -> Self {
            self.documents.insert(
                url.to_string(),
                Fetched {
                    text: text.to_string(),
                    content_type: content_type.to_string(),
                },
            );
            self
        }
    }

    impl Transport for MockTransport {
        fn get(&self, url: &str) -> Result<Fetched> {
            self.requests.lock().unwrap().push(url.to_string());
            self.documents
                .get(url)
                .cloned()
                .ok_or_else(|| RamlError::HttpStatus {
                    uri: url.to_string(),
                    status: 404,
                })
        }
    }

    fn loader() -> DocumentLoader {
        DocumentLoader::with_transport(
            ParserConfig::default(),
            MockTransport::default().with("http://example.com/api/types.raml", "text/yaml", "a: 1"),
        )
    }

    #[test]
    fn test_load_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(&path, "{}").unwrap();

        let fetched = loader().load(path.to_str().unwrap()).unwrap();
        assert_eq!(fetched.text, "{}");
        assert_eq!(fetched.content_type, "application/json");
    }

    #[test]
    fn test_load_missing_file() {
        let err = loader().load("/no/such/file.raml").unwrap_err();
        assert!(matches!(err, RamlError::NotFound(path) if path == "/no/such/file.raml"));
    }

    #[test]
    fn test_load_network_uses_transport() {
        let fetched = loader().load("http://example.com/api/types.raml").unwrap();
        assert_eq!(fetched.content_type, "text/yaml");
        assert_eq!(fetched.text, "a: 1");

        let err = loader().load("https://example.com/missing").unwrap_err();
        assert!(matches!(err, RamlError::HttpStatus { status: 404, .. }));
    }

    #[test]
    fn test_unlisted_scheme_is_a_local_path() {
        let err = loader().load("ftp://example.com/api.raml").unwrap_err();
        assert!(matches!(err, RamlError::NotFound(p) if p == "ftp://example.com/api.raml"));
    }

    #[test]
    fn test_load_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.raml");
        std::fs::write(&path, "#%RAML 0.8\n").unwrap();
        let url = Url::from_file_path(&path).unwrap();

        let fetched = loader().load(url.as_str()).unwrap();
        assert_eq!(fetched.content_type, "application/raml+yaml");
    }

    #[test]
    fn test_resolve_local_and_network() {
        let loader = loader();
        assert_eq!(
            loader.resolve("/data/api", "schemas/user.json").unwrap(),
            Path::new("/data/api").join("schemas/user.json").to_string_lossy()
        );
        assert_eq!(
            loader.resolve("http://example.com/api/", "types.raml").unwrap(),
            "http://example.com/api/types.raml"
        );
        assert_eq!(
            loader
                .resolve("/data/api", "https://example.com/x.raml")
                .unwrap(),
            "https://example.com/x.raml"
        );
    }

    #[test]
    fn test_parent_keeps_network_directory() {
        let loader = loader();
        let parent = loader.parent("http://example.com/api/v1/root.raml").unwrap();
        assert_eq!(parent, "http://example.com/api/v1/");
        assert_eq!(
            loader.resolve(&parent, "nested/types.raml").unwrap(),
            "http://example.com/api/v1/nested/types.raml"
        );

        assert_eq!(loader.parent("api.raml").unwrap(), ".");
        assert_eq!(
            loader.parent("/data/api/root.raml").unwrap(),
            Path::new("/data/api").to_string_lossy()
        );
    }

    #[test]
    fn test_media_type() {
        assert_eq!(media_type("application/json; charset=utf-8"), "application/json");
        assert_eq!(media_type("Text/YAML"), "text/yaml");
    }

    #[test]
    fn test_mime_kinds() {
        assert!(is_raml_mime("application/raml+yaml"));
        assert!(is_raml_mime("text/yaml"));
        assert!(!is_raml_mime("application/json"));
        assert!(is_json_mime("application/json"));
    }
}
