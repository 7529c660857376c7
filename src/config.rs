//! Configuration management for the RAML parser
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (raml.toml)
//! - Environment variables (RAML__*)
//!
//! ## Example config file (raml.toml):
//! ```toml
//! [raml]
//! supported_version = "0.8"
//!
//! [loader]
//! allowed_schemes = ["http", "https"]
//! fetch_timeout_secs = 60
//! max_include_depth = 64
//!
//! [mime_types.extensions]
//! graphql = "application/graphql"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Main configuration for a parser session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParserConfig {
    /// RAML language settings
    #[serde(default)]
    pub raml: RamlConfig,

    /// Document loader settings
    #[serde(default)]
    pub loader: LoaderConfig,

    /// File extension to MIME type overrides
    #[serde(default)]
    pub mime_types: MimeTypeConfig,
}

/// RAML language configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RamlConfig {
    /// Highest `#%RAML <major>.<minor>` version accepted
    #[serde(default = "default_supported_version")]
    pub supported_version: String,
}

/// Document loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// URI schemes fetched over the network
    #[serde(default = "default_allowed_schemes")]
    pub allowed_schemes: Vec<String>,

    /// Timeout for a single network fetch
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Maximum nesting of `!include` directives
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,

    /// User agent sent with network fetches
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Extension to MIME type table
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MimeTypeConfig {
    /// Overrides consulted before the built-in table. Keys are extensions
    /// without the leading dot.
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

// Default value functions
fn default_supported_version() -> String {
    "0.8".to_string()
}

fn default_allowed_schemes() -> Vec<String> {
    vec!["http".to_string(), "https".to_string()]
}

fn default_fetch_timeout_secs() -> u64 {
    60
}

fn default_max_include_depth() -> usize {
    64
}

fn default_user_agent() -> String {
    format!("raml-parser/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for RamlConfig {
    fn default() -> Self {
        Self {
            supported_version: default_supported_version(),
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            allowed_schemes: default_allowed_schemes(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_include_depth: default_max_include_depth(),
            user_agent: default_user_agent(),
        }
    }
}

/// Built-in extension table, consulted after the configured overrides
const BUILTIN_MIME_TYPES: &[(&str, &str)] = &[
    ("raml", "application/raml+yaml"),
    ("yaml", "text/yaml"),
    ("yml", "text/yaml"),
    ("json", "application/json"),
    ("schema", "application/json"),
    ("xml", "application/xml"),
    ("xsd", "application/xml"),
    ("md", "text/markdown"),
    ("txt", "text/plain"),
];

pub const DEFAULT_MIME_TYPE: &str = "text/plain";

impl MimeTypeConfig {
    /// Guess the MIME type of a file name from its extension
    pub fn guess(&self, file_name: &str) -> &str {
        let extension = match Path::new(file_name).extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => return DEFAULT_MIME_TYPE,
        };
        if let Some(mime) = self.extensions.get(&extension) {
            return mime;
        }
        BUILTIN_MIME_TYPES
            .iter()
            .find(|(ext, _)| *ext == extension)
            .map(|(_, mime)| *mime)
            .unwrap_or(DEFAULT_MIME_TYPE)
    }
}

impl LoaderConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn allows_scheme(&self, scheme: &str) -> bool {
        self.allowed_schemes
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(scheme))
    }
}

impl ParserConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["raml.toml", ".raml.toml", "config/raml.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("org", "raml", "raml-parser") {
            let xdg_config = config_dir.config_dir().join("raml.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (RAML__*)
        builder = builder.add_source(
            Environment::with_prefix("RAML")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Supported `(major, minor)` version. An unparseable setting falls back
    /// to 0.8.
    pub fn supported_version(&self) -> (u32, u32) {
        parse_version(&self.raml.supported_version).unwrap_or((0, 8))
    }
}

/// Parse `major.minor`
pub(crate) fn parse_version(version: &str) -> Option<(u32, u32)> {
    let (major, minor) = version.split_once('.')?;
    Some((major.trim().parse().ok()?, minor.trim().parse().ok()?))
}
