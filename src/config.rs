//! Service configuration
//!
//! Layered, lowest priority first: an optional TOML file, `HOUSE_PRICE__*`
//! environment variables, then the plain `API_TITLE` / `API_DESCRIPTION` /
//! `API_VERSION` variables. Command line flags are applied by the binary.
//!
//! Variables from a `.env` file in the working directory count as
//! environment variables, but never shadow ones set in the process.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, Map};
use serde::Deserialize;

use crate::artifact::{LoaderOptions, DEFAULT_FILE_STEM, DEFAULT_SEARCH_DIRECTORY};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const ENV_PREFIX: &str = "HOUSE_PRICE";
pub const DOTENV_PATH: &str = ".env";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// actix worker count, defaults to the number of cores
    #[serde(default)]
    pub workers: Option<usize>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Artifact lookup configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Explicit artifact path, tried first
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_search_directories")]
    pub search_directories: Vec<PathBuf>,
    #[serde(default = "default_file_stem")]
    pub file_stem: String,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_true")]
    pub scan_directories: bool,
}

fn default_search_directories() -> Vec<PathBuf> {
    vec![PathBuf::from(DEFAULT_SEARCH_DIRECTORY)]
}

fn default_file_stem() -> String {
    DEFAULT_FILE_STEM.to_string()
}

fn default_extensions() -> Vec<String> {
    vec!["json".to_string(), "onnx".to_string()]
}

fn default_true() -> bool {
    true
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            search_directories: default_search_directories(),
            file_stem: default_file_stem(),
            extensions: default_extensions(),
            scan_directories: true,
        }
    }
}

impl ModelConfig {
    /// Loader options rooted at the process working and install dirs.
    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions {
            explicit_path: self.path.clone(),
            search_directories: self.search_directories.clone(),
            file_stem: self.file_stem.clone(),
            extensions: self.extensions.clone(),
            scan_directories: self.scan_directories,
            ..LoaderOptions::default()
        }
    }
}

/// Metadata reported by `/info`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_title() -> String {
    "California House Price Prediction API".to_string()
}

fn default_description() -> String {
    "API for predicting house prices using a pre-trained machine learning model".to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            description: default_description(),
            version: default_version(),
        }
    }
}

/// Log output besides stdout
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// File the log is appended to; empty disables it.
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
}

fn default_log_file() -> PathBuf {
    PathBuf::from("app.log")
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
        }
    }
}

impl LogConfig {
    pub fn file(&self) -> Option<&Path> {
        Some(self.file.as_path()).filter(|p| !p.as_os_str().is_empty())
    }
}

/// Reads `KEY=value` lines. A missing file yields no variables.
pub fn read_dotenv(path: &Path) -> Result<Map<String, String>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };

    let mut vars = Map::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let (key, value) = line
            .split_once('=')
            .with_context(|| format!("{}:{}: expected KEY=value", path.display(), n + 1))?;
        let value = value.trim();
        let value = ['"', '\'']
            .iter()
            .find_map(|q| value.strip_prefix(*q).and_then(|v| v.strip_suffix(*q)))
            .unwrap_or(value);
        vars.insert(key.trim().to_string(), value.to_string());
    }
    Ok(vars)
}

impl AppConfig {
    /// Load from `path`, or from `config/default.toml` if it exists, with
    /// the process environment layered over `.env`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut vars = read_dotenv(Path::new(DOTENV_PATH))?;
        vars.extend(env::vars());
        Self::load_with_vars(path, vars)
    }

    /// Same as [`AppConfig::load`] with an explicit set of environment variables.
    pub fn load_with_vars(path: Option<&Path>, vars: Map<String, String>) -> Result<Self> {
        let var = |key: &str| vars.get(key).cloned();
        let file = match path {
            Some(path) => File::from(path),
            None => File::from(Path::new(DEFAULT_CONFIG_PATH)).required(false),
        };

        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars.clone())),
            )
            .set_override_option("api.title", var("API_TITLE"))?
            .set_override_option("api.description", var("API_DESCRIPTION"))?
            .set_override_option("api.version", var("API_VERSION"))?
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.addr(), "127.0.0.1:8000");
        assert_eq!(config.model.file_stem, "best_house_price_model");
        assert_eq!(config.api.version, "1.0.0");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9100

[model]
path = "/models/house.json"
extensions = ["json"]
scan_directories = false
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.model.path, Some(PathBuf::from("/models/house.json")));
        assert_eq!(config.model.search_directories, vec![PathBuf::from("notebook")]);

        let opts = config.model.loader_options();
        assert_eq!(opts.extensions, vec!["json".to_string()]);
        assert!(!opts.scan_directories);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AppConfig::load(Some(Path::new("/nonexistent/service.toml"))).is_err());
    }

    #[test]
    fn test_environment_layers() {
        let vars = Map::from([
            ("HOUSE_PRICE__SERVER__PORT".to_string(), "9200".to_string()),
            ("HOUSE_PRICE__MODEL__PATH".to_string(), "models/x.onnx".to_string()),
            ("API_TITLE".to_string(), "Staging".to_string()),
        ]);
        let config = AppConfig::load_with_vars(Some(Path::new("config/default.toml")), vars).unwrap();
        assert_eq!(config.server.port, 9200);
        assert_eq!(config.model.path, Some(PathBuf::from("models/x.onnx")));
        assert_eq!(config.api.title, "Staging");
        assert_eq!(config.api.version, "1.0.0");
        assert_eq!(config.log.file(), Some(Path::new("app.log")));
    }

    #[test]
    fn test_read_dotenv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "# local overrides\nAPI_TITLE=\"Local API\"\n\nexport HOUSE_PRICE__LOG__FILE=\nAPI_VERSION = '2.0'\n",
        )
        .unwrap();

        let vars = read_dotenv(&path).unwrap();
        assert_eq!(vars["API_TITLE"], "Local API");
        assert_eq!(vars["API_VERSION"], "2.0");
        assert_eq!(vars["HOUSE_PRICE__LOG__FILE"], "");

        let config = AppConfig::load_with_vars(None, vars).unwrap();
        assert_eq!(config.api.title, "Local API");
        assert_eq!(config.log.file(), None);

        assert!(read_dotenv(&dir.path().join("absent.env")).unwrap().is_empty());
        std::fs::write(&path, "NOT A PAIR\n").unwrap();
        assert!(read_dotenv(&path).is_err());
    }
}
