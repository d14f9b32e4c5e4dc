//! Configuration loading and upload directory initialization
//!
//! Every setting is resolved in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the upload directory
pub const ENV_UPLOAD_DIR: &str = "MD2PPTX_UPLOAD_DIR";
/// Environment variable overriding the bind host
pub const ENV_HOST: &str = "MD2PPTX_HOST";
/// Environment variable overriding the HTTP port
pub const ENV_PORT: &str = "MD2PPTX_PORT";
/// Environment variable overriding the converter executable
pub const ENV_CONVERTER: &str = "MD2PPTX_CONVERTER";
/// Environment variable pointing at an explicit TOML config file
pub const ENV_CONFIG_FILE: &str = "MD2PPTX_CONFIG";

/// Built-in defaults used when no other source provides a value
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub upload_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub converter_program: String,
    pub converter_timeout: Duration,
    pub cleanup_delay: Duration,
    pub max_upload_bytes: usize,
    pub log_level: String,
}

impl Default for CompiledDefaults {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            host: "127.0.0.1".to_string(),
            port: 5000,
            converter_program: "marp".to_string(),
            converter_timeout: Duration::from_secs(120),
            cleanup_delay: Duration::from_secs(5),
            max_upload_bytes: 10 * 1024 * 1024,
            log_level: "info".to_string(),
        }
    }
}

/// Bootstrap configuration loaded from TOML file
///
/// All fields are optional; anything missing falls through to
/// [`CompiledDefaults`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Directory where uploads are staged and decks are generated
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,

    /// Address to bind the HTTP server to
    #[serde(default)]
    pub host: Option<String>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Maximum accepted request body size in bytes
    #[serde(default)]
    pub max_upload_bytes: Option<usize>,

    #[serde(default)]
    pub converter: ConverterSection,

    #[serde(default)]
    pub cleanup: CleanupSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[converter]` table
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConverterSection {
    /// Executable name (looked up on PATH) or path to the converter
    #[serde(default)]
    pub program: Option<String>,

    /// Upper bound on a single conversion, in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// `[cleanup]` table
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CleanupSection {
    /// Grace period before staged files are deleted, in seconds
    #[serde(default)]
    pub delay_secs: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default)]
    pub level: Option<String>,
}

impl TomlConfig {
    /// Parse TOML text into a config
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Read and parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read TOML failed ({}): {}", path.display(), e))
        })?;
        Self::parse(&content)
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_file: Option<PathBuf>,
    pub upload_dir: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub converter: Option<String>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub upload_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub converter_program: String,
    pub converter_timeout: Duration,
    pub cleanup_delay: Duration,
    pub max_upload_bytes: usize,
    pub log_level: String,
    /// TOML file the configuration was read from, if any
    pub config_file: Option<PathBuf>,
}

impl ServiceConfig {
    /// Resolve configuration from CLI, environment, TOML file and defaults
    ///
    /// A config file named explicitly (CLI or `MD2PPTX_CONFIG`) must exist.
    /// Otherwise the platform default locations are searched and a missing
    /// file simply means "use defaults".
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let explicit = cli
            .config_file
            .clone()
            .or_else(|| std::env::var_os(ENV_CONFIG_FILE).map(PathBuf::from));

        let (toml_config, config_file) = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                (TomlConfig::from_file(&path)?, Some(path))
            }
            None => match default_config_file() {
                Some(path) => (TomlConfig::from_file(&path)?, Some(path)),
                None => (TomlConfig::default(), None),
            },
        };

        let mut config = Self::from_sources(cli, &toml_config, &CompiledDefaults::default())?;
        config.config_file = config_file;
        Ok(config)
    }

    /// Merge already-loaded sources; environment variables are read here
    pub fn from_sources(
        cli: &CliOverrides,
        toml_config: &TomlConfig,
        defaults: &CompiledDefaults,
    ) -> Result<Self> {
        let upload_dir = cli
            .upload_dir
            .clone()
            .or_else(|| env_non_empty(ENV_UPLOAD_DIR).map(PathBuf::from))
            .or_else(|| toml_config.upload_dir.clone())
            .unwrap_or_else(|| defaults.upload_dir.clone());

        let host = cli
            .host
            .clone()
            .or_else(|| env_non_empty(ENV_HOST))
            .or_else(|| toml_config.host.clone())
            .unwrap_or_else(|| defaults.host.clone());

        let env_port = match env_non_empty(ENV_PORT) {
            Some(value) => Some(value.parse::<u16>().map_err(|e| {
                Error::Config(format!("Invalid {} '{}': {}", ENV_PORT, value, e))
            })?),
            None => None,
        };
        let port = cli
            .port
            .or(env_port)
            .or(toml_config.port)
            .unwrap_or(defaults.port);

        let converter_program = cli
            .converter
            .clone()
            .or_else(|| env_non_empty(ENV_CONVERTER))
            .or_else(|| toml_config.converter.program.clone())
            .unwrap_or_else(|| defaults.converter_program.clone());

        let converter_timeout = toml_config
            .converter
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.converter_timeout);
        if converter_timeout.is_zero() {
            return Err(Error::Config(
                "converter.timeout_secs must be greater than zero".to_string(),
            ));
        }

        let cleanup_delay = toml_config
            .cleanup
            .delay_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.cleanup_delay);

        let max_upload_bytes = toml_config
            .max_upload_bytes
            .unwrap_or(defaults.max_upload_bytes);

        let log_level = toml_config
            .logging
            .level
            .clone()
            .unwrap_or_else(|| defaults.log_level.clone());

        Ok(Self {
            upload_dir,
            host,
            port,
            converter_program,
            converter_timeout,
            cleanup_delay,
            max_upload_bytes,
            log_level,
            config_file: None,
        })
    }

    /// `host:port` string suitable for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Locate the platform config file, if one exists
///
/// Linux checks `~/.config/md2pptx/config.toml` then `/etc/md2pptx/config.toml`;
/// other platforms only check the user config directory.
pub fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("md2pptx").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/md2pptx/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Creates the upload directory on startup
pub struct UploadDirInitializer {
    upload_dir: PathBuf,
}

impl UploadDirInitializer {
    pub fn new(upload_dir: PathBuf) -> Self {
        Self { upload_dir }
    }

    /// Create the directory (and parents) if missing
    ///
    /// Returns `true` when the directory had to be created. Fails if the path
    /// exists but is not a directory.
    pub fn ensure_directory_exists(&self) -> Result<bool> {
        if self.upload_dir.is_dir() {
            return Ok(false);
        }
        if self.upload_dir.exists() {
            return Err(Error::Config(format!(
                "Upload path exists but is not a directory: {}",
                self.upload_dir.display()
            )));
        }

        std::fs::create_dir_all(&self.upload_dir)?;
        tracing::info!("Created upload directory: {}", self.upload_dir.display());
        Ok(true)
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_toml() {
        let config = TomlConfig::parse(
            r#"
            upload_dir = "/srv/decks"
            host = "0.0.0.0"
            port = 8080
            max_upload_bytes = 2048

            [converter]
            program = "/opt/marp/bin/marp"
            timeout_secs = 30

            [cleanup]
            delay_secs = 10

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.upload_dir, Some(PathBuf::from("/srv/decks")));
        assert_eq!(config.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(config.port, Some(8080));
        assert_eq!(config.max_upload_bytes, Some(2048));
        assert_eq!(config.converter.program.as_deref(), Some("/opt/marp/bin/marp"));
        assert_eq!(config.converter.timeout_secs, Some(30));
        assert_eq!(config.cleanup.delay_secs, Some(10));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_parse_empty_toml_uses_no_values() {
        let config = TomlConfig::parse("").unwrap();
        assert!(config.upload_dir.is_none());
        assert!(config.converter.program.is_none());
        assert!(config.cleanup.delay_secs.is_none());
    }

    #[test]
    fn test_parse_malformed_toml_is_config_error() {
        let err = TomlConfig::parse("port = \"not a number\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_compiled_defaults() {
        let defaults = CompiledDefaults::default();
        assert_eq!(defaults.port, 5000);
        assert_eq!(defaults.converter_program, "marp");
        assert_eq!(defaults.cleanup_delay, Duration::from_secs(5));
        assert_eq!(defaults.log_level, "info");
    }
}
