//! Configuration parser for loading configuration files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, Result, SiteplanError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::settings::SiteplanConfig;

/// Configuration parser for loading siteplan configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// Relative paths in the file resolve against the file's directory
    /// unless a base path was set.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<SiteplanConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(SiteplanError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            SiteplanError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        let mut config = self.parse_yaml(&content, Some(path))?;
        config.base_dir = self.base_path.clone().unwrap_or_else(|| {
            path.parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
        });
        Ok(config)
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<SiteplanConfig> {
        debug!("Parsing YAML configuration");

        let mut config: SiteplanConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            SiteplanError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        if let Some(base) = &self.base_path {
            config.base_dir.clone_from(base);
        }

        debug!("Successfully parsed configuration for org: {}", config.project.org);
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Recognized variables: `SITEPLAN_ORG`, `SITEPLAN_ENVIRONMENT`,
    /// `SITEPLAN_STATE_DIR` and `SITEPLAN_INVENTORY`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<SiteplanConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(config: &mut SiteplanConfig) {
        if let Ok(org) = std::env::var("SITEPLAN_ORG") {
            debug!("Overriding project.org from environment");
            config.project.org = org;
        }

        if let Ok(env) = std::env::var("SITEPLAN_ENVIRONMENT") {
            debug!("Overriding project.environment from environment");
            config.project.environment = env;
        }

        if let Ok(dir) = std::env::var("SITEPLAN_STATE_DIR") {
            debug!("Overriding state.dir from environment");
            config.state.dir = dir;
        }

        if let Ok(inventory) = std::env::var("SITEPLAN_INVENTORY") {
            debug!("Overriding remote.inventory from environment");
            config.remote.inventory = inventory;
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                SiteplanError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["siteplan.yaml", "siteplan.yml"];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(SiteplanError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::DependencyPolicy;
    use crate::planner::ObjectType;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
project:
  org: ACME
";
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        assert_eq!(config.project.org, "ACME");
        assert_eq!(config.project.environment, "dev");
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r"
project:
  org: ACME
  environment: prod
state:
  dir: /var/lib/siteplan
templates:
  naming: naming.yaml
  dialplan: dialplan.yaml
remote:
  inventory: inventory.json
  supported_types: [region, partition, css]
execution:
  executable_types: [partition, css]
  on_dependency_failure: skip
";
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        assert_eq!(config.project.environment, "prod");
        assert_eq!(config.remote.supported_types.len(), 3);
        assert_eq!(
            config.execution.executable_types,
            vec![ObjectType::Partition, ObjectType::Css]
        );
        assert_eq!(config.execution.on_dependency_failure, DependencyPolicy::Skip);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let yaml = "project:\n  org: ACME\nexecution:\n  executable_types: [gateway]\n";
        assert!(ConfigParser::new().parse_yaml(yaml, None).is_err());
    }

    #[test]
    fn test_load_file_sets_base_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("siteplan.yaml");
        std::fs::write(&path, "project:\n  org: ACME\n").unwrap();

        let config = ConfigParser::new().load_file(&path).unwrap();
        assert_eq!(config.base_dir, temp.path());
        assert_eq!(config.naming_path(), temp.path().join("naming.yaml"));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("siteplan.yaml"), "project:\n  org: ACME\n").unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, temp.path().join("siteplan.yaml"));
    }
}
