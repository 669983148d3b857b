//! Configuration module for siteplan.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `siteplan.yaml`
//! - Loading site records
//! - Validation of configuration values and blueprints

mod parser;
mod settings;
mod sites;
mod validator;

pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use settings::{
    ExecutionConfig, ProjectConfig, RemoteConfig, SiteplanConfig, StateConfig, TemplatesConfig,
};
pub use sites::{SiteRow, load_sites, parse_sites, split_list};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
