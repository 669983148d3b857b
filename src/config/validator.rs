//! Validation of configuration and the templates it points at.
//!
//! Problems are collected rather than reported one at a time so the
//! `validate` command can show all of them at once.

use crate::error::{ConfigError, Result, SiteplanError};
use crate::naming::NamingProfile;
use crate::planner::{Blueprint, GlobalsReport, PartitionScope};
use std::collections::HashSet;
use tracing::debug;

use super::settings::{ProjectConfig, SiteplanConfig};

/// Validator for siteplan configuration.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ValidationResult {
    /// Returns true if no errors were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Records an error against a field.
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Converts the result into an error carrying the first problem.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation error was recorded.
    pub fn into_result(self) -> Result<Self> {
        match self.errors.first() {
            None => Ok(self),
            Some(first) => Err(SiteplanError::Config(ConfigError::ValidationError {
                message: first.message.clone(),
                field: Some(first.field.clone()),
            })),
        }
    }
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn validate(&self, config: &SiteplanConfig) -> Result<ValidationResult> {
        let result = self.check(config);
        if result.is_valid() {
            debug!("Configuration validation passed");
        }
        result.into_result()
    }

    /// Collects every problem in a configuration without failing.
    #[must_use]
    pub fn check(&self, config: &SiteplanConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_project(&config.project, &mut result);
        Self::validate_paths(config, &mut result);
        Self::validate_execution(config, &mut result);

        result
    }

    /// Adds naming profile problems to a result.
    pub fn check_naming(&self, profile: &NamingProfile, result: &mut ValidationResult) {
        for object_type in profile.missing_types() {
            result.warnings.push(format!(
                "No naming template for {object_type}; sites will fail to render it"
            ));
        }
    }

    /// Adds blueprint problems to a result.
    pub fn check_blueprint(&self, blueprint: &Blueprint, result: &mut ValidationResult) {
        let site_aliases: HashSet<&str> = blueprint
            .partitions
            .iter()
            .filter(|(_, p)| p.scope == PartitionScope::Site)
            .map(|(alias, _)| alias.as_str())
            .collect();

        for (alias, css) in &blueprint.css {
            if css.members.is_empty() {
                result
                    .warnings
                    .push(format!("Blueprint CSS '{alias}' has no members"));
            }
            for member in &css.members {
                if !site_aliases.contains(member.as_str())
                    && !blueprint.globals.partitions.contains_key(member)
                {
                    result.add_error(
                        format!("css.{alias}.members"),
                        format!("Unknown partition alias '{member}'"),
                    );
                }
            }
        }

        for (alias, partition) in &blueprint.partitions {
            if partition.scope == PartitionScope::Global
                && !blueprint.globals.partitions.contains_key(alias)
            {
                result.warnings.push(format!(
                    "Global partition '{alias}' is not in globals and cannot be referenced"
                ));
            }
        }
    }

    /// Adds global partitions absent from the remote system to a result.
    pub fn check_globals(&self, report: &GlobalsReport, result: &mut ValidationResult) {
        for name in &report.missing {
            result.add_error(
                "globals.partitions",
                format!("Global partition '{name}' does not exist on the remote system"),
            );
        }
        for name in &report.unchecked {
            result
                .warnings
                .push(format!("Could not check global partition '{name}'"));
        }
        debug!("{} global partitions present", report.found.len());
    }

    fn validate_project(project: &ProjectConfig, result: &mut ValidationResult) {
        if project.org.trim().is_empty() {
            result.add_error("project.org", "Organization cannot be empty");
        }

        if project.environment.trim().is_empty() {
            result.add_error("project.environment", "Environment cannot be empty");
        } else if !is_valid_name(&project.environment) {
            result.add_error(
                "project.environment",
                format!(
                    "Environment '{}' is invalid. Must be alphanumeric with hyphens or underscores.",
                    project.environment
                ),
            );
        }
    }

    fn validate_paths(config: &SiteplanConfig, result: &mut ValidationResult) {
        if config.state.dir.trim().is_empty() {
            result.add_error("state.dir", "State directory cannot be empty");
        }
        if config.templates.naming.trim().is_empty() {
            result.add_error("templates.naming", "Naming profile path cannot be empty");
        }
        if config.remote.inventory.trim().is_empty() {
            result.add_error("remote.inventory", "Inventory path cannot be empty");
        }
    }

    fn validate_execution(config: &SiteplanConfig, result: &mut ValidationResult) {
        let executable = &config.execution.executable_types;
        if executable.is_empty() {
            result.add_error(
                "execution.executable_types",
                "At least one executable type is required",
            );
        }

        let mut seen = HashSet::new();
        for object_type in executable {
            if !seen.insert(*object_type) {
                result.warnings.push(format!(
                    "execution.executable_types lists {object_type} more than once"
                ));
            }
            if !config.remote.supported_types.contains(object_type) {
                result.warnings.push(format!(
                    "{object_type} is executable but the remote does not support it"
                ));
            }
        }
    }
}

/// Checks that a name is alphanumeric with hyphens or underscores.
fn is_valid_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
