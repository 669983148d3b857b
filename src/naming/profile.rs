//! Naming profiles.
//!
//! A naming profile maps every object type to a name and description
//! template. It is the default [`NameResolver`] used by the planner.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ConfigError, Result, SiteplanError, TemplateError};
use crate::planner::ObjectType;

use super::template::{SiteContext, render_template};

/// Name and description rendered for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedName {
    /// Object name.
    pub name: String,
    /// Object description.
    pub description: String,
}

/// Renders object names for a site.
pub trait NameResolver {
    /// Renders the name and description of `object_type` for a site.
    ///
    /// # Errors
    ///
    /// Returns an error if no template is registered for the type or the
    /// template references an unknown field.
    fn render(&self, object_type: ObjectType, ctx: &SiteContext) -> std::result::Result<RenderedName, TemplateError>;
}

/// Templates for a single object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectTemplate {
    /// Name template.
    pub name: String,
    /// Description template.
    #[serde(default)]
    pub description: String,
}

/// Name templates for every object type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingProfile {
    /// Templates keyed by object type.
    #[serde(default)]
    pub objects: BTreeMap<ObjectType, ObjectTemplate>,
}

impl NamingProfile {
    /// Loads a naming profile from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading naming profile from: {}", path.display());

        if !path.exists() {
            return Err(SiteplanError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::parse(format!("Failed to read file: {e}"), path.display().to_string())
        })?;

        Self::parse_yaml(&content, &path.display().to_string())
    }

    /// Parses a naming profile from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(content: &str, location: &str) -> Result<Self> {
        let profile: Self = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::parse(format!("YAML parse error: {e}"), location))?;

        debug!("Naming profile defines {} object templates", profile.objects.len());
        Ok(profile)
    }

    /// Registers or replaces the templates for a type.
    #[must_use]
    pub fn with_template(
        mut self,
        object_type: ObjectType,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.objects.insert(
            object_type,
            ObjectTemplate {
                name: name.into(),
                description: description.into(),
            },
        );
        self
    }

    /// Object types without a registered template.
    #[must_use]
    pub fn missing_types(&self) -> Vec<ObjectType> {
        ObjectType::ALL
            .into_iter()
            .filter(|t| !self.objects.contains_key(t))
            .collect()
    }
}

impl NameResolver for NamingProfile {
    fn render(&self, object_type: ObjectType, ctx: &SiteContext) -> std::result::Result<RenderedName, TemplateError> {
        let template = self
            .objects
            .get(&object_type)
            .ok_or(TemplateError::MissingTemplate { object_type })?;

        Ok(RenderedName {
            name: render_template(&template.name, ctx)?,
            description: render_template(&template.description, ctx)?,
        })
    }
}
