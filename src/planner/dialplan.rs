//! Dialplan blueprints.
//!
//! A blueprint describes partitions and calling search spaces shared by
//! every site. Site-scoped partitions are rendered per site; CSS members
//! refer to partitions by alias, resolved first against the site's own
//! partitions and then against the blueprint's global partition table.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, PlanError, Result, SiteplanError};
use crate::naming::{SiteContext, render_template};

use super::lookup::{ExistenceLookup, classify};
use super::types::{ObjectInputs, ObjectType, PlanObject};

/// Scope of a blueprint partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionScope {
    /// Rendered once per site.
    Site,
    /// Shared across sites; not planned per site.
    #[default]
    Global,
}

/// A partition definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionTemplate {
    /// Partition scope.
    #[serde(default)]
    pub scope: PartitionScope,
    /// Name template.
    pub name: String,
    /// Description template.
    #[serde(default)]
    pub description: String,
}

/// A calling search space definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CssTemplate {
    /// Name template.
    pub name: String,
    /// Description template.
    #[serde(default)]
    pub description: String,
    /// Partition aliases, in priority order.
    #[serde(default)]
    pub members: Vec<String>,
}

/// Blueprint-wide definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlueprintGlobals {
    /// Global partition aliases mapped to their fixed names.
    #[serde(default)]
    pub partitions: IndexMap<String, String>,
}

/// A reusable dialplan blueprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    /// Global alias table.
    #[serde(default)]
    pub globals: BlueprintGlobals,
    /// Partition definitions keyed by alias.
    #[serde(default)]
    pub partitions: IndexMap<String, PartitionTemplate>,
    /// CSS definitions keyed by alias.
    #[serde(default)]
    pub css: IndexMap<String, CssTemplate>,
}

impl Blueprint {
    /// Loads a blueprint from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading dialplan blueprint from: {}", path.display());

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

    /// Parses a blueprint from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(content: &str, location: &str) -> Result<Self> {
        let blueprint: Self = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::parse(format!("YAML parse error: {e}"), location))?;

        debug!(
            "Blueprint defines {} partitions, {} CSS, {} global aliases",
            blueprint.partitions.len(),
            blueprint.css.len(),
            blueprint.globals.partitions.len()
        );
        Ok(blueprint)
    }

    /// Checks that every global partition exists on the remote system.
    ///
    /// Generated CSS objects reference these partitions by name but never
    /// create them. Names are trimmed; blank entries are ignored.
    pub fn verify_globals(&self, lookup: &dyn ExistenceLookup) -> GlobalsReport {
        let names: BTreeSet<&str> = self
            .globals
            .partitions
            .values()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .collect();

        let mut report = GlobalsReport::default();
        for name in names {
            match lookup.exists(ObjectType::Partition, name) {
                Ok(true) => report.found.push(name.to_string()),
                Ok(false) => report.missing.push(name.to_string()),
                Err(e) => {
                    warn!("Could not check global partition '{name}': {e}");
                    report.unchecked.push(name.to_string());
                }
            }
        }

        info!(
            "Global partitions: {} found, {} missing, {} unchecked",
            report.found.len(),
            report.missing.len(),
            report.unchecked.len()
        );
        report
    }
}

/// Presence of the blueprint's global partitions on the remote system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalsReport {
    /// Partitions that exist.
    pub found: Vec<String>,
    /// Partitions that do not exist.
    pub missing: Vec<String>,
    /// Partitions whose lookup failed.
    pub unchecked: Vec<String>,
}

impl GlobalsReport {
    /// Returns true if every global partition was found.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.unchecked.is_empty()
    }
}

/// Objects produced from a blueprint for one site.
#[derive(Debug, Default)]
pub struct DialplanObjects {
    /// Partition objects followed by CSS objects.
    pub objects: Vec<PlanObject>,
    /// Lookup warnings raised while classifying.
    pub warnings: Vec<String>,
}

/// Builds site-scoped partition and CSS objects from a blueprint.
#[derive(Debug)]
pub struct DialplanBuilder<'a> {
    blueprint: &'a Blueprint,
}

impl<'a> DialplanBuilder<'a> {
    /// Creates a builder for a blueprint.
    #[must_use]
    pub const fn new(blueprint: &'a Blueprint) -> Self {
        Self { blueprint }
    }

    /// Renders the blueprint for one site.
    ///
    /// # Errors
    ///
    /// Returns an error if a template cannot be rendered or a CSS member
    /// alias matches neither a site partition nor a global partition.
    pub fn build(
        &self,
        ctx: &SiteContext,
        lookup: Option<&dyn ExistenceLookup>,
    ) -> std::result::Result<DialplanObjects, PlanError> {
        let mut out = DialplanObjects::default();
        let mut local: HashMap<&str, String> = HashMap::new();

        let template_error = |source| PlanError::Template {
            site_code: ctx.site_code.clone(),
            source,
        };

        for (alias, partition) in &self.blueprint.partitions {
            if partition.scope != PartitionScope::Site {
                continue;
            }

            let name = render_template(&partition.name, ctx).map_err(template_error)?;
            let description = render_template(&partition.description, ctx).map_err(template_error)?;
            local.insert(alias.as_str(), name.clone());

            let action = classify(lookup, ObjectType::Partition, &name, &ctx.site_code, &mut out.warnings);
            out.objects
                .push(PlanObject::new(name, description, action, ObjectInputs::Partition));
        }

        for (alias, css) in &self.blueprint.css {
            let name = render_template(&css.name, ctx).map_err(template_error)?;
            let description = render_template(&css.description, ctx).map_err(template_error)?;

            let members = css
                .members
                .iter()
                .map(|member| {
                    local
                        .get(member.as_str())
                        .or_else(|| self.blueprint.globals.partitions.get(member))
                        .cloned()
                        .ok_or_else(|| PlanError::UnresolvedReference {
                            site_code: ctx.site_code.clone(),
                            group: alias.clone(),
                            alias: member.clone(),
                        })
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let action = classify(lookup, ObjectType::Css, &name, &ctx.site_code, &mut out.warnings);
            out.objects
                .push(PlanObject::new(name, description, action, ObjectInputs::Css { members }));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::Action;

    const BLUEPRINT: &str = r#"
globals:
  partitions:
    PSTN: "PT_Global_PSTN"
partitions:
  internal:
    scope: site
    name: "PT_{site}_Internal"
    description: "{site_name} internal"
  emergency:
    scope: site
    name: "PT_{site}_911"
  shared:
    scope: global
    name: "PT_Shared"
css:
  device:
    name: "CSS_{site}_Device"
    members: [internal, emergency, PSTN]
"#;

    fn ctx(site: &str) -> SiteContext {
        SiteContext {
            org: String::from("ACME"),
            state: String::from("IL"),
            site_code: site.to_string(),
            site_detail: format!("{site} office"),
            city: String::from("Elmhurst"),
        }
    }

    #[test]
    fn test_partitions_then_css() {
        let blueprint = Blueprint::parse_yaml(BLUEPRINT, "inline").unwrap();
        let built = DialplanBuilder::new(&blueprint).build(&ctx("ELM"), None).unwrap();

        let names: Vec<_> = built.objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["PT_ELM_Internal", "PT_ELM_911", "CSS_ELM_Device"]);
        assert_eq!(built.objects[0].description, "ELM office internal");

        let css = &built.objects[2];
        assert_eq!(css.object_type, ObjectType::Css);
        assert_eq!(
            css.inputs.members().unwrap(),
            ["PT_ELM_Internal", "PT_ELM_911", "PT_Global_PSTN"]
        );
    }

    #[test]
    fn test_unresolved_member() {
        let mut blueprint = Blueprint::parse_yaml(BLUEPRINT, "inline").unwrap();
        blueprint.css[0].members.push(String::from("voicemail"));

        let err = DialplanBuilder::new(&blueprint)
            .build(&ctx("ELM"), None)
            .unwrap_err();
        assert_eq!(
            err,
            PlanError::UnresolvedReference {
                site_code: String::from("ELM"),
                group: String::from("device"),
                alias: String::from("voicemail"),
            }
        );
    }

    #[test]
    fn test_existing_objects_skipped() {
        let blueprint = Blueprint::parse_yaml(BLUEPRINT, "inline").unwrap();
        let lookup = |t: ObjectType, _: &str| Ok::<bool, String>(t == ObjectType::Css);
        let built = DialplanBuilder::new(&blueprint)
            .build(&ctx("ELM"), Some(&lookup))
            .unwrap();

        assert!(built.objects[..2].iter().all(|o| o.action == Action::Create));
        assert_eq!(built.objects[2].action, Action::Skip);
    }

    #[test]
    fn test_failed_lookup_warns_and_creates() {
        let blueprint = Blueprint::parse_yaml(BLUEPRINT, "inline").unwrap();
        let lookup = |t: ObjectType, name: &str| {
            if t == ObjectType::Css {
                Err(String::from("inventory offline"))
            } else {
                Ok(name == "PT_ELM_911")
            }
        };
        let built = DialplanBuilder::new(&blueprint)
            .build(&ctx("ELM"), Some(&lookup))
            .unwrap();

        let actions: Vec<Action> = built.objects.iter().map(|o| o.action).collect();
        assert_eq!(actions, vec![Action::Create, Action::Skip, Action::Create]);
        assert_eq!(built.warnings.len(), 1);
        assert!(built.warnings[0].starts_with("ELM:"));
        assert!(built.warnings[0].contains("CSS_ELM_Device"));
        assert!(built.warnings[0].contains("inventory offline"));
    }

    #[test]
    fn test_verify_globals() {
        let blueprint = Blueprint::parse_yaml(
            r#"
globals:
  partitions:
    PSTN: " PT_Global_PSTN "
    E911: "PT_Global_911"
    INTL: "PT_Global_Intl"
    BLANK: ""
"#,
            "inline",
        )
        .unwrap();
        let lookup = |t: ObjectType, name: &str| {
            assert_eq!(t, ObjectType::Partition);
            match name {
                "PT_Global_PSTN" => Ok(true),
                "PT_Global_Intl" => Err(String::from("timeout")),
                _ => Ok(false),
            }
        };

        let report = blueprint.verify_globals(&lookup);
        assert_eq!(report.found, vec!["PT_Global_PSTN"]);
        assert_eq!(report.missing, vec!["PT_Global_911"]);
        assert_eq!(report.unchecked, vec!["PT_Global_Intl"]);
        assert!(!report.is_complete());

        let all_present = |_: ObjectType, _: &str| Ok::<bool, String>(true);
        assert!(blueprint.verify_globals(&all_present).is_complete());
    }
}
