//! Plan construction from site records.
//!
//! The builder renders every object of every site, classifies each as
//! create or skip, orders them canonically and annotates their
//! dependencies. Row-level problems are collected next to the plan; a bad
//! row never aborts the batch.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SiteRow;
use crate::error::PlanError;
use crate::naming::{NameResolver, RenderedName, SiteContext};

use super::dialplan::{Blueprint, DialplanBuilder};
use super::lookup::{ExistenceLookup, classify};
use super::types::{ObjectInputs, ObjectType, Plan, PlanObject, Site};

/// MRGL member keyword for the site's own MRG.
pub const SITE_MRG_KEYWORD: &str = "SITE_MRG";

/// CSS member keyword for the site's own partition.
pub const SITE_PARTITION_KEYWORD: &str = "SITE_PARTITION";

/// Hub relationship assigned to every generated location.
const DEFAULT_HUB_RELATIONSHIP: &str = "Hub_None";

/// A plan together with the problems found while building it.
#[derive(Debug)]
pub struct PlanOutcome {
    /// The best-effort plan.
    pub plan: Plan,
    /// Rows that were rejected, with the reason.
    pub errors: Vec<PlanError>,
    /// Non-fatal problems, such as failed existence lookups.
    pub warnings: Vec<String>,
}

impl PlanOutcome {
    /// Returns true if no row was rejected.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Builds provisioning plans.
pub struct PlanBuilder<'a> {
    resolver: &'a dyn NameResolver,
    org: String,
    env_name: String,
    blueprint: Option<&'a Blueprint>,
    lookup: Option<&'a dyn ExistenceLookup>,
}

impl std::fmt::Debug for PlanBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanBuilder")
            .field("org", &self.org)
            .field("env_name", &self.env_name)
            .field("blueprint", &self.blueprint.is_some())
            .field("lookup", &self.lookup.is_some())
            .finish()
    }
}

impl<'a> PlanBuilder<'a> {
    /// Creates a plan builder.
    #[must_use]
    pub fn new(resolver: &'a dyn NameResolver, org: impl Into<String>, env_name: impl Into<String>) -> Self {
        Self {
            resolver,
            org: org.into(),
            env_name: env_name.into(),
            blueprint: None,
            lookup: None,
        }
    }

    /// Sources partitions and CSS from a blueprint.
    #[must_use]
    pub const fn with_blueprint(mut self, blueprint: &'a Blueprint) -> Self {
        self.blueprint = Some(blueprint);
        self
    }

    /// Classifies objects against an existence lookup.
    #[must_use]
    pub const fn with_lookup(mut self, lookup: &'a dyn ExistenceLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Builds a plan from site records, in input order.
    #[must_use]
    pub fn build(&self, rows: &[SiteRow]) -> PlanOutcome {
        let plan_id = Uuid::new_v4().to_string();
        info!("Building plan {plan_id} for {} site records", rows.len());

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut sites = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for (index, row) in rows.iter().enumerate() {
            let row_number = index + 1;
            let row = row.clone().normalized();

            if seen.contains(&row.site_code) {
                warn!("Duplicate site_code '{}' at row {row_number}", row.site_code);
                errors.push(PlanError::DuplicateSiteCode {
                    site_code: row.site_code.clone(),
                    row: row_number,
                });
                continue;
            }

            if let Err(message) = row.check() {
                warn!("Rejecting row {row_number}: {message}");
                errors.push(PlanError::InvalidRow {
                    site_code: row.site_code.clone(),
                    row: row_number,
                    message,
                });
                continue;
            }
            seen.insert(row.site_code.clone());

            match self.build_site(&row, &mut warnings) {
                Ok(site) => {
                    debug!("Planned {} objects for {}", site.objects.len(), site.site_code);
                    sites.push(site);
                }
                Err(e) => {
                    warn!("Rejecting site {}: {e}", row.site_code);
                    errors.push(e);
                }
            }
        }

        let summary = Plan::summarize(&sites);
        let plan = Plan {
            plan_id,
            env_name: self.env_name.clone(),
            org: self.org.clone(),
            created_at: Utc::now(),
            site_count: sites.len(),
            sites,
            summary,
        };

        info!(
            "Plan {} covers {} sites, {} objects ({} errors, {} warnings)",
            plan.plan_id,
            plan.site_count,
            plan.object_count(),
            errors.len(),
            warnings.len()
        );

        PlanOutcome {
            plan,
            errors,
            warnings,
        }
    }

    /// Plans every object of one site.
    fn build_site(&self, row: &SiteRow, warnings: &mut Vec<String>) -> Result<Site, PlanError> {
        let ctx = SiteContext {
            org: self.org.clone(),
            state: row.state.clone(),
            site_code: row.site_code.clone(),
            site_detail: row.site_detail.clone(),
            city: row.city.clone(),
        };

        let mut names: BTreeMap<ObjectType, RenderedName> = BTreeMap::new();
        for object_type in ObjectType::ALL {
            let rendered = self
                .resolver
                .render(object_type, &ctx)
                .map_err(|source| PlanError::Template {
                    site_code: row.site_code.clone(),
                    source,
                })?;
            names.insert(object_type, rendered);
        }
        let name_of = |t: ObjectType| names.get(&t).map(|r| r.name.clone()).unwrap_or_default();

        let srst = row.srst_address();
        let mobility = row.mobility_subnet();

        let mut objects = Vec::new();
        if let Some(blueprint) = self.blueprint {
            let dialplan = DialplanBuilder::new(blueprint).build(&ctx, self.lookup)?;
            warnings.extend(dialplan.warnings);
            objects.extend(dialplan.objects);
        }

        for (object_type, rendered) in &names {
            let object_type = *object_type;
            if self.blueprint.is_some() && matches!(object_type, ObjectType::Partition | ObjectType::Css) {
                continue;
            }

            let inputs = match object_type {
                ObjectType::Region => ObjectInputs::Region {
                    audio_codec_preference_list: row.region_audio_codec_preference_list.clone(),
                    max_audio_bitrate: row.region_max_audio_bitrate.clone(),
                    max_video_bitrate: row.region_max_video_bitrate.clone(),
                    max_immersive_bitrate: row.region_max_immersive_bitrate.clone(),
                },
                ObjectType::Location => ObjectInputs::Location {
                    hub_relationship: String::from(DEFAULT_HUB_RELATIONSHIP),
                    audio_bw: row.location_audio_bw.clone(),
                    video_bw: row.location_video_bw.clone(),
                    immersive_bw: row.location_immersive_bw.clone(),
                },
                ObjectType::PhysicalLocation => ObjectInputs::PhysicalLocation {
                    description: row.physical_location_description.clone(),
                },
                ObjectType::Srst => match srst {
                    Some(ip) => ObjectInputs::Srst { ip: ip.to_string() },
                    None => continue,
                },
                ObjectType::Partition => ObjectInputs::Partition,
                ObjectType::Css => {
                    let members = resolve_self_reference(
                        row.css_members_list(),
                        SITE_PARTITION_KEYWORD,
                        &name_of(ObjectType::Partition),
                    );
                    if members.is_empty() {
                        continue;
                    }
                    ObjectInputs::Css { members }
                }
                ObjectType::Mrg => {
                    let members = row.mrg_members_list();
                    if members.is_empty() {
                        continue;
                    }
                    ObjectInputs::Mrg { members }
                }
                ObjectType::Mrgl => {
                    let members = resolve_self_reference(
                        row.mrgl_members_list(),
                        SITE_MRG_KEYWORD,
                        &name_of(ObjectType::Mrg),
                    );
                    if members.is_empty() {
                        continue;
                    }
                    ObjectInputs::Mrgl { members }
                }
                ObjectType::DevicePool => ObjectInputs::DevicePool {
                    ucm_group: row.ucm_group.clone(),
                    date_time_group: row.date_time_group.clone(),
                    softkey_template: non_blank(row.softkey_template.as_deref()),
                    region: name_of(ObjectType::Region),
                    location: name_of(ObjectType::Location),
                    physical_location: name_of(ObjectType::PhysicalLocation),
                    srst_reference: srst.map(|_| name_of(ObjectType::Srst)),
                    mrgl: name_of(ObjectType::Mrgl),
                    device_mobility_group: row.device_mobility_group.clone(),
                },
                ObjectType::DeviceMobility => match mobility {
                    Some((subnet, mask)) => ObjectInputs::DeviceMobility {
                        subnet: subnet.to_string(),
                        mask: mask.to_string(),
                        members: vec![name_of(ObjectType::DevicePool)],
                    },
                    None => continue,
                },
            };

            let action = classify(self.lookup, object_type, &rendered.name, &row.site_code, warnings);
            objects.push(PlanObject::new(
                rendered.name.clone(),
                rendered.description.clone(),
                action,
                inputs,
            ));
        }

        // Stable sort keeps blueprint order within a type.
        objects.sort_by_key(|o| o.object_type);

        let present: BTreeSet<ObjectType> = objects.iter().map(|o| o.object_type).collect();
        for object in &mut objects {
            object.depends_on = dependencies(object.object_type, &present, srst.is_some());
        }

        Ok(Site {
            site_code: row.site_code.clone(),
            site_detail: row.site_detail.clone(),
            objects,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}

/// Replaces the self-reference keyword with the site's own object name.
fn resolve_self_reference(members: Vec<String>, keyword: &str, own_name: &str) -> Vec<String> {
    members
        .into_iter()
        .map(|m| if m == keyword { own_name.to_string() } else { m })
        .collect()
}

/// Static dependency rules, decided by object-type presence only.
#[must_use]
pub fn dependencies(
    object_type: ObjectType,
    present: &BTreeSet<ObjectType>,
    srst_enabled: bool,
) -> BTreeSet<ObjectType> {
    let mut deps = BTreeSet::new();
    match object_type {
        ObjectType::Location => {
            deps.insert(ObjectType::Region);
        }
        ObjectType::Css => {
            deps.insert(ObjectType::Partition);
        }
        ObjectType::DevicePool => {
            deps.extend([
                ObjectType::Region,
                ObjectType::Location,
                ObjectType::PhysicalLocation,
                ObjectType::Mrgl,
            ]);
            if srst_enabled {
                deps.insert(ObjectType::Srst);
            }
            for optional in [ObjectType::Partition, ObjectType::Css] {
                if present.contains(&optional) {
                    deps.insert(optional);
                }
            }
        }
        ObjectType::DeviceMobility => {
            deps.insert(ObjectType::DevicePool);
        }
        _ => {}
    }
    deps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;
    use crate::naming::NamingProfile;
    use crate::planner::Action;

    fn profile() -> NamingProfile {
        let mut profile = NamingProfile::default();
        for t in ObjectType::ALL {
            profile = profile.with_template(
                t,
                format!("{}_{{site_code}}", t.as_str().to_uppercase()),
                format!("{} {{city}}", t.friendly()),
            );
        }
        profile
    }

    fn row(code: &str) -> SiteRow {
        SiteRow {
            site_code: code.to_string(),
            site_detail: format!("{code} office"),
            state: String::from("IL"),
            city: String::from("Elmhurst"),
            srst_ip: Some(String::from("10.0.0.1")),
            css_members: Some(String::from("SITE_PARTITION")),
            mrg_members: Some(String::from("ANN_1,MOH_1")),
            mrgl_members: Some(String::from("SITE_MRG,MRG_HUB")),
            mobility_subnet: Some(String::from("10.0.0.0")),
            mobility_mask: Some(String::from("24")),
            ..SiteRow::default()
        }
    }

    fn types(site: &Site) -> Vec<ObjectType> {
        site.objects.iter().map(|o| o.object_type).collect()
    }

    #[test]
    fn test_device_pool_carries_row_settings() {
        let profile = profile();
        let mut elm = row("ELM");
        elm.ucm_group = Some(String::from("CMG_East"));
        elm.softkey_template = Some(String::from(" Standard User "));
        let mut oak = row("OAK");
        oak.softkey_template = Some(String::from("  "));

        let outcome = PlanBuilder::new(&profile, "ACME", "prod").build(&[elm, oak]);
        let pool_of = |site: &Site| {
            site.objects
                .iter()
                .find(|o| o.object_type == ObjectType::DevicePool)
                .map(|o| o.inputs.clone())
                .unwrap()
        };

        match pool_of(&outcome.plan.sites[0]) {
            ObjectInputs::DevicePool {
                ucm_group,
                softkey_template,
                ..
            } => {
                assert_eq!(ucm_group.as_deref(), Some("CMG_East"));
                assert_eq!(softkey_template.as_deref(), Some("Standard User"));
            }
            other => panic!("unexpected inputs: {other:?}"),
        }
        assert!(matches!(
            pool_of(&outcome.plan.sites[1]),
            ObjectInputs::DevicePool { softkey_template: None, .. }
        ));
    }

    #[test]
    fn test_full_site_in_canonical_order() {
        let profile = profile();
        let outcome = PlanBuilder::new(&profile, "ACME", "prod").build(&[row("ELM")]);

        assert!(outcome.is_clean());
        assert_eq!(outcome.plan.site_count, 1);
        assert_eq!(types(&outcome.plan.sites[0]), ObjectType::ALL.to_vec());
        assert!(outcome.plan.sites[0].objects.iter().all(|o| o.action == Action::Create));
        assert_eq!(outcome.plan.create_count(), 10);
    }

    #[test]
    fn test_duplicate_site_code_first_wins() {
        let profile = profile();
        let mut second = row("ELM");
        second.site_detail = String::from("Second Elmhurst");
        let outcome = PlanBuilder::new(&profile, "ACME", "prod").build(&[row("ELM"), second]);

        assert_eq!(outcome.plan.sites.len(), 1);
        assert_eq!(outcome.plan.sites[0].site_detail, "ELM office");
        assert_eq!(
            outcome.errors,
            vec![PlanError::DuplicateSiteCode {
                site_code: String::from("ELM"),
                row: 2
            }]
        );
        assert!(outcome.errors[0].to_string().contains("ELM"));
    }

    #[test]
    fn test_duplicate_detection_uses_normalized_code() {
        let profile = profile();
        let outcome = PlanBuilder::new(&profile, "ACME", "prod").build(&[row("ELM"), row(" elm")]);
        assert_eq!(outcome.plan.sites.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn test_srst_and_mobility_excluded_when_blank() {
        let profile = profile();
        let mut elm = row("ELM");
        elm.srst_ip = Some(String::new());
        elm.mobility_subnet = Some(String::new());
        elm.mobility_mask = Some(String::new());

        let outcome = PlanBuilder::new(&profile, "ACME", "prod").build(&[elm]);
        let site = &outcome.plan.sites[0];
        let site_types = types(site);
        assert!(!site_types.contains(&ObjectType::Srst));
        assert!(!site_types.contains(&ObjectType::DeviceMobility));

        let pool = site.objects.iter().find(|o| o.object_type == ObjectType::DevicePool).unwrap();
        assert!(!pool.depends_on.contains(&ObjectType::Srst));
        assert!(matches!(
            pool.inputs,
            ObjectInputs::DevicePool { srst_reference: None, .. }
        ));
    }

    #[test]
    fn test_mobility_requires_subnet_and_mask() {
        let profile = profile();
        let mut elm = row("ELM");
        elm.mobility_mask = None;
        let outcome = PlanBuilder::new(&profile, "ACME", "prod").build(&[elm]);
        assert!(!types(&outcome.plan.sites[0]).contains(&ObjectType::DeviceMobility));
    }

    #[test]
    fn test_site_mrg_keyword_resolves_per_site() {
        let profile = profile();
        let outcome = PlanBuilder::new(&profile, "ACME", "prod").build(&[row("ELM"), row("OAK")]);

        for site in &outcome.plan.sites {
            let mrgl = site.objects.iter().find(|o| o.object_type == ObjectType::Mrgl).unwrap();
            let expected = format!("MRG_{}", site.site_code);
            assert_eq!(mrgl.inputs.members().unwrap(), [expected.as_str(), "MRG_HUB"]);
        }
    }

    #[test]
    fn test_empty_groups_omitted() {
        let profile = profile();
        let mut elm = row("ELM");
        elm.mrg_members = None;
        elm.mrgl_members = Some(String::from(" , "));
        elm.css_members = None;

        let outcome = PlanBuilder::new(&profile, "ACME", "prod").build(&[elm]);
        let site_types = types(&outcome.plan.sites[0]);
        assert!(!site_types.contains(&ObjectType::Mrg));
        assert!(!site_types.contains(&ObjectType::Mrgl));
        assert!(!site_types.contains(&ObjectType::Css));
        assert!(site_types.contains(&ObjectType::Partition));
    }

    #[test]
    fn test_dependencies_reference_earlier_types_only() {
        let profile = profile();
        let outcome = PlanBuilder::new(&profile, "ACME", "prod").build(&[row("ELM")]);
        let site = &outcome.plan.sites[0];

        for object in &site.objects {
            assert!(object.depends_on.iter().all(|d| *d < object.object_type));
        }

        let pool = site.objects.iter().find(|o| o.object_type == ObjectType::DevicePool).unwrap();
        assert_eq!(
            pool.depends_on.iter().copied().collect::<Vec<_>>(),
            vec![
                ObjectType::Region,
                ObjectType::Location,
                ObjectType::PhysicalLocation,
                ObjectType::Srst,
                ObjectType::Partition,
                ObjectType::Css,
                ObjectType::Mrgl,
            ]
        );
        let mobility = site.objects.last().unwrap();
        assert_eq!(
            mobility.depends_on.iter().copied().collect::<Vec<_>>(),
            vec![ObjectType::DevicePool]
        );
    }

    #[test]
    fn test_lookup_classifies_and_failures_warn() {
        let profile = profile();
        let lookup = |t: ObjectType, _: &str| match t {
            ObjectType::Region => Ok(true),
            ObjectType::Location => Err(String::from("connection reset")),
            _ => Ok(false),
        };
        let outcome = PlanBuilder::new(&profile, "ACME", "prod")
            .with_lookup(&lookup)
            .build(&[row("ELM")]);

        let site = &outcome.plan.sites[0];
        assert_eq!(site.objects[0].action, Action::Skip);
        assert_eq!(site.objects[1].action, Action::Create);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.plan.summary[&ObjectType::Region].skip, 1);
        assert!(outcome.is_clean());
    }

    #[test]
    fn test_blueprint_replaces_generic_partition_and_css() {
        let profile = profile();
        let blueprint = Blueprint::parse_yaml(
            r#"
globals:
  partitions:
    PSTN: PT_PSTN
partitions:
  internal: { scope: site, name: "PT_{site}_Internal" }
  local: { scope: site, name: "PT_{site}_Local" }
css:
  device: { name: "CSS_{site}_Device", members: [internal, local, PSTN] }
"#,
            "inline",
        )
        .unwrap();

        let outcome = PlanBuilder::new(&profile, "ACME", "prod")
            .with_blueprint(&blueprint)
            .build(&[row("ELM")]);
        let site = &outcome.plan.sites[0];

        let partitions: Vec<_> = site
            .objects
            .iter()
            .filter(|o| o.object_type == ObjectType::Partition)
            .map(|o| o.name.as_str())
            .collect();
        assert_eq!(partitions, vec!["PT_ELM_Internal", "PT_ELM_Local"]);
        assert!(!site.objects.iter().any(|o| o.name == "PARTITION_ELM"));
        assert_eq!(
            site.objects.iter().filter(|o| o.object_type == ObjectType::Css).count(),
            1
        );
        assert!(site.objects.windows(2).all(|w| w[0].object_type <= w[1].object_type));
    }

    #[test]
    fn test_unresolved_blueprint_member_rejects_row_only() {
        let profile = profile();
        let blueprint = Blueprint::parse_yaml(
            "css:\n  device: { name: \"CSS_{site}\", members: [missing] }\n",
            "inline",
        )
        .unwrap();

        let outcome = PlanBuilder::new(&profile, "ACME", "prod")
            .with_blueprint(&blueprint)
            .build(&[row("ELM"), row("OAK")]);
        assert!(outcome.plan.sites.is_empty());
        assert_eq!(outcome.errors.len(), 2);
        assert!(matches!(outcome.errors[0], PlanError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_template_error_rejects_row() {
        let profile = profile().with_template(ObjectType::Region, "R_{zip}", "");
        let outcome = PlanBuilder::new(&profile, "ACME", "prod").build(&[row("ELM")]);
        assert!(outcome.plan.sites.is_empty());
        assert!(matches!(
            &outcome.errors[0],
            PlanError::Template {
                source: TemplateError::UnknownField { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_row_rejected() {
        let profile = profile();
        let mut bad = row("ELM");
        bad.state = String::from("Illinois");
        let outcome = PlanBuilder::new(&profile, "ACME", "prod").build(&[bad, row("OAK")]);
        assert_eq!(outcome.plan.sites.len(), 1);
        assert!(matches!(outcome.errors[0], PlanError::InvalidRow { row: 1, .. }));
    }
}
