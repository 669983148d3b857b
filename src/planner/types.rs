//! Plan document types.
//!
//! A plan is an ordered, per-site list of configuration objects, each
//! classified as create or skip and annotated with the object types it
//! depends on. Every object carries only the inputs relevant to its type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Kinds of configuration objects, declared in canonical creation order.
///
/// The derived ordering is the canonical order; reversed, it is the
/// rollback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    /// Codec/bandwidth region.
    Region,
    /// Call admission control location.
    Location,
    /// Physical location.
    PhysicalLocation,
    /// SRST reference.
    Srst,
    /// Route partition.
    Partition,
    /// Calling search space.
    Css,
    /// Media resource group.
    Mrg,
    /// Media resource group list.
    Mrgl,
    /// Device pool.
    DevicePool,
    /// Device mobility info.
    DeviceMobility,
}

impl ObjectType {
    /// All object types in canonical order.
    pub const ALL: [Self; 10] = [
        Self::Region,
        Self::Location,
        Self::PhysicalLocation,
        Self::Srst,
        Self::Partition,
        Self::Css,
        Self::Mrg,
        Self::Mrgl,
        Self::DevicePool,
        Self::DeviceMobility,
    ];

    /// Snake-case identifier used in documents and templates.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::Location => "location",
            Self::PhysicalLocation => "physical_location",
            Self::Srst => "srst",
            Self::Partition => "partition",
            Self::Css => "css",
            Self::Mrg => "mrg",
            Self::Mrgl => "mrgl",
            Self::DevicePool => "device_pool",
            Self::DeviceMobility => "device_mobility",
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn friendly(self) -> &'static str {
        match self {
            Self::Region => "Region",
            Self::Location => "Location",
            Self::PhysicalLocation => "Physical Location",
            Self::Srst => "SRST",
            Self::Partition => "Partition",
            Self::Css => "Calling Search Space",
            Self::Mrg => "Media Resource Group",
            Self::Mrgl => "Media Resource Group List",
            Self::DevicePool => "Device Pool",
            Self::DeviceMobility => "Device Mobility",
        }
    }

    /// Name of the remote operation that removes an object of this type.
    #[must_use]
    pub const fn inverse_operation(self) -> &'static str {
        match self {
            Self::Region => "removeRegion",
            Self::Location => "removeLocation",
            Self::PhysicalLocation => "removePhysicalLocation",
            Self::Srst => "removeSrst",
            Self::Partition => "removeRoutePartition",
            Self::Css => "removeCss",
            Self::Mrg => "removeMediaResourceGroup",
            Self::Mrgl => "removeMediaResourceList",
            Self::DevicePool => "removeDevicePool",
            Self::DeviceMobility => "removeDeviceMobility",
        }
    }

    /// Looks up the type whose inverse operation has the given name.
    #[must_use]
    pub fn from_inverse_operation(operation: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.inverse_operation() == operation)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown object type: {s}"))
    }
}

/// Planned action for an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// The object is missing and should be created.
    Create,
    /// The object already exists and is left alone.
    Skip,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Skip => f.write_str("skip"),
        }
    }
}

/// Type-specific inputs for a plan object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectInputs {
    /// Region codec and bitrate settings.
    Region {
        /// Audio codec preference list name.
        audio_codec_preference_list: Option<String>,
        /// Maximum audio bitrate.
        max_audio_bitrate: Option<String>,
        /// Maximum video bitrate.
        max_video_bitrate: Option<String>,
        /// Maximum immersive bitrate.
        max_immersive_bitrate: Option<String>,
    },
    /// Location bandwidth settings.
    Location {
        /// Hub relationship of the location.
        hub_relationship: String,
        /// Audio bandwidth.
        audio_bw: Option<String>,
        /// Video bandwidth.
        video_bw: Option<String>,
        /// Immersive bandwidth.
        immersive_bw: Option<String>,
    },
    /// Physical location details.
    PhysicalLocation {
        /// Free-form description.
        description: Option<String>,
    },
    /// SRST reference target.
    Srst {
        /// Gateway address.
        ip: String,
    },
    /// Route partition (no extra inputs).
    Partition,
    /// Calling search space membership.
    Css {
        /// Rendered partition names, in priority order.
        members: Vec<String>,
    },
    /// Media resource group membership.
    Mrg {
        /// Media resource names.
        members: Vec<String>,
    },
    /// Media resource group list membership.
    Mrgl {
        /// Media resource group names, in priority order.
        members: Vec<String>,
    },
    /// Device pool references.
    DevicePool {
        /// Call manager group.
        ucm_group: Option<String>,
        /// Date/time group.
        date_time_group: Option<String>,
        /// Softkey template.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        softkey_template: Option<String>,
        /// Rendered region name.
        region: String,
        /// Rendered location name.
        location: String,
        /// Rendered physical location name.
        physical_location: String,
        /// Rendered SRST reference name, when SRST is enabled.
        srst_reference: Option<String>,
        /// Rendered MRGL name.
        mrgl: String,
        /// Device mobility group.
        device_mobility_group: Option<String>,
    },
    /// Device mobility subnet.
    DeviceMobility {
        /// Subnet address.
        subnet: String,
        /// Subnet mask.
        mask: String,
        /// Device pools served by this subnet.
        members: Vec<String>,
    },
}

impl ObjectInputs {
    /// The object type these inputs belong to.
    #[must_use]
    pub const fn object_type(&self) -> ObjectType {
        match self {
            Self::Region { .. } => ObjectType::Region,
            Self::Location { .. } => ObjectType::Location,
            Self::PhysicalLocation { .. } => ObjectType::PhysicalLocation,
            Self::Srst { .. } => ObjectType::Srst,
            Self::Partition => ObjectType::Partition,
            Self::Css { .. } => ObjectType::Css,
            Self::Mrg { .. } => ObjectType::Mrg,
            Self::Mrgl { .. } => ObjectType::Mrgl,
            Self::DevicePool { .. } => ObjectType::DevicePool,
            Self::DeviceMobility { .. } => ObjectType::DeviceMobility,
        }
    }

    /// Group members, for the types that carry them.
    #[must_use]
    pub fn members(&self) -> Option<&[String]> {
        match self {
            Self::Css { members }
            | Self::Mrg { members }
            | Self::Mrgl { members }
            | Self::DeviceMobility { members, .. } => Some(members.as_slice()),
            _ => None,
        }
    }
}

/// A single configuration object in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PlanObjectDocument")]
pub struct PlanObject {
    /// Object type, always equal to `inputs.object_type()`.
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    /// Rendered object name.
    pub name: String,
    /// Rendered description.
    pub description: String,
    /// Create or skip.
    pub action: Action,
    /// Types this object depends on, in canonical order.
    pub depends_on: BTreeSet<ObjectType>,
    /// Type-specific inputs.
    pub inputs: ObjectInputs,
}

/// Wire shape of a plan object before the type/inputs check.
#[derive(Deserialize)]
struct PlanObjectDocument {
    #[serde(rename = "type")]
    object_type: ObjectType,
    name: String,
    #[serde(default)]
    description: String,
    action: Action,
    #[serde(default)]
    depends_on: BTreeSet<ObjectType>,
    inputs: ObjectInputs,
}

impl TryFrom<PlanObjectDocument> for PlanObject {
    type Error = String;

    fn try_from(doc: PlanObjectDocument) -> Result<Self, Self::Error> {
        if doc.inputs.object_type() != doc.object_type {
            return Err(format!(
                "object '{}' has type {} but {} inputs",
                doc.name,
                doc.object_type,
                doc.inputs.object_type()
            ));
        }
        if let Some(dep) = doc.depends_on.iter().find(|d| **d >= doc.object_type) {
            return Err(format!(
                "object '{}' of type {} cannot depend on {dep}",
                doc.name, doc.object_type
            ));
        }
        Ok(Self {
            object_type: doc.object_type,
            name: doc.name,
            description: doc.description,
            action: doc.action,
            depends_on: doc.depends_on,
            inputs: doc.inputs,
        })
    }
}

impl PlanObject {
    /// Creates a new object; the type is taken from the inputs.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        action: Action,
        inputs: ObjectInputs,
    ) -> Self {
        Self {
            object_type: inputs.object_type(),
            name: name.into(),
            description: description.into(),
            action,
            depends_on: BTreeSet::new(),
            inputs,
        }
    }

    /// Returns true if the object is to be created.
    #[must_use]
    pub fn is_create(&self) -> bool {
        self.action == Action::Create
    }
}

/// All planned objects for one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    /// Site code (natural key).
    pub site_code: String,
    /// Human-readable site detail.
    pub site_detail: String,
    /// Objects in canonical order.
    pub objects: Vec<PlanObject>,
}

/// Create/skip counts for one object type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCounts {
    /// Objects to create.
    pub create: usize,
    /// Objects to skip.
    pub skip: usize,
}

/// Per-type action counts across all sites.
pub type PlanSummary = BTreeMap<ObjectType, ActionCounts>;

/// A complete provisioning plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Unique plan identifier.
    pub plan_id: String,
    /// Target environment name.
    pub env_name: String,
    /// Organization the plan was rendered for.
    pub org: String,
    /// When the plan was built.
    pub created_at: DateTime<Utc>,
    /// Number of planned sites.
    pub site_count: usize,
    /// Planned sites in input order.
    pub sites: Vec<Site>,
    /// Object counts per type and action.
    pub summary: PlanSummary,
}

impl Plan {
    /// Computes the per-type action summary for a set of sites.
    #[must_use]
    pub fn summarize(sites: &[Site]) -> PlanSummary {
        let mut summary = PlanSummary::new();
        for object in sites.iter().flat_map(|s| &s.objects) {
            let counts = summary.entry(object.object_type).or_default();
            match object.action {
                Action::Create => counts.create += 1,
                Action::Skip => counts.skip += 1,
            }
        }
        summary
    }

    /// Total number of objects in the plan.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.sites.iter().map(|s| s.objects.len()).sum()
    }

    /// Number of objects marked for creation.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.summary.values().map(|c| c.create).sum()
    }

    /// Returns true if the plan creates nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.create_count() == 0
    }

    /// Finds a site by code.
    #[must_use]
    pub fn site(&self, site_code: &str) -> Option<&Site> {
        self.sites.iter().find(|s| s.site_code == site_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order_matches_declaration() {
        let mut shuffled = vec![
            ObjectType::DeviceMobility,
            ObjectType::Css,
            ObjectType::Region,
            ObjectType::Mrgl,
            ObjectType::Srst,
        ];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![
                ObjectType::Region,
                ObjectType::Srst,
                ObjectType::Css,
                ObjectType::Mrgl,
                ObjectType::DeviceMobility,
            ]
        );
        assert!(ObjectType::ALL.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_inverse_operation_lookup() {
        assert_eq!(
            ObjectType::from_inverse_operation("removeRoutePartition"),
            Some(ObjectType::Partition)
        );
        assert_eq!(ObjectType::from_inverse_operation("dropTable"), None);
    }

    #[test]
    fn test_object_type_parse() {
        assert_eq!("device_pool".parse::<ObjectType>(), Ok(ObjectType::DevicePool));
        assert!("pool".parse::<ObjectType>().is_err());
    }

    #[test]
    fn test_object_document_rejects_mismatched_inputs() {
        let json = r#"{
            "type": "mrg",
            "name": "MRG_ELM",
            "description": "",
            "action": "create",
            "depends_on": [],
            "inputs": {"kind": "mrgl", "members": []}
        }"#;
        let err = serde_json::from_str::<PlanObject>(json).unwrap_err();
        assert!(err.to_string().contains("mrgl inputs"));
    }

    #[test]
    fn test_object_document_rejects_forward_dependency() {
        let json = r#"{
            "type": "location",
            "name": "LOC_ELM",
            "action": "create",
            "depends_on": ["device_pool"],
            "inputs": {"kind": "location", "hub_relationship": "Hub_None",
                       "audio_bw": null, "video_bw": null, "immersive_bw": null}
        }"#;
        assert!(serde_json::from_str::<PlanObject>(json).is_err());
    }

    #[test]
    fn test_plan_object_serializes_type_and_inputs() {
        let mut object = PlanObject::new(
            "CSS_ELM",
            "Elmhurst CSS",
            Action::Create,
            ObjectInputs::Css {
                members: vec![String::from("PT_ELM")],
            },
        );
        object.depends_on.insert(ObjectType::Partition);

        let value = serde_json::to_value(&object).unwrap();
        assert_eq!(value["type"], "css");
        assert_eq!(value["depends_on"][0], "partition");
        assert_eq!(value["inputs"]["members"][0], "PT_ELM");

        let back: PlanObject = serde_json::from_value(value).unwrap();
        assert_eq!(back, object);
    }

    #[test]
    fn test_summarize_counts_per_type_and_action() {
        let site = Site {
            site_code: String::from("ELM"),
            site_detail: String::from("Elmhurst"),
            objects: vec![
                PlanObject::new("P1", "", Action::Create, ObjectInputs::Partition),
                PlanObject::new("P2", "", Action::Skip, ObjectInputs::Partition),
                PlanObject::new("P3", "", Action::Create, ObjectInputs::Partition),
            ],
        };
        let summary = Plan::summarize(&[site]);
        assert_eq!(
            summary[&ObjectType::Partition],
            ActionCounts { create: 2, skip: 1 }
        );
    }
}
