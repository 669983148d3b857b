//! Site record schema and loading.
//!
//! A site record is one row of declarative input: identity fields used by
//! the naming templates plus the per-type settings of the objects planned
//! for that site.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};
use validator::Validate;

use crate::error::{ConfigError, Result, SiteplanError};

/// One declarative site record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SiteRow {
    /// Site code, the natural key (upper-cased).
    #[validate(length(min = 1, message = "site_code must not be empty"))]
    pub site_code: String,
    /// Human-readable detail, e.g. "Elmhurst, IL".
    #[validate(length(min = 1, message = "site_detail must not be empty"))]
    pub site_detail: String,
    /// Two-letter state code (upper-cased).
    #[validate(length(equal = 2, message = "state must be a two-letter code"))]
    pub state: String,
    /// City name.
    #[validate(length(min = 1, message = "city must not be empty"))]
    pub city: String,

    /// Region audio codec preference list.
    #[serde(default)]
    pub region_audio_codec_preference_list: Option<String>,
    /// Region maximum audio bitrate.
    #[serde(default)]
    pub region_max_audio_bitrate: Option<String>,
    /// Region maximum video bitrate.
    #[serde(default)]
    pub region_max_video_bitrate: Option<String>,
    /// Region maximum immersive bitrate.
    #[serde(default)]
    pub region_max_immersive_bitrate: Option<String>,

    /// Location audio bandwidth ("Unlimited" or kbps).
    #[serde(default)]
    pub location_audio_bw: Option<String>,
    /// Location video bandwidth.
    #[serde(default)]
    pub location_video_bw: Option<String>,
    /// Location immersive bandwidth.
    #[serde(default)]
    pub location_immersive_bw: Option<String>,

    /// Physical location description.
    #[serde(default)]
    pub physical_location_description: Option<String>,

    /// SRST gateway address; SRST is planned only when set.
    #[serde(default)]
    pub srst_ip: Option<String>,

    /// Comma-separated CSS members, used when no blueprint is configured.
    #[serde(default)]
    pub css_members: Option<String>,
    /// Comma-separated media resources for the MRG.
    #[serde(default)]
    pub mrg_members: Option<String>,
    /// Comma-separated MRGs for the MRGL; `SITE_MRG` means this site's MRG.
    #[serde(default)]
    pub mrgl_members: Option<String>,

    /// Call manager group for the device pool.
    #[serde(default)]
    pub ucm_group: Option<String>,
    /// Date/time group for the device pool.
    #[serde(default)]
    pub date_time_group: Option<String>,
    /// Softkey template.
    #[serde(default)]
    pub softkey_template: Option<String>,
    /// Device mobility group for the device pool.
    #[serde(default)]
    pub device_mobility_group: Option<String>,

    /// Device mobility subnet.
    #[serde(default)]
    pub mobility_subnet: Option<String>,
    /// Device mobility subnet mask.
    #[serde(default)]
    pub mobility_mask: Option<String>,
}

/// Splits a comma-separated list, dropping empty entries.
#[must_use]
pub fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl SiteRow {
    /// Returns the row with site code and state trimmed and upper-cased.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.site_code = self.site_code.trim().to_uppercase();
        self.state = self.state.trim().to_uppercase();
        self
    }

    /// CSS members as a list.
    #[must_use]
    pub fn css_members_list(&self) -> Vec<String> {
        split_list(self.css_members.as_deref())
    }

    /// MRG members as a list.
    #[must_use]
    pub fn mrg_members_list(&self) -> Vec<String> {
        split_list(self.mrg_members.as_deref())
    }

    /// MRGL members as a list.
    #[must_use]
    pub fn mrgl_members_list(&self) -> Vec<String> {
        split_list(self.mrgl_members.as_deref())
    }

    /// The SRST address, if SRST is enabled for this site.
    #[must_use]
    pub fn srst_address(&self) -> Option<&str> {
        non_empty(self.srst_ip.as_deref())
    }

    /// Subnet and mask, if device mobility is enabled for this site.
    #[must_use]
    pub fn mobility_subnet(&self) -> Option<(&str, &str)> {
        non_empty(self.mobility_subnet.as_deref()).zip(non_empty(self.mobility_mask.as_deref()))
    }

    /// Validates the row, returning a readable message on failure.
    ///
    /// # Errors
    ///
    /// Returns the joined validation messages if any field is invalid.
    pub fn check(&self) -> std::result::Result<(), String> {
        self.validate().map_err(|errors| {
            let mut messages: Vec<String> = errors
                .field_errors()
                .values()
                .flat_map(|errs| errs.iter())
                .map(|e| {
                    e.message
                        .as_ref()
                        .map_or_else(|| e.code.to_string(), ToString::to_string)
                })
                .collect();
            messages.sort();
            messages.join("; ")
        })
    }
}

/// Loads site records from a YAML or JSON file containing a list of rows.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_sites(path: impl AsRef<Path>) -> Result<Vec<SiteRow>> {
    let path = path.as_ref();
    info!("Loading site records from: {}", path.display());

    if !path.exists() {
        return Err(SiteplanError::Config(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        }));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::parse(format!("Failed to read file: {e}"), path.display().to_string())
    })?;

    parse_sites(&content, &path.display().to_string())
}

/// Parses site records from YAML or JSON text.
///
/// # Errors
///
/// Returns an error if the text is not a list of site records.
pub fn parse_sites(content: &str, location: &str) -> Result<Vec<SiteRow>> {
    let rows: Vec<SiteRow> = serde_yaml::from_str(content)
        .map_err(|e| ConfigError::parse(format!("Site records parse error: {e}"), location))?;

    debug!("Parsed {} site records", rows.len());
    Ok(rows.into_iter().map(SiteRow::normalized).collect())
}
