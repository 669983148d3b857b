//! Plan hashing for change detection.
//!
//! The hash covers only what an execution acts on: sites, object identity,
//! actions and inputs. Plan ids and timestamps are excluded, so two builds
//! of the same input hash identically.

use sha2::{Digest, Sha256};

use super::types::{Plan, PlanObject, Site};

/// Hasher for computing plan hashes.
#[derive(Debug, Default)]
pub struct PlanHasher;

impl PlanHasher {
    /// Creates a new plan hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the plan's content.
    #[must_use]
    pub fn hash_plan(&self, plan: &Plan) -> String {
        let mut hasher = Sha256::new();

        hasher.update(plan.org.as_bytes());
        hasher.update(plan.env_name.as_bytes());

        for site in &plan.sites {
            hasher.update(self.hash_site(site).as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a hash for a single site.
    #[must_use]
    pub fn hash_site(&self, site: &Site) -> String {
        let mut hasher = Sha256::new();

        hasher.update(site.site_code.as_bytes());
        hasher.update(site.site_detail.as_bytes());

        for object in &site.objects {
            Self::update_object(&mut hasher, object);
        }

        hex::encode(hasher.finalize())
    }

    fn update_object(hasher: &mut Sha256, object: &PlanObject) {
        hasher.update(object.object_type.as_str().as_bytes());
        hasher.update(object.name.as_bytes());
        hasher.update(object.description.as_bytes());
        hasher.update(object.action.to_string().as_bytes());

        for dep in &object.depends_on {
            hasher.update(dep.as_str().as_bytes());
        }

        // Field order is fixed by the type definitions.
        if let Ok(inputs) = serde_json::to_vec(&object.inputs) {
            hasher.update(&inputs);
        }
        hasher.update([0u8]);
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes in constant time.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}
