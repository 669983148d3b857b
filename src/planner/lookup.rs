//! Existence lookups used to classify planned objects.

use tracing::warn;

use super::types::{Action, ObjectType};

/// Answers whether an object already exists on the remote system.
///
/// Lookups are advisory: a failing lookup never fails planning.
pub trait ExistenceLookup {
    /// Checks whether an object of `object_type` named `name` exists.
    ///
    /// # Errors
    ///
    /// Returns a message if the lookup itself could not be performed.
    fn exists(&self, object_type: ObjectType, name: &str) -> Result<bool, String>;
}

impl<F> ExistenceLookup for F
where
    F: Fn(ObjectType, &str) -> Result<bool, String>,
{
    fn exists(&self, object_type: ObjectType, name: &str) -> Result<bool, String> {
        self(object_type, name)
    }
}

/// Classifies an object as create or skip.
///
/// Without a lookup, or when the lookup fails, the object is planned for
/// creation; a failure also appends a warning.
pub fn classify(
    lookup: Option<&dyn ExistenceLookup>,
    object_type: ObjectType,
    name: &str,
    site_code: &str,
    warnings: &mut Vec<String>,
) -> Action {
    let Some(lookup) = lookup else {
        return Action::Create;
    };

    match lookup.exists(object_type, name) {
        Ok(true) => Action::Skip,
        Ok(false) => Action::Create,
        Err(e) => {
            warn!("{site_code}: exists check failed for {object_type} '{name}': {e}");
            warnings.push(format!(
                "{site_code}: exists check failed for {object_type} '{name}': {e}"
            ));
            Action::Create
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_lookup_creates() {
        let mut warnings = Vec::new();
        let action = classify(None, ObjectType::Region, "R_ELM", "ELM", &mut warnings);
        assert_eq!(action, Action::Create);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_existing_object_skipped() {
        let lookup = |_: ObjectType, name: &str| Ok::<bool, String>(name == "R_ELM");
        let mut warnings = Vec::new();
        assert_eq!(
            classify(Some(&lookup), ObjectType::Region, "R_ELM", "ELM", &mut warnings),
            Action::Skip
        );
        assert_eq!(
            classify(Some(&lookup), ObjectType::Region, "R_OAK", "OAK", &mut warnings),
            Action::Create
        );
    }

    #[test]
    fn test_failed_lookup_warns_and_creates() {
        let lookup = |_: ObjectType, _: &str| Err::<bool, String>(String::from("timeout"));
        let mut warnings = Vec::new();
        let action = classify(Some(&lookup), ObjectType::Srst, "SRST_ELM", "ELM", &mut warnings);
        assert_eq!(action, Action::Create);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("timeout"));
        assert!(warnings[0].starts_with("ELM:"));
    }
}
