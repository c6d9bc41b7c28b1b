//! Aux service

use dss_core::models::Owner;
use dss_core::{DssError, DssResult};

/// Auxiliary operations: build identification and token introspection.
pub struct AuxService {
    version: String,
}

impl AuxService {
    pub fn new() -> AuxService {
        AuxService {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// The running build's version string.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Confirms the bearer token was accepted and, when an expected owner
    /// is supplied, that it matches the token subject.
    pub fn validate_oauth(&self, owner: &Owner, expected: Option<&str>) -> DssResult<Owner> {
        if let Some(expected) = expected {
            if expected != owner.0 {
                return Err(DssError::PermissionDenied(format!(
                    "Token owner {owner} does not match expected owner {expected}"
                )));
            }
        }
        Ok(owner.clone())
    }
}

impl Default for AuxService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_oauth_matches_owner() {
        let aux = AuxService::new();
        let owner = Owner::new("uss1");
        assert!(aux.validate_oauth(&owner, None).is_ok());
        assert!(aux.validate_oauth(&owner, Some("uss1")).is_ok());
        assert!(matches!(
            aux.validate_oauth(&owner, Some("uss2")),
            Err(DssError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_version_is_set() {
        assert!(!AuxService::new().version().is_empty());
    }
}
