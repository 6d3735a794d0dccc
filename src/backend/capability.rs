//! Capability negotiation
//!
//! A [`CapabilityToken`] is the only proof that a backend was checked
//! against this crate's record layouts. Pipeline construction takes one, so
//! nothing downstream has to ask whether the backend is usable.

use serde::{Deserialize, Serialize};

use super::SteppingBackend;
use crate::error::{PhysicsError, PhysicsResult};
use crate::records::LayoutManifest;

/// Whether the embedding application allows the backend to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entitlement {
    Granted,
    Denied { reason: String },
}

/// Result of a successful layout negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityToken {
    backend_name: String,
    fingerprint: u64,
    entitlement: Entitlement,
}

impl CapabilityToken {
    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn entitlement(&self) -> &Entitlement {
        &self.entitlement
    }

    /// Steps run only with a granted entitlement
    pub fn is_entitled(&self) -> bool {
        matches!(self.entitlement, Entitlement::Granted)
    }
}

/// Check `backend` against the binding layouts. Any mismatch is fatal.
pub fn negotiate(backend: &dyn SteppingBackend, entitlement: Entitlement) -> PhysicsResult<CapabilityToken> {
    negotiate_manifest(backend.name(), &backend.layout_manifest(), entitlement)
}

/// Negotiate against a manifest the backend reported
pub fn negotiate_manifest(
    backend_name: &str,
    backend_manifest: &LayoutManifest,
    entitlement: Entitlement,
) -> PhysicsResult<CapabilityToken> {
    let binding = LayoutManifest::binding();
    if let Err(error) = binding.compare(backend_manifest) {
        log::error!("[Capability::negotiate] {}: {}", backend_name, error);
        return Err(error);
    }

    let expected = binding.fingerprint();
    let found = backend_manifest.fingerprint();
    if expected != found {
        // Same layouts for every binding record, but the backend reports extra ones
        log::error!(
            "[Capability::negotiate] {}: fingerprint {:#018x} != {:#018x}",
            backend_name,
            found,
            expected
        );
        return Err(PhysicsError::CapabilityMismatch { expected, found });
    }

    match &entitlement {
        Entitlement::Granted => log::info!(
            "[Capability::negotiate] Backend '{}' accepted ({} record layouts, fingerprint {:#018x})",
            backend_name,
            binding.records.len(),
            expected
        ),
        Entitlement::Denied { reason } => log::warn!(
            "[Capability::negotiate] Backend '{}' layouts match but entitlement denied: {}",
            backend_name,
            reason
        ),
    }

    Ok(CapabilityToken {
        backend_name: backend_name.to_string(),
        fingerprint: expected,
        entitlement,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ReferenceBackend;
    use crate::records::RecordLayoutInfo;

    #[test]
    fn test_reference_backend_negotiates() {
        let backend = ReferenceBackend::new();
        let token = negotiate(&backend, Entitlement::Granted).expect("layouts match");
        assert!(token.is_entitled());
        assert_eq!(token.fingerprint(), LayoutManifest::binding().fingerprint());
        assert_eq!(token.backend_name(), "reference");
    }

    #[test]
    fn test_changed_field_offset_is_fatal() {
        let mut manifest = LayoutManifest::binding();
        let header = manifest
            .records
            .iter_mut()
            .find(|r| r.name == "JacobianHeader")
            .expect("jacobian header layout");
        header.fields[1].offset += 4;

        let err = negotiate_manifest("skewed", &manifest, Entitlement::Granted).expect_err("mismatch");
        assert!(err.is_fatal());
        assert!(matches!(err, PhysicsError::IncompatibleLayout { ref record, .. } if record == "JacobianHeader"));
    }

    #[test]
    fn test_extra_record_changes_fingerprint() {
        let mut manifest = LayoutManifest::binding();
        manifest.records.push(RecordLayoutInfo {
            name: "VendorExtension".to_string(),
            size: 16,
            align: 4,
            fields: Vec::new(),
        });

        let err = negotiate_manifest("extended", &manifest, Entitlement::Granted).expect_err("mismatch");
        assert!(matches!(err, PhysicsError::CapabilityMismatch { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_denied_entitlement_still_yields_token() {
        let token = negotiate_manifest(
            "reference",
            &LayoutManifest::binding(),
            Entitlement::Denied {
                reason: "trial expired".to_string(),
            },
        )
        .expect("layouts match");
        assert!(!token.is_entitled());
    }
}
