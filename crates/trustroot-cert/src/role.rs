//! Template policy per identity role
//!
//! All three issuance flows go through [`IdentityRole::apply`], so the
//! CA flag and usage combinations can be read side by side here.

use rcgen::{
    BasicConstraints, CertificateParams, ExtendedKeyUsagePurpose, IsCa, KeyUsagePurpose,
};
use std::fmt;

/// Logical role of an identity in the hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityRole {
    /// Self-signed authority, the only trust anchor
    Root,
    /// Leaf presented by the listening endpoint
    ServerLeaf,
    /// Leaf presented by the connecting endpoint
    ClientLeaf,
}

impl IdentityRole {
    pub fn is_ca(&self) -> bool {
        matches!(self, IdentityRole::Root)
    }

    /// Whether a hostname binding (SAN) is required
    pub fn requires_hostname(&self) -> bool {
        matches!(self, IdentityRole::ServerLeaf)
    }

    pub fn key_usages(&self) -> Vec<KeyUsagePurpose> {
        match self {
            IdentityRole::Root => vec![
                KeyUsagePurpose::KeyEncipherment,
                KeyUsagePurpose::DigitalSignature,
                KeyUsagePurpose::KeyCertSign,
            ],
            IdentityRole::ServerLeaf | IdentityRole::ClientLeaf => vec![
                KeyUsagePurpose::KeyEncipherment,
                KeyUsagePurpose::DigitalSignature,
            ],
        }
    }

    /// Role-exclusive extended key usage; empty means unrestricted
    pub fn extended_key_usages(&self) -> Vec<ExtendedKeyUsagePurpose> {
        match self {
            IdentityRole::Root => vec![],
            IdentityRole::ServerLeaf => vec![ExtendedKeyUsagePurpose::ServerAuth],
            IdentityRole::ClientLeaf => vec![ExtendedKeyUsagePurpose::ClientAuth],
        }
    }

    /// Write this role's trust extensions into a template
    pub(crate) fn apply(&self, params: &mut CertificateParams) {
        params.is_ca = if self.is_ca() {
            IsCa::Ca(BasicConstraints::Unconstrained)
        } else {
            // Encode CA:FALSE rather than omitting basicConstraints
            IsCa::ExplicitNoCa
        };
        params.key_usages = self.key_usages();
        params.extended_key_usages = self.extended_key_usages();
        params.use_authority_key_identifier_extension = !self.is_ca();
    }
}

impl fmt::Display for IdentityRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdentityRole::Root => "root",
            IdentityRole::ServerLeaf => "server-leaf",
            IdentityRole::ClientLeaf => "client-leaf",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_root_is_ca() {
        assert!(IdentityRole::Root.is_ca());
        assert!(!IdentityRole::ServerLeaf.is_ca());
        assert!(!IdentityRole::ClientLeaf.is_ca());
    }

    #[test]
    fn test_only_root_can_sign_certificates() {
        assert!(IdentityRole::Root
            .key_usages()
            .contains(&KeyUsagePurpose::KeyCertSign));
        assert!(!IdentityRole::ServerLeaf
            .key_usages()
            .contains(&KeyUsagePurpose::KeyCertSign));
        assert!(!IdentityRole::ClientLeaf
            .key_usages()
            .contains(&KeyUsagePurpose::KeyCertSign));
    }

    #[test]
    fn test_extended_key_usage_is_role_exclusive() {
        assert!(IdentityRole::Root.extended_key_usages().is_empty());
        assert_eq!(
            IdentityRole::ServerLeaf.extended_key_usages(),
            vec![ExtendedKeyUsagePurpose::ServerAuth]
        );
        assert_eq!(
            IdentityRole::ClientLeaf.extended_key_usages(),
            vec![ExtendedKeyUsagePurpose::ClientAuth]
        );
    }

    #[test]
    fn test_apply_sets_basic_constraints() {
        let mut params = CertificateParams::default();
        IdentityRole::Root.apply(&mut params);
        assert!(matches!(
            params.is_ca,
            IsCa::Ca(BasicConstraints::Unconstrained)
        ));

        let mut params = CertificateParams::default();
        IdentityRole::ClientLeaf.apply(&mut params);
        assert!(matches!(params.is_ca, IsCa::ExplicitNoCa));
        assert!(params.use_authority_key_identifier_extension);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(IdentityRole::Root.to_string(), "root");
        assert_eq!(IdentityRole::ServerLeaf.to_string(), "server-leaf");
        assert_eq!(IdentityRole::ClientLeaf.to_string(), "client-leaf");
    }
}
