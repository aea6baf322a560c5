//! Trust bootstrap
//!
//! Issues root, server leaf and client leaf in that order and packages them
//! for a transport layer. Any failure aborts the whole run, so callers either
//! get a complete [`TrustBundle`] or an error.

use std::time::Duration;
use tracing::info;

use crate::encoding::{ClientCredential, ServerCredential};
use crate::error::{CertError, CertResult};
use crate::issuer::{issue_root_with_policy, Authority};
use crate::serial::SerialPolicy;
use crate::trust::TrustAnchorSet;
use crate::validity::{ValidityWindow, DEFAULT_VALIDITY};

/// Bootstrap configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    /// Common name of the root authority
    pub root_name: String,

    /// Common name of the server leaf
    pub server_name: String,

    /// Common name of the client leaf
    pub client_name: String,

    /// Hostnames (or IP literals) the server leaf is valid for
    pub server_hostnames: Vec<String>,

    /// Lifetime of every issued certificate
    pub validity: Duration,

    /// Serial number assignment
    pub serial_policy: SerialPolicy,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            root_name: "trustroot-ca".to_string(),
            server_name: "trustroot-server".to_string(),
            client_name: "trustroot-client".to_string(),
            server_hostnames: vec!["localhost".to_string()],
            validity: DEFAULT_VALIDITY,
            serial_policy: SerialPolicy::Sequential,
        }
    }
}

impl BootstrapConfig {
    pub fn with_root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = name.into();
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn with_server_hostnames(mut self, hostnames: Vec<String>) -> Self {
        self.server_hostnames = hostnames;
        self
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    pub fn with_serial_policy(mut self, policy: SerialPolicy) -> Self {
        self.serial_policy = policy;
        self
    }

    /// Reject configurations that would fail halfway through issuance
    pub fn validate(&self) -> CertResult<()> {
        if self.validity.is_zero() {
            return Err(CertError::Signing(
                "Validity must be greater than zero".to_string(),
            ));
        }

        if self.server_hostnames.is_empty() {
            return Err(CertError::Signing(
                "Server leaf needs at least one hostname".to_string(),
            ));
        }

        let names = [&self.root_name, &self.server_name, &self.client_name];
        if names.iter().any(|name| name.trim().is_empty()) {
            return Err(CertError::Signing(
                "Certificate names must not be empty".to_string(),
            ));
        }

        if self.root_name == self.server_name || self.root_name == self.client_name {
            // A leaf whose subject equals its issuer looks self-signed
            return Err(CertError::Signing(format!(
                "Leaf names must differ from the root name '{}'",
                self.root_name
            )));
        }

        Ok(())
    }
}

/// Everything a transport layer needs for mutual TLS
#[derive(Debug, Clone)]
pub struct TrustBundle {
    /// Exactly the root certificate
    pub trust_anchors: TrustAnchorSet,

    /// Server certificate and key
    pub server: ServerCredential,

    /// Client certificate and key
    pub client: ClientCredential,
}

/// Issue the full hierarchy described by `config`
pub fn bootstrap(config: &BootstrapConfig) -> CertResult<TrustBundle> {
    config.validate()?;

    info!(
        "Bootstrapping trust hierarchy (root={}, validity={}s)",
        config.root_name,
        config.validity.as_secs()
    );

    let root_window = ValidityWindow::starting_now(config.validity)?;
    let root = issue_root_with_policy(&config.root_name, root_window, config.serial_policy)?;

    // The authority takes the root key; it is dropped when this function returns
    let authority = Authority::new(root, config.serial_policy)?;
    let trust_anchors = authority.trust_anchors();

    let server = authority
        .issue_server_leaf(&config.server_name, &config.server_hostnames, root_window)?
        .to_credential();

    let client = authority
        .issue_client_leaf(&config.client_name, root_window)?
        .to_credential();

    server.verify_key_match()?;
    client.verify_key_match()?;

    info!(
        "Trust hierarchy ready: server={} client={}",
        config.server_name, config.client_name
    );

    Ok(TrustBundle {
        trust_anchors,
        server,
        client,
    })
}

/// Bootstrap with [`BootstrapConfig::default`]
pub fn bootstrap_default() -> CertResult<TrustBundle> {
    bootstrap(&BootstrapConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BootstrapConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.validity, Duration::from_secs(3600));
        assert_eq!(config.server_hostnames, vec!["localhost".to_string()]);
    }

    #[test]
    fn test_config_builders() {
        let config = BootstrapConfig::default()
            .with_root_name("ca")
            .with_server_name("srv")
            .with_client_name("cli")
            .with_server_hostnames(vec!["example.test".to_string()])
            .with_validity(Duration::from_secs(60))
            .with_serial_policy(SerialPolicy::Random);

        assert_eq!(config.root_name, "ca");
        assert_eq!(config.server_name, "srv");
        assert_eq!(config.client_name, "cli");
        assert_eq!(config.validity, Duration::from_secs(60));
        assert_eq!(config.serial_policy, SerialPolicy::Random);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        let zero = BootstrapConfig::default().with_validity(Duration::ZERO);
        assert!(zero.validate().is_err());

        let no_hosts = BootstrapConfig::default().with_server_hostnames(vec![]);
        assert!(no_hosts.validate().is_err());

        let blank = BootstrapConfig::default().with_client_name(" ");
        assert!(blank.validate().is_err());

        let clash = BootstrapConfig::default().with_server_name("trustroot-ca");
        assert!(clash.validate().is_err());
    }

    #[test]
    fn test_bootstrap_fails_without_partial_output() {
        let config = BootstrapConfig::default().with_server_hostnames(vec![]);
        assert!(matches!(bootstrap(&config), Err(CertError::Signing(_))));
    }

    #[test]
    fn test_bootstrap_default() {
        let bundle = bootstrap_default().unwrap();

        assert_eq!(bundle.trust_anchors.len(), 1);
        assert!(bundle.server.verify_key_match().is_ok());
        assert!(bundle.client.verify_key_match().is_ok());
    }

    #[test]
    fn test_leaves_share_root_window() {
        let bundle = bootstrap_default().unwrap();
        let root =
            crate::inspect::CertificateInfo::from_der(&bundle.trust_anchors.certificates()[0])
                .unwrap();
        let server = bundle.server.info().unwrap();
        let client = bundle.client.info().unwrap();

        for leaf in [&server, &client] {
            assert_eq!(leaf.not_before, root.not_before);
            assert_eq!(leaf.not_after, root.not_after);
        }
    }
}
