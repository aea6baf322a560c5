//! Mutual-TLS configuration
//!
//! Both sides are built from a credential bundle plus the trust-anchor set.
//! The server demands and verifies a client certificate; the client verifies
//! the server chain and hostname binding and presents its own certificate.

use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::debug;
use trustroot_cert::{crypto_provider, ClientCredential, ServerCredential, TrustAnchorSet};

use crate::error::{TlsError, TlsResult};

/// Default limit for a single TLS handshake
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Listener-side configuration
#[derive(Debug, Clone)]
pub struct MtlsServerConfig {
    credential: ServerCredential,
    trust_anchors: TrustAnchorSet,

    /// ALPN protocols offered to clients, in preference order
    pub alpn_protocols: Vec<Vec<u8>>,

    /// Maximum time a client may take to complete the handshake
    pub handshake_timeout: Duration,
}

impl MtlsServerConfig {
    pub fn new(credential: ServerCredential, trust_anchors: TrustAnchorSet) -> Self {
        Self {
            credential,
            trust_anchors,
            alpn_protocols: Vec::new(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_alpn_protocols(mut self, protocols: Vec<Vec<u8>>) -> Self {
        self.alpn_protocols = protocols;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn credential(&self) -> &ServerCredential {
        &self.credential
    }

    pub fn trust_anchors(&self) -> &TrustAnchorSet {
        &self.trust_anchors
    }

    pub fn validate(&self) -> TlsResult<()> {
        validate_common(
            &self.trust_anchors,
            &self.alpn_protocols,
            self.handshake_timeout,
        )?;
        self.credential.verify_key_match()?;
        Ok(())
    }

    /// Build a TLS acceptor that requires a client certificate chaining to
    /// the trust anchors
    pub fn build_tls_acceptor(&self) -> TlsResult<TlsAcceptor> {
        self.validate()?;

        let provider = crypto_provider();
        let roots = Arc::new(self.trust_anchors.root_store()?);

        let client_verifier = WebPkiClientVerifier::builder_with_provider(roots, provider.clone())
            .build()
            .map_err(|e| {
                TlsError::Configuration(format!("Failed to build client verifier: {}", e))
            })?;

        let (certs, key) = self.credential.to_rustls()?;

        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| TlsError::Tls(format!("Unsupported protocol versions: {}", e)))?
            .with_client_cert_verifier(client_verifier)
            .with_single_cert(certs, key)
            .map_err(|e| TlsError::Tls(format!("Failed to load server certificate: {}", e)))?;

        config.alpn_protocols = self.alpn_protocols.clone();

        debug!(
            "Server TLS config ready ({} trust anchor(s))",
            self.trust_anchors.len()
        );

        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

/// Connector-side configuration
#[derive(Debug, Clone)]
pub struct MtlsClientConfig {
    credential: ClientCredential,
    trust_anchors: TrustAnchorSet,

    /// ALPN protocols requested from the server, in preference order
    pub alpn_protocols: Vec<Vec<u8>>,

    /// Maximum time for TCP connect plus handshake
    pub handshake_timeout: Duration,
}

impl MtlsClientConfig {
    pub fn new(credential: ClientCredential, trust_anchors: TrustAnchorSet) -> Self {
        Self {
            credential,
            trust_anchors,
            alpn_protocols: Vec::new(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_alpn_protocols(mut self, protocols: Vec<Vec<u8>>) -> Self {
        self.alpn_protocols = protocols;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn credential(&self) -> &ClientCredential {
        &self.credential
    }

    pub fn trust_anchors(&self) -> &TrustAnchorSet {
        &self.trust_anchors
    }

    pub fn validate(&self) -> TlsResult<()> {
        validate_common(
            &self.trust_anchors,
            &self.alpn_protocols,
            self.handshake_timeout,
        )?;
        self.credential.verify_key_match()?;
        Ok(())
    }

    /// Build a TLS connector that presents the client certificate
    pub fn build_tls_connector(&self) -> TlsResult<TlsConnector> {
        self.validate()?;

        let roots = self.trust_anchors.root_store()?;
        let (certs, key) = self.credential.to_rustls()?;

        let mut config = ClientConfig::builder_with_provider(crypto_provider())
            .with_safe_default_protocol_versions()
            .map_err(|e| TlsError::Tls(format!("Unsupported protocol versions: {}", e)))?
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)
            .map_err(|e| TlsError::Tls(format!("Failed to load client certificate: {}", e)))?;

        config.alpn_protocols = self.alpn_protocols.clone();

        debug!(
            "Client TLS config ready ({} trust anchor(s))",
            self.trust_anchors.len()
        );

        Ok(TlsConnector::from(Arc::new(config)))
    }
}

fn validate_common(
    trust_anchors: &TrustAnchorSet,
    alpn_protocols: &[Vec<u8>],
    handshake_timeout: Duration,
) -> TlsResult<()> {
    if trust_anchors.is_empty() {
        return Err(TlsError::Configuration(
            "At least one trust anchor is required".to_string(),
        ));
    }

    if handshake_timeout.is_zero() {
        return Err(TlsError::Configuration(
            "Handshake timeout must be > 0".to_string(),
        ));
    }

    if alpn_protocols.iter().any(|p| p.is_empty() || p.len() > 255) {
        return Err(TlsError::Configuration(
            "ALPN protocol names must be 1-255 bytes".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustroot_cert::{bootstrap_default, CredentialBundle};

    #[test]
    fn test_server_config_defaults() {
        let bundle = bootstrap_default().unwrap();
        let config = MtlsServerConfig::new(bundle.server, bundle.trust_anchors);

        assert_eq!(config.handshake_timeout, DEFAULT_HANDSHAKE_TIMEOUT);
        assert!(config.alpn_protocols.is_empty());
        assert!(config.validate().is_ok());
        assert!(config.build_tls_acceptor().is_ok());
    }

    #[test]
    fn test_client_config_builds() {
        let bundle = bootstrap_default().unwrap();
        let config = MtlsClientConfig::new(bundle.client, bundle.trust_anchors)
            .with_alpn_protocols(vec![b"trustroot/1".to_vec()])
            .with_handshake_timeout(Duration::from_secs(2));

        assert!(config.validate().is_ok());
        assert!(config.build_tls_connector().is_ok());
    }

    #[test]
    fn test_empty_trust_anchors_rejected() {
        let bundle = bootstrap_default().unwrap();
        let config = MtlsServerConfig::new(bundle.server, TrustAnchorSet::empty());

        assert!(matches!(
            config.build_tls_acceptor(),
            Err(TlsError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let bundle = bootstrap_default().unwrap();
        let config = MtlsClientConfig::new(bundle.client, bundle.trust_anchors)
            .with_handshake_timeout(Duration::ZERO);

        assert!(matches!(
            config.validate(),
            Err(TlsError::Configuration(_))
        ));
    }

    #[test]
    fn test_mismatched_credential_rejected() {
        let bundle = bootstrap_default().unwrap();
        let mixed = CredentialBundle::new(
            bundle.server.certificate_pem(),
            bundle.client.private_key_pem(),
        );
        let config = MtlsServerConfig::new(mixed, bundle.trust_anchors);

        assert!(matches!(config.validate(), Err(TlsError::Credential(_))));
    }

    #[test]
    fn test_empty_alpn_rejected() {
        let bundle = bootstrap_default().unwrap();
        let config = MtlsServerConfig::new(bundle.server, bundle.trust_anchors)
            .with_alpn_protocols(vec![Vec::new()]);

        assert!(matches!(
            config.validate(),
            Err(TlsError::Configuration(_))
        ));
    }
}
