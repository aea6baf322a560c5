//! Trust-anchor set and leaf verification
//!
//! Verification delegates to rustls' WebPKI verifiers so that the checks
//! here are exactly the ones a TLS handshake will apply: signature chain,
//! validity window, role-specific extended key usage and, for servers, the
//! hostname binding.

use rustls::client::danger::ServerCertVerifier;
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use std::sync::Arc;
use tracing::debug;

use crate::encoding::{decode_certificates_pem, encode_certificate_pem};
use crate::error::{CertError, CertResult};
use crate::inspect::CertificateInfo;

/// rustls crypto provider used for every verification in this crate
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Root certificates accepted as chain termini
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustAnchorSet {
    roots: Vec<CertificateDer<'static>>,
}

impl TrustAnchorSet {
    /// Set that trusts nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set containing exactly one root
    pub fn from_root(root: CertificateDer<'static>) -> Self {
        Self { roots: vec![root] }
    }

    /// Parse a PEM bundle of root certificates
    pub fn from_pem(pem: &str) -> CertResult<Self> {
        let mut anchors = Self::empty();
        for der in decode_certificates_pem(pem)? {
            anchors.add(der)?;
        }
        Ok(anchors)
    }

    /// Add a root; only CA certificates able to sign are accepted
    pub fn add(&mut self, root: CertificateDer<'static>) -> CertResult<()> {
        CertificateInfo::from_der(&root)?.ensure_can_sign()?;
        self.roots.push(root);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn certificates(&self) -> &[CertificateDer<'static>] {
        &self.roots
    }

    /// Concatenated `CERTIFICATE` blocks
    pub fn to_pem(&self) -> String {
        self.roots
            .iter()
            .map(|der| encode_certificate_pem(der))
            .collect()
    }

    /// Root store for rustls configs and verifiers
    pub fn root_store(&self) -> CertResult<RootCertStore> {
        let mut store = RootCertStore::empty();
        for root in &self.roots {
            store.add(root.clone()).map_err(|e| {
                CertError::TrustValidation(format!("Invalid trust anchor: {}", e))
            })?;
        }
        Ok(store)
    }

    fn non_empty_store(&self) -> CertResult<Arc<RootCertStore>> {
        if self.is_empty() {
            return Err(CertError::TrustValidation(
                "Trust anchor set is empty".to_string(),
            ));
        }
        Ok(Arc::new(self.root_store()?))
    }

    /// Verify `leaf` as a client-authentication certificate
    pub fn verify_client_leaf(&self, leaf: &CertificateDer<'_>) -> CertResult<()> {
        let roots = self.non_empty_store()?;

        let verifier = WebPkiClientVerifier::builder_with_provider(roots, crypto_provider())
            .build()
            .map_err(|e| CertError::TrustValidation(e.to_string()))?;

        verifier
            .verify_client_cert(leaf, &[], UnixTime::now())
            .map_err(|e| {
                CertError::TrustValidation(format!("Client certificate rejected: {}", e))
            })?;

        debug!("Client certificate chains to trust anchors");
        Ok(())
    }

    /// Verify `leaf` as a server-authentication certificate for `hostname`
    pub fn verify_server_leaf(&self, leaf: &CertificateDer<'_>, hostname: &str) -> CertResult<()> {
        let roots = self.non_empty_store()?;

        let server_name = ServerName::try_from(hostname.to_string()).map_err(|e| {
            CertError::TrustValidation(format!("Invalid server name '{}': {}", hostname, e))
        })?;

        let verifier = WebPkiServerVerifier::builder_with_provider(roots, crypto_provider())
            .build()
            .map_err(|e| CertError::TrustValidation(e.to_string()))?;

        verifier
            .verify_server_cert(leaf, &[], &server_name, &[], UnixTime::now())
            .map_err(|e| {
                CertError::TrustValidation(format!("Server certificate rejected: {}", e))
            })?;

        debug!("Server certificate for {} chains to trust anchors", hostname);
        Ok(())
    }
}
