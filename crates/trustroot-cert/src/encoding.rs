//! PEM encoding for certificates, private keys and credential bundles

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fmt;

use crate::error::{CertError, CertResult};
use crate::inspect::CertificateInfo;
use crate::keys::{load_private_key_pem, public_key_bytes};

const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// Encode DER certificate bytes as a single `CERTIFICATE` PEM block
pub fn encode_certificate_pem(der: &[u8]) -> String {
    let block = pem::Pem::new(CERTIFICATE_TAG, der.to_vec());
    pem::encode_config(
        &block,
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}

/// Decode every `CERTIFICATE` block in `pem`
pub fn decode_certificates_pem(pem: &str) -> CertResult<Vec<CertificateDer<'static>>> {
    let mut reader = pem.as_bytes();

    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CertError::Encoding(format!("Failed to parse certificates: {}", e)))
}

/// Decode exactly one `CERTIFICATE` block
pub fn decode_certificate_pem(pem: &str) -> CertResult<CertificateDer<'static>> {
    let mut certs = decode_certificates_pem(pem)?;

    match certs.len() {
        1 => Ok(certs.remove(0)),
        0 => Err(CertError::Encoding("No certificate found".to_string())),
        n => Err(CertError::Encoding(format!(
            "Expected one certificate, found {}",
            n
        ))),
    }
}

/// Decode the first private key block (PKCS#8, SEC1 or PKCS#1)
pub fn decode_private_key_pem(pem: &str) -> CertResult<PrivateKeyDer<'static>> {
    let mut reader = pem.as_bytes();

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| CertError::Encoding(format!("Failed to parse key: {}", e)))?
        .ok_or_else(|| CertError::Encoding("No private key found".to_string()))
}

/// Certificate plus private key, ready for a transport layer
///
/// The two PEM strings are independent. The certificate may be shared with
/// any peer; the private key stays with the owning endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    certificate_pem: String,
    private_key_pem: String,
}

/// Credential presented by the listening endpoint
pub type ServerCredential = CredentialBundle;

/// Credential presented by the connecting endpoint
pub type ClientCredential = CredentialBundle;

impl CredentialBundle {
    pub fn new(certificate_pem: impl Into<String>, private_key_pem: impl Into<String>) -> Self {
        Self {
            certificate_pem: certificate_pem.into(),
            private_key_pem: private_key_pem.into(),
        }
    }

    pub fn certificate_pem(&self) -> &str {
        &self.certificate_pem
    }

    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }

    pub fn certificate_der(&self) -> CertResult<CertificateDer<'static>> {
        decode_certificate_pem(&self.certificate_pem)
    }

    pub fn private_key_der(&self) -> CertResult<PrivateKeyDer<'static>> {
        decode_private_key_pem(&self.private_key_pem)
    }

    /// Parsed view of the certificate
    pub fn info(&self) -> CertResult<CertificateInfo> {
        let der = self.certificate_der()?;
        CertificateInfo::from_der(&der)
    }

    /// Check that the certificate's public key belongs to the private key
    pub fn verify_key_match(&self) -> CertResult<()> {
        let info = self.info()?;
        let key_pair = load_private_key_pem(&self.private_key_pem)?;

        if info.public_key.as_slice() != public_key_bytes(&key_pair) {
            return Err(CertError::Encoding(format!(
                "Public key in certificate '{}' does not match the private key",
                info.subject
            )));
        }

        Ok(())
    }

    /// Certificate chain and key in the form rustls configs expect
    pub fn to_rustls(&self) -> CertResult<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
        let cert = self.certificate_der()?;
        let key = self.private_key_der()?;
        Ok((vec![cert], key))
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("certificate_pem", &self.certificate_pem)
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}
