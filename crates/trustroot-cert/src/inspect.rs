//! Read-only view of an issued certificate
//!
//! Parses DER with `x509-parser` and copies out the fields the trust
//! hierarchy cares about, so callers never hold borrowed parser types.

use x509_parser::prelude::*;

use crate::error::{CertError, CertResult};

/// Owned summary of an X.509 certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Serial number as big-endian bytes, leading zeros stripped
    pub serial: Vec<u8>,
    pub subject: String,
    pub subject_common_name: Option<String>,
    pub issuer: String,
    pub issuer_common_name: Option<String>,
    pub is_ca: bool,
    pub digital_signature: bool,
    pub key_encipherment: bool,
    pub key_cert_sign: bool,
    pub server_auth: bool,
    pub client_auth: bool,
    pub dns_names: Vec<String>,
    pub not_before: i64,
    pub not_after: i64,
    /// Subject public key bit string (uncompressed point for P-256)
    pub public_key: Vec<u8>,
}

impl CertificateInfo {
    /// Parse a DER-encoded certificate
    pub fn from_der(der: &[u8]) -> CertResult<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| CertError::Encoding(format!("Failed to parse certificate: {}", e)))?;

        let basic_constraints = cert
            .basic_constraints()
            .map_err(|e| CertError::Encoding(format!("Invalid basicConstraints: {}", e)))?;
        let key_usage = cert
            .key_usage()
            .map_err(|e| CertError::Encoding(format!("Invalid keyUsage: {}", e)))?;
        let extended_key_usage = cert
            .extended_key_usage()
            .map_err(|e| CertError::Encoding(format!("Invalid extendedKeyUsage: {}", e)))?;
        let subject_alt_name = cert
            .subject_alternative_name()
            .map_err(|e| CertError::Encoding(format!("Invalid subjectAltName: {}", e)))?;

        let dns_names = subject_alt_name
            .map(|san| {
                san.value
                    .general_names
                    .iter()
                    .filter_map(|name| match name {
                        GeneralName::DNSName(dns) => Some(dns.to_string()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let serial = strip_leading_zeros(cert.raw_serial()).to_vec();

        Ok(Self {
            serial,
            subject: cert.subject().to_string(),
            subject_common_name: common_name(cert.subject()),
            issuer: cert.issuer().to_string(),
            issuer_common_name: common_name(cert.issuer()),
            is_ca: basic_constraints.map(|bc| bc.value.ca).unwrap_or(false),
            digital_signature: key_usage
                .as_ref()
                .map(|ku| ku.value.digital_signature())
                .unwrap_or(false),
            key_encipherment: key_usage
                .as_ref()
                .map(|ku| ku.value.key_encipherment())
                .unwrap_or(false),
            key_cert_sign: key_usage
                .as_ref()
                .map(|ku| ku.value.key_cert_sign())
                .unwrap_or(false),
            server_auth: extended_key_usage
                .as_ref()
                .map(|eku| eku.value.server_auth)
                .unwrap_or(false),
            client_auth: extended_key_usage
                .as_ref()
                .map(|eku| eku.value.client_auth)
                .unwrap_or(false),
            dns_names,
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            public_key: cert.public_key().subject_public_key.data.to_vec(),
        })
    }

    /// Serial as an integer, if it fits in 64 bits
    pub fn serial_u64(&self) -> Option<u64> {
        if self.serial.len() > 8 {
            return None;
        }
        Some(
            self.serial
                .iter()
                .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)),
        )
    }

    /// Whether subject and issuer are the same name
    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }

    /// CA-sign-capability check
    ///
    /// Passes only for a CA certificate that also carries the
    /// certificate-sign key usage.
    pub fn ensure_can_sign(&self) -> CertResult<()> {
        if !self.is_ca {
            return Err(CertError::TrustValidation(format!(
                "Certificate '{}' is not a CA",
                self.subject
            )));
        }
        if !self.key_cert_sign {
            return Err(CertError::TrustValidation(format!(
                "Certificate '{}' lacks the keyCertSign usage",
                self.subject
            )));
        }
        Ok(())
    }
}

fn common_name(name: &X509Name<'_>) -> Option<String> {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(|cn| cn.to_string())
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(bytes.len().saturating_sub(1));
    &bytes[start..]
}
