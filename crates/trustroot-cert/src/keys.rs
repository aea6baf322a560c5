//! Key pair generation
//!
//! Every identity in the hierarchy uses ECDSA over NIST P-256 with SHA-256.
//! Randomness comes from ring's system RNG through rcgen.

use rcgen::{KeyPair, SignatureAlgorithm, PKCS_ECDSA_P256_SHA256};
use tracing::trace;

use crate::error::{CertError, CertResult};

/// Signature algorithm used for all generated keys
pub const KEY_ALGORITHM: &SignatureAlgorithm = &PKCS_ECDSA_P256_SHA256;

/// Generate a fresh P-256 key pair
///
/// The returned [`KeyPair`] owns both halves: the private scalar
/// (`serialize_der`/`serialize_pem`) and the public point
/// (`public_key_raw`/`public_key_der`).
pub fn generate_keypair() -> CertResult<KeyPair> {
    let key_pair = KeyPair::generate_for(KEY_ALGORITHM)
        .map_err(|e| CertError::KeyGeneration(e.to_string()))?;

    trace!("Generated P-256 key pair");

    Ok(key_pair)
}

/// Uncompressed SEC1 public point, as carried in a certificate's SPKI
pub fn public_key_bytes(key_pair: &KeyPair) -> &[u8] {
    key_pair.public_key_raw()
}

/// Load a PKCS#8 private key from a PEM block
pub fn load_private_key_pem(pem: &str) -> CertResult<KeyPair> {
    let key_pair = KeyPair::from_pem(pem)
        .map_err(|e| CertError::Encoding(format!("Failed to parse private key: {}", e)))?;

    if key_pair.algorithm() != KEY_ALGORITHM {
        return Err(CertError::Encoding(
            "Private key is not an ECDSA P-256 key".to_string(),
        ));
    }

    Ok(key_pair)
}
