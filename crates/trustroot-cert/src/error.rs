use thiserror::Error;

/// Certificate issuance and validation errors
///
/// None of these are retried. Each one aborts the operation that raised it,
/// and a failed bootstrap never hands out a partial hierarchy.
#[derive(Debug, Error)]
pub enum CertError {
    /// Entropy or algorithm failure while generating a key pair
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Malformed template or unsupported signing parameters
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Authority material could not be used as a signer
    #[error("Invalid signing authority: {0}")]
    ChainParse(String),

    /// A key or certificate could not be encoded or decoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// A certificate failed validation against the trust anchors
    #[error("Trust validation failed: {0}")]
    TrustValidation(String),
}

/// Result type for certificate operations
pub type CertResult<T> = Result<T, CertError>;
