use thiserror::Error;
use trustroot_cert::CertError;

/// Mutual-TLS transport errors
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential error: {0}")]
    Credential(#[from] CertError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("TLS error: {0}")]
    Tls(String),

    /// The peer was reached but the handshake did not complete
    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Timeout")]
    Timeout,
}

pub type TlsResult<T> = Result<T, TlsError>;
