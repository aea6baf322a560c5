//! Private PKI for mutual TLS
//!
//! Issues a self-signed ECDSA P-256 root, a server-authentication leaf and a
//! client-authentication leaf, and encodes them as PEM bundles a TLS layer
//! can load directly.
//!
//! # Example
//!
//! ```no_run
//! use trustroot_cert::bootstrap_default;
//!
//! let bundle = bootstrap_default()?;
//! println!("{}", bundle.trust_anchors.to_pem());
//! # Ok::<(), trustroot_cert::CertError>(())
//! ```

pub mod bootstrap;
pub mod encoding;
pub mod error;
pub mod inspect;
pub mod issuer;
pub mod keys;
pub mod role;
pub mod serial;
pub mod trust;
pub mod validity;

pub use bootstrap::{bootstrap, bootstrap_default, BootstrapConfig, TrustBundle};
pub use encoding::{
    decode_certificate_pem, decode_certificates_pem, decode_private_key_pem,
    encode_certificate_pem, ClientCredential, CredentialBundle, ServerCredential,
};
pub use error::{CertError, CertResult};
pub use inspect::CertificateInfo;
pub use issuer::{issue_root, issue_root_with_policy, Authority, IssuedCertificate};
pub use keys::{generate_keypair, load_private_key_pem, KEY_ALGORITHM};
pub use role::IdentityRole;
pub use serial::{SerialAllocator, SerialPolicy, ROOT_SERIAL};
pub use trust::{crypto_provider, TrustAnchorSet};
pub use validity::{ValidityWindow, DEFAULT_VALIDITY};
