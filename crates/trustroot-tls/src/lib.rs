//! Mutual-TLS transport over tokio-rustls
//!
//! Turns the credential bundles and trust anchors produced by
//! `trustroot-cert` into a listener that only accepts clients holding a
//! certificate issued by the same root, and a connector that presents one.
//!
//! # Example
//!
//! ```no_run
//! use trustroot_cert::bootstrap_default;
//! use trustroot_tls::{MtlsClientConfig, MtlsConnector, MtlsListener, MtlsServerConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let bundle = bootstrap_default()?;
//!
//! let server = MtlsServerConfig::new(bundle.server, bundle.trust_anchors.clone());
//! let listener = MtlsListener::bind("127.0.0.1:0".parse()?, &server).await?;
//! let addr = listener.local_addr()?;
//!
//! let client = MtlsClientConfig::new(bundle.client, bundle.trust_anchors);
//! let connector = MtlsConnector::new(&client)?;
//!
//! let (accepted, connected) = tokio::join!(listener.accept(), connector.connect(addr, "localhost"));
//! let (_stream, peer) = accepted?;
//! println!("client: {}", peer.common_name);
//! # drop(connected);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod listener;

pub use config::{MtlsClientConfig, MtlsServerConfig, DEFAULT_HANDSHAKE_TIMEOUT};
pub use error::{TlsError, TlsResult};
pub use listener::{ClientStream, MtlsConnector, MtlsListener, PeerIdentity, ServerStream};
