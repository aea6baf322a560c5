//! Mutual-TLS listener and connector

use rustls::pki_types::{CertificateDer, ServerName};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{debug, info, warn};
use trustroot_cert::CertificateInfo;

use crate::config::{MtlsClientConfig, MtlsServerConfig};
use crate::error::{TlsError, TlsResult};

/// Server half of an established connection
pub type ServerStream = tokio_rustls::server::TlsStream<TcpStream>;

/// Client half of an established connection
pub type ClientStream = tokio_rustls::client::TlsStream<TcpStream>;

/// Verified identity of the client on an accepted connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub common_name: String,
    pub subject: String,
    /// Certificate serial, big-endian
    pub serial: Vec<u8>,
    pub remote_addr: SocketAddr,
}

impl PeerIdentity {
    /// Read the identity out of the peer's end-entity certificate
    pub fn from_certificate(der: &CertificateDer<'_>, remote_addr: SocketAddr) -> TlsResult<Self> {
        let info = CertificateInfo::from_der(der)?;

        let common_name = info
            .subject_common_name
            .clone()
            .unwrap_or_else(|| info.subject.clone());

        Ok(Self {
            common_name,
            subject: info.subject,
            serial: info.serial,
            remote_addr,
        })
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.common_name, self.remote_addr)
    }
}

/// TCP listener that only yields connections with a verified client
pub struct MtlsListener {
    tcp_listener: TcpListener,
    tls_acceptor: TlsAcceptor,
    handshake_timeout: Duration,
}

impl fmt::Debug for MtlsListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MtlsListener")
            .field("local_addr", &self.tcp_listener.local_addr())
            .field("handshake_timeout", &self.handshake_timeout)
            .finish()
    }
}

impl MtlsListener {
    pub async fn bind(bind_addr: SocketAddr, config: &MtlsServerConfig) -> TlsResult<Self> {
        let tls_acceptor = config.build_tls_acceptor()?;

        let tcp_listener = TcpListener::bind(bind_addr).await.map_err(|e| {
            TlsError::Configuration(format!("Failed to bind {}: {}", bind_addr, e))
        })?;

        let local_addr = tcp_listener.local_addr()?;
        info!("mTLS listener bound to {}", local_addr);

        Ok(Self {
            tcp_listener,
            tls_acceptor,
            handshake_timeout: config.handshake_timeout,
        })
    }

    pub fn local_addr(&self) -> TlsResult<SocketAddr> {
        Ok(self.tcp_listener.local_addr()?)
    }

    /// Accept one connection and complete the handshake
    ///
    /// A client that presents no certificate, or one that does not chain to
    /// the trust anchors, yields [`TlsError::Handshake`]. The listener stays
    /// usable afterwards.
    pub async fn accept(&self) -> TlsResult<(ServerStream, PeerIdentity)> {
        let (tcp_stream, remote_addr) = self.tcp_listener.accept().await?;
        debug!("Incoming TCP connection from {}", remote_addr);

        let tls_stream =
            match timeout(self.handshake_timeout, self.tls_acceptor.accept(tcp_stream)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    warn!("TLS handshake failed from {}: {}", remote_addr, e);
                    return Err(TlsError::Handshake(e.to_string()));
                }
                Err(_) => {
                    warn!("TLS handshake from {} timed out", remote_addr);
                    return Err(TlsError::Timeout);
                }
            };

        let peer_cert = tls_stream
            .get_ref()
            .1
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or_else(|| TlsError::Handshake("Peer presented no certificate".to_string()))?;

        let identity = PeerIdentity::from_certificate(peer_cert, remote_addr)?;
        info!("mTLS connection established from {}", identity);

        Ok((tls_stream, identity))
    }
}

/// Outbound connector presenting the client certificate
pub struct MtlsConnector {
    tls_connector: TlsConnector,
    handshake_timeout: Duration,
}

impl fmt::Debug for MtlsConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MtlsConnector")
            .field("handshake_timeout", &self.handshake_timeout)
            .finish()
    }
}

impl MtlsConnector {
    pub fn new(config: &MtlsClientConfig) -> TlsResult<Self> {
        let tls_connector = config.build_tls_connector()?;

        debug!("mTLS connector created");

        Ok(Self {
            tls_connector,
            handshake_timeout: config.handshake_timeout,
        })
    }

    /// Connect to `addr`, expecting its certificate to be valid for `server_name`
    pub async fn connect(&self, addr: SocketAddr, server_name: &str) -> TlsResult<ClientStream> {
        debug!("Connecting to mTLS server: {} ({})", server_name, addr);

        let dns_name = ServerName::try_from(server_name.to_string()).map_err(|e| {
            TlsError::Configuration(format!("Invalid server name '{}': {}", server_name, e))
        })?;

        let handshake = async {
            let tcp_stream = TcpStream::connect(addr).await?;

            let tls_stream = self
                .tls_connector
                .connect(dns_name, tcp_stream)
                .await
                .map_err(|e| TlsError::Handshake(e.to_string()))?;

            Ok::<_, TlsError>(tls_stream)
        };

        let tls_stream = timeout(self.handshake_timeout, handshake)
            .await
            .map_err(|_| TlsError::Timeout)??;

        info!("mTLS connection established to {} ({})", server_name, addr);

        Ok(tls_stream)
    }
}
