//! trustroot CLI
//!
//! Bootstraps a private root, server and client identity, starts a
//! mutual-TLS listener with the server identity and dials it once with the
//! client identity.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use trustroot_cert::{bootstrap, BootstrapConfig, SerialPolicy, TrustBundle};
use trustroot_tls::{
    MtlsClientConfig, MtlsConnector, MtlsListener, MtlsServerConfig, PeerIdentity, ServerStream,
    TlsError,
};

/// ALPN identifier for the request/greeting exchange
const ALPN_PROTOCOL: &[u8] = b"trustroot/1";

const REQUEST_LINE: &str = "HELLO trustroot/1\n";

/// trustroot - private PKI with a mutual-TLS round trip
#[derive(Parser, Debug)]
#[command(name = "trustroot")]
#[command(about = "Issue a private root plus server and client certificates, then prove them over mutual TLS")]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    /// Address the mTLS listener binds to
    #[arg(long, env = "TRUSTROOT_BIND", default_value = "127.0.0.1:8443")]
    bind: SocketAddr,

    /// Hostname the server certificate is issued for and the client dials
    #[arg(long, env = "TRUSTROOT_HOSTNAME", default_value = "localhost")]
    hostname: String,

    /// Lifetime of every issued certificate, in seconds
    #[arg(long, env = "TRUSTROOT_VALIDITY_SECS", default_value = "3600")]
    validity_secs: u64,

    /// Use random serial numbers instead of 1, 2, 3
    #[arg(long)]
    random_serials: bool,

    /// Print the root certificate (trust anchor) as PEM to stdout
    #[arg(long)]
    print_pem: bool,

    /// Keep serving clients after the demo exchange until Ctrl+C
    #[arg(long)]
    serve: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn bootstrap_config(&self) -> BootstrapConfig {
        let serial_policy = if self.random_serials {
            SerialPolicy::Random
        } else {
            SerialPolicy::Sequential
        };

        BootstrapConfig::default()
            .with_server_hostnames(vec![self.hostname.clone()])
            .with_validity(Duration::from_secs(self.validity_secs))
            .with_serial_policy(serial_policy)
    }
}

fn setup_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

/// Address the client dials to reach a listener bound to `bound`
fn dial_address(bound: SocketAddr) -> SocketAddr {
    match bound.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), bound.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), bound.port())
        }
        _ => bound,
    }
}

fn greeting(peer: &PeerIdentity) -> String {
    format!("You're using mutual TLS, {}\n", peer.common_name)
}

async fn handle_connection(stream: ServerStream, peer: PeerIdentity) -> Result<()> {
    let mut reader = BufReader::new(stream);

    let mut request = String::new();
    reader
        .read_line(&mut request)
        .await
        .context("Failed to read request")?;
    debug!("Request from {}: {}", peer, request.trim_end());

    let mut stream = reader.into_inner();
    stream
        .write_all(greeting(&peer).as_bytes())
        .await
        .context("Failed to send greeting")?;
    stream.shutdown().await.context("Failed to close stream")?;

    Ok(())
}

async fn serve(listener: MtlsListener) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, peer).await {
                        warn!("Connection error: {:#}", e);
                    }
                });
            }
            Err(TlsError::Handshake(_)) | Err(TlsError::Timeout) => {
                // Already logged by the listener
                continue;
            }
            Err(e) => return Err(e).context("Listener failed"),
        }
    }
}

async fn request_greeting(
    bundle: &TrustBundle,
    addr: SocketAddr,
    hostname: &str,
) -> Result<String> {
    let config = MtlsClientConfig::new(bundle.client.clone(), bundle.trust_anchors.clone())
        .with_alpn_protocols(vec![ALPN_PROTOCOL.to_vec()]);
    let connector = MtlsConnector::new(&config).context("Failed to configure client")?;

    let mut stream = connector
        .connect(addr, hostname)
        .await
        .with_context(|| format!("Failed to connect to {} as {}", addr, hostname))?;

    stream
        .write_all(REQUEST_LINE.as_bytes())
        .await
        .context("Failed to send request")?;

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .context("Failed to read greeting")?;

    Ok(response)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider
    let _ =
        rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider());

    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    info!("trustroot starting...");

    let bundle =
        bootstrap(&cli.bootstrap_config()).context("Failed to bootstrap trust hierarchy")?;

    if cli.print_pem {
        print!("{}", bundle.trust_anchors.to_pem());
    }

    let server_config = MtlsServerConfig::new(bundle.server.clone(), bundle.trust_anchors.clone())
        .with_alpn_protocols(vec![ALPN_PROTOCOL.to_vec()]);
    let listener = MtlsListener::bind(cli.bind, &server_config)
        .await
        .context("Failed to start mTLS listener")?;
    let addr = dial_address(listener.local_addr()?);

    let server_task = tokio::spawn(serve(listener));

    let response = request_greeting(&bundle, addr, &cli.hostname).await?;
    info!("Server replied: {}", response.trim_end());

    if !cli.serve {
        server_task.abort();
        info!("trustroot finished");
        return Ok(());
    }

    info!("Serving on {} (Ctrl+C to stop)", addr);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tokio::select! {
        _ = &mut ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        result = server_task => {
            match result {
                Ok(Ok(())) => info!("Listener stopped"),
                Ok(Err(e)) => {
                    error!("Listener error: {:#}", e);
                    return Err(e);
                }
                Err(e) => {
                    error!("Listener task panicked: {}", e);
                    return Err(e.into());
                }
            }
        }
    }

    info!("trustroot stopped");
    Ok(())
}
