//! Mutual-TLS handshake over loopback
//!
//! Every scenario bootstraps a fresh hierarchy, binds a listener on an
//! ephemeral port and dials it with a connector.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;
use trustroot_cert::{bootstrap_default, generate_keypair, CredentialBundle, TrustBundle};
use trustroot_tls::{
    MtlsClientConfig, MtlsConnector, MtlsListener, MtlsServerConfig, PeerIdentity, TlsError,
};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("trustroot_tls=debug,trustroot_cert=debug"))
        .try_init();
}

async fn listen(bundle: &TrustBundle) -> (MtlsListener, SocketAddr) {
    let config = MtlsServerConfig::new(bundle.server.clone(), bundle.trust_anchors.clone());
    let listener = MtlsListener::bind("127.0.0.1:0".parse().unwrap(), &config)
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

fn connector(credential: CredentialBundle, bundle: &TrustBundle) -> MtlsConnector {
    let config = MtlsClientConfig::new(credential, bundle.trust_anchors.clone());
    MtlsConnector::new(&config).unwrap()
}

/// Self-signed client certificate that does not descend from any root we trust
fn rogue_credential() -> CredentialBundle {
    let key_pair = generate_keypair().unwrap();
    let mut params = rcgen::CertificateParams::new(Vec::new()).unwrap();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, "trustroot-client");
    params.extended_key_usages = vec![rcgen::ExtendedKeyUsagePurpose::ClientAuth];
    let cert = params.self_signed(&key_pair).unwrap();

    CredentialBundle::new(cert.pem(), key_pair.serialize_pem())
}

#[tokio::test]
async fn test_mutual_tls_exchange() {
    init_tracing();
    let bundle = bootstrap_default().unwrap();
    let (listener, addr) = listen(&bundle).await;

    let server = tokio::spawn(async move {
        let (mut stream, peer) = listener.accept().await?;

        let mut request = [0u8; 5];
        stream.read_exact(&mut request).await?;
        assert_eq!(&request, b"ping\n");

        let reply = format!("hello {}", peer.common_name);
        stream.write_all(reply.as_bytes()).await?;
        stream.shutdown().await?;

        Ok::<PeerIdentity, TlsError>(peer)
    });

    let connector = connector(bundle.client.clone(), &bundle);
    let mut stream = timeout(TEST_TIMEOUT, connector.connect(addr, "localhost"))
        .await
        .expect("connect timed out")
        .expect("handshake failed");

    stream.write_all(b"ping\n").await.unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    assert_eq!(reply, "hello trustroot-client");

    let peer = timeout(TEST_TIMEOUT, server)
        .await
        .expect("server timed out")
        .unwrap()
        .unwrap();

    let client_info = bundle.client.info().unwrap();
    assert_eq!(peer.common_name, "trustroot-client");
    assert_eq!(peer.subject, client_info.subject);
    assert_eq!(peer.serial, client_info.serial);
}

#[tokio::test]
async fn test_rogue_client_rejected() {
    init_tracing();
    let bundle = bootstrap_default().unwrap();
    let (listener, addr) = listen(&bundle).await;

    let server = tokio::spawn(async move { listener.accept().await.map(|(_, peer)| peer) });

    let connector = connector(rogue_credential(), &bundle);
    let client = timeout(TEST_TIMEOUT, connector.connect(addr, "localhost"))
        .await
        .expect("connect timed out");

    // Under TLS 1.3 the client may finish its side before the server has
    // checked the certificate; the rejection then arrives on first read.
    if let Ok(mut stream) = client {
        let mut buf = Vec::new();
        let read = stream.read_to_end(&mut buf).await;
        assert!(read.is_err() || buf.is_empty());
    }

    let result = timeout(TEST_TIMEOUT, server)
        .await
        .expect("server timed out")
        .unwrap();
    assert!(matches!(result, Err(TlsError::Handshake(_))));
}

#[tokio::test]
async fn test_listener_survives_rejected_client() {
    init_tracing();
    let bundle = bootstrap_default().unwrap();
    let (listener, addr) = listen(&bundle).await;
    let listener = Arc::new(listener);

    let server = {
        let listener = listener.clone();
        tokio::spawn(async move {
            let first = listener.accept().await;
            let second = listener.accept().await;
            (first.is_err(), second.map(|(_, peer)| peer.common_name))
        })
    };

    let rogue = connector(rogue_credential(), &bundle);
    if let Ok(Ok(mut stream)) = timeout(TEST_TIMEOUT, rogue.connect(addr, "localhost")).await {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf).await;
    }

    let good = connector(bundle.client.clone(), &bundle);
    let _stream = timeout(TEST_TIMEOUT, good.connect(addr, "localhost"))
        .await
        .expect("connect timed out")
        .expect("handshake failed");

    let (first_failed, second) = timeout(TEST_TIMEOUT, server)
        .await
        .expect("server timed out")
        .unwrap();
    assert!(first_failed);
    assert_eq!(second.unwrap(), "trustroot-client");
}

#[tokio::test]
async fn test_wrong_hostname_rejected() {
    init_tracing();
    let bundle = bootstrap_default().unwrap();
    let (listener, addr) = listen(&bundle).await;

    let server = tokio::spawn(async move { listener.accept().await.is_err() });

    let connector = connector(bundle.client.clone(), &bundle);
    let result = timeout(TEST_TIMEOUT, connector.connect(addr, "example.com"))
        .await
        .expect("connect timed out");
    assert!(matches!(result, Err(TlsError::Handshake(_))));

    let server_failed = timeout(TEST_TIMEOUT, server)
        .await
        .expect("server timed out")
        .unwrap();
    assert!(server_failed);
}

#[tokio::test]
async fn test_untrusted_server_rejected() {
    init_tracing();
    let bundle = bootstrap_default().unwrap();
    let other = bootstrap_default().unwrap();
    let (listener, addr) = listen(&bundle).await;

    let server = tokio::spawn(async move { listener.accept().await.is_err() });

    // Client from a different hierarchy trusts a different root
    let connector = connector(other.client.clone(), &other);
    let result = timeout(TEST_TIMEOUT, connector.connect(addr, "localhost"))
        .await
        .expect("connect timed out");
    assert!(matches!(result, Err(TlsError::Handshake(_))));

    let server_failed = timeout(TEST_TIMEOUT, server)
        .await
        .expect("server timed out")
        .unwrap();
    assert!(server_failed);
}

#[tokio::test]
async fn test_alpn_negotiated() {
    init_tracing();
    let bundle = bootstrap_default().unwrap();
    let protocol = b"trustroot/1".to_vec();

    let server_config = MtlsServerConfig::new(bundle.server.clone(), bundle.trust_anchors.clone())
        .with_alpn_protocols(vec![protocol.clone()]);
    let listener = MtlsListener::bind("127.0.0.1:0".parse().unwrap(), &server_config)
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        stream.get_ref().1.alpn_protocol().map(|p| p.to_vec())
    });

    let client_config = MtlsClientConfig::new(bundle.client.clone(), bundle.trust_anchors.clone())
        .with_alpn_protocols(vec![protocol.clone()]);
    let connector = MtlsConnector::new(&client_config).unwrap();
    let stream = timeout(TEST_TIMEOUT, connector.connect(addr, "localhost"))
        .await
        .expect("connect timed out")
        .unwrap();

    assert_eq!(stream.get_ref().1.alpn_protocol(), Some(protocol.as_slice()));

    let negotiated = timeout(TEST_TIMEOUT, server).await.unwrap().unwrap();
    assert_eq!(negotiated, Some(protocol));
}

#[tokio::test]
async fn test_silent_client_times_out() {
    init_tracing();
    let bundle = bootstrap_default().unwrap();

    let config = MtlsServerConfig::new(bundle.server.clone(), bundle.trust_anchors.clone())
        .with_handshake_timeout(Duration::from_millis(200));
    let listener = MtlsListener::bind("127.0.0.1:0".parse().unwrap(), &config)
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    // Plain TCP connection that never sends a ClientHello
    let _silent = tokio::net::TcpStream::connect(addr).await.unwrap();

    let result = timeout(TEST_TIMEOUT, listener.accept())
        .await
        .expect("accept did not time out");
    assert!(matches!(result, Err(TlsError::Timeout)));
}
