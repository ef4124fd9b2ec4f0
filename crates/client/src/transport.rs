//! Secure-channel transport
//!
//! The reconnecting client is written against the [`Transport`] and
//! [`Channel`] traits so connection-lifecycle logic stays independent
//! of the wire. [`QuicTransport`] is the production implementation:
//! Quinn + Rustls with the fingerprint allowlist verifier and the
//! transport tuning this system ships with (30s idle timeout, 5s
//! keep-alive for NAT traversal).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use quinn::{Endpoint, TransportConfig};
use thiserror::Error;
use tokio::time::timeout;

use tether_core::{CoreError, Result, Target};

use crate::config::ClientConfig;
use crate::proxy::ProxyConfig;
use crate::verifier::AllowlistVerifier;

/// Why a connection attempt failed.
///
/// Bad-certificate failures exclude the target permanently; proxy and
/// network failures only rotate and back off.
#[derive(Debug, Error)]
pub enum ConnectFailure {
    #[error("Peer identity rejected: {0}")]
    BadCertificate(String),

    #[error("Network failure: {0}")]
    Network(String),

    #[error("Proxy negotiation failed: {0}")]
    Proxy(String),
}

impl ConnectFailure {
    pub fn is_bad_certificate(&self) -> bool {
        matches!(self, ConnectFailure::BadCertificate(_))
    }
}

/// An established secure channel.
///
/// `send` takes a fully framed message (length prefix included);
/// `recv` yields one deframed payload per call, `Ok(None)` once the
/// connection is closed from either side.
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    async fn send(&self, frame: Bytes) -> Result<()>;

    async fn recv(&self) -> Result<Option<Bytes>>;

    /// Begin teardown; safe to call more than once
    fn close(&self);
}

/// Creates secure channels to candidate targets
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Channel: Channel;

    async fn connect(
        &self,
        target: &Target,
        proxy: Option<&ProxyConfig>,
    ) -> std::result::Result<Self::Channel, ConnectFailure>;
}

/// Configure QUIC transport settings
///
/// 30s idle timeout rides out brief signal loss; the 5s keep-alive
/// interval prevents NAT mappings from expiring and doubles as
/// liveness detection for dead peers.
fn configure_transport(crypto: Arc<quinn::crypto::rustls::QuicClientConfig>) -> quinn::ClientConfig {
    let mut transport = TransportConfig::default();

    transport.max_idle_timeout(Some(Duration::from_secs(30).try_into().unwrap()));
    transport.keep_alive_interval(Some(Duration::from_secs(5)));

    let mut config = quinn::ClientConfig::new(crypto);
    config.transport_config(Arc::new(transport));
    config
}

/// QUIC transport with fingerprint-allowlist identity verification
pub struct QuicTransport {
    endpoint: Endpoint,
    client_config: quinn::ClientConfig,
    /// Set by the verifier during a failed handshake; swapped back to
    /// false when the failure is classified
    identity_rejected: Arc<AtomicBool>,
    connect_timeout: Duration,
    max_message_size: usize,
}

impl QuicTransport {
    /// Requires an ambient tokio runtime: the endpoint's I/O driver
    /// binds to it. [`Client::new`](crate::Client::new) enters the
    /// worker context before calling this.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let provider = if config.use_hardware_crypto {
            Arc::new(rustls::crypto::aws_lc_rs::default_provider())
        } else {
            Arc::new(rustls::crypto::ring::default_provider())
        };

        let verifier = Arc::new(AllowlistVerifier::new(
            config.allowed_fingerprints.iter().cloned(),
            provider.clone(),
        ));
        let identity_rejected = verifier.rejection_flag();

        let builder = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| CoreError::Config(format!("TLS protocol setup failed: {e}")))?
            .dangerous()
            .with_custom_certificate_verifier(verifier);

        let tls = match &config.identity {
            Some(identity) => builder
                .with_client_auth_cert(identity.cert_chain.clone(), identity.key.clone_key())
                .map_err(|e| CoreError::Config(format!("Invalid client identity: {e}")))?,
            None => builder.with_no_client_auth(),
        };

        let quic_crypto = quinn::crypto::rustls::QuicClientConfig::try_from(tls)
            .map_err(|e| CoreError::Config(format!("Failed to create QUIC crypto config: {e}")))?;
        let client_config = configure_transport(Arc::new(quic_crypto));

        // Client endpoint bound to a random local port
        let endpoint = Endpoint::client(SocketAddr::from(([0, 0, 0, 0], 0)))?;

        Ok(Self {
            endpoint,
            client_config,
            identity_rejected,
            connect_timeout: config.connect_timeout,
            max_message_size: config.max_message_size,
        })
    }

    fn classify(&self, reason: String) -> ConnectFailure {
        if self.identity_rejected.swap(false, Ordering::SeqCst) {
            ConnectFailure::BadCertificate(reason)
        } else {
            ConnectFailure::Network(reason)
        }
    }
}

#[async_trait]
impl Transport for QuicTransport {
    type Channel = QuicChannel;

    async fn connect(
        &self,
        target: &Target,
        proxy: Option<&ProxyConfig>,
    ) -> std::result::Result<QuicChannel, ConnectFailure> {
        // Stale rejection from a timed-out earlier attempt must not
        // leak into this attempt's classification
        self.identity_rejected.store(false, Ordering::SeqCst);

        if let Some(proxy) = proxy {
            // SOCKS and HTTP CONNECT relay byte streams; they cannot
            // carry this endpoint's datagrams
            return Err(ConnectFailure::Proxy(format!(
                "{} relaying is unavailable over a datagram transport",
                proxy.version
            )));
        }

        let addr = tokio::net::lookup_host((target.host.as_str(), target.port))
            .await
            .map_err(|e| ConnectFailure::Network(format!("Failed to resolve {target}: {e}")))?
            .next()
            .ok_or_else(|| ConnectFailure::Network(format!("No addresses for {target}")))?;

        let connecting = self
            .endpoint
            .connect_with(self.client_config.clone(), addr, &target.host)
            .map_err(|e| ConnectFailure::Network(format!("Failed to initiate connection: {e}")))?;

        let connection = match timeout(self.connect_timeout, connecting).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => return Err(self.classify(e.to_string())),
            Err(_) => {
                return Err(ConnectFailure::Network(format!(
                    "Connect timed out after {:?}",
                    self.connect_timeout
                )))
            }
        };

        let (send, recv) = connection
            .open_bi()
            .await
            .map_err(|e| self.classify(e.to_string()))?;

        tracing::debug!(%target, "secure channel established");

        Ok(QuicChannel {
            connection,
            send: tokio::sync::Mutex::new(send),
            recv: tokio::sync::Mutex::new(recv),
            max_message_size: self.max_message_size,
        })
    }
}

/// One live QUIC connection with a bidirectional message stream
#[derive(Debug)]
pub struct QuicChannel {
    connection: quinn::Connection,
    send: tokio::sync::Mutex<quinn::SendStream>,
    recv: tokio::sync::Mutex<quinn::RecvStream>,
    max_message_size: usize,
}

#[async_trait]
impl Channel for QuicChannel {
    async fn send(&self, frame: Bytes) -> Result<()> {
        let mut send = self.send.lock().await;
        // Quinn's write_all awaits on its own flow control, which is
        // the backpressure the caller gets
        send.write_all(&frame).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Bytes>> {
        let mut recv = self.recv.lock().await;

        // Length prefix (4 bytes, big endian)
        let mut len_buf = [0u8; 4];
        match recv.read_exact(&mut len_buf).await {
            Ok(()) => {}
            Err(quinn::ReadExactError::FinishedEarly(_)) => return Ok(None),
            Err(quinn::ReadExactError::ReadError(e)) => {
                return Err(CoreError::Connection(format!("Stream closed by peer: {e}")))
            }
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.max_message_size {
            return Err(CoreError::MessageTooLarge {
                size: len,
                max: self.max_message_size,
            });
        }

        let mut payload = vec![0u8; len];
        recv.read_exact(&mut payload)
            .await
            .map_err(|_| CoreError::Connection("Stream closed while reading payload".into()))?;

        Ok(Some(Bytes::from(payload)))
    }

    fn close(&self) {
        self.connection.close(0u32.into(), b"client stop");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TlsIdentity;
    use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

    fn base_config() -> ClientConfig {
        ClientConfig::new(
            vec![Target::new("peer.example.com", 8443).unwrap()],
            vec!["AA:BB:CC".to_string()],
        )
    }

    #[tokio::test]
    async fn test_transport_construction() {
        let transport = QuicTransport::new(&base_config());
        assert!(transport.is_ok());
    }

    #[tokio::test]
    async fn test_transport_construction_with_identity() {
        let cert = rcgen::generate_simple_self_signed(["client.example".to_string()]).unwrap();
        let cert_der = CertificateDer::from(cert.cert);
        let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            cert.key_pair.serialize_der(),
        ));

        let config = base_config().with_identity(TlsIdentity {
            cert_chain: vec![cert_der],
            key: key_der,
        });
        let transport = QuicTransport::new(&config);
        assert!(transport.is_ok());
    }

    #[tokio::test]
    async fn test_transport_construction_with_hardware_crypto() {
        let transport = QuicTransport::new(&base_config().with_hardware_crypto(true));
        assert!(transport.is_ok());
    }

    #[tokio::test]
    async fn test_proxy_reports_negotiation_failure() {
        use crate::proxy::{ProxyConfig, ProxyVersion};

        let transport = QuicTransport::new(&base_config()).unwrap();
        let target = Target::new("peer.example.com", 8443).unwrap();
        let proxy = ProxyConfig::new(ProxyVersion::Socks5, "proxy.example.com:1080");

        let err = transport.connect(&target, Some(&proxy)).await.unwrap_err();
        assert!(matches!(err, ConnectFailure::Proxy(_)));
        assert!(!err.is_bad_certificate());
    }
}
