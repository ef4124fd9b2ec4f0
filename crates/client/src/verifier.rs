//! Peer identity verification against a fingerprint allowlist
//!
//! Peers authenticate with self-issued certificates; instead of a CA
//! chain, the client is constructed with the set of allowed SHA-256
//! certificate fingerprints. A peer whose certificate hashes to
//! anything outside that set fails verification, and the rejection is
//! recorded so the transport can classify the failed attempt as a
//! bad-certificate failure rather than a network failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::DigitallySignedStruct;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use sha2::{Digest, Sha256};

/// Certificate verifier backed by an allowed-fingerprint set
#[derive(Debug)]
pub struct AllowlistVerifier {
    allowed: Vec<String>,
    rejected: Arc<AtomicBool>,
    provider: Arc<CryptoProvider>,
}

impl AllowlistVerifier {
    /// Fingerprints are normalized on construction so any of the usual
    /// renderings ("AA:BB", "aa-bb", "aabb") are accepted.
    pub fn new(allowed: impl IntoIterator<Item = String>, provider: Arc<CryptoProvider>) -> Self {
        Self {
            allowed: allowed
                .into_iter()
                .map(|fp| Self::normalize_fingerprint(&fp))
                .collect(),
            rejected: Arc::new(AtomicBool::new(false)),
            provider,
        }
    }

    /// Shared flag set whenever a peer fails identity verification.
    /// The transport swaps it back to false when classifying a failed
    /// connect attempt.
    pub fn rejection_flag(&self) -> Arc<AtomicBool> {
        self.rejected.clone()
    }

    /// Normalize a fingerprint for comparison: strip separators,
    /// uppercase. "AA:BB:CC", "aa-bb-cc" and "aabbcc" all become "AABBCC".
    pub fn normalize_fingerprint(fp: &str) -> String {
        fp.chars()
            .filter(|c| c.is_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }

    /// SHA-256 fingerprint of a DER certificate, colon-separated
    pub fn calculate_fingerprint(cert: &CertificateDer) -> String {
        let mut hasher = Sha256::new();
        hasher.update(cert.as_ref());
        let digest = hasher.finalize();

        digest
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<String>>()
            .join(":")
    }

    fn matches(&self, cert: &CertificateDer) -> bool {
        let actual = Self::normalize_fingerprint(&Self::calculate_fingerprint(cert));
        self.allowed.iter().any(|fp| *fp == actual)
    }
}

impl ServerCertVerifier for AllowlistVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if self.matches(end_entity) {
            Ok(ServerCertVerified::assertion())
        } else {
            let actual = Self::normalize_fingerprint(&Self::calculate_fingerprint(end_entity));
            // Log only a prefix; full fingerprints stay out of the logs
            let prefix = &actual[..8.min(actual.len())];
            tracing::error!(
                "Peer certificate fingerprint {}... not in the allowed set",
                prefix
            );
            self.rejected.store(true, Ordering::SeqCst);
            Err(rustls::Error::General("Fingerprint not allowed".to_string()))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
