//! Tether Client - resilient point-to-point messaging
//!
//! This crate provides:
//! - A reconnecting client with exponential backoff and round-robin
//!   failover across a candidate target list
//! - Peer identity verification against a certificate-fingerprint
//!   allowlist, with permanent exclusion of rejected peers
//! - A transport seam (QUIC in production, mockable in tests)
//! - Push-based connection-change and inbound-message streams

pub mod backoff;
pub mod client;
pub mod config;
pub mod proxy;
pub mod rotator;
mod session;
pub mod transport;
pub mod verifier;

// Re-export common types
pub use backoff::{Backoff, MAX_RETRY, MIN_RETRY, MULTIPLIER};
pub use client::{Client, LinkState};
pub use config::{ClientConfig, TlsIdentity};
pub use proxy::{ProxyConfig, ProxyVersion};
pub use rotator::TargetRotator;
pub use transport::{Channel, ConnectFailure, QuicTransport, Transport};
pub use verifier::AllowlistVerifier;

pub use tether_core::{ConnectionChange, CoreError, Envelope, Result, Target};
