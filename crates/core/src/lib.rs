//! Tether Core - Shared types for the resilient messaging client
//!
//! This crate provides:
//! - Domain types (targets, message envelopes, connection-change events)
//! - Wire framing (length-prefixed Postcard serialization)
//! - Error types

/// Default upper bound for a single encoded message (16MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

pub mod error;
pub mod protocol;
pub mod types;

// Re-export common types
pub use error::{CoreError, Result};
pub use protocol::MessageCodec;
pub use types::{ConnectionChange, Envelope, Target};
