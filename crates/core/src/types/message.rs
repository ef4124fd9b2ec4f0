//! Application message envelope
//!
//! The envelope is the unit handed to `write` and delivered on the
//! inbound stream. The payload is opaque; the client forwards it
//! verbatim and only enforces the configured size limit.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// An application message with routing metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    /// Logical topic the message belongs to
    pub topic: String,

    /// Destination identity at the remote peer
    pub destination: String,

    /// Free-form key/value properties
    pub properties: Vec<(String, String)>,

    /// Opaque payload bytes
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Build an envelope, rejecting payloads larger than `max_payload`.
    ///
    /// Oversized payloads are rejected synchronously here rather than
    /// being truncated or dropped later on the wire.
    pub fn new(
        payload: Vec<u8>,
        topic: impl Into<String>,
        destination: impl Into<String>,
        properties: Vec<(String, String)>,
        max_payload: usize,
    ) -> Result<Self> {
        if payload.len() > max_payload {
            return Err(CoreError::MessageTooLarge {
                size: payload.len(),
                max: max_payload,
            });
        }
        Ok(Self {
            topic: topic.into(),
            destination: destination.into(),
            properties,
            payload,
        })
    }
}
