//! Connection lifecycle events

use crate::types::Target;

/// Published to subscribers whenever the connection state transitions.
///
/// `bad_certificate` marks a TLS identity verification failure, which
/// is handled differently from a plain network failure (the target is
/// never retried again for the client's lifetime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionChange {
    /// The target the attempt or session was against
    pub target: Target,

    /// True on connect success, false on failure or disconnect
    pub connected: bool,

    /// True when the peer presented an identity outside the allowed set
    pub bad_certificate: bool,
}

impl ConnectionChange {
    pub fn connected(target: Target) -> Self {
        Self {
            target,
            connected: true,
            bad_certificate: false,
        }
    }

    pub fn disconnected(target: Target, bad_certificate: bool) -> Self {
        Self {
            target,
            connected: false,
            bad_certificate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_constructors() {
        let target = Target::new("relay.example.com", 8443).unwrap();
        let up = ConnectionChange::connected(target.clone());
        assert!(up.connected);
        assert!(!up.bad_certificate);

        let down = ConnectionChange::disconnected(target, true);
        assert!(!down.connected);
        assert!(down.bad_certificate);
    }
}
