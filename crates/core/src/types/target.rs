//! Candidate peer endpoints

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A candidate network endpoint (host + port) the client may connect to.
///
/// Targets are immutable members of the ordered candidate list supplied
/// at client construction; they are only ever indexed, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    /// Create a target, rejecting empty hosts and port 0
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, CoreError> {
        let host = host.into();
        if host.is_empty() {
            return Err(CoreError::InvalidTarget("Host cannot be empty".into()));
        }
        if port == 0 {
            return Err(CoreError::InvalidTarget("Port cannot be 0".into()));
        }
        Ok(Self { host, port })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Target {
    type Err = CoreError;

    /// Parse `"host:port"` (the last colon separates the port)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| CoreError::InvalidTarget(format!("Missing port in '{s}'")))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| CoreError::InvalidTarget(format!("Invalid port in '{s}'")))?;
        Target::new(host, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_display_roundtrip() {
        let target = Target::new("relay.example.com", 8443).unwrap();
        assert_eq!(target.to_string(), "relay.example.com:8443");
        assert_eq!(target.to_string().parse::<Target>().unwrap(), target);
    }

    #[test]
    fn test_target_rejects_empty_host() {
        assert!(Target::new("", 8443).is_err());
    }

    #[test]
    fn test_target_rejects_port_zero() {
        assert!(Target::new("relay.example.com", 0).is_err());
        assert!("relay.example.com:0".parse::<Target>().is_err());
    }

    #[test]
    fn test_target_parse_errors() {
        assert!("no-port".parse::<Target>().is_err());
        assert!("host:notaport".parse::<Target>().is_err());
    }
}
