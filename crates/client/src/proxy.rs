//! Proxy configuration shape
//!
//! Only the configuration surface lives here; negotiation itself is
//! the transport's concern. A proxy failure during connect is treated
//! exactly like a network connect failure (rotation + backoff).

use std::fmt;
use std::time::Duration;

use tether_core::{CoreError, Result};

/// Supported proxy protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyVersion {
    Socks4,
    Socks5,
    Http,
}

impl fmt::Display for ProxyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyVersion::Socks4 => write!(f, "SOCKS4"),
            ProxyVersion::Socks5 => write!(f, "SOCKS5"),
            ProxyVersion::Http => write!(f, "HTTP CONNECT"),
        }
    }
}

/// Proxy description passed to the transport
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub version: ProxyVersion,
    /// Proxy address as `host:port`
    pub addr: String,
    pub username: Option<String>,
    /// Basic-auth / SOCKS5 password; SOCKS4 has no password field
    pub password: Option<String>,
    /// Negotiation timeout against the proxy itself
    pub timeout: Option<Duration>,
}

impl ProxyConfig {
    pub fn new(version: ProxyVersion, addr: impl Into<String>) -> Self {
        Self {
            version,
            addr: addr.into(),
            username: None,
            password: None,
            timeout: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Validate the configuration shape at client construction
    pub fn validate(&self) -> Result<()> {
        if self.addr.is_empty() {
            return Err(CoreError::Config("Proxy address cannot be empty".into()));
        }
        if self.version == ProxyVersion::Socks4 && self.password.is_some() {
            return Err(CoreError::Config(
                "SOCKS4 does not support a password".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socks4_forbids_password() {
        let proxy = ProxyConfig::new(ProxyVersion::Socks4, "proxy.example.com:1080")
            .with_credentials("user", Some("secret".into()));
        assert!(proxy.validate().is_err());
    }

    #[test]
    fn test_socks4_without_password_is_valid() {
        let proxy = ProxyConfig::new(ProxyVersion::Socks4, "proxy.example.com:1080")
            .with_credentials("user", None);
        assert!(proxy.validate().is_ok());
    }

    #[test]
    fn test_socks5_and_http_allow_password() {
        for version in [ProxyVersion::Socks5, ProxyVersion::Http] {
            let proxy = ProxyConfig::new(version, "proxy.example.com:1080")
                .with_credentials("user", Some("secret".into()));
            assert!(proxy.validate().is_ok());
        }
    }

    #[test]
    fn test_empty_address_rejected() {
        let proxy = ProxyConfig::new(ProxyVersion::Http, "");
        assert!(proxy.validate().is_err());
    }
}
