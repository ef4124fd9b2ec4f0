//! Client construction parameters

use std::time::Duration;

use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use tokio::runtime::Handle;

use tether_core::{CoreError, Result, Target, DEFAULT_MAX_MESSAGE_SIZE};

use crate::proxy::ProxyConfig;

/// Default handshake deadline per connection attempt
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Worker threads for a client-owned runtime
pub const DEFAULT_WORKER_THREADS: usize = 2;

/// TLS key material presented to peers (mutual TLS)
pub struct TlsIdentity {
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

/// Configuration bundle for [`Client`](crate::Client)
///
/// Built with `new` plus `with_*` setters:
///
/// ```ignore
/// let config = ClientConfig::new(targets, fingerprints)
///     .with_max_message_size(1024 * 1024)
///     .with_worker(Handle::current());
/// ```
pub struct ClientConfig {
    /// Ordered candidate list, tried round-robin; must be non-empty
    pub targets: Vec<Target>,

    /// Allowed peer identity set (SHA-256 certificate fingerprints)
    pub allowed_fingerprints: Vec<String>,

    /// Optional client-side TLS identity
    pub identity: Option<TlsIdentity>,

    /// Optional proxy the transport should negotiate through
    pub proxy: Option<ProxyConfig>,

    /// Use the hardware-accelerated TLS provider (AWS-LC) instead of ring
    pub use_hardware_crypto: bool,

    /// Emit a trace log line per inbound/outbound frame
    pub trace_frames: bool,

    /// Upper bound for one encoded message
    pub max_message_size: usize,

    /// Deadline for a single connect attempt
    pub connect_timeout: Duration,

    /// Externally supplied worker context. When absent the client
    /// creates and owns a small multi-thread runtime.
    pub worker: Option<Handle>,

    /// Thread count for a client-owned runtime
    pub worker_threads: usize,
}

impl ClientConfig {
    pub fn new(targets: Vec<Target>, allowed_fingerprints: Vec<String>) -> Self {
        Self {
            targets,
            allowed_fingerprints,
            identity: None,
            proxy: None,
            use_hardware_crypto: false,
            trace_frames: false,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            worker: None,
            worker_threads: DEFAULT_WORKER_THREADS,
        }
    }

    pub fn with_identity(mut self, identity: TlsIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_hardware_crypto(mut self, enabled: bool) -> Self {
        self.use_hardware_crypto = enabled;
        self
    }

    pub fn with_trace_frames(mut self, enabled: bool) -> Self {
        self.trace_frames = enabled;
        self
    }

    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_worker(mut self, handle: Handle) -> Self {
        self.worker = Some(handle);
        self
    }

    /// Validate the bundle before any connection attempt
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(CoreError::Config("Target list cannot be empty".into()));
        }
        if self.allowed_fingerprints.is_empty() {
            return Err(CoreError::Config(
                "Allowed peer identity set cannot be empty".into(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(CoreError::Config("Max message size cannot be 0".into()));
        }
        if let Some(proxy) = &self.proxy {
            proxy.validate()?;
        }
        Ok(())
    }
}
