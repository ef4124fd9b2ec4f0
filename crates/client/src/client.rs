//! Reconnecting client
//!
//! The orchestrator behind the public API: owns the target rotator and
//! backoff policy, drives one connection session at a time on the
//! worker context and republishes connection-change and inbound-message
//! events to subscribers.
//!
//! All mutable shared state lives behind a single mutex held only for
//! short, non-awaiting sections; network I/O always happens outside it.

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use tether_core::{ConnectionChange, CoreError, Envelope, MessageCodec, Result, Target};

use crate::backoff::Backoff;
use crate::config::ClientConfig;
use crate::rotator::TargetRotator;
use crate::session;
use crate::transport::{Channel, QuicTransport, Transport};

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Connection state of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Never started
    Idle,
    /// A connection attempt is in flight or scheduled
    Connecting,
    /// An active session exists
    Connected,
    /// Stopped explicitly; restartable via `start`
    Stopped,
    /// Every target has been excluded; restartable via `start`
    Exhausted,
}

/// One started supervisor: its task plus the shutdown signal
struct RunHandle {
    join: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Mutable state, guarded by one lock
struct Shared<C> {
    phase: LinkState,
    rotator: TargetRotator,
    backoff: Backoff,
    channel: Option<Arc<C>>,
    stopping: bool,
    run: Option<RunHandle>,
    /// Incremented on each `start`; a supervisor only touches state
    /// belonging to its own generation
    epoch: u64,
}

struct Inner<T: Transport> {
    config: ClientConfig,
    transport: T,
    state: Mutex<Shared<T::Channel>>,
    changes_tx: broadcast::Sender<ConnectionChange>,
    inbound_tx: broadcast::Sender<Envelope>,
}

impl<T: Transport> Inner<T> {
    fn lock_state(&self) -> MutexGuard<'_, Shared<T::Channel>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, change: ConnectionChange) {
        // No subscribers is fine; the streams are replay-none
        let _ = self.changes_tx.send(change);
    }
}

/// Worker context: shared handle or a client-owned runtime
struct Worker {
    handle: Handle,
    owned: Option<Runtime>,
}

impl Worker {
    fn from_config(config: &ClientConfig) -> Result<Self> {
        match &config.worker {
            Some(handle) => Ok(Self {
                handle: handle.clone(),
                owned: None,
            }),
            None => {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(config.worker_threads)
                    .thread_name("tether-worker")
                    .enable_all()
                    .build()?;
                let handle = runtime.handle().clone();
                Ok(Self {
                    handle,
                    owned: Some(runtime),
                })
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(runtime) = self.owned.take() {
            runtime.shutdown_background();
        }
    }
}

/// Resilient point-to-point messaging client
///
/// Maintains one authenticated, encrypted connection to one of the
/// configured targets, retrying with exponential backoff and
/// round-robin failover on connection loss. Targets that fail identity
/// verification are excluded for the client's lifetime.
///
/// `start` is an idempotent no-op while the client is running. A
/// stopped or exhausted client may be started again; restarting
/// re-creates the rotator and backoff state, so the excluded set is
/// reset exactly then.
pub struct Client<T: Transport = QuicTransport> {
    inner: Arc<Inner<T>>,
    worker: Worker,
}

impl Client<QuicTransport> {
    /// Build a client over the QUIC transport.
    ///
    /// The endpoint is created inside the worker context so its I/O
    /// driver runs on the worker runtime, not on whatever runtime the
    /// caller happens to be inside of. This also makes construction
    /// work from plain synchronous code when the client owns its
    /// runtime.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let worker = Worker::from_config(&config)?;
        let transport = {
            let _guard = worker.handle.enter();
            QuicTransport::new(&config)?
        };
        Self::build(config, transport, worker)
    }
}

impl<T: Transport> Client<T> {
    /// Build a client over a caller-supplied transport
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self> {
        config.validate()?;
        let worker = Worker::from_config(&config)?;
        Self::build(config, transport, worker)
    }

    fn build(config: ClientConfig, transport: T, worker: Worker) -> Result<Self> {
        let (changes_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (inbound_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let rotator = TargetRotator::new(config.targets.clone());
        let inner = Arc::new(Inner {
            state: Mutex::new(Shared {
                phase: LinkState::Idle,
                rotator,
                backoff: Backoff::new(),
                channel: None,
                stopping: false,
                run: None,
                epoch: 0,
            }),
            config,
            transport,
            changes_tx,
            inbound_tx,
        });

        Ok(Self { inner, worker })
    }

    /// Begin connecting. No-op if the client is already running.
    pub fn start(&self) -> Result<()> {
        let mut st = self.inner.lock_state();
        if st.run.is_some() {
            debug!("start called on a running client; ignoring");
            return Ok(());
        }

        st.phase = LinkState::Connecting;
        st.stopping = false;
        st.rotator = TargetRotator::new(self.inner.config.targets.clone());
        st.backoff = Backoff::new();
        st.channel = None;
        st.epoch += 1;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = self
            .worker
            .handle
            .spawn(run(self.inner.clone(), shutdown_rx, st.epoch));
        st.run = Some(RunHandle {
            join,
            shutdown: shutdown_tx,
        });

        info!("client started");
        Ok(())
    }

    /// Stop the client and wait for teardown to complete.
    ///
    /// The stopping flag becomes visible before the active handle is
    /// closed, so the disconnect triggered by that close never
    /// schedules a retry; no retry fires after this returns.
    /// Idempotent and safe to call from any task.
    pub async fn stop(&self) {
        let (channel, run) = {
            let mut st = self.inner.lock_state();
            st.stopping = true;
            st.phase = LinkState::Stopped;
            (st.channel.take(), st.run.take())
        };

        if let Some(channel) = &channel {
            channel.close();
        }
        if let Some(run) = run {
            let _ = run.shutdown.send(true);
            let _ = run.join.await;
            info!("client stopped");
        }
    }

    /// Send a message over the active session.
    ///
    /// Fails synchronously with [`CoreError::MessageTooLarge`] for
    /// oversized messages and [`CoreError::NotConnected`] when no
    /// active session exists. Backpressure is the transport's flow
    /// control; this never buffers on its own.
    pub async fn write(&self, envelope: &Envelope) -> Result<()> {
        let frame = Bytes::from(MessageCodec::encode(
            envelope,
            self.inner.config.max_message_size,
        )?);

        let channel = {
            let st = self.inner.lock_state();
            st.channel.clone().ok_or(CoreError::NotConnected)?
        };

        if self.inner.config.trace_frames {
            trace!(topic = %envelope.topic, len = frame.len(), "outbound message");
        }
        channel.send(frame).await
    }

    /// Build a message, validating the payload against the configured
    /// size limit before it ever reaches `write`
    pub fn create_message(
        &self,
        payload: Vec<u8>,
        topic: impl Into<String>,
        destination: impl Into<String>,
        properties: Vec<(String, String)>,
    ) -> Result<Envelope> {
        Envelope::new(
            payload,
            topic,
            destination,
            properties,
            self.inner.config.max_message_size,
        )
    }

    /// Point-in-time read: does a live session exist right now?
    pub fn connected(&self) -> bool {
        let st = self.inner.lock_state();
        st.phase == LinkState::Connected && st.channel.is_some()
    }

    pub fn state(&self) -> LinkState {
        self.inner.lock_state().phase
    }

    /// Subscribe to connection-change events. Replay-none: late
    /// subscribers miss prior events.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ConnectionChange> {
        self.inner.changes_tx.subscribe()
    }

    /// Subscribe to inbound messages. Replay-none.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<Envelope> {
        self.inner.inbound_tx.subscribe()
    }
}

/// Supervisor loop: one task per started client, at most one live
/// session at any time. Emits connection-change events in attempt
/// order.
async fn run<T: Transport>(
    inner: Arc<Inner<T>>,
    mut shutdown: watch::Receiver<bool>,
    epoch: u64,
) {
    loop {
        let target = {
            let st = inner.lock_state();
            if st.stopping || st.epoch != epoch {
                break;
            }
            st.rotator.current().clone()
        };

        debug!(%target, "attempting connection");
        let outcome = tokio::select! {
            result = inner.transport.connect(&target, inner.config.proxy.as_ref()) => result,
            _ = shutdown.changed() => break,
        };

        match outcome {
            Ok(channel) => {
                let channel = Arc::new(channel);
                {
                    let mut st = inner.lock_state();
                    if st.stopping || st.epoch != epoch {
                        channel.close();
                        break;
                    }
                    st.backoff.reset();
                    st.channel = Some(channel.clone());
                    st.phase = LinkState::Connected;
                }
                info!(%target, "connected");
                inner.publish(ConnectionChange::connected(target.clone()));

                // The pump returns on disconnect; the shutdown arm
                // covers a stop racing ahead of the channel close
                tokio::select! {
                    _ = session::pump_inbound(
                        channel.as_ref(),
                        &inner.inbound_tx,
                        inner.config.trace_frames,
                    ) => {}
                    _ = shutdown.changed() => {}
                }

                let stopping = {
                    let mut st = inner.lock_state();
                    if st.epoch == epoch {
                        st.channel = None;
                        st.phase = if st.stopping {
                            LinkState::Stopped
                        } else {
                            LinkState::Connecting
                        };
                    }
                    st.stopping || st.epoch != epoch
                };
                channel.close();
                inner.publish(ConnectionChange::disconnected(target.clone(), false));
                if stopping {
                    break;
                }

                warn!(%target, "connection lost, scheduling reconnect");
                if !schedule_retry(&inner, &mut shutdown, epoch, None).await {
                    break;
                }
            }
            Err(failure) => {
                let bad_certificate = failure.is_bad_certificate();
                warn!(%target, error = %failure, "connection attempt failed");
                inner.publish(ConnectionChange::disconnected(target.clone(), bad_certificate));

                let exclude = bad_certificate.then_some(target);
                if !schedule_retry(&inner, &mut shutdown, epoch, exclude).await {
                    break;
                }
            }
        }
    }

    let mut st = inner.lock_state();
    if st.epoch == epoch {
        if st.stopping {
            st.phase = LinkState::Stopped;
        }
        st.run = None;
    }
}

/// Rotate to the next candidate and wait out the backoff delay.
/// Returns false when the loop must end (stop requested, superseded
/// run, or all targets excluded).
async fn schedule_retry<T: Transport>(
    inner: &Arc<Inner<T>>,
    shutdown: &mut watch::Receiver<bool>,
    epoch: u64,
    exclude: Option<Target>,
) -> bool {
    let delay = {
        let mut st = inner.lock_state();
        if st.stopping || st.epoch != epoch {
            return false;
        }
        if let Some(target) = &exclude {
            st.rotator.exclude(target);
        }
        if st.rotator.advance().is_none() {
            st.phase = LinkState::Exhausted;
            error!("Every candidate target has been rejected; no retries until restart");
            return false;
        }
        st.phase = LinkState::Connecting;
        st.backoff.next_delay()
    };

    debug!(?delay, "retry scheduled");
    tokio::select! {
        _ = sleep(delay) => true,
        _ = shutdown.changed() => false,
    }
}
