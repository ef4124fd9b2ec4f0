//! Inbound pump for an active session
//!
//! Runs for the lifetime of one connection: receives frames from the
//! channel, decodes them and republishes the envelopes on the client's
//! inbound stream. Returns when the connection ends, which is how the
//! supervisor observes a disconnect.

use tokio::sync::broadcast;
use tracing::{debug, error, trace, warn};

use tether_core::{Envelope, MessageCodec};

use crate::transport::Channel;

/// Consecutive undecodable frames tolerated before the connection is
/// considered poisoned and dropped
const MAX_DECODE_FAILURES: u32 = 10;

/// Forward inbound messages until the connection ends
pub(crate) async fn pump_inbound<C: Channel>(
    channel: &C,
    inbound: &broadcast::Sender<Envelope>,
    trace_frames: bool,
) {
    let mut decode_failures = 0u32;

    loop {
        match channel.recv().await {
            Ok(Some(frame)) => match MessageCodec::decode_payload(&frame) {
                Ok(envelope) => {
                    decode_failures = 0;
                    if trace_frames {
                        trace!(
                            topic = %envelope.topic,
                            len = envelope.payload.len(),
                            "inbound message"
                        );
                    }
                    // No subscribers is fine; events are replay-none
                    let _ = inbound.send(envelope);
                }
                Err(e) => {
                    warn!("Dropping undecodable frame: {e}");
                    decode_failures += 1;
                    if decode_failures > MAX_DECODE_FAILURES {
                        error!(
                            "Too many decode failures ({decode_failures}), dropping connection"
                        );
                        return;
                    }
                }
            },
            Ok(None) => {
                debug!("Peer closed the connection");
                return;
            }
            Err(e) => {
                warn!("Receive error: {e}");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;
    use tether_core::Result;

    /// Channel that replays a fixed script of recv results
    struct ScriptedChannel {
        script: Mutex<Vec<Result<Option<Bytes>>>>,
    }

    impl ScriptedChannel {
        fn new(mut script: Vec<Result<Option<Bytes>>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
            }
        }
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        async fn send(&self, _frame: Bytes) -> Result<()> {
            Ok(())
        }

        async fn recv(&self) -> Result<Option<Bytes>> {
            match self.script.lock().unwrap().pop() {
                Some(result) => result,
                None => Ok(None),
            }
        }

        fn close(&self) {}
    }

    fn payload(envelope: &Envelope) -> Bytes {
        Bytes::from(postcard::to_allocvec(envelope).unwrap())
    }

    #[tokio::test]
    async fn test_forwards_decoded_envelopes() {
        let env = Envelope::new(b"hi".to_vec(), "orders", "peer-a", vec![], 64).unwrap();
        let channel = ScriptedChannel::new(vec![Ok(Some(payload(&env))), Ok(None)]);
        let (tx, mut rx) = broadcast::channel(8);

        pump_inbound(&channel, &tx, false).await;

        assert_eq!(rx.try_recv().unwrap(), env);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_skips_undecodable_frames() {
        let env = Envelope::new(b"hi".to_vec(), "orders", "peer-a", vec![], 64).unwrap();
        let channel = ScriptedChannel::new(vec![
            Ok(Some(Bytes::from_static(b"\xff\xff\xff"))),
            Ok(Some(payload(&env))),
            Ok(None),
        ]);
        let (tx, mut rx) = broadcast::channel(8);

        pump_inbound(&channel, &tx, false).await;

        assert_eq!(rx.try_recv().unwrap(), env);
    }

    #[tokio::test]
    async fn test_gives_up_after_repeated_decode_failures() {
        let garbage: Vec<Result<Option<Bytes>>> = (0..32)
            .map(|_| Ok(Some(Bytes::from_static(b"\xff\xff\xff"))))
            .collect();
        let channel = ScriptedChannel::new(garbage);
        let (tx, mut rx) = broadcast::channel(8);

        // Returns despite the script never reaching its clean end
        pump_inbound(&channel, &tx, false).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_returns_on_receive_error() {
        let channel = ScriptedChannel::new(vec![Err(tether_core::CoreError::Connection(
            "reset".into(),
        ))]);
        let (tx, _rx) = broadcast::channel(8);
        pump_inbound(&channel, &tx, false).await;
    }
}
