//! Tether command-line client
//!
//! Connects to one of the given targets, prints connection changes and
//! inbound messages, and sends each stdin line as a message. EOF on
//! stdin stops the client.

use std::io::BufRead;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;

use tether_client::{Client, ClientConfig, ProxyConfig, ProxyVersion, Target};

#[derive(Parser, Debug)]
#[command(name = "tether", about = "Resilient point-to-point messaging client")]
struct Args {
    /// Candidate target, host:port; repeat for failover
    #[arg(short, long = "target", required = true)]
    targets: Vec<Target>,

    /// Allowed peer certificate fingerprint (SHA-256 hex); repeatable
    #[arg(short, long = "fingerprint", required = true)]
    fingerprints: Vec<String>,

    /// Topic for outbound messages
    #[arg(long, default_value = "default")]
    topic: String,

    /// Destination identity for outbound messages
    #[arg(long, default_value = "peer")]
    destination: String,

    /// Proxy address, host:port (SOCKS5)
    #[arg(long)]
    proxy: Option<String>,

    /// Handshake deadline per connection attempt, in seconds
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,

    /// Log every frame at trace level
    #[arg(long, default_value_t = false)]
    trace_frames: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = ClientConfig::new(args.targets, args.fingerprints)
        .with_connect_timeout(Duration::from_secs(args.connect_timeout))
        .with_trace_frames(args.trace_frames)
        .with_worker(tokio::runtime::Handle::current());
    if let Some(addr) = args.proxy {
        config = config.with_proxy(ProxyConfig::new(ProxyVersion::Socks5, addr));
    }

    let client = Client::new(config).context("failed to build client")?;
    let mut changes = client.subscribe_changes();
    let mut messages = client.subscribe_messages();
    client.start()?;

    // Line-buffered stdin on a blocking thread; the channel closing is
    // how the main loop learns about EOF
    let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(32);
    let mut stdin_task = tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if stdin_tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut stdin_task => break,
            line = stdin_rx.recv() => {
                let Some(line) = line else { break };
                if line.is_empty() {
                    continue;
                }
                let envelope = client.create_message(
                    line.into_bytes(),
                    args.topic.clone(),
                    args.destination.clone(),
                    vec![],
                )?;
                if let Err(e) = client.write(&envelope).await {
                    eprintln!("send failed: {e}");
                }
            }
            change = changes.recv() => {
                if let Ok(change) = change {
                    if change.connected {
                        println!("* connected to {}", change.target);
                    } else if change.bad_certificate {
                        println!("* {} rejected: certificate not allowed", change.target);
                    } else {
                        println!("* disconnected from {}", change.target);
                    }
                }
            }
            message = messages.recv() => {
                if let Ok(envelope) = message {
                    println!(
                        "[{}] {}",
                        envelope.topic,
                        String::from_utf8_lossy(&envelope.payload)
                    );
                }
            }
        }
    }

    stdin_task.abort();
    info!("stdin closed, stopping");
    client.stop().await;
    Ok(())
}
