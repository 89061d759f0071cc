use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use clap_derive::Parser;
use pulselink::client::Client;
use pulselink::config::SessionConfig;
use pulselink::error::SessionError;
use pulselink::handler::SessionHandler;
use pulselink::protocol::ProtocolCode;
use pulselink::util::jitter::jittered_wait;
use tokio::time;
use tracing::{info, warn, Level};

#[derive(Parser)]
struct Args {
    /// the registrar's rendezvous address, e.g. 192.168.1.10:9000
    rendezvous: String,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,
}

/// reacts to the registrar's activation broadcasts
struct SensorHandler;

#[async_trait]
impl SessionHandler for SensorHandler {
    async fn on_message(&self, peer: SocketAddr, code: u8) {
        match ProtocolCode::try_from(code) {
            Ok(ProtocolCode::Activate) => info!("activated by {}", peer),
            Ok(ProtocolCode::Deactivate) => info!("deactivated by {}", peer),
            _ => warn!("unexpected code {} from {}", code, peer),
        }
    }

    async fn on_lost(&self, peer: SocketAddr, error: SessionError) {
        warn!("session with {} ended: {}", peer, error);
    }
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let rendezvous: SocketAddr = args.rendezvous.parse()?;
    let config = Arc::new(SessionConfig::default());
    let client = Client::new(config.clone(), Arc::new(SensorHandler));

    // re-register whenever a session ends; a run of failed handshakes beyond the
    //  tolerance means the registrar is gone for good
    let mut consecutive_failures = 0u32;
    loop {
        match client.register(rendezvous).await {
            Ok(()) => {
                consecutive_failures = 0;
                info!("session ended, re-registering with {}", rendezvous);
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!(
                    "registration with {} failed ({} in a row): {}",
                    rendezvous, consecutive_failures, e
                );
                if consecutive_failures > config.tolerance {
                    anyhow::bail!("giving up on {} after {} failed registrations", rendezvous, consecutive_failures);
                }
            }
        }
        time::sleep(jittered_wait(&config)).await;
    }
}
