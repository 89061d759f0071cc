use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use clap_derive::Parser;
use pulselink::config::SessionConfig;
use pulselink::error::SessionError;
use pulselink::handler::SessionHandler;
use pulselink::protocol::ProtocolCode;
use pulselink::registry::SubscriberRegistry;
use tokio::select;
use tokio::time;
use tracing::{info, warn, Level};

#[derive(Parser)]
struct Args {
    /// rendezvous address to accept registrations on, e.g. 0.0.0.0:9000
    listen_address: String,

    /// seconds between broadcasts
    #[clap(long, default_value_t = 5)]
    broadcast_period: u64,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,
}

struct LoggingHandler;

#[async_trait]
impl SessionHandler for LoggingHandler {
    async fn on_message(&self, peer: SocketAddr, code: u8) {
        info!("received code {} from subscriber {}", code, peer);
    }

    async fn on_lost(&self, peer: SocketAddr, error: SessionError) {
        warn!("lost subscriber {}: {}", peer, error);
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

    let listen_address: SocketAddr = args.listen_address.parse()?;
    let registry = SubscriberRegistry::new(
        Arc::new(SessionConfig::default()),
        Arc::new(LoggingHandler),
    );

    select! {
        result = registry.listen(listen_address) => { result.map_err(anyhow::Error::from) }
        _ = broadcast_loop(registry.clone(), Duration::from_secs(args.broadcast_period)) => { Ok(()) }
    }
}

/// alternate ACTIVATE / DEACTIVATE across all subscribers on a fixed period
async fn broadcast_loop(registry: Arc<SubscriberRegistry>, period: Duration) {
    let mut interval = time::interval(period);
    let mut activate = true;

    loop {
        interval.tick().await;
        let code = if activate { ProtocolCode::Activate } else { ProtocolCode::Deactivate };
        activate = !activate;

        match registry.broadcast(code.into()).await {
            Ok(()) => info!("broadcast {:?} to {} subscribers", code, registry.subscriber_count().await),
            Err(SessionError::NoSubscribers) => info!("no subscribers yet, skipping broadcast"),
            Err(e) => warn!("broadcast failed: {}", e),
        }
    }
}
