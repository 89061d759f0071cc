use std::sync::Arc;

use tokio::time;
use tracing::{info, warn};

use crate::protocol::ProtocolCode;
use crate::session::ping_pong::ping_pong;
use crate::session::session::Session;
use crate::session::ephemeral_socket;
use crate::util::jitter::jittered_wait;

/// The per-session heartbeat loop: one task per session, started once, terminating
///  itself. Each cycle sleeps a jittered wait and probes the peer from a dedicated
///  ephemeral socket; a success resets the consecutive-failure counter, a failure
///  increments it, and reaching the tolerance kills the session - the only path
///  that initiates involuntary termination.
///
/// The counter mutex is held for the update only, never across the probe.
pub async fn run_heartbeat(session: Arc<Session>) {
    let config = session.config().clone();
    let peer = session.peer();

    let socket = match ephemeral_socket(peer).await {
        Ok(socket) => socket,
        Err(e) => {
            session.kill(e.into()).await;
            return;
        }
    };

    loop {
        time::sleep(jittered_wait(&config)).await;
        if !session.is_running() {
            // terminated elsewhere while we slept
            return;
        }

        match ping_pong(&socket, peer, ProtocolCode::Ping.into(), &config).await {
            Ok(()) => {
                if session.record_success().await {
                    info!("{} recovered", peer);
                }
            }
            Err(e) => {
                let failures = session.record_failure().await;
                warn!(
                    "{} missed a probe, warning {}/{}: {}",
                    peer, failures, config.tolerance, e
                );
                if failures >= config.tolerance {
                    session.kill(e).await;
                    return;
                }
            }
        }
    }
}
