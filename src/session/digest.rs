use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::time;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::protocol::Frame;
use crate::session::session::Session;
use crate::util::jitter::jittered_wait;

/// The session's inbound dispatcher: a blocking read loop with no deadline (the
///  handshake is long done - deadlines belong to the handshake and heartbeat).
///
/// Probes are answered by a spawned pong task, application frames are dispatched
///  fire-and-forget to the handler; neither blocks this loop, so a slow handler
///  cannot stall liveness detection. Transient read errors and malformed datagrams
///  are logged and skipped - the only exit is the session's termination latch,
///  reported as [`SessionError::Terminated`].
pub async fn run_digest(session: Arc<Session>) -> Result<(), SessionError> {
    let socket = session.socket().clone();
    let mut buf = [0u8; 8];

    loop {
        let (len, from) = tokio::select! {
            _ = session.shutdown_signal().notified() => {
                debug!("digest for {} woken for termination", session.peer());
                return Err(SessionError::Terminated);
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok(x) => x,
                Err(e) => {
                    // the latch decides whether this is the terminator shutting us
                    //  down or just a malformed datagram / transient fault
                    if !session.is_running() {
                        return Err(SessionError::Terminated);
                    }
                    warn!("transient read error on session with {}: {}", session.peer(), e);
                    continue;
                }
            }
        };

        if !session.is_running() {
            return Err(SessionError::Terminated);
        }

        if let Some(expected) = session.expected_peer() {
            // the peer's heartbeats and deliveries arrive from its other ephemeral
            //  sockets, so rejection is per host, not per port
            if from.ip() != expected.ip() {
                debug!("discarding frame from stranger {} (session is bound to {})", from, expected);
                continue;
            }
        }

        let frame = match Frame::decode(&buf[..len]) {
            Some(frame) => frame,
            None => {
                warn!("discarding datagram of length {} from {}", len, from);
                continue;
            }
        };

        // dispatched tasks get their inputs moved in by value, never borrowed from
        //  this loop's state
        if frame.is_ping() {
            debug!("ping {} from {}", frame.payload, from);
            tokio::spawn(pong_reply(
                socket.clone(),
                from,
                frame.payload,
                session.config().clone(),
            ));
        } else {
            let handler = session.handler().clone();
            tokio::spawn(async move { handler.on_message(from, frame.payload).await });
        }
    }
}

/// The automatic probe responder: echo `{0, tag}` to the prober, retried with
///  jittered backoff on send failure. This must keep working while the session is
///  otherwise idle - it is what the peer's heartbeat relies on.
async fn pong_reply(socket: Arc<UdpSocket>, to: SocketAddr, tag: u8, config: Arc<SessionConfig>) {
    for attempt in 1..=config.tolerance {
        match socket.send_to(&Frame::pong(tag).encode(), to).await {
            Ok(_) => return,
            Err(e) => {
                warn!(
                    "pong {} to {} failed on attempt {}/{}: {}",
                    tag, to, attempt, config.tolerance, e
                );
                time::sleep(jittered_wait(&config)).await;
            }
        }
    }
    warn!("giving up on pong {} to {}", tag, to);
}
