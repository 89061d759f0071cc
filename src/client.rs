use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::handler::SessionHandler;
use crate::protocol::{Frame, ProtocolCode};
use crate::session::{self, ephemeral_socket, ping_pong_with_retries, run_digest, run_heartbeat, Session};
use crate::util::jitter::jittered_wait;

/// The sensor side: registers with a registrar's rendezvous address, then runs the
///  resulting session (answering probes, dispatching inbound codes) until it dies.
///
/// [`Client::register`] blocks for the lifetime of the session; a session that ends
///  through eviction still counts as a *successful* registration, so the caller's
///  reconnect policy - bounded or unbounded - lives outside this type.
pub struct Client {
    config: Arc<SessionConfig>,
    handler: Arc<dyn SessionHandler>,
    current_peer: Mutex<Option<SocketAddr>>,
}

impl Client {
    pub fn new(config: Arc<SessionConfig>, handler: Arc<dyn SessionHandler>) -> Client {
        Client {
            config,
            handler,
            current_peer: Mutex::new(None),
        }
    }

    /// the migrated session peer, while a session is up
    pub async fn current_peer(&self) -> Option<SocketAddr> {
        *self.current_peer.lock().await
    }

    /// deliver an application code to the registrar over the current session
    pub async fn send_code(&self, code: u8) -> Result<(), SessionError> {
        let peer = self
            .current_peer
            .lock()
            .await
            .ok_or(SessionError::Terminated)?;
        session::send_code(peer, code, &self.config).await
    }

    /// Register with the registrar at `rendezvous` and run the session to its end.
    ///
    /// Handshake: probe the rendezvous socket for reachability, request
    ///  registration, follow the redirect to the registrar's fresh ephemeral
    ///  socket, confirm - then heartbeat and digest take over. Each step retries
    ///  up to `tolerance` times with jittered pacing; exhausting any step fails
    ///  this call as a whole.
    pub async fn register(&self, rendezvous: SocketAddr) -> Result<(), SessionError> {
        let socket = Arc::new(ephemeral_socket(rendezvous).await?);

        debug!("probing rendezvous {}", rendezvous);
        ping_pong_with_retries(&socket, rendezvous, ProtocolCode::Ping.into(), &self.config).await?;

        let peer = self.request_redirect(&socket, rendezvous).await?;
        self.confirm(&socket, peer).await?;
        info!("registered with {}, session migrated to {}", rendezvous, peer);

        let session = Arc::new(Session::bound(
            socket,
            peer,
            self.config.clone(),
            self.handler.clone(),
        ));
        *self.current_peer.lock().await = Some(peer);

        tokio::spawn(run_heartbeat(session.clone()));
        let ended = run_digest(session).await;
        *self.current_peer.lock().await = None;

        match ended {
            // the session ending is a registration that ran its course, not a
            //  failure of this call - `on_lost` has already reported the cause
            Ok(()) | Err(SessionError::Terminated) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn request_redirect(
        &self,
        socket: &UdpSocket,
        rendezvous: SocketAddr,
    ) -> Result<SocketAddr, SessionError> {
        let request = Frame::data(ProtocolCode::Register.into()).encode();
        let mut buf = [0u8; 8];

        for attempt in 1..=self.config.tolerance {
            if let Err(e) = socket.send_to(&request, rendezvous).await {
                warn!(
                    "sending registration request failed on attempt {}/{}: {}",
                    attempt, self.config.tolerance, e
                );
                time::sleep(jittered_wait(&self.config)).await;
                continue;
            }
            debug!("registration request {}/{} sent to {}", attempt, self.config.tolerance, rendezvous);

            let (len, from) =
                match time::timeout(jittered_wait(&self.config), socket.recv_from(&mut buf)).await {
                    Err(_elapsed) => continue,
                    Ok(Err(e)) => {
                        warn!("read error awaiting registration reply: {}", e);
                        time::sleep(jittered_wait(&self.config)).await;
                        continue;
                    }
                    Ok(Ok(x)) => x,
                };

            // The registrar answers from a fresh ephemeral socket, so the sender
            //  address *is* the migrated session peer. The reply arrives as the
            //  registrar's own REGISTER-tagged probe, so only the payload is
            //  checked; our confirm frame doubles as the pong it is waiting for.
            match Frame::decode(&buf[..len]) {
                Some(reply) if reply.payload == u8::from(ProtocolCode::Register) => {
                    return Ok(from);
                }
                _ => warn!("unexpected registration reply from {}", from),
            }
        }
        Err(SessionError::Exhausted { attempts: self.config.tolerance })
    }

    async fn confirm(&self, socket: &UdpSocket, peer: SocketAddr) -> Result<(), SessionError> {
        let confirm = Frame::data(ProtocolCode::Register.into()).encode();
        for attempt in 1..=self.config.tolerance {
            match socket.send_to(&confirm, peer).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    warn!(
                        "sending registration confirm failed on attempt {}/{}: {}",
                        attempt, self.config.tolerance, e
                    );
                    time::sleep(jittered_wait(&self.config)).await;
                }
            }
        }
        Err(SessionError::Exhausted { attempts: self.config.tolerance })
    }
}
