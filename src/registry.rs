use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::handler::SessionHandler;
use crate::protocol::ProtocolCode;
use crate::session::{
    ephemeral_socket, ping_pong_with_retries, run_digest, run_heartbeat, send_code, Session,
};

/// stable arena key for a registered session - assigned monotonically, never reused
pub type SubscriberId = u64;

/// The registrar side: owns the set of live subscriber sessions and the rendezvous
///  socket that admits new ones.
///
/// The membership map is the only structure touched by multiple sessions; its mutex
///  is held for in-memory updates and snapshots only, never across network I/O.
///  Insertion happens only after a completed handshake; removal happens only from
///  the dying session's own termination hook, and completes before the loss is
///  reported through the handler.
pub struct SubscriberRegistry {
    config: Arc<SessionConfig>,
    handler: Arc<dyn SessionHandler>,
    members: Mutex<FxHashMap<SubscriberId, Arc<Session>>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    pub fn new(config: Arc<SessionConfig>, handler: Arc<dyn SessionHandler>) -> Arc<SubscriberRegistry> {
        Arc::new(SubscriberRegistry {
            config,
            handler,
            members: Mutex::new(FxHashMap::default()),
            next_id: AtomicU64::new(0),
        })
    }

    pub async fn subscriber_count(&self) -> usize {
        self.members.lock().await.len()
    }

    /// Deliver one application code to every current subscriber concurrently and
    ///  wait for all deliveries to finish. Failures are independent - one
    ///  unresponsive subscriber neither blocks nor fails delivery to the others -
    ///  so the worst case is bounded by one delivery's retry budget, not by the
    ///  number of subscribers. An error means nobody received the code at all.
    pub async fn broadcast(&self, code: u8) -> Result<(), SessionError> {
        // snapshot under the lock; members may be evicted while the fan-out runs
        let peers: Vec<SocketAddr> = self.members.lock().await.values().map(|s| s.peer()).collect();
        if peers.is_empty() {
            return Err(SessionError::NoSubscribers);
        }

        debug!("broadcasting code {} to {} subscribers", code, peers.len());
        let mut deliveries = JoinSet::new();
        for peer in peers {
            let config = self.config.clone();
            deliveries.spawn(async move {
                match send_code(peer, code, &config).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("delivery of code {} to {} failed: {}", code, peer, e);
                        false
                    }
                }
            });
        }

        let mut any_delivered = false;
        while let Some(joined) = deliveries.join_next().await {
            any_delivered |= joined.unwrap_or(false);
        }
        if any_delivered {
            Ok(())
        } else {
            Err(SessionError::Undelivered)
        }
    }

    async fn is_member(&self, peer: SocketAddr) -> bool {
        self.members.lock().await.values().any(|s| s.peer() == peer)
    }

    /// The registrar side of the handshake, run once per registration request:
    ///  open a fresh ephemeral socket, confirm bidirectional reachability on it
    ///  (REGISTER-tagged probe, then a plain one), and only then admit the session
    ///  and run its loops. Blocks for the lifetime of the session.
    ///
    /// A duplicate request from an already-registered address (a UDP duplicate, or
    ///  a client retry that raced the first responder) is dropped: its live session
    ///  would answer the probes, so the handshake alone cannot filter it. The
    ///  membership check is repeated under the lock at insertion, so two concurrent
    ///  responders for one requester can never both be admitted.
    pub async fn register(self: &Arc<Self>, requester: SocketAddr) -> Result<(), SessionError> {
        if self.is_member(requester).await {
            debug!("ignoring duplicate registration request from {}", requester);
            return Ok(());
        }

        info!("registration requested by {}", requester);
        let socket = Arc::new(ephemeral_socket(requester).await?);

        ping_pong_with_retries(&socket, requester, ProtocolCode::Register.into(), &self.config).await?;
        ping_pong_with_retries(&socket, requester, ProtocolCode::Ping.into(), &self.config).await?;

        let session = Arc::new(Session::bound(
            socket,
            requester,
            self.config.clone(),
            self.handler.clone(),
        ));

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut members = self.members.lock().await;
            if members.values().any(|s| s.peer() == requester) {
                debug!("dropping concurrent duplicate registration of {}", requester);
                return Ok(());
            }
            members.insert(id, session.clone());
        }

        let registry = Arc::downgrade(self);
        session
            .set_on_terminated(Box::pin(async move {
                if let Some(registry) = registry.upgrade() {
                    registry.members.lock().await.remove(&id);
                    debug!("subscriber #{} evicted", id);
                }
            }))
            .await;

        info!("subscriber {} registered as #{}", requester, id);
        tokio::spawn(run_heartbeat(session.clone()));

        // the ending is the heartbeat's verdict, already reported via on_lost
        let _ = run_digest(session).await;
        Ok(())
    }

    /// bind the shared rendezvous socket without consuming the caller
    pub async fn bind(self: &Arc<Self>, rendezvous: SocketAddr) -> Result<RegistrarListener, SessionError> {
        let socket = Arc::new(UdpSocket::bind(rendezvous).await?);
        let local_addr = socket.local_addr()?;
        info!("registrar listening on {}", local_addr);

        let dispatch = Arc::new(RegistrationDispatch { registry: Arc::downgrade(self) });
        let session = Arc::new(Session::listener(socket, local_addr, self.config.clone(), dispatch));
        Ok(RegistrarListener { session, local_addr })
    }

    /// accept registrations on the rendezvous address; never returns in normal operation
    pub async fn listen(self: &Arc<Self>, rendezvous: SocketAddr) -> Result<(), SessionError> {
        self.bind(rendezvous).await?.run().await
    }
}

/// The bound rendezvous socket, ready to accept registrations. Splitting this off
///  [`SubscriberRegistry::listen`] lets callers bind to port 0 and learn the
///  actual address before starting the loop.
pub struct RegistrarListener {
    session: Arc<Session>,
    local_addr: SocketAddr,
}

impl RegistrarListener {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The rendezvous loop is a plain digest with no fixed peer: it answers
    ///  reachability probes itself, and its handler turns REGISTER frames into
    ///  handshake responders.
    pub async fn run(self) -> Result<(), SessionError> {
        run_digest(self.session).await
    }
}

/// the rendezvous socket's handler: every REGISTER frame spawns an independent
///  handshake so concurrent registrations never block each other
struct RegistrationDispatch {
    registry: Weak<SubscriberRegistry>,
}

#[async_trait]
impl SessionHandler for RegistrationDispatch {
    async fn on_message(&self, peer: SocketAddr, code: u8) {
        if code != u8::from(ProtocolCode::Register) {
            debug!("ignoring code {} from {} on the rendezvous socket", code, peer);
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            tokio::spawn(async move {
                if let Err(e) = registry.register(peer).await {
                    warn!("registration of {} failed: {}", peer, e);
                }
            });
        }
    }

    async fn on_lost(&self, _peer: SocketAddr, _error: SessionError) {
        // the rendezvous listener has no heartbeat and is never killed
    }
}
