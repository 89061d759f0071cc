use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::handler::SessionHandler;

/// Tri-state termination latch. A session is `Running` from construction, becomes
///  `Stopping` the moment [`Session::kill`] wins the race to terminate it, and
///  `Stopped` once the loser-visible part of termination (eviction, `on_lost`) is done.
#[derive(Debug, Clone, Copy, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SessionPhase {
    Running = 0,
    Stopping = 1,
    Stopped = 2,
}

/// awaited by `kill()` after the latch is set and before `on_lost` fires, so that
///  e.g. registry removal completes before the loss becomes externally visible
type TerminationHook = Pin<Box<dyn Future<Output = ()> + Send>>;

/// One peer relationship: the session's socket, its peer address, the consecutive
///  heartbeat failure counter, and the termination latch.
///
/// The socket is exclusively owned by the session (shared only with its own loops);
///  the counter mutex is held for the in-memory update only, never across network
///  I/O, so the heartbeat and digest loops never block each other.
pub struct Session {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    /// frames from other addresses are discarded once a session is bound to one
    ///  peer; the shared rendezvous listener serves everybody and turns this off
    verify_source: bool,
    config: Arc<SessionConfig>,
    handler: Arc<dyn SessionHandler>,
    fail_counter: Mutex<u32>,
    phase: AtomicU8,
    shutdown: Notify,
    on_terminated: Mutex<Option<TerminationHook>>,
}

impl Session {
    /// a session fixed to one peer, as produced by a completed handshake
    pub fn bound(
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        config: Arc<SessionConfig>,
        handler: Arc<dyn SessionHandler>,
    ) -> Session {
        Self::new(socket, peer, true, config, handler)
    }

    /// the shared rendezvous listener: no fixed peer, no heartbeat, never killed
    pub fn listener(
        socket: Arc<UdpSocket>,
        local_addr: SocketAddr,
        config: Arc<SessionConfig>,
        handler: Arc<dyn SessionHandler>,
    ) -> Session {
        Self::new(socket, local_addr, false, config, handler)
    }

    fn new(
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        verify_source: bool,
        config: Arc<SessionConfig>,
        handler: Arc<dyn SessionHandler>,
    ) -> Session {
        Session {
            socket,
            peer,
            verify_source,
            config,
            handler,
            fail_counter: Mutex::new(0),
            phase: AtomicU8::new(SessionPhase::Running.into()),
            shutdown: Notify::new(),
            on_terminated: Mutex::new(None),
        }
    }

    pub fn socket(&self) -> &Arc<UdpSocket> {
        &self.socket
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// the only address this session accepts frames from, if it has one
    pub fn expected_peer(&self) -> Option<SocketAddr> {
        self.verify_source.then_some(self.peer)
    }

    pub fn config(&self) -> &Arc<SessionConfig> {
        &self.config
    }

    pub fn handler(&self) -> &Arc<dyn SessionHandler> {
        &self.handler
    }

    pub fn phase(&self) -> SessionPhase {
        // only valid discriminants are ever stored
        SessionPhase::try_from(self.phase.load(Ordering::Acquire))
            .unwrap_or(SessionPhase::Stopped)
    }

    pub fn is_running(&self) -> bool {
        self.phase() == SessionPhase::Running
    }

    /// the digest loop's wakeup for termination; a permit is stored if nobody is
    ///  waiting yet, so the signal is never lost
    pub(crate) fn shutdown_signal(&self) -> &Notify {
        &self.shutdown
    }

    /// increment the consecutive-failure counter, returning the new value
    pub async fn record_failure(&self) -> u32 {
        let mut counter = self.fail_counter.lock().await;
        *counter += 1;
        *counter
    }

    /// reset the counter after a successful probe; true if this was a recovery
    ///  (i.e. the counter was non-zero)
    pub async fn record_success(&self) -> bool {
        let mut counter = self.fail_counter.lock().await;
        let recovered = *counter > 0;
        *counter = 0;
        recovered
    }

    pub async fn fail_count(&self) -> u32 {
        *self.fail_counter.lock().await
    }

    /// registered by the registry after insertion; runs before `on_lost`
    pub async fn set_on_terminated(&self, hook: TerminationHook) {
        *self.on_terminated.lock().await = Some(hook);
    }

    /// Terminate the session exactly once. The order is fixed: (1) flip the latch,
    ///  (2) wake the digest read (the socket itself closes when the last loop drops
    ///  its handle), (3) run the termination hook, (4) `on_lost`. The latch is
    ///  visible before the digest unblocks, so the digest reports termination rather
    ///  than a transient fault; the hook runs before `on_lost`, so no caller ever
    ///  observes a registry still containing a dead session.
    pub async fn kill(&self, error: SessionError) {
        if self
            .phase
            .compare_exchange(
                SessionPhase::Running.into(),
                SessionPhase::Stopping.into(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            // somebody else is already terminating this session
            return;
        }

        debug!("terminating session with {}: {}", self.peer, error);
        self.shutdown.notify_one();

        if let Some(hook) = self.on_terminated.lock().await.take() {
            hook.await;
        }

        self.handler.on_lost(self.peer, error).await;
        self.phase.store(SessionPhase::Stopped.into(), Ordering::Release);
    }
}
