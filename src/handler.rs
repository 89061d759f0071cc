use std::net::SocketAddr;

use async_trait::async_trait;
#[cfg(test)] use mockall::automock;

use crate::error::SessionError;

/// The seam to the application: everything a session does with inbound application
///  codes or a dying connection goes through this trait. Implementations must be
///  cheap to call or offload their own work - a slow handler cannot stall liveness
///  detection (dispatch is fire-and-forget), but it can pile up tasks.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    /// invoked once per inbound application frame
    async fn on_message(&self, peer: SocketAddr, code: u8);

    /// invoked exactly once per session termination
    async fn on_lost(&self, peer: SocketAddr, error: SessionError);
}
