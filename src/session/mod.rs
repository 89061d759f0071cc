use std::net::SocketAddr;

use tokio::net::UdpSocket;

mod digest;
mod heartbeat;
mod ping_pong;
#[allow(clippy::module_inception)]
mod session;

pub use digest::run_digest;
pub use heartbeat::run_heartbeat;
pub use ping_pong::{ping_pong, ping_pong_with_retries, send_code};
pub use session::{Session, SessionPhase};

/// An unspecified-address socket of the peer's address family, bound to an ephemeral
///  port. Sessions, probes and one-shot deliveries all get their own.
pub(crate) async fn ephemeral_socket(peer: SocketAddr) -> std::io::Result<UdpSocket> {
    if peer.is_ipv4() {
        UdpSocket::bind("0.0.0.0:0").await
    } else {
        UdpSocket::bind("[::]:0").await
    }
}
