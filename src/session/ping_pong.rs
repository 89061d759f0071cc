use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::time;
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::protocol::{Frame, OPCODE_DATA};
use crate::session::ephemeral_socket;
use crate::util::jitter::jittered_wait;

/// One liveness round trip: send `{1, tag}` to the target and require the echo
///  `{0, tag}` within a jittered deadline. Exactly one outcome per call.
///
/// A timeout returns immediately (the caller's next attempt provides the pacing);
///  any other failure sleeps one jittered wait first so that a persistent error -
///  an unreachable network, a closed socket - cannot hot-spin a retry loop.
pub async fn ping_pong(
    socket: &UdpSocket,
    target: SocketAddr,
    tag: u8,
    config: &SessionConfig,
) -> Result<(), SessionError> {
    match probe_once(socket, target, tag, config).await {
        Err(e) if !e.is_timeout() => {
            time::sleep(jittered_wait(config)).await;
            Err(e)
        }
        other => other,
    }
}

async fn probe_once(
    socket: &UdpSocket,
    target: SocketAddr,
    tag: u8,
    config: &SessionConfig,
) -> Result<(), SessionError> {
    socket.send_to(&Frame::ping(tag).encode(), target).await?;

    let mut buf = [0u8; 8];
    let (len, _from) = match time::timeout(jittered_wait(config), socket.recv_from(&mut buf)).await
    {
        Err(_elapsed) => return Err(SessionError::Timeout),
        Ok(received) => received?,
    };

    let reply = Frame::decode(&buf[..len])
        .ok_or(SessionError::Protocol("reply is not a two-byte frame"))?;
    if reply.opcode != OPCODE_DATA || reply.payload != tag {
        return Err(SessionError::Protocol("reply does not echo the probe tag"));
    }
    Ok(())
}

/// [`ping_pong`] with the standard retry budget: up to `tolerance` attempts, then
///  [`SessionError::Exhausted`].
pub async fn ping_pong_with_retries(
    socket: &UdpSocket,
    target: SocketAddr,
    tag: u8,
    config: &SessionConfig,
) -> Result<(), SessionError> {
    for attempt in 1..=config.tolerance {
        match ping_pong(socket, target, tag, config).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                debug!(
                    "probe {} to {} failed on attempt {}/{}: {}",
                    tag, target, attempt, config.tolerance, e
                );
            }
        }
    }
    Err(SessionError::Exhausted { attempts: config.tolerance })
}

/// Deliver one application code to a peer from a fresh ephemeral socket.
///
/// Each attempt sends the data frame `{0, code}` and then probes the peer with the
///  code as the correlation tag; the peer's automatic probe responder echoing
///  `{0, code}` confirms the path. Retries may re-deliver the data frame -
///  delivery is at-least-once, never exactly-once.
pub async fn send_code(
    target: SocketAddr,
    code: u8,
    config: &SessionConfig,
) -> Result<(), SessionError> {
    let socket = ephemeral_socket(target).await?;
    debug!("sending code {} to {}", code, target);

    for attempt in 1..=config.tolerance {
        let delivered = async {
            socket.send_to(&Frame::data(code).encode(), target).await?;
            ping_pong(&socket, target, code, config).await
        }
        .await;

        match delivered {
            Ok(()) => return Ok(()),
            Err(e) => {
                debug!(
                    "delivery of code {} to {} failed on attempt {}/{}: {}",
                    code, target, attempt, config.tolerance, e
                );
            }
        }
    }
    Err(SessionError::Exhausted { attempts: config.tolerance })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OPCODE_PING;
    use crate::test_util::Responder;
    use std::time::Duration;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            base_interval: Duration::from_millis(30),
            jitter_ceiling: Duration::from_millis(20),
            tolerance: 3,
        }
    }

    #[tokio::test]
    async fn test_ping_pong_against_responding_peer() {
        let config = fast_config();
        let responder = Responder::start().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        ping_pong(&socket, responder.addr, 42, &config).await.unwrap();

        // the peer observed exactly one probe frame {1, 42}
        let seen = responder.seen().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, Frame::ping(42));
    }

    #[tokio::test]
    async fn test_ping_pong_times_out_on_silent_peer() {
        let config = fast_config();
        // bound but never replying
        let black_hole = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let result = ping_pong(&socket, black_hole.local_addr().unwrap(), 1, &config).await;
        assert!(matches!(result, Err(SessionError::Timeout)));
    }

    #[tokio::test]
    async fn test_ping_pong_rejects_wrong_tag() {
        let config = fast_config();
        let liar = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let liar_addr = liar.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 8];
            let (_, from) = liar.recv_from(&mut buf).await.unwrap();
            liar.send_to(&Frame::pong(99).encode(), from).await.unwrap();
        });

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let result = ping_pong(&socket, liar_addr, 1, &config).await;
        assert!(matches!(result, Err(SessionError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_ping_pong_rejects_ping_opcode_reply() {
        let config = fast_config();
        let liar = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let liar_addr = liar.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 8];
            let (_, from) = liar.recv_from(&mut buf).await.unwrap();
            // correct tag, but echoed as another probe instead of a pong
            liar.send_to(&[OPCODE_PING, 1], from).await.unwrap();
        });

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let result = ping_pong(&socket, liar_addr, 1, &config).await;
        assert!(matches!(result, Err(SessionError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_retries_exhaust_against_silent_peer() {
        let config = SessionConfig { tolerance: 2, ..fast_config() };
        let black_hole = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let result =
            ping_pong_with_retries(&socket, black_hole.local_addr().unwrap(), 1, &config).await;
        assert!(matches!(result, Err(SessionError::Exhausted { attempts: 2 })));
    }

    #[tokio::test]
    async fn test_send_code_delivers_data_frame_and_confirms() {
        let config = fast_config();
        let responder = Responder::start().await;

        send_code(responder.addr, 4, &config).await.unwrap();

        let seen = responder.seen().await;
        assert!(seen.iter().any(|(_, f)| *f == Frame::data(4)));
        assert!(seen.iter().any(|(_, f)| *f == Frame::ping(4)));
    }

    #[tokio::test]
    async fn test_send_code_exhausts_against_silent_peer() {
        let config = SessionConfig { tolerance: 2, ..fast_config() };
        let black_hole = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let result = send_code(black_hole.local_addr().unwrap(), 4, &config).await;
        assert!(matches!(result, Err(SessionError::Exhausted { attempts: 2 })));
    }
}
