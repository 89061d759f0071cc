use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time;
use tokio::time::Instant;

use crate::error::SessionError;
use crate::handler::SessionHandler;
use crate::protocol::Frame;

/// a handler that records every callback for later assertions
pub struct RecordingHandler {
    messages: Mutex<Vec<(SocketAddr, u8)>>,
    lost: Mutex<Vec<(SocketAddr, String)>>,
}

impl RecordingHandler {
    pub fn new() -> RecordingHandler {
        RecordingHandler {
            messages: Mutex::new(Vec::new()),
            lost: Mutex::new(Vec::new()),
        }
    }

    pub async fn messages(&self) -> Vec<(SocketAddr, u8)> {
        self.messages.lock().await.clone()
    }

    pub async fn lost(&self) -> Vec<(SocketAddr, String)> {
        self.lost.lock().await.clone()
    }
}

#[async_trait]
impl SessionHandler for RecordingHandler {
    async fn on_message(&self, peer: SocketAddr, code: u8) {
        self.messages.lock().await.push((peer, code));
    }

    async fn on_lost(&self, peer: SocketAddr, error: SessionError) {
        self.lost.lock().await.push((peer, error.to_string()));
    }
}

/// A well-behaved fake peer: records every frame it receives and answers every
///  probe with the matching pong. [`Responder::stop`] silences it (the socket stays
///  bound, so probes keep vanishing into it) - that is how tests simulate a peer
///  dying without its port being reused.
pub struct Responder {
    socket: Arc<UdpSocket>,
    pub addr: SocketAddr,
    seen: Arc<Mutex<Vec<(SocketAddr, Frame)>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl Responder {
    pub async fn start() -> Responder {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = socket.local_addr().unwrap();
        let seen: Arc<Mutex<Vec<(SocketAddr, Frame)>>> = Arc::new(Mutex::new(Vec::new()));

        let loop_socket = socket.clone();
        let loop_seen = seen.clone();
        let handle = tokio::spawn(async move {
            let mut buf = [0u8; 8];
            loop {
                let Ok((len, from)) = loop_socket.recv_from(&mut buf).await else {
                    continue;
                };
                if let Some(frame) = Frame::decode(&buf[..len]) {
                    loop_seen.lock().await.push((from, frame));
                    if frame.is_ping() {
                        let _ = loop_socket.send_to(&Frame::pong(frame.payload).encode(), from).await;
                    }
                }
            }
        });

        Responder { socket, addr, seen, handle }
    }

    pub async fn send(&self, frame: Frame, to: SocketAddr) {
        self.socket.send_to(&frame.encode(), to).await.unwrap();
    }

    pub async fn seen(&self) -> Vec<(SocketAddr, Frame)> {
        self.seen.lock().await.clone()
    }

    /// stop answering; the socket stays bound
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// poll a condition until it holds or a generous deadline passes
pub async fn wait_until<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition().await {
            return true;
        }
        time::sleep(Duration::from_millis(20)).await;
    }
    false
}
