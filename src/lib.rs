//! Liveness-tracked logical sessions over UDP, with a registrar that fans application
//!  codes out to all currently-live peers.
//!
//! UDP gives no delivery, ordering or connection guarantees, so everything resembling a
//!  'session' here is built from timeouts, retries and a tiny fixed-size wire format:
//!  * a *registration handshake* migrates each peer off the shared rendezvous socket onto
//!    a private ephemeral port pair
//!  * a per-session *heartbeat* loop probes the peer and counts consecutive failures; the
//!    session is evicted once the count reaches the configured tolerance
//!  * a per-session *digest* loop is the only inbound path: it answers probes, dispatches
//!    application codes to the registered handler, and exits only through the session's
//!    termination latch
//!
//! All retry, backoff and heartbeat intervals are jittered (base + uniform random offset)
//!  so that many peers sharing one rendezvous socket do not synchronise into correlated
//!  retry storms.
//!
//! ## Wire format
//!
//! Every datagram is exactly two bytes:
//! ```ascii
//! 0: opcode - 1 for a liveness probe ('ping'), 0 for a data / control frame
//! 1: payload - the probe tag, or an application / control code
//! ```
//!
//! A probe `{1, tag}` is answered with `{0, tag}`; the tag is caller-chosen and correlates
//!  request and reply. Data frames carry one of the shared [`protocol::ProtocolCode`]
//!  values (or any application-defined byte) and are dispatched to the receiving side's
//!  [`handler::SessionHandler`] without a reply.
//!
//! Datagrams of any other length are logged and dropped; they never terminate a read loop.
//!
//! ## Roles
//!
//! * [`registry::SubscriberRegistry`] - the server / registrar side: accepts registrations
//!   on the rendezvous socket, owns the set of live sessions, and broadcasts codes to all
//!   of them concurrently
//! * [`client::Client`] - the sensor side: registers once, then answers probes and
//!   exchanges codes until the session dies; reconnecting is the caller's policy

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod util;

#[cfg(test)]
pub mod test_util;
