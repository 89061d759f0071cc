/// The failure taxonomy of the session protocol.
///
/// `Timeout` and `Protocol` are per-attempt failures that retry loops absorb;
///  `Transport` is a real I/O failure (retried with backoff so persistent errors
///  don't hot-spin); `Exhausted` surfaces once a retry budget is consumed.
///  `Terminated` is the intentional end of a session and is *not* an error for the
///  purpose of reconnect logic.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// a probe or read deadline elapsed - silently retried
    #[error("timed out waiting for a reply")]
    Timeout,

    /// an I/O failure other than a timeout
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// malformed or unexpected frame content
    #[error("protocol error: {0}")]
    Protocol(&'static str),

    /// the retry budget for an operation is used up
    #[error("gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// the session was intentionally ended (deregistered / evicted)
    #[error("session deregistered")]
    Terminated,

    /// broadcast with nobody to deliver to
    #[error("no subscribers remaining")]
    NoSubscribers,

    /// a broadcast where every subscriber exhausted its delivery budget
    #[error("code was delivered to no subscriber")]
    Undelivered,
}

impl SessionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::Timeout)
    }
}
