/// Life cycle of a connection.
///
/// States only move forward, `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// waiting for the upgrade request
    HttpPending,
    /// handshake done, exchanging frames
    WebSocketOpen,
    /// marked for teardown on the next pass
    Closing,
    /// socket released, delete callback fired
    Closed,
}

impl ConnectionState {
    #[inline]
    pub const fn is_open(self) -> bool { matches!(self, ConnectionState::WebSocketOpen) }
}
