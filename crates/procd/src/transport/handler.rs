//! Connection handling abstraction for the daemon listener.

use std::net::{SocketAddr, TcpStream};

/// Handles accepted socket connections.
pub(crate) trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: TcpStream, peer: SocketAddr);
}
