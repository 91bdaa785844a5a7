//! TCP connection helpers for the remote stub.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::errors::ClientError;

/// Default budget for establishing a connection.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, ClientError> {
    let endpoint = format!("{host}:{port}");
    let address = resolve_tcp_address(host, port).map_err(|source| ClientError::Resolve {
        endpoint: endpoint.clone(),
        source,
    })?;
    TcpStream::connect_timeout(&address, timeout)
        .map_err(|source| ClientError::Connect { endpoint, source })
}

fn resolve_tcp_address(host: &str, port: u16) -> io::Result<SocketAddr> {
    let mut addrs = (host, port).to_socket_addrs()?;
    addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses"))
}
