//! Connection handler speaking the framed request/response protocol.

use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use procd_config::{DEFAULT_READ_TIMEOUT_MS, IpFilter};
use procd_protocol::{CommandError, CommandHandler, FrameLimits, RequestFrame, ResponseFrame};
use tracing::{debug, info, warn};

use super::DISPATCH_TARGET;
use super::router::route;
use crate::transport::ConnectionHandler;

const LINGER_TIMEOUT: Duration = Duration::from_millis(250);
const LINGER_LIMIT: u64 = 64 * 1024;

/// Serves exactly one request per accepted connection.
pub(crate) struct ProtocolConnectionHandler {
    handler: Arc<dyn CommandHandler>,
    filter: IpFilter,
    read_timeout: Duration,
    limits: FrameLimits,
}

impl ProtocolConnectionHandler {
    pub(crate) fn new(handler: Arc<dyn CommandHandler>, filter: IpFilter) -> Self {
        Self {
            handler,
            filter,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            limits: FrameLimits::default(),
        }
    }

    pub(crate) const fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    #[cfg(test)]
    pub(crate) const fn with_limits(mut self, limits: FrameLimits) -> Self {
        self.limits = limits;
        self
    }

    fn respond(&self, stream: &TcpStream, peer: SocketAddr) -> ResponseFrame {
        if !self.filter.allows(peer.ip()) {
            warn!(target: DISPATCH_TARGET, %peer, "rejected connection from disallowed address");
            return ResponseFrame::from_error(&CommandError::rejected_address(peer.ip()));
        }
        if let Err(error) = stream.set_read_timeout(Some(self.read_timeout)) {
            warn!(target: DISPATCH_TARGET, %peer, %error, "failed to set read timeout");
        }

        let mut reader = BufReader::new(stream);
        let request = match RequestFrame::read_from(&mut reader, self.limits) {
            Ok(request) => request,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %peer, %error, "malformed request frame");
                return ResponseFrame::from_error(&CommandError::malformed(error.to_string()));
            }
        };

        match route(self.handler.as_ref(), &request) {
            Ok(payload) => {
                info!(
                    target: DISPATCH_TARGET,
                    %peer,
                    command = request.command().trim(),
                    "request completed"
                );
                ResponseFrame::success(payload)
            }
            Err(error) => {
                info!(
                    target: DISPATCH_TARGET,
                    %peer,
                    command = request.command().trim(),
                    code = error.code(),
                    %error,
                    "request failed"
                );
                ResponseFrame::from_error(&error)
            }
        }
    }
}

impl ConnectionHandler for ProtocolConnectionHandler {
    fn handle(&self, stream: TcpStream, peer: SocketAddr) {
        let response = self.respond(&stream, peer);
        let mut writer = BufWriter::new(&stream);
        let written = response
            .write_to(&mut writer)
            .and_then(|()| writer.flush().map_err(Into::into));
        match written {
            Ok(()) => debug!(
                target: DISPATCH_TARGET,
                %peer,
                code = response.code(),
                "response written"
            ),
            Err(error) => warn!(
                target: DISPATCH_TARGET,
                %peer,
                %error,
                "failed to write response"
            ),
        }
        linger(&stream);
    }
}

/// Half-closes the stream and discards unread input so the peer receives
/// the response before the connection is torn down.
fn linger(stream: &TcpStream) {
    if stream.shutdown(Shutdown::Write).is_err()
        || stream.set_read_timeout(Some(LINGER_TIMEOUT)).is_err()
    {
        return;
    }
    let mut remaining = Read::take(stream, LINGER_LIMIT);
    if let Err(error) = io::copy(&mut remaining, &mut io::sink()) {
        debug!(target: DISPATCH_TARGET, %error, "stopped draining connection");
    }
}
