//! TCP listener for the daemon.
//!
//! The listener binds the configured address and accepts connections in a
//! background thread, handing each one to a [`ConnectionHandler`] on its own
//! worker thread.

mod errors;
mod handler;
mod listener;
#[cfg(test)]
mod test_utils;

pub use self::errors::ListenerError;
pub(crate) use self::handler::ConnectionHandler;
pub(crate) use self::listener::TcpSocketListener;
#[cfg(test)]
pub(crate) use self::test_utils::CountingHandler;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
