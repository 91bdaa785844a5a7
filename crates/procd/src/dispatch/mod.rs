//! Request dispatch for daemon connections.
//!
//! Each accepted connection carries exactly one request frame. The
//! [`ProtocolConnectionHandler`] checks the peer against the allow-list,
//! decodes the frame, routes it to a [`procd_protocol::CommandHandler`] and
//! writes one response frame before the connection closes.
//!
//! ## Routing
//!
//! | command          | parameters                   | success payload    |
//! |------------------|------------------------------|--------------------|
//! | `get`            | path                         | file text          |
//! | `put`            | path, text                   | empty              |
//! | `putbinary`      | path, bytes                  | empty              |
//! | `mkdir`          | path                         | empty              |
//! | `rm`             | path                         | empty              |
//! | `exists`         | path                         | `1` or `0`         |
//! | `execprocess`    | request document             | result document    |
//! | `waitforprocess` | handle, timeout millis       | result document    |
//!
//! Any failure becomes a response frame carrying the matching error code.

mod handler;
mod router;

pub(crate) use self::handler::ProtocolConnectionHandler;

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
