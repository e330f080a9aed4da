//! Socket capability traits.
//!
//! The network stack hands out a [`SocketFactory`] once joined. The
//! control server asks it for a [`Listener`] and then accepts at most one
//! [`Connection`] per poll. Connections speak `embedded-io-async`; the
//! server only calls `read` after [`Connection::readable`] said it would
//! not wait.

use embedded_io_async::{Read, Write};

use crate::error::SocketError;

#[allow(async_fn_in_trait)]
pub trait SocketFactory {
    type Listener: Listener;

    /// Start a TCP server on `port`.
    async fn listen(&mut self, port: u16) -> Result<Self::Listener, SocketError>;
}

#[allow(async_fn_in_trait)]
pub trait Listener {
    type Connection: Connection;

    /// Take a pending client if there is one. Must not wait for one.
    async fn accept(&mut self) -> Result<Option<Self::Connection>, SocketError>;
}

#[allow(async_fn_in_trait)]
pub trait Connection: Read + Write {
    /// Whether a `read` would return without waiting: bytes are pending
    /// or the peer has closed. Must not wait itself.
    async fn readable(&mut self) -> Result<bool, SocketError>;

    /// Tear the connection down. Errors are the caller's to log.
    async fn close(self) -> Result<(), SocketError>;
}
