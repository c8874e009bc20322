//! Capabilities the client consumes: the TLS/TCP transport, its connector,
//! and the task pool that runs send tasks. Each is a small trait so that
//! ports supply their own implementations.

use std::time::Duration;

use crate::error::Error;

/// Receive-ready notification installed on a transport. Invoked on a
/// transport-owned thread whenever response bytes are waiting.
pub type ReceiveReady = Box<dyn Fn() + Send + Sync>;

/// Endpoint description handed to the connector. The transport applies
/// `timeout` to every receive call; the driver keeps no timer of its own.
#[derive(Debug, Clone)]
pub struct ServerInfo<'a> {
    pub host: &'a str,
    pub port: u16,
    pub timeout: Duration,
}

/// TLS material passed through to the transport verbatim.
#[derive(Debug, Clone, Default)]
pub struct Credentials<'a> {
    pub root_ca: Option<&'a [u8]>,
    pub client_cert: Option<&'a [u8]>,
    pub private_key: Option<&'a [u8]>,
    /// Comma-separated ALPN protocol list.
    pub alpn_protocols: Option<&'a str>,
    pub disable_sni: bool,
}

/// An established, possibly TLS-secured byte stream.
///
/// Dropping the handle is the destroy step; `close` is the orderly
/// shutdown that precedes it.
pub trait Transport: Send + Sync {
    /// Deliver bytes to the peer. Returns the number of bytes accepted;
    /// zero signals a transport error.
    fn send(&self, data: &[u8]) -> usize;
    /// Receive available bytes, waiting at most the configured timeout.
    /// Returns the number received; zero signals a timeout, a negative
    /// value a transport error. Partial reads are normal.
    fn receive(&self, buf: &mut [u8]) -> isize;
    /// Install the receive-ready notification for this stream.
    fn set_receive_ready(&self, callback: ReceiveReady) -> Result<(), Error>;
    fn close(&self) -> Result<(), Error>;
}

/// Creates transports. `credentials` is `None` for plain-TCP connections.
pub trait Connector: Send + Sync {
    fn connect(&self, server: &ServerInfo,
        credentials: Option<&Credentials>)
        -> Result<Box<dyn Transport>, Error>;
}

/// Schedules a unit of work on some worker thread.
pub trait TaskPool: Send + Sync {
    fn schedule(&self, job: Box<dyn FnOnce() + Send>) -> Result<(), Error>;
}
