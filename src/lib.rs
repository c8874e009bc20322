//! A bounded-buffer HTTP/1.1 client engine for constrained devices.
//!
//! The engine formats requests into caller-supplied buffers, sends them
//! over a pluggable TLS transport capability and parses the response back
//! into caller-supplied buffers, never allocating payload storage of its
//! own. Requests queue per connection with at most one in flight; they can
//! be driven synchronously (block on completion) or asynchronously
//! (callback streaming).
#[macro_use(quick_error)] extern crate quick_error;
#[macro_use] extern crate matches;
#[macro_use] extern crate log;
extern crate httparse;

pub mod connection;
pub mod request;
pub mod response;
pub mod transport;
mod body_parser;
mod chunked;
mod engine;
mod error;
mod head_parser;
mod headers;
mod method;
mod netdriver;
mod serializer;
mod signal;
mod window;

pub use self::connection::{ConnectInfo, HttpsClient, HttpsConnection};
pub use self::error::Error;
pub use self::method::Method;
pub use self::request::{AsyncHandlers, Request, RequestBodyWriter,
                        RequestInfo};
pub use self::response::{ParseState, Response, ResponseBodyReader};
pub use self::transport::{Connector, Credentials, ReceiveReady, ServerInfo,
                          TaskPool, Transport};
pub use self::window::Window;

/// Sent in the `User-Agent` header of every request.
pub const USER_AGENT: &'static str =
    concat!("fixbuf-https/", env!("CARGO_PKG_VERSION"));

/// Per-receive wait used when a connection selects no timeout of its own.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Longest accepted host name.
pub const MAX_HOST_NAME_LEN: usize = 255;

/// Longest accepted ALPN protocol list.
pub const MAX_ALPN_PROTOCOLS_LEN: usize = 255;

/// Size of the scratch window the flush step drains into.
pub const FLUSH_WINDOW_SIZE: usize = 1024;

/// Smallest request buffer that can hold the longest request line plus the
/// default `User-Agent` and `Host` headers.
pub const MIN_REQUEST_WINDOW: usize =
    "CONNECT / HTTP/1.1\r\n".len() +
    "User-Agent: \r\n".len() + USER_AGENT.len() +
    "Host: \r\n".len();

/// Smallest response buffer that can ever hold a complete head.
pub const MIN_RESPONSE_WINDOW: usize = "HTTP/1.1 200 OK\r\n\r\n".len();

/// One-time library setup. Every parse table this engine uses is an
/// immutable static, so there is nothing to install; the function exists
/// for applications structured around an explicit init/deinit lifecycle.
pub fn init() {}

/// Counterpart of [`init`]; nothing to release.
pub fn deinit() {}
