//! Request record and handle: formatting into the caller's request window,
//! user headers, the async handler surface and the single-shot body writer.

use std::sync::atomic::Ordering;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::connection::ConnectInfo;
use crate::error::Error;
use crate::method::Method;
use crate::response::{Response, ResponseBodyReader, ResponseInner,
                      ResponseState};
use crate::serializer::{HeaderError, MessageState};
use crate::signal::Signal;
use crate::window::Window;
use crate::{MIN_REQUEST_WINDOW, MIN_RESPONSE_WINDOW, MAX_HOST_NAME_LEN,
            USER_AGENT};

/// Application hooks for asynchronous requests. Invoked from the send task
/// and the receive dispatcher; implementations must be thread-safe.
pub trait AsyncHandlers: Send + Sync {
    /// Last chance to add headers before the block is put on the wire.
    fn append_headers(&self, _req: &Request) {}
    /// Supply the request body, exactly once, via the writer.
    fn write_body(&self, _body: &mut RequestBodyWriter) {}
    /// Body bytes are ready; call `body.read` to drain them. Invoked
    /// repeatedly until the message completes or the exchange is cancelled.
    fn read_ready(&self, body: &mut ResponseBodyReader);
    /// The exchange finished, successfully or not. Fires exactly once.
    fn response_complete(&self, _resp: &Response, _result: Result<(), Error>) {}
    /// The connection this request rode on was torn down.
    fn connection_closed(&self) {}
    /// An error was observed after submission.
    fn error(&self, _error: Error) {}
}

/// Everything needed to initialize a request. The buffers are caller
/// storage the library takes over; it never allocates more.
#[derive(Default)]
pub struct RequestInfo {
    pub host: String,
    pub path: String,
    pub method: Method,
    /// Emit `Connection: close` and drop the connection after the response.
    pub non_persistent: bool,
    /// Storage for the formatted request header block.
    pub request_buffer: Vec<u8>,
    /// Storage for the raw response head.
    pub response_buffer: Vec<u8>,
    /// Request body, fully known up front (synchronous mode).
    pub body: Option<Vec<u8>>,
    /// Storage for the response body (synchronous mode). `None` skips body
    /// capture; the flush step still drains the wire.
    pub response_body_buffer: Option<Vec<u8>>,
    /// Present for callback-driven (asynchronous) requests.
    pub handlers: Option<Arc<dyn AsyncHandlers>>,
    /// Enables implicit connect when the submit path sees no connection.
    pub connect_info: Option<ConnectInfo>,
}

pub(crate) struct RequestState {
    pub headers: Window,
    pub message: MessageState,
    pub body: Option<Vec<u8>>,
    pub body_written: bool,
    pub submitted: bool,
}

pub(crate) struct RequestInner {
    pub method: Method,
    pub non_persistent: bool,
    pub handlers: Option<Arc<dyn AsyncHandlers>>,
    pub connect_info: Option<ConnectInfo>,
    pub state: Mutex<RequestState>,
    pub response: Arc<ResponseInner>,
}

impl RequestInner {
    pub fn lock(&self) -> MutexGuard<RequestState> {
        self.state.lock().expect("request state mutex poisoned")
    }
    pub fn is_cancelled(&self) -> bool {
        self.response.cancelled.load(Ordering::SeqCst)
    }
}

fn header_error(e: HeaderError) -> Error {
    match e {
        HeaderError::NoSpace => Error::InsufficientMemory,
        _ => Error::InvalidParameter,
    }
}

/// Handle to a request record. Cheap to clone.
#[derive(Clone)]
pub struct Request {
    pub(crate) inner: Arc<RequestInner>,
}

impl Request {
    /// Format the request line and default headers into the request buffer
    /// and set up the paired response record.
    ///
    /// The formatting is deterministic: initializing twice from the same
    /// info produces byte-identical window contents.
    pub fn initialize(info: RequestInfo) -> Result<Request, Error> {
        if info.host.is_empty() || info.host.len() > MAX_HOST_NAME_LEN {
            return Err(Error::InvalidParameter);
        }
        if info.host.bytes().any(|b| b == b'\r' || b == b'\n') ||
            info.path.bytes().any(|b| b == b'\r' || b == b'\n')
        {
            return Err(Error::InvalidParameter);
        }
        if info.request_buffer.len() < MIN_REQUEST_WINDOW ||
            info.response_buffer.len() < MIN_RESPONSE_WINDOW
        {
            return Err(Error::InsufficientMemory);
        }

        let mut headers = Window::from_vec(info.request_buffer);
        headers.reset();
        let mut message = MessageState::RequestStart;
        message.request_line(&mut headers, &info.method, &info.path)
            .map_err(header_error)?;
        message.add_raw_header(&mut headers, "User-Agent",
                               USER_AGENT.as_bytes())
            .map_err(header_error)?;
        message.add_raw_header(&mut headers, "Host", info.host.as_bytes())
            .map_err(header_error)?;

        let response_headers = Window::from_vec(info.response_buffer);
        let body_window = if info.handlers.is_some() {
            // async mode: body storage arrives per read call
            None
        } else {
            info.response_body_buffer.map(Window::from_vec)
        };
        let response = Arc::new(ResponseInner {
            state: Mutex::new(ResponseState::new(
                response_headers, body_window)),
            cancelled: AtomicBool::new(false),
            finished_sending: AtomicBool::new(false),
            done: Signal::new(),
            is_head: info.method.is_head(),
            non_persistent: info.non_persistent,
            handlers: info.handlers.clone(),
        });

        let body_written = info.body.is_some();
        Ok(Request {
            inner: Arc::new(RequestInner {
                method: info.method,
                non_persistent: info.non_persistent,
                handlers: info.handlers,
                connect_info: info.connect_info,
                state: Mutex::new(RequestState {
                    headers: headers,
                    message: message,
                    body: info.body,
                    body_written: body_written,
                    submitted: false,
                }),
                response: response,
            }),
        })
    }

    /// Append a user header. `Content-Length`, `Connection`, `Host` and
    /// `User-Agent` are generated by the engine and rejected here.
    pub fn add_header(&self, name: &str, value: &[u8]) -> Result<(), Error> {
        let mut st = self.inner.lock();
        if st.message.is_complete() {
            return Err(Error::MessageFinished);
        }
        let RequestState { ref mut headers, ref mut message, .. } = *st;
        message.add_header(headers, name, value).map_err(header_error)
    }

    /// Handle to the paired response.
    pub fn response(&self) -> Response {
        Response { inner: self.inner.response.clone() }
    }

    /// Borrow the formatted header block written so far (request line,
    /// default headers, user headers).
    pub fn with_header_block<R, F>(&self, f: F) -> R
        where F: FnOnce(&[u8]) -> R
    {
        f(self.inner.lock().headers.filled())
    }

    /// Request cooperative cancellation; the send task and the async body
    /// loop observe it at their checkpoints.
    pub fn cancel(&self) {
        self.inner.response.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Single-shot body writer handed to the async `write_body` hook. The body
/// must be complete so `Content-Length` can be computed before the send.
pub struct RequestBodyWriter<'a> {
    pub(crate) inner: &'a RequestInner,
}

impl<'a> RequestBodyWriter<'a> {
    /// Set the request body. `complete` must be true; streamed uploads are
    /// out of scope for this client. A second call is rejected.
    pub fn write(&mut self, body: Vec<u8>, complete: bool)
        -> Result<(), Error>
    {
        if !complete {
            return Err(Error::NotSupported);
        }
        let mut st = self.inner.lock();
        if st.body_written {
            return Err(Error::MessageFinished);
        }
        st.body = Some(body);
        st.body_written = true;
        Ok(())
    }

    pub fn cancel(&self) {
        self.inner.response.cancelled.store(true, Ordering::SeqCst);
    }
}
