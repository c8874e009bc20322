//! Response record and handle. The record lives behind a mutex because the
//! receive dispatcher fills it on the transport thread while the submitting
//! thread (or the application's callbacks) read it.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::body_parser::{BodyKind, BodyProgress};
use crate::engine;
use crate::error::Error;
use crate::head_parser;
use crate::request::AsyncHandlers;
use crate::signal::Signal;
use crate::transport::Transport;
use crate::window::Window;

/// Position within the HTTP/1.1 response message. Monotonic; only the
/// header search pass runs a fresh parse, and that one cannot touch this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParseState {
    Start,
    InHeaders,
    HeadersComplete,
    InBody,
    BodyComplete,
}

/// Longest run of un-parsed chunk framing that may straddle two reads of
/// the async body: a chunk-size line with a short extension.
pub(crate) const CARRY_CAPACITY: usize = 32;

pub(crate) struct ResponseState {
    /// Header window: raw response head bytes accumulate here.
    pub headers: Window,
    /// Body window for synchronous requests; `None` skips body storage.
    pub body: Option<Window>,
    pub parse: ParseState,
    pub status_code: u16,
    pub content_length: Option<u64>,
    pub body_kind: Option<BodyKind>,
    pub progress: Option<BodyProgress>,
    /// Bytes of the head including the terminal blank line.
    pub head_len: usize,
    /// Async hand-off: body bytes that arrived inside the header window,
    /// waiting for the application to supply a body buffer.
    pub body_in_head: Range<usize>,
    pub carry: [u8; CARRY_CAPACITY],
    pub carry_len: usize,
    /// Server sent `Connection: close` (or spoke HTTP/1.0).
    pub close: bool,
    /// Last network status seen while receiving, kept for diagnostics.
    pub net_status: Option<Error>,
}

impl ResponseState {
    pub fn new(headers: Window, body: Option<Window>) -> ResponseState {
        let mut state = ResponseState {
            headers: headers,
            body: body,
            parse: ParseState::Start,
            status_code: 0,
            content_length: None,
            body_kind: None,
            progress: None,
            head_len: 0,
            body_in_head: 0..0,
            carry: [0; CARRY_CAPACITY],
            carry_len: 0,
            close: false,
            net_status: None,
        };
        state.reset_for_receive();
        state
    }

    /// Fresh parse over zeroed windows; stale bytes never read as payload.
    pub fn reset_for_receive(&mut self) {
        self.headers.reset();
        if let Some(ref mut body) = self.body {
            body.reset();
        }
        self.parse = ParseState::Start;
        self.status_code = 0;
        self.content_length = None;
        self.body_kind = None;
        self.progress = None;
        self.head_len = 0;
        self.body_in_head = 0..0;
        self.carry_len = 0;
        self.close = false;
        self.net_status = None;
    }
}

pub(crate) struct ResponseInner {
    pub state: Mutex<ResponseState>,
    /// Cooperative cancellation; shared between request and response.
    pub cancelled: AtomicBool,
    /// Protocol guard: response bytes may only follow a fully-sent request.
    pub finished_sending: AtomicBool,
    pub done: Signal,
    pub is_head: bool,
    pub non_persistent: bool,
    pub handlers: Option<Arc<dyn AsyncHandlers>>,
}

impl ResponseInner {
    pub fn is_async(&self) -> bool {
        self.handlers.is_some()
    }

    pub fn lock(&self) -> MutexGuard<ResponseState> {
        self.state.lock().expect("response state mutex poisoned")
    }

    /// Surface completion: async handlers or the sync completion signal.
    pub fn deliver(this: &Arc<ResponseInner>, result: Result<(), Error>) {
        if let Some(ref handlers) = this.handlers {
            if let Err(e) = result {
                handlers.error(e);
            }
            let resp = Response { inner: this.clone() };
            handlers.response_complete(&resp, result);
        } else {
            this.done.post(result);
        }
    }
}

/// Handle to a response record. Cheap to clone; all clones view the same
/// caller-supplied windows.
#[derive(Clone)]
pub struct Response {
    pub(crate) inner: Arc<ResponseInner>,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response").finish()
    }
}

impl PartialEq for Response {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Response {
    /// The response status code, once the head has been parsed.
    pub fn status(&self) -> Result<u16, Error> {
        let st = self.inner.lock();
        if st.parse >= ParseState::HeadersComplete {
            Ok(st.status_code)
        } else {
            Err(Error::NotFound)
        }
    }

    /// The advertised `Content-Length`. `NotFound` when the server did not
    /// send one (chunked and read-to-EOF responses).
    pub fn content_length(&self) -> Result<u64, Error> {
        let st = self.inner.lock();
        if st.parse < ParseState::HeadersComplete {
            return Err(Error::NotFound);
        }
        st.content_length.ok_or(Error::NotFound)
    }

    /// Post-hoc header lookup: a fresh parse runs over the filled header
    /// window and the named value is copied into `out`.
    pub fn read_header(&self, name: &str, out: &mut [u8])
        -> Result<usize, Error>
    {
        let st = self.inner.lock();
        if st.parse < ParseState::HeadersComplete {
            return Err(Error::NotFound);
        }
        let head = &st.headers.filled()[..st.head_len];
        match head_parser::find_header(head, name, out)? {
            Some(len) => Ok(len),
            None => Err(Error::NotFound),
        }
    }

    /// Borrow the body received so far (synchronous mode). The window holds
    /// de-framed payload only.
    pub fn with_body<R, F>(&self, f: F) -> Result<R, Error>
        where F: FnOnce(&[u8]) -> R
    {
        let st = self.inner.lock();
        if st.parse < ParseState::HeadersComplete {
            return Err(Error::NotFound);
        }
        match st.body {
            Some(ref win) => Ok(f(win.filled())),
            None => Ok(f(b"")),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.inner.lock().parse == ParseState::BodyComplete
    }

    /// Last network status seen while receiving this response, for
    /// diagnostics; independent of the engine status the exchange returned.
    pub fn network_status(&self) -> Option<Error> {
        self.inner.lock().net_status
    }

    /// Request cooperative cancellation of the paired exchange.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Streams the response body to the application from inside its
/// `read_ready` handler. Each `read` drains the hand-off bytes that arrived
/// with the headers, then receives directly into `buf` until it is full or
/// the message completes.
pub struct ResponseBodyReader<'a> {
    pub(crate) inner: &'a Arc<ResponseInner>,
    pub(crate) transport: &'a dyn Transport,
    pub(crate) progressed: bool,
    pub(crate) last_error: Option<Error>,
}

impl<'a> ResponseBodyReader<'a> {
    /// Read de-framed body bytes into `buf`. `Ok(0)` once the message is
    /// complete. May be called repeatedly.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        self.progressed = true;
        let result = engine::read_response_body(
            self.inner, self.transport, buf);
        if let Err(e) = result {
            self.last_error = Some(e);
        }
        result
    }

    pub fn status(&self) -> Result<u16, Error> {
        self.response().status()
    }

    pub fn content_length(&self) -> Result<u64, Error> {
        self.response().content_length()
    }

    pub fn response(&self) -> Response {
        Response { inner: self.inner.clone() }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }
}
