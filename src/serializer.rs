//! Request serializer: formats the request line, headers and the
//! auto-generated tail into bounded windows.

use std::io::Write;

use crate::method::Method;
use crate::window::Window;

quick_error! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum HeaderError {
        ReservedHeader {
            description("header is auto-generated and cannot be set")
        }
        InvalidHeaderName {
            description("header name contains invalid characters")
        }
        InvalidHeaderValue {
            description("header value contains invalid characters")
        }
        NoSpace {
            description("request window has no room for the header")
        }
    }
}

/// Headers the engine emits itself; user attempts to set them are rejected.
const RESERVED: &'static [&'static str] = &[
    "Content-Length",
    "Connection",
    "Host",
    "User-Agent",
];

/// State of the request message being serialized.
///
/// Note: while we pass the window to each method, we expect that the same
/// window is passed each time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    /// Nothing has been written.
    RequestStart,
    /// Request line is already in the window.
    Headers,
    /// The auto-generated tail has been emitted; the message is sealed.
    Done,
}

fn invalid_token(value: &[u8]) -> bool {
    value.iter().any(|&x| x == b'\r' || x == b'\n')
}

impl MessageState {
    /// Write the request line.
    ///
    /// # Panics
    ///
    /// When the request line is already written. It's expected that the
    /// calling state machine never invokes this twice.
    pub fn request_line<B>(&mut self, win: &mut Window<B>,
        method: &Method, path: &str)
        -> Result<(), HeaderError>
        where B: AsRef<[u8]> + AsMut<[u8]>
    {
        match *self {
            MessageState::RequestStart => {
                let path = if path.is_empty() { "/" } else { path };
                let need = method.as_str().len() + 1 + path.len() +
                    " HTTP/1.1\r\n".len();
                if need > win.spare_len() {
                    return Err(HeaderError::NoSpace);
                }
                write!(win, "{} {} HTTP/1.1\r\n", method, path)
                    .expect("window space was just checked");
                *self = MessageState::Headers;
                Ok(())
            }
            ref state => {
                panic!("Called request_line() on request in state {:?}",
                       state)
            }
        }
    }

    /// Append a header, keeping two bytes of the window reserved for the
    /// terminal blank line.
    ///
    /// `Content-Length`, `Connection`, `Host` and `User-Agent` are emitted
    /// by the engine itself and are rejected here.
    ///
    /// # Panics
    ///
    /// Panics when called before the request line or after the message is
    /// sealed.
    pub fn add_header<B>(&mut self, win: &mut Window<B>,
        name: &str, value: &[u8])
        -> Result<(), HeaderError>
        where B: AsRef<[u8]> + AsMut<[u8]>
    {
        if RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name)) {
            return Err(HeaderError::ReservedHeader);
        }
        self.add_raw_header(win, name, value)
    }

    /// Same as `add_header` without the reserved-name check; used for the
    /// default headers the engine writes at initialization.
    pub(crate) fn add_raw_header<B>(&mut self, win: &mut Window<B>,
        name: &str, value: &[u8])
        -> Result<(), HeaderError>
        where B: AsRef<[u8]> + AsMut<[u8]>
    {
        match *self {
            MessageState::Headers => {
                if name.is_empty() || invalid_token(name.as_bytes()) {
                    return Err(HeaderError::InvalidHeaderName);
                }
                if invalid_token(value) {
                    return Err(HeaderError::InvalidHeaderValue);
                }
                let need = name.len() + 2 + value.len() + 2;
                if need + 2 > win.spare_len() {
                    return Err(HeaderError::NoSpace);
                }
                win.put(name.as_bytes()).unwrap();
                win.put(b": ").unwrap();
                win.put(value).unwrap();
                win.put(b"\r\n").unwrap();
                Ok(())
            }
            ref state => {
                panic!("Called add_header() on a message in state {:?}",
                       state)
            }
        }
    }

    /// Write the auto-generated tail into `tail`: `Content-Length` when the
    /// request has a body, the `Connection` mode, and the blank line that
    /// closes the header block.
    ///
    /// # Panics
    ///
    /// Panics when the message is in the wrong state or the tail window is
    /// too small (it is engine-owned and statically sized for the job).
    pub fn done_headers<B>(&mut self, tail: &mut Window<B>,
        body_len: usize, persistent: bool)
        where B: AsRef<[u8]> + AsMut<[u8]>
    {
        match *self {
            MessageState::Headers => {
                if body_len > 0 {
                    write!(tail, "Content-Length: {}\r\n", body_len)
                        .expect("tail window fits the auto headers");
                }
                let mode = if persistent { "keep-alive" } else { "close" };
                write!(tail, "Connection: {}\r\n\r\n", mode)
                    .expect("tail window fits the auto headers");
                *self = MessageState::Done;
            }
            ref state => {
                panic!("Called done_headers() on a message in state {:?}",
                       state)
            }
        }
    }

    /// Returns true if at least the request line has been written.
    pub fn is_started(&self) -> bool {
        !matches!(*self, MessageState::RequestStart)
    }

    /// Returns true once the tail has been emitted.
    pub fn is_complete(&self) -> bool {
        matches!(*self, MessageState::Done)
    }
}
