use std::str::from_utf8;

use httparse;

use crate::body_parser::BodyKind;
use crate::error::Error;
use crate::headers;

/// Number of headers to allocate on the stack
const MIN_HEADERS: usize = 16;
/// A hard limit on the number of headers
const MAX_HEADERS: usize = 128;

/// Everything the engine needs out of a parsed response head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Head {
    pub code: u16,
    /// The advertised `Content-Length`, recorded even for messages whose
    /// body kind is forced empty (HEAD, 1xx, 204, 304).
    pub content_length: Option<u64>,
    pub body_kind: BodyKind,
    /// Server asked not to reuse the connection.
    pub close: bool,
    /// Bytes of the head including the terminal blank line.
    pub head_len: usize,
}

/// Implements the body length algorithm for responses:
/// http://httpwg.github.io/specs/rfc7230.html#message.body.length
///
/// 1. For HEAD, 1xx, 204, 304 -- no body
/// 2. If last transfer encoding is chunked -> Chunked
/// 3. If Content-Length -> Fixed
/// 4. Else Eof
fn scan_headers(is_head: bool, code: u16, hdrs: &[httparse::Header])
    -> Result<(Option<u64>, BodyKind, bool), Error>
{
    let mut content_length = None;
    let mut chunked = false;
    let mut close = false;
    for header in hdrs.iter() {
        if header.name.eq_ignore_ascii_case("Transfer-Encoding") {
            if let Some(enc) = header.value.split(|&x| x == b',').last() {
                if headers::is_chunked(enc) {
                    if content_length.is_some() {
                        // override but don't allow keep-alive
                        close = true;
                    }
                    chunked = true;
                }
            }
        } else if header.name.eq_ignore_ascii_case("Content-Length") {
            if content_length.is_some() {
                debug!("duplicate Content-Length in response");
                return Err(Error::ParsingError);
            }
            let len = from_utf8(header.value).ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
                .ok_or(Error::ParsingError)?;
            content_length = Some(len);
            if chunked {
                // transfer-encoding has preference and don't allow keep-alive
                close = true;
            }
        } else if header.name.eq_ignore_ascii_case("Connection") {
            if header.value.split(|&x| x == b',').any(headers::is_close) {
                close = true;
            }
        }
    }
    let body = if is_head || (code > 100 && code < 200) || code == 204 ||
        code == 304
    {
        BodyKind::Fixed(0)
    } else if chunked {
        BodyKind::Chunked
    } else if let Some(len) = content_length {
        BodyKind::Fixed(len)
    } else {
        BodyKind::Eof
    };
    Ok((content_length, body, close))
}

fn with_parsed<T, F>(buf: &[u8], f: F) -> Result<Option<T>, Error>
    where F: FnOnce(&httparse::Response, usize) -> Result<T, Error>
{
    let mut vec;
    let mut headers = [httparse::EMPTY_HEADER; MIN_HEADERS];
    let mut raw = httparse::Response::new(&mut headers);
    let mut result = raw.parse(buf);
    if matches!(result, Err(httparse::Error::TooManyHeaders)) {
        vec = vec![httparse::EMPTY_HEADER; MAX_HEADERS];
        raw = httparse::Response::new(&mut vec);
        result = raw.parse(buf);
    }
    match result {
        Ok(httparse::Status::Complete(bytes)) => f(&raw, bytes).map(Some),
        Ok(httparse::Status::Partial) => Ok(None),
        Err(e) => {
            debug!("bad response head: {}", e);
            Err(Error::ParsingError)
        }
    }
}

/// Parse the accumulated header window. `Ok(None)` means the head is still
/// incomplete and more bytes must be received.
pub fn parse_head(buf: &[u8], is_head: bool) -> Result<Option<Head>, Error> {
    with_parsed(buf, |raw, bytes| {
        let version = raw.version.unwrap();
        let code = raw.code.unwrap();
        let (content_length, body_kind, close) =
            scan_headers(is_head, code, &raw.headers[..])?;
        trace!("response head: HTTP/1.{} {}, {} bytes",
               version, code, bytes);
        Ok(Head {
            code: code,
            content_length: content_length,
            body_kind: body_kind,
            // For HTTP/1.0 we could honor Connection: Keep-Alive, but it is
            // rare enough on the server side to ignore nowadays
            close: close || version == 0,
            head_len: bytes,
        })
    })
}

/// Search pass: run a fresh parse over the already-filled header window and
/// copy the value of the named header into `out`, stopping at the first
/// match. `Ok(Some(len))` is the copied length; `Ok(None)` means the header
/// was not present.
pub fn find_header(buf: &[u8], name: &str, out: &mut [u8])
    -> Result<Option<usize>, Error>
{
    let found = with_parsed(buf, |raw, _bytes| {
        for header in raw.headers.iter() {
            if header.name.eq_ignore_ascii_case(name) {
                if header.value.len() > out.len() {
                    return Err(Error::InsufficientMemory);
                }
                out[..header.value.len()].copy_from_slice(header.value);
                return Ok(Some(header.value.len()));
            }
        }
        Ok(None)
    })?;
    Ok(found.and_then(|v| v))
}
