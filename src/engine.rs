//! Message Engine: formats and transmits the request, then drives the
//! response parse into the caller's windows, with a terminal flush of
//! whatever the server sent past the message end.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::body_parser::{BodyKind, BodyProgress};
use crate::error::Error;
use crate::head_parser;
use crate::netdriver;
use crate::request::{Request, RequestBodyWriter, RequestInner};
use crate::response::{ParseState, ResponseBodyReader, ResponseInner,
                      ResponseState, CARRY_CAPACITY};
use crate::transport::Transport;
use crate::window::Window;
use crate::FLUSH_WINDOW_SIZE;

/// Fits the longest auto-generated tail: a twenty-digit Content-Length
/// line, the Connection line and the blank line.
const TAIL_CAPACITY: usize = 80;

pub(crate) struct SendFailure {
    pub error: Error,
    /// Bytes already hit the wire, so the connection cannot be reused.
    pub wire_dirty: bool,
}

fn fail(error: Error, wire_dirty: bool) -> SendFailure {
    SendFailure { error: error, wire_dirty: wire_dirty }
}

/// The send task body: async hooks, then the header block, the auto tail
/// and the body, with cancellation checkpoints between the phases.
pub(crate) fn send_request(transport: &dyn Transport,
    req: &Arc<RequestInner>)
    -> Result<(), SendFailure>
{
    if req.is_cancelled() {
        return Err(fail(Error::AsyncCancelled, false));
    }
    if let Some(ref handlers) = req.handlers {
        handlers.append_headers(&Request { inner: req.clone() });
        if req.is_cancelled() {
            return Err(fail(Error::AsyncCancelled, false));
        }
        let mut writer = RequestBodyWriter { inner: &**req };
        handlers.write_body(&mut writer);
        if req.is_cancelled() {
            return Err(fail(Error::AsyncCancelled, false));
        }
    }

    let mut st = req.lock();
    debug_assert!(st.message.is_started());
    let body_len = st.body.as_ref().map_or(0, |b| b.len());
    let mut tail_buf = [0u8; TAIL_CAPACITY];
    let mut tail = Window::over(&mut tail_buf[..]);
    st.message.done_headers(&mut tail, body_len, !req.non_persistent);

    netdriver::send_all(transport, st.headers.filled())
        .map_err(|e| fail(e, true))?;
    netdriver::send_all(transport, tail.filled())
        .map_err(|e| fail(e, true))?;
    if req.is_cancelled() {
        return Err(fail(Error::AsyncCancelled, true));
    }
    if let Some(ref body) = st.body {
        if !body.is_empty() {
            netdriver::send_all(transport, body)
                .map_err(|e| fail(e, true))?;
        }
    }
    Ok(())
}

/// Drive the parse to `HeadersComplete` on the header window, then to
/// `BodyComplete` on the body storage of the selected mode.
pub(crate) fn receive_response(transport: &dyn Transport,
    resp: &Arc<ResponseInner>)
    -> Result<(), Error>
{
    receive_headers(transport, resp)?;
    if resp.is_async() {
        receive_body_async(transport, resp)
    } else {
        receive_body_sync(transport, resp)
    }
}

fn receive_headers(transport: &dyn Transport, resp: &ResponseInner)
    -> Result<(), Error>
{
    let mut st = resp.lock();
    loop {
        if st.headers.spare_len() == 0 {
            // the head must be contiguous; no way to make progress
            debug!("header window full before the end of the head");
            return Err(Error::InsufficientMemory);
        }
        let n = match netdriver::recv_some(transport, st.headers.spare()) {
            Ok(n) => n,
            Err(e) => {
                st.net_status = Some(e);
                return Err(e);
            }
        };
        st.headers.advance(n);
        if st.parse < ParseState::InHeaders {
            st.parse = ParseState::InHeaders;
        }
        match head_parser::parse_head(st.headers.filled(), resp.is_head)? {
            None => continue,
            Some(head) => {
                st.status_code = head.code;
                st.content_length = head.content_length;
                st.body_kind = Some(head.body_kind);
                st.close = head.close;
                st.head_len = head.head_len;
                st.parse = ParseState::HeadersComplete;
                st.body_in_head = head.head_len..st.headers.len();
                let progress = BodyProgress::new(head.body_kind);
                if progress.is_done() {
                    // the message ended with the head
                    if !st.body_in_head.is_empty() {
                        debug!("{} stray bytes after a bodyless response",
                               st.body_in_head.len());
                    }
                    st.body_in_head = 0..0;
                    st.parse = ParseState::BodyComplete;
                }
                st.progress = Some(progress);
                return Ok(());
            }
        }
    }
}

/// Fill `win` with de-framed payload: first the carry-over framing, then
/// the hand-off bytes that arrived with the head, then the wire. In
/// `per_call` mode (async reads, flush) the window is drained each call and
/// partial framing is carried to the next one.
fn fill_body<B>(transport: &dyn Transport, st: &mut ResponseState,
    win: &mut Window<B>, progress: &mut BodyProgress, per_call: bool)
    -> Result<usize, Error>
    where B: AsRef<[u8]> + AsMut<[u8]>
{
    if per_call && st.carry_len > 0 {
        let take = st.carry_len.min(win.spare_len());
        win.put(&st.carry[..take]).expect("spare was just checked");
        st.carry.copy_within(take..st.carry_len, 0);
        st.carry_len -= take;
        progress.advance(win, take).map_err(|_| Error::ParsingError)?;
    }
    while !st.body_in_head.is_empty() && win.spare_len() > 0 {
        let range = st.body_in_head.clone();
        let take = range.len().min(win.spare_len());
        win.put(&st.headers.filled()[range.start..range.start + take])
            .expect("spare was just checked");
        st.body_in_head = range.start + take..range.end;
        progress.advance(win, take).map_err(|_| Error::ParsingError)?;
    }
    loop {
        if progress.is_done() || win.spare_len() == 0 {
            break;
        }
        match netdriver::recv_some(transport, win.spare()) {
            Ok(n) => {
                win.advance(n);
                progress.advance(win, n).map_err(|_| Error::ParsingError)?;
            }
            Err(e) => {
                st.net_status = Some(e);
                if matches!(*progress, BodyProgress::Eof { .. }) {
                    // end of stream delimits a length-less body
                    progress.mark_closed();
                    break;
                }
                return Err(e);
            }
        }
    }
    let payload = progress.payload_len(win);
    if payload > 0 && st.parse < ParseState::InBody {
        st.parse = ParseState::InBody;
    }
    if progress.is_done() {
        win.truncate(payload);
        st.parse = ParseState::BodyComplete;
    } else if per_call {
        let raw = win.len() - payload;
        if raw > CARRY_CAPACITY {
            debug!("unterminated chunk framing of {} bytes", raw);
            return Err(Error::ParsingError);
        }
        st.carry[..raw].copy_from_slice(&win.filled()[payload..]);
        st.carry_len = raw;
        win.truncate(payload);
    }
    if per_call {
        progress.consume(payload);
    }
    Ok(payload)
}

fn receive_body_sync(transport: &dyn Transport, resp: &ResponseInner)
    -> Result<(), Error>
{
    let mut st = resp.lock();
    if st.parse >= ParseState::BodyComplete {
        return Ok(());
    }
    let mut progress = match st.progress.take() {
        Some(p) => p,
        None => return Ok(()),
    };
    let mut win = match st.body.take() {
        Some(w) => w,
        None => {
            // no body storage was registered; the flush step drains the wire
            st.progress = Some(progress);
            return Ok(());
        }
    };
    if let Some(BodyKind::Fixed(n)) = st.body_kind {
        if n > win.capacity() as u64 {
            st.body = Some(win);
            st.progress = Some(progress);
            return Err(Error::MessageTooLarge);
        }
    }
    let filled = fill_body(transport, &mut st, &mut win, &mut progress,
                           false);
    // keep only de-framed payload in the caller's window
    let payload = progress.payload_len(&win);
    if win.len() > payload {
        win.truncate(payload);
    }
    progress.consume(payload);
    st.body = Some(win);
    let outcome = match filled {
        Err(e) => Err(e),
        // window full but the message keeps going
        Ok(_) if !progress.is_done() => Err(Error::MessageTooLarge),
        Ok(_) => Ok(()),
    };
    st.progress = Some(progress);
    outcome
}

fn receive_body_async(transport: &dyn Transport, resp: &Arc<ResponseInner>)
    -> Result<(), Error>
{
    let handlers = resp.handlers.clone()
        .expect("async response always has handlers");
    loop {
        if resp.lock().parse >= ParseState::BodyComplete {
            return Ok(());
        }
        if resp.cancelled.load(Ordering::SeqCst) {
            return Err(Error::AsyncCancelled);
        }
        let (progressed, last_error) = {
            let mut reader = ResponseBodyReader {
                inner: resp,
                transport: transport,
                progressed: false,
                last_error: None,
            };
            handlers.read_ready(&mut reader);
            (reader.progressed, reader.last_error)
        };
        if resp.lock().parse >= ParseState::BodyComplete {
            return Ok(());
        }
        if resp.cancelled.load(Ordering::SeqCst) {
            return Err(Error::AsyncCancelled);
        }
        if let Some(e) = last_error {
            return Err(e);
        }
        if !progressed {
            warn!("read_ready returned without reading; \
                   stopping the body loop");
            return Err(Error::InternalError);
        }
    }
}

/// One async read: drain hand-off and carry bytes, then receive into the
/// application's buffer until it is full or the message completes.
pub(crate) fn read_response_body(resp: &Arc<ResponseInner>,
    transport: &dyn Transport, buf: &mut [u8])
    -> Result<usize, Error>
{
    let mut st = resp.lock();
    if st.parse >= ParseState::BodyComplete {
        return Ok(0);
    }
    if st.parse < ParseState::HeadersComplete {
        return Err(Error::NotFound);
    }
    let mut progress = match st.progress.take() {
        Some(p) => p,
        None => return Err(Error::InternalError),
    };
    let mut win = Window::over(buf);
    let result = fill_body(transport, &mut st, &mut win, &mut progress,
                           true);
    st.progress = Some(progress);
    result
}

/// Terminal flush: read and discard whatever the server sent past what the
/// caller consumed, so the next response does not start mid-stream.
/// Timeouts mean "nothing more"; other failures are reported and end the
/// drain.
pub(crate) fn flush(transport: &dyn Transport, resp: &ResponseInner) {
    let mut st = resp.lock();
    let mut scratch = [0u8; FLUSH_WINDOW_SIZE];
    match st.progress.take() {
        Some(mut progress) => {
            while !progress.is_done() {
                let mut win = Window::over(&mut scratch[..]);
                match fill_body(transport, &mut st, &mut win, &mut progress,
                                true) {
                    Ok(n) => trace!("flush: discarded {} body bytes", n),
                    Err(Error::TimeoutError) => {
                        trace!("flush: nothing more to read");
                        break;
                    }
                    Err(e) => {
                        debug!("flush stopped: {}", e);
                        break;
                    }
                }
            }
            st.progress = Some(progress);
        }
        None => {
            // nothing was parsed (cancelled before dispatch); drain blindly
            loop {
                match netdriver::recv_some(transport, &mut scratch[..]) {
                    Ok(n) => trace!("flush: discarded {} bytes", n),
                    Err(_) => break,
                }
            }
        }
    }
}
