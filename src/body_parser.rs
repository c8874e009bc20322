use httparse::InvalidChunkSize;

use crate::chunked;
use crate::window::Window;

/// How the response body is delimited, per the RFC 7230 length rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Fixed(u64),
    Chunked,
    Eof,
}

/// Tracks body consumption inside a window that accumulates raw received
/// bytes. Payload always sits de-framed at the front of the window.
#[derive(Debug, Clone)]
pub enum BodyProgress {
    Fixed { remaining: u64 },
    Eof { closed: bool },
    Chunked(chunked::State),
}

impl BodyProgress {
    pub fn new(kind: BodyKind) -> BodyProgress {
        match kind {
            BodyKind::Fixed(n) => BodyProgress::Fixed { remaining: n },
            BodyKind::Chunked => BodyProgress::Chunked(chunked::State::new()),
            BodyKind::Eof => BodyProgress::Eof { closed: false },
        }
    }

    /// Account for `raw` bytes just appended to the window. Chunk framing is
    /// stripped in place; bytes past the end of a fixed-size message are
    /// dropped so they never read as payload.
    pub fn advance<B>(&mut self, win: &mut Window<B>, raw: usize)
        -> Result<(), InvalidChunkSize>
        where B: AsRef<[u8]> + AsMut<[u8]>
    {
        use self::BodyProgress::*;
        match *self {
            Fixed { ref mut remaining } => {
                let take = (raw as u64).min(*remaining);
                let excess = raw - take as usize;
                if excess > 0 {
                    let len = win.len();
                    win.truncate(len - excess);
                }
                *remaining -= take;
            }
            Eof { .. } => {}
            Chunked(ref mut state) => state.parse(win)?,
        }
        Ok(())
    }

    /// De-framed payload bytes currently held by the window.
    pub fn payload_len<B>(&self, win: &Window<B>) -> usize
        where B: AsRef<[u8]> + AsMut<[u8]>
    {
        use self::BodyProgress::*;
        match *self {
            Fixed { .. } | Eof { .. } => win.len(),
            Chunked(ref state) => state.buffered(),
        }
    }

    pub fn is_done(&self) -> bool {
        use self::BodyProgress::*;
        match *self {
            Fixed { remaining } => remaining == 0,
            Eof { closed } => closed,
            Chunked(ref state) => state.is_done(),
        }
    }

    /// For read-until-EOF bodies, end of stream is the end of the message.
    pub fn mark_closed(&mut self) {
        if let BodyProgress::Eof { ref mut closed } = *self {
            *closed = true;
        }
    }

    /// Account for payload handed off to the application (per-call windows).
    pub fn consume(&mut self, n: usize) {
        if let BodyProgress::Chunked(ref mut state) = *self {
            state.consume(n);
        }
    }
}

#[cfg(test)]
mod test {
    use crate::window::Window;

    use super::{BodyKind, BodyProgress};

    #[test]
    fn fixed_body_completes_exactly() {
        let mut win = Window::from_vec(vec![0; 16]);
        let mut progress = BodyProgress::new(BodyKind::Fixed(5));
        win.put(b"hel").unwrap();
        progress.advance(&mut win, 3).unwrap();
        assert!(!progress.is_done());
        win.put(b"lo").unwrap();
        progress.advance(&mut win, 2).unwrap();
        assert!(progress.is_done());
        assert_eq!(progress.payload_len(&win), 5);
        assert_eq!(win.filled(), b"hello");
    }

    #[test]
    fn fixed_body_drops_trailing_garbage() {
        let mut win = Window::from_vec(vec![0; 16]);
        let mut progress = BodyProgress::new(BodyKind::Fixed(2));
        win.put(b"okJUNK").unwrap();
        progress.advance(&mut win, 6).unwrap();
        assert!(progress.is_done());
        assert_eq!(win.filled(), b"ok");
    }

    #[test]
    fn eof_body_ends_on_close() {
        let mut win = Window::from_vec(vec![0; 16]);
        let mut progress = BodyProgress::new(BodyKind::Eof);
        win.put(b"partial").unwrap();
        progress.advance(&mut win, 7).unwrap();
        assert!(!progress.is_done());
        progress.mark_closed();
        assert!(progress.is_done());
        assert_eq!(progress.payload_len(&win), 7);
    }

    #[test]
    fn chunked_body_strips_framing() {
        let mut win = Window::from_vec(vec![0; 32]);
        let mut progress = BodyProgress::new(BodyKind::Chunked);
        win.put(b"5\r\nhello\r\n0\r\n\r\n").unwrap();
        progress.advance(&mut win, 15).unwrap();
        assert!(progress.is_done());
        assert_eq!(progress.payload_len(&win), 5);
        assert_eq!(&win.filled()[..5], b"hello");
    }
}
