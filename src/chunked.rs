use httparse::{InvalidChunkSize, parse_chunk_size};

use crate::window::Window;

/// Incremental chunked-transfer decoder over a window.
///
/// The window accumulates raw received bytes; framing (size lines, the CRLF
/// after each chunk's data, the trailer section) is removed in place so that
/// `[0, buffered)` is always de-framed payload. Bytes past `buffered` are
/// raw framing still waiting for more input.
#[derive(Debug, Clone)]
pub struct State {
    buffered: usize,
    pending: usize,
    data_crlf: bool,
    last_chunk: bool,
    done: bool,
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|pair| pair == b"\r\n")
}

impl State {
    pub fn new() -> State {
        State {
            buffered: 0,
            pending: 0,
            data_crlf: false,
            last_chunk: false,
            done: false,
        }
    }

    pub fn parse<B>(&mut self, win: &mut Window<B>)
        -> Result<(), InvalidChunkSize>
        where B: AsRef<[u8]> + AsMut<[u8]>
    {
        while self.buffered < win.len() && !self.done {
            if self.pending > 0 {
                let avail = win.len() - self.buffered;
                let take = self.pending.min(avail);
                self.buffered += take;
                self.pending -= take;
                if self.pending == 0 {
                    self.data_crlf = true;
                }
            } else if self.data_crlf {
                if win.len() - self.buffered < 2 {
                    return Ok(());
                }
                if &win.filled()[self.buffered..self.buffered + 2] != b"\r\n" {
                    return Err(InvalidChunkSize);
                }
                win.remove_range(self.buffered..self.buffered + 2);
                self.data_crlf = false;
            } else if self.last_chunk {
                // Trailer section: drop whole lines until the empty one.
                match find_crlf(&win.filled()[self.buffered..]) {
                    None => return Ok(()),
                    Some(pos) => {
                        win.remove_range(
                            self.buffered..self.buffered + pos + 2);
                        if pos == 0 {
                            self.done = true;
                        }
                    }
                }
            } else {
                use httparse::Status::*;
                match parse_chunk_size(&win.filled()[self.buffered..])? {
                    Complete((bytes, 0)) => {
                        win.remove_range(
                            self.buffered..self.buffered + bytes);
                        self.last_chunk = true;
                    }
                    Complete((bytes, chunk_size)) => {
                        if chunk_size > usize::max_value() as u64 {
                            return Err(InvalidChunkSize);
                        }
                        win.remove_range(
                            self.buffered..self.buffered + bytes);
                        self.pending = chunk_size as usize;
                    }
                    Partial => {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    /// De-framed payload bytes currently at the front of the window.
    pub fn buffered(&self) -> usize {
        self.buffered
    }
    pub fn is_done(&self) -> bool {
        self.done
    }
    /// Account for payload handed off to the application.
    pub fn consume(&mut self, n: usize) {
        assert!(self.buffered >= n);
        self.buffered -= n;
    }
}

#[cfg(test)]
mod test {
    use crate::window::Window;

    use super::State;

    fn feed(state: &mut State, win: &mut Window, bytes: &[u8]) {
        win.put(bytes).unwrap();
        state.parse(win).unwrap();
    }

    #[test]
    fn multi_chunk_message() {
        let mut win = Window::from_vec(vec![0; 64]);
        let mut state = State::new();
        feed(&mut state, &mut win,
             b"7\r\nMozilla\r\n9\r\nDeveloper\r\n7\r\nNetwork\r\n0\r\n\r\n");
        assert!(state.is_done());
        assert_eq!(state.buffered(), 23);
        assert_eq!(&win.filled()[..state.buffered()],
                   &b"MozillaDeveloperNetwork"[..]);
    }

    #[test]
    fn split_across_feeds() {
        let mut win = Window::from_vec(vec![0; 64]);
        let mut state = State::new();
        let message: &[u8] = b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        for piece in message.chunks(3) {
            feed(&mut state, &mut win, piece);
        }
        assert!(state.is_done());
        assert_eq!(&win.filled()[..state.buffered()], &b"hello world"[..]);
    }

    #[test]
    fn trailer_headers_are_dropped() {
        let mut win = Window::from_vec(vec![0; 64]);
        let mut state = State::new();
        feed(&mut state, &mut win,
             b"3\r\nabc\r\n0\r\nExpires: never\r\n\r\n");
        assert!(state.is_done());
        assert_eq!(&win.filled()[..state.buffered()], &b"abc"[..]);
    }

    #[test]
    fn chunk_extension_is_ignored() {
        let mut win = Window::from_vec(vec![0; 32]);
        let mut state = State::new();
        feed(&mut state, &mut win, b"3;ext=\"x\"\r\nabc\r\n0\r\n\r\n");
        assert!(state.is_done());
        assert_eq!(&win.filled()[..state.buffered()], &b"abc"[..]);
    }

    #[test]
    fn bad_data_delimiter() {
        let mut win = Window::from_vec(vec![0; 32]);
        let mut state = State::new();
        win.put(b"3\r\nabcXX0\r\n\r\n").unwrap();
        assert!(state.parse(&mut win).is_err());
    }

    #[test]
    fn consume_rewinds_accounting() {
        let mut win = Window::from_vec(vec![0; 32]);
        let mut state = State::new();
        feed(&mut state, &mut win, b"5\r\nhello\r\n");
        assert_eq!(state.buffered(), 5);
        state.consume(5);
        assert_eq!(state.buffered(), 0);
        assert!(!state.is_done());
    }
}
