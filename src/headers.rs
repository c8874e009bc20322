
fn is_lws(ch: u8) -> bool {
    matches!(ch, b'\r' | b'\n' | b' ' | b'\t')
}

fn trim_lws(val: &[u8]) -> &[u8] {
    let lead = val.iter().take_while(|&&ch| is_lws(ch)).count();
    let trail = val.iter().rev().take_while(|&&ch| is_lws(ch)).count();
    if lead + trail >= val.len() {
        b""
    } else {
        &val[lead..val.len() - trail]
    }
}

// Header values are byte sequences; comparisons are case-insensitive and
// tolerate surrounding linear whitespace. `token` must be lowercase.
fn is_token(val: &[u8], token: &[u8]) -> bool {
    let trimmed = trim_lws(val);
    trimmed.len() == token.len() &&
        trimmed.iter().zip(token.iter())
            .all(|(&a, &b)| a.to_ascii_lowercase() == b)
}

pub fn is_close(val: &[u8]) -> bool {
    is_token(val, b"close")
}

pub fn is_chunked(val: &[u8]) -> bool {
    is_token(val, b"chunked")
}

#[cfg(test)]
mod test {
    use super::{is_chunked, is_close};

    #[test]
    fn test_chunked() {
        assert!(is_chunked(b"chunked"));
        assert!(is_chunked(b"Chunked"));
        assert!(is_chunked(b"chuNKED"));
        assert!(is_chunked(b"CHUNKED"));
        assert!(is_chunked(b"   CHUNKED"));
        assert!(is_chunked(b"   CHUNKED  "));
        assert!(is_chunked(b"chunked  "));
        assert!(!is_chunked(b"   CHUNKED 1 "));
        assert!(!is_chunked(b"chunke"));
    }

    #[test]
    fn test_close() {
        assert!(is_close(b"close"));
        assert!(is_close(b"Close"));
        assert!(is_close(b"clOSE"));
        assert!(is_close(b"CLOSE"));
        assert!(is_close(b" CLOSE"));
        assert!(is_close(b"   close   "));
        assert!(!is_close(b"Close  1 "));
        assert!(!is_close(b" xclose   "));
        assert!(!is_close(b""));
    }
}
