//! Content predicates evaluated against the leading bytes of a connection.
//!
//! Matchers are incremental: each one inspects the bytes read so far and
//! either decides or asks for more. The classifier keeps reading only while
//! the highest-priority undecided matcher needs it.

/// Maximum length of an HTTP/1 request line, terminator included.
pub const MAX_HTTP1_LINE: usize = 4096;

/// HTTP/2 client connection preface (RFC 9113, section 3.4).
pub const HTTP2_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// TLS record content type for handshake messages.
const TLS_HANDSHAKE: u8 = 0x16;

/// Outcome of evaluating a matcher against a partial prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The prefix belongs to this matcher's protocol.
    Match,
    /// The prefix can never belong to this matcher's protocol.
    NoMatch,
    /// Not enough bytes to decide.
    NeedMore,
}

/// A content predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// HTTP/1.x request line.
    Http1,
    /// HTTP/2 client preface.
    Http2,
    /// TLS handshake record (SSL 3.0 through TLS 1.2 record versions).
    Tls,
    /// Matches every connection, including one that sent nothing yet.
    Any,
}

impl Matcher {
    /// Evaluate this matcher against the bytes read so far.
    pub fn check(&self, prefix: &[u8]) -> Verdict {
        match self {
            Matcher::Http1 => check_http1(prefix),
            Matcher::Http2 => check_http2(prefix),
            Matcher::Tls => check_tls(prefix),
            Matcher::Any => Verdict::Match,
        }
    }
}

fn check_http1(prefix: &[u8]) -> Verdict {
    let window = &prefix[..prefix.len().min(MAX_HTTP1_LINE)];

    // The method is a token; anything else cannot start a request line.
    let method_end = window.iter().position(|&b| b == b' ');
    let method = &window[..method_end.unwrap_or(window.len())];
    if method_end == Some(0) || !method.iter().all(|&b| is_tchar(b)) {
        return Verdict::NoMatch;
    }

    match window.iter().position(|&b| b == b'\n') {
        Some(end) => {
            let line = &window[..end];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if is_http1_request_line(line) {
                Verdict::Match
            } else {
                Verdict::NoMatch
            }
        }
        None if prefix.len() >= MAX_HTTP1_LINE => Verdict::NoMatch,
        None => Verdict::NeedMore,
    }
}

/// `METHOD SP request-target SP HTTP/1.x`
fn is_http1_request_line(line: &[u8]) -> bool {
    let mut parts = line.splitn(3, |&b| b == b' ');
    let (Some(method), Some(_target), Some(proto)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    !method.is_empty() && http_major_version(proto) == Some(1)
}

fn http_major_version(proto: &[u8]) -> Option<u32> {
    let version = proto.strip_prefix(b"HTTP/")?;
    let dot = version.iter().position(|&b| b == b'.')?;
    let major = parse_decimal(&version[..dot])?;
    parse_decimal(&version[dot + 1..])?;
    Some(major)
}

fn parse_decimal(digits: &[u8]) -> Option<u32> {
    if digits.is_empty() || digits.len() > 7 || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// RFC 9110 token characters.
fn is_tchar(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

fn check_http2(prefix: &[u8]) -> Verdict {
    let n = prefix.len().min(HTTP2_PREFACE.len());
    if prefix[..n] != HTTP2_PREFACE[..n] {
        Verdict::NoMatch
    } else if n < HTTP2_PREFACE.len() {
        Verdict::NeedMore
    } else {
        Verdict::Match
    }
}

fn check_tls(prefix: &[u8]) -> Verdict {
    match prefix {
        [] => Verdict::NeedMore,
        [kind, ..] if *kind != TLS_HANDSHAKE => Verdict::NoMatch,
        [_, major, ..] if *major != 0x03 => Verdict::NoMatch,
        [_, _, minor, ..] if *minor <= 0x03 => Verdict::Match,
        [_, _, _, ..] => Verdict::NoMatch,
        _ => Verdict::NeedMore,
    }
}
