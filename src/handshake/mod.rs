//! Websocket handshake.
//!
//! The server reads a [`Request`], answers with a [`Response`]
//! if the request is a valid upgrade, or [`reject`] otherwise.

pub mod key;
pub mod request;
pub mod response;

pub use request::Request;
pub use response::{Response, reject};
pub use key::{new_sec_key, derive_accept_key};

/// 64
pub const MAX_ALLOW_HEADERS: usize = 64;

/// An unfinished request head larger than this is refused.
pub const MAX_REQUEST_LEN: usize = 8192;

/// 258EAFA5-E914-47DA-95CA-C5AB0DC85B11
pub const GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// GET
pub const HTTP_METHOD: &[u8] = b"GET";

/// HTTP/1.1
pub const HTTP_VERSION: &[u8] = b"HTTP/1.1";

/// CRLF
pub const HTTP_LINE_BREAK: &[u8] = b"\r\n";

/// A colon + one SP is prefered
pub const HTTP_HEADER_SP: &[u8] = b": ";

/// HTTP/1.1 101 Switching Protocols
pub const HTTP_STATUS_LINE: &[u8] = b"HTTP/1.1 101 Switching Protocols";

/// HTTP/1.1 404 Not Found
pub const HTTP_NOT_FOUND_LINE: &[u8] = b"HTTP/1.1 404 Not Found";

/// Body of the 404 reply.
pub const REJECT_BODY: &[u8] = b"only ws connections are accepted";

/// Value of the `Server` header.
pub const SERVER_NAME: &[u8] = concat!("wsprobe/", env!("CARGO_PKG_VERSION")).as_bytes();

/// Http header, take two references
#[allow(clippy::len_without_is_empty)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct HttpHeader<'h> {
    pub name: &'h [u8],
    pub value: &'h [u8],
}

impl<'h> HttpHeader<'h> {
    /// Constructor, take provided name and value.
    #[inline]
    pub const fn new(name: &'h [u8], value: &'h [u8]) -> Self { Self { name, value } }

    /// Total number of bytes(name + value + sp).
    #[inline]
    pub const fn len(&self) -> usize {
        self.name.len() + self.value.len() + HTTP_HEADER_SP.len() + HTTP_LINE_BREAK.len()
    }
}

impl<'h> std::fmt::Display for HttpHeader<'h> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            String::from_utf8_lossy(self.name),
            String::from_utf8_lossy(self.value)
        )
    }
}

macro_rules! header {
    (   $(
            ($hdr_name: ident => $name: expr);
        )+
    ) => {
        $(
            pub const $hdr_name: &[u8] = $name;
        )+
    };
}

macro_rules! handshake_check {
    ($value: expr, $e: expr) => {
        match $value {
            Some(v) if !v.is_empty() => v,
            _ => return Err($e),
        }
    };
    ($value: expr, $expect: expr, $e: expr) => {
        // header value here is case insensitive
        // ref: https://datatracker.ietf.org/doc/html/rfc6455#section-4.1
        match $value {
            Some(v) if $crate::handshake::trim(v).eq_ignore_ascii_case($expect) => v,
            _ => return Err($e),
        }
    };
}

pub(self) use handshake_check;

#[inline]
fn write_header(buf: &mut Vec<u8>, hdr: &HttpHeader) {
    buf.reserve(hdr.len());
    buf.extend_from_slice(hdr.name);
    buf.extend_from_slice(HTTP_HEADER_SP);
    buf.extend_from_slice(hdr.value);
    buf.extend_from_slice(HTTP_LINE_BREAK);
}

/// First header with this name, case insensitive.
#[inline]
fn find_header<'b>(all: &[httparse::Header<'b>], name: &[u8]) -> Option<&'b [u8]> {
    all.iter()
        .find(|h| h.name.as_bytes().eq_ignore_ascii_case(name))
        .map(|h| h.value)
}

/// Strip leading and trailing ascii whitespace.
#[inline]
fn trim(mut v: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = v {
        if !first.is_ascii_whitespace() {
            break;
        }
        v = rest;
    }
    while let [rest @ .., last] = v {
        if !last.is_ascii_whitespace() {
            break;
        }
        v = rest;
    }
    v
}

/// Whether a comma separated header value lists `token`, case insensitive.
#[inline]
fn has_token(value: &[u8], token: &[u8]) -> bool {
    value
        .split(|b| *b == b',')
        .any(|t| trim(t).eq_ignore_ascii_case(token))
}

/// Static http headers
#[allow(unused)]
pub mod static_headers {
    // header name
    header! {
        (HEADER_HOST_NAME => b"Host");

        (HEADER_UPGRADE_NAME => b"Upgrade");

        (HEADER_CONNECTION_NAME => b"Connection");

        (HEADER_SEC_WEBSOCKET_KEY_NAME => b"Sec-WebSocket-Key");

        (HEADER_SEC_WEBSOCKET_ACCEPT_NAME => b"Sec-WebSocket-Accept");

        (HEADER_SEC_WEBSOCKET_VERSION_NAME => b"Sec-WebSocket-Version");

        (HEADER_CONTENT_TYPE_NAME => b"Content-Type");

        (HEADER_CONTENT_LENGTH_NAME => b"Content-Length");

        (HEADER_DATE_NAME => b"Date");

        (HEADER_SERVER_NAME => b"Server");
    }

    // header value
    header! {
        (HEADER_UPGRADE_VALUE => b"websocket");

        (HEADER_CONNECTION_VALUE => b"Upgrade");

        (HEADER_CONNECTION_CLOSE_VALUE => b"close");

        (HEADER_SEC_WEBSOCKET_VERSION_VALUE => b"13");

        (HEADER_CONTENT_TYPE_VALUE => b"text/plain");
    }
}
