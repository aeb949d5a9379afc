//! Client upgrade request.
//!
//! From [RFC-6455 Section 4.1](https://datatracker.ietf.org/doc/html/rfc6455#section-4.1):
//!
//! Once a connection to the server has been established (including a
//! connection via a proxy or over a TLS-encrypted tunnel), the client
//! MUST send an opening handshake to the server.  The handshake consists
//! of an HTTP Upgrade request, along with a list of required and
//! optional header fields.
//!
//! Example:
//!
//! ```text
//! GET /path HTTP/1.1
//! host: www.example.com
//! upgrade: websocket
//! connection: upgrade
//! sec-websocket-key: dGhlIHNhbXBsZSBub25jZQ==
//! sec-websocket-version: 13
//! ```
//!

use super::HttpHeader;
use super::{write_header, find_header, has_token};
use super::handshake_check;
use super::{MAX_ALLOW_HEADERS, MAX_REQUEST_LEN};
use super::{HTTP_METHOD, HTTP_VERSION, HTTP_LINE_BREAK};
use super::static_headers::*;

use crate::error::HandshakeError;

/// Http request presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'b> {
    pub path: &'b [u8],
    pub host: &'b [u8],
    pub sec_key: &'b [u8],
}

impl<'b> Request<'b> {
    /// Constructor.
    #[inline]
    pub const fn new(path: &'b [u8], host: &'b [u8], sec_key: &'b [u8]) -> Self {
        Self {
            path,
            host,
            sec_key,
        }
    }

    /// Append to a provided buffer, return the number of written bytes.
    ///
    /// Necessary headers, including `host`, `upgrade`, `connection`,
    /// `sec-websocket-key` and `sec-websocket-version` are written
    /// in order. `host` is omitted if empty.
    pub fn encode(&self, buf: &mut Vec<u8>) -> usize {
        let start = buf.len();

        // GET {path} HTTP/1.1
        buf.extend_from_slice(HTTP_METHOD);
        buf.push(0x20);
        buf.extend_from_slice(self.path);
        buf.push(0x20);
        buf.extend_from_slice(HTTP_VERSION);
        buf.extend_from_slice(HTTP_LINE_BREAK);

        let headers = [
            HttpHeader::new(HEADER_HOST_NAME, self.host),
            HttpHeader::new(HEADER_UPGRADE_NAME, HEADER_UPGRADE_VALUE),
            HttpHeader::new(HEADER_CONNECTION_NAME, HEADER_CONNECTION_VALUE),
            HttpHeader::new(HEADER_SEC_WEBSOCKET_KEY_NAME, self.sec_key),
            HttpHeader::new(
                HEADER_SEC_WEBSOCKET_VERSION_NAME,
                HEADER_SEC_WEBSOCKET_VERSION_VALUE,
            ),
        ];

        for hdr in headers.iter().filter(|h| !h.value.is_empty()) {
            write_header(buf, hdr);
        }

        // finish with CRLF
        buf.extend_from_slice(HTTP_LINE_BREAK);

        buf.len() - start
    }

    /// Parse from a provided buffer, returns the request and
    /// the number of bytes parsed.
    ///
    /// The request must be `GET` over `HTTP/1.1`, carry `upgrade: websocket`,
    /// a `connection` header listing `upgrade`, a non-empty
    /// `sec-websocket-key` and `sec-websocket-version: 13`.
    /// Header names and the checked values are case insensitive.
    /// `host` is optional, other headers are ignored.
    ///
    /// If the buffer does not contain a complete http request,
    /// a [`HandshakeError::NotEnoughData`] error will be returned, or
    /// [`HandshakeError::TooLarge`] once the buffer reaches [`MAX_REQUEST_LEN`].
    pub fn decode(buf: &'b [u8]) -> Result<(Self, usize), HandshakeError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_ALLOW_HEADERS];
        let mut request = httparse::Request::new(&mut headers);

        // return value
        let decode_n = match request.parse(buf)? {
            httparse::Status::Complete(n) => n,
            httparse::Status::Partial if buf.len() >= MAX_REQUEST_LEN => {
                return Err(HandshakeError::TooLarge)
            }
            httparse::Status::Partial => return Err(HandshakeError::NotEnoughData),
        };

        // check method
        if request.method.map(str::as_bytes) != Some(HTTP_METHOD) {
            return Err(HandshakeError::HttpMethod);
        }

        // check version, should be HTTP/1.1
        // ref: https://docs.rs/httparse/latest/src/httparse/lib.rs.html#581-596
        if request.version != Some(1_u8) {
            return Err(HandshakeError::HttpVersion);
        }

        // headers are shrunk to number of inited headers
        let headers = &*request.headers;

        handshake_check!(
            find_header(headers, HEADER_UPGRADE_NAME),
            HEADER_UPGRADE_VALUE,
            HandshakeError::Upgrade
        );

        match find_header(headers, HEADER_CONNECTION_NAME) {
            Some(v) if has_token(v, b"upgrade") => {}
            _ => return Err(HandshakeError::Connection),
        }

        let sec_key = handshake_check!(
            find_header(headers, HEADER_SEC_WEBSOCKET_KEY_NAME),
            HandshakeError::SecWebSocketKey
        );

        handshake_check!(
            find_header(headers, HEADER_SEC_WEBSOCKET_VERSION_NAME),
            HEADER_SEC_WEBSOCKET_VERSION_VALUE,
            HandshakeError::SecWebSocketVersion
        );

        let request = Request {
            path: request.path.map(str::as_bytes).unwrap_or(b"/"),
            host: find_header(headers, HEADER_HOST_NAME).unwrap_or(b""),
            sec_key,
        };

        Ok((request, decode_n))
    }
}
