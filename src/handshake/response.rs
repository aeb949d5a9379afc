//! Server handshake.
//!
//! From [RFC-6455 Section 4.2](https://datatracker.ietf.org/doc/html/rfc6455#section-4.2):
//!
//! If the server chooses to accept the incoming connection, it MUST
//! reply with a valid HTTP response.
//!
//! Example:
//!
//! ```text
//! HTTP/1.1 101 Switching Protocols
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=
//! ```
//!
//! Any other request is answered with a `404` and the connection is closed.

use super::HttpHeader;
use super::{write_header, find_header, has_token};
use super::handshake_check;
use super::MAX_ALLOW_HEADERS;
use super::{HTTP_STATUS_LINE, HTTP_NOT_FOUND_LINE, HTTP_LINE_BREAK, REJECT_BODY};
use super::static_headers::*;

use crate::error::HandshakeError;

/// Http response presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response<'h, 'b: 'h> {
    pub sec_accept: &'b [u8],
    pub other_headers: &'h [HttpHeader<'b>],
}

impl<'h, 'b: 'h> Response<'h, 'b> {
    /// Create with user provided headers.
    #[inline]
    pub const fn new(sec_accept: &'b [u8], other_headers: &'h [HttpHeader<'b>]) -> Self {
        Self {
            sec_accept,
            other_headers,
        }
    }

    /// Append to a provided buffer, return the number of written bytes.
    ///
    /// Necessary headers, including `upgrade`, `connection`, and
    /// `sec-websocket-accept` are written to the buffer,
    /// then other headers(if any) are written in order.
    pub fn encode(&self, buf: &mut Vec<u8>) -> usize {
        let start = buf.len();

        // HTTP/1.1 101 Switching Protocols
        buf.extend_from_slice(HTTP_STATUS_LINE);
        buf.extend_from_slice(HTTP_LINE_BREAK);

        // Connection: Upgrade
        write_header(buf, &HttpHeader::new(HEADER_CONNECTION_NAME, HEADER_CONNECTION_VALUE));

        // Upgrade: websocket
        write_header(buf, &HttpHeader::new(HEADER_UPGRADE_NAME, HEADER_UPGRADE_VALUE));

        // Sec-WebSocket-Accept: {sec_accept}
        write_header(
            buf,
            &HttpHeader::new(HEADER_SEC_WEBSOCKET_ACCEPT_NAME, self.sec_accept),
        );

        // other headers
        for hdr in self.other_headers.iter() {
            write_header(buf, hdr);
        }

        // finish with CRLF
        buf.extend_from_slice(HTTP_LINE_BREAK);

        buf.len() - start
    }

    /// Parse from a provided buffer, returns the response and
    /// the number of bytes parsed. Optional headers are not kept.
    ///
    /// Status must be `101`, `upgrade` and `connection` are checked
    /// (case insensitive), `sec-websocket-accept` must be present.
    /// If the buffer does not contain a complete http response,
    /// a [`HandshakeError::NotEnoughData`] error will be returned.
    pub fn decode(buf: &'b [u8]) -> Result<(Self, usize), HandshakeError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_ALLOW_HEADERS];
        let mut response = httparse::Response::new(&mut headers);

        // return value
        let decode_n = match response.parse(buf)? {
            httparse::Status::Complete(n) => n,
            httparse::Status::Partial => return Err(HandshakeError::NotEnoughData),
        };

        // check version, should be HTTP/1.1
        if response.version != Some(1_u8) {
            return Err(HandshakeError::HttpVersion);
        }

        // check status code, should be 101
        if response.code != Some(101_u16) {
            return Err(HandshakeError::HttpStatusCode);
        }

        let headers = &*response.headers;

        handshake_check!(
            find_header(headers, HEADER_UPGRADE_NAME),
            HEADER_UPGRADE_VALUE,
            HandshakeError::Upgrade
        );

        match find_header(headers, HEADER_CONNECTION_NAME) {
            Some(v) if has_token(v, b"upgrade") => {}
            _ => return Err(HandshakeError::Connection),
        }

        let sec_accept = handshake_check!(
            find_header(headers, HEADER_SEC_WEBSOCKET_ACCEPT_NAME),
            HandshakeError::SecWebSocketAccept
        );

        Ok((
            Response {
                sec_accept,
                other_headers: &[],
            },
            decode_n,
        ))
    }
}

/// Append a `404` reply to a provided buffer, return the number of written bytes.
///
/// The body is [`REJECT_BODY`], followed by `Connection: close`,
/// then other headers(if any) in order.
pub fn reject(buf: &mut Vec<u8>, other_headers: &[HttpHeader]) -> usize {
    let start = buf.len();
    let body_len = REJECT_BODY.len().to_string();

    // HTTP/1.1 404 Not Found
    buf.extend_from_slice(HTTP_NOT_FOUND_LINE);
    buf.extend_from_slice(HTTP_LINE_BREAK);

    write_header(buf, &HttpHeader::new(HEADER_CONNECTION_NAME, HEADER_CONNECTION_CLOSE_VALUE));
    write_header(buf, &HttpHeader::new(HEADER_CONTENT_TYPE_NAME, HEADER_CONTENT_TYPE_VALUE));
    write_header(buf, &HttpHeader::new(HEADER_CONTENT_LENGTH_NAME, body_len.as_bytes()));

    for hdr in other_headers.iter() {
        write_header(buf, hdr);
    }

    buf.extend_from_slice(HTTP_LINE_BREAK);
    buf.extend_from_slice(REJECT_BODY);

    buf.len() - start
}
