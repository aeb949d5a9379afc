//! Per client connection.
//!
//! A [`Connection`] owns the socket through a shared link, buffers
//! incoming bytes, runs the upgrade handshake and then decodes frames.
//! Partial requests and partial frames stay buffered until the rest
//! arrives, so a frame is dispatched only when complete.
//!
//! The server thread drives it:
//!
//! - [`Connection::on_event`] records readiness,
//! - [`Connection::on_readable`] reads and dispatches,
//! - [`Connection::close_reason`] decides teardown,
//! - [`Connection::teardown`] releases the socket and fires `on_delete`.

mod link;
mod state;
mod handle;

pub use state::ConnectionState;
pub use link::MAX_BACKLOG;
pub use handle::{Client, ClientHandle, DataCallback, DeleteCallback};

use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use log::{debug, info, trace, warn};

use link::Link;
use handle::Callbacks;
use crate::error::{FrameError, HandshakeError};
use crate::frame::{self, Decoded, Frame, OpCode};
use crate::handshake::{HttpHeader, Request, Response, derive_accept_key, reject};
use crate::handshake::static_headers::{HEADER_DATE_NAME, HEADER_SERVER_NAME};
use crate::handshake::SERVER_NAME;
use crate::settings::Settings;

/// Bytes read per syscall.
const READ_CHUNK: usize = 16 * 1024;

/// Bytes read from one connection per pass, the rest waits for the
/// next pass so other connections are served in between.
const READ_BUDGET: usize = 1024 * 1024;

/// What a read pass produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readable {
    /// Nothing the server has to act on.
    Idle,
    /// The handshake just completed.
    Upgraded,
}

/// Why a connection is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed the socket or a read failed.
    Disconnected,
    /// A write failed.
    Broken,
    /// Close frame, protocol error or rejected handshake.
    Closing,
    /// Closed through a [`ClientHandle`].
    Requested,
    /// Nothing received for longer than the idle timeout.
    Idle,
}

/// One client, from accept to teardown.
pub struct Connection<S> {
    state: ConnectionState,
    link: Arc<Link<S>>,
    handle: ClientHandle,
    callbacks: Callbacks,
    buf: Vec<u8>,
    last_active: Instant,
    last_ping: Instant,
    readable: bool,
    disconnected: bool,
}

impl<S> Connection<S> {
    #[inline]
    pub fn state(&self) -> ConnectionState { self.state }

    #[inline]
    pub fn handle(&self) -> &ClientHandle { &self.handle }

    #[inline]
    pub fn peer_addr(&self) -> &str { self.handle.peer_addr() }

    /// Callback registration view.
    #[inline]
    pub fn client(&mut self) -> Client<'_> { Client::new(&self.handle, &mut self.callbacks) }

    /// Unread readiness is pending.
    #[inline]
    pub fn is_readable(&self) -> bool { self.readable }

    /// Record a readiness event.
    ///
    /// A read hangup only marks the connection readable, the next read
    /// returns what is left and then `0`.
    pub fn on_event(&mut self, readable: bool, hangup: bool, error: bool) {
        self.readable |= readable || hangup;
        self.disconnected |= error;
    }

    /// The connection should be torn down now, and why.
    pub fn close_reason(&self, now: Instant, idle_timeout: Duration) -> Option<CloseReason> {
        if self.disconnected {
            Some(CloseReason::Disconnected)
        } else if self.link.is_broken() {
            Some(CloseReason::Broken)
        } else if self.state >= ConnectionState::Closing {
            Some(CloseReason::Closing)
        } else if self.link.is_close_requested() {
            Some(CloseReason::Requested)
        } else if now.saturating_duration_since(self.last_active) > idle_timeout {
            Some(CloseReason::Idle)
        } else {
            None
        }
    }

    /// An open connection whose last ping is older than `interval`.
    pub fn ping_due(&self, now: Instant, interval: Duration) -> bool {
        self.state.is_open()
            && self.link.is_writable()
            && now.saturating_duration_since(self.last_ping) > interval
    }

    fn advance(&mut self, to: ConnectionState) {
        if to > self.state {
            trace!("{}: {:?} -> {:?}", self.handle.peer_addr(), self.state, to);
            self.state = to;
        }
    }

    /// Fire `on_delete` once and give the socket back, `None` if
    /// already released.
    fn release(&mut self) -> Option<S> {
        if self.state == ConnectionState::Closed {
            return None;
        }
        self.advance(ConnectionState::Closed);

        self.callbacks.on_data = None;
        if let Some(on_delete) = self.callbacks.on_delete.take() {
            on_delete(&self.handle);
        }

        self.buf = Vec::new();
        self.link.take()
    }
}

impl<S> Connection<S>
where
    S: Read + Write + Send + 'static,
{
    pub fn new(id: usize, io: S, peer: &str, now: Instant) -> Self {
        let link = Arc::new(Link::new(io));
        let handle = ClientHandle::new(id, peer, link.clone());

        Self {
            state: ConnectionState::HttpPending,
            link,
            handle,
            callbacks: Callbacks::default(),
            buf: Vec::new(),
            last_active: now,
            last_ping: now,
            readable: false,
            disconnected: false,
        }
    }

    /// Socket drained, write out anything queued.
    pub fn on_writable(&mut self) {
        if let Err(e) = self.link.flush() {
            debug!("{}: flush failed: {}", self.handle.peer_addr(), e);
        }
    }

    pub fn send_ping(&mut self, now: Instant) {
        self.last_ping = now;
        if let Err(e) = self.link.send(&frame::PING) {
            debug!("{}: ping failed: {}", self.handle.peer_addr(), e);
        }
    }

    /// Read what is available, then run the handshake or dispatch frames.
    pub fn on_readable(&mut self, now: Instant, settings: &Settings) -> Readable {
        self.readable = false;

        if self.state >= ConnectionState::Closing {
            return Readable::Idle;
        }

        self.fill(now);

        if self.state == ConnectionState::HttpPending && self.upgrade() == Readable::Upgraded {
            // frames that came with the request wait for the callbacks
            self.readable |= !self.buf.is_empty();
            return Readable::Upgraded;
        }

        if self.state == ConnectionState::WebSocketOpen {
            self.dispatch_frames(settings);
        }

        Readable::Idle
    }

    /// Release the socket and fire `on_delete`, once.
    ///
    /// Queued bytes get one last chance to go out.
    pub fn teardown(&mut self) -> Option<S> {
        if self.state != ConnectionState::Closed {
            let _ = self.link.flush();
        }
        self.release()
    }

    fn fill(&mut self, now: Instant) {
        let mut chunk = [0u8; READ_CHUNK];
        let mut budget = READ_BUDGET;

        loop {
            if budget == 0 {
                // come back on the next pass
                self.readable = true;
                break;
            }

            match self.link.read(&mut chunk) {
                Ok(0) => {
                    debug!("{}: peer closed", self.handle.peer_addr());
                    self.disconnected = true;
                    break;
                }
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    self.last_active = now;
                    budget = budget.saturating_sub(n);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    debug!("{}: read failed: {}", self.handle.peer_addr(), e);
                    self.disconnected = true;
                    break;
                }
            }
        }
    }

    fn upgrade(&mut self) -> Readable {
        let (accept, consumed) = match Request::decode(&self.buf) {
            Ok((request, n)) => {
                debug!(
                    "{}: upgrade request for {}",
                    self.handle.peer_addr(),
                    String::from_utf8_lossy(request.path)
                );
                (derive_accept_key(request.sec_key), n)
            }
            Err(HandshakeError::NotEnoughData) => return Readable::Idle,
            Err(e) => {
                info!("{}: not a websocket request: {}", self.handle.peer_addr(), e);
                self.reject();
                return Readable::Idle;
            }
        };

        // pipelined frames stay in the buffer
        self.buf.drain(..consumed);

        let date = httpdate::fmt_http_date(SystemTime::now());
        let other_headers = [
            HttpHeader::new(HEADER_DATE_NAME, date.as_bytes()),
            HttpHeader::new(HEADER_SERVER_NAME, SERVER_NAME),
        ];
        let mut reply = Vec::with_capacity(256);
        Response::new(accept.as_bytes(), &other_headers).encode(&mut reply);

        if let Err(e) = self.link.send(&reply) {
            warn!("{}: handshake reply failed: {}", self.handle.peer_addr(), e);
            self.advance(ConnectionState::Closing);
            return Readable::Idle;
        }

        self.advance(ConnectionState::WebSocketOpen);
        info!("{}: websocket open", self.handle.peer_addr());
        Readable::Upgraded
    }

    fn reject(&mut self) {
        let date = httpdate::fmt_http_date(SystemTime::now());
        let other_headers = [
            HttpHeader::new(HEADER_DATE_NAME, date.as_bytes()),
            HttpHeader::new(HEADER_SERVER_NAME, SERVER_NAME),
        ];
        let mut reply = Vec::with_capacity(256);
        reject(&mut reply, &other_headers);

        if let Err(e) = self.link.send(&reply) {
            debug!("{}: reject reply failed: {}", self.handle.peer_addr(), e);
        }

        self.buf.clear();
        self.advance(ConnectionState::Closing);
    }

    fn dispatch_frames(&mut self, settings: &Settings) {
        let max_payload = settings.max_frame_size.unwrap_or(u64::MAX);
        let mut offset = 0;

        while self.state.is_open() && offset < self.buf.len() {
            match frame::decode_limited(&self.buf[offset..], max_payload) {
                Decoded::Frame(frame, n) => {
                    offset += n;
                    self.dispatch(frame, settings.strict);
                }
                Decoded::NeedMore(n) => {
                    trace!("{}: waiting for {} more bytes", self.handle.peer_addr(), n);
                    break;
                }
                Decoded::Invalid(e) => {
                    warn!("{}: protocol error: {}", self.handle.peer_addr(), e);
                    self.advance(ConnectionState::Closing);
                    break;
                }
            }
        }

        if self.state.is_open() {
            self.buf.drain(..offset);
        } else {
            self.buf.clear();
        }
    }

    fn dispatch(&mut self, frame: Frame, strict: bool) {
        if strict {
            if let Err(e) = check_strict(&frame) {
                warn!("{}: protocol error: {}", self.handle.peer_addr(), e);
                self.advance(ConnectionState::Closing);
                return;
            }
        }

        match frame.opcode() {
            OpCode::Text | OpCode::Binary => {
                let is_binary = frame.opcode() == OpCode::Binary;
                if let Some(on_data) = self.callbacks.on_data.as_mut() {
                    on_data(&self.handle, &frame.payload, is_binary);
                }
            }
            OpCode::Ping => {
                if let Err(e) = self.link.send(&frame::encode(OpCode::Pong, &frame.payload)) {
                    debug!("{}: pong failed: {}", self.handle.peer_addr(), e);
                }
            }
            OpCode::Pong => trace!("{}: pong", self.handle.peer_addr()),
            OpCode::Close => {
                debug!("{}: close frame", self.handle.peer_addr());
                // echo the status code, if any
                let code = frame.payload.get(..2).unwrap_or(&[]);
                let _ = self.link.send(&frame::encode(OpCode::Close, code));
                self.advance(ConnectionState::Closing);
            }
            OpCode::Continue => {
                debug!("{}: continuation frame ignored", self.handle.peer_addr());
            }
        }
    }
}

impl<S> Drop for Connection<S> {
    fn drop(&mut self) { let _ = self.release(); }
}

fn check_strict(frame: &Frame) -> Result<(), FrameError> {
    if !frame.is_masked() {
        return Err(FrameError::UnmaskedFrame);
    }

    if frame.opcode().is_control() && (!frame.is_fin() || frame.payload.len() > 125) {
        return Err(FrameError::IllegalControl);
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use crate::frame::encode_masked;

    #[derive(Default)]
    struct Inner {
        input: VecDeque<u8>,
        output: Vec<u8>,
        eof: bool,
        broken: bool,
        write_budget: Option<usize>,
    }

    /// Non-blocking in-memory socket.
    #[derive(Clone, Default)]
    pub struct MockIo(Arc<Mutex<Inner>>);

    impl MockIo {
        pub fn new() -> Self { Self::default() }

        pub fn push(&self, data: &[u8]) { self.0.lock().unwrap().input.extend(data); }

        pub fn output(&self) -> Vec<u8> { self.0.lock().unwrap().output.clone() }

        pub fn take_output(&self) -> Vec<u8> { std::mem::take(&mut self.0.lock().unwrap().output) }

        pub fn set_eof(&self) { self.0.lock().unwrap().eof = true; }

        pub fn set_broken(&self, yes: bool) { self.0.lock().unwrap().broken = yes; }

        /// Bytes accepted before writes block, `None` for unlimited.
        pub fn set_write_budget(&self, budget: Option<usize>) {
            self.0.lock().unwrap().write_budget = budget;
        }
    }

    impl Read for MockIo {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut inner = self.0.lock().unwrap();
            if inner.input.is_empty() {
                return if inner.eof {
                    Ok(0)
                } else {
                    Err(ErrorKind::WouldBlock.into())
                };
            }
            let n = buf.len().min(inner.input.len());
            for (dst, src) in buf.iter_mut().zip(inner.input.drain(..n)) {
                *dst = src;
            }
            Ok(n)
        }
    }

    impl Write for MockIo {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut inner = self.0.lock().unwrap();
            if inner.broken {
                return Err(ErrorKind::BrokenPipe.into());
            }
            let n = match inner.write_budget {
                Some(0) => return Err(ErrorKind::WouldBlock.into()),
                Some(budget) => {
                    let n = budget.min(buf.len());
                    inner.write_budget = Some(budget - n);
                    n
                }
                None => buf.len(),
            };
            inner.output.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> { Ok(()) }
    }

    const REQUEST: &[u8] = b"\
        GET /trace HTTP/1.1\r\n\
        Host: 127.0.0.1:6363\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\r\n";

    const PEER: &str = "127.0.0.1:50000";

    fn masked(opcode: OpCode, payload: &[u8]) -> Vec<u8> {
        encode_masked(opcode, payload, [0x37, 0xfa, 0x21, 0x3d])
    }

    fn open(settings: &Settings, now: Instant) -> (MockIo, Connection<MockIo>) {
        let io = MockIo::new();
        let mut conn = Connection::new(1, io.clone(), PEER, now);
        io.push(REQUEST);
        conn.on_event(true, false, false);
        assert_eq!(conn.on_readable(now, settings), Readable::Upgraded);
        io.take_output();
        (io, conn)
    }

    type Received = Arc<Mutex<Vec<(Vec<u8>, bool)>>>;

    fn record(conn: &mut Connection<MockIo>) -> (Received, Arc<AtomicUsize>) {
        let received = Received::default();
        let deleted = Arc::new(AtomicUsize::new(0));
        let mut client = conn.client();
        {
            let received = received.clone();
            client.set_on_data(move |_, data, is_binary| {
                received.lock().unwrap().push((data.to_vec(), is_binary));
            });
        }
        {
            let deleted = deleted.clone();
            client.set_on_delete(move |_| {
                deleted.fetch_add(1, Ordering::SeqCst);
            });
        }
        (received, deleted)
    }

    #[test]
    fn upgrade() {
        let now = Instant::now();
        let io = MockIo::new();
        let mut conn = Connection::new(1, io.clone(), PEER, now);
        assert_eq!(conn.state(), ConnectionState::HttpPending);
        assert_eq!(conn.peer_addr(), PEER);

        io.push(REQUEST);
        conn.on_event(true, false, false);
        assert!(conn.is_readable());
        assert_eq!(conn.on_readable(now, &Settings::new()), Readable::Upgraded);
        assert!(!conn.is_readable());
        assert_eq!(conn.state(), ConnectionState::WebSocketOpen);

        let out = io.output();
        let (response, n) = Response::decode(&out).unwrap();
        assert_eq!(n, out.len());
        assert_eq!(response.sec_accept, b"s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\r\nDate: "));
        assert!(text.contains("\r\nServer: wsprobe/"));
        assert_eq!(conn.close_reason(now, Duration::from_secs(20)), None);
    }

    #[test]
    fn split_request() {
        let now = Instant::now();
        let settings = Settings::new();
        let io = MockIo::new();
        let mut conn = Connection::new(1, io.clone(), PEER, now);

        io.push(&REQUEST[..20]);
        assert_eq!(conn.on_readable(now, &settings), Readable::Idle);
        assert_eq!(conn.state(), ConnectionState::HttpPending);
        assert!(io.output().is_empty());

        io.push(&REQUEST[20..]);
        assert_eq!(conn.on_readable(now, &settings), Readable::Upgraded);
    }

    #[test]
    fn reject_plain_http() {
        let now = Instant::now();
        let io = MockIo::new();
        let mut conn = Connection::new(1, io.clone(), PEER, now);
        let (received, deleted) = record(&mut conn);

        io.push(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
        assert_eq!(conn.on_readable(now, &Settings::new()), Readable::Idle);
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert_eq!(
            conn.close_reason(now, Duration::from_secs(20)),
            Some(CloseReason::Closing)
        );

        let text = String::from_utf8(io.output()).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("only ws connections are accepted"));

        assert!(conn.teardown().is_some());
        assert!(received.lock().unwrap().is_empty());
        assert_eq!(deleted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pipelined_frame() {
        let now = Instant::now();
        let io = MockIo::new();
        let mut conn = Connection::new(1, io.clone(), PEER, now);
        let (received, _) = record(&mut conn);

        let mut data = REQUEST.to_vec();
        data.extend(masked(OpCode::Text, b"early"));
        io.push(&data);

        let settings = Settings::new();
        assert_eq!(conn.on_readable(now, &settings), Readable::Upgraded);
        assert!(received.lock().unwrap().is_empty());
        assert!(conn.is_readable());

        assert_eq!(conn.on_readable(now, &settings), Readable::Idle);
        assert_eq!(*received.lock().unwrap(), vec![(b"early".to_vec(), false)]);
    }

    #[test]
    fn pipelined_frame_before_hangup() {
        let now = Instant::now();
        let io = MockIo::new();
        let mut conn = Connection::new(1, io.clone(), PEER, now);

        let mut data = REQUEST.to_vec();
        data.extend(masked(OpCode::Text, b"bye"));
        io.push(&data);
        io.set_eof();

        let settings = Settings::new();
        assert_eq!(conn.on_readable(now, &settings), Readable::Upgraded);
        let (received, _) = record(&mut conn);

        // still readable, the frame goes out before teardown
        assert!(conn.is_readable());
        conn.on_readable(now, &settings);
        assert_eq!(*received.lock().unwrap(), vec![(b"bye".to_vec(), false)]);
        assert_eq!(
            conn.close_reason(now, Duration::from_secs(20)),
            Some(CloseReason::Disconnected)
        );
    }

    #[test]
    fn data() {
        let now = Instant::now();
        let settings = Settings::new();
        let (io, mut conn) = open(&settings, now);
        let (received, _) = record(&mut conn);

        let mut data = masked(OpCode::Text, b"hello");
        data.extend(masked(OpCode::Binary, &[0, 1, 2]));
        data.extend(masked(OpCode::Text, b""));
        io.push(&data);
        conn.on_readable(now, &settings);

        assert_eq!(
            *received.lock().unwrap(),
            vec![
                (b"hello".to_vec(), false),
                (vec![0, 1, 2], true),
                (Vec::new(), false)
            ]
        );
        assert!(io.output().is_empty());
    }

    #[test]
    fn split_frame() {
        let now = Instant::now();
        let settings = Settings::new();
        let (io, mut conn) = open(&settings, now);
        let (received, _) = record(&mut conn);

        let payload = vec![0x5a; 70_000];
        let data = masked(OpCode::Binary, &payload);

        for piece in data.chunks(4096) {
            assert!(received.lock().unwrap().is_empty());
            io.push(piece);
            conn.on_readable(now, &settings);
        }

        assert_eq!(*received.lock().unwrap(), vec![(payload, true)]);
        assert!(conn.state().is_open());
    }

    #[test]
    fn ping_pong() {
        let now = Instant::now();
        let settings = Settings::new();
        let (io, mut conn) = open(&settings, now);

        io.push(&masked(OpCode::Ping, b"abc"));
        conn.on_readable(now, &settings);
        assert_eq!(io.take_output(), [0x8a, 0x03, b'a', b'b', b'c']);

        // pong is ignored
        io.push(&masked(OpCode::Pong, b""));
        conn.on_readable(now, &settings);
        assert!(io.output().is_empty());
        assert!(conn.state().is_open());
    }

    #[test]
    fn close_frame() {
        let now = Instant::now();
        let settings = Settings::new();
        let (io, mut conn) = open(&settings, now);
        let (received, deleted) = record(&mut conn);

        let mut data = masked(OpCode::Close, &[0x03, 0xe8, b'b', b'y', b'e']);
        data.extend(masked(OpCode::Text, b"late"));
        io.push(&data);
        conn.on_readable(now, &settings);

        assert_eq!(io.output(), [0x88, 0x02, 0x03, 0xe8]);
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert_eq!(
            conn.close_reason(now, Duration::from_secs(20)),
            Some(CloseReason::Closing)
        );
        assert!(received.lock().unwrap().is_empty());

        assert!(conn.teardown().is_some());
        assert!(conn.teardown().is_none());
        drop(conn);
        assert_eq!(deleted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn continuation_ignored() {
        let now = Instant::now();
        let settings = Settings::new();
        let (io, mut conn) = open(&settings, now);
        let (received, _) = record(&mut conn);

        io.push(&masked(OpCode::Continue, b"tail"));
        conn.on_readable(now, &settings);
        assert!(received.lock().unwrap().is_empty());
        assert!(conn.state().is_open());
    }

    #[test]
    fn reserved_opcode() {
        let now = Instant::now();
        let settings = Settings::new();
        let (io, mut conn) = open(&settings, now);
        let (received, _) = record(&mut conn);

        io.push(&[0x83, 0x80, 0, 0, 0, 0]);
        conn.on_readable(now, &settings);
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(received.lock().unwrap().is_empty());
    }

    #[test]
    fn unmasked() {
        let now = Instant::now();

        let settings = Settings::new();
        let (io, mut conn) = open(&settings, now);
        let (received, _) = record(&mut conn);
        io.push(&frame::encode(OpCode::Text, b"plain"));
        conn.on_readable(now, &settings);
        assert_eq!(received.lock().unwrap().len(), 1);

        let settings = Settings::new().strict(true);
        let (io, mut conn) = open(&settings, now);
        let (received, _) = record(&mut conn);
        io.push(&frame::encode(OpCode::Text, b"plain"));
        conn.on_readable(now, &settings);
        assert!(received.lock().unwrap().is_empty());
        assert_eq!(conn.state(), ConnectionState::Closing);
    }

    #[test]
    fn strict_control() {
        let now = Instant::now();
        let settings = Settings::new().strict(true);
        let (io, mut conn) = open(&settings, now);

        io.push(&masked(OpCode::Ping, &[0; 126]));
        conn.on_readable(now, &settings);
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(io.output().is_empty());
    }

    #[test]
    fn frame_too_large() {
        let now = Instant::now();
        let settings = Settings::new().max_frame_size(16);
        let (io, mut conn) = open(&settings, now);
        let (received, _) = record(&mut conn);

        io.push(&masked(OpCode::Binary, &[0; 16]));
        conn.on_readable(now, &settings);
        assert_eq!(received.lock().unwrap().len(), 1);

        // refused from the header alone
        io.push(&masked(OpCode::Binary, &[0; 17])[..8]);
        conn.on_readable(now, &settings);
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[test]
    fn idle_timeout() {
        let start = Instant::now();
        let settings = Settings::new();
        let (io, mut conn) = open(&settings, start);
        let timeout = Duration::from_secs(20);

        assert_eq!(conn.close_reason(start + Duration::from_secs(19), timeout), None);

        // any traffic counts
        let later = start + Duration::from_secs(15);
        io.push(&masked(OpCode::Pong, b""));
        conn.on_readable(later, &settings);
        assert_eq!(conn.close_reason(start + Duration::from_secs(30), timeout), None);
        assert_eq!(
            conn.close_reason(later + Duration::from_secs(21), timeout),
            Some(CloseReason::Idle)
        );
    }

    #[test]
    fn ping_schedule() {
        let start = Instant::now();
        let interval = Duration::from_secs(7);
        let io = MockIo::new();
        let mut conn = Connection::new(1, io.clone(), PEER, start);

        // no ping before the upgrade
        assert!(!conn.ping_due(start + Duration::from_secs(8), interval));

        io.push(REQUEST);
        conn.on_readable(start, &Settings::new());
        io.take_output();

        assert!(!conn.ping_due(start + Duration::from_secs(7), interval));
        let now = start + Duration::from_secs(8);
        assert!(conn.ping_due(now, interval));

        conn.send_ping(now);
        assert_eq!(io.take_output(), frame::PING);
        assert!(!conn.ping_due(now + Duration::from_secs(1), interval));
        assert!(conn.ping_due(now + Duration::from_secs(8), interval));
    }

    #[test]
    fn blocked_socket() {
        let now = Instant::now();
        let settings = Settings::new();
        let (io, mut conn) = open(&settings, now);
        let interval = Duration::from_secs(7);
        let later = now + Duration::from_secs(8);

        io.set_write_budget(Some(1));
        conn.handle().send_text("queued").unwrap();
        assert_eq!(io.output(), [0x81]);
        assert!(!conn.ping_due(later, interval));

        io.set_write_budget(None);
        conn.on_writable();
        assert_eq!(io.take_output(), [0x81, 0x06, b'q', b'u', b'e', b'u', b'e', b'd']);
        assert!(conn.ping_due(later, interval));
    }

    #[test]
    fn peer_gone() {
        let now = Instant::now();
        let settings = Settings::new();
        let (io, mut conn) = open(&settings, now);
        let (received, deleted) = record(&mut conn);

        // data before the hangup is still delivered
        io.push(&masked(OpCode::Text, b"last"));
        io.set_eof();
        conn.on_event(false, true, false);
        conn.on_readable(now, &settings);

        assert_eq!(received.lock().unwrap().len(), 1);
        assert_eq!(
            conn.close_reason(now, Duration::from_secs(20)),
            Some(CloseReason::Disconnected)
        );

        drop(conn);
        assert_eq!(deleted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn socket_error() {
        let now = Instant::now();
        let (_io, mut conn) = open(&Settings::new(), now);
        conn.on_event(false, false, true);
        assert_eq!(
            conn.close_reason(now, Duration::from_secs(20)),
            Some(CloseReason::Disconnected)
        );
    }

    #[test]
    fn broken_write() {
        let now = Instant::now();
        let (io, conn) = open(&Settings::new(), now);
        io.set_broken(true);

        assert!(conn.handle().send_text("x").is_err());
        assert_eq!(
            conn.close_reason(now, Duration::from_secs(20)),
            Some(CloseReason::Broken)
        );
    }

    #[test]
    fn close_through_handle() {
        let now = Instant::now();
        let (io, mut conn) = open(&Settings::new(), now);
        let (_, deleted) = record(&mut conn);
        let handle = conn.handle().clone();

        handle.close().unwrap();
        assert_eq!(io.output(), [0x88, 0x02, 0x03, 0xe8]);
        assert_eq!(
            conn.close_reason(now, Duration::from_secs(20)),
            Some(CloseReason::Requested)
        );

        assert!(conn.teardown().is_some());
        assert_eq!(deleted.load(Ordering::SeqCst), 1);
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(matches!(handle.send_text("x"), Err(crate::error::Error::Closed)));
    }

    #[test]
    fn delete_sees_handle() {
        let now = Instant::now();
        let (_io, mut conn) = open(&Settings::new(), now);
        let seen = Arc::new(AtomicBool::new(false));
        {
            let seen = seen.clone();
            conn.client().set_on_delete(move |handle| {
                assert_eq!(handle.peer_addr(), PEER);
                seen.store(true, Ordering::SeqCst);
            });
        }
        conn.teardown();
        assert!(seen.load(Ordering::SeqCst));
    }
}
