//! Socket shared between the server thread and client handles.
//!
//! Every write, from any thread, takes the same lock and queues whole
//! frames, so frame bytes never interleave on the wire.

use std::io::{self, ErrorKind, Read, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Error;

/// Bytes queued for a socket that stopped accepting writes.
pub const MAX_BACKLOG: usize = 16 << 20;

/// Write side as seen by a [`ClientHandle`](super::ClientHandle).
pub(crate) trait Outlet: Send + Sync {
    fn send(&self, frame: &[u8]) -> Result<(), Error>;

    fn request_close(&self);

    fn is_closed(&self) -> bool;
}

struct Wire<S> {
    io: Option<S>,
    backlog: Vec<u8>,
    blocked: bool,
}

pub(crate) struct Link<S> {
    wire: Mutex<Wire<S>>,
    close_requested: AtomicBool,
    broken: AtomicBool,
}

impl<S> Link<S> {
    pub fn new(io: S) -> Self {
        Self {
            wire: Mutex::new(Wire {
                io: Some(io),
                backlog: Vec::new(),
                blocked: false,
            }),
            close_requested: AtomicBool::new(false),
            broken: AtomicBool::new(false),
        }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, Wire<S>> {
        self.wire.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A write failed, the peer is gone.
    #[inline]
    pub fn is_broken(&self) -> bool { self.broken.load(Ordering::Acquire) }

    #[inline]
    pub fn is_close_requested(&self) -> bool { self.close_requested.load(Ordering::Acquire) }

    /// Nothing is waiting for the socket to drain.
    #[inline]
    pub fn is_writable(&self) -> bool { !self.lock().blocked }

    /// Release the socket, later sends fail with [`Error::Closed`].
    pub fn take(&self) -> Option<S> {
        let mut wire = self.lock();
        wire.backlog = Vec::new();
        wire.io.take()
    }
}

impl<S: Read + Write> Link<S> {
    /// Queue a frame and write as much as the socket takes.
    pub fn send(&self, frame: &[u8]) -> Result<(), Error> {
        let mut wire = self.lock();

        if wire.io.is_none() {
            return Err(Error::Closed);
        }

        if wire.backlog.len() + frame.len() > MAX_BACKLOG {
            return Err(io::Error::new(ErrorKind::WouldBlock, "send backlog is full").into());
        }

        wire.backlog.extend_from_slice(frame);
        self.flush_locked(&mut wire)
    }

    /// Write queued bytes, if any.
    pub fn flush(&self) -> Result<(), Error> {
        let mut wire = self.lock();

        if wire.io.is_none() {
            return Ok(());
        }

        self.flush_locked(&mut wire)
    }

    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        match self.lock().io.as_mut() {
            Some(io) => io.read(buf),
            None => Ok(0),
        }
    }

    fn flush_locked(&self, wire: &mut Wire<S>) -> Result<(), Error> {
        let Wire {
            io,
            backlog,
            blocked,
        } = wire;

        let io = match io.as_mut() {
            Some(io) => io,
            None => return Err(Error::Closed),
        };

        while !backlog.is_empty() {
            match io.write(backlog) {
                Ok(0) => {
                    self.broken.store(true, Ordering::Release);
                    return Err(io::Error::from(ErrorKind::WriteZero).into());
                }
                Ok(n) => {
                    backlog.drain(..n);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    *blocked = true;
                    return Ok(());
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.broken.store(true, Ordering::Release);
                    return Err(e.into());
                }
            }
        }

        // tls keeps its own ciphertext queue
        match io.flush() {
            Ok(()) => *blocked = false,
            Err(ref e)
                if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted =>
            {
                *blocked = true
            }
            Err(e) => {
                self.broken.store(true, Ordering::Release);
                return Err(e.into());
            }
        }

        Ok(())
    }
}

impl<S: Read + Write + Send> Outlet for Link<S> {
    #[inline]
    fn send(&self, frame: &[u8]) -> Result<(), Error> { Link::send(self, frame) }

    #[inline]
    fn request_close(&self) { self.close_requested.store(true, Ordering::Release); }

    #[inline]
    fn is_closed(&self) -> bool { self.is_close_requested() || self.lock().io.is_none() }
}
