//! Application side of a connection.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use super::link::Outlet;
use crate::error::Error;
use crate::frame::{self, OpCode};

/// Called for every complete text or binary message.
///
/// Arguments are the sending client, the unmasked payload and
/// whether the message was binary.
pub type DataCallback = Box<dyn FnMut(&ClientHandle, &[u8], bool) + Send>;

/// Called once when the connection is torn down.
pub type DeleteCallback = Box<dyn FnOnce(&ClientHandle) + Send>;

/// 1000, normal closure.
const CLOSE_NORMAL: [u8; 2] = 1000_u16.to_be_bytes();

/// Cloneable reference to a client.
///
/// A handle can be moved to other threads, every send takes the
/// connection's write lock. Once the connection is gone, sends
/// fail with [`Error::Closed`].
#[derive(Clone)]
pub struct ClientHandle {
    id: usize,
    peer: Arc<str>,
    outlet: Arc<dyn Outlet>,
}

impl ClientHandle {
    pub(crate) fn new(id: usize, peer: &str, outlet: Arc<dyn Outlet>) -> Self {
        Self {
            id,
            peer: Arc::from(peer),
            outlet,
        }
    }

    /// Server unique id.
    #[inline]
    pub fn id(&self) -> usize { self.id }

    /// Remote address as `ip:port`.
    #[inline]
    pub fn peer_addr(&self) -> &str { &self.peer }

    /// Send one text frame.
    #[inline]
    pub fn send_text(&self, text: &str) -> Result<(), Error> {
        self.outlet.send(&frame::encode(OpCode::Text, text.as_bytes()))
    }

    /// Send one binary frame.
    #[inline]
    pub fn send_binary(&self, data: &[u8]) -> Result<(), Error> {
        self.outlet.send(&frame::encode(OpCode::Binary, data))
    }

    /// Send a close frame and ask the server to drop the connection.
    pub fn close(&self) -> Result<(), Error> {
        let ret = self.outlet.send(&frame::encode(OpCode::Close, &CLOSE_NORMAL));
        self.outlet.request_close();
        ret
    }

    /// The connection is closing or already gone.
    #[inline]
    pub fn is_closed(&self) -> bool { self.outlet.is_closed() }
}

impl Debug for ClientHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[derive(Default)]
pub(crate) struct Callbacks {
    pub on_data: Option<DataCallback>,
    pub on_delete: Option<DeleteCallback>,
}

/// A freshly upgraded client, handed to the new client callback.
pub struct Client<'a> {
    handle: &'a ClientHandle,
    callbacks: &'a mut Callbacks,
}

impl<'a> Client<'a> {
    pub(crate) fn new(handle: &'a ClientHandle, callbacks: &'a mut Callbacks) -> Self {
        Self { handle, callbacks }
    }

    /// Replace the data callback.
    pub fn set_on_data<F>(&mut self, f: F)
    where
        F: FnMut(&ClientHandle, &[u8], bool) + Send + 'static,
    {
        self.callbacks.on_data = Some(Box::new(f));
    }

    /// Replace the delete callback.
    pub fn set_on_delete<F>(&mut self, f: F)
    where
        F: FnOnce(&ClientHandle) + Send + 'static,
    {
        self.callbacks.on_delete = Some(Box::new(f));
    }

    #[inline]
    pub fn handle(&self) -> &ClientHandle { self.handle }

    #[inline]
    pub fn id(&self) -> usize { self.handle.id() }

    #[inline]
    pub fn peer_addr(&self) -> &str { self.handle.peer_addr() }

    #[inline]
    pub fn send_text(&self, text: &str) -> Result<(), Error> { self.handle.send_text(text) }

    #[inline]
    pub fn send_binary(&self, data: &[u8]) -> Result<(), Error> { self.handle.send_binary(data) }
}
