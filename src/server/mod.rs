//! Websocket server.
//!
//! [`Server::start`] binds the listener and spawns the server thread,
//! every callback runs on that thread. [`ServerHandle`] can be cloned
//! into callbacks or other threads to reach connected clients or stop
//! the server.
//!
//! ```ignore
//! let server = Server::start(Settings::new().port(6363).on_new_client(|_, client| {
//!     client.set_on_data(|handle, data, is_binary| {
//!         let _ = if is_binary {
//!             handle.send_binary(data)
//!         } else {
//!             handle.send_text(&String::from_utf8_lossy(data))
//!         };
//!     });
//! }))?;
//!
//! server.handle().broadcast_text("hello");
//! server.stop();
//! ```

mod listener;
mod reactor;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use log::{error, info, warn};
use mio::{Interest, Poll, Waker};

use reactor::{Reactor, LISTENER, WAKER};
use crate::connection::ClientHandle;
use crate::error::Error;
use crate::settings::Settings;
use crate::transport::Acceptor;

struct Shared {
    running: AtomicBool,
    waker: Waker,
    local_addr: SocketAddr,
    clients: Mutex<HashMap<usize, ClientHandle>>,
}

/// Cloneable reference to a running server.
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    fn new(local_addr: SocketAddr, waker: Waker) -> Self {
        Self {
            shared: Arc::new(Shared {
                running: AtomicBool::new(true),
                waker,
                local_addr,
                clients: Mutex::new(HashMap::new()),
            }),
        }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, HashMap<usize, ClientHandle>> {
        self.shared
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Address the listener is bound to.
    #[inline]
    pub fn local_addr(&self) -> SocketAddr { self.shared.local_addr }

    #[inline]
    pub fn is_running(&self) -> bool { self.shared.running.load(Ordering::Acquire) }

    /// Ask the server thread to exit, open connections are torn down.
    pub fn stop(&self) {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            if let Err(e) = self.shared.waker.wake() {
                warn!("wake server thread failed: {}", e);
            }
        }
    }

    /// Upgraded clients still connected.
    pub fn clients(&self) -> Vec<ClientHandle> {
        let mut clients: Vec<_> = self.lock().values().cloned().collect();
        clients.sort_by_key(ClientHandle::id);
        clients
    }

    #[inline]
    pub fn client_count(&self) -> usize { self.lock().len() }

    /// Send a text frame to every client, return how many accepted it.
    pub fn broadcast_text(&self, text: &str) -> usize {
        self.clients()
            .iter()
            .filter(|c| c.send_text(text).is_ok())
            .count()
    }

    /// Send a binary frame to every client, return how many accepted it.
    pub fn broadcast_binary(&self, data: &[u8]) -> usize {
        self.clients()
            .iter()
            .filter(|c| c.send_binary(data).is_ok())
            .count()
    }

    pub(crate) fn insert(&self, client: ClientHandle) { self.lock().insert(client.id(), client); }

    pub(crate) fn remove(&self, id: usize) { self.lock().remove(&id); }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("local_addr", &self.local_addr())
            .field("running", &self.is_running())
            .field("clients", &self.client_count())
            .finish()
    }
}

/// A running server, stopped and joined on drop.
pub struct Server {
    handle: ServerHandle,
    thread: Option<JoinHandle<()>>,
}

impl Server {
    /// Validate the settings, bind and spawn the server thread.
    pub fn start(settings: Settings) -> Result<Self, Error> {
        settings.validate()?;

        let acceptor = Acceptor::from_settings(&settings)?;
        let mut listener = listener::bind(settings.bind_addr())?;
        let local_addr = listener.local_addr()?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Waker::new(poll.registry(), WAKER)?;

        let handle = ServerHandle::new(local_addr, waker);
        let tls = acceptor.is_tls();
        let reactor = Reactor::new(poll, listener, acceptor, settings, handle.clone());

        let thread = thread::Builder::new()
            .name(format!("wsprobe:{}", local_addr.port()))
            .spawn(move || reactor.run())?;

        info!(
            "listening on {}{}",
            local_addr,
            if tls { " with tls" } else { "" }
        );

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    #[inline]
    pub fn handle(&self) -> &ServerHandle { &self.handle }

    #[inline]
    pub fn local_addr(&self) -> SocketAddr { self.handle.local_addr() }

    #[inline]
    pub fn stop(&self) { self.handle.stop() }

    /// Block until the server thread exits.
    pub fn join(mut self) { self.join_thread(); }

    fn join_thread(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("server thread on {} panicked", self.handle.local_addr());
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.stop();
        self.join_thread();
    }
}
