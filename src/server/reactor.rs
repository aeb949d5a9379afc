//! Server thread.
//!
//! One thread owns the listener and every connection. Each pass waits
//! for readiness at most `poll_interval`, accepts new sockets, records
//! events, then visits every connection once: tear down, ping, or read.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Instant;

use log::{debug, error, info, warn};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};

use super::ServerHandle;
use crate::connection::{CloseReason, Connection, Readable};
use crate::settings::Settings;
use crate::transport::{Acceptor, Transport};

pub(crate) const LISTENER: Token = Token(0);
pub(crate) const WAKER: Token = Token(1);

/// Ids below this are reserved tokens.
const FIRST_CLIENT: usize = 2;

const EVENT_CAPACITY: usize = 256;

pub(crate) struct Reactor {
    poll: Poll,
    listener: TcpListener,
    acceptor: Acceptor,
    settings: Settings,
    server: ServerHandle,
    conns: HashMap<usize, Connection<Transport>>,
    next_id: usize,
}

impl Reactor {
    pub fn new(
        poll: Poll,
        listener: TcpListener,
        acceptor: Acceptor,
        settings: Settings,
        server: ServerHandle,
    ) -> Self {
        Self {
            poll,
            listener,
            acceptor,
            settings,
            server,
            conns: HashMap::new(),
            next_id: FIRST_CLIENT,
        }
    }

    /// Serve until the server is stopped.
    pub fn run(mut self) {
        let mut events = Events::with_capacity(EVENT_CAPACITY);

        while self.server.is_running() {
            if let Err(e) = self.poll.poll(&mut events, Some(self.settings.poll_interval)) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                error!("poll failed: {}", e);
                break;
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept(),
                    WAKER => {}
                    Token(id) => {
                        if let Some(conn) = self.conns.get_mut(&id) {
                            conn.on_event(
                                event.is_readable(),
                                event.is_read_closed() || event.is_write_closed(),
                                event.is_error(),
                            );
                            if event.is_writable() {
                                conn.on_writable();
                            }
                        }
                    }
                }
            }

            self.service(Instant::now());
        }

        self.shutdown();
    }

    fn accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((sock, peer)) => self.admit(sock, peer),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("accept failed: {}", e);
                    break;
                }
            }
        }
    }

    fn admit(&mut self, sock: TcpStream, peer: SocketAddr) {
        if let Err(e) = sock.set_nodelay(true) {
            debug!("{}: set nodelay failed: {}", peer, e);
        }

        let mut transport = match self.acceptor.wrap(sock) {
            Ok(x) => x,
            Err(e) => {
                warn!("{}: {}", peer, e);
                return;
            }
        };

        let id = self.next_id;
        self.next_id += 1;

        if let Err(e) = self.poll.registry().register(
            transport.socket_mut(),
            Token(id),
            Interest::READABLE | Interest::WRITABLE,
        ) {
            warn!("{}: register failed: {}", peer, e);
            return;
        }

        debug!("{}: accepted as #{}", peer, id);

        let mut conn = Connection::new(id, transport, &peer.to_string(), Instant::now());
        // bytes may already be waiting
        conn.on_event(true, false, false);
        self.conns.insert(id, conn);
    }

    fn service(&mut self, now: Instant) {
        let ids: Vec<usize> = self.conns.keys().copied().collect();

        for id in ids {
            let conn = match self.conns.get_mut(&id) {
                Some(x) => x,
                None => continue,
            };

            if let Some(reason) = conn.close_reason(now, self.settings.idle_timeout) {
                self.close(id, reason);
            } else if conn.ping_due(now, self.settings.ping_interval) {
                conn.send_ping(now);
            } else if conn.is_readable()
                && conn.on_readable(now, &self.settings) == Readable::Upgraded
            {
                self.server.insert(conn.handle().clone());
                if let Some(on_new_client) = self.settings.on_new_client.as_mut() {
                    on_new_client(&self.server, &mut conn.client());
                }
                // frames that came with the request, before a hangup tears it down
                if conn.is_readable() {
                    conn.on_readable(now, &self.settings);
                }
            }
        }
    }

    fn close(&mut self, id: usize, reason: CloseReason) {
        let mut conn = match self.conns.remove(&id) {
            Some(x) => x,
            None => return,
        };

        match reason {
            CloseReason::Idle | CloseReason::Broken => {
                info!("{}: dropped, {:?}", conn.peer_addr(), reason)
            }
            _ => debug!("{}: closed, {:?}", conn.peer_addr(), reason),
        }

        self.server.remove(id);

        if let Some(mut transport) = conn.teardown() {
            if let Err(e) = self.poll.registry().deregister(transport.socket_mut()) {
                debug!("{}: deregister failed: {}", conn.peer_addr(), e);
            }
            transport.shutdown();
        }
    }

    fn shutdown(&mut self) {
        let ids: Vec<usize> = self.conns.keys().copied().collect();
        for id in ids {
            self.close(id, CloseReason::Requested);
        }

        if let Err(e) = self.poll.registry().deregister(&mut self.listener) {
            debug!("deregister listener failed: {}", e);
        }

        info!("server on {} stopped", self.server.local_addr());
    }
}
