//! Sockets the connections run on.
//!
//! A [`Transport`] is either a plain non-blocking tcp stream or the same
//! stream wrapped in tls; connections treat both alike.

use std::io::{self, Read, Write};
use std::net::Shutdown;

use mio::net::TcpStream;

use crate::error::Error;
use crate::settings::Settings;

cfg_if::cfg_if! {
    if #[cfg(feature = "tls")] {
        mod tls;

        use std::sync::Arc;
        pub use tls::{TlsStream, load_server_config};
    }
}

/// Accepted socket, optionally under tls.
pub enum Transport {
    Plain(TcpStream),
    #[cfg(feature = "tls")]
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    /// The underlying socket, used for readiness registration.
    pub fn socket_mut(&mut self) -> &mut TcpStream {
        match self {
            Transport::Plain(s) => s,
            #[cfg(feature = "tls")]
            Transport::Tls(s) => s.get_mut(),
        }
    }

    #[inline]
    pub fn is_tls(&self) -> bool { !matches!(self, Transport::Plain(_)) }

    /// Close both directions, errors are ignored.
    pub fn shutdown(&mut self) {
        match self {
            Transport::Plain(s) => {
                let _ = s.shutdown(Shutdown::Both);
            }
            #[cfg(feature = "tls")]
            Transport::Tls(s) => {
                s.send_close_notify();
                let _ = s.get_ref().shutdown(Shutdown::Both);
            }
        }
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Plain(s) => s.read(buf),
            #[cfg(feature = "tls")]
            Transport::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Plain(s) => s.write(buf),
            #[cfg(feature = "tls")]
            Transport::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Plain(s) => s.flush(),
            #[cfg(feature = "tls")]
            Transport::Tls(s) => s.flush(),
        }
    }
}

/// Wraps accepted sockets according to the settings.
#[derive(Clone, Default)]
pub struct Acceptor {
    #[cfg(feature = "tls")]
    tls: Option<Arc<rustls::ServerConfig>>,
}

impl Acceptor {
    /// Load tls material if configured.
    pub fn from_settings(settings: &Settings) -> Result<Self, Error> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "tls")] {
                let tls = match settings.tls_paths() {
                    Some((cert, key)) => Some(load_server_config(cert, key)?),
                    None => None,
                };
                Ok(Self { tls })
            } else {
                match settings.tls_paths() {
                    Some(_) => Err(crate::error::ConfigError::TlsUnsupported.into()),
                    None => Ok(Self {}),
                }
            }
        }
    }

    #[inline]
    pub fn is_tls(&self) -> bool {
        cfg_if::cfg_if! {
            if #[cfg(feature = "tls")] {
                self.tls.is_some()
            } else {
                false
            }
        }
    }

    /// Wrap a freshly accepted socket.
    pub fn wrap(&self, sock: TcpStream) -> Result<Transport, Error> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "tls")] {
                match &self.tls {
                    Some(config) => {
                        let stream = TlsStream::new(sock, Arc::clone(config))?;
                        Ok(Transport::Tls(Box::new(stream)))
                    }
                    None => Ok(Transport::Plain(sock)),
                }
            } else {
                Ok(Transport::Plain(sock))
            }
        }
    }
}
