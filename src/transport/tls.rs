//! Tls over a non-blocking socket.

use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::Arc;

use rustls::{ServerConfig, ServerConnection};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::error::{ConfigError, Error};

/// Build a server config from a PEM certificate chain and a PEM private key.
pub fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>, Error> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(Arc::new(config))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, Error> {
    let mut reader = BufReader::new(File::open(path)?);
    let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;

    if certs.is_empty() {
        return Err(ConfigError::NoCertificate(path.to_path_buf()).into());
    }

    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, Error> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?
        .ok_or_else(|| ConfigError::NoPrivateKey(path.to_path_buf()).into())
}

/// Server side tls stream.
///
/// Reads and writes plaintext. Ciphertext the socket can not take yet
/// stays inside the session, and is pushed out by [`flush`](Write::flush).
pub struct TlsStream<S> {
    sock: S,
    conn: ServerConnection,
}

impl<S> TlsStream<S> {
    #[inline]
    pub fn get_ref(&self) -> &S { &self.sock }

    #[inline]
    pub fn get_mut(&mut self) -> &mut S { &mut self.sock }
}

impl<S: Read + Write> TlsStream<S> {
    /// Start a server session over an accepted socket.
    pub fn new(sock: S, config: Arc<ServerConfig>) -> Result<Self, Error> {
        let mut conn = ServerConnection::new(config)?;
        // frames are queued whole, never refuse plaintext
        conn.set_buffer_limit(None);
        Ok(Self { sock, conn })
    }

    fn write_tls(&mut self) -> io::Result<()> {
        while self.conn.wants_write() {
            if self.conn.write_tls(&mut self.sock)? == 0 {
                return Err(ErrorKind::WriteZero.into());
            }
        }
        Ok(())
    }

    /// Queue a close_notify alert and try to send it.
    pub fn send_close_notify(&mut self) {
        self.conn.send_close_notify();
        let _ = self.write_tls();
    }
}

impl<S: Read + Write> Read for TlsStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.conn.reader().read(buf) {
                // Ok(0) after close_notify
                Ok(n) => return Ok(n),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }

            // no plaintext yet, pull more records
            if self.conn.read_tls(&mut self.sock)? == 0 {
                return Ok(0);
            }

            if let Err(e) = self.conn.process_new_packets() {
                // best effort to deliver the alert
                let _ = self.write_tls();
                return Err(io::Error::new(ErrorKind::InvalidData, e));
            }

            // handshake messages
            match self.write_tls() {
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
                x => x?,
            }
        }
    }
}

impl<S: Read + Write> Write for TlsStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.conn.writer().write(buf)?;
        match self.write_tls() {
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
            x => x?,
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.conn.writer().flush()?;
        self.write_tls()
    }
}
