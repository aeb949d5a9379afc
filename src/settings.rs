//! Server configuration.
//!
//! [`Settings`] is built once, validated by [`Server::start`](crate::server::Server::start)
//! and owned by the server for its whole life.
//!
//! ```ignore
//! let settings = Settings::new()
//!     .port(6363)
//!     .bind_loopback_only(true)
//!     .on_new_client(|_server, client| {
//!         client.set_on_data(|handle, data, _is_binary| {
//!             let _ = handle.send_binary(data);
//!         });
//!     });
//! ```

use std::fmt::{Debug, Formatter};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connection::Client;
use crate::error::ConfigError;
use crate::server::ServerHandle;

/// 6363
pub const DEFAULT_PORT: u16 = 6363;

/// 20s
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(20);

/// 7s
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(7);

/// 50ms
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Called on the server thread once a client completes the upgrade.
pub type NewClientCallback = Box<dyn FnMut(&ServerHandle, &mut Client) + Send>;

/// Server settings.
pub struct Settings {
    /// Listening port, `0` picks an ephemeral one.
    pub port: u16,
    /// Listen on `127.0.0.1` instead of `0.0.0.0`.
    pub bind_loopback_only: bool,
    /// A connection silent for longer than this is dropped.
    pub idle_timeout: Duration,
    /// Interval between two pings sent to an open connection.
    pub ping_interval: Duration,
    /// Upper bound of one readiness wait.
    pub poll_interval: Duration,
    /// PEM certificate chain, enables tls together with `tls_key_path`.
    pub tls_cert_path: Option<PathBuf>,
    /// PEM private key.
    pub tls_key_path: Option<PathBuf>,
    /// Largest payload a client frame may declare, unlimited if `None`.
    pub max_frame_size: Option<u64>,
    /// Reject unmasked client frames and malformed control frames.
    pub strict: bool,
    pub(crate) on_new_client: Option<NewClientCallback>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_loopback_only: false,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            tls_cert_path: None,
            tls_key_path: None,
            max_frame_size: None,
            strict: false,
            on_new_client: None,
        }
    }
}

impl Debug for Settings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("port", &self.port)
            .field("bind_loopback_only", &self.bind_loopback_only)
            .field("idle_timeout", &self.idle_timeout)
            .field("ping_interval", &self.ping_interval)
            .field("poll_interval", &self.poll_interval)
            .field("tls_cert_path", &self.tls_cert_path)
            .field("tls_key_path", &self.tls_key_path)
            .field("max_frame_size", &self.max_frame_size)
            .field("strict", &self.strict)
            .field("on_new_client", &self.on_new_client.is_some())
            .finish()
    }
}

impl Settings {
    /// Default settings.
    pub fn new() -> Self { Self::default() }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn bind_loopback_only(mut self, yes: bool) -> Self {
        self.bind_loopback_only = yes;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Serve over tls with the given PEM files.
    pub fn tls(mut self, cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Self {
        self.tls_cert_path = Some(cert_path.as_ref().to_path_buf());
        self.tls_key_path = Some(key_path.as_ref().to_path_buf());
        self
    }

    pub fn max_frame_size(mut self, size: u64) -> Self {
        self.max_frame_size = Some(size);
        self
    }

    pub fn strict(mut self, yes: bool) -> Self {
        self.strict = yes;
        self
    }

    /// Register the callback fired for every upgraded client.
    pub fn on_new_client<F>(mut self, f: F) -> Self
    where
        F: FnMut(&ServerHandle, &mut Client) + Send + 'static,
    {
        self.on_new_client = Some(Box::new(f));
        self
    }

    /// Address the listener binds to.
    pub fn bind_addr(&self) -> SocketAddr {
        let ip = if self.bind_loopback_only {
            Ipv4Addr::LOCALHOST
        } else {
            Ipv4Addr::UNSPECIFIED
        };
        SocketAddr::from((ip, self.port))
    }

    /// Both tls paths, if tls is configured.
    pub fn tls_paths(&self) -> Option<(&Path, &Path)> {
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }

    /// Check the settings before the server starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            return Err(ConfigError::TlsPathsIncomplete);
        }

        if cfg!(not(feature = "tls")) && self.tls_paths().is_some() {
            return Err(ConfigError::TlsUnsupported);
        }

        for (name, d) in [
            ("idle_timeout", self.idle_timeout),
            ("ping_interval", self.ping_interval),
            ("poll_interval", self.poll_interval),
        ] {
            if d.is_zero() {
                return Err(ConfigError::ZeroDuration(name));
            }
        }

        Ok(())
    }
}
