#![allow(missing_docs)]
//! Errors

mod frame;
mod config;
mod handshake;

pub use frame::FrameError;
pub use config::ConfigError;
pub use handshake::HandshakeError;

use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum Error {
    Frame(FrameError),

    Handshake(HandshakeError),

    Config(ConfigError),

    #[cfg(feature = "tls")]
    Tls(rustls::Error),

    Io(std::io::Error),

    // the connection has been torn down
    Closed,
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self { Error::Frame(e) }
}

impl From<HandshakeError> for Error {
    fn from(e: HandshakeError) -> Self { Error::Handshake(e) }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self { Error::Config(e) }
}

#[cfg(feature = "tls")]
impl From<rustls::Error> for Error {
    fn from(e: rustls::Error) -> Self { Error::Tls(e) }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error { Error::Io(e) }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use Error::*;
        match self {
            Frame(e) => write!(f, "Frame error: {}", e),
            Handshake(e) => write!(f, "Handshake error: {}", e),
            Config(e) => write!(f, "Config error: {}", e),
            #[cfg(feature = "tls")]
            Tls(e) => write!(f, "Tls error: {}", e),
            Io(e) => write!(f, "Io error: {}", e),
            Closed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use Error::*;

        match self {
            Frame(e) => Some(e),
            Handshake(e) => Some(e),
            Config(e) => Some(e),
            #[cfg(feature = "tls")]
            Tls(e) => Some(e),
            Io(e) => Some(e),
            Closed => None,
        }
    }
}
