use std::fmt::{Display, Formatter};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    // only one of cert / key is set
    TlsPathsIncomplete,

    // built without the `tls` feature
    TlsUnsupported,

    NoCertificate(PathBuf),

    NoPrivateKey(PathBuf),

    ZeroDuration(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use ConfigError::*;
        match self {
            TlsPathsIncomplete => {
                write!(f, "Tls certificate and private key must be set together")
            }
            TlsUnsupported => write!(f, "Tls requested but the `tls` feature is disabled"),
            NoCertificate(p) => write!(f, "No certificate found in {}", p.display()),
            NoPrivateKey(p) => write!(f, "No private key found in {}", p.display()),
            ZeroDuration(name) => write!(f, "{} must be greater than zero", name),
        }
    }
}

// use default impl
impl std::error::Error for ConfigError {}
