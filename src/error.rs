//! Error types for noop-smtp

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::codec::Charset;
use crate::tls::StoreRole;

/// A line that cannot be represented in the listener's charset.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid {charset} data at byte {position}")]
pub struct CharsetError {
    pub charset: Charset,
    pub position: usize,
}

/// TLS configuration failures. All of them are detected before any
/// endpoint accepts a connection.
#[derive(Error, Debug)]
pub enum TlsError {
    #[error("protocol must be specified if provider is specified")]
    ProviderRequiresProtocol,

    #[error("unsupported TLS protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("unknown security provider: {0}")]
    UnknownProvider(String),

    #[error("unsupported {kind} algorithm: {name}")]
    UnsupportedAlgorithm { kind: &'static str, name: String },

    #[error("unsupported store type: {0}")]
    UnsupportedStoreType(String),

    #[error("no {0} file configured")]
    MissingStore(StoreRole),

    #[error("failed to read {role} {}: {source}", path.display())]
    Io {
        role: StoreRole,
        path: PathBuf,
        source: io::Error,
    },

    #[error("invalid {role} {}: {reason}", path.display())]
    Store {
        role: StoreRole,
        path: PathBuf,
        reason: String,
    },

    #[error("TLS configuration rejected: {0}")]
    Config(#[from] rustls::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to bind {endpoint} endpoint to {address}: {source}")]
    Bind {
        endpoint: &'static str,
        address: String,
        source: io::Error,
    },

    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),
}

pub type Result<T> = std::result::Result<T, Error>;
