use thiserror::Error;

/// A single proxy's failure inside an authentication fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    /// The proxy's `host:port` name.
    pub name: String,
    /// The error the proxy reported.
    pub message: String,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("topology was destroyed")]
    TopologyDestroyed,

    #[error("no mongos proxy available")]
    NoProxyAvailable,

    #[error("auth provider {0} does not exist")]
    AuthProviderMissing(String),

    #[error("authentication or logout already in process")]
    AuthInProgress,

    #[error("authentication fail")]
    AuthFailed { failures: Vec<AuthFailure> },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid seed list: {0}")]
    InvalidSeedList(String),
}

pub type Result<T> = std::result::Result<T, Error>;
