//! Per-operation option types passed through the dispatcher to a proxy handle.

use bson::Document;

/// Where a read-path command may be serviced.
///
/// Every mongos is an interchangeable peer, so the topology manager passes the
/// preference through to the selected proxy unchanged; it never influences
/// proxy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPreference {
    #[default]
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

/// Options for a database command.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    pub read_preference: ReadPreference,
    /// Set on internal health probes so the proxy can route them over its
    /// monitoring connection.
    pub monitoring: bool,
}

impl CommandOptions {
    pub fn monitoring() -> CommandOptions {
        CommandOptions {
            monitoring: true,
            ..CommandOptions::default()
        }
    }
}

/// Options for insert/update/remove batches.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Stop at the first failing document when true.
    pub ordered: bool,
    pub write_concern: Option<Document>,
}

impl Default for WriteOptions {
    fn default() -> WriteOptions {
        WriteOptions {
            ordered: true,
            write_concern: None,
        }
    }
}

/// Credentials handed to a proxy's authentication handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Credentials {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }
}
