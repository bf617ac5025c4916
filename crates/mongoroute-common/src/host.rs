use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A `host:port` endpoint of a mongos router.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Host {
    /// The hostname or IP address.
    pub host: String,
    /// The TCP port.
    pub port: u16,
}

impl Host {
    pub fn new(host: impl Into<String>, port: u16) -> Host {
        Host {
            host: host.into(),
            port,
        }
    }

    /// The canonical `host:port` name used to key proxy sets.
    pub fn name(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Host {
    type Err = Error;

    fn from_str(s: &str) -> Result<Host> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidSeedList(format!("missing port in '{}'", s)))?;
        if host.is_empty() {
            return Err(Error::InvalidSeedList(format!("missing host in '{}'", s)));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| Error::InvalidSeedList(format!("invalid port in '{}'", s)))?;
        Ok(Host::new(host, port))
    }
}
