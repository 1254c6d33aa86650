//! Host-level commands that attach or detach a device reachable over TCP.
//!
//! Both exchanges answer with a transport-level `OKAY` followed by a
//! human-readable status line. Each command accepts two status prefixes
//! as success, so repeating a connect or disconnect is not an error.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::debug;

use crate::transport::{Stream, Transport};
use crate::{Error, Result};

/// `host:port` of a device listening for ADB over TCP.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TcpAddress {
    /// Host name or IP address.
    host: String,
    /// TCP port.
    port: u16,
}

impl TcpAddress {
    /// Creates an address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or IP address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for TcpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for TcpAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidArgument(format!("{s:?} is not host:port")))?;
        if host.is_empty() {
            return Err(Error::InvalidArgument(format!("{s:?} has no host")));
        }
        let port = port
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("{s:?} has an invalid port")))?;
        Ok(Self::new(host, port))
    }
}

/// A host command whose reply is a status line with two success prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCommand {
    /// Verb placed after `host:`.
    verb: &'static str,
    /// Status prefixes treated as success.
    accepted: [&'static str; 2],
}

impl HostCommand {
    /// `host:connect:<host>:<port>`.
    pub const CONNECT: Self = Self {
        verb: "connect",
        accepted: ["connected to", "already connected to"],
    };

    /// `host:disconnect:<host>:<port>`.
    pub const DISCONNECT: Self = Self {
        verb: "disconnect",
        accepted: ["disconnected", "error: no such device"],
    };

    /// Builds a command from a verb and its two accepted status prefixes.
    pub const fn new(verb: &'static str, accepted: [&'static str; 2]) -> Self {
        Self { verb, accepted }
    }

    /// Runs the exchange on `transport` and returns `address` on success.
    ///
    /// A status line matching neither accepted prefix becomes
    /// [`Error::RemoteConnection`] with the text after its last colon.
    pub fn execute<S: Stream>(
        &self,
        transport: &mut Transport<S>,
        address: &TcpAddress,
    ) -> Result<TcpAddress> {
        transport.send(&format!("host:{}:{address}", self.verb))?;
        transport.verify_response()?;
        let status = transport.read_string()?;
        debug!(verb = self.verb, %address, status = %status, "host command status");
        self.validate(&status)?;
        Ok(address.clone())
    }

    /// Checks a status line against the accepted prefixes.
    fn validate(&self, status: &str) -> Result<()> {
        if self.accepted.iter().any(|p| status.starts_with(p)) {
            Ok(())
        } else {
            Err(Error::RemoteConnection(extract_error(status).to_owned()))
        }
    }
}

/// Text after the last colon, or the whole line when there is none.
fn extract_error(status: &str) -> &str {
    status.rsplit_once(':').map_or(status, |(_, tail)| tail)
}
