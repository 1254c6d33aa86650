//! Host connection channel: command framing and `OKAY`/`FAIL` handling.
//!
//! A [`Transport`] wraps one connection to the ADB server. Every request
//! opens its own transport through a [`Connector`]; nothing is pooled.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::{env, fmt};

use adbwire_proto::{DEFAULT_HOST, DEFAULT_PORT, FAIL, MAX_HEX_LEN, OKAY};
use tracing::debug;

use crate::sync::SyncTransport;
use crate::{Error, Result};

/// Environment variable overriding the server host.
pub const ENV_SERVER_ADDRESS: &str = "ANDROID_ADB_SERVER_ADDRESS";
/// Environment variable overriding the server port.
pub const ENV_SERVER_PORT: &str = "ANDROID_ADB_SERVER_PORT";

/// A bidirectional byte stream that can be shut down from a shared reference.
pub trait Stream: Read + Write {
    /// Shuts down both directions of the stream.
    fn shutdown(&self) -> io::Result<()>;
}

impl Stream for TcpStream {
    fn shutdown(&self) -> io::Result<()> {
        Self::shutdown(self, Shutdown::Both)
    }
}

/// Address of an ADB server; opens a fresh [`Transport`] per call.
///
/// Immutable and cheap to clone, so it can be shared between threads and
/// device handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Connector {
    /// Server host name or IP address.
    host: String,
    /// Server TCP port.
    port: u16,
}

impl Connector {
    /// Creates a connector for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Creates a connector from `ANDROID_ADB_SERVER_ADDRESS` and
    /// `ANDROID_ADB_SERVER_PORT`, falling back to `localhost:5037`.
    pub fn from_env() -> Result<Self> {
        let host = env::var(ENV_SERVER_ADDRESS).unwrap_or_else(|_| DEFAULT_HOST.to_owned());
        let port = match env::var(ENV_SERVER_PORT) {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                Error::InvalidArgument(format!("{ENV_SERVER_PORT}={raw} is not a port"))
            })?,
            Err(_) => DEFAULT_PORT,
        };
        Ok(Self::new(host, port))
    }

    /// Server host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Server port.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Opens a new connection to the server.
    pub fn connect(&self) -> Result<Transport> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))?;
        debug!(server = %self, "connected");
        Ok(Transport::new(stream))
    }
}

impl Default for Connector {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One connection to the ADB server.
///
/// Requests are strictly sequential: a command is fully written before its
/// response is read.
#[derive(Debug)]
pub struct Transport<S = TcpStream> {
    /// The underlying connection.
    stream: S,
}

impl<S: Stream> Transport<S> {
    /// Wraps an already-connected stream.
    pub const fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Sends a hex-length-prefixed command.
    pub fn send(&mut self, command: &str) -> Result<()> {
        if command.len() > MAX_HEX_LEN {
            return Err(Error::InvalidArgument(format!(
                "command of {} bytes exceeds {MAX_HEX_LEN}",
                command.len()
            )));
        }
        debug!(command, "send");
        adbwire_proto::write_hex_string(&mut self.stream, command)?;
        Ok(())
    }

    /// Reads a 4-byte status and fails unless it is `OKAY`.
    ///
    /// On `FAIL` the server's message is returned as [`Error::Protocol`].
    /// Any other code yields [`Error::UnknownResponse`] without consuming
    /// further bytes.
    pub fn verify_response(&mut self) -> Result<()> {
        let status = adbwire_proto::read_id(&mut self.stream)?;
        match status {
            OKAY => Ok(()),
            FAIL => Err(Error::Protocol(self.read_string()?)),
            other => Err(Error::UnknownResponse(adbwire_proto::id_to_string(&other))),
        }
    }

    /// Reads a hex-length-prefixed response body.
    pub fn read_string(&mut self) -> Result<String> {
        Ok(adbwire_proto::read_hex_string(&mut self.stream)?)
    }

    /// Reads exactly `len` bytes as text, with no length prefix.
    pub fn read_string_exact(&mut self, len: usize) -> Result<String> {
        Ok(adbwire_proto::read_string_exact(&mut self.stream, len)?)
    }

    /// Switches the connection into the sync sub-protocol.
    pub fn start_sync(mut self) -> Result<SyncTransport<S>> {
        self.send("sync:")?;
        self.verify_response()?;
        Ok(SyncTransport::new(self))
    }

    /// Shuts the connection down in both directions.
    pub fn close(self) -> Result<()> {
        match self.stream.shutdown() {
            // The server may already have hung up.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => Ok(other?),
        }
    }

    /// Returns the raw stream, e.g. to read the remainder of a shell session.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Mutable access to the raw stream for sync framing.
    pub(crate) fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::Duplex;

    #[test]
    fn send_writes_hex_prefixed_command() {
        let mut t = Transport::new(Duplex::default());
        t.send("host:devices").unwrap();
        t.send("host:transport:emulator-5554").unwrap();
        assert_eq!(
            t.into_inner().written(),
            b"000chost:devices001chost:transport:emulator-5554"
        );
    }

    #[test]
    fn send_counts_bytes_not_chars() {
        let mut t = Transport::new(Duplex::default());
        t.send("shell:echo é").unwrap();
        assert_eq!(&t.into_inner().written()[..4], b"000d");
    }

    #[test]
    fn oversized_command_is_rejected_before_writing() {
        let mut t = Transport::new(Duplex::default());
        let err = t.send(&"a".repeat(0x1_0000)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(t.into_inner().written().is_empty());
    }

    #[test]
    fn verify_response_accepts_okay() {
        let mut t = Transport::new(Duplex::with_input(b"OKAY"));
        t.verify_response().unwrap();
    }

    #[test]
    fn verify_response_reports_fail_message() {
        let mut t = Transport::new(Duplex::with_input(b"FAIL0004boom"));
        match t.verify_response() {
            Err(Error::Protocol(msg)) => assert_eq!(msg, "boom"),
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[test]
    fn verify_response_names_unknown_code() {
        let mut t = Transport::new(Duplex::with_input(b"WHAT0004rest"));
        match t.verify_response() {
            Err(Error::UnknownResponse(code)) => assert_eq!(code, "WHAT"),
            other => panic!("expected unknown response, got {other:?}"),
        }
        // Nothing past the status was consumed.
        assert_eq!(t.read_string().unwrap(), "rest");
    }

    #[test]
    fn verify_response_on_eof_is_io_error() {
        let mut t = Transport::new(Duplex::with_input(b"OK"));
        assert!(matches!(t.verify_response(), Err(Error::Io(_))));
    }

    #[test]
    fn read_string_variants() {
        let mut t = Transport::new(Duplex::with_input(b"00050029xOKAY"));
        assert_eq!(t.read_string().unwrap(), "0029x");
        assert_eq!(t.read_string_exact(4).unwrap(), "OKAY");
    }

    #[test]
    fn start_sync_sends_handshake() {
        let t = Transport::new(Duplex::with_input(b"OKAY"));
        let sync = t.start_sync().unwrap();
        assert_eq!(sync.into_transport().into_inner().written(), b"0005sync:");
    }

    #[test]
    fn start_sync_propagates_fail() {
        let t = Transport::new(Duplex::with_input(b"FAIL0007offline"));
        assert!(matches!(t.start_sync(), Err(Error::Protocol(m)) if m == "offline"));
    }

    #[test]
    fn close_shuts_down_stream() {
        let t = Transport::new(Duplex::default());
        let shut = t.stream.shut_flag();
        t.close().unwrap();
        assert!(shut.get());
    }

    #[test]
    fn connector_display_and_default() {
        let c = Connector::default();
        assert_eq!(c.host(), "localhost");
        assert_eq!(c.port(), 5037);
        assert_eq!(Connector::new("10.0.2.2", 5038).to_string(), "10.0.2.2:5038");
    }
}
