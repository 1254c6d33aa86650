//! Per-device operations.
//!
//! A [`Device`] is a serial number plus the [`Connector`] it was found
//! through. It holds no connection: every operation opens a fresh one,
//! selects the device with `host:transport:<serial>` (or
//! `host:transport-any`), and only then issues its command.

use std::fmt;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use tracing::debug;

use crate::Result;
use crate::file::{DirectoryEntry, RemoteFileEntry};
use crate::filter::{CrLfReader, CrLfWriter};
use crate::transport::{Connector, Transport};

/// Mode given to files pushed from a local path.
pub const DEFAULT_MODE: u32 = 0o664;

/// Output of a legacy `shell:` command with `\r\n` collapsed to `\n`.
pub type ShellOutput = CrLfReader<BufReader<TcpStream>>;

/// Raw output of an `exec:` command.
pub type ExecOutput = BufReader<TcpStream>;

/// Connection state reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum DeviceState {
    /// Online and accepting commands.
    Device,
    /// Known to the server but not responding.
    Offline,
    /// Booted into recovery.
    Recovery,
    /// Booted into the bootloader.
    #[serde(rename = "bootloader")]
    BootLoader,
    /// Any state label this client does not know.
    #[default]
    Unknown,
}

impl DeviceState {
    /// Maps a server state label; unrecognized labels become `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "device" => Self::Device,
            "offline" => Self::Offline,
            "recovery" => Self::Recovery,
            "bootloader" => Self::BootLoader,
            _ => Self::Unknown,
        }
    }

    /// The server's label for this state.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Offline => "offline",
            Self::Recovery => "recovery",
            Self::BootLoader => "bootloader",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to one device, or to whichever single device is attached.
#[derive(Debug, Clone)]
pub struct Device {
    /// Serial number; `None` selects any device.
    serial: Option<String>,
    /// Server the device is reached through.
    connector: Connector,
}

impl Device {
    /// Handle for the device with `serial`.
    pub fn new(serial: impl Into<String>, connector: Connector) -> Self {
        Self {
            serial: Some(serial.into()),
            connector,
        }
    }

    /// Handle for whichever single device is attached.
    pub fn any(connector: Connector) -> Self {
        Self {
            serial: None,
            connector,
        }
    }

    /// Serial number, `None` for an "any device" handle.
    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    /// Queries the device's connection state.
    ///
    /// This is a host-scoped query, so no transport is selected first.
    pub fn state(&self) -> Result<DeviceState> {
        let mut transport = self.connector.connect()?;
        match &self.serial {
            Some(serial) => transport.send(&format!("host-serial:{serial}:get-state"))?,
            None => transport.send("host:get-state")?,
        }
        transport.verify_response()?;
        let state = DeviceState::from_label(&transport.read_string()?);
        transport.close()?;
        Ok(state)
    }

    /// Runs a command through the legacy `shell:` service.
    ///
    /// Returns the combined stdout/stderr with the pty's `\r\n` collapsed
    /// back to `\n`. Arguments are joined with spaces and must already be
    /// quoted for the device shell.
    pub fn execute_shell(&self, command: &str, args: &[&str]) -> Result<ShellOutput> {
        let mut transport = self.transport()?;
        transport.send(&format!("shell:{}", command_line(command, args)))?;
        transport.verify_response()?;
        Ok(CrLfReader::new(BufReader::new(transport.into_inner())))
    }

    /// Runs a `shell:` command and copies its filtered output to `output`.
    #[deprecated(note = "use `execute_shell` and copy the returned reader")]
    pub fn execute_shell_to(
        &self,
        output: &mut impl Write,
        command: &str,
        args: &[&str],
    ) -> Result<()> {
        let mut transport = self.transport()?;
        transport.send(&format!("shell:{}", command_line(command, args)))?;
        transport.verify_response()?;
        let mut stream = transport.into_inner();
        let mut filtered = CrLfWriter::new(output);
        io::copy(&mut stream, &mut filtered)?;
        filtered.finish()?;
        Ok(())
    }

    /// Runs a command through the `exec:` service.
    ///
    /// The output is passed through unmodified, so this is the right choice
    /// for binary output (e.g. `screencap -p`).
    pub fn execute(&self, command: &str, args: &[&str]) -> Result<ExecOutput> {
        let mut transport = self.transport()?;
        transport.send(&format!("exec:{}", command_line(command, args)))?;
        transport.verify_response()?;
        Ok(BufReader::new(transport.into_inner()))
    }

    /// Lists a remote directory.
    pub fn list(&self, remote_path: &str) -> Result<Vec<RemoteFileEntry>> {
        let mut sync = self.transport()?.start_sync()?;
        sync.send("LIST", remote_path)?;

        let mut entries = Vec::new();
        while let DirectoryEntry::Entry(entry) = sync.read_directory_entry()? {
            entries.push(entry.with_parent(remote_path));
        }
        sync.close()?;
        debug!(device = %self, remote_path, count = entries.len(), "listed");
        Ok(entries)
    }

    /// Uploads `source` to `remote_path` with the given mode and mtime.
    ///
    /// Returns the number of bytes sent.
    pub fn push(
        &self,
        source: &mut impl Read,
        last_modified: u32,
        mode: u32,
        remote_path: &str,
    ) -> Result<u64> {
        let mut sync = self.transport()?.start_sync()?;
        sync.send("SEND", &format!("{remote_path},{mode}"))?;
        let sent = sync.send_stream(source)?;
        sync.send_status("DONE", last_modified)?;
        sync.verify_status()?;
        sync.close()?;
        debug!(device = %self, remote_path, bytes = sent, "pushed");
        Ok(sent)
    }

    /// Uploads a local file, keeping its modification time.
    pub fn push_file(&self, local: impl AsRef<Path>, remote_path: &str) -> Result<u64> {
        let file = File::open(local)?;
        let last_modified = file
            .metadata()?
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX));
        self.push(
            &mut BufReader::new(file),
            last_modified,
            DEFAULT_MODE,
            remote_path,
        )
    }

    /// Downloads `remote_path` into `destination`.
    ///
    /// Returns the number of bytes received.
    pub fn pull(&self, remote_path: &str, destination: &mut impl Write) -> Result<u64> {
        let mut sync = self.transport()?.start_sync()?;
        sync.send("RECV", remote_path)?;
        let received = sync.read_chunks_to(destination)?;
        sync.close()?;
        debug!(device = %self, remote_path, bytes = received, "pulled");
        Ok(received)
    }

    /// Downloads `remote_path` into a local file, creating or truncating it.
    pub fn pull_file(&self, remote_path: &str, local: impl AsRef<Path>) -> Result<u64> {
        let mut file = BufWriter::new(File::create(local)?);
        let received = self.pull(remote_path, &mut file)?;
        file.flush()?;
        Ok(received)
    }

    /// Opens a connection routed to this device.
    fn transport(&self) -> Result<Transport> {
        let mut transport = self.connector.connect()?;
        match &self.serial {
            Some(serial) => transport.send(&format!("host:transport:{serial}"))?,
            None => transport.send("host:transport-any")?,
        }
        transport.verify_response()?;
        Ok(transport)
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.serial == other.serial
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.serial.hash(state);
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.serial {
            Some(serial) => write!(f, "device {serial}"),
            None => f.write_str("any device"),
        }
    }
}

/// Joins a command and its pre-quoted arguments with single spaces.
fn command_line(command: &str, args: &[&str]) -> String {
    let mut line = String::from(command);
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}
