//! Server-scoped entry point.
//!
//! A [`Client`] talks to the ADB server itself: version, attached devices,
//! remote TCP devices, and device tracking. Each call opens and closes its
//! own connection.

use tracing::debug;

use crate::device::Device;
use crate::host::{HostCommand, TcpAddress};
use crate::transport::{Connector, Transport};
use crate::watcher::{DeviceListener, DeviceWatcher};
use crate::Result;

/// Client for an ADB server.
#[derive(Debug, Clone, Default)]
pub struct Client {
    /// Server address; shared with every device handle handed out.
    connector: Connector,
}

impl Client {
    /// Creates a client for the server behind `connector`.
    pub const fn new(connector: Connector) -> Self {
        Self { connector }
    }

    /// Creates a client configured from the environment.
    pub fn from_env() -> Result<Self> {
        Connector::from_env().map(Self::new)
    }

    /// The server address.
    pub const fn connector(&self) -> &Connector {
        &self.connector
    }

    /// Returns the server's protocol version, as sent (4 hex digits).
    pub fn host_version(&self) -> Result<String> {
        self.with_transport(|t| {
            t.send("host:version")?;
            t.verify_response()?;
            t.read_string()
        })
    }

    /// Lists the devices currently attached to the server.
    pub fn devices(&self) -> Result<Vec<Device>> {
        let body = self.with_transport(|t| {
            t.send("host:devices")?;
            t.verify_response()?;
            t.read_string()
        })?;
        Ok(parse_devices(&body, &self.connector))
    }

    /// Asks the server to attach the device listening at `address`.
    ///
    /// Already being connected counts as success.
    pub fn connect_to_tcp_device(&self, address: &TcpAddress) -> Result<TcpAddress> {
        self.with_transport(|t| HostCommand::CONNECT.execute(t, address))
    }

    /// Asks the server to detach the device at `address`.
    ///
    /// An unknown device counts as success.
    pub fn disconnect_from_tcp_device(&self, address: &TcpAddress) -> Result<TcpAddress> {
        self.with_transport(|t| HostCommand::DISCONNECT.execute(t, address))
    }

    /// Starts tracking device changes on a background thread.
    ///
    /// The connection stays open and is owned by the returned watcher.
    pub fn create_device_watcher(&self, listener: impl DeviceListener) -> Result<DeviceWatcher> {
        let mut transport = self.connector.connect()?;
        transport.send("host:track-devices")?;
        transport.verify_response()?;
        DeviceWatcher::start(transport, self.connector.clone(), listener)
    }

    /// Handle for whichever single device is attached.
    pub fn any_device(&self) -> Device {
        Device::any(self.connector.clone())
    }

    /// Handle for the device with `serial`, without asking the server.
    pub fn device(&self, serial: impl Into<String>) -> Device {
        Device::new(serial, self.connector.clone())
    }

    /// Runs `f` on a fresh connection and closes it, even on failure.
    fn with_transport<T>(&self, f: impl FnOnce(&mut Transport) -> Result<T>) -> Result<T> {
        let mut transport = self.connector.connect()?;
        let result = f(&mut transport);
        let closed = transport.close();
        let value = result?;
        closed?;
        Ok(value)
    }
}

/// Parses a `host:devices` / `host:track-devices` body.
///
/// Each line is `<serial>\t<state>`; lines with fewer than two
/// tab-separated fields are skipped.
pub(crate) fn parse_devices(body: &str, connector: &Connector) -> Vec<Device> {
    let devices: Vec<Device> = body
        .lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let serial = fields.next()?;
            fields.next()?;
            Some(Device::new(serial, connector.clone()))
        })
        .collect();
    debug!(count = devices.len(), "parsed device list");
    devices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serials(body: &str) -> Vec<String> {
        parse_devices(body, &Connector::default())
            .iter()
            .filter_map(|d| d.serial().map(str::to_owned))
            .collect()
    }

    #[test]
    fn parses_one_device() {
        assert_eq!(serials("emulator-5554\tdevice\n"), ["emulator-5554"]);
    }

    #[test]
    fn parses_several_devices_in_order() {
        assert_eq!(
            serials("R58M123\tdevice\nemulator-5556\toffline\n192.168.1.7:5555\tunauthorized\n"),
            ["R58M123", "emulator-5556", "192.168.1.7:5555"]
        );
    }

    #[test]
    fn blank_body_has_no_devices() {
        assert!(serials("").is_empty());
        assert!(serials("\n\n").is_empty());
    }

    #[test]
    fn skips_lines_without_a_tab() {
        assert_eq!(
            serials("* daemon started *\nabc\tdevice\nlonely\n"),
            ["abc"]
        );
    }

    #[test]
    fn tolerates_crlf_and_missing_newline() {
        assert_eq!(serials("a\tdevice\r\nb\trecovery"), ["a", "b"]);
    }
}
