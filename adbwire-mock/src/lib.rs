//! In-process fake ADB server.
//!
//! [`MockServer`] listens on an ephemeral loopback port and answers the
//! host protocol from an in-memory model: a list of [`MockDevice`]s, each
//! with a small file tree and canned command output. It records every
//! command it receives so tests can assert on the exact wire traffic.
//!
//! ```no_run
//! use adbwire_mock::{MockDevice, MockServer};
//!
//! let server = MockServer::start().unwrap();
//! server.add_device(MockDevice::new("emulator-5554", "device"));
//! // connect a client to 127.0.0.1:{server.port()} ...
//! ```

#![allow(clippy::missing_docs_in_private_items)]

mod session;
mod sync;

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::debug;

/// Protocol version reported by `host:version` unless overridden.
pub const DEFAULT_VERSION: u32 = 0x29;

/// A file stored on a [`MockDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct MockFile {
    /// Mode bits as sent with `SEND` (type bits added on listing).
    pub mode: u32,
    /// Modification time in seconds.
    pub mtime: u32,
    /// Content.
    pub data: Vec<u8>,
}

/// A device attached to the mock server.
#[derive(Debug, Clone)]
pub struct MockDevice {
    serial: String,
    state: String,
    files: BTreeMap<String, MockFile>,
    dirs: BTreeSet<String>,
    read_only: Vec<String>,
    output: BTreeMap<String, Vec<u8>>,
}

impl MockDevice {
    /// A device with the given serial and state label (e.g. `"device"`).
    pub fn new(serial: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            state: state.into(),
            files: BTreeMap::new(),
            dirs: BTreeSet::new(),
            read_only: Vec::new(),
            output: BTreeMap::new(),
        }
    }

    /// Adds a file.
    #[must_use]
    pub fn with_file(mut self, path: &str, mode: u32, mtime: u32, data: &[u8]) -> Self {
        self.files.insert(
            path.to_owned(),
            MockFile {
                mode,
                mtime,
                data: data.to_vec(),
            },
        );
        self
    }

    /// Adds an (empty) directory so it shows up in listings.
    #[must_use]
    pub fn with_dir(mut self, path: &str) -> Self {
        self.dirs.insert(path.to_owned());
        self
    }

    /// Rejects uploads to paths under `prefix`.
    #[must_use]
    pub fn read_only(mut self, prefix: &str) -> Self {
        self.read_only.push(prefix.to_owned());
        self
    }

    /// Output produced by `shell:`/`exec:` for an exact command line.
    #[must_use]
    pub fn with_output(mut self, command_line: &str, output: &[u8]) -> Self {
        self.output.insert(command_line.to_owned(), output.to_vec());
        self
    }

    /// Serial number.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// State label.
    pub fn state(&self) -> &str {
        &self.state
    }

    pub(crate) fn output_for(&self, command_line: &str) -> Vec<u8> {
        self.output.get(command_line).cloned().unwrap_or_else(|| {
            let program = command_line.split(' ').next().unwrap_or_default();
            format!("/system/bin/sh: {program}: not found\n").into_bytes()
        })
    }

    pub(crate) fn is_read_only(&self, path: &str) -> bool {
        self.read_only.iter().any(|p| path.starts_with(p.as_str()))
    }
}

#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) version: u32,
    pub(crate) devices: Vec<MockDevice>,
    pub(crate) commands: Vec<String>,
    pub(crate) tcp_devices: BTreeSet<String>,
    pub(crate) refused: BTreeMap<String, String>,
    /// Bumped on every device-list change; wakes trackers.
    pub(crate) generation: u64,
}

impl State {
    pub(crate) fn device(&self, serial: &str) -> Option<&MockDevice> {
        self.devices.iter().find(|d| d.serial == serial)
    }

    pub(crate) fn device_mut(&mut self, serial: &str) -> Option<&mut MockDevice> {
        self.devices.iter_mut().find(|d| d.serial == serial)
    }

    /// Body of a `host:devices` reply.
    pub(crate) fn device_list(&self) -> String {
        self.devices
            .iter()
            .map(|d| format!("{}\t{}\n", d.serial, d.state))
            .collect()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Shared {
    state: Mutex<State>,
    pub(crate) changed: Condvar,
    pub(crate) stopping: AtomicBool,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate_devices(&self, f: impl FnOnce(&mut State)) {
        let mut state = self.lock();
        f(&mut state);
        state.generation += 1;
        drop(state);
        self.changed.notify_all();
    }
}

/// A fake ADB server running on background threads.
///
/// Dropping it stops accepting connections and ends any tracking sessions.
#[derive(Debug)]
pub struct MockServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    accept: Option<JoinHandle<()>>,
}

impl MockServer {
    /// Binds `127.0.0.1:0` and starts accepting connections.
    pub fn start() -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared::default());
        shared.lock().version = DEFAULT_VERSION;

        let accept_shared = Arc::clone(&shared);
        let accept = thread::Builder::new()
            .name("mock-adb-accept".into())
            .spawn(move || accept_loop(&listener, &accept_shared))?;
        debug!(%addr, "mock server listening");
        Ok(Self {
            addr,
            shared,
            accept: Some(accept),
        })
    }

    /// Listening address.
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Listening port.
    pub const fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Overrides the version reported by `host:version`.
    pub fn set_version(&self, version: u32) {
        self.shared.lock().version = version;
    }

    /// Attaches a device, notifying trackers.
    pub fn add_device(&self, device: MockDevice) {
        self.shared.mutate_devices(|s| s.devices.push(device));
    }

    /// Detaches a device, notifying trackers.
    pub fn remove_device(&self, serial: &str) {
        self.shared
            .mutate_devices(|s| s.devices.retain(|d| d.serial != serial));
    }

    /// Changes a device's state label, notifying trackers.
    pub fn set_state(&self, serial: &str, state: &str) {
        self.shared.mutate_devices(|s| {
            if let Some(d) = s.device_mut(serial) {
                state.clone_into(&mut d.state);
            }
        });
    }

    /// Makes `host:connect` to `address` fail with `reason`.
    pub fn refuse(&self, address: &str, reason: &str) {
        self.shared
            .lock()
            .refused
            .insert(address.to_owned(), reason.to_owned());
    }

    /// A file as currently stored on a device.
    pub fn file(&self, serial: &str, path: &str) -> Option<MockFile> {
        self.shared
            .lock()
            .device(serial)
            .and_then(|d| d.files.get(path).cloned())
    }

    /// Every command received so far, in arrival order.
    pub fn commands(&self) -> Vec<String> {
        self.shared.lock().commands.clone()
    }

    /// Addresses currently attached with `host:connect`.
    pub fn tcp_devices(&self) -> Vec<String> {
        self.shared.lock().tcp_devices.iter().cloned().collect()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shared.stopping.store(true, Ordering::SeqCst);
        self.shared.changed.notify_all();
        // Wake the blocking accept.
        let _ = TcpStream::connect(self.addr);
        if let Some(accept) = self.accept.take() {
            let _ = accept.join();
        }
    }
}

fn accept_loop(listener: &TcpListener, shared: &Arc<Shared>) {
    for stream in listener.incoming() {
        if shared.stopping.load(Ordering::SeqCst) {
            return;
        }
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                debug!("accept failed: {e}");
                continue;
            }
        };
        let shared = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name("mock-adb-session".into())
            .spawn(move || {
                if let Err(e) = session::run(stream, &shared) {
                    debug!("session ended: {e}");
                }
            });
        if let Err(e) = spawned {
            debug!("failed to spawn session: {e}");
        }
    }
}
