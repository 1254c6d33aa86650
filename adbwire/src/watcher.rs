//! Background tracking of attached devices.
//!
//! After `host:track-devices` the server pushes a fresh device-list body
//! whenever the set of devices changes. A [`DeviceWatcher`] reads those
//! bodies on a dedicated thread and hands each parsed list to a
//! [`DeviceListener`].
//!
//! Stopping closes the connection under a lock; the read loop takes the
//! same lock before reporting a failure, so the I/O error caused by a
//! deliberate stop is never reported.

use std::io;
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::client::parse_devices;
use crate::device::Device;
use crate::transport::{Connector, Transport};
use crate::{Error, Result};

/// Receives events from a [`DeviceWatcher`] on its background thread.
pub trait DeviceListener: Send + 'static {
    /// Called with the full device list after every change.
    fn on_detect(&mut self, devices: Vec<Device>);

    /// Called once if tracking fails while the watcher is running.
    ///
    /// The watcher is stopped afterwards.
    fn on_exception(&mut self, error: Error);
}

/// Shared slot holding the tracking connection while running.
type Slot = Arc<Mutex<Option<TcpStream>>>;

/// Handle to a running device-tracking thread.
#[derive(Debug)]
pub struct DeviceWatcher {
    /// Close handle of the tracking connection; `None` once stopped.
    slot: Slot,
    /// The read-loop thread.
    thread: Option<JoinHandle<()>>,
}

impl DeviceWatcher {
    /// Spawns the read loop on a connection already in tracking mode.
    pub(crate) fn start(
        transport: Transport,
        connector: Connector,
        listener: impl DeviceListener,
    ) -> Result<Self> {
        let stream = transport.into_inner();
        let slot: Slot = Arc::new(Mutex::new(Some(stream.try_clone()?)));
        let loop_slot = Arc::clone(&slot);
        let thread = thread::Builder::new()
            .name("adb-device-watcher".into())
            .spawn(move || watch(Transport::new(stream), &loop_slot, &connector, listener))?;
        debug!("device watcher started");
        Ok(Self {
            slot,
            thread: Some(thread),
        })
    }

    /// Whether the tracking connection is still open.
    pub fn is_running(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Closes the tracking connection, ending the read loop.
    ///
    /// Safe to call from any thread, concurrently with the loop, and more
    /// than once.
    pub fn stop(&self) -> Result<()> {
        let mut slot = lock(&self.slot);
        if let Some(stream) = slot.take() {
            debug!("stopping device watcher");
            shutdown(&stream)?;
        }
        Ok(())
    }

    /// Waits for the read loop to finish.
    ///
    /// Blocks until [`Self::stop`] is called or tracking fails.
    pub fn join(mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| Error::Io(io::Error::other("device watcher thread panicked"))),
            None => Ok(()),
        }
    }
}

impl Drop for DeviceWatcher {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("failed to stop device watcher: {e}");
        }
    }
}

/// The read loop: one device list per server push until failure or stop.
fn watch(
    mut transport: Transport,
    slot: &Mutex<Option<TcpStream>>,
    connector: &Connector,
    mut listener: impl DeviceListener,
) {
    loop {
        match transport.read_string() {
            Ok(body) => listener.on_detect(parse_devices(&body, connector)),
            Err(err) => {
                // Same lock as `stop`: an empty slot means we were stopped.
                let was_running = lock(slot)
                    .take()
                    .map(|stream| {
                        let _ = shutdown(&stream);
                    })
                    .is_some();

                if was_running || !matches!(err, Error::Io(_)) {
                    warn!("device tracking failed: {err}");
                    listener.on_exception(err);
                } else {
                    debug!("device watcher stopped");
                }
                return;
            }
        }
    }
}

/// Locks the slot, ignoring poisoning: the slot is valid either way.
fn lock(slot: &Mutex<Option<TcpStream>>) -> MutexGuard<'_, Option<TcpStream>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shuts a stream down, treating an already-closed peer as success.
fn shutdown(stream: &TcpStream) -> io::Result<()> {
    match stream.shutdown(Shutdown::Both) {
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}
