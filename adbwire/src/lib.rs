//! Blocking client for the Android Debug Bridge host protocol.
//!
//! `adbwire` speaks the protocol the `adb` server exposes on its TCP port:
//! hex-length-prefixed commands answered with `OKAY`/`FAIL`, device
//! selection with `host:transport`, and the binary `sync:` sub-protocol
//! for listing and transferring files. Starting the server is up to the
//! caller; this crate only connects to it.
//!
//! # Quick start
//!
//! ```no_run
//! use std::io::Read;
//!
//! use adbwire::Client;
//!
//! # fn main() -> adbwire::Result<()> {
//! let client = Client::default(); // localhost:5037
//! println!("server version {}", client.host_version()?);
//!
//! for device in client.devices()? {
//!     let mut out = String::new();
//!     device
//!         .execute_shell("getprop", &["ro.product.model"])?
//!         .read_to_string(&mut out)?;
//!     println!("{device}: {}", out.trim());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Every operation opens its own connection; [`Client`] and [`Device`] are
//! cheap to clone and safe to share between threads.

mod client;
mod device;
mod error;
mod file;
mod filter;
mod host;
mod sync;
#[cfg(test)]
mod testing;
mod transport;
mod watcher;

pub use client::Client;
pub use device::{DEFAULT_MODE, Device, DeviceState, ExecOutput, ShellOutput};
pub use error::{Error, Result};
pub use file::{DirectoryEntry, RemoteFileEntry};
pub use filter::{CrLfReader, CrLfWriter};
pub use host::{HostCommand, TcpAddress};
pub use sync::SyncTransport;
pub use transport::{Connector, ENV_SERVER_ADDRESS, ENV_SERVER_PORT, Stream, Transport};
pub use watcher::{DeviceListener, DeviceWatcher};
