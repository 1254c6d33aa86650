//! `adbwire track`: print device-list changes until interrupted.

use std::sync::mpsc::{self, Sender};

use adbwire::{Client, Device, DeviceListener, Error};
use anyhow::{Context, Result};
use colored::Colorize;

use crate::{DeviceRow, OutputFormat};

enum Event {
    Detect(Vec<Device>),
    Failed(Error),
    Interrupted,
}

/// Forwards watcher callbacks to the main thread.
struct Forward(Sender<Event>);

impl DeviceListener for Forward {
    fn on_detect(&mut self, devices: Vec<Device>) {
        let _ = self.0.send(Event::Detect(devices));
    }

    fn on_exception(&mut self, error: Error) {
        let _ = self.0.send(Event::Failed(error));
    }
}

pub fn run(client: &Client, format: OutputFormat) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let interrupts = watch_signals(tx.clone())?;
    let watcher = client
        .create_device_watcher(Forward(tx))
        .context("starting device tracking")?;

    let outcome = loop {
        match rx.recv() {
            Ok(Event::Detect(devices)) => {
                if matches!(format, OutputFormat::Table) {
                    println!("{}", "--- devices changed".dimmed());
                }
                DeviceRow::print(&DeviceRow::collect(&devices), format)?;
            }
            Ok(Event::Failed(e)) => break Err(e).context("device tracking failed"),
            Ok(Event::Interrupted) | Err(_) => break Ok(()),
        }
    };

    watcher.stop()?;
    watcher.join()?;
    interrupts.close();
    outcome
}

/// Stops the signal thread when dropped or closed.
#[cfg(unix)]
struct Interrupts(signal_hook::iterator::Handle);

#[cfg(unix)]
impl Interrupts {
    fn close(&self) {
        self.0.close();
    }
}

#[cfg(unix)]
fn watch_signals(tx: Sender<Event>) -> Result<Interrupts> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("installing signal handlers")?;
    let handle = signals.handle();
    std::thread::Builder::new()
        .name("adbwire-signals".into())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                tracing::debug!(signal, "interrupted");
                let _ = tx.send(Event::Interrupted);
            }
        })?;
    Ok(Interrupts(handle))
}

#[cfg(not(unix))]
struct Interrupts;

#[cfg(not(unix))]
impl Interrupts {
    #[allow(clippy::unused_self)]
    const fn close(&self) {}
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps, clippy::needless_pass_by_value)]
fn watch_signals(_tx: Sender<Event>) -> Result<Interrupts> {
    Ok(Interrupts)
}
