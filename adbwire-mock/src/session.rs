//! Per-connection command loop and host-service dispatch.

use std::io::{self, BufReader, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::Ordering;
use std::time::Duration;

use adbwire_proto::{OKAY, read_hex_string, write_hex_string};
use tracing::debug;

use crate::{Shared, State, sync};

/// How often an idle tracker re-checks for shutdown.
const TRACK_POLL: Duration = Duration::from_millis(50);

/// What a command did to the connection.
enum Next {
    /// Read another command.
    Continue,
    /// The service finished with the connection.
    Close,
}

/// Serves one client connection until it closes or a service ends it.
pub fn run(stream: TcpStream, shared: &Shared) -> io::Result<()> {
    let mut r = BufReader::new(stream.try_clone()?);
    let mut w = stream;
    // Serial chosen by `host:transport*`.
    let mut selected: Option<String> = None;

    loop {
        let command = match read_hex_string(&mut r) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };
        debug!(%command, "mock received");
        shared.lock().commands.push(command.clone());

        let next = if let Some(rest) = command.strip_prefix("host:") {
            host(&mut w, shared, rest, &mut selected)?
        } else if let Some(rest) = command.strip_prefix("host-serial:") {
            host_serial(&mut w, shared, rest)?
        } else {
            device(&mut r, &mut w, shared, &command, selected.as_deref())?
        };
        if let Next::Close = next {
            let _ = w.shutdown(Shutdown::Both);
            return Ok(());
        }
    }
}

/// `host:*` services.
fn host(
    w: &mut TcpStream,
    shared: &Shared,
    service: &str,
    selected: &mut Option<String>,
) -> io::Result<Next> {
    match service {
        "version" => {
            let version = shared.lock().version;
            okay_with(w, &format!("{version:04x}"))?;
        }
        "devices" => {
            let body = shared.lock().device_list();
            okay_with(w, &body)?;
        }
        "track-devices" => {
            okay(w)?;
            track(w, shared)?;
            return Ok(Next::Close);
        }
        "transport-any" => {
            let only = single_device(&shared.lock()).map(|d| d.serial().to_owned());
            match only {
                Ok(serial) => {
                    *selected = Some(serial);
                    okay(w)?;
                }
                Err(msg) => fail(w, msg)?,
            }
        }
        "get-state" => {
            let state = single_device(&shared.lock()).map(|d| d.state().to_owned());
            match state {
                Ok(state) => okay_with(w, &state)?,
                Err(msg) => fail(w, msg)?,
            }
        }
        _ => {
            if let Some(serial) = service.strip_prefix("transport:") {
                if shared.lock().device(serial).is_some() {
                    *selected = Some(serial.to_owned());
                    okay(w)?;
                } else {
                    fail(w, &format!("device '{serial}' not found"))?;
                }
            } else if let Some(address) = service.strip_prefix("connect:") {
                let reply = connect(&mut shared.lock(), address);
                okay_with(w, &reply)?;
            } else if let Some(address) = service.strip_prefix("disconnect:") {
                let reply = if shared.lock().tcp_devices.remove(address) {
                    format!("disconnected {address}")
                } else {
                    format!("error: no such device '{address}'")
                };
                okay_with(w, &reply)?;
            } else {
                fail(w, "unknown host service")?;
            }
        }
    }
    Ok(Next::Continue)
}

/// `host-serial:<serial>:<request>`; serials may themselves contain `:`.
fn host_serial(w: &mut TcpStream, shared: &Shared, rest: &str) -> io::Result<Next> {
    let Some(serial) = rest.strip_suffix(":get-state") else {
        fail(w, "unknown host service")?;
        return Ok(Next::Continue);
    };
    let state = shared.lock().device(serial).map(|d| d.state().to_owned());
    match state {
        Some(state) => okay_with(w, &state)?,
        None => fail(w, &format!("device '{serial}' not found"))?,
    }
    Ok(Next::Continue)
}

/// Services that need a device selected on this connection.
fn device(
    r: &mut BufReader<TcpStream>,
    w: &mut TcpStream,
    shared: &Shared,
    command: &str,
    selected: Option<&str>,
) -> io::Result<Next> {
    let Some(serial) = selected else {
        fail(w, "no device selected")?;
        return Ok(Next::Continue);
    };

    if command == "sync:" {
        okay(w)?;
        sync::run(r, w, shared, serial)?;
        return Ok(Next::Close);
    }

    let (line, legacy) = if let Some(line) = command.strip_prefix("shell:") {
        (line, true)
    } else if let Some(line) = command.strip_prefix("exec:") {
        (line, false)
    } else {
        fail(w, &format!("unknown service {command}"))?;
        return Ok(Next::Continue);
    };

    let output = shared.lock().device(serial).map(|d| d.output_for(line));
    let Some(output) = output else {
        fail(w, "device offline")?;
        return Ok(Next::Close);
    };
    okay(w)?;
    if legacy {
        w.write_all(&to_crlf(&output))?;
    } else {
        w.write_all(&output)?;
    }
    w.flush()?;
    Ok(Next::Close)
}

/// Pushes the device list now and after every change until stopped.
fn track(w: &mut TcpStream, shared: &Shared) -> io::Result<()> {
    let mut state = shared.lock();
    loop {
        let generation = state.generation;
        let body = state.device_list();
        drop(state);
        write_hex_string(w, &body)?;

        state = shared.lock();
        while state.generation == generation {
            if shared.stopping.load(Ordering::SeqCst) {
                return Ok(());
            }
            state = shared
                .changed
                .wait_timeout(state, TRACK_POLL)
                .map_or_else(|e| e.into_inner().0, |(guard, _)| guard);
        }
    }
}

fn connect(state: &mut State, address: &str) -> String {
    if let Some(reason) = state.refused.get(address) {
        return format!("unable to connect to {address}: {reason}");
    }
    if state.tcp_devices.insert(address.to_owned()) {
        format!("connected to {address}")
    } else {
        format!("already connected to {address}")
    }
}

/// The only attached device, as `host:transport-any` requires.
fn single_device(state: &State) -> Result<&crate::MockDevice, &'static str> {
    match state.devices.as_slice() {
        [] => Err("no devices/emulators found"),
        [only] => Ok(only),
        _ => Err("more than one device/emulator"),
    }
}

/// Rewrites every `\n` as `\r\n`, as a pty does.
fn to_crlf(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8);
    for &b in data {
        if b == b'\n' {
            out.push(b'\r');
        }
        out.push(b);
    }
    out
}

fn okay(w: &mut impl Write) -> io::Result<()> {
    w.write_all(&OKAY)?;
    w.flush()
}

fn okay_with(w: &mut impl Write, body: &str) -> io::Result<()> {
    w.write_all(&OKAY)?;
    write_hex_string(w, body)
}

fn fail(w: &mut impl Write, message: &str) -> io::Result<()> {
    debug!(message, "mock replying FAIL");
    w.write_all(&adbwire_proto::FAIL)?;
    write_hex_string(w, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crlf_rewrite() {
        assert_eq!(to_crlf(b"a\nb\n"), b"a\r\nb\r\n");
        assert_eq!(to_crlf(b"no newline"), b"no newline");
        assert_eq!(to_crlf(b""), b"");
    }

    #[test]
    fn connect_replies() {
        let mut state = State::default();
        assert_eq!(connect(&mut state, "1.2.3.4:5555"), "connected to 1.2.3.4:5555");
        assert_eq!(
            connect(&mut state, "1.2.3.4:5555"),
            "already connected to 1.2.3.4:5555"
        );
        state
            .refused
            .insert("10.0.0.9:5555".into(), "Connection refused".into());
        assert_eq!(
            connect(&mut state, "10.0.0.9:5555"),
            "unable to connect to 10.0.0.9:5555: Connection refused"
        );
    }
}
