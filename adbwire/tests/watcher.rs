//! Device tracking against the mock server and against hand-rolled peers.

#![allow(clippy::unwrap_used, clippy::panic, missing_docs)]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use adbwire::{Client, Connector, Device, DeviceListener, Error};
use adbwire_mock::{MockDevice, MockServer};

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum Event {
    Detect(Vec<String>),
    Exception(Error),
}

struct Forward(Sender<Event>);

impl DeviceListener for Forward {
    fn on_detect(&mut self, devices: Vec<Device>) {
        let serials = devices
            .iter()
            .filter_map(|d| d.serial().map(str::to_owned))
            .collect();
        let _ = self.0.send(Event::Detect(serials));
    }

    fn on_exception(&mut self, error: Error) {
        let _ = self.0.send(Event::Exception(error));
    }
}

fn listener() -> (Forward, Receiver<Event>) {
    let (tx, rx) = mpsc::channel();
    (Forward(tx), rx)
}

fn next_list(rx: &Receiver<Event>) -> Vec<String> {
    match rx.recv_timeout(TIMEOUT).unwrap() {
        Event::Detect(serials) => serials,
        Event::Exception(e) => panic!("unexpected exception: {e}"),
    }
}

/// One-shot server: answers `host:track-devices` with `reply`, then either
/// hangs up or waits for the client to.
fn raw_server(reply: &'static [u8], hold: bool) -> (u16, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut len = [0u8; 4];
        stream.read_exact(&mut len).unwrap();
        let len = usize::from_str_radix(std::str::from_utf8(&len).unwrap(), 16).unwrap();
        let mut command = vec![0u8; len];
        stream.read_exact(&mut command).unwrap();
        stream.write_all(reply).unwrap();
        if hold {
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest);
        }
        String::from_utf8(command).unwrap()
    });
    (port, handle)
}

#[test]
fn reports_every_change() {
    let server = MockServer::start().unwrap();
    server.add_device(MockDevice::new("emulator-5554", "device"));
    let client = Client::new(Connector::new("127.0.0.1", server.port()));

    let (forward, rx) = listener();
    let watcher = client.create_device_watcher(forward).unwrap();
    assert!(watcher.is_running());
    assert_eq!(next_list(&rx), ["emulator-5554"]);

    server.add_device(MockDevice::new("R58M", "device"));
    assert_eq!(next_list(&rx), ["emulator-5554", "R58M"]);

    server.remove_device("emulator-5554");
    assert_eq!(next_list(&rx), ["R58M"]);

    watcher.stop().unwrap();
    assert!(!watcher.is_running());
    watcher.join().unwrap();
    assert!(rx.iter().all(|e| matches!(e, Event::Detect(_))));
    assert_eq!(server.commands(), ["host:track-devices"]);
}

#[test]
fn stop_during_pending_read_is_silent() {
    let (port, server) = raw_server(b"OKAY", true);
    let client = Client::new(Connector::new("127.0.0.1", port));

    let (forward, rx) = listener();
    let watcher = client.create_device_watcher(forward).unwrap();
    thread::sleep(Duration::from_millis(50));
    watcher.stop().unwrap();
    watcher.stop().unwrap();
    watcher.join().unwrap();

    assert!(rx.iter().next().is_none());
    assert_eq!(server.join().unwrap(), "host:track-devices");
}

#[test]
fn dropping_the_watcher_stops_it() {
    let (port, server) = raw_server(b"OKAY", true);
    let client = Client::new(Connector::new("127.0.0.1", port));

    let (forward, rx) = listener();
    drop(client.create_device_watcher(forward).unwrap());
    // The peer sees the hang-up, and the loop exits without reporting.
    server.join().unwrap();
    assert!(rx.recv_timeout(TIMEOUT).is_err());
}

#[test]
fn malformed_length_is_reported() {
    let (port, server) = raw_server(b"OKAYzzzz", true);
    let client = Client::new(Connector::new("127.0.0.1", port));

    let (forward, rx) = listener();
    let watcher = client.create_device_watcher(forward).unwrap();
    match rx.recv_timeout(TIMEOUT).unwrap() {
        Event::Exception(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::InvalidData),
        other => panic!("expected an I/O exception, got {other:?}"),
    }
    watcher.join().unwrap();
    server.join().unwrap();
}

#[test]
fn server_hang_up_is_reported() {
    let (port, server) = raw_server(b"OKAY0015emulator-5554\tdevice\n", false);
    let client = Client::new(Connector::new("127.0.0.1", port));

    let (forward, rx) = listener();
    let watcher = client.create_device_watcher(forward).unwrap();
    assert_eq!(next_list(&rx), ["emulator-5554"]);
    match rx.recv_timeout(TIMEOUT).unwrap() {
        Event::Exception(Error::Io(e)) => {
            assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof);
        }
        other => panic!("expected an I/O exception, got {other:?}"),
    }
    watcher.join().unwrap();
    server.join().unwrap();
}

#[test]
fn rejected_tracking_fails_up_front() {
    let (port, server) = raw_server(b"FAIL0007nope :(", false);
    let client = Client::new(Connector::new("127.0.0.1", port));
    let (forward, _rx) = listener();
    let err = client.create_device_watcher(forward).unwrap_err();
    assert!(matches!(err, Error::Protocol(ref m) if m == "nope :("));
    server.join().unwrap();
}
