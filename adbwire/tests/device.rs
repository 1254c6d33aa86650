//! Device-scoped operations against the in-process mock server.

#![allow(clippy::unwrap_used, clippy::panic, missing_docs)]

use std::fs;
use std::io::{Cursor, Read};

use adbwire::{Client, Connector, DEFAULT_MODE, Device, Error};
use adbwire_mock::{MockDevice, MockServer};

const SERIAL: &str = "emulator-5554";

fn setup(device: MockDevice) -> (MockServer, Device) {
    let server = MockServer::start().unwrap();
    server.add_device(device);
    let client = Client::new(Connector::new("127.0.0.1", server.port()));
    let device = client.device(SERIAL);
    (server, device)
}

fn emulator() -> MockDevice {
    MockDevice::new(SERIAL, "device")
}

/// Deterministic content spanning several sync chunks.
fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn shell_output_has_crlf_collapsed() {
    let (server, device) =
        setup(emulator().with_output("getprop ro.product.model", b"Pixel 7\nsecond\n"));

    let mut out = String::new();
    device
        .execute_shell("getprop", &["ro.product.model"])
        .unwrap()
        .read_to_string(&mut out)
        .unwrap();
    assert_eq!(out, "Pixel 7\nsecond\n");
    assert_eq!(
        server.commands(),
        ["host:transport:emulator-5554", "shell:getprop ro.product.model"]
    );
}

#[test]
fn shell_reports_missing_program() {
    let (_server, device) = setup(emulator());
    let mut out = String::new();
    device
        .execute_shell("frobnicate", &["--now"])
        .unwrap()
        .read_to_string(&mut out)
        .unwrap();
    assert_eq!(out, "/system/bin/sh: frobnicate: not found\n");
}

#[test]
#[allow(deprecated)]
fn shell_to_writer_filters_output() {
    let (_server, device) = setup(emulator().with_output("ls /", b"acct\ncache\n"));
    let mut out = Vec::new();
    device.execute_shell_to(&mut out, "ls", &["/"]).unwrap();
    assert_eq!(out, b"acct\ncache\n");
}

#[test]
fn exec_output_is_raw() {
    let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    let (server, device) = setup(emulator().with_output("screencap -p", png));

    let mut out = Vec::new();
    device
        .execute("screencap", &["-p"])
        .unwrap()
        .read_to_end(&mut out)
        .unwrap();
    assert_eq!(out, png);
    assert_eq!(server.commands().last().unwrap(), "exec:screencap -p");
}

#[test]
fn unknown_serial_fails_transport_selection() {
    let server = MockServer::start().unwrap();
    server.add_device(emulator());
    let ghost = Client::new(Connector::new("127.0.0.1", server.port())).device("ghost");
    let result = ghost.execute_shell("ls", &[]);
    assert!(matches!(result, Err(Error::Protocol(ref m)) if m == "device 'ghost' not found"));
}

#[test]
fn any_device_needs_exactly_one() {
    let server = MockServer::start().unwrap();
    let client = Client::new(Connector::new("127.0.0.1", server.port()));
    let any = client.any_device();

    let none = any.execute("true", &[]);
    assert!(matches!(none, Err(Error::Protocol(ref m)) if m == "no devices/emulators found"));

    server.add_device(emulator().with_output("echo ok", b"ok\n"));
    let mut out = String::new();
    any.execute("echo", &["ok"])
        .unwrap()
        .read_to_string(&mut out)
        .unwrap();
    assert_eq!(out, "ok\n");

    server.add_device(MockDevice::new("emulator-5556", "device"));
    let two = any.execute("true", &[]);
    assert!(matches!(two, Err(Error::Protocol(ref m)) if m == "more than one device/emulator"));
    assert!(
        server
            .commands()
            .iter()
            .filter(|c| c.starts_with("host:transport"))
            .all(|c| c == "host:transport-any")
    );
}

#[test]
fn list_joins_entry_paths() {
    let (_server, device) = setup(
        emulator()
            .with_file("/sdcard/notes.txt", 0o644, 1_700_000_000, b"hello")
            .with_file("/sdcard/Music/song.mp3", 0o644, 1_700_000_100, b"la")
            .with_dir("/sdcard/Empty"),
    );

    let entries = device.list("/sdcard").unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name()).collect();
    assert_eq!(names, ["Empty", "Music", "notes.txt"]);

    let notes = &entries[2];
    assert_eq!(notes.path(), "/sdcard/notes.txt");
    assert_eq!(notes.size(), 5);
    assert_eq!(notes.last_modified(), 1_700_000_000);
    assert!(!notes.is_directory());
    assert!(entries[0].is_directory());
    assert!(entries[1].is_directory());

    assert!(device.list("/nowhere").unwrap().is_empty());
}

#[test]
fn push_then_pull_round_trips_large_content() {
    let (server, device) = setup(emulator());
    let data = payload(3 * 64 * 1024 + 17);

    let sent = device
        .push(&mut Cursor::new(&data), 1_700_000_000, 0o600, "/sdcard/big.bin")
        .unwrap();
    assert_eq!(sent, data.len() as u64);

    let stored = server.file(SERIAL, "/sdcard/big.bin").unwrap();
    assert_eq!(stored.data, data);
    assert_eq!(stored.mode, 0o600);
    assert_eq!(stored.mtime, 1_700_000_000);

    let mut pulled = Vec::new();
    let received = device.pull("/sdcard/big.bin", &mut pulled).unwrap();
    assert_eq!(received, data.len() as u64);
    assert_eq!(pulled, data);
}

#[test]
fn push_empty_source() {
    let (server, device) = setup(emulator());
    let sent = device
        .push(&mut std::io::empty(), 0, DEFAULT_MODE, "/sdcard/empty")
        .unwrap();
    assert_eq!(sent, 0);
    assert!(server.file(SERIAL, "/sdcard/empty").unwrap().data.is_empty());

    let mut pulled = Vec::new();
    assert_eq!(device.pull("/sdcard/empty", &mut pulled).unwrap(), 0);
}

#[test]
fn push_file_and_pull_file() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("local.bin");
    let data = payload(70_000);
    fs::write(&local, &data).unwrap();

    let (server, device) = setup(emulator());
    assert_eq!(device.push_file(&local, "/data/local/tmp/x").unwrap(), 70_000);
    let stored = server.file(SERIAL, "/data/local/tmp/x").unwrap();
    assert_eq!(stored.mode, DEFAULT_MODE);
    assert!(stored.mtime > 0);

    let back = dir.path().join("back.bin");
    assert_eq!(device.pull_file("/data/local/tmp/x", &back).unwrap(), 70_000);
    assert_eq!(fs::read(&back).unwrap(), data);
}

#[test]
fn push_to_read_only_path_fails() {
    let (server, device) = setup(emulator().read_only("/system/"));
    let data = payload(100_000);
    let err = device
        .push(&mut Cursor::new(&data), 0, DEFAULT_MODE, "/system/app.apk")
        .unwrap_err();
    assert!(matches!(err, Error::Protocol(ref m) if m == "Read-only file system"));
    assert!(server.file(SERIAL, "/system/app.apk").is_none());
}

#[test]
fn pull_missing_file_fails() {
    let (_server, device) = setup(emulator());
    let mut out = Vec::new();
    let err = device.pull("/sdcard/missing", &mut out).unwrap_err();
    assert!(matches!(err, Error::Protocol(ref m) if m == "No such file or directory"));
    assert!(out.is_empty());
}
