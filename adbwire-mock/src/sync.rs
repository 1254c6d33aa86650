//! The `sync:` sub-protocol over a device's in-memory file tree.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use adbwire_proto::{
    DATA, DENT, DONE, FAIL, LIST, OKAY, RECV, S_IFDIR, SEND, SYNC_CHUNK_SIZE, id_to_string,
    read_id, read_string_exact, read_u32_le, write_sync_frame, write_sync_header,
};
use tracing::debug;

use crate::{MockDevice, MockFile, Shared};

/// Regular-file type bit added to stored modes when listing.
const S_IFREG: u32 = 0o100_000;

/// Listing metadata for one directory child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stat {
    mode: u32,
    size: u32,
    mtime: u32,
}

/// Serves sync requests until the client hangs up or sends `QUIT`.
pub fn run(
    r: &mut impl Read,
    w: &mut impl Write,
    shared: &Shared,
    serial: &str,
) -> io::Result<()> {
    loop {
        let id = match read_id(r) {
            Ok(id) => id,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };
        let len = read_u32_le(r)? as usize;
        let arg = read_string_exact(r, len)?;
        debug!(id = %id_to_string(&id), %arg, "mock sync request");

        match id {
            LIST => list(w, shared, serial, &arg)?,
            SEND => receive(r, w, shared, serial, &arg)?,
            RECV => send(w, shared, serial, &arg)?,
            [b'Q', b'U', b'I', b'T'] => return Ok(()),
            _ => {
                let message = format!("unknown sync request {}", id_to_string(&id));
                return write_sync_frame(w, FAIL, message.as_bytes());
            }
        }
    }
}

/// `LIST`: one `DENT` per child, then a `DONE` with zeroed fields.
fn list(w: &mut impl Write, shared: &Shared, serial: &str, path: &str) -> io::Result<()> {
    let children = shared
        .lock()
        .device(serial)
        .map(|d| children(d, path))
        .unwrap_or_default();

    for (name, stat) in &children {
        let name_len = u32::try_from(name.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "name too long"))?;
        let mut frame = Vec::with_capacity(20 + name.len());
        frame.extend_from_slice(&DENT);
        frame.extend_from_slice(&stat.mode.to_le_bytes());
        frame.extend_from_slice(&stat.size.to_le_bytes());
        frame.extend_from_slice(&stat.mtime.to_le_bytes());
        frame.extend_from_slice(&name_len.to_le_bytes());
        frame.extend_from_slice(name.as_bytes());
        w.write_all(&frame)?;
    }
    w.write_all(&DONE)?;
    w.write_all(&[0u8; 16])?;
    w.flush()
}

/// `SEND`: collects `DATA` frames until `DONE`, then stores the file.
///
/// The whole upload is drained before any failure is reported so the
/// client never blocks on a full socket.
fn receive(
    r: &mut impl Read,
    w: &mut impl Write,
    shared: &Shared,
    serial: &str,
    arg: &str,
) -> io::Result<()> {
    let parsed = arg
        .rsplit_once(',')
        .and_then(|(path, mode)| Some((path, mode.parse::<u32>().ok()?)));

    let mut data = Vec::new();
    let mtime = loop {
        let id = read_id(r)?;
        let len = read_u32_le(r)?;
        match id {
            DATA => {
                let start = data.len();
                data.resize(start + len as usize, 0);
                r.read_exact(&mut data[start..])?;
            }
            DONE => break len,
            other => {
                let message = format!("unexpected {} during upload", id_to_string(&other));
                return write_sync_frame(w, FAIL, message.as_bytes());
            }
        }
    };

    let Some((path, mode)) = parsed else {
        return write_sync_frame(w, FAIL, b"Invalid argument");
    };

    let failure = {
        let mut state = shared.lock();
        match state.device_mut(serial) {
            None => Some("device offline"),
            Some(device) if device.is_read_only(path) => Some("Read-only file system"),
            Some(device) => {
                debug!(path, bytes = data.len(), "mock stored file");
                device
                    .files
                    .insert(path.to_owned(), MockFile { mode, mtime, data });
                None
            }
        }
    };
    match failure {
        Some(message) => write_sync_frame(w, FAIL, message.as_bytes()),
        None => write_sync_header(w, OKAY, 0),
    }
}

/// `RECV`: the file as 64 KiB `DATA` frames followed by `DONE`.
fn send(w: &mut impl Write, shared: &Shared, serial: &str, path: &str) -> io::Result<()> {
    let file = shared
        .lock()
        .device(serial)
        .and_then(|d| d.files.get(path).cloned());
    let Some(file) = file else {
        return write_sync_frame(w, FAIL, b"No such file or directory");
    };
    for chunk in file.data.chunks(SYNC_CHUNK_SIZE) {
        write_sync_frame(w, DATA, chunk)?;
    }
    write_sync_header(w, DONE, 0)
}

/// Direct children of `dir`, including directories implied by deeper files.
fn children(device: &MockDevice, dir: &str) -> BTreeMap<String, Stat> {
    let prefix = format!("{}/", dir.trim_end_matches('/'));
    let dir_stat = Stat {
        mode: S_IFDIR | 0o755,
        size: 4096,
        mtime: 0,
    };

    let mut out = BTreeMap::new();
    let files = device.files.iter().map(|(path, file)| {
        let stat = Stat {
            mode: S_IFREG | file.mode,
            size: u32::try_from(file.data.len()).unwrap_or(u32::MAX),
            mtime: file.mtime,
        };
        (path, stat)
    });
    let dirs = device.dirs.iter().map(|path| (path, dir_stat));

    for (path, stat) in files.chain(dirs) {
        let Some(rest) = path.strip_prefix(&prefix) else {
            continue;
        };
        match rest.split_once('/') {
            Some((sub, _)) if !sub.is_empty() => {
                out.entry(sub.to_owned()).or_insert(dir_stat);
            }
            None if !rest.is_empty() => {
                out.insert(rest.to_owned(), stat);
            }
            _ => {}
        }
    }
    out
}
