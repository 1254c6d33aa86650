//! The `sync:` file-transfer sub-protocol.
//!
//! After a successful `sync:` handshake the connection carries frames of
//! `[4-byte id][u32 LE length][payload]`. A [`SyncTransport`] owns the
//! upgraded [`Transport`]; it is not a second connection.

use std::io::{Read, Write};
use std::net::TcpStream;

use adbwire_proto::{DATA, DENT, FAIL, Id, OKAY, SYNC_CHUNK_SIZE};
use tracing::trace;

use crate::file::{DirectoryEntry, RemoteFileEntry};
use crate::transport::{Stream, Transport};
use crate::{Error, Result};

/// A host connection switched into sync mode.
#[derive(Debug)]
pub struct SyncTransport<S = TcpStream> {
    /// The upgraded host connection.
    transport: Transport<S>,
}

impl<S: Stream> SyncTransport<S> {
    /// Wraps a transport whose `sync:` handshake already succeeded.
    pub(crate) const fn new(transport: Transport<S>) -> Self {
        Self { transport }
    }

    /// Sends a request frame (`LIST`, `SEND`, `RECV`) carrying `name`.
    pub fn send(&mut self, id: &str, name: &str) -> Result<()> {
        let id = parse_id(id)?;
        trace!(id = %adbwire_proto::id_to_string(&id), name, "sync send");
        adbwire_proto::write_sync_frame(self.stream(), id, name.as_bytes())?;
        Ok(())
    }

    /// Sends a bare status frame, e.g. `DONE` with a modification time.
    pub fn send_status(&mut self, code: &str, length: u32) -> Result<()> {
        let code = parse_id(code)?;
        trace!(code = %adbwire_proto::id_to_string(&code), length, "sync status");
        adbwire_proto::write_sync_header(self.stream(), code, length)?;
        Ok(())
    }

    /// Reads a status frame and fails unless it is `OKAY`.
    pub fn verify_status(&mut self) -> Result<()> {
        let code = adbwire_proto::read_id(self.stream())?;
        let length = adbwire_proto::read_u32_le(self.stream())?;
        match code {
            OKAY => Ok(()),
            FAIL => Err(Error::Protocol(self.read_text(length)?)),
            other => Err(Error::UnknownResponse(adbwire_proto::id_to_string(&other))),
        }
    }

    /// Reads one frame of a `LIST` response.
    ///
    /// Any id other than `DENT` ends the listing; the rest of that frame is
    /// left unread.
    pub fn read_directory_entry(&mut self) -> Result<DirectoryEntry> {
        let id = adbwire_proto::read_id(self.stream())?;
        if id != DENT {
            trace!(id = %adbwire_proto::id_to_string(&id), "end of listing");
            return Ok(DirectoryEntry::Done);
        }
        let mode = adbwire_proto::read_u32_le(self.stream())?;
        let size = adbwire_proto::read_u32_le(self.stream())?;
        let mtime = adbwire_proto::read_u32_le(self.stream())?;
        let name_len = adbwire_proto::read_u32_le(self.stream())?;
        let name = self.read_text(name_len)?;
        Ok(DirectoryEntry::Entry(RemoteFileEntry::new(
            name, mode, size, mtime,
        )))
    }

    /// Streams `source` as `DATA` frames of at most 64 KiB.
    ///
    /// Does not send the closing `DONE`; see [`Self::send_status`].
    /// Returns the number of bytes sent.
    pub fn send_stream(&mut self, source: &mut impl Read) -> Result<u64> {
        let mut buf = vec![0u8; SYNC_CHUNK_SIZE];
        let mut total = 0u64;
        loop {
            let n = read_chunk(source, &mut buf)?;
            if n == 0 {
                return Ok(total);
            }
            adbwire_proto::write_sync_frame(self.stream(), DATA, &buf[..n])?;
            total += n as u64;
        }
    }

    /// Copies `DATA` frames into `destination` until a non-`DATA` frame.
    ///
    /// A `FAIL` frame becomes [`Error::Protocol`]. Returns the number of
    /// bytes received.
    pub fn read_chunks_to(&mut self, destination: &mut impl Write) -> Result<u64> {
        let mut buf = vec![0u8; SYNC_CHUNK_SIZE];
        let mut total = 0u64;
        loop {
            let id = adbwire_proto::read_id(self.stream())?;
            let length = adbwire_proto::read_u32_le(self.stream())?;
            match id {
                FAIL => return Err(Error::Protocol(self.read_text(length)?)),
                DATA => {}
                _ => {
                    destination.flush()?;
                    return Ok(total);
                }
            }
            let mut remaining = length as usize;
            while remaining > 0 {
                let take = remaining.min(buf.len());
                self.stream().read_exact(&mut buf[..take])?;
                destination.write_all(&buf[..take])?;
                remaining -= take;
            }
            total += u64::from(length);
        }
    }

    /// Closes the underlying connection.
    pub fn close(self) -> Result<()> {
        self.transport.close()
    }

    /// Gives back the host-level transport.
    pub fn into_transport(self) -> Transport<S> {
        self.transport
    }

    /// Raw stream of the upgraded connection.
    fn stream(&mut self) -> &mut S {
        self.transport.stream_mut()
    }

    /// Reads `len` bytes of frame payload as text.
    fn read_text(&mut self, len: u32) -> Result<String> {
        Ok(adbwire_proto::read_string_exact(self.stream(), len as usize)?)
    }
}

/// Validates a 4-character ASCII sync id.
fn parse_id(id: &str) -> Result<Id> {
    let bytes: Id = id
        .as_bytes()
        .try_into()
        .map_err(|_| Error::InvalidArgument(format!("sync id {id:?} is not 4 bytes")))?;
    if !bytes.is_ascii() {
        return Err(Error::InvalidArgument(format!("sync id {id:?} is not ASCII")));
    }
    Ok(bytes)
}

/// Fills `buf` from `source` as far as possible; short only at end of input.
fn read_chunk(source: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
