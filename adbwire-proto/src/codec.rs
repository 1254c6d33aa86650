//! Frame codec over any `Read`/`Write` stream.
//!
//! Host frame: `[4 lowercase hex digits][payload]`.
//! Sync frame: `[4-byte id][u32 little-endian length][payload]`.

use std::io::{self, Read, Write};

use crate::message::{Id, MAX_HEX_LEN};

/// Writes `s` as a hex-length-prefixed host frame and flushes `w`.
///
/// Fails with [`io::ErrorKind::InvalidInput`] before writing anything if
/// `s` is longer than [`MAX_HEX_LEN`] bytes.
pub fn write_hex_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    let len = s.len();
    if len > MAX_HEX_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {len} bytes exceeds {MAX_HEX_LEN}"),
        ));
    }
    let mut frame = Vec::with_capacity(4 + len);
    frame.extend_from_slice(format!("{len:04x}").as_bytes());
    frame.extend_from_slice(s.as_bytes());
    w.write_all(&frame)?;
    w.flush()
}

/// Reads a 4-hex-digit length prefix.
pub fn read_hex_len(r: &mut impl Read) -> io::Result<usize> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    if !buf.iter().all(u8::is_ascii_hexdigit) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("malformed length prefix {:?}", String::from_utf8_lossy(&buf)),
        ));
    }
    let mut len = 0usize;
    for b in buf {
        // Checked above: every byte is a hex digit.
        let digit = char::from(b).to_digit(16).unwrap_or_default() as usize;
        len = (len << 4) | digit;
    }
    Ok(len)
}

/// Reads a hex-length-prefixed host frame as UTF-8 text.
pub fn read_hex_string(r: &mut impl Read) -> io::Result<String> {
    let len = read_hex_len(r)?;
    read_string_exact(r, len)
}

/// Reads exactly `len` bytes as UTF-8 text.
pub fn read_string_exact(r: &mut impl Read, len: usize) -> io::Result<String> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Reads a 4-byte status code or sync id.
pub fn read_id(r: &mut impl Read) -> io::Result<Id> {
    let mut id = [0u8; 4];
    r.read_exact(&mut id)?;
    Ok(id)
}

/// Reads a little-endian `u32`.
pub fn read_u32_le(r: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Writes a bare sync header (`id` + little-endian `len`) and flushes `w`.
pub fn write_sync_header<W: Write>(w: &mut W, id: Id, len: u32) -> io::Result<()> {
    let mut header = [0u8; 8];
    header[..4].copy_from_slice(&id);
    header[4..].copy_from_slice(&len.to_le_bytes());
    w.write_all(&header)?;
    w.flush()
}

/// Writes a sync frame whose length field is the payload length.
pub fn write_sync_frame<W: Write>(w: &mut W, id: Id, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame exceeds u32::MAX"))?;
    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.extend_from_slice(&id);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    w.write_all(&frame)?;
    w.flush()
}

/// Renders an id for messages, replacing non-UTF-8 bytes.
pub fn id_to_string(id: &Id) -> String {
    String::from_utf8_lossy(id).into_owned()
}
