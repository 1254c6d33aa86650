//! Protocol constants shared by the client and the mock server.

/// Default TCP port of the ADB server.
pub const DEFAULT_PORT: u16 = 5037;

/// Default host of the ADB server.
pub const DEFAULT_HOST: &str = "localhost";

/// A 4-byte ASCII status code or sync frame id.
pub type Id = [u8; 4];

/// Request succeeded.
pub const OKAY: Id = *b"OKAY";
/// Request failed; a message follows.
pub const FAIL: Id = *b"FAIL";

/// Sync: list a remote directory.
pub const LIST: Id = *b"LIST";
/// Sync: upload a file.
pub const SEND: Id = *b"SEND";
/// Sync: download a file.
pub const RECV: Id = *b"RECV";
/// Sync: one directory entry.
pub const DENT: Id = *b"DENT";
/// Sync: one chunk of file content.
pub const DATA: Id = *b"DATA";
/// Sync: end of listing or transfer.
pub const DONE: Id = *b"DONE";

/// Largest payload of a single sync `DATA` frame (64 KiB).
pub const SYNC_CHUNK_SIZE: usize = 64 * 1024;

/// Largest payload a 4-hex-digit length prefix can describe.
pub const MAX_HEX_LEN: usize = 0xffff;

/// Directory bit in a remote file mode.
pub const S_IFDIR: u32 = 1 << 14;
