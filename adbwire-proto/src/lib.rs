//! Byte-level framing for the Android Debug Bridge host protocol.
//!
//! Two frame shapes travel over a host connection:
//!
//! - **Host frames**: `[4 lowercase hex digits][payload]`, used for
//!   commands sent to the server and for length-prefixed response bodies.
//! - **Sync frames**: `[4-byte ASCII id][u32 little-endian length][payload]`,
//!   used once a connection has been switched into the `sync:` sub-protocol.
//!
//! Everything here works over plain `Read`/`Write` streams and knows
//! nothing about devices or commands.

mod codec;
mod message;

pub use codec::{
    id_to_string, read_hex_len, read_hex_string, read_id, read_string_exact, read_u32_le,
    write_hex_string, write_sync_frame, write_sync_header,
};
pub use message::{
    DATA, DEFAULT_HOST, DEFAULT_PORT, DENT, DONE, FAIL, Id, LIST, MAX_HEX_LEN, OKAY, RECV,
    S_IFDIR, SEND, SYNC_CHUNK_SIZE,
};
