//! Remote file metadata returned by directory listings.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use adbwire_proto::S_IFDIR;
use serde::Serialize;

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteFileEntry {
    /// File name as sent by the device.
    name: String,
    /// Full remote path.
    path: String,
    /// Raw mode bits.
    mode: u32,
    /// Size in bytes.
    size: u32,
    /// Modification time, seconds since the Unix epoch.
    last_modified: u32,
}

impl RemoteFileEntry {
    /// Creates an entry whose path is its bare name.
    pub fn new(name: impl Into<String>, mode: u32, size: u32, last_modified: u32) -> Self {
        let name = name.into();
        Self {
            path: name.clone(),
            name,
            mode,
            size,
            last_modified,
        }
    }

    /// Re-roots the entry's path under the listed directory.
    #[must_use]
    pub fn with_parent(mut self, dir: &str) -> Self {
        self.path = if dir.is_empty() {
            self.name.clone()
        } else if dir.ends_with('/') {
            format!("{dir}{}", self.name)
        } else {
            format!("{dir}/{}", self.name)
        };
        self
    }

    /// File name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full remote path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw mode bits.
    pub const fn mode(&self) -> u32 {
        self.mode
    }

    /// Size in bytes.
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Modification time in protocol seconds.
    pub const fn last_modified(&self) -> u32 {
        self.last_modified
    }

    /// Modification time as a [`SystemTime`].
    pub fn modified_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(u64::from(self.last_modified))
    }

    /// Whether the directory bit is set.
    pub const fn is_directory(&self) -> bool {
        self.mode & S_IFDIR != 0
    }
}

/// Result of reading one frame of a `LIST` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryEntry {
    /// A real directory entry.
    Entry(RemoteFileEntry),
    /// End of listing; carries no entry.
    Done,
}
