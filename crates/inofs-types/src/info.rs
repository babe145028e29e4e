//! Session and filesystem-wide information.

use crate::flags::FsFlags;

/// Connection parameters negotiated at `init`.
///
/// `max_write` and `max_readahead` may be lowered by the filesystem; the
/// transport copies them back after `init` returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnInfo {
    pub proto_major: u32,
    pub proto_minor: u32,
    pub max_write: u32,
    pub max_readahead: u32,
}

/// Filesystem statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatVfs {
    pub block_size: u64,
    pub blocks: u64,
    pub blocks_free: u64,
    /// Total inodes.
    pub files: u64,
    pub files_free: u64,
    pub fsid: u64,
    pub flags: FsFlags,
    /// Maximum name length.
    pub name_max: u64,
}

impl Default for StatVfs {
    fn default() -> Self {
        Self {
            block_size: 4096,
            blocks: 0,
            blocks_free: 0,
            files: 0,
            files_free: 0,
            fsid: 0,
            flags: FsFlags::empty(),
            name_max: 255,
        }
    }
}
