//! Inode-addressed filesystem core.
//!
//! Key components:
//!
//! - [`FileSystem`] - Capability contract with `ENOSYS` defaults
//! - [`DirEntryWriter`] - Bounded, cursor-based directory listing sink
//! - [`FsRegistry`] - Maps mount ids to live filesystem instances
//! - [`Bridge`] - Routes decoded requests to a filesystem and shapes replies
//! - [`MemFs`] - In-memory reference filesystem
//!
//! ## Design Decisions
//!
//! - **Inodes, not paths**: Every operation names its target by inode
//!   number; the root is inode 1 and never goes away.
//! - **Opt-in capabilities**: Implementations override only what they
//!   support. Everything else answers `ENOSYS` and the transport treats the
//!   feature as absent.
//! - **Errors are values**: Status travels back as `Err(Errno)`; the bridge
//!   forwards it verbatim and never retries.
//! - **One reply per request**: The bridge consumes the transport's
//!   [`ReplySink`] exactly once.

pub mod backends;
mod bridge;
mod dirlist;
mod ops;
mod registry;
mod wire;

pub use backends::MemFs;
pub use bridge::Bridge;
pub use dirlist::{DirBuf, DirEntryWriter, DirListing, DirRecord, decode_dirents, dirent_size};
pub use ops::FileSystem;
pub use registry::{FsRegistry, MountId};
pub use wire::{
    Caller, RecordingSink, Reply, ReplySink, Request, WireEntry, WireStat, WireStatVfs,
    WireTimespec, XattrRange, attr_to_wire, encode_xattr_names, entry_to_wire, statvfs_to_wire,
    wire_to_attr,
};
