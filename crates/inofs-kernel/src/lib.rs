//! # inofs-kernel
//!
//! Inode filesystem core for inofs.
//!
//! A transport (a FUSE session, a test harness) decodes kernel requests and
//! hands them to the [`Bridge`]. The bridge resolves the target filesystem in
//! an [`FsRegistry`], calls the matching [`FileSystem`] method, and sends
//! exactly one [`Reply`] back through the transport's [`ReplySink`].
//!
//! [`MemFs`] implements the whole contract in memory and serves as the
//! correctness reference for other implementations.

pub mod config;
pub mod vfs;

pub use config::{ConfigError, GenerationPolicy, MemFsConfig};
pub use vfs::{
    Bridge, DirBuf, DirEntryWriter, DirListing, DirRecord, FileSystem, FsRegistry, MemFs, MountId,
    RecordingSink, Reply, ReplySink, Request,
};
