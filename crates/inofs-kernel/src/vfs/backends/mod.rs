//! Filesystem implementations.
//!
//! Backends implement [`FileSystem`](super::FileSystem) over different
//! storage. Only the in-memory reference lives here today.

mod memory;

pub use memory::MemFs;
