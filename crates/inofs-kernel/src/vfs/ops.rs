//! Filesystem capability contract.
//!
//! Every method has a provided default, so an implementation overrides
//! exactly the operations it supports. Unsupported operations answer
//! `ENOSYS`; lifecycle hooks and `forget` are no-ops; `opendir` and
//! `releasedir` succeed.

use async_trait::async_trait;

use inofs_types::{
    Attr, ConnInfo, Entry, Errno, FileInfo, FsResult, InodeId, RenameFlags, SetAttrMask, StatVfs,
};

use super::dirlist::DirEntryWriter;

/// Inode-addressed filesystem operations.
///
/// Calls for the same instance may arrive concurrently from many in-flight
/// requests. Structural mutations must be linearizable: no caller may observe
/// a directory mid-mutation.
#[async_trait]
pub trait FileSystem: Send + Sync {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Called once before any other operation.
    ///
    /// `conn.max_write` and `conn.max_readahead` may be lowered.
    async fn init(&self, _conn: &mut ConnInfo) {}

    /// Called once after all other operations.
    async fn destroy(&self) {}

    /// Drop `nlookup` references to `ino`.
    ///
    /// Advisory. May arrive after the inode was already removed.
    async fn forget(&self, _ino: InodeId, _nlookup: u64) {}

    // ========================================================================
    // Names and attributes
    // ========================================================================

    /// Resolve `name` inside directory `parent`.
    async fn lookup(&self, _parent: InodeId, _name: &str) -> FsResult<Entry> {
        Err(Errno::NoSys)
    }

    async fn getattr(&self, _ino: InodeId, _fi: Option<&FileInfo>) -> FsResult<Attr> {
        Err(Errno::NoSys)
    }

    /// Apply the fields of `attr` selected by `mask`; ignore the rest.
    ///
    /// Returns the attributes after the change.
    async fn setattr(
        &self,
        _ino: InodeId,
        _attr: &Attr,
        _mask: SetAttrMask,
        _fi: Option<&FileInfo>,
    ) -> FsResult<Attr> {
        Err(Errno::NoSys)
    }

    async fn statfs(&self, _ino: InodeId) -> FsResult<StatVfs> {
        Err(Errno::NoSys)
    }

    /// Permission check for `mask` (`R_OK`, `W_OK`, `X_OK`, `F_OK`).
    async fn access(&self, _ino: InodeId, _mask: i32) -> FsResult<()> {
        Err(Errno::NoSys)
    }

    async fn readlink(&self, _ino: InodeId) -> FsResult<String> {
        Err(Errno::NoSys)
    }

    // ========================================================================
    // Directories
    // ========================================================================

    async fn opendir(&self, _ino: InodeId, _fi: &mut FileInfo) -> FsResult<()> {
        Ok(())
    }

    /// Offer entries positioned strictly after `offset` to `writer`.
    ///
    /// `.` has cursor 1 and `..` cursor 2 (omitted for the root); children
    /// follow in a stable order. Stop and return `Ok` as soon as the writer
    /// rejects an entry.
    async fn readdir(
        &self,
        _ino: InodeId,
        _fi: &FileInfo,
        _offset: u64,
        _size: usize,
        _writer: &mut dyn DirEntryWriter,
    ) -> FsResult<()> {
        Err(Errno::NoSys)
    }

    async fn releasedir(&self, _ino: InodeId, _fi: &FileInfo) -> FsResult<()> {
        Ok(())
    }

    async fn fsyncdir(&self, _ino: InodeId, _datasync: bool, _fi: &FileInfo) -> FsResult<()> {
        Err(Errno::NoSys)
    }

    // ========================================================================
    // Creating and removing
    // ========================================================================

    /// Create a non-directory node. Fails `EEXIST` if `name` is bound.
    async fn mknod(
        &self,
        _parent: InodeId,
        _name: &str,
        _mode: u32,
        _rdev: u32,
    ) -> FsResult<Entry> {
        Err(Errno::NoSys)
    }

    async fn mkdir(&self, _parent: InodeId, _name: &str, _mode: u32) -> FsResult<Entry> {
        Err(Errno::NoSys)
    }

    /// Create and open a regular file in one step.
    async fn create(
        &self,
        _parent: InodeId,
        _name: &str,
        _mode: u32,
        _fi: &mut FileInfo,
    ) -> FsResult<Entry> {
        Err(Errno::NoSys)
    }

    async fn symlink(&self, _link: &str, _parent: InodeId, _name: &str) -> FsResult<Entry> {
        Err(Errno::NoSys)
    }

    async fn link(&self, _ino: InodeId, _newparent: InodeId, _newname: &str) -> FsResult<Entry> {
        Err(Errno::NoSys)
    }

    /// Remove an empty directory.
    async fn rmdir(&self, _parent: InodeId, _name: &str) -> FsResult<()> {
        Err(Errno::NoSys)
    }

    /// Remove a non-directory.
    async fn unlink(&self, _parent: InodeId, _name: &str) -> FsResult<()> {
        Err(Errno::NoSys)
    }

    /// Move a binding, replacing an existing non-directory target.
    async fn rename(
        &self,
        _parent: InodeId,
        _name: &str,
        _newparent: InodeId,
        _newname: &str,
        _flags: RenameFlags,
    ) -> FsResult<()> {
        Err(Errno::NoSys)
    }

    // ========================================================================
    // File I/O
    // ========================================================================

    async fn open(&self, _ino: InodeId, _fi: &mut FileInfo) -> FsResult<()> {
        Err(Errno::NoSys)
    }

    /// Read up to `size` bytes at `offset`. Past end of file yields empty.
    async fn read(
        &self,
        _ino: InodeId,
        _size: usize,
        _offset: u64,
        _fi: &FileInfo,
    ) -> FsResult<Vec<u8>> {
        Err(Errno::NoSys)
    }

    /// Write `data` at `offset`, zero-filling any gap. Returns bytes written.
    async fn write(
        &self,
        _data: &[u8],
        _ino: InodeId,
        _offset: u64,
        _fi: &FileInfo,
    ) -> FsResult<usize> {
        Err(Errno::NoSys)
    }

    async fn flush(&self, _ino: InodeId, _fi: &FileInfo) -> FsResult<()> {
        Err(Errno::NoSys)
    }

    async fn release(&self, _ino: InodeId, _fi: &FileInfo) -> FsResult<()> {
        Err(Errno::NoSys)
    }

    async fn fsync(&self, _ino: InodeId, _datasync: bool, _fi: &FileInfo) -> FsResult<()> {
        Err(Errno::NoSys)
    }

    // ========================================================================
    // Extended attributes
    // ========================================================================

    async fn listxattr(&self, _ino: InodeId) -> FsResult<Vec<String>> {
        Err(Errno::NoSys)
    }

    /// Size of the value of `name`, used when the caller asks with an
    /// empty buffer.
    async fn getxattr_size(&self, _ino: InodeId, _name: &str) -> FsResult<usize> {
        Err(Errno::NoSys)
    }

    /// Copy the value of `name` into `out`. Returns bytes written.
    async fn getxattr(&self, _ino: InodeId, _name: &str, _out: &mut [u8]) -> FsResult<usize> {
        Err(Errno::NoSys)
    }

    async fn setxattr(
        &self,
        _ino: InodeId,
        _name: &str,
        _value: &[u8],
        _flags: i32,
    ) -> FsResult<()> {
        Err(Errno::NoSys)
    }

    async fn removexattr(&self, _ino: InodeId, _name: &str) -> FsResult<()> {
        Err(Errno::NoSys)
    }
}
