//! Dispatch bridge: routes decoded requests to registered filesystems.
//!
//! Each method resolves the target filesystem by mount id, invokes the
//! matching contract method, and shapes the result into exactly one
//! [`Reply`]. No filesystem logic lives here.

use inofs_types::{
    ConnInfo, ErrorClass, Errno, FileInfo, FsResult, InodeId, NEGATIVE_ID, RenameFlags,
    SetAttrMask,
};
use tracing::{debug, trace, warn};

use super::dirlist::DirBuf;
use super::registry::FsRegistry;
use super::wire::{
    Reply, ReplySink, Request, WireStat, attr_to_wire, encode_xattr_names, entry_to_wire,
    statvfs_to_wire, wire_to_attr,
};

/// Routes requests for one registry.
#[derive(Debug, Clone, Copy)]
pub struct Bridge<'r> {
    registry: &'r FsRegistry,
}

impl Bridge<'static> {
    /// Bridge over the process-wide registry.
    pub fn global() -> Self {
        Self::new(FsRegistry::global())
    }
}

/// Log a failed status according to its class and turn it into a reply.
fn failed(op: &'static str, errno: Errno) -> Reply {
    match errno.class() {
        ErrorClass::Fault => warn!(op, errno = errno.name(), "operation failed"),
        ErrorClass::Unsupported => trace!(op, "not implemented"),
        ErrorClass::Domain | ErrorClass::Capacity => {
            debug!(op, errno = errno.name(), "operation returned status")
        }
    }
    Reply::Error(errno)
}

/// `ERANGE` together with the size the caller should retry with.
fn too_small(op: &'static str, needed: usize, size: usize) -> Reply {
    debug!(op, needed, size, "buffer too small");
    Reply::Range { needed }
}

fn status(op: &'static str, result: FsResult<()>) -> Reply {
    match result {
        Ok(()) => Reply::Ok,
        Err(e) => failed(op, e),
    }
}

/// Hand `reply` to the transport. Returns true if the request was
/// interrupted and the reply discarded.
fn deliver(op: &'static str, sink: impl ReplySink, reply: Reply) -> bool {
    match sink.send(reply) {
        Ok(()) => false,
        Err(Errno::NoEnt) => {
            debug!(op, "reply discarded, request interrupted");
            true
        }
        Err(e) => {
            warn!(op, errno = e.name(), "reply delivery failed");
            false
        }
    }
}

impl<'r> Bridge<'r> {
    pub fn new(registry: &'r FsRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r FsRegistry {
        self.registry
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Forward `init` once per registration. The filesystem may lower
    /// `conn.max_write` and `conn.max_readahead`.
    #[tracing::instrument(level = "debug", skip(self, req), name = "fs.init", fields(mount = %req.mount))]
    pub async fn init(&self, req: &Request, conn: &mut ConnInfo) {
        let mount = self.registry.mount(&req.mount).await;
        if !mount.begin_init() {
            warn!("init called twice, ignoring");
            return;
        }
        mount.fs.init(conn).await;
    }

    /// Forward `destroy` once, and only after `init`.
    #[tracing::instrument(level = "debug", skip(self, req), name = "fs.destroy", fields(mount = %req.mount))]
    pub async fn destroy(&self, req: &Request) {
        let mount = self.registry.mount(&req.mount).await;
        if !mount.begin_destroy() {
            warn!("destroy without init or called twice, ignoring");
            return;
        }
        mount.fs.destroy().await;
    }

    // ========================================================================
    // Names and attributes
    // ========================================================================

    /// An interrupted reply drops the lookup reference the filesystem just
    /// handed out.
    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.lookup", fields(mount = %req.mount))]
    pub async fn lookup(&self, req: &Request, parent: InodeId, name: &str, sink: impl ReplySink) {
        let fs = self.registry.resolve(&req.mount).await;
        match fs.lookup(parent, name).await {
            Ok(entry) => {
                let ino = entry.ino;
                let reply = Reply::Entry(entry_to_wire(&entry, req.caller));
                if deliver("lookup", sink, reply) && ino != NEGATIVE_ID {
                    fs.forget(ino, 1).await;
                }
            }
            Err(e) => {
                deliver("lookup", sink, failed("lookup", e));
            }
        }
    }

    #[tracing::instrument(level = "trace", skip(self, req, sink), name = "fs.forget", fields(mount = %req.mount))]
    pub async fn forget(&self, req: &Request, ino: InodeId, nlookup: u64, sink: impl ReplySink) {
        let fs = self.registry.resolve(&req.mount).await;
        fs.forget(ino, nlookup).await;
        deliver("forget", sink, Reply::None);
    }

    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.getattr", fields(mount = %req.mount))]
    pub async fn getattr(
        &self,
        req: &Request,
        ino: InodeId,
        fi: Option<&FileInfo>,
        sink: impl ReplySink,
    ) {
        let fs = self.registry.resolve(&req.mount).await;
        let reply = match fs.getattr(ino, fi).await {
            Ok(attr) => Reply::Attr(attr_to_wire(&attr, req.caller), attr.timeout.as_secs_f64()),
            Err(e) => failed("getattr", e),
        };
        deliver("getattr", sink, reply);
    }

    #[tracing::instrument(level = "debug", skip(self, req, stat, sink), name = "fs.setattr", fields(mount = %req.mount))]
    pub async fn setattr(
        &self,
        req: &Request,
        ino: InodeId,
        stat: &WireStat,
        mask: SetAttrMask,
        fi: Option<&FileInfo>,
        sink: impl ReplySink,
    ) {
        let fs = self.registry.resolve(&req.mount).await;
        let wanted = wire_to_attr(stat);
        let reply = match fs.setattr(ino, &wanted, mask, fi).await {
            Ok(attr) => Reply::Attr(attr_to_wire(&attr, req.caller), attr.timeout.as_secs_f64()),
            Err(e) => failed("setattr", e),
        };
        deliver("setattr", sink, reply);
    }

    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.statfs", fields(mount = %req.mount))]
    pub async fn statfs(&self, req: &Request, ino: InodeId, sink: impl ReplySink) {
        let fs = self.registry.resolve(&req.mount).await;
        let reply = match fs.statfs(ino).await {
            Ok(st) => Reply::Statfs(statvfs_to_wire(&st)),
            Err(e) => failed("statfs", e),
        };
        deliver("statfs", sink, reply);
    }

    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.access", fields(mount = %req.mount))]
    pub async fn access(&self, req: &Request, ino: InodeId, mask: i32, sink: impl ReplySink) {
        let fs = self.registry.resolve(&req.mount).await;
        deliver("access", sink, status("access", fs.access(ino, mask).await));
    }

    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.readlink", fields(mount = %req.mount))]
    pub async fn readlink(&self, req: &Request, ino: InodeId, sink: impl ReplySink) {
        let fs = self.registry.resolve(&req.mount).await;
        let reply = match fs.readlink(ino).await {
            Ok(target) => Reply::Readlink(target),
            Err(e) => failed("readlink", e),
        };
        deliver("readlink", sink, reply);
    }

    // ========================================================================
    // Creating and removing
    // ========================================================================

    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.mknod", fields(mount = %req.mount))]
    pub async fn mknod(
        &self,
        req: &Request,
        parent: InodeId,
        name: &str,
        mode: u32,
        rdev: u32,
        sink: impl ReplySink,
    ) {
        let fs = self.registry.resolve(&req.mount).await;
        let reply = match fs.mknod(parent, name, mode, rdev).await {
            Ok(entry) => Reply::Entry(entry_to_wire(&entry, req.caller)),
            Err(e) => failed("mknod", e),
        };
        deliver("mknod", sink, reply);
    }

    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.mkdir", fields(mount = %req.mount))]
    pub async fn mkdir(
        &self,
        req: &Request,
        parent: InodeId,
        name: &str,
        mode: u32,
        sink: impl ReplySink,
    ) {
        let fs = self.registry.resolve(&req.mount).await;
        let reply = match fs.mkdir(parent, name, mode).await {
            Ok(entry) => Reply::Entry(entry_to_wire(&entry, req.caller)),
            Err(e) => failed("mkdir", e),
        };
        deliver("mkdir", sink, reply);
    }

    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.symlink", fields(mount = %req.mount))]
    pub async fn symlink(
        &self,
        req: &Request,
        link: &str,
        parent: InodeId,
        name: &str,
        sink: impl ReplySink,
    ) {
        let fs = self.registry.resolve(&req.mount).await;
        let reply = match fs.symlink(link, parent, name).await {
            Ok(entry) => Reply::Entry(entry_to_wire(&entry, req.caller)),
            Err(e) => failed("symlink", e),
        };
        deliver("symlink", sink, reply);
    }

    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.link", fields(mount = %req.mount))]
    pub async fn link(
        &self,
        req: &Request,
        ino: InodeId,
        newparent: InodeId,
        newname: &str,
        sink: impl ReplySink,
    ) {
        let fs = self.registry.resolve(&req.mount).await;
        let reply = match fs.link(ino, newparent, newname).await {
            Ok(entry) => Reply::Entry(entry_to_wire(&entry, req.caller)),
            Err(e) => failed("link", e),
        };
        deliver("link", sink, reply);
    }

    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.unlink", fields(mount = %req.mount))]
    pub async fn unlink(&self, req: &Request, parent: InodeId, name: &str, sink: impl ReplySink) {
        let fs = self.registry.resolve(&req.mount).await;
        deliver("unlink", sink, status("unlink", fs.unlink(parent, name).await));
    }

    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.rmdir", fields(mount = %req.mount))]
    pub async fn rmdir(&self, req: &Request, parent: InodeId, name: &str, sink: impl ReplySink) {
        let fs = self.registry.resolve(&req.mount).await;
        deliver("rmdir", sink, status("rmdir", fs.rmdir(parent, name).await));
    }

    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.rename", fields(mount = %req.mount))]
    pub async fn rename(
        &self,
        req: &Request,
        parent: InodeId,
        name: &str,
        newparent: InodeId,
        newname: &str,
        flags: RenameFlags,
        sink: impl ReplySink,
    ) {
        let fs = self.registry.resolve(&req.mount).await;
        let result = fs.rename(parent, name, newparent, newname, flags).await;
        deliver("rename", sink, status("rename", result));
    }

    // ========================================================================
    // File I/O
    // ========================================================================

    /// Create and open. An interrupted reply releases the new handle.
    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.create", fields(mount = %req.mount))]
    pub async fn create(
        &self,
        req: &Request,
        parent: InodeId,
        name: &str,
        mode: u32,
        mut fi: FileInfo,
        sink: impl ReplySink,
    ) {
        let fs = self.registry.resolve(&req.mount).await;
        match fs.create(parent, name, mode, &mut fi).await {
            Ok(entry) => {
                let reply = Reply::Create(entry_to_wire(&entry, req.caller), fi);
                if deliver("create", sink, reply) {
                    let _ = fs.release(entry.ino, &fi).await;
                }
            }
            Err(e) => {
                deliver("create", sink, failed("create", e));
            }
        }
    }

    /// An interrupted reply releases the handle so every successful open
    /// still gets exactly one release.
    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.open", fields(mount = %req.mount))]
    pub async fn open(&self, req: &Request, ino: InodeId, mut fi: FileInfo, sink: impl ReplySink) {
        let fs = self.registry.resolve(&req.mount).await;
        match fs.open(ino, &mut fi).await {
            Ok(()) => {
                if deliver("open", sink, Reply::Open(fi)) {
                    let _ = fs.release(ino, &fi).await;
                }
            }
            Err(e) => {
                deliver("open", sink, failed("open", e));
            }
        }
    }

    #[tracing::instrument(level = "trace", skip(self, req, sink), name = "fs.read", fields(mount = %req.mount))]
    pub async fn read(
        &self,
        req: &Request,
        ino: InodeId,
        size: usize,
        offset: u64,
        fi: &FileInfo,
        sink: impl ReplySink,
    ) {
        let fs = self.registry.resolve(&req.mount).await;
        let reply = match fs.read(ino, size, offset, fi).await {
            Ok(data) => Reply::Data(data),
            Err(e) => failed("read", e),
        };
        deliver("read", sink, reply);
    }

    #[tracing::instrument(level = "trace", skip(self, req, data, sink), name = "fs.write", fields(mount = %req.mount, len = data.len()))]
    pub async fn write(
        &self,
        req: &Request,
        ino: InodeId,
        data: &[u8],
        offset: u64,
        fi: &FileInfo,
        sink: impl ReplySink,
    ) {
        let fs = self.registry.resolve(&req.mount).await;
        let reply = match fs.write(data, ino, offset, fi).await {
            Ok(written) => Reply::Write(written),
            Err(e) => failed("write", e),
        };
        deliver("write", sink, reply);
    }

    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.flush", fields(mount = %req.mount))]
    pub async fn flush(&self, req: &Request, ino: InodeId, fi: &FileInfo, sink: impl ReplySink) {
        let fs = self.registry.resolve(&req.mount).await;
        deliver("flush", sink, status("flush", fs.flush(ino, fi).await));
    }

    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.release", fields(mount = %req.mount))]
    pub async fn release(&self, req: &Request, ino: InodeId, fi: &FileInfo, sink: impl ReplySink) {
        let fs = self.registry.resolve(&req.mount).await;
        deliver("release", sink, status("release", fs.release(ino, fi).await));
    }

    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.fsync", fields(mount = %req.mount))]
    pub async fn fsync(
        &self,
        req: &Request,
        ino: InodeId,
        datasync: bool,
        fi: &FileInfo,
        sink: impl ReplySink,
    ) {
        let fs = self.registry.resolve(&req.mount).await;
        deliver("fsync", sink, status("fsync", fs.fsync(ino, datasync, fi).await));
    }

    // ========================================================================
    // Directories
    // ========================================================================

    /// An interrupted reply releases the directory handle.
    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.opendir", fields(mount = %req.mount))]
    pub async fn opendir(&self, req: &Request, ino: InodeId, mut fi: FileInfo, sink: impl ReplySink) {
        let fs = self.registry.resolve(&req.mount).await;
        match fs.opendir(ino, &mut fi).await {
            Ok(()) => {
                if deliver("opendir", sink, Reply::Open(fi)) {
                    let _ = fs.releasedir(ino, &fi).await;
                }
            }
            Err(e) => {
                deliver("opendir", sink, failed("opendir", e));
            }
        }
    }

    /// Packs entries after `offset` into a buffer of at most `size` bytes.
    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.readdir", fields(mount = %req.mount))]
    pub async fn readdir(
        &self,
        req: &Request,
        ino: InodeId,
        size: usize,
        offset: u64,
        fi: &FileInfo,
        sink: impl ReplySink,
    ) {
        let fs = self.registry.resolve(&req.mount).await;
        let mut buf = DirBuf::new(size);
        let result = fs.readdir(ino, fi, offset, size, &mut buf).await;
        let reply = match result {
            Ok(()) => Reply::Data(buf.into_bytes()),
            Err(e) => failed("readdir", e),
        };
        deliver("readdir", sink, reply);
    }

    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.releasedir", fields(mount = %req.mount))]
    pub async fn releasedir(
        &self,
        req: &Request,
        ino: InodeId,
        fi: &FileInfo,
        sink: impl ReplySink,
    ) {
        let fs = self.registry.resolve(&req.mount).await;
        deliver("releasedir", sink, status("releasedir", fs.releasedir(ino, fi).await));
    }

    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.fsyncdir", fields(mount = %req.mount))]
    pub async fn fsyncdir(
        &self,
        req: &Request,
        ino: InodeId,
        datasync: bool,
        fi: &FileInfo,
        sink: impl ReplySink,
    ) {
        let fs = self.registry.resolve(&req.mount).await;
        let result = fs.fsyncdir(ino, datasync, fi).await;
        deliver("fsyncdir", sink, status("fsyncdir", result));
    }

    // ========================================================================
    // Extended attributes
    // ========================================================================

    #[tracing::instrument(level = "debug", skip(self, req, value, sink), name = "fs.setxattr", fields(mount = %req.mount))]
    pub async fn setxattr(
        &self,
        req: &Request,
        ino: InodeId,
        name: &str,
        value: &[u8],
        flags: i32,
        sink: impl ReplySink,
    ) {
        let fs = self.registry.resolve(&req.mount).await;
        let result = fs.setxattr(ino, name, value, flags).await;
        deliver("setxattr", sink, status("setxattr", result));
    }

    /// A zero `size` asks only for the value's length. A value that does not
    /// fit a nonzero `size` is answered with [`Reply::Range`] carrying the
    /// value's length.
    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.getxattr", fields(mount = %req.mount))]
    pub async fn getxattr(
        &self,
        req: &Request,
        ino: InodeId,
        name: &str,
        size: usize,
        sink: impl ReplySink,
    ) {
        let fs = self.registry.resolve(&req.mount).await;
        let reply = if size == 0 {
            match fs.getxattr_size(ino, name).await {
                Ok(needed) => Reply::Xattr(needed),
                Err(e) => failed("getxattr", e),
            }
        } else {
            let mut buf = vec![0u8; size];
            let result = fs.getxattr(ino, name, &mut buf).await;
            match result {
                Ok(n) if n <= size => {
                    buf.truncate(n);
                    Reply::Data(buf)
                }
                Ok(n) => too_small("getxattr", n, size),
                Err(Errno::Range) => match fs.getxattr_size(ino, name).await {
                    Ok(needed) => too_small("getxattr", needed, size),
                    Err(_) => failed("getxattr", Errno::Range),
                },
                Err(e) => failed("getxattr", e),
            }
        };
        deliver("getxattr", sink, reply);
    }

    /// A zero `size` asks only for the listing's length. A listing that
    /// does not fit a nonzero `size` is answered with [`Reply::Range`].
    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.listxattr", fields(mount = %req.mount))]
    pub async fn listxattr(&self, req: &Request, ino: InodeId, size: usize, sink: impl ReplySink) {
        let fs = self.registry.resolve(&req.mount).await;
        let reply = match fs.listxattr(ino).await {
            Ok(names) => {
                let capacity = if size == 0 { usize::MAX } else { size };
                match encode_xattr_names(&names, capacity) {
                    Ok(packed) if size == 0 => Reply::Xattr(packed.len()),
                    Ok(packed) => Reply::Data(packed),
                    Err(range) => too_small("listxattr", range.needed, size),
                }
            }
            Err(e) => failed("listxattr", e),
        };
        deliver("listxattr", sink, reply);
    }

    #[tracing::instrument(level = "debug", skip(self, req, sink), name = "fs.removexattr", fields(mount = %req.mount))]
    pub async fn removexattr(&self, req: &Request, ino: InodeId, name: &str, sink: impl ReplySink) {
        let fs = self.registry.resolve(&req.mount).await;
        let result = fs.removexattr(ino, name).await;
        deliver("removexattr", sink, status("removexattr", result));
    }
}
