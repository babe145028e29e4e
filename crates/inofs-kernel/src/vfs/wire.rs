//! Transport-facing shapes: requests, replies, and attribute translation.
//!
//! The `Wire*` structs mirror `struct stat`, `struct timespec`,
//! `struct fuse_entry_param` and `struct statvfs` field for field; a
//! platform transport copies them into its native layout.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use thiserror::Error;

use inofs_types::{Attr, Entry, Errno, FileInfo, FsResult, StatVfs};

use super::registry::MountId;

/// Identity of the process that issued a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub uid: u32,
    pub gid: u32,
}

/// Per-request context decoded by the transport.
#[derive(Debug, Clone)]
pub struct Request {
    pub mount: MountId,
    pub caller: Caller,
}

impl Request {
    pub fn new(mount: impl Into<MountId>, uid: u32, gid: u32) -> Self {
        Self {
            mount: mount.into(),
            caller: Caller { uid, gid },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WireTimespec {
    pub sec: i64,
    pub nsec: i64,
}

impl From<SystemTime> for WireTimespec {
    fn from(t: SystemTime) -> Self {
        match t.duration_since(UNIX_EPOCH) {
            Ok(d) => Self {
                sec: d.as_secs() as i64,
                nsec: i64::from(d.subsec_nanos()),
            },
            Err(e) => {
                // Before the epoch: normalize so that 0 <= nsec < 1e9.
                let d = e.duration();
                let mut sec = -(d.as_secs() as i64);
                let mut nsec = -i64::from(d.subsec_nanos());
                if nsec < 0 {
                    sec -= 1;
                    nsec += 1_000_000_000;
                }
                Self { sec, nsec }
            }
        }
    }
}

/// Latest and earliest times a `timespec` maps to. Out-of-range seconds
/// clamp to these instead of overflowing `SystemTime`.
const MAX_SPAN: Duration = Duration::from_secs(i64::MAX as u64 / 2);

impl From<WireTimespec> for SystemTime {
    fn from(ts: WireTimespec) -> Self {
        let nsec = Duration::from_nanos(ts.nsec.clamp(0, 999_999_999) as u64);
        let secs = Duration::from_secs(ts.sec.unsigned_abs()).min(MAX_SPAN);
        let whole = if ts.sec >= 0 {
            UNIX_EPOCH.checked_add(secs)
        } else {
            UNIX_EPOCH.checked_sub(secs)
        };
        let whole = whole.unwrap_or(UNIX_EPOCH);
        whole.checked_add(nsec).unwrap_or(whole)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WireStat {
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub blksize: u32,
    /// 512-byte blocks.
    pub blocks: u64,
    pub atime: WireTimespec,
    pub mtime: WireTimespec,
    pub ctime: WireTimespec,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WireEntry {
    pub ino: u64,
    pub generation: u64,
    pub attr: WireStat,
    pub attr_timeout: f64,
    pub entry_timeout: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WireStatVfs {
    pub bsize: u64,
    pub frsize: u64,
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub favail: u64,
    pub fsid: u64,
    pub flag: u64,
    pub namemax: u64,
}

/// Translate attributes, filling absent owner fields with the caller's.
pub fn attr_to_wire(attr: &Attr, caller: Caller) -> WireStat {
    WireStat {
        ino: attr.ino,
        mode: attr.mode,
        nlink: attr.nlink,
        uid: attr.uid.unwrap_or(caller.uid),
        gid: attr.gid.unwrap_or(caller.gid),
        size: attr.size,
        blksize: 4096,
        blocks: attr.size.div_ceil(512),
        atime: attr.atime.into(),
        mtime: attr.mtime.into(),
        ctime: attr.ctime.into(),
    }
}

/// Translate an entry. Generation `0` becomes `1`: kernel clients treat a
/// zero generation as an error.
pub fn entry_to_wire(entry: &Entry, caller: Caller) -> WireEntry {
    WireEntry {
        ino: entry.ino,
        generation: entry.generation.max(1),
        attr: attr_to_wire(&entry.attr, caller),
        attr_timeout: entry.attr_timeout.as_secs_f64(),
        entry_timeout: entry.entry_timeout.as_secs_f64(),
    }
}

/// Decode the attribute argument of a `setattr` request.
pub fn wire_to_attr(stat: &WireStat) -> Attr {
    Attr {
        ino: stat.ino,
        size: stat.size,
        mode: stat.mode,
        nlink: stat.nlink,
        uid: Some(stat.uid),
        gid: Some(stat.gid),
        atime: stat.atime.into(),
        ctime: stat.ctime.into(),
        mtime: stat.mtime.into(),
        timeout: Duration::ZERO,
    }
}

pub fn statvfs_to_wire(st: &StatVfs) -> WireStatVfs {
    WireStatVfs {
        bsize: st.block_size,
        frsize: st.block_size,
        blocks: st.blocks,
        bfree: st.blocks_free,
        bavail: st.blocks_free,
        files: st.files,
        ffree: st.files_free,
        favail: st.files_free,
        fsid: st.fsid,
        flag: st.flags.bits(),
        namemax: st.name_max,
    }
}

/// An xattr name listing did not fit the caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("xattr list needs {needed} bytes, buffer holds {capacity}")]
pub struct XattrRange {
    pub needed: usize,
    pub capacity: usize,
}

impl From<XattrRange> for Errno {
    fn from(_: XattrRange) -> Self {
        Errno::Range
    }
}

/// Pack names NUL-terminated, back to back.
pub fn encode_xattr_names(names: &[String], capacity: usize) -> Result<Vec<u8>, XattrRange> {
    let needed: usize = names.iter().map(|n| n.len() + 1).sum();
    if needed > capacity {
        return Err(XattrRange { needed, capacity });
    }
    let mut out = Vec::with_capacity(needed);
    for name in names {
        out.extend_from_slice(name.as_bytes());
        out.push(0);
    }
    Ok(out)
}

/// The single reply to one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Success with no payload.
    Ok,
    Error(Errno),
    /// No reply at all (`forget`).
    None,
    Entry(WireEntry),
    Create(WireEntry, FileInfo),
    /// Attributes and their cache timeout in seconds.
    Attr(WireStat, f64),
    Readlink(String),
    Open(FileInfo),
    Write(usize),
    Data(Vec<u8>),
    Statfs(WireStatVfs),
    /// Size needed for an xattr value or listing.
    Xattr(usize),
    /// `ERANGE`: the caller's buffer was too small. Carries the size that
    /// would have fit.
    Range { needed: usize },
}

impl From<XattrRange> for Reply {
    fn from(range: XattrRange) -> Self {
        Reply::Range {
            needed: range.needed,
        }
    }
}

/// Consume-once destination for a reply.
///
/// Returns the transport's status for delivery. `ENOENT` means the request
/// was interrupted and the reply discarded.
pub trait ReplySink: Send {
    fn send(self, reply: Reply) -> FsResult<()>;
}

impl<F> ReplySink for F
where
    F: FnOnce(Reply) -> FsResult<()> + Send,
{
    fn send(self, reply: Reply) -> FsResult<()> {
        self(reply)
    }
}

/// Records replies in memory. Cloning shares the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    replies: Arc<Mutex<Vec<Reply>>>,
    aborted: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose deliveries fail as if the request had been interrupted.
    pub fn aborting() -> Self {
        Self {
            aborted: true,
            ..Self::default()
        }
    }

    pub fn replies(&self) -> Vec<Reply> {
        self.replies.lock().clone()
    }

    pub fn last(&self) -> Option<Reply> {
        self.replies.lock().last().cloned()
    }
}

impl ReplySink for RecordingSink {
    fn send(self, reply: Reply) -> FsResult<()> {
        self.replies.lock().push(reply);
        if self.aborted {
            Err(Errno::NoEnt)
        } else {
            Ok(())
        }
    }
}
