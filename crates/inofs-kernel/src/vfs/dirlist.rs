//! Directory listing protocol.
//!
//! `readdir` offers `(name, ino, mode, next)` tuples to a [`DirEntryWriter`]
//! one at a time. `next` is the cursor a later call passes as `offset` to
//! resume right after that tuple. A writer that rejects a tuple is full; the
//! producer stops and reports success.

use inofs_types::{InodeId, S_IFMT};

/// Consumer side of a directory enumeration.
pub trait DirEntryWriter: Send {
    /// Offer one entry. Returns `false` when there is no room for it.
    fn add(&mut self, name: &str, ino: InodeId, mode: u32, next: u64) -> bool;
}

/// Fixed part of a kernel dirent: ino, off, namelen, type.
const DIRENT_HEADER: usize = 24;

/// Size of one packed dirent, padded to 8 bytes.
pub fn dirent_size(name_len: usize) -> usize {
    (DIRENT_HEADER + name_len + 7) & !7
}

/// Packs entries in the kernel's dirent layout into a reply buffer bounded
/// by the size the caller asked for.
#[derive(Debug)]
pub struct DirBuf {
    buf: Vec<u8>,
    capacity: usize,
}

impl DirBuf {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity.min(64 * 1024)),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl DirEntryWriter for DirBuf {
    fn add(&mut self, name: &str, ino: InodeId, mode: u32, next: u64) -> bool {
        let size = dirent_size(name.len());
        if size > self.remaining() {
            return false;
        }
        let start = self.buf.len();
        self.buf.extend_from_slice(&ino.to_ne_bytes());
        self.buf.extend_from_slice(&next.to_ne_bytes());
        self.buf.extend_from_slice(&(name.len() as u32).to_ne_bytes());
        self.buf.extend_from_slice(&((mode & S_IFMT) >> 12).to_ne_bytes());
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.resize(start + size, 0);
        true
    }
}

/// One decoded or collected directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirRecord {
    pub name: String,
    pub ino: InodeId,
    /// Type bits only when decoded from a packed buffer.
    pub mode: u32,
    pub next: u64,
}

/// Decode a buffer produced by [`DirBuf`]. Stops at the first truncated
/// record.
pub fn decode_dirents(mut bytes: &[u8]) -> Vec<DirRecord> {
    let mut out = Vec::new();
    while bytes.len() >= DIRENT_HEADER {
        let word = |at: usize| u64::from_ne_bytes(bytes[at..at + 8].try_into().unwrap_or([0; 8]));
        let half = |at: usize| u32::from_ne_bytes(bytes[at..at + 4].try_into().unwrap_or([0; 4]));
        let ino = word(0);
        let next = word(8);
        let name_len = half(16) as usize;
        let kind = half(20);
        let size = dirent_size(name_len);
        if bytes.len() < DIRENT_HEADER + name_len {
            break;
        }
        let name = String::from_utf8_lossy(&bytes[DIRENT_HEADER..DIRENT_HEADER + name_len]);
        out.push(DirRecord {
            name: name.into_owned(),
            ino,
            mode: kind << 12,
            next,
        });
        bytes = &bytes[size.min(bytes.len())..];
    }
    out
}

/// Collects entries as owned records, optionally capped at `limit` entries.
#[derive(Debug, Default)]
pub struct DirListing {
    records: Vec<DirRecord>,
    limit: Option<usize>,
}

impl DirListing {
    /// Unbounded listing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept at most `limit` entries.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            records: Vec::new(),
            limit: Some(limit),
        }
    }

    pub fn records(&self) -> &[DirRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<DirRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Cursor of the last accepted entry, for resuming.
    pub fn last_cursor(&self) -> Option<u64> {
        self.records.last().map(|r| r.next)
    }
}

impl DirEntryWriter for DirListing {
    fn add(&mut self, name: &str, ino: InodeId, mode: u32, next: u64) -> bool {
        if self.limit.is_some_and(|limit| self.records.len() >= limit) {
            return false;
        }
        self.records.push(DirRecord {
            name: name.to_string(),
            ino,
            mode,
            next,
        });
        true
    }
}
