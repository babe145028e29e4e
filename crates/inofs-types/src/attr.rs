//! Inode attributes and naming results.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Inode number, unique within a filesystem instance while referenced.
pub type InodeId = u64;

/// Versioning number paired with an inode in every [`Entry`].
pub type Generation = u64;

/// The root directory. Always resolvable.
pub const ROOT_ID: InodeId = 1;

/// Reserved inode meaning "definitely does not exist".
pub const NEGATIVE_ID: InodeId = 0;

/// Inode value reported when the real number is not known.
pub const UNKNOWN_INO: InodeId = 0xffff_ffff;

/// File type mask.
pub const S_IFMT: u32 = 0o170000;
/// Directory.
pub const S_IFDIR: u32 = 0o040000;
/// Regular file.
pub const S_IFREG: u32 = 0o100000;
/// Symbolic link.
pub const S_IFLNK: u32 = 0o120000;
/// Named pipe.
pub const S_IFIFO: u32 = 0o010000;

/// Node type, decoded from the type bits of a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    RegularFile,
    Symlink,
    Fifo,
}

impl FileKind {
    /// Decode the type bits of `mode`. Unknown types yield `None`.
    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode & S_IFMT {
            S_IFDIR => Some(FileKind::Directory),
            S_IFREG => Some(FileKind::RegularFile),
            S_IFLNK => Some(FileKind::Symlink),
            S_IFIFO => Some(FileKind::Fifo),
            _ => None,
        }
    }

    /// Type bits for this kind, suitable for or-ing into a mode.
    pub fn type_bits(self) -> u32 {
        match self {
            FileKind::Directory => S_IFDIR,
            FileKind::RegularFile => S_IFREG,
            FileKind::Symlink => S_IFLNK,
            FileKind::Fifo => S_IFIFO,
        }
    }
}

/// Wire-visible metadata for one inode.
///
/// Directory `size` is the child count; file `size` is the byte length.
/// `uid`/`gid` left as `None` are filled with the caller's identity on the
/// way out.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub ino: InodeId,
    pub size: u64,
    /// Permission and type bits.
    pub mode: u32,
    pub nlink: u32,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub atime: SystemTime,
    pub ctime: SystemTime,
    pub mtime: SystemTime,
    /// How long the client may cache these attributes.
    pub timeout: Duration,
}

impl Default for Attr {
    fn default() -> Self {
        Self {
            ino: NEGATIVE_ID,
            size: 0,
            mode: 0,
            nlink: 0,
            uid: None,
            gid: None,
            atime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            timeout: Duration::ZERO,
        }
    }
}

impl Attr {
    /// Attributes for a regular file with the given permission bits.
    pub fn file(ino: InodeId, size: u64, perm: u32) -> Self {
        Self {
            ino,
            size,
            mode: S_IFREG | (perm & !S_IFMT),
            nlink: 1,
            ..Default::default()
        }
    }

    /// Attributes for a directory with the given permission bits.
    pub fn directory(ino: InodeId, perm: u32) -> Self {
        Self {
            ino,
            mode: S_IFDIR | (perm & !S_IFMT),
            nlink: 2,
            ..Default::default()
        }
    }

    pub fn kind(&self) -> Option<FileKind> {
        FileKind::from_mode(self.mode)
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == Some(FileKind::Directory)
    }

    pub fn is_file(&self) -> bool {
        self.kind() == Some(FileKind::RegularFile)
    }

    /// Permission bits only.
    pub fn perm(&self) -> u32 {
        self.mode & !S_IFMT
    }
}

/// Result of any operation that (re)binds a name to an inode.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub ino: InodeId,
    pub generation: Generation,
    pub attr: Attr,
    /// Validity of `attr` in the client cache.
    pub attr_timeout: Duration,
    /// Validity of the name binding in the client cache.
    pub entry_timeout: Duration,
}

impl Entry {
    /// A cacheable "does not exist" result.
    pub fn negative(entry_timeout: Duration) -> Self {
        Self {
            ino: NEGATIVE_ID,
            generation: 0,
            attr: Attr::default(),
            attr_timeout: Duration::ZERO,
            entry_timeout,
        }
    }

    pub fn is_negative(&self) -> bool {
        self.ino == NEGATIVE_ID
    }
}
