//! Bit sets and per-open state passed alongside operations.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_bit_set {
    ($T:ident, $repr:ty) => {
        impl $T {
            /// No bits set.
            pub const fn empty() -> Self {
                Self(0)
            }

            /// Keep every bit, including ones without a named constant.
            pub const fn from_bits_retain(bits: $repr) -> Self {
                Self(bits)
            }

            pub const fn bits(self) -> $repr {
                self.0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// All bits of `other` are set in `self`.
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Any bit of `other` is set in `self`.
            pub const fn intersects(self, other: Self) -> bool {
                self.0 & other.0 != 0
            }
        }

        impl BitOr for $T {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $T {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($T), "({:#x})"), self.0)
            }
        }
    };
}

/// Selects which fields of an attribute argument are authoritative in
/// `setattr`. Unselected fields must be ignored.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SetAttrMask(u32);

impl SetAttrMask {
    pub const MODE: Self = Self(1 << 0);
    pub const UID: Self = Self(1 << 1);
    pub const GID: Self = Self(1 << 2);
    pub const SIZE: Self = Self(1 << 3);
    pub const ATIME: Self = Self(1 << 4);
    pub const MTIME: Self = Self(1 << 5);
    /// Set atime to the current time, ignoring the supplied value.
    pub const ATIME_NOW: Self = Self(1 << 7);
    /// Set mtime to the current time, ignoring the supplied value.
    pub const MTIME_NOW: Self = Self(1 << 8);
}

impl_bit_set!(SetAttrMask, u32);

/// Flags accepted by `rename`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RenameFlags(u32);

impl RenameFlags {
    /// Fail with `EEXIST` instead of replacing the target.
    pub const NOREPLACE: Self = Self(1 << 0);
    /// Atomically swap source and target.
    pub const EXCHANGE: Self = Self(1 << 1);
    pub const WHITEOUT: Self = Self(1 << 2);
}

impl_bit_set!(RenameFlags, u32);

/// Flags reported in [`StatVfs::flags`](crate::StatVfs::flags).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FsFlags(u64);

impl FsFlags {
    pub const RDONLY: Self = Self(1);
    pub const NOSUID: Self = Self(2);
}

impl_bit_set!(FsFlags, u64);

/// Read/write intent of an open, taken from the low bits of the open flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    /// Decode `flags & O_ACCMODE`. The unassigned value `3` yields `None`.
    pub fn from_flags(flags: i32) -> Option<Self> {
        match flags & libc::O_ACCMODE {
            libc::O_RDONLY => Some(AccessMode::ReadOnly),
            libc::O_WRONLY => Some(AccessMode::WriteOnly),
            libc::O_RDWR => Some(AccessMode::ReadWrite),
            _ => None,
        }
    }

    pub fn can_read(self) -> bool {
        matches!(self, AccessMode::ReadOnly | AccessMode::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, AccessMode::WriteOnly | AccessMode::ReadWrite)
    }
}

/// Per-open state shared between the transport and a filesystem.
///
/// A filesystem may stash an opaque `handle` during `open`/`opendir`/`create`;
/// the transport hands it back on every later call scoped to that open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileInfo {
    /// Open flags (`O_*`).
    pub flags: i32,
    /// Write originated from the page cache rather than a user write.
    pub writepage: bool,
    pub handle: u64,
    pub lock_owner: u64,
}

impl FileInfo {
    pub fn with_flags(flags: i32) -> Self {
        Self {
            flags,
            ..Default::default()
        }
    }

    pub fn access_mode(&self) -> Option<AccessMode> {
        AccessMode::from_flags(self.flags)
    }
}
