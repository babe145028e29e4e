//! Shared status and attribute model for inofs.
//!
//! Every filesystem implementation and every transport speaks this
//! vocabulary. It has **no internal inofs dependencies**; a pure leaf crate
//! that the kernel crate builds on.
//!
//! # Key Types
//!
//! |-------------------|----------------------------------------------|
//! | Type              | Purpose                                      |
//! |-------------------|----------------------------------------------|
//! | [`Errno`]         | Closed set of failure statuses               |
//! | [`FsResult`]      | `Ok` payload or an [`Errno`]                 |
//! | [`Attr`]          | Wire-visible inode metadata                  |
//! | [`Entry`]         | Name binding: inode + generation + attrs     |
//! | [`SetAttrMask`]   | Which attribute fields `setattr` honors      |
//! | [`FileInfo`]      | Per-open flags and opaque handle             |
//! | [`ConnInfo`]      | Parameters negotiated at `init`              |
//! | [`StatVfs`]       | Filesystem statistics                        |
//! |-------------------|----------------------------------------------|

pub mod attr;
pub mod errno;
pub mod flags;
pub mod info;

pub use attr::{
    Attr, Entry, FileKind, Generation, InodeId, NEGATIVE_ID, ROOT_ID, S_IFDIR, S_IFIFO,
    S_IFLNK, S_IFMT, S_IFREG, UNKNOWN_INO,
};
pub use errno::{ErrorClass, Errno, FsResult, status_code};
pub use flags::{AccessMode, FileInfo, FsFlags, RenameFlags, SetAttrMask};
pub use info::{ConnInfo, StatVfs};
