//! In-memory reference filesystem.
//!
//! Every call holds one exclusive lock over the whole node table for its
//! duration, so each operation is atomic with respect to every other. All
//! data is lost when dropped.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use inofs_types::{
    Attr, ConnInfo, Entry, Errno, FileInfo, FileKind, FsResult, Generation, InodeId, ROOT_ID,
    RenameFlags, S_IFDIR, S_IFMT, S_IFREG, SetAttrMask, StatVfs,
};

use crate::config::{ConfigError, GenerationPolicy, MemFsConfig};
use crate::vfs::dirlist::DirEntryWriter;
use crate::vfs::ops::FileSystem;

#[derive(Debug)]
enum NodeKind {
    Directory {
        /// Non-owning back-reference; `None` only for the root.
        parent: Option<InodeId>,
        children: BTreeMap<String, InodeId>,
    },
    File {
        data: Vec<u8>,
    },
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    /// Permission bits only; type bits come from `kind`.
    perm: u32,
    uid: Option<u32>,
    gid: Option<u32>,
    atime: SystemTime,
    ctime: SystemTime,
    mtime: SystemTime,
    generation: Generation,
}

impl Node {
    fn new(kind: NodeKind, perm: u32, generation: Generation, now: SystemTime) -> Self {
        Self {
            kind,
            perm: perm & !S_IFMT,
            uid: None,
            gid: None,
            atime: now,
            ctime: now,
            mtime: now,
            generation,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    fn mode(&self) -> u32 {
        let type_bits = if self.is_dir() { S_IFDIR } else { S_IFREG };
        type_bits | self.perm
    }

    fn touch(&mut self, now: SystemTime) {
        self.mtime = now;
        self.ctime = now;
    }
}

/// The node table. Owns every node; directories refer to children by id.
#[derive(Debug)]
struct Tree {
    nodes: HashMap<InodeId, Node>,
    next_id: InodeId,
    next_generation: Generation,
    policy: GenerationPolicy,
}

impl Tree {
    fn new(root_mode: u32, policy: GenerationPolicy) -> Self {
        let now = SystemTime::now();
        let seed = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
            .max(1);
        let root = Node::new(
            NodeKind::Directory {
                parent: None,
                children: BTreeMap::new(),
            },
            root_mode,
            seed,
            now,
        );
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_ID, root);
        Self {
            nodes,
            next_id: ROOT_ID + 1,
            next_generation: seed,
            policy,
        }
    }

    fn node(&self, ino: InodeId) -> FsResult<&Node> {
        self.nodes.get(&ino).ok_or(Errno::NoEnt)
    }

    fn node_mut(&mut self, ino: InodeId) -> FsResult<&mut Node> {
        self.nodes.get_mut(&ino).ok_or(Errno::NoEnt)
    }

    fn children(&self, ino: InodeId) -> FsResult<&BTreeMap<String, InodeId>> {
        match &self.node(ino)?.kind {
            NodeKind::Directory { children, .. } => Ok(children),
            NodeKind::File { .. } => Err(Errno::NotDir),
        }
    }

    fn children_mut(&mut self, ino: InodeId) -> FsResult<&mut BTreeMap<String, InodeId>> {
        match &mut self.node_mut(ino)?.kind {
            NodeKind::Directory { children, .. } => Ok(children),
            NodeKind::File { .. } => Err(Errno::NotDir),
        }
    }

    fn child(&self, parent: InodeId, name: &str) -> FsResult<InodeId> {
        self.children(parent)?
            .get(name)
            .copied()
            .ok_or(Errno::NoEnt)
    }

    /// Parent of a directory; the root is its own parent.
    fn parent_of(&self, ino: InodeId) -> FsResult<InodeId> {
        match &self.node(ino)?.kind {
            NodeKind::Directory { parent, .. } => Ok(parent.unwrap_or(ino)),
            NodeKind::File { .. } => Err(Errno::NotDir),
        }
    }

    /// True if `ancestor` is `ino` or lies on its parent chain.
    fn is_ancestor(&self, ancestor: InodeId, ino: InodeId) -> bool {
        let mut current = ino;
        loop {
            if current == ancestor {
                return true;
            }
            match self.nodes.get(&current).map(|n| &n.kind) {
                Some(NodeKind::Directory {
                    parent: Some(parent),
                    ..
                }) => current = *parent,
                _ => return false,
            }
        }
    }

    fn generation(&mut self) -> Generation {
        match self.policy {
            GenerationPolicy::Shared => self.next_generation,
            GenerationPolicy::PerInode => {
                self.next_generation += 1;
                self.next_generation
            }
        }
    }

    /// Bind a new node under `parent`. Fails `EEXIST` if the name is taken.
    fn insert(
        &mut self,
        parent: InodeId,
        name: &str,
        kind: NodeKind,
        perm: u32,
        now: SystemTime,
    ) -> FsResult<InodeId> {
        if self.children(parent)?.contains_key(name) {
            return Err(Errno::Exist);
        }
        let ino = self.next_id;
        self.next_id += 1;
        let generation = self.generation();
        self.nodes.insert(ino, Node::new(kind, perm, generation, now));
        self.children_mut(parent)?.insert(name.to_string(), ino);
        self.node_mut(parent)?.touch(now);
        Ok(ino)
    }

    /// Drop the binding `parent/name` and the node it refers to.
    fn remove(&mut self, parent: InodeId, name: &str, ino: InodeId, now: SystemTime) {
        if let Ok(children) = self.children_mut(parent) {
            children.remove(name);
        }
        if let Ok(node) = self.node_mut(parent) {
            node.touch(now);
        }
        self.nodes.remove(&ino);
    }

    fn nlink(&self, node: &Node) -> u32 {
        match &node.kind {
            NodeKind::Directory { children, .. } => {
                let subdirs = children
                    .values()
                    .filter(|c| self.nodes.get(*c).is_some_and(Node::is_dir))
                    .count();
                2 + subdirs as u32
            }
            NodeKind::File { .. } => 1,
        }
    }
}

/// In-memory filesystem implementing the full capability contract.
///
/// The root directory (inode 1) exists from construction. Symlinks, hard
/// links, xattrs and `access` are not supported.
pub struct MemFs {
    tree: Mutex<Tree>,
    config: MemFsConfig,
}

impl std::fmt::Debug for MemFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemFs")
            .field("config", &self.config)
            .field("tree", &"<locked>")
            .finish()
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFs {
    /// Create a filesystem holding only an empty root directory.
    pub fn new() -> Self {
        Self::build(MemFsConfig::default())
    }

    /// Create a filesystem with `config`, rejecting settings that
    /// [`MemFsConfig::validate`] refuses.
    pub fn with_config(config: MemFsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: MemFsConfig) -> Self {
        Self {
            tree: Mutex::new(Tree::new(config.root_mode, config.generation)),
            config,
        }
    }

    /// Check that a file may grow to `len` bytes and reserve the room.
    ///
    /// Sizes above `max_file_size` fail `EINVAL`; an allocation the host
    /// refuses fails `EIO`.
    fn reserve(&self, contents: &mut Vec<u8>, len: u64) -> FsResult<usize> {
        if len > self.config.max_file_size {
            debug!(len, max = self.config.max_file_size, "file size over limit");
            return Err(Errno::Inval);
        }
        let len = usize::try_from(len).map_err(|_| Errno::Inval)?;
        if let Some(extra) = len.checked_sub(contents.len()) {
            contents.try_reserve_exact(extra).map_err(|e| {
                debug!(len, error = %e, "file growth refused");
                Errno::Io
            })?;
        }
        Ok(len)
    }

    pub fn config(&self) -> &MemFsConfig {
        &self.config
    }

    /// Number of live inodes, root included.
    pub fn inode_count(&self) -> usize {
        self.tree.lock().nodes.len()
    }

    fn attr(&self, tree: &Tree, ino: InodeId) -> FsResult<Attr> {
        let node = tree.node(ino)?;
        let size = match &node.kind {
            NodeKind::Directory { children, .. } => children.len() as u64,
            NodeKind::File { data } => data.len() as u64,
        };
        Ok(Attr {
            ino,
            size,
            mode: node.mode(),
            nlink: tree.nlink(node),
            uid: node.uid,
            gid: node.gid,
            atime: node.atime,
            ctime: node.ctime,
            mtime: node.mtime,
            timeout: self.config.attr_timeout(),
        })
    }

    fn entry(&self, tree: &Tree, ino: InodeId) -> FsResult<Entry> {
        Ok(Entry {
            ino,
            generation: tree.node(ino)?.generation,
            attr: self.attr(tree, ino)?,
            attr_timeout: self.config.attr_timeout(),
            entry_timeout: self.config.entry_timeout(),
        })
    }

    fn check_name(&self, name: &str) -> FsResult<()> {
        if name == "." || name == ".." {
            return Err(Errno::Exist);
        }
        if name.is_empty() || name.contains('/') || name.len() as u64 > self.config.name_max {
            return Err(Errno::Inval);
        }
        Ok(())
    }

    fn make_node(&self, parent: InodeId, name: &str, kind: NodeKind, mode: u32) -> FsResult<Entry> {
        self.check_name(name)?;
        let mut tree = self.tree.lock();
        let ino = tree.insert(parent, name, kind, mode, SystemTime::now())?;
        self.entry(&tree, ino)
    }
}

#[async_trait]
impl FileSystem for MemFs {
    async fn init(&self, conn: &mut ConnInfo) {
        debug!(
            proto_major = conn.proto_major,
            proto_minor = conn.proto_minor,
            max_write = conn.max_write,
            "memfs init"
        );
    }

    async fn destroy(&self) {
        debug!(inodes = self.inode_count(), "memfs destroy");
    }

    async fn lookup(&self, parent: InodeId, name: &str) -> FsResult<Entry> {
        let tree = self.tree.lock();
        let ino = match name {
            "." => {
                tree.children(parent)?;
                parent
            }
            ".." => tree.parent_of(parent)?,
            _ => tree.child(parent, name)?,
        };
        self.entry(&tree, ino)
    }

    async fn getattr(&self, ino: InodeId, _fi: Option<&FileInfo>) -> FsResult<Attr> {
        let tree = self.tree.lock();
        self.attr(&tree, ino)
    }

    async fn setattr(
        &self,
        ino: InodeId,
        attr: &Attr,
        mask: SetAttrMask,
        _fi: Option<&FileInfo>,
    ) -> FsResult<Attr> {
        let now = SystemTime::now();
        let mut tree = self.tree.lock();
        let node = tree.node_mut(ino)?;

        // Validate and reserve before touching anything so a failure
        // changes nothing.
        let new_len = if mask.contains(SetAttrMask::SIZE) {
            let NodeKind::File { data } = &mut node.kind else {
                return Err(Errno::IsDir);
            };
            Some(self.reserve(data, attr.size)?)
        } else {
            None
        };

        if mask.contains(SetAttrMask::MODE) {
            node.perm = attr.mode & !S_IFMT;
        }
        if mask.contains(SetAttrMask::UID) {
            node.uid = attr.uid;
        }
        if mask.contains(SetAttrMask::GID) {
            node.gid = attr.gid;
        }
        if let (Some(len), NodeKind::File { data }) = (new_len, &mut node.kind) {
            data.resize(len, 0);
            node.mtime = now;
        }
        if mask.contains(SetAttrMask::ATIME_NOW) {
            node.atime = now;
        } else if mask.contains(SetAttrMask::ATIME) {
            node.atime = attr.atime;
        }
        if mask.contains(SetAttrMask::MTIME_NOW) {
            node.mtime = now;
        } else if mask.contains(SetAttrMask::MTIME) {
            node.mtime = attr.mtime;
        }
        if !mask.is_empty() {
            node.ctime = now;
        }
        debug!(ino, ?mask, "setattr");
        self.attr(&tree, ino)
    }

    async fn statfs(&self, _ino: InodeId) -> FsResult<StatVfs> {
        let tree = self.tree.lock();
        let bytes: u64 = tree
            .nodes
            .values()
            .map(|n| match &n.kind {
                NodeKind::File { data } => data.len() as u64,
                NodeKind::Directory { .. } => 0,
            })
            .sum();
        Ok(StatVfs {
            block_size: self.config.block_size,
            blocks: bytes.div_ceil(self.config.block_size),
            files: tree.nodes.len() as u64,
            name_max: self.config.name_max,
            ..StatVfs::default()
        })
    }

    async fn opendir(&self, ino: InodeId, _fi: &mut FileInfo) -> FsResult<()> {
        self.tree.lock().children(ino).map(|_| ())
    }

    async fn readdir(
        &self,
        ino: InodeId,
        _fi: &FileInfo,
        offset: u64,
        _size: usize,
        writer: &mut dyn DirEntryWriter,
    ) -> FsResult<()> {
        let tree = self.tree.lock();
        let node = tree.node(ino)?;
        let NodeKind::Directory { parent, children } = &node.kind else {
            return Err(Errno::NotDir);
        };

        if offset < 1 && !writer.add(".", ino, node.mode(), 1) {
            return Ok(());
        }
        if let Some(parent) = *parent {
            let mode = tree.node(parent).map(Node::mode).unwrap_or(S_IFDIR);
            if offset < 2 && !writer.add("..", parent, mode, 2) {
                return Ok(());
            }
        }
        // Children start at cursor 3, with or without "..".
        let skip = offset.saturating_sub(2) as usize;
        for (index, (name, &child)) in children.iter().enumerate().skip(skip) {
            let mode = tree.node(child).map(Node::mode).unwrap_or(S_IFREG);
            if !writer.add(name, child, mode, index as u64 + 3) {
                return Ok(());
            }
        }
        Ok(())
    }

    async fn fsyncdir(&self, _ino: InodeId, _datasync: bool, _fi: &FileInfo) -> FsResult<()> {
        Ok(())
    }

    async fn mknod(&self, parent: InodeId, name: &str, mode: u32, _rdev: u32) -> FsResult<Entry> {
        match FileKind::from_mode(mode) {
            None | Some(FileKind::RegularFile) => {}
            Some(_) => return Err(Errno::Inval),
        }
        debug!(parent, name, mode, "mknod");
        self.make_node(parent, name, NodeKind::File { data: Vec::new() }, mode)
    }

    async fn mkdir(&self, parent: InodeId, name: &str, mode: u32) -> FsResult<Entry> {
        debug!(parent, name, mode, "mkdir");
        let kind = NodeKind::Directory {
            parent: Some(parent),
            children: BTreeMap::new(),
        };
        self.make_node(parent, name, kind, mode)
    }

    async fn create(
        &self,
        parent: InodeId,
        name: &str,
        mode: u32,
        _fi: &mut FileInfo,
    ) -> FsResult<Entry> {
        self.mknod(parent, name, mode, 0).await
    }

    async fn rmdir(&self, parent: InodeId, name: &str) -> FsResult<()> {
        let mut tree = self.tree.lock();
        let ino = tree.child(parent, name)?;
        match &tree.node(ino)?.kind {
            NodeKind::File { .. } => return Err(Errno::NotDir),
            NodeKind::Directory { children, .. } if !children.is_empty() => {
                return Err(Errno::NotEmpty);
            }
            NodeKind::Directory { .. } => {}
        }
        debug!(parent, name, ino, "rmdir");
        tree.remove(parent, name, ino, SystemTime::now());
        Ok(())
    }

    async fn unlink(&self, parent: InodeId, name: &str) -> FsResult<()> {
        let mut tree = self.tree.lock();
        let ino = tree.child(parent, name)?;
        if tree.node(ino)?.is_dir() {
            return Err(Errno::IsDir);
        }
        debug!(parent, name, ino, "unlink");
        tree.remove(parent, name, ino, SystemTime::now());
        Ok(())
    }

    async fn rename(
        &self,
        parent: InodeId,
        name: &str,
        newparent: InodeId,
        newname: &str,
        flags: RenameFlags,
    ) -> FsResult<()> {
        if !RenameFlags::NOREPLACE.contains(flags) {
            return Err(Errno::Inval);
        }
        self.check_name(newname)?;

        let mut tree = self.tree.lock();
        let src = tree.child(parent, name)?;
        let existing = tree.children(newparent)?.get(newname).copied();
        if existing == Some(src) {
            return Ok(());
        }
        if tree.node(src)?.is_dir() && tree.is_ancestor(src, newparent) {
            return Err(Errno::Inval);
        }
        if let Some(dst) = existing {
            if flags.contains(RenameFlags::NOREPLACE) {
                return Err(Errno::Exist);
            }
            // Directories are never replaced, even by an empty one.
            if tree.node(dst)?.is_dir() {
                return Err(Errno::IsDir);
            }
        }

        debug!(parent, name, newparent, newname, ino = src, "rename");
        let now = SystemTime::now();
        if let Some(dst) = existing {
            tree.nodes.remove(&dst);
        }
        tree.children_mut(parent)?.remove(name);
        tree.children_mut(newparent)?.insert(newname.to_string(), src);
        let node = tree.node_mut(src)?;
        if let NodeKind::Directory { parent: up, .. } = &mut node.kind {
            *up = Some(newparent);
        }
        node.ctime = now;
        tree.node_mut(parent)?.touch(now);
        tree.node_mut(newparent)?.touch(now);
        Ok(())
    }

    async fn open(&self, ino: InodeId, _fi: &mut FileInfo) -> FsResult<()> {
        if self.tree.lock().node(ino)?.is_dir() {
            return Err(Errno::IsDir);
        }
        Ok(())
    }

    async fn read(
        &self,
        ino: InodeId,
        size: usize,
        offset: u64,
        _fi: &FileInfo,
    ) -> FsResult<Vec<u8>> {
        let tree = self.tree.lock();
        let NodeKind::File { data } = &tree.node(ino)?.kind else {
            return Err(Errno::IsDir);
        };
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        if start >= data.len() {
            return Ok(Vec::new());
        }
        let end = start.saturating_add(size).min(data.len());
        Ok(data[start..end].to_vec())
    }

    async fn write(
        &self,
        data: &[u8],
        ino: InodeId,
        offset: u64,
        _fi: &FileInfo,
    ) -> FsResult<usize> {
        let mut tree = self.tree.lock();
        let node = tree.node_mut(ino)?;
        let NodeKind::File { data: contents } = &mut node.kind else {
            return Err(Errno::IsDir);
        };
        if data.is_empty() {
            return Ok(0);
        }
        let end = offset.checked_add(data.len() as u64).ok_or(Errno::Inval)?;
        let end = self.reserve(contents, end)?;
        let start = end - data.len();
        if end > contents.len() {
            contents.resize(end, 0);
        }
        contents[start..end].copy_from_slice(data);
        node.touch(SystemTime::now());
        Ok(data.len())
    }

    async fn flush(&self, _ino: InodeId, _fi: &FileInfo) -> FsResult<()> {
        Ok(())
    }

    async fn release(&self, _ino: InodeId, _fi: &FileInfo) -> FsResult<()> {
        Ok(())
    }

    async fn fsync(&self, _ino: InodeId, _datasync: bool, _fi: &FileInfo) -> FsResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::dirlist::DirListing;
    use std::time::Duration;

    fn names(listing: &DirListing) -> Vec<&str> {
        listing.records().iter().map(|r| r.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_root_exists() {
        let fs = MemFs::new();
        let attr = fs.getattr(ROOT_ID, None).await.unwrap();
        assert!(attr.is_dir());
        assert_eq!(attr.perm(), 0o777);
        assert_eq!(attr.size, 0);
        assert_eq!(attr.nlink, 2);
        assert_eq!(attr.timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_create_and_read() {
        let fs = MemFs::new();
        let mut fi = FileInfo::default();
        let entry = fs.create(ROOT_ID, "test.txt", S_IFREG | 0o644, &mut fi).await.unwrap();
        assert!(entry.attr.is_file());
        assert_ne!(entry.generation, 0);

        fs.write(b"hello world", entry.ino, 0, &fi).await.unwrap();
        let data = fs.read(entry.ino, 100, 0, &fi).await.unwrap();
        assert_eq!(data, b"hello world");
        assert_eq!(fs.read(entry.ino, 5, 6, &fi).await.unwrap(), b"world");
        assert!(fs.read(entry.ino, 10, 11, &fi).await.unwrap().is_empty());
        assert!(fs.read(entry.ino, 10, u64::MAX, &fi).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_gap_zero_filled() {
        let fs = MemFs::new();
        let fi = FileInfo::default();
        let e = fs.mknod(ROOT_ID, "f", 0o644, 0).await.unwrap();
        assert_eq!(fs.write(b"xy", e.ino, 4, &fi).await, Ok(2));
        assert_eq!(fs.read(e.ino, 10, 0, &fi).await.unwrap(), b"\0\0\0\0xy");
        assert_eq!(fs.getattr(e.ino, None).await.unwrap().size, 6);
    }

    #[tokio::test]
    async fn test_mkdir_twice_fails() {
        let fs = MemFs::new();
        fs.mkdir(ROOT_ID, "d", 0o755).await.unwrap();
        assert_eq!(fs.mkdir(ROOT_ID, "d", 0o755).await, Err(Errno::Exist));
        assert_eq!(fs.mknod(ROOT_ID, "d", 0o644, 0).await, Err(Errno::Exist));
    }

    #[tokio::test]
    async fn test_create_under_file_fails() {
        let fs = MemFs::new();
        let f = fs.mknod(ROOT_ID, "f", 0o644, 0).await.unwrap();
        assert_eq!(fs.mkdir(f.ino, "d", 0o755).await, Err(Errno::NotDir));
        assert_eq!(fs.lookup(f.ino, "x").await, Err(Errno::NotDir));
        assert_eq!(fs.mkdir(999, "d", 0o755).await, Err(Errno::NoEnt));
    }

    #[tokio::test]
    async fn test_names_validated() {
        let fs = MemFs::new();
        assert_eq!(fs.mkdir(ROOT_ID, "", 0o755).await, Err(Errno::Inval));
        assert_eq!(fs.mkdir(ROOT_ID, "a/b", 0o755).await, Err(Errno::Inval));
        assert_eq!(fs.mkdir(ROOT_ID, ".", 0o755).await, Err(Errno::Exist));
        assert_eq!(fs.mknod(ROOT_ID, "..", 0o644, 0).await, Err(Errno::Exist));
        let long = "x".repeat(256);
        assert_eq!(fs.mknod(ROOT_ID, &long, 0o644, 0).await, Err(Errno::Inval));
    }

    #[tokio::test]
    async fn test_mknod_rejects_special_types() {
        let fs = MemFs::new();
        let fifo = inofs_types::S_IFIFO | 0o644;
        assert_eq!(fs.mknod(ROOT_ID, "p", fifo, 0).await, Err(Errno::Inval));
        assert_eq!(fs.mknod(ROOT_ID, "d", S_IFDIR | 0o755, 0).await, Err(Errno::Inval));
    }

    #[tokio::test]
    async fn test_lookup_dots() {
        let fs = MemFs::new();
        let d = fs.mkdir(ROOT_ID, "d", 0o755).await.unwrap();
        assert_eq!(fs.lookup(d.ino, ".").await.unwrap().ino, d.ino);
        assert_eq!(fs.lookup(d.ino, "..").await.unwrap().ino, ROOT_ID);
        assert_eq!(fs.lookup(ROOT_ID, "..").await.unwrap().ino, ROOT_ID);
    }

    #[tokio::test]
    async fn test_nlink_counts_subdirs() {
        let fs = MemFs::new();
        fs.mkdir(ROOT_ID, "a", 0o755).await.unwrap();
        fs.mkdir(ROOT_ID, "b", 0o755).await.unwrap();
        fs.mknod(ROOT_ID, "f", 0o644, 0).await.unwrap();
        let root = fs.getattr(ROOT_ID, None).await.unwrap();
        assert_eq!(root.nlink, 4);
        assert_eq!(root.size, 3);
    }

    #[tokio::test]
    async fn test_readdir_root_has_no_dotdot() {
        let fs = MemFs::new();
        fs.mknod(ROOT_ID, "b", 0o644, 0).await.unwrap();
        fs.mknod(ROOT_ID, "a", 0o644, 0).await.unwrap();
        let mut listing = DirListing::new();
        fs.readdir(ROOT_ID, &FileInfo::default(), 0, 4096, &mut listing)
            .await
            .unwrap();
        assert_eq!(names(&listing), vec![".", "a", "b"]);
        let cursors: Vec<u64> = listing.records().iter().map(|r| r.next).collect();
        assert_eq!(cursors, vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn test_readdir_subdir_cursors() {
        let fs = MemFs::new();
        let d = fs.mkdir(ROOT_ID, "d", 0o755).await.unwrap();
        let f = fs.mknod(d.ino, "f", 0o644, 0).await.unwrap();
        let mut listing = DirListing::new();
        fs.readdir(d.ino, &FileInfo::default(), 0, 4096, &mut listing)
            .await
            .unwrap();
        let records = listing.records();
        assert_eq!(names(&listing), vec![".", "..", "f"]);
        assert_eq!(records[1].ino, ROOT_ID);
        assert_eq!(records[2].ino, f.ino);
        assert_eq!(records[2].next, 3);
        assert_eq!(records[2].mode & S_IFMT, S_IFREG);

        let mut rest = DirListing::new();
        fs.readdir(d.ino, &FileInfo::default(), 2, 4096, &mut rest)
            .await
            .unwrap();
        assert_eq!(names(&rest), vec!["f"]);
    }

    #[tokio::test]
    async fn test_readdir_stops_when_full() {
        let fs = MemFs::new();
        for name in ["a", "b", "c"] {
            fs.mknod(ROOT_ID, name, 0o644, 0).await.unwrap();
        }
        let mut listing = DirListing::with_limit(2);
        let status = fs
            .readdir(ROOT_ID, &FileInfo::default(), 0, 64, &mut listing)
            .await;
        assert_eq!(status, Ok(()));
        assert_eq!(names(&listing), vec![".", "a"]);
    }

    #[tokio::test]
    async fn test_readdir_on_file() {
        let fs = MemFs::new();
        let f = fs.mknod(ROOT_ID, "f", 0o644, 0).await.unwrap();
        let mut listing = DirListing::new();
        let result = fs.readdir(f.ino, &FileInfo::default(), 0, 4096, &mut listing).await;
        assert_eq!(result, Err(Errno::NotDir));
        assert_eq!(fs.opendir(f.ino, &mut FileInfo::default()).await, Err(Errno::NotDir));
    }

    #[tokio::test]
    async fn test_open_dir_fails() {
        let fs = MemFs::new();
        let mut fi = FileInfo::default();
        assert_eq!(fs.open(ROOT_ID, &mut fi).await, Err(Errno::IsDir));
        assert_eq!(fs.read(ROOT_ID, 1, 0, &fi).await, Err(Errno::IsDir));
        assert_eq!(fs.write(b"x", ROOT_ID, 0, &fi).await, Err(Errno::IsDir));
        assert_eq!(fs.open(42, &mut fi).await, Err(Errno::NoEnt));
    }

    #[tokio::test]
    async fn test_rmdir_and_unlink_kinds() {
        let fs = MemFs::new();
        fs.mkdir(ROOT_ID, "d", 0o755).await.unwrap();
        fs.mknod(ROOT_ID, "f", 0o644, 0).await.unwrap();
        assert_eq!(fs.rmdir(ROOT_ID, "f").await, Err(Errno::NotDir));
        assert_eq!(fs.unlink(ROOT_ID, "d").await, Err(Errno::IsDir));
        assert_eq!(fs.rmdir(ROOT_ID, "missing").await, Err(Errno::NoEnt));
        assert_eq!(fs.unlink(ROOT_ID, "missing").await, Err(Errno::NoEnt));
        fs.rmdir(ROOT_ID, "d").await.unwrap();
        fs.unlink(ROOT_ID, "f").await.unwrap();
        assert_eq!(fs.inode_count(), 1);
    }

    #[tokio::test]
    async fn test_setattr_mode_and_times() {
        let fs = MemFs::new();
        let e = fs.mknod(ROOT_ID, "f", 0o644, 0).await.unwrap();
        let stamp = UNIX_EPOCH + Duration::from_secs(1_000);
        let wanted = Attr {
            mode: 0o600,
            uid: Some(7),
            mtime: stamp,
            atime: stamp,
            size: 999,
            ..Attr::default()
        };
        let mask = SetAttrMask::MODE | SetAttrMask::UID | SetAttrMask::MTIME;
        let attr = fs.setattr(e.ino, &wanted, mask, None).await.unwrap();
        assert_eq!(attr.mode, S_IFREG | 0o600);
        assert_eq!(attr.uid, Some(7));
        assert_eq!(attr.gid, None);
        assert_eq!(attr.mtime, stamp);
        assert_ne!(attr.atime, stamp);
        // SIZE was not in the mask.
        assert_eq!(attr.size, 0);
    }

    #[tokio::test]
    async fn test_setattr_size_on_dir() {
        let fs = MemFs::new();
        let d = fs.mkdir(ROOT_ID, "d", 0o755).await.unwrap();
        let wanted = Attr {
            size: 10,
            mode: 0o700,
            ..Attr::default()
        };
        let mask = SetAttrMask::SIZE | SetAttrMask::MODE;
        assert_eq!(fs.setattr(d.ino, &wanted, mask, None).await, Err(Errno::IsDir));
        // Nothing changed.
        assert_eq!(fs.getattr(d.ino, None).await.unwrap().perm(), 0o755);
    }

    #[tokio::test]
    async fn test_rename_moves_directory() {
        let fs = MemFs::new();
        let a = fs.mkdir(ROOT_ID, "a", 0o755).await.unwrap();
        let b = fs.mkdir(ROOT_ID, "b", 0o755).await.unwrap();
        fs.rename(ROOT_ID, "a", b.ino, "a2", RenameFlags::empty())
            .await
            .unwrap();
        assert_eq!(fs.lookup(ROOT_ID, "a").await, Err(Errno::NoEnt));
        assert_eq!(fs.lookup(b.ino, "a2").await.unwrap().ino, a.ino);
        assert_eq!(fs.lookup(a.ino, "..").await.unwrap().ino, b.ino);
    }

    #[tokio::test]
    async fn test_rename_into_own_subtree() {
        let fs = MemFs::new();
        let a = fs.mkdir(ROOT_ID, "a", 0o755).await.unwrap();
        let inner = fs.mkdir(a.ino, "inner", 0o755).await.unwrap();
        let none = RenameFlags::empty();
        assert_eq!(fs.rename(ROOT_ID, "a", inner.ino, "x", none).await, Err(Errno::Inval));
        assert_eq!(fs.rename(ROOT_ID, "a", a.ino, "x", none).await, Err(Errno::Inval));
    }

    #[tokio::test]
    async fn test_rename_same_binding_is_noop() {
        let fs = MemFs::new();
        let e = fs.mknod(ROOT_ID, "f", 0o644, 0).await.unwrap();
        fs.rename(ROOT_ID, "f", ROOT_ID, "f", RenameFlags::empty())
            .await
            .unwrap();
        assert_eq!(fs.lookup(ROOT_ID, "f").await.unwrap().ino, e.ino);
    }

    #[tokio::test]
    async fn test_rename_flags() {
        let fs = MemFs::new();
        fs.mknod(ROOT_ID, "a", 0o644, 0).await.unwrap();
        fs.mknod(ROOT_ID, "b", 0o644, 0).await.unwrap();
        assert_eq!(
            fs.rename(ROOT_ID, "a", ROOT_ID, "b", RenameFlags::NOREPLACE).await,
            Err(Errno::Exist)
        );
        assert_eq!(
            fs.rename(ROOT_ID, "a", ROOT_ID, "b", RenameFlags::EXCHANGE).await,
            Err(Errno::Inval)
        );
        fs.rename(ROOT_ID, "a", ROOT_ID, "c", RenameFlags::NOREPLACE)
            .await
            .unwrap();
        assert_eq!(fs.rename(ROOT_ID, "a", ROOT_ID, "d", RenameFlags::empty()).await, Err(Errno::NoEnt));
    }

    #[tokio::test]
    async fn test_statfs() {
        let fs = MemFs::new();
        let fi = FileInfo::default();
        let e = fs.mknod(ROOT_ID, "f", 0o644, 0).await.unwrap();
        fs.write(&[1u8; 5000], e.ino, 0, &fi).await.unwrap();
        let st = fs.statfs(ROOT_ID).await.unwrap();
        assert_eq!(st.files, 2);
        assert_eq!(st.blocks, 2);
        assert_eq!(st.block_size, 4096);
        assert_eq!(st.name_max, 255);
    }

    #[tokio::test]
    async fn test_generation_policies() {
        let shared = MemFs::new();
        let a = shared.mknod(ROOT_ID, "a", 0o644, 0).await.unwrap();
        let b = shared.mknod(ROOT_ID, "b", 0o644, 0).await.unwrap();
        assert_eq!(a.generation, b.generation);
        assert_ne!(a.generation, 0);

        let config = MemFsConfig {
            generation: GenerationPolicy::PerInode,
            ..MemFsConfig::default()
        };
        let per_inode = MemFs::with_config(config).unwrap();
        let a = per_inode.mknod(ROOT_ID, "a", 0o644, 0).await.unwrap();
        let b = per_inode.mknod(ROOT_ID, "b", 0o644, 0).await.unwrap();
        assert!(b.generation > a.generation);
    }

    #[tokio::test]
    async fn test_growth_over_limit_is_rejected() {
        let fs = MemFs::new();
        let fi = FileInfo::default();
        let e = fs.mknod(ROOT_ID, "f", 0o644, 0).await.unwrap();
        fs.write(b"keep", e.ino, 0, &fi).await.unwrap();

        let huge = Attr {
            size: 1 << 63,
            ..Attr::default()
        };
        assert_eq!(fs.setattr(e.ino, &huge, SetAttrMask::SIZE, None).await, Err(Errno::Inval));
        assert_eq!(fs.write(b"x", e.ino, 1 << 63, &fi).await, Err(Errno::Inval));
        assert_eq!(fs.write(b"x", e.ino, u64::MAX, &fi).await, Err(Errno::Inval));

        let limit = fs.config().max_file_size;
        assert_eq!(fs.write(b"x", e.ino, limit, &fi).await, Err(Errno::Inval));

        // Nothing changed.
        assert_eq!(fs.read(e.ino, 64, 0, &fi).await.unwrap(), b"keep");
        assert_eq!(fs.getattr(e.ino, None).await.unwrap().size, 4);
    }

    #[tokio::test]
    async fn test_growth_the_allocator_refuses_fails_eio() {
        let config = MemFsConfig {
            max_file_size: u64::MAX,
            ..MemFsConfig::default()
        };
        let fs = MemFs::with_config(config).unwrap();
        let fi = FileInfo::default();
        let e = fs.mknod(ROOT_ID, "f", 0o644, 0).await.unwrap();

        let huge = Attr {
            size: 1 << 63,
            ..Attr::default()
        };
        assert_eq!(fs.setattr(e.ino, &huge, SetAttrMask::SIZE, None).await, Err(Errno::Io));
        assert_eq!(fs.write(b"x", e.ino, 1 << 63, &fi).await, Err(Errno::Io));
        assert_eq!(fs.getattr(e.ino, None).await.unwrap().size, 0);
    }

    #[tokio::test]
    async fn test_with_config_validates() {
        let zero_blocks = MemFsConfig {
            block_size: 0,
            ..MemFsConfig::default()
        };
        assert!(matches!(
            MemFs::with_config(zero_blocks),
            Err(ConfigError::ValidationFailed(_))
        ));

        let endless = MemFsConfig {
            attr_timeout_secs: 1e20,
            ..MemFsConfig::default()
        };
        assert!(MemFs::with_config(endless).is_err());

        let fs = MemFs::with_config(MemFsConfig {
            attr_timeout_secs: 1.5,
            ..MemFsConfig::default()
        })
        .unwrap();
        let root = fs.getattr(ROOT_ID, None).await.unwrap();
        assert_eq!(root.timeout, Duration::from_millis(1500));
        assert_eq!(fs.statfs(ROOT_ID).await.unwrap().block_size, 4096);
    }

    #[tokio::test]
    async fn test_open_release_always_ok() {
        let fs = MemFs::new();
        let mut fi = FileInfo::default();
        let e = fs.mknod(ROOT_ID, "f", 0o644, 0).await.unwrap();
        fs.open(e.ino, &mut fi).await.unwrap();
        fs.unlink(ROOT_ID, "f").await.unwrap();
        assert_eq!(fs.flush(e.ino, &fi).await, Ok(()));
        assert_eq!(fs.release(e.ino, &fi).await, Ok(()));
        fs.forget(e.ino, 1).await;
    }

    #[tokio::test]
    async fn test_unsupported_defaults() {
        let fs = MemFs::new();
        assert_eq!(fs.symlink("target", ROOT_ID, "l").await, Err(Errno::NoSys));
        assert_eq!(fs.listxattr(ROOT_ID).await, Err(Errno::NoSys));
        assert_eq!(fs.access(ROOT_ID, 0).await, Err(Errno::NoSys));
    }
}
