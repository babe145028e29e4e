//! Mount registry: maps a mount id to a live filesystem instance.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::RwLock;
use tracing::info;

use super::ops::FileSystem;

/// Opaque session identifier chosen by the transport, usually the
/// mountpoint path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MountId(String);

impl MountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Registered,
    Initialized,
    Destroyed,
}

/// A registered filesystem plus its init/destroy state.
pub(crate) struct Mount {
    pub(crate) fs: Arc<dyn FileSystem>,
    lifecycle: Mutex<Lifecycle>,
}

impl Mount {
    fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            lifecycle: Mutex::new(Lifecycle::Registered),
        }
    }

    /// Claim the one `init` call. False if already initialized or destroyed.
    pub(crate) fn begin_init(&self) -> bool {
        let mut state = self.lifecycle.lock();
        if *state == Lifecycle::Registered {
            *state = Lifecycle::Initialized;
            true
        } else {
            false
        }
    }

    /// Claim the one `destroy` call. False unless initialized.
    pub(crate) fn begin_destroy(&self) -> bool {
        let mut state = self.lifecycle.lock();
        if *state == Lifecycle::Initialized {
            *state = Lifecycle::Destroyed;
            true
        } else {
            false
        }
    }
}

/// Maps mount ids to filesystem instances.
///
/// Lookups take a shared lock; registration changes take it exclusively.
/// Construct independent registries freely, or use [`FsRegistry::global`]
/// for a process-wide one.
pub struct FsRegistry {
    mounts: RwLock<HashMap<MountId, Arc<Mount>>>,
}

impl fmt::Debug for FsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsRegistry")
            .field("mounts", &"<locked>")
            .finish()
    }
}

impl Default for FsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FsRegistry {
    pub fn new() -> Self {
        Self {
            mounts: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide registry, created on first use and never torn down.
    pub fn global() -> &'static FsRegistry {
        static GLOBAL: OnceLock<FsRegistry> = OnceLock::new();
        GLOBAL.get_or_init(FsRegistry::new)
    }

    /// Register `fs` under `id`.
    ///
    /// Replaces and returns any filesystem already registered under `id`.
    pub async fn register(
        &self,
        id: impl Into<MountId>,
        fs: impl FileSystem + 'static,
    ) -> Option<Arc<dyn FileSystem>> {
        self.register_arc(id, Arc::new(fs)).await
    }

    /// Register a filesystem already wrapped in `Arc`.
    pub async fn register_arc(
        &self,
        id: impl Into<MountId>,
        fs: Arc<dyn FileSystem>,
    ) -> Option<Arc<dyn FileSystem>> {
        let id = id.into();
        let mut mounts = self.mounts.write().await;
        let previous = mounts.insert(id.clone(), Arc::new(Mount::new(fs)));
        info!(mount = %id, replaced = previous.is_some(), "filesystem registered");
        previous.map(|m| m.fs.clone())
    }

    /// Remove the registration for `id`, returning it if present.
    pub async fn deregister(&self, id: &MountId) -> Option<Arc<dyn FileSystem>> {
        let mut mounts = self.mounts.write().await;
        let removed = mounts.remove(id);
        if removed.is_some() {
            info!(mount = %id, "filesystem deregistered");
        }
        removed.map(|m| m.fs.clone())
    }

    pub async fn contains(&self, id: &MountId) -> bool {
        self.mounts.read().await.contains_key(id)
    }

    /// All registered ids, sorted.
    pub async fn list(&self) -> Vec<MountId> {
        let mounts = self.mounts.read().await;
        let mut ids: Vec<MountId> = mounts.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn try_resolve(&self, id: &MountId) -> Option<Arc<dyn FileSystem>> {
        self.mounts.read().await.get(id).map(|m| m.fs.clone())
    }

    /// Resolve `id` to its filesystem.
    ///
    /// # Panics
    ///
    /// If `id` is not registered. A transport only issues requests for
    /// sessions it registered, so this is a bug in the caller.
    pub async fn resolve(&self, id: &MountId) -> Arc<dyn FileSystem> {
        self.mount(id).await.fs.clone()
    }

    pub(crate) async fn mount(&self, id: &MountId) -> Arc<Mount> {
        let mounts = self.mounts.read().await;
        match mounts.get(id) {
            Some(mount) => mount.clone(),
            None => panic!("no filesystem registered for mount {id}"),
        }
    }
}
