//! Behavioral properties of the in-memory reference filesystem.
//!
//! Every test drives `MemFs` purely through the `FileSystem` trait, the
//! same surface any other implementation is checked against.

use std::sync::Arc;

use inofs_kernel::{DirListing, FileSystem, MemFs};
use inofs_types::{Attr, Errno, FileInfo, ROOT_ID, RenameFlags, S_IFREG, SetAttrMask};

// ============================================================================
// Shared helpers
// ============================================================================

fn fi() -> FileInfo {
    FileInfo::default()
}

/// Read a whole directory by resuming after each page of `page` entries.
async fn list_paged(fs: &MemFs, ino: u64, page: usize) -> Vec<String> {
    let mut names = Vec::new();
    let mut offset = 0;
    loop {
        let mut listing = DirListing::with_limit(page);
        fs.readdir(ino, &fi(), offset, 4096, &mut listing).await.unwrap();
        let Some(last) = listing.last_cursor() else {
            break;
        };
        offset = last;
        names.extend(listing.into_records().into_iter().map(|r| r.name));
    }
    names
}

async fn list_all(fs: &MemFs, ino: u64) -> Vec<String> {
    let mut listing = DirListing::new();
    fs.readdir(ino, &fi(), 0, usize::MAX, &mut listing).await.unwrap();
    listing.into_records().into_iter().map(|r| r.name).collect()
}

// ============================================================================
// Naming
// ============================================================================

#[tokio::test]
async fn created_nodes_are_found_by_lookup() {
    let fs = MemFs::new();
    let mut open = fi();
    let d = fs.mkdir(ROOT_ID, "dir", 0o755).await.unwrap();
    let n = fs.mknod(d.ino, "node", S_IFREG | 0o644, 0).await.unwrap();
    let c = fs.create(d.ino, "created", 0o600, &mut open).await.unwrap();

    for (parent, name, ino) in [(ROOT_ID, "dir", d.ino), (d.ino, "node", n.ino), (d.ino, "created", c.ino)] {
        let found = fs.lookup(parent, name).await.unwrap();
        assert_eq!(found.ino, ino, "{name}");
        assert_ne!(found.generation, 0, "{name}");
    }
}

#[tokio::test]
async fn rmdir_requires_empty_directory() {
    let fs = MemFs::new();
    let d = fs.mkdir(ROOT_ID, "d", 0o755).await.unwrap();
    fs.mknod(d.ino, "a", 0o644, 0).await.unwrap();
    fs.mkdir(d.ino, "b", 0o755).await.unwrap();

    assert_eq!(fs.rmdir(ROOT_ID, "d").await, Err(Errno::NotEmpty));
    fs.unlink(d.ino, "a").await.unwrap();
    assert_eq!(fs.rmdir(ROOT_ID, "d").await, Err(Errno::NotEmpty));
    fs.rmdir(d.ino, "b").await.unwrap();

    assert_eq!(fs.rmdir(ROOT_ID, "d").await, Ok(()));
    assert_eq!(fs.lookup(ROOT_ID, "d").await, Err(Errno::NoEnt));
    assert_eq!(fs.getattr(d.ino, None).await, Err(Errno::NoEnt));
}

// ============================================================================
// Data
// ============================================================================

#[tokio::test]
async fn write_then_read_round_trips() {
    let fs = MemFs::new();
    let big: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    for (name, data) in [("empty", Vec::new()), ("one", vec![0x7f]), ("big", big)] {
        let e = fs.mknod(ROOT_ID, name, 0o644, 0).await.unwrap();
        // Two writes so the second crosses the first one's end.
        let split = data.len() / 3;
        assert_eq!(fs.write(&data[..split], e.ino, 0, &fi()).await, Ok(split));
        let rest = fs.write(&data[split..], e.ino, split as u64, &fi()).await;
        assert_eq!(rest, Ok(data.len() - split));

        let read = fs.read(e.ino, data.len(), 0, &fi()).await.unwrap();
        assert_eq!(read, data, "{name}");
    }
}

#[tokio::test]
async fn truncate_then_extend_zero_fills() {
    let fs = MemFs::new();
    let e = fs.mknod(ROOT_ID, "f", 0o644, 0).await.unwrap();
    let original: Vec<u8> = (1..=100u8).collect();
    fs.write(&original, e.ino, 0, &fi()).await.unwrap();

    let size = |n| Attr {
        size: n,
        ..Attr::default()
    };
    let shrunk = fs.setattr(e.ino, &size(10), SetAttrMask::SIZE, None).await.unwrap();
    assert_eq!(shrunk.size, 10);
    let grown = fs.setattr(e.ino, &size(50), SetAttrMask::SIZE, None).await.unwrap();
    assert_eq!(grown.size, 50);

    let data = fs.read(e.ino, 100, 0, &fi()).await.unwrap();
    assert_eq!(data.len(), 50);
    assert_eq!(&data[..10], &original[..10]);
    assert!(data[10..].iter().all(|&b| b == 0));
}

// ============================================================================
// Directory pagination
// ============================================================================

#[tokio::test]
async fn paged_listing_matches_single_listing() {
    for count in [0usize, 1, 50] {
        let fs = MemFs::new();
        let d = fs.mkdir(ROOT_ID, "d", 0o755).await.unwrap();
        for i in 0..count {
            fs.mknod(d.ino, &format!("child-{i:03}"), 0o644, 0).await.unwrap();
        }

        let whole = list_all(&fs, d.ino).await;
        assert_eq!(whole.len(), count + 2);
        assert_eq!(&whole[..2], &[".", ".."]);

        for page in [1, 2, 7] {
            assert_eq!(list_paged(&fs, d.ino, page).await, whole, "count={count} page={page}");
        }
    }
}

#[tokio::test]
async fn paged_root_listing_skips_dotdot() {
    let fs = MemFs::new();
    for i in 0..5 {
        fs.mkdir(ROOT_ID, &format!("d{i}"), 0o755).await.unwrap();
    }
    let whole = list_all(&fs, ROOT_ID).await;
    assert_eq!(whole, vec![".", "d0", "d1", "d2", "d3", "d4"]);
    assert_eq!(list_paged(&fs, ROOT_ID, 1).await, whole);
}

// ============================================================================
// Rename
// ============================================================================

#[tokio::test]
async fn rename_overwrites_file() {
    let fs = MemFs::new();
    let a = fs.mknod(ROOT_ID, "a", 0o644, 0).await.unwrap();
    let b = fs.mknod(ROOT_ID, "b", 0o644, 0).await.unwrap();
    fs.write(b"from a", a.ino, 0, &fi()).await.unwrap();
    fs.write(b"from b", b.ino, 0, &fi()).await.unwrap();

    fs.rename(ROOT_ID, "a", ROOT_ID, "b", RenameFlags::empty()).await.unwrap();

    assert_eq!(fs.lookup(ROOT_ID, "a").await, Err(Errno::NoEnt));
    let now_b = fs.lookup(ROOT_ID, "b").await.unwrap();
    assert_eq!(now_b.ino, a.ino);
    assert_eq!(fs.read(now_b.ino, 64, 0, &fi()).await.unwrap(), b"from a");
    assert_eq!(fs.getattr(b.ino, None).await, Err(Errno::NoEnt));
}

#[tokio::test]
async fn rename_onto_directory_always_fails() {
    let fs = MemFs::new();
    fs.mknod(ROOT_ID, "file", 0o644, 0).await.unwrap();
    fs.mkdir(ROOT_ID, "dir", 0o755).await.unwrap();
    fs.mkdir(ROOT_ID, "empty", 0o755).await.unwrap();
    let none = RenameFlags::empty();

    assert_eq!(fs.rename(ROOT_ID, "file", ROOT_ID, "empty", none).await, Err(Errno::IsDir));
    assert_eq!(fs.rename(ROOT_ID, "dir", ROOT_ID, "empty", none).await, Err(Errno::IsDir));
    // Both sources still where they were.
    assert!(fs.lookup(ROOT_ID, "file").await.is_ok());
    assert!(fs.lookup(ROOT_ID, "dir").await.is_ok());
}

#[tokio::test]
async fn rename_directory_over_file_replaces_file() {
    let fs = MemFs::new();
    let d = fs.mkdir(ROOT_ID, "d", 0o755).await.unwrap();
    fs.mknod(ROOT_ID, "f", 0o644, 0).await.unwrap();
    fs.rename(ROOT_ID, "d", ROOT_ID, "f", RenameFlags::empty()).await.unwrap();
    let moved = fs.lookup(ROOT_ID, "f").await.unwrap();
    assert_eq!(moved.ino, d.ino);
    assert!(moved.attr.is_dir());
}

// ============================================================================
// Walkthrough
// ============================================================================

#[tokio::test]
async fn directory_with_file_walkthrough() {
    let fs = MemFs::new();
    let n = fs.mkdir(ROOT_ID, "d", 0o755).await.unwrap().ino;
    assert!(n > ROOT_ID);
    let m = fs.mknod(n, "f", 0o644, 0).await.unwrap().ino;
    assert_ne!(m, n);

    assert_eq!(fs.write(b"hi", m, 0, &fi()).await, Ok(2));
    assert_eq!(fs.read(m, 2, 0, &fi()).await.unwrap(), b"hi");
    assert_eq!(fs.rmdir(ROOT_ID, "d").await, Err(Errno::NotEmpty));
    assert_eq!(fs.unlink(n, "f").await, Ok(()));
    assert_eq!(fs.rmdir(ROOT_ID, "d").await, Ok(()));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rename_never_exposes_both_names() {
    let fs = Arc::new(MemFs::new());
    fs.mknod(ROOT_ID, "target", 0o644, 0).await.unwrap();

    let mut writers = Vec::new();
    for i in 0..4 {
        let fs = fs.clone();
        writers.push(tokio::spawn(async move {
            for j in 0..50 {
                let name = format!("src-{i}-{j}");
                fs.mknod(ROOT_ID, &name, 0o644, 0).await.unwrap();
                fs.rename(ROOT_ID, &name, ROOT_ID, "target", RenameFlags::empty())
                    .await
                    .unwrap();
            }
        }));
    }

    let reader = {
        let fs = fs.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                let names = list_all(&fs, ROOT_ID).await;
                // Only ".", "target", and at most one in-flight source per writer.
                assert!(names.contains(&"target".to_string()));
                assert!(names.len() <= 2 + 4, "{names:?}");
                tokio::task::yield_now().await;
            }
        })
    };

    for w in writers {
        w.await.unwrap();
    }
    reader.await.unwrap();
    assert_eq!(list_all(&fs, ROOT_ID).await, vec![".", "target"]);
    assert_eq!(fs.inode_count(), 2);
}
