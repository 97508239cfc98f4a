//! # KV Store and Pager
//!
//! This module owns the database file, the mapped region, the page
//! allocator, and the master page. It implements the [`PageStore`]
//! capability for the tree engine and exposes the public operations:
//! open, close, get, set, del.
//!
//! ## Page Lifecycle
//!
//! Pages are immutable once written. A tree mutation stages replacement
//! images in a pending list; `alloc` assigns them IDs `flushed + i` in
//! staging order. `dealloc` is accepted and ignored: the allocator is
//! append-only in this revision, so freed IDs are simply never reused.
//!
//! ## Commit Sequence
//!
//! Every `set` and `del` ends with:
//!
//! ```text
//! 1. extend the file and the mapped range, then copy each pending image
//!    into its destination page
//! 2. fsync                       (pages durable, not yet published)
//! 3. advance flushed, clear the pending list
//! 4. rewrite the master record with one positional write at offset 0
//! 5. fsync                       (new root published)
//! ```
//!
//! The ordering is the crash-safety contract. A crash before step 4 leaves
//! the master pointing at the previous root with some unpublished garbage
//! pages past `flushed`; a crash after step 4 publishes the new root whose
//! pages are already durable. Recovery is simply reopening. The master is
//! written with `pwrite`, never through the map, because only a single
//! aligned write is atomic with respect to crash.
//!
//! ## File Growth
//!
//! The file grows by `max(1, file_pages / 8)` repeatedly until it covers
//! the needed page count, which amortizes to roughly 1.125x per step and
//! keeps truncate calls rare under steady insertion.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};

use super::master::{MasterPage, MASTER_SIZE};
use super::mmap::MmapRegion;
use crate::btree::{BTree, NodeBuf, NodeRef, PageStore};
use crate::config::PAGE_SIZE;
use zerocopy::IntoBytes;

/// An open key/value store. Single-threaded; assumes exclusive ownership
/// of the file, which `open` enforces with an advisory lock.
#[derive(Debug)]
pub struct Kv {
    path: PathBuf,
    // Field order matters: the region unmaps before the file closes.
    mmap: MmapRegion,
    file: File,
    file_size: u64,
    tree: BTree,
    flushed: u64,
    pending: Vec<NodeBuf>,
}

impl Kv {
    /// Opens or creates the store at `path`.
    ///
    /// Validates the file geometry and the master page before returning;
    /// on any failure the lock, the mappings, and the handle are released
    /// and the error is surfaced.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .wrap_err_with(|| format!("failed to open database file '{}'", path.display()))?;

        lock_exclusive(&file, &path)?;

        let file_size = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", path.display()))?
            .len();

        let mmap = MmapRegion::init(&file, file_size)
            .wrap_err_with(|| format!("failed to map '{}'", path.display()))?;

        let mut kv = Self {
            path,
            mmap,
            file,
            file_size,
            tree: BTree::default(),
            flushed: 0,
            pending: Vec::new(),
        };
        kv.master_load()?;
        Ok(kv)
    }

    /// Releases the mappings, the lock, and the file handle.
    pub fn close(self) {}

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the value stored under `key`, if any. Reads only mapped
    /// memory; never touches the commit path.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.tree.lookup(self, key)
    }

    /// Inserts or overwrites `key` and commits the change.
    pub fn set(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        let mut tree = self.tree;
        match tree.insert(self, key, val) {
            Ok(()) => {
                self.tree = tree;
                self.commit()
            }
            Err(e) => {
                self.pending.clear();
                Err(e)
            }
        }
    }

    /// Removes `key`, reporting whether it was present. The commit runs
    /// either way; a miss just republishes the unchanged root.
    pub fn del(&mut self, key: &[u8]) -> Result<bool> {
        let mut tree = self.tree;
        match tree.delete(self, key) {
            Ok(deleted) => {
                self.tree = tree;
                self.commit()?;
                Ok(deleted)
            }
            Err(e) => {
                self.pending.clear();
                Err(e)
            }
        }
    }

    fn master_load(&mut self) -> Result<()> {
        if self.file_size == 0 {
            // Fresh file. Reserve page 0 for the master record; it is
            // first written by the first commit.
            self.flushed = 1;
            self.tree.set_root(0);
            return Ok(());
        }

        let page0 = self.mmap.page(0)?;
        let master = MasterPage::from_bytes(&page0[..MASTER_SIZE])?;
        let root = master.root();
        let flushed = master.flushed();

        let file_pages = self.file_size / PAGE_SIZE as u64;
        ensure!(
            (1..=file_pages).contains(&flushed),
            "bad master page: flushed count {} outside 1..={}",
            flushed,
            file_pages
        );
        ensure!(
            root < flushed,
            "bad master page: root {} not below flushed count {}",
            root,
            flushed
        );

        self.tree.set_root(root);
        self.flushed = flushed;
        Ok(())
    }

    /// Publishes the current root and flushed count with one positional
    /// write. Never routed through the mmap: only a single aligned write
    /// is atomic across a crash.
    fn master_store(&self) -> Result<()> {
        let master = MasterPage::new(self.tree.root(), self.flushed);
        self.file
            .write_all_at(master.as_bytes(), 0)
            .wrap_err("failed to write master page")
    }

    /// Grows the file until it covers `npages` pages.
    fn extend_file(&mut self, npages: u64) -> Result<()> {
        let mut file_pages = self.file_size / PAGE_SIZE as u64;
        if file_pages >= npages {
            return Ok(());
        }

        while file_pages < npages {
            file_pages += (file_pages / 8).max(1);
        }

        let new_size = file_pages * PAGE_SIZE as u64;
        self.file
            .set_len(new_size)
            .wrap_err_with(|| format!("failed to extend file to {} bytes", new_size))?;
        self.file_size = new_size;
        Ok(())
    }

    /// Copies the pending page images into their destination pages.
    fn write_pages(&mut self) -> Result<()> {
        let npages = self.flushed + self.pending.len() as u64;
        self.extend_file(npages)?;
        self.mmap.extend(&self.file, npages)?;

        for (i, node) in self.pending.iter().enumerate() {
            let dst = self.mmap.page_mut(self.flushed + i as u64)?;
            dst.copy_from_slice(node.raw());
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.write_pages()?;
        self.file
            .sync_all()
            .wrap_err("failed to fsync after page write-back")?;

        self.flushed += self.pending.len() as u64;
        self.pending.clear();

        self.master_store()?;
        self.file
            .sync_all()
            .wrap_err("failed to fsync after master page update")
    }
}

impl PageStore for Kv {
    fn page(&self, ptr: u64) -> Result<NodeRef<'_>> {
        Ok(NodeRef::new(self.mmap.page(ptr)?))
    }

    fn alloc(&mut self, node: NodeBuf) -> Result<u64> {
        ensure!(node.nbytes() <= PAGE_SIZE, "node image exceeds one page");
        ensure!(
            node.buf_len() == PAGE_SIZE,
            "node buffer is not page-sized"
        );
        let ptr = self.flushed + self.pending.len() as u64;
        self.pending.push(node);
        Ok(ptr)
    }

    fn dealloc(&mut self, _ptr: u64) {
        // Append-only allocator: freed IDs are accepted but not reused.
    }
}

fn lock_exclusive(file: &File, path: &Path) -> Result<()> {
    // SAFETY: flock acts on the file descriptor only; no memory is
    // involved and the fd is owned by `file` for the duration of the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    ensure!(
        rc == 0,
        "database '{}' is locked by another process",
        path.display()
    );
    Ok(())
}
