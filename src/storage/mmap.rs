//! # Chunked Memory Mapping
//!
//! This module maps the database file into memory as a list of chunks that
//! together cover a contiguous range starting at file offset 0. Growing the
//! address space appends a new chunk; existing chunks are never remapped,
//! so a page slice handed out earlier stays valid for the life of the
//! region.
//!
//! ## Growth Strategy
//!
//! The initial mapping is at least 64 MiB, doubled until it covers the
//! current file, so small databases never need a second chunk. When the
//! file outgrows the mapped range, a new chunk is appended at the current
//! end of the range, sized to at least double the address space.
//!
//! ```text
//! chunk 0: [0 ............ 64 MiB)
//! chunk 1:                [64 MiB ........ 128 MiB)
//! chunk 2:                                [128 MiB ... 256 MiB)
//! ```
//!
//! The mapped range may exceed the file size. That is deliberate: the OS
//! only faults pages that are touched, and callers never touch pages past
//! the extended file.
//!
//! ## Why Chunks Instead of Remapping
//!
//! Remapping (`mremap` or unmap-and-map) can relocate the region and
//! invalidate every outstanding page reference. Appending chunks leaves
//! old mappings in place, which is what lets node views borrow straight
//! from the map.

use std::fs::File;

use eyre::{ensure, Result, WrapErr};
use memmap2::{MmapMut, MmapOptions};

use crate::config::PAGE_SIZE;

/// Smallest initial mapping. Large enough that typical databases live in
/// one chunk forever.
const MIN_MMAP_SIZE: usize = 64 << 20;

const _: () = assert!(MIN_MMAP_SIZE % PAGE_SIZE == 0);

/// A growing set of shared, writable mappings over one file.
#[derive(Debug)]
pub struct MmapRegion {
    chunks: Vec<MmapMut>,
    total: usize,
}

impl MmapRegion {
    /// Maps the file, reserving at least 64 MiB of address space and
    /// doubling until the current file fits.
    pub fn init(file: &File, file_size: u64) -> Result<Self> {
        ensure!(
            file_size % PAGE_SIZE as u64 == 0,
            "file size {} is not a multiple of page size {}",
            file_size,
            PAGE_SIZE
        );

        let mut size = MIN_MMAP_SIZE;
        while (size as u64) < file_size {
            size *= 2;
        }

        // SAFETY: mapping a file we hold open with read/write access. This
        // is sound because:
        // 1. The store owns the file exclusively (advisory lock at open).
        // 2. The mapping may extend past EOF; callers only touch pages
        //    below the tracked file size, which the file always covers.
        // 3. The chunk lives inside self and is never unmapped before drop.
        let chunk = unsafe {
            MmapOptions::new()
                .len(size)
                .map_mut(file)
                .wrap_err("failed to create initial mmap")?
        };

        Ok(Self {
            chunks: vec![chunk],
            total: size,
        })
    }

    /// Total mapped bytes across all chunks.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Ensures the mapped range covers `npages` pages, appending a chunk
    /// if it does not. Old chunks stay valid.
    pub fn extend(&mut self, file: &File, npages: u64) -> Result<()> {
        let needed = npages as usize * PAGE_SIZE;
        if self.total >= needed {
            return Ok(());
        }

        // At least double the address space per extension.
        let len = self.total.max(needed - self.total);

        // SAFETY: same justification as in init(); the new chunk starts at
        // the current end of the mapped range, so chunks never overlap.
        let chunk = unsafe {
            MmapOptions::new()
                .offset(self.total as u64)
                .len(len)
                .map_mut(file)
                .wrap_err_with(|| format!("failed to extend mmap to {} pages", npages))?
        };

        self.chunks.push(chunk);
        self.total += len;
        Ok(())
    }

    /// The page behind `ptr` as an immutable slice.
    pub fn page(&self, ptr: u64) -> Result<&[u8]> {
        let (chunk, offset) = self.locate(ptr)?;
        Ok(&self.chunks[chunk][offset..offset + PAGE_SIZE])
    }

    /// The page behind `ptr` as a mutable slice.
    pub fn page_mut(&mut self, ptr: u64) -> Result<&mut [u8]> {
        let (chunk, offset) = self.locate(ptr)?;
        Ok(&mut self.chunks[chunk][offset..offset + PAGE_SIZE])
    }

    fn locate(&self, ptr: u64) -> Result<(usize, usize)> {
        let mut start = 0u64;
        for (i, chunk) in self.chunks.iter().enumerate() {
            let end = start + (chunk.len() / PAGE_SIZE) as u64;
            if ptr < end {
                return Ok((i, (ptr - start) as usize * PAGE_SIZE));
            }
            start = end;
        }
        eyre::bail!("page {} is beyond the mapped range ({} pages)", ptr, start)
    }
}
