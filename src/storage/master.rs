//! # Master Page
//!
//! The first 32 bytes of page 0 publish the state of the store:
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  ---------------------------------
//! 0       16    signature ("PARSDB", zero-padded)
//! 16      8     root page ID, little-endian
//! 24      8     flushed page count, little-endian
//! ```
//!
//! The rest of page 0 is reserved. A root of 0 means the tree is empty;
//! page 0 itself is never a tree page.
//!
//! The master record is the sole source of truth for recovery. It is
//! rewritten with a single positional write after the pages it references
//! are durable, never through the mmap, so a crash leaves either the old
//! record or the new one. Range validation of `root` and `flushed` needs
//! the file size and therefore lives with the store, not here.

use eyre::{ensure, Result};
use zerocopy::little_endian::U64;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::DB_SIG;

/// Meaningful bytes of the master page.
pub const MASTER_SIZE: usize = 32;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct MasterPage {
    signature: [u8; 16],
    root: U64,
    flushed: U64,
}

const _: () = assert!(std::mem::size_of::<MasterPage>() == MASTER_SIZE);

impl MasterPage {
    pub fn new(root: u64, flushed: u64) -> Self {
        Self {
            signature: DB_SIG,
            root: U64::new(root),
            flushed: U64::new(flushed),
        }
    }

    /// Parses and signature-checks a master record.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= MASTER_SIZE,
            "buffer too small for master page: {} < {}",
            bytes.len(),
            MASTER_SIZE
        );

        let master = Self::ref_from_bytes(&bytes[..MASTER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse master page: {:?}", e))?;

        ensure!(master.signature == DB_SIG, "bad database signature");

        Ok(master)
    }

    pub fn root(&self) -> u64 {
        self.root.get()
    }

    pub fn flushed(&self) -> u64 {
        self.flushed.get()
    }
}
