//! # ParsDB Configuration Constants
//!
//! This module centralizes the on-disk format constants. Constants that
//! depend on each other are co-located so a change to one is checked against
//! the others at compile time.
//!
//! ## Dependency Graph
//!
//! ```text
//! PAGE_SIZE (4096 bytes)
//!       │
//!       ├─> NODE_HEADER_SIZE (4 bytes: 2B type tag + 2B entry count)
//!       │
//!       └─> MAX_KEY_SIZE (1000) + MAX_VAL_SIZE (3000)
//!             A node holding a single max-size entry (header, one pointer
//!             slot, one offset slot, one cell) must fit in one page. This
//!             is enforced by a compile-time assertion below.
//!
//! DB_SIG ("PARSDB", zero-padded to 16 bytes)
//!       │
//!       └─> First 16 bytes of the master page. Compared as the exact
//!           16-byte constant, never as a prefix.
//! ```
//!
//! ## Critical Invariants
//!
//! 1. `NODE_HEADER_SIZE + 8 + 2 + 4 + MAX_KEY_SIZE + MAX_VAL_SIZE <= PAGE_SIZE`
//! 2. `PAGE_SIZE` divides every valid database file size
//!
//! Both are checked before any page is ever decoded: the first at compile
//! time, the second when a file is opened.

/// Size of one page in bytes. The unit of allocation, I/O, and addressing.
pub const PAGE_SIZE: usize = 4096;

/// Size of the node header: a 2-byte type tag and a 2-byte entry count.
pub const NODE_HEADER_SIZE: usize = 4;

/// Maximum key length accepted by the public API.
pub const MAX_KEY_SIZE: usize = 1000;

/// Maximum value length accepted by the public API.
pub const MAX_VAL_SIZE: usize = 3000;

/// File signature occupying the first 16 bytes of the master page.
pub const DB_SIG: [u8; 16] = *b"PARSDB\0\0\0\0\0\0\0\0\0\0";

// Largest possible single-entry node: header, one pointer slot, one offset
// slot, one cell header, and a max-size key and value.
const NODE_MAX_SINGLE: usize = NODE_HEADER_SIZE + 8 + 2 + 4 + MAX_KEY_SIZE + MAX_VAL_SIZE;

const _: () = assert!(
    NODE_MAX_SINGLE <= PAGE_SIZE,
    "a node with one max-size entry must fit in one page"
);
