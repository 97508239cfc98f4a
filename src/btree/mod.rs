//! # B+Tree Index
//!
//! A copy-on-write B+tree over fixed-size pages. The module splits into
//! two layers:
//!
//! - [`node`]: the codec that reads and writes one node within a byte
//!   buffer. Pure byte manipulation, no I/O.
//! - [`tree`]: the engine that implements insert, lookup, and delete by
//!   rebuilding nodes through the [`PageStore`] capability.
//!
//! ## Node Layout
//!
//! ```text
//! | type | nkeys | pointers  | offsets  | cells              |
//! | 2B   | 2B    | nkeys * 8B| nkeys *2B| klen vlen key val  |
//! ```
//!
//! All keys within a node are in ascending order, and every internal
//! entry's key is the smallest key of its child's subtree, so the first
//! key of a node propagates upward as the subtree boundary.
//!
//! ## Ownership
//!
//! The engine is stateless apart from the root page ID. The pager decides
//! where pages live; the tree only ever sees byte buffers. Tests exercise
//! the full engine over a hash-map store with no file behind it.

pub mod node;
pub mod tree;

pub use node::{Node, NodeBuf, NodeRef, NODE_INTERNAL, NODE_LEAF};
pub use tree::{BTree, PageStore};
