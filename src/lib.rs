//! # ParsDB - Embedded Copy-on-Write Key/Value Store
//!
//! ParsDB is an embedded, single-process, on-disk key/value store built on
//! a copy-on-write B+tree whose pages live in a memory-mapped file. It
//! stores variable-length byte-string keys and values, survives process
//! restarts, and is crash-safe at the granularity of individual writes.
//!
//! ## Quick Start
//!
//! ```ignore
//! use parsdb::Kv;
//!
//! let mut kv = Kv::open("./my.db")?;
//! kv.set(b"key1", b"value1")?;
//! assert_eq!(kv.get(b"key1")?, Some(b"value1".to_vec()));
//! assert!(kv.del(b"key1")?);
//! kv.close();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        Public API (Kv)              │
//! ├─────────────────────────────────────┤
//! │  B+Tree Engine (copy-on-write,      │
//! │  split/merge, via PageStore)        │
//! ├─────────────────────────────────────┤
//! │  Node Codec (one node per page)     │
//! ├─────────────────────────────────────┤
//! │  Pager (allocator, master page,     │
//! │  commit sequence)                   │
//! ├─────────────────────────────────────┤
//! │  Chunked Memory-Mapped File I/O     │
//! └─────────────────────────────────────┘
//! ```
//!
//! The tree engine reaches pages only through the [`btree::PageStore`]
//! capability. The pager implements it over the mapped file; tests
//! implement it over a hash map, which exercises the full engine with no
//! file behind it.
//!
//! ## Guarantees and Limits
//!
//! - Keys are 1 to 1000 bytes, values 0 to 3000 bytes.
//! - Every `set` and `del` is committed before it returns: pages are
//!   written back and fsynced, then the master page is rewritten with a
//!   single atomic positional write and fsynced again. A crash at any
//!   point yields either the previous state or the new one.
//! - Single-threaded, one process: `open` takes an exclusive advisory
//!   lock on the database file.
//! - No range scans, no multi-key transactions, no page reclamation (the
//!   allocator is append-only in this revision).
//!
//! ## Module Overview
//!
//! - [`btree`]: node codec and copy-on-write tree engine
//! - [`storage`]: mmap region, master page, pager, public `Kv` API
//! - [`config`]: on-disk format constants

pub mod btree;
pub mod config;
pub mod storage;

pub use storage::Kv;
