//! # Storage Layer
//!
//! The paging and durability layer: it maps logical page numbers to bytes
//! backed by a growing file and publishes tree mutations atomically
//! through the master page.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  Kv (open/close/get/set/del)        │
//! │  allocator + commit sequence        │
//! ├─────────────────────────────────────┤
//! │  MasterPage (signature, root,       │
//! │  flushed; single positional write)  │
//! ├─────────────────────────────────────┤
//! │  MmapRegion (chunked, append-only   │
//! │  address space over one file)       │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## File Format
//!
//! The file is a sequence of 4096-byte pages. Page 0 holds the 32-byte
//! master record; pages 1 and up are B+tree nodes. The file length is
//! always a multiple of the page size, and all multibyte integers are
//! little-endian.
//!
//! ## Durability
//!
//! Readers recovering from the master page see either the previous root
//! or the new root with all of its pages durable. Pages written beyond
//! the published flushed count are invisible garbage; the master record
//! is the sole source of truth.
//!
//! ## Module Organization
//!
//! - `mmap`: chunked memory mapping (`MmapRegion`)
//! - `master`: master page codec (`MasterPage`)
//! - `kv`: the store itself (`Kv`)

mod kv;
mod master;
mod mmap;

pub use kv::Kv;
pub use master::{MasterPage, MASTER_SIZE};
pub use mmap::MmapRegion;
