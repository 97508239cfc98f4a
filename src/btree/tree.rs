//! # Copy-on-Write B+Tree Engine
//!
//! This module implements insert, lookup, and delete over encoded nodes.
//! The engine owns nothing but the current root page ID; pages are reached
//! through the [`PageStore`] capability, which the pager implements over an
//! mmap'd file and tests implement over a hash map.
//!
//! ## Copy-on-Write Discipline
//!
//! Pages are immutable once written. A mutation never edits a node in
//! place: it fetches the old node, builds a replacement image in a scratch
//! buffer, stages the replacement with [`PageStore::alloc`], and releases
//! the old page with [`PageStore::dealloc`]. The new root is published by
//! the pager's commit, so a crash mid-operation leaves the old tree
//! intact.
//!
//! ## Insert
//!
//! ```text
//! 1. Empty tree: build a root leaf with a sentinel entry (empty key)
//!    followed by the new pair. The sentinel anchors the leftmost range so
//!    descent always finds a containing child.
//! 2. Otherwise recurse to the leaf, rebuilding each node on the path into
//!    a 2x-page scratch image that may overflow once.
//! 3. Slice each overflowing image into 1-3 page-sized pieces and splice
//!    the pieces into the parent in place of the old child link.
//! 4. If the root itself splits, add a level: a new internal root with one
//!    entry per piece.
//! ```
//!
//! ## Delete
//!
//! ```text
//! 1. Recurse to the leaf; absence propagates up as "not found".
//! 2. Rebuild the leaf without the entry, then walk back up replacing
//!    child links.
//! 3. A shrunken child (<= 1/4 page) merges into a sibling when the pair
//!    fits one page; the left sibling wins ties.
//! 4. An internal root left with a single entry drops a level: its only
//!    child becomes the root.
//! ```
//!
//! Internal nodes never end up empty: a child small enough to threaten
//! that is always merged away first, and the root-collapse rule handles
//! the final level.

use std::cmp::Ordering;

use eyre::{bail, ensure, Result};

use super::node::{Node, NodeBuf, NodeRef, NODE_INTERNAL, NODE_LEAF};
use crate::config::{MAX_KEY_SIZE, MAX_VAL_SIZE, NODE_HEADER_SIZE, PAGE_SIZE};

/// Paging capability the tree engine operates through.
///
/// `page` resolves a page ID to its current image. `alloc` stages a
/// page-sized node image and returns the ID it will occupy after the next
/// commit. `dealloc` releases a page; an append-only allocator may treat it
/// as a no-op but must keep accepting the call.
pub trait PageStore {
    fn page(&self, ptr: u64) -> Result<NodeRef<'_>>;
    fn alloc(&mut self, node: NodeBuf) -> Result<u64>;
    fn dealloc(&mut self, ptr: u64);
}

/// The B+tree: just the root page ID. Page ID 0 means the tree is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct BTree {
    root: u64,
}

impl BTree {
    pub fn new(root: u64) -> Self {
        Self { root }
    }

    pub fn root(&self) -> u64 {
        self.root
    }

    pub fn set_root(&mut self, root: u64) {
        self.root = root;
    }

    /// Returns the value stored under `key`, if any. Touches only mapped
    /// memory; never stages pages.
    pub fn lookup<S: PageStore>(&self, store: &S, key: &[u8]) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        if self.root == 0 {
            return Ok(None);
        }

        let mut node = store.page(self.root)?;
        loop {
            let idx = lookup_le(&node, key);
            match node.btype() {
                NODE_LEAF => {
                    if node.key(idx) == key {
                        return Ok(Some(node.val(idx).to_vec()));
                    }
                    return Ok(None);
                }
                NODE_INTERNAL => {
                    let ptr = node.ptr(idx);
                    node = store.page(ptr)?;
                }
                t => bail!("bad node type {t} during lookup"),
            }
        }
    }

    /// Inserts or overwrites `key`. Staged pages become durable at the
    /// pager's next commit.
    pub fn insert<S: PageStore>(&mut self, store: &mut S, key: &[u8], val: &[u8]) -> Result<()> {
        check_key(key)?;
        ensure!(
            val.len() <= MAX_VAL_SIZE,
            "value length {} exceeds maximum {}",
            val.len(),
            MAX_VAL_SIZE
        );

        if self.root == 0 {
            // First insert. The sentinel entry at index 0 covers the whole
            // key space so descent never falls off the left edge.
            let mut root = NodeBuf::page();
            root.set_header(NODE_LEAF, 2);
            root.append_kv(0, 0, b"", b"");
            root.append_kv(1, 0, key, val);
            self.root = store.alloc(root)?;
            return Ok(());
        }

        let node = store.page(self.root)?.to_buf();
        store.dealloc(self.root);

        let grown = tree_insert(store, &node, key, val)?;
        let mut pieces = split3(grown);
        if pieces.len() == 1 {
            self.root = store.alloc(pieces.remove(0))?;
        } else {
            // The root overflowed; add a level above the pieces.
            let mut root = NodeBuf::page();
            root.set_header(NODE_INTERNAL, pieces.len() as u16);
            for (i, piece) in pieces.into_iter().enumerate() {
                let first_key = piece.key(0).to_vec();
                let ptr = store.alloc(piece)?;
                root.append_kv(i as u16, ptr, &first_key, b"");
            }
            self.root = store.alloc(root)?;
        }
        Ok(())
    }

    /// Removes `key`, reporting whether it was present.
    pub fn delete<S: PageStore>(&mut self, store: &mut S, key: &[u8]) -> Result<bool> {
        check_key(key)?;
        if self.root == 0 {
            return Ok(false);
        }

        let node = store.page(self.root)?.to_buf();
        let Some(updated) = tree_delete(store, &node, key)? else {
            return Ok(false);
        };

        store.dealloc(self.root);
        if updated.btype() == NODE_INTERNAL && updated.nkeys() == 1 {
            // The root has a single child left; drop a level.
            self.root = updated.ptr(0);
        } else {
            self.root = store.alloc(updated)?;
        }
        Ok(true)
    }
}

fn check_key(key: &[u8]) -> Result<()> {
    ensure!(!key.is_empty(), "empty keys are not allowed");
    ensure!(
        key.len() <= MAX_KEY_SIZE,
        "key length {} exceeds maximum {}",
        key.len(),
        MAX_KEY_SIZE
    );
    Ok(())
}

/// Index of the last entry whose key is less than or equal to `key`.
///
/// Entry 0 is skipped: its key is the lower bound of the node's range and
/// compares less than or equal to every key routed here. Ties resolve to
/// the equal entry.
fn lookup_le<B: AsRef<[u8]>>(node: &Node<B>, key: &[u8]) -> u16 {
    let mut found = 0;
    for i in 1..node.nkeys() {
        match node.key(i).cmp(key) {
            Ordering::Less => found = i,
            Ordering::Equal => return i,
            Ordering::Greater => break,
        }
    }
    found
}

/// Rebuilds `node` with `key` inserted or updated. The result lives in a
/// 2x-page scratch image and may overflow one page; the caller splits it.
fn tree_insert<S: PageStore, B: AsRef<[u8]>>(
    store: &mut S,
    node: &Node<B>,
    key: &[u8],
    val: &[u8],
) -> Result<NodeBuf> {
    let mut new = NodeBuf::scratch();
    let idx = lookup_le(node, key);

    match node.btype() {
        NODE_LEAF => {
            if node.key(idx) == key {
                leaf_update(&mut new, node, idx, key, val);
            } else {
                leaf_insert(&mut new, node, idx + 1, key, val);
            }
        }
        NODE_INTERNAL => {
            node_insert(store, &mut new, node, idx, key, val)?;
        }
        t => bail!("bad node type {t} during insert"),
    }
    Ok(new)
}

/// Recursive step for internal nodes: rebuild the child at `idx`, split
/// the result, and splice the pieces into the parent.
fn node_insert<S: PageStore, B: AsRef<[u8]>>(
    store: &mut S,
    new: &mut NodeBuf,
    node: &Node<B>,
    idx: u16,
    key: &[u8],
    val: &[u8],
) -> Result<()> {
    let kptr = node.ptr(idx);
    let knode = store.page(kptr)?.to_buf();
    store.dealloc(kptr);

    let grown = tree_insert(store, &knode, key, val)?;
    let pieces = split3(grown);
    node_replace_kid_n(store, new, node, idx, pieces)
}

fn leaf_insert<B: AsRef<[u8]>>(new: &mut NodeBuf, old: &Node<B>, idx: u16, key: &[u8], val: &[u8]) {
    new.set_header(NODE_LEAF, old.nkeys() + 1);
    new.append_range(old, 0, 0, idx);
    new.append_kv(idx, 0, key, val);
    new.append_range(old, idx + 1, idx, old.nkeys() - idx);
}

fn leaf_update<B: AsRef<[u8]>>(new: &mut NodeBuf, old: &Node<B>, idx: u16, key: &[u8], val: &[u8]) {
    new.set_header(NODE_LEAF, old.nkeys());
    new.append_range(old, 0, 0, idx);
    new.append_kv(idx, 0, key, val);
    new.append_range(old, idx + 1, idx + 1, old.nkeys() - (idx + 1));
}

fn leaf_delete<B: AsRef<[u8]>>(new: &mut NodeBuf, old: &Node<B>, idx: u16) {
    new.set_header(NODE_LEAF, old.nkeys() - 1);
    new.append_range(old, 0, 0, idx);
    new.append_range(old, idx, idx + 1, old.nkeys() - (idx + 1));
}

/// Replaces the child link at `idx` with one link per piece. The rebuilt
/// parent may overflow; a higher frame splits it.
fn node_replace_kid_n<S: PageStore, B: AsRef<[u8]>>(
    store: &mut S,
    new: &mut NodeBuf,
    old: &Node<B>,
    idx: u16,
    pieces: Vec<NodeBuf>,
) -> Result<()> {
    let inc = pieces.len() as u16;
    new.set_header(NODE_INTERNAL, old.nkeys() + inc - 1);
    new.append_range(old, 0, 0, idx);
    for (i, piece) in pieces.into_iter().enumerate() {
        let first_key = piece.key(0).to_vec();
        let ptr = store.alloc(piece)?;
        new.append_kv(idx + i as u16, ptr, &first_key, b"");
    }
    new.append_range(old, idx + inc, idx + 1, old.nkeys() - (idx + 1));
    Ok(())
}

/// Replaces the two adjacent child links at `idx` and `idx + 1` with a
/// single link to their merged page.
fn node_replace_2kid<B: AsRef<[u8]>>(
    new: &mut NodeBuf,
    old: &Node<B>,
    idx: u16,
    ptr: u64,
    key: &[u8],
) {
    new.set_header(NODE_INTERNAL, old.nkeys() - 1);
    new.append_range(old, 0, 0, idx);
    new.append_kv(idx, ptr, key, b"");
    new.append_range(old, idx + 1, idx + 2, old.nkeys() - (idx + 2));
}

/// Slices a possibly-oversize node image into page-sized pieces.
///
/// The split point is chosen so the right piece always fits a page; the
/// left piece may still overflow once and is then split again, which
/// bounds the result at three pieces even for cells near the size limits.
fn split3(mut old: NodeBuf) -> Vec<NodeBuf> {
    if old.nbytes() <= PAGE_SIZE {
        old.truncate_to_page();
        return vec![old];
    }
    let (mut left, right) = split2(&old);
    if left.nbytes() <= PAGE_SIZE {
        left.truncate_to_page();
        return vec![left, right];
    }
    let (mut leftleft, middle) = split2(&left);
    assert!(leftleft.nbytes() <= PAGE_SIZE);
    leftleft.truncate_to_page();
    vec![leftleft, middle, right]
}

/// Splits an oversize node in two. The right half is guaranteed to fit a
/// page; the left half may not and stays in a scratch buffer.
fn split2(old: &NodeBuf) -> (NodeBuf, NodeBuf) {
    let nkeys = old.nkeys();
    assert!(nkeys >= 2);

    // Size of the left half if it kept the first n entries.
    let left_bytes = |n: u16| NODE_HEADER_SIZE + 10 * n as usize + old.offset(n) as usize;
    let right_bytes = |n: u16| old.nbytes() - left_bytes(n) + NODE_HEADER_SIZE;

    let mut nleft = nkeys / 2;
    while left_bytes(nleft) > PAGE_SIZE {
        nleft -= 1;
    }
    assert!(nleft >= 1);
    while right_bytes(nleft) > PAGE_SIZE {
        nleft += 1;
    }
    assert!(nleft < nkeys);
    let nright = nkeys - nleft;

    let mut left = NodeBuf::scratch();
    let mut right = NodeBuf::page();
    left.set_header(old.btype(), nleft);
    right.set_header(old.btype(), nright);
    left.append_range(old, 0, 0, nleft);
    right.append_range(old, 0, nleft, nright);
    (left, right)
}

/// Concatenates two same-typed siblings into one node.
fn node_merge<L: AsRef<[u8]>, R: AsRef<[u8]>>(new: &mut NodeBuf, left: &Node<L>, right: &Node<R>) {
    new.set_header(left.btype(), left.nkeys() + right.nkeys());
    new.append_range(left, 0, 0, left.nkeys());
    new.append_range(right, left.nkeys(), 0, right.nkeys());
}

enum MergeDir {
    /// No merge; splice the updated child back on its own.
    None,
    /// Merge with the left sibling (sibling first, then updated).
    Left(NodeBuf),
    /// Merge with the right sibling (updated first, then sibling).
    Right(NodeBuf),
}

/// Decides whether the shrunken child at `idx` should merge with a
/// sibling. A merge needs the child at or below a quarter page and the
/// combined node within one page; the left sibling is preferred.
fn should_merge<S: PageStore, B: AsRef<[u8]>>(
    store: &S,
    node: &Node<B>,
    idx: u16,
    updated: &NodeBuf,
) -> Result<MergeDir> {
    if updated.nbytes() > PAGE_SIZE / 4 {
        return Ok(MergeDir::None);
    }

    if idx > 0 {
        let sibling = store.page(node.ptr(idx - 1))?.to_buf();
        let merged = sibling.nbytes() + updated.nbytes() - NODE_HEADER_SIZE;
        if merged <= PAGE_SIZE {
            return Ok(MergeDir::Left(sibling));
        }
    }
    if idx + 1 < node.nkeys() {
        let sibling = store.page(node.ptr(idx + 1))?.to_buf();
        let merged = sibling.nbytes() + updated.nbytes() - NODE_HEADER_SIZE;
        if merged <= PAGE_SIZE {
            return Ok(MergeDir::Right(sibling));
        }
    }
    Ok(MergeDir::None)
}

/// Rebuilds `node` without `key`. Returns `None` when the key is absent.
fn tree_delete<S: PageStore, B: AsRef<[u8]>>(
    store: &mut S,
    node: &Node<B>,
    key: &[u8],
) -> Result<Option<NodeBuf>> {
    let idx = lookup_le(node, key);
    match node.btype() {
        NODE_LEAF => {
            if node.key(idx) != key {
                return Ok(None);
            }
            let mut new = NodeBuf::page();
            leaf_delete(&mut new, node, idx);
            Ok(Some(new))
        }
        NODE_INTERNAL => node_delete(store, node, idx, key),
        t => bail!("bad node type {t} during delete"),
    }
}

/// Recursive step for internal nodes: rebuild the child at `idx` without
/// the key, then merge it into a sibling if it shrank far enough.
fn node_delete<S: PageStore, B: AsRef<[u8]>>(
    store: &mut S,
    node: &Node<B>,
    idx: u16,
    key: &[u8],
) -> Result<Option<NodeBuf>> {
    let kptr = node.ptr(idx);
    let knode = store.page(kptr)?.to_buf();
    let Some(updated) = tree_delete(store, &knode, key)? else {
        return Ok(None);
    };
    store.dealloc(kptr);

    let mut new = NodeBuf::page();
    match should_merge(store, node, idx, &updated)? {
        MergeDir::Left(sibling) => {
            let mut merged = NodeBuf::page();
            node_merge(&mut merged, &sibling, &updated);
            store.dealloc(node.ptr(idx - 1));
            let first_key = merged.key(0).to_vec();
            let ptr = store.alloc(merged)?;
            node_replace_2kid(&mut new, node, idx - 1, ptr, &first_key);
        }
        MergeDir::Right(sibling) => {
            let mut merged = NodeBuf::page();
            node_merge(&mut merged, &updated, &sibling);
            store.dealloc(node.ptr(idx + 1));
            let first_key = merged.key(0).to_vec();
            let ptr = store.alloc(merged)?;
            node_replace_2kid(&mut new, node, idx, ptr, &first_key);
        }
        MergeDir::None => {
            assert!(updated.nkeys() > 0);
            node_replace_kid_n(store, &mut new, node, idx, vec![updated])?;
        }
    }
    Ok(Some(new))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// In-memory page store backed by a hash map, with IDs from a
    /// monotonic counter. Deallocation really frees here, which makes
    /// dangling page references fail loudly in tests.
    struct MemPages {
        pages: HashMap<u64, NodeBuf>,
        next: u64,
    }

    impl MemPages {
        fn new() -> Self {
            Self {
                pages: HashMap::new(),
                next: 1,
            }
        }

        fn len(&self) -> usize {
            self.pages.len()
        }
    }

    impl PageStore for MemPages {
        fn page(&self, ptr: u64) -> Result<NodeRef<'_>> {
            let node = self
                .pages
                .get(&ptr)
                .ok_or_else(|| eyre::eyre!("page {ptr} does not exist"))?;
            Ok(node.view())
        }

        fn alloc(&mut self, node: NodeBuf) -> Result<u64> {
            ensure!(node.nbytes() <= PAGE_SIZE, "node image exceeds one page");
            ensure!(node.buf_len() == PAGE_SIZE, "node buffer is not page-sized");
            let ptr = self.next;
            self.next += 1;
            self.pages.insert(ptr, node);
            Ok(ptr)
        }

        fn dealloc(&mut self, ptr: u64) {
            assert!(
                self.pages.remove(&ptr).is_some(),
                "double free of page {ptr}"
            );
        }
    }

    fn walk_keys(store: &MemPages, ptr: u64, out: &mut Vec<Vec<u8>>) {
        let node = store.page(ptr).unwrap();
        match node.btype() {
            NODE_LEAF => {
                for i in 0..node.nkeys() {
                    out.push(node.key(i).to_vec());
                }
            }
            NODE_INTERNAL => {
                assert!(node.nkeys() >= 1, "empty internal node at page {ptr}");
                for i in 0..node.nkeys() {
                    walk_keys(store, node.ptr(i), out);
                }
            }
            t => panic!("bad node type {t}"),
        }
    }

    /// All keys in leaf order, sentinel excluded.
    fn all_keys(store: &MemPages, tree: &BTree) -> Vec<Vec<u8>> {
        let mut keys = Vec::new();
        if tree.root() != 0 {
            walk_keys(store, tree.root(), &mut keys);
            assert_eq!(keys.remove(0), b"".to_vec());
        }
        keys
    }

    #[test]
    fn lookup_on_empty_tree_returns_none() {
        let store = MemPages::new();
        let tree = BTree::default();

        assert_eq!(tree.lookup(&store, b"missing").unwrap(), None);
    }

    #[test]
    fn first_insert_creates_sentinel_root() {
        let mut store = MemPages::new();
        let mut tree = BTree::default();

        tree.insert(&mut store, b"hello", b"world").unwrap();

        let root = store.page(tree.root()).unwrap();
        assert_eq!(root.btype(), NODE_LEAF);
        assert_eq!(root.nkeys(), 2);
        assert_eq!(root.key(0), b"");
        assert_eq!(root.key(1), b"hello");
        assert_eq!(
            tree.lookup(&store, b"hello").unwrap(),
            Some(b"world".to_vec())
        );
    }

    #[test]
    fn insert_rejects_empty_and_oversize_keys() {
        let mut store = MemPages::new();
        let mut tree = BTree::default();

        assert!(tree.insert(&mut store, b"", b"v").is_err());
        assert!(tree
            .insert(&mut store, &vec![0u8; MAX_KEY_SIZE + 1], b"v")
            .is_err());
        assert!(tree
            .insert(&mut store, b"k", &vec![0u8; MAX_VAL_SIZE + 1])
            .is_err());
        assert_eq!(tree.root(), 0);
    }

    #[test]
    fn overwrite_replaces_value_without_growing_key_count() {
        let mut store = MemPages::new();
        let mut tree = BTree::default();

        tree.insert(&mut store, b"k", b"v1").unwrap();
        tree.insert(&mut store, b"k", b"v2").unwrap();

        assert_eq!(tree.lookup(&store, b"k").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(all_keys(&store, &tree).len(), 1);
    }

    #[test]
    fn inserts_keep_keys_sorted() {
        let mut store = MemPages::new();
        let mut tree = BTree::default();

        for b in (b'a'..=b'z').rev() {
            tree.insert(&mut store, &[b], &[b]).unwrap();
        }

        let keys = all_keys(&store, &tree);
        let expected: Vec<Vec<u8>> = (b'a'..=b'z').map(|b| vec![b]).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn many_inserts_split_into_multiple_levels() {
        let mut store = MemPages::new();
        let mut tree = BTree::default();

        for i in 0..1000u32 {
            let key = format!("key{i:05}");
            let val = format!("val{i:05}");
            tree.insert(&mut store, key.as_bytes(), val.as_bytes())
                .unwrap();
        }

        assert_eq!(
            store.page(tree.root()).unwrap().btype(),
            NODE_INTERNAL,
            "1000 entries do not fit a single leaf"
        );
        for i in 0..1000u32 {
            let key = format!("key{i:05}");
            let val = format!("val{i:05}");
            assert_eq!(
                tree.lookup(&store, key.as_bytes()).unwrap(),
                Some(val.into_bytes()),
                "missing {key}"
            );
        }

        let keys = all_keys(&store, &tree);
        assert_eq!(keys.len(), 1000);
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "keys out of order");
    }

    #[test]
    fn max_size_entries_split_without_overflow() {
        let mut store = MemPages::new();
        let mut tree = BTree::default();

        for b in [b'a', b'b', b'c', b'd'] {
            let key = vec![b; MAX_KEY_SIZE];
            let val = vec![b; MAX_VAL_SIZE];
            tree.insert(&mut store, &key, &val).unwrap();
        }

        for b in [b'a', b'b', b'c', b'd'] {
            let key = vec![b; MAX_KEY_SIZE];
            assert_eq!(
                tree.lookup(&store, &key).unwrap(),
                Some(vec![b; MAX_VAL_SIZE])
            );
        }
    }

    #[test]
    fn delete_on_empty_tree_returns_false() {
        let mut store = MemPages::new();
        let mut tree = BTree::default();

        assert!(!tree.delete(&mut store, b"k").unwrap());
    }

    #[test]
    fn delete_reports_presence_and_is_idempotent() {
        let mut store = MemPages::new();
        let mut tree = BTree::default();

        tree.insert(&mut store, b"a", b"1").unwrap();
        tree.insert(&mut store, b"b", b"2").unwrap();

        assert!(tree.delete(&mut store, b"b").unwrap());
        assert!(!tree.delete(&mut store, b"b").unwrap());
        assert_eq!(tree.lookup(&store, b"b").unwrap(), None);
        assert_eq!(tree.lookup(&store, b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn delete_everything_leaves_only_the_sentinel() {
        let mut store = MemPages::new();
        let mut tree = BTree::default();

        for i in 0..300u32 {
            let key = format!("key{i:04}");
            tree.insert(&mut store, key.as_bytes(), b"x").unwrap();
        }
        for i in 0..300u32 {
            let key = format!("key{i:04}");
            assert!(tree.delete(&mut store, key.as_bytes()).unwrap(), "{key}");
        }

        assert!(all_keys(&store, &tree).is_empty());
        let root = store.page(tree.root()).unwrap();
        assert_eq!(root.btype(), NODE_LEAF);
        assert_eq!(root.nkeys(), 1);
    }

    #[test]
    fn deletes_merge_underfull_nodes_and_collapse_levels() {
        let mut store = MemPages::new();
        let mut tree = BTree::default();

        for i in 0..500u32 {
            let key = format!("key{i:04}");
            let val = format!("val{i:04}");
            tree.insert(&mut store, key.as_bytes(), val.as_bytes())
                .unwrap();
        }
        // Drain from the front so both merge directions occur.
        for i in 0..499u32 {
            let key = format!("key{i:04}");
            assert!(tree.delete(&mut store, key.as_bytes()).unwrap());
        }

        assert_eq!(
            tree.lookup(&store, b"key0499").unwrap(),
            Some(b"val0499".to_vec())
        );
        let root = store.page(tree.root()).unwrap();
        assert_eq!(root.btype(), NODE_LEAF, "tree did not collapse to a leaf");
        // One live page: merges released every other page back to the store.
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn interleaved_inserts_and_deletes_stay_consistent() {
        let mut store = MemPages::new();
        let mut tree = BTree::default();

        for i in 0..400u32 {
            let key = format!("k{i:04}");
            tree.insert(&mut store, key.as_bytes(), key.as_bytes())
                .unwrap();
        }
        for i in (0..400u32).step_by(2) {
            let key = format!("k{i:04}");
            assert!(tree.delete(&mut store, key.as_bytes()).unwrap());
        }
        for i in 0..400u32 {
            let key = format!("k{i:04}");
            let got = tree.lookup(&store, key.as_bytes()).unwrap();
            if i % 2 == 0 {
                assert_eq!(got, None, "{key} should be gone");
            } else {
                assert_eq!(got, Some(key.clone().into_bytes()), "{key} should remain");
            }
        }

        let keys = all_keys(&store, &tree);
        assert_eq!(keys.len(), 200);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn split3_passes_through_a_fitting_node() {
        let mut node = NodeBuf::scratch();
        node.set_header(NODE_LEAF, 1);
        node.append_kv(0, 0, b"k", b"v");

        let pieces = split3(node);
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].buf_len(), PAGE_SIZE);
    }

    #[test]
    fn split3_splits_an_oversize_node_in_two() {
        let mut node = NodeBuf::scratch();
        node.set_header(NODE_LEAF, 3);
        node.append_kv(0, 0, b"", b"");
        node.append_kv(1, 0, &vec![b'a'; MAX_KEY_SIZE], &vec![1; MAX_VAL_SIZE]);
        node.append_kv(2, 0, &vec![b'b'; MAX_KEY_SIZE], &vec![2; MAX_VAL_SIZE]);
        assert!(node.nbytes() > PAGE_SIZE);

        let pieces = split3(node);
        assert_eq!(pieces.len(), 2);
        for piece in &pieces {
            assert!(piece.nbytes() <= PAGE_SIZE);
        }
        assert_eq!(pieces[0].key(0), b"");
        assert_eq!(pieces[1].key(0), vec![b'b'; MAX_KEY_SIZE].as_slice());
    }

    #[test]
    fn split3_yields_three_pieces_for_pathological_cells() {
        // Three cells sized so any two of them overflow a page: the right
        // piece takes one cell, the remaining two overflow and split again.
        let val = vec![0xCC; 2700];
        let mut node = NodeBuf::scratch();
        node.set_header(NODE_LEAF, 3);
        node.append_kv(0, 0, b"a", &val);
        node.append_kv(1, 0, b"b", &val);
        node.append_kv(2, 0, b"c", &val);
        assert!(node.nbytes() > PAGE_SIZE);

        let pieces = split3(node);
        assert_eq!(pieces.len(), 3);
        for piece in &pieces {
            assert!(piece.nbytes() <= PAGE_SIZE);
            assert_eq!(piece.nkeys(), 1);
        }
        assert_eq!(pieces[0].key(0), b"a");
        assert_eq!(pieces[1].key(0), b"b");
        assert_eq!(pieces[2].key(0), b"c");
    }

    #[test]
    fn node_merge_concatenates_siblings() {
        let mut left = NodeBuf::page();
        left.set_header(NODE_LEAF, 2);
        left.append_kv(0, 0, b"a", b"1");
        left.append_kv(1, 0, b"b", b"2");

        let mut right = NodeBuf::page();
        right.set_header(NODE_LEAF, 1);
        right.append_kv(0, 0, b"c", b"3");

        let mut merged = NodeBuf::page();
        node_merge(&mut merged, &left, &right);

        assert_eq!(merged.btype(), NODE_LEAF);
        assert_eq!(merged.nkeys(), 3);
        assert_eq!(merged.key(0), b"a");
        assert_eq!(merged.key(2), b"c");
        assert_eq!(merged.val(2), b"3");
    }

    #[test]
    fn lookup_le_prefers_the_equal_entry() {
        let mut node = NodeBuf::page();
        node.set_header(NODE_LEAF, 4);
        node.append_kv(0, 0, b"", b"");
        node.append_kv(1, 0, b"b", b"1");
        node.append_kv(2, 0, b"d", b"2");
        node.append_kv(3, 0, b"f", b"3");

        assert_eq!(lookup_le(&node, b"a"), 0);
        assert_eq!(lookup_le(&node, b"b"), 1);
        assert_eq!(lookup_le(&node, b"c"), 1);
        assert_eq!(lookup_le(&node, b"d"), 2);
        assert_eq!(lookup_le(&node, b"z"), 3);
    }
}
