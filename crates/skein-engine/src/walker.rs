//! Format-agnostic graph traversal.
//!
//! Generic hash, dump and search routines must not know concrete block
//! types; they see the graph only through [`GraphSource`]: a node count
//! of children and an indexed child accessor. Children are *refs* —
//! downward-only links — so traversal terminates without cycle tracking
//! even though the full link graph may contain back-edges.

use rustc_hash::FxHasher;
use std::hash::Hasher;

use crate::document::{BlockId, Document};
use crate::schema::Schema;
use crate::Result;

/// Child-access capability for graph traversal.
pub trait GraphSource {
    /// Number of ref-children of a node.
    fn child_count(&self, node: BlockId) -> usize;

    /// The i-th ref-child of a node, in declaration order.
    fn child_at(&self, node: BlockId, index: usize) -> Option<BlockId>;
}

/// A document's ref-graph with children precomputed per block.
pub struct DocGraph<'a> {
    doc: &'a Document,
    children: Vec<Vec<BlockId>>,
}

impl<'a> DocGraph<'a> {
    /// Collect the ref-children of every block.
    pub fn new(doc: &'a Document, schema: &Schema) -> Result<Self> {
        let mut children = Vec::with_capacity(doc.block_count());
        for (id, _) in doc.blocks() {
            children.push(doc.refs_of(schema, id)?);
        }
        Ok(Self { doc, children })
    }

    /// The underlying document.
    pub fn document(&self) -> &'a Document {
        self.doc
    }

    /// Structural hash of the ref-subtree under `root`: each block's own
    /// hash combined in preorder. Equal subtree hashes flag duplicate
    /// candidates for deduplication passes.
    pub fn subtree_hash(&self, schema: &Schema, root: BlockId) -> Result<u64> {
        let mut hasher = FxHasher::default();
        for node in depth_first(self, root) {
            hasher.write_u64(self.doc.hash_of(schema, node)?);
        }
        Ok(hasher.finish())
    }

    /// Render the ref-subtree under `root` as an indented text tree.
    pub fn dump_tree(&self, schema: &Schema, root: BlockId) -> String {
        let mut out = String::new();
        self.dump_node(schema, root, 0, &mut out);
        out
    }

    fn dump_node(&self, schema: &Schema, node: BlockId, depth: usize, out: &mut String) {
        let name = self
            .doc
            .block(node)
            .map(|b| schema.name(b.type_id()))
            .unwrap_or("?");
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(&format!("{name} #{}\n", node.index()));
        for i in 0..self.child_count(node) {
            if let Some(child) = self.child_at(node, i) {
                self.dump_node(schema, child, depth + 1, out);
            }
        }
    }
}

impl GraphSource for DocGraph<'_> {
    fn child_count(&self, node: BlockId) -> usize {
        self.children
            .get(node.index())
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn child_at(&self, node: BlockId, index: usize) -> Option<BlockId> {
        self.children.get(node.index())?.get(index).copied()
    }
}

/// Preorder depth-first traversal over refs, starting at (and including)
/// `root`. Shared subtrees are visited once per incoming ref.
pub fn depth_first(src: &impl GraphSource, root: BlockId) -> Vec<BlockId> {
    let mut out = Vec::new();
    visit(src, root, &mut out);
    out
}

fn visit(src: &impl GraphSource, node: BlockId, out: &mut Vec<BlockId>) {
    out.push(node);
    for i in 0..src.child_count(node) {
        if let Some(child) = src.child_at(node, i) {
            visit(src, child, out);
        }
    }
}

/// Find the ref-path from `root` down to `target`, both inclusive.
pub fn find_chain(
    src: &impl GraphSource,
    root: BlockId,
    target: BlockId,
) -> Option<Vec<BlockId>> {
    let mut path = Vec::new();
    if chain_visit(src, root, target, &mut path) {
        Some(path)
    } else {
        None
    }
}

fn chain_visit(
    src: &impl GraphSource,
    node: BlockId,
    target: BlockId,
    path: &mut Vec<BlockId>,
) -> bool {
    path.push(node);
    if node == target {
        return true;
    }
    for i in 0..src.child_count(node) {
        if let Some(child) = src.child_at(node, i) {
            if chain_visit(src, child, target, path) {
                return true;
            }
        }
    }
    path.pop();
    false
}
