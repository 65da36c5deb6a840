//! Document state: the block arena and the operation context.
//!
//! A [`Document`] owns every block of a parsed file in a flat, append-only
//! arena addressed by [`BlockId`] handles. Links between blocks are plain
//! arena indices, so back-references and cycles carry no ownership at all;
//! the arena is the single owner.
//!
//! A [`Context`] bundles the per-operation configuration every read,
//! write, size and hash call threads through: the schema, the file
//! version pair, the byte order, the document-level expression scope for
//! `vercond`, and the [`BlockTable`] used to resolve and re-serialize
//! links. Nothing in the engine consults global state.

use std::hash::Hasher;

use rustc_hash::FxHasher;
use skein_common::{BinaryReader, BinaryWriter, Endian};

use crate::expr::{ExprScope, ScopeValue};
use crate::instance::StructValue;
use crate::schema::{Schema, TypeId};
use crate::{Error, Result};

/// Handle to a block in a document's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    /// Handle for an arena index.
    #[inline]
    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    /// Arena index of this block.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Lookup boundary between the engine and a format's block-table
/// management: raw on-disk index to block handle, and back.
///
/// `resolve` is only consulted for non-negative raw indices; negative
/// indices are the null-link convention and never reach the table.
pub trait BlockTable {
    /// Number of blocks the table knows about.
    fn block_count(&self) -> usize;

    /// Resolve a non-negative raw index, `None` if out of range.
    fn resolve(&self, index: i64) -> Option<BlockId>;

    /// The on-disk index for a block handle, `None` if unknown.
    fn index_of(&self, block: BlockId) -> Option<i64>;
}

/// Identity block table over a document arena.
#[derive(Debug, Clone, Copy)]
pub struct ArenaTable {
    len: usize,
}

impl BlockTable for ArenaTable {
    fn block_count(&self) -> usize {
        self.len
    }

    fn resolve(&self, index: i64) -> Option<BlockId> {
        (index >= 0 && (index as usize) < self.len).then(|| BlockId(index as u32))
    }

    fn index_of(&self, block: BlockId) -> Option<i64> {
        (block.index() < self.len).then(|| block.index() as i64)
    }
}

/// Document-level expression scope, exposing the version pair to
/// `vercond` expressions.
#[derive(Debug, Clone, Copy)]
pub struct DocScope {
    pub version: u32,
    pub user_version: u32,
}

impl ExprScope for DocScope {
    fn attr(&self, name: &str) -> Option<ScopeValue<'_>> {
        match name {
            "version" => Some(ScopeValue::Int(self.version as i64)),
            "user_version" => Some(ScopeValue::Int(self.user_version as i64)),
            _ => None,
        }
    }
}

/// Per-operation configuration threaded through every structural call.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub schema: &'a Schema,
    pub version: u32,
    pub user_version: u32,
    pub order: Endian,
    /// Scope for `vercond` expressions; `version`/`user_version` are
    /// always available even without one.
    pub globals: Option<&'a dyn ExprScope>,
    /// Block table for link resolution and link serialization.
    pub blocks: Option<&'a dyn BlockTable>,
}

impl<'a> Context<'a> {
    /// A context with no document scope and no block table.
    pub fn new(schema: &'a Schema, version: u32, user_version: u32, order: Endian) -> Self {
        Self {
            schema,
            version,
            user_version,
            order,
            globals: None,
            blocks: None,
        }
    }

    /// Attach a document-level expression scope.
    pub fn with_globals(mut self, globals: &'a dyn ExprScope) -> Self {
        self.globals = Some(globals);
        self
    }

    /// Attach a block table.
    pub fn with_blocks(mut self, blocks: &'a dyn BlockTable) -> Self {
        self.blocks = Some(blocks);
        self
    }

    pub(crate) fn block_table(&self) -> Result<&'a dyn BlockTable> {
        self.blocks.ok_or(Error::MissingBlockTable)
    }
}

impl ExprScope for Context<'_> {
    fn attr(&self, name: &str) -> Option<ScopeValue<'_>> {
        match name {
            "version" => Some(ScopeValue::Int(self.version as i64)),
            "user_version" => Some(ScopeValue::Int(self.user_version as i64)),
            _ => self.globals.and_then(|g| g.attr(name)),
        }
    }
}

/// Outcome of a link fix-up pass.
///
/// Raw indices with no corresponding table entry are left null and
/// recorded here — malformed files exist in the wild, so unresolvable
/// links are a reported condition, not a hard failure.
#[derive(Debug, Default)]
pub struct FixupReport {
    /// Links successfully resolved to a block.
    pub resolved: usize,
    /// Raw indices that had no table entry and were nulled.
    pub unresolved: Vec<i64>,
}

impl FixupReport {
    /// True when every raw index resolved.
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// A parsed file: header state plus the block arena.
#[derive(Debug)]
pub struct Document {
    pub version: u32,
    pub user_version: u32,
    pub order: Endian,
    blocks: Vec<StructValue>,
}

impl Document {
    /// Create an empty document.
    pub fn new(version: u32, user_version: u32, order: Endian) -> Self {
        Self {
            version,
            user_version,
            order,
            blocks: Vec::new(),
        }
    }

    /// Number of blocks in the arena.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// True if the arena holds no blocks.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Append a block, returning its handle.
    pub fn push_block(&mut self, block: StructValue) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(block);
        id
    }

    /// Get a block by handle.
    pub fn block(&self, id: BlockId) -> Option<&StructValue> {
        self.blocks.get(id.index())
    }

    /// Get a block mutably by handle.
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut StructValue> {
        self.blocks.get_mut(id.index())
    }

    /// Iterate blocks with their handles.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &StructValue)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (BlockId(i as u32), b))
    }

    /// The document's expression scope (for `vercond`).
    pub fn scope(&self) -> DocScope {
        DocScope {
            version: self.version,
            user_version: self.user_version,
        }
    }

    /// The identity block table over the current arena.
    pub fn table(&self) -> ArenaTable {
        ArenaTable {
            len: self.blocks.len(),
        }
    }

    /// Construct a block of the given type, read it from the stream, and
    /// append it to the arena.
    pub fn read_block(
        &mut self,
        schema: &Schema,
        reader: &mut BinaryReader<'_>,
        ty: TypeId,
    ) -> Result<BlockId> {
        let scope = self.scope();
        let table = self.table();
        let ctx = Context::new(schema, self.version, self.user_version, self.order)
            .with_globals(&scope)
            .with_blocks(&table);
        let mut block = StructValue::new(schema, ty, None, 0)?;
        block.read(reader, &ctx)?;
        Ok(self.push_block(block))
    }

    /// Serialize one block in declaration order.
    pub fn write_block(
        &self,
        schema: &Schema,
        writer: &mut BinaryWriter,
        id: BlockId,
    ) -> Result<()> {
        let scope = self.scope();
        let table = self.table();
        let ctx = Context::new(schema, self.version, self.user_version, self.order)
            .with_globals(&scope)
            .with_blocks(&table);
        self.block(id)
            .ok_or(Error::UnknownBlock { index: id.index() })
            .and_then(|b| b.write(writer, &ctx))
    }

    /// Serialized size of one block.
    pub fn size_of(&self, schema: &Schema, id: BlockId) -> Result<u64> {
        let scope = self.scope();
        let ctx = Context::new(schema, self.version, self.user_version, self.order)
            .with_globals(&scope);
        match self.block(id) {
            Some(b) => b.size(&ctx),
            None => Ok(0),
        }
    }

    /// Structural hash of one block (not recursing through links).
    pub fn hash_of(&self, schema: &Schema, id: BlockId) -> Result<u64> {
        let scope = self.scope();
        let ctx = Context::new(schema, self.version, self.user_version, self.order)
            .with_globals(&scope);
        let mut hasher = FxHasher::default();
        if let Some(b) = self.block(id) {
            b.feed_hash(&ctx, &mut hasher)?;
        }
        Ok(hasher.finish())
    }

    /// Resolve every raw link index in every block against the arena.
    ///
    /// Idempotent: already-resolved links are untouched. Unresolvable
    /// indices are nulled and reported (see [`FixupReport`]).
    pub fn fix_links(&mut self, schema: &Schema) -> Result<FixupReport> {
        let scope = self.scope();
        let table = self.table();
        let mut report = FixupReport::default();
        for i in 0..self.blocks.len() {
            let ctx = Context::new(schema, self.version, self.user_version, self.order)
                .with_globals(&scope)
                .with_blocks(&table);
            self.blocks[i].fix_links_into(&ctx, &mut report)?;
        }
        if !report.is_clean() {
            log::warn!(
                "{} link(s) pointed outside the block table and were nulled",
                report.unresolved.len()
            );
        }
        log::debug!(
            "fix_links: {} resolved, {} unresolved",
            report.resolved,
            report.unresolved.len()
        );
        Ok(report)
    }

    /// Replace every resolved link equal to `old` with `new` across all
    /// blocks; `None` removes the reference (nulls it).
    pub fn replace_block(
        &mut self,
        schema: &Schema,
        old: BlockId,
        new: Option<BlockId>,
    ) -> Result<()> {
        let scope = self.scope();
        let table = self.table();
        for i in 0..self.blocks.len() {
            let ctx = Context::new(schema, self.version, self.user_version, self.order)
                .with_globals(&scope)
                .with_blocks(&table);
            self.blocks[i].replace_links(&ctx, old, new)?;
        }
        Ok(())
    }

    /// Resolved downward refs of one block, in declaration order.
    pub fn refs_of(&self, schema: &Schema, id: BlockId) -> Result<Vec<BlockId>> {
        let scope = self.scope();
        let ctx = Context::new(schema, self.version, self.user_version, self.order)
            .with_globals(&scope);
        match self.block(id) {
            Some(b) => {
                let mut out = Vec::new();
                b.get_refs(&ctx, &mut out)?;
                Ok(out)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Resolved links (refs and back-pointers) of one block.
    pub fn links_of(&self, schema: &Schema, id: BlockId) -> Result<Vec<BlockId>> {
        let scope = self.scope();
        let ctx = Context::new(schema, self.version, self.user_version, self.order)
            .with_globals(&scope);
        match self.block(id) {
            Some(b) => {
                let mut out = Vec::new();
                b.get_links(&ctx, &mut out)?;
                Ok(out)
            }
            None => Ok(Vec::new()),
        }
    }
}
