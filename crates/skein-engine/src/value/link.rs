//! Link values: block-table indices that become object references.

use std::hash::Hasher;

use skein_common::{BinaryReader, BinaryWriter, Endian};

use crate::document::{BlockId, BlockTable, FixupReport};
use crate::schema::{LinkKind, TypeId};
use crate::{Error, Result};

/// Resolution state of a link.
///
/// The legal transitions are `Resolved(None)` (fresh construction) or
/// `Raw` (after `read`) into `Resolved` (after fix-up or programmatic
/// assignment). Nothing leaves `Resolved` except a fresh `read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// A raw on-disk index, not yet resolved against a block table.
    Raw(i64),
    /// A resolved reference; `None` is the null link.
    Resolved(Option<BlockId>),
}

/// A link-typed value.
///
/// On disk a link is a signed 32-bit index into the file's block table
/// (`-1` for null). A link never owns its target: the arena owns every
/// block, and a resolved link is just a handle.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkValue {
    kind: LinkKind,
    /// Declared target type (for diagnostics and tooling).
    target: Option<TypeId>,
    state: LinkState,
}

impl LinkValue {
    pub(crate) fn new(kind: LinkKind, target: Option<TypeId>) -> Self {
        Self {
            kind,
            target,
            state: LinkState::Resolved(None),
        }
    }

    /// Ref or Ptr flavor.
    #[inline]
    pub fn kind(&self) -> LinkKind {
        self.kind
    }

    /// Declared target type.
    #[inline]
    pub fn target_type(&self) -> Option<TypeId> {
        self.target
    }

    /// Current resolution state.
    #[inline]
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// The resolved block, if the link has been fixed and is non-null.
    pub fn block(&self) -> Option<BlockId> {
        match self.state {
            LinkState::Resolved(b) => b,
            LinkState::Raw(_) => None,
        }
    }

    /// Point the link at a block (or null it) without a raw-index phase.
    pub fn set_block(&mut self, block: Option<BlockId>) {
        self.state = LinkState::Resolved(block);
    }

    pub(crate) fn read(&mut self, r: &mut BinaryReader<'_>, order: Endian) -> Result<()> {
        self.state = LinkState::Raw(r.read_i32(order)? as i64);
        Ok(())
    }

    pub(crate) fn write(
        &self,
        w: &mut BinaryWriter,
        order: Endian,
        table: Option<&dyn BlockTable>,
    ) -> Result<()> {
        let index: i64 = match self.state {
            LinkState::Raw(i) => i,
            LinkState::Resolved(None) => -1,
            LinkState::Resolved(Some(block)) => table
                .ok_or(Error::MissingBlockTable)?
                .index_of(block)
                .ok_or(Error::UnknownBlock {
                    index: block.index(),
                })?,
        };
        w.write_i32(index as i32, order);
        Ok(())
    }

    pub fn size(&self) -> u64 {
        4
    }

    pub(crate) fn feed_hash(&self, state: &mut dyn Hasher) {
        state.write_i64(self.as_index());
    }

    /// The link as an integer: the raw index, the resolved block's arena
    /// index, or `-1` for null. Used by hashing and expression coercion.
    pub fn as_index(&self) -> i64 {
        match self.state {
            LinkState::Raw(i) => i,
            LinkState::Resolved(None) => -1,
            LinkState::Resolved(Some(block)) => block.index() as i64,
        }
    }

    /// One-way `Raw` to `Resolved` transition against a block table.
    ///
    /// Negative raw indices are the null convention and resolve silently;
    /// a non-negative index missing from the table is nulled and
    /// recorded. Calling on an already-resolved link is a no-op.
    pub(crate) fn fix(&mut self, table: &dyn BlockTable, report: &mut FixupReport) {
        let LinkState::Raw(raw) = self.state else {
            return;
        };
        if raw < 0 {
            self.state = LinkState::Resolved(None);
            return;
        }
        match table.resolve(raw) {
            Some(block) => {
                self.state = LinkState::Resolved(Some(block));
                report.resolved += 1;
            }
            None => {
                log::warn!("link index {raw} has no block table entry; nulled");
                self.state = LinkState::Resolved(None);
                report.unresolved.push(raw);
            }
        }
    }

    /// Replace a resolved reference to `old` with `new` (`None` deletes).
    pub(crate) fn replace(&mut self, old: BlockId, new: Option<BlockId>) {
        if self.state == LinkState::Resolved(Some(old)) {
            self.state = LinkState::Resolved(new);
        }
    }
}

impl std::fmt::Display for LinkValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.state {
            LinkState::Raw(i) => write!(f, "link[raw {i}]"),
            LinkState::Resolved(None) => write!(f, "link[null]"),
            LinkState::Resolved(Some(b)) => write!(f, "link[{}]", b.index()),
        }
    }
}
