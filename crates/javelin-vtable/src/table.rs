use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;
use javelin_model::{ClassMetadata, MethodDescriptor, MethodReference};

use crate::error::{Result, VtableError};

/// Stable handle of a table in the build arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct TableId(pub(crate) usize);

/// One method slot: the descriptor, the table that introduced the slot, and
/// its position. Entries are append-only; a subclass's entry list is always
/// its parent's list as a strict prefix plus new slots at the end.
#[derive(Clone, Debug)]
pub(crate) struct Entry {
    pub(crate) method: MethodDescriptor,
    pub(crate) origin: TableId,
    pub(crate) index: usize,
}

/// In-progress dispatch table for one class or interface.
#[derive(Debug)]
pub(crate) struct Table<'a> {
    pub(crate) class: &'a ClassMetadata,
    /// Dispatch parent after lowering. Starts as the natural superclass table
    /// and may be replaced by an interface representative during unification.
    pub(crate) parent: Option<TableId>,
    /// Union-find pointer; `Some` once this table has been folded into
    /// another. Follow via [`Tables::resolve`].
    pub(crate) reference: Option<TableId>,
    /// For interface tables: the single class table below which every
    /// implementor lives, or `None` once no such table exists.
    pub(crate) common_implementor: Option<TableId>,
    pub(crate) common_implementor_filled: bool,
    pub(crate) interface_merged_into_class: bool,
    /// Interface tables attached at this exact node of the class chain.
    pub(crate) lifted_interfaces: Option<IndexSet<TableId>>,
    /// Classes whose table was folded into this one; their methods contribute
    /// to this table's implementor map during filling.
    pub(crate) merged_classes: Vec<&'a ClassMetadata>,
    pub(crate) visited: bool,
    pub(crate) filled: bool,
    pub(crate) used: bool,
    pub(crate) entries: Vec<Entry>,
    /// Parallel to `entries`; `None` marks an unresolved placeholder slot.
    pub(crate) implementors: Vec<Option<MethodReference>>,
    /// Best implementor seen so far per descriptor, resolved into
    /// `implementors` only after all entries exist.
    pub(crate) current_implementors: HashMap<MethodDescriptor, MethodReference>,
    /// Interfaces whose methods were already folded into this chain.
    pub(crate) folded_interfaces: HashSet<&'a str>,
}

impl<'a> Table<'a> {
    fn new(class: &'a ClassMetadata) -> Self {
        Self {
            class,
            parent: None,
            reference: None,
            common_implementor: None,
            common_implementor_filled: false,
            interface_merged_into_class: false,
            lifted_interfaces: None,
            merged_classes: Vec::new(),
            visited: false,
            filled: false,
            used: false,
            entries: Vec::new(),
            implementors: Vec::new(),
            current_implementors: HashMap::new(),
            folded_interfaces: HashSet::new(),
        }
    }
}

/// Merges deeper than this indicate a cyclic interface graph, which earlier
/// phases are expected to have excluded.
const MAX_MERGE_DEPTH: usize = 50;

/// Arena owning every table of one build.
///
/// Merging a table into another is a pointer-table update (`reference`), not a
/// structural graph edit, so back-references stay valid across merges and
/// [`Tables::resolve`] finds the surviving representative.
#[derive(Debug, Default)]
pub(crate) struct Tables<'a> {
    list: Vec<Table<'a>>,
}

impl<'a> Tables<'a> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }

    pub(crate) fn push(&mut self, class: &'a ClassMetadata) -> TableId {
        let id = TableId(self.list.len());
        self.list.push(Table::new(class));
        id
    }

    pub(crate) fn get(&self, id: TableId) -> &Table<'a> {
        &self.list[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: TableId) -> &mut Table<'a> {
        &mut self.list[id.0]
    }

    /// Union-find find with path compression. A cycle in the reference chain
    /// means a table is being resolved while mid-merge, which is fatal.
    pub(crate) fn resolve(&mut self, id: TableId) -> Result<TableId> {
        if self.get(id).reference.is_none() {
            return Ok(id);
        }
        let mut chain = Vec::new();
        let mut current = id;
        while let Some(next) = self.get(current).reference {
            if next == current || chain.contains(&next) {
                return Err(VtableError::ReentrantResolution {
                    class: self.get(next).class.name.clone(),
                });
            }
            chain.push(current);
            current = next;
        }
        for node in chain {
            self.get_mut(node).reference = Some(current);
        }
        Ok(current)
    }

    /// Folds `other` into `this`.
    ///
    /// Parent adoption is asymmetric on purpose: a concrete class parent
    /// always wins over an interface parent, because only one concrete
    /// single-inheritance chain may exist below a node. Two interface parents
    /// merge recursively. Downstream slot layout depends on this exact
    /// precedence and call order.
    pub(crate) fn merge(&mut self, this: TableId, other: TableId, depth: usize) -> Result<()> {
        if depth >= MAX_MERGE_DEPTH {
            return Err(VtableError::MergeDepthExceeded {
                class: self.get(this).class.name.clone(),
            });
        }
        self.get_mut(other).reference = Some(this);
        let this_parent = self.get(this).parent;
        let other_parent = self.get(other).parent;
        match (this_parent, other_parent) {
            (None, _) => self.get_mut(this).parent = other_parent,
            (_, None) => self.get_mut(other).parent = this_parent,
            (Some(this_parent), Some(other_parent)) => {
                let parent = self.resolve(this_parent)?;
                let other_parent = self.resolve(other_parent)?;
                self.get_mut(this).parent = Some(parent);
                self.get_mut(other).parent = Some(other_parent);
                if parent == other {
                    self.get_mut(this).parent = Some(other_parent);
                } else if this == other_parent {
                    self.get_mut(other).parent = Some(parent);
                } else if parent != other_parent {
                    if !self.get(parent).class.is_interface() {
                        self.merge(this, other_parent, depth + 1)?;
                        // the recursive merge may have moved this table's
                        // parent; the other side adopts the current one
                        let adopted = self.get(this).parent;
                        self.get_mut(other).parent = adopted;
                    } else if !self.get(other_parent).class.is_interface() {
                        self.merge(this, parent, depth + 1)?;
                        let adopted = self.get(other).parent;
                        self.get_mut(this).parent = adopted;
                    } else {
                        self.merge(parent, other_parent, depth + 1)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use javelin_model::ACC_INTERFACE;

    fn interface(name: &str) -> ClassMetadata {
        ClassMetadata {
            name: name.to_string(),
            super_class: None,
            interfaces: Vec::new(),
            access_flags: ACC_INTERFACE,
            methods: Vec::new(),
        }
    }

    fn class(name: &str) -> ClassMetadata {
        ClassMetadata {
            name: name.to_string(),
            super_class: None,
            interfaces: Vec::new(),
            access_flags: 0,
            methods: Vec::new(),
        }
    }

    #[test]
    fn resolve_follows_and_compresses() {
        let classes: Vec<_> = (0..3).map(|i| interface(&format!("I{i}"))).collect();
        let mut tables = Tables::new();
        let ids: Vec<_> = classes.iter().map(|c| tables.push(c)).collect();
        tables.get_mut(ids[0]).reference = Some(ids[1]);
        tables.get_mut(ids[1]).reference = Some(ids[2]);
        assert_eq!(tables.resolve(ids[0]).unwrap(), ids[2]);
        // compressed
        assert_eq!(tables.get(ids[0]).reference, Some(ids[2]));
        assert_eq!(tables.resolve(ids[2]).unwrap(), ids[2]);
    }

    #[test]
    fn resolve_detects_cycles() {
        let a = interface("A");
        let b = interface("B");
        let mut tables = Tables::new();
        let ia = tables.push(&a);
        let ib = tables.push(&b);
        tables.get_mut(ia).reference = Some(ib);
        tables.get_mut(ib).reference = Some(ia);
        assert!(matches!(
            tables.resolve(ia),
            Err(VtableError::ReentrantResolution { .. })
        ));
    }

    #[test]
    fn merge_adopts_missing_parent() {
        let a = interface("A");
        let b = interface("B");
        let c = class("C");
        let mut tables = Tables::new();
        let ia = tables.push(&a);
        let ib = tables.push(&b);
        let ic = tables.push(&c);
        tables.get_mut(ib).parent = Some(ic);
        tables.merge(ia, ib, 0).unwrap();
        assert_eq!(tables.get(ib).reference, Some(ia));
        assert_eq!(tables.get(ia).parent, Some(ic));
    }

    #[test]
    fn merge_prefers_class_parent_over_interface_parent() {
        let a = interface("A");
        let b = interface("B");
        let pa = class("PA");
        let pb = interface("PB");
        let mut tables = Tables::new();
        let ia = tables.push(&a);
        let ib = tables.push(&b);
        let ipa = tables.push(&pa);
        let ipb = tables.push(&pb);
        tables.get_mut(ia).parent = Some(ipa);
        tables.get_mut(ib).parent = Some(ipb);
        tables.merge(ia, ib, 0).unwrap();
        // the interface parent is folded in and both sides end up under the class
        assert_eq!(tables.resolve(ipb).unwrap(), ia);
        assert_eq!(tables.get(ia).parent, Some(ipa));
        assert_eq!(tables.get(ib).parent, Some(ipa));
    }

    #[test]
    fn merge_depth_is_bounded() {
        let classes: Vec<_> = (0..120).map(|i| interface(&format!("I{i}"))).collect();
        let mut tables = Tables::new();
        let ids: Vec<_> = classes.iter().map(|c| tables.push(c)).collect();
        // two parallel parent chains; merging their heads recurses pairwise
        for i in 0..ids.len() - 2 {
            tables.get_mut(ids[i]).parent = Some(ids[i + 2]);
        }
        assert!(matches!(
            tables.merge(ids[0], ids[1], 0),
            Err(VtableError::MergeDepthExceeded { .. })
        ));
    }
}
