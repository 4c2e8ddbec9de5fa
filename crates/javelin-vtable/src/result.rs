use std::collections::HashMap;
use std::sync::Arc;

use javelin_model::{MethodDescriptor, MethodReference};

/// One emitted dispatch slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualTableEntry {
    pub method: MethodDescriptor,
    /// Name of the class whose table introduced this slot.
    pub origin: String,
    pub index: usize,
}

/// A finished dispatch table.
///
/// Entry order is the physical slot layout. A subclass's entries always start
/// with exactly its parent's entries, so the code generator can emit the
/// tables as a chain of structurally compatible record types and substitute a
/// subclass table wherever the parent's type is expected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualTable {
    pub parent: Option<Arc<VirtualTable>>,
    pub class_name: String,
    /// Whether the emitted program references this table at all.
    pub used: bool,
    /// False for abstract classes; the code generator never instantiates them.
    pub instantiable: bool,
    /// True when this table stands in for an interface (or a group of merged
    /// interfaces) rather than a real class.
    pub interface_representative: bool,
    pub entries: Vec<VirtualTableEntry>,
    /// Parallel to `entries`; `None` marks a slot no concrete method answers.
    pub implementors: Vec<Option<MethodReference>>,
}

impl VirtualTable {
    pub fn entry_of(&self, method: &MethodDescriptor) -> Option<&VirtualTableEntry> {
        self.entries.iter().find(|entry| &entry.method == method)
    }

    pub fn implementor_at(&self, index: usize) -> Option<&MethodReference> {
        self.implementors.get(index).and_then(Option::as_ref)
    }
}

/// Every class and interface name mapped to its surviving table.
///
/// Names whose table was merged away share one `Arc` with the survivor, so
/// pointer equality of lookups tells merged names apart from distinct tables.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VirtualTableMap {
    tables: HashMap<String, Arc<VirtualTable>>,
}

impl VirtualTableMap {
    pub(crate) fn new(tables: HashMap<String, Arc<VirtualTable>>) -> Self {
        Self { tables }
    }

    pub fn get(&self, class_name: &str) -> Option<&Arc<VirtualTable>> {
        self.tables.get(class_name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<VirtualTable>)> {
        self.tables.iter().map(|(name, table)| (name.as_str(), table))
    }
}
