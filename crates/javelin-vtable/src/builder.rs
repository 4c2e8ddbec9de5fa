use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexSet;
use javelin_model::{ClassMetadata, HierarchySource, MethodDescriptor, MethodReference};
use tracing::debug;

use crate::error::{Result, VtableError};
use crate::lca::LcaTree;
use crate::result::{VirtualTable, VirtualTableEntry, VirtualTableMap};
use crate::table::{Entry, TableId, Tables};

/// Builds the dispatch tables for one program snapshot.
///
/// `methods_at_call_sites` is every (class, descriptor) pair the reachability
/// analysis saw at a virtual or interface call site; `is_virtual` answers
/// whether a concrete method can be targeted polymorphically at all. The
/// result maps every class and interface name to its surviving table; names
/// whose table was merged away share the survivor's.
pub fn build_virtual_tables(
    classes: &dyn HierarchySource,
    methods_at_call_sites: &[MethodReference],
    is_virtual: &dyn Fn(&MethodReference) -> bool,
) -> Result<VirtualTableMap> {
    VirtualTableBuilder::new(classes, methods_at_call_sites, is_virtual).build()
}

struct VirtualTableBuilder<'a> {
    classes: &'a dyn HierarchySource,
    methods_at_call_sites: &'a [MethodReference],
    is_virtual: &'a dyn Fn(&MethodReference) -> bool,
    clone_method: MethodReference,
    tables: Tables<'a>,
    table_map: HashMap<&'a str, TableId>,
    lca: LcaTree,
    grouped_methods_at_call_sites: HashMap<&'a str, IndexSet<MethodDescriptor>>,
    results: Vec<Option<Arc<VirtualTable>>>,
    building: Vec<bool>,
}

impl<'a> VirtualTableBuilder<'a> {
    fn new(
        classes: &'a dyn HierarchySource,
        methods_at_call_sites: &'a [MethodReference],
        is_virtual: &'a dyn Fn(&MethodReference) -> bool,
    ) -> Self {
        Self {
            classes,
            methods_at_call_sites,
            is_virtual,
            clone_method: MethodReference::object_clone(),
            tables: Tables::new(),
            table_map: HashMap::new(),
            lca: LcaTree::new(1),
            grouped_methods_at_call_sites: HashMap::new(),
            results: Vec::new(),
            building: Vec::new(),
        }
    }

    fn build(mut self) -> Result<VirtualTableMap> {
        self.init_class_tables();
        self.build_lca();
        self.init_interface_tables();
        debug!(tables = self.tables.len(), "initialized dispatch tables");
        self.fill_interface_implementors();
        self.merge_trivial_interfaces()?;
        self.lift_interfaces();
        self.build_interface_hierarchy()?;
        self.group_methods_from_call_sites()?;
        self.move_classes_to_merged_tables()?;
        self.fill_tables()?;
        self.build_results()
    }

    fn class_of(&self, name: &str) -> Option<&'a ClassMetadata> {
        let classes = self.classes;
        classes.class(name)
    }

    /// Creates one table per concrete class, parents before children, in
    /// declaration order. Table numbering doubles as the LCA node order.
    fn init_class_tables(&mut self) {
        let classes = self.classes;
        for name in classes.class_names() {
            self.init_class_table(name);
        }
    }

    fn init_class_table(&mut self, name: &str) {
        let Some(class) = self.class_of(name) else {
            return;
        };
        if class.is_interface() || self.table_map.contains_key(class.name.as_str()) {
            return;
        }
        if let Some(super_name) = &class.super_class {
            self.init_class_table(super_name);
        }
        let id = self.tables.push(class);
        if let Some(super_name) = &class.super_class {
            self.tables.get_mut(id).parent = self.table_map.get(super_name.as_str()).copied();
        }
        self.table_map.insert(class.name.as_str(), id);
    }

    fn build_lca(&mut self) {
        self.lca = LcaTree::new(self.tables.len() + 1);
        for i in 0..self.tables.len() {
            let super_name = self.tables.get(TableId(i)).class.super_class.as_deref();
            let parent = super_name.and_then(|name| self.table_map.get(name).copied());
            self.lca.add_node(parent.map_or(0, |p| p.0 + 1));
        }
    }

    fn init_interface_tables(&mut self) {
        let classes = self.classes;
        for name in classes.class_names() {
            let Some(class) = self.class_of(name) else {
                continue;
            };
            if class.is_interface() {
                let id = self.tables.push(class);
                self.table_map.insert(class.name.as_str(), id);
            }
        }
    }

    /// Walks every concrete class's ancestor chain and records each class as
    /// an implementor of the interfaces declared there, updating the
    /// interfaces' common implementor through the LCA index. The visited set
    /// is shared per root class so diamond interface graphs are walked once.
    fn fill_interface_implementors(&mut self) {
        for i in 0..self.tables.len() {
            let id = TableId(i);
            if self.tables.get(id).class.is_interface() {
                continue;
            }
            let mut visited = HashSet::new();
            let mut cursor = Some(id);
            while let Some(current) = cursor {
                let class = self.tables.get(current).class;
                for interface_name in &class.interfaces {
                    self.add_implementor_to_interface(interface_name, current, &mut visited);
                }
                cursor = class
                    .super_class
                    .as_deref()
                    .and_then(|name| self.table_map.get(name).copied());
            }
        }
    }

    fn add_implementor_to_interface(
        &mut self,
        interface_name: &'a str,
        new_implementor: TableId,
        visited: &mut HashSet<&'a str>,
    ) {
        if !visited.insert(interface_name) {
            return;
        }
        if let Some(interface) = self.table_map.get(interface_name).copied() {
            if !self.tables.get(interface).common_implementor_filled {
                // seed with the implementor's parent so the interface stays
                // visible to the implementor's future siblings as well
                let parent = self.tables.get(new_implementor).parent;
                let table = self.tables.get_mut(interface);
                table.common_implementor_filled = true;
                table.common_implementor = parent;
            } else if let Some(common) = self.tables.get(interface).common_implementor {
                let lca_index = self.lca.lca_of(new_implementor.0 + 1, common.0 + 1);
                if lca_index > 0 {
                    let mut next = Some(TableId(lca_index - 1));
                    if next == Some(new_implementor) {
                        next = self.tables.get(new_implementor).parent;
                    }
                    self.tables.get_mut(interface).common_implementor = next;
                } else {
                    // no single class sits above every implementor; the
                    // interface keeps a standalone table from here on
                    self.tables.get_mut(interface).common_implementor = None;
                }
            }
        }
        if let Some(class) = self.class_of(interface_name) {
            for super_interface in &class.interfaces {
                self.add_implementor_to_interface(super_interface, new_implementor, visited);
            }
        }
    }

    /// A marker interface (no methods, no superinterfaces) with a known
    /// common implementor contributes nothing as a separate table; fold it
    /// straight into that class.
    fn merge_trivial_interfaces(&mut self) -> Result<()> {
        for i in 0..self.tables.len() {
            let id = TableId(i);
            let table = self.tables.get(id);
            if !table.class.is_interface() {
                continue;
            }
            if table.class.interfaces.is_empty() && table.class.methods.is_empty() {
                if let Some(common) = table.common_implementor {
                    self.tables.get_mut(id).interface_merged_into_class = true;
                    self.tables.merge(common, id, 0)?;
                }
            }
        }
        Ok(())
    }

    /// Carries each class's outstanding interfaces up its ancestor chain and
    /// drops them off at the node whose parent is the interface's common
    /// implementor. The second pass keeps an interface attached only at that
    /// one point, so its entries are never contributed twice.
    fn lift_interfaces(&mut self) {
        for i in 0..self.tables.len() {
            let start = TableId(i);
            let class = self.tables.get(start).class;
            if class.is_interface() || class.interfaces.is_empty() {
                continue;
            }
            let mut accumulated: IndexSet<TableId> = IndexSet::new();
            for interface_name in &class.interfaces {
                if let Some(interface) = self.table_map.get(interface_name.as_str()).copied() {
                    if !self.tables.get(interface).interface_merged_into_class {
                        accumulated.insert(interface);
                    }
                }
            }
            let mut cursor = Some(start);
            while let Some(current) = cursor {
                let parent = {
                    let table = self.tables.get_mut(current);
                    let lifted = table.lifted_interfaces.get_or_insert_with(IndexSet::new);
                    accumulated.retain(|interface| !lifted.contains(interface));
                    if accumulated.is_empty() {
                        break;
                    }
                    lifted.extend(accumulated.iter().copied());
                    table.parent
                };
                accumulated
                    .retain(|interface| self.tables.get(*interface).common_implementor != parent);
                if accumulated.is_empty() {
                    break;
                }
                cursor = parent;
            }
        }
        for i in 0..self.tables.len() {
            let id = TableId(i);
            let parent = self.tables.get(id).parent;
            let Some(mut lifted) = self.tables.get_mut(id).lifted_interfaces.take() else {
                continue;
            };
            lifted.retain(|interface| self.tables.get(*interface).common_implementor == parent);
            if !lifted.is_empty() {
                self.tables.get_mut(id).lifted_interfaces = Some(lifted);
            }
        }
    }

    /// Rewires every table so that its dispatch parent is either the natural
    /// class parent or a single interface representative; multiple interfaces
    /// attached at the same point are unified into one table.
    fn build_interface_hierarchy(&mut self) -> Result<()> {
        for i in 0..self.tables.len() {
            let id = TableId(i);
            let table = self.tables.get(id);
            if table.class.is_interface() {
                let common = table.common_implementor;
                self.set_up_interface_in_hierarchy(id, common)?;
            } else if table.lifted_interfaces.is_some() {
                let parent = table.parent;
                self.set_up_interface_in_hierarchy(id, parent)?;
            }
        }
        Ok(())
    }

    fn set_up_interface_in_hierarchy(
        &mut self,
        id: TableId,
        parent: Option<TableId>,
    ) -> Result<()> {
        if self.tables.get(id).visited {
            return Ok(());
        }
        self.tables.get_mut(id).visited = true;
        let mut interfaces: IndexSet<TableId> = IndexSet::new();
        if let Some(lifted) = self.tables.get(id).lifted_interfaces.clone() {
            for interface in lifted {
                let interface = self.tables.resolve(interface)?;
                let table = self.tables.get(interface);
                if table.common_implementor == parent && !table.interface_merged_into_class {
                    self.set_up_interface_in_hierarchy(interface, parent)?;
                    let resolved = self.tables.resolve(interface)?;
                    interfaces.insert(resolved);
                }
            }
        } else {
            let class = self.tables.get(id).class;
            for interface_name in &class.interfaces {
                let Some(interface) = self.table_map.get(interface_name.as_str()).copied() else {
                    continue;
                };
                let interface = self.tables.resolve(interface)?;
                let table = self.tables.get(interface);
                if table.common_implementor == parent && !table.interface_merged_into_class {
                    self.set_up_interface_in_hierarchy(interface, parent)?;
                    let resolved = self.tables.resolve(interface)?;
                    interfaces.insert(resolved);
                }
            }
        }
        if interfaces.is_empty() {
            self.tables.get_mut(id).parent = parent;
        } else {
            // keep only the interfaces not reachable through another one in
            // the set, then unify what is left into a single representative
            let mut visited = HashSet::new();
            for interface in interfaces.clone() {
                self.find_directly_implemented_interfaces(
                    &mut visited,
                    interface,
                    parent,
                    1,
                    &mut interfaces,
                )?;
            }
            let mut final_interfaces: Vec<TableId> = Vec::new();
            for interface in interfaces {
                let resolved = self.tables.resolve(interface)?;
                if !final_interfaces.contains(&resolved) {
                    final_interfaces.push(resolved);
                }
            }
            let Some(&survivor) = final_interfaces.first() else {
                self.tables.get_mut(id).parent = parent;
                return Ok(());
            };
            for &other in &final_interfaces[1..] {
                self.tables.merge(survivor, other, 0)?;
            }
            self.tables.get_mut(id).parent = Some(survivor);
        }
        Ok(())
    }

    fn find_directly_implemented_interfaces(
        &mut self,
        visited: &mut HashSet<TableId>,
        id: TableId,
        parent: Option<TableId>,
        level: usize,
        result: &mut IndexSet<TableId>,
    ) -> Result<()> {
        if !visited.insert(id) {
            return Ok(());
        }
        if level > 1 {
            result.shift_remove(&id);
        }
        let class = self.tables.get(id).class;
        for interface_name in &class.interfaces {
            let Some(interface) = self.table_map.get(interface_name.as_str()).copied() else {
                continue;
            };
            let interface = self.tables.resolve(interface)?;
            let table = self.tables.get(interface);
            if table.common_implementor == parent && !table.interface_merged_into_class {
                self.find_directly_implemented_interfaces(
                    visited,
                    interface,
                    parent,
                    level + 1,
                    result,
                )?;
            }
        }
        Ok(())
    }

    /// Groups the reachable call-site methods by the class that will actually
    /// own their dispatch slot after merging.
    fn group_methods_from_call_sites(&mut self) -> Result<()> {
        let call_sites = self.methods_at_call_sites;
        for method_ref in call_sites {
            let class_name = self.map_class_name(method_ref.class_name.as_str())?;
            self.grouped_methods_at_call_sites
                .entry(class_name)
                .or_default()
                .insert(method_ref.method.clone());
        }
        Ok(())
    }

    fn map_class_name(&mut self, name: &'a str) -> Result<&'a str> {
        let Some(table) = self.table_map.get(name).copied() else {
            return Ok(name);
        };
        let resolved = self.tables.resolve(table)?;
        let class = self.tables.get(resolved).class;
        Ok(class.name.as_str())
    }

    fn move_classes_to_merged_tables(&mut self) -> Result<()> {
        for i in 0..self.tables.len() {
            let id = TableId(i);
            if let Some(parent) = self.tables.get(id).parent {
                let resolved = self.tables.resolve(parent)?;
                self.tables.get_mut(id).parent = Some(resolved);
            }
            let resolved = self.tables.resolve(id)?;
            if resolved != id {
                let class = self.tables.get(id).class;
                self.tables.get_mut(resolved).merged_classes.push(class);
            }
        }
        Ok(())
    }

    fn fill_tables(&mut self) -> Result<()> {
        let classes = self.classes;
        for name in classes.class_names() {
            if let Some(id) = self.table_map.get(name.as_str()).copied() {
                let resolved = self.tables.resolve(id)?;
                self.fill_table(resolved)?;
            }
        }
        Ok(())
    }

    /// Parent-first fill: inherit the parent's slots verbatim, record this
    /// class's (and merged classes') eligible methods as implementor
    /// candidates, fold in interface defaults, append call-site slots, then
    /// resolve every slot from the completed candidate map.
    fn fill_table(&mut self, id: TableId) -> Result<()> {
        if self.tables.get(id).filled {
            return Ok(());
        }
        self.tables.get_mut(id).filled = true;
        let parent = self.tables.get(id).parent;
        let mut indexes: HashMap<MethodDescriptor, usize> = HashMap::new();
        if let Some(parent) = parent {
            self.fill_table(parent)?;
            let (entries, implementors, current_implementors, folded_interfaces) = {
                let parent = self.tables.get(parent);
                (
                    parent.entries.clone(),
                    parent.implementors.clone(),
                    parent.current_implementors.clone(),
                    parent.folded_interfaces.clone(),
                )
            };
            for entry in &entries {
                indexes.insert(entry.method.clone(), entry.index);
            }
            let table = self.tables.get_mut(id);
            table.entries = entries;
            table.implementors = implementors;
            table.current_implementors = current_implementors;
            table.folded_interfaces = folded_interfaces;
        } else {
            // dispatch roots are always emitted
            self.tables.get_mut(id).used = true;
        }

        let mut class_list = vec![self.tables.get(id).class];
        class_list.extend(self.tables.get(id).merged_classes.iter().copied());
        for class in class_list {
            for method in &class.methods {
                if method.is_static() || method.is_abstract() {
                    continue;
                }
                if !method.has_body && !method.is_native() {
                    continue;
                }
                let reference = method.reference(&class.name);
                if !(self.is_virtual)(&reference) && reference != self.clone_method {
                    continue;
                }
                self.tables
                    .get_mut(id)
                    .current_implementors
                    .insert(method.method.clone(), reference);
            }
        }

        let class = self.tables.get(id).class;
        for interface_name in &class.interfaces {
            self.fill_from_interfaces(interface_name, id);
        }

        let class_name = self.tables.get(id).class.name.as_str();
        let group = self.grouped_methods_at_call_sites.get(class_name).cloned();
        if let Some(group) = group {
            self.tables.get_mut(id).used = true;
            for method in group {
                if !indexes.contains_key(&method) {
                    let table = self.tables.get_mut(id);
                    let index = table.entries.len();
                    table.entries.push(Entry {
                        method: method.clone(),
                        origin: id,
                        index,
                    });
                    table.implementors.push(None);
                    indexes.insert(method, index);
                }
            }
        }
        for (method, index) in &indexes {
            let implementor = self.tables.get(id).current_implementors.get(method).cloned();
            self.tables.get_mut(id).implementors[*index] = implementor;
        }
        Ok(())
    }

    /// Registers an interface's default methods as placeholder implementors
    /// for slots nothing concrete has claimed yet, superinterfaces included.
    fn fill_from_interfaces(&mut self, interface_name: &'a str, id: TableId) {
        if !self
            .tables
            .get_mut(id)
            .folded_interfaces
            .insert(interface_name)
        {
            return;
        }
        let Some(class) = self.class_of(interface_name) else {
            return;
        };
        for method in &class.methods {
            if method.is_static() || method.is_abstract() {
                continue;
            }
            if !method.has_body && !method.is_native() {
                continue;
            }
            let reference = method.reference(&class.name);
            if !(self.is_virtual)(&reference) {
                continue;
            }
            let table = self.tables.get_mut(id);
            if !table.current_implementors.contains_key(&method.method) {
                table.current_implementors.insert(method.method.clone(), reference);
            }
        }
        for super_interface in &class.interfaces {
            self.fill_from_interfaces(super_interface, id);
        }
    }

    fn build_results(&mut self) -> Result<VirtualTableMap> {
        self.results = vec![None; self.tables.len()];
        self.building = vec![false; self.tables.len()];
        let mut map = HashMap::new();
        for i in 0..self.tables.len() {
            let id = TableId(i);
            let result = self.table_result(id)?;
            map.insert(self.tables.get(id).class.name.clone(), result);
        }
        debug!(emitted = map.len(), "virtual tables built");
        Ok(VirtualTableMap::new(map))
    }

    fn table_result(&mut self, id: TableId) -> Result<Arc<VirtualTable>> {
        if self.tables.get(id).reference.is_some() {
            let resolved = self.tables.resolve(id)?;
            return self.table_result(resolved);
        }
        if let Some(existing) = &self.results[id.0] {
            return Ok(existing.clone());
        }
        if self.building[id.0] {
            return Err(VtableError::ReentrantResolution {
                class: self.tables.get(id).class.name.clone(),
            });
        }
        self.building[id.0] = true;
        let parent = match self.tables.get(id).parent {
            Some(parent) => Some(self.table_result(parent)?),
            None => None,
        };
        let table = self.tables.get(id);
        let entries = table
            .entries
            .iter()
            .map(|entry| VirtualTableEntry {
                method: entry.method.clone(),
                origin: self.tables.get(entry.origin).class.name.clone(),
                index: entry.index,
            })
            .collect();
        let result = Arc::new(VirtualTable {
            parent,
            class_name: table.class.name.clone(),
            used: table.used,
            instantiable: !table.class.is_abstract(),
            interface_representative: table.class.is_interface(),
            entries,
            implementors: table.implementors.clone(),
        });
        self.results[id.0] = Some(result.clone());
        Ok(result)
    }
}
