use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::flags::{ACC_ABSTRACT, ACC_INTERFACE, ACC_NATIVE, ACC_STATIC};
use crate::method::{MethodDescriptor, MethodReference};

/// One declared method, as the vtable builder sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodMetadata {
    pub method: MethodDescriptor,
    pub access_flags: u16,
    /// Whether the method carries executable code. Abstract methods never do;
    /// native methods participate in dispatch without a body.
    pub has_body: bool,
}

impl MethodMetadata {
    pub fn new(method: MethodDescriptor, access_flags: u16, has_body: bool) -> Self {
        Self {
            method,
            access_flags,
            has_body,
        }
    }

    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & ACC_ABSTRACT != 0
    }

    pub fn is_native(&self) -> bool {
        self.access_flags & ACC_NATIVE != 0
    }

    /// The reference a call site would use to name this method on `class_name`.
    pub fn reference(&self, class_name: &str) -> MethodReference {
        MethodReference::new(class_name, self.method.clone())
    }
}

/// One class or interface of the program snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMetadata {
    pub name: String,
    pub super_class: Option<String>,
    /// Directly implemented (or for interfaces, directly extended) interfaces.
    pub interfaces: Vec<String>,
    pub access_flags: u16,
    pub methods: Vec<MethodMetadata>,
}

impl ClassMetadata {
    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags & ACC_ABSTRACT != 0
    }
}

/// Read-only provider of every class and interface in the program.
///
/// `class_names` is declaration order. The vtable builder numbers tables by it,
/// so a stable order is what makes two builds of the same snapshot produce
/// structurally identical output. The hierarchy must be fully resolved before
/// a build starts; lookups during the build never mutate it.
pub trait HierarchySource {
    fn class_names(&self) -> &[String];
    fn class(&self, name: &str) -> Option<&ClassMetadata>;
}

/// In-memory [`HierarchySource`]; insertion order is declaration order.
///
/// Used by tests and by embedders that synthesize hierarchies instead of
/// reading them from classfiles.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClassHierarchy {
    names: Vec<String>,
    classes: HashMap<String, ClassMetadata>,
}

impl ClassHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class, replacing any previous class of the same name while
    /// keeping its original declaration position.
    pub fn add(&mut self, class: ClassMetadata) {
        if !self.classes.contains_key(&class.name) {
            self.names.push(class.name.clone());
        }
        self.classes.insert(class.name.clone(), class);
    }
}

impl HierarchySource for ClassHierarchy {
    fn class_names(&self) -> &[String] {
        &self.names
    }

    fn class(&self, name: &str) -> Option<&ClassMetadata> {
        self.classes.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn class(name: &str, access_flags: u16) -> ClassMetadata {
        ClassMetadata {
            name: name.to_string(),
            super_class: None,
            interfaces: Vec::new(),
            access_flags,
            methods: Vec::new(),
        }
    }

    #[test]
    fn flag_predicates() {
        let method = MethodMetadata::new(
            MethodDescriptor::new("init", "()V"),
            ACC_STATIC | ACC_NATIVE,
            false,
        );
        assert!(method.is_static());
        assert!(method.is_native());
        assert!(!method.is_abstract());
        assert!(class("I", ACC_INTERFACE).is_interface());
        assert!(class("A", ACC_ABSTRACT).is_abstract());
        assert!(!class("B", 0).is_interface());
    }

    #[test]
    fn hierarchy_preserves_declaration_order() {
        let mut hierarchy = ClassHierarchy::new();
        hierarchy.add(class("B", 0));
        hierarchy.add(class("A", 0));
        hierarchy.add(class("B", ACC_ABSTRACT));
        assert_eq!(hierarchy.class_names(), ["B".to_string(), "A".to_string()]);
        assert!(hierarchy.class("B").is_some_and(ClassMetadata::is_abstract));
        assert!(hierarchy.class("C").is_none());
    }
}
