use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a method signature: a name plus a JVM type descriptor.
///
/// Two methods with equal descriptors occupy the same dispatch slot anywhere
/// in a class chain, regardless of which class declared them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub descriptor: String,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

/// A method descriptor pinned to the class that declares it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodReference {
    pub class_name: String,
    pub method: MethodDescriptor,
}

impl MethodReference {
    pub fn new(class_name: impl Into<String>, method: MethodDescriptor) -> Self {
        Self {
            class_name: class_name.into(),
            method,
        }
    }

    /// `java/lang/Object.clone()`, the one method that stays dispatch-eligible
    /// even when the reachability analysis never marks it as virtually called.
    pub fn object_clone() -> Self {
        Self::new(
            "java/lang/Object",
            MethodDescriptor::new("clone", "()Ljava/lang/Object;"),
        )
    }
}

impl fmt::Display for MethodReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class_name, self.method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_includes_class_and_descriptor() {
        let reference = MethodReference::new("a/B", MethodDescriptor::new("run", "()V"));
        assert_eq!(reference.to_string(), "a/B.run()V");
    }

    #[test]
    fn object_clone_is_stable() {
        let clone = MethodReference::object_clone();
        assert_eq!(clone.class_name, "java/lang/Object");
        assert_eq!(clone.method.name, "clone");
        assert_eq!(clone, MethodReference::object_clone());
    }
}
