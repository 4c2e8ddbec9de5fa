#![forbid(unsafe_code)]

//! Class and method metadata consumed by the Javelin backend.
//!
//! Everything here is an immutable snapshot: the frontend (or a classfile
//! reader) produces a fully resolved [`HierarchySource`] once, and the backend
//! phases only read from it. Access flags are kept raw, exactly as they appear
//! in classfiles.

mod flags;
mod hierarchy;
mod method;

pub use crate::flags::{ACC_ABSTRACT, ACC_INTERFACE, ACC_NATIVE, ACC_STATIC};
pub use crate::hierarchy::{ClassHierarchy, ClassMetadata, HierarchySource, MethodMetadata};
pub use crate::method::{MethodDescriptor, MethodReference};
