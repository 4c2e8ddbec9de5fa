#![forbid(unsafe_code)]

//! Virtual dispatch table construction and interface lowering.
//!
//! The target object model only supports single-inheritance structural
//! subtyping of record types, so the multiple-inheritance interface graph of
//! the source program has to be folded into each class's single table chain.
//! [`build_virtual_tables`] takes a resolved class hierarchy, the set of
//! method references reachable through virtual calls, and a virtuality
//! predicate, and produces one immutable [`VirtualTable`] per surviving class
//! or interface. A subclass's entry list always extends its parent's as a
//! strict prefix, which is what lets the code generator substitute a subclass
//! table wherever the parent's table type is expected.
//!
//! The whole construction is a pure, single-threaded function of its inputs;
//! all mutable state is local to one build and dropped once the result is out.

mod builder;
mod error;
mod lca;
mod result;
mod table;

pub use crate::builder::build_virtual_tables;
pub use crate::error::{Result, VtableError};
pub use crate::result::{VirtualTable, VirtualTableEntry, VirtualTableMap};
