//! Declaration collection.
//!
//! These passes walk every chunk reachable from the render levels, including
//! nested bodies and included partials, and write the parts of the generated
//! class that sit outside the render routines.

mod base_class;
mod globals;
mod globals_impl;
mod tables;
mod using;

pub use base_class::{BaseClassVisitor, ResolvedBaseType};
pub use globals::GlobalMembersVisitor;
pub use globals_impl::GlobalFunctionsVisitor;
pub use tables::{DeclarationTables, Declared};
pub use using::UsingNamespaceVisitor;
