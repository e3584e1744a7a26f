//! # View Compiler
//!
//! Compiles markup view templates into loadable view types.
//!
//! ```text
//! Node tree → normalize → ChunkBuilder → declaration passes → dialect codegen
//!           → render-level composition → backend → ViewType → ViewInstance
//! ```
//!
//! ## Pipeline Invariants
//!
//! 1. **Single Lowering**: every template is normalized and lowered exactly once per
//!    compilation. Chunk trees are never re-derived from source text.
//!
//! 2. **Declaration Split**: class members (globals, view data, the model alias, macro
//!    signatures) are declared by passes that walk every reachable chunk before any
//!    render routine is written. Bodies are implemented afterwards, once per name.
//!
//! 3. **First Declaration Wins**: repeating an identical declaration is a no-op; a
//!    conflicting one fails with both template positions (VC-ERR-DECLARATION).
//!
//! 4. **Cycle-Safe Partials**: partial inclusion is followed through a guard keyed by
//!    template identifier. A partial already on the active path is skipped.
//!
//! 5. **Aggregate Backend Errors**: the backend collects every diagnostic before it
//!    fails, and the failure always carries the complete generated source
//!    (VC-ERR-BACKEND).
//!
//! 6. **Immutable View Types**: a loaded [`ViewType`] is shared read-only; each
//!    [`ViewInstance::render`] owns its own output and data scope.

pub mod builder;
pub mod chunk;
pub mod codegen;
pub mod compiler;
pub mod declarations;
pub mod dialect;
pub mod error;
pub mod expr;
pub mod node;
pub mod normalize;
pub mod pipeline;
pub mod runtime;
pub mod settings;
pub mod types;
pub mod visitor;
pub mod writer;

mod backend;

#[cfg(test)]
mod declaration_tests;
#[cfg(test)]
mod expression_tests;
#[cfg(test)]
mod normalize_tests;
#[cfg(test)]
mod pipeline_tests;

pub use builder::ChunkBuilder;
pub use chunk::{Chunk, ChunkLibrary, ChunkList};
pub use compiler::{CompiledView, GeneratedSource, ViewCompiler};
pub use dialect::BackendDialect;
pub use error::{BackendError, CompileError, Diagnostic, RenderError};
pub use node::{ElementNode, ExtensionFactory, Node, Position, ViewExtension};
pub use pipeline::{InMemorySource, Pipeline, TemplateSource};
pub use runtime::{html_encode, ViewInstance, ViewType};
pub use settings::{CompilerSettings, NullBehaviour, ViewDescriptor};
pub use types::{BaseTypeCatalog, TypeRef};
