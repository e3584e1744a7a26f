use super::DeclarationTables;
use crate::chunk::{
    ChunkLibrary, ConditionalChunk, ContentSetChunk, ExtensionChunk, ForEachChunk, MacroChunk, RenderPartialChunk,
};
use crate::codegen::GeneratedCodeVisitor;
use crate::dialect::BackendDialect;
use crate::settings::NullBehaviour;
use crate::visitor::{descend_partial, ChunkVisitor, PartialGuard, VisitResult};
use crate::writer::SourceWriter;

/// Implementation pass: one executable body per macro, sharing the
/// declaration pass's tables so each macro is implemented exactly once.
pub struct GlobalFunctionsVisitor<'a> {
    source: &'a mut SourceWriter,
    dialect: BackendDialect,
    null_behaviour: NullBehaviour,
    class_name: &'a str,
    tables: &'a mut DeclarationTables,
    library: &'a ChunkLibrary,
    guard: PartialGuard,
}

impl<'a> GlobalFunctionsVisitor<'a> {
    pub fn new(
        source: &'a mut SourceWriter,
        dialect: BackendDialect,
        null_behaviour: NullBehaviour,
        class_name: &'a str,
        tables: &'a mut DeclarationTables,
        library: &'a ChunkLibrary,
    ) -> Self {
        Self {
            source,
            dialect,
            null_behaviour,
            class_name,
            tables,
            library,
            guard: PartialGuard::new(),
        }
    }
}

impl ChunkVisitor for GlobalFunctionsVisitor<'_> {
    fn visit_macro(&mut self, chunk: &MacroChunk) -> VisitResult {
        if self.tables.macros_implemented.insert(chunk.name.clone()) {
            tracing::trace!(name = %chunk.name, "implementing macro");
            self.dialect.macro_open(self.source, self.class_name, chunk);
            let mut body = GeneratedCodeVisitor::new(
                self.source,
                self.dialect,
                self.null_behaviour,
                self.library,
                self.guard.clone(),
            );
            body.accept(&chunk.body)?;
            self.dialect.macro_close(self.source);
        }
        self.accept(&chunk.body)
    }

    fn visit_conditional(&mut self, chunk: &ConditionalChunk) -> VisitResult {
        self.accept(&chunk.body)
    }

    fn visit_for_each(&mut self, chunk: &ForEachChunk) -> VisitResult {
        self.accept(&chunk.body)
    }

    fn visit_content_set(&mut self, chunk: &ContentSetChunk) -> VisitResult {
        self.accept(&chunk.body)
    }

    fn visit_extension(&mut self, chunk: &ExtensionChunk) -> VisitResult {
        self.accept(&chunk.body)
    }

    fn visit_render_partial(&mut self, chunk: &RenderPartialChunk) -> VisitResult {
        let library = self.library;
        descend_partial(self, chunk, library, |v| &mut v.guard).map(|_| ())
    }
}
