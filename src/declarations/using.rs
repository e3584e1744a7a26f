use super::DeclarationTables;
use crate::chunk::{
    ChunkLibrary, ConditionalChunk, ContentSetChunk, ExtensionChunk, ForEachChunk, MacroChunk, OutputLocation,
    RenderPartialChunk, UseModuleChunk, UseNamespaceChunk,
};
use crate::dialect::BackendDialect;
use crate::visitor::{descend_partial, ChunkVisitor, PartialGuard, VisitResult};
use crate::writer::SourceWriter;

/// Writes the namespace import section and records referenced modules.
pub struct UsingNamespaceVisitor<'a> {
    source: &'a mut SourceWriter,
    dialect: BackendDialect,
    tables: &'a mut DeclarationTables,
    library: &'a ChunkLibrary,
    guard: PartialGuard,
    written: usize,
}

impl<'a> UsingNamespaceVisitor<'a> {
    pub fn new(
        source: &'a mut SourceWriter,
        dialect: BackendDialect,
        tables: &'a mut DeclarationTables,
        library: &'a ChunkLibrary,
    ) -> Self {
        Self {
            source,
            dialect,
            tables,
            library,
            guard: PartialGuard::new(),
            written: 0,
        }
    }

    pub fn add_namespace(&mut self, namespace: &str) {
        if self.tables.add_namespace(namespace) {
            self.dialect
                .using_namespace(self.source, namespace, self.written == 0);
            self.written += 1;
        }
    }

    pub fn add_module(&mut self, module: &str) {
        self.tables.add_module(module);
    }

    /// Terminates the import list.
    pub fn finish(self) {
        self.dialect.using_close(self.source, self.written);
    }
}

impl ChunkVisitor for UsingNamespaceVisitor<'_> {
    fn visit_use_namespace(&mut self, chunk: &UseNamespaceChunk) -> VisitResult {
        self.add_namespace(&chunk.namespace);
        Ok(())
    }

    fn visit_use_module(&mut self, chunk: &UseModuleChunk) -> VisitResult {
        self.add_module(&chunk.module);
        Ok(())
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

    fn visit_macro(&mut self, chunk: &MacroChunk) -> VisitResult {
        self.accept(&chunk.body)
    }

    fn visit_render_partial(&mut self, chunk: &RenderPartialChunk) -> VisitResult {
        let library = self.library;
        descend_partial(self, chunk, library, |v| &mut v.guard).map(|_| ())
    }

    fn visit_extension(&mut self, chunk: &ExtensionChunk) -> VisitResult {
        chunk
            .extension
            .emit(OutputLocation::UsingNamespace, &chunk.body, self.source.buffer_mut());
        self.source.resync();
        self.accept(&chunk.body)
    }
}
