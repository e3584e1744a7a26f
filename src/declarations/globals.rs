use super::{DeclarationTables, Declared};
use crate::chunk::{
    ChunkLibrary, ConditionalChunk, ContentSetChunk, ExtensionChunk, ForEachChunk, GlobalVariableChunk, MacroChunk, OutputLocation,
    RenderPartialChunk, ViewDataChunk, ViewDataModelChunk,
};
use crate::dialect::BackendDialect;
use crate::visitor::{descend_partial, ChunkVisitor, PartialGuard, VisitResult};
use crate::writer::SourceWriter;

/// Declaration pass: class members for globals, view data, the model alias and
/// macro signatures, each once per distinct name.
pub struct GlobalMembersVisitor<'a> {
    source: &'a mut SourceWriter,
    dialect: BackendDialect,
    tables: &'a mut DeclarationTables,
    library: &'a ChunkLibrary,
    guard: PartialGuard,
}

impl<'a> GlobalMembersVisitor<'a> {
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
        }
    }
}

impl ChunkVisitor for GlobalMembersVisitor<'_> {
    fn visit_global_variable(&mut self, chunk: &GlobalVariableChunk) -> VisitResult {
        if self.tables.declare_global(chunk)? == Declared::New {
            self.source.code_indent(chunk.position.as_ref());
            self.dialect
                .global_declaration(self.source, &chunk.name, chunk.var_type.as_deref(), &chunk.value);
        }
        Ok(())
    }

    fn visit_view_data(&mut self, chunk: &ViewDataChunk) -> VisitResult {
        if self.tables.declare_view_data(chunk)? == Declared::New {
            self.dialect.view_data_declaration(
                self.source,
                &chunk.name,
                &chunk.key,
                chunk.var_type.as_deref(),
                chunk.default.as_deref(),
            );
        }
        Ok(())
    }

    fn visit_view_data_model(&mut self, chunk: &ViewDataModelChunk) -> VisitResult {
        if self.tables.declare_model(chunk)? == Declared::New {
            if let Some(alias) = &chunk.alias {
                self.dialect.model_declaration(self.source, &chunk.model_type, alias);
            }
        }
        Ok(())
    }

    fn visit_macro(&mut self, chunk: &MacroChunk) -> VisitResult {
        if self.tables.declare_macro(chunk)? == Declared::New {
            self.dialect.macro_declaration(self.source, chunk);
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

    fn visit_render_partial(&mut self, chunk: &RenderPartialChunk) -> VisitResult {
        let library = self.library;
        descend_partial(self, chunk, library, |v| &mut v.guard).map(|_| ())
    }

    fn visit_extension(&mut self, chunk: &ExtensionChunk) -> VisitResult {
        chunk
            .extension
            .emit(OutputLocation::ClassMembers, &chunk.body, self.source.buffer_mut());
        self.source.resync();
        self.accept(&chunk.body)
    }
}
