//! Statement code generation for one render level.
//!
//! Walks a chunk list and writes backend statements for every chunk kind that
//! executes at render time. Declarations are skipped here; the declaration
//! passes own them.

use crate::chunk::{
    chain_continues, chain_roles, ChainRole, Chunk, ChunkLibrary, ConditionalChunk, ConditionalKind, ContentSetChunk,
    ExtensionChunk, ForEachChunk, LocalVariableChunk, OutputLocation, RenderPartialChunk, SendExpressionChunk,
    SendLiteralChunk,
};
use crate::dialect::{BackendDialect, NullGuard};
use crate::settings::NullBehaviour;
use crate::visitor::{descend_partial, ChunkVisitor, PartialGuard, VisitResult};
use crate::writer::SourceWriter;

pub struct GeneratedCodeVisitor<'a> {
    source: &'a mut SourceWriter,
    dialect: BackendDialect,
    null_behaviour: NullBehaviour,
    library: &'a ChunkLibrary,
    guard: PartialGuard,
    /// Role of the chunk being visited within its conditional chain.
    role: ChainRole,
    /// Whether the chunk being visited is followed by a branch of its chain.
    continues: bool,
}

impl<'a> GeneratedCodeVisitor<'a> {
    pub fn new(
        source: &'a mut SourceWriter,
        dialect: BackendDialect,
        null_behaviour: NullBehaviour,
        library: &'a ChunkLibrary,
        guard: PartialGuard,
    ) -> Self {
        Self {
            source,
            dialect,
            null_behaviour,
            library,
            guard,
            role: ChainRole::NotConditional,
            continues: false,
        }
    }
}

impl ChunkVisitor for GeneratedCodeVisitor<'_> {
    fn accept(&mut self, chunks: &[Chunk]) -> VisitResult {
        let roles = chain_roles(chunks);
        let saved = (self.role, self.continues);
        for (index, chunk) in chunks.iter().enumerate() {
            self.role = roles[index];
            self.continues = chain_continues(chunks, &roles, index);
            self.visit_chunk(chunk)?;
        }
        (self.role, self.continues) = saved;
        Ok(())
    }

    fn visit_send_literal(&mut self, chunk: &SendLiteralChunk) -> VisitResult {
        self.source.code_indent(chunk.position.as_ref());
        self.dialect.write_literal(self.source, &chunk.text);
        Ok(())
    }

    fn visit_send_expression(&mut self, chunk: &SendExpressionChunk) -> VisitResult {
        self.source.code_indent(chunk.position.as_ref());
        let guard = NullGuard::for_output(self.null_behaviour, chunk.silent_nulls);
        self.dialect
            .write_expression(self.source, &chunk.code, guard, chunk.automatic_encoding);
        Ok(())
    }

    fn visit_local_variable(&mut self, chunk: &LocalVariableChunk) -> VisitResult {
        self.source.code_indent(chunk.position.as_ref());
        self.dialect
            .local_variable(self.source, &chunk.name, chunk.var_type.as_deref(), &chunk.value);
        Ok(())
    }

    fn visit_conditional(&mut self, chunk: &ConditionalChunk) -> VisitResult {
        let (role, continues) = (self.role, self.continues);
        self.source.code_indent(chunk.position.as_ref());
        match (role, &chunk.kind) {
            (ChainRole::Dangling, _) => {
                tracing::warn!(position = ?chunk.position, "else without a preceding if never renders");
                self.dialect.dangling_else_open(self.source);
            }
            (_, ConditionalKind::If) => self.dialect.if_open(self.source, &chunk.condition),
            (_, ConditionalKind::Unless) => self.dialect.unless_open(self.source, &chunk.condition),
            (_, ConditionalKind::ElseIf) => self.dialect.else_if_open(self.source, &chunk.condition),
            (_, ConditionalKind::Else) => self.dialect.else_open(self.source),
            (_, ConditionalKind::Once { key }) => self.dialect.once_open(self.source, key),
        }
        self.accept(&chunk.body)?;
        self.dialect
            .conditional_close(self.source, continues && role != ChainRole::Dangling);
        Ok(())
    }

    fn visit_for_each(&mut self, chunk: &ForEachChunk) -> VisitResult {
        self.source.code_indent(chunk.position.as_ref());
        self.dialect
            .for_each_open(self.source, &chunk.variable, &chunk.collection);
        self.accept(&chunk.body)?;
        self.dialect.for_each_close(self.source, &chunk.variable);
        Ok(())
    }

    fn visit_content_set(&mut self, chunk: &ContentSetChunk) -> VisitResult {
        self.source.code_indent(chunk.position.as_ref());
        self.dialect.content_open(self.source, &chunk.name);
        self.accept(&chunk.body)?;
        self.dialect.block_close(self.source);
        Ok(())
    }

    fn visit_render_partial(&mut self, chunk: &RenderPartialChunk) -> VisitResult {
        if self.guard.is_active(&chunk.target) {
            self.dialect
                .comment(self.source, &format!("partial {} already rendering", chunk.target));
            return Ok(());
        }
        if !self.library.contains(&chunk.target) {
            self.dialect
                .comment(self.source, &format!("partial {} not found", chunk.target));
            return Ok(());
        }
        self.source.code_indent(chunk.position.as_ref());
        self.dialect.block_open(self.source);
        for argument in &chunk.arguments {
            self.dialect
                .local_variable(self.source, &argument.name, None, &argument.value);
        }
        let library = self.library;
        descend_partial(self, chunk, library, |v| &mut v.guard)?;
        self.dialect.block_close(self.source);
        Ok(())
    }

    fn visit_extension(&mut self, chunk: &ExtensionChunk) -> VisitResult {
        self.source.code_indent(chunk.position.as_ref());
        chunk
            .extension
            .emit(OutputLocation::RenderMethod, &chunk.body, self.source.buffer_mut());
        self.source.resync();
        Ok(())
    }
}
