use crate::chunk::{
    Chunk, ChunkLibrary, ConditionalChunk, ContentSetChunk, ExtensionChunk, ForEachChunk, GlobalVariableChunk,
    LocalVariableChunk, MacroChunk, PageBaseTypeChunk, RenderPartialChunk, SendExpressionChunk,
    SendLiteralChunk, UseModuleChunk, UseNamespaceChunk, ViewDataChunk, ViewDataModelChunk,
};
use crate::error::CompileError;

pub type VisitResult = Result<(), CompileError>;

/// The ChunkVisitor trait is the single dispatch mechanism over chunk lists.
///
/// Rules:
/// 1. Chunks are visited in list order, which is execution order.
/// 2. Every `visit_*` method defaults to a no-op; a pass overrides only what it needs.
/// 3. Nested bodies are NOT walked automatically. A pass that needs a body calls
///    `accept` on it.
/// 4. Partial inclusion is followed through a [`PartialGuard`], never by hand.
pub trait ChunkVisitor {
    fn accept(&mut self, chunks: &[Chunk]) -> VisitResult {
        walk_chunks(self, chunks)
    }

    fn visit_chunk(&mut self, chunk: &Chunk) -> VisitResult {
        walk_chunk(self, chunk)
    }

    fn visit_send_literal(&mut self, _chunk: &SendLiteralChunk) -> VisitResult {
        Ok(())
    }

    fn visit_send_expression(&mut self, _chunk: &SendExpressionChunk) -> VisitResult {
        Ok(())
    }

    fn visit_local_variable(&mut self, _chunk: &LocalVariableChunk) -> VisitResult {
        Ok(())
    }

    fn visit_global_variable(&mut self, _chunk: &GlobalVariableChunk) -> VisitResult {
        Ok(())
    }

    fn visit_view_data(&mut self, _chunk: &ViewDataChunk) -> VisitResult {
        Ok(())
    }

    fn visit_conditional(&mut self, _chunk: &ConditionalChunk) -> VisitResult {
        Ok(())
    }

    fn visit_for_each(&mut self, _chunk: &ForEachChunk) -> VisitResult {
        Ok(())
    }

    fn visit_page_base_type(&mut self, _chunk: &PageBaseTypeChunk) -> VisitResult {
        Ok(())
    }

    fn visit_view_data_model(&mut self, _chunk: &ViewDataModelChunk) -> VisitResult {
        Ok(())
    }

    fn visit_macro(&mut self, _chunk: &MacroChunk) -> VisitResult {
        Ok(())
    }

    fn visit_use_namespace(&mut self, _chunk: &UseNamespaceChunk) -> VisitResult {
        Ok(())
    }

    fn visit_use_module(&mut self, _chunk: &UseModuleChunk) -> VisitResult {
        Ok(())
    }

    fn visit_render_partial(&mut self, _chunk: &RenderPartialChunk) -> VisitResult {
        Ok(())
    }

    fn visit_content_set(&mut self, _chunk: &ContentSetChunk) -> VisitResult {
        Ok(())
    }

    fn visit_extension(&mut self, _chunk: &ExtensionChunk) -> VisitResult {
        Ok(())
    }
}

pub fn walk_chunks<V: ChunkVisitor + ?Sized>(visitor: &mut V, chunks: &[Chunk]) -> VisitResult {
    for chunk in chunks {
        visitor.visit_chunk(chunk)?;
    }
    Ok(())
}

pub fn walk_chunk<V: ChunkVisitor + ?Sized>(visitor: &mut V, chunk: &Chunk) -> VisitResult {
    match chunk {
        Chunk::SendLiteral(c) => visitor.visit_send_literal(c),
        Chunk::SendExpression(c) => visitor.visit_send_expression(c),
        Chunk::LocalVariable(c) => visitor.visit_local_variable(c),
        Chunk::GlobalVariable(c) => visitor.visit_global_variable(c),
        Chunk::ViewData(c) => visitor.visit_view_data(c),
        Chunk::Conditional(c) => visitor.visit_conditional(c),
        Chunk::ForEach(c) => visitor.visit_for_each(c),
        Chunk::PageBaseType(c) => visitor.visit_page_base_type(c),
        Chunk::ViewDataModel(c) => visitor.visit_view_data_model(c),
        Chunk::Macro(c) => visitor.visit_macro(c),
        Chunk::UseNamespace(c) => visitor.visit_use_namespace(c),
        Chunk::UseModule(c) => visitor.visit_use_module(c),
        Chunk::RenderPartial(c) => visitor.visit_render_partial(c),
        Chunk::ContentSet(c) => visitor.visit_content_set(c),
        Chunk::Extension(c) => visitor.visit_extension(c),
    }
}

/// Walks a body and every body nested in it. Used by passes that must see all
/// reachable declarations but do not care about control flow.
pub fn walk_nested<V: ChunkVisitor + ?Sized>(visitor: &mut V, chunk: &Chunk) -> VisitResult {
    match chunk {
        Chunk::Conditional(c) => visitor.accept(&c.body),
        Chunk::ForEach(c) => visitor.accept(&c.body),
        Chunk::Macro(c) => visitor.accept(&c.body),
        Chunk::ContentSet(c) => visitor.accept(&c.body),
        Chunk::Extension(c) => visitor.accept(&c.body),
        _ => Ok(()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARTIAL INCLUSION GUARD
// ═══════════════════════════════════════════════════════════════════════════════

/// Template identifiers currently expanded on the active inclusion path.
#[derive(Debug, Default, Clone)]
pub struct PartialGuard {
    active: Vec<String>,
}

impl PartialGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `template` as the root of the active path so a partial that
    /// includes its own caller is skipped.
    pub fn with_root(template: &str) -> Self {
        Self {
            active: vec![template.to_string()],
        }
    }

    pub fn is_active(&self, template: &str) -> bool {
        self.active.iter().any(|t| t == template)
    }

    pub fn depth(&self) -> usize {
        self.active.len()
    }
}

/// Descends into the partial named by `chunk`, unless it is already being
/// expanded on the active path or is missing from the library. Returns
/// `Ok(false)` when the partial was skipped.
pub fn descend_partial<V, F>(
    visitor: &mut V,
    chunk: &RenderPartialChunk,
    library: &ChunkLibrary,
    guard: F,
) -> Result<bool, CompileError>
where
    V: ChunkVisitor + ?Sized,
    F: Fn(&mut V) -> &mut PartialGuard,
{
    if guard(visitor).is_active(&chunk.target) {
        tracing::trace!(partial = %chunk.target, "partial already active, skipped");
        return Ok(false);
    }
    let Some(contents) = library.get(&chunk.target).cloned() else {
        return Ok(false);
    };

    guard(visitor).active.push(chunk.target.clone());
    let result = visitor.accept(&contents);
    guard(visitor).active.pop();
    result.map(|_| true)
}
