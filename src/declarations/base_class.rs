use crate::chunk::{
    ChunkLibrary, ConditionalChunk, ContentSetChunk, ExtensionChunk, ForEachChunk, MacroChunk, PageBaseTypeChunk, RenderPartialChunk,
    ViewDataModelChunk,
};
use crate::error::CompileError;
use crate::node::Position;
use crate::types::TypeRef;
use crate::visitor::{descend_partial, ChunkVisitor, PartialGuard, VisitResult};

/// The class the generated view derives from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBaseType {
    /// Type text as written into the generated source.
    pub text: String,
    /// `None` when the text is not a well-formed type reference.
    pub type_ref: Option<TypeRef>,
    /// Template position of the override, if one was used.
    pub position: Option<Position>,
}

/// Finds the page base type override and the view data model.
pub struct BaseClassVisitor<'a> {
    library: &'a ChunkLibrary,
    guard: PartialGuard,
    base_type: Option<PageBaseTypeChunk>,
    model: Option<ViewDataModelChunk>,
}

impl<'a> BaseClassVisitor<'a> {
    pub fn new(library: &'a ChunkLibrary) -> Self {
        Self {
            library,
            guard: PartialGuard::new(),
            base_type: None,
            model: None,
        }
    }

    /// Applies the override (or `default`) and closes a non-generic base over
    /// the model type. Explicit generic arguments are kept as written.
    pub fn resolve(&self, default: &str) -> ResolvedBaseType {
        let (text, position) = match &self.base_type {
            Some(chunk) => (chunk.base_type.trim().to_string(), chunk.position.clone()),
            None => (default.to_string(), None),
        };
        let Some(mut type_ref) = TypeRef::parse(&text) else {
            return ResolvedBaseType {
                text,
                type_ref: None,
                position,
            };
        };
        if let Some(model) = &self.model {
            if type_ref.args.is_empty() {
                if let Some(model_type) = TypeRef::parse(&model.model_type) {
                    type_ref.args.push(model_type);
                }
            }
        }
        ResolvedBaseType {
            text: type_ref.to_string(),
            type_ref: Some(type_ref),
            position,
        }
    }
}

impl ChunkVisitor for BaseClassVisitor<'_> {
    fn visit_page_base_type(&mut self, chunk: &PageBaseTypeChunk) -> VisitResult {
        match &self.base_type {
            None => {
                self.base_type = Some(chunk.clone());
                Ok(())
            }
            Some(first) if first.base_type.trim() == chunk.base_type.trim() => Ok(()),
            Some(first) => Err(CompileError::Declaration {
                kind: "page base type",
                name: first.base_type.clone(),
                detail: format!("types ('{}')", chunk.base_type),
                first: first.position.clone(),
                second: chunk.position.clone(),
            }),
        }
    }

    fn visit_view_data_model(&mut self, chunk: &ViewDataModelChunk) -> VisitResult {
        if self.model.is_none() {
            self.model = Some(chunk.clone());
        }
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
        self.accept(&chunk.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;

    fn model(model_type: &str) -> Chunk {
        Chunk::ViewDataModel(ViewDataModelChunk {
            model_type: model_type.to_string(),
            alias: None,
            position: None,
        })
    }

    fn base(text: &str) -> Chunk {
        Chunk::PageBaseType(PageBaseTypeChunk {
            base_type: text.to_string(),
            position: None,
        })
    }

    #[test]
    fn test_default_is_closed_over_model() {
        let library = ChunkLibrary::new();
        let mut visitor = BaseClassVisitor::new(&library);
        visitor.accept(&[model("Site.Order")]).unwrap();
        assert_eq!(visitor.resolve("ViewBase").text, "ViewBase<Site.Order>");
    }

    #[test]
    fn test_explicit_generic_arguments_win() {
        let library = ChunkLibrary::new();
        let mut visitor = BaseClassVisitor::new(&library);
        visitor
            .accept(&[base("Store.View<Site.Customer>"), model("Site.Order")])
            .unwrap();
        assert_eq!(visitor.resolve("ViewBase").text, "Store.View<Site.Customer>");
    }

    #[test]
    fn test_conflicting_overrides_fail() {
        let library = ChunkLibrary::new();
        let mut visitor = BaseClassVisitor::new(&library);
        let error = visitor.accept(&[base("A"), base("B")]).unwrap_err();
        assert_eq!(error.code(), crate::error::ERR_DECLARATION_CONFLICT);
    }
}
