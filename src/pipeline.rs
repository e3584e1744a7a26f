//! End-to-end compilation from template identifiers to loaded views.
//!
//! A [`Pipeline`] loads node trees through a [`TemplateSource`], normalizes and
//! lowers every template a descriptor needs, collects the partials reachable
//! from them into a [`ChunkLibrary`] and hands the result to [`ViewCompiler`].

use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use crate::builder::ChunkBuilder;
use crate::chunk::{Chunk, ChunkLibrary, ChunkList, RenderPartialChunk};
use crate::compiler::{CompiledView, ViewCompiler};
use crate::error::CompileError;
use crate::node::{ExtensionFactory, Node, Position};
use crate::normalize::{normalize, NormalizeContext};
use crate::settings::{CompilerSettings, ViewDescriptor};
use crate::visitor::{walk_chunk, walk_nested, ChunkVisitor, VisitResult};

/// Produces node trees for template identifiers.
pub trait TemplateSource: Send + Sync {
    fn load(&self, template: &str) -> Result<Vec<Node>, CompileError>;

    /// Raw text of a template, for text-mode includes.
    fn load_text(&self, template: &str) -> Result<String, CompileError>;
}

fn not_found(template: &str) -> CompileError {
    CompileError::TemplateSource {
        template: template.to_string(),
        message: "no such template".to_string(),
    }
}

/// Templates held in memory, either as node trees or as plain text.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    nodes: BTreeMap<String, Vec<Node>>,
    texts: BTreeMap<String, String>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(mut self, template: &str, nodes: Vec<Node>) -> Self {
        self.nodes.insert(template.to_string(), nodes);
        self
    }

    /// Registers a plain text template. Loaded as a node tree it is a single
    /// text node.
    pub fn with_text(mut self, template: &str, text: &str) -> Self {
        self.texts.insert(template.to_string(), text.to_string());
        self
    }

    /// Registers a node tree delivered as JSON.
    pub fn with_json(self, template: &str, json: &str) -> Result<Self, CompileError> {
        let nodes = Node::from_json(json).map_err(|e| CompileError::TemplateSource {
            template: template.to_string(),
            message: e.to_string(),
        })?;
        Ok(self.with_nodes(template, nodes))
    }
}

impl TemplateSource for InMemorySource {
    fn load(&self, template: &str) -> Result<Vec<Node>, CompileError> {
        if let Some(nodes) = self.nodes.get(template) {
            return Ok(nodes.clone());
        }
        match self.texts.get(template) {
            Some(text) => Ok(vec![Node::text(text.clone(), Position::new(template, 1, 1))]),
            None => Err(not_found(template)),
        }
    }

    fn load_text(&self, template: &str) -> Result<String, CompileError> {
        self.texts.get(template).cloned().ok_or_else(|| not_found(template))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Pipeline<S: TemplateSource> {
    source: S,
    compiler: ViewCompiler,
    extensions: Option<Arc<dyn ExtensionFactory>>,
}

impl<S: TemplateSource> Pipeline<S> {
    pub fn new(source: S, settings: CompilerSettings) -> Self {
        Self {
            source,
            compiler: ViewCompiler::new(settings),
            extensions: None,
        }
    }

    pub fn with_compiler(mut self, compiler: ViewCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_extensions(mut self, extensions: Arc<dyn ExtensionFactory>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    pub fn settings(&self) -> &CompilerSettings {
        self.compiler.settings()
    }

    /// Loads, normalizes and lowers one template.
    pub fn lower(&self, template: &str) -> Result<ChunkList, CompileError> {
        let settings = self.compiler.settings();
        let nodes = self.source.load(template)?;
        let mut context = NormalizeContext::new(settings, template)
            .with_source(&self.source)
            .with_extensions(self.extensions.clone());
        let nodes = normalize(nodes, &mut context)?;
        ChunkBuilder::build(&nodes, settings.automatic_encoding)
    }

    /// Lowers the descriptor's templates and every partial they reach, then
    /// compiles and loads the view.
    pub fn compile(&self, descriptor: &ViewDescriptor) -> Result<CompiledView, CompileError> {
        let mut library = ChunkLibrary::new();
        let mut levels = Vec::with_capacity(descriptor.templates.len());
        for template in &descriptor.templates {
            let chunks = self.lower(template)?;
            library.insert(template.clone(), chunks.clone());
            levels.push(chunks);
        }
        self.collect_partials(&levels, &mut library)?;
        tracing::debug!(templates = library.len(), levels = levels.len(), "templates lowered");
        self.compiler.compile_view(descriptor, &levels, &library)
    }

    /// Compiles every descriptor in parallel. Results keep descriptor order.
    pub fn compile_batch(&self, descriptors: &[ViewDescriptor]) -> Vec<Result<CompiledView, CompileError>> {
        descriptors.par_iter().map(|d| self.compile(d)).collect()
    }

    /// Worklist over partial references. A partial that cannot be loaded is
    /// left out of the library; the backend reports it as missing.
    fn collect_partials(&self, levels: &[ChunkList], library: &mut ChunkLibrary) -> Result<(), CompileError> {
        let mut pending: VecDeque<String> = VecDeque::new();
        let mut seen: BTreeSet<String> = library.templates().map(str::to_string).collect();
        for level in levels {
            pending.extend(partial_targets(level)?);
        }
        while let Some(target) = pending.pop_front() {
            if !seen.insert(target.clone()) {
                continue;
            }
            let chunks = match self.lower(&target) {
                Ok(chunks) => chunks,
                Err(CompileError::TemplateSource { template, message }) => {
                    tracing::debug!(%template, %message, "partial not loaded");
                    continue;
                }
                Err(error) => return Err(error),
            };
            pending.extend(partial_targets(&chunks)?);
            library.insert(target, chunks);
        }
        Ok(())
    }
}

fn partial_targets(chunks: &[Chunk]) -> Result<Vec<String>, CompileError> {
    let mut collector = PartialCollector::default();
    collector.accept(chunks)?;
    Ok(collector.targets)
}

#[derive(Default)]
struct PartialCollector {
    targets: Vec<String>,
}

impl ChunkVisitor for PartialCollector {
    fn visit_chunk(&mut self, chunk: &Chunk) -> VisitResult {
        walk_chunk(self, chunk)?;
        walk_nested(self, chunk)
    }

    fn visit_render_partial(&mut self, chunk: &RenderPartialChunk) -> VisitResult {
        self.targets.push(chunk.target.clone());
        Ok(())
    }
}
