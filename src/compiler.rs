//! View compilation: generated source assembly and backend loading.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use ulid::Ulid;

use crate::backend;
use crate::chunk::{ChunkLibrary, ChunkList};
use crate::codegen::GeneratedCodeVisitor;
use crate::declarations::{
    BaseClassVisitor, DeclarationTables, GlobalFunctionsVisitor, GlobalMembersVisitor, ResolvedBaseType,
    UsingNamespaceVisitor,
};
use crate::error::CompileError;
use crate::runtime::{ViewInstance, ViewType};
use crate::settings::{CompilerSettings, ViewDescriptor};
use crate::types::BaseTypeCatalog;
use crate::visitor::{ChunkVisitor, PartialGuard};
use crate::writer::{SourceMap, SourceWriter};

/// Source text of one generated view plus everything the backend needs to
/// check it.
#[derive(Debug, Clone)]
pub struct GeneratedSource {
    pub class_name: String,
    pub view_id: Ulid,
    pub target_namespace: Option<String>,
    pub base_type: ResolvedBaseType,
    pub text: String,
    pub source_map: SourceMap,
    /// Modules referenced by settings and `use` directives, in first-seen order.
    pub modules: Vec<String>,
    pub tables: DeclarationTables,
}

impl GeneratedSource {
    pub fn full_name(&self) -> String {
        match &self.target_namespace {
            Some(ns) => format!("{}.{}", ns, self.class_name),
            None => self.class_name.clone(),
        }
    }
}

/// A loaded view type together with the source it was compiled from.
#[derive(Debug, Clone)]
pub struct CompiledView {
    generated: GeneratedSource,
    view_type: Arc<ViewType>,
    source_digest: String,
}

impl CompiledView {
    pub fn create_instance(&self) -> ViewInstance {
        self.view_type.create_instance()
    }

    pub fn view_type(&self) -> &Arc<ViewType> {
        &self.view_type
    }

    pub fn generated_view_id(&self) -> Ulid {
        self.generated.view_id
    }

    pub fn full_name(&self) -> String {
        self.generated.full_name()
    }

    pub fn source(&self) -> &str {
        &self.generated.text
    }

    pub fn source_map(&self) -> &SourceMap {
        &self.generated.source_map
    }

    pub fn modules(&self) -> &[String] {
        &self.generated.modules
    }

    /// SHA-256 of the generated source, lowercase hex.
    pub fn source_digest(&self) -> &str {
        &self.source_digest
    }

    pub fn generated(&self) -> &GeneratedSource {
        &self.generated
    }
}

pub struct ViewCompiler {
    settings: CompilerSettings,
    catalog: BaseTypeCatalog,
}

impl ViewCompiler {
    pub fn new(settings: CompilerSettings) -> Self {
        let catalog = settings.catalog();
        Self { settings, catalog }
    }

    /// Replaces the base-type catalog derived from the settings.
    pub fn with_catalog(mut self, catalog: BaseTypeCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    /// Produces the complete source text of one view class. `levels` holds
    /// one chunk list per descriptor template, innermost view first; partials
    /// are resolved through `library`.
    pub fn generate_source(
        &self,
        descriptor: &ViewDescriptor,
        levels: &[ChunkList],
        library: &ChunkLibrary,
    ) -> Result<GeneratedSource, CompileError> {
        let settings = &self.settings;
        let dialect = settings.dialect;
        let view_id = Ulid::new();
        let class_name = format!("View{}", view_id);
        let namespace = descriptor.target_namespace.as_deref();

        let mut tables = DeclarationTables::new();
        let mut source = SourceWriter::new(settings.debug);

        dialect.unit_open(&mut source, namespace);
        {
            let mut using = UsingNamespaceVisitor::new(&mut source, dialect, &mut tables, library);
            for ns in &settings.use_namespaces {
                using.add_namespace(ns);
            }
            for module in &settings.use_modules {
                using.add_module(module);
            }
            for level in levels {
                using.accept(level)?;
            }
            using.finish();
        }

        let mut base_class = BaseClassVisitor::new(library);
        for level in levels {
            base_class.accept(level)?;
        }
        let base_type = base_class.resolve(&settings.base_type);

        dialect.class_open(
            &mut source,
            &class_name,
            &base_type.text,
            namespace,
            &descriptor.templates,
        );
        dialect.view_id_members(&mut source, &view_id.to_string());
        for accessor in &descriptor.accessors {
            dialect.accessor(&mut source, accessor);
        }

        {
            let mut members = GlobalMembersVisitor::new(&mut source, dialect, &mut tables, library);
            for level in levels {
                members.accept(level)?;
            }
        }
        for level in 0..levels.len() {
            dialect.render_level_declaration(&mut source, level);
        }
        dialect.render_entry_declaration(&mut source);
        dialect.class_close(&mut source);

        {
            let mut functions = GlobalFunctionsVisitor::new(
                &mut source,
                dialect,
                settings.null_behaviour,
                &class_name,
                &mut tables,
                library,
            );
            for level in levels {
                functions.accept(level)?;
            }
        }

        for (index, level) in levels.iter().enumerate() {
            let guard = match descriptor.templates.get(index) {
                Some(template) => PartialGuard::with_root(template),
                None => PartialGuard::new(),
            };
            dialect.render_level_open(&mut source, &class_name, index);
            GeneratedCodeVisitor::new(&mut source, dialect, settings.null_behaviour, library, guard)
                .accept(level)?;
            dialect.render_level_close(&mut source);
        }
        dialect.render_entry(&mut source, &class_name, levels.len());
        dialect.unit_close(&mut source, namespace);

        let (text, source_map) = source.finish();
        tracing::debug!(
            view = %class_name,
            %dialect,
            levels = levels.len(),
            length = text.len(),
            "generated view source"
        );

        Ok(GeneratedSource {
            class_name,
            view_id,
            target_namespace: descriptor.target_namespace.clone(),
            base_type,
            text,
            source_map,
            modules: tables.modules.clone(),
            tables,
        })
    }

    /// Generates the source and loads it through the backend.
    pub fn compile_view(
        &self,
        descriptor: &ViewDescriptor,
        levels: &[ChunkList],
        library: &ChunkLibrary,
    ) -> Result<CompiledView, CompileError> {
        let generated = self.generate_source(descriptor, levels, library)?;
        let view_type = backend::compile(&generated, descriptor, levels, library, &self.settings, &self.catalog)?;
        let source_digest = hex_digest(&generated.text);
        Ok(CompiledView {
            generated,
            view_type: Arc::new(view_type),
            source_digest,
        })
    }
}

fn hex_digest(text: &str) -> String {
    Sha256::digest(text.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
