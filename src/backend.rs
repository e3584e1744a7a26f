//! Embedded backend compiler.
//!
//! Compiles the chunk levels a generated source was produced from into the
//! op program of a [`ViewType`]. Name resolution, expression syntax, base
//! types, partial targets and module references are checked here; every
//! problem becomes a [`Diagnostic`] and all of them are reported together
//! alongside the complete generated text.

use std::collections::{BTreeMap, BTreeSet};

use crate::chunk::{
    chain_roles, ChainRole, Chunk, ChunkLibrary, ConditionalChunk, ConditionalKind, ContentSetChunk, ExtensionChunk,
    ForEachChunk, LocalVariableChunk, RenderPartialChunk, SendExpressionChunk, SendLiteralChunk,
};
use crate::compiler::GeneratedSource;
use crate::error::{BackendError, CompileError, Diagnostic};
use crate::expr::{self, Expr, UnaryOp};
use crate::node::Position;
use crate::runtime::{CompiledExpr, Guard, MacroDef, Op, Program, ViewDataSlot, ViewType};
use crate::settings::{CompilerSettings, ViewDescriptor};
use crate::types::BaseTypeCatalog;
use crate::visitor::{descend_partial, ChunkVisitor, PartialGuard, VisitResult};
use crate::writer::SourceMap;

/// Names every expression may use without declaring them.
pub const BUILTINS: &[&str] = &["Content", "SiteRoot", "ViewData", "Model", "H"];

/// Suffixes of the locals every loop declares next to its variable.
const LOOP_SUFFIXES: &[&str] = &["Index", "Count", "IsFirst", "IsLast"];

pub fn compile(
    generated: &GeneratedSource,
    descriptor: &ViewDescriptor,
    levels: &[Vec<Chunk>],
    library: &ChunkLibrary,
    settings: &CompilerSettings,
    catalog: &BaseTypeCatalog,
) -> Result<ViewType, BackendError> {
    let mut diagnostics = Vec::new();
    let names = ClassNames::collect(generated, descriptor);
    let mut program = Program {
        null_behaviour: settings.null_behaviour,
        model_alias: generated.tables.model.as_ref().and_then(|m| m.alias.clone()),
        ..Program::default()
    };

    match &generated.base_type.type_ref {
        None => diagnostics.push(diagnostic(
            format!("'{}' is not a valid type name", generated.base_type.text),
            generated.base_type.position.as_ref(),
            &generated.source_map,
        )),
        Some(base) if !catalog.contains(base) => diagnostics.push(diagnostic(
            format!("The type '{}' could not be found", base),
            generated.base_type.position.as_ref(),
            &generated.source_map,
        )),
        Some(_) => {}
    }

    if let Some(known) = &settings.known_modules {
        for module in &generated.modules {
            if !known.contains(module) {
                diagnostics.push(diagnostic(
                    format!("The referenced module '{}' could not be found", module),
                    None,
                    &generated.source_map,
                ));
            }
        }
    }

    {
        let mut compiler = OpCompiler::new(&names, library, &generated.source_map, &mut diagnostics);
        let mut pending: BTreeSet<&str> = generated.tables.globals.iter().map(|g| g.name.as_str()).collect();
        for global in &generated.tables.globals {
            let value = compiler.expression(&global.value, global.position.as_ref());
            if let Some(value) = &value {
                for name in expr::free_identifiers(&value.expr) {
                    if pending.contains(name.as_str()) {
                        compiler.report(
                            format!("global '{}' reads '{}' before it is initialized", global.name, name),
                            global.position.as_ref(),
                        );
                    }
                }
            }
            pending.remove(global.name.as_str());
            if let Some(value) = value {
                program.globals.push((global.name.clone(), value));
            }
        }
        for slot in &generated.tables.view_data {
            let default = slot
                .default
                .as_ref()
                .and_then(|code| compiler.expression(code, slot.position.as_ref()));
            program.view_data.insert(
                slot.name.clone(),
                ViewDataSlot {
                    key: slot.key.clone(),
                    default,
                },
            );
        }
        for accessor in &descriptor.accessors {
            if let Some(value) = compiler.expression(&accessor.value, None) {
                program.accessors.insert(accessor.name.clone(), value);
            }
        }
    }

    for definition in &generated.tables.macros {
        let params: Vec<String> = definition.parameters.iter().map(|p| p.name.clone()).collect();
        let mut compiler = OpCompiler::new(&names, library, &generated.source_map, &mut diagnostics);
        compiler.scopes = vec![params.iter().cloned().collect()];
        let body = compiler.compile(&definition.body);
        program.macros.insert(definition.name.clone(), MacroDef { params, body });
    }

    for (index, level) in levels.iter().enumerate() {
        let mut compiler = OpCompiler::new(&names, library, &generated.source_map, &mut diagnostics);
        if let Some(template) = descriptor.templates.get(index) {
            compiler.guard = PartialGuard::with_root(template);
        }
        program.levels.push(compiler.compile(level));
    }

    if !diagnostics.is_empty() {
        tracing::debug!(errors = diagnostics.len(), view = %generated.class_name, "backend compile failed");
        return Err(BackendError {
            dialect: settings.dialect,
            diagnostics,
            generated_source: generated.text.clone(),
        });
    }

    tracing::debug!(view = %generated.full_name(), levels = program.levels.len(), "view compiled");
    Ok(ViewType {
        name: generated.class_name.clone(),
        namespace: generated.target_namespace.clone(),
        view_id: generated.view_id,
        base_type: generated
            .base_type
            .type_ref
            .clone()
            .unwrap_or_else(|| crate::types::TypeRef::simple(&generated.base_type.text)),
        catalog: catalog.clone(),
        modules: generated.modules.clone(),
        program,
    })
}

fn diagnostic(message: String, template: Option<&Position>, source_map: &SourceMap) -> Diagnostic {
    Diagnostic {
        generated: template.and_then(|p| source_map.generated_for(p)),
        template: template.cloned(),
        message,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAME RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Class-level names: members declared by the declaration passes, accessors,
/// macros and built-ins.
struct ClassNames {
    members: BTreeSet<String>,
    macros: BTreeMap<String, usize>,
}

impl ClassNames {
    fn collect(generated: &GeneratedSource, descriptor: &ViewDescriptor) -> Self {
        let tables = &generated.tables;
        let mut members: BTreeSet<String> = BUILTINS.iter().map(|b| b.to_string()).collect();
        members.extend(tables.globals.iter().map(|g| g.name.clone()));
        members.extend(tables.view_data.iter().map(|v| v.name.clone()));
        members.extend(tables.model.iter().filter_map(|m| m.alias.clone()));
        members.extend(descriptor.accessors.iter().map(|a| a.name.clone()));
        let macros: BTreeMap<String, usize> = tables
            .macros
            .iter()
            .map(|m| (m.name.clone(), m.parameters.len()))
            .collect();
        members.extend(macros.keys().cloned());
        Self { members, macros }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OP COMPILER
// ═══════════════════════════════════════════════════════════════════════════════

struct OpCompiler<'a> {
    names: &'a ClassNames,
    library: &'a ChunkLibrary,
    source_map: &'a SourceMap,
    diagnostics: &'a mut Vec<Diagnostic>,
    guard: PartialGuard,
    /// Lexical scopes, innermost last.
    scopes: Vec<BTreeSet<String>>,
    ops: Vec<Op>,
    role: ChainRole,
}

impl<'a> OpCompiler<'a> {
    fn new(
        names: &'a ClassNames,
        library: &'a ChunkLibrary,
        source_map: &'a SourceMap,
        diagnostics: &'a mut Vec<Diagnostic>,
    ) -> Self {
        Self {
            names,
            library,
            source_map,
            diagnostics,
            guard: PartialGuard::new(),
            scopes: vec![BTreeSet::new()],
            ops: Vec::new(),
            role: ChainRole::NotConditional,
        }
    }

    /// Compiles a whole chunk list. Every failure is recorded as a diagnostic.
    fn compile(&mut self, chunks: &[Chunk]) -> Vec<Op> {
        if let Err(error) = self.accept(chunks) {
            self.report(error.to_string(), None);
        }
        std::mem::take(&mut self.ops)
    }

    fn report(&mut self, message: String, position: Option<&Position>) {
        let diagnostic = diagnostic(message, position, self.source_map);
        self.diagnostics.push(diagnostic);
    }

    /// Compiles `chunks` in a new scope holding `bindings`.
    fn body(&mut self, chunks: &[Chunk], bindings: BTreeSet<String>) -> Result<Vec<Op>, CompileError> {
        let outer = std::mem::take(&mut self.ops);
        self.scopes.push(bindings);
        let result = self.accept(chunks);
        self.scopes.pop();
        let inner = std::mem::replace(&mut self.ops, outer);
        result.map(|_| inner)
    }

    fn in_scope(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name)) || self.names.members.contains(name)
    }

    fn expression(&mut self, code: &str, position: Option<&Position>) -> Option<CompiledExpr> {
        let parsed = match expr::parse(code) {
            Ok(parsed) => parsed,
            Err(error) => {
                self.report(format!("syntax error: {}", error), position);
                return None;
            }
        };
        let mut valid = true;
        for name in expr::free_identifiers(&parsed) {
            if !self.in_scope(&name) {
                self.report(format!("The name '{}' does not exist in the current context", name), position);
                valid = false;
            }
        }
        valid &= self.check_calls(&parsed, position);
        valid.then(|| CompiledExpr {
            code: code.to_string(),
            expr: parsed,
            position: position.cloned(),
        })
    }

    /// Macro calls must pass exactly the declared number of arguments.
    fn check_calls(&mut self, expr: &Expr, position: Option<&Position>) -> bool {
        match expr {
            Expr::Call(callee, args) => {
                let mut valid = args.iter().fold(true, |ok, arg| self.check_calls(arg, position) && ok);
                if let Expr::Ident(name) = callee.as_ref() {
                    if let Some(&arity) = self.names.macros.get(name) {
                        if arity != args.len() && !self.scopes.iter().any(|s| s.contains(name)) {
                            self.report(
                                format!("macro '{}' takes {} argument(s) but {} were supplied", name, arity, args.len()),
                                position,
                            );
                            valid = false;
                        }
                    }
                }
                self.check_calls(callee, position) && valid
            }
            Expr::List(items) => items.iter().fold(true, |ok, item| self.check_calls(item, position) && ok),
            Expr::Member(target, _) | Expr::Unary(_, target) => self.check_calls(target, position),
            Expr::Index(a, b) | Expr::Binary(_, a, b) => {
                let left = self.check_calls(a, position);
                self.check_calls(b, position) && left
            }
            Expr::Literal(_) | Expr::Ident(_) => true,
        }
    }

    fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn is_macro_call(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Call(callee, _) => {
                matches!(callee.as_ref(), Expr::Ident(name) if self.names.macros.contains_key(name))
            }
            _ => false,
        }
    }
}

impl ChunkVisitor for OpCompiler<'_> {
    fn accept(&mut self, chunks: &[Chunk]) -> VisitResult {
        let roles = chain_roles(chunks);
        let saved = self.role;
        for (chunk, role) in chunks.iter().zip(roles) {
            self.role = role;
            self.visit_chunk(chunk)?;
        }
        self.role = saved;
        Ok(())
    }

    fn visit_send_literal(&mut self, chunk: &SendLiteralChunk) -> VisitResult {
        match self.ops.last_mut() {
            Some(Op::Write(text)) => text.push_str(&chunk.text),
            _ => self.ops.push(Op::Write(chunk.text.clone())),
        }
        Ok(())
    }

    fn visit_send_expression(&mut self, chunk: &SendExpressionChunk) -> VisitResult {
        if let Some(expr) = self.expression(&chunk.code, chunk.position.as_ref()) {
            let encode = chunk.automatic_encoding && !self.is_macro_call(&expr.expr);
            self.ops.push(Op::Emit {
                expr,
                silent: chunk.silent_nulls,
                encode,
            });
        }
        Ok(())
    }

    fn visit_local_variable(&mut self, chunk: &LocalVariableChunk) -> VisitResult {
        if let Some(value) = self.expression(&chunk.value, chunk.position.as_ref()) {
            self.ops.push(Op::Local {
                name: chunk.name.clone(),
                value,
            });
        }
        self.declare(&chunk.name);
        Ok(())
    }

    fn visit_conditional(&mut self, chunk: &ConditionalChunk) -> VisitResult {
        let role = self.role;
        let guard = match &chunk.kind {
            ConditionalKind::If | ConditionalKind::ElseIf => self
                .expression(&chunk.condition, chunk.position.as_ref())
                .map(Guard::Expr),
            ConditionalKind::Unless => self
                .expression(&chunk.condition, chunk.position.as_ref())
                .map(|mut condition| {
                    condition.expr = Expr::Unary(UnaryOp::Not, Box::new(condition.expr));
                    Guard::Expr(condition)
                }),
            ConditionalKind::Else => Some(Guard::Always),
            ConditionalKind::Once { key } => Some(Guard::Once(key.clone())),
        };
        let body = self.body(&chunk.body, BTreeSet::new())?;
        let Some(guard) = guard else {
            return Ok(());
        };
        match role {
            ChainRole::Branch => match self.ops.last_mut() {
                Some(Op::Branches(arms)) => arms.push((guard, body)),
                _ => self.ops.push(Op::Branches(vec![(guard, body)])),
            },
            ChainRole::Dangling => {}
            ChainRole::Head | ChainRole::NotConditional => self.ops.push(Op::Branches(vec![(guard, body)])),
        }
        Ok(())
    }

    fn visit_for_each(&mut self, chunk: &ForEachChunk) -> VisitResult {
        let collection = self.expression(&chunk.collection, chunk.position.as_ref());
        let mut bindings = BTreeSet::from([chunk.variable.clone()]);
        bindings.extend(LOOP_SUFFIXES.iter().map(|s| format!("{}{}", chunk.variable, s)));
        let body = self.body(&chunk.body, bindings)?;
        if let Some(collection) = collection {
            self.ops.push(Op::ForEach {
                variable: chunk.variable.clone(),
                collection,
                body,
            });
        }
        Ok(())
    }

    fn visit_render_partial(&mut self, chunk: &RenderPartialChunk) -> VisitResult {
        if self.guard.is_active(&chunk.target) {
            return Ok(());
        }
        if !self.library.contains(&chunk.target) {
            self.report(
                format!("partial '{}' could not be found", chunk.target),
                chunk.position.as_ref(),
            );
            return Ok(());
        }

        let mut block = Vec::new();
        for argument in &chunk.arguments {
            if let Some(value) = self.expression(&argument.value, chunk.position.as_ref()) {
                block.push(Op::Local {
                    name: argument.name.clone(),
                    value,
                });
            }
        }
        let outer = std::mem::replace(&mut self.ops, block);
        self.scopes
            .push(chunk.arguments.iter().map(|a| a.name.clone()).collect());
        let library = self.library;
        let result = descend_partial(self, chunk, library, |v| &mut v.guard);
        self.scopes.pop();
        let block = std::mem::replace(&mut self.ops, outer);
        result?;
        self.ops.push(Op::Block(block));
        Ok(())
    }

    fn visit_content_set(&mut self, chunk: &ContentSetChunk) -> VisitResult {
        let body = self.body(&chunk.body, BTreeSet::new())?;
        self.ops.push(Op::Capture {
            name: chunk.name.clone(),
            body,
        });
        Ok(())
    }

    fn visit_extension(&mut self, chunk: &ExtensionChunk) -> VisitResult {
        let body = self.body(&chunk.body, BTreeSet::new())?;
        self.ops.push(Op::Block(body));
        Ok(())
    }
}
