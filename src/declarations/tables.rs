use std::collections::{BTreeMap, BTreeSet};

use crate::chunk::{GlobalVariableChunk, MacroChunk, ViewDataChunk, ViewDataModelChunk};
use crate::error::CompileError;
use crate::node::Position;

/// Duplicate-detection tables shared by the declaration passes of one
/// generation. The first declaration of a name is authoritative.
#[derive(Debug, Clone, Default)]
pub struct DeclarationTables {
    symbols: BTreeMap<String, Symbol>,
    pub globals: Vec<GlobalVariableChunk>,
    pub view_data: Vec<ViewDataChunk>,
    pub model: Option<ViewDataModelChunk>,
    pub macros: Vec<MacroChunk>,
    pub macros_implemented: BTreeSet<String>,
    pub namespaces: Vec<String>,
    pub modules: Vec<String>,
}

#[derive(Debug, Clone)]
struct Symbol {
    kind: &'static str,
    position: Option<Position>,
}

/// Outcome of a declaration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declared {
    New,
    /// Identical to an earlier declaration; nothing to emit.
    Repeated,
}

impl DeclarationTables {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim(&mut self, name: &str, kind: &'static str, position: &Option<Position>) -> Result<Declared, CompileError> {
        match self.symbols.get(name) {
            Some(existing) if existing.kind != kind => Err(CompileError::Declaration {
                kind,
                name: name.to_string(),
                detail: format!("kinds (already declared as {})", existing.kind),
                first: existing.position.clone(),
                second: position.clone(),
            }),
            Some(_) => Ok(Declared::Repeated),
            None => {
                self.symbols.insert(
                    name.to_string(),
                    Symbol {
                        kind,
                        position: position.clone(),
                    },
                );
                Ok(Declared::New)
            }
        }
    }

    pub fn declare_global(&mut self, chunk: &GlobalVariableChunk) -> Result<Declared, CompileError> {
        if self.claim(&chunk.name, "global", &chunk.position)? == Declared::New {
            self.globals.push(chunk.clone());
            return Ok(Declared::New);
        }
        let Some(first) = self.globals.iter().find(|g| g.name == chunk.name) else {
            return Ok(Declared::Repeated);
        };
        if first.var_type != chunk.var_type || first.value != chunk.value {
            return Err(conflict("global", &chunk.name, "types or values", &first.position, &chunk.position));
        }
        Ok(Declared::Repeated)
    }

    pub fn declare_view_data(&mut self, chunk: &ViewDataChunk) -> Result<Declared, CompileError> {
        if self.claim(&chunk.name, "view data", &chunk.position)? == Declared::New {
            self.view_data.push(chunk.clone());
            return Ok(Declared::New);
        }
        let Some(first) = self.view_data.iter().find(|v| v.name == chunk.name) else {
            return Ok(Declared::Repeated);
        };
        if first.var_type != chunk.var_type || first.default != chunk.default || first.key != chunk.key {
            return Err(conflict("view data", &chunk.name, "types or defaults", &first.position, &chunk.position));
        }
        Ok(Declared::Repeated)
    }

    pub fn declare_model(&mut self, chunk: &ViewDataModelChunk) -> Result<Declared, CompileError> {
        match &self.model {
            None => {
                if let Some(alias) = &chunk.alias {
                    self.claim(alias, "model", &chunk.position)?;
                }
                self.model = Some(chunk.clone());
                Ok(Declared::New)
            }
            Some(first) if first.model_type == chunk.model_type && first.alias == chunk.alias => {
                Ok(Declared::Repeated)
            }
            Some(first) => Err(conflict("model", &first.model_type, "types", &first.position, &chunk.position)),
        }
    }

    pub fn declare_macro(&mut self, chunk: &MacroChunk) -> Result<Declared, CompileError> {
        if self.claim(&chunk.name, "macro", &chunk.position)? == Declared::New {
            self.macros.push(chunk.clone());
            return Ok(Declared::New);
        }
        let Some(first) = self.macros.iter().find(|m| m.name == chunk.name) else {
            return Ok(Declared::Repeated);
        };
        if first.parameters != chunk.parameters {
            return Err(conflict("macro", &chunk.name, "parameters", &first.position, &chunk.position));
        }
        Ok(Declared::Repeated)
    }

    /// Returns false when the namespace was already imported.
    pub fn add_namespace(&mut self, namespace: &str) -> bool {
        if self.namespaces.iter().any(|n| n == namespace) {
            return false;
        }
        self.namespaces.push(namespace.to_string());
        true
    }

    pub fn add_module(&mut self, module: &str) -> bool {
        if self.modules.iter().any(|m| m == module) {
            return false;
        }
        self.modules.push(module.to_string());
        true
    }

    pub fn macro_named(&self, name: &str) -> Option<&MacroChunk> {
        self.macros.iter().find(|m| m.name == name)
    }
}

fn conflict(
    kind: &'static str,
    name: &str,
    detail: &str,
    first: &Option<Position>,
    second: &Option<Position>,
) -> CompileError {
    CompileError::Declaration {
        kind,
        name: name.to_string(),
        detail: detail.to_string(),
        first: first.clone(),
        second: second.clone(),
    }
}
