//! Chunk intermediate representation.
//!
//! A chunk list is executed in order. Nested bodies form a tree inside one
//! template; partial inclusion refers to other templates by identifier and is
//! resolved through a [`ChunkLibrary`], so cross-template cycles never become
//! cycles in memory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::node::{ExtensionHandle, Position};

pub type ChunkList = Vec<Chunk>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Chunk {
    SendLiteral(SendLiteralChunk),
    SendExpression(SendExpressionChunk),
    LocalVariable(LocalVariableChunk),
    GlobalVariable(GlobalVariableChunk),
    ViewData(ViewDataChunk),
    Conditional(ConditionalChunk),
    ForEach(ForEachChunk),
    PageBaseType(PageBaseTypeChunk),
    ViewDataModel(ViewDataModelChunk),
    Macro(MacroChunk),
    UseNamespace(UseNamespaceChunk),
    UseModule(UseModuleChunk),
    RenderPartial(RenderPartialChunk),
    ContentSet(ContentSetChunk),
    #[serde(skip)]
    Extension(ExtensionChunk),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendLiteralChunk {
    pub text: String,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendExpressionChunk {
    pub code: String,
    #[serde(default)]
    pub silent_nulls: bool,
    #[serde(default)]
    pub automatic_encoding: bool,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalVariableChunk {
    pub name: String,
    #[serde(default)]
    pub var_type: Option<String>,
    pub value: String,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalVariableChunk {
    pub name: String,
    #[serde(default)]
    pub var_type: Option<String>,
    pub value: String,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDataChunk {
    pub name: String,
    /// View data key; usually equal to `name`.
    pub key: String,
    #[serde(default)]
    pub var_type: Option<String>,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ConditionalKind {
    If,
    /// Runs the body when the condition is false.
    Unless,
    ElseIf,
    Else,
    /// Runs the body the first time `key` is seen during one render.
    Once { key: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalChunk {
    pub kind: ConditionalKind,
    /// Empty for `Else` and `Once`.
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub body: ChunkList,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForEachChunk {
    pub variable: String,
    pub collection: String,
    #[serde(default)]
    pub body: ChunkList,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBaseTypeChunk {
    /// Type text, optionally with generic arguments (`Base<A, B>`).
    pub base_type: String,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewDataModelChunk {
    pub model_type: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroParameter {
    pub name: String,
    pub param_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroChunk {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<MacroParameter>,
    #[serde(default)]
    pub body: ChunkList,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseNamespaceChunk {
    pub namespace: String,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseModuleChunk {
    pub module: String,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialArgument {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderPartialChunk {
    /// Template identifier of the partial; its chunks live in the library.
    pub target: String,
    #[serde(default)]
    pub arguments: Vec<PartialArgument>,
    #[serde(default)]
    pub position: Option<Position>,
}

/// Output of `body` appended to the named content slot instead of the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSetChunk {
    pub name: String,
    #[serde(default)]
    pub body: ChunkList,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionChunk {
    pub extension: ExtensionHandle,
    pub body: ChunkList,
    pub position: Option<Position>,
}

/// Section of the generated source an extension writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputLocation {
    UsingNamespace,
    ClassMembers,
    RenderMethod,
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTRUCTORS
// ═══════════════════════════════════════════════════════════════════════════════

impl Chunk {
    pub fn literal(text: impl Into<String>) -> Chunk {
        Chunk::SendLiteral(SendLiteralChunk {
            text: text.into(),
            position: None,
        })
    }

    pub fn expression(code: impl Into<String>) -> Chunk {
        Chunk::SendExpression(SendExpressionChunk {
            code: code.into(),
            silent_nulls: false,
            automatic_encoding: false,
            position: None,
        })
    }

    pub fn local(name: impl Into<String>, value: impl Into<String>) -> Chunk {
        Chunk::LocalVariable(LocalVariableChunk {
            name: name.into(),
            var_type: None,
            value: value.into(),
            position: None,
        })
    }

    pub fn global(name: impl Into<String>, var_type: Option<&str>, value: impl Into<String>) -> Chunk {
        Chunk::GlobalVariable(GlobalVariableChunk {
            name: name.into(),
            var_type: var_type.map(str::to_string),
            value: value.into(),
            position: None,
        })
    }

    pub fn conditional(kind: ConditionalKind, condition: impl Into<String>, body: ChunkList) -> Chunk {
        Self::conditional_at(kind, condition, body, None)
    }

    pub fn conditional_at(
        kind: ConditionalKind,
        condition: impl Into<String>,
        body: ChunkList,
        position: Option<Position>,
    ) -> Chunk {
        Chunk::Conditional(ConditionalChunk {
            kind,
            condition: condition.into(),
            body,
            position,
        })
    }

    pub fn for_each(variable: impl Into<String>, collection: impl Into<String>, body: ChunkList) -> Chunk {
        Chunk::ForEach(ForEachChunk {
            variable: variable.into(),
            collection: collection.into(),
            body,
            position: None,
        })
    }

    pub fn render_partial(target: impl Into<String>) -> Chunk {
        Chunk::RenderPartial(RenderPartialChunk {
            target: target.into(),
            arguments: Vec::new(),
            position: None,
        })
    }

    pub fn position(&self) -> Option<&Position> {
        match self {
            Chunk::SendLiteral(c) => c.position.as_ref(),
            Chunk::SendExpression(c) => c.position.as_ref(),
            Chunk::LocalVariable(c) => c.position.as_ref(),
            Chunk::GlobalVariable(c) => c.position.as_ref(),
            Chunk::ViewData(c) => c.position.as_ref(),
            Chunk::Conditional(c) => c.position.as_ref(),
            Chunk::ForEach(c) => c.position.as_ref(),
            Chunk::PageBaseType(c) => c.position.as_ref(),
            Chunk::ViewDataModel(c) => c.position.as_ref(),
            Chunk::Macro(c) => c.position.as_ref(),
            Chunk::UseNamespace(c) => c.position.as_ref(),
            Chunk::UseModule(c) => c.position.as_ref(),
            Chunk::RenderPartial(c) => c.position.as_ref(),
            Chunk::ContentSet(c) => c.position.as_ref(),
            Chunk::Extension(c) => c.position.as_ref(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONDITIONAL CHAINS
// ═══════════════════════════════════════════════════════════════════════════════

/// Position of a chunk inside a conditional chain of one chunk list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainRole {
    NotConditional,
    /// `If` or `Once`: starts a chain.
    Head,
    /// `ElseIf` or `Else` continuing the chain before it.
    Branch,
    /// `ElseIf` or `Else` with no open chain. Never executes.
    Dangling,
}

/// Assigns a [`ChainRole`] to every chunk. An `Else` closes its chain.
pub fn chain_roles(chunks: &[Chunk]) -> Vec<ChainRole> {
    let mut open = false;
    chunks
        .iter()
        .map(|chunk| {
            let Chunk::Conditional(conditional) = chunk else {
                open = false;
                return ChainRole::NotConditional;
            };
            match conditional.kind {
                ConditionalKind::If | ConditionalKind::Unless | ConditionalKind::Once { .. } => {
                    open = true;
                    ChainRole::Head
                }
                ConditionalKind::ElseIf if open => ChainRole::Branch,
                ConditionalKind::Else if open => {
                    open = false;
                    ChainRole::Branch
                }
                ConditionalKind::ElseIf | ConditionalKind::Else => {
                    open = false;
                    ChainRole::Dangling
                }
            }
        })
        .collect()
}

/// True when chunk `index` is followed by a branch of its own chain.
pub fn chain_continues(chunks: &[Chunk], roles: &[ChainRole], index: usize) -> bool {
    let current_open = match (&chunks[index], roles[index]) {
        (Chunk::Conditional(c), ChainRole::Head | ChainRole::Branch) => c.kind != ConditionalKind::Else,
        _ => false,
    };
    current_open && roles.get(index + 1) == Some(&ChainRole::Branch)
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIBRARY
// ═══════════════════════════════════════════════════════════════════════════════

/// Lowered chunk lists keyed by template identifier. Partial inclusion is
/// resolved through this table.
#[derive(Debug, Clone, Default)]
pub struct ChunkLibrary {
    templates: BTreeMap<String, Arc<ChunkList>>,
}

impl ChunkLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, template: impl Into<String>, chunks: impl Into<Arc<ChunkList>>) {
        self.templates.insert(template.into(), chunks.into());
    }

    pub fn get(&self, template: &str) -> Option<&Arc<ChunkList>> {
        self.templates.get(template)
    }

    pub fn contains(&self, template: &str) -> bool {
        self.templates.contains_key(template)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn templates(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_roles() {
        let chunks = vec![
            Chunk::conditional(ConditionalKind::If, "a", vec![]),
            Chunk::conditional(ConditionalKind::ElseIf, "b", vec![]),
            Chunk::conditional(ConditionalKind::Else, "", vec![]),
            Chunk::conditional(ConditionalKind::Else, "", vec![]),
            Chunk::literal("x"),
            Chunk::conditional(ConditionalKind::ElseIf, "c", vec![]),
        ];
        let roles = chain_roles(&chunks);
        assert_eq!(
            roles,
            vec![
                ChainRole::Head,
                ChainRole::Branch,
                ChainRole::Branch,
                ChainRole::Dangling,
                ChainRole::NotConditional,
                ChainRole::Dangling,
            ]
        );
        assert!(chain_continues(&chunks, &roles, 0));
        assert!(chain_continues(&chunks, &roles, 1));
        assert!(!chain_continues(&chunks, &roles, 2), "an else closes its chain");
        assert!(!chain_continues(&chunks, &roles, 3));
    }

    #[test]
    fn test_chunk_json_uses_kebab_case_tags() {
        let json = serde_json::to_value(Chunk::for_each("item", "items", vec![Chunk::literal("x")])).unwrap();
        assert_eq!(json["type"], "for-each");
        assert_eq!(json["body"][0]["type"], "send-literal");
    }
}
