//! Lowers a normalized node tree into chunks.
//!
//! The builder walks the tree exactly once. Adjacent literal output is merged,
//! so markup around an expression becomes at most two literal chunks.

use lazy_static::lazy_static;
use regex::Regex;

use crate::chunk::{
    Chunk, ChunkList, ConditionalChunk, ConditionalKind, ContentSetChunk, ExtensionChunk, ForEachChunk,
    GlobalVariableChunk, LocalVariableChunk, MacroChunk, MacroParameter, PageBaseTypeChunk, PartialArgument,
    RenderPartialChunk, SendExpressionChunk, SendLiteralChunk, UseModuleChunk, UseNamespaceChunk, ViewDataChunk, ViewDataModelChunk,
};
use crate::error::CompileError;
use crate::node::{AttributeNode, ElementNode, ExtensionNode, Node, Position, SpecialNode};

lazy_static! {
    /// `item in items`, `var item in items`, `Order item in items`.
    static ref EACH_RE: Regex = Regex::new(r"^\s*(?:[\w.<>,\[\]]+\s+)?(\w+)\s+in\s+(.+?)\s*$").unwrap();
}

pub struct ChunkBuilder {
    automatic_encoding: bool,
    chunks: ChunkList,
}

impl ChunkBuilder {
    pub fn new(automatic_encoding: bool) -> Self {
        Self {
            automatic_encoding,
            chunks: Vec::new(),
        }
    }

    /// Lowers `nodes` into a fresh chunk list.
    pub fn build(nodes: &[Node], automatic_encoding: bool) -> Result<ChunkList, CompileError> {
        let mut builder = Self::new(automatic_encoding);
        builder.lower_all(nodes)?;
        tracing::trace!(chunks = builder.chunks.len(), "chunk list built");
        Ok(builder.chunks)
    }

    fn nested(&self, nodes: &[Node]) -> Result<ChunkList, CompileError> {
        Self::build(nodes, self.automatic_encoding)
    }

    fn lower_all(&mut self, nodes: &[Node]) -> Result<(), CompileError> {
        for node in nodes {
            self.lower(node)?;
        }
        Ok(())
    }

    fn lower(&mut self, node: &Node) -> Result<(), CompileError> {
        match node {
            Node::Text(text) => {
                self.push_literal(&text.value, &text.position);
                Ok(())
            }
            Node::Expression(expression) => {
                self.chunks.push(Chunk::SendExpression(SendExpressionChunk {
                    code: expression.code.clone(),
                    silent_nulls: expression.silent_nulls,
                    automatic_encoding: self.automatic_encoding && !expression.raw,
                    position: Some(expression.position.clone()),
                }));
                Ok(())
            }
            Node::Element(element) => self.lower_element(element),
            Node::Special(special) => self.lower_special(special),
            Node::Extension(extension) => self.lower_extension(extension),
        }
    }

    fn push_literal(&mut self, text: &str, position: &Position) {
        if text.is_empty() {
            return;
        }
        if let Some(Chunk::SendLiteral(last)) = self.chunks.last_mut() {
            last.text.push_str(text);
            return;
        }
        self.chunks.push(Chunk::SendLiteral(SendLiteralChunk {
            text: text.to_string(),
            position: Some(position.clone()),
        }));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MARKUP
    // ═══════════════════════════════════════════════════════════════════════════

    fn lower_element(&mut self, element: &ElementNode) -> Result<(), CompileError> {
        let position = &element.position;
        self.push_literal(&format!("<{}", element.name), position);
        for attribute in &element.attributes {
            self.lower_attribute(attribute)?;
        }
        if element.is_empty && element.children.is_empty() {
            self.push_literal("/>", position);
            return Ok(());
        }
        self.push_literal(">", position);
        self.lower_all(&element.children)?;
        self.push_literal(&format!("</{}>", element.name), position);
        Ok(())
    }

    fn lower_attribute(&mut self, attribute: &AttributeNode) -> Result<(), CompileError> {
        let quote = attribute.quote.to_string();
        self.push_literal(&format!(" {}={}", attribute.name, quote), &attribute.position);
        self.lower_all(&attribute.value)?;
        self.push_literal(&quote, &attribute.position);
        Ok(())
    }

    fn lower_extension(&mut self, extension: &ExtensionNode) -> Result<(), CompileError> {
        let body = self.nested(&extension.body)?;
        self.chunks.push(Chunk::Extension(ExtensionChunk {
            body: extension.extension.lower(body),
            extension: extension.extension.clone(),
            position: Some(extension.element.position.clone()),
        }));
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DIRECTIVES
    // ═══════════════════════════════════════════════════════════════════════════

    fn lower_special(&mut self, special: &SpecialNode) -> Result<(), CompileError> {
        let element = &special.element;
        let position = Some(element.position.clone());
        match element.name.as_str() {
            "var" | "def" => {
                let var_type = attribute_text(element, "type");
                let locals: Vec<Chunk> = element
                    .attributes
                    .iter()
                    .filter(|a| a.name != "type")
                    .map(|a| {
                        Chunk::LocalVariable(LocalVariableChunk {
                            name: a.name.clone(),
                            var_type: var_type.clone(),
                            value: a.code(),
                            position: Some(a.position.clone()),
                        })
                    })
                    .collect();
                if special.body.iter().all(Node::is_blank_text) {
                    self.chunks.extend(locals);
                } else {
                    // Locals with content are scoped to that content.
                    let mut body = locals;
                    body.extend(self.nested(&special.body)?);
                    self.chunks.push(Chunk::Conditional(ConditionalChunk {
                        kind: ConditionalKind::If,
                        condition: "true".to_string(),
                        body,
                        position,
                    }));
                }
            }
            "global" => {
                let var_type = attribute_text(element, "type");
                for attribute in element.attributes.iter().filter(|a| a.name != "type") {
                    self.chunks.push(Chunk::GlobalVariable(GlobalVariableChunk {
                        name: attribute.name.clone(),
                        var_type: var_type.clone(),
                        value: attribute.code(),
                        position: Some(attribute.position.clone()),
                    }));
                }
            }
            "viewdata" => self.lower_view_data(element),
            "if" | "test" => self.lower_conditional(special, ConditionalKind::If)?,
            "unless" => self.lower_conditional(special, ConditionalKind::Unless)?,
            "elseif" => self.lower_conditional(special, ConditionalKind::ElseIf)?,
            "else" => {
                let body = self.nested(&special.body)?;
                self.chunks.push(Chunk::conditional_at(ConditionalKind::Else, "", body, position));
            }
            "once" => {
                let key = required(element, "key")?;
                let body = self.nested(&special.body)?;
                self.chunks
                    .push(Chunk::conditional_at(ConditionalKind::Once { key }, "", body, position));
            }
            "for" => {
                let each = required_code(element, "each")?;
                let Some(captures) = EACH_RE.captures(&each) else {
                    return Err(CompileError::normalization(
                        format!("'each' must read 'name in collection', found '{}'", each),
                        &element.position,
                    ));
                };
                self.chunks.push(Chunk::ForEach(ForEachChunk {
                    variable: captures[1].to_string(),
                    collection: captures[2].to_string(),
                    body: self.nested(&special.body)?,
                    position,
                }));
            }
            "use" => self.lower_use(special)?,
            "content" => {
                let name = required(element, "name")?;
                self.chunks.push(Chunk::ContentSet(ContentSetChunk {
                    name,
                    body: self.nested(&special.body)?,
                    position,
                }));
            }
            "macro" => {
                let name = required(element, "name")?;
                let parameters = element
                    .attributes
                    .iter()
                    .filter(|a| a.name != "name")
                    .map(|a| MacroParameter {
                        name: a.name.clone(),
                        param_type: a.text_value(),
                    })
                    .collect();
                self.chunks.push(Chunk::Macro(MacroChunk {
                    name,
                    parameters,
                    body: self.nested(&special.body)?,
                    position,
                }));
            }
            "render" => {
                let target = required(element, "partial")?;
                let arguments = element
                    .attributes
                    .iter()
                    .filter(|a| a.name != "partial")
                    .map(|a| PartialArgument {
                        name: a.name.clone(),
                        value: a.code(),
                    })
                    .collect();
                self.chunks.push(Chunk::RenderPartial(RenderPartialChunk {
                    target,
                    arguments,
                    position,
                }));
            }
            "pagebasetype" | "basetype" => {
                self.chunks.push(Chunk::PageBaseType(PageBaseTypeChunk {
                    base_type: required(element, "type")?,
                    position,
                }));
            }
            "cache" => {
                // No cache service is attached; the content always renders.
                self.lower_all(&special.body)?;
            }
            other => {
                return Err(CompileError::normalization(
                    format!("unsupported directive '{}'", other),
                    &element.position,
                ));
            }
        }
        Ok(())
    }

    fn lower_conditional(&mut self, special: &SpecialNode, kind: ConditionalKind) -> Result<(), CompileError> {
        let element = &special.element;
        let condition = element
            .attribute("condition")
            .or_else(|| element.attribute("if"))
            .map(AttributeNode::code)
            .ok_or_else(|| {
                CompileError::normalization(
                    format!("'{}' requires a 'condition' attribute", element.name),
                    &element.position,
                )
            })?;
        let body = self.nested(&special.body)?;
        self.chunks.push(Chunk::conditional_at(
            kind,
            condition,
            body,
            Some(element.position.clone()),
        ));
        Ok(())
    }

    fn lower_view_data(&mut self, element: &ElementNode) {
        let default = element.attribute("default").map(AttributeNode::code);
        for attribute in &element.attributes {
            let position = Some(attribute.position.clone());
            match attribute.name.as_str() {
                "default" | "alias" => {}
                "model" => self.chunks.push(Chunk::ViewDataModel(ViewDataModelChunk {
                    model_type: attribute.text_value(),
                    alias: attribute_text(element, "alias"),
                    position,
                })),
                name => self.chunks.push(Chunk::ViewData(ViewDataChunk {
                    name: name.to_string(),
                    key: name.to_string(),
                    var_type: Some(attribute.text_value()).filter(|t| !t.is_empty()),
                    default: default.clone(),
                    position,
                })),
            }
        }
    }

    fn lower_use(&mut self, special: &SpecialNode) -> Result<(), CompileError> {
        let element = &special.element;
        let position = Some(element.position.clone());
        if let Some(namespace) = attribute_text(element, "namespace") {
            self.chunks.push(Chunk::UseNamespace(UseNamespaceChunk { namespace, position }));
        } else if let Some(module) = attribute_text(element, "assembly").or_else(|| attribute_text(element, "module")) {
            self.chunks.push(Chunk::UseModule(UseModuleChunk { module, position }));
        } else if let Some(slot) = attribute_text(element, "content") {
            let output = Chunk::SendExpression(SendExpressionChunk {
                code: format!("Content['{}']", slot.replace('\'', "''")),
                silent_nulls: true,
                automatic_encoding: false,
                position: position.clone(),
            });
            if special.body.iter().all(Node::is_blank_text) {
                self.chunks.push(output);
            } else {
                let fallback = self.nested(&special.body)?;
                let condition = format!("Content['{}'] != null", slot.replace('\'', "''"));
                self.chunks
                    .push(Chunk::conditional_at(ConditionalKind::If, condition, vec![output], position.clone()));
                self.chunks
                    .push(Chunk::conditional_at(ConditionalKind::Else, "", fallback, position));
            }
        } else if let Some(file) = attribute_text(element, "file") {
            self.chunks.push(Chunk::RenderPartial(RenderPartialChunk {
                target: file,
                arguments: Vec::new(),
                position,
            }));
        } else {
            return Err(CompileError::normalization(
                "'use' requires one of 'namespace', 'assembly', 'content' or 'file'",
                &element.position,
            ));
        }
        Ok(())
    }
}

fn attribute_text(element: &ElementNode, name: &str) -> Option<String> {
    element.attribute(name).map(AttributeNode::text_value)
}

fn required(element: &ElementNode, name: &str) -> Result<String, CompileError> {
    attribute_text(element, name).ok_or_else(|| missing(element, name))
}

fn required_code(element: &ElementNode, name: &str) -> Result<String, CompileError> {
    element
        .attribute(name)
        .map(AttributeNode::code)
        .ok_or_else(|| missing(element, name))
}

fn missing(element: &ElementNode, name: &str) -> CompileError {
    CompileError::normalization(
        format!("'{}' requires a '{}' attribute", element.name, name),
        &element.position,
    )
}
