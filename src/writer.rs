//! Source text accumulation with indentation and template position mapping.

use serde::{Deserialize, Serialize};

use crate::error::GeneratedPosition;
use crate::node::Position;

/// One record of the source map: the generated text at `generated` came from
/// the template at `template`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMapping {
    pub generated: GeneratedPosition,
    pub template: Position,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMap {
    mappings: Vec<SourceMapping>,
}

impl SourceMap {
    pub fn mappings(&self) -> &[SourceMapping] {
        &self.mappings
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Template position of the last statement starting at or before `offset`.
    pub fn template_for(&self, offset: usize) -> Option<&Position> {
        self.mappings
            .iter()
            .take_while(|m| m.generated.offset <= offset)
            .last()
            .map(|m| &m.template)
    }

    /// First generated position emitted for `template`.
    pub fn generated_for(&self, template: &Position) -> Option<GeneratedPosition> {
        self.mappings
            .iter()
            .find(|m| &m.template == template)
            .map(|m| m.generated)
    }
}

pub struct SourceWriter {
    buffer: String,
    indentation: usize,
    start_of_line: bool,
    line: u32,
    /// Align statements with their template column and record mappings.
    pub adjust_debug_symbols: bool,
    map: SourceMap,
}

impl SourceWriter {
    pub fn new(adjust_debug_symbols: bool) -> Self {
        Self {
            buffer: String::new(),
            indentation: 0,
            start_of_line: true,
            line: 1,
            adjust_debug_symbols,
            map: SourceMap::default(),
        }
    }

    pub fn write(&mut self, text: &str) -> &mut Self {
        if text.is_empty() {
            return self;
        }
        if self.start_of_line {
            for _ in 0..self.indentation {
                self.buffer.push(' ');
            }
            self.start_of_line = false;
        }
        self.line += text.matches('\n').count() as u32;
        self.buffer.push_str(text);
        self
    }

    pub fn write_line(&mut self, text: &str) -> &mut Self {
        self.write(text);
        self.buffer.push('\n');
        self.line += 1;
        self.start_of_line = true;
        self
    }

    pub fn blank_line(&mut self) -> &mut Self {
        self.write_line("")
    }

    pub fn add_indent(&mut self) -> &mut Self {
        self.indentation += 4;
        self
    }

    pub fn remove_indent(&mut self) -> &mut Self {
        self.indentation = self.indentation.saturating_sub(4);
        self
    }

    /// Writes `count` raw spaces, ignoring the current indentation.
    pub fn indent(&mut self, count: usize) -> &mut Self {
        for _ in 0..count {
            self.buffer.push(' ');
        }
        self.start_of_line = false;
        self
    }

    /// Starts a statement that came from `position`. With debug symbols the
    /// statement is aligned to the template column and a mapping is recorded.
    pub fn code_indent(&mut self, position: Option<&Position>) -> &mut Self {
        if !self.adjust_debug_symbols {
            return self;
        }
        let Some(position) = position else {
            return self;
        };
        if !self.start_of_line {
            self.write_line("");
        }
        let column = position.column.saturating_sub(1) as usize;
        self.indent(column);
        let generated = self.position();
        self.map.mappings.push(SourceMapping {
            generated,
            template: position.clone(),
        });
        self
    }

    pub fn position(&self) -> GeneratedPosition {
        let column = match self.buffer.rfind('\n') {
            Some(index) => self.buffer[index + 1..].chars().count(),
            None => self.buffer.chars().count(),
        };
        GeneratedPosition {
            offset: self.buffer.len(),
            line: self.line,
            column: column as u32 + 1,
        }
    }

    /// Raw access for extensions that write their own text.
    pub fn buffer_mut(&mut self) -> &mut String {
        self.start_of_line = false;
        &mut self.buffer
    }

    /// Re-counts lines after raw buffer writes.
    pub fn resync(&mut self) {
        self.line = self.buffer.matches('\n').count() as u32 + 1;
        self.start_of_line = self.buffer.is_empty() || self.buffer.ends_with('\n');
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn finish(self) -> (String, SourceMap) {
        (self.buffer, self.map)
    }
}
