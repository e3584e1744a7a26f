use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::dialect::BackendDialect;
use crate::node::Position;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_NORMALIZATION: &str = "VC-ERR-NORMALIZE";
pub const ERR_DECLARATION_CONFLICT: &str = "VC-ERR-DECLARATION";
pub const ERR_BACKEND: &str = "VC-ERR-BACKEND";
pub const ERR_TEMPLATE_SOURCE: &str = "VC-ERR-SOURCE";

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILE ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum CompileError {
    /// Malformed special construct, unmatched else, include failure.
    #[error("{position}: {message}")]
    Normalization { message: String, position: Position },

    /// Two declaration sites of one name disagree.
    #[error("{kind} '{name}' cannot be declared repeatedly with different {detail}")]
    Declaration {
        kind: &'static str,
        name: String,
        detail: String,
        first: Option<Position>,
        second: Option<Position>,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A template could not be loaded by the template source.
    #[error("template '{template}' could not be loaded: {message}")]
    TemplateSource { template: String, message: String },
}

impl CompileError {
    pub fn normalization(message: impl Into<String>, position: &Position) -> Self {
        CompileError::Normalization {
            message: message.into(),
            position: position.clone(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CompileError::Normalization { .. } => ERR_NORMALIZATION,
            CompileError::Declaration { .. } => ERR_DECLARATION_CONFLICT,
            CompileError::Backend(_) => ERR_BACKEND,
            CompileError::TemplateSource { .. } => ERR_TEMPLATE_SOURCE,
        }
    }
}

/// Position inside the generated source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPosition {
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub message: String,
    pub generated: Option<GeneratedPosition>,
    pub template: Option<Position>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.template, &self.generated) {
            (Some(template), _) => write!(f, "{}: {}", template, self.message),
            (None, Some(generated)) => write!(
                f,
                "(generated {}:{}): {}",
                generated.line, generated.column, self.message
            ),
            (None, None) => f.write_str(&self.message),
        }
    }
}

/// Generated source rejected by the backend. Always carries every diagnostic
/// and the complete generated text.
#[derive(Debug, Clone, Error)]
#[error(
    "{dialect} backend rejected the generated view with {} error(s):\n{}",
    .diagnostics.len(),
    render_diagnostics(.diagnostics)
)]
pub struct BackendError {
    pub dialect: BackendDialect,
    pub diagnostics: Vec<Diagnostic>,
    pub generated_source: String,
}

fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDER ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RenderError {
    /// Strict null policy: member access on an empty value.
    #[error("null reference evaluating '{expression}': '{member}' is not available")]
    NullReference {
        expression: String,
        member: String,
        position: Option<Position>,
    },

    #[error("type error evaluating '{expression}': {message}")]
    Type {
        expression: String,
        message: String,
        position: Option<Position>,
    },

    #[error("division by zero evaluating '{expression}'")]
    DivideByZero {
        expression: String,
        position: Option<Position>,
    },

    #[error("macro '{name}' exceeded the maximum call depth of {limit}")]
    RecursionLimit { name: String, limit: usize },
}
