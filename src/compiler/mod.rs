//! Template compiler contract and the built-in languages.
//!
//! The engine never looks inside a template. It hands raw text to a
//! [`TemplateCompiler`] and gets back a [`TemplateFactory`] that produces
//! executable [`Template`] instances.
//!
//! ```text
//! raw text ──compile()──► TemplateFactory ──instantiate()──► Template
//!                               │                               │
//!                     model_requirement()             render(&mut RenderContext)
//!                     generated_source()
//! ```
//!
//! [`BuiltinCompiler`] dispatches on [`LanguageProfile`]: the brace language
//! (see [`brace`]) or literal text.

pub mod brace;

use crate::error::EngineError;
use crate::tree::RenderContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, sync::Arc};
use thiserror::Error;

/// Language a template is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageProfile {
    /// `{expr}` substitutions and `{@directive}` instructions.
    #[default]
    Brace,
    /// Raw text, emitted as is.
    Literal,
}

/// JSON kind a template expects its model to have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModelRequirement {
    #[default]
    Dynamic,
    Object,
    Array,
    String,
    Number,
    Bool,
}

impl ModelRequirement {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "dynamic" => Self::Dynamic,
            "object" => Self::Object,
            "array" => Self::Array,
            "string" => Self::String,
            "number" => Self::Number,
            "bool" => Self::Bool,
            _ => return None,
        })
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dynamic => "dynamic",
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "bool",
        }
    }

    pub fn accepts(self, model: &Value) -> bool {
        match self {
            Self::Dynamic => true,
            Self::Object => model.is_object(),
            Self::Array => model.is_array(),
            Self::String => model.is_string(),
            Self::Number => model.is_number(),
            Self::Bool => model.is_boolean(),
        }
    }
}

impl fmt::Display for ModelRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The compiler rejected a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (line {line}, column {column})")]
pub struct CompileError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    /// The raw text that failed to compile.
    pub text: Arc<str>,
}

impl CompileError {
    /// The source line the error points at.
    pub fn source_line(&self) -> Option<&str> {
        self.text.lines().nth(self.line.checked_sub(1)?)
    }
}

/// An executable template instance.
pub trait Template {
    fn render(&self, ctx: &mut RenderContext<'_>) -> Result<(), EngineError>;
}

/// Produces template instances. Shared by every render of one descriptor.
pub trait TemplateFactory: Send + Sync {
    fn instantiate(&self) -> Box<dyn Template>;

    fn model_requirement(&self) -> ModelRequirement;

    /// Human-readable rendition of what was compiled.
    fn generated_source(&self) -> Option<String> {
        None
    }
}

/// Turns raw text into a [`TemplateFactory`].
///
/// `hint` is the model requirement assumed when the template declares none.
pub trait TemplateCompiler: Send + Sync {
    fn compile(
        &self,
        text: &str,
        hint: ModelRequirement,
        profile: LanguageProfile,
    ) -> Result<Arc<dyn TemplateFactory>, CompileError>;
}

// ============================================================================
// Built-in compiler
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCompiler;

impl TemplateCompiler for BuiltinCompiler {
    fn compile(
        &self,
        text: &str,
        hint: ModelRequirement,
        profile: LanguageProfile,
    ) -> Result<Arc<dyn TemplateFactory>, CompileError> {
        match profile {
            LanguageProfile::Brace => Ok(Arc::new(brace::compile(text, hint)?)),
            LanguageProfile::Literal => Ok(Arc::new(LiteralFactory {
                text: Arc::from(text),
                requirement: hint,
            })),
        }
    }
}

struct LiteralFactory {
    text: Arc<str>,
    requirement: ModelRequirement,
}

struct LiteralTemplate(Arc<str>);

impl TemplateFactory for LiteralFactory {
    fn instantiate(&self) -> Box<dyn Template> {
        Box::new(LiteralTemplate(Arc::clone(&self.text)))
    }

    fn model_requirement(&self) -> ModelRequirement {
        self.requirement
    }

    fn generated_source(&self) -> Option<String> {
        Some(format!("literal ({} bytes)\n", self.text.len()))
    }
}

impl Template for LiteralTemplate {
    fn render(&self, ctx: &mut RenderContext<'_>) -> Result<(), EngineError> {
        ctx.write(&self.0);
        Ok(())
    }
}
