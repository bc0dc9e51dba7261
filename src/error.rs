//! Engine error types.
//!
//! ```text
//! RenderFailure            (caller-facing: failing address + partial tree)
//!   └── EngineError
//!         ├── InvalidPath           path algebra
//!         ├── TemplateNotFound      lookup
//!         ├── TemplateCompilation   compiler (replayed from the negative cache)
//!         ├── TemplateTreeRecursion layout / render-page cycles
//!         ├── SectionNotFound       layouts asking for undeclared sections
//!         ├── Config                locked or invalid configuration
//!         ├── Render                failures raised while a body runs
//!         └── Io
//! ```

use crate::compiler::CompileError;
use crate::config::ConfigError;
use crate::tree::TemplateTree;
use crate::vpath::PathError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid path")]
    InvalidPath(#[from] PathError),

    #[error("template `{address}` not found (probed: {})", probed.join(", "))]
    TemplateNotFound { address: String, probed: Vec<String> },

    #[error("failed to compile `{address}`")]
    TemplateCompilation {
        address: String,
        #[source]
        error: CompileError,
    },

    #[error("template tree recursion: {}", chain.join(" -> "))]
    TemplateTreeRecursion { chain: Vec<String> },

    #[error("section `{name}` is not defined by `{address}`")]
    SectionNotFound { name: String, address: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("error rendering `{address}`: {message}")]
    Render { address: String, message: String },

    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),
}

impl EngineError {
    pub(crate) fn not_found(address: impl Into<String>, probed: Vec<String>) -> Self {
        Self::TemplateNotFound {
            address: address.into(),
            probed,
        }
    }
}

/// A failed `execute*` call.
///
/// Carries the address of the template that failed and, when execution got
/// as far as building nodes, the partial tree for diagnostics.
#[derive(Debug, Error)]
#[error("failed to render `{address}`")]
pub struct RenderFailure {
    pub address: String,
    #[source]
    pub error: EngineError,
    pub tree: Option<Box<TemplateTree>>,
}

impl RenderFailure {
    pub(crate) fn new(address: impl Into<String>, error: EngineError) -> Self {
        Self {
            address: address.into(),
            error,
            tree: None,
        }
    }

    pub(crate) fn with_tree(mut self, tree: TemplateTree) -> Self {
        self.tree = Some(Box::new(tree));
        self
    }

    pub fn error(&self) -> &EngineError {
        &self.error
    }

    pub fn into_error(self) -> EngineError {
        self.error
    }

    pub fn tree(&self) -> Option<&TemplateTree> {
        self.tree.as_deref()
    }
}
