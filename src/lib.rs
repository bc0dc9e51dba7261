//! Vellum - hierarchical text templates addressed by virtual paths.
//!
//! Templates live behind virtual addresses such as `~/blog/post.vt`. A
//! render resolves the address through the inline registry and the content
//! sources, compiles it once, then executes a tree: the `_ViewStart` chain,
//! the body, and the layouts wrapping it.
//!
//! ```
//! use serde_json::json;
//! use vellum::{Engine, EngineConfig, RenderOptions};
//!
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! engine.register_inline("~/Shared/_layout", "BEGIN {body} END").unwrap();
//! engine.register_inline("~/hello", "{@layout _layout}Hello {name}").unwrap();
//!
//! let page = engine
//!     .execute_by_path("~/hello", RenderOptions::new().with_model(json!({"name": "Smith"})))
//!     .unwrap();
//! assert_eq!(page.result(), "BEGIN Hello Smith END");
//! ```

pub mod logger;

pub mod bag;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod tree;
pub mod vpath;

pub use bag::ValueBag;
pub use compiler::{LanguageProfile, ModelRequirement};
pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, RenderOptions};
pub use error::{EngineError, RenderFailure};
pub use tree::{ExecutedTemplate, RenderContext, TemplateTree};
pub use vpath::{PathError, VirtualPath};
