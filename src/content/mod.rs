//! Content sources and template lookup.
//!
//! A [`ContentSource`] maps a normalized virtual address to raw template
//! text. [`ContentLookup`] composes the inline registry with the configured
//! sources as a priority list:
//!
//! ```text
//!   address candidates          sources (first hit wins)
//!   ───────────────────         ──────────────────────────────
//!   /views/home           ──►   InlineRegistry   (always first)
//!   /views/home.vt        ──►   DirectorySource  (./views on disk)
//!                         ──►   EmbeddedSource   (compiled-in table)
//! ```
//!
//! Sources may announce changes through [`ContentSource::subscribe`]; the
//! template cache listens and drops stale entries.

mod directory;
mod embedded;
mod inline;
mod lookup;

pub use directory::DirectorySource;
pub use embedded::EmbeddedSource;
pub use inline::InlineRegistry;
pub use lookup::ContentLookup;

use crate::vpath::VirtualPath;
use std::{fmt, sync::Arc};

/// Notification that the text behind `address` changed or disappeared.
#[derive(Debug, Clone)]
pub struct ContentModified {
    pub address: VirtualPath,
    pub source: String,
}

pub type ModifiedListener = Arc<dyn Fn(&ContentModified) + Send + Sync>;

/// Maps virtual addresses to raw template text.
pub trait ContentSource: Send + Sync + fmt::Debug {
    /// Short name used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Text stored at `address` (normalized, absolute), if any.
    fn try_get_content(&self, address: &VirtualPath) -> Option<String>;

    /// Register a change listener. Sources that never change ignore it.
    fn subscribe(&self, _listener: ModifiedListener) {}
}

/// A lookup hit.
#[derive(Debug, Clone)]
pub struct ResolvedContent {
    /// The address that produced the text.
    pub address: VirtualPath,
    pub content: Arc<str>,
    pub source: String,
}
