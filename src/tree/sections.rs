//! Per-node section registry.

use super::RenderContext;
use crate::error::EngineError;
use std::{collections::BTreeMap, fmt, sync::Arc};

/// Deferred section body, invoked by the layout that renders it.
pub type SectionRenderer =
    Arc<dyn Fn(&mut RenderContext<'_>) -> Result<(), EngineError> + Send + Sync>;

/// Sections declared while a node's view-starts and body ran.
///
/// Re-declaring a name replaces the earlier renderer.
#[derive(Clone, Default)]
pub struct SectionRegistry {
    sections: BTreeMap<String, SectionRenderer>,
}

impl SectionRegistry {
    /// Store `renderer` under `name`. Returns `true` when it replaced one.
    pub fn declare(&mut self, name: impl Into<String>, renderer: SectionRenderer) -> bool {
        self.sections.insert(name.into(), renderer).is_some()
    }

    pub fn get(&self, name: &str) -> Option<SectionRenderer> {
        self.sections.get(name).cloned()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

impl fmt::Debug for SectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> SectionRenderer {
        Arc::new(|_: &mut RenderContext<'_>| Ok::<_, EngineError>(()))
    }

    #[test]
    fn test_last_declaration_wins() {
        let mut registry = SectionRegistry::default();
        let first = noop();
        let second = noop();
        assert!(!registry.declare("head", Arc::clone(&first)));
        assert!(registry.declare("head", Arc::clone(&second)));
        assert_eq!(registry.len(), 1);
        let stored = registry.get("head").unwrap();
        assert!(Arc::ptr_eq(&stored, &second));
    }

    #[test]
    fn test_lookup() {
        let mut registry = SectionRegistry::default();
        registry.declare("scripts", noop());
        registry.declare("head", noop());
        assert!(registry.is_defined("head"));
        assert!(!registry.is_defined("Head"));
        assert!(registry.get("footer").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["head", "scripts"]);
        assert_eq!(format!("{registry:?}"), r#"{"head", "scripts"}"#);
    }
}
