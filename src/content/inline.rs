//! In-memory templates registered through the API.

use super::ContentSource;
use crate::vpath::{PathError, VirtualPath};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct InlineRegistry {
    /// Case-folded address -> (address as registered, text).
    entries: RwLock<FxHashMap<String, (VirtualPath, String)>>,
}

impl InlineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `content` at `path`, replacing earlier content.
    ///
    /// Returns the normalized address.
    pub fn register(&self, path: &VirtualPath, content: &str) -> Result<VirtualPath, PathError> {
        let mut address = path.clone();
        address.normalize()?;
        if address.is_empty() {
            return Err(PathError::Empty);
        }
        self.entries
            .write()
            .insert(address.key(), (address.clone(), content.to_string()));
        Ok(address)
    }

    /// Drop the template at `path`. Returns the removed address.
    pub fn remove(&self, path: &VirtualPath) -> Option<VirtualPath> {
        self.entries
            .write()
            .remove(&path.key())
            .map(|(address, _)| address)
    }

    /// Every registered template keyed by its root-operator address.
    pub fn list(&self) -> BTreeMap<String, String> {
        self.entries
            .read()
            .values()
            .map(|(address, content)| (address.display_virtual(), content.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ContentSource for InlineRegistry {
    fn name(&self) -> &str {
        "inline"
    }

    fn try_get_content(&self, address: &VirtualPath) -> Option<String> {
        self.entries
            .read()
            .get(&address.key())
            .map(|(_, content)| content.clone())
    }
}
