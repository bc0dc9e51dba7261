//! Candidate generation and directory-ascent lookup.

use super::{ContentSource, InlineRegistry, ResolvedContent};
use crate::debug_log;
use crate::error::EngineError;
use crate::vpath::{PathError, VirtualPath};
use parking_lot::RwLock;
use std::sync::Arc;

/// The inline registry followed by the registered sources, in order.
#[derive(Debug, Default)]
pub struct ContentLookup {
    inline: InlineRegistry,
    sources: RwLock<Vec<Arc<dyn ContentSource>>>,
}

impl ContentLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inline(&self) -> &InlineRegistry {
        &self.inline
    }

    /// Append a source with lower priority than every existing one.
    pub fn add_source(&self, source: Arc<dyn ContentSource>) {
        self.sources.write().push(source);
    }

    pub fn sources(&self) -> Vec<Arc<dyn ContentSource>> {
        self.sources.read().clone()
    }

    /// Addresses to probe for `path`, in order.
    ///
    /// The normalized path first, then the form with `extension` added when
    /// the path has none, or without it when the path already carries it.
    /// The application root itself is never a template.
    pub fn candidates(path: &VirtualPath, extension: &str) -> Result<Vec<VirtualPath>, PathError> {
        let mut normalized = path.clone();
        normalized.normalize()?;
        if normalized.is_empty() || normalized.is_application_root() {
            return Ok(Vec::new());
        }

        let mut alternate = normalized.clone();
        match normalized.extension() {
            None => {
                alternate.add_or_replace_extension(extension);
            }
            Some(ext) if ext.eq_ignore_ascii_case(extension.trim_start_matches('.')) => {
                alternate.remove_extension();
            }
            Some(_) => return Ok(vec![normalized]),
        }
        Ok(vec![normalized, alternate])
    }

    /// First source hit over all candidates of `path`.
    pub fn lookup(
        &self,
        path: &VirtualPath,
        extension: &str,
    ) -> Result<Option<ResolvedContent>, PathError> {
        let sources = self.sources.read();
        for candidate in Self::candidates(path, extension)? {
            if let Some(content) = self.inline.try_get_content(&candidate) {
                return Ok(Some(hit(candidate, content, self.inline.name())));
            }
            for source in sources.iter() {
                if let Some(content) = source.try_get_content(&candidate) {
                    return Ok(Some(hit(candidate, content, source.name())));
                }
            }
        }
        Ok(None)
    }

    /// Like [`lookup`](Self::lookup), failing with `TemplateNotFound`.
    pub fn require(&self, path: &VirtualPath, extension: &str) -> Result<ResolvedContent, EngineError> {
        match self.lookup(path, extension)? {
            Some(hit) => Ok(hit),
            None => Err(EngineError::not_found(
                path.display_virtual(),
                probed(&Self::candidates(path, extension)?),
            )),
        }
    }

    /// Locate `name` starting at `start_dir`.
    ///
    /// Probes `<dir>/<name>`, then `<shared>/<name>` once, then each ancestor
    /// directory up to the application root. A name containing `/` or
    /// starting with `~` is looked up directly. With `required`, a miss fails
    /// with `TemplateNotFound`.
    pub fn find_nearest(
        &self,
        name: &str,
        start_dir: &VirtualPath,
        shared: &VirtualPath,
        extension: &str,
        required: bool,
    ) -> Result<Option<ResolvedContent>, EngineError> {
        let mut tried = Vec::new();

        if name.contains('/') || name.starts_with('~') {
            let path = start_dir.join(name);
            if let Some(hit) = self.lookup(&path, extension)? {
                return Ok(Some(hit));
            }
            tried.extend(Self::candidates(&path, extension)?);
        } else {
            let mut dir = Some(start_dir.clone());
            let mut shared_probed = false;
            while let Some(current) = dir {
                let mut probes = vec![current.join(name)];
                if !shared_probed {
                    shared_probed = true;
                    probes.push(shared.join(name));
                }
                for probe in probes {
                    if let Some(hit) = self.lookup(&probe, extension)? {
                        debug_log!("source"; "`{name}` found at {}", hit.address.display_virtual());
                        return Ok(Some(hit));
                    }
                    tried.extend(Self::candidates(&probe, extension)?);
                }
                dir = if current.is_application_root() {
                    None
                } else {
                    current.parent()
                };
            }
        }

        if required {
            Err(EngineError::not_found(name, probed(&tried)))
        } else {
            Ok(None)
        }
    }

    /// View-start templates from the application root down to `dir`.
    pub fn view_start_chain(
        &self,
        dir: &VirtualPath,
        name: &str,
        extension: &str,
    ) -> Result<Vec<ResolvedContent>, PathError> {
        let mut dirs = Vec::new();
        let mut current = Some(dir.clone());
        while let Some(d) = current {
            current = if d.is_application_root() { None } else { d.parent() };
            dirs.push(d);
        }

        let mut chain = Vec::new();
        for d in dirs.iter().rev() {
            if let Some(hit) = self.lookup(&d.join(name), extension)? {
                chain.push(hit);
            }
        }
        Ok(chain)
    }
}

fn hit(address: VirtualPath, content: String, source: &str) -> ResolvedContent {
    ResolvedContent {
        address,
        content: Arc::from(content),
        source: source.to_string(),
    }
}

fn probed(candidates: &[VirtualPath]) -> Vec<String> {
    candidates.iter().map(ToString::to_string).collect()
}
