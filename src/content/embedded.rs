//! Templates compiled into the binary.
//!
//! Entries are `(name, text)` pairs where `name` is the path below the
//! application root (`Shared/_Layout.vt`). Names compare case-insensitively
//! and treat `-` and `_` as the same character.

use super::ContentSource;
use crate::vpath::VirtualPath;

pub struct EmbeddedSource {
    name: String,
    app_root: VirtualPath,
    entries: Vec<(String, &'static str, &'static str)>,
}

impl EmbeddedSource {
    pub fn new(
        name: impl Into<String>,
        application_root: &str,
        entries: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self {
            name: name.into(),
            app_root: VirtualPath::new(application_root),
            entries: entries
                .iter()
                .map(|&(path, text)| (fold(path), path, text))
                .collect(),
        }
    }

    /// Addresses of every entry.
    pub fn list(&self) -> Vec<VirtualPath> {
        self.entries
            .iter()
            .filter_map(|(_, path, _)| {
                let mut address = self.app_root.sibling("~/");
                address.combine_with([path.trim_start_matches(['/', '~'])]);
                address.normalize().ok()?;
                Some(address)
            })
            .collect()
    }
}

fn fold(name: &str) -> String {
    name.trim_start_matches(['~', '/', '\\'])
        .chars()
        .map(|c| match c {
            '\\' => '/',
            '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

impl ContentSource for EmbeddedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_get_content(&self, address: &VirtualPath) -> Option<String> {
        let key = fold(&address.segments_under_root()?.join("/"));
        self.entries
            .iter()
            .find(|(folded, _, _)| *folded == key)
            .map(|(_, _, text)| (*text).to_string())
    }
}

impl std::fmt::Debug for EmbeddedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedSource")
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .finish()
    }
}
