//! Templates stored in a directory on disk.
//!
//! The directory is mapped onto the application root: with application root
//! `/app`, the address `/app/shared/_layout.vt` reads
//! `<dir>/shared/_layout.vt`. Exact paths are tried first, then each segment
//! is matched case-insensitively.

use super::{ContentModified, ContentSource, ModifiedListener};
use crate::error::EngineError;
use crate::vpath::VirtualPath;
use crate::{debug_log, log};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use std::{
    fs,
    path::{Component, Path, PathBuf},
    sync::Arc,
};
use walkdir::WalkDir;

pub struct DirectorySource {
    name: String,
    root: PathBuf,
    app_root: VirtualPath,
    listeners: Arc<RwLock<Vec<ModifiedListener>>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>, application_root: &str) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self {
            name: format!("dir:{}", root.display()),
            root,
            app_root: VirtualPath::new(application_root),
            listeners: Arc::default(),
            watcher: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start watching the directory; changes are reported to subscribers.
    ///
    /// Calling it again is a no-op.
    pub fn watch(&self) -> Result<(), EngineError> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Ok(());
        }

        let root = self.root.clone();
        let app_root = self.app_root.clone();
        let listeners = Arc::clone(&self.listeners);
        let source = self.name.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_relevant(&event) => {
                for path in &event.paths {
                    if is_temp_file(path) {
                        continue;
                    }
                    let Some(address) = address_for(&root, &app_root, path) else {
                        continue;
                    };
                    debug_log!("source"; "modified {}", address.display_virtual());
                    let change = ContentModified {
                        address,
                        source: source.clone(),
                    };
                    for listener in listeners.read().iter() {
                        listener(&change);
                    }
                }
            }
            Ok(_) => {}
            Err(err) => log!("source"; "watch error: {err}"),
        })
        .map_err(|err| EngineError::Io(self.root.clone(), std::io::Error::other(err)))?;

        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|err| EngineError::Io(self.root.clone(), std::io::Error::other(err)))?;

        *slot = Some(watcher);
        Ok(())
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Every template file below the directory, as addresses, sorted.
    pub fn list(&self) -> Vec<VirtualPath> {
        let mut addresses: Vec<_> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file() && !is_temp_file(entry.path()))
            .filter_map(|entry| address_for(&self.root, &self.app_root, entry.path()))
            .collect();
        addresses.sort_by_key(ToString::to_string);
        addresses
    }

    /// The file behind `address`, if it exists.
    pub fn locate(&self, address: &VirtualPath) -> Option<PathBuf> {
        let segments = address.segments_under_root()?;
        if segments.is_empty() || segments.iter().any(|s| matches!(*s, "." | "..")) {
            return None;
        }

        let exact = segments.iter().fold(self.root.clone(), |path, s| path.join(s));
        if exact.is_file() {
            return Some(exact);
        }

        let mut current = self.root.clone();
        for segment in segments {
            let entry = fs::read_dir(&current)
                .ok()?
                .filter_map(Result::ok)
                .find(|entry| {
                    entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| name.eq_ignore_ascii_case(segment))
                })?;
            current = entry.path();
        }
        current.is_file().then_some(current)
    }
}

impl ContentSource for DirectorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_get_content(&self, address: &VirtualPath) -> Option<String> {
        let path = self.locate(address)?;
        match fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(err) => {
                debug_log!("source"; "cannot read {}: {err}", path.display());
                None
            }
        }
    }

    fn subscribe(&self, listener: ModifiedListener) {
        self.listeners.write().push(listener);
    }
}

impl std::fmt::Debug for DirectorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorySource")
            .field("root", &self.root)
            .field("application_root", &self.app_root.application_root())
            .field("watching", &self.is_watching())
            .finish()
    }
}

/// Map a file below `root` to its normalized address.
fn address_for(root: &Path, app_root: &VirtualPath, path: &Path) -> Option<VirtualPath> {
    let relative = path.strip_prefix(root).ok()?;
    let mut address = app_root.sibling("~/");
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                address.combine_with([part.to_str()?]);
            }
            _ => return None,
        }
    }
    address.normalize().ok()?;
    (!address.is_application_root()).then_some(address)
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}
