//! The engine: configuration, content lookup and the compiled-template cache
//! behind one cloneable handle.
//!
//! # Render flow
//!
//! ```text
//! execute_by_path("~/home")
//!     │
//!     ├─► ConfigHandle::lock()          configuration is frozen from here on
//!     ├─► ContentLookup::require()      inline registry, then sources
//!     ├─► TemplateCache::get_or_create  compile at most once per signature
//!     └─► Executor::execute_root()      view-starts → body → layouts
//!             │
//!             ▼
//!       ExecutedTemplate  (text, bag, tree)   or   RenderFailure
//! ```

use crate::bag::ValueBag;
use crate::cache::TemplateCache;
use crate::compiler::{BuiltinCompiler, TemplateCompiler};
use crate::config::{ConfigHandle, EngineConfig};
use crate::content::{ContentLookup, ContentSource, DirectorySource, ResolvedContent};
use crate::error::{EngineError, RenderFailure};
use crate::tree::{ExecutedTemplate, Executor, RootOptions, Runtime};
use crate::vpath::VirtualPath;
use crate::debug_log;
use parking_lot::Mutex;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, OnceLock},
};

/// Per-call inputs.
///
/// ```
/// use serde_json::json;
/// use vellum::RenderOptions;
///
/// let options = RenderOptions::new()
///     .with_model(json!({"name": "Smith"}))
///     .skip_layout(true);
/// assert!(options.skip_layout);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub model: Value,
    /// Bag to render with. A fresh one is created on demand otherwise.
    pub bag: Option<ValueBag>,
    pub skip_layout: bool,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: Value) -> Self {
        self.model = model;
        self
    }

    pub fn with_bag(mut self, bag: ValueBag) -> Self {
        self.bag = Some(bag);
        self
    }

    pub fn skip_layout(mut self, skip: bool) -> Self {
        self.skip_layout = skip;
        self
    }
}

impl From<RenderOptions> for RootOptions {
    fn from(options: RenderOptions) -> Self {
        Self {
            model: options.model,
            bag: options.bag,
            skip_layout: options.skip_layout,
        }
    }
}

struct EngineInner {
    config: ConfigHandle,
    lookup: Arc<ContentLookup>,
    cache: Arc<TemplateCache>,
    /// Built from the locked configuration on first use.
    directories: OnceLock<Vec<Arc<DirectorySource>>>,
    /// Sources added through `add_source`, attached after the directories.
    pending: Mutex<Vec<Arc<dyn ContentSource>>>,
}

/// Cloneable handle; clones share the cache and the inline registry.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Engine with the built-in compiler.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_compiler(config, Arc::new(BuiltinCompiler))
    }

    /// Engine with a custom compiler.
    ///
    /// Content sources are attached when the configuration locks: every
    /// `[sources] directories` entry becomes a [`DirectorySource`], in order,
    /// watched when `[sources] watch` is on, followed by the sources given to
    /// [`Engine::add_source`].
    pub fn with_compiler(
        config: EngineConfig,
        compiler: Arc<dyn TemplateCompiler>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(EngineInner {
                config: ConfigHandle::new(config),
                lookup: Arc::new(ContentLookup::new()),
                cache: Arc::new(TemplateCache::new(compiler)),
                directories: OnceLock::new(),
                pending: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Current configuration.
    pub fn config(&self) -> Arc<EngineConfig> {
        self.inner.config.load()
    }

    /// Change the configuration. Fails with `Locked` after the first render.
    pub fn configure(&self, f: impl FnOnce(&mut EngineConfig)) -> Result<(), EngineError> {
        self.inner.config.update(f)?;
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.inner.config.is_locked()
    }

    /// Append a content source below the existing ones.
    ///
    /// Sources are configuration: adding one fails after the first render.
    pub fn add_source(&self, source: Arc<dyn ContentSource>) -> Result<(), EngineError> {
        let mut pending = self.inner.pending.lock();
        self.inner.config.ensure_unlocked()?;
        pending.push(source);
        Ok(())
    }

    /// The directory sources built from `[sources] directories`.
    ///
    /// Attaches the content sources, which locks the configuration.
    pub fn directories(&self) -> Result<&[Arc<DirectorySource>], EngineError> {
        self.inner.config.lock();
        let config = self.inner.config.load();
        self.attach_sources(&config)
    }

    /// Register the configured directories, then the added sources, with the
    /// lookup. Runs once; `config` must be the locked configuration.
    fn attach_sources(&self, config: &EngineConfig) -> Result<&[Arc<DirectorySource>], EngineError> {
        if let Some(directories) = self.inner.directories.get() {
            return Ok(directories.as_slice());
        }
        let mut pending = self.inner.pending.lock();
        if let Some(directories) = self.inner.directories.get() {
            return Ok(directories.as_slice());
        }

        let listener = self.inner.cache.listener(config.templates.default_extension.clone());
        let mut directories = Vec::with_capacity(config.sources.directories.len());
        for dir in &config.sources.directories {
            let source = Arc::new(DirectorySource::new(dir, &config.paths.application_root));
            source.subscribe(Arc::clone(&listener));
            if config.sources.watch {
                source.watch()?;
                debug_log!("source"; "watching {}", source.root().display());
            }
            directories.push(source);
        }

        for source in &directories {
            self.inner
                .lookup
                .add_source(Arc::clone(source) as Arc<dyn ContentSource>);
        }
        for source in pending.drain(..) {
            source.subscribe(Arc::clone(&listener));
            debug_log!("source"; "added {}", source.name());
            self.inner.lookup.add_source(source);
        }
        Ok(self.inner.directories.get_or_init(|| directories).as_slice())
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.inner.cache
    }

    pub fn lookup(&self) -> &ContentLookup {
        &self.inner.lookup
    }

    /// Freeze the configuration and snapshot what a render needs.
    fn runtime(&self) -> Result<Runtime, EngineError> {
        self.inner.config.lock();
        let config = self.inner.config.load();
        self.attach_sources(&config)?;
        Ok(Runtime::new(
            config,
            Arc::clone(&self.inner.lookup),
            Arc::clone(&self.inner.cache),
        )?)
    }

    /// `path` bound to the configured application root.
    pub fn virtual_path(&self, path: &str) -> VirtualPath {
        self.config().app_root().sibling(path)
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Lock the configuration and look `path` up.
    fn resolve(
        &self,
        path: &str,
        required: bool,
    ) -> Result<Option<(Runtime, ResolvedContent)>, RenderFailure> {
        let rt = self.runtime().map_err(|err| RenderFailure::new(path, err))?;
        let address = rt.config.app_root().sibling(path);
        let failure = |err: EngineError| RenderFailure::new(address.display_virtual(), err);

        let hit = if required {
            Some(rt.lookup.require(&address, rt.extension()).map_err(failure)?)
        } else {
            rt.lookup
                .lookup(&address, rt.extension())
                .map_err(|err| failure(err.into()))?
        };
        match hit {
            Some(hit) => {
                debug_log!("render"; "{} from {}", hit.address.display_virtual(), hit.source);
                Ok(Some((rt, hit)))
            }
            None => {
                debug_log!("render"; "{} not found", address.display_virtual());
                Ok(None)
            }
        }
    }

    /// Render the template at `path`. A missing template is an error.
    pub fn execute_by_path(
        &self,
        path: &str,
        options: RenderOptions,
    ) -> Result<ExecutedTemplate, RenderFailure> {
        match self.resolve(path, true)? {
            Some((rt, hit)) => Executor::new(rt).execute_root(hit, options.into()),
            None => Err(RenderFailure::new(
                path,
                EngineError::not_found(path, Vec::new()),
            )),
        }
    }

    /// Render the template at `path`, or `Ok(None)` when no source has it.
    pub fn try_execute_by_path(
        &self,
        path: &str,
        options: RenderOptions,
    ) -> Result<Option<ExecutedTemplate>, RenderFailure> {
        match self.resolve(path, false)? {
            Some((rt, hit)) => Executor::new(rt).execute_root(hit, options.into()).map(Some),
            None => Ok(None),
        }
    }

    /// Render `content` directly.
    ///
    /// The text gets a synthesized address directly under the application
    /// root, derived from its hash, so root view-starts apply and repeated
    /// calls share one compiled template.
    ///
    /// Every distinct text keeps its own cache entry (`~/__content_*`) until
    /// [`Engine::clear_cache`]. Callers rendering unbounded generated text
    /// should register it inline under a fixed path instead.
    pub fn execute_by_content(
        &self,
        content: &str,
        options: RenderOptions,
    ) -> Result<ExecutedTemplate, RenderFailure> {
        let rt = self
            .runtime()
            .map_err(|err| RenderFailure::new("<content>", err))?;
        let hash = blake3::hash(content.as_bytes()).to_hex();
        let extension = rt.config.templates.extension();
        let mut address = rt
            .config
            .app_root()
            .sibling(&format!("~/__content_{}.{extension}", &hash.as_str()[..16]));
        address
            .normalize()
            .map_err(|err| RenderFailure::new("<content>", err.into()))?;

        let hit = ResolvedContent {
            address,
            content: Arc::from(content),
            source: "content".to_string(),
        };
        Executor::new(rt).execute_root(hit, options.into())
    }

    /// Render `path_or_content`, deciding which it is.
    ///
    /// A single token starting with `/` or `~` and free of braces is a path;
    /// anything else is template text.
    pub fn execute(
        &self,
        path_or_content: &str,
        options: RenderOptions,
    ) -> Result<ExecutedTemplate, RenderFailure> {
        if looks_like_path(path_or_content) {
            self.execute_by_path(path_or_content, options)
        } else {
            self.execute_by_content(path_or_content, options)
        }
    }

    /// Render `path` with `bag`, leaving the updated bag in place.
    ///
    /// Sequential calls with the same bag see each other's writes.
    pub fn execute_with_bag(
        &self,
        path: &str,
        bag: &mut ValueBag,
        options: RenderOptions,
    ) -> Result<String, RenderFailure> {
        let options = options.with_bag(std::mem::take(bag));
        match self.execute_by_path(path, options) {
            Ok(executed) => {
                let text = executed.result().to_string();
                *bag = executed.into_bag();
                Ok(text)
            }
            Err(failure) => {
                if let Some(root) = failure.tree().and_then(|tree| tree.root())
                    && let Some(partial) = root.bag()
                {
                    *bag = partial.clone();
                }
                Err(failure)
            }
        }
    }

    /// Compile the template at `path` without rendering it.
    ///
    /// Returns `false` when it does not exist and `required` is off.
    pub fn precompile(&self, path: &str, required: bool) -> Result<bool, EngineError> {
        let rt = self.runtime()?;
        let address = rt.config.app_root().sibling(path);
        let hit = if required {
            rt.lookup.require(&address, rt.extension())?
        } else {
            match rt.lookup.lookup(&address, rt.extension())? {
                Some(hit) => hit,
                None => return Ok(false),
            }
        };
        rt.compile(&hit)?;
        Ok(true)
    }

    // ========================================================================
    // Inline templates
    // ========================================================================

    /// Register in-memory template text at `path`, shadowing every source.
    pub fn register_inline(&self, path: &str, content: &str) -> Result<VirtualPath, EngineError> {
        let address = self.virtual_path(path);
        let registered = self.inner.lookup.inline().register(&address, content)?;
        self.invalidate(&registered);
        debug_log!("source"; "registered inline {}", registered.display_virtual());
        Ok(registered)
    }

    /// Remove an inline template. Returns whether one was registered.
    pub fn remove_inline(&self, path: &str) -> Result<bool, EngineError> {
        let address = self.virtual_path(path);
        match self.inner.lookup.inline().remove(&address) {
            Some(removed) => {
                self.invalidate(&removed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Inline templates by address (root-operator form).
    pub fn list_inline(&self) -> BTreeMap<String, String> {
        self.inner.lookup.inline().list()
    }

    /// Drop the compiled templates for `address`.
    pub fn invalidate(&self, address: &VirtualPath) {
        let config = self.config();
        self.inner
            .cache
            .invalidate(address, &config.templates.default_extension);
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
        debug_log!("cache"; "cleared");
    }
}

fn looks_like_path(text: &str) -> bool {
    let text = text.trim();
    (text.starts_with('/') || text.starts_with('~'))
        && !text.contains(['{', '}'])
        && !text.chars().any(char::is_whitespace)
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("locked", &self.is_locked())
            .field("sources", &self.inner.lookup.sources().len())
            .field("inline", &self.inner.lookup.inline().len())
            .field("cache", &self.inner.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_looks_like_path() {
        assert!(looks_like_path("~/home"));
        assert!(looks_like_path("/a/b.vt"));
        assert!(!looks_like_path("Hello {name}"));
        assert!(!looks_like_path("/not a path"));
        assert!(!looks_like_path("plain text"));
    }

    #[test]
    fn test_execute_by_content_is_cached_by_hash() {
        let engine = engine();
        let options = || RenderOptions::new().with_model(json!({"n": 1}));
        let first = engine.execute_by_content("n={n}", options()).unwrap();
        let second = engine.execute("n={n}", options()).unwrap();
        assert_eq!(first.result(), "n=1");
        assert_eq!(second.result(), "n=1");
        assert_eq!(engine.cache().compile_count(), 1);
        assert!(first.virtual_path().to_string().starts_with("/__content_"));
        assert!(first.virtual_path().to_string().ends_with(".vt"));
    }

    #[test]
    fn test_content_entries_live_until_cleared() {
        let engine = engine();
        for n in 0..3 {
            engine.execute_by_content(&format!("text {n}"), RenderOptions::new()).unwrap();
        }
        assert_eq!(engine.cache().len(), 3);
        engine.clear_cache();
        assert!(engine.cache().is_empty());
    }

    #[test]
    fn test_missing_template() {
        let engine = engine();
        assert!(engine.try_execute_by_path("~/nope", RenderOptions::new()).unwrap().is_none());
        let failure = engine.execute_by_path("~/nope", RenderOptions::new()).unwrap_err();
        assert_eq!(failure.address, "~/nope");
        assert!(matches!(failure.error(), EngineError::TemplateNotFound { .. }));
        assert!(!engine.precompile("~/nope", false).unwrap());
        assert!(engine.precompile("~/nope", true).is_err());
    }

    #[test]
    fn test_register_replaces_compiled_template() {
        let engine = engine();
        engine.register_inline("~/page", "one").unwrap();
        assert_eq!(engine.execute("~/page", RenderOptions::new()).unwrap().result(), "one");
        engine.register_inline("~/page", "two").unwrap();
        assert_eq!(engine.execute("~/page", RenderOptions::new()).unwrap().result(), "two");
        assert!(engine.remove_inline("~/page").unwrap());
        assert!(!engine.remove_inline("~/page").unwrap());
        assert!(engine.cache().is_empty());
    }

    #[test]
    fn test_execute_with_bag_keeps_writes() {
        let engine = engine();
        engine.register_inline("~/count", "{@incr hits}").unwrap();
        let mut bag = ValueBag::new();
        engine.execute_with_bag("~/count", &mut bag, RenderOptions::new()).unwrap();
        engine.execute_with_bag("~/count", &mut bag, RenderOptions::new()).unwrap();
        assert_eq!(bag.get_as::<i64>("hits"), Some(2));
    }

    #[test]
    fn test_configured_sources_attach_on_first_render() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.tpl"), "from disk").unwrap();

        let engine = engine();
        engine
            .configure(|c| {
                c.sources.directories.push(dir.path().to_path_buf());
                c.templates.default_extension = ".tpl".into();
            })
            .unwrap();
        assert!(engine.lookup().sources().is_empty());

        let executed = engine.execute_by_path("~/page", RenderOptions::new()).unwrap();
        assert_eq!(executed.result(), "from disk");
        assert_eq!(executed.virtual_path().to_string(), "/page.tpl");

        let directories = engine.directories().unwrap();
        assert_eq!(directories.len(), 1);
        assert_eq!(directories[0].root(), dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_added_sources_follow_directories() {
        static ENTRIES: &[(&str, &str)] = &[("page.vt", "embedded"), ("extra.vt", "extra")];
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page.vt"), "directory").unwrap();

        let engine = engine();
        engine
            .add_source(Arc::new(crate::content::EmbeddedSource::new("builtin", "/", ENTRIES)))
            .unwrap();
        engine
            .configure(|c| c.sources.directories.push(dir.path().to_path_buf()))
            .unwrap();

        assert_eq!(engine.execute("~/page", RenderOptions::new()).unwrap().result(), "directory");
        assert_eq!(engine.execute("~/extra", RenderOptions::new()).unwrap().result(), "extra");
        assert_eq!(engine.lookup().sources().len(), 2);
    }

    #[test]
    fn test_precompile_locks_config() {
        let engine = engine();
        engine.configure(|c| c.templates.default_extension = ".tpl".into()).unwrap();
        engine.register_inline("~/page.tpl", "x").unwrap();
        assert!(engine.precompile("~/page", true).unwrap());
        assert!(engine.is_locked());
        assert!(matches!(
            engine.configure(|c| c.templates.view_start = "_start".into()),
            Err(EngineError::Config(crate::config::ConfigError::Locked))
        ));
    }
}
