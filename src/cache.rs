//! Compiled-template cache.
//!
//! One slot per resolved address. Each slot holds either a ready descriptor
//! or the error of the last failed compile, both tagged with the blake3
//! signature of the text they came from.
//!
//! ```text
//!   get_or_create(hit)
//!        │
//!        ▼
//!   slots: RwLock<FxHashMap<key, Arc<Mutex<Slot>>>>     (map lock held briefly)
//!        │
//!        ▼
//!   slot.lock()  ── Ready(sig == hit sig)  ──► reuse descriptor
//!        │        ── Failed(sig == hit sig) ──► replay compile error
//!        ▼
//!   compile while holding the slot lock  ──► store, replacing the old entry
//! ```
//!
//! Holding the slot lock while compiling makes concurrent callers for the
//! same address wait for one compile instead of starting their own.

use crate::compiler::{
    CompileError, LanguageProfile, ModelRequirement, TemplateCompiler, TemplateFactory,
};
use crate::content::{ContentModified, ModifiedListener, ResolvedContent};
use crate::debug_log;
use crate::error::EngineError;
use crate::vpath::VirtualPath;
use chrono::{DateTime, Local};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::{
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

/// A compiled template, shared by every render that uses it.
pub struct CompiledTemplate {
    address: VirtualPath,
    signature: blake3::Hash,
    factory: Arc<dyn TemplateFactory>,
    model_requirement: ModelRequirement,
    created_at: DateTime<Local>,
    generated_source: Option<String>,
}

impl CompiledTemplate {
    pub fn address(&self) -> &VirtualPath {
        &self.address
    }

    pub fn signature(&self) -> &blake3::Hash {
        &self.signature
    }

    pub fn factory(&self) -> &Arc<dyn TemplateFactory> {
        &self.factory
    }

    pub fn model_requirement(&self) -> ModelRequirement {
        self.model_requirement
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub fn generated_source(&self) -> Option<&str> {
        self.generated_source.as_deref()
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("address", &self.address.to_string())
            .field("signature", &self.signature.to_hex().as_str())
            .field("model_requirement", &self.model_requirement)
            .field("created_at", &self.created_at)
            .finish()
    }
}

enum SlotState {
    Ready(Arc<CompiledTemplate>),
    Failed {
        signature: blake3::Hash,
        error: CompileError,
    },
}

type Slot = Arc<Mutex<Option<SlotState>>>;

/// Options the cache passes through to the compiler.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    pub profile: LanguageProfile,
    pub hint: ModelRequirement,
    pub include_generated_source: bool,
}

pub struct TemplateCache {
    slots: RwLock<FxHashMap<String, Slot>>,
    compiler: Arc<dyn TemplateCompiler>,
    compiles: AtomicUsize,
}

impl TemplateCache {
    pub fn new(compiler: Arc<dyn TemplateCompiler>) -> Self {
        Self {
            slots: RwLock::default(),
            compiler,
            compiles: AtomicUsize::new(0),
        }
    }

    fn slot(&self, key: &str) -> Slot {
        if let Some(slot) = self.slots.read().get(key) {
            return Arc::clone(slot);
        }
        Arc::clone(
            self.slots
                .write()
                .entry(key.to_string())
                .or_insert_with(Slot::default),
        )
    }

    /// The descriptor for `hit`, compiling it at most once per signature.
    pub fn get_or_create(
        &self,
        hit: &ResolvedContent,
        options: CompileOptions,
    ) -> Result<Arc<CompiledTemplate>, EngineError> {
        let key = hit.address.key();
        let signature = blake3::hash(hit.content.as_bytes());
        let slot = self.slot(&key);
        let mut state = slot.lock();

        match &*state {
            Some(SlotState::Ready(template)) if template.signature == signature => {
                return Ok(Arc::clone(template));
            }
            Some(SlotState::Failed {
                signature: failed,
                error,
            }) if *failed == signature => {
                debug_log!("cache"; "replaying compile error for {}", hit.address.display_virtual());
                return Err(EngineError::TemplateCompilation {
                    address: hit.address.display_virtual(),
                    error: error.clone(),
                });
            }
            _ => {}
        }

        let started = Instant::now();
        self.compiles.fetch_add(1, Ordering::Relaxed);
        match self
            .compiler
            .compile(&hit.content, options.hint, options.profile)
        {
            Ok(factory) => {
                debug_log!("cache"; "compiled {} in {:?}", hit.address.display_virtual(), started.elapsed());
                let generated_source = if options.include_generated_source {
                    factory.generated_source()
                } else {
                    None
                };
                let template = Arc::new(CompiledTemplate {
                    address: hit.address.clone(),
                    signature,
                    model_requirement: factory.model_requirement(),
                    factory,
                    created_at: Local::now(),
                    generated_source,
                });
                *state = Some(SlotState::Ready(Arc::clone(&template)));
                Ok(template)
            }
            Err(error) => {
                debug_log!("cache"; "failed to compile {}: {error}", hit.address.display_virtual());
                *state = Some(SlotState::Failed {
                    signature,
                    error: error.clone(),
                });
                Err(EngineError::TemplateCompilation {
                    address: hit.address.display_virtual(),
                    error,
                })
            }
        }
    }

    /// Ready descriptor for `address`, without compiling.
    pub fn get(&self, address: &VirtualPath) -> Option<Arc<CompiledTemplate>> {
        let slot = self.slots.read().get(&address.key()).cloned()?;
        let state = slot.lock();
        match &*state {
            Some(SlotState::Ready(template)) => Some(Arc::clone(template)),
            _ => None,
        }
    }

    /// Drop the entries for every lookup candidate of `address`.
    pub fn invalidate(&self, address: &VirtualPath, extension: &str) -> usize {
        let keys: Vec<String> = match crate::content::ContentLookup::candidates(address, extension) {
            Ok(candidates) => candidates.iter().map(VirtualPath::key).collect(),
            Err(_) => vec![address.key()],
        };
        let mut slots = self.slots.write();
        let removed = keys.iter().filter(|key| slots.remove(*key).is_some()).count();
        if removed > 0 {
            debug_log!("cache"; "invalidated {}", address.display_virtual());
        }
        removed
    }

    pub fn clear(&self) {
        self.slots.write().clear();
    }

    /// Whether a ready descriptor exists for `address` exactly.
    pub fn contains(&self, address: &VirtualPath) -> bool {
        self.get(address).is_some()
    }

    /// Number of slots, failed ones included.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Total compiler invocations since creation.
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::Relaxed)
    }

    /// A listener that invalidates entries on content changes.
    ///
    /// Holds the cache weakly, so sources never keep it alive.
    pub fn listener(self: &Arc<Self>, extension: String) -> ModifiedListener {
        let cache: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |change: &ContentModified| {
            if let Some(cache) = cache.upgrade() {
                cache.invalidate(&change.address, &extension);
            }
        })
    }
}

impl fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateCache")
            .field("slots", &self.len())
            .field("compiles", &self.compile_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{BuiltinCompiler, Template};
    use std::{thread, time::Duration};

    const OPTIONS: CompileOptions = CompileOptions {
        profile: LanguageProfile::Brace,
        hint: ModelRequirement::Dynamic,
        include_generated_source: false,
    };

    /// Counts compiles and sleeps so concurrent callers overlap.
    struct SlowCompiler {
        calls: AtomicUsize,
    }

    impl TemplateCompiler for SlowCompiler {
        fn compile(
            &self,
            text: &str,
            hint: ModelRequirement,
            profile: LanguageProfile,
        ) -> Result<Arc<dyn TemplateFactory>, CompileError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            BuiltinCompiler.compile(text, hint, profile)
        }
    }

    fn hit(path: &str, content: &str) -> ResolvedContent {
        let mut address = VirtualPath::parse("/", path);
        address.normalize().unwrap();
        ResolvedContent {
            address,
            content: Arc::from(content),
            source: "test".into(),
        }
    }

    #[test]
    fn test_reuses_descriptor_for_same_signature() {
        let cache = TemplateCache::new(Arc::new(BuiltinCompiler));
        let a = cache.get_or_create(&hit("~/page.vt", "Hello"), OPTIONS).unwrap();
        let b = cache.get_or_create(&hit("/PAGE.vt", "Hello"), OPTIONS).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.compile_count(), 1);
    }

    #[test]
    fn test_content_change_replaces_descriptor() {
        let cache = TemplateCache::new(Arc::new(BuiltinCompiler));
        let a = cache.get_or_create(&hit("~/page.vt", "one"), OPTIONS).unwrap();
        let b = cache.get_or_create(&hit("~/page.vt", "two"), OPTIONS).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_ne!(a.signature(), b.signature());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_negative_entry_only_for_failing_signature() {
        let cache = TemplateCache::new(Arc::new(SlowCompiler {
            calls: AtomicUsize::new(0),
        }));
        let broken = hit("~/page.vt", "{@section x}");
        assert!(cache.get_or_create(&broken, OPTIONS).is_err());
        let replay = cache.get_or_create(&broken, OPTIONS);
        assert!(matches!(replay, Err(EngineError::TemplateCompilation { .. })));
        assert_eq!(cache.compile_count(), 1);
        assert!(!cache.contains(&broken.address));

        let fixed = hit("~/page.vt", "{@section x}ok{@end}");
        assert!(cache.get_or_create(&fixed, OPTIONS).is_ok());
        assert_eq!(cache.compile_count(), 2);
        assert!(cache.contains(&fixed.address));
    }

    #[test]
    fn test_single_flight_under_concurrency() {
        let compiler = Arc::new(SlowCompiler {
            calls: AtomicUsize::new(0),
        });
        let cache = TemplateCache::new(compiler.clone());
        let page = hit("~/page.vt", "Hello {name}");

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| cache.get_or_create(&page, OPTIONS).unwrap());
            }
        });

        assert_eq!(compiler.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalidate_and_listener() {
        let cache = Arc::new(TemplateCache::new(Arc::new(BuiltinCompiler)));
        cache.get_or_create(&hit("~/page.vt", "x"), OPTIONS).unwrap();
        cache.get_or_create(&hit("~/other", "y"), OPTIONS).unwrap();
        assert_eq!(cache.len(), 2);

        let listener = cache.listener(".vt".into());
        listener(&ContentModified {
            address: hit("/page.vt", "").address,
            source: "test".into(),
        });
        assert_eq!(cache.len(), 1);

        // `/other.vt` changing also drops the `/other` entry.
        assert_eq!(cache.invalidate(&hit("/other.vt", "").address, ".vt"), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_generated_source_is_opt_in() {
        let cache = TemplateCache::new(Arc::new(BuiltinCompiler));
        let plain = cache.get_or_create(&hit("~/a", "x"), OPTIONS).unwrap();
        assert!(plain.generated_source().is_none());

        let options = CompileOptions {
            include_generated_source: true,
            ..OPTIONS
        };
        let listed = cache.get_or_create(&hit("~/b", "x"), options).unwrap();
        assert!(listed.generated_source().is_some_and(|s| s.contains("write \"x\"")));
        let _: Box<dyn Template> = listed.factory().instantiate();
    }
}
