//! File system watcher for `vellum watch`.
//!
//! Renders a template, then renders it again whenever a file in one of the
//! template directories changes. The directory sources invalidate the
//! compiled-template cache themselves; this loop only decides when to
//! re-render.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Event Loop                              │
//! │                                                              │
//! │  ┌──────────┐    ┌──────────┐    ┌────────────────────────┐  │
//! │  │ notify   │───▶│ Debouncer│───▶│    rerender()          │  │
//! │  │ events   │    │ (300ms)  │    │  Engine::execute(..)   │  │
//! │  └──────────┘    └──────────┘    └────────────────────────┘  │
//! │        ▲                                                     │
//! │        └──── Ctrl+C flips `running`, loop exits              │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use crate::cli::RenderArgs;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::RecvTimeoutError,
    },
    time::{Duration, Instant},
};
use vellum::{Engine, EngineConfig, log, logger::WatchStatus};

// =============================================================================
// Constants
// =============================================================================

const DEBOUNCE_MS: u64 = 300;
const POLL_MS: u64 = 500;

// =============================================================================
// Path Utilities
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Format path relative to the first template directory containing it.
fn rel_path(path: &Path, roots: &[PathBuf]) -> String {
    roots
        .iter()
        .find_map(|root| path.strip_prefix(root).ok())
        .unwrap_or(path)
        .display()
        .to_string()
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events.
struct Debouncer {
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            pending: FxHashSet::default(),
            last_event: None,
        }
    }

    fn add(&mut self, event: Event) {
        for path in event.paths {
            if !is_temp_file(&path) {
                self.pending.insert(path);
            }
        }
        self.last_event = Some(Instant::now());
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        let mut paths: Vec<_> = self.pending.drain().collect();
        paths.sort();
        paths
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_millis(POLL_MS)
        } else {
            Duration::from_millis(DEBOUNCE_MS)
        }
    }
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}

// =============================================================================
// Rendering
// =============================================================================

/// Render and report. Returns the rendered text, if any.
fn rerender(
    engine: &Engine,
    args: &RenderArgs,
    status: &mut WatchStatus,
    last: Option<&str>,
) -> Option<String> {
    match crate::render(engine, args) {
        Ok(executed) => {
            let text = executed.result().to_string();
            if last == Some(text.as_str()) {
                status.unchanged(&args.path);
                return Some(text);
            }
            match crate::emit(&executed, args) {
                Ok(()) => status.success(&format!("rendered: {} ({} bytes)", args.path, text.len())),
                Err(err) => status.error(&format!("failed: {}", args.path), &format!("{err:#}")),
            }
            Some(text)
        }
        Err(err) => {
            status.error(&format!("failed: {}", args.path), &format!("{err:#}"));
            None
        }
    }
}

// =============================================================================
// Public API
// =============================================================================

/// Render `args.path`, then re-render on every change until Ctrl+C.
pub fn watch_blocking(config: EngineConfig, args: &RenderArgs) -> Result<()> {
    let roots = config.sources.directories.clone();
    let engine = Engine::new(config)?;

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log!("watch"; "shutting down...");
        flag.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    for root in &roots {
        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", root.display()))?;
        log!("watch"; "{}", root.display());
    }

    let mut status = WatchStatus::new();
    let mut last = rerender(&engine, args, &mut status, None);
    let mut debouncer = Debouncer::new();

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) => debouncer.add(event),
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(RecvTimeoutError::Timeout) if debouncer.ready() => {
                let changed = debouncer.take();
                let names: Vec<_> = changed.iter().map(|p| rel_path(p, &roots)).collect();
                vellum::debug_log!("watch"; "changed: {}", names.join(", "));
                last = rerender(&engine, args, &mut status, last.as_deref());
            }
            Err(RecvTimeoutError::Disconnected) => break,
            // Irrelevant events, timeouts with nothing pending.
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn test_debouncer_skips_temp_files() {
        let mut debouncer = Debouncer::new();
        debouncer.add(event(
            EventKind::Modify(ModifyKind::Any),
            &["/v/page.vt", "/v/.page.vt.swp", "/v/page.vt~"],
        ));
        assert!(!debouncer.ready());
        assert_eq!(debouncer.timeout(), Duration::from_millis(DEBOUNCE_MS));
        assert_eq!(debouncer.take(), vec![PathBuf::from("/v/page.vt")]);
        assert_eq!(debouncer.timeout(), Duration::from_millis(POLL_MS));
    }

    #[test]
    fn test_is_relevant() {
        assert!(is_relevant(&event(EventKind::Create(CreateKind::File), &[])));
        assert!(!is_relevant(&event(EventKind::Access(notify::event::AccessKind::Any), &[])));
    }

    #[test]
    fn test_rel_path() {
        let roots = vec![PathBuf::from("/srv/views"), PathBuf::from("/srv/shared")];
        assert_eq!(rel_path(Path::new("/srv/shared/_layout.vt"), &roots), "_layout.vt");
        assert_eq!(rel_path(Path::new("/elsewhere/x.vt"), &roots), "/elsewhere/x.vt");
    }
}
