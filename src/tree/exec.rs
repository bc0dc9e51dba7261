//! Tree construction and execution.
//!
//! Everything runs depth first on the calling thread: view-starts, then the
//! body (with any `render_page` children), then the layout. A stack of the
//! addresses currently executing catches layout and page cycles.

use super::{ExecutedTemplate, NodeId, NodeState, RenderContext, TemplateNode, TemplateTree};
use crate::bag::ValueBag;
use crate::cache::{CompileOptions, CompiledTemplate, TemplateCache};
use crate::compiler::ModelRequirement;
use crate::config::{ConfigError, EngineConfig};
use crate::content::{ContentLookup, ResolvedContent};
use crate::debug_log;
use crate::error::{EngineError, RenderFailure};
use crate::vpath::VirtualPath;
use serde_json::Value;
use std::sync::Arc;

/// Engine state a render call reads. Cheap to clone.
#[derive(Clone)]
pub(crate) struct Runtime {
    pub config: Arc<EngineConfig>,
    pub lookup: Arc<ContentLookup>,
    pub cache: Arc<TemplateCache>,
    pub shared: VirtualPath,
}

impl Runtime {
    pub fn new(
        config: Arc<EngineConfig>,
        lookup: Arc<ContentLookup>,
        cache: Arc<TemplateCache>,
    ) -> Result<Self, ConfigError> {
        let shared = config.shared_location()?;
        Ok(Self {
            config,
            lookup,
            cache,
            shared,
        })
    }

    pub fn extension(&self) -> &str {
        &self.config.templates.default_extension
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            profile: self.config.templates.language,
            hint: ModelRequirement::Dynamic,
            include_generated_source: self.config.templates.include_generated_source,
        }
    }

    pub fn compile(&self, hit: &ResolvedContent) -> Result<Arc<CompiledTemplate>, EngineError> {
        self.cache.get_or_create(hit, self.compile_options())
    }
}

/// Options for the root node of a render call.
#[derive(Debug, Default)]
pub(crate) struct RootOptions {
    pub model: Value,
    pub bag: Option<ValueBag>,
    pub skip_layout: bool,
}

pub(crate) struct Executor {
    pub(super) rt: Runtime,
    pub(super) tree: TemplateTree,
    /// `(key, display)` of every template currently executing, outermost first.
    active: Vec<(String, String)>,
}

impl Executor {
    pub fn new(rt: Runtime) -> Self {
        Self {
            rt,
            tree: TemplateTree::default(),
            active: Vec::new(),
        }
    }

    /// Execute `hit` as the root of a new tree.
    pub fn execute_root(
        mut self,
        hit: ResolvedContent,
        options: RootOptions,
    ) -> Result<ExecutedTemplate, RenderFailure> {
        let mut root = TemplateNode::new(hit.address.clone(), Arc::new(options.model), None);
        root.bag = options.bag;
        root.skip_layout = options.skip_layout;
        let id = self.tree.push(root);

        match self.run(id, hit) {
            Ok(()) => Ok(ExecutedTemplate::new(self.tree)),
            Err(error) => {
                let address = self
                    .tree
                    .failed_node()
                    .map_or_else(String::new, |node| node.virtual_path().display_virtual());
                Err(RenderFailure::new(address, error).with_tree(self.tree))
            }
        }
    }

    /// Execute node `id` from `hit`, tracking it on the active stack.
    fn run(&mut self, id: NodeId, hit: ResolvedContent) -> Result<(), EngineError> {
        self.active
            .push((hit.address.key(), hit.address.display_virtual()));
        let result = self.execute(id, &hit);
        self.active.pop();
        if result.is_err() {
            self.tree.fail(id);
        }
        result
    }

    fn execute(&mut self, id: NodeId, hit: &ResolvedContent) -> Result<(), EngineError> {
        let config = Arc::clone(&self.rt.config);
        let extension = config.templates.default_extension.as_str();
        let own_key = hit.address.key();

        let template = self.rt.compile(hit)?;
        let node = self.tree.get_mut(id);
        node.generated_source = template.generated_source().map(str::to_string);
        let requirement = template.model_requirement();
        if !requirement.accepts(&node.model) {
            return Err(EngineError::Render {
                address: hit.address.display_virtual(),
                message: format!("model must be {requirement}, got {}", kind(&node.model)),
            });
        }

        let dir = node.directory();
        let view_starts = self
            .rt
            .lookup
            .view_start_chain(&dir, &config.templates.view_start, extension)?
            .into_iter()
            .filter(|start| start.address.key() != own_key)
            .map(|start| {
                debug_log!("render"; "view-start {} for {}", start.address.display_virtual(), hit.address.display_virtual());
                self.rt.compile(&start)
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.tree.get_mut(id).state = NodeState::ViewStartChainResolved;

        let output = {
            let mut ctx = RenderContext::new(self, id);
            for start in &view_starts {
                start.factory().instantiate().render(&mut ctx)?;
            }
            ctx.enter_body();
            template.factory().instantiate().render(&mut ctx)?;
            ctx.into_output()
        };

        let node = self.tree.get_mut(id);
        node.output = output;
        node.state = NodeState::BodyExecuted;
        let layout = if node.skip_layout {
            None
        } else {
            node.layout.clone()
        };
        let Some(name) = layout else {
            self.complete_without_layout(id);
            return Ok(());
        };
        node.state = NodeState::LayoutResolving;
        let from_view_start = node.layout_from_view_start;

        let layout_hit = self
            .rt
            .lookup
            .find_nearest(&name, &dir, &self.rt.shared, extension, true)?
            .ok_or_else(|| EngineError::not_found(name.as_str(), Vec::new()))?;
        let layout_key = layout_hit.address.key();

        if layout_key == own_key || (from_view_start && self.is_active(&layout_key)) {
            debug_log!("render"; "ignoring layout `{name}` for {}", hit.address.display_virtual());
            self.complete_without_layout(id);
            return Ok(());
        }
        if self.is_active(&layout_key) {
            return Err(self.recursion(&layout_hit.address));
        }
        debug_log!("render"; "{} uses layout {}", hit.address.display_virtual(), layout_hit.address.display_virtual());

        let node = self.tree.get(id);
        let mut layout = TemplateNode::new(
            layout_hit.address.clone(),
            Arc::clone(&node.model),
            Some(id),
        );
        layout.wraps = Some(id);
        layout.body = Some(node.output.clone());
        let child = self.tree.push(layout);

        self.tree.get_mut(id).state = NodeState::LayoutExecuting;
        self.run(child, layout_hit)?;

        let result = self.tree.get(child).result.clone();
        let node = self.tree.get_mut(id);
        node.result = result;
        node.state = NodeState::Completed;
        Ok(())
    }

    fn complete_without_layout(&mut self, id: NodeId) {
        let node = self.tree.get_mut(id);
        node.result = Some(node.output.clone());
        node.state = NodeState::Completed;
    }

    /// Resolve `path` against the caller's directory and execute it as a
    /// child of `caller`. Returns the child's final text.
    pub(super) fn render_page(
        &mut self,
        caller: NodeId,
        path: &str,
        skip_layout: bool,
    ) -> Result<String, EngineError> {
        let caller_node = self.tree.get(caller);
        let target = caller_node.directory().join(path);
        let hit = self.rt.lookup.require(&target, self.rt.extension())?;
        if self.is_active(&hit.address.key()) {
            return Err(self.recursion(&hit.address));
        }

        let mut child = TemplateNode::new(
            hit.address.clone(),
            Arc::clone(&caller_node.model),
            Some(caller),
        );
        child.skip_layout = skip_layout;
        let child = self.tree.push(child);
        self.run(child, hit)?;
        Ok(self.tree.get(child).result.clone().unwrap_or_default())
    }

    fn is_active(&self, key: &str) -> bool {
        self.active.iter().any(|(active, _)| active == key)
    }

    fn recursion(&self, next: &VirtualPath) -> EngineError {
        let chain = self
            .active
            .iter()
            .map(|(_, display)| display.clone())
            .chain(std::iter::once(next.display_virtual()))
            .collect();
        EngineError::TemplateTreeRecursion { chain }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::BuiltinCompiler;
    use serde_json::json;

    fn runtime() -> Runtime {
        let config = Arc::new(EngineConfig::default());
        let lookup = Arc::new(ContentLookup::new());
        let cache = Arc::new(TemplateCache::new(Arc::new(BuiltinCompiler)));
        Runtime::new(config, lookup, cache).unwrap()
    }

    fn register(rt: &Runtime, path: &str, text: &str) {
        rt.lookup
            .inline()
            .register(&VirtualPath::parse("/", path), text)
            .unwrap();
    }

    fn execute(rt: &Runtime, path: &str, model: Value) -> Result<ExecutedTemplate, RenderFailure> {
        let hit = rt
            .lookup
            .require(&VirtualPath::parse("/", path), rt.extension())
            .unwrap();
        Executor::new(rt.clone()).execute_root(
            hit,
            RootOptions {
                model,
                ..RootOptions::default()
            },
        )
    }

    #[test]
    fn test_body_then_layout() {
        let rt = runtime();
        register(&rt, "~/Shared/_layout", "[{body}]");
        register(&rt, "~/page", "{@layout _layout}Hi {name}");
        let executed = execute(&rt, "~/page", json!({"name": "Ann"})).unwrap();
        assert_eq!(executed.result(), "[Hi Ann]");

        let root = executed.tree().root().unwrap();
        assert_eq!(root.output(), "Hi Ann");
        assert_eq!(root.state(), NodeState::Completed);
        let layout = root.layout().unwrap();
        assert_eq!(layout.virtual_path().display_virtual(), "~/Shared/_layout");
        assert_eq!(layout.state(), NodeState::Completed);
    }

    #[test]
    fn test_view_start_runs_before_body_and_body_overrides_layout() {
        let rt = runtime();
        register(&rt, "~/_ViewStart", "{@layout _a}");
        register(&rt, "~/Shared/_a", "A({body})");
        register(&rt, "~/Shared/_b", "B({body})");
        register(&rt, "~/page", "{@layout _b}x");
        register(&rt, "~/other", "y");

        // Layouts run the view-start as well, so `_b` is wrapped in `_a`.
        assert_eq!(execute(&rt, "~/page", Value::Null).unwrap().result(), "A(B(x))");
        // `_a` naming itself is ignored.
        assert_eq!(execute(&rt, "~/other", Value::Null).unwrap().result(), "A(y)");
    }

    #[test]
    fn test_layout_cycle_is_reported() {
        let rt = runtime();
        register(&rt, "~/Shared/_one", "{@layout _two}1{body}");
        register(&rt, "~/Shared/_two", "{@layout _one}2{body}");
        register(&rt, "~/page", "{@layout _one}p");

        let failure = execute(&rt, "~/page", Value::Null).unwrap_err();
        match failure.error() {
            EngineError::TemplateTreeRecursion { chain } => {
                assert_eq!(
                    chain,
                    &vec!["~/page", "~/Shared/_one", "~/Shared/_two", "~/Shared/_one"]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
        let tree = failure.tree().unwrap();
        assert_eq!(tree.root().unwrap().state(), NodeState::Failed);
        assert_eq!(failure.address, "~/Shared/_two");
    }

    #[test]
    fn test_render_page_inherits_model_and_detects_cycles() {
        let rt = runtime();
        register(&rt, "~/parts/item", "<{name}>");
        register(&rt, "~/parts/list", "{@render_page item}{@render_page item}");
        let executed = execute(&rt, "~/parts/list", json!({"name": "n"})).unwrap();
        assert_eq!(executed.result(), "<n><n>");
        assert_eq!(executed.children().count(), 2);

        register(&rt, "~/loop", "{@render_page loop}");
        let failure = execute(&rt, "~/loop", Value::Null).unwrap_err();
        assert!(matches!(failure.error(), EngineError::TemplateTreeRecursion { .. }));
    }

    #[test]
    fn test_model_requirement_checked() {
        let rt = runtime();
        register(&rt, "~/typed", "{@model object}{a}");
        let failure = execute(&rt, "~/typed", json!([1])).unwrap_err();
        match failure.error() {
            EngineError::Render { message, .. } => {
                assert_eq!(message, "model must be object, got array")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_skip_layout() {
        let rt = runtime();
        register(&rt, "~/Shared/_layout", "[{body}]");
        register(&rt, "~/page", "{@layout _layout}p");
        let hit = rt.lookup.require(&VirtualPath::parse("/", "~/page"), ".vt").unwrap();
        let executed = Executor::new(rt.clone())
            .execute_root(
                hit,
                RootOptions {
                    skip_layout: true,
                    ..RootOptions::default()
                },
            )
            .unwrap();
        assert_eq!(executed.result(), "p");
        assert_eq!(executed.tree().len(), 1);
    }
}
