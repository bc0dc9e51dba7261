//! The surface a template body renders against.

use super::{Executor, NodeId, NodeState, SectionRenderer};
use crate::bag::ValueBag;
use crate::debug_log;
use crate::error::EngineError;
use crate::vpath::VirtualPath;
use serde_json::Value;

/// Output buffer plus access to the node being executed.
///
/// View-starts, the body and any section bodies pulled in by a layout all
/// write into the same context.
pub struct RenderContext<'a> {
    exec: &'a mut Executor,
    node: NodeId,
    out: String,
    in_view_start: bool,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(exec: &'a mut Executor, node: NodeId) -> Self {
        Self {
            exec,
            node,
            out: String::new(),
            in_view_start: true,
        }
    }

    /// Switch from the view-start chain to the node's own body.
    pub(crate) fn enter_body(&mut self) {
        self.in_view_start = false;
        self.exec.tree.get_mut(self.node).state = NodeState::BodyExecuting;
    }

    pub(crate) fn into_output(self) -> String {
        self.out
    }

    pub fn write(&mut self, text: &str) {
        self.out.push_str(text);
    }

    /// Text written so far.
    pub fn output(&self) -> &str {
        &self.out
    }

    pub fn address(&self) -> &VirtualPath {
        &self.exec.tree.get(self.node).address
    }

    pub fn model(&self) -> &Value {
        &self.exec.tree.get(self.node).model
    }

    pub fn bag(&self) -> Option<&ValueBag> {
        let owner = self.exec.tree.bag_owner(self.node)?;
        self.exec.tree.get(owner).bag.as_ref()
    }

    /// The tree's bag, created at the root on first use.
    pub fn bag_mut(&mut self) -> &mut ValueBag {
        let tree = &mut self.exec.tree;
        let owner = tree.bag_owner(self.node).unwrap_or(0);
        tree.get_mut(owner).bag.get_or_insert_with(ValueBag::new)
    }

    pub fn layout(&self) -> Option<&str> {
        self.exec.tree.get(self.node).layout.as_deref()
    }

    /// Set or clear the layout. The last assignment before the body ends wins.
    pub fn set_layout(&mut self, layout: Option<String>) {
        let node = self.exec.tree.get_mut(self.node);
        node.layout = layout;
        node.layout_from_view_start = self.in_view_start;
    }

    pub fn define_section(&mut self, name: &str, renderer: SectionRenderer) {
        let node = self.exec.tree.get_mut(self.node);
        if node.sections.declare(name, renderer) {
            debug_log!("render"; "section `{name}` redeclared in {}", node.address.display_virtual());
        }
    }

    /// Whether the node this layout wraps declared `name`.
    pub fn is_section_defined(&self, name: &str) -> bool {
        self.exec
            .tree
            .get(self.node)
            .wraps
            .is_some_and(|wrapped| self.exec.tree.get(wrapped).sections.is_defined(name))
    }

    /// Render section `name` of the wrapped node.
    ///
    /// The section runs as the node that declared it: relative paths,
    /// `render_page` children and errors belong to that node, while the text
    /// lands in this layout's output. Returns whether the section existed. A
    /// missing section is an error only when `required`.
    pub fn render_section(&mut self, name: &str, required: bool) -> Result<bool, EngineError> {
        let wrapped = self.exec.tree.get(self.node).wraps;
        let renderer = wrapped.and_then(|id| self.exec.tree.get(id).sections.get(name));

        match (renderer, wrapped) {
            (Some(renderer), Some(declarer)) => {
                let layout = std::mem::replace(&mut self.node, declarer);
                let in_view_start = std::mem::replace(&mut self.in_view_start, false);
                let result = renderer(&mut *self);
                self.node = layout;
                self.in_view_start = in_view_start;
                result.map(|()| true)
            }
            _ if required => Err(EngineError::SectionNotFound {
                name: name.to_string(),
                address: self
                    .exec
                    .tree
                    .get(wrapped.unwrap_or(self.node))
                    .address
                    .display_virtual(),
            }),
            _ => Ok(false),
        }
    }

    /// Write the wrapped node's output. Only layouts have a body.
    pub fn render_body(&mut self) -> Result<(), EngineError> {
        match &self.exec.tree.get(self.node).body {
            Some(body) => {
                self.out.push_str(body);
                Ok(())
            }
            None => Err(self.fail("the body can only be rendered by a layout")),
        }
    }

    /// Execute `path` (relative to this node's directory) as a child node
    /// and write its text here.
    pub fn render_page(&mut self, path: &str, skip_layout: bool) -> Result<(), EngineError> {
        let text = self.exec.render_page(self.node, path, skip_layout)?;
        self.write(&text);
        Ok(())
    }

    /// `path` resolved against this node's directory and the application root.
    pub fn resolve_href(&self, path: &str) -> Result<String, EngineError> {
        let mut resolved = self.exec.tree.get(self.node).directory().join(path);
        resolved.normalize()?;
        Ok(resolved.to_string())
    }

    /// A render error attributed to the current node.
    pub fn fail(&self, message: impl Into<String>) -> EngineError {
        EngineError::Render {
            address: self.address().display_virtual(),
            message: message.into(),
        }
    }
}
