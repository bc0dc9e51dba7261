//! Template trees: the nodes produced by one render call.
//!
//! A tree is an arena of [`TemplateNode`]s. Parent links and the
//! layout-to-wrapped link are indices into the arena, so the tree owns every
//! node exactly once.
//!
//! ```text
//!   #0 ~/home.vt                      root (owns the value bag)
//!    ├── #1 ~/partials/menu.vt        {@render_page}, runs during #0's body
//!    └── #2 ~/Shared/_Layout.vt       layout of #0, always the last child
//!         └── #3 ~/Shared/_Outer.vt   layout of #2
//! ```
//!
//! Each node moves through [`NodeState`]:
//!
//! ```text
//! Created → ViewStartChainResolved → BodyExecuting → BodyExecuted
//!         → LayoutResolving → LayoutExecuting → Completed
//!                (any non-terminal state) → Failed
//! ```
//!
//! The text of a node is the text of its outermost layout, or its own output
//! when it has none.

mod context;
mod exec;
mod sections;

pub use context::RenderContext;
pub use sections::{SectionRegistry, SectionRenderer};

pub(crate) use exec::{Executor, RootOptions, Runtime};

use crate::bag::ValueBag;
use crate::vpath::VirtualPath;
use serde_json::Value;
use std::{fmt, sync::Arc};

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Created,
    ViewStartChainResolved,
    BodyExecuting,
    BodyExecuted,
    LayoutResolving,
    LayoutExecuting,
    Completed,
    Failed,
}

impl NodeState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::ViewStartChainResolved => "view-start resolved",
            Self::BodyExecuting => "body executing",
            Self::BodyExecuted => "body executed",
            Self::LayoutResolving => "layout resolving",
            Self::LayoutExecuting => "layout executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One executed template instance.
#[derive(Debug)]
pub struct TemplateNode {
    pub(crate) address: VirtualPath,
    pub(crate) model: Arc<Value>,
    /// Only the node that owns the bag has one; the others reach it through
    /// their parents.
    pub(crate) bag: Option<ValueBag>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    /// For a layout node: the node it wraps.
    pub(crate) wraps: Option<NodeId>,
    pub(crate) sections: SectionRegistry,
    pub(crate) layout: Option<String>,
    pub(crate) layout_from_view_start: bool,
    /// For a layout node: the rendered output of the wrapped node.
    pub(crate) body: Option<String>,
    pub(crate) output: String,
    pub(crate) result: Option<String>,
    pub(crate) generated_source: Option<String>,
    pub(crate) state: NodeState,
    pub(crate) skip_layout: bool,
}

impl TemplateNode {
    pub(crate) fn new(address: VirtualPath, model: Arc<Value>, parent: Option<NodeId>) -> Self {
        Self {
            address,
            model,
            bag: None,
            parent,
            children: Vec::new(),
            wraps: None,
            sections: SectionRegistry::default(),
            layout: None,
            layout_from_view_start: false,
            body: None,
            output: String::new(),
            result: None,
            generated_source: None,
            state: NodeState::Created,
            skip_layout: false,
        }
    }

    /// Directory the node's address lives in.
    pub(crate) fn directory(&self) -> VirtualPath {
        self.address
            .parent()
            .unwrap_or_else(|| self.address.sibling("~/"))
    }
}

#[derive(Debug, Default)]
pub struct TemplateTree {
    nodes: Vec<TemplateNode>,
    failed: Option<NodeId>,
}

impl TemplateTree {
    pub(crate) fn push(&mut self, node: TemplateNode) -> NodeId {
        let id = self.nodes.len();
        if let Some(parent) = node.parent {
            self.nodes[parent].children.push(id);
        }
        self.nodes.push(node);
        id
    }

    pub(crate) fn get(&self, id: NodeId) -> &TemplateNode {
        &self.nodes[id]
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut TemplateNode {
        &mut self.nodes[id]
    }

    /// The node that owns the bag visible from `id`, if any owns one yet.
    pub(crate) fn bag_owner(&self, id: NodeId) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if self.nodes[node].bag.is_some() {
                return Some(node);
            }
            current = self.nodes[node].parent;
        }
        None
    }

    /// Mark `id` failed, remembering the first failure.
    pub(crate) fn fail(&mut self, id: NodeId) {
        self.nodes[id].state = NodeState::Failed;
        self.failed.get_or_insert(id);
    }

    pub fn root(&self) -> Option<NodeRef<'_>> {
        self.node(0)
    }

    pub fn node(&self, id: NodeId) -> Option<NodeRef<'_>> {
        (id < self.nodes.len()).then_some(NodeRef { tree: self, id })
    }

    /// The node where execution first failed.
    pub fn failed_node(&self) -> Option<NodeRef<'_>> {
        self.failed.and_then(|id| self.node(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeRef<'_>> {
        (0..self.nodes.len()).map(|id| NodeRef { tree: self, id })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Indented outline, one node per line.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        if let Some(root) = self.root() {
            outline_node(root, 0, &mut out);
        }
        out
    }
}

fn outline_node(node: NodeRef<'_>, depth: usize, out: &mut String) {
    use std::fmt::Write;

    let marker = if node.is_layout() { " (layout)" } else { "" };
    let _ = writeln!(
        out,
        "{}{}{marker} [{}]",
        "  ".repeat(depth),
        node.virtual_path().display_virtual(),
        node.state()
    );
    for child in node.children() {
        outline_node(child, depth + 1, out);
    }
}

/// Read-only view of a node.
#[derive(Clone, Copy)]
pub struct NodeRef<'t> {
    tree: &'t TemplateTree,
    id: NodeId,
}

impl<'t> NodeRef<'t> {
    fn node(&self) -> &'t TemplateNode {
        &self.tree.nodes[self.id]
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn virtual_path(&self) -> &'t VirtualPath {
        &self.node().address
    }

    pub fn model(&self) -> &'t Value {
        &self.node().model
    }

    pub fn state(&self) -> NodeState {
        self.node().state
    }

    /// The node's own output, before any layout wrapped it.
    pub fn output(&self) -> &'t str {
        &self.node().output
    }

    /// Final text, including layouts. `None` until the node completed.
    pub fn result(&self) -> Option<&'t str> {
        self.node().result.as_deref()
    }

    /// The layout name in effect when the body finished.
    pub fn layout_name(&self) -> Option<&'t str> {
        self.node().layout.as_deref()
    }

    pub fn is_layout(&self) -> bool {
        self.node().wraps.is_some()
    }

    pub fn sections(&self) -> &'t SectionRegistry {
        &self.node().sections
    }

    pub fn generated_source(&self) -> Option<&'t str> {
        self.node().generated_source.as_deref()
    }

    /// The bag this node reads and writes.
    pub fn bag(&self) -> Option<&'t ValueBag> {
        let owner = self.tree.bag_owner(self.id)?;
        self.tree.nodes[owner].bag.as_ref()
    }

    pub fn parent(&self) -> Option<NodeRef<'t>> {
        self.node().parent.and_then(|id| self.tree.node(id))
    }

    /// Children in creation order; a layout is always last.
    pub fn children(self) -> impl Iterator<Item = NodeRef<'t>> + 't {
        let tree = self.tree;
        tree.nodes[self.id]
            .children
            .iter()
            .map(move |&id| NodeRef { tree, id })
    }

    pub fn layout(&self) -> Option<NodeRef<'t>> {
        self.children().last().filter(NodeRef::is_layout)
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("address", &self.virtual_path().to_string())
            .field("state", &self.state())
            .finish()
    }
}

/// A successfully rendered tree.
#[derive(Debug)]
pub struct ExecutedTemplate {
    tree: TemplateTree,
}

impl ExecutedTemplate {
    pub(crate) fn new(tree: TemplateTree) -> Self {
        Self { tree }
    }

    fn root(&self) -> &TemplateNode {
        &self.tree.nodes[0]
    }

    /// The rendered text.
    pub fn result(&self) -> &str {
        self.root().result.as_deref().unwrap_or_default()
    }

    pub fn virtual_path(&self) -> &VirtualPath {
        &self.root().address
    }

    /// The shared bag, if anything created or supplied one.
    pub fn bag(&self) -> Option<&ValueBag> {
        self.root().bag.as_ref()
    }

    pub fn into_bag(self) -> ValueBag {
        self.tree
            .nodes
            .into_iter()
            .next()
            .and_then(|root| root.bag)
            .unwrap_or_default()
    }

    /// Children of the root node.
    pub fn children(&self) -> impl Iterator<Item = NodeRef<'_>> {
        self.tree.root().into_iter().flat_map(|root| root.children())
    }

    pub fn generated_source(&self) -> Option<&str> {
        self.root().generated_source.as_deref()
    }

    pub fn tree(&self) -> &TemplateTree {
        &self.tree
    }

    pub fn into_tree(self) -> TemplateTree {
        self.tree
    }
}

impl fmt::Display for ExecutedTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.result())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(path: &str, parent: Option<NodeId>) -> TemplateNode {
        let mut address = VirtualPath::parse("/", path);
        address.normalize().unwrap();
        TemplateNode::new(address, Arc::new(Value::Null), parent)
    }

    fn sample() -> TemplateTree {
        let mut tree = TemplateTree::default();
        let root = tree.push(node("~/home.vt", None));
        tree.push(node("~/partials/menu.vt", Some(root)));
        let mut layout = node("~/Shared/_Layout.vt", Some(root));
        layout.wraps = Some(root);
        tree.push(layout);
        tree
    }

    #[test]
    fn test_push_links_children() {
        let tree = sample();
        let root = tree.root().unwrap();
        let children: Vec<_> = root.children().map(|c| c.virtual_path().to_string()).collect();
        assert_eq!(children, vec!["/partials/menu.vt", "/Shared/_Layout.vt"]);
        assert!(root.layout().is_some_and(|l| l.is_layout()));
        assert_eq!(tree.node(1).unwrap().parent().unwrap().id(), 0);
        assert!(tree.node(9).is_none());
    }

    #[test]
    fn test_bag_owner_walks_parents() {
        let mut tree = sample();
        assert_eq!(tree.bag_owner(1), None);
        tree.get_mut(0).bag = Some(ValueBag::new());
        assert_eq!(tree.bag_owner(1), Some(0));
        assert_eq!(tree.bag_owner(2), Some(0));
        assert!(tree.node(2).unwrap().bag().is_some());
    }

    #[test]
    fn test_failed_node_keeps_first() {
        let mut tree = sample();
        tree.fail(1);
        tree.fail(0);
        assert_eq!(tree.failed_node().map(|n| n.id()), Some(1));
        assert_eq!(tree.get(0).state, NodeState::Failed);
    }

    #[test]
    fn test_outline() {
        let mut tree = sample();
        tree.get_mut(0).state = NodeState::Completed;
        let outline = tree.outline();
        let lines: Vec<_> = outline.lines().collect();
        assert_eq!(lines[0], "~/home.vt [completed]");
        assert_eq!(lines[1], "  ~/partials/menu.vt [created]");
        assert_eq!(lines[2], "  ~/Shared/_Layout.vt (layout) [created]");
    }

    #[test]
    fn test_directory() {
        assert_eq!(node("~/a/b.vt", None).directory().to_string(), "/a");
        assert!(node("~/b.vt", None).directory().is_application_root());
    }
}
