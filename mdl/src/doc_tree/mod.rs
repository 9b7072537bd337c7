//! The semantic document tree.
//!
//! Nodes live in an arena owned by [`DocTree`] and refer to each other by
//! [`NodeId`]. Open footnotes in the converter hold ids, so "fill in later"
//! is a lookup into the arena rather than a mutable back-reference.

pub mod dump;
pub mod visit;

use std::fmt;

use crate::source::SourceLocation;

pub use visit::{Segment, StackVisitor, Transform, Transformed, Visitor};

/// Index of a node inside its [`DocTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockClass {
    Quote,
    Blurb,
    Aside,
    Promote,
    Custom,
}

impl BlockClass {
    pub fn name(self) -> &'static str {
        match self {
            BlockClass::Quote => "quote",
            BlockClass::Blurb => "blurb",
            BlockClass::Aside => "aside",
            BlockClass::Promote => "promote",
            BlockClass::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineFeature {
    None,
    Bold,
    Italic,
    Code,
    Header,
    Latex,
}

impl InlineFeature {
    pub fn name(self) -> &'static str {
        match self {
            InlineFeature::None => "none",
            InlineFeature::Bold => "bold",
            InlineFeature::Italic => "italic",
            InlineFeature::Code => "code",
            InlineFeature::Header => "header",
            InlineFeature::Latex => "latex",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedClass {
    Image,
    Abstract,
    Document,
}

impl EmbedClass {
    pub fn name(self) -> &'static str {
        match self {
            EmbedClass::Image => "image",
            EmbedClass::Abstract => "abstract",
            EmbedClass::Document => "document",
        }
    }

    /// The embed named by a `{% name ... }` tag, if any.
    pub fn from_tag(name: &str) -> Option<Self> {
        match name {
            "image" => Some(EmbedClass::Image),
            "abstract" => Some(EmbedClass::Abstract),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkClass {
    MinorSeparator,
}

impl MarkClass {
    pub fn name(self) -> &'static str {
        match self {
            MarkClass::MinorSeparator => "minor-separator",
        }
    }
}

/// Where a link points: a literal URL or a footnote defined elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    Url(String),
    Note(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    RootSection,
    Section { level: usize },
    Block { class: BlockClass, args: Vec<String> },
    Paragraph,
    Inline { feature: InlineFeature },
    Text { text: String },
    Link { target: LinkTarget, title: Option<String> },
    List,
    ListItem,
    Note { key: String },
    NoteDefn { key: String },
    Code { text: String, class: String },
    Embed { class: EmbedClass, url: String, alt: String },
    BlockMark { class: MarkClass },
    Token { args: Vec<String> },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::RootSection => "RootSection",
            NodeKind::Section { .. } => "Section",
            NodeKind::Block { .. } => "Block",
            NodeKind::Paragraph => "Paragraph",
            NodeKind::Inline { .. } => "Inline",
            NodeKind::Text { .. } => "Text",
            NodeKind::Link { .. } => "Link",
            NodeKind::List => "List",
            NodeKind::ListItem => "ListItem",
            NodeKind::Note { .. } => "Note",
            NodeKind::NoteDefn { .. } => "NoteDefn",
            NodeKind::Code { .. } => "Code",
            NodeKind::Embed { .. } => "Embed",
            NodeKind::BlockMark { .. } => "BlockMark",
            NodeKind::Token { .. } => "Token",
        }
    }

    /// Nodes that sit in a block sequence.
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            NodeKind::Section { .. }
                | NodeKind::Block { .. }
                | NodeKind::Paragraph
                | NodeKind::List
                | NodeKind::NoteDefn { .. }
                | NodeKind::Code { .. }
                | NodeKind::Embed { .. }
                | NodeKind::BlockMark { .. }
        )
    }

    /// Nodes that sit in a run of paragraph elements.
    pub fn is_element(&self) -> bool {
        matches!(
            self,
            NodeKind::Inline { .. }
                | NodeKind::Text { .. }
                | NodeKind::Link { .. }
                | NodeKind::Note { .. }
                | NodeKind::Token { .. }
        )
    }

    /// Whether `child` may be placed in `segment` of a node of this kind.
    pub fn accepts(&self, segment: Segment, child: &NodeKind) -> bool {
        match segment {
            Segment::Title => matches!(self, NodeKind::Section { .. }) && child.is_element(),
            Segment::Body => match self {
                NodeKind::RootSection
                | NodeKind::Section { .. }
                | NodeKind::Block { .. }
                | NodeKind::ListItem => child.is_block(),
                NodeKind::Paragraph
                | NodeKind::Inline { .. }
                | NodeKind::Link { .. }
                | NodeKind::Note { .. }
                | NodeKind::NoteDefn { .. } => child.is_element(),
                NodeKind::List => matches!(child, NodeKind::ListItem),
                NodeKind::Text { .. }
                | NodeKind::Code { .. }
                | NodeKind::Embed { .. }
                | NodeKind::BlockMark { .. }
                | NodeKind::Token { .. } => false,
            },
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocNode {
    pub kind: NodeKind,
    pub location: Option<SourceLocation>,
    parent: Option<NodeId>,
    title: Vec<NodeId>,
    children: Vec<NodeId>,
}

impl DocNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// The title run; only sections have one.
    pub fn title(&self) -> &[NodeId] {
        &self.title
    }

    pub fn segment(&self, segment: Segment) -> &[NodeId] {
        match segment {
            Segment::Body => &self.children,
            Segment::Title => &self.title,
        }
    }
}

/// A document tree: an arena of nodes, the root section, and the root's
/// note table (footnote definitions reached through link targets).
#[derive(Debug, Clone, PartialEq)]
pub struct DocTree {
    nodes: Vec<DocNode>,
    root: NodeId,
    notes: Vec<NodeId>,
}

impl Default for DocTree {
    fn default() -> Self {
        DocTree::new(None)
    }
}

impl DocTree {
    pub fn new(location: Option<SourceLocation>) -> Self {
        let mut tree = DocTree {
            nodes: Vec::new(),
            root: NodeId(0),
            notes: Vec::new(),
        };
        tree.root = tree.add(NodeKind::RootSection, location);
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of arena slots, detached nodes included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the root section has no content.
    pub fn is_empty(&self) -> bool {
        self.node(self.root).children.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &DocNode {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.0].kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].children.last().copied()
    }

    /// Footnote definitions in the order they were resolved.
    pub fn notes(&self) -> &[NodeId] {
        &self.notes
    }

    /// Create a detached node.
    pub fn add(&mut self, kind: NodeKind, location: Option<SourceLocation>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(DocNode {
            kind,
            location,
            parent: None,
            title: Vec::new(),
            children: Vec::new(),
        });
        id
    }

    /// Attach a detached node as the last child of `parent`.
    ///
    /// # Panics
    ///
    /// When the child is already attached or the nesting is illegal.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.append_in(parent, Segment::Body, child);
    }

    pub fn append_in(&mut self, parent: NodeId, segment: Segment, child: NodeId) {
        assert!(self.nodes[child.0].parent.is_none(), "node is already attached");
        assert!(
            self.kind(parent).accepts(segment, self.kind(child)),
            "{} node cannot contain {} node in {:?}",
            self.kind(parent),
            self.kind(child),
            segment
        );
        self.nodes[child.0].parent = Some(parent);
        match segment {
            Segment::Body => self.nodes[parent.0].children.push(child),
            Segment::Title => self.nodes[parent.0].title.push(child),
        }
    }

    /// Create a node and attach it in one step.
    pub fn push(&mut self, parent: NodeId, kind: NodeKind, location: Option<SourceLocation>) -> NodeId {
        self.push_in(parent, Segment::Body, kind, location)
    }

    pub fn push_in(
        &mut self,
        parent: NodeId,
        segment: Segment,
        kind: NodeKind,
        location: Option<SourceLocation>,
    ) -> NodeId {
        let id = self.add(kind, location);
        self.append_in(parent, segment, id);
        id
    }

    /// Append text, extending a trailing `Text` node instead of adding a new one.
    pub fn push_text(
        &mut self,
        parent: NodeId,
        segment: Segment,
        text: &str,
        location: Option<SourceLocation>,
    ) -> NodeId {
        if let Some(&last) = self.nodes[parent.0].segment(segment).last() {
            if let NodeKind::Text { text: existing } = &mut self.nodes[last.0].kind {
                existing.push_str(text);
                return last;
            }
        }
        self.push_in(
            parent,
            segment,
            NodeKind::Text {
                text: text.to_string(),
            },
            location,
        )
    }

    /// Record a resolved footnote definition in the root's note table.
    pub fn add_note(&mut self, defn: NodeId) {
        assert!(
            matches!(self.kind(defn), NodeKind::NoteDefn { .. }),
            "note table only holds NoteDefn nodes"
        );
        self.notes.push(defn);
    }

    /// Put the detached node `new` where `old` is; `old` becomes detached.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        assert!(self.nodes[new.0].parent.is_none(), "replacement is already attached");
        let Some(parent) = self.nodes[old.0].parent.take() else {
            assert!(old == self.root, "cannot replace a detached node");
            assert!(
                matches!(self.kind(new), NodeKind::RootSection),
                "root can only be replaced by a RootSection"
            );
            self.root = new;
            return;
        };

        let segment = if self.nodes[parent.0].title.contains(&old) {
            Segment::Title
        } else {
            Segment::Body
        };
        assert!(
            self.kind(parent).accepts(segment, self.kind(new)),
            "{} node cannot contain {} node in {:?}",
            self.kind(parent),
            self.kind(new),
            segment
        );
        let slots = match segment {
            Segment::Body => &mut self.nodes[parent.0].children,
            Segment::Title => &mut self.nodes[parent.0].title,
        };
        if let Some(slot) = slots.iter_mut().find(|slot| **slot == old) {
            *slot = new;
        }
        self.nodes[new.0].parent = Some(parent);
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p))
    }

    /// Concatenated text of every `Text` node under `id`.
    pub fn plain_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        if let NodeKind::Text { text } = self.kind(id) {
            out.push_str(text);
        }
        let node = self.node(id);
        for &child in node.title.iter().chain(node.children.iter()) {
            self.collect_text(child, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> NodeKind {
        NodeKind::Text { text: s.to_string() }
    }

    #[test]
    fn builds_sections_with_titles() {
        let mut tree = DocTree::default();
        let root = tree.root();
        let section = tree.push(root, NodeKind::Section { level: 1 }, None);
        tree.push_text(section, Segment::Title, "Title", None);
        let para = tree.push(section, NodeKind::Paragraph, None);
        tree.push_text(para, Segment::Body, "body", None);

        assert_eq!(tree.children(root), &[section]);
        assert_eq!(tree.node(section).title().len(), 1);
        assert_eq!(tree.parent(para), Some(section));
        assert_eq!(tree.plain_text(section), "Titlebody");
    }

    #[test]
    fn text_is_coalesced() {
        let mut tree = DocTree::default();
        let para = tree.push(tree.root(), NodeKind::Paragraph, None);
        let a = tree.push_text(para, Segment::Body, "a", None);
        let b = tree.push_text(para, Segment::Body, "b", None);
        assert_eq!(a, b);
        assert_eq!(tree.kind(a), &text("ab"));
    }

    #[test]
    #[should_panic(expected = "Paragraph node cannot contain Paragraph node")]
    fn paragraphs_hold_only_elements() {
        let mut tree = DocTree::default();
        let para = tree.push(tree.root(), NodeKind::Paragraph, None);
        tree.push(para, NodeKind::Paragraph, None);
    }

    #[test]
    #[should_panic(expected = "List node cannot contain Paragraph node")]
    fn lists_hold_only_items() {
        let mut tree = DocTree::default();
        let list = tree.push(tree.root(), NodeKind::List, None);
        tree.push(list, NodeKind::Paragraph, None);
    }

    #[test]
    #[should_panic(expected = "in Title")]
    fn only_sections_have_titles() {
        let mut tree = DocTree::default();
        let para = tree.push(tree.root(), NodeKind::Paragraph, None);
        tree.push_in(para, Segment::Title, text("x"), None);
    }

    #[test]
    fn replace_swaps_in_place() {
        let mut tree = DocTree::default();
        let root = tree.root();
        let first = tree.push(root, NodeKind::Paragraph, None);
        let second = tree.push(root, NodeKind::Paragraph, None);
        let code = tree.add(
            NodeKind::Code {
                text: "x".into(),
                class: String::new(),
            },
            None,
        );

        tree.replace(first, code);

        assert_eq!(tree.children(root), &[code, second]);
        assert_eq!(tree.parent(code), Some(root));
        assert_eq!(tree.parent(first), None);
    }

    #[test]
    fn ancestors_walk_to_the_root() {
        let mut tree = DocTree::default();
        let list = tree.push(tree.root(), NodeKind::List, None);
        let item = tree.push(list, NodeKind::ListItem, None);
        let para = tree.push(item, NodeKind::Paragraph, None);
        let found: Vec<NodeId> = tree.ancestors(para).collect();
        assert_eq!(found, vec![item, list, tree.root()]);
    }
}
