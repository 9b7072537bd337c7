//! The raw parse tree produced directly from MDL text.
//!
//! Nodes are deliberately loose: a `class` string carries the syntax that
//! produced them (`#`, `-`, `>`, `^`, `*`, `[`, ...) and semantic meaning is
//! assigned later by the converter.

pub mod dump;

use std::fmt;

use crate::source::SourceLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// May contain blocks, raw, matter and containers.
    Container,
    /// May contain text and inline nodes.
    Block,
    /// Leaf; never has children.
    Text,
    /// May contain text and inline nodes.
    Inline,
    /// Leaf; `text` is verbatim content.
    Raw,
    /// Leaf; `text` is the front matter body.
    Matter,
}

impl NodeType {
    pub fn name(self) -> &'static str {
        match self {
            NodeType::Container => "container",
            NodeType::Block => "block",
            NodeType::Text => "text",
            NodeType::Inline => "inline",
            NodeType::Raw => "raw",
            NodeType::Matter => "matter",
        }
    }

    /// Whether a node of this type may hold a child of type `child`.
    pub fn accepts(self, child: NodeType) -> bool {
        match self {
            NodeType::Container => matches!(
                child,
                NodeType::Block | NodeType::Raw | NodeType::Container | NodeType::Matter
            ),
            NodeType::Block | NodeType::Inline => {
                matches!(child, NodeType::Inline | NodeType::Text)
            }
            NodeType::Text | NodeType::Raw | NodeType::Matter => false,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A block-level marker such as `@Blurb`, or a comment, attached to the
/// block that follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub name: String,
    pub args: Vec<String>,
    pub node: Option<Box<Node>>,
}

impl Annotation {
    pub fn new(name: impl Into<String>) -> Self {
        Annotation {
            name: name.into(),
            args: Vec::new(),
            node: None,
        }
    }

    pub fn with_node(name: impl Into<String>, node: Node) -> Self {
        Annotation {
            name: name.into(),
            args: Vec::new(),
            node: Some(Box::new(node)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    node_type: NodeType,
    children: Vec<Node>,
    pub text: String,
    pub class: String,
    pub args: Vec<String>,
    pub annotations: Vec<Annotation>,
    pub attrs: Vec<Node>,
    pub location: SourceLocation,
}

impl Node {
    pub fn new(node_type: NodeType, location: SourceLocation) -> Self {
        Node {
            node_type,
            children: Vec::new(),
            text: String::new(),
            class: String::new(),
            args: Vec::new(),
            annotations: Vec::new(),
            attrs: Vec::new(),
            location,
        }
    }

    pub fn with_class(node_type: NodeType, class: impl Into<String>, location: SourceLocation) -> Self {
        let mut node = Node::new(node_type, location);
        node.class = class.into();
        node
    }

    pub fn text_node(text: impl Into<String>, location: SourceLocation) -> Self {
        let mut node = Node::new(NodeType::Text, location);
        node.text = text.into();
        node
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [Node] {
        &mut self.children
    }

    pub fn into_children(self) -> Vec<Node> {
        self.children
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn last_child(&self) -> Option<&Node> {
        self.children.last()
    }

    pub fn last_child_mut(&mut self) -> Option<&mut Node> {
        self.children.last_mut()
    }

    /// Append a child.
    ///
    /// # Panics
    ///
    /// When the nesting is illegal for this node's type; that is a parser bug,
    /// not a document error.
    pub fn add_child(&mut self, child: Node) {
        assert!(
            self.node_type.accepts(child.node_type),
            "{} node cannot contain {} node",
            self.node_type,
            child.node_type
        );
        self.children.push(child);
    }

    pub fn add_children(&mut self, children: impl IntoIterator<Item = Node>) {
        for child in children {
            self.add_child(child);
        }
    }

    /// Append a child, merging it into a trailing text node when both are text.
    pub fn push_inline(&mut self, child: Node) {
        if child.node_type == NodeType::Text {
            if let Some(last) = self.children.last_mut() {
                if last.node_type == NodeType::Text {
                    last.text.push_str(&child.text);
                    return;
                }
            }
        }
        self.add_child(child);
    }

    /// Remove and return every child.
    pub fn take_children(&mut self) -> Vec<Node> {
        std::mem::take(&mut self.children)
    }

    pub fn add_annotations(&mut self, annotations: Vec<Annotation>) {
        self.annotations.extend(annotations);
    }

    pub fn annotation(&self, name: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.name == name)
    }

    /// Turn this leaf into a container whose first child holds the former
    /// text and children. The class, args and annotations stay on the
    /// container so the converter can still tell what kind of block it was.
    pub fn promote_to_container(&mut self) {
        let mut first = Node::new(self.node_type, self.location.clone());
        first.class = self.class.clone();
        first.text = std::mem::take(&mut self.text);
        first.args = self.args.clone();
        first.attrs = std::mem::take(&mut self.attrs);
        first.children = std::mem::take(&mut self.children);

        self.node_type = NodeType::Container;
        self.children.push(first);
    }
}
