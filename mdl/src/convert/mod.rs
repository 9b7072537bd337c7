//! Builds the document tree from the raw parse tree.
//!
//! Block classes become semantic nodes, consecutive list lines coalesce into
//! one `List`, headings open nested sections, and footnote references are
//! matched with definitions that may appear later in the document.

use std::collections::HashMap;

use log::{debug, trace};

use crate::doc_tree::{
    BlockClass, DocTree, EmbedClass, InlineFeature, LinkTarget, MarkClass, NodeId, NodeKind, Segment,
};
use crate::parse_tree::{Node, NodeType};
use crate::parser::error::ParseError;
use crate::parser::inline::{HEADER_CLASS, NOTE_CLASS};
use crate::source::SourceLocation;

/// Annotations that wrap a plain paragraph, highest priority first.
const ANNOTATION_CLASSES: &[(&str, BlockClass)] = &[
    ("Blurb", BlockClass::Blurb),
    ("Aside", BlockClass::Aside),
    ("Promote", BlockClass::Promote),
    ("Custom", BlockClass::Custom),
];

/// A converted tree plus footnote references that never met a definition.
#[derive(Debug)]
pub struct Converted {
    pub tree: DocTree,
    pub unresolved: Vec<(String, SourceLocation)>,
}

/// Convert a parse-tree root container into a document tree.
pub fn convert(root: &Node) -> Result<Converted, ParseError> {
    assert_eq!(root.node_type(), NodeType::Container, "conversion starts at a container");

    let mut converter = Converter {
        tree: DocTree::new(Some(root.location.clone())),
        open_notes: HashMap::new(),
    };
    let doc_root = converter.tree.root();
    converter.convert_blocks(root.children(), doc_root)?;

    let mut unresolved: Vec<(String, SourceLocation)> = converter
        .open_notes
        .into_iter()
        .map(|(key, open)| (key, open.location))
        .collect();
    unresolved.sort_by_key(|(_, location)| location.offset());

    debug!(
        "converted {} node(s), {} unresolved note(s)",
        converter.tree.len(),
        unresolved.len()
    );
    Ok(Converted {
        tree: converter.tree,
        unresolved,
    })
}

struct OpenNote {
    id: NodeId,
    location: SourceLocation,
}

struct Converter {
    tree: DocTree,
    open_notes: HashMap<String, OpenNote>,
}

impl Converter {
    /// Convert a run of sibling blocks into `parent`, opening sections as
    /// headings appear. Sections opened here close at the end of the run.
    fn convert_blocks(&mut self, nodes: &[Node], parent: NodeId) -> Result<(), ParseError> {
        let mut sections: Vec<(usize, NodeId)> = Vec::new();

        for node in nodes {
            let current = sections.last().map(|&(_, id)| id).unwrap_or(parent);

            match node.node_type() {
                NodeType::Matter => trace!("skipping front matter at {:?}", node.location),
                NodeType::Raw => {
                    self.tree.push(
                        current,
                        NodeKind::Code {
                            text: node.text.clone(),
                            class: node.class.clone(),
                        },
                        Some(node.location.clone()),
                    );
                }
                NodeType::Block if node.class.starts_with('#') => {
                    let section = self.open_section(node, parent, &mut sections);
                    self.convert_inlines(node.children(), section, Segment::Title)?;
                }
                NodeType::Block => self.convert_block(node, current)?,
                NodeType::Container if node.class.starts_with('#') => {
                    let (head, body) = split_container(node)?;
                    let section = self.open_section(node, parent, &mut sections);
                    self.convert_inlines(head.children(), section, Segment::Title)?;
                    self.convert_blocks(body, section)?;
                }
                NodeType::Container => self.convert_container(node, current)?,
                NodeType::Text | NodeType::Inline => {
                    unreachable!("{} node in a block sequence", node.node_type())
                }
            }
        }
        Ok(())
    }

    /// Pop sections at or below this heading's level and open a new one.
    fn open_section(&mut self, node: &Node, parent: NodeId, sections: &mut Vec<(usize, NodeId)>) -> NodeId {
        let level = node.class.len();
        while sections.last().is_some_and(|&(open, _)| open >= level) {
            sections.pop();
        }
        let container = sections.last().map(|&(_, id)| id).unwrap_or(parent);
        let section = self
            .tree
            .push(container, NodeKind::Section { level }, Some(node.location.clone()));
        sections.push((level, section));
        trace!("section level {level} at {:?}", node.location);
        section
    }

    fn convert_block(&mut self, node: &Node, parent: NodeId) -> Result<(), ParseError> {
        let location = Some(node.location.clone());
        match node.class.as_str() {
            NOTE_CLASS => self.resolve_note(node),
            "----" => {
                self.tree.push(
                    parent,
                    NodeKind::BlockMark {
                        class: MarkClass::MinorSeparator,
                    },
                    location,
                );
                Ok(())
            }
            ">" | ">>" => {
                let quote = self.tree.push(parent, quote_kind(), location);
                self.convert_paragraph(node, quote)
            }
            "-" => {
                let item = self.list_item(node, parent);
                self.convert_paragraph(node, item)
            }
            "" => {
                let target = match annotation_block(node) {
                    Some(kind) => self.tree.push(parent, kind, location),
                    None => parent,
                };
                self.convert_paragraph(node, target)
            }
            class => self.convert_tag(node, class, parent),
        }
    }

    /// A block with indented content under it.
    fn convert_container(&mut self, node: &Node, parent: NodeId) -> Result<(), ParseError> {
        let (head, body) = split_container(node)?;
        let location = Some(node.location.clone());
        let target = match node.class.as_str() {
            "-" => self.list_item(node, parent),
            ">" | ">>" => self.tree.push(parent, quote_kind(), location),
            NOTE_CLASS => return Err(ParseError::new("note-nested-blocks", node.location.clone())),
            "" => match annotation_block(node) {
                Some(kind) => self.tree.push(parent, kind, location),
                None => return Err(unexpected_indent(node)),
            },
            _ => return Err(unexpected_indent(node)),
        };
        self.convert_paragraph(head, target)?;
        self.convert_blocks(body, target)
    }

    /// A `ListItem` for `node`, added to the `List` directly before it when
    /// there is one.
    fn list_item(&mut self, node: &Node, parent: NodeId) -> NodeId {
        let location = Some(node.location.clone());
        let list = match self.tree.last_child(parent) {
            Some(last) if matches!(self.tree.kind(last), NodeKind::List) => last,
            _ => self.tree.push(parent, NodeKind::List, location.clone()),
        };
        self.tree.push(list, NodeKind::ListItem, location)
    }

    fn convert_paragraph(&mut self, node: &Node, parent: NodeId) -> Result<(), ParseError> {
        let para = self
            .tree
            .push(parent, NodeKind::Paragraph, Some(node.location.clone()));
        self.convert_inlines(node.children(), para, Segment::Body)
    }

    /// `{% name args }` tags; only embeds are known.
    fn convert_tag(&mut self, node: &Node, class: &str, parent: NodeId) -> Result<(), ParseError> {
        let Some(embed) = EmbedClass::from_tag(class) else {
            return Err(ParseError::new("unknown-tag", node.location.clone()).with_detail(class));
        };
        let [url] = node.args.as_slice() else {
            return Err(ParseError::new(
                format!("{}-expect-1-arg", embed.name()),
                node.location.clone(),
            ));
        };
        self.tree.push(
            parent,
            NodeKind::Embed {
                class: embed,
                url: url.clone(),
                alt: String::new(),
            },
            Some(node.location.clone()),
        );
        Ok(())
    }

    /// A `^key` definition fills the reference opened earlier under `key`.
    fn resolve_note(&mut self, node: &Node) -> Result<(), ParseError> {
        let key = node.text.as_str();
        let Some(open) = self.open_notes.remove(key) else {
            return Err(ParseError::new("no-reference-to-this-note", node.location.clone()).with_detail(key));
        };
        trace!("resolved note {key:?} at {:?}", node.location);

        if matches!(self.tree.kind(open.id), NodeKind::Note { .. }) {
            return self.convert_inlines(node.children(), open.id, Segment::Body);
        }

        let defn = self.tree.add(
            NodeKind::NoteDefn { key: key.to_string() },
            Some(node.location.clone()),
        );
        self.convert_inlines(node.children(), defn, Segment::Body)?;
        self.tree.add_note(defn);
        Ok(())
    }

    fn open_note(&mut self, key: &str, id: NodeId, location: &SourceLocation) -> Result<(), ParseError> {
        if self.open_notes.contains_key(key) {
            return Err(ParseError::new("duplicate-note-reference", location.clone()).with_detail(key));
        }
        trace!("opened note {key:?} at {location:?}");
        self.open_notes.insert(
            key.to_string(),
            OpenNote {
                id,
                location: location.clone(),
            },
        );
        Ok(())
    }

    fn convert_inlines(&mut self, nodes: &[Node], parent: NodeId, segment: Segment) -> Result<(), ParseError> {
        let mut index = 0;
        while index < nodes.len() {
            let node = &nodes[index];
            index += 1;
            let location = Some(node.location.clone());

            if node.node_type() == NodeType::Text {
                self.tree.push_text(parent, segment, &node.text, location);
                continue;
            }

            match node.class.as_str() {
                "[" => {
                    self.convert_link(node, parent, segment)?;
                }
                "(" => {
                    let text = format!("({})", node.text);
                    self.tree.push_text(parent, segment, &text, location);
                }
                "{" => {
                    self.tree.push_in(
                        parent,
                        segment,
                        NodeKind::Token {
                            args: node.args.clone(),
                        },
                        location,
                    );
                }
                NOTE_CLASS => {
                    let next = nodes.get(index).filter(|n| n.node_type() == NodeType::Inline && n.class == "[");
                    if self.convert_note(node, next, parent, segment)? {
                        index += 1;
                    }
                }
                class => {
                    let feature = match class {
                        "*" => InlineFeature::Bold,
                        "_" => InlineFeature::Italic,
                        "`" => InlineFeature::Code,
                        HEADER_CLASS => InlineFeature::Header,
                        _ => InlineFeature::None,
                    };
                    let inline = self
                        .tree
                        .push_in(parent, segment, NodeKind::Inline { feature }, location.clone());
                    self.convert_inlines(node.children(), inline, Segment::Body)?;
                    if !node.text.is_empty() {
                        self.tree.push_text(inline, Segment::Body, &node.text, location);
                    }
                }
            }
        }
        Ok(())
    }

    /// `^key`, `^[key]` and `^[text](url)`. Returns whether the following
    /// bracket node was consumed.
    fn convert_note(
        &mut self,
        node: &Node,
        bracket: Option<&Node>,
        parent: NodeId,
        segment: Segment,
    ) -> Result<bool, ParseError> {
        let location = Some(node.location.clone());

        if !node.text.is_empty() {
            let note = self.tree.push_in(
                parent,
                segment,
                NodeKind::Note { key: node.text.clone() },
                location,
            );
            self.open_note(&node.text, note, &node.location)?;
            return Ok(false);
        }

        let Some(bracket) = bracket else {
            self.tree.push_text(parent, segment, NOTE_CLASS, location);
            return Ok(false);
        };

        if bracket.attrs.is_empty() {
            let key = collapse_text(bracket);
            let note = self
                .tree
                .push_in(parent, segment, NodeKind::Note { key: key.clone() }, location);
            self.open_note(&key, note, &node.location)?;
        } else {
            let note = self
                .tree
                .push_in(parent, segment, NodeKind::Note { key: String::new() }, location);
            self.convert_link(bracket, note, Segment::Body)?;
        }
        Ok(true)
    }

    fn convert_link(&mut self, node: &Node, parent: NodeId, segment: Segment) -> Result<(), ParseError> {
        let Some(attr) = node.attrs.first() else {
            return Err(ParseError::new("link-missing-target", node.location.clone()));
        };

        let target = match attr.text.strip_prefix('^') {
            Some(key) => LinkTarget::Note(key.to_string()),
            None => LinkTarget::Url(attr.text.clone()),
        };
        let link = self.tree.push_in(
            parent,
            segment,
            NodeKind::Link {
                target: target.clone(),
                title: None,
            },
            Some(node.location.clone()),
        );
        if let LinkTarget::Note(key) = &target {
            self.open_note(key, link, &attr.location)?;
        }
        self.convert_inlines(node.children(), link, Segment::Body)
    }
}

/// Split a promoted container into its head block and the nested blocks.
fn split_container(node: &Node) -> Result<(&Node, &[Node]), ParseError> {
    match node.children().split_first() {
        Some((head, body)) if head.node_type() == NodeType::Block => Ok((head, body)),
        _ => Err(unexpected_indent(node)),
    }
}

/// Reported at the first nested block, the line that should not be indented.
fn unexpected_indent(container: &Node) -> ParseError {
    let location = container
        .children()
        .get(1)
        .map_or_else(|| container.location.clone(), |n| n.location.clone());
    ParseError::new("unexpected-indent", location)
}

fn quote_kind() -> NodeKind {
    NodeKind::Block {
        class: BlockClass::Quote,
        args: Vec::new(),
    }
}

/// The block a plain paragraph's annotations wrap it in, if any.
fn annotation_block(node: &Node) -> Option<NodeKind> {
    ANNOTATION_CLASSES.iter().find_map(|&(name, class)| {
        node.annotation(name).map(|annotation| NodeKind::Block {
            class,
            args: annotation.args.clone(),
        })
    })
}

fn collapse_text(node: &Node) -> String {
    let mut text = String::new();
    for child in node.children() {
        if child.node_type() == NodeType::Text {
            text.push_str(&child.text);
        } else {
            text.push_str(&collapse_text(child));
        }
    }
    text
}
