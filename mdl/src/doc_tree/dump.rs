//! Text rendering of the document tree, one node per line, used by golden tests.

use std::fmt::Write;

use super::{DocTree, LinkTarget, NodeId, NodeKind, Segment, Visitor};

pub fn dump(tree: &DocTree) -> String {
    let mut dumper = Dumper::default();
    tree.visit(&mut dumper);
    if !tree.notes().is_empty() {
        dumper.line("notes");
        dumper.depth += 1;
        for &note in tree.notes() {
            tree.visit_node(note, &mut dumper);
        }
    }
    dumper.out
}

/// The one-line description of a node, without its children.
pub fn describe(kind: &NodeKind) -> String {
    match kind {
        NodeKind::Section { level } => format!("Section {level}"),
        NodeKind::Block { class, args } => format!("Block {}{}", class.name(), bracketed(args)),
        NodeKind::Inline { feature } => format!("Inline {}", feature.name()),
        NodeKind::Text { text } => format!("Text {text:?}"),
        NodeKind::Link { target, title } => {
            let mut line = match target {
                LinkTarget::Url(url) => format!("Link url {url:?}"),
                LinkTarget::Note(key) => format!("Link note {key:?}"),
            };
            if let Some(title) = title {
                let _ = write!(line, " title {title:?}");
            }
            line
        }
        NodeKind::Note { key } => format!("Note {key:?}"),
        NodeKind::NoteDefn { key } => format!("NoteDefn {key:?}"),
        NodeKind::Code { text, class } => format!("Code {class:?} {text:?}"),
        NodeKind::Embed { class, url, alt } => format!("Embed {} {url:?} {alt:?}", class.name()),
        NodeKind::BlockMark { class } => format!("BlockMark {}", class.name()),
        NodeKind::Token { args } => format!("Token{}", bracketed(args)),
        NodeKind::RootSection | NodeKind::Paragraph | NodeKind::List | NodeKind::ListItem => {
            kind.name().to_string()
        }
    }
}

fn bracketed(args: &[String]) -> String {
    if args.is_empty() {
        String::new()
    } else {
        format!("[{}]", args.join(","))
    }
}

#[derive(Default)]
struct Dumper {
    out: String,
    depth: usize,
}

impl Dumper {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push('\t');
        }
        self.out.push_str(text);
        self.out.push('\n');
    }
}

impl Visitor for Dumper {
    fn enter(&mut self, tree: &DocTree, id: NodeId, segment: Segment) -> bool {
        let kind = tree.kind(id);
        match segment {
            Segment::Title => {
                self.line(&describe(kind));
                self.depth += 1;
                self.line("title");
                self.depth += 1;
            }
            // A section's header line was written with its title.
            Segment::Body if matches!(kind, NodeKind::Section { .. }) => {}
            Segment::Body => {
                self.line(&describe(kind));
                self.depth += 1;
            }
        }
        true
    }

    fn exit(&mut self, _tree: &DocTree, _id: NodeId, _segment: Segment) {
        self.depth -= 1;
    }
}
