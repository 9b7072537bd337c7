//! Visiting and transforming a [`DocTree`].

use super::{DocTree, NodeId, NodeKind};

/// A visitable region of a node. Sections visit their title before their
/// body; every other node only has a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Body = 0,
    Title = 1,
}

pub trait Visitor {
    /// Return `false` to skip the children of this segment. `exit` is still called.
    fn enter(&mut self, tree: &DocTree, id: NodeId, segment: Segment) -> bool;

    fn exit(&mut self, tree: &DocTree, id: NodeId, segment: Segment);
}

/// Adapts a closure into a [`Visitor`] that also sees the chain of entered
/// nodes, outermost first, ending with the current one.
pub struct StackVisitor<F> {
    stack: Vec<NodeId>,
    proc: F,
}

impl<F> StackVisitor<F>
where
    F: FnMut(&DocTree, NodeId, Segment, &[NodeId]) -> bool,
{
    pub fn new(proc: F) -> Self {
        StackVisitor {
            stack: Vec::new(),
            proc,
        }
    }
}

impl<F> Visitor for StackVisitor<F>
where
    F: FnMut(&DocTree, NodeId, Segment, &[NodeId]) -> bool,
{
    fn enter(&mut self, tree: &DocTree, id: NodeId, segment: Segment) -> bool {
        self.stack.push(id);
        (self.proc)(tree, id, segment, &self.stack)
    }

    fn exit(&mut self, _tree: &DocTree, _id: NodeId, _segment: Segment) {
        self.stack.pop();
    }
}

/// Outcome of [`Transform::transform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transformed {
    Retain,
    /// Put this detached node where the transformed one was.
    Replace(NodeId),
}

pub trait Transform {
    fn enter(&mut self, _tree: &DocTree, _id: NodeId) -> bool {
        true
    }

    fn exit(&mut self, _tree: &DocTree, _id: NodeId) {}

    fn transform(&mut self, tree: &mut DocTree, id: NodeId) -> Transformed;
}

impl DocTree {
    /// Visit the whole tree from the root.
    pub fn visit(&self, visitor: &mut impl Visitor) {
        self.visit_node(self.root(), visitor);
    }

    pub fn visit_node(&self, id: NodeId, visitor: &mut impl Visitor) {
        if matches!(self.kind(id), NodeKind::Section { .. }) {
            self.visit_segment(id, Segment::Title, visitor);
        }
        self.visit_segment(id, Segment::Body, visitor);
    }

    fn visit_segment(&self, id: NodeId, segment: Segment, visitor: &mut impl Visitor) {
        if visitor.enter(self, id, segment) {
            for &child in self.node(id).segment(segment) {
                self.visit_node(child, visitor);
            }
        }
        visitor.exit(self, id, segment);
    }

    /// Apply `transform` bottom-up: children are transformed before their parent.
    pub fn apply(&mut self, transform: &mut impl Transform) {
        self.apply_node(self.root(), transform);
    }

    fn apply_node(&mut self, id: NodeId, transform: &mut impl Transform) {
        if transform.enter(self, id) {
            let node = self.node(id);
            let children: Vec<NodeId> = node.title().iter().chain(node.children()).copied().collect();
            for child in children {
                self.apply_node(child, transform);
            }
        }
        transform.exit(self, id);

        if let Transformed::Replace(new) = transform.transform(self, id) {
            self.replace(id, new);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc_tree::NodeKind;

    struct Trace(Vec<String>);

    impl Visitor for Trace {
        fn enter(&mut self, tree: &DocTree, id: NodeId, segment: Segment) -> bool {
            self.0.push(format!("+{}/{}", tree.kind(id), segment as u8));
            !matches!(tree.kind(id), NodeKind::Note { .. })
        }

        fn exit(&mut self, tree: &DocTree, id: NodeId, segment: Segment) {
            self.0.push(format!("-{}/{}", tree.kind(id), segment as u8));
        }
    }

    fn sample() -> DocTree {
        let mut tree = DocTree::default();
        let section = tree.push(tree.root(), NodeKind::Section { level: 1 }, None);
        tree.push_text(section, Segment::Title, "T", None);
        let para = tree.push(section, NodeKind::Paragraph, None);
        let note = tree.push(para, NodeKind::Note { key: "a".into() }, None);
        tree.push_text(note, Segment::Body, "hidden", None);
        tree
    }

    #[test]
    fn sections_visit_title_then_body() {
        let tree = sample();
        let mut trace = Trace(Vec::new());
        tree.visit(&mut trace);
        assert_eq!(
            trace.0,
            vec![
                "+RootSection/0",
                "+Section/1",
                "+Text/0",
                "-Text/0",
                "-Section/1",
                "+Section/0",
                "+Paragraph/0",
                "+Note/0",
                "-Note/0",
                "-Paragraph/0",
                "-Section/0",
                "-RootSection/0",
            ]
        );
    }

    #[test]
    fn stack_visitor_sees_ancestors() {
        let tree = sample();
        let mut depths = Vec::new();
        tree.visit(&mut StackVisitor::new(|tree: &DocTree, id, _segment, stack: &[NodeId]| {
            if matches!(tree.kind(id), NodeKind::Text { .. }) {
                depths.push(stack.len());
            }
            true
        }));
        // Title text sits under root and section; note text under root, section, paragraph, note.
        assert_eq!(depths, vec![3, 5]);
    }

    struct CodeForNotes;

    impl Transform for CodeForNotes {
        fn transform(&mut self, tree: &mut DocTree, id: NodeId) -> Transformed {
            match tree.kind(id) {
                NodeKind::Paragraph => {
                    let text = tree.plain_text(id);
                    let code = tree.add(
                        NodeKind::Code {
                            text,
                            class: String::new(),
                        },
                        None,
                    );
                    Transformed::Replace(code)
                }
                _ => Transformed::Retain,
            }
        }
    }

    #[test]
    fn transform_replaces_subtrees_bottom_up() {
        let mut tree = sample();
        tree.apply(&mut CodeForNotes);
        let section = tree.children(tree.root())[0];
        let replaced = tree.children(section)[0];
        assert_eq!(
            tree.kind(replaced),
            &NodeKind::Code {
                text: "hidden".into(),
                class: String::new(),
            }
        );
    }
}
