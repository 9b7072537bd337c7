//! Post-conversion fix-ups applied to the finished document tree.

use log::debug;

use crate::doc_tree::{DocTree, InlineFeature, NodeId, NodeKind, Segment, Visitor};
use crate::parser::inline::Ligatures;

/// Normalize with the default ligature table.
pub fn normalize(tree: &mut DocTree) {
    normalize_with(tree, &Ligatures::default());
}

/// One post-order pass over the tree: ligatures in text outside code, and
/// header inlines demoted wherever they are not the lead of a list item's
/// paragraph. Running it twice changes nothing.
pub fn normalize_with(tree: &mut DocTree, ligatures: &Ligatures) {
    let mut order = PostOrder(Vec::new());
    tree.visit(&mut order);
    for &note in tree.notes() {
        tree.visit_node(note, &mut order);
    }
    let order = order.0;

    let mut demoted = 0;
    for id in order {
        match tree.kind(id) {
            NodeKind::Text { .. } => {
                if inside_code(tree, id) {
                    continue;
                }
                if let NodeKind::Text { text } = tree.kind_mut(id) {
                    *text = ligatures.apply(text);
                }
            }
            NodeKind::Inline {
                feature: InlineFeature::Header,
            } => {
                if in_list_item_paragraph(tree, id) {
                    continue;
                }
                *tree.kind_mut(id) = NodeKind::Inline {
                    feature: InlineFeature::None,
                };
                // A node of its own, even after a trailing Text child.
                tree.push(id, NodeKind::Text { text: ":".into() }, None);
                demoted += 1;
            }
            _ => {}
        }
    }
    debug!("normalized tree, {demoted} header(s) demoted");
}

/// Records nodes as they are left, children before parents.
struct PostOrder(Vec<NodeId>);

impl Visitor for PostOrder {
    fn enter(&mut self, _tree: &DocTree, _id: NodeId, _segment: Segment) -> bool {
        true
    }

    fn exit(&mut self, _tree: &DocTree, id: NodeId, segment: Segment) {
        if segment == Segment::Body {
            self.0.push(id);
        }
    }
}

fn inside_code(tree: &DocTree, id: NodeId) -> bool {
    tree.ancestors(id).any(|a| {
        matches!(
            tree.kind(a),
            NodeKind::Inline {
                feature: InlineFeature::Code
            }
        )
    })
}

fn in_list_item_paragraph(tree: &DocTree, id: NodeId) -> bool {
    let Some(parent) = tree.parent(id) else {
        return false;
    };
    matches!(tree.kind(parent), NodeKind::Paragraph)
        && tree
            .parent(parent)
            .is_some_and(|grand| matches!(tree.kind(grand), NodeKind::ListItem))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::convert::convert;
    use crate::doc_tree::dump::dump;
    use crate::parser::parse_str;

    fn normalized(text: &str) -> DocTree {
        let mut tree = convert(&parse_str(text, None).unwrap()).unwrap().tree;
        normalize(&mut tree);
        tree
    }

    #[test]
    fn header_in_list_item_is_kept() {
        assert_eq!(
            dump(&normalized("- Term:: meaning\n")),
            "RootSection\n\
             \tList\n\
             \t\tListItem\n\
             \t\t\tParagraph\n\
             \t\t\t\tInline header\n\
             \t\t\t\t\tText \"Term\"\n\
             \t\t\t\tText \" meaning\"\n"
        );
    }

    #[test]
    fn header_elsewhere_is_demoted_with_a_colon() {
        assert_eq!(
            dump(&normalized("Term:: meaning\n")),
            "RootSection\n\
             \tParagraph\n\
             \t\tInline none\n\
             \t\t\tText \"Term\"\n\
             \t\t\tText \":\"\n\
             \t\tText \" meaning\"\n"
        );
    }

    #[test]
    fn ligatures_skip_code() {
        let mut tree = DocTree::default();
        let para = tree.push(tree.root(), NodeKind::Paragraph, None);
        tree.push_text(para, Segment::Body, "wait... ", None);
        let code = tree.push(
            para,
            NodeKind::Inline {
                feature: InlineFeature::Code,
            },
            None,
        );
        tree.push_text(code, Segment::Body, "a--b", None);

        normalize(&mut tree);

        assert_eq!(tree.plain_text(para), "wait\u{2026} a--b");
    }

    #[rstest]
    #[case("- Term:: meaning\n")]
    #[case("# Head:: line\n\nA -- B... :)\n")]
    #[case("[a -- b](http://x) and^[n]\n\n^n x:: y\n")]
    fn normalizing_twice_changes_nothing(#[case] text: &str) {
        let mut tree = normalized(text);
        let once = dump(&tree);
        normalize(&mut tree);
        assert_eq!(dump(&tree), once);
    }
}
