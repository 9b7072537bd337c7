use rstest::rstest;

use mdl::doc_tree::dump::dump;
use mdl::doc_tree::{DocTree, NodeKind};
use mdl::{DocumentOptions, ParseError, parse_document, parse_documents};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn doc(text: &str) -> DocTree {
    init_logging();
    parse_document(text, None, DocumentOptions::default())
        .unwrap_or_else(|err| panic!("{err}\n{}", err.context(2, 3)))
        .tree
}

fn error(text: &str) -> ParseError {
    init_logging();
    parse_document(text, Some("test.mdl"), DocumentOptions::default()).unwrap_err()
}

#[test]
fn heading_example() {
    assert_eq!(
        dump(&doc("# Title\n\nHello *world*.\n")),
        "RootSection\n\
         \tSection 1\n\
         \t\ttitle\n\
         \t\t\tText \"Title\"\n\
         \t\tParagraph\n\
         \t\t\tText \"Hello \"\n\
         \t\t\tInline bold\n\
         \t\t\t\tText \"world\"\n\
         \t\t\tText \".\"\n"
    );
}

#[test]
fn list_example() {
    assert_eq!(
        dump(&doc("- one\n- two\n")),
        "RootSection\n\
         \tList\n\
         \t\tListItem\n\
         \t\t\tParagraph\n\
         \t\t\t\tText \"one\"\n\
         \t\tListItem\n\
         \t\t\tParagraph\n\
         \t\t\t\tText \"two\"\n"
    );
}

#[test]
fn footnote_example() {
    let tree = doc("Footnote^[a].\n\n^a Body text.\n");
    let para = tree.children(tree.root())[0];
    let note = tree.children(para)[1];
    assert_eq!(tree.kind(note), &NodeKind::Note { key: "a".into() });
    assert_eq!(tree.plain_text(note), "Body text.");
    assert!(tree.notes().is_empty());
}

#[rstest]
#[case("- a\n- b\n- c\n", 3)]
#[case("- a\n\n- b\n", 2)]
#[case("- a\n\tnested\n- b\n", 2)]
#[case("# H\n\n- a\n- b\n", 2)]
fn list_runs_coalesce(#[case] text: &str, #[case] items: usize) {
    let tree = doc(text);
    let mut lists = Vec::new();
    tree.visit(&mut mdl::doc_tree::StackVisitor::new(
        |tree: &DocTree, id, _segment, stack: &[mdl::doc_tree::NodeId]| {
            // Only count top-level lists and lists directly inside a section.
            if matches!(tree.kind(id), NodeKind::List) && stack.len() <= 3 {
                lists.push(tree.children(id).len());
            }
            true
        },
    ));
    assert_eq!(lists, vec![items]);
}

#[test]
fn list_interrupted_by_paragraph_splits() {
    let tree = doc("- a\n\nText\n\n- b\n");
    let kinds: Vec<&str> = tree
        .children(tree.root())
        .iter()
        .map(|&id| tree.kind(id).name())
        .collect();
    assert_eq!(kinds, vec!["List", "Paragraph", "List"]);
}

#[test]
fn deeper_indent_nests_under_previous_block() {
    let tree = doc("- a\n\t- b\n\t\t- c\n");
    let outer = tree.children(tree.root())[0];
    let item_a = tree.children(outer)[0];
    let inner_list = tree.children(item_a)[1];
    let item_b = tree.children(inner_list)[0];
    let innermost = tree.children(item_b)[1];
    assert_eq!(tree.kind(innermost), &NodeKind::List);
    assert_eq!(tree.plain_text(innermost), "c");
}

#[test]
fn dedent_closes_only_deeper_levels() {
    let tree = doc("- a\n\t- b\n\t\t- c\n\t- d\n- e\n");
    let outer = tree.children(tree.root())[0];
    assert_eq!(tree.children(outer).len(), 2);
    let item_a = tree.children(outer)[0];
    let inner_list = tree.children(item_a)[1];
    assert_eq!(tree.children(inner_list).len(), 2);
    assert_eq!(tree.plain_text(inner_list), "bcd");
}

#[test]
fn ligatures_and_header_demotion() {
    assert_eq!(
        dump(&doc("Note:: wait -- ok... :)\n")),
        "RootSection\n\
         \tParagraph\n\
         \t\tInline none\n\
         \t\t\tText \"Note\"\n\
         \t\t\tText \":\"\n\
         \t\tText \" wait \u{2014} ok\u{2026} \u{263A}\"\n"
    );
}

#[test]
fn normalizing_is_optional() {
    let options = DocumentOptions { normalize: false };
    let tree = parse_document("Term:: x\n", None, options).unwrap().tree;
    assert!(dump(&tree).contains("Inline header"));
}

#[test]
fn multiple_documents_share_one_input() {
    init_logging();
    let docs = parse_documents("+++\nid: 1\n+++\n# One\n\n+++\nid: 2\n+++\n# Two\n", None, DocumentOptions::default()).unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[1].matter.as_deref(), Some("id: 2"));
    assert_eq!(docs[1].tree.plain_text(docs[1].tree.root()), "Two");
}

#[rstest]
#[case("*bold\n", "unterminated-line-feature", 1, 1)]
#[case("Text `code\n", "unterminated-line-feature", 1, 6)]
#[case("```\nnever closed\n", "unterminated-raw", 1, 1)]
#[case("+++\nkey: value\n", "unterminated-matter", 1, 1)]
#[case("{% image \"a.png\"\n", "unterminated-tag", 1, 1)]
#[case("\t\tText\n", "bad-indent", 1, 1)]
#[case("- a\n\t\t- b\n\t- c\n", "bad-indent", 3, 1)]
#[case("Plain\n\tindented\n", "unexpected-indent", 2, 5)]
#[case("A^a and^a\n\n^a x\n", "duplicate-note-reference", 1, 8)]
#[case("^a Orphan.\n", "no-reference-to-this-note", 1, 1)]
#[case("Dangling^a here\n", "note-without-definition", 1, 9)]
#[case("A^a\n\n^a Def\n\tnested\n", "note-nested-blocks", 3, 1)]
#[case("[link]\n", "link-missing-target", 1, 1)]
#[case("{% image }\n", "image-expect-1-arg", 1, 1)]
#[case("{% video \"a\" }\n", "unknown-tag", 1, 1)]
fn errors_have_codes_and_positions(
    #[case] text: &str,
    #[case] code: &str,
    #[case] line: usize,
    #[case] column: usize,
) {
    let err = error(text);
    assert_eq!(err.code, code, "{err}");
    let (path, actual_line, actual_column) = err.location.translate(4);
    assert_eq!(path, Some("test.mdl"));
    assert_eq!((actual_line, actual_column), (line, column), "{err}");
}

#[test]
fn errors_format_with_context() {
    let err = error("one\ntwo\nthree *open\nfour\nfive\nsix\n");
    assert_eq!(err.to_string(), "test.mdl:3,7:unterminated-line-feature:*");
    assert_eq!(err.context(2, 3), " | one\n | two\n | three *open\n | four\n | five\n");
}

#[test]
fn tabs_widen_error_columns() {
    let err = error("- a\n\t[link]\n");
    assert_eq!(err.code, "link-missing-target");
    assert_eq!(err.format_with(4), "test.mdl:2,5:link-missing-target");
    assert_eq!(err.format_with(8), "test.mdl:2,9:link-missing-target");
}

#[test]
fn absurd_nesting_is_refused() {
    let mut text = String::new();
    for depth in 0..200 {
        text.push_str(&"\t".repeat(depth));
        text.push_str("- x\n");
    }
    assert_eq!(error(&text).code, "nesting-too-deep");
}

#[test]
fn absurd_inline_nesting_is_refused() {
    let err = error(&format!("{}\n", "[".repeat(1_000)));
    assert_eq!(err.code, "nesting-too-deep");
    assert_eq!(err.location.translate(4), (Some("test.mdl"), 1, 129));
}

#[test]
fn crlf_input_reads_like_lf() {
    let crlf = "# Title\r\n\r\n```rust\r\nlet x = 1;\r\n```\r\n\r\na\r\n\r\n----\r\n\r\n- one\r\n";
    let lf = crlf.replace("\r\n", "\n");
    assert_eq!(dump(&doc(crlf)), dump(&doc(&lf)));
    assert!(dump(&doc(crlf)).contains("BlockMark"));
}

#[test]
fn crlf_errors_keep_their_lines() {
    let err = error("ok\r\n\r\nText `code\r\n");
    assert_eq!(err.code, "unterminated-line-feature");
    assert_eq!(err.location.translate(4), (Some("test.mdl"), 3, 6));
}
