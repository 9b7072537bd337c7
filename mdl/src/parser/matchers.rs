//! Block constructs recognised at the start of a line.
//!
//! Matchers are tried in registry order; the first whose anchored pattern
//! matches consumes the construct. A line no matcher claims starts a
//! paragraph.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::parse_tree::{Annotation, Node, NodeType};
use crate::parser::error::ParseError;
use crate::parser::structural::BlockBuilder;
use crate::source::{Captured, Source};

pub trait BlockMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Anchored (`\A`) pattern tried at the start of a block.
    fn pattern(&self) -> &Regex;

    /// Handle a match; the cursor sits just past the matched prefix.
    fn process(&self, builder: &mut BlockBuilder<'_>, src: &mut Source, m: &Captured) -> Result<(), ParseError>;
}

/// The built-in matchers, in priority order.
pub fn default_matchers() -> Vec<Box<dyn BlockMatcher>> {
    vec![
        Box::new(AnnotationMatcher),
        Box::new(SeparatorMatcher),
        Box::new(LineMatcher),
        Box::new(CommentMatcher),
        Box::new(TagMatcher),
        Box::new(QuoteMatcher),
        Box::new(NoteDefinitionMatcher),
        Box::new(RawMatcher),
        Box::new(MatterMatcher),
    ]
}

fn group(m: &Captured, i: usize) -> String {
    m.group(i).unwrap_or_default().to_string()
}

/// Drop the line ending that opens a fenced body and the one that closes it.
fn trim_fence_newlines(body: &str) -> &str {
    let body = body.strip_prefix('\n').unwrap_or(body);
    body.strip_suffix('\n').unwrap_or(body)
}

/// `@Name args...` on a line of its own.
pub struct AnnotationMatcher;

static ANNOTATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A@(\p{L}+)").unwrap());

impl BlockMatcher for AnnotationMatcher {
    fn name(&self) -> &'static str {
        "annotation"
    }

    fn pattern(&self) -> &Regex {
        &ANNOTATION
    }

    fn process(&self, builder: &mut BlockBuilder<'_>, src: &mut Source, m: &Captured) -> Result<(), ParseError> {
        let start = src.position();
        src.match_line();
        let mut rest = src.window(start, src.position());
        let (args, _) = rest.parse_args(None)?;
        src.skip_line_end();

        let mut annotation = Annotation::new(group(m, 1));
        annotation.args = args;
        builder.annotate(annotation);
        Ok(())
    }
}

/// `----` alone on a line.
pub struct SeparatorMatcher;

static SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)\A----[\p{Zs}\t]*$").unwrap());

impl BlockMatcher for SeparatorMatcher {
    fn name(&self) -> &'static str {
        "separator"
    }

    fn pattern(&self) -> &Regex {
        &SEPARATOR
    }

    fn process(&self, builder: &mut BlockBuilder<'_>, src: &mut Source, m: &Captured) -> Result<(), ParseError> {
        src.skip_line_end();
        builder.append_block(Node::with_class(NodeType::Block, "----", src.location_at(m.start())));
        Ok(())
    }
}

/// Single-line blocks: `#`..`######` headings and `-` list items.
pub struct LineMatcher;

static LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)\A(#+|-)(?:[\p{Zs}\t]+|$)").unwrap());

impl BlockMatcher for LineMatcher {
    fn name(&self) -> &'static str {
        "line"
    }

    fn pattern(&self) -> &Regex {
        &LINE
    }

    fn process(&self, builder: &mut BlockBuilder<'_>, src: &mut Source, m: &Captured) -> Result<(), ParseError> {
        let mut block = builder.parse_line_block(src, &group(m, 1))?;
        block.location = src.location_at(m.start());
        builder.append_block(block);
        Ok(())
    }
}

/// `// paragraph` and `/ line` comments, kept as annotations.
pub struct CommentMatcher;

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A(//?)[\p{Zs}\t]*").unwrap());

impl BlockMatcher for CommentMatcher {
    fn name(&self) -> &'static str {
        "comment"
    }

    fn pattern(&self) -> &Regex {
        &COMMENT
    }

    fn process(&self, builder: &mut BlockBuilder<'_>, src: &mut Source, m: &Captured) -> Result<(), ParseError> {
        let body = if m.group(1) == Some("//") {
            builder.parse_paragraph(src, "")?
        } else {
            builder.parse_line_block(src, "")?
        };
        builder.annotate(Annotation::with_node("comment", body));
        Ok(())
    }
}

/// `{% name args... }` block tags.
pub struct TagMatcher;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A\{%[\p{Zs}\t]+(\p{L}+)").unwrap());

impl BlockMatcher for TagMatcher {
    fn name(&self) -> &'static str {
        "tag"
    }

    fn pattern(&self) -> &Regex {
        &TAG
    }

    fn process(&self, builder: &mut BlockBuilder<'_>, src: &mut Source, m: &Captured) -> Result<(), ParseError> {
        let location = src.location_at(m.start());
        let (args, closed) = src.parse_args(Some('}'))?;
        if !closed {
            return Err(ParseError::new("unterminated-tag", location).with_detail(group(m, 1)));
        }
        src.skip_nonline_space();
        src.skip_line_end();

        let mut tag = Node::with_class(NodeType::Block, group(m, 1), location);
        tag.args = args;
        builder.append_block(tag);
        Ok(())
    }
}

/// `> quote` and `>> promoted quote` paragraphs.
pub struct QuoteMatcher;

static QUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A(>>|>)[\p{Zs}\t]*").unwrap());

impl BlockMatcher for QuoteMatcher {
    fn name(&self) -> &'static str {
        "quote"
    }

    fn pattern(&self) -> &Regex {
        &QUOTE
    }

    fn process(&self, builder: &mut BlockBuilder<'_>, src: &mut Source, m: &Captured) -> Result<(), ParseError> {
        let mut block = builder.parse_paragraph(src, &group(m, 1))?;
        block.location = src.location_at(m.start());
        builder.append_block(block);
        Ok(())
    }
}

/// `^key text` footnote definitions.
pub struct NoteDefinitionMatcher;

static NOTE_DEFINITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\A\^([\p{L}\p{N}]+)[\p{Zs}\t]+").unwrap());

impl BlockMatcher for NoteDefinitionMatcher {
    fn name(&self) -> &'static str {
        "note-definition"
    }

    fn pattern(&self) -> &Regex {
        &NOTE_DEFINITION
    }

    fn process(&self, builder: &mut BlockBuilder<'_>, src: &mut Source, m: &Captured) -> Result<(), ParseError> {
        let mut block = builder.parse_paragraph(src, "^")?;
        block.text = group(m, 1);
        block.location = src.location_at(m.start());
        builder.append_block(block);
        Ok(())
    }
}

/// ```` ```class ```` fenced raw blocks.
pub struct RawMatcher;

static RAW_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A```").unwrap());
static RAW_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[\p{Zs}\t]*```[\p{Zs}\t]*$").unwrap());

impl BlockMatcher for RawMatcher {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn pattern(&self) -> &Regex {
        &RAW_OPEN
    }

    fn process(&self, builder: &mut BlockBuilder<'_>, src: &mut Source, m: &Captured) -> Result<(), ParseError> {
        let location = src.location_at(m.start());
        let class = src.match_line().trim().to_string();
        let Some((_, body)) = src.to_match(&RAW_CLOSE) else {
            return Err(ParseError::new("unterminated-raw", location));
        };
        src.skip_line_end();

        let indent = builder.indent();
        let text = trim_fence_newlines(&body)
            .split('\n')
            .map(|line| line.strip_prefix(indent).unwrap_or(line))
            .collect::<Vec<_>>()
            .join("\n");

        let mut raw = Node::with_class(NodeType::Raw, class, location);
        raw.text = text;
        builder.append_block(raw);
        Ok(())
    }
}

/// `+++` fenced front matter.
pub struct MatterMatcher;

static MATTER_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)\A\+\+\+[\p{Zs}\t]*$").unwrap());
static MATTER_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\+\+\+[\p{Zs}\t]*$").unwrap());

impl BlockMatcher for MatterMatcher {
    fn name(&self) -> &'static str {
        "matter"
    }

    fn pattern(&self) -> &Regex {
        &MATTER_OPEN
    }

    fn process(&self, builder: &mut BlockBuilder<'_>, src: &mut Source, m: &Captured) -> Result<(), ParseError> {
        let location = src.location_at(m.start());
        let Some((_, body)) = src.to_match(&MATTER_CLOSE) else {
            return Err(ParseError::new("unterminated-matter", location));
        };
        src.skip_line_end();

        let mut matter = Node::new(NodeType::Matter, location);
        matter.text = trim_fence_newlines(&body).to_string();
        builder.append_block(matter);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::parse_tree::NodeType;
    use crate::parse_tree::dump::dump;
    use crate::parser::structural::BlockParser;
    use crate::source::Source;

    fn dump_of(text: &str) -> String {
        dump(&BlockParser::default().parse(&mut Source::new(text)).unwrap())
    }

    fn fail_code(text: &str) -> String {
        BlockParser::default().parse(&mut Source::new(text)).unwrap_err().code
    }

    #[test]
    fn annotation_takes_args() {
        assert_eq!(
            dump_of("@Custom note \"two words\"\ntext\n"),
            "container\n\tblock\n\t\t@Custom[note,two words]\n\t\ttext text\n"
        );
    }

    #[test]
    fn separator() {
        assert_eq!(dump_of("a\n\n----\n\nb"), "container\n\tblock\n\t\ttext a\n\tblock/----\n\tblock\n\t\ttext b\n");
    }

    #[rstest]
    #[case("# One", "#")]
    #[case("### Three", "###")]
    #[case("- item", "-")]
    fn line_blocks(#[case] text: &str, #[case] class: &str) {
        let root = BlockParser::default().parse(&mut Source::new(text)).unwrap();
        assert_eq!(root.children()[0].class, class);
    }

    #[test]
    fn hash_without_space_is_text() {
        assert_eq!(dump_of("#hashtag"), "container\n\tblock\n\t\ttext #hashtag\n");
    }

    #[test]
    fn paragraph_comment_spans_lines() {
        assert_eq!(
            dump_of("// one\ntwo\n\nText"),
            "container\n\tblock\n\t\t@comment\n\t\t\tblock\n\t\t\t\ttext one two\n\t\ttext Text\n"
        );
    }

    #[test]
    fn tags_carry_args() {
        assert_eq!(
            dump_of("{% image \"cat.png\" }\n"),
            "container\n\tblock/image[cat.png]\n"
        );
    }

    #[test]
    fn quotes_and_promoted_quotes() {
        assert_eq!(
            dump_of("> said\nthis\n\n>> big"),
            "container\n\tblock/>\n\t\ttext said this\n\tblock/>>\n\t\ttext big\n"
        );
    }

    #[test]
    fn note_definitions_keep_their_key() {
        assert_eq!(
            dump_of("^1 The note.\n"),
            "container\n\tblock/^ 1\n\t\ttext The note.\n"
        );
    }

    #[test]
    fn raw_block_is_verbatim() {
        let root = BlockParser::default()
            .parse(&mut Source::new("```rust\nlet *x* = 1;\n\n  y\n```\nafter"))
            .unwrap();
        let raw = &root.children()[0];
        assert_eq!(raw.node_type(), NodeType::Raw);
        assert_eq!(raw.class, "rust");
        assert_eq!(raw.text, "let *x* = 1;\n\n  y");
        assert_eq!(root.children()[1].children()[0].text, "after");
    }

    #[test]
    fn nested_raw_block_drops_enclosing_indent() {
        let root = BlockParser::default()
            .parse(&mut Source::new("- code:\n\t```\n\tone\n\t\ttwo\n\t```\n"))
            .unwrap();
        let raw = &root.children()[0].children()[1];
        assert_eq!(raw.text, "one\n\ttwo");
    }

    #[test]
    fn empty_raw_block() {
        let root = BlockParser::default().parse(&mut Source::new("```\n```\n")).unwrap();
        assert_eq!(root.children()[0].text, "");
    }

    #[test]
    fn matter_is_kept_raw() {
        assert_eq!(
            dump_of("+++\ntitle: x\n+++\nBody"),
            "container\n\tmatter title: x\n\tblock\n\t\ttext Body\n"
        );
    }

    #[rstest]
    #[case("```\nnever closed", "unterminated-raw")]
    #[case("+++\nkey: value\n", "unterminated-matter")]
    #[case("{% image \"a.png\"\n", "unterminated-tag")]
    #[case("{% image \"a.png }\n", "unterminated-string")]
    #[case("Some *bold\n", "unterminated-line-feature")]
    fn unterminated_constructs(#[case] text: &str, #[case] code: &str) {
        assert_eq!(fail_code(text), code);
    }
}
