use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::parse_tree::{Annotation, Node, NodeType};
use crate::parser::error::ParseError;
use crate::parser::inline::Tokenizer;
use crate::parser::matchers::{BlockMatcher, default_matchers};
use crate::source::Source;

static EMPTY_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)\A[\p{Zs}\t]*$").unwrap());

/// Deepest block or inline nesting accepted before giving up.
pub const MAX_NESTING: usize = 128;

// ---------------------------------------------------------------------------
// Block builder
// ---------------------------------------------------------------------------

/// Collects the blocks of one indentation level. Matchers append through it
/// so pending annotations land on the right block.
pub struct BlockBuilder<'p> {
    tokenizer: &'p Tokenizer,
    indent: String,
    annotations: Vec<Annotation>,
    blocks: Vec<Node>,
}

impl<'p> BlockBuilder<'p> {
    fn new(tokenizer: &'p Tokenizer, indent: &str) -> Self {
        BlockBuilder {
            tokenizer,
            indent: indent.to_string(),
            annotations: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn indent(&self) -> &str {
        &self.indent
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        self.tokenizer
    }

    /// Append a block, handing it every annotation buffered so far.
    pub fn append_block(&mut self, mut block: Node) {
        block.add_annotations(std::mem::take(&mut self.annotations));
        trace!("block {}/{} at {:?}", block.node_type(), block.class, block.location);
        self.blocks.push(block);
    }

    /// Buffer an annotation for the next appended block.
    pub fn annotate(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }

    /// One tokenized line as a block of the given class.
    pub fn parse_line_block(&self, src: &mut Source, class: &str) -> Result<Node, ParseError> {
        let mut block = Node::with_class(NodeType::Block, class, src.location());
        for node in self.tokenizer.parse_line(src)? {
            block.push_inline(node);
        }
        Ok(block)
    }

    /// Consecutive lines at this level's indent, up to a blank line or an
    /// indentation change. Line breaks become single spaces.
    pub fn parse_paragraph(&self, src: &mut Source, class: &str) -> Result<Node, ParseError> {
        let mut para = Node::with_class(NodeType::Block, class, src.location());
        let mut first = true;
        while !src.is_at_end() {
            if !first {
                if src.peek_match(&EMPTY_LINE).is_some() {
                    break;
                }
                if !src.match_indent(&self.indent).0 {
                    break;
                }
            }
            first = false;

            let line = self.tokenizer.parse_line(src)?;
            if line.is_empty() {
                break;
            }
            if !para.is_empty() {
                para.push_inline(Node::text_node(" ", line[0].location.clone()));
            }
            for node in line {
                para.push_inline(node);
            }
        }
        Ok(para)
    }

    fn finish(self) -> Vec<Node> {
        if !self.annotations.is_empty() {
            trace!("dropping {} trailing annotation(s)", self.annotations.len());
        }
        self.blocks
    }
}

// ---------------------------------------------------------------------------
// Block parser
// ---------------------------------------------------------------------------

/// Indentation-sensitive recursive descent over block constructs.
pub struct BlockParser {
    matchers: Vec<Box<dyn BlockMatcher>>,
    tokenizer: Tokenizer,
}

impl Default for BlockParser {
    fn default() -> Self {
        BlockParser::new(default_matchers(), Tokenizer::default())
    }
}

impl BlockParser {
    pub fn new(matchers: Vec<Box<dyn BlockMatcher>>, tokenizer: Tokenizer) -> Self {
        BlockParser { matchers, tokenizer }
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Parse the whole source into a root container.
    pub fn parse(&self, src: &mut Source) -> Result<Node, ParseError> {
        debug!("parsing {}", src.location().path().unwrap_or("<input>"));
        let mut root = Node::new(NodeType::Container, src.location());
        self.parse_container(&mut root, src, "", 0)?;
        debug!("parsed {} top-level node(s)", root.children().len());
        Ok(root)
    }

    /// Parse every block at `indent`, recursing when a line is indented further.
    /// Returns when a line is indented less than `indent` or input ends.
    fn parse_container(
        &self,
        root: &mut Node,
        src: &mut Source,
        indent: &str,
        depth: usize,
    ) -> Result<(), ParseError> {
        if depth > MAX_NESTING {
            return Err(src.fail("nesting-too-deep"));
        }

        let mut builder = BlockBuilder::new(&self.tokenizer, indent);

        while !src.is_at_end() {
            if src.skip_empty_lines() > 0 {
                continue;
            }

            let lead = src.lead_space();
            if lead != indent {
                if lead.len() < indent.len() {
                    break;
                }
                let (exceeds, lead) = src.exceed_indent(indent);
                let target = builder
                    .blocks
                    .last_mut()
                    .filter(|b| exceeds && b.node_type() != NodeType::Container);
                let Some(target) = target else {
                    return Err(src.fail("bad-indent"));
                };
                trace!("nesting {:?} under {}/{}", lead, target.node_type(), target.class);
                target.promote_to_container();
                self.parse_container(target, src, &lead, depth + 1)?;
                continue;
            }

            src.match_indent(indent);
            self.parse_block(&mut builder, src)?;
        }

        root.add_children(builder.finish());
        Ok(())
    }

    fn parse_block(&self, builder: &mut BlockBuilder<'_>, src: &mut Source) -> Result<(), ParseError> {
        for matcher in &self.matchers {
            if let Some(m) = src.match_regex(matcher.pattern()) {
                trace!("matched {} at {:?}", matcher.name(), src.location_at(m.start()));
                return matcher.process(builder, src, &m);
            }
        }

        let para = builder.parse_paragraph(src, "")?;
        if !para.is_empty() {
            builder.append_block(para);
        }
        Ok(())
    }
}
