pub mod error;
pub mod inline;
pub mod matchers;
pub mod structural;

pub use error::ParseError;
pub use inline::Tokenizer;
pub use structural::BlockParser;

use crate::parse_tree::Node;
use crate::source::Source;

/// Parser entry point.
pub struct Parser {
    source: Source,
    blocks: BlockParser,
}

impl Parser {
    pub fn new(source: Source) -> Self {
        Parser {
            source,
            blocks: BlockParser::default(),
        }
    }

    pub fn with_block_parser(source: Source, blocks: BlockParser) -> Self {
        Parser { source, blocks }
    }

    /// Parse the MDL source into its raw parse tree.
    pub fn parse(&mut self) -> Result<Node, ParseError> {
        self.blocks.parse(&mut self.source)
    }
}

/// Parse `text` in one go; `path` only labels error locations.
pub fn parse_str(text: &str, path: Option<&str>) -> Result<Node, ParseError> {
    let source = match path {
        Some(path) => Source::with_path(text, path),
        None => Source::new(text),
    };
    Parser::new(source).parse()
}
