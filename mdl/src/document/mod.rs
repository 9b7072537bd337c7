//! Whole-document loading: parse, convert, check footnotes, normalize.

use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;

use crate::convert::convert;
use crate::doc_tree::DocTree;
use crate::normalize::normalize;
use crate::parse_tree::{Node, NodeType};
use crate::parser::{ParseError, Parser};
use crate::source::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentOptions {
    /// Run the normalizer. Turned off for "predoc" dumps.
    pub normalize: bool,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        DocumentOptions { normalize: true }
    }
}

/// A converted document with its raw front matter, if it had any.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub matter: Option<String>,
    pub tree: DocTree,
}

#[derive(Debug)]
pub enum LoadError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(ParseError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            LoadError::Parse(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io { source, .. } => Some(source),
            LoadError::Parse(err) => Some(err),
        }
    }
}

impl From<ParseError> for LoadError {
    fn from(err: ParseError) -> Self {
        LoadError::Parse(err)
    }
}

/// Read and convert the file at `path`.
pub fn load_document(path: &Path, options: DocumentOptions) -> Result<Document, LoadError> {
    let source = Source::with_filename(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let root = Parser::new(source).parse()?;
    Ok(convert_document(&root, options)?)
}

/// Convert `text` as one document. `path` only labels error locations.
pub fn parse_document(text: &str, path: Option<&str>, options: DocumentOptions) -> Result<Document, ParseError> {
    let root = crate::parser::parse_str(text, path)?;
    convert_document(&root, options)
}

/// Convert `text` as a series of documents, each starting at a front matter
/// block. Content before the first front matter forms a document without
/// matter; it is omitted when empty.
pub fn parse_documents(
    text: &str,
    path: Option<&str>,
    options: DocumentOptions,
) -> Result<Vec<Document>, ParseError> {
    let root = crate::parser::parse_str(text, path)?;
    convert_documents(&root, options)
}

/// Convert every document span of a parsed tree, in order.
pub fn convert_documents(root: &Node, options: DocumentOptions) -> Result<Vec<Document>, ParseError> {
    split_documents(root)
        .iter()
        .map(|span| convert_document(span, options))
        .collect()
}

/// Cut a parsed tree into one container per document, starting a new one at
/// each front matter node. Never returns an empty list.
pub fn split_documents(root: &Node) -> Vec<Node> {
    let mut spans: Vec<Node> = Vec::new();
    let mut current = Node::new(NodeType::Container, root.location.clone());
    for child in root.children() {
        if child.node_type() == NodeType::Matter {
            let next = Node::new(NodeType::Container, child.location.clone());
            let done = std::mem::replace(&mut current, next);
            if !done.is_empty() || !spans.is_empty() {
                spans.push(done);
            }
        }
        current.add_child(child.clone());
    }
    if !current.is_empty() || spans.is_empty() {
        spans.push(current);
    }

    debug!("split input into {} document(s)", spans.len());
    spans
}

/// Convert an already parsed tree (or one span of it), rejecting footnote
/// references left without a definition.
pub fn convert_document(root: &Node, options: DocumentOptions) -> Result<Document, ParseError> {
    let matter = root
        .children()
        .iter()
        .find(|n| n.node_type() == NodeType::Matter)
        .map(|n| n.text.clone());

    let converted = convert(root)?;
    if let Some((key, location)) = converted.unresolved.into_iter().next() {
        return Err(ParseError::new("note-without-definition", location).with_detail(key));
    }

    let mut tree = converted.tree;
    if options.normalize {
        normalize(&mut tree);
    }
    Ok(Document { matter, tree })
}
