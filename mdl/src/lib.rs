//! MDL: an indentation-structured markup language.
//!
//! The pipeline runs [`parser`] (text to raw parse tree), [`convert`] (parse
//! tree to semantic [`doc_tree`]) and [`normalize`]. [`document`] ties the
//! steps together for whole files.

pub mod convert;
pub mod doc_tree;
pub mod document;
pub mod normalize;
pub mod parse_tree;
pub mod parser;
pub mod source;

pub use doc_tree::DocTree;
pub use document::{
    Document, DocumentOptions, LoadError, convert_document, convert_documents, load_document, parse_document,
    parse_documents, split_documents,
};
pub use parser::{ParseError, Parser};
pub use source::{Source, SourceLocation};
