use std::fmt;

use codespan_reporting::diagnostic::{Diagnostic, Label, Severity};

use crate::source::{DEFAULT_TAB_SIZE, SourceLocation};

/// Lines of context shown before the failing line.
pub const CONTEXT_BEFORE: usize = 2;
/// Lines of context shown from the failing line onward.
pub const CONTEXT_AFTER: usize = 3;

/// A structural or semantic error in an MDL document.
///
/// The `code` is short and machine readable (`unterminated-line-feature`,
/// `no-reference-to-this-note`, ...). `details` carry free-form context such
/// as the offending key or character.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub code: String,
    pub location: SourceLocation,
    pub details: Vec<String>,
}

impl ParseError {
    pub fn new(code: impl Into<String>, location: SourceLocation) -> Self {
        ParseError {
            code: code.into(),
            location,
            details: Vec::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }

    /// Render as `path:line,col:code[:detail...]`, expanding tabs to `tab_size` columns.
    pub fn format_with(&self, tab_size: usize) -> String {
        let (path, line, col) = self.location.translate(tab_size);
        let mut text = format!("{}:{},{}:{}", path.unwrap_or("<input>"), line, col, self.code);
        for detail in &self.details {
            text.push(':');
            text.push_str(detail);
        }
        text
    }

    /// The source lines surrounding the failure, each prefixed with `" | "`.
    pub fn context(&self, before: usize, after: usize) -> String {
        self.location.context(before, after)
    }

    /// Convert to a codespan-reporting Diagnostic for display.
    pub fn to_diagnostic(&self, file_id: usize) -> Diagnostic<usize> {
        let start = self.location.offset();
        let end = self.location.next_char_boundary();
        Diagnostic::new(Severity::Error)
            .with_message(&self.code)
            .with_labels(vec![Label::primary(file_id, start..end)])
            .with_notes(self.details.clone())
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_with(DEFAULT_TAB_SIZE))
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;

    #[test]
    fn formats_path_line_and_column() {
        let src = Source::with_path("one\n\ttwo *x\n", "doc.mdl");
        let err = ParseError::new("unterminated-line-feature", src.location_at(9))
            .with_detail("*");
        assert_eq!(err.to_string(), "doc.mdl:2,9:unterminated-line-feature:*");
        assert_eq!(err.format_with(2), "doc.mdl:2,7:unterminated-line-feature:*");
    }

    #[test]
    fn unnamed_buffers_use_placeholder_path() {
        let src = Source::new("abc");
        let err = ParseError::new("bad-indent", src.location_at(1));
        assert_eq!(err.to_string(), "<input>:1,2:bad-indent");
    }
}
