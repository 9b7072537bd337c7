use once_cell::sync::Lazy;
use regex::Regex;

use crate::parse_tree::{Node, NodeType};
use crate::parser::error::ParseError;
use crate::parser::structural::MAX_NESTING;
use crate::source::{Source, SourceLocation, Terminal};

static NOTE_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A\^([\p{L}\p{N}]*)").unwrap());

/// Class of the inline node produced by the `::` header marker.
pub const HEADER_CLASS: &str = "::";
/// Class of footnote reference nodes.
pub const NOTE_CLASS: &str = "^";

// ---------------------------------------------------------------------------
// Feature table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    /// Body is tokenized recursively.
    Nested,
    /// Body is captured verbatim into the node text.
    Raw,
    /// Body is split into an argument list.
    Args,
}

/// An inline construct opened by `open` and closed by `close` on the same line.
#[derive(Debug, Clone, Copy)]
pub struct Feature {
    pub open: char,
    pub close: char,
    pub kind: FeatureKind,
}

impl Feature {
    pub const fn new(open: char, close: char, kind: FeatureKind) -> Self {
        Feature { open, close, kind }
    }
}

pub const DEFAULT_FEATURES: &[Feature] = &[
    Feature::new('*', '*', FeatureKind::Nested),
    Feature::new('_', '_', FeatureKind::Nested),
    Feature::new('`', '`', FeatureKind::Raw),
    Feature::new('[', ']', FeatureKind::Nested),
    Feature::new('(', ')', FeatureKind::Raw),
    Feature::new('{', '}', FeatureKind::Args),
];

// ---------------------------------------------------------------------------
// Ligatures
// ---------------------------------------------------------------------------

/// Character sequences replaced in plain text. Longest match wins.
#[derive(Debug, Clone)]
pub struct Ligatures {
    table: Vec<(String, String)>,
    longest: usize,
}

impl Default for Ligatures {
    fn default() -> Self {
        Ligatures::empty()
            .with("--", "\u{2014}")
            .with("...", "\u{2026}")
            .with(":)", "\u{263A}")
    }
}

impl Ligatures {
    pub fn empty() -> Self {
        Ligatures {
            table: Vec::new(),
            longest: 0,
        }
    }

    pub fn with(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        self.longest = self.longest.max(from.chars().count());
        self.table.push((from, to.into()));
        self.table.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    /// Length in characters of the longest sequence in the table.
    pub fn longest(&self) -> usize {
        self.longest
    }

    /// The replacement for the sequence at the start of `text`, with its length.
    pub fn lookup(&self, text: &str) -> Option<(&str, usize)> {
        self.table
            .iter()
            .find(|(from, _)| text.starts_with(from.as_str()))
            .map(|(from, to)| (to.as_str(), from.len()))
    }

    pub fn apply(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(c) = rest.chars().next() {
            if let Some((to, len)) = self.lookup(rest) {
                out.push_str(to);
                rest = &rest[len..];
            } else {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

/// Lexes the inline content of a line or feature body into parse nodes.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    features: Vec<Feature>,
    ligatures: Ligatures,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Tokenizer::new(DEFAULT_FEATURES.to_vec(), Ligatures::default())
    }
}

/// Accumulates inline nodes for one nesting level.
struct Run {
    bits: Vec<Node>,
    text: String,
    text_start: Option<SourceLocation>,
}

impl Run {
    fn new() -> Self {
        Run {
            bits: Vec::new(),
            text: String::new(),
            text_start: None,
        }
    }

    fn push_char(&mut self, src: &Source, c: char) {
        self.push_str(src, &c.to_string());
    }

    fn push_str(&mut self, src: &Source, s: &str) {
        if self.text_start.is_none() {
            self.text_start = Some(src.location());
        }
        self.text.push_str(s);
    }

    fn end_text(&mut self) {
        if let Some(start) = self.text_start.take() {
            let text = std::mem::take(&mut self.text);
            self.push(Node::text_node(text, start));
        }
    }

    fn push(&mut self, node: Node) {
        if node.node_type() == NodeType::Text {
            if let Some(last) = self.bits.last_mut() {
                if last.node_type() == NodeType::Text {
                    last.text.push_str(&node.text);
                    return;
                }
            }
        }
        self.bits.push(node);
    }

    /// Wrap everything since the previous header marker into a header node.
    fn mark_header(&mut self, location: SourceLocation) {
        self.end_text();
        let at = self
            .bits
            .iter()
            .rposition(|n| n.node_type() == NodeType::Inline && n.class == HEADER_CLASS)
            .map(|p| p + 1)
            .unwrap_or(0);
        let collected = self.bits.split_off(at);
        let mut header = Node::with_class(NodeType::Inline, HEADER_CLASS, location);
        header.add_children(collected);
        self.bits.push(header);
    }

    fn finish(mut self) -> Vec<Node> {
        self.end_text();
        self.bits
    }
}

fn at_line_end(src: &Source) -> bool {
    src.starts_with("\n")
}

impl Tokenizer {
    pub fn new(features: Vec<Feature>, ligatures: Ligatures) -> Self {
        Tokenizer { features, ligatures }
    }

    pub fn ligatures(&self) -> &Ligatures {
        &self.ligatures
    }

    fn feature(&self, c: char) -> Option<Feature> {
        self.features.iter().find(|f| f.open == c).copied()
    }

    /// Tokenize up to and including the end of the current line.
    pub fn parse_line(&self, src: &mut Source) -> Result<Vec<Node>, ParseError> {
        self.parse_until(src, None, None, 0)
    }

    /// Tokenize until `terminal`, which must appear before the end of the line.
    fn parse_until(
        &self,
        src: &mut Source,
        terminal: Option<char>,
        opened_at: Option<&SourceLocation>,
        depth: usize,
    ) -> Result<Vec<Node>, ParseError> {
        let mut run = Run::new();

        loop {
            let Some(c) = src.peek_char() else {
                break;
            };
            if Some(c) == terminal {
                src.next_char();
                return Ok(run.finish());
            }
            if at_line_end(src) {
                if terminal.is_none() {
                    src.skip_line_end();
                    return Ok(run.finish());
                }
                break;
            }

            if c == '\\' {
                src.next_char();
                match src.peek_char() {
                    Some(escaped) if !at_line_end(src) => {
                        run.push_char(src, escaped);
                        src.next_char();
                    }
                    _ => run.push_char(src, '\\'),
                }
                continue;
            }

            if c == '^' {
                let location = src.location();
                if let Some(m) = src.match_regex(&NOTE_REF) {
                    run.end_text();
                    let mut note = Node::with_class(NodeType::Inline, NOTE_CLASS, location);
                    note.text = m.group(1).unwrap_or_default().to_string();
                    run.push(note);
                    continue;
                }
            }

            if src.starts_with("::") {
                let location = src.location();
                src.skip_str("::");
                run.mark_header(location);
                continue;
            }

            if let Some(feature) = self.feature(c) {
                if let Some(node) = self.parse_feature(src, feature, depth + 1)? {
                    run.end_text();
                    run.push(node);
                    continue;
                }
            }

            let rest_start = src.location();
            if let Some((to, len)) = self.lookup_ligature(src) {
                run.push_str(src, &to);
                src.seek(rest_start.offset() + len);
                continue;
            }

            run.push_char(src, c);
            src.next_char();
        }

        match (terminal, opened_at) {
            (Some(close), Some(open)) => Err(unterminated(close, open)),
            _ => Ok(run.finish()),
        }
    }

    fn lookup_ligature(&self, src: &Source) -> Option<(String, usize)> {
        let ahead: String = (0..self.ligatures.longest())
            .map_while(|i| src.peek_char_at(i))
            .collect();
        self.ligatures
            .lookup(&ahead)
            .map(|(to, len)| (to.to_string(), len))
    }

    /// Parse the feature opening at the cursor. `None` means the opener is
    /// literal text here (an unclosed parenthesis).
    fn parse_feature(
        &self,
        src: &mut Source,
        feature: Feature,
        depth: usize,
    ) -> Result<Option<Node>, ParseError> {
        if depth > MAX_NESTING {
            return Err(src.fail("nesting-too-deep"));
        }
        let location = src.location();

        if feature.open == '(' {
            return Ok(self.try_parenthetical(src));
        }

        src.next_char();
        let mut node = Node::with_class(NodeType::Inline, feature.open.to_string(), location.clone());

        match feature.kind {
            FeatureKind::Nested => {
                let children = self.parse_until(src, Some(feature.close), Some(&location), depth)?;
                node.add_children(children);
            }
            FeatureKind::Raw => {
                node.text = read_raw(src, feature.close, &location)?;
            }
            FeatureKind::Args => {
                let Some((_, end)) = scan_to_close(src, feature.close) else {
                    return Err(unterminated(feature.close, &location));
                };
                let mut inner = src.window(src.position(), end);
                let (args, _) = inner.parse_args(None)?;
                node.args = args;
                src.seek(end + feature.close.len_utf8());
            }
        }

        if feature.open == '[' && src.peek_char() == Some('(') {
            if let Some(attr) = self.try_parenthetical(src) {
                node.attrs.push(attr);
            }
        }

        Ok(Some(node))
    }

    /// A `(...)` closed on the same line, or `None` with the cursor untouched.
    fn try_parenthetical(&self, src: &mut Source) -> Option<Node> {
        let start = src.location();
        src.next_char();
        match read_raw(src, ')', &start) {
            Ok(text) => {
                let mut node = Node::with_class(NodeType::Inline, "(", start);
                node.text = text;
                Some(node)
            }
            Err(_) => {
                src.restore_location(&start);
                None
            }
        }
    }
}

fn unterminated(close: char, opened_at: &SourceLocation) -> ParseError {
    ParseError::new("unterminated-line-feature", opened_at.clone()).with_detail(close.to_string())
}

/// Escape-aware text up to the next unescaped `close` on the current line,
/// with the offset of that `close`. The cursor does not move.
fn scan_to_close(src: &Source, close: char) -> Option<(String, usize)> {
    let mut line = src.window(src.position(), src.line_end());
    let text = line.parse_string_to(Terminal::Char(close), false);
    (line.peek_char() == Some(close)).then(|| (text, line.position()))
}

/// Read escape-aware raw text up to `close` (consumed) on the current line.
fn read_raw(src: &mut Source, close: char, opened_at: &SourceLocation) -> Result<String, ParseError> {
    let (text, end) = scan_to_close(src, close).ok_or_else(|| unterminated(close, opened_at))?;
    src.seek(end + close.len_utf8());
    Ok(text)
}
