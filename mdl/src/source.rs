//! Cursor over immutable MDL text.
//!
//! A [`Source`] owns a shared handle to its [`SourceBuffer`] plus a private
//! cursor. Every position it hands out is a [`SourceLocation`], which keeps
//! the buffer alive and can be translated into `(path, line, column)` for
//! diagnostics long after parsing finished.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::parser::error::ParseError;

pub const DEFAULT_TAB_SIZE: usize = 4;

static SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A\s+").unwrap());
static NONLINE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A[\s&&[^\r\n]]+").unwrap());
static LEAD_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A[\p{Zs}\t]*").unwrap());
static EMPTY_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\A[\p{Zs}\t]*(?:\r?\n|\z)").unwrap());
static REST_OF_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\A[^\r\n]*").unwrap());

/// The text of one input, with the path it was read from.
#[derive(Debug)]
pub struct SourceBuffer {
    path: Option<String>,
    text: String,
}

impl SourceBuffer {
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// An offset into a specific buffer.
#[derive(Clone)]
pub struct SourceLocation {
    buffer: Arc<SourceBuffer>,
    offset: usize,
}

impl SourceLocation {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn path(&self) -> Option<&str> {
        self.buffer.path()
    }

    /// The whole (line-ending folded) text this location points into.
    pub fn source_text(&self) -> &str {
        self.buffer.text()
    }

    /// `(path, line, column)`, both 1-based. Tabs advance the column by `tab_size`.
    pub fn translate(&self, tab_size: usize) -> (Option<&str>, usize, usize) {
        (self.path(), self.line(), self.column(tab_size))
    }

    pub fn line(&self) -> usize {
        let before = &self.buffer.text[..self.clamped()];
        before.bytes().filter(|&b| b == b'\n').count() + 1
    }

    pub fn column(&self, tab_size: usize) -> usize {
        let before = &self.buffer.text[..self.clamped()];
        let line_start = before.rfind('\n').map(|p| p + 1).unwrap_or(0);
        before[line_start..]
            .chars()
            .map(|c| if c == '\t' { tab_size } else { 1 })
            .sum::<usize>()
            + 1
    }

    /// Up to `before` lines preceding the line holding this location, then up
    /// to `after` lines starting with it. Each line is prefixed with `" | "`.
    pub fn context(&self, before: usize, after: usize) -> String {
        let lines: Vec<&str> = self.buffer.text.lines().collect();
        let index = self.line() - 1;
        let first = index.saturating_sub(before);
        let last = (index + after).min(lines.len());

        let mut out = String::new();
        for line in lines.iter().take(last).skip(first) {
            out.push_str(" | ");
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Byte offset just past the character at this location, for diagnostic spans.
    pub fn next_char_boundary(&self) -> usize {
        let at = self.clamped();
        self.buffer.text[at..]
            .chars()
            .next()
            .map(|c| at + c.len_utf8())
            .unwrap_or(at)
    }

    fn clamped(&self) -> usize {
        self.offset.min(self.buffer.text.len())
    }
}

impl PartialEq for SourceLocation {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer) && self.offset == other.offset
    }
}

impl fmt::Debug for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (path, line, col) = self.translate(DEFAULT_TAB_SIZE);
        write!(f, "{}:{},{}", path.unwrap_or("<input>"), line, col)
    }
}

/// Owned capture groups of a successful regex match. Offsets are absolute
/// into the buffer.
#[derive(Debug, Clone)]
pub struct Captured {
    start: usize,
    end: usize,
    groups: Vec<Option<String>>,
}

impl Captured {
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Group 0 is the whole match. Missing or non-participating groups are `None`.
    pub fn group(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|g| g.as_deref())
    }
}

/// Where [`Source::parse_string_to`] stops.
#[derive(Debug, Clone, Copy)]
pub enum Terminal<'r> {
    Char(char),
    Regex(&'r Regex),
}

/// A cursor over one buffer, optionally restricted to a window of it.
pub struct Source {
    buffer: Arc<SourceBuffer>,
    at: usize,
    end: usize,
}

impl Source {
    pub fn new(text: impl Into<String>) -> Self {
        Self::from_buffer(SourceBuffer {
            path: None,
            text: text.into(),
        })
    }

    pub fn with_path(text: impl Into<String>, path: impl Into<String>) -> Self {
        Self::from_buffer(SourceBuffer {
            path: Some(path.into()),
            text: text.into(),
        })
    }

    pub fn with_filename(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::with_path(text, path.display().to_string()))
    }

    /// CRLF line endings are folded to `\n`; offsets refer to the folded text.
    fn from_buffer(mut buffer: SourceBuffer) -> Self {
        if buffer.text.contains("\r\n") {
            buffer.text = buffer.text.replace("\r\n", "\n");
        }
        let end = buffer.text.len();
        Source {
            buffer: Arc::new(buffer),
            at: 0,
            end,
        }
    }

    /// An independent cursor over `start..end` of the same buffer. Locations
    /// it produces translate against the whole file.
    pub fn window(&self, start: usize, end: usize) -> Source {
        assert!(start <= end && end <= self.buffer.text.len());
        Source {
            buffer: Arc::clone(&self.buffer),
            at: start,
            end,
        }
    }

    pub fn buffer(&self) -> &Arc<SourceBuffer> {
        &self.buffer
    }

    pub fn position(&self) -> usize {
        self.at
    }

    pub fn location(&self) -> SourceLocation {
        self.location_at(self.at)
    }

    pub fn location_at(&self, offset: usize) -> SourceLocation {
        SourceLocation {
            buffer: Arc::clone(&self.buffer),
            offset,
        }
    }

    /// Rewind (or advance) to a location previously taken from this source.
    pub fn restore_location(&mut self, location: &SourceLocation) {
        assert!(Arc::ptr_eq(&self.buffer, &location.buffer));
        assert!(location.offset <= self.end);
        self.at = location.offset;
    }

    /// Move the cursor to an absolute offset inside the window.
    pub fn seek(&mut self, offset: usize) {
        assert!(offset <= self.end);
        self.at = offset;
    }

    /// Build an error located at the cursor.
    pub fn fail(&self, code: &str) -> ParseError {
        ParseError::new(code, self.location())
    }

    pub fn is_at_end(&self) -> bool {
        self.at >= self.end
    }

    fn rest(&self) -> &str {
        &self.buffer.text[self.at..self.end]
    }

    pub fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn peek_char_at(&self, skip: usize) -> Option<char> {
        self.rest().chars().nth(skip)
    }

    pub fn next_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.at += c.len_utf8();
        Some(c)
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.rest().starts_with(prefix)
    }

    /// Advance past `prefix` if the cursor is on it.
    pub fn skip_str(&mut self, prefix: &str) -> bool {
        if self.starts_with(prefix) {
            self.at += prefix.len();
            true
        } else {
            false
        }
    }

    pub fn skip_space(&mut self) {
        self.match_regex(&SPACE);
    }

    pub fn skip_nonline_space(&mut self) {
        self.match_regex(&NONLINE_SPACE);
    }

    /// Skip whitespace-only lines, returning how many were skipped.
    pub fn skip_empty_lines(&mut self) -> usize {
        let mut count = 0;
        while !self.is_at_end() {
            let Some(m) = EMPTY_LINE.find(self.rest()) else {
                break;
            };
            self.at += m.end();
            count += 1;
        }
        count
    }

    /// The rest of the current line, without its line ending, which is left unconsumed.
    pub fn match_line(&mut self) -> String {
        self.match_regex(&REST_OF_LINE)
            .and_then(|m| m.group(0).map(str::to_string))
            .unwrap_or_default()
    }

    /// Offset where the current line ends, before its line ending or at the
    /// end of the window.
    pub fn line_end(&self) -> usize {
        let rest = self.rest();
        self.at + rest.find('\n').unwrap_or(rest.len())
    }

    /// Consume a single line ending if the cursor is on one.
    pub fn skip_line_end(&mut self) -> bool {
        self.skip_str("\r\n") || self.skip_str("\n") || self.skip_str("\r")
    }

    /// Match an anchored (`\A`) pattern at the cursor, advancing on success.
    pub fn match_regex(&mut self, re: &Regex) -> Option<Captured> {
        let m = self.peek_match(re)?;
        self.at = m.end;
        Some(m)
    }

    /// Match an anchored (`\A`) pattern at the cursor without advancing.
    pub fn peek_match(&self, re: &Regex) -> Option<Captured> {
        let caps = re.captures(self.rest())?;
        let whole = caps.get(0)?;
        if whole.start() != 0 {
            return None;
        }
        Some(self.captured(&caps))
    }

    /// Search forward for `re`. On success the cursor moves past the match and
    /// the skipped text is returned alongside it.
    pub fn to_match(&mut self, re: &Regex) -> Option<(Captured, String)> {
        let caps = re.captures(self.rest())?;
        let whole = caps.get(0)?;
        let skipped = self.rest()[..whole.start()].to_string();
        let m = self.captured(&caps);
        self.at = m.end;
        Some((m, skipped))
    }

    fn captured(&self, caps: &regex::Captures<'_>) -> Captured {
        let base = self.at;
        let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
        Captured {
            start: base + whole.0,
            end: base + whole.1,
            groups: caps
                .iter()
                .map(|g| g.map(|m| m.as_str().to_string()))
                .collect(),
        }
    }

    /// The leading whitespace of the current line, not consumed.
    pub fn lead_space(&self) -> String {
        LEAD_SPACE
            .find(self.rest())
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }

    /// Consume the leading whitespace if it equals `expected`.
    pub fn match_indent(&mut self, expected: &str) -> (bool, String) {
        let lead = self.lead_space();
        if lead != expected {
            return (false, lead);
        }
        self.at += lead.len();
        (true, lead)
    }

    /// Whether the leading whitespace strictly extends `expected`. Not consumed.
    pub fn exceed_indent(&self, expected: &str) -> (bool, String) {
        let lead = self.lead_space();
        let exceeds = lead.len() > expected.len() && lead.starts_with(expected);
        (exceeds, lead)
    }

    /// Read up to whitespace or any character in `exclude`.
    pub fn parse_token(&mut self, exclude: &[char]) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() || exclude.contains(&c) {
                break;
            }
            text.push(c);
            self.at += c.len_utf8();
        }
        text
    }

    /// Read an escape-aware string up to and including `close_char`.
    pub fn parse_string(&mut self, close_char: char) -> String {
        self.parse_string_to(Terminal::Char(close_char), true)
    }

    /// Read an escape-aware string up to a terminal character or pattern.
    /// The terminal is consumed only when `consume_terminal` is set.
    pub fn parse_string_to(&mut self, terminal: Terminal<'_>, consume_terminal: bool) -> String {
        let mut text = String::new();
        while !self.is_at_end() {
            let hit = match terminal {
                Terminal::Char(close) => {
                    if self.peek_char() == Some(close) {
                        Some(close.len_utf8())
                    } else {
                        None
                    }
                }
                Terminal::Regex(re) => self.peek_match(re).map(|m| m.end - m.start),
            };
            if let Some(len) = hit {
                if consume_terminal {
                    self.at += len;
                }
                break;
            }
            match self.next_char() {
                Some('\\') => {
                    if let Some(escaped) = self.next_char() {
                        text.push(escaped);
                    }
                }
                Some(c) => text.push(c),
                None => break,
            }
        }
        text
    }

    /// Read a whitespace-separated, quote-aware argument list up to
    /// `close_char` (consumed) or the end of the window.
    ///
    /// Returns the arguments and whether `close_char` was found.
    pub fn parse_args(&mut self, close_char: Option<char>) -> Result<(Vec<String>, bool), ParseError> {
        let mut args = Vec::new();
        loop {
            self.skip_space();
            let Some(c) = self.peek_char() else {
                return Ok((args, false));
            };
            if Some(c) == close_char {
                self.at += c.len_utf8();
                return Ok((args, true));
            }

            if c == '"' {
                let open = self.location();
                self.at += 1;
                let mut arg = String::new();
                let mut closed = false;
                while let Some(c) = self.next_char() {
                    match c {
                        '\\' => {
                            if let Some(escaped) = self.next_char() {
                                arg.push(escaped);
                            }
                        }
                        '"' => {
                            closed = true;
                            break;
                        }
                        _ => arg.push(c),
                    }
                }
                if !closed {
                    return Err(ParseError::new("unterminated-string", open));
                }
                args.push(arg);
                continue;
            }

            let mut arg = String::new();
            while let Some(c) = self.peek_char() {
                if c.is_whitespace() || Some(c) == close_char {
                    break;
                }
                self.at += c.len_utf8();
                if c == '\\' {
                    if let Some(escaped) = self.next_char() {
                        arg.push(escaped);
                    }
                } else {
                    arg.push(c);
                }
            }
            args.push(arg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_lines_and_tab_columns() {
        let src = Source::with_path("a\n\tb\n", "x.mdl");
        let loc = src.location_at(3);
        assert_eq!(loc.translate(4), (Some("x.mdl"), 2, 5));
        assert_eq!(loc.translate(8), (Some("x.mdl"), 2, 9));
        assert_eq!(src.location_at(0).translate(4), (Some("x.mdl"), 1, 1));
    }

    #[test]
    fn context_window_surrounds_the_failing_line() {
        let src = Source::new("l1\nl2\nl3\nl4\nl5\nl6\nl7\n");
        let loc = src.location_at(9); // start of l4
        assert_eq!(loc.context(2, 3), " | l2\n | l3\n | l4\n | l5\n | l6\n");
        assert_eq!(src.location_at(0).context(2, 3), " | l1\n | l2\n | l3\n");
    }

    #[test]
    fn skip_empty_lines_counts_blank_lines() {
        let mut src = Source::new("\n  \n\t\ntext\n");
        assert_eq!(src.skip_empty_lines(), 3);
        assert_eq!(src.peek_char(), Some('t'));
        assert_eq!(src.skip_empty_lines(), 0);
    }

    #[test]
    fn match_advances_and_peek_does_not() {
        let re = Regex::new(r"\A(#+)\s").unwrap();
        let mut src = Source::new("## Title");
        let peeked = src.peek_match(&re).unwrap();
        assert_eq!(peeked.group(1), Some("##"));
        assert_eq!(src.position(), 0);
        let matched = src.match_regex(&re).unwrap();
        assert_eq!(matched.end(), 3);
        assert_eq!(src.position(), 3);
        assert!(src.match_regex(&re).is_none());
    }

    #[test]
    fn to_match_returns_skipped_text() {
        let re = Regex::new(r"(?m)^```").unwrap();
        let mut src = Source::new("code\nmore\n```\nafter");
        let (m, text) = src.to_match(&re).unwrap();
        assert_eq!(text, "code\nmore\n");
        assert_eq!(m.start(), 10);
        assert_eq!(src.match_line(), "");
    }

    #[test]
    fn indentation_helpers() {
        let mut src = Source::new("\t\tdeep");
        assert_eq!(src.exceed_indent("\t"), (true, "\t\t".to_string()));
        assert_eq!(src.exceed_indent("\t\t"), (false, "\t\t".to_string()));
        assert_eq!(src.exceed_indent("  "), (false, "\t\t".to_string()));
        assert_eq!(src.match_indent("\t"), (false, "\t\t".to_string()));
        assert_eq!(src.position(), 0);
        assert_eq!(src.match_indent("\t\t"), (true, "\t\t".to_string()));
        assert_eq!(src.position(), 2);
    }

    #[test]
    fn string_readers_handle_escapes() {
        let mut src = Source::new(r"a\]b] rest");
        assert_eq!(src.parse_string(']'), "a]b");
        assert_eq!(src.peek_char(), Some(' '));

        let mut src = Source::new("word, next");
        assert_eq!(src.parse_token(&[',']), "word");

        let stop = Regex::new(r"\A\s").unwrap();
        let mut src = Source::new("up to here");
        assert_eq!(src.parse_string_to(Terminal::Regex(&stop), false), "up");
        assert_eq!(src.peek_char(), Some(' '));
    }

    #[test]
    fn args_are_quote_aware() {
        let mut src = Source::new(r#" one "two words" th\ ree } tail"#);
        let (args, closed) = src.parse_args(Some('}')).unwrap();
        assert!(closed);
        assert_eq!(args, vec!["one", "two words", "th ree"]);
        assert_eq!(src.match_line(), " tail");
    }

    #[test]
    fn unterminated_quote_fails() {
        let mut src = Source::new(r#""open"#);
        let err = src.parse_args(None).unwrap_err();
        assert_eq!(err.code, "unterminated-string");
    }

    #[test]
    fn windows_share_locations_with_the_file() {
        let src = Source::new("line one\nline two");
        let mut inner = src.window(9, 13);
        assert_eq!(inner.parse_token(&[]), "line");
        assert!(inner.is_at_end());
        assert_eq!(inner.location().line(), 2);
    }

    #[test]
    fn crlf_is_folded() {
        let mut src = Source::new("a\r\n\r\nb\r\n");
        assert_eq!(src.match_line(), "a");
        assert_eq!(src.line_end(), 1);
        assert!(src.skip_line_end());
        assert_eq!(src.skip_empty_lines(), 1);
        assert_eq!(src.location().translate(4), (None, 3, 1));
        assert_eq!(src.line_end(), 4);
        assert_eq!(src.location().source_text(), "a\n\nb\n");
    }

    #[test]
    fn restore_location_rewinds() {
        let mut src = Source::new("abc");
        let mark = src.location();
        src.next_char();
        src.next_char();
        src.restore_location(&mark);
        assert_eq!(src.peek_char(), Some('a'));
    }
}
