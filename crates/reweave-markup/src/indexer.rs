use regex::Regex;
use serde::{Deserialize, Serialize};

use reweave_types::ProjectFile;

/// Elements that never take a closing tag.
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// File extensions the indexer considers markup-bearing.
const MARKUP_EXTENSIONS: &[&str] = &["jsx", "tsx", "js", "html"];

const SIGNIN_PATTERN: &str =
    r"(?i)\b(sign\s*in|sign\s*up|sign\s*out|log\s*in|log\s*out|login|logout|signin)\b";

const INLINE_TEXT_CAP: usize = 160;
const CONTEXT_LINES: usize = 2;

// ---------------------------------------------------------------------------
// MarkupNode
// ---------------------------------------------------------------------------

/// One markup-element occurrence. The id is unique within the parse pass
/// that produced it and must never be reused across edits of the same file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkupNode {
    pub id: u32,
    pub tag: String,
    /// Inline text content, nested tags and expressions stripped, bounded.
    pub text: String,
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
    /// Verbatim slice of the lines the element spans.
    pub code: String,
    /// The same slice widened by a couple of surrounding lines.
    pub context: String,
    pub is_button: bool,
    pub has_signin_text: bool,
    pub attributes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Index every markup element in `content`, in document order, with
/// sequential ids starting at 0. Nested elements receive independent
/// entries; ranges may overlap. Malformed input degrades to fewer nodes.
pub fn index(content: &str) -> Vec<MarkupNode> {
    let signin = Regex::new(SIGNIN_PATTERN).ok();
    let lines: Vec<&str> = content.lines().collect();
    let mut s = Scanner::new(content);
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut nodes: Vec<MarkupNode> = Vec::new();
    let mut next_id: u32 = 0;

    while let Some(b) = s.peek() {
        // Module-level code is lexed for strings and comments so `<` inside
        // them is never an element; inside elements only tags matter.
        if stack.is_empty() {
            match b {
                b'"' | b'\'' => {
                    s.skip_quoted(b);
                    continue;
                }
                b'`' => {
                    s.skip_template();
                    continue;
                }
                b'/' if s.peek_at(1) == Some(b'/') && s.prev_byte() != Some(b':') => {
                    s.skip_line();
                    continue;
                }
                b'/' if s.peek_at(1) == Some(b'*') => {
                    s.skip_block_comment();
                    continue;
                }
                _ => {}
            }
        }

        if b != b'<' {
            s.bump();
            continue;
        }

        match s.peek_at(1) {
            Some(c) if c.is_ascii_alphabetic() => {
                let start_line = s.line;
                let start_col = s.col;
                s.bump();
                let tag = s.read_tag_name();
                let Some(open_tag) = s.read_open_tag_rest() else {
                    break; // truncated mid-tag
                };
                let id = next_id;
                next_id += 1;
                let inner_start = s.pos;
                let open = OpenElement {
                    id,
                    tag,
                    attributes: open_tag.attributes,
                    start_line,
                    start_col,
                    inner_start,
                };
                let is_void = VOID_TAGS.contains(&open.tag.to_ascii_lowercase().as_str());
                if open_tag.self_closing || is_void {
                    nodes.push(finalize(
                        open,
                        content,
                        &lines,
                        inner_start,
                        open_tag.gt_line,
                        open_tag.gt_col,
                        &signin,
                    ));
                } else {
                    stack.push(open);
                }
            }
            Some(b'/') => {
                let inner_end = s.pos;
                s.bump();
                s.bump();
                let tag = s.read_tag_name();
                let Some((gt_line, gt_col)) = s.consume_to_gt() else {
                    break;
                };
                if let Some(idx) = stack.iter().rposition(|o| o.tag == tag) {
                    let open = stack.remove(idx);
                    // Unclosed elements nested above the match are dropped.
                    stack.truncate(idx);
                    nodes.push(finalize(
                        open, content, &lines, inner_end, gt_line, gt_col, &signin,
                    ));
                }
            }
            Some(b'!') => s.skip_markup_comment_or_doctype(),
            _ => {
                s.bump();
            }
        }
    }

    // Children close before parents; restore document (open) order.
    nodes.sort_by_key(|n| n.id);
    if !stack.is_empty() {
        tracing::debug!(unclosed = stack.len(), "unclosed elements dropped");
    }
    nodes
}

/// Index a scanned project file; non-markup extensions yield an empty list.
pub fn index_project_file(file: &ProjectFile) -> Vec<MarkupNode> {
    let ext = file.name.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
    if !MARKUP_EXTENSIONS.iter().any(|m| m.eq_ignore_ascii_case(ext)) {
        return Vec::new();
    }
    index(&file.content)
}

// ---------------------------------------------------------------------------
// Finalization
// ---------------------------------------------------------------------------

struct OpenElement {
    id: u32,
    tag: String,
    attributes: Vec<String>,
    start_line: usize,
    start_col: usize,
    inner_start: usize,
}

struct OpenTagRest {
    attributes: Vec<String>,
    self_closing: bool,
    gt_line: usize,
    gt_col: usize,
}

fn finalize(
    open: OpenElement,
    content: &str,
    lines: &[&str],
    inner_end: usize,
    end_line: usize,
    end_col: usize,
    signin: &Option<Regex>,
) -> MarkupNode {
    let inner = &content[open.inner_start..inner_end.max(open.inner_start)];
    let text = inline_text(inner);
    let code = slice_lines(lines, open.start_line, end_line);
    let context = slice_lines(
        lines,
        open.start_line.saturating_sub(CONTEXT_LINES).max(1),
        end_line + CONTEXT_LINES,
    );
    let is_button = open.tag.eq_ignore_ascii_case("button") || open.tag.ends_with("Button");
    let has_signin_text = signin.as_ref().is_some_and(|re| re.is_match(&text));
    MarkupNode {
        id: open.id,
        tag: open.tag,
        text,
        start_line: open.start_line,
        start_col: open.start_col,
        end_line,
        end_col,
        code,
        context,
        is_button,
        has_signin_text,
        attributes: open.attributes,
    }
}

/// 1-based inclusive line slice, clamped to the document.
fn slice_lines(lines: &[&str], from: usize, to: usize) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let from = from.max(1) - 1;
    let to = to.min(lines.len());
    if from >= to {
        return String::new();
    }
    lines[from..to].join("\n")
}

/// Text content with nested tags and `{...}` expressions stripped,
/// whitespace collapsed, length bounded.
fn inline_text(inner: &str) -> String {
    let mut raw = String::new();
    let mut in_tag = false;
    let mut brace_depth = 0usize;
    for ch in inner.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            '{' if !in_tag => brace_depth += 1,
            '}' if !in_tag && brace_depth > 0 => brace_depth -= 1,
            c if !in_tag && brace_depth == 0 => raw.push(c),
            _ => {}
        }
    }
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.len() <= INLINE_TEXT_CAP {
        return collapsed;
    }
    let mut end = INLINE_TEXT_CAP;
    while !collapsed.is_char_boundary(end) {
        end -= 1;
    }
    collapsed[..end].to_string()
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// Byte cursor with 1-based line and (byte) column tracking.
struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Scanner<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            bytes: content.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn prev_byte(&self) -> Option<u8> {
        self.pos.checked_sub(1).and_then(|p| self.bytes.get(p)).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(b)
    }

    fn skip_line(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'\n' {
                return;
            }
            self.bump();
        }
    }

    fn skip_block_comment(&mut self) {
        self.bump();
        self.bump();
        while self.peek().is_some() {
            if self.peek() == Some(b'*') && self.peek_at(1) == Some(b'/') {
                self.bump();
                self.bump();
                return;
            }
            self.bump();
        }
    }

    fn skip_quoted(&mut self, quote: u8) {
        self.bump();
        while let Some(b) = self.peek() {
            if b == b'\\' {
                self.bump();
                self.bump();
            } else if b == quote {
                self.bump();
                return;
            } else {
                self.bump();
            }
        }
    }

    fn skip_template(&mut self) {
        self.bump();
        while let Some(b) = self.peek() {
            match b {
                b'\\' => {
                    self.bump();
                    self.bump();
                }
                b'`' => {
                    self.bump();
                    return;
                }
                b'$' if self.peek_at(1) == Some(b'{') => {
                    self.bump();
                    self.skip_braces();
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn skip_braces(&mut self) {
        let mut depth = 0usize;
        while let Some(b) = self.peek() {
            match b {
                b'{' => {
                    depth += 1;
                    self.bump();
                }
                b'}' => {
                    self.bump();
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                b'"' | b'\'' => self.skip_quoted(b),
                b'`' => self.skip_template(),
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn skip_markup_comment_or_doctype(&mut self) {
        if self.peek_at(2) == Some(b'-') && self.peek_at(3) == Some(b'-') {
            for _ in 0..4 {
                self.bump();
            }
            while self.peek().is_some() {
                if self.peek() == Some(b'-')
                    && self.peek_at(1) == Some(b'-')
                    && self.peek_at(2) == Some(b'>')
                {
                    for _ in 0..3 {
                        self.bump();
                    }
                    return;
                }
                self.bump();
            }
        } else {
            while let Some(b) = self.bump() {
                if b == b'>' {
                    return;
                }
            }
        }
    }

    fn read_tag_name(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-' {
                self.bump();
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.bytes[start..self.pos]).to_string()
    }

    fn read_attr_name(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b':' {
                self.bump();
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.bytes[start..self.pos]).to_string()
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.bump();
            } else {
                return;
            }
        }
    }

    /// Attributes and the closing `>` of an open tag. `None` at EOF.
    fn read_open_tag_rest(&mut self) -> Option<OpenTagRest> {
        let mut attributes = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek()? {
                b'>' => {
                    let (gt_line, gt_col) = (self.line, self.col);
                    self.bump();
                    return Some(OpenTagRest {
                        attributes,
                        self_closing: false,
                        gt_line,
                        gt_col,
                    });
                }
                b'/' if self.peek_at(1) == Some(b'>') => {
                    self.bump();
                    let (gt_line, gt_col) = (self.line, self.col);
                    self.bump();
                    return Some(OpenTagRest {
                        attributes,
                        self_closing: true,
                        gt_line,
                        gt_col,
                    });
                }
                b'{' => self.skip_braces(), // spread attributes
                b'"' | b'\'' => {
                    let q = self.peek()?;
                    self.skip_quoted(q);
                }
                c if c.is_ascii_alphabetic() || c == b'_' => {
                    attributes.push(self.read_attr_name());
                    self.skip_whitespace();
                    if self.peek() == Some(b'=') {
                        self.bump();
                        self.skip_whitespace();
                        match self.peek()? {
                            b'"' | b'\'' => {
                                let q = self.peek()?;
                                self.skip_quoted(q);
                            }
                            b'`' => self.skip_template(),
                            b'{' => self.skip_braces(),
                            _ => {
                                while let Some(c) = self.peek() {
                                    if c.is_ascii_whitespace() || c == b'>' || c == b'/' {
                                        break;
                                    }
                                    self.bump();
                                }
                            }
                        }
                    }
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    /// Consume up to and including the next `>`, returning its position.
    fn consume_to_gt(&mut self) -> Option<(usize, usize)> {
        loop {
            if self.peek()? == b'>' {
                let at = (self.line, self.col);
                self.bump();
                return Some(at);
            }
            self.bump();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
