//! Lexer implementation

use std::collections::HashMap;

use glossa_core::entities::decode_entity;

use super::token::*;

// ============================================================================
// LEXER IMPLEMENTATION
// ============================================================================

/// Tags whose contents are kept verbatim.
pub const RAW_TAGS: &[&str] = &["nowiki", "pre", "math", "source", "syntaxhighlight"];

/// Tag names recognised as markup; anything else after `<` is text.
const KNOWN_TAGS: &[&str] = &[
    "noinclude", "includeonly", "onlyinclude", "ref", "references", "gallery", "poem", "section",
    "nowiki", "pre", "math", "source", "syntaxhighlight", "br", "hr", "span", "div", "p", "sup",
    "sub", "small", "big", "b", "i", "u", "s", "del", "ins", "em", "strong", "code", "tt", "font",
    "center", "blockquote", "abbr", "table", "tr", "td", "th", "ul", "ol", "li", "dl", "dt", "dd",
];

const URL_SCHEMES: &[&str] = &[
    "http://", "https://", "ftp://", "irc://", "news:", "mailto:", "//",
];

/// Longest character reference body we look for.
const MAX_ENTITY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BraceRole {
    TemplateOpen,
    TemplateClose,
    ArgumentOpen,
    ArgumentClose,
}

/// Lexer for wikitext.
pub struct Lexer<'a> {
    source: &'a str,
    /// ASCII-lowercased copy; byte offsets match `source`.
    lower: String,
    pos: usize,
    line: usize,
    column: usize,
    braces: HashMap<usize, (BraceRole, usize)>,
    /// Pending heading close: (start of closing `=` run, end of line, level).
    heading_end: Option<(usize, usize, u8)>,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'a str) -> Self {
        let lower = source.to_ascii_lowercase();
        let braces = pair_braces(source, &lower);
        Self {
            source,
            lower,
            pos: 0,
            line: 1,
            column: 1,
            braces,
            heading_end: None,
        }
    }

    /// Tokenize the entire source into a vector of tokens.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        tokens
    }

    /// Get the next token from the source.
    fn next_token(&mut self) -> Token {
        let start_pos = self.pos;
        let start_line = self.line;
        let start_col = self.column;

        let kind = self.scan();

        Token {
            kind,
            span: Span {
                start: start_pos,
                end: self.pos,
                line: start_line,
                column: start_col,
            },
        }
    }

    fn scan(&mut self) -> TokenKind {
        if let Some((at, line_end, level)) = self.heading_end {
            if self.pos == at {
                self.heading_end = None;
                self.advance_to(line_end);
                return TokenKind::HeadingEnd(level);
            }
            if self.pos > at {
                self.heading_end = None;
            }
        }

        let source = self.source;
        let rest = &source[self.pos..];
        let Some(c) = rest.chars().next() else {
            return TokenKind::Eof;
        };

        if self.at_line_start() && c == '=' {
            if let Some(level) = self.scan_heading_start() {
                return TokenKind::HeadingStart(level);
            }
        }

        match c {
            '{' | '}' => {
                if let Some(&(role, len)) = self.braces.get(&self.pos) {
                    self.advance_to(self.pos + len);
                    return match role {
                        BraceRole::TemplateOpen => TokenKind::TemplateOpen,
                        BraceRole::TemplateClose => TokenKind::TemplateClose,
                        BraceRole::ArgumentOpen => TokenKind::ArgumentOpen,
                        BraceRole::ArgumentClose => TokenKind::ArgumentClose,
                    };
                }
                self.single_char_text()
            }
            '<' => {
                if rest.starts_with("<!--") {
                    return self.scan_comment();
                }
                self.scan_tag().unwrap_or_else(|| self.single_char_text())
            }
            '[' => {
                if rest.starts_with("[[") {
                    self.advance_to(self.pos + 2);
                    return TokenKind::LinkOpen;
                }
                self.scan_external().unwrap_or_else(|| self.single_char_text())
            }
            ']' => {
                if rest.starts_with("]]") {
                    self.advance_to(self.pos + 2);
                    TokenKind::LinkClose
                } else {
                    self.advance_to(self.pos + 1);
                    TokenKind::BracketClose
                }
            }
            '|' => {
                self.advance_to(self.pos + 1);
                TokenKind::Pipe
            }
            '=' => {
                self.advance_to(self.pos + 1);
                TokenKind::Equals
            }
            '&' => self.scan_entity().unwrap_or_else(|| self.single_char_text()),
            _ => self.scan_text(),
        }
    }

    /// Scan a run of plain text, up to the next character that may start
    /// markup or the next line start.
    fn scan_text(&mut self) -> TokenKind {
        let start = self.pos;
        let stop = self.heading_end.map(|(at, _, _)| at);
        let mut end = start;
        for (offset, c) in self.source[start..].char_indices() {
            let at = start + offset;
            if at > start && (Some(at) == stop || is_special(c)) {
                break;
            }
            end = at + c.len_utf8();
            if c == '\n' {
                break;
            }
        }
        self.advance_to(end);
        TokenKind::Text(self.source[start..end].to_string())
    }

    fn single_char_text(&mut self) -> TokenKind {
        let start = self.pos;
        let len = self.source[start..].chars().next().map_or(0, char::len_utf8);
        self.advance_to(start + len);
        TokenKind::Text(self.source[start..self.pos].to_string())
    }

    /// Detect `== title ==` at line start. Consumes the opening run and
    /// remembers where the closing run begins.
    fn scan_heading_start(&mut self) -> Option<u8> {
        let line_end = self.source[self.pos..]
            .find('\n')
            .map_or(self.source.len(), |i| self.pos + i);
        let line = &self.source[self.pos..line_end];
        let trimmed = line.trim_end_matches([' ', '\t', '\r']);
        let lead = trimmed.bytes().take_while(|b| *b == b'=').count();
        let trail = trimmed.bytes().rev().take_while(|b| *b == b'=').count();
        let level = lead.min(trail).min(6);
        if level == 0 || trimmed.len() <= 2 * level {
            return None;
        }
        self.heading_end = Some((self.pos + trimmed.len() - level, line_end, level as u8));
        self.advance_to(self.pos + level);
        Some(level as u8)
    }

    fn scan_comment(&mut self) -> TokenKind {
        let body_start = self.pos + 4;
        let (body_end, end) = match self.source[body_start..].find("-->") {
            Some(i) => (body_start + i, body_start + i + 3),
            None => (self.source.len(), self.source.len()),
        };
        let body = self.source[body_start..body_end].to_string();
        self.advance_to(end);
        TokenKind::Comment(body)
    }

    fn scan_tag(&mut self) -> Option<TokenKind> {
        let rest = &self.lower[self.pos..];
        if let Some(after) = rest.strip_prefix("</") {
            let name = tag_name(after)?;
            let tail = after[name.len()..].trim_start();
            if !tail.starts_with('>') {
                return None;
            }
            let end = self.pos + rest.len() - tail.len() + 1;
            let name = name.to_string();
            self.advance_to(end);
            return Some(TokenKind::TagClose(name));
        }

        let after = rest.strip_prefix('<')?;
        let name = tag_name(after)?.to_string();
        let attrs_start = self.pos + 1 + name.len();
        let close = self.source[attrs_start..].find(['>', '<', '\n', '{', '}'])?;
        if self.source.as_bytes()[attrs_start + close] != b'>' {
            return None;
        }
        let raw_attrs = &self.source[attrs_start..attrs_start + close];
        if !(raw_attrs.is_empty() || raw_attrs.starts_with([' ', '\t', '/'])) {
            return None;
        }
        let open_end = attrs_start + close + 1;
        let self_closing = raw_attrs.trim_end().ends_with('/');
        let attrs = raw_attrs
            .trim_end()
            .trim_end_matches('/')
            .to_string();

        if !self_closing && RAW_TAGS.contains(&name.as_str()) {
            if let Some((body_end, end)) = find_close_tag(&self.lower, open_end, &name) {
                let body = self.source[open_end..body_end].to_string();
                self.advance_to(end);
                return Some(TokenKind::RawTag { name, attrs, body });
            }
        }

        self.advance_to(open_end);
        Some(TokenKind::TagOpen {
            name,
            attrs,
            self_closing,
        })
    }

    fn scan_external(&mut self) -> Option<TokenKind> {
        let url_start = self.pos + 1;
        let rest = &self.lower[url_start..];
        let scheme = URL_SCHEMES.iter().find(|s| rest.starts_with(**s))?;
        let len = self.source[url_start..]
            .find(|c: char| c.is_whitespace() || "[]<>{}|\"".contains(c))
            .unwrap_or(self.source.len() - url_start);
        if len <= scheme.len() {
            return None;
        }
        let url = self.source[url_start..url_start + len].to_string();
        let mut end = url_start + len;
        let spaced = self.source[end..].starts_with(' ');
        if spaced {
            end += 1;
        }
        self.advance_to(end);
        Some(TokenKind::ExternalOpen { url, spaced })
    }

    fn scan_entity(&mut self) -> Option<TokenKind> {
        let body_start = self.pos + 1;
        let window = &self.source[body_start..];
        let semi = window
            .char_indices()
            .take(MAX_ENTITY_LEN + 1)
            .find(|(_, c)| *c == ';')?
            .0;
        let body = &window[..semi];
        decode_entity(body)?;
        let body = body.to_string();
        self.advance_to(body_start + semi + 1);
        Some(TokenKind::Entity(body))
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.source.as_bytes()[self.pos - 1] == b'\n'
    }

    /// Move to byte offset `end`, keeping line and column in step.
    fn advance_to(&mut self, end: usize) {
        for c in self.source[self.pos..end].chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.pos = end;
    }
}

fn is_special(c: char) -> bool {
    matches!(c, '{' | '}' | '[' | ']' | '|' | '=' | '<' | '&')
}

/// Leading tag name of `s` if it is a known tag followed by a delimiter.
fn tag_name(s: &str) -> Option<&str> {
    let len = s
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(s.len());
    let name = &s[..len];
    if name.is_empty() || !KNOWN_TAGS.contains(&name) {
        return None;
    }
    Some(name)
}

/// Find `</name>` at or after `from` in lowercased text. Returns the start
/// of the close tag and the offset just past it.
fn find_close_tag(lower: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let needle = format!("</{name}");
    let mut search = from;
    while let Some(i) = lower[search..].find(&needle) {
        let at = search + i;
        let tail = lower[at + needle.len()..].trim_start();
        if tail.starts_with('>') {
            return Some((at, lower.len() - tail.len() + 1));
        }
        search = at + needle.len();
    }
    None
}

/// End of a region whose braces never pair (comments, raw tags), if one
/// starts at `i`.
fn protected_end(source: &str, lower: &str, i: usize) -> Option<usize> {
    let rest = &lower[i..];
    if rest.starts_with("<!--") {
        return Some(
            source[i + 4..]
                .find("-->")
                .map_or(source.len(), |e| i + 4 + e + 3),
        );
    }
    let name = tag_name(rest.strip_prefix('<')?)?;
    if !RAW_TAGS.contains(&name) {
        return None;
    }
    let open_end = i + 1 + name.len() + lower[i + 1 + name.len()..].find('>')? + 1;
    if lower[..open_end - 1].ends_with('/') {
        return None;
    }
    find_close_tag(lower, open_end, name).map(|(_, end)| end)
}

/// Pair `{{`/`}}` and `{{{`/`}}}` runs the way MediaWiki's preprocessor
/// does: each closing run matches the nearest open run, taking three braces
/// when both sides have at least three and two otherwise.
fn pair_braces(source: &str, lower: &str) -> HashMap<usize, (BraceRole, usize)> {
    struct OpenRun {
        start: usize,
        count: usize,
    }

    let bytes = source.as_bytes();
    let run_len = |i: usize, b: u8| bytes[i..].iter().take_while(|x| **x == b).count();
    let mut marks = HashMap::new();
    let mut stack: Vec<OpenRun> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => match protected_end(source, lower, i) {
                Some(end) => i = end,
                None => i += 1,
            },
            b'{' => {
                let n = run_len(i, b'{');
                if n >= 2 {
                    stack.push(OpenRun { start: i, count: n });
                }
                i += n;
            }
            b'}' => {
                let n = run_len(i, b'}');
                let mut at = i;
                let mut remaining = n;
                while remaining >= 2 {
                    let Some(top) = stack.last_mut() else {
                        break;
                    };
                    let (open, close, k) = if top.count >= 3 && remaining >= 3 {
                        (BraceRole::ArgumentOpen, BraceRole::ArgumentClose, 3)
                    } else {
                        (BraceRole::TemplateOpen, BraceRole::TemplateClose, 2)
                    };
                    top.count -= k;
                    marks.insert(top.start + top.count, (open, k));
                    marks.insert(at, (close, k));
                    at += k;
                    remaining -= k;
                    if top.count < 2 {
                        stack.pop();
                    }
                }
                i += n;
            }
            _ => i += 1,
        }
    }
    marks
}
