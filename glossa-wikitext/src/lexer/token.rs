//! Lexer token types

// ============================================================================
// LEXER TYPES
// ============================================================================

/// Token kinds for wikitext.
///
/// Brace runs are paired before tokens are produced, so `TemplateOpen` and
/// `ArgumentOpen` always have a matching close somewhere later in the
/// stream; braces that pair with nothing are plain `Text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Text(String),

    // Transclusion
    TemplateOpen,
    TemplateClose,
    ArgumentOpen,
    ArgumentClose,
    Pipe,
    Equals,

    // Links
    LinkOpen,
    LinkClose,
    /// `[` followed by a URL; carries the URL and whether a space follows it.
    ExternalOpen { url: String, spaced: bool },
    BracketClose,

    // Markup
    HeadingStart(u8),
    HeadingEnd(u8),
    Comment(String),
    /// Body of a character reference, without `&` and `;`.
    Entity(String),
    TagOpen {
        name: String,
        attrs: String,
        self_closing: bool,
    },
    TagClose(String),
    /// Tag whose contents are not wikitext (`nowiki`, `pre`, ...).
    RawTag {
        name: String,
        attrs: String,
        body: String,
    },

    Eof,
}

impl TokenKind {
    /// Whether the token can end a construct opened earlier.
    pub fn is_closer(&self) -> bool {
        matches!(
            self,
            TokenKind::TemplateClose
                | TokenKind::ArgumentClose
                | TokenKind::LinkClose
                | TokenKind::BracketClose
                | TokenKind::HeadingEnd(_)
                | TokenKind::TagClose(_)
        )
    }
}

/// Source location span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Default for Span {
    fn default() -> Self {
        Self {
            start: 0,
            end: 0,
            line: 1,
            column: 1,
        }
    }
}

/// A token with its kind and source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    /// The exact source text the token was read from.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        source.get(self.span.start..self.span.end).unwrap_or("")
    }
}
