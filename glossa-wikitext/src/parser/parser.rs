//! Parser implementation
//!
//! Recursive descent over the token stream with backtracking: a construct
//! that does not find its closer is rewound and its opening token becomes
//! text. Parsing therefore never fails.

use std::collections::HashMap;

use super::ast::*;
use crate::lexer::*;
use crate::render::render;

/// An open construct. Determines which tokens end the current node run.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Frame {
    /// `key` is set while reading the part of a parameter before `=`.
    Template { key: bool },
    Argument { default: bool },
    Link { text: bool },
    External,
    Heading,
    Tag(String),
}

impl Frame {
    /// Whether `kind` closes this construct.
    fn closes(&self, kind: &TokenKind) -> bool {
        match (self, kind) {
            (Frame::Template { .. }, TokenKind::TemplateClose) => true,
            (Frame::Argument { .. }, TokenKind::ArgumentClose) => true,
            (Frame::Link { .. }, TokenKind::LinkClose) => true,
            (Frame::External, TokenKind::BracketClose) => true,
            (Frame::Heading, TokenKind::HeadingEnd(_)) => true,
            (Frame::Tag(open), TokenKind::TagClose(close)) => open == close,
            _ => false,
        }
    }

    /// Whether `kind` ends the current node run when this is the innermost
    /// construct.
    fn terminates(&self, kind: &TokenKind) -> bool {
        if self.closes(kind) {
            return true;
        }
        match (self, kind) {
            (Frame::Template { .. }, TokenKind::Pipe) => true,
            (Frame::Template { key: true }, TokenKind::Equals) => true,
            (Frame::Argument { default: false }, TokenKind::Pipe) => true,
            (Frame::Link { text: false }, TokenKind::Pipe) => true,
            _ => false,
        }
    }
}

// ============================================================================
// PARSER
// ============================================================================

/// Parser for wikitext.
pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    frames: Vec<Frame>,
    /// Constructs known not to close, keyed by the position of their
    /// opening token, with the token that stopped them.
    failures: HashMap<usize, TokenKind>,
}

impl<'a> Parser<'a> {
    /// Create a new parser over tokens lexed from `source`.
    pub fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            frames: Vec::new(),
            failures: HashMap::new(),
        }
    }

    /// Parse the whole token stream.
    pub fn parse(&mut self) -> Wikicode {
        let mut nodes = Vec::new();
        while !self.is_at_end() {
            let run = self.parse_nodes();
            extend_merging(&mut nodes, run);
            if !self.is_at_end() {
                self.literal(&mut nodes);
            }
        }
        nodes
    }

    /// Parse nodes until a token that ends the innermost construct, closes
    /// any enclosing one, or the end of input.
    fn parse_nodes(&mut self) -> Wikicode {
        let mut nodes = Vec::new();
        loop {
            let kind = self.current().kind.clone();
            if kind == TokenKind::Eof || self.stops(&kind) {
                break;
            }
            match kind {
                TokenKind::Text(text) => {
                    push_text(&mut nodes, &text);
                    self.advance();
                }
                TokenKind::TemplateOpen => self.construct(&mut nodes, Self::parse_template),
                TokenKind::ArgumentOpen => self.construct(&mut nodes, Self::parse_argument),
                TokenKind::LinkOpen => self.construct(&mut nodes, Self::parse_link),
                TokenKind::ExternalOpen { .. } => self.construct(&mut nodes, Self::parse_external),
                TokenKind::HeadingStart(_) => self.construct(&mut nodes, Self::parse_heading),
                TokenKind::TagOpen {
                    name,
                    attrs,
                    self_closing: true,
                } => {
                    nodes.push(Node::Tag(Tag {
                        name,
                        attrs,
                        contents: Vec::new(),
                        self_closing: true,
                        raw: false,
                    }));
                    self.advance();
                }
                TokenKind::TagOpen { .. } => self.construct(&mut nodes, Self::parse_tag),
                TokenKind::RawTag { name, attrs, body } => {
                    let contents = if body.is_empty() {
                        Vec::new()
                    } else {
                        vec![Node::Text(body)]
                    };
                    nodes.push(Node::Tag(Tag {
                        name,
                        attrs,
                        contents,
                        self_closing: false,
                        raw: true,
                    }));
                    self.advance();
                }
                TokenKind::Comment(body) => {
                    nodes.push(Node::Comment(body));
                    self.advance();
                }
                TokenKind::Entity(body) => {
                    nodes.push(Node::Entity(body));
                    self.advance();
                }
                _ => self.literal(&mut nodes),
            }
        }
        nodes
    }

    /// Try one construct; on failure rewind and keep its opener as text.
    fn construct(&mut self, nodes: &mut Wikicode, parse: fn(&mut Self) -> Option<Node>) {
        let start = self.pos;
        let known_failure = self
            .failures
            .get(&start)
            .is_some_and(|stopper| *stopper == TokenKind::Eof || self.reachable_closer(stopper));
        if !known_failure {
            let depth = self.frames.len();
            let parsed = parse(self);
            self.frames.truncate(depth);
            match parsed {
                Some(node) => {
                    nodes.push(node);
                    return;
                }
                None => {
                    let stopper = self.current().kind.clone();
                    self.failures.insert(start, stopper);
                    self.pos = start;
                }
            }
        }
        self.literal(nodes);
    }

    fn parse_template(&mut self) -> Option<Node> {
        self.advance();
        self.frames.push(Frame::Template { key: false });
        let name = self.parse_nodes();
        let mut params = Vec::new();
        let mut index = 0;
        loop {
            match self.current().kind {
                TokenKind::Pipe => {
                    self.advance();
                    let param = self.parse_param(&mut index);
                    params.push(param);
                }
                TokenKind::TemplateClose => {
                    self.advance();
                    return Some(Node::Template(Template { name, params }));
                }
                _ => return None,
            }
        }
    }

    fn parse_param(&mut self, index: &mut usize) -> Param {
        self.set_frame(Frame::Template { key: true });
        let first = self.parse_nodes();
        self.set_frame(Frame::Template { key: false });
        if self.check(&TokenKind::Equals) {
            self.advance();
            let value = self.parse_nodes();
            Param::keyed(render(&first), value)
        } else {
            *index += 1;
            Param::positional(*index, first)
        }
    }

    fn parse_argument(&mut self) -> Option<Node> {
        self.advance();
        self.frames.push(Frame::Argument { default: false });
        let name = self.parse_nodes();
        let mut default = None;
        if self.check(&TokenKind::Pipe) {
            self.advance();
            self.set_frame(Frame::Argument { default: true });
            default = Some(self.parse_nodes());
        }
        if !self.check(&TokenKind::ArgumentClose) {
            return None;
        }
        self.advance();
        Some(Node::Argument { name, default })
    }

    fn parse_link(&mut self) -> Option<Node> {
        self.advance();
        self.frames.push(Frame::Link { text: false });
        let title = self.parse_nodes();
        let mut text = None;
        if self.check(&TokenKind::Pipe) {
            self.advance();
            self.set_frame(Frame::Link { text: true });
            text = Some(self.parse_nodes());
        }
        if !self.check(&TokenKind::LinkClose) {
            return None;
        }
        self.advance();
        Some(Node::Link { title, text })
    }

    fn parse_external(&mut self) -> Option<Node> {
        let TokenKind::ExternalOpen { url, spaced } = self.current().kind.clone() else {
            return None;
        };
        self.advance();
        self.frames.push(Frame::External);
        let title = self.parse_nodes();
        if !self.check(&TokenKind::BracketClose) {
            return None;
        }
        self.advance();
        let title = (spaced || !title.is_empty()).then_some(title);
        Some(Node::ExternalLink { url, title })
    }

    fn parse_heading(&mut self) -> Option<Node> {
        let TokenKind::HeadingStart(level) = self.current().kind else {
            return None;
        };
        self.advance();
        self.frames.push(Frame::Heading);
        let title = self.parse_nodes();
        if !matches!(self.current().kind, TokenKind::HeadingEnd(_)) {
            return None;
        }
        self.advance();
        Some(Node::Heading { level, title })
    }

    fn parse_tag(&mut self) -> Option<Node> {
        let TokenKind::TagOpen { name, attrs, .. } = self.current().kind.clone() else {
            return None;
        };
        self.advance();
        self.frames.push(Frame::Tag(name.clone()));
        let contents = self.parse_nodes();
        if self.current().kind != TokenKind::TagClose(name.clone()) {
            return None;
        }
        self.advance();
        Some(Node::Tag(Tag {
            name,
            attrs,
            contents,
            self_closing: false,
            raw: false,
        }))
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn stops(&self, kind: &TokenKind) -> bool {
        match self.frames.last() {
            Some(innermost) if innermost.terminates(kind) => true,
            Some(_) => self.reachable_closer(kind),
            None => false,
        }
    }

    /// Whether `kind` closes an open construct. Transclusions are paired
    /// before anything else, so closers never reach past them.
    fn reachable_closer(&self, kind: &TokenKind) -> bool {
        if !kind.is_closer() {
            return false;
        }
        for frame in self.frames.iter().rev() {
            if frame.closes(kind) {
                return true;
            }
            if matches!(frame, Frame::Template { .. } | Frame::Argument { .. }) {
                return false;
            }
        }
        false
    }

    fn set_frame(&mut self, frame: Frame) {
        if let Some(top) = self.frames.last_mut() {
            *top = frame;
        }
    }

    /// Consume the current token as text.
    fn literal(&mut self, nodes: &mut Wikicode) {
        let text = self.current().text(self.source).to_string();
        push_text(nodes, &text);
        self.advance();
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.pos += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(kind)
    }
}

fn push_text(nodes: &mut Wikicode, text: &str) {
    if text.is_empty() {
        return;
    }
    match nodes.last_mut() {
        Some(Node::Text(prev)) => prev.push_str(text),
        _ => nodes.push(Node::Text(text.to_string())),
    }
}

/// Append `run` to `nodes`, joining text at the seam.
pub(crate) fn extend_merging(nodes: &mut Wikicode, run: Wikicode) {
    for node in run {
        match node {
            Node::Text(text) => push_text(nodes, &text),
            other => nodes.push(other),
        }
    }
}

/// Parse wikitext into a node tree.
pub fn parse(source: &str) -> Wikicode {
    let tokens = Lexer::new(source).tokenize();
    Parser::new(source, tokens).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(nodes: &[Node]) -> &Template {
        nodes
            .iter()
            .find_map(Node::as_template)
            .expect("template node")
    }

    #[test]
    fn test_positional_and_keyed_params() {
        let nodes = parse("{{сущ ru|кош|слоги = кош|3=x=y}}");
        let t = template(&nodes);
        assert_eq!(t.name_text(), "сущ ru");
        assert_eq!(t.params.len(), 3);
        assert_eq!(t.params[0].key(), "1");
        assert!(!t.params[0].showkey);
        assert_eq!(t.get("слоги").unwrap().value_text(), "кош");
        assert_eq!(t.get("3").unwrap().value_text(), "x=y");
    }

    #[test]
    fn test_nested_template_in_param() {
        let nodes = parse("{{a|b={{c|d}}}}");
        let t = template(&nodes);
        let inner = template(&t.get("b").unwrap().value);
        assert_eq!(inner.name_text(), "c");
    }

    #[test]
    fn test_argument_with_default_keeps_pipes() {
        let nodes = parse("{{{1|a|b}}}");
        match &nodes[0] {
            Node::Argument { name, default } => {
                assert_eq!(render(name), "1");
                assert_eq!(render(default.as_ref().unwrap()), "a|b");
            }
            other => panic!("expected argument, got {other:?}"),
        }
    }

    #[test]
    fn test_unclosed_link_becomes_text() {
        let nodes = parse("[[a|b {{t}}");
        assert_eq!(nodes[0], Node::Text("[[a|b ".into()));
        assert!(matches!(nodes[1], Node::Template(_)));
    }

    #[test]
    fn test_pipe_in_link_inside_template_is_not_a_param() {
        let nodes = parse("{{t|[[a|b]]|c}}");
        let t = template(&nodes);
        assert_eq!(t.params.len(), 2);
        assert!(matches!(t.params[0].value[0], Node::Link { .. }));
    }

    #[test]
    fn test_link_closer_inside_template_does_not_escape() {
        // The template cannot close inside the link, so the link is text.
        let nodes = parse("[[a{{t|x]]}}");
        assert_eq!(nodes[0], Node::Text("[[a".into()));
        assert_eq!(template(&nodes).params[0].value_text(), "x]]");
    }

    #[test]
    fn test_headings_and_sections() {
        let nodes = parse("= {{-ru-}} =\n=== Морфология ===\ntext");
        match &nodes[0] {
            Node::Heading { level, title } => {
                assert_eq!(*level, 1);
                assert!(title.iter().any(|n| matches!(n, Node::Template(_))));
            }
            other => panic!("expected heading, got {other:?}"),
        }
        assert!(nodes
            .iter()
            .any(|n| matches!(n, Node::Heading { level: 3, .. })));
    }

    #[test]
    fn test_tags_comments_entities_external() {
        let nodes = parse("<noinclude>{{x}}</noinclude><!-- c -->&amp;[http://a.b t]<br/>");
        match &nodes[0] {
            Node::Tag(tag) => {
                assert_eq!(tag.name, "noinclude");
                assert!(matches!(tag.contents[0], Node::Template(_)));
            }
            other => panic!("expected tag, got {other:?}"),
        }
        assert_eq!(nodes[1], Node::Comment(" c ".into()));
        assert_eq!(nodes[2], Node::Entity("amp".into()));
        assert!(matches!(&nodes[3], Node::ExternalLink { url, title: Some(_) } if url == "http://a.b"));
        assert!(matches!(&nodes[4], Node::Tag(t) if t.self_closing));
    }

    #[test]
    fn test_unclosed_tag_is_text() {
        let nodes = parse("<ref>dangling {{t}}");
        assert_eq!(nodes[0], Node::Text("<ref>dangling ".into()));
    }

    #[test]
    fn test_pathological_nesting_terminates() {
        let source = "[[".repeat(200) + &"{{a|".repeat(50) + &"<ref>".repeat(50);
        let nodes = parse(&source);
        assert_eq!(render(&nodes), source);
    }

    #[test]
    fn test_render_round_trip() {
        let source = "== a ==\n{{t|1|k=v|{{{x|d}}}}} [[l|t]] <b>x</b> &nbsp; <!--c--> [http://x y]";
        assert_eq!(render(&parse(source)), source);
    }
}
