//! Page and section walkers
//!
//! Only top-level nodes of a section are inspected. Root templates become
//! tokens, pass-through templates are expanded and walked again, headings
//! maintain the header path.

use glossa_core::{GlossaResult, HeaderSegment, ValidationError};

use super::context::{Frame, ParseContext};
use super::expand::{params_to_dict, Expansion};
use super::Engine;
use crate::parser::{parse, Node, Param, Template, Wikicode};
use crate::render::render;
use crate::resolver::TemplateResolver;

/// Whether walking should go on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The page carries a template that excludes it from parsing.
    SkipPage,
}

impl<R: TemplateResolver> Engine<R> {
    /// Walk every marked section of `text`.
    pub(crate) fn walk_page(&self, ctx: &mut ParseContext, text: &str) -> GlossaResult<Flow> {
        let text = if self.rules.wrap_marker_lines() {
            self.wrap_marker_lines(text)
        } else {
            text.to_string()
        };
        for section in self.sections(parse(&text)) {
            ctx.header.clear();
            if self.walk_section(ctx, section)? == Flow::SkipPage {
                return Ok(Flow::SkipPage);
            }
        }
        Ok(Flow::Continue)
    }

    /// Contents of each level-1 heading whose title matches the section
    /// marker, up to the next level-1 heading.
    fn sections(&self, nodes: Wikicode) -> Vec<Wikicode> {
        let mut sections = Vec::new();
        let mut current: Option<Wikicode> = None;
        for node in nodes {
            if let Node::Heading { level: 1, title } = &node {
                if let Some(done) = current.take() {
                    sections.push(done);
                }
                if self.rules.section_marker().is_match(&render(title)) {
                    current = Some(Vec::new());
                }
                continue;
            }
            if let Some(section) = current.as_mut() {
                section.push(node);
            }
        }
        sections.extend(current);
        sections
    }

    /// Turn lines holding only a section marker into level-1 headings.
    fn wrap_marker_lines(&self, text: &str) -> String {
        let marker = self.rules.section_marker();
        let lines: Vec<String> = text
            .split('\n')
            .map(|line| {
                let trimmed = line.trim();
                let whole = marker
                    .find(trimmed)
                    .is_some_and(|m| m.start() == 0 && m.end() == trimmed.len());
                if whole {
                    format!("={}=", trimmed)
                } else {
                    line.to_string()
                }
            })
            .collect();
        lines.join("\n")
    }

    pub(crate) fn walk_section(&self, ctx: &mut ParseContext, nodes: Wikicode) -> GlossaResult<Flow> {
        for node in nodes {
            match node {
                Node::Template(template) => {
                    if self.section_template(ctx, template)? == Flow::SkipPage {
                        return Ok(Flow::SkipPage);
                    }
                }
                Node::Heading { level, title } => self.section_heading(ctx, level, title)?,
                Node::Argument { .. } => {
                    let label = ctx.header_label();
                    ctx.warn(format!(
                        "{} {}: Unexpected argument {}",
                        label,
                        ctx.page_title,
                        render(&[node])
                    ));
                }
                other => {
                    self.expand_node(ctx, &Frame::page(), other)?;
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn section_template(&self, ctx: &mut ParseContext, mut template: Template) -> GlossaResult<Flow> {
        let frame = Frame::page();
        let name_nodes = std::mem::take(&mut template.name);
        template.name = self.expand_nodes(ctx, &frame, name_nodes)?;
        let raw = template.name_text();
        if self.rules.is_ignored(&raw) {
            return Ok(Flow::Continue);
        }
        let name = self.rules.strip_namespace(&raw).to_string();
        if self.rules.is_ignored(&name) {
            return Ok(Flow::Continue);
        }
        if self.rules.skips_page(&name) {
            tracing::debug!(page = %ctx.page_title, template = %name, "page skipped");
            return Ok(Flow::SkipPage);
        }

        let root = self.rules.is_root(&name);
        if root || self.rules.is_pass_through(&name) {
            let params = std::mem::take(&mut template.params);
            for param in params {
                if !self.rules.is_well_known(param.key()) {
                    template.params.push(param);
                } else if self.well_known_param(ctx, param)? == Flow::SkipPage {
                    return Ok(Flow::SkipPage);
                }
            }
            if root {
                ctx.emit_named(name, params_to_dict(&template.params));
                return Ok(Flow::Continue);
            }
            if let Expansion::Resolved(nodes) = self.expand_template(ctx, &frame, template)? {
                return self.walk_section(ctx, nodes);
            }
        } else if !self.rules.has_ignored_prefix(&name) {
            let label = ctx.header_label();
            ctx.warn(format!(
                "{} {}: Unknown template {}",
                label,
                ctx.page_title,
                render(&[Node::Template(template)])
            ));
        }
        Ok(Flow::Continue)
    }

    /// A parameter that may hold free text or root templates, but not both
    /// unless the text is only separators.
    fn well_known_param(&self, ctx: &mut ParseContext, param: Param) -> GlossaResult<Flow> {
        let key = param.key().to_string();
        let mut extras = String::new();
        let mut has_templates = false;
        for node in &param.value {
            match node {
                Node::Text(text) => extras.push_str(text),
                Node::Template(inner) if self.rules.is_root(&inner.name_text()) => has_templates = true,
                Node::Link { title, text } => extras.push_str(&render(text.as_ref().unwrap_or(title))),
                Node::Comment(_) => {}
                other => {
                    return Err(ValidationError::UnparseableParameter {
                        param: key,
                        reason: format!("cannot parse {}", render(std::slice::from_ref(other))),
                    }
                    .into())
                }
            }
        }

        let extras = extras.trim();
        if has_templates && !extras.is_empty() && !self.rules.allows_separator(extras) {
            return Err(ValidationError::AmbiguousParameter {
                param: key,
                reason: format!("text '{}' next to templates", extras),
            }
            .into());
        }
        if has_templates {
            return self.walk_section(ctx, param.value);
        }
        if !extras.is_empty() {
            let text = render(&param.value).trim().to_string();
            ctx.emit_text(format!("_{}", key), text);
        }
        Ok(Flow::Continue)
    }

    fn section_heading(&self, ctx: &mut ParseContext, level: u8, title: Wikicode) -> GlossaResult<()> {
        let depth = usize::from(level).saturating_sub(2);
        if ctx.header.len() < depth {
            let label = ctx.header_label();
            ctx.warn(format!(
                "{} {}: Heading level {} skips a level",
                label, ctx.page_title, level
            ));
            ctx.header.resize(depth, HeaderSegment::Placeholder);
        } else {
            ctx.header.truncate(depth);
        }

        let mut title = self.expand_nodes(ctx, &Frame::page(), title)?;
        let positions: Vec<usize> = title
            .iter()
            .enumerate()
            .filter(|(_, node)| matches!(node, Node::Template(_)))
            .map(|(i, _)| i)
            .collect();

        let mut meaning = None;
        if let [only] = positions.as_slice() {
            if let Node::Template(template) = &title[*only] {
                let name = template.name_text();
                if self.rules.is_meaning_header(&name) {
                    meaning = Some((name, params_to_dict(&template.params)));
                    title.remove(*only);
                }
            }
        }
        if !positions.is_empty() && meaning.is_none() {
            let label = ctx.header_label();
            ctx.warn(format!(
                "{} {}: Unrecognized header template in {}",
                label,
                ctx.page_title,
                render(&title)
            ));
        }

        let text = render(&title).trim().to_string();
        let segment = match meaning {
            Some((template, params)) => HeaderSegment::Meaning {
                template,
                params,
                text: (!text.is_empty()).then_some(text),
            },
            None => HeaderSegment::Text(text),
        };
        ctx.header.push(segment);
        Ok(())
    }
}
