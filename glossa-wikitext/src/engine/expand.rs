//! Generic expansion visitor
//!
//! Walks a node run and returns the expanded run. Arguments are bound from
//! the current [`Frame`], directives pick one branch, and templates with a
//! known body are replaced by their expanded text.

use glossa_core::entities::decode_entity;
use glossa_core::{GlossaResult, Params, StructuralError, ValidationError};

use super::context::{Frame, ParseContext};
use super::Engine;
use crate::config::RewriteAction;
use crate::parser::{extend_merging, parse, Node, Param, Tag, Template, Wikicode};
use crate::render::render;
use crate::resolver::TemplateResolver;

/// What happened to one template invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// The body was found and expanded; the nodes replace the invocation.
    Resolved(Wikicode),
    /// A directive or rewrite produced the nodes.
    Replaced(Wikicode),
    /// Left as written.
    Kept(Template),
}

impl Expansion {
    pub fn into_nodes(self) -> Wikicode {
        match self {
            Expansion::Resolved(nodes) | Expansion::Replaced(nodes) => nodes,
            Expansion::Kept(template) => vec![Node::Template(template)],
        }
    }
}

/// Non-blank trimmed parameter values keyed by trimmed name. Later
/// duplicates overwrite earlier ones in place.
pub fn params_to_dict(params: &[Param]) -> Params {
    let mut out = Params::new();
    for param in params {
        let value = param.value_text();
        if !value.is_empty() {
            out.insert(param.key().to_string(), value);
        }
    }
    out
}

fn text_nodes(text: &str) -> Wikicode {
    if text.is_empty() {
        Vec::new()
    } else {
        vec![Node::Text(text.to_string())]
    }
}

impl<R: TemplateResolver> Engine<R> {
    /// Expand every node of `nodes`.
    pub(crate) fn expand_nodes(
        &self,
        ctx: &mut ParseContext,
        frame: &Frame,
        nodes: Wikicode,
    ) -> GlossaResult<Wikicode> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            let expanded = self.expand_node(ctx, frame, node)?;
            extend_merging(&mut out, expanded);
        }
        Ok(out)
    }

    /// Expand one node into its replacement run.
    pub(crate) fn expand_node(
        &self,
        ctx: &mut ParseContext,
        frame: &Frame,
        node: Node,
    ) -> GlossaResult<Wikicode> {
        match node {
            Node::Text(_) | Node::ExternalLink { .. } => Ok(vec![node]),
            Node::Comment(_) => Ok(Vec::new()),
            Node::Entity(body) => Ok(match decode_entity(&body) {
                Some(decoded) => text_nodes(&decoded),
                None => vec![Node::Entity(body)],
            }),
            Node::Argument { name, default } => self.expand_argument(ctx, frame, name, default),
            Node::Template(template) => Ok(self.expand_template(ctx, frame, template)?.into_nodes()),
            Node::Tag(tag) => {
                if tag.name == self.rules.no_render_tag() {
                    return Ok(Vec::new());
                }
                if tag.raw {
                    return Ok(vec![Node::Tag(tag)]);
                }
                let contents = self.expand_nodes(ctx, frame, tag.contents)?;
                Ok(vec![Node::Tag(Tag { contents, ..tag })])
            }
            Node::Link { title, text } => {
                let title = self.expand_nodes(ctx, frame, title)?;
                let text = match text {
                    Some(text) => Some(self.expand_nodes(ctx, frame, text)?),
                    None => None,
                };
                Ok(vec![Node::Link { title, text }])
            }
            Node::Heading { level, title } => {
                let title = self.expand_nodes(ctx, frame, title)?;
                Ok(vec![Node::Heading { level, title }])
            }
        }
    }

    fn expand_argument(
        &self,
        ctx: &mut ParseContext,
        frame: &Frame,
        name: Wikicode,
        default: Option<Wikicode>,
    ) -> GlossaResult<Wikicode> {
        let name = render(&self.expand_nodes(ctx, frame, name)?).trim().to_string();
        if let Some(value) = frame.args.get(&name) {
            return Ok(text_nodes(value));
        }
        match default {
            Some(default) => {
                let value = render(&self.expand_nodes(ctx, frame, default)?);
                Ok(text_nodes(value.trim()))
            }
            None => Ok(Vec::new()),
        }
    }

    /// Expand one template invocation.
    pub(crate) fn expand_template(
        &self,
        ctx: &mut ParseContext,
        frame: &Frame,
        mut template: Template,
    ) -> GlossaResult<Expansion> {
        let name_nodes = std::mem::take(&mut template.name);
        template.name = self.expand_nodes(ctx, frame, name_nodes)?;
        let raw = template.name_text();
        let name = self.rules.normalize_name(&raw).to_string();
        if name.is_empty() {
            return Err(StructuralError::BlankTemplateName {
                context: frame.context(&ctx.page_title),
            }
            .into());
        }
        if name.starts_with('#') {
            return self.expand_directive(ctx, frame, &name, template);
        }

        for param in &mut template.params {
            self.expand_param(ctx, frame, param)?;
        }

        if let Some(action) = self.rules.rewrite(&name) {
            let nodes = match action {
                RewriteAction::Literal(text) => text_nodes(text),
                RewriteAction::PageTitle => text_nodes(&ctx.page_title),
                RewriteAction::Remove => Vec::new(),
            };
            return Ok(Expansion::Replaced(nodes));
        }
        if self.rules.keeps_unexpanded(&name, &template) {
            return Ok(Expansion::Kept(template));
        }
        if frame.depth >= self.rules.max_depth() {
            return Err(ValidationError::ExpansionDepthExceeded {
                name: frame.enter(&name, Params::new()).name,
                depth: self.rules.max_depth(),
            }
            .into());
        }

        let Some(body) = ctx.templates.resolve(&self.resolver, &name, ctx.force)? else {
            ctx.warn(format!("Template {} is not known", name));
            return Ok(Expansion::Kept(template));
        };

        let args = params_to_dict(&template.params);
        ctx.emit_named(format!("_{}", name), args.clone());
        let inner = frame.enter(&name, args);
        let expanded = self.expand_nodes(ctx, &inner, parse(&body))?;
        Ok(Expansion::Resolved(parse(render(&expanded).trim())))
    }

    fn expand_param(&self, ctx: &mut ParseContext, frame: &Frame, param: &mut Param) -> GlossaResult<()> {
        if param.showkey && param.name.contains("{{") {
            let name = self.expand_nodes(ctx, frame, parse(&param.name))?;
            param.name = render(&name);
        }
        let value = std::mem::take(&mut param.value);
        param.value = self.expand_nodes(ctx, frame, value)?;
        Ok(())
    }

    // ========================================================================
    // DIRECTIVES
    // ========================================================================

    fn expand_directive(
        &self,
        ctx: &mut ParseContext,
        frame: &Frame,
        name: &str,
        template: Template,
    ) -> GlossaResult<Expansion> {
        let Some((directive, operand)) = name.split_once(':') else {
            return Err(unhandled(name, frame, ctx));
        };
        let operand = operand.trim();
        let branch = match directive.trim_end() {
            "#if" => String::from(if operand.is_empty() { "2" } else { "1" }),
            "#ifeq" => {
                let Some(other) = template.get("1") else {
                    return Ok(Expansion::Replaced(Vec::new()));
                };
                let other = render(&self.expand_nodes(ctx, frame, other.value.clone())?);
                String::from(if operand == other.trim() { "2" } else { "3" })
            }
            "#switch" => {
                if template.has(operand) {
                    operand.to_string()
                } else if template.has("#default") {
                    "#default".to_string()
                } else {
                    "1".to_string()
                }
            }
            "#ifexist" => {
                let target = self.rules.strip_namespace(operand).trim();
                let exists = ctx.templates.contains(&self.resolver, target, ctx.force)?;
                String::from(if exists { "1" } else { "2" })
            }
            _ => return Err(unhandled(name, frame, ctx)),
        };
        self.select_branch(ctx, frame, &template, &branch)
    }

    /// Splice the expansion of parameter `key`, or nothing if it is absent.
    /// Keyed branches are trimmed.
    fn select_branch(
        &self,
        ctx: &mut ParseContext,
        frame: &Frame,
        template: &Template,
        key: &str,
    ) -> GlossaResult<Expansion> {
        let Some(param) = template.get(key) else {
            return Ok(Expansion::Replaced(Vec::new()));
        };
        let value = self.expand_nodes(ctx, frame, param.value.clone())?;
        if param.showkey {
            Ok(Expansion::Replaced(text_nodes(render(&value).trim())))
        } else {
            Ok(Expansion::Replaced(value))
        }
    }
}

fn unhandled(name: &str, frame: &Frame, ctx: &ParseContext) -> glossa_core::GlossaError {
    StructuralError::UnhandledDirective {
        name: name.to_string(),
        context: frame.context(&ctx.page_title),
    }
    .into()
}
