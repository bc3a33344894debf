//! Node tree back to wikitext.

use crate::parser::{Node, Param, Template};

/// Render nodes as wikitext.
pub fn render(nodes: &[Node]) -> String {
    let mut out = String::new();
    write_nodes(&mut out, nodes);
    out
}

fn write_nodes(out: &mut String, nodes: &[Node]) {
    for node in nodes {
        write_node(out, node);
    }
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Text(text) => out.push_str(text),
        Node::Heading { level, title } => {
            let marks = "=".repeat(usize::from(*level));
            out.push_str(&marks);
            write_nodes(out, title);
            out.push_str(&marks);
        }
        Node::Template(template) => write_template(out, template),
        Node::Argument { name, default } => {
            out.push_str("{{{");
            write_nodes(out, name);
            if let Some(default) = default {
                out.push('|');
                write_nodes(out, default);
            }
            out.push_str("}}}");
        }
        Node::Tag(tag) => {
            out.push('<');
            out.push_str(&tag.name);
            out.push_str(&tag.attrs);
            if tag.self_closing {
                out.push_str("/>");
                return;
            }
            out.push('>');
            write_nodes(out, &tag.contents);
            out.push_str("</");
            out.push_str(&tag.name);
            out.push('>');
        }
        Node::Link { title, text } => {
            out.push_str("[[");
            write_nodes(out, title);
            if let Some(text) = text {
                out.push('|');
                write_nodes(out, text);
            }
            out.push_str("]]");
        }
        Node::Entity(body) => {
            out.push('&');
            out.push_str(body);
            out.push(';');
        }
        Node::Comment(body) => {
            out.push_str("<!--");
            out.push_str(body);
            out.push_str("-->");
        }
        Node::ExternalLink { url, title } => {
            out.push('[');
            out.push_str(url);
            if let Some(title) = title {
                out.push(' ');
                write_nodes(out, title);
            }
            out.push(']');
        }
    }
}

fn write_template(out: &mut String, template: &Template) {
    out.push_str("{{");
    write_nodes(out, &template.name);
    for param in &template.params {
        write_param(out, param);
    }
    out.push_str("}}");
}

fn write_param(out: &mut String, param: &Param) {
    out.push('|');
    if param.showkey {
        out.push_str(&param.name);
        out.push('=');
    }
    write_nodes(out, &param.value);
}
