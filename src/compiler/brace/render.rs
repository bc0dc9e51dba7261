//! Instruction tree interpreter and source listing.

use super::parse::{Node, Scope};
use crate::error::EngineError;
use crate::tree::{RenderContext, SectionRenderer};
use serde_json::Value;
use std::{fmt::Write, sync::Arc};

pub(crate) fn render_nodes(nodes: &[Node], ctx: &mut RenderContext<'_>) -> Result<(), EngineError> {
    for node in nodes {
        render_node(node, ctx)?;
    }
    Ok(())
}

fn render_node(node: &Node, ctx: &mut RenderContext<'_>) -> Result<(), EngineError> {
    match node {
        Node::Text(text) => ctx.write(text),
        Node::Expr { scope, path, line } => {
            let text = match scope {
                Scope::Model => lookup(ctx.model(), path).map(stringify),
                Scope::Bag => {
                    let bag = ctx.bag_mut();
                    match path.split_first() {
                        None => Some(stringify(&bag.to_value())),
                        Some((first, rest)) => {
                            bag.get(first).and_then(|v| lookup(v, rest)).map(stringify)
                        }
                    }
                }
            };
            match text {
                Some(text) => ctx.write(&text),
                None => {
                    let key = display_key(*scope, path);
                    return Err(ctx.fail(format!("undefined key `{key}` (line {line})")));
                }
            }
        }
        Node::Body { .. } => ctx.render_body()?,
        Node::Layout(layout) => ctx.set_layout(layout.clone()),
        Node::Section { name, body } => {
            let body = Arc::clone(body);
            let renderer: SectionRenderer =
                Arc::new(move |ctx: &mut RenderContext<'_>| render_nodes(&body, ctx));
            ctx.define_section(name, renderer);
        }
        Node::RenderSection { name, required, .. } => {
            ctx.render_section(name, *required)?;
        }
        Node::IfSection { name, body } => {
            if ctx.is_section_defined(name) {
                render_nodes(body, ctx)?;
            }
        }
        Node::RenderPage {
            path, skip_layout, ..
        } => ctx.render_page(path, *skip_layout)?,
        Node::Set {
            key,
            value,
            only_if_absent,
        } => {
            let bag = ctx.bag_mut();
            if !*only_if_absent || !bag.contains(key) {
                bag.insert(key.clone(), value.clone());
            }
        }
        Node::Incr { key, line } => {
            let next = match ctx.bag_mut().get(key) {
                None | Some(Value::Null) => Value::from(1),
                Some(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
                    (Some(i), _) => i
                        .checked_add(1)
                        .map_or_else(|| Value::from(i as f64 + 1.0), Value::from),
                    (None, Some(f)) => Value::from(f + 1.0),
                    (None, None) => Value::Null,
                },
                Some(_) => Value::Null,
            };
            if next.is_null() {
                return Err(ctx.fail(format!("bag value `{key}` is not a number (line {line})")));
            }
            ctx.bag_mut().insert(key.clone(), next);
        }
        Node::Href { path, .. } => {
            let href = ctx.resolve_href(path)?;
            ctx.write(&href);
        }
    }
    Ok(())
}

/// Follow a dotted key path through objects and arrays.
pub(crate) fn lookup<'v>(root: &'v Value, path: &[String]) -> Option<&'v Value> {
    path.iter().try_fold(root, |value, key| match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Text emitted for a value: strings raw, `null` as nothing, containers as JSON.
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn display_key(scope: Scope, path: &[String]) -> String {
    let prefix = match scope {
        Scope::Model => "model",
        Scope::Bag => "bag",
    };
    std::iter::once(prefix)
        .chain(path.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(".")
}

// ============================================================================
// Generated source listing
// ============================================================================

pub(crate) fn listing(nodes: &[Node], depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    for node in nodes {
        match node {
            Node::Text(text) => {
                let _ = writeln!(out, "{indent}write {text:?}");
            }
            Node::Expr { scope, path, .. } => {
                let _ = writeln!(out, "{indent}emit {}", display_key(*scope, path));
            }
            Node::Body { .. } => {
                let _ = writeln!(out, "{indent}render_body");
            }
            Node::Layout(Some(name)) => {
                let _ = writeln!(out, "{indent}layout = {name:?}");
            }
            Node::Layout(None) => {
                let _ = writeln!(out, "{indent}layout = none");
            }
            Node::Section { name, body } => {
                let _ = writeln!(out, "{indent}define_section {name:?} {{");
                listing(body, depth + 1, out);
                let _ = writeln!(out, "{indent}}}");
            }
            Node::RenderSection { name, required, .. } => {
                let call = if *required { "render_section" } else { "render_section_if_defined" };
                let _ = writeln!(out, "{indent}{call} {name:?}");
            }
            Node::IfSection { name, body } => {
                let _ = writeln!(out, "{indent}if is_section_defined({name:?}) {{");
                listing(body, depth + 1, out);
                let _ = writeln!(out, "{indent}}}");
            }
            Node::RenderPage {
                path, skip_layout, ..
            } => {
                let _ = writeln!(out, "{indent}render_page {path:?} skip_layout={skip_layout}");
            }
            Node::Set {
                key,
                value,
                only_if_absent,
            } => {
                let op = if *only_if_absent { "?=" } else { "=" };
                let _ = writeln!(out, "{indent}bag.{key} {op} {value}");
            }
            Node::Incr { key, .. } => {
                let _ = writeln!(out, "{indent}bag.{key} += 1");
            }
            Node::Href { path, .. } => {
                let _ = writeln!(out, "{indent}emit href({path:?})");
            }
        }
    }
}
