//! The brace template language.
//!
//! # Syntax
//!
//! | Form                              | Meaning                                        |
//! |-----------------------------------|------------------------------------------------|
//! | `{name}`, `{a.b.0}`, `{model.x}`  | model value by dotted path                     |
//! | `{bag.total}`                     | value-bag entry                                |
//! | `{body}`                          | the wrapped body (layouts only)                |
//! | `\{`                              | a literal `{`                                  |
//! | `{@layout name}`                  | wrap the output in layout `name` (`none` clears) |
//! | `{@model object}`                 | required model kind                            |
//! | `{@section name}...{@end}`        | declare a section                              |
//! | `{@render_section name}`          | render a section of the wrapped body           |
//! | `{@render_section? name}`         | same, skipped when undeclared                  |
//! | `{@if_section name}...{@end}`     | render only when the section is declared       |
//! | `{@render_page path [skip_layout]}` | render another template inline               |
//! | `{@set key = json}`               | write a bag entry                              |
//! | `{@default key = json}`           | write a bag entry unless present               |
//! | `{@incr key}`                     | add one to a numeric bag entry                 |
//! | `{@href ~/path}`                  | resolve a root-operator path                   |
//!
//! # Example
//!
//! ```text
//! {@layout _layout}
//! {@section title}Welcome{@end}
//! Hello {name}, you are visitor {bag.count}.
//! ```

mod parse;
mod render;
mod tokenize;

use super::{CompileError, ModelRequirement, Template, TemplateFactory};
use crate::error::EngineError;
use crate::tree::RenderContext;
use parse::Node;
use std::sync::Arc;

/// Compiled brace template.
pub struct BraceFactory {
    nodes: Arc<[Node]>,
    requirement: ModelRequirement,
    declared: bool,
    lines: usize,
}

struct BraceTemplate {
    nodes: Arc<[Node]>,
}

/// Compile `text`; `hint` applies when the template has no `{@model}`.
pub fn compile(text: &str, hint: ModelRequirement) -> Result<BraceFactory, CompileError> {
    let tokens = tokenize::tokenize(text)?;
    let program = parse::parse(text, tokens)?;
    Ok(BraceFactory {
        nodes: Arc::from(program.nodes),
        requirement: program.requirement.unwrap_or(hint),
        declared: program.requirement.is_some(),
        lines: text.lines().count(),
    })
}

impl TemplateFactory for BraceFactory {
    fn instantiate(&self) -> Box<dyn Template> {
        Box::new(BraceTemplate {
            nodes: Arc::clone(&self.nodes),
        })
    }

    fn model_requirement(&self) -> ModelRequirement {
        self.requirement
    }

    fn generated_source(&self) -> Option<String> {
        let origin = if self.declared { "declared" } else { "assumed" };
        let mut out = format!(
            "// brace template, {} line(s), model: {} ({origin})\n",
            self.lines, self.requirement
        );
        render::listing(&self.nodes, 0, &mut out);
        Some(out)
    }
}

impl Template for BraceTemplate {
    fn render(&self, ctx: &mut RenderContext<'_>) -> Result<(), EngineError> {
        render::render_nodes(&self.nodes, ctx)
    }
}
