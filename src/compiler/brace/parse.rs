//! Tokens to instruction tree.

use super::super::{CompileError, ModelRequirement};
use super::tokenize::{Token, TokenKind};
use serde_json::Value;
use std::sync::Arc;

/// Where an expression looks its value up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    Model,
    Bag,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Expr {
        scope: Scope,
        /// Dotted key path, empty for the scope itself.
        path: Vec<String>,
        line: usize,
    },
    Body {
        line: usize,
    },
    /// `None` clears a layout set earlier.
    Layout(Option<String>),
    Section {
        name: String,
        body: Arc<[Node]>,
    },
    RenderSection {
        name: String,
        required: bool,
        line: usize,
    },
    IfSection {
        name: String,
        body: Vec<Node>,
    },
    RenderPage {
        path: String,
        skip_layout: bool,
        line: usize,
    },
    Set {
        key: String,
        value: Value,
        only_if_absent: bool,
    },
    Incr {
        key: String,
        line: usize,
    },
    Href {
        path: String,
        line: usize,
    },
}

/// Output of the parser.
#[derive(Debug)]
pub(crate) struct Program {
    pub nodes: Vec<Node>,
    /// Declared through `{@model ...}`.
    pub requirement: Option<ModelRequirement>,
}

/// A block directive waiting for its `{@end}`.
enum Open {
    Section { name: String, line: usize, column: usize },
    IfSection { name: String, line: usize, column: usize },
}

struct Parser<'a> {
    text: &'a str,
    /// Node lists, innermost last. The first entry is the top level.
    stack: Vec<Vec<Node>>,
    open: Vec<Open>,
    requirement: Option<ModelRequirement>,
}

pub(crate) fn parse(text: &str, tokens: Vec<Token>) -> Result<Program, CompileError> {
    let mut parser = Parser {
        text,
        stack: vec![Vec::new()],
        open: Vec::new(),
        requirement: None,
    };
    for token in tokens {
        parser.token(token)?;
    }
    parser.finish()
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>, line: usize, column: usize) -> CompileError {
        CompileError {
            message: message.into(),
            line,
            column,
            text: Arc::from(self.text),
        }
    }

    fn push(&mut self, node: Node) {
        if let Some(nodes) = self.stack.last_mut() {
            nodes.push(node);
        }
    }

    fn token(&mut self, token: Token) -> Result<(), CompileError> {
        let Token { kind, line, column } = token;
        match kind {
            TokenKind::Text(text) => {
                self.push(Node::Text(text));
                Ok(())
            }
            TokenKind::Tag(content) => {
                let content = content.trim();
                match content.strip_prefix('@') {
                    Some(directive) => self.directive(directive, line, column),
                    None => {
                        let node = self.expression(content, line, column)?;
                        self.push(node);
                        Ok(())
                    }
                }
            }
        }
    }

    fn expression(&self, content: &str, line: usize, column: usize) -> Result<Node, CompileError> {
        if content.is_empty() {
            return Err(self.error("empty expression `{}`", line, column));
        }
        if !is_key_path(content) {
            return Err(self.error(
                format!("invalid expression `{content}` (use `\\{{` for a literal brace)"),
                line,
                column,
            ));
        }

        let mut parts = content.split('.').map(str::to_string);
        let (scope, path) = match parts.next().as_deref() {
            Some("body") if content == "body" => return Ok(Node::Body { line }),
            Some("model") => (Scope::Model, parts.collect()),
            Some("bag") => (Scope::Bag, parts.collect()),
            _ => (Scope::Model, content.split('.').map(str::to_string).collect()),
        };
        Ok(Node::Expr { scope, path, line })
    }

    fn directive(&mut self, directive: &str, line: usize, column: usize) -> Result<(), CompileError> {
        let (name, args) = match directive.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (directive, ""),
        };

        match name {
            "layout" => {
                let layout = (!args.is_empty() && args != "none").then(|| args.to_string());
                self.push(Node::Layout(layout));
            }
            "model" => {
                if self.requirement.is_some() {
                    return Err(self.error("`@model` declared twice", line, column));
                }
                let requirement = ModelRequirement::parse(args).ok_or_else(|| {
                    self.error(format!("unknown model kind `{args}`"), line, column)
                })?;
                self.requirement = Some(requirement);
            }
            "section" => {
                let name = self.name_arg("section", args, line, column)?;
                if self.open.iter().any(|o| matches!(o, Open::Section { .. })) {
                    return Err(self.error("sections cannot be nested", line, column));
                }
                self.open.push(Open::Section { name, line, column });
                self.stack.push(Vec::new());
            }
            "if_section" => {
                let name = self.name_arg("if_section", args, line, column)?;
                self.open.push(Open::IfSection { name, line, column });
                self.stack.push(Vec::new());
            }
            "end" => self.close(line, column)?,
            "render_section" | "render_section?" => {
                let name = self.name_arg(name, args, line, column)?;
                self.push(Node::RenderSection {
                    name,
                    required: !directive.starts_with("render_section?"),
                    line,
                });
            }
            "render_page" => {
                let mut words = args.split_whitespace();
                let path = words
                    .next()
                    .ok_or_else(|| self.error("`@render_page` needs a path", line, column))?
                    .to_string();
                let skip_layout = match words.next() {
                    None => false,
                    Some("skip_layout") => true,
                    Some(other) => {
                        return Err(self.error(
                            format!("unexpected `{other}` after `@render_page {path}`"),
                            line,
                            column,
                        ));
                    }
                };
                self.push(Node::RenderPage {
                    path,
                    skip_layout,
                    line,
                });
            }
            "set" | "default" => {
                let (key, value) = args.split_once('=').ok_or_else(|| {
                    self.error(format!("expected `@{name} key = value`"), line, column)
                })?;
                let key = self.name_arg(name, key.trim(), line, column)?;
                let value: Value = serde_json::from_str(value.trim()).map_err(|err| {
                    self.error(format!("invalid JSON value for `{key}`: {err}"), line, column)
                })?;
                self.push(Node::Set {
                    key,
                    value,
                    only_if_absent: name == "default",
                });
            }
            "incr" => {
                let key = self.name_arg("incr", args, line, column)?;
                self.push(Node::Incr { key, line });
            }
            "href" => {
                if args.is_empty() {
                    return Err(self.error("`@href` needs a path", line, column));
                }
                self.push(Node::Href {
                    path: args.to_string(),
                    line,
                });
            }
            other => {
                return Err(self.error(format!("unknown directive `@{other}`"), line, column));
            }
        }
        Ok(())
    }

    fn name_arg(
        &self,
        directive: &str,
        args: &str,
        line: usize,
        column: usize,
    ) -> Result<String, CompileError> {
        if args.is_empty() || args.contains(char::is_whitespace) {
            return Err(self.error(format!("`@{directive}` needs one name"), line, column));
        }
        Ok(args.to_string())
    }

    fn close(&mut self, line: usize, column: usize) -> Result<(), CompileError> {
        let open = self
            .open
            .pop()
            .ok_or_else(|| self.error("`@end` without an open block", line, column))?;
        let body = self.stack.pop().unwrap_or_default();
        let node = match open {
            Open::Section { name, .. } => Node::Section {
                name,
                body: Arc::from(body),
            },
            Open::IfSection { name, .. } => Node::IfSection { name, body },
        };
        self.push(node);
        Ok(())
    }

    fn finish(mut self) -> Result<Program, CompileError> {
        if let Some(open) = self.open.last() {
            let (kind, name, line, column) = match open {
                Open::Section { name, line, column } => ("section", name, *line, *column),
                Open::IfSection { name, line, column } => ("if_section", name, *line, *column),
            };
            return Err(self.error(
                format!("`@{kind} {name}` is never closed with `@end`"),
                line,
                column,
            ));
        }
        Ok(Program {
            nodes: self.stack.pop().unwrap_or_default(),
            requirement: self.requirement,
        })
    }
}

fn is_key_path(content: &str) -> bool {
    content.split('.').all(|part| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
    })
}
