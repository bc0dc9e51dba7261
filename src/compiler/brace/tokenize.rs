//! Tokenization for the brace language.
//!
//! Single forward pass over the text. A tag runs from `{` to its matching
//! `}`; nested braces and JSON strings inside a tag are balanced so that
//! `{@set user = {"name": "}"}}` is one tag.
//!
//! ```text
//! Text ──{──► Tag(depth 1) ──{──► depth+1 ──}──► depth-1 ... ──}(depth 0)──► Text
//!  │            │
//!  │ \{         │ "
//!  ▼            ▼
//! literal {   InString ──"──► Tag      (\" does not close)
//! ```

use super::super::CompileError;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Text(String),
    /// Content between the outer braces, untrimmed.
    Tag(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// 1-based position of the token's first character.
    pub line: usize,
    pub column: usize,
}

enum ScanState {
    Text,
    Tag {
        depth: usize,
        in_string: bool,
        escaped: bool,
    },
}

pub(crate) fn tokenize(text: &str) -> Result<Vec<Token>, CompileError> {
    let mut tokens = Vec::new();
    let mut buf = String::new();
    let mut state = ScanState::Text;

    let (mut line, mut column) = (1, 1);
    let (mut start_line, mut start_column) = (1, 1);
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        let (here_line, here_column) = (line, column);
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }

        match &mut state {
            ScanState::Text => match c {
                '\\' if chars.peek() == Some(&'{') => {
                    chars.next();
                    column += 1;
                    if buf.is_empty() {
                        (start_line, start_column) = (here_line, here_column);
                    }
                    buf.push('{');
                }
                '{' => {
                    if !buf.is_empty() {
                        tokens.push(Token {
                            kind: TokenKind::Text(std::mem::take(&mut buf)),
                            line: start_line,
                            column: start_column,
                        });
                    }
                    (start_line, start_column) = (here_line, here_column);
                    state = ScanState::Tag {
                        depth: 1,
                        in_string: false,
                        escaped: false,
                    };
                }
                _ => {
                    if buf.is_empty() {
                        (start_line, start_column) = (here_line, here_column);
                    }
                    buf.push(c);
                }
            },
            ScanState::Tag {
                depth,
                in_string,
                escaped,
            } => {
                if *in_string {
                    if *escaped {
                        *escaped = false;
                    } else if c == '\\' {
                        *escaped = true;
                    } else if c == '"' {
                        *in_string = false;
                    }
                    buf.push(c);
                    continue;
                }
                match c {
                    '"' => {
                        *in_string = true;
                        buf.push(c);
                    }
                    '{' => {
                        *depth += 1;
                        buf.push(c);
                    }
                    '}' if *depth == 1 => {
                        tokens.push(Token {
                            kind: TokenKind::Tag(std::mem::take(&mut buf)),
                            line: start_line,
                            column: start_column,
                        });
                        state = ScanState::Text;
                    }
                    '}' => {
                        *depth -= 1;
                        buf.push(c);
                    }
                    _ => buf.push(c),
                }
            }
        }
    }

    match state {
        ScanState::Text => {
            if !buf.is_empty() {
                tokens.push(Token {
                    kind: TokenKind::Text(buf),
                    line: start_line,
                    column: start_column,
                });
            }
            Ok(tokens)
        }
        ScanState::Tag { .. } => Err(CompileError {
            message: "unterminated `{`".into(),
            line: start_line,
            column: start_column,
            text: Arc::from(text),
        }),
    }
}
