//! Short-tag lexing: splits a body into Markdown text and `{{< … >}}` tags

use indexmap::IndexMap;
use lazy_static::lazy_static;
use pulldown_cmark::{Event, Parser, Tag};
use regex::Regex;
use std::ops::Range;

use super::markdown::{parser_options, TransformError};

lazy_static! {
    /// `{{< name attrs >}}`, `{{< /name >}}` and `{{< name attrs />}}`
    static ref TAG: Regex = Regex::new(
        r#"\{\{<\s*(/)?\s*([A-Za-z][\w-]*)((?:[^>"']|"[^"]*"|'[^']*')*?)\s*(/)?\s*>\}\}"#
    )
    .unwrap();
    /// `key="v"`, `key='v'`, `key=v`, or a positional value
    static ref ATTR: Regex = Regex::new(
        r#"([A-Za-z_][\w-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"']+))|"([^"]*)"|'([^']*)'|([^\s"'=]+)"#
    )
    .unwrap();
    static ref FENCE: Regex = Regex::new(r"^ {0,3}(`{3,}|~{3,})(.*)$").unwrap();
}

/// Name and attributes of an opening short-tag
#[derive(Debug, Clone, PartialEq)]
pub struct ShortTag {
    pub name: String,
    pub attrs: IndexMap<String, String>,
}

/// One lexed piece of a body. `span` is a byte range into the body.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Text {
        span: Range<usize>,
    },
    Open {
        tag: ShortTag,
        self_closing: bool,
        span: Range<usize>,
        line: usize,
    },
    Close {
        name: String,
        span: Range<usize>,
        line: usize,
    },
}

impl Token {
    pub fn span(&self) -> Range<usize> {
        match self {
            Token::Text { span } | Token::Open { span, .. } | Token::Close { span, .. } => {
                span.clone()
            }
        }
    }
}

/// An open code fence: marker character, marker length, opening line
struct Fence {
    marker: char,
    len: usize,
    line: usize,
}

impl Fence {
    fn open(line: &str, lineno: usize) -> Option<Self> {
        let caps = FENCE.captures(line.trim_end())?;
        let run = caps.get(1)?.as_str();
        let marker = run.chars().next()?;
        // A backtick fence's info string may not contain backticks.
        if marker == '`' && caps.get(2).is_some_and(|m| m.as_str().contains('`')) {
            return None;
        }
        Some(Self {
            marker,
            len: run.len(),
            line: lineno,
        })
    }

    fn closes(&self, line: &str) -> bool {
        let line = line.trim_end();
        let trimmed = line.trim_start_matches(' ');
        line.len() - trimmed.len() <= 3
            && trimmed.len() >= self.len
            && trimmed.chars().all(|c| c == self.marker)
    }
}

/// Byte ranges of code spans and code blocks as Markdown parses them
fn code_ranges(body: &str) -> Vec<Range<usize>> {
    Parser::new_ext(body, parser_options())
        .into_offset_iter()
        .filter_map(|(event, range)| match event {
            Event::Code(_) | Event::Start(Tag::CodeBlock(_)) => Some(range),
            _ => None,
        })
        .collect()
}

/// Split `body` into text and short-tag tokens.
///
/// Tags inside code spans and code blocks are left as text. Fails when a
/// code fence is never closed.
pub fn lex(body: &str) -> Result<Vec<Token>, TransformError> {
    let code = code_ranges(body);
    let mut tokens = Vec::new();
    let mut fence: Option<Fence> = None;
    let mut offset = 0;

    for (idx, line) in body.split_inclusive('\n').enumerate() {
        let lineno = idx + 1;
        let start = offset;
        offset += line.len();

        if let Some(open) = &fence {
            if open.closes(line) {
                fence = None;
            }
            push_text(&mut tokens, start..offset);
            continue;
        }

        if let Some(open) = Fence::open(line, lineno) {
            fence = Some(open);
            push_text(&mut tokens, start..offset);
            continue;
        }

        let mut last = 0;
        for caps in TAG.captures_iter(line) {
            let Some(whole) = caps.get(0) else { continue };
            if code.iter().any(|r| r.contains(&(start + whole.start()))) {
                continue;
            }
            if whole.start() > last {
                push_text(&mut tokens, start + last..start + whole.start());
            }
            let span = start + whole.start()..start + whole.end();
            let name = caps[2].to_string();

            if caps.get(1).is_some() {
                tokens.push(Token::Close {
                    name,
                    span,
                    line: lineno,
                });
            } else {
                let attrs = caps.get(3).map(|m| parse_attrs(m.as_str())).unwrap_or_default();
                tokens.push(Token::Open {
                    tag: ShortTag { name, attrs },
                    self_closing: caps.get(4).is_some(),
                    span,
                    line: lineno,
                });
            }
            last = whole.end();
        }
        if last < line.len() {
            push_text(&mut tokens, start + last..offset);
        }
    }

    match fence {
        Some(open) => Err(TransformError::Unterminated {
            line: open.line,
            construct: "code fence".to_string(),
        }),
        None => Ok(tokens),
    }
}

/// Extend the previous text token when contiguous
fn push_text(tokens: &mut Vec<Token>, span: Range<usize>) {
    if let Some(Token::Text { span: prev }) = tokens.last_mut() {
        if prev.end == span.start {
            prev.end = span.end;
            return;
        }
    }
    tokens.push(Token::Text { span });
}

/// Parse short-tag attributes; positional values are keyed "0", "1", …
pub fn parse_attrs(input: &str) -> IndexMap<String, String> {
    let mut attrs = IndexMap::new();
    let mut position = 0;

    for caps in ATTR.captures_iter(input) {
        if let Some(key) = caps.get(1) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str())
                .unwrap_or_default();
            attrs.insert(key.as_str().to_string(), value.to_string());
        } else if let Some(value) = caps.get(5).or_else(|| caps.get(6)).or_else(|| caps.get(7)) {
            attrs.insert(position.to_string(), value.as_str().to_string());
            position += 1;
        }
    }

    attrs
}
