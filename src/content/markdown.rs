//! Markdown-to-document transformation

use lazy_static::lazy_static;
use pulldown_cmark::{Alignment, CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};
use regex::{Captures, Regex};
use std::collections::HashSet;
use std::ops::Range;
use thiserror::Error;

use super::document::{Align, Callout, Document, Node};
use super::shortcode::{self, ShortTag, Token};

lazy_static! {
    /// Placeholder standing for a short-tag node while Markdown is parsed
    static ref SLOT: Regex = Regex::new(r"\x{E000}(\d+)\x{E001}").unwrap();
    /// Single-line link reference definition, e.g. `[pg]: https://postgresql.org`
    static ref LINK_DEF: Regex =
        Regex::new(r"(?m)^ {0,3}\[[^\]^][^\]]*\]:[ \t]*\S.*$").unwrap();
}

/// Short-tag kinds treated as callouts when nothing else is configured
pub const DEFAULT_CALLOUTS: [&str; 4] = ["quote", "note", "tip", "warning"];

/// Body transformation errors; `line` is relative to the body
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("line {line}: unterminated {construct}")]
    Unterminated { line: usize, construct: String },
}

/// Turns variant bodies into [`Document`] trees
#[derive(Debug, Clone)]
pub struct MarkdownTransformer {
    callouts: HashSet<String>,
}

impl MarkdownTransformer {
    /// Create a transformer recognizing the default callout kinds
    pub fn new() -> Self {
        Self::with_callouts(DEFAULT_CALLOUTS)
    }

    /// Create a transformer recognizing the given short-tag kinds
    pub fn with_callouts<I, S>(callouts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            callouts: callouts
                .into_iter()
                .map(|s| s.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    fn is_callout(&self, name: &str) -> bool {
        self.callouts.contains(&name.to_ascii_lowercase())
    }

    /// Transform a body into a document tree
    pub fn transform(&self, body: &str) -> Result<Document, TransformError> {
        let tokens = shortcode::lex(body)?;
        let link_defs = link_definitions(body);
        let mut slots = Slots::default();
        let mut frames = vec![TagFrame::root()];
        let mut i = 0;

        while i < tokens.len() {
            match &tokens[i] {
                Token::Text { span } => {
                    top(&mut frames).pending.push_str(&body[span.clone()]);
                }
                Token::Open {
                    tag,
                    self_closing,
                    span,
                    line,
                } => {
                    if self.is_callout(&tag.name) {
                        if *self_closing {
                            let callout = Node::Callout(Callout {
                                kind: tag.name.clone(),
                                attrs: tag.attrs.clone(),
                                children: Vec::new(),
                            });
                            top(&mut frames).embed(&mut slots, callout, body, span.clone());
                        } else {
                            frames.push(TagFrame::open(tag.clone(), *line, span.start));
                        }
                    } else {
                        // Unknown tags are kept verbatim, up to their closing tag if any.
                        let end = if *self_closing {
                            None
                        } else {
                            matching_close(&tokens, i)
                        };
                        let range = match end {
                            Some(j) => {
                                i = j;
                                span.start..tokens[j].span().end
                            }
                            None => span.clone(),
                        };
                        let raw = Node::Raw {
                            source: body[range.clone()].to_string(),
                        };
                        top(&mut frames).embed(&mut slots, raw, body, range);
                    }
                }
                Token::Close { name, span, line } => {
                    match frames.iter().rposition(|f| f.is_named(name)) {
                        Some(k) if k == frames.len() - 1 => {
                            let frame = frames.pop().unwrap_or_else(TagFrame::root);
                            let range = frame.start..span.end;
                            let inline = frame.line == *line;
                            let callout = frame.into_callout(inline, &link_defs, &mut slots);
                            top(&mut frames).embed(&mut slots, Node::Callout(callout), body, range);
                        }
                        Some(_) => {
                            let open = top(&mut frames);
                            return Err(TransformError::Unterminated {
                                line: open.line,
                                construct: open.construct(),
                            });
                        }
                        None => {
                            let raw = Node::Raw {
                                source: body[span.clone()].to_string(),
                            };
                            top(&mut frames).embed(&mut slots, raw, body, span.clone());
                        }
                    }
                }
            }
            i += 1;
        }

        if frames.len() > 1 {
            let open = top(&mut frames);
            return Err(TransformError::Unterminated {
                line: open.line,
                construct: open.construct(),
            });
        }

        let root = frames.pop().unwrap_or_else(TagFrame::root);
        Ok(Document::new(root.finish(&link_defs, &mut slots)))
    }
}

impl Default for MarkdownTransformer {
    fn default() -> Self {
        Self::new()
    }
}

fn top(frames: &mut [TagFrame]) -> &mut TagFrame {
    // The root frame is never popped before the end of the body.
    let last = frames.len() - 1;
    &mut frames[last]
}

/// Index of the tag closing the unknown tag opened at `open`, honouring nesting
fn matching_close(tokens: &[Token], open: usize) -> Option<usize> {
    let Token::Open { tag, .. } = &tokens[open] else {
        return None;
    };
    let mut depth = 0usize;
    for (j, token) in tokens.iter().enumerate().skip(open + 1) {
        match token {
            Token::Open {
                tag: inner,
                self_closing: false,
                ..
            } if inner.name == tag.name => depth += 1,
            Token::Close { name, .. } if *name == tag.name => {
                if depth == 0 {
                    return Some(j);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

/// Link reference definitions of the whole body, one per line
fn link_definitions(body: &str) -> String {
    LINK_DEF
        .find_iter(body)
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether `range` is the only thing on its source line(s)
fn stands_alone(body: &str, range: Range<usize>) -> bool {
    let line_start = body[..range.start].rfind('\n').map_or(0, |i| i + 1);
    let line_end = body[range.end..]
        .find('\n')
        .map_or(body.len(), |i| range.end + i);
    body[line_start..range.start].trim().is_empty() && body[range.end..line_end].trim().is_empty()
}

/// An open short-tag container (or the document root) collecting Markdown
struct TagFrame {
    tag: Option<ShortTag>,
    line: usize,
    /// Byte offset of the opening tag
    start: usize,
    pending: String,
}

impl TagFrame {
    fn root() -> Self {
        Self {
            tag: None,
            line: 0,
            start: 0,
            pending: String::new(),
        }
    }

    fn open(tag: ShortTag, line: usize, start: usize) -> Self {
        Self {
            tag: Some(tag),
            line,
            start,
            pending: String::new(),
        }
    }

    fn is_named(&self, name: &str) -> bool {
        self.tag.as_ref().is_some_and(|t| t.name == name)
    }

    fn construct(&self) -> String {
        match &self.tag {
            Some(tag) => format!("short-tag '{}'", tag.name),
            None => "document".to_string(),
        }
    }

    /// Stand a placeholder for `node` (taken from `body[range]`) into the Markdown
    fn embed(&mut self, slots: &mut Slots, node: Node, body: &str, range: Range<usize>) {
        let block = stands_alone(body, range.clone());
        let placeholder = slots.insert(node, &body[range], block);
        self.pending.push_str(&placeholder);
    }

    /// Parse the collected Markdown once and splice embedded nodes back in
    fn finish(self, link_defs: &str, slots: &mut Slots) -> Vec<Node> {
        let mut markdown = self.pending;
        if !link_defs.is_empty() {
            markdown.push_str("\n\n");
            markdown.push_str(link_defs);
            markdown.push('\n');
        }
        slots.blocks(convert(&markdown))
    }

    fn into_callout(mut self, inline: bool, link_defs: &str, slots: &mut Slots) -> Callout {
        let tag = self.tag.take().unwrap_or_else(|| ShortTag {
            name: String::new(),
            attrs: Default::default(),
        });
        let mut children = self.finish(link_defs, slots);
        // Same-line content is inline: unwrap the single paragraph Markdown made of it.
        if inline && children.len() == 1 {
            if let Some(Node::Paragraph { .. }) = children.first() {
                if let Some(Node::Paragraph { children: inner }) = children.pop() {
                    children = inner;
                }
            }
        }
        Callout {
            kind: tag.name,
            attrs: tag.attrs,
            children,
        }
    }
}

/// A node standing in the Markdown as a placeholder until parsing is done
struct Slot {
    node: Option<Node>,
    source: String,
    /// Alone on its line: becomes a block between paragraphs
    block: bool,
}

/// Placeholders handed out while collecting a body
#[derive(Default)]
struct Slots {
    entries: Vec<Slot>,
}

impl Slots {
    fn insert(&mut self, node: Node, source: &str, block: bool) -> String {
        self.entries.push(Slot {
            node: Some(node),
            source: source.to_string(),
            block,
        });
        format!("\u{E000}{}\u{E001}", self.entries.len() - 1)
    }

    fn slot(&self, caps: &Captures) -> Option<&Slot> {
        caps[1].parse::<usize>().ok().and_then(|id| self.entries.get(id))
    }

    /// Split text around placeholders; each piece carries its block flag
    fn expand(&mut self, text: &str, out: &mut Vec<(Node, bool)>) {
        let mut last = 0;
        for caps in SLOT.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > last {
                out.push((Node::text(&text[last..whole.start()]), false));
            }
            let taken = caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|id| self.entries.get_mut(id))
                .and_then(|slot| slot.node.take().map(|node| (node, slot.block)));
            out.push(taken.unwrap_or_else(|| (Node::text(whole.as_str()), false)));
            last = whole.end();
        }
        if last < text.len() {
            out.push((Node::text(&text[last..]), false));
        }
    }

    /// Put the source text back where a placeholder ended up verbatim
    fn restore(&self, text: &str) -> String {
        SLOT.replace_all(text, |caps: &Captures| {
            self.slot(caps)
                .map(|slot| slot.source.clone())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
    }

    fn blocks(&mut self, nodes: Vec<Node>) -> Vec<Node> {
        let mut out = Vec::new();
        for node in nodes {
            match node {
                Node::Paragraph { children } => {
                    let mut run = Vec::new();
                    for (piece, block) in self.pieces(children) {
                        if block {
                            push_paragraph(&mut out, std::mem::take(&mut run));
                            out.push(piece);
                        } else {
                            run.push(piece);
                        }
                    }
                    push_paragraph(&mut out, run);
                }
                Node::Text { text } => {
                    let mut pieces = Vec::new();
                    self.expand(&text, &mut pieces);
                    out.extend(pieces.into_iter().map(|(node, _)| node));
                }
                other => out.push(self.descend(other)),
            }
        }
        out
    }

    fn pieces(&mut self, nodes: Vec<Node>) -> Vec<(Node, bool)> {
        let mut out = Vec::new();
        for node in nodes {
            match node {
                Node::Text { text } => self.expand(&text, &mut out),
                other => out.push((self.descend(other), false)),
            }
        }
        out
    }

    fn inlines(&mut self, nodes: Vec<Node>) -> Vec<Node> {
        self.pieces(nodes).into_iter().map(|(node, _)| node).collect()
    }

    fn descend(&mut self, node: Node) -> Node {
        match node {
            Node::BlockQuote { children } => Node::BlockQuote {
                children: self.blocks(children),
            },
            Node::List { start, children } => Node::List {
                start,
                children: self.blocks(children),
            },
            Node::Item { children } => Node::Item {
                children: self.blocks(children),
            },
            Node::Table {
                alignments,
                children,
            } => Node::Table {
                alignments,
                children: self.blocks(children),
            },
            Node::TableHead { children } => Node::TableHead {
                children: self.blocks(children),
            },
            Node::TableRow { children } => Node::TableRow {
                children: self.blocks(children),
            },
            Node::TableCell { children } => Node::TableCell {
                children: self.inlines(children),
            },
            Node::FootnoteDefinition { label, children } => Node::FootnoteDefinition {
                label,
                children: self.blocks(children),
            },
            Node::Heading {
                level,
                id,
                children,
            } => Node::Heading {
                level,
                id,
                children: self.inlines(children),
            },
            Node::Emphasis { children } => Node::Emphasis {
                children: self.inlines(children),
            },
            Node::Strong { children } => Node::Strong {
                children: self.inlines(children),
            },
            Node::Strikethrough { children } => Node::Strikethrough {
                children: self.inlines(children),
            },
            Node::Link {
                dest,
                title,
                children,
            } => Node::Link {
                dest,
                title,
                children: self.inlines(children),
            },
            Node::Image { src, title, alt } => Node::Image {
                src,
                title,
                alt: self.restore(&alt),
            },
            Node::Html { html } => Node::Html {
                html: self.restore(&html),
            },
            other => other,
        }
    }
}

/// Wrap an inline run in a paragraph, dropping breaks left at its edges
fn push_paragraph(out: &mut Vec<Node>, mut run: Vec<Node>) {
    while matches!(run.last(), Some(Node::SoftBreak | Node::HardBreak)) {
        run.pop();
    }
    let lead = run
        .iter()
        .take_while(|n| matches!(n, Node::SoftBreak | Node::HardBreak))
        .count();
    let run = run.split_off(lead);
    if !run.is_empty() {
        out.push(Node::Paragraph { children: run });
    }
}

pub(crate) fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_HEADING_ATTRIBUTES
}

/// Open Markdown element awaiting its end event
enum Open {
    Heading { level: u8, id: Option<String> },
    Paragraph,
    BlockQuote,
    CodeBlock { lang: Option<String>, code: String },
    HtmlBlock { html: String },
    List { start: Option<u64> },
    Item,
    Table { alignments: Vec<Align> },
    TableHead,
    TableRow,
    TableCell,
    FootnoteDefinition { label: String },
    Emphasis,
    Strong,
    Strikethrough,
    Link { dest: String, title: String },
    Image { src: String, title: String, alt: String },
    /// Elements without a node kind of their own; children are hoisted
    Transparent,
}

struct Frame {
    open: Open,
    children: Vec<Node>,
}

/// Stack-based pulldown-cmark event to node converter
struct Converter {
    stack: Vec<Frame>,
    root: Vec<Node>,
}

/// Convert plain Markdown (no short-tags) into nodes
fn convert(markdown: &str) -> Vec<Node> {
    let mut converter = Converter {
        stack: Vec::new(),
        root: Vec::new(),
    };
    for event in Parser::new_ext(markdown, parser_options()) {
        converter.handle_event(event);
    }
    // Unbalanced frames cannot occur with pulldown-cmark, but never lose content.
    while let Some(frame) = converter.stack.pop() {
        converter.finish(frame);
    }
    converter.root
}

impl Converter {
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(_) => {
                if let Some(frame) = self.stack.pop() {
                    self.finish(frame);
                }
            }
            Event::Text(text) => self.add_text(&text),
            Event::Code(code) => self.add_node(Node::Code {
                code: code.to_string(),
            }),
            Event::Html(html) | Event::InlineHtml(html) => self.add_html(&html),
            Event::FootnoteReference(label) => self.add_node(Node::FootnoteReference {
                label: label.to_string(),
            }),
            Event::SoftBreak => self.add_break(Node::SoftBreak),
            Event::HardBreak => self.add_break(Node::HardBreak),
            Event::Rule => self.add_node(Node::ThematicBreak),
            Event::TaskListMarker(checked) => self.add_node(Node::TaskMarker { checked }),
            _ => {}
        }
    }

    fn start_tag(&mut self, tag: Tag) {
        let open = match tag {
            Tag::Heading { level, id, .. } => Open::Heading {
                level: heading_level(level),
                id: id.map(|s| s.to_string()),
            },
            Tag::Paragraph => Open::Paragraph,
            Tag::BlockQuote(_) => Open::BlockQuote,
            Tag::CodeBlock(kind) => Open::CodeBlock {
                lang: match kind {
                    CodeBlockKind::Fenced(info) => fence_language(&info),
                    CodeBlockKind::Indented => None,
                },
                code: String::new(),
            },
            Tag::HtmlBlock => Open::HtmlBlock {
                html: String::new(),
            },
            Tag::List(start) => Open::List { start },
            Tag::Item => Open::Item,
            Tag::Table(alignments) => Open::Table {
                alignments: alignments.into_iter().map(align).collect(),
            },
            Tag::TableHead => Open::TableHead,
            Tag::TableRow => Open::TableRow,
            Tag::TableCell => Open::TableCell,
            Tag::FootnoteDefinition(label) => Open::FootnoteDefinition {
                label: label.to_string(),
            },
            Tag::Emphasis => Open::Emphasis,
            Tag::Strong => Open::Strong,
            Tag::Strikethrough => Open::Strikethrough,
            Tag::Link {
                dest_url, title, ..
            } => Open::Link {
                dest: dest_url.to_string(),
                title: title.to_string(),
            },
            Tag::Image {
                dest_url, title, ..
            } => Open::Image {
                src: dest_url.to_string(),
                title: title.to_string(),
                alt: String::new(),
            },
            _ => Open::Transparent,
        };
        self.stack.push(Frame {
            open,
            children: Vec::new(),
        });
    }

    fn finish(&mut self, frame: Frame) {
        let children = frame.children;
        let node = match frame.open {
            Open::Heading { level, id } => Node::Heading {
                level,
                id,
                children,
            },
            Open::Paragraph => Node::Paragraph { children },
            Open::BlockQuote => Node::BlockQuote { children },
            Open::CodeBlock { lang, code } => Node::CodeBlock { lang, code },
            Open::HtmlBlock { html } => Node::Html { html },
            Open::List { start } => Node::List { start, children },
            Open::Item => Node::Item { children },
            Open::Table { alignments } => Node::Table {
                alignments,
                children,
            },
            Open::TableHead => Node::TableHead { children },
            Open::TableRow => Node::TableRow { children },
            Open::TableCell => Node::TableCell { children },
            Open::FootnoteDefinition { label } => Node::FootnoteDefinition { label, children },
            Open::Emphasis => Node::Emphasis { children },
            Open::Strong => Node::Strong { children },
            Open::Strikethrough => Node::Strikethrough { children },
            Open::Link { dest, title } => Node::Link {
                dest,
                title,
                children,
            },
            Open::Image { src, title, alt } => Node::Image { src, title, alt },
            Open::Transparent => {
                for child in children {
                    self.add_node(child);
                }
                return;
            }
        };
        self.add_node(node);
    }

    fn add_text(&mut self, text: &str) {
        match self.stack.last_mut().map(|f| &mut f.open) {
            Some(Open::CodeBlock { code, .. }) => code.push_str(text),
            Some(Open::HtmlBlock { html }) => html.push_str(text),
            Some(Open::Image { alt, .. }) => alt.push_str(text),
            _ => self.add_node(Node::text(text)),
        }
    }

    fn add_html(&mut self, html: &str) {
        match self.stack.last_mut().map(|f| &mut f.open) {
            Some(Open::HtmlBlock { html: buf }) => buf.push_str(html),
            _ => self.add_node(Node::Html {
                html: html.to_string(),
            }),
        }
    }

    fn add_break(&mut self, node: Node) {
        match self.stack.last_mut().map(|f| &mut f.open) {
            Some(Open::Image { alt, .. }) => alt.push(' '),
            _ => self.add_node(node),
        }
    }

    /// Append to the innermost open element, merging adjacent text
    fn add_node(&mut self, node: Node) {
        let siblings = match self.stack.last_mut() {
            Some(frame) => &mut frame.children,
            None => &mut self.root,
        };
        if let Node::Text { text } = &node {
            if let Some(Node::Text { text: prev }) = siblings.last_mut() {
                prev.push_str(text);
                return;
            }
        }
        siblings.push(node);
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn align(alignment: Alignment) -> Align {
    match alignment {
        Alignment::None => Align::None,
        Alignment::Left => Align::Left,
        Alignment::Center => Align::Center,
        Alignment::Right => Align::Right,
    }
}

/// First word of a fence info string, e.g. "rust" for "rust,ignore"
fn fence_language(info: &str) -> Option<String> {
    info.split(|c: char| c.is_whitespace() || c == ',' || c == '{')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
