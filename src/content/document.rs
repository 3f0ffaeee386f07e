//! Structured document tree produced from a variant body

use indexmap::IndexMap;
use serde::Serialize;

/// Column alignment of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    None,
    Left,
    Center,
    Right,
}

/// A recognized short-tag container, e.g. `{{< quote source="..." >}}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Callout {
    pub kind: String,
    pub attrs: IndexMap<String, String>,
    pub children: Vec<Node>,
}

impl Callout {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }
}

/// A node of the document tree.
///
/// Each variant is either a leaf or a container; containers expose their
/// children through [`Node::children`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    // Blocks
    Heading {
        level: u8,
        id: Option<String>,
        children: Vec<Node>,
    },
    Paragraph {
        children: Vec<Node>,
    },
    CodeBlock {
        lang: Option<String>,
        code: String,
    },
    BlockQuote {
        children: Vec<Node>,
    },
    List {
        start: Option<u64>,
        children: Vec<Node>,
    },
    Item {
        children: Vec<Node>,
    },
    Table {
        alignments: Vec<Align>,
        children: Vec<Node>,
    },
    TableHead {
        children: Vec<Node>,
    },
    TableRow {
        children: Vec<Node>,
    },
    TableCell {
        children: Vec<Node>,
    },
    FootnoteDefinition {
        label: String,
        children: Vec<Node>,
    },
    ThematicBreak,
    Html {
        html: String,
    },
    Callout(Callout),
    /// Short-tag the transformer does not know, kept verbatim
    Raw {
        source: String,
    },

    // Inlines
    Text {
        text: String,
    },
    Code {
        code: String,
    },
    Emphasis {
        children: Vec<Node>,
    },
    Strong {
        children: Vec<Node>,
    },
    Strikethrough {
        children: Vec<Node>,
    },
    Link {
        dest: String,
        title: String,
        children: Vec<Node>,
    },
    Image {
        src: String,
        title: String,
        alt: String,
    },
    FootnoteReference {
        label: String,
    },
    TaskMarker {
        checked: bool,
    },
    SoftBreak,
    HardBreak,
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text { text: text.into() }
    }

    /// Child nodes of a container; `None` for leaves
    pub fn children(&self) -> Option<&[Node]> {
        match self {
            Node::Heading { children, .. }
            | Node::Paragraph { children }
            | Node::BlockQuote { children }
            | Node::List { children, .. }
            | Node::Item { children }
            | Node::Table { children, .. }
            | Node::TableHead { children }
            | Node::TableRow { children }
            | Node::TableCell { children }
            | Node::FootnoteDefinition { children, .. }
            | Node::Emphasis { children }
            | Node::Strong { children }
            | Node::Strikethrough { children }
            | Node::Link { children, .. } => Some(children),
            Node::Callout(callout) => Some(&callout.children),
            Node::CodeBlock { .. }
            | Node::ThematicBreak
            | Node::Html { .. }
            | Node::Raw { .. }
            | Node::Text { .. }
            | Node::Code { .. }
            | Node::Image { .. }
            | Node::FootnoteReference { .. }
            | Node::TaskMarker { .. }
            | Node::SoftBreak
            | Node::HardBreak => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children().is_none()
    }

    /// Concatenated text of this node and its descendants
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Text { text } => out.push_str(text),
            Node::Code { code } | Node::CodeBlock { code, .. } => out.push_str(code),
            Node::Image { alt, .. } => out.push_str(alt),
            Node::SoftBreak | Node::HardBreak => out.push(' '),
            _ => {
                for child in self.children().unwrap_or_default() {
                    child.collect_text(out);
                }
            }
        }
    }
}

/// Marker separating the excerpt from the rest of a post
pub const MORE_MARKER: &str = "<!-- more -->";

/// The structured body of one variant
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Document {
    pub nodes: Vec<Node>,
}

impl Document {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Depth-first, pre-order walk over every node
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: self.nodes.iter().rev().collect(),
        }
    }

    /// Destinations of every link, in source order
    pub fn links(&self) -> impl Iterator<Item = &str> {
        self.walk().filter_map(|n| match n {
            Node::Link { dest, .. } => Some(dest.as_str()),
            _ => None,
        })
    }

    /// Sources of every image, in source order
    pub fn images(&self) -> impl Iterator<Item = &str> {
        self.walk().filter_map(|n| match n {
            Node::Image { src, .. } => Some(src.as_str()),
            _ => None,
        })
    }

    /// Top-level nodes before the `<!-- more -->` marker, if present
    pub fn excerpt(&self) -> Option<&[Node]> {
        let pos = self.nodes.iter().position(|n| match n {
            Node::Html { html } => html.trim() == MORE_MARKER,
            _ => false,
        })?;
        Some(&self.nodes[..pos])
    }

    /// Number of whitespace-separated words, ignoring code blocks
    pub fn word_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| !matches!(n, Node::CodeBlock { .. }))
            .map(|n| n.plain_text().split_whitespace().count())
            .sum()
    }
}

/// Iterator returned by [`Document::walk`]
pub struct Walk<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        if let Some(children) = node.children() {
            self.stack.extend(children.iter().rev());
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::new(vec![
            Node::Paragraph {
                children: vec![
                    Node::text("see "),
                    Node::Link {
                        dest: "../other/".into(),
                        title: String::new(),
                        children: vec![Node::text("other")],
                    },
                ],
            },
            Node::Html {
                html: "<!-- more -->\n".into(),
            },
            Node::Image {
                src: "chart.png".into(),
                title: String::new(),
                alt: "chart".into(),
            },
        ])
    }

    #[test]
    fn test_walk_is_source_ordered() {
        let doc = sample();
        let kinds: Vec<bool> = doc.walk().map(Node::is_leaf).collect();
        assert_eq!(kinds, vec![false, true, false, true, true, true]);
    }

    #[test]
    fn test_links_images_and_excerpt() {
        let doc = sample();
        assert_eq!(doc.links().collect::<Vec<_>>(), vec!["../other/"]);
        assert_eq!(doc.images().collect::<Vec<_>>(), vec!["chart.png"]);
        assert_eq!(doc.excerpt().map(|e| e.len()), Some(1));
        assert_eq!(doc.word_count(), 3);
    }
}
