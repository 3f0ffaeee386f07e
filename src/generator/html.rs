//! Document tree to HTML, with syntax highlighting for fenced code

use std::collections::HashMap;
use std::fmt::Write;
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

use crate::config::HighlightConfig;
use crate::content::{Align, AssetKind, Callout, Node};

/// Rewrites link and image targets for the page being rendered
pub trait ResolveUrl {
    fn resolve(&self, target: &str, kind: AssetKind) -> String;
}

/// Leaves every target untouched
pub struct Verbatim;

impl ResolveUrl for Verbatim {
    fn resolve(&self, target: &str, _kind: AssetKind) -> String {
        target.to_string()
    }
}

/// Per-call rendering state
struct Page<'u> {
    urls: &'u dyn ResolveUrl,
    /// Heading ids handed out so far, with their use count
    ids: HashMap<String, usize>,
}

impl Page<'_> {
    /// Unique heading id: repeats get "-1", "-2", … appended
    fn heading_id(&mut self, base: String) -> String {
        let count = self.ids.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{}-{}", base, *count - 1)
        }
    }
}

/// HTML renderer with syntax highlighting
pub struct HtmlRenderer {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
    theme_name: String,
    line_numbers: bool,
}

impl HtmlRenderer {
    /// Create a new renderer
    pub fn new() -> Self {
        Self::with_options(&HighlightConfig::default())
    }

    /// Create with custom settings
    pub fn with_options(config: &HighlightConfig) -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: ThemeSet::load_defaults(),
            theme_name: config.theme.clone(),
            line_numbers: config.line_numbers,
        }
    }

    /// Render a node sequence to HTML
    pub fn render(&self, nodes: &[Node], urls: &dyn ResolveUrl) -> String {
        let mut page = Page {
            urls,
            ids: HashMap::new(),
        };
        let mut out = String::new();
        for node in nodes {
            self.render_node(node, &mut page, &mut out);
        }
        out
    }

    fn render_children(&self, node: &Node, page: &mut Page<'_>, out: &mut String) {
        for child in node.children().unwrap_or_default() {
            self.render_node(child, page, out);
        }
    }

    fn render_node(&self, node: &Node, page: &mut Page<'_>, out: &mut String) {
        match node {
            Node::Heading { level, id, .. } => {
                let id = page.heading_id(
                    id.clone()
                        .unwrap_or_else(|| slug::slugify(node.plain_text())),
                );
                let _ = write!(out, "<h{} id=\"{}\">", level, escape_html(&id));
                self.render_children(node, page, out);
                let _ = writeln!(out, "</h{}>", level);
            }
            Node::Paragraph { .. } => self.wrap("p", node, page, out),
            Node::CodeBlock { lang, code } => {
                out.push_str(&self.highlight_code(code, lang.as_deref()));
                out.push('\n');
            }
            Node::BlockQuote { .. } => {
                out.push_str("<blockquote>\n");
                self.render_children(node, page, out);
                out.push_str("</blockquote>\n");
            }
            Node::List { start, .. } => {
                let (open, close) = match start {
                    Some(1) => ("<ol>".to_string(), "</ol>"),
                    Some(n) => (format!("<ol start=\"{}\">", n), "</ol>"),
                    None => ("<ul>".to_string(), "</ul>"),
                };
                out.push_str(&open);
                out.push('\n');
                self.render_children(node, page, out);
                out.push_str(close);
                out.push('\n');
            }
            Node::Item { .. } => {
                self.wrap("li", node, page, out);
            }
            Node::Table {
                alignments,
                children,
            } => self.render_table(alignments, children, page, out),
            Node::TableHead { .. } | Node::TableRow { .. } | Node::TableCell { .. } => {
                // Only reachable outside a table; render contents.
                self.render_children(node, page, out);
            }
            Node::FootnoteDefinition { label, .. } => {
                let _ = write!(
                    out,
                    "<div class=\"footnote-definition\" id=\"fn-{0}\"><sup class=\"footnote-definition-label\">{0}</sup>\n",
                    escape_html(label)
                );
                self.render_children(node, page, out);
                out.push_str("</div>\n");
            }
            Node::ThematicBreak => out.push_str("<hr />\n"),
            Node::Html { html } => out.push_str(html),
            Node::Callout(callout) => self.render_callout(callout, page, out),
            Node::Raw { source } => {
                out.push_str(source);
                out.push('\n');
            }
            Node::Text { text } => out.push_str(&escape_html(text)),
            Node::Code { code } => {
                let _ = write!(out, "<code>{}</code>", escape_html(code));
            }
            Node::Emphasis { .. } => self.wrap("em", node, page, out),
            Node::Strong { .. } => self.wrap("strong", node, page, out),
            Node::Strikethrough { .. } => self.wrap("del", node, page, out),
            Node::Link { dest, title, .. } => {
                let href = page.urls.resolve(dest, AssetKind::Link);
                let _ = write!(out, "<a href=\"{}\"", escape_html(&href));
                if !title.is_empty() {
                    let _ = write!(out, " title=\"{}\"", escape_html(title));
                }
                out.push('>');
                self.render_children(node, page, out);
                out.push_str("</a>");
            }
            Node::Image { src, title, alt } => {
                let src = page.urls.resolve(src, AssetKind::Image);
                let _ = write!(
                    out,
                    "<img src=\"{}\" alt=\"{}\"",
                    escape_html(&src),
                    escape_html(alt)
                );
                if !title.is_empty() {
                    let _ = write!(out, " title=\"{}\"", escape_html(title));
                }
                out.push_str(" />");
            }
            Node::FootnoteReference { label } => {
                let _ = write!(
                    out,
                    "<sup class=\"footnote-reference\"><a href=\"#fn-{0}\">{0}</a></sup>",
                    escape_html(label)
                );
            }
            Node::TaskMarker { checked } => {
                out.push_str(if *checked {
                    "<input disabled=\"\" type=\"checkbox\" checked=\"\" /> "
                } else {
                    "<input disabled=\"\" type=\"checkbox\" /> "
                });
            }
            Node::SoftBreak => out.push('\n'),
            Node::HardBreak => out.push_str("<br />\n"),
        }
    }

    fn wrap(&self, tag: &str, node: &Node, page: &mut Page<'_>, out: &mut String) {
        let _ = write!(out, "<{}>", tag);
        self.render_children(node, page, out);
        let _ = write!(out, "</{}>", tag);
        if matches!(tag, "p" | "li") {
            out.push('\n');
        }
    }

    fn render_table(
        &self,
        alignments: &[Align],
        children: &[Node],
        page: &mut Page<'_>,
        out: &mut String,
    ) {
        out.push_str("<table>\n");
        let mut body_open = false;

        for child in children {
            match child {
                Node::TableHead { children: cells } => {
                    out.push_str("<thead><tr>");
                    self.render_cells("th", alignments, cells, page, out);
                    out.push_str("</tr></thead>\n");
                }
                Node::TableRow { children: cells } => {
                    if !body_open {
                        out.push_str("<tbody>\n");
                        body_open = true;
                    }
                    out.push_str("<tr>");
                    self.render_cells("td", alignments, cells, page, out);
                    out.push_str("</tr>\n");
                }
                other => self.render_node(other, page, out),
            }
        }

        if body_open {
            out.push_str("</tbody>\n");
        }
        out.push_str("</table>\n");
    }

    fn render_cells(
        &self,
        tag: &str,
        alignments: &[Align],
        cells: &[Node],
        page: &mut Page<'_>,
        out: &mut String,
    ) {
        for (i, cell) in cells.iter().enumerate() {
            match alignments.get(i) {
                Some(Align::Left) => {
                    let _ = write!(out, "<{} style=\"text-align: left\">", tag);
                }
                Some(Align::Center) => {
                    let _ = write!(out, "<{} style=\"text-align: center\">", tag);
                }
                Some(Align::Right) => {
                    let _ = write!(out, "<{} style=\"text-align: right\">", tag);
                }
                _ => {
                    let _ = write!(out, "<{}>", tag);
                }
            }
            self.render_children(cell, page, out);
            let _ = write!(out, "</{}>", tag);
        }
    }

    fn render_callout(&self, callout: &Callout, page: &mut Page<'_>, out: &mut String) {
        let _ = writeln!(
            out,
            "<blockquote class=\"callout callout-{}\">",
            escape_html(&slug::slugify(&callout.kind))
        );

        let inline = callout.children.iter().all(is_inline);
        if inline && !callout.children.is_empty() {
            out.push_str("<p>");
        }
        for child in &callout.children {
            self.render_node(child, page, out);
        }
        if inline && !callout.children.is_empty() {
            out.push_str("</p>\n");
        }

        let source = callout.attr("source").or_else(|| callout.attr("author"));
        let href = callout.attr("url").or_else(|| callout.attr("src"));
        match (source, href) {
            (Some(source), Some(href)) => {
                let _ = writeln!(
                    out,
                    "<cite><a href=\"{}\">{}</a></cite>",
                    escape_html(&page.urls.resolve(href, AssetKind::Link)),
                    escape_html(source)
                );
            }
            (Some(source), None) => {
                let _ = writeln!(out, "<cite>{}</cite>", escape_html(source));
            }
            (None, Some(href)) => {
                let href = escape_html(&page.urls.resolve(href, AssetKind::Link));
                let _ = writeln!(out, "<cite><a href=\"{0}\">{0}</a></cite>", href);
            }
            (None, None) => {}
        }
        out.push_str("</blockquote>\n");
    }

    /// Highlight a code block
    fn highlight_code(&self, code: &str, lang: Option<&str>) -> String {
        let lang = lang.unwrap_or("text");

        // Try to find syntax for the language
        let syntax = self
            .syntax_set
            .find_syntax_by_token(lang)
            .or_else(|| self.syntax_set.find_syntax_by_extension(lang))
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text());

        let theme = self
            .theme_set
            .themes
            .get(&self.theme_name)
            .or_else(|| self.theme_set.themes.values().next());

        let highlighted = theme.and_then(|theme| {
            highlighted_html_for_string(code, &self.syntax_set, syntax, theme).ok()
        });

        match highlighted {
            Some(highlighted) if self.line_numbers => self.add_line_numbers(&highlighted, lang),
            Some(highlighted) => format!(
                r#"<figure class="highlight {}">{}</figure>"#,
                escape_html(lang),
                highlighted
            ),
            None => format!(
                r#"<pre><code class="language-{}">{}</code></pre>"#,
                escape_html(lang),
                escape_html(code)
            ),
        }
    }

    /// Add line numbers to highlighted code
    fn add_line_numbers(&self, code: &str, lang: &str) -> String {
        let lines: Vec<&str> = code.lines().collect();
        let line_count = lines.len();

        let mut gutter = String::new();
        let mut code_lines = String::new();

        for (i, line) in lines.iter().enumerate() {
            let _ = write!(gutter, r#"<span class="line-number">{}</span>"#, i + 1);
            code_lines.push_str(line);
            if i + 1 < line_count {
                gutter.push('\n');
                code_lines.push('\n');
            }
        }

        format!(
            r#"<figure class="highlight {}"><table><tr><td class="gutter"><pre>{}</pre></td><td class="code">{}</td></tr></table></figure>"#,
            escape_html(lang),
            gutter,
            code_lines
        )
    }
}

impl Default for HtmlRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn is_inline(node: &Node) -> bool {
    matches!(
        node,
        Node::Text { .. }
            | Node::Code { .. }
            | Node::Emphasis { .. }
            | Node::Strong { .. }
            | Node::Strikethrough { .. }
            | Node::Link { .. }
            | Node::Image { .. }
            | Node::FootnoteReference { .. }
            | Node::SoftBreak
            | Node::HardBreak
    )
}

/// Simple HTML escaping
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MarkdownTransformer;

    fn render(markdown: &str) -> String {
        let doc = MarkdownTransformer::new().transform(markdown).unwrap();
        HtmlRenderer::new().render(&doc.nodes, &Verbatim)
    }

    #[test]
    fn test_render_basic_markdown() {
        let html = render("# Hello World\n\nEcto & Postgres.");
        assert!(html.contains("<h1 id=\"hello-world\">Hello World</h1>"));
        assert!(html.contains("<p>Ecto &amp; Postgres.</p>"));
    }

    #[test]
    fn test_render_code_block() {
        let html = render("```rust\nfn main() {}\n```");
        assert!(html.contains("highlight rust"));
        assert!(html.contains("main"));
    }

    #[test]
    fn test_render_quote_callout() {
        let html = render(r#"{{<quote source="Ecto docs" url="https://hexdocs.pm/ecto">}}Transactions nest.{{</quote>}}"#);
        assert!(html.contains("<blockquote class=\"callout callout-quote\">"));
        assert!(html.contains("<p>Transactions nest.</p>"));
        assert!(html.contains("<cite><a href=\"https://hexdocs.pm/ecto\">Ecto docs</a></cite>"));
    }

    #[test]
    fn test_raw_short_tag_passes_through() {
        let html = render("{{< video id=\"42\" >}}\n");
        assert!(html.contains("{{< video id=\"42\" >}}"));
    }

    #[test]
    fn test_table_alignment() {
        let html = render("| col | size |\n|-----|-----:|\n| a | 4 |\n");
        assert!(html.contains("<thead><tr><th>col</th><th style=\"text-align: right\">size</th></tr></thead>"));
        assert!(html.contains("<tbody>\n<tr><td>a</td><td style=\"text-align: right\">4</td></tr>"));
    }

    struct Prefix;

    impl ResolveUrl for Prefix {
        fn resolve(&self, target: &str, kind: AssetKind) -> String {
            match kind {
                AssetKind::Image => format!("/posts/x/{}", target),
                AssetKind::Link => target.to_string(),
            }
        }
    }

    #[test]
    fn test_image_urls_are_resolved() {
        let doc = MarkdownTransformer::new()
            .transform("![layout](tuple.png)")
            .unwrap();
        let html = HtmlRenderer::new().render(&doc.nodes, &Prefix);
        assert!(html.contains("<img src=\"/posts/x/tuple.png\" alt=\"layout\" />"));
    }

    #[test]
    fn test_repeated_headings_get_unique_ids() {
        let html = render("## Usage\n\ntext\n\n## Usage\n\n## Usage\n");
        assert!(html.contains("<h2 id=\"usage\">"));
        assert!(html.contains("<h2 id=\"usage-1\">"));
        assert!(html.contains("<h2 id=\"usage-2\">"));
    }
}
