//! Built-in page templates using the Tera template engine
//!
//! Templates are embedded in the binary; a site needs no theme directory.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use tera::{Context, Tera};

const LAYOUT: &str = r#"<!DOCTYPE html>
<html lang="{{ lang }}">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{% block title %}{{ config.title | escape }}{% endblock title %}</title>
  {% if config.description %}<meta name="description" content="{{ config.description | escape }}">{% endif %}
  <link rel="alternate" type="application/atom+xml" href="{{ config.root }}atom.xml" title="{{ config.title | escape }}">
  {% block head %}{% endblock head %}
</head>
<body>
  <header class="site-header">
    <a class="site-title" href="{{ config.root }}">{{ config.title | escape }}</a>
  </header>
  <main>
{% block content %}{% endblock content %}
  </main>
  <footer class="site-footer">
    &copy; {{ current_year }} {{ config.author | escape }}
  </footer>
</body>
</html>
"#;

const INDEX: &str = r#"{% extends "layout.html" %}
{% block content %}
{% for post in page_posts %}
<article class="post-summary">
  <h2><a href="{{ post.path }}">{{ post.title | escape }}</a></h2>
  <time datetime="{{ post.datetime }}">{{ post.date }}</time>
  {% if post.excerpt %}
  <div class="excerpt">{{ post.excerpt }}</div>
  <a class="read-more" href="{{ post.path }}">Read more</a>
  {% else %}
  <p class="excerpt">{{ post.content | strip_html | truncate_chars(length=200) | escape }}</p>
  {% endif %}
</article>
{% endfor %}
{% if pagination.total > 1 %}
<nav class="pagination">
  {% if pagination.prev_link %}<a class="prev" href="{{ pagination.prev_link }}">Newer</a>{% endif %}
  <span class="current">{{ pagination.current }} / {{ pagination.total }}</span>
  {% if pagination.next_link %}<a class="next" href="{{ pagination.next_link }}">Older</a>{% endif %}
</nav>
{% endif %}
{% endblock content %}
"#;

const POST: &str = r#"{% extends "layout.html" %}
{% block title %}{{ post.title | escape }} | {{ config.title | escape }}{% endblock title %}
{% block head %}{% for alt in translations %}
  <link rel="alternate" hreflang="{{ alt.lang }}" href="{{ alt.path }}">{% endfor %}
{% endblock head %}
{% block content %}
<article class="post">
  <h1 class="post-title">{{ post.title | escape }}</h1>
  <time datetime="{{ post.datetime }}">{{ post.date }}</time>
  {% if post.categories %}<ul class="post-categories">{% for term in post.categories %}<li><a href="{{ term.path }}">{{ term.name | escape }}</a></li>{% endfor %}</ul>{% endif %}
  {% if translations %}<ul class="post-translations">{% for alt in translations %}<li><a href="{{ alt.path }}" hreflang="{{ alt.lang }}">{{ alt.title | escape }}</a></li>{% endfor %}</ul>{% endif %}
  {% if post.cover %}<img class="post-cover" src="{{ post.cover }}" alt="">{% endif %}
  <div class="post-content">
{{ post.content }}
  </div>
  {% if post.tags %}<ul class="post-tags">{% for term in post.tags %}<li><a href="{{ term.path }}">#{{ term.name | escape }}</a></li>{% endfor %}</ul>{% endif %}
</article>
<nav class="post-nav">
  {% if next_post %}<a class="next" href="{{ next_post.path }}">{{ next_post.title | escape }}</a>{% endif %}
  {% if prev_post %}<a class="prev" href="{{ prev_post.path }}">{{ prev_post.title | escape }}</a>{% endif %}
</nav>
{% endblock content %}
"#;

const TERM: &str = r#"{% extends "layout.html" %}
{% block title %}{{ term_name | escape }} | {{ config.title | escape }}{% endblock title %}
{% block content %}
<h1 class="term-title">{{ term_kind }}: {{ term_name | escape }}</h1>
<ul class="term-posts">
{% for post in term_posts %}
  <li><time datetime="{{ post.datetime }}">{{ post.date }}</time> <a href="{{ post.path }}">{{ post.title | escape }}</a></li>
{% endfor %}
</ul>
{% endblock content %}
"#;

/// Template renderer with the embedded templates
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    /// Create a new renderer with all templates loaded
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();

        // Content is pre-rendered HTML; text fields use `| escape` explicitly
        tera.autoescape_on(vec![]);

        tera.add_raw_templates(vec![
            ("layout.html", LAYOUT),
            ("index.html", INDEX),
            ("post.html", POST),
            ("term.html", TERM),
        ])?;

        tera.register_filter("strip_html", strip_html_filter);
        tera.register_filter("truncate_chars", truncate_chars_filter);

        Ok(Self { tera })
    }

    /// Render a template with given context
    pub fn render(&self, template_name: &str, context: &Context) -> Result<String> {
        Ok(self.tera.render(template_name, context)?)
    }
}

/// Tera filter: strip HTML tags
fn strip_html_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let s = tera::try_get_value!("strip_html", "value", String, value);
    Ok(tera::Value::String(strip_html(&s)))
}

/// Remove every `<...>` tag from a string
pub fn strip_html(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }
    result
}

/// Tera filter: truncate by character count
fn truncate_chars_filter(
    value: &tera::Value,
    args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let s = tera::try_get_value!("truncate_chars", "value", String, value);
    let length = match args.get("length") {
        Some(val) => tera::try_get_value!("truncate_chars", "length", usize, val),
        None => 150,
    };
    let omission = match args.get("omission") {
        Some(val) => tera::try_get_value!("truncate_chars", "omission", String, val),
        None => " ...".to_string(),
    };

    let s = s.trim();
    if s.chars().count() <= length {
        Ok(tera::Value::String(s.to_string()))
    } else {
        let truncated: String = s.chars().take(length).collect();
        Ok(tera::Value::String(format!(
            "{}{}",
            truncated.trim_end(),
            omission
        )))
    }
}

// Template context data

#[derive(Debug, Clone, Serialize)]
pub struct ConfigData {
    pub title: String,
    pub description: String,
    pub author: String,
    pub url: String,
    pub root: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TermLink {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostData {
    pub slug: String,
    pub lang: String,
    pub title: String,
    /// Display date, `YYYY-MM-DD`
    pub date: String,
    /// RFC 3339 timestamp
    pub datetime: String,
    pub path: String,
    pub tags: Vec<TermLink>,
    pub categories: Vec<TermLink>,
    pub cover: Option<String>,
    pub content: String,
    pub excerpt: Option<String>,
    pub word_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationData {
    pub per_page: usize,
    pub total: usize,
    pub current: usize,
    pub current_url: String,
    pub prev_link: String,
    pub next_link: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NavPost {
    pub title: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Translation {
    pub lang: String,
    pub title: String,
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ConfigData {
        ConfigData {
            title: "Notes & Queries".into(),
            description: String::new(),
            author: "Ana".into(),
            url: "https://example.com".into(),
            root: "/".into(),
            language: "en".into(),
        }
    }

    #[test]
    fn test_term_page_escapes_names() {
        let renderer = TemplateRenderer::new().unwrap();
        let mut context = Context::new();
        context.insert("config", &config());
        context.insert("lang", "en");
        context.insert("current_year", "2024");
        context.insert("term_kind", "Tag");
        context.insert("term_name", "<ecto>");
        context.insert("term_posts", &Vec::<PostData>::new());

        let html = renderer.render("term.html", &context).unwrap();
        assert!(html.contains("Tag: &lt;ecto&gt;"));
        assert!(html.contains("<title>&lt;ecto&gt; | Notes &amp; Queries</title>"));
    }

    #[test]
    fn test_strip_and_truncate() {
        assert_eq!(strip_html("<p>Hello <em>there</em></p>"), "Hello there");

        let mut args = HashMap::new();
        args.insert("length".to_string(), tera::Value::from(5));
        let out = truncate_chars_filter(&tera::Value::from("abcdefgh"), &args).unwrap();
        assert_eq!(out, tera::Value::from("abcde ..."));
    }
}
