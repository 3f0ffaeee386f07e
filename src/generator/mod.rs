//! Generator module - writes the static site from an assembled index

mod html;

pub use html::{escape_html, HtmlRenderer, ResolveUrl, Verbatim};

use anyhow::{Context as _, Result};
use chrono::Datelike;
use std::fs;
use std::path::{Path, PathBuf};
use tera::Context;

use crate::content::{AssetKind, AssetRef, Post, Variant};
use crate::helpers::{encode_path, encode_segment, full_url_for, url_for};
use crate::site::{cross_link, SiteIndex};
use crate::templates::{
    ConfigData, NavPost, PaginationData, PostData, TemplateRenderer, TermLink, Translation,
};
use crate::Site;

/// Number of entries in `atom.xml`
const FEED_SIZE: usize = 20;

/// What a generation pass wrote
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GenerateStats {
    /// HTML pages written
    pub pages: usize,
    /// Asset files copied
    pub assets: usize,
    /// Referenced asset files that do not exist
    pub missing_assets: Vec<PathBuf>,
}

/// Static site generator using Tera templates
pub struct Generator<'a> {
    site: &'a Site,
    renderer: TemplateRenderer,
    html: HtmlRenderer,
}

/// Resolves links and images inside one variant of a post
struct PostUrls<'a> {
    site: &'a Site,
    index: &'a SiteIndex,
    post: &'a Post,
    lang: &'a str,
}

impl ResolveUrl for PostUrls<'_> {
    fn resolve(&self, target: &str, kind: AssetKind) -> String {
        match kind {
            AssetKind::Image => asset_url(self.site, self.post, target),
            AssetKind::Link => match cross_link(target) {
                Some((slug, suffix)) => match self.index.get(slug) {
                    Some(linked) => {
                        let lang = if linked.variant(self.lang).is_some() {
                            self.lang
                        } else {
                            linked.primary().lang.as_str()
                        };
                        format!("{}{}", post_url(self.site, linked, lang), suffix)
                    }
                    None => target.to_string(),
                },
                None => target.to_string(),
            },
        }
    }
}

/// Output path of a post variant relative to the site root, with a trailing slash
pub fn post_path(site: &Site, slug: &str, lang: &str) -> String {
    if site.config.is_default_language(lang) {
        format!("posts/{}/", encode_segment(slug))
    } else {
        format!("{}/posts/{}/", lang, encode_segment(slug))
    }
}

fn post_url(site: &Site, post: &Post, lang: &str) -> String {
    url_for(&site.config, &post_path(site, &post.slug, lang))
}

/// URL of an image referenced by a post; bundle-relative images move next to
/// the default-language page
fn asset_url(site: &Site, post: &Post, target: &str) -> String {
    let asset = AssetRef::image(target);
    if asset.is_external() || asset.resolve(&post.dir).is_none() {
        return target.to_string();
    }
    let split = target.find(['#', '?']).unwrap_or(target.len());
    let (rel, suffix) = target.split_at(split);
    let rel = rel.trim_start_matches("./");
    url_for(
        &site.config,
        &format!(
            "posts/{}/{}{}",
            encode_segment(&post.slug),
            encode_path(rel),
            suffix
        ),
    )
}

impl<'a> Generator<'a> {
    /// Create a new generator
    pub fn new(site: &'a Site) -> Result<Self> {
        Ok(Self {
            site,
            renderer: TemplateRenderer::new()?,
            html: HtmlRenderer::with_options(&site.config.highlight),
        })
    }

    /// Generate the entire site
    pub fn generate(&self, index: &SiteIndex) -> Result<GenerateStats> {
        let public_dir = &self.site.public_dir;
        fs::create_dir_all(public_dir)
            .with_context(|| format!("Failed to create {:?}", public_dir))?;

        let mut stats = GenerateStats::default();
        let config_data = self.build_config_data();

        stats.pages += self.generate_index_pages(index, &config_data)?;
        stats.pages += self.generate_post_pages(index, &config_data)?;
        stats.pages += self.generate_term_pages(index, &config_data)?;
        self.generate_atom_feed(index)?;
        self.copy_post_assets(index, &mut stats)?;

        tracing::info!(
            "Wrote {} pages and {} assets to {:?}",
            stats.pages,
            stats.assets,
            public_dir
        );
        Ok(stats)
    }

    /// Build config data for templates
    fn build_config_data(&self) -> ConfigData {
        let config = &self.site.config;
        ConfigData {
            title: config.title.clone(),
            description: config.description.clone(),
            author: config.author.clone(),
            url: config.url.clone(),
            root: url_for(config, "/"),
            language: config.language.clone(),
        }
    }

    /// Create a base context with common variables
    fn create_base_context(&self, config_data: &ConfigData, lang: &str) -> Context {
        let mut context = Context::new();
        context.insert("config", config_data);
        context.insert("lang", lang);
        context.insert("current_year", &chrono::Utc::now().year().to_string());
        context
    }

    /// The variant shown in listings: default language when present
    fn listing_variant<'p>(&self, post: &'p Post) -> &'p Variant {
        post.variant(&self.site.config.language.to_ascii_lowercase())
            .unwrap_or_else(|| post.primary())
    }

    fn term_links<'n>(&self, dir: &str, names: impl Iterator<Item = &'n str>) -> Vec<TermLink> {
        names
            .filter_map(|name| {
                let slug = slug::slugify(name);
                if slug.is_empty() {
                    return None;
                }
                Some(TermLink {
                    name: name.to_string(),
                    path: url_for(&self.site.config, &format!("{}/{}/", dir, slug)),
                })
            })
            .collect()
    }

    fn post_data(&self, index: &SiteIndex, post: &Post, variant: &Variant, full: bool) -> PostData {
        let urls = PostUrls {
            site: self.site,
            index,
            post,
            lang: &variant.lang,
        };
        let config = &self.site.config;

        let (content, excerpt) = if full {
            let content = self.html.render(&variant.document.nodes, &urls);
            let excerpt = variant
                .document
                .excerpt()
                .map(|nodes| self.html.render(nodes, &urls));
            (content, excerpt)
        } else {
            (String::new(), None)
        };

        PostData {
            slug: post.slug.clone(),
            lang: variant.lang.clone(),
            title: variant.title().to_string(),
            date: post.date.format("%Y-%m-%d").to_string(),
            datetime: post.date.to_rfc3339(),
            path: post_url(self.site, post, &variant.lang),
            tags: self.term_links(&config.tag_dir, post.tags.iter().map(String::as_str)),
            categories: self.term_links(
                &config.category_dir,
                post.categories.iter().map(String::as_str),
            ),
            cover: post
                .image
                .as_ref()
                .map(|cover| asset_url(self.site, post, &cover.target)),
            content,
            excerpt,
            word_count: variant.document.word_count(),
        }
    }

    /// Generate index pages with pagination
    fn generate_index_pages(&self, index: &SiteIndex, config_data: &ConfigData) -> Result<usize> {
        let config = &self.site.config;
        let per_page = config.per_page;
        let posts = index.listing();
        let total_pages = posts.len().div_ceil(per_page).max(1);

        let page_link = |n: usize| {
            if n == 1 {
                url_for(config, "/")
            } else {
                url_for(config, &format!("page/{}/", n))
            }
        };

        for page_num in 1..=total_pages {
            let start = (page_num - 1) * per_page;
            let end = (start + per_page).min(posts.len());
            let page_posts: Vec<PostData> = posts[start..end]
                .iter()
                .map(|p| self.post_data(index, p, self.listing_variant(p), true))
                .collect();

            let pagination = PaginationData {
                per_page,
                total: total_pages,
                current: page_num,
                current_url: page_link(page_num),
                prev_link: if page_num > 1 {
                    page_link(page_num - 1)
                } else {
                    String::new()
                },
                next_link: if page_num < total_pages {
                    page_link(page_num + 1)
                } else {
                    String::new()
                },
            };

            let mut context = self.create_base_context(config_data, &config.language);
            context.insert("page_posts", &page_posts);
            context.insert("pagination", &pagination);

            let html = self.renderer.render("index.html", &context)?;

            let output_path = if page_num == 1 {
                self.site.public_dir.join("index.html")
            } else {
                self.site
                    .public_dir
                    .join(format!("page/{}/index.html", page_num))
            };
            write_file(&output_path, &html)?;
        }

        Ok(total_pages)
    }

    /// Generate one page per post variant
    fn generate_post_pages(&self, index: &SiteIndex, config_data: &ConfigData) -> Result<usize> {
        let mut written = 0;

        for post in index.listing() {
            let (newer, older) = index.neighbours(&post.slug);

            for variant in post.variants.values() {
                let lang = variant.lang.as_str();
                let nav = |other: Option<&Post>| {
                    other.map(|p| {
                        let (title, lang) = match p.variant(lang) {
                            Some(v) => (v.title(), lang),
                            None => (p.title.as_str(), p.primary().lang.as_str()),
                        };
                        NavPost {
                            title: title.to_string(),
                            path: post_url(self.site, p, lang),
                        }
                    })
                };

                let translations: Vec<Translation> = post
                    .variants
                    .values()
                    .filter(|v| v.lang != variant.lang)
                    .map(|v| Translation {
                        lang: v.lang.clone(),
                        title: v.title().to_string(),
                        path: post_url(self.site, post, &v.lang),
                    })
                    .collect();

                let mut context = self.create_base_context(config_data, lang);
                context.insert("post", &self.post_data(index, post, variant, true));
                context.insert("translations", &translations);
                context.insert("next_post", &nav(newer));
                context.insert("prev_post", &nav(older));

                let html = self.renderer.render("post.html", &context)?;
                let output_path = self
                    .site
                    .public_dir
                    .join(post_path(self.site, &post.slug, lang))
                    .join("index.html");
                write_file(&output_path, &html)?;
                written += 1;
            }
        }

        Ok(written)
    }

    /// Generate category and tag pages
    fn generate_term_pages(&self, index: &SiteIndex, config_data: &ConfigData) -> Result<usize> {
        let config = &self.site.config;
        let mut written = 0;

        let taxonomies: [(&str, &str, Vec<(&str, Vec<&Post>)>); 2] = [
            ("Category", config.category_dir.as_str(), index.categories().collect()),
            ("Tag", config.tag_dir.as_str(), index.tags().collect()),
        ];

        for (kind, dir, terms) in taxonomies {
            for (name, posts) in terms {
                let term_slug = slug::slugify(name);
                if term_slug.is_empty() {
                    tracing::warn!("Skipping {} '{}': empty slug", kind.to_lowercase(), name);
                    continue;
                }

                let term_posts: Vec<PostData> = posts
                    .iter()
                    .map(|p| self.post_data(index, p, self.listing_variant(p), false))
                    .collect();

                let mut context = self.create_base_context(config_data, &config.language);
                context.insert("term_kind", kind);
                context.insert("term_name", name);
                context.insert("term_posts", &term_posts);

                let html = self.renderer.render("term.html", &context)?;
                let output_path = self
                    .site
                    .public_dir
                    .join(dir)
                    .join(&term_slug)
                    .join("index.html");
                write_file(&output_path, &html)?;
                written += 1;
            }
        }

        Ok(written)
    }

    /// Generate Atom feed of the newest posts
    fn generate_atom_feed(&self, index: &SiteIndex) -> Result<()> {
        let config = &self.site.config;
        let base_url = config.url.trim_end_matches('/');
        let updated = index
            .listing()
            .first()
            .map(|p| p.date.to_rfc3339())
            .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());

        let mut feed = String::new();
        feed.push_str(r#"<?xml version="1.0" encoding="utf-8"?>"#);
        feed.push('\n');
        feed.push_str(r#"<feed xmlns="http://www.w3.org/2005/Atom">"#);
        feed.push('\n');
        feed.push_str(&format!("  <title>{}</title>\n", escape_xml(&config.title)));
        feed.push_str(&format!(
            "  <link href=\"{}\" rel=\"self\"/>\n",
            full_url_for(config, "atom.xml")
        ));
        feed.push_str(&format!("  <link href=\"{}\"/>\n", full_url_for(config, "/")));
        feed.push_str(&format!("  <updated>{}</updated>\n", updated));
        feed.push_str(&format!("  <id>{}</id>\n", full_url_for(config, "/")));
        feed.push_str(&format!(
            "  <author><name>{}</name></author>\n",
            escape_xml(&config.author)
        ));

        for post in index.listing().iter().take(FEED_SIZE) {
            let variant = self.listing_variant(post);
            let data = self.post_data(index, post, variant, true);
            let link = format!("{}{}", base_url, data.path);

            feed.push_str("  <entry>\n");
            feed.push_str(&format!("    <title>{}</title>\n", escape_xml(&data.title)));
            feed.push_str(&format!("    <link href=\"{}\"/>\n", link));
            feed.push_str(&format!("    <id>{}</id>\n", link));
            feed.push_str(&format!("    <published>{}</published>\n", data.datetime));
            feed.push_str(&format!("    <updated>{}</updated>\n", data.datetime));
            for term in &data.categories {
                feed.push_str(&format!(
                    "    <category term=\"{}\"/>\n",
                    escape_xml(&term.name)
                ));
            }
            let content = data.excerpt.as_ref().unwrap_or(&data.content);
            let content = convert_relative_urls_to_absolute(content, base_url);
            feed.push_str(&format!(
                "    <content type=\"html\"><![CDATA[{}]]></content>\n",
                strip_invalid_xml_chars(&content).replace("]]>", "]]]]><![CDATA[>")
            ));
            feed.push_str("  </entry>\n");
        }

        feed.push_str("</feed>\n");

        write_file(&self.site.public_dir.join("atom.xml"), &feed)?;
        tracing::debug!("Generated atom.xml");
        Ok(())
    }

    /// Copy cover and inline images that live beside each post
    fn copy_post_assets(&self, index: &SiteIndex, stats: &mut GenerateStats) -> Result<()> {
        for post in index.listing() {
            for image in post.images() {
                let Some(source) = image.resolve(&post.dir) else {
                    continue;
                };
                if !source.is_file() {
                    tracing::warn!(
                        "Post '{}' references missing asset {:?}",
                        post.slug,
                        source
                    );
                    stats.missing_assets.push(source);
                    continue;
                }

                let relative = source.strip_prefix(&post.dir).unwrap_or(&source);
                let dest = self
                    .site
                    .public_dir
                    .join("posts")
                    .join(&post.slug)
                    .join(relative);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(&source, &dest)
                    .with_context(|| format!("Failed to copy {:?} to {:?}", source, dest))?;
                tracing::debug!("Copied asset: {:?}", dest);
                stats.assets += 1;
            }
        }

        Ok(())
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create dir {:?}", parent))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))?;
    tracing::debug!("Generated: {:?}", path);
    Ok(())
}

/// Escape XML special characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Convert site-rooted URLs in HTML content to absolute URLs
fn convert_relative_urls_to_absolute(content: &str, base_url: &str) -> String {
    content
        .replace("href=\"/", &format!("href=\"{}/", base_url))
        .replace("src=\"/", &format!("src=\"{}/", base_url))
}

/// Strip control characters XML 1.0 does not allow
fn strip_invalid_xml_chars(s: &str) -> String {
    s.chars()
        .filter(|&c| {
            c == '\t'
                || c == '\n'
                || c == '\r'
                || ('\u{0020}'..='\u{D7FF}').contains(&c)
                || ('\u{E000}'..='\u{FFFD}').contains(&c)
                || ('\u{10000}'..='\u{10FFFF}').contains(&c)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("Tom & \"Jerry\""), "Tom &amp; &quot;Jerry&quot;");
    }

    #[test]
    fn test_absolute_urls_in_feed_content() {
        let html = r#"<a href="/posts/x/">x</a><img src="/posts/x/a.png"><a href="https://e.org">e</a>"#;
        let out = convert_relative_urls_to_absolute(html, "https://blog.dev");
        assert!(out.contains(r#"href="https://blog.dev/posts/x/""#));
        assert!(out.contains(r#"src="https://blog.dev/posts/x/a.png""#));
        assert!(out.contains(r#"href="https://e.org""#));
    }

    #[test]
    fn test_strip_invalid_xml_chars() {
        assert_eq!(strip_invalid_xml_chars("a\u{0}b\u{8}c\n"), "abc\n");
    }

    #[test]
    fn test_post_paths_by_language() {
        let dir = tempfile::tempdir().unwrap();
        let site = Site::with_config(dir.path(), crate::config::SiteConfig::default());
        assert_eq!(post_path(&site, "padding", "en"), "posts/padding/");
        assert_eq!(post_path(&site, "padding", "pt-br"), "pt-br/posts/padding/");
    }
}
