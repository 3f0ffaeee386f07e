//! Content loader - discovers post files and groups language variants

use anyhow::Result;
use chrono_tz::Tz;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use super::{ContentError, FrontMatter, MarkdownTransformer, Post, Variant};
use crate::Site;

lazy_static! {
    /// BCP 47-ish language code: "en", "pt-br", "zh-hant"
    static ref LANG_CODE: Regex = Regex::new(r"(?i)^[a-z]{2,3}(-[a-z0-9]{2,8})*$").unwrap();
}

/// Files discovered for one slug, in discovery order
#[derive(Debug, Clone, PartialEq)]
pub struct PostGroup {
    pub slug: String,
    /// Directory the post's files (and bundle assets) live in
    pub dir: PathBuf,
    /// (language, path) per file
    pub files: Vec<(String, PathBuf)>,
}

/// Loads posts from the content directory
pub struct ContentLoader<'a> {
    site: &'a Site,
    transformer: MarkdownTransformer,
    tz: Tz,
    ignore: Vec<glob::Pattern>,
}

impl<'a> ContentLoader<'a> {
    /// Create a new content loader
    pub fn new(site: &'a Site) -> Result<Self> {
        Ok(Self {
            site,
            transformer: MarkdownTransformer::with_callouts(&site.config.callouts),
            tz: site.config.tz()?,
            ignore: site.config.ignore_patterns(),
        })
    }

    /// Walk the content directory and group Markdown files by slug
    pub fn discover(&self) -> Vec<PostGroup> {
        let root = &self.site.content_dir;
        if !root.exists() {
            tracing::warn!("Content directory {:?} does not exist", root);
            return Vec::new();
        }

        let mut groups: IndexMap<(PathBuf, String), Vec<(String, PathBuf)>> = IndexMap::new();

        for entry in WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!("Skipping unreadable content entry: {}", err);
                    None
                }
            })
        {
            let path = entry.path();
            if !entry.file_type().is_file() || !is_markdown_file(path) {
                continue;
            }
            if self.is_ignored(path) {
                tracing::debug!("Ignoring {:?}", path);
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                tracing::warn!("Skipping non UTF-8 file name {:?}", path);
                continue;
            };
            let (base, lang) = self.split_language(stem);
            let lang = lang.unwrap_or_else(|| self.site.config.language.to_ascii_lowercase());
            let dir = path.parent().unwrap_or(root).to_path_buf();

            let slug = if base == "index" && dir != *root {
                dir.file_name()
                    .and_then(|s| s.to_str())
                    .unwrap_or(base)
                    .to_string()
            } else {
                base.to_string()
            };

            groups
                .entry((dir, slug))
                .or_default()
                .push((lang, path.to_path_buf()));
        }

        groups
            .into_iter()
            .map(|((dir, slug), files)| PostGroup { slug, dir, files })
            .collect()
    }

    /// Posts in discovery order, parsed one at a time as the iterator advances
    pub fn posts(&self) -> impl Iterator<Item = Result<Post, ContentError>> + '_ {
        self.discover()
            .into_iter()
            .map(move |group| self.load_group(&group))
    }

    /// Every post, parsed in parallel; results keep discovery order
    pub fn load_all(&self) -> Vec<Result<Post, ContentError>> {
        let groups = self.discover();
        tracing::debug!("Discovered {} post groups", groups.len());
        groups.par_iter().map(|g| self.load_group(g)).collect()
    }

    /// Build one post from its group of variant files
    pub fn load_group(&self, group: &PostGroup) -> Result<Post, ContentError> {
        let mut claimed: HashMap<&str, &Path> = HashMap::new();
        for (lang, path) in &group.files {
            if let Some(first) = claimed.insert(lang.as_str(), path.as_path()) {
                return Err(ContentError::AmbiguousVariant {
                    slug: group.slug.clone(),
                    lang: lang.clone(),
                    first: first.to_path_buf(),
                    second: path.clone(),
                });
            }
        }

        let mut variants = BTreeMap::new();
        for (lang, path) in &group.files {
            let variant = self.load_variant(lang, path)?;
            variants.insert(lang.clone(), variant);
        }

        let default_lang = self.site.config.language.to_ascii_lowercase();
        let primary_lang = if variants.contains_key(&default_lang) {
            default_lang
        } else {
            // BTreeMap order: lexicographically first language.
            variants.keys().next().cloned().unwrap_or(default_lang)
        };
        let Some(primary) = variants.get(&primary_lang) else {
            return Err(ContentError::malformed(&group.dir, 1, "post has no variants"));
        };

        let date = self.publish_date(primary)?;
        for variant in variants.values() {
            if self.publish_date(variant)? != date {
                return Err(ContentError::malformed(
                    &variant.source,
                    1,
                    format!(
                        "date '{}' differs from '{}' in {}",
                        variant.front_matter.date,
                        primary.front_matter.date,
                        primary.source.display()
                    ),
                ));
            }
        }

        let fm = &primary.front_matter;
        let post = Post {
            slug: group.slug.clone(),
            title: fm.title.clone(),
            date,
            categories: fm.categories.clone(),
            tags: fm.tags.clone(),
            image: fm.image.clone().map(super::AssetRef::image),
            dir: group.dir.clone(),
            primary_lang,
            variants,
        };
        tracing::debug!(
            "Loaded post '{}' ({} variants)",
            post.slug,
            post.variants.len()
        );
        Ok(post)
    }

    fn load_variant(&self, lang: &str, path: &Path) -> Result<Variant, ContentError> {
        let content = fs::read_to_string(path).map_err(|e| ContentError::io(path, e))?;
        let (front_matter, body) = FrontMatter::parse(&content)
            .map_err(|e| ContentError::malformed(path, e.line, e.message))?;
        let body_line = FrontMatter::body_line(&content, body);

        let document = self.transformer.transform(body).map_err(|e| match e {
            super::TransformError::Unterminated { line, construct } => {
                ContentError::UnterminatedBlock {
                    path: path.to_path_buf(),
                    line: body_line + line - 1,
                    construct,
                }
            }
        })?;

        Ok(Variant {
            lang: lang.to_string(),
            source: path.to_path_buf(),
            front_matter,
            document,
            body_line,
        })
    }

    fn publish_date(
        &self,
        variant: &Variant,
    ) -> Result<chrono::DateTime<chrono::FixedOffset>, ContentError> {
        variant.front_matter.publish_date(&self.tz).ok_or_else(|| {
            ContentError::malformed(
                &variant.source,
                1,
                format!("unrecognized date '{}'", variant.front_matter.date),
            )
        })
    }

    /// Split "index.pt-br" into ("index", Some("pt-br"))
    fn split_language<'s>(&self, stem: &'s str) -> (&'s str, Option<String>) {
        if let Some((base, suffix)) = stem.rsplit_once('.') {
            if !base.is_empty() && LANG_CODE.is_match(suffix) {
                let lang = suffix.to_ascii_lowercase();
                let languages = &self.site.config.languages;
                if languages.is_empty() || languages.iter().any(|l| l.eq_ignore_ascii_case(&lang))
                {
                    return (base, Some(lang));
                }
            }
        }
        (stem, None)
    }

    fn is_ignored(&self, path: &Path) -> bool {
        let relative = path
            .strip_prefix(&self.site.content_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        self.ignore.iter().any(|p| p.matches(&relative))
    }
}

/// Check if a file is a markdown file
pub fn is_markdown_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "md" || e == "markdown")
        .unwrap_or(false)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn post(title: &str, date: &str) -> String {
        format!("---\ntitle: {}\ndate: {}\n---\n\nBody of {}.\n", title, date, title)
    }

    fn site(dir: &Path, config: SiteConfig) -> Site {
        Site::with_config(dir, config)
    }

    #[test]
    fn test_groups_language_variants() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("content");
        write(&content, "padding/index.en.md", &post("Padding", "2024-03-01"));
        write(&content, "padding/index.pt-br.md", &post("Preenchimento", "2024-03-01"));

        let site = site(dir.path(), SiteConfig::default());
        let loader = ContentLoader::new(&site).unwrap();
        let posts: Vec<_> = loader.posts().collect::<Result<_, _>>().unwrap();

        assert_eq!(posts.len(), 1);
        let post = &posts[0];
        assert_eq!(post.slug, "padding");
        assert_eq!(post.languages().collect::<Vec<_>>(), vec!["en", "pt-br"]);
        assert_eq!(post.title, "Padding");
        assert_eq!(post.variant("pt-br").unwrap().title(), "Preenchimento");
    }

    #[test]
    fn test_unsuffixed_file_is_default_language() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("content");
        write(&content, "xref/index.md", &post("Xref", "2024-01-01"));
        write(&content, "xref/index.en.md", &post("Xref again", "2024-01-01"));
        write(&content, "flat.pt-br.md", &post("Plano", "2024-01-02"));

        let config = SiteConfig {
            language: "pt-br".into(),
            ..SiteConfig::default()
        };
        let site = site(dir.path(), config);
        let loader = ContentLoader::new(&site).unwrap();
        let results: Vec<_> = loader.posts().collect();

        assert_eq!(results.len(), 2);
        let flat = results[0].as_ref().unwrap();
        assert_eq!(flat.slug, "flat");
        assert_eq!(flat.languages().collect::<Vec<_>>(), vec!["pt-br"]);
        let xref = results[1].as_ref().unwrap();
        assert_eq!(xref.languages().collect::<Vec<_>>(), vec!["en", "pt-br"]);
        assert_eq!(xref.primary_lang, "pt-br");
        assert_eq!(xref.title, "Xref");
    }

    #[test]
    fn test_ambiguous_variant() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("content");
        write(&content, "tx/index.md", &post("Tx", "2024-01-01"));
        write(&content, "tx/index.en.md", &post("Tx", "2024-01-01"));

        let site = site(dir.path(), SiteConfig::default());
        let loader = ContentLoader::new(&site).unwrap();
        let err = loader.posts().next().unwrap().unwrap_err();
        match err {
            ContentError::AmbiguousVariant { slug, lang, .. } => {
                assert_eq!(slug, "tx");
                assert_eq!(lang, "en");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_variant_dates_must_agree() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("content");
        write(&content, "tx/index.en.md", &post("Tx", "2024-01-01"));
        write(&content, "tx/index.de.md", &post("Tx", "2024-02-01"));

        let site = site(dir.path(), SiteConfig::default());
        let loader = ContentLoader::new(&site).unwrap();
        let err = loader.posts().next().unwrap().unwrap_err();
        assert!(matches!(err, ContentError::MalformedMetadata { .. }));
        assert!(err.path().ends_with("index.de.md"));
    }

    #[test]
    fn test_unterminated_fence_reports_file_line() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("content");
        write(
            &content,
            "broken/index.md",
            "---\ntitle: Broken\ndate: 2024-01-01\n---\n\nText.\n\n```sql\nSELECT 1;\n",
        );

        let site = site(dir.path(), SiteConfig::default());
        let loader = ContentLoader::new(&site).unwrap();
        let err = loader.posts().next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            ContentError::UnterminatedBlock { line: 8, .. }
        ));
    }

    #[test]
    fn test_ignore_patterns_and_hidden_files() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("content");
        write(&content, "kept/index.md", &post("Kept", "2024-01-01"));
        write(&content, "drafts/wip/index.md", &post("Wip", "2024-01-01"));
        write(&content, ".trash/old/index.md", &post("Old", "2024-01-01"));
        write(&content, "kept/notes.txt", "not markdown");

        let config = SiteConfig {
            ignore: vec!["drafts/**".into()],
            ..SiteConfig::default()
        };
        let site = site(dir.path(), config);
        let loader = ContentLoader::new(&site).unwrap();
        let groups = loader.discover();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].slug, "kept");
    }

    #[test]
    fn test_configured_languages_limit_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("content");
        write(&content, "v1.de.md", &post("Version", "2024-01-01"));

        let config = SiteConfig {
            languages: vec!["en".into(), "pt-br".into()],
            ..SiteConfig::default()
        };
        let site = site(dir.path(), config);
        let loader = ContentLoader::new(&site).unwrap();
        let groups = loader.discover();
        assert_eq!(groups[0].slug, "v1.de");
        assert_eq!(groups[0].files[0].0, "en");
    }

    #[test]
    fn test_parallel_load_keeps_discovery_order() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("content");
        for i in 0..12 {
            write(
                &content,
                &format!("p{:02}/index.md", i),
                &post(&format!("P{}", i), "2024-01-01"),
            );
        }

        let site = site(dir.path(), SiteConfig::default());
        let loader = ContentLoader::new(&site).unwrap();
        let slugs: Vec<String> = loader
            .load_all()
            .into_iter()
            .map(|r| r.unwrap().slug)
            .collect();
        let expected: Vec<String> = (0..12).map(|i| format!("p{:02}", i)).collect();
        assert_eq!(slugs, expected);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("content");
        write(&content, "kept/index.md", &post("Kept", "2024-01-01"));
        std::os::unix::fs::symlink(&content, content.join("kept/loop")).unwrap();

        let site = site(dir.path(), SiteConfig::default());
        let loader = ContentLoader::new(&site).unwrap();
        let groups = loader.discover();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].slug, "kept");
    }
}
