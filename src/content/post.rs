//! Post and Variant models

use chrono::{DateTime, FixedOffset};
use indexmap::IndexSet;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{Document, FrontMatter};

/// One language-specific rendering of a post
#[derive(Debug, Clone, Serialize)]
pub struct Variant {
    /// Normalized language code, e.g. "en" or "pt-br"
    pub lang: String,

    /// Full source file path
    pub source: PathBuf,

    /// Front matter of this file (carries the localized title)
    pub front_matter: FrontMatter,

    /// Structured body
    pub document: Document,

    /// Line of the source file the body starts on
    pub body_line: usize,
}

impl Variant {
    pub fn title(&self) -> &str {
        &self.front_matter.title
    }
}

/// Kind of thing an asset reference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Link,
}

/// A reference from a post to an image or external link.
///
/// Only the target string is stored; resolution against the post's source
/// directory happens when the site is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetRef {
    pub kind: AssetKind,
    pub target: String,
}

impl AssetRef {
    pub fn image(target: impl Into<String>) -> Self {
        Self {
            kind: AssetKind::Image,
            target: target.into(),
        }
    }

    /// Whether the target is an absolute URL or site-rooted path
    pub fn is_external(&self) -> bool {
        is_external(&self.target)
    }

    /// Path of the referenced file, if it lives next to the post
    pub fn resolve(&self, post_dir: &Path) -> Option<PathBuf> {
        if self.is_external() {
            return None;
        }
        let target = self.target.split(['#', '?']).next().unwrap_or_default();
        let target = target.trim_start_matches("./");
        if target.is_empty() || target.split('/').any(|c| c == "..") {
            return None;
        }
        Some(post_dir.join(target))
    }
}

/// Whether a reference leaves the post bundle
pub fn is_external(target: &str) -> bool {
    target.starts_with('/')
        || target.starts_with('#')
        || target.starts_with("//")
        || target.contains("://")
        || target.starts_with("mailto:")
        || target.starts_with("data:")
}

/// A logical post: every language variant of one slug
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    /// Stable identifier, from the directory or file name
    pub slug: String,

    /// Title of the primary variant
    pub title: String,

    /// Publication date, shared by every variant
    pub date: DateTime<FixedOffset>,

    pub categories: IndexSet<String>,
    pub tags: IndexSet<String>,

    /// Cover image from the `image` key
    pub image: Option<AssetRef>,

    /// Directory holding the post's files and bundle assets
    pub dir: PathBuf,

    /// Variants keyed by language code
    pub variants: BTreeMap<String, Variant>,

    /// Language of the variant the post-level metadata came from
    pub primary_lang: String,
}

impl Post {
    /// The variant whose metadata represents the post
    pub fn primary(&self) -> &Variant {
        self.variants
            .get(&self.primary_lang)
            .or_else(|| self.variants.values().next())
            .expect("a post always has at least one variant")
    }

    pub fn variant(&self, lang: &str) -> Option<&Variant> {
        self.variants.get(lang)
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.variants.keys().map(String::as_str)
    }

    /// Every image the post refers to: cover first, then inline images
    pub fn images(&self) -> Vec<AssetRef> {
        let mut seen = IndexSet::new();
        if let Some(cover) = &self.image {
            seen.insert(cover.target.clone());
        }
        for variant in self.variants.values() {
            for src in variant.document.images() {
                seen.insert(src.to_string());
            }
        }
        seen.into_iter().map(AssetRef::image).collect()
    }

    /// Outbound link targets found in any variant body
    pub fn links(&self) -> Vec<AssetRef> {
        let mut seen = IndexSet::new();
        for variant in self.variants.values() {
            for dest in variant.document.links() {
                seen.insert(dest.to_string());
            }
        }
        seen.into_iter()
            .map(|target| AssetRef {
                kind: AssetKind::Link,
                target,
            })
            .collect()
    }

    /// Slugs named by the opaque `related` front-matter key of any variant
    pub fn related(&self) -> Vec<String> {
        let mut seen = IndexSet::new();
        for variant in self.variants.values() {
            seen.extend(variant.front_matter.extra_strings("related"));
        }
        seen.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_resolution() {
        let dir = Path::new("/site/content/padding");
        assert_eq!(
            AssetRef::image("./img/tuple.png").resolve(dir),
            Some(dir.join("img/tuple.png"))
        );
        assert_eq!(
            AssetRef::image("cover.png?v=2").resolve(dir),
            Some(dir.join("cover.png"))
        );
        assert_eq!(AssetRef::image("https://cdn/x.png").resolve(dir), None);
        assert_eq!(AssetRef::image("/static/x.png").resolve(dir), None);
        assert_eq!(AssetRef::image("../other/x.png").resolve(dir), None);
    }
}
