//! Site assembler - ordered listing, slug lookup, taxonomies and cross-links

use lazy_static::lazy_static;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use crate::content::{ContentError, Post};

lazy_static! {
    /// Relative link to a sibling post: `../<slug>/`, optionally with a fragment
    static ref CROSS_LINK: Regex = Regex::new(r"^\.\./([^/#?]+)/?([#?].*)?$").unwrap();
}

/// Split a `../<slug>/#frag` link into the target slug and its suffix
pub fn cross_link(dest: &str) -> Option<(&str, &str)> {
    let caps = CROSS_LINK.captures(dest)?;
    let slug = caps.get(1)?.as_str();
    let suffix = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    Some((slug, suffix))
}

/// A cross-post link whose target slug does not exist.
///
/// Reported with the build summary; never fails the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedCrossLink {
    /// Slug of the post containing the link
    pub from: String,
    /// Slug the link points at
    pub target: String,
    /// File the link was found in
    pub source: PathBuf,
}

impl fmt::Display for UnresolvedCrossLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: post '{}' links to unknown post '{}'",
            self.source.display(),
            self.from,
            self.target
        )
    }
}

/// Listing order: newest first, slug ascending on equal dates
pub fn listing_order(a: &Post, b: &Post) -> Ordering {
    b.date.cmp(&a.date).then_with(|| a.slug.cmp(&b.slug))
}

/// The assembled site: every post in listing order plus lookup structures
#[derive(Debug, Default)]
pub struct SiteIndex {
    posts: Vec<Post>,
    by_slug: HashMap<String, usize>,
    categories: BTreeMap<String, Term>,
    tags: BTreeMap<String, Term>,
    warnings: Vec<UnresolvedCrossLink>,
}

/// A tag or category; spellings that slugify alike share one term
#[derive(Debug, Default)]
struct Term {
    /// Spellings in listing order; the first one is displayed
    names: Vec<String>,
    posts: Vec<usize>,
}

impl Term {
    fn name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or_default()
    }
}

/// Map key of a term: its slug, or the name itself when nothing slugifies
fn term_key(name: &str) -> String {
    let slug = slug::slugify(name);
    if slug.is_empty() {
        name.to_string()
    } else {
        slug
    }
}

fn add_term(terms: &mut BTreeMap<String, Term>, name: &str, post: usize) {
    let term = terms.entry(term_key(name)).or_default();
    if !term.names.iter().any(|n| n == name) {
        term.names.push(name.to_string());
    }
    if term.posts.last() != Some(&post) {
        term.posts.push(post);
    }
}

fn warn_merged(kind: &str, terms: &BTreeMap<String, Term>) {
    for term in terms.values().filter(|t| t.names.len() > 1) {
        tracing::warn!(
            "{} spellings {:?} share one page as '{}'",
            kind,
            term.names,
            term.name()
        );
    }
}

impl SiteIndex {
    /// Assemble posts given in discovery order.
    ///
    /// Returns the index and the posts rejected for reusing a slug; the first
    /// post to claim a slug keeps it.
    pub fn assemble<I>(posts: I) -> (Self, Vec<ContentError>)
    where
        I: IntoIterator<Item = Post>,
    {
        let mut rejected = Vec::new();
        let mut claimed: HashMap<String, PathBuf> = HashMap::new();
        let mut accepted = Vec::new();

        for post in posts {
            if let Some(existing) = claimed.get(&post.slug) {
                rejected.push(ContentError::DuplicateSlug {
                    slug: post.slug.clone(),
                    path: post.primary().source.clone(),
                    existing: existing.clone(),
                });
                continue;
            }
            claimed.insert(post.slug.clone(), post.primary().source.clone());
            accepted.push(post);
        }

        accepted.sort_by(listing_order);

        let by_slug = accepted
            .iter()
            .enumerate()
            .map(|(i, p)| (p.slug.clone(), i))
            .collect();

        let mut categories = BTreeMap::new();
        let mut tags = BTreeMap::new();
        for (i, post) in accepted.iter().enumerate() {
            for category in &post.categories {
                add_term(&mut categories, category, i);
            }
            for tag in &post.tags {
                add_term(&mut tags, tag, i);
            }
        }
        warn_merged("Category", &categories);
        warn_merged("Tag", &tags);

        let mut site = Self {
            posts: accepted,
            by_slug,
            categories,
            tags,
            warnings: Vec::new(),
        };
        site.warnings = site.resolve_cross_links();
        for warning in &site.warnings {
            tracing::warn!("{}", warning);
        }

        (site, rejected)
    }

    fn resolve_cross_links(&self) -> Vec<UnresolvedCrossLink> {
        let mut warnings = Vec::new();

        for post in &self.posts {
            for variant in post.variants.values() {
                for dest in variant.document.links() {
                    let Some((target, _)) = cross_link(dest) else {
                        continue;
                    };
                    if !self.by_slug.contains_key(target) {
                        warnings.push(UnresolvedCrossLink {
                            from: post.slug.clone(),
                            target: target.to_string(),
                            source: variant.source.clone(),
                        });
                    }
                }
            }

            for target in post.related() {
                if !self.by_slug.contains_key(&target) {
                    warnings.push(UnresolvedCrossLink {
                        from: post.slug.clone(),
                        target,
                        source: post.primary().source.clone(),
                    });
                }
            }
        }

        warnings
    }

    /// Posts ordered by date descending, slug ascending
    pub fn listing(&self) -> &[Post] {
        &self.posts
    }

    pub fn get(&self, slug: &str) -> Option<&Post> {
        self.by_slug.get(slug).map(|&i| &self.posts[i])
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Category names with their posts, in slug order
    pub fn categories(&self) -> impl Iterator<Item = (&str, Vec<&Post>)> {
        self.categories
            .values()
            .map(|term| (term.name(), self.resolve(&term.posts)))
    }

    /// Tag names with their posts, in slug order
    pub fn tags(&self) -> impl Iterator<Item = (&str, Vec<&Post>)> {
        self.tags
            .values()
            .map(|term| (term.name(), self.resolve(&term.posts)))
    }

    /// Posts in a category; any spelling with the same slug matches
    pub fn category(&self, name: &str) -> Vec<&Post> {
        self.categories
            .get(&term_key(name))
            .map(|term| self.resolve(&term.posts))
            .unwrap_or_default()
    }

    /// Posts with a tag; any spelling with the same slug matches
    pub fn tag(&self, name: &str) -> Vec<&Post> {
        self.tags
            .get(&term_key(name))
            .map(|term| self.resolve(&term.posts))
            .unwrap_or_default()
    }

    /// The newer and older neighbours of a post in the listing
    pub fn neighbours(&self, slug: &str) -> (Option<&Post>, Option<&Post>) {
        let Some(&i) = self.by_slug.get(slug) else {
            return (None, None);
        };
        let newer = i.checked_sub(1).map(|j| &self.posts[j]);
        let older = self.posts.get(i + 1);
        (newer, older)
    }

    pub fn warnings(&self) -> &[UnresolvedCrossLink] {
        &self.warnings
    }

    fn resolve(&self, ids: &[usize]) -> Vec<&Post> {
        ids.iter().map(|&i| &self.posts[i]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Document, FrontMatter, MarkdownTransformer, Variant};
    use chrono::DateTime;
    use std::collections::BTreeMap;

    fn post(slug: &str, date: &str, tags: &[&str], body: &str, langs: &[&str]) -> Post {
        let header = format!(
            "---\ntitle: {slug}\ndate: {date}\ntags: [{}]\n---\n",
            tags.join(", ")
        );
        let (fm, _) = FrontMatter::parse(&header).unwrap();
        let document: Document = MarkdownTransformer::new().transform(body).unwrap();
        let variants: BTreeMap<String, Variant> = langs
            .iter()
            .map(|lang| {
                (
                    lang.to_string(),
                    Variant {
                        lang: lang.to_string(),
                        source: PathBuf::from(format!("{slug}/index.{lang}.md")),
                        front_matter: fm.clone(),
                        document: document.clone(),
                        body_line: 6,
                    },
                )
            })
            .collect();
        Post {
            slug: slug.to_string(),
            title: fm.title.clone(),
            date: DateTime::parse_from_rfc3339(date).unwrap(),
            categories: Default::default(),
            tags: fm.tags.clone(),
            image: None,
            dir: PathBuf::from(slug),
            variants,
            primary_lang: langs[0].to_string(),
        }
    }

    fn simple(slug: &str, date: &str) -> Post {
        post(slug, date, &[], "text", &["en"])
    }

    #[test]
    fn test_listing_order_with_slug_tie_break() {
        let (site, rejected) = SiteIndex::assemble(vec![
            simple("b", "2024-01-01T00:00:00Z"),
            simple("old", "2023-06-01T00:00:00Z"),
            simple("a", "2024-01-01T00:00:00Z"),
            simple("new", "2024-05-01T00:00:00Z"),
        ]);
        assert!(rejected.is_empty());
        let slugs: Vec<_> = site.listing().iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["new", "a", "b", "old"]);
    }

    #[test]
    fn test_order_compares_instants_across_offsets() {
        let (site, _) = SiteIndex::assemble(vec![
            simple("utc", "2024-01-01T10:00:00Z"),
            simple("brt", "2024-01-01T08:00:00-03:00"),
        ]);
        assert_eq!(site.listing()[0].slug, "brt");
    }

    #[test]
    fn test_lookup_keeps_all_variants() {
        let (site, _) = SiteIndex::assemble(vec![post(
            "padding",
            "2024-01-01T00:00:00Z",
            &[],
            "x",
            &["en", "pt-br", "de"],
        )]);
        assert_eq!(site.get("padding").unwrap().variants.len(), 3);
        assert!(site.get("missing").is_none());
    }

    #[test]
    fn test_tag_index_uses_listing_order() {
        let (site, _) = SiteIndex::assemble(vec![
            post("one", "2024-01-01T00:00:00Z", &["elixir"], "x", &["en"]),
            post("two", "2024-03-01T00:00:00Z", &["elixir", "ecto"], "x", &["en"]),
        ]);
        let names: Vec<_> = site.tags().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["ecto", "elixir"]);
        let elixir: Vec<_> = site.tag("elixir").iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(elixir, vec!["two", "one"]);
        assert!(site.category("none").is_empty());
    }

    #[test]
    fn test_terms_with_the_same_slug_merge() {
        let (site, _) = SiteIndex::assemble(vec![
            post("old", "2024-01-01T00:00:00Z", &["postgres"], "x", &["en"]),
            post("new", "2024-03-01T00:00:00Z", &["Postgres"], "x", &["en"]),
            post("both", "2024-02-01T00:00:00Z", &["Postgres", "postgres"], "x", &["en"]),
        ]);
        let tags: Vec<_> = site.tags().collect();
        assert_eq!(tags.len(), 1);
        let (name, posts) = &tags[0];
        assert_eq!(*name, "Postgres");
        let slugs: Vec<_> = posts.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["new", "both", "old"]);
        assert_eq!(site.tag("postgres").len(), 3);
    }

    #[test]
    fn test_duplicate_slug_keeps_first() {
        let (site, rejected) = SiteIndex::assemble(vec![
            simple("dup", "2024-01-01T00:00:00Z"),
            simple("dup", "2024-02-01T00:00:00Z"),
        ]);
        assert_eq!(site.len(), 1);
        assert_eq!(site.get("dup").unwrap().date.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert!(matches!(rejected[0], ContentError::DuplicateSlug { .. }));
    }

    #[test]
    fn test_unresolved_cross_links_are_warnings() {
        let (site, rejected) = SiteIndex::assemble(vec![
            post(
                "repo",
                "2024-01-01T00:00:00Z",
                &[],
                "See [xref](../xref/) and [gone](../gone/#part) and [web](https://elixir-lang.org).",
                &["en"],
            ),
            simple("xref", "2024-02-01T00:00:00Z"),
        ]);
        assert!(rejected.is_empty());
        assert_eq!(site.len(), 2);
        assert_eq!(
            site.warnings(),
            &[UnresolvedCrossLink {
                from: "repo".into(),
                target: "gone".into(),
                source: PathBuf::from("repo/index.en.md"),
            }]
        );
    }

    #[test]
    fn test_cross_link_split() {
        assert_eq!(cross_link("../xref/"), Some(("xref", "")));
        assert_eq!(cross_link("../xref/#usage"), Some(("xref", "#usage")));
        assert_eq!(cross_link("../xref"), Some(("xref", "")));
        assert_eq!(cross_link("../a/b.png"), None);
        assert_eq!(cross_link("xref/"), None);
    }

    #[test]
    fn test_neighbours() {
        let (site, _) = SiteIndex::assemble(vec![
            simple("a", "2024-01-01T00:00:00Z"),
            simple("b", "2024-02-01T00:00:00Z"),
            simple("c", "2024-03-01T00:00:00Z"),
        ]);
        let (newer, older) = site.neighbours("b");
        assert_eq!(newer.unwrap().slug, "c");
        assert_eq!(older.unwrap().slug, "a");
        assert_eq!(site.neighbours("c").0.map(|p| p.slug.as_str()), None);
    }
}
