//! Create a new post

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::content::loader::is_markdown_file;
use crate::content::FrontMatter;
use crate::Site;

/// Scaffold `content/<slug>/index[.<lang>].md` with a filled-in header.
///
/// A language other than the site default gets a suffixed file, so running
/// this again with `--lang` adds a variant to an existing post.
pub fn create_post(site: &Site, title: &str, lang: Option<&str>) -> Result<PathBuf> {
    let slug = slug::slugify(title);
    if slug.is_empty() {
        anyhow::bail!("Cannot derive a slug from title {:?}", title);
    }

    let now = chrono::Utc::now().with_timezone(&site.config.tz()?);
    let target_dir = site.content_dir.join(&slug);
    fs::create_dir_all(&target_dir)
        .with_context(|| format!("Failed to create {:?}", target_dir))?;

    let filename = match lang.map(str::to_ascii_lowercase) {
        Some(lang) if !site.config.is_default_language(&lang) => format!("index.{}.md", lang),
        _ => "index.md".to_string(),
    };
    let file_path = target_dir.join(filename);

    if file_path.exists() {
        anyhow::bail!("File already exists: {:?}", file_path);
    }

    // A translation shares the publish date and taxonomy of its siblings.
    let front_matter = match sibling_front_matter(&target_dir)? {
        Some(sibling) => FrontMatter {
            title: title.to_string(),
            extra: Default::default(),
            ..sibling
        },
        None => FrontMatter {
            title: title.to_string(),
            date: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            categories: Default::default(),
            tags: Default::default(),
            image: None,
            extra: Default::default(),
        },
    };
    let content = format!("{}\n", front_matter.to_header()?);

    fs::write(&file_path, content).with_context(|| format!("Failed to write {:?}", file_path))?;
    tracing::info!("Created: {:?}", file_path);

    Ok(file_path)
}

/// Front matter of the first existing variant in a post directory
fn sibling_front_matter(dir: &Path) -> Result<Option<FrontMatter>> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read {:?}", dir))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            is_markdown_file(p)
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("index."))
        })
        .collect::<Vec<_>>();
    entries.sort();

    let Some(path) = entries.first() else {
        return Ok(None);
    };
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let (front_matter, _) = FrontMatter::parse(&content)
        .map_err(|e| anyhow::anyhow!("{}:{}: {}", path.display(), e.line, e.message))?;
    Ok(Some(front_matter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;

    #[test]
    fn test_new_post_and_translation() {
        let dir = tempfile::tempdir().unwrap();
        let site = Site::with_config(dir.path(), SiteConfig::default());

        let path = create_post(&site, "Padding: Structs & Tuples", None).unwrap();
        assert_eq!(path, site.content_dir.join("padding-structs-tuples/index.md"));

        let content = fs::read_to_string(&path).unwrap();
        let (fm, body) = FrontMatter::parse(&content).unwrap();
        assert_eq!(fm.title, "Padding: Structs & Tuples");
        assert!(body.trim().is_empty());

        let translated = create_post(&site, "Padding: Structs & Tuples", Some("pt-BR")).unwrap();
        assert!(translated.ends_with("padding-structs-tuples/index.pt-br.md"));

        assert!(create_post(&site, "Padding: Structs & Tuples", Some("en")).is_err());
    }

    #[test]
    fn test_translation_shares_date_and_builds() {
        let dir = tempfile::tempdir().unwrap();
        let site = Site::with_config(dir.path(), SiteConfig::default());

        let original = create_post(&site, "Tuple Padding", None).unwrap();
        let content = fs::read_to_string(&original).unwrap();
        let (mut fm, _) = FrontMatter::parse(&content).unwrap();
        fm.date = "2024-03-01 09:00:00".into();
        fm.tags.insert("postgres".into());
        fs::write(&original, format!("{}\nBody.\n", fm.to_header().unwrap())).unwrap();

        let translated = create_post(&site, "Tuple Padding", Some("pt-br")).unwrap();
        let content = fs::read_to_string(&translated).unwrap();
        let (copy, _) = FrontMatter::parse(&content).unwrap();
        assert_eq!(copy.date, "2024-03-01 09:00:00");
        assert!(copy.tags.contains("postgres"));

        let (index, failures) = crate::commands::build::assemble(&site).unwrap();
        assert!(failures.is_empty(), "{:?}", failures);
        let post = index.get("tuple-padding").unwrap();
        assert_eq!(post.languages().collect::<Vec<_>>(), vec!["en", "pt-br"]);
    }
}
