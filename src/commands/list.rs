//! List site content

use anyhow::Result;

use super::build::assemble;
use crate::Site;

/// List site content by type
pub fn run(site: &Site, content_type: &str) -> Result<()> {
    let (index, failures) = assemble(site)?;

    match content_type {
        "post" | "posts" => {
            println!("Posts ({}):", index.len());
            for post in index.listing() {
                println!(
                    "  {} - {} [{}] ({})",
                    post.date.format("%Y-%m-%d"),
                    post.title,
                    post.slug,
                    post.languages().collect::<Vec<_>>().join(", ")
                );
            }
        }
        "tag" | "tags" => {
            let mut tags: Vec<_> = index.tags().map(|(name, posts)| (name, posts.len())).collect();
            println!("Tags ({}):", tags.len());
            tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            for (tag, count) in tags {
                println!("  {} ({})", tag, count);
            }
        }
        "category" | "categories" => {
            let mut categories: Vec<_> = index
                .categories()
                .map(|(name, posts)| (name, posts.len()))
                .collect();
            println!("Categories ({}):", categories.len());
            categories.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            for (category, count) in categories {
                println!("  {} ({})", category, count);
            }
        }
        _ => {
            anyhow::bail!(
                "Unknown type: {}. Available: post, tag, category",
                content_type
            );
        }
    }

    if !failures.is_empty() {
        println!("({} posts failed to load; run `folio check` for details)", failures.len());
    }

    Ok(())
}
