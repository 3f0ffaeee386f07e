//! Validate content without writing output

use anyhow::Result;
use std::path::PathBuf;

use super::build::{assemble, BuildReport};
use crate::site::SiteIndex;
use crate::Site;

/// Load and assemble every post, reporting failures and warnings
pub fn run(site: &Site) -> Result<BuildReport> {
    let (index, failures) = assemble(site)?;

    Ok(BuildReport {
        posts: index.len(),
        pages: 0,
        failures,
        warnings: index.warnings().to_vec(),
        missing_assets: missing_assets(&index),
    })
}

/// Bundle-relative images that do not exist on disk
fn missing_assets(index: &SiteIndex) -> Vec<PathBuf> {
    index
        .listing()
        .iter()
        .flat_map(|post| {
            post.images()
                .into_iter()
                .filter_map(|image| image.resolve(&post.dir))
                .filter(|path| !path.is_file())
                .collect::<Vec<_>>()
        })
        .collect()
}
