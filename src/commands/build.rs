//! Build the static site

use anyhow::Result;
use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::content::loader::ContentLoader;
use crate::content::ContentError;
use crate::generator::Generator;
use crate::site::{SiteIndex, UnresolvedCrossLink};
use crate::Site;

/// Outcome of a build or check pass
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Posts that made it into the site
    pub posts: usize,
    /// HTML pages written (zero for `check`)
    pub pages: usize,
    /// Per-post failures; the post was left out
    pub failures: Vec<ContentError>,
    /// Cross-links to unknown posts
    pub warnings: Vec<UnresolvedCrossLink>,
    /// Referenced assets that could not be found
    pub missing_assets: Vec<PathBuf>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Print the summary shown after `build` and `check`
    pub fn print_summary(&self) {
        println!("{}", self);
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} posts", self.posts)?;
        if self.pages > 0 {
            write!(f, ", {} pages", self.pages)?;
        }
        write!(
            f,
            ", {} failures, {} warnings",
            self.failures.len(),
            self.warnings.len() + self.missing_assets.len()
        )?;

        for failure in &self.failures {
            write!(f, "\n  error: {}", failure)?;
        }
        for warning in &self.warnings {
            write!(f, "\n  warning: {}", warning)?;
        }
        for asset in &self.missing_assets {
            write!(f, "\n  warning: missing asset {}", asset.display())?;
        }
        Ok(())
    }
}

/// Load every post and assemble the site index.
///
/// Failing posts are logged and returned next to the index; they never stop
/// the other posts from loading.
pub fn assemble(site: &Site) -> Result<(SiteIndex, Vec<ContentError>)> {
    let loader = ContentLoader::new(site)?;

    let mut failures = Vec::new();
    let mut posts = Vec::new();
    for result in loader.load_all() {
        match result {
            Ok(post) => posts.push(post),
            Err(e) => failures.push(e),
        }
    }

    let (index, rejected) = SiteIndex::assemble(posts);
    failures.extend(rejected);
    for failure in &failures {
        tracing::warn!("{}", failure);
    }

    tracing::info!(
        "Loaded {} posts ({} failed)",
        index.len(),
        failures.len()
    );
    Ok((index, failures))
}

/// Generate the static site
pub fn run(site: &Site) -> Result<BuildReport> {
    let start = Instant::now();

    let (index, failures) = assemble(site)?;
    let generator = Generator::new(site)?;
    let stats = generator.generate(&index)?;

    let duration = start.elapsed();
    tracing::info!("Generated in {:.2}s", duration.as_secs_f64());

    Ok(BuildReport {
        posts: index.len(),
        pages: stats.pages,
        failures,
        warnings: index.warnings().to_vec(),
        missing_assets: stats.missing_assets,
    })
}

/// Watch the content directory and config file, rebuilding on change
pub async fn watch(site: &Site) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<DebounceEventResult>();

    // Create debouncer to avoid multiple rapid rebuilds
    let mut debouncer = new_debouncer(Duration::from_millis(500), move |res: DebounceEventResult| {
        let _ = tx.send(res);
    })?;

    let mut content_dir = None;
    if site.content_dir.exists() {
        debouncer
            .watcher()
            .watch(&site.content_dir, RecursiveMode::Recursive)?;
        tracing::debug!("Watching: {:?}", site.content_dir);
        content_dir = Some(site.content_dir.clone());
    }

    if let Some(config_path) = &site.config_path {
        debouncer
            .watcher()
            .watch(config_path, RecursiveMode::NonRecursive)?;
        tracing::debug!("Watching: {:?}", config_path);
    }

    tracing::info!("Watching for changes. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(Ok(events)) => {
                    let relevant: Vec<_> = events
                        .iter()
                        .filter(|e| {
                            let path = e.path.strip_prefix(&site.base_dir).unwrap_or(&e.path);
                            !path
                                .components()
                                .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
                                && !path.to_string_lossy().ends_with('~')
                        })
                        .collect();
                    if relevant.is_empty() {
                        continue;
                    }
                    for event in &relevant {
                        tracing::info!("File changed: {}", event.path.display());
                    }

                    // Config edits take effect on the next pass
                    let current = match Site::new(&site.base_dir) {
                        Ok(reloaded) => reloaded,
                        Err(e) => {
                            tracing::error!("Config reload failed: {:#}", e);
                            continue;
                        }
                    };
                    if content_dir.as_ref() != Some(&current.content_dir) {
                        content_dir = rewatch(
                            debouncer.watcher(),
                            content_dir.take(),
                            &current.content_dir,
                        );
                    }
                    match run(&current) {
                        Ok(report) => report.print_summary(),
                        Err(e) => tracing::error!("Build failed: {:#}", e),
                    }
                }
                Some(Err(e)) => tracing::error!("Watch error: {:?}", e),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping watch");
                break;
            }
        }
    }

    Ok(())
}

/// Move the recursive content watch to `next`; returns the directory now watched
fn rewatch(watcher: &mut dyn Watcher, current: Option<PathBuf>, next: &Path) -> Option<PathBuf> {
    if let Some(old) = current {
        let _ = watcher.unwatch(&old);
    }
    if !next.exists() {
        tracing::warn!("Content directory {:?} does not exist", next);
        return None;
    }
    match watcher.watch(next, RecursiveMode::Recursive) {
        Ok(()) => {
            tracing::info!("Watching: {:?}", next);
            Some(next.to_path_buf())
        }
        Err(e) => {
            tracing::error!("Watch error: {:?}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_summary_lists_failures_and_warnings() {
        let report = BuildReport {
            posts: 2,
            pages: 5,
            failures: vec![ContentError::MalformedMetadata {
                path: PathBuf::from("content/bad/index.md"),
                line: 3,
                message: "missing 'title'".into(),
            }],
            warnings: vec![UnresolvedCrossLink {
                from: "repo".into(),
                target: "gone".into(),
                source: PathBuf::from("content/repo/index.md"),
            }],
            missing_assets: vec![],
        };

        assert!(!report.is_success());
        let summary = report.to_string();
        assert!(summary.starts_with("2 posts, 5 pages, 1 failures, 1 warnings"));
        assert!(summary.contains("error: content/bad/index.md:3: malformed metadata: missing 'title'"));
        assert!(summary.contains("warning: content/repo/index.md: post 'repo' links to unknown post 'gone'"));
    }

    #[test]
    fn test_rewatch_follows_moved_content_dir() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("content");
        let new = dir.path().join("posts");
        std::fs::create_dir_all(&old).unwrap();
        std::fs::create_dir_all(&new).unwrap();

        let mut watcher = notify::recommended_watcher(|_: notify::Result<notify::Event>| {}).unwrap();
        let watched = rewatch(&mut watcher, None, &old);
        assert_eq!(watched, Some(old.clone()));
        let watched = rewatch(&mut watcher, watched, &new);
        assert_eq!(watched, Some(new));
        assert_eq!(rewatch(&mut watcher, watched, &dir.path().join("gone")), None);
    }
}
