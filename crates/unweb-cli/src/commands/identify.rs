//! `unweb identify`: name the registry version behind extracted files.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use unweb_core::matcher::{ExtractedPackage, VersionMatcher};
use unweb_core::orchestrate::{ProgressEvent, ProgressObserver};
use unweb_core::{Cache, Config, Fetcher, FingerprintEngine, RegistryClient};

use crate::syntax::LexicalAnalyzer;

/// Options forwarded from the CLI surface.
pub struct IdentifyArgs<'a> {
    /// Directory with the package's extracted files.
    pub dir: &'a Path,
    /// Package name override.
    pub package: Option<&'a str>,
    /// Version hint.
    pub hint: Option<&'a str>,
    /// Minimum similarity override.
    pub min_similarity: Option<f64>,
    /// Probe pre-releases.
    pub prereleases: bool,
    /// JSON output.
    pub json: bool,
}

/// Run identification for one extracted directory.
pub async fn run(args: IdentifyArgs<'_>, config: &Config, cache: &Cache) -> Result<()> {
    let name = match args.package {
        Some(name) => name.to_string(),
        None => package_name_from_dir(args.dir)
            .context("could not infer a package name; pass --package")?,
    };

    let files = collect_files(args.dir)?;
    anyhow::ensure!(
        !files.is_empty(),
        "no readable source files under {}",
        args.dir.display()
    );
    let package = ExtractedPackage::new(&name, files);

    let fetcher = Fetcher::new()?;
    let registry = RegistryClient::new(&fetcher, cache);
    let engine = FingerprintEngine::new(Arc::new(LexicalAnalyzer));
    let matcher = VersionMatcher::new(&registry, cache, &engine);

    let mut options = config.match_options();
    options.version_hint = args.hint.map(ToString::to_string);
    options.include_prereleases |= args.prereleases;
    if let Some(min) = args.min_similarity {
        options.min_similarity = min;
    }

    let spinner = ProgressBar::new_spinner().with_message(format!("probing {name}"));
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));

    let record = matcher.match_package(&package, &options).await?;
    spinner.finish_and_clear();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    match (&record.version, record.confidence) {
        (Some(version), Some(confidence)) => {
            println!(
                "{} {name}@{version}  similarity {:.2}  confidence {}",
                "Matched".green().bold(),
                record.similarity,
                confidence.as_str().bold(),
            );
            if let Some(source) = record.source {
                println!(
                    "  via {}",
                    serde_json::to_value(source)?
                        .as_str()
                        .unwrap_or("unknown")
                );
            }
        },
        _ => {
            println!(
                "{} best similarity {:.2} for {name}",
                "No version matched".yellow().bold(),
                record.similarity,
            );
        },
    }
    Ok(())
}

/// A [`ProgressObserver`] rendering batch events on a progress bar. Used
/// by multi-package flows layered on top of this command.
pub struct BarObserver {
    bar: ProgressBar,
}

impl BarObserver {
    /// Observer over a fresh hidden bar; it shows once lengths are known.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl Default for BarObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for BarObserver {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::PrefetchStarted { packages } => {
                self.bar.set_length(*packages as u64);
                self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            },
            ProgressEvent::PackageFinished { package, version, .. } => {
                self.bar.inc(1);
                match version {
                    Some(version) => self.bar.set_message(format!("{package}@{version}")),
                    None => self.bar.set_message(format!("{package}: no match")),
                }
            },
            ProgressEvent::BatchFinished { .. } => self.bar.finish_and_clear(),
            _ => {},
        }
    }
}

/// Infer a package name from the directory path: the basename, or
/// `@scope/name` when the parent is a scope directory.
fn package_name_from_dir(dir: &Path) -> Option<String> {
    let base = dir.file_name()?.to_str()?.to_string();
    let parent = dir
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|p| p.to_str());
    match parent {
        Some(scope) if scope.starts_with('@') => Some(format!("{scope}/{base}")),
        _ => Some(base),
    }
}

/// Collect UTF-8 source files under a directory, keyed by relative path.
fn collect_files(root: &Path) -> Result<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("reading {}", dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                stack.push(path);
            } else if let Ok(content) = std::fs::read_to_string(&path) {
                let relative = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                files.insert(relative, content);
            }
        }
    }
    Ok(files)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn infers_plain_and_scoped_names() {
        assert_eq!(
            package_name_from_dir(Path::new("/x/node_modules/lodash")).unwrap(),
            "lodash"
        );
        assert_eq!(
            package_name_from_dir(Path::new("/x/node_modules/@babel/core")).unwrap(),
            "@babel/core"
        );
    }

    #[test]
    fn collects_files_recursively_skipping_binaries() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("index.js"), "module.exports = 1;").unwrap();
        std::fs::write(dir.path().join("src/a.js"), "export {};").unwrap();
        std::fs::write(dir.path().join("blob.bin"), [0xFFu8, 0xFE, 0x00, 0x01]).unwrap();

        let files = collect_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.contains_key("index.js"));
        assert!(files.contains_key("src/a.js"));
        assert!(!files.contains_key("blob.bin"));
    }
}
