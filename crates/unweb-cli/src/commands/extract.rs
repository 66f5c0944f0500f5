//! `unweb extract`: bundle URL to reconstructed sources on disk.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::debug;

use unweb_core::paths::SourceFilter;
use unweb_core::{
    Cache, CachedDiscovery, CachedSourceMap, ExtractionManifest, FetchOptions, Fetcher,
    Reconstructor, SourceExtractor, SourceMapDiscovery, SourceMapParser, bundle_name_from_url,
    cache::url_key, fingerprint::md5_hex,
};

/// Run the extraction pipeline for one bundle URL.
pub async fn run(
    url: &str,
    output: &Path,
    exclude: &[String],
    save_raw: bool,
    cache: &Cache,
) -> Result<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("bundle URL must be absolute http(s): {url}");
    }

    let fetcher = Fetcher::new()?;
    let reconstructor = Reconstructor::new(output);
    let mut manifest = ExtractionManifest::new(url);

    println!("{} {url}", "Fetching".cyan().bold());
    let bundle = fetcher
        .fetch(url, &FetchOptions::default())
        .await
        .context("bundle fetch failed")?;
    if !bundle.ok {
        anyhow::bail!("bundle fetch returned HTTP {}", bundle.status);
    }

    // Discovery result is cached per bundle URL, including negatives.
    let discovery_key = url_key(url);
    let discovered = match cache.discovery.get(&discovery_key).await {
        Some(cached) => cached.source_map_url,
        None => {
            let result = SourceMapDiscovery::new(&fetcher).discover(url, &bundle).await;
            cache
                .discovery
                .set(
                    &discovery_key,
                    &CachedDiscovery {
                        source_map_url: result.source_map_url.clone(),
                    },
                )
                .await;
            result.source_map_url
        },
    };

    let Some(map_url) = discovered else {
        println!("{}", "No source map found".yellow());
        if save_raw {
            let saved = reconstructor.save_raw_bundle(url, bundle.bytes()).await?;
            println!("{} {}", "Mirrored raw bundle to".green(), saved.display());
            let raw_rel = saved
                .strip_prefix(output.join("_bundles"))
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            reconstructor
                .write_entry_file(&[], &[raw_rel], false)
                .await?;
        }
        manifest.add_bundle(url, None, &[]);
        reconstructor.write_manifest(&manifest).await?;
        return Ok(());
    };
    println!("{} {map_url}", "Source map".cyan().bold());

    // Raw map payloads are cached by map URL; inline data URIs are their
    // own payload and skip the cache.
    let raw_map = if map_url.starts_with("data:") {
        map_url.clone().into_bytes()
    } else {
        let map_key = url_key(&map_url);
        match cache.sourcemap.get(&map_key).await {
            Some(cached) => cached.raw.into_bytes(),
            None => {
                let response = fetcher
                    .fetch(&map_url, &FetchOptions::default())
                    .await
                    .context("source map fetch failed")?;
                if !response.ok {
                    anyhow::bail!("source map fetch returned HTTP {}", response.status);
                }
                let bytes = response.bytes().to_vec();
                cache
                    .sourcemap
                    .set(
                        &map_key,
                        &CachedSourceMap {
                            raw: String::from_utf8_lossy(&bytes).into_owned(),
                            content_hash: md5_hex(&bytes),
                        },
                    )
                    .await;
                bytes
            },
        }
    };

    let outcome = SourceMapParser::new().parse_auto(&raw_map, &map_url)?;
    for warning in &outcome.report.warnings {
        println!("{} {warning}", "warning:".yellow());
    }
    if !outcome.report.valid {
        for error in &outcome.report.errors {
            eprintln!("{} {error}", "invalid:".red());
        }
        anyhow::bail!(
            "source map failed validation with {} error(s)",
            outcome.report.errors.len()
        );
    }
    let Some(parsed) = outcome.map else {
        anyhow::bail!("source map validated but produced no map");
    };

    let filter = SourceFilter::new(exclude)?;
    let extractor = SourceExtractor::new(filter);
    let bundle_name = bundle_name_from_url(url);

    let mut all_paths: Vec<String> = Vec::new();
    let mut written = 0usize;
    let mut unchanged = 0usize;
    for regular in parsed.regular_maps() {
        let result = extractor.extract(regular, url, &map_url, None);
        for error in &result.errors {
            eprintln!("{} {error}", "extract:".yellow());
        }
        debug!(
            extracted = result.metadata.extracted_count,
            skipped = result.metadata.skipped_count,
            "section extracted"
        );

        let stats = reconstructor
            .write_bundle_sources(&bundle_name, &result.sources)
            .await;
        written += stats.written;
        unchanged += stats.unchanged;
        for error in &stats.errors {
            eprintln!("{} {error}", "write:".red());
        }
        all_paths.extend(result.sources.into_iter().map(|s| s.path));
    }

    let typescript = all_paths
        .iter()
        .any(|p| p.ends_with(".ts") || p.ends_with(".tsx"));
    manifest.add_bundle(url, Some(map_url), &all_paths);
    if !all_paths.is_empty() {
        reconstructor
            .write_entry_file(&[bundle_name.clone()], &[], typescript)
            .await?;
    }
    reconstructor.write_manifest(&manifest).await?;

    println!(
        "{} {} file(s) ({} unchanged) under {}",
        "Extracted".green().bold(),
        written,
        unchanged,
        output.join(&bundle_name).display()
    );
    Ok(())
}
