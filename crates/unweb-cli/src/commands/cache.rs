//! `unweb cache`: cache inspection and maintenance.

use anyhow::Result;
use colored::Colorize;

use unweb_core::Cache;

/// Print entry counts and total on-disk size.
pub async fn stats(cache: &Cache) -> Result<()> {
    if cache.is_disabled() {
        println!("{}", "Cache is disabled".yellow());
        return Ok(());
    }
    let stats = cache.stats().await;
    println!("{}", "Cache".bold());
    println!("  root:         {}", cache.root().display());
    println!("  metadata:     {} entries", stats.metadata_entries);
    println!("  fingerprints: {} entries", stats.fingerprint_entries);
    println!("  total size:   {}", format_size(stats.total_bytes));
    Ok(())
}

/// Clear everything and reinitialize the namespace directories.
pub fn clear(cache: &Cache) -> Result<()> {
    cache.clear()?;
    println!("{} {}", "Cleared".green().bold(), cache.root().display());
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    #[allow(clippy::cast_precision_loss)]
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
