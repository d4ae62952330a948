//! Run-scoped asset migration with single-flight caching.

use crate::media::{public_id, AssetUrlPattern, MediaTransfer};
use crate::rewrite;
use crate::value::CellValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Counters kept across the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetStats {
    /// Assets downloaded and re-uploaded successfully.
    pub migrated: u64,

    /// Assets whose download or upload failed; the original URL was kept.
    pub failed: u64,
}

/// Moves assets from the source media host to the destination media host,
/// remembering every completed URL mapping for the rest of the run.
pub struct AssetMigrator {
    pattern: AssetUrlPattern,
    source: Arc<dyn MediaTransfer>,
    target: Arc<dyn MediaTransfer>,
    cache: HashMap<String, String>,
    stats: AssetStats,
}

impl AssetMigrator {
    /// Create a new migrator with an empty cache.
    pub fn new(
        pattern: AssetUrlPattern,
        source: Arc<dyn MediaTransfer>,
        target: Arc<dyn MediaTransfer>,
    ) -> Self {
        Self {
            pattern,
            source,
            target,
            cache: HashMap::new(),
            stats: AssetStats::default(),
        }
    }

    /// Number of distinct URLs migrated so far.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Current counters.
    pub fn stats(&self) -> AssetStats {
        self.stats
    }

    /// Migrate one asset URL, returning its destination URL.
    ///
    /// Non-asset URLs are returned unchanged without any I/O. A URL that was
    /// already migrated in this run is served from the cache. On download or
    /// upload failure the original URL is returned verbatim; failures are not
    /// cached so a later occurrence may retry.
    pub async fn migrate(&mut self, asset_url: &str) -> String {
        if !self.pattern.is_match(asset_url) {
            return asset_url.to_string();
        }

        if let Some(cached) = self.cache.get(asset_url) {
            return cached.clone();
        }

        let Some(id) = public_id(asset_url) else {
            warn!("asset URL has no derivable identifier, keeping: {}", asset_url);
            return asset_url.to_string();
        };

        let bytes = match self.source.fetch(asset_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("asset download failed, keeping original URL {}: {}", asset_url, e);
                self.stats.failed += 1;
                return asset_url.to_string();
            }
        };

        match self.target.upload(&id, bytes).await {
            Ok(destination) => {
                debug!("asset migrated: {} -> {}", asset_url, destination);
                self.stats.migrated += 1;
                self.cache.insert(asset_url.to_string(), destination.clone());
                destination
            }
            Err(e) => {
                warn!("asset upload failed, keeping original URL {}: {}", asset_url, e);
                self.stats.failed += 1;
                asset_url.to_string()
            }
        }
    }

    /// Rewrite every asset URL embedded anywhere in a cell.
    ///
    /// All distinct URLs are resolved before any substitution happens, so a
    /// string holding several occurrences is rewritten in one pass.
    pub async fn rewrite_cell(&mut self, cell: &mut CellValue) {
        let urls = rewrite::collect_urls(cell, &self.pattern);
        if urls.is_empty() {
            return;
        }

        let mut resolved = HashMap::with_capacity(urls.len());
        for asset_url in urls {
            let destination = self.migrate(&asset_url).await;
            resolved.insert(asset_url, destination);
        }

        rewrite::apply(cell, &self.pattern, &resolved);
    }
}
