//! Capability registry
//!
//! One-way synchronization pump: declarative configuration units are
//! discovered from a directory, validated, and upserted into the persisted
//! store. The store is the runtime source of truth; discovery is disposable
//! and re-runnable. Lookups go through a process-local TTL cache.

use crate::cache::CapabilityCache;
use crate::domain::{Capability, CapabilityDefinition};
use crate::error::Result;
use crate::repository::CapabilityRepository;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct CapabilityRegistry<R: CapabilityRepository> {
    repo: Arc<R>,
    cache: CapabilityCache,
    modules_dir: PathBuf,
    discovery_complete: AtomicBool,
}

impl<R: CapabilityRepository> CapabilityRegistry<R> {
    pub fn new(repo: Arc<R>, modules_dir: impl Into<PathBuf>, cache_ttl: Duration) -> Self {
        Self {
            repo,
            cache: CapabilityCache::new(cache_ttl),
            modules_dir: modules_dir.into(),
            discovery_complete: AtomicBool::new(false),
        }
    }

    /// Read and validate every configuration unit in the modules directory.
    ///
    /// Invalid units (unparseable, bad identifier, bad version, empty action
    /// vocabulary) are logged and skipped; they never abort discovery of the
    /// remaining units. A missing or unreadable directory is an error, which
    /// the startup path downgrades to a warning.
    pub fn discover(&self) -> Result<Vec<CapabilityDefinition>> {
        let entries = std::fs::read_dir(&self.modules_dir).map_err(|e| {
            anyhow::anyhow!(
                "Failed to read modules directory {}: {}",
                self.modules_dir.display(),
                e
            )
        })?;

        let mut definitions = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(def) = read_definition(&path) {
                definitions.push(def);
            }
        }

        info!(
            "Discovered {} capability definition(s) in {}",
            definitions.len(),
            self.modules_dir.display()
        );
        Ok(definitions)
    }

    /// Upsert every definition into the store. Idempotent and safe to re-run;
    /// absence of a previously synced capability from `definitions` never
    /// removes its row.
    pub async fn sync_to_store(&self, definitions: &[CapabilityDefinition]) -> Result<()> {
        for def in definitions {
            let stored = self.repo.upsert_definition(def).await?;
            if stored.cap_key != def.identifier {
                // Identifiers are immutable once created; the storage key wins.
                warn!(
                    "Declared identifier '{}' differs from storage key '{}'; keeping storage key",
                    def.identifier, stored.cap_key
                );
            }
        }
        Ok(())
    }

    /// Discovery + sync at process start. Best-effort: a failure is logged
    /// and the registry serves whatever is already persisted, so cold start
    /// never depends on a clean filesystem scan.
    pub async fn run_startup_sync(&self) {
        match self.refresh().await {
            Ok(count) => info!("Startup capability sync complete ({} synced)", count),
            Err(e) => error!(
                "Startup capability sync failed, serving persisted state: {:?}",
                e
            ),
        }
        self.discovery_complete.store(true, Ordering::Release);
    }

    /// Forced re-discovery: discover, sync, drop the whole cache. Returns
    /// the number of definitions synced.
    pub async fn refresh(&self) -> Result<usize> {
        let definitions = self.discover()?;
        self.sync_to_store(&definitions).await?;
        self.cache.invalidate_all();
        Ok(definitions.len())
    }

    /// Read-through lookup by identifier. Absence is not cached; an inactive
    /// capability is returned as-is and rejected by the resolver.
    pub async fn lookup(&self, cap_key: &str) -> Result<Option<Capability>> {
        if let Some(capability) = self.cache.get(cap_key) {
            return Ok(Some(capability));
        }

        let capability = self.repo.find_by_key(cap_key).await?;
        if let Some(capability) = &capability {
            self.cache.insert(capability.clone());
        }
        Ok(capability)
    }

    pub async fn list(&self) -> Result<Vec<Capability>> {
        self.repo.list_all().await
    }

    /// Evict one cache entry. Local to this process: other instances observe
    /// the change only after their TTL window lapses.
    pub fn invalidate(&self, cap_key: &str) {
        self.cache.invalidate(cap_key);
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Mark discovery complete without running it. Deployments that disable
    /// the startup sync serve the persisted store only and must still report
    /// ready.
    pub fn mark_discovery_complete(&self) {
        self.discovery_complete.store(true, Ordering::Release);
    }

    pub fn is_discovery_complete(&self) -> bool {
        self.discovery_complete.load(Ordering::Acquire)
    }
}

/// Parse and validate a single configuration unit, returning `None` (after
/// logging) when the unit must be skipped.
fn read_definition(path: &Path) -> Option<CapabilityDefinition> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Skipping unreadable unit {}: {}", path.display(), e);
            return None;
        }
    };

    let def: CapabilityDefinition = match serde_json::from_str(&raw) {
        Ok(def) => def,
        Err(e) => {
            warn!("Skipping malformed unit {}: {}", path.display(), e);
            return None;
        }
    };

    if let Err(reason) = def.validate() {
        warn!("Skipping invalid unit {}: {}", path.display(), reason);
        return None;
    }

    Some(def)
}
