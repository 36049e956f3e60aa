//! In-memory package and operator source backed by a catalog fixture.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use kiosk_core::{Offering, Package};

use crate::wire::{ClusterServiceVersion, PackageSummary};
use crate::{FetchRequest, KioskError, KioskResult, OperatorSource, PackageSource};

/// Namespace whose packages are visible from every namespace.
pub const GLOBAL_NAMESPACE: &str = "kubeapps";

/// Catalog fixture file: `{ "packages": [...], "csvs": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogFile {
    pub packages: Vec<PackageSummary>,
    pub csvs: Vec<ClusterServiceVersion>,
}

impl CatalogFile {
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        serde_json::from_str(s).context("parsing catalog json")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading catalog {}", path.display()))?;
        let cat = Self::from_json(&raw).with_context(|| format!("loading catalog {}", path.display()))?;
        info!(path = %path.display(), packages = cat.packages.len(), csvs = cat.csvs.len(), "catalog loaded");
        Ok(cat)
    }
}

pub struct MemorySource {
    catalog: CatalogFile,
    fail_next: AtomicUsize,
    requests: AtomicUsize,
}

impl MemorySource {
    pub fn new(mut catalog: CatalogFile) -> Self {
        // Stable listing order so page slices never overlap.
        catalog.packages.sort_by(|a, b| {
            (a.name.as_str(), a.repository(), a.namespace()).cmp(&(b.name.as_str(), b.repository(), b.namespace()))
        });
        Self {
            catalog,
            fail_next: AtomicUsize::new(0),
            requests: AtomicUsize::new(0),
        }
    }

    /// Fail the next `n` page requests.
    pub fn fail_next(&self, n: usize) { self.fail_next.store(n, Ordering::SeqCst); }

    /// Page requests served so far, failed ones included.
    pub fn requests(&self) -> usize { self.requests.load(Ordering::SeqCst) }

    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Every package visible to `req`, before paging.
    pub fn select(&self, req: &FetchRequest) -> Vec<&PackageSummary> {
        let needle = req.search.to_lowercase();
        self.catalog
            .packages
            .iter()
            .filter(|p| p.namespace() == req.namespace || p.namespace() == GLOBAL_NAMESPACE)
            .filter(|p| req.repositories.is_empty() || req.repositories.iter().any(|r| r == p.repository()))
            .filter(|p| {
                needle.is_empty()
                    || p.name.to_lowercase().contains(&needle)
                    || p.display_name.to_lowercase().contains(&needle)
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl PackageSource for MemorySource {
    async fn request_page(&self, req: &FetchRequest) -> KioskResult<Vec<Package>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.take_failure() {
            return Err(KioskError::Fetch(format!("page {} of {}/{} unavailable", req.page, req.cluster, req.namespace)));
        }
        let all = self.select(req);
        let page: Vec<Package> = if req.size == 0 {
            if req.page == 0 { all.into_iter().map(Package::from).collect() } else { Vec::new() }
        } else {
            let start = (req.page as usize).saturating_mul(req.size);
            all.into_iter().skip(start).take(req.size).map(Package::from).collect()
        };
        debug!(version = req.version, page = req.page, size = req.size, returned = page.len(), "memory: page served");
        Ok(page)
    }
}

#[async_trait::async_trait]
impl OperatorSource for MemorySource {
    async fn list_offerings(&self, cluster: &str, namespace: &str) -> KioskResult<Vec<Offering>> {
        let offs: Vec<Offering> = self
            .catalog
            .csvs
            .iter()
            .filter(|c| c.metadata.namespace.is_empty() || c.metadata.namespace == namespace)
            .flat_map(ClusterServiceVersion::offerings)
            .collect();
        debug!(cluster, namespace, offerings = offs.len(), "memory: offerings listed");
        Ok(offs)
    }
}
