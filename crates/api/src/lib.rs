//! Kiosk public API façade.
//!
//! This crate defines the fetch boundary frontends (CLI, tests) depend on:
//! the package and operator sources, the request/delivery types that carry a
//! filter version across the async gap, and the catalog session that wires the
//! codec, the predicate and the page window together.

#![forbid(unsafe_code)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use kiosk_core::{Offering, Package, RouteError};

pub mod memory;
pub mod session;
pub mod wire;

pub use memory::{CatalogFile, MemorySource, GLOBAL_NAMESPACE};
pub use session::{CatalogSession, CatalogView};
pub use wire::{ClusterServiceVersion, PackageSummary};

/// API errors suitable for transport over RPC later.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum KioskError {
    #[error("fetch: {0}")]
    Fetch(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type KioskResult<T> = Result<T, KioskError>;

impl From<RouteError> for KioskError {
    fn from(e: RouteError) -> Self { KioskError::Validation(e.to_string()) }
}

/// One page request as handed to a [`PackageSource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub cluster: String,
    pub namespace: String,
    /// Empty means every repository.
    pub repositories: Vec<String>,
    /// Zero-based page index.
    pub page: u32,
    pub size: usize,
    pub search: String,
    /// Filter version the request was issued under.
    pub version: u64,
}

/// Completion of a [`FetchRequest`], still tagged with its version.
#[derive(Debug, Clone)]
pub struct PageDelivery {
    pub version: u64,
    pub result: KioskResult<Vec<Package>>,
}

/// Paged package listing.
#[async_trait::async_trait]
pub trait PackageSource: Send + Sync {
    async fn request_page(&self, req: &FetchRequest) -> KioskResult<Vec<Package>>;
}

/// Operator offerings of a namespace, fetched once per namespace.
#[async_trait::async_trait]
pub trait OperatorSource: Send + Sync {
    async fn list_offerings(&self, cluster: &str, namespace: &str) -> KioskResult<Vec<Offering>>;
}

/// Run `req` on a background task and post the tagged result to `tx`.
///
/// Nothing is cancelled: a superseded request still completes and its delivery
/// is dropped by the receiver's version check.
pub fn spawn_fetch(
    source: Arc<dyn PackageSource>,
    req: FetchRequest,
    tx: mpsc::Sender<PageDelivery>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let version = req.version;
        let result = source.request_page(&req).await;
        if let Err(e) = &result {
            warn!(version, page = req.page, error = %e, "fetch: request failed");
        }
        if tx.send(PageDelivery { version, result }).await.is_err() {
            debug!(version, "fetch: receiver gone; dropping delivery");
        }
    })
}
