use std::sync::Arc;
use std::time::Duration;

use kiosk_api::{
    spawn_fetch, CatalogFile, CatalogSession, FetchRequest, KioskResult, MemorySource, PackageSource, PageDelivery,
};
use kiosk_core::{FacetName, Package};
use kiosk_store::{PageOutcome, PagerState};
use serde_json::json;
use tokio::sync::mpsc;

fn catalog(n: usize) -> CatalogFile {
    let mut packages: Vec<serde_json::Value> = (0..n)
        .map(|i| {
            let repo = if i % 2 == 0 { "stable" } else { "bitnami" };
            json!({
                "name": format!("chart-{i:03}"),
                "displayName": format!("Chart {i:03}"),
                "categories": [if i % 3 == 0 { "Database" } else { "" }],
                "availablePackageRef": {
                    "identifier": format!("{repo}/chart-{i:03}"),
                    "context": { "cluster": "default", "namespace": "kubeapps" }
                }
            })
        })
        .collect();
    packages.push(json!({
        "name": "private",
        "availablePackageRef": { "identifier": "mine/private", "context": { "namespace": "team-a" } }
    }));
    serde_json::from_value(json!({
        "packages": packages,
        "csvs": [{
            "metadata": { "name": "baz.v1.0.0", "annotations": { "categories": "E-Learning" } },
            "spec": {
                "provider": { "name": "Lightbend, Inc." },
                "customresourcedefinitions": { "owned": [
                    { "name": "akka.io", "displayName": "Akka Cluster", "kind": "AkkaCluster", "version": "v1" }
                ] }
            }
        }]
    }))
    .unwrap()
}

/// Delays the first-version responses so later versions overtake them.
struct Laggy {
    inner: MemorySource,
}

#[async_trait::async_trait]
impl PackageSource for Laggy {
    async fn request_page(&self, req: &FetchRequest) -> KioskResult<Vec<Package>> {
        let lag = if req.version == 1 { 50 } else { 1 };
        tokio::time::sleep(Duration::from_millis(lag)).await;
        self.inner.request_page(req).await
    }
}

#[tokio::test]
async fn pages_until_exhausted() {
    let src = MemorySource::new(catalog(45));
    let mut s = CatalogSession::from_url("/c/default/ns/kubeapps/catalog").unwrap();
    s.load_offerings(&src).await;
    let mut outcomes = Vec::new();
    while let Some(o) = s.load_next(&src).await {
        outcomes.push(o);
    }
    assert_eq!(
        outcomes,
        vec![
            PageOutcome::Loaded { pages_loaded: 1 },
            PageOutcome::Loaded { pages_loaded: 2 },
            PageOutcome::Exhausted { pages_loaded: 3 },
        ]
    );
    assert_eq!(s.view().len(), 46, "45 charts plus one operator");
    assert!(!s.has_more());
    assert_eq!(src.requests(), 3);

    let vocab = s.vocabulary();
    assert_eq!(vocab.get(FacetName::Repository), &["bitnami".to_string(), "stable".to_string()]);
    assert!(vocab.is_visible(FacetName::Type));
    assert_eq!(s.counts()[&FacetName::Category]["Database"], 15);
}

#[tokio::test]
async fn filter_change_outruns_stale_page() {
    let src: Arc<dyn PackageSource> = Arc::new(Laggy { inner: MemorySource::new(catalog(30)) });
    let (tx, mut rx) = mpsc::channel::<PageDelivery>(8);
    let mut s = CatalogSession::from_url("/c/default/ns/kubeapps/catalog").unwrap();

    let first = s.on_visible(s.version()).unwrap();
    spawn_fetch(src.clone(), first, tx.clone());

    // The user narrows to one repository before page 0 lands.
    let href = s.toggle(FacetName::Repository, "stable");
    assert_eq!(href, "/c/default/ns/kubeapps/catalog?Repository=stable");
    assert_eq!(s.state(), PagerState::Idle);
    let second = s.on_visible(s.version()).unwrap();
    assert_eq!(second.repositories, vec!["stable".to_string()]);
    spawn_fetch(src, second, tx);

    let mut outcomes = Vec::new();
    while let Some(d) = rx.recv().await {
        outcomes.push(s.on_page(d));
    }
    assert_eq!(outcomes, vec![PageOutcome::Exhausted { pages_loaded: 1 }, PageOutcome::Stale]);
    let view = s.view();
    assert_eq!(view.len(), 15);
    assert!(view.iter().all(|i| i.view().repository == Some("stable")));
}

#[tokio::test]
async fn failure_is_surfaced_then_retried() {
    let src = MemorySource::new(catalog(5));
    src.fail_next(1);
    let mut s = CatalogSession::from_url("/c/default/ns/kubeapps/catalog").unwrap();
    assert_eq!(s.load_next(&src).await, Some(PageOutcome::Failed));
    let err = s.last_error().unwrap().to_string();
    assert!(err.starts_with("fetch: "), "{err}");
    assert_eq!(s.window().pages_loaded, 0);
    assert_eq!(s.load_next(&src).await, Some(PageOutcome::Exhausted { pages_loaded: 1 }));
    assert!(s.last_error().is_none());
    assert_eq!(s.view().len(), 5);
}

#[tokio::test]
async fn url_drives_the_view() {
    let src = MemorySource::new(catalog(12));
    let mut s = CatalogSession::from_url(
        "https://kubeapps.local/#/c/default/ns/kubeapps/catalog?Type=Operators&Provider=Lightbend__%20Inc.",
    )
    .unwrap();
    s.load_offerings(&src).await;
    while s.load_next(&src).await.is_some() {}
    let names: Vec<&str> = s.view().iter().map(|i| i.display_name()).collect();
    assert_eq!(names, vec!["Akka Cluster"]);

    assert!(s.navigate("/c/default/ns/kubeapps/catalog?Category=Unknown&Search=chart%20001").unwrap());
    assert!(s.view().is_empty(), "packages were dropped with the old version");
    while s.load_next(&src).await.is_some() {}
    let names: Vec<&str> = s.view().iter().map(|i| i.name()).collect();
    assert_eq!(names, vec!["chart-001"]);

    let snap = s.snapshot();
    assert_eq!(snap.filters, vec!["Category: Unknown".to_string(), "Search: chart 001".to_string()]);
    assert_eq!(snap.debug.after_search, 1);
}

#[tokio::test]
async fn namespace_switch_changes_listing() {
    let src = MemorySource::new(catalog(3));
    let mut s = CatalogSession::from_url("/c/default/ns/kubeapps/catalog").unwrap();
    while s.load_next(&src).await.is_some() {}
    assert_eq!(s.view().len(), 3);
    s.set_context("default", "team-a");
    while s.load_next(&src).await.is_some() {}
    // Global charts plus the namespace's own.
    assert_eq!(s.view().len(), 4);
}

#[tokio::test]
async fn empty_catalog_is_reported() {
    let src = MemorySource::new(CatalogFile::default());
    let mut s = CatalogSession::from_url("/c/default/ns/kubeapps/catalog").unwrap();
    s.load_offerings(&src).await;
    assert!(!s.is_empty_catalog());
    while s.load_next(&src).await.is_some() {}
    assert!(s.is_empty_catalog());
    assert!(!s.vocabulary().is_visible(FacetName::Type));
}
