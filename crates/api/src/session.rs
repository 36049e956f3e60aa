//! Catalog session: one browser tab's worth of catalog state.
//!
//! The URL is the source of truth for the filter. Every effective filter or
//! context change starts a new pager version and drops the packages loaded so
//! far; offerings are kept until the namespace changes.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use kiosk_core::{CatalogRoute, FacetName, FilterState, Item, Offering, RouteError};
use kiosk_search::{facet_counts, filter_items_with_debug, FilterDebugInfo, Vocabulary};
use kiosk_store::{PageBuffer, PageOutcome, PageWindow, Pager, PagerState, PAGE_SIZE};

use crate::{FetchRequest, KioskError, OperatorSource, PackageSource, PageDelivery};

#[derive(Debug, Clone)]
pub struct CatalogSession {
    route: CatalogRoute,
    filter: FilterState,
    pager: Pager,
    packages: PageBuffer<Item>,
    offerings: Vec<Item>,
    page_error: Option<String>,
    /// Lives until the offerings are replaced or the namespace changes.
    offerings_error: Option<String>,
}

/// Serializable rendering of the session.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogView {
    pub href: String,
    pub window: PageWindow,
    pub state: PagerState,
    pub has_more: bool,
    pub filters: Vec<String>,
    pub items: Vec<Item>,
    pub debug: FilterDebugInfo,
    pub error: Option<String>,
}

fn package_key(item: &Item) -> String {
    match item {
        Item::Package(p) => format!("{}/{}/{}", p.namespace, p.repository, p.name),
        other => other.name().to_string(),
    }
}

impl CatalogSession {
    pub fn new(route: CatalogRoute, filter: FilterState) -> Self {
        Self::with_page_size(route, filter, PAGE_SIZE)
    }

    pub fn with_page_size(route: CatalogRoute, filter: FilterState, page_size: usize) -> Self {
        Self {
            route,
            filter,
            pager: Pager::with_page_size(page_size),
            packages: PageBuffer::new(),
            offerings: Vec::new(),
            page_error: None,
            offerings_error: None,
        }
    }

    pub fn from_url(url: &str) -> Result<Self, RouteError> {
        let (route, filter) = CatalogRoute::parse(url)?;
        Ok(Self::new(route, filter))
    }

    pub fn href(&self) -> String { self.route.href(&self.filter) }
    pub fn filter(&self) -> &FilterState { &self.filter }
    pub fn route(&self) -> &CatalogRoute { &self.route }
    pub fn version(&self) -> u64 { self.pager.version() }
    pub fn window(&self) -> PageWindow { self.pager.window() }
    pub fn state(&self) -> PagerState { self.pager.state() }
    /// Most relevant fetch error: a failed page first, then a failed operator listing.
    pub fn last_error(&self) -> Option<&str> { self.page_error.as_deref().or(self.offerings_error.as_deref()) }
    pub fn has_more(&self) -> bool { !self.pager.is_exhausted() }

    /// Exhausted without a single package or offering to show.
    pub fn is_empty_catalog(&self) -> bool {
        self.pager.is_exhausted() && self.packages.is_empty() && self.offerings.is_empty()
    }

    fn reset(&mut self, reason: &'static str) {
        let version = self.pager.invalidate();
        self.packages.clear();
        self.page_error = None;
        debug!(version, reason, href = %self.href(), "session: reset");
    }

    fn mutate(&mut self, f: impl FnOnce(&mut FilterState) -> bool) -> String {
        if f(&mut self.filter) {
            self.reset("filter");
        }
        self.href()
    }

    pub fn toggle(&mut self, facet: FacetName, value: &str) -> String { self.mutate(|f| f.toggle(facet, value)) }

    pub fn select(&mut self, facet: FacetName, value: &str) -> String { self.mutate(|f| f.select(facet, value)) }

    pub fn deselect(&mut self, facet: FacetName, value: &str) -> String { self.mutate(|f| f.deselect(facet, value)) }

    pub fn set_search(&mut self, text: &str) -> String { self.mutate(|f| f.set_search(text)) }

    pub fn clear_facet(&mut self, facet: FacetName) -> String { self.mutate(|f| f.clear(facet)) }

    pub fn clear_filters(&mut self) -> String { self.mutate(FilterState::clear_all) }

    /// History navigation. Returns whether anything changed.
    pub fn navigate(&mut self, url: &str) -> Result<bool, RouteError> {
        let (route, filter) = CatalogRoute::parse(url)?;
        let moved = route != self.route;
        let changed = moved || filter != self.filter;
        if moved {
            self.drop_offerings();
        }
        self.route = route;
        self.filter = filter;
        if changed {
            self.reset("navigate");
        }
        Ok(changed)
    }

    /// Switch cluster or namespace; the filter is kept.
    pub fn set_context(&mut self, cluster: &str, namespace: &str) -> String {
        let next = CatalogRoute::new(cluster, namespace);
        if next != self.route {
            self.route = next;
            self.drop_offerings();
            self.reset("context");
        }
        self.href()
    }

    fn drop_offerings(&mut self) {
        self.offerings.clear();
        self.offerings_error = None;
    }

    pub fn set_offerings(&mut self, offerings: Vec<Offering>) {
        self.offerings = offerings.into_iter().map(Item::Offering).collect();
        self.offerings_error = None;
    }

    pub fn on_offerings_failed(&mut self, err: &KioskError) {
        warn!(error = %err, namespace = %self.route.namespace, "session: offerings unavailable");
        self.offerings_error = Some(err.to_string());
    }

    /// The bottom of the list became visible.
    pub fn on_visible(&mut self, version: u64) -> Option<FetchRequest> {
        let req = self.pager.on_visible(version)?;
        Some(FetchRequest {
            cluster: self.route.cluster.clone(),
            namespace: self.route.namespace.clone(),
            repositories: self
                .filter
                .selected(FacetName::Repository)
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default(),
            page: req.page,
            size: req.size,
            search: self.filter.search().to_string(),
            version: req.version,
        })
    }

    pub fn on_page(&mut self, delivery: PageDelivery) -> PageOutcome {
        match delivery.result {
            Ok(page) => {
                let outcome = self.pager.on_loaded(delivery.version, page.len());
                if matches!(outcome, PageOutcome::Loaded { .. } | PageOutcome::Exhausted { .. }) {
                    let added = self.packages.extend_page(page.into_iter().map(Item::Package).collect(), package_key);
                    self.page_error = None;
                    debug!(
                        version = delivery.version,
                        added,
                        total = self.packages.len(),
                        duplicates = self.packages.duplicates(),
                        "session: page appended"
                    );
                }
                outcome
            }
            Err(e) => {
                let outcome = self.pager.on_failed(delivery.version);
                if outcome == PageOutcome::Failed {
                    warn!(version = delivery.version, error = %e, "session: page fetch failed");
                    self.page_error = Some(e.to_string());
                }
                outcome
            }
        }
    }

    /// Request the next page from `source` and apply it, without leaving the task.
    pub async fn load_next(&mut self, source: &dyn PackageSource) -> Option<PageOutcome> {
        let req = self.on_visible(self.version())?;
        let result = source.request_page(&req).await;
        Some(self.on_page(PageDelivery { version: req.version, result }))
    }

    pub async fn load_offerings(&mut self, source: &dyn OperatorSource) {
        let (cluster, namespace) = (self.route.cluster.clone(), self.route.namespace.clone());
        match source.list_offerings(&cluster, &namespace).await {
            Ok(offs) => self.set_offerings(offs),
            Err(e) => self.on_offerings_failed(&e),
        }
    }

    fn all_items(&self) -> impl Iterator<Item = &Item> + '_ {
        self.packages.items().iter().chain(self.offerings.iter())
    }

    pub fn view(&self) -> Vec<&Item> { self.view_with_debug().0 }

    pub fn view_with_debug(&self) -> (Vec<&Item>, FilterDebugInfo) {
        let all: Vec<&Item> = self.all_items().collect();
        let (hits, dbg) = filter_items_with_debug(all.iter().copied(), &self.filter);
        let mut out: Vec<&Item> = hits.into_iter().map(|i| all[i]).collect();
        out.sort_by_cached_key(|it| (it.display_name().to_lowercase(), it.kind(), it.name().to_string()));
        (out, dbg)
    }

    pub fn vocabulary(&self) -> Vocabulary { Vocabulary::build(self.all_items()) }

    pub fn counts(&self) -> BTreeMap<FacetName, BTreeMap<String, usize>> { facet_counts(self.all_items()) }

    pub fn snapshot(&self) -> CatalogView {
        let (items, debug) = self.view_with_debug();
        CatalogView {
            href: self.href(),
            window: self.window(),
            state: self.state(),
            has_more: self.has_more(),
            filters: self.filter.labels(),
            items: items.into_iter().cloned().collect(),
            debug,
            error: self.last_error().map(str::to_string),
        }
    }
}
