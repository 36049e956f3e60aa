//! Kiosk store: page-window controller and page buffer for incremental loading.
//!
//! The controller is a small state machine over `Idle`, `Loading` and
//! `Exhausted`. Every request it issues carries the filter version it was
//! issued under; completions for an older version are dropped on arrival
//! instead of being cancelled in flight.

#![forbid(unsafe_code)]

use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::debug;

/// Items per page requested from the package source.
pub const PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PagerState {
    Idle,
    Loading,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    pub page_size: usize,
    pub pages_loaded: u32,
    pub exhausted: bool,
    /// Bumped on every filter or context change.
    pub filter_version: u64,
}

/// Request for the next page, tagged with the version it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub version: u64,
    /// Zero-based page index; equals `pages_loaded` at issue time.
    pub page: u32,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PageOutcome {
    /// Page accepted; more may follow.
    Loaded { pages_loaded: u32 },
    /// Short page accepted; the source has nothing more for this version.
    Exhausted { pages_loaded: u32 },
    /// Fetch failed; back to idle so a later signal retries.
    Failed,
    /// Tagged with a superseded version; dropped without touching state.
    Stale,
    /// Current version but nothing was in flight.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct Pager {
    window: PageWindow,
    state: PagerState,
}

impl Default for Pager {
    fn default() -> Self { Self::new() }
}

impl Pager {
    pub fn new() -> Self { Self::with_page_size(PAGE_SIZE) }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            window: PageWindow { page_size: page_size.max(1), pages_loaded: 0, exhausted: false, filter_version: 1 },
            state: PagerState::Idle,
        }
    }

    pub fn state(&self) -> PagerState { self.state }
    pub fn window(&self) -> PageWindow { self.window }
    pub fn version(&self) -> u64 { self.window.filter_version }
    pub fn pages_loaded(&self) -> u32 { self.window.pages_loaded }
    pub fn page_size(&self) -> usize { self.window.page_size }
    pub fn is_exhausted(&self) -> bool { self.state == PagerState::Exhausted }

    /// Start a new filter version: `Idle`, nothing loaded. Anything still in
    /// flight for the old version becomes stale. Returns the new version.
    pub fn invalidate(&mut self) -> u64 {
        let prev = self.state;
        self.window.filter_version = self.window.filter_version.saturating_add(1);
        self.window.pages_loaded = 0;
        self.window.exhausted = false;
        self.state = PagerState::Idle;
        metrics::counter!("catalog_filter_resets_total", 1u64);
        debug!(version = self.window.filter_version, prev = ?prev, "pager: reset");
        self.window.filter_version
    }

    /// The bottom of the list became visible. Issues the next page request when
    /// idle and the signal belongs to the current version.
    pub fn on_visible(&mut self, version: u64) -> Option<PageRequest> {
        if version != self.window.filter_version {
            debug!(version, current = self.window.filter_version, "pager: stale visibility signal");
            return None;
        }
        if self.state != PagerState::Idle {
            return None;
        }
        self.state = PagerState::Loading;
        let req = PageRequest { version, page: self.window.pages_loaded, size: self.window.page_size };
        metrics::counter!("catalog_page_requests_total", 1u64);
        debug!(version, page = req.page, size = req.size, "pager: request page");
        Some(req)
    }

    /// A page of `count` items arrived for `version`.
    pub fn on_loaded(&mut self, version: u64, count: usize) -> PageOutcome {
        if let Some(skip) = self.check_delivery(version) {
            return skip;
        }
        self.window.pages_loaded += 1;
        metrics::counter!("catalog_pages_loaded_total", 1u64);
        if count < self.window.page_size {
            self.window.exhausted = true;
            self.state = PagerState::Exhausted;
            debug!(version, count, pages = self.window.pages_loaded, "pager: exhausted");
            PageOutcome::Exhausted { pages_loaded: self.window.pages_loaded }
        } else {
            self.state = PagerState::Idle;
            PageOutcome::Loaded { pages_loaded: self.window.pages_loaded }
        }
    }

    /// The fetch for `version` failed.
    pub fn on_failed(&mut self, version: u64) -> PageOutcome {
        if let Some(skip) = self.check_delivery(version) {
            return skip;
        }
        metrics::counter!("catalog_fetch_errors_total", 1u64);
        self.state = PagerState::Idle;
        PageOutcome::Failed
    }

    fn check_delivery(&self, version: u64) -> Option<PageOutcome> {
        if version != self.window.filter_version {
            metrics::counter!("catalog_stale_responses_total", 1u64);
            debug!(version, current = self.window.filter_version, "pager: dropping stale response");
            return Some(PageOutcome::Stale);
        }
        if self.state != PagerState::Loading {
            debug!(version, state = ?self.state, "pager: unexpected response");
            return Some(PageOutcome::Ignored);
        }
        None
    }
}

/// Items accumulated across pages of one filter version, deduplicated by key
/// so a catalog that shifts between page fetches does not show an entry twice.
#[derive(Debug, Clone)]
pub struct PageBuffer<T> {
    items: Vec<T>,
    seen: FxHashSet<String>,
    duplicates: u64,
}

impl<T> Default for PageBuffer<T> {
    fn default() -> Self { Self { items: Vec::new(), seen: FxHashSet::default(), duplicates: 0 } }
}

impl<T> PageBuffer<T> {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn items(&self) -> &[T] { &self.items }
    pub fn duplicates(&self) -> u64 { self.duplicates }

    /// Append a page, skipping entries whose key was already seen. Returns how many were added.
    pub fn extend_page<F>(&mut self, page: Vec<T>, key: F) -> usize
    where
        F: Fn(&T) -> String,
    {
        let before = self.items.len();
        for it in page {
            if self.seen.insert(key(&it)) {
                self.items.push(it);
            } else {
                self.duplicates += 1;
            }
        }
        self.items.len() - before
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.seen.clear();
        self.duplicates = 0;
    }
}
