//! Kiosk search: facet vocabularies and the item predicate.
//!
//! Facets combine with AND; values inside one facet combine with OR. An
//! inactive facet never constrains anything, and a missing vocabulary never
//! makes a selected facet match nothing by itself: the predicate only looks at
//! the item and the filter.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use kiosk_core::{FacetName, FilterState, Item, ItemKind, ItemView, CHARTS_LABEL, OPERATORS_LABEL};
use tracing::debug;

/// Distinct values per facet, sorted, as offered to the facet controls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    values: BTreeMap<FacetName, Vec<String>>,
    has_offerings: bool,
}

impl Vocabulary {
    pub fn build<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a Item>,
    {
        let mut categories: BTreeSet<&str> = BTreeSet::new();
        let mut repositories: BTreeSet<&str> = BTreeSet::new();
        let mut providers: BTreeSet<&str> = BTreeSet::new();
        let mut has_offerings = false;
        for item in items {
            let v = item.view();
            categories.extend(v.categories.iter().copied());
            match v.kind {
                ItemKind::Package => {
                    if let Some(r) = v.repository.filter(|r| !r.is_empty()) { repositories.insert(r); }
                }
                ItemKind::Offering => {
                    has_offerings = true;
                    if let Some(p) = v.provider.filter(|p| !p.is_empty()) { providers.insert(p); }
                }
            }
        }
        let owned = |s: BTreeSet<&str>| s.into_iter().map(str::to_string).collect::<Vec<_>>();
        let mut values = BTreeMap::new();
        values.insert(FacetName::Type, vec![CHARTS_LABEL.to_string(), OPERATORS_LABEL.to_string()]);
        values.insert(FacetName::Category, owned(categories));
        values.insert(FacetName::Repository, owned(repositories));
        values.insert(FacetName::OperatorProvider, owned(providers));
        Self { values, has_offerings }
    }

    /// Values for a facet; always empty for `Search`.
    pub fn get(&self, facet: FacetName) -> &[String] {
        self.values.get(&facet).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Whether the facet control should be rendered at all.
    pub fn is_visible(&self, facet: FacetName) -> bool {
        match facet {
            FacetName::Search => true,
            // Choosing between kinds only makes sense once operators are around.
            FacetName::Type => self.has_offerings,
            _ => !self.get(facet).is_empty(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (FacetName, &[String])> + '_ {
        self.values.iter().map(|(f, v)| (*f, v.as_slice()))
    }
}

/// Number of items carrying each facet value. An item counts once per value.
pub fn facet_counts<'a, I>(items: I) -> BTreeMap<FacetName, BTreeMap<String, usize>>
where
    I: IntoIterator<Item = &'a Item>,
{
    let mut out: BTreeMap<FacetName, BTreeMap<String, usize>> = BTreeMap::new();
    let mut bump = |facet: FacetName, value: &str| {
        *out.entry(facet).or_default().entry(value.to_string()).or_default() += 1;
    };
    for item in items {
        let v = item.view();
        bump(FacetName::Type, v.kind.label());
        let distinct: BTreeSet<&str> = v.categories.iter().copied().collect();
        for c in distinct { bump(FacetName::Category, c); }
        if let Some(r) = v.repository.filter(|r| !r.is_empty()) { bump(FacetName::Repository, r); }
        if let Some(p) = v.provider.filter(|p| !p.is_empty()) { bump(FacetName::OperatorProvider, p); }
    }
    out
}

/// Whether `item` passes every active facet in `filter`.
pub fn matches(item: &Item, filter: &FilterState) -> bool {
    matches_view(&item.view(), filter)
}

pub fn matches_view(view: &ItemView<'_>, filter: &FilterState) -> bool {
    FacetName::ALL.into_iter().all(|facet| passes(view, filter, facet))
}

/// Evaluate a single facet. Inactive facets always pass.
pub fn passes(view: &ItemView<'_>, filter: &FilterState, facet: FacetName) -> bool {
    let selected = filter.selected(facet);
    match facet {
        FacetName::Search => {
            let needle = filter.search();
            needle.is_empty() || contains_ignore_case(view.display_name, needle)
        }
        FacetName::Type => selected.map_or(true, |s| s.contains(view.kind.label())),
        FacetName::Category => selected.map_or(true, |s| view.categories.iter().any(|c| s.contains(*c))),
        // Items of the other kind lack the attribute and never match.
        FacetName::Repository => selected.map_or(true, |s| view.repository.is_some_and(|r| s.contains(r))),
        FacetName::OperatorProvider => selected.map_or(true, |s| view.provider.is_some_and(|p| s.contains(p))),
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Survivors after each facet stage, in evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct FilterDebugInfo {
    pub total: usize,
    pub after_type: usize,
    pub after_category: usize,
    pub after_repository: usize,
    pub after_provider: usize,
    pub after_search: usize,
}

/// Indices of matching items, in input order.
pub fn filter_items<'a, I>(items: I, filter: &FilterState) -> Vec<usize>
where
    I: IntoIterator<Item = &'a Item>,
{
    filter_items_with_debug(items, filter).0
}

pub fn filter_items_with_debug<'a, I>(items: I, filter: &FilterState) -> (Vec<usize>, FilterDebugInfo)
where
    I: IntoIterator<Item = &'a Item>,
{
    let started = std::time::Instant::now();
    let views: Vec<ItemView<'a>> = items.into_iter().map(Item::view).collect();
    let mut candidates: Vec<usize> = (0..views.len()).collect();
    let mut counts = [0usize; 5];
    for (stage, facet) in FacetName::ALL.into_iter().enumerate() {
        if filter.is_active(facet) {
            candidates.retain(|i| passes(&views[*i], filter, facet));
        }
        counts[stage] = candidates.len();
    }
    let dbg = FilterDebugInfo {
        total: views.len(),
        after_type: counts[0],
        after_category: counts[1],
        after_repository: counts[2],
        after_provider: counts[3],
        after_search: counts[4],
    };
    metrics::histogram!("catalog_filter_eval_ms", started.elapsed().as_secs_f64() * 1_000.0);
    debug!(total = dbg.total, kept = candidates.len(), "filter: evaluated");
    (candidates, dbg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_core::{Offering, Package, UNKNOWN_CATEGORY};

    fn pkg(name: &str, cats: &[&str], repo: &str) -> Item {
        Item::Package(Package {
            name: name.to_string(),
            display_name: name.to_string(),
            categories: cats.iter().map(|c| c.to_string()).collect(),
            repository: repo.to_string(),
            ..Default::default()
        })
    }

    fn op(name: &str, cats: &str, provider: &str) -> Item {
        Item::Offering(Offering {
            name: name.to_string(),
            display_name: name.to_string(),
            categories: Offering::parse_categories(cats),
            provider: provider.to_string(),
            ..Default::default()
        })
    }

    fn filter(pairs: &[(FacetName, &str)]) -> FilterState {
        let mut f = FilterState::new();
        for (facet, v) in pairs { f.select(*facet, *v); }
        f
    }

    #[test]
    fn category_selection_uses_unknown_bucket() {
        let db = pkg("bar", &["Database"], "stable");
        let none = pkg("foo", &[], "stable");
        let by_db = filter(&[(FacetName::Category, "Database")]);
        let by_unknown = filter(&[(FacetName::Category, UNKNOWN_CATEGORY)]);
        assert!(matches(&db, &by_db));
        assert!(!matches(&none, &by_db));
        assert!(!matches(&db, &by_unknown));
        assert!(matches(&none, &by_unknown));
    }

    #[test]
    fn offering_without_categories_has_no_unknown_bucket() {
        // Only packages get the implicit "Unknown" category; offerings keep none.
        let bare = op("etcd", "", "CoreOS");
        assert!(!matches(&bare, &filter(&[(FacetName::Category, UNKNOWN_CATEGORY)])));
        let vocab = Vocabulary::build([&bare]);
        assert!(vocab.get(FacetName::Category).is_empty());
    }

    #[test]
    fn offering_category_string_merges_into_vocabulary() {
        let o = op("kafka", "DeveloperTools, Infrastructure", "Red Hat");
        let vocab = Vocabulary::build([&o]);
        assert_eq!(vocab.get(FacetName::Category), &["DeveloperTools".to_string(), "Infrastructure".to_string()]);
        assert!(matches(&o, &filter(&[(FacetName::Category, "DeveloperTools")])));
        assert!(matches(&o, &filter(&[(FacetName::Category, "Infrastructure")])));
        assert!(!matches(&o, &filter(&[(FacetName::Category, "Database")])));
    }

    #[test]
    fn facets_and_within_or_across() {
        let a = pkg("a", &["Database"], "stable");
        let b = pkg("b", &["Analytics"], "incubator");
        let f = filter(&[
            (FacetName::Category, "Database"),
            (FacetName::Category, "Analytics"),
            (FacetName::Repository, "stable"),
        ]);
        assert!(matches(&a, &f));
        assert!(!matches(&b, &f));
        assert!(matches(&b, &FilterState::new()));
    }

    #[test]
    fn attribute_facets_exclude_other_kind() {
        let p = pkg("redis", &[], "stable");
        let o = op("redis-operator", "", "Redis Labs");
        let by_repo = filter(&[(FacetName::Repository, "stable")]);
        let by_provider = filter(&[(FacetName::OperatorProvider, "Redis Labs")]);
        assert!(matches(&p, &by_repo));
        assert!(!matches(&o, &by_repo));
        assert!(matches(&o, &by_provider));
        assert!(!matches(&p, &by_provider));
    }

    #[test]
    fn type_and_search() {
        let p = pkg("PostgreSQL", &[], "stable");
        let o = op("postgres-operator", "", "Crunchy");
        let charts = filter(&[(FacetName::Type, CHARTS_LABEL)]);
        assert!(matches(&p, &charts));
        assert!(!matches(&o, &charts));
        let both = filter(&[(FacetName::Type, CHARTS_LABEL), (FacetName::Type, OPERATORS_LABEL)]);
        assert!(matches(&o, &both));
        let search = filter(&[(FacetName::Search, "postgres")]);
        assert!(matches(&p, &search));
        assert!(matches(&o, &search));
        assert!(!matches(&p, &filter(&[(FacetName::Search, "mysql")])));
    }

    #[test]
    fn vocabulary_visibility() {
        let empty = Vocabulary::build(std::iter::empty());
        assert!(!empty.is_visible(FacetName::Type));
        assert!(!empty.is_visible(FacetName::Repository));
        assert!(empty.is_visible(FacetName::Search));
        assert_eq!(empty.get(FacetName::Type).len(), 2);

        let items = vec![pkg("a", &[], "stable"), pkg("b", &["X"], "stable"), op("c", "X", "me")];
        let v = Vocabulary::build(&items);
        assert!(v.is_visible(FacetName::Type));
        assert_eq!(v.get(FacetName::Repository), &["stable".to_string()]);
        assert_eq!(v.get(FacetName::OperatorProvider), &["me".to_string()]);
        assert_eq!(v.get(FacetName::Category), &["Unknown".to_string(), "X".to_string()]);
        assert_eq!(Vocabulary::build(&items), v, "build must be deterministic");
    }

    #[test]
    fn counts_per_value() {
        let items = vec![pkg("a", &["X", "X"], "s"), pkg("b", &["X"], "s"), op("c", "X, Y", "me")];
        let counts = facet_counts(&items);
        assert_eq!(counts[&FacetName::Category]["X"], 3);
        assert_eq!(counts[&FacetName::Category]["Y"], 1);
        assert_eq!(counts[&FacetName::Type][CHARTS_LABEL], 2);
        assert_eq!(counts[&FacetName::Repository]["s"], 2);
    }

    #[test]
    fn staged_debug_counts() {
        let items = vec![
            pkg("mysql", &["Database"], "stable"),
            pkg("mariadb", &["Database"], "bitnami"),
            pkg("nginx", &["Web"], "stable"),
            op("mysql-operator", "Database", "Oracle"),
        ];
        let f = filter(&[(FacetName::Category, "Database"), (FacetName::Repository, "stable"), (FacetName::Search, "SQL")]);
        let (hits, dbg) = filter_items_with_debug(&items, &f);
        assert_eq!(hits, vec![0]);
        assert_eq!(dbg, FilterDebugInfo {
            total: 4,
            after_type: 4,
            after_category: 3,
            after_repository: 1,
            after_provider: 1,
            after_search: 1,
        });
    }
}
