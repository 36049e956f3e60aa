//! Kiosk core types: catalog items, facets and filter state.
//!
//! The catalog mixes two item kinds: installable packages (Helm charts) and
//! operator offerings (one per CRD owned by a ClusterServiceVersion). Both are
//! reduced to an [`ItemView`] before any facet logic looks at them.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub mod query;
pub mod route;

pub use route::{CatalogRoute, RouteError};

/// Category bucket for packages that declare none.
pub const UNKNOWN_CATEGORY: &str = "Unknown";
/// Type facet label for packages.
pub const CHARTS_LABEL: &str = "Charts";
/// Type facet label for offerings.
pub const OPERATORS_LABEL: &str = "Operators";

pub type Categories = SmallVec<[String; 4]>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemKind {
    Package,
    Offering,
}

impl ItemKind {
    /// Label used by the `Type` facet.
    pub fn label(self) -> &'static str {
        match self {
            ItemKind::Package => CHARTS_LABEL,
            ItemKind::Offering => OPERATORS_LABEL,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            CHARTS_LABEL => Some(ItemKind::Package),
            OPERATORS_LABEL => Some(ItemKind::Offering),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionSummary {
    pub app_version: String,
    pub pkg_version: String,
}

/// An installable package served from a repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub display_name: String,
    /// Declared categories; blank entries are treated as absent.
    pub categories: Categories,
    pub repository: String,
    /// Namespace serving the package; global packages share one across namespaces.
    #[serde(default)]
    pub namespace: String,
    pub icon_url: String,
    pub version: VersionSummary,
    pub description: String,
}

/// A capability offered by an operator registered in the cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Offering {
    pub name: String,
    pub display_name: String,
    /// Name of the ClusterServiceVersion that owns this offering.
    pub csv: String,
    pub categories: Categories,
    pub provider: String,
    /// Inline icon as a data URI, when the operator ships one.
    pub icon: Option<String>,
    pub version: String,
    pub description: String,
}

impl Offering {
    /// Split a `categories` annotation such as `"DeveloperTools, Infrastructure"`.
    pub fn parse_categories(raw: &str) -> Categories {
        raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Item {
    Package(Package),
    Offering(Offering),
}

/// Uniform read-only projection consumed by vocabulary and predicate code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView<'a> {
    pub kind: ItemKind,
    pub name: &'a str,
    pub display_name: &'a str,
    /// Effective categories: packages without any get [`UNKNOWN_CATEGORY`], offerings do not.
    pub categories: SmallVec<[&'a str; 4]>,
    pub repository: Option<&'a str>,
    pub provider: Option<&'a str>,
}

impl Item {
    pub fn kind(&self) -> ItemKind {
        match self {
            Item::Package(_) => ItemKind::Package,
            Item::Offering(_) => ItemKind::Offering,
        }
    }

    pub fn name(&self) -> &str {
        match self { Item::Package(p) => &p.name, Item::Offering(o) => &o.name }
    }

    pub fn display_name(&self) -> &str {
        match self { Item::Package(p) => &p.display_name, Item::Offering(o) => &o.display_name }
    }

    pub fn view(&self) -> ItemView<'_> {
        match self {
            Item::Package(p) => {
                let mut categories: SmallVec<[&str; 4]> =
                    p.categories.iter().map(|c| c.trim()).filter(|c| !c.is_empty()).collect();
                if categories.is_empty() {
                    categories.push(UNKNOWN_CATEGORY);
                }
                ItemView {
                    kind: ItemKind::Package,
                    name: &p.name,
                    display_name: &p.display_name,
                    categories,
                    repository: Some(p.repository.as_str()),
                    provider: None,
                }
            }
            Item::Offering(o) => ItemView {
                kind: ItemKind::Offering,
                name: &o.name,
                display_name: &o.display_name,
                categories: o.categories.iter().map(|c| c.trim()).filter(|c| !c.is_empty()).collect(),
                repository: None,
                provider: Some(o.provider.as_str()),
            },
        }
    }
}

impl From<Package> for Item {
    fn from(p: Package) -> Self { Item::Package(p) }
}

impl From<Offering> for Item {
    fn from(o: Offering) -> Self { Item::Offering(o) }
}

/// Filter dimensions. `Type` and `Search` are computed from the item itself,
/// the others from its attributes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FacetName {
    Type,
    Category,
    Repository,
    OperatorProvider,
    Search,
}

impl FacetName {
    /// Declaration order doubles as query parameter order.
    pub const ALL: [FacetName; 5] = [
        FacetName::Type,
        FacetName::Category,
        FacetName::Repository,
        FacetName::OperatorProvider,
        FacetName::Search,
    ];

    /// Query parameter name (case-sensitive).
    pub fn param(self) -> &'static str {
        match self {
            FacetName::Type => "Type",
            FacetName::Category => "Category",
            FacetName::Repository => "Repository",
            FacetName::OperatorProvider => "Provider",
            FacetName::Search => "Search",
        }
    }

    pub fn from_param(name: &str) -> Option<Self> {
        FacetName::ALL.into_iter().find(|f| f.param() == name)
    }

    /// Facets whose values are free-form strings and need sentinel escaping in URLs.
    pub fn is_escaped(self) -> bool {
        matches!(self, FacetName::Category | FacetName::Repository | FacetName::OperatorProvider)
    }
}

impl fmt::Display for FacetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.param()) }
}

/// Active facet selections. A facet without values is inactive; empty sets are
/// never stored so two states with the same selections compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    selected: BTreeMap<FacetName, BTreeSet<String>>,
    search: String,
}

impl FilterState {
    pub fn new() -> Self { Self::default() }

    /// Selected values for a set-valued facet. Always `None` for `Search`.
    pub fn selected(&self, facet: FacetName) -> Option<&BTreeSet<String>> {
        self.selected.get(&facet)
    }

    pub fn search(&self) -> &str { &self.search }

    pub fn is_active(&self, facet: FacetName) -> bool {
        match facet {
            FacetName::Search => !self.search.is_empty(),
            _ => self.selected.contains_key(&facet),
        }
    }

    pub fn is_empty(&self) -> bool { self.selected.is_empty() && self.search.is_empty() }

    pub fn active_facets(&self) -> impl Iterator<Item = FacetName> + '_ {
        FacetName::ALL.into_iter().filter(|f| self.is_active(*f))
    }

    pub fn contains(&self, facet: FacetName, value: &str) -> bool {
        match facet {
            FacetName::Search => !self.search.is_empty() && self.search == value,
            _ => self.selected.get(&facet).map(|s| s.contains(value)).unwrap_or(false),
        }
    }

    /// Add a value; for `Search` this replaces the text. Returns whether the state changed.
    pub fn select(&mut self, facet: FacetName, value: impl Into<String>) -> bool {
        let value = value.into();
        if facet == FacetName::Search {
            return self.set_search(value);
        }
        if value.is_empty() {
            return false;
        }
        self.selected.entry(facet).or_default().insert(value)
    }

    pub fn deselect(&mut self, facet: FacetName, value: &str) -> bool {
        if facet == FacetName::Search {
            return if self.search == value { self.clear(facet) } else { false };
        }
        let Some(set) = self.selected.get_mut(&facet) else { return false };
        let removed = set.remove(value);
        if set.is_empty() {
            self.selected.remove(&facet);
        }
        removed
    }

    /// Flip membership of `value`, as a facet checkbox does.
    pub fn toggle(&mut self, facet: FacetName, value: &str) -> bool {
        if self.contains(facet, value) {
            self.deselect(facet, value)
        } else {
            self.select(facet, value)
        }
    }

    pub fn set_search(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        if self.search == text {
            return false;
        }
        self.search = text;
        true
    }

    pub fn clear(&mut self, facet: FacetName) -> bool {
        match facet {
            FacetName::Search => self.set_search(String::new()),
            _ => self.selected.remove(&facet).is_some(),
        }
    }

    pub fn clear_all(&mut self) -> bool {
        let changed = !self.is_empty();
        self.selected.clear();
        self.search.clear();
        changed
    }

    /// One chip per selected value, e.g. `"Provider: Lightbend, Inc."`.
    pub fn labels(&self) -> Vec<String> {
        let mut out = Vec::new();
        for facet in self.active_facets() {
            match facet {
                FacetName::Search => out.push(format!("{}: {}", facet, self.search)),
                _ => {
                    for v in self.selected.get(&facet).into_iter().flatten() {
                        out.push(format!("{}: {}", facet, v));
                    }
                }
            }
        }
        out
    }
}

pub mod prelude {
    pub use super::{
        CatalogRoute, FacetName, FilterState, Item, ItemKind, ItemView, Offering, Package, VersionSummary,
        UNKNOWN_CATEGORY,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str, cats: &[&str], repo: &str) -> Item {
        Item::Package(Package {
            name: name.to_string(),
            display_name: name.to_string(),
            categories: cats.iter().map(|c| c.to_string()).collect(),
            repository: repo.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn blank_package_categories_fall_into_unknown() {
        let a = pkg("foo", &[""], "stable");
        let b = pkg("bar", &[], "stable");
        let c = pkg("baz", &["Database"], "stable");
        assert_eq!(a.view().categories.as_slice(), &[UNKNOWN_CATEGORY]);
        assert_eq!(b.view().categories.as_slice(), &[UNKNOWN_CATEGORY]);
        assert_eq!(c.view().categories.as_slice(), &["Database"]);
        assert_eq!(c.view().repository, Some("stable"));
        assert_eq!(c.view().provider, None);
    }

    #[test]
    fn offerings_without_categories_stay_empty() {
        let o = Item::Offering(Offering { name: "etcd".into(), provider: "CoreOS".into(), ..Default::default() });
        let v = o.view();
        assert!(v.categories.is_empty());
        assert_eq!(v.provider, Some("CoreOS"));
        assert_eq!(v.repository, None);
        assert_eq!(v.kind.label(), OPERATORS_LABEL);
    }

    #[test]
    fn categories_annotation_is_split_and_trimmed() {
        let cats = Offering::parse_categories("DeveloperTools, Infrastructure ,,");
        assert_eq!(cats.as_slice(), &["DeveloperTools".to_string(), "Infrastructure".to_string()]);
    }

    #[test]
    fn empty_selection_is_inactive() {
        let mut f = FilterState::new();
        assert!(f.select(FacetName::Category, "Database"));
        assert!(f.is_active(FacetName::Category));
        assert!(f.deselect(FacetName::Category, "Database"));
        assert!(!f.is_active(FacetName::Category));
        assert_eq!(f, FilterState::new());
        assert!(!f.select(FacetName::Category, ""));
        assert!(f.is_empty());
    }

    #[test]
    fn toggle_and_search_report_changes() {
        let mut f = FilterState::new();
        assert!(f.toggle(FacetName::Repository, "bitnami"));
        assert!(f.toggle(FacetName::Repository, "bitnami"));
        assert!(!f.is_active(FacetName::Repository));
        assert!(f.set_search("redis"));
        assert!(!f.set_search("redis"));
        assert!(f.is_active(FacetName::Search));
        assert!(f.clear(FacetName::Search));
        assert!(!f.clear_all());
    }

    #[test]
    fn labels_follow_facet_order() {
        let mut f = FilterState::new();
        f.set_search("db");
        f.select(FacetName::OperatorProvider, "Lightbend, Inc.");
        f.select(FacetName::Type, CHARTS_LABEL);
        assert_eq!(f.labels(), vec!["Type: Charts", "Provider: Lightbend, Inc.", "Search: db"]);
    }

    #[test]
    fn item_serializes_with_kind_tag() {
        let v = serde_json::to_value(pkg("foo", &[], "stable")).unwrap();
        assert_eq!(v["kind"], "package");
        assert_eq!(v["repository"], "stable");
    }
}
