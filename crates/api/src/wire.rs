//! Wire shapes of the package and operator listings, and their conversion
//! into catalog items.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use kiosk_core::{Categories, Offering, Package, VersionSummary};

/// Summary of an available package as listed by the packages API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageSummary {
    pub name: String,
    pub display_name: String,
    pub categories: Vec<String>,
    pub icon_url: String,
    pub latest_version: LatestVersion,
    pub short_description: String,
    pub available_package_ref: PackageRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LatestVersion {
    pub app_version: String,
    pub pkg_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageRef {
    /// `<repository>/<package>`.
    pub identifier: String,
    pub context: PackageContext,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageContext {
    pub cluster: String,
    pub namespace: String,
}

impl PackageSummary {
    pub fn repository(&self) -> &str {
        let id = &self.available_package_ref.identifier;
        id.split_once('/').map(|(repo, _)| repo).unwrap_or("")
    }

    pub fn namespace(&self) -> &str { &self.available_package_ref.context.namespace }

    pub fn to_package(&self) -> Package {
        Package {
            name: self.name.clone(),
            display_name: if self.display_name.is_empty() { self.name.clone() } else { self.display_name.clone() },
            // Blank entries stay; the item view folds them into "Unknown".
            categories: self.categories.iter().cloned().collect(),
            repository: self.repository().to_string(),
            namespace: self.namespace().to_string(),
            icon_url: self.icon_url.clone(),
            version: VersionSummary {
                app_version: self.latest_version.app_version.clone(),
                pkg_version: self.latest_version.pkg_version.clone(),
            },
            description: self.short_description.clone(),
        }
    }
}

impl From<&PackageSummary> for Package {
    fn from(s: &PackageSummary) -> Self { s.to_package() }
}

/// Operator Lifecycle Manager ClusterServiceVersion, reduced to what the
/// catalog shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterServiceVersion {
    pub metadata: ObjectMeta,
    pub spec: CsvSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectMeta {
    pub name: String,
    /// Empty for copies that apply to every namespace.
    pub namespace: String,
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CsvSpec {
    pub display_name: String,
    pub version: String,
    pub provider: CsvProvider,
    pub icon: Vec<CsvIcon>,
    pub customresourcedefinitions: CrdDescriptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvProvider {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvIcon {
    pub base64data: String,
    pub mediatype: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrdDescriptions {
    pub owned: Vec<OwnedCrd>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OwnedCrd {
    pub name: String,
    pub display_name: String,
    pub version: String,
    pub kind: String,
    pub description: String,
}

impl ClusterServiceVersion {
    pub const CATEGORIES_ANNOTATION: &'static str = "categories";

    /// Categories from the annotation; none when it is missing.
    pub fn categories(&self) -> Categories {
        self.metadata
            .annotations
            .get(Self::CATEGORIES_ANNOTATION)
            .map(|raw| Offering::parse_categories(raw))
            .unwrap_or_default()
    }

    /// First icon as a data URI.
    pub fn icon_data_uri(&self) -> Option<String> {
        self.spec
            .icon
            .first()
            .filter(|i| !i.base64data.is_empty())
            .map(|i| format!("data:{};base64,{}", i.mediatype, i.base64data))
    }

    /// One offering per owned CRD. A CSV owning nothing contributes nothing.
    pub fn offerings(&self) -> Vec<Offering> {
        let categories = self.categories();
        let icon = self.icon_data_uri();
        self.spec
            .customresourcedefinitions
            .owned
            .iter()
            .map(|crd| Offering {
                name: crd.name.clone(),
                display_name: if crd.display_name.is_empty() { crd.kind.clone() } else { crd.display_name.clone() },
                csv: self.metadata.name.clone(),
                categories: categories.clone(),
                provider: self.spec.provider.name.clone(),
                icon: icon.clone(),
                version: crd.version.clone(),
                description: crd.description.clone(),
            })
            .collect()
    }
}
