//! Catalog location: `/c/<cluster>/ns/<namespace>/catalog?<filters>`.

#![forbid(unsafe_code)]

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet};
use serde::{Deserialize, Serialize};

use crate::query::{self, VALUE};
use crate::FilterState;

const SEGMENT: &AsciiSet = &VALUE.add(b'/');

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("not a catalog path: {0} (expect /c/<cluster>/ns/<namespace>/catalog)")]
    NotCatalog(String),
}

/// Cluster and namespace a catalog view is scoped to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CatalogRoute {
    pub cluster: String,
    pub namespace: String,
}

impl CatalogRoute {
    pub fn new(cluster: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { cluster: cluster.into(), namespace: namespace.into() }
    }

    pub fn path(&self) -> String {
        format!(
            "/c/{}/ns/{}/catalog",
            utf8_percent_encode(&self.cluster, SEGMENT),
            utf8_percent_encode(&self.namespace, SEGMENT)
        )
    }

    /// Location to push after a filter change; bare path when nothing is selected.
    pub fn href(&self, filter: &FilterState) -> String {
        let q = query::encode(filter);
        if q.is_empty() { self.path() } else { format!("{}?{}", self.path(), q) }
    }

    /// Parse a location into its route and filter state.
    ///
    /// Accepts a bare path, a full URL, or a hash-router URL (`https://host/#/c/...`).
    /// A malformed query never fails the parse; a path of the wrong shape does.
    pub fn parse(url: &str) -> Result<(Self, FilterState), RouteError> {
        let mut rest = match url.split_once("#/") {
            Some((_, after)) => &url[url.len() - after.len() - 1..],
            None => url,
        };
        if let Some((before, _frag)) = rest.split_once('#') {
            rest = before;
        }
        if let Some(idx) = rest.find("://") {
            let after = &rest[idx + 3..];
            rest = after.find('/').map(|i| &after[i..]).unwrap_or("/");
        }
        let (path, q) = rest.split_once('?').unwrap_or((rest, ""));
        let segs: Vec<&str> = path.trim_end_matches('/').split('/').collect();
        match segs.as_slice() {
            ["", "c", cluster, "ns", namespace, "catalog"] if !cluster.is_empty() && !namespace.is_empty() => {
                let route = Self::new(decode_segment(cluster), decode_segment(namespace));
                Ok((route, query::decode(q)))
            }
            _ => Err(RouteError::NotCatalog(path.to_string())),
        }
    }
}

fn decode_segment(s: &str) -> String { percent_decode_str(s).decode_utf8_lossy().into_owned() }
