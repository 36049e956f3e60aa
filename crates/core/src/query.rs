//! Lossless codec between [`FilterState`] and a URL query string.
//!
//! Grammar: `Type=<v>&Category=<v1>,<v2>&Repository=<v>&Provider=<v1>,<v2>&Search=<text>`.
//! Multi-valued facets use a literal comma as separator; a comma inside a value
//! is written as the `__` sentinel, so `"Lightbend, Inc."` travels as
//! `Provider=Lightbend__%20Inc.`. Values that already contain `__` do not
//! round-trip.

#![forbid(unsafe_code)]

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use tracing::debug;

use crate::{FacetName, FilterState, ItemKind};

/// Stand-in for a comma inside a facet value.
pub const SENTINEL: &str = "__";
const SEPARATOR: char = ',';

/// Characters escaped inside a query value. The comma separator and `_` stay literal.
pub(crate) const VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'+')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

pub fn escape_value(v: &str) -> String { v.replace(SEPARATOR, SENTINEL) }

pub fn unescape_value(v: &str) -> String { v.replace(SENTINEL, ",") }

/// Encode active facets as `name=value` pairs joined by `&` (no leading `?`).
pub fn encode(filter: &FilterState) -> String {
    let mut pairs: Vec<String> = Vec::new();
    for facet in filter.active_facets() {
        let raw = match facet {
            FacetName::Search => filter.search().to_string(),
            _ => {
                let Some(values) = filter.selected(facet) else { continue };
                let parts: Vec<String> = values
                    .iter()
                    .map(|v| if facet.is_escaped() { escape_value(v) } else { v.clone() })
                    .collect();
                parts.join(",")
            }
        };
        pairs.push(format!("{}={}", facet.param(), utf8_percent_encode(&raw, VALUE)));
    }
    pairs.join("&")
}

/// Decode a query string (leading `?` optional). Never fails: unknown or
/// undecodable parameters are skipped and leave their facet inactive.
pub fn decode(query: &str) -> FilterState {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut out = FilterState::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (name, raw) = pair.split_once('=').unwrap_or((pair, ""));
        let Some(facet) = FacetName::from_param(name) else {
            debug!(param = %name, "query: ignoring unknown parameter");
            continue;
        };
        let Some(value) = decode_component(raw) else {
            debug!(param = %name, raw = %raw, "query: ignoring undecodable value");
            continue;
        };
        if facet == FacetName::Search {
            out.set_search(value);
            continue;
        }
        for piece in value.split(SEPARATOR).filter(|p| !p.is_empty()) {
            if facet == FacetName::Type && ItemKind::from_label(piece).is_none() {
                debug!(param = %name, value = %piece, "query: ignoring unknown item type");
                continue;
            }
            let v = if facet.is_escaped() { unescape_value(piece) } else { piece.to_string() };
            out.select(facet, v);
        }
    }
    out
}

fn decode_component(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8().ok().map(|c| c.into_owned())
}
