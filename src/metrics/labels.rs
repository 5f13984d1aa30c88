//! Label-set canonicalization
//!
//! A metric series is identified by `(name, labels)`. Labels are an unordered
//! mapping, so the key is built from the labels sorted by name. A series
//! without labels uses [`DEFAULT_LABEL_KEY`], which can never collide with a
//! real combination because every real pair contains an unescaped `=`.
//! Delimiters and backslashes inside names and values are backslash-escaped,
//! so distinct label sets always produce distinct keys.

use std::collections::BTreeMap;

/// Key used for series recorded without labels
pub const DEFAULT_LABEL_KEY: &str = "__default__";

const PAIR_DELIMITER: char = ',';
const VALUE_DELIMITER: char = '=';
const ESCAPE: char = '\\';

/// Owned, ordered label set as exported in snapshots
pub type Labels = BTreeMap<String, String>;

/// Identity of one metric series
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub name: String,
    pub label_key: String,
}

impl SeriesKey {
    pub fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            label_key: canonical_key(labels),
        }
    }
}

/// Build the canonical key for a label set.
///
/// Duplicate names keep the last value, matching map-insert semantics.
pub fn canonical_key(labels: &[(&str, &str)]) -> String {
    let ordered = to_labels(labels);
    if ordered.is_empty() {
        return DEFAULT_LABEL_KEY.to_string();
    }

    let mut key = String::new();
    for (i, (k, v)) in ordered.iter().enumerate() {
        if i > 0 {
            key.push(PAIR_DELIMITER);
        }
        push_escaped(&mut key, k);
        key.push(VALUE_DELIMITER);
        push_escaped(&mut key, v);
    }
    key
}

fn push_escaped(key: &mut String, part: &str) {
    for c in part.chars() {
        if matches!(c, PAIR_DELIMITER | VALUE_DELIMITER | ESCAPE) {
            key.push(ESCAPE);
        }
        key.push(c);
    }
}

pub fn to_labels(labels: &[(&str, &str)]) -> Labels {
    labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
