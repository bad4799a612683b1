//! Candidate selection for a chosen key value.
//!
//! Policy: the earliest unverified row wins; once every row for a key is
//! verified the latest matching row is shown instead and the caller is told
//! the key is exhausted. Row order is the order the service returned.

use crate::model::Record;
use std::collections::BTreeSet;

/// Result of resolving a key against a sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub record: Option<Record>,
    /// Set when every row carrying the key is already verified.
    pub all_verified: bool,
}

impl Selection {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_none()
    }
}

pub fn select(rows: &[Record], key_value: &str) -> Selection {
    let key = key_value.trim();
    if key.is_empty() {
        return Selection::none();
    }

    if let Some(first_open) = rows.iter().find(|r| r.key() == key && !r.is_verified) {
        return Selection {
            record: Some(first_open.clone()),
            all_verified: false,
        };
    }

    match rows.iter().rfind(|r| r.key() == key) {
        Some(last) => Selection {
            record: Some(last.clone()),
            all_verified: true,
        },
        None => Selection::none(),
    }
}

/// Distinct non-blank keys of a sheet, trimmed and sorted ascending.
pub fn selectable_keys(rows: &[Record]) -> Vec<String> {
    rows.iter()
        .map(Record::key)
        .filter(|key| !key.is_empty())
        .map(str::to_owned)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
