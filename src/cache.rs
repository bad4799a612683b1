use crate::metrics::METRICS;
use crate::model::{InitialData, Record, RecordPatch};
use crate::selector::selectable_keys;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Process-wide view of every fetched sheet.
///
/// Each sheet's rows live behind an `Arc<[Record]>`; readers get a cheap
/// snapshot and writers swap in a whole new sequence.
pub struct SheetCache {
    sheets: RwLock<IndexMap<String, Arc<[Record]>>>,
    /// Sheets offered for selection (the cover sheet excluded).
    selectable: RwLock<Vec<String>>,
    lookups: AtomicU64,
    merges: AtomicU64,
    replacements: AtomicU64,
}

impl Default for SheetCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SheetCache {
    pub fn new() -> Self {
        Self {
            sheets: RwLock::new(IndexMap::new()),
            selectable: RwLock::new(Vec::new()),
            lookups: AtomicU64::new(0),
            merges: AtomicU64::new(0),
            replacements: AtomicU64::new(0),
        }
    }

    /// Populate the cache from the startup bulk fetch.
    ///
    /// The first sheet of the document is an index/cover sheet: its rows are
    /// cached like any other but it is never offered for selection.
    pub fn load(&self, data: InitialData) -> Vec<String> {
        let InitialData {
            sheet_names,
            mut sheets_data,
        } = data;

        let selectable: Vec<String> = sheet_names.iter().skip(1).cloned().collect();

        {
            let mut sheets = self.sheets.write();
            sheets.clear();
            for name in &sheet_names {
                let rows = sheets_data.remove(name).unwrap_or_default();
                check_unique_rows(name, &rows);
                sheets.insert(name.clone(), rows.into());
            }
            // Sheets present in the payload but missing from the name list.
            let mut extra: Vec<_> = sheets_data.into_iter().collect();
            extra.sort_by(|a, b| a.0.cmp(&b.0));
            for (name, rows) in extra {
                check_unique_rows(&name, &rows);
                sheets.insert(name, rows.into());
            }
        }
        *self.selectable.write() = selectable.clone();
        self.update_row_gauge();

        debug!(
            sheet_count = sheet_names.len(),
            selectable = selectable.len(),
            "sheet cache loaded"
        );
        selectable
    }

    /// Names offered for selection, in document order.
    pub fn sheet_names(&self) -> Vec<String> {
        self.selectable.read().clone()
    }

    pub fn contains(&self, sheet: &str) -> bool {
        self.sheets.read().contains_key(sheet)
    }

    /// Rows of `sheet`, or an empty sequence for a sheet never fetched.
    pub fn rows(&self, sheet: &str) -> Arc<[Record]> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.sheets
            .read()
            .get(sheet)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Replace a sheet's rows wholesale.
    pub fn set_rows(&self, sheet: &str, rows: Vec<Record>) {
        check_unique_rows(sheet, &rows);
        let count = rows.len();
        self.sheets.write().insert(sheet.to_string(), rows.into());
        self.replacements.fetch_add(1, Ordering::Relaxed);
        self.update_row_gauge();
        debug!(sheet, rows = count, "sheet rows replaced");
    }

    /// Swap the row with `row_index` for a patched copy.
    ///
    /// Returns the new record together with the sequence it was installed
    /// in, or `None` when the sheet or row is not cached; nothing changes in
    /// that case. The returned rows are the ones written under the lock, so
    /// a refresh landing afterwards cannot leak into them.
    pub fn merge_row(&self, sheet: &str, row_index: u64, patch: &RecordPatch) -> Option<MergedRow> {
        let mut sheets = self.sheets.write();
        let current = sheets.get_mut(sheet)?;
        let position = current.iter().position(|r| r.row_index == row_index)?;

        let record = current[position].with_patch(patch);
        let rows: Arc<[Record]> = current
            .iter()
            .enumerate()
            .map(|(i, r)| if i == position { record.clone() } else { r.clone() })
            .collect();
        *current = rows.clone();
        drop(sheets);

        self.merges.fetch_add(1, Ordering::Relaxed);
        debug!(sheet, row_index, verified = record.is_verified, "row merged");
        Some(MergedRow { record, rows })
    }

    pub fn summaries(&self) -> Vec<SheetSummary> {
        let sheets = self.sheets.read();
        self.selectable
            .read()
            .iter()
            .map(|name| {
                let rows = sheets.get(name).cloned().unwrap_or_else(|| Arc::from(Vec::new()));
                SheetSummary {
                    name: name.clone(),
                    rows: rows.len(),
                    unverified: rows.iter().filter(|r| !r.is_verified).count(),
                    keys: selectable_keys(&rows).len(),
                }
            })
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        let sheets = self.sheets.read();
        CacheStats {
            sheets: sheets.len(),
            rows: sheets.values().map(|rows| rows.len()).sum(),
            lookups: self.lookups.load(Ordering::Relaxed),
            merges: self.merges.load(Ordering::Relaxed),
            replacements: self.replacements.load(Ordering::Relaxed),
        }
    }

    fn update_row_gauge(&self) {
        let rows: usize = self.sheets.read().values().map(|rows| rows.len()).sum();
        METRICS.set_cached_rows(rows);
    }
}

fn check_unique_rows(sheet: &str, rows: &[Record]) {
    let mut seen = HashSet::with_capacity(rows.len());
    for record in rows {
        if !seen.insert(record.row_index) {
            warn!(sheet, row_index = record.row_index, "duplicate row index in sheet payload");
        }
    }
}

/// A merged record and the snapshot of its sheet right after the merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRow {
    pub record: Record,
    pub rows: Arc<[Record]>,
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub sheets: usize,
    pub rows: usize,
    pub lookups: u64,
    pub merges: u64,
    pub replacements: u64,
}

/// Per-sheet line of the startup report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSummary {
    pub name: String,
    pub rows: usize,
    pub unverified: usize,
    pub keys: usize,
}

impl fmt::Display for SheetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} rows, {} unverified, {} keys",
            self.name, self.rows, self.unverified, self.keys
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn initial() -> InitialData {
        let mut sheets_data = HashMap::new();
        sheets_data.insert("Index".to_string(), vec![Record::new(1, "x", "")]);
        sheets_data.insert(
            "North".to_string(),
            vec![
                Record::new(2, "A", "L1"),
                Record::new(3, "A", "L1"),
                Record::new(4, "B", "L2").verified(),
            ],
        );
        sheets_data.insert("South".to_string(), vec![Record::new(2, "Q", "L9")]);
        InitialData {
            sheet_names: vec!["Index".into(), "North".into(), "South".into()],
            sheets_data,
        }
    }

    #[test]
    fn load_excludes_cover_sheet_from_selection() {
        let cache = SheetCache::new();
        let names = cache.load(initial());

        assert_eq!(names, vec!["North", "South"]);
        assert_eq!(cache.sheet_names(), names);
        assert!(cache.contains("Index"));
        assert_eq!(cache.rows("North").len(), 3);
    }

    #[test]
    fn single_sheet_document_has_nothing_selectable() {
        let cache = SheetCache::new();
        let names = cache.load(InitialData {
            sheet_names: vec!["Only".into()],
            sheets_data: HashMap::new(),
        });
        assert!(names.is_empty());
        assert!(cache.rows("Only").is_empty());
    }

    #[test]
    fn merge_replaces_exactly_one_row() {
        let cache = SheetCache::new();
        cache.load(initial());
        let before = cache.rows("North");

        let merged = cache
            .merge_row(
                "North",
                3,
                &RecordPatch {
                    is_verified: true,
                    batch_label: "L7".into(),
                },
            )
            .expect("row cached");
        assert_eq!(merged.record.row_index, 3);
        assert_eq!(merged.rows, cache.rows("North"));

        let after = cache.rows("North");
        assert_eq!(after.len(), before.len());
        assert_eq!(after[0], before[0]);
        assert_eq!(after[2], before[2]);
        assert!(after[1].is_verified);
        assert_eq!(after[1].batch_label, "L7");
        // Earlier snapshots stay untouched.
        assert!(!before[1].is_verified);
        assert_eq!(cache.stats().merges, 1);
    }

    #[test]
    fn merged_snapshot_outlives_a_later_replacement() {
        let cache = SheetCache::new();
        cache.load(initial());
        let patch = RecordPatch {
            is_verified: true,
            batch_label: "L7".into(),
        };

        let merged = cache.merge_row("North", 2, &patch).expect("row cached");
        cache.set_rows("North", vec![Record::new(2, "A", "stale")]);

        assert_eq!(merged.rows.len(), 3);
        assert_eq!(merged.rows[0], merged.record);
        assert!(merged.rows[0].is_verified);
        assert_eq!(cache.rows("North")[0].batch_label, "stale");
    }

    #[test]
    fn merge_of_unknown_row_is_a_no_op() {
        let cache = SheetCache::new();
        cache.load(initial());
        let patch = RecordPatch {
            is_verified: true,
            batch_label: String::new(),
        };

        assert!(cache.merge_row("North", 99, &patch).is_none());
        assert!(cache.merge_row("Missing", 2, &patch).is_none());
        assert_eq!(cache.stats().merges, 0);
    }

    #[test]
    fn set_rows_leaves_other_sheets_alone() {
        let cache = SheetCache::new();
        cache.load(initial());
        let south = cache.rows("South");

        cache.set_rows("North", vec![Record::new(10, "Z", "L0")]);

        assert_eq!(cache.rows("North").len(), 1);
        assert_eq!(cache.rows("South"), south);
        assert_eq!(cache.stats().replacements, 1);
    }

    #[test]
    fn summaries_cover_selectable_sheets() {
        let cache = SheetCache::new();
        cache.load(initial());
        let summaries = cache.summaries();

        assert_eq!(summaries.len(), 2);
        assert_eq!(
            summaries[0],
            SheetSummary {
                name: "North".into(),
                rows: 3,
                unverified: 2,
                keys: 2,
            }
        );
        assert_eq!(summaries[1].to_string(), "South: 1 rows, 1 unverified, 1 keys");
    }
}
