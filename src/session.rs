use crate::cache::SheetCache;
use crate::model::Record;
use crate::notice::Notice;
use crate::selector::{Selection, select, selectable_keys};
use std::sync::Arc;

/// Per-operator selection state.
///
/// Holds the chosen sheet and key, the candidate record they resolved to,
/// and the uncommitted form fields. Changing sheet clears everything else.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    sheet: Option<String>,
    key: String,
    record: Option<Record>,
    verified_draft: bool,
    numeric_draft: String,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sheet(&self) -> Option<&str> {
        self.sheet.as_deref()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    pub fn verified_draft(&self) -> bool {
        self.verified_draft
    }

    pub fn numeric_draft(&self) -> &str {
        &self.numeric_draft
    }

    pub fn set_verified(&mut self, verified: bool) {
        self.verified_draft = verified;
    }

    pub fn set_numeric(&mut self, draft: impl Into<String>) {
        self.numeric_draft = draft.into();
    }

    /// Switch sheet. Returns `false` (and changes nothing) for a blank name
    /// or the sheet already selected.
    pub fn choose_sheet(&mut self, sheet: &str) -> bool {
        if sheet.is_empty() || self.sheet.as_deref() == Some(sheet) {
            return false;
        }
        self.sheet = Some(sheet.to_string());
        self.key.clear();
        self.record = None;
        self.clear_drafts();
        true
    }

    /// Resolve `key` against the current sheet's cached rows.
    pub fn choose_key(&mut self, cache: &SheetCache, key: &str) -> Option<Notice> {
        self.key = key.to_string();
        if key.is_empty() {
            self.record = None;
            self.clear_drafts();
            return None;
        }
        let rows = self.rows(cache);
        self.apply(select(&rows, key))
    }

    /// Rows of the current sheet as cached right now.
    pub fn rows(&self, cache: &SheetCache) -> Arc<[Record]> {
        match &self.sheet {
            Some(sheet) => cache.rows(sheet),
            None => Arc::from(Vec::new()),
        }
    }

    pub fn selectable_keys(&self, cache: &SheetCache) -> Vec<String> {
        selectable_keys(&self.rows(cache))
    }

    /// Install a selection and reset the form fields.
    pub(crate) fn apply(&mut self, selection: Selection) -> Option<Notice> {
        let notice = selection.all_verified.then_some(Notice::AllVerified);
        self.record = selection.record;
        self.clear_drafts();
        notice
    }

    fn clear_drafts(&mut self) {
        self.verified_draft = false;
        self.numeric_draft.clear();
    }
}
