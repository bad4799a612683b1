use crate::cache::SheetCache;
use crate::client::SheetService;
use crate::metrics::METRICS;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, info_span, warn};

/// Post-save refresh of a whole sheet, detached from the caller.
///
/// A refresh that lands overwrites the sheet's cached rows even if the
/// operator has moved on to another sheet; failures are logged and dropped.
#[derive(Clone)]
pub struct BackgroundRefresher {
    service: Arc<dyn SheetService>,
    cache: Arc<SheetCache>,
    tracker: TaskTracker,
}

impl BackgroundRefresher {
    pub fn new(service: Arc<dyn SheetService>, cache: Arc<SheetCache>) -> Self {
        Self {
            service,
            cache,
            tracker: TaskTracker::new(),
        }
    }

    /// Start a refresh of `sheet`. Must be called from within a tokio runtime.
    pub fn schedule(&self, sheet: &str) {
        let service = self.service.clone();
        let cache = self.cache.clone();
        let sheet = sheet.to_string();
        let span = info_span!("background_refresh", sheet = %sheet);

        self.tracker.spawn(
            async move {
                match service.fetch_sheet(&sheet).await {
                    Ok(rows) => {
                        debug!(rows = rows.len(), "refresh landed");
                        cache.set_rows(&sheet, rows);
                        METRICS.record_refresh(true);
                    }
                    Err(error) => {
                        warn!(%error, category = %error.category(), "background refresh failed");
                        METRICS.record_refresh(false);
                    }
                }
            }
            .instrument(span),
        );
    }

    /// Refreshes started and not yet finished.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every refresh started so far.
    pub async fn settle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
