use crate::cache::SheetCache;
use crate::client::SheetService;
use crate::error::VerifyError;
use crate::flag::{self, FlagSource, FlagState};
use crate::metrics::METRICS;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    /// The kill switch is off; nothing was loaded.
    Killed { message: String },
    Ready {
        /// Selectable sheets in document order.
        sheets: Vec<String>,
        /// Sheet to show first, if any.
        selected: Option<String>,
    },
}

/// Consult the kill switch, then fill the cache from the bulk fetch.
pub async fn start(
    flag_source: Option<&dyn FlagSource>,
    service: &dyn SheetService,
    cache: &SheetCache,
) -> Result<StartupOutcome, VerifyError> {
    match flag_source {
        Some(source) => {
            if let FlagState::Killed { message } = flag::check(source).await {
                METRICS.record_gate("killed");
                return Ok(StartupOutcome::Killed { message });
            }
            METRICS.record_gate("active");
        }
        None => METRICS.record_gate("skipped"),
    }

    let data = service.fetch_all().await.map_err(|error| {
        warn!(%error, category = %error.category(), "initial load failed");
        VerifyError::LoadFailed(error)
    })?;

    let sheets = cache.load(data);
    let selected = sheets.first().cloned();
    info!(
        sheets = sheets.len(),
        selected = selected.as_deref().unwrap_or(""),
        "sheet data loaded"
    );
    Ok(StartupOutcome::Ready { sheets, selected })
}
