pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod flag;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod notice;
pub mod reconciler;
pub mod refresher;
pub mod selector;
pub mod session;
pub mod startup;

pub use cache::{CacheStats, MergedRow, SheetCache, SheetSummary};
pub use client::{HttpSheetService, SheetService};
pub use config::{CliArgs, VerifierConfig};
pub use error::{ErrorCategory, ProtocolError, ServiceError, ValidationError, VerifyError};
pub use flag::{FlagSource, FlagState, HttpFlagSource};
pub use logging::{LoggingConfig, init_logging};
pub use model::{Record, RecordPatch};
pub use notice::Notice;
pub use reconciler::{SaveOutcome, SaveRequest, UpdateReconciler};
pub use refresher::BackgroundRefresher;
pub use selector::{Selection, select, selectable_keys};
pub use session::Session;
pub use startup::StartupOutcome;

use std::sync::Arc;
use tracing::info;

/// Shared cache plus the remote collaborators, wired around one save path.
pub struct Verifier {
    cache: Arc<SheetCache>,
    service: Arc<dyn SheetService>,
    flag: Option<Arc<dyn FlagSource>>,
    reconciler: UpdateReconciler,
}

impl Verifier {
    pub fn new(service: Arc<dyn SheetService>, flag: Option<Arc<dyn FlagSource>>) -> Self {
        let cache = Arc::new(SheetCache::new());
        let refresher = BackgroundRefresher::new(service.clone(), cache.clone());
        let reconciler = UpdateReconciler::new(service.clone(), cache.clone(), refresher);
        Self {
            cache,
            service,
            flag,
            reconciler,
        }
    }

    pub fn from_config(config: &VerifierConfig) -> anyhow::Result<Self> {
        let service = HttpSheetService::new(
            config.api_url.clone(),
            config.request_timeout,
            &config.user_agent,
        )?;
        let flag = config
            .flag_url
            .as_deref()
            .map(|url| HttpFlagSource::new(url, config.request_timeout, &config.user_agent))
            .transpose()?
            .map(|source| Arc::new(source) as Arc<dyn FlagSource>);

        info!(
            api_url = %config.api_url,
            kill_switch = flag.is_some(),
            "verifier configured"
        );
        Ok(Self::new(Arc::new(service), flag))
    }

    pub fn cache(&self) -> &Arc<SheetCache> {
        &self.cache
    }

    pub fn reconciler(&self) -> &UpdateReconciler {
        &self.reconciler
    }

    /// Run the startup gate and bulk load, selecting the first sheet.
    pub async fn start(&self, session: &mut Session) -> Result<StartupOutcome, VerifyError> {
        let outcome = startup::start(self.flag.as_deref(), self.service.as_ref(), &self.cache).await?;
        if let StartupOutcome::Ready {
            selected: Some(sheet),
            ..
        } = &outcome
        {
            session.choose_sheet(sheet);
        }
        Ok(outcome)
    }

    pub async fn save(&self, session: &mut Session) -> Result<SaveOutcome, VerifyError> {
        self.reconciler.submit(session).await
    }

    /// Wait for background refreshes still in flight.
    pub async fn shutdown(&self) {
        self.reconciler.refresher().settle().await;
    }
}
