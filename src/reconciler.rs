//! Save path for a verification.
//!
//! The remote store is shared by many operators, so the row a client asks to
//! update may already have been claimed. The service then writes to the next
//! free row and says so; the identifiers in its answer are the truth and
//! are what gets merged into the cache.

use crate::cache::SheetCache;
use crate::client::SheetService;
use crate::error::{ErrorCategory, ServiceError, ValidationError, VerifyError};
use crate::metrics::METRICS;
use crate::model::{Record, RecordPatch, UpdateRowRequest};
use crate::notice::{NO_LABEL, Notice};
use crate::refresher::BackgroundRefresher;
use crate::selector::{Selection, select};
use crate::session::Session;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

/// A validated save, detached from the session it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub sheet: String,
    pub candidate: Record,
    /// Key to resolve again once the save is merged.
    pub key: String,
    pub verified: bool,
    pub number: Option<f64>,
}

impl SaveRequest {
    pub fn new(
        sheet: &str,
        candidate: &Record,
        verified: bool,
        numeric_draft: &str,
    ) -> Result<Self, ValidationError> {
        if sheet.is_empty() {
            return Err(ValidationError::NoRecordSelected);
        }
        if !verified {
            return Err(ValidationError::VerificationNotEnabled);
        }
        Ok(Self {
            sheet: sheet.to_string(),
            candidate: candidate.clone(),
            key: candidate.key().to_string(),
            verified,
            number: parse_numeric_draft(numeric_draft)?,
        })
    }

    pub fn from_session(session: &Session) -> Result<Self, ValidationError> {
        let (Some(sheet), Some(record)) = (session.sheet(), session.record()) else {
            return Err(ValidationError::NoRecordSelected);
        };
        let mut request = Self::new(sheet, record, session.verified_draft(), session.numeric_draft())?;
        if !session.key().trim().is_empty() {
            request.key = session.key().to_string();
        }
        Ok(request)
    }
}

/// Blank means "no value"; anything else must be a finite number.
pub fn parse_numeric_draft(draft: &str) -> Result<Option<f64>, ValidationError> {
    let trimmed = draft.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(Some(n)),
        _ => Err(ValidationError::InvalidNumber {
            input: draft.to_string(),
        }),
    }
}

/// What a confirmed save changed.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    /// Row the service actually wrote.
    pub row_index: u64,
    pub batch_label: String,
    pub was_reassigned: bool,
    /// Next candidate for the same key, resolved on the merged rows.
    pub next: Selection,
}

impl SaveOutcome {
    pub fn displayed_label(&self) -> &str {
        if self.batch_label.trim().is_empty() {
            NO_LABEL
        } else {
            &self.batch_label
        }
    }

    pub fn notice(&self) -> Notice {
        let label = self.batch_label.clone();
        if self.was_reassigned {
            Notice::Reassigned { label }
        } else {
            Notice::Saved { label }
        }
    }
}

/// Clears the saving flag when dropped, whatever path the save took.
struct SavingGuard<'a>(&'a AtomicBool);

impl<'a> SavingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, VerifyError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| VerifyError::SaveInProgress)
    }
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct UpdateReconciler {
    service: Arc<dyn SheetService>,
    cache: Arc<SheetCache>,
    refresher: BackgroundRefresher,
    saving: AtomicBool,
}

impl UpdateReconciler {
    pub fn new(
        service: Arc<dyn SheetService>,
        cache: Arc<SheetCache>,
        refresher: BackgroundRefresher,
    ) -> Self {
        Self {
            service,
            cache,
            refresher,
            saving: AtomicBool::new(false),
        }
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire)
    }

    pub fn refresher(&self) -> &BackgroundRefresher {
        &self.refresher
    }

    /// Save the session's candidate and advance the session to the next one.
    ///
    /// The session holds the merged state before the saving flag drops, so
    /// a caller that re-enables its controls on return never shows a stale
    /// row.
    pub async fn submit(&self, session: &mut Session) -> Result<SaveOutcome, VerifyError> {
        let request = SaveRequest::from_session(session).inspect_err(|e| {
            METRICS.record_save_rejected(ErrorCategory::Validation.as_str());
            warn!(error = %e, "save refused");
        })?;
        let _guard = self.acquire()?;

        let outcome = self.save(&request).await?;
        session.apply(outcome.next.clone());
        Ok(outcome)
    }

    /// Save a record outside of any session.
    pub async fn submit_record(
        &self,
        sheet: &str,
        candidate: &Record,
        verified: bool,
        numeric_draft: &str,
    ) -> Result<SaveOutcome, VerifyError> {
        let request = SaveRequest::new(sheet, candidate, verified, numeric_draft).inspect_err(|e| {
            METRICS.record_save_rejected(ErrorCategory::Validation.as_str());
            warn!(error = %e, "save refused");
        })?;
        let _guard = self.acquire()?;
        self.save(&request).await
    }

    fn acquire(&self) -> Result<SavingGuard<'_>, VerifyError> {
        SavingGuard::acquire(&self.saving).inspect_err(|_| {
            METRICS.record_save_rejected(ErrorCategory::Busy.as_str());
            warn!("save refused: another save is in flight");
        })
    }

    async fn save(&self, request: &SaveRequest) -> Result<SaveOutcome, VerifyError> {
        let span = info_span!(
            "save",
            save_id = %Uuid::new_v4(),
            sheet = %request.sheet,
            row_index = request.candidate.row_index,
        );
        self.save_inner(request).instrument(span).await
    }

    async fn save_inner(&self, request: &SaveRequest) -> Result<SaveOutcome, VerifyError> {
        let started = Instant::now();
        let update = UpdateRowRequest {
            sheet_name: request.sheet.clone(),
            row_index: request.candidate.row_index,
            is_verified: request.verified,
            number_value: request.number,
        };

        let response = match self.service.update_row(&update).await {
            Ok(response) if response.updated => response,
            Ok(_) => return Err(self.fail(ServiceError::UpdateRejected, started)),
            Err(error) => return Err(self.fail(error, started)),
        };

        let row_index = response.row_index.unwrap_or(request.candidate.row_index);
        let batch_label = response
            .batch_label
            .filter(|label| !label.trim().is_empty())
            .unwrap_or_else(|| request.candidate.batch_label.clone());
        let moved = row_index != request.candidate.row_index;
        if moved && !response.was_reassigned {
            warn!(
                written = row_index,
                "service wrote a different row without flagging a reassignment"
            );
        }
        let was_reassigned = response.was_reassigned || moved;

        let patch = RecordPatch {
            is_verified: request.verified,
            batch_label: batch_label.clone(),
        };
        let rows = match self.cache.merge_row(&request.sheet, row_index, &patch) {
            Some(merged) => merged.rows,
            None => {
                warn!(written = row_index, "written row is not cached; waiting for refresh");
                self.cache.rows(&request.sheet)
            }
        };
        let next = select(&rows, &request.key);

        METRICS.record_save(was_reassigned, started.elapsed());
        info!(
            written = row_index,
            batch_label = %batch_label,
            was_reassigned,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "save confirmed"
        );

        self.refresher.schedule(&request.sheet);

        Ok(SaveOutcome {
            row_index,
            batch_label,
            was_reassigned,
            next,
        })
    }

    fn fail(&self, error: ServiceError, started: Instant) -> VerifyError {
        METRICS.record_save_failure(error.category().as_str(), started.elapsed());
        warn!(%error, category = %error.category(), "save failed");
        VerifyError::SaveFailed(error)
    }
}
