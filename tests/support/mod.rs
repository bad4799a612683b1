#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use sheet_verifier::model::{InitialData, Record, UpdateRowRequest, UpdateRowResponse};
use sheet_verifier::{FlagSource, ServiceError, SheetService};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Scriptable in-memory stand-in for the remote sheet service.
#[derive(Default)]
pub struct FakeSheetService {
    pub initial: Mutex<Option<Result<InitialData, ServiceError>>>,
    pub sheets: Mutex<HashMap<String, Vec<Record>>>,
    pub fetch_error: Mutex<Option<ServiceError>>,
    /// Answers handed out in order; the last one repeats.
    pub update_responses: Mutex<VecDeque<Result<UpdateRowResponse, ServiceError>>>,
    pub update_requests: Mutex<Vec<UpdateRowRequest>>,
    pub update_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub fetch_all_calls: AtomicUsize,
    /// When set, `update_row` parks until notified.
    pub update_gate: Option<Arc<Notify>>,
    /// Signalled once an update call has started.
    pub update_started: Arc<Notify>,
    pub fetch_delay: Option<Duration>,
}

impl FakeSheetService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial(self, data: InitialData) -> Self {
        *self.initial.lock() = Some(Ok(data));
        self
    }

    pub fn with_sheet(self, name: &str, rows: Vec<Record>) -> Self {
        self.sheets.lock().insert(name.to_string(), rows);
        self
    }

    pub fn with_update(self, response: Result<UpdateRowResponse, ServiceError>) -> Self {
        self.update_responses.lock().push_back(response);
        self
    }

    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.update_gate = Some(gate);
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn updates(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn last_update(&self) -> Option<UpdateRowRequest> {
        self.update_requests.lock().last().cloned()
    }
}

#[async_trait]
impl SheetService for FakeSheetService {
    async fn list_sheet_names(&self) -> Result<Vec<String>, ServiceError> {
        match self.initial.lock().as_ref() {
            Some(Ok(data)) => Ok(data.sheet_names.clone()),
            Some(Err(error)) => Err(error.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_all(&self) -> Result<InitialData, ServiceError> {
        self.fetch_all_calls.fetch_add(1, Ordering::SeqCst);
        self.initial
            .lock()
            .clone()
            .unwrap_or_else(|| Ok(InitialData::default()))
    }

    async fn fetch_sheet(&self, sheet: &str) -> Result<Vec<Record>, ServiceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.fetch_error.lock().clone() {
            return Err(error);
        }
        Ok(self.sheets.lock().get(sheet).cloned().unwrap_or_default())
    }

    async fn update_row(
        &self,
        request: &UpdateRowRequest,
    ) -> Result<UpdateRowResponse, ServiceError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.update_requests.lock().push(request.clone());
        self.update_started.notify_one();

        if let Some(gate) = &self.update_gate {
            gate.notified().await;
        }

        let mut responses = self.update_responses.lock();
        let response = if responses.len() > 1 {
            responses.pop_front()
        } else {
            responses.front().cloned()
        };
        response.unwrap_or_else(|| {
            Ok(UpdateRowResponse {
                updated: true,
                row_index: Some(request.row_index),
                batch_label: None,
                was_reassigned: false,
            })
        })
    }
}

pub enum FakeFlag {
    Body(String),
    Fails,
}

pub struct FakeFlagSource {
    pub answer: FakeFlag,
    pub calls: AtomicUsize,
}

impl FakeFlagSource {
    pub fn body(body: &str) -> Self {
        Self {
            answer: FakeFlag::Body(body.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: FakeFlag::Fails,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl FlagSource for FakeFlagSource {
    async fn fetch(&self) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.answer {
            FakeFlag::Body(body) => Ok(body.clone()),
            FakeFlag::Fails => Err(ServiceError::Transport("connection refused".into())),
        }
    }
}

/// Cover sheet plus two data sheets.
pub fn document() -> InitialData {
    let mut sheets_data = HashMap::new();
    sheets_data.insert("Index".to_string(), vec![Record::new(1, "cover", "")]);
    sheets_data.insert("North".to_string(), north_rows());
    sheets_data.insert(
        "South".to_string(),
        vec![Record::new(2, "S-1", "L1"), Record::new(3, "S-1", "L1")],
    );
    InitialData {
        sheet_names: vec!["Index".into(), "North".into(), "South".into()],
        sheets_data,
    }
}

pub fn north_rows() -> Vec<Record> {
    vec![
        Record::new(2, "K-1", "B1").verified(),
        Record::new(5, "K-1", "B1"),
        Record::new(9, "K-1", "B1"),
        Record::new(11, "K-2", "B1"),
        Record::new(12, "", "B1"),
    ]
}
