//! Remote sheet service.
//!
//! The backend is a script endpoint that takes every call as a single POST
//! with a JSON body `{"action": ..., ...payload}` (sent as `text/plain`) and
//! answers with an envelope `{"success": bool, "data": ..., "error": ...}`.

use crate::error::{ProtocolError, ServiceError};
use crate::model::{InitialData, Record, SheetNames, UpdateRowRequest, UpdateRowResponse};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::time::Duration;
use strum::{Display, IntoStaticStr};
use tracing::{debug, warn};

/// Operations the verification workflow needs from the remote store.
#[async_trait]
pub trait SheetService: Send + Sync {
    async fn list_sheet_names(&self) -> Result<Vec<String>, ServiceError>;

    /// Every sheet with all of its rows.
    async fn fetch_all(&self) -> Result<InitialData, ServiceError>;

    async fn fetch_sheet(&self, sheet: &str) -> Result<Vec<Record>, ServiceError>;

    /// Mark a row. The answer names the row actually written, which may not
    /// be the one requested.
    async fn update_row(&self, request: &UpdateRowRequest)
    -> Result<UpdateRowResponse, ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub enum Action {
    GetSheets,
    GetInitialData,
    GetSheetData,
    UpdateRow,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP implementation of [`SheetService`].
#[derive(Clone)]
pub struct HttpSheetService {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpSheetService {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, user_agent: &str) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        Ok(Self::with_client(http, endpoint))
    }

    pub fn with_client(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<T: DeserializeOwned>(&self, action: Action, payload: Value) -> Result<T, ServiceError> {
        let body = request_body(action, payload);
        debug!(action = %action, endpoint = %self.endpoint, "calling sheet service");

        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "text/plain")
            .body(body.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(action = %action, status = status.as_u16(), "sheet service returned an error status");
            return Err(ServiceError::Status(status.as_u16()));
        }

        let text = response.text().await?;
        decode_envelope(action, &text)
    }
}

fn request_body(action: Action, payload: Value) -> Value {
    let mut body = match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("payload".to_string(), other);
            map
        }
    };
    let name: &'static str = action.into();
    body.insert("action".to_string(), Value::String(name.to_string()));
    Value::Object(body)
}

/// Unwrap the service envelope and decode its `data`.
pub fn decode_envelope<T: DeserializeOwned>(action: Action, text: &str) -> Result<T, ServiceError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(|error| {
        warn!(action = %action, %error, body_len = text.len(), "sheet service body is not JSON");
        if text.contains("html") {
            ProtocolError::NotDeployed
        } else {
            ProtocolError::InvalidBody
        }
    })?;

    if !envelope.success {
        let message = envelope
            .error
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| "server error".to_string());
        return Err(ServiceError::Application(message));
    }

    serde_json::from_value(envelope.data)
        .map_err(|e| ServiceError::Protocol(ProtocolError::Decode(e.to_string())))
}

#[async_trait]
impl SheetService for HttpSheetService {
    async fn list_sheet_names(&self) -> Result<Vec<String>, ServiceError> {
        let names: SheetNames = self.call(Action::GetSheets, Value::Null).await?;
        Ok(names.sheet_names)
    }

    async fn fetch_all(&self) -> Result<InitialData, ServiceError> {
        self.call(Action::GetInitialData, Value::Null).await
    }

    async fn fetch_sheet(&self, sheet: &str) -> Result<Vec<Record>, ServiceError> {
        let rows: Option<Vec<Record>> = self
            .call(Action::GetSheetData, json!({ "sheetName": sheet }))
            .await?;
        Ok(rows.unwrap_or_default())
    }

    async fn update_row(
        &self,
        request: &UpdateRowRequest,
    ) -> Result<UpdateRowResponse, ServiceError> {
        let payload = serde_json::to_value(request)
            .map_err(|e| ServiceError::Protocol(ProtocolError::Decode(e.to_string())))?;
        // A null `data` means the service did not confirm anything.
        let response: Option<UpdateRowResponse> = self.call(Action::UpdateRow, payload).await?;
        Ok(response.unwrap_or_default())
    }
}
