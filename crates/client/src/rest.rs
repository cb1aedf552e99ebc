//! HTTP implementation of the lookup and persistence collaborators.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;

use bodega_core::RecordId;
use bodega_inventory::{
    BackendPayload, LookupError, MovementStore, ProductLookup, RemoteRecord, SaveMode,
    SaveReceipt, ScanCode, ScanContext, ScanResult, SubmissionError,
};

use crate::config::{ClientConfig, ClientError};
use crate::envelope::{self, Reply};
use crate::hooks::AuthHooks;

const LOOKUP_PATH: &str = "bodega/stock/lookup";
const MOVEMENTS_PATH: &str = "bodega/movements";
const HEALTH_PATH: &str = "bodega/health";

/// REST client for the commerce backend.
///
/// Cheap to share behind an `Arc`; the token can be swapped after a refresh.
pub struct RestBackend {
    http: reqwest::Client,
    config: ClientConfig,
    token: RwLock<Option<String>>,
    hooks: Arc<dyn AuthHooks>,
}

impl core::fmt::Debug for RestBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RestBackend")
            .field("base_url", &self.config.base_url)
            .field("store_code", &self.config.store_code)
            .finish_non_exhaustive()
    }
}

/// Failure of a raw request, before it is mapped to a collaborator error.
enum CallError {
    Transport(String),
    Unauthorized,
    Status { status: StatusCode, body: Value },
    Body(String),
}

impl RestBackend {
    pub fn new(config: ClientConfig, hooks: Arc<dyn AuthHooks>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;
        let token = RwLock::new(config.token.clone());
        Ok(Self {
            http,
            config,
            token,
            hooks,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Install a new bearer token (e.g. after the host refreshed the login).
    pub fn replace_token(&self, token: Option<String>) {
        match self.token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    fn current_token(&self) -> Option<String> {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match self.current_token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Check connectivity by hitting the health endpoint.
    pub async fn check_connectivity(&self) -> bool {
        let url = self.config.endpoint(HEALTH_PATH);
        match self.authorized(self.http.get(&url)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(err) => {
                tracing::debug!(%url, error = %err, "backend unreachable");
                false
            }
        }
    }

    /// Send a request and read its JSON body. Empty bodies read as `null`.
    async fn call(&self, req: RequestBuilder) -> Result<Value, CallError> {
        let resp = self
            .authorized(req)
            .send()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!("backend rejected credentials");
            self.hooks.on_unauthorized();
            return Err(CallError::Unauthorized);
        }

        let text = read_text(resp).await?;
        if !status.is_success() {
            // Error pages are often plain text or HTML; keep them as a message.
            let body = serde_json::from_str(&text)
                .unwrap_or_else(|_| Value::String(truncate(text.trim(), 200).to_string()));
            return Err(CallError::Status { status, body });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| CallError::Body(format!("{e}: {}", truncate(&text, 200))))
    }
}

async fn read_text(resp: Response) -> Result<String, CallError> {
    resp.text()
        .await
        .map_err(|e| CallError::Transport(e.to_string()))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn status_message(status: StatusCode, body: &Value) -> String {
    envelope::message_of(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string()
    })
}

#[async_trait]
impl ProductLookup for RestBackend {
    async fn lookup(
        &self,
        code: &ScanCode,
        context: &ScanContext,
    ) -> Result<Option<ScanResult>, LookupError> {
        let url = self.config.endpoint(LOOKUP_PATH);
        let position = context.position.id.to_string();
        let req = self.http.get(&url).query(&[
            ("code", code.as_str()),
            ("source", context.source.as_str()),
            ("position", position.as_str()),
        ]);

        match self.call(req).await {
            Ok(body) => envelope::parse_lookup(body).map_err(LookupError::InvalidResponse),
            Err(CallError::Status { status, .. }) if status == StatusCode::NOT_FOUND => Ok(None),
            Err(CallError::Status { status, body }) => Err(LookupError::Backend {
                status: status.as_u16(),
                message: status_message(status, &body),
            }),
            Err(CallError::Unauthorized) => Err(LookupError::Unauthorized),
            Err(CallError::Transport(msg)) => Err(LookupError::Transport(msg)),
            Err(CallError::Body(msg)) => Err(LookupError::InvalidResponse(msg)),
        }
    }
}

#[async_trait]
impl MovementStore for RestBackend {
    async fn load(&self, record_id: RecordId) -> Result<RemoteRecord, SubmissionError> {
        let url = self
            .config
            .endpoint(&format!("{MOVEMENTS_PATH}/{record_id}"));

        let body = match self.call(self.http.get(&url)).await {
            Ok(body) => body,
            Err(CallError::Status { status, .. }) if status == StatusCode::NOT_FOUND => {
                return Err(SubmissionError::NotFound(record_id));
            }
            Err(err) => return Err(submission_error(err)),
        };

        match envelope::normalize(body) {
            Reply::Data(data) => serde_json::from_value(data)
                .map_err(|e| SubmissionError::InvalidResponse(e.to_string())),
            Reply::Empty => Err(SubmissionError::NotFound(record_id)),
            Reply::Failure(message) => Err(SubmissionError::Rejected {
                status: StatusCode::OK.as_u16(),
                message,
            }),
        }
    }

    async fn save(
        &self,
        payload: &BackendPayload,
        mode: SaveMode,
    ) -> Result<SaveReceipt, SubmissionError> {
        let req = match payload.record_id {
            None => self.http.post(self.config.endpoint(MOVEMENTS_PATH)),
            Some(id) => self
                .http
                .put(self.config.endpoint(&format!("{MOVEMENTS_PATH}/{id}"))),
        };
        let req = req.json(&serde_json::json!({ "movement": payload }));

        tracing::debug!(
            record_id = ?payload.record_id,
            ?mode,
            items = payload.items.len(),
            "submitting movement"
        );

        let body = self.call(req).await.map_err(submission_error)?;
        match envelope::parse_receipt(body) {
            Ok(record_id) => Ok(SaveReceipt { record_id }),
            Err(Some(message)) => Err(SubmissionError::Rejected {
                status: StatusCode::OK.as_u16(),
                message,
            }),
            // Updates may answer without an id; the record we sent is the one saved.
            Err(None) => payload
                .record_id
                .map(|record_id| SaveReceipt { record_id })
                .ok_or_else(|| {
                    SubmissionError::InvalidResponse("save reply carried no record id".to_string())
                }),
        }
    }
}

fn submission_error(err: CallError) -> SubmissionError {
    match err {
        CallError::Transport(msg) => SubmissionError::Transport(msg),
        CallError::Unauthorized => SubmissionError::Unauthorized,
        CallError::Status { status, body } => SubmissionError::Rejected {
            status: status.as_u16(),
            message: status_message(status, &body),
        },
        CallError::Body(msg) => SubmissionError::InvalidResponse(msg),
    }
}
