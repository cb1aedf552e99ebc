//! Submission adapter: accumulated lines → backend movement payload.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bodega_core::{DomainError, DomainResult, PositionId, ProductId, RecordId, SessionId, SourceCode};

use crate::accumulator::AccumulatedLine;

/// Which stock-movement workflow a session belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Receiving stock into a source.
    Ingress,
    /// Dispatching stock out of a source.
    Egress,
    /// Moving stock between positions of one source.
    PositionTransfer,
    /// Moving stock between sources.
    SourceTransfer,
}

impl MovementKind {
    pub fn is_transfer(&self) -> bool {
        matches!(self, MovementKind::PositionTransfer | MovementKind::SourceTransfer)
    }
}

/// Target of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub source: SourceCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionId>,
}

/// Who/what a session saves against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub kind: MovementKind,
    /// Set once the remote record exists (after the first save, or on resume).
    pub record_id: Option<RecordId>,
    pub source: SourceCode,
    pub destination: Option<Destination>,
}

impl SessionContext {
    pub fn ingress(source: SourceCode) -> Self {
        Self::plain(MovementKind::Ingress, source)
    }

    pub fn egress(source: SourceCode) -> Self {
        Self::plain(MovementKind::Egress, source)
    }

    fn plain(kind: MovementKind, source: SourceCode) -> Self {
        Self {
            session_id: SessionId::new(),
            kind,
            record_id: None,
            source,
            destination: None,
        }
    }

    /// Build a transfer context. `kind` must be a transfer kind.
    pub fn transfer(
        kind: MovementKind,
        source: SourceCode,
        destination: Destination,
    ) -> DomainResult<Self> {
        let ctx = Self {
            session_id: SessionId::new(),
            kind,
            record_id: None,
            source,
            destination: Some(destination),
        };
        ctx.validate()?;
        Ok(ctx)
    }

    pub fn with_record(mut self, record_id: RecordId) -> Self {
        self.record_id = Some(record_id);
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        match (&self.kind, &self.destination) {
            (MovementKind::Ingress | MovementKind::Egress, Some(_)) => Err(
                DomainError::validation("only transfers carry a destination"),
            ),
            (kind, None) if kind.is_transfer() => {
                Err(DomainError::validation("transfer requires a destination"))
            }
            (MovementKind::PositionTransfer, Some(dest)) => {
                if dest.source != self.source {
                    return Err(DomainError::validation(
                        "position transfer must stay within its source",
                    ));
                }
                if dest.position.is_none() {
                    return Err(DomainError::validation(
                        "position transfer requires a destination position",
                    ));
                }
                Ok(())
            }
            (MovementKind::SourceTransfer, Some(dest)) if dest.source == self.source => Err(
                DomainError::validation("source transfer must target another source"),
            ),
            _ => Ok(()),
        }
    }
}

/// How far a save goes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    /// Persist lines; the record stays open for more scanning.
    Partial,
    /// Persist lines and close the record. Not reversible.
    Complete,
}

/// Remote record status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    InProgress,
    Complete,
}

impl From<SaveMode> for RecordStatus {
    fn from(mode: SaveMode) -> Self {
        match mode {
            SaveMode::Partial => RecordStatus::InProgress,
            SaveMode::Complete => RecordStatus::Complete,
        }
    }
}

/// One line as the backend expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadItem {
    pub product_id: ProductId,
    pub sku: String,
    pub quantity: u32,
    pub position_id: PositionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Body of a movement save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,
    pub kind: MovementKind,
    pub source_code: SourceCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Destination>,
    pub status: RecordStatus,
    pub submitted_at: DateTime<Utc>,
    pub items: Vec<PayloadItem>,
}

pub fn to_payload(
    lines: &[AccumulatedLine],
    context: &SessionContext,
    mode: SaveMode,
    submitted_at: DateTime<Utc>,
) -> BackendPayload {
    let items = lines
        .iter()
        .map(|line| {
            let note = line.note().trim();
            PayloadItem {
                product_id: line.product_id(),
                sku: line.sku().to_string(),
                quantity: line.scanned_quantity(),
                position_id: line.position_id(),
                note: (!note.is_empty()).then(|| note.to_string()),
            }
        })
        .collect();

    BackendPayload {
        record_id: context.record_id,
        kind: context.kind,
        source_code: context.source.clone(),
        destination: context.destination.clone(),
        status: mode.into(),
        submitted_at,
        items,
    }
}

/// A line of a previously saved record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLine {
    pub product_id: ProductId,
    pub sku: String,
    pub position_id: PositionId,
    #[serde(default)]
    pub position_label: String,
    pub quantity: u32,
    #[serde(default)]
    pub available_quantity: u32,
    #[serde(default)]
    pub note: Option<String>,
}

/// A remote ingress/egress/transfer record, used to resume a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub record_id: RecordId,
    pub kind: MovementKind,
    pub source_code: SourceCode,
    #[serde(default)]
    pub destination: Option<Destination>,
    pub status: RecordStatus,
    #[serde(default)]
    pub lines: Vec<RemoteLine>,
}

/// Backend acknowledgement of a save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReceipt {
    pub record_id: RecordId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("backend rejected save ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("record not found: {0}")]
    NotFound(RecordId),
}

/// Persistence collaborator for movement records.
#[async_trait]
pub trait MovementStore: Send + Sync {
    /// Fetch a record to resume scanning against it.
    async fn load(&self, record_id: RecordId) -> Result<RemoteRecord, SubmissionError>;

    /// Create (no `record_id`) or update a record.
    async fn save(
        &self,
        payload: &BackendPayload,
        mode: SaveMode,
    ) -> Result<SaveReceipt, SubmissionError>;
}
