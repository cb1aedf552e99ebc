//! Scan normalization: raw scanner input → canonical product identity.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bodega_core::{PositionId, ProductId, SourceCode};

/// A position inside a source, with the label shown to warehouse staff.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub label: String,
}

impl Position {
    pub fn new(id: PositionId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }
}

/// Where scanning currently happens. Availability figures are scoped to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanContext {
    pub source: SourceCode,
    pub position: Position,
}

impl ScanContext {
    pub fn new(source: SourceCode, position: Position) -> Self {
        Self { source, position }
    }

    pub fn position_id(&self) -> PositionId {
        self.position.id
    }
}

/// A trimmed, non-empty scanned code (barcode or SKU).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanCode(String);

impl ScanCode {
    /// Returns `None` for blank input: blank submissions are ignored, not errors.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ScanCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolved product for one scan. Lives only for the duration of a scan call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub product_id: ProductId,
    pub sku: String,
    pub available_quantity: u32,
}

/// Failure reported by a lookup collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("backend error ({status}): {message}")]
    Backend { status: u16, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("unauthorized")]
    Unauthorized,
}

/// External product lookup, keyed by code + scanning context.
///
/// `Ok(None)` means the backend answered but the code matches no product.
#[async_trait]
pub trait ProductLookup: Send + Sync {
    async fn lookup(
        &self,
        code: &ScanCode,
        context: &ScanContext,
    ) -> Result<Option<ScanResult>, LookupError>;
}

/// Why a scan could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundReason {
    UnknownCode,
    NoStock,
    LookupFailed(String),
}

/// A scanned code that cannot be counted at the current position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {}", .reason.message())]
pub struct LookupNotFound {
    pub code: String,
    pub reason: NotFoundReason,
}

impl NotFoundReason {
    /// Message shown to the user.
    pub fn message(&self) -> String {
        match self {
            NotFoundReason::UnknownCode => "product not found".to_string(),
            NotFoundReason::NoStock => "no stock at position".to_string(),
            NotFoundReason::LookupFailed(detail) => format!("lookup failed: {detail}"),
        }
    }
}

impl LookupNotFound {
    pub fn new(code: &ScanCode, reason: NotFoundReason) -> Self {
        Self {
            code: code.as_str().to_string(),
            reason,
        }
    }
}

/// Map a collaborator answer to a countable scan.
///
/// Zero available quantity is treated like an unknown product: nothing can be
/// scanned in from an empty position.
pub fn classify(
    code: &ScanCode,
    answer: Result<Option<ScanResult>, LookupError>,
) -> Result<ScanResult, LookupNotFound> {
    match answer {
        Ok(Some(result)) if result.available_quantity == 0 => {
            Err(LookupNotFound::new(code, NotFoundReason::NoStock))
        }
        Ok(Some(result)) => Ok(result),
        Ok(None) => Err(LookupNotFound::new(code, NotFoundReason::UnknownCode)),
        Err(err) => Err(LookupNotFound::new(
            code,
            NotFoundReason::LookupFailed(err.to_string()),
        )),
    }
}

/// Look up an already-normalized code.
pub async fn lookup_code<L: ProductLookup + ?Sized>(
    lookup: &L,
    code: &ScanCode,
    context: &ScanContext,
) -> Result<ScanResult, LookupNotFound> {
    let answer = lookup.lookup(code, context).await;
    classify(code, answer)
}

/// Resolve raw scanner input against the given context.
///
/// Blank input yields `Ok(None)` without calling the collaborator.
pub async fn resolve<L: ProductLookup + ?Sized>(
    lookup: &L,
    raw: &str,
    context: &ScanContext,
) -> Result<Option<ScanResult>, LookupNotFound> {
    let Some(code) = ScanCode::parse(raw) else {
        return Ok(None);
    };
    lookup_code(lookup, &code, context).await.map(Some)
}
