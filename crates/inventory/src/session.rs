//! One user's ingress/egress/transfer screen, from open to save/complete.
//!
//! The session owns its accumulator exclusively. Scans are processed one at a
//! time: `begin_scan` raises a busy flag that stays up until the lookup result
//! is handed back through `finish_scan`, so rapid scanner input cannot
//! interleave two read-modify-writes of the same line.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use bodega_core::{DomainError, SessionId};

use crate::accumulator::{Accumulator, AccumulatedLine, ApplyOutcome, LineKey};
use crate::feedback::{FeedbackEmitter, FeedbackSink, Severity};
use crate::reconcile::{Summary, summarize};
use crate::scan::{self, LookupNotFound, ProductLookup, ScanCode, ScanContext, ScanResult};
use crate::submission::{
    MovementStore, RecordStatus, RemoteRecord, SaveMode, SaveReceipt, SessionContext,
    SubmissionError, to_payload,
};

/// Per-session options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub sound_enabled: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            sound_enabled: true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    Open,
    /// The remote record was closed; scanning and editing are disabled.
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("a scan is already in progress")]
    Busy,
    #[error("session is completed")]
    Completed,
    #[error("no line for product {} at position {}", .0.product_id, .0.position_id)]
    LineNotFound(LineKey),
    #[error("nothing scanned yet")]
    Empty,
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error("save failed: {0}")]
    Submission(#[from] SubmissionError),
}

/// What a single scan attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Blank input.
    Ignored,
    Applied(ApplyOutcome),
    NotFound(LookupNotFound),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub outcome: ScanOutcome,
    /// The affected line after the scan, if any.
    pub line: Option<AccumulatedLine>,
}

impl ScanReport {
    fn ignored() -> Self {
        Self {
            outcome: ScanOutcome::Ignored,
            line: None,
        }
    }
}

/// A scan whose lookup is in flight. Hand it back to the session that issued it.
#[derive(Debug)]
#[must_use = "a pending scan keeps the session busy until finished or abandoned"]
pub struct PendingScan {
    code: ScanCode,
    context: ScanContext,
}

impl PendingScan {
    pub fn code(&self) -> &ScanCode {
        &self.code
    }

    pub fn context(&self) -> &ScanContext {
        &self.context
    }

    /// Run the lookup for this scan.
    pub async fn resolve<L: ProductLookup + ?Sized>(
        &self,
        lookup: &L,
    ) -> Result<ScanResult, LookupNotFound> {
        scan::lookup_code(lookup, &self.code, &self.context).await
    }
}

/// Result of asking to switch scanning context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextChange {
    Applied,
    /// Lines would be discarded; confirm with the user first.
    NeedsConfirmation(PendingContextChange),
}

/// A context switch awaiting the user's go-ahead.
///
/// Only valid while the session still has the scan context and line set it
/// was computed against.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct PendingContextChange {
    origin: ScanContext,
    target: ScanContext,
    discarded: Vec<LineKey>,
}

impl PendingContextChange {
    pub fn target(&self) -> &ScanContext {
        &self.target
    }

    pub fn discarded_lines(&self) -> usize {
        self.discarded.len()
    }

    /// Lines the user is asked to give up.
    pub fn discarded(&self) -> &[LineKey] {
        &self.discarded
    }
}

#[derive(Debug)]
pub struct ScanSession {
    context: SessionContext,
    scan_context: ScanContext,
    accumulator: Accumulator,
    feedback: FeedbackEmitter,
    state: SessionState,
    busy: bool,
}

impl ScanSession {
    pub fn new(
        context: SessionContext,
        scan_context: ScanContext,
        sink: Arc<dyn FeedbackSink>,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        context.validate()?;
        ensure_same_source(&context, &scan_context)?;
        tracing::info!(
            session_id = %context.session_id,
            kind = ?context.kind,
            source = %context.source,
            position = %scan_context.position.label,
            "scan session opened"
        );
        Ok(Self {
            context,
            scan_context,
            accumulator: Accumulator::new(),
            feedback: FeedbackEmitter::new(sink, options.sound_enabled),
            state: SessionState::Open,
            busy: false,
        })
    }

    /// Resume a partially saved remote record.
    ///
    /// A record that is already complete yields a read-only session.
    pub fn resume(
        record: RemoteRecord,
        scan_context: ScanContext,
        sink: Arc<dyn FeedbackSink>,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let context = SessionContext {
            session_id: SessionId::new(),
            kind: record.kind,
            record_id: Some(record.record_id),
            source: record.source_code,
            destination: record.destination,
        };
        context.validate()?;
        ensure_same_source(&context, &scan_context)?;

        let total = record.lines.len();
        let lines: Vec<AccumulatedLine> = record
            .lines
            .into_iter()
            .filter_map(|remote| {
                let label = if remote.position_label.is_empty() {
                    remote.position_id.to_string()
                } else {
                    remote.position_label
                };
                let restored = AccumulatedLine::restore(
                    remote.product_id,
                    scan::Position::new(remote.position_id, label),
                    remote.sku.clone(),
                    remote.quantity,
                    remote.available_quantity,
                    remote.note.unwrap_or_default(),
                );
                if restored.is_none() {
                    tracing::warn!(
                        record_id = %record.record_id,
                        sku = %remote.sku,
                        "skipping saved line with zero quantity"
                    );
                }
                restored
            })
            .collect();

        let state = match record.status {
            RecordStatus::InProgress => SessionState::Open,
            RecordStatus::Complete => SessionState::Completed,
        };

        tracing::info!(
            session_id = %context.session_id,
            record_id = %record.record_id,
            imported = lines.len(),
            skipped = total - lines.len(),
            ?state,
            "scan session resumed"
        );

        Ok(Self {
            context,
            scan_context,
            accumulator: Accumulator::from_lines(lines),
            feedback: FeedbackEmitter::new(sink, options.sound_enabled),
            state,
            busy: false,
        })
    }

    /// Load `record_id` from the store and resume it.
    pub async fn load<S: MovementStore + ?Sized>(
        store: &S,
        record_id: bodega_core::RecordId,
        scan_context: ScanContext,
        sink: Arc<dyn FeedbackSink>,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let record = store.load(record_id).await?;
        Self::resume(record, scan_context, sink, options)
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn scan_context(&self) -> &ScanContext {
        &self.scan_context
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Whether scanning/editing controls should be enabled.
    pub fn is_editable(&self) -> bool {
        self.state == SessionState::Open
    }

    pub fn lines(&self) -> &[AccumulatedLine] {
        self.accumulator.lines()
    }

    pub fn line(&self, key: LineKey) -> Option<&AccumulatedLine> {
        self.accumulator.get(key)
    }

    pub fn summary(&self) -> Summary {
        summarize(self.accumulator.lines())
    }

    pub fn sound_enabled(&self) -> bool {
        self.feedback.sound_enabled()
    }

    pub fn set_sound_enabled(&mut self, enabled: bool) {
        self.feedback.set_sound_enabled(enabled);
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Open => Ok(()),
            SessionState::Completed => Err(SessionError::Completed),
        }
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.busy {
            return Err(SessionError::Busy);
        }
        Ok(())
    }

    /// Start processing raw scanner input.
    ///
    /// Returns `Ok(None)` for blank input without touching the busy flag.
    pub fn begin_scan(&mut self, raw: &str) -> Result<Option<PendingScan>, SessionError> {
        self.ensure_open()?;
        self.ensure_idle()?;
        let Some(code) = ScanCode::parse(raw) else {
            return Ok(None);
        };
        self.busy = true;
        Ok(Some(PendingScan {
            code,
            context: self.scan_context.clone(),
        }))
    }

    /// Apply a resolved scan, emit feedback and clear the busy flag.
    pub fn finish_scan(
        &mut self,
        pending: PendingScan,
        resolved: Result<ScanResult, LookupNotFound>,
    ) -> ScanReport {
        self.busy = false;
        let session_id = self.context.session_id;

        let report = match resolved {
            Ok(result) => {
                let outcome = self.accumulator.apply(&result, &pending.context.position);
                let key = LineKey::new(result.product_id, pending.context.position.id);
                let line = self.accumulator.get(key).cloned();
                match outcome {
                    ApplyOutcome::Capped => tracing::info!(
                        %session_id,
                        code = %pending.code,
                        product_id = %result.product_id,
                        position = %pending.context.position.label,
                        available = result.available_quantity,
                        "scan capped at available stock"
                    ),
                    _ => tracing::debug!(
                        %session_id,
                        code = %pending.code,
                        product_id = %result.product_id,
                        position = %pending.context.position.label,
                        ?outcome,
                        "scan applied"
                    ),
                }
                ScanReport {
                    outcome: ScanOutcome::Applied(outcome),
                    line,
                }
            }
            Err(err) => {
                tracing::info!(
                    %session_id,
                    code = %pending.code,
                    position = %pending.context.position.label,
                    reason = %err.reason.message(),
                    "scan not found"
                );
                ScanReport {
                    outcome: ScanOutcome::NotFound(err),
                    line: None,
                }
            }
        };

        self.feedback.emit(&report.outcome);
        report
    }

    /// Drop an in-flight scan without applying anything.
    pub fn abandon_scan(&mut self, pending: PendingScan) {
        tracing::debug!(code = %pending.code, "scan abandoned");
        self.busy = false;
    }

    /// Resolve and apply one scan end to end.
    pub async fn scan<L: ProductLookup + ?Sized>(
        &mut self,
        raw: &str,
        lookup: &L,
    ) -> Result<ScanReport, SessionError> {
        let Some(pending) = self.begin_scan(raw)? else {
            return Ok(ScanReport::ignored());
        };
        let resolved = pending.resolve(lookup).await;
        Ok(self.finish_scan(pending, resolved))
    }

    pub fn increment(&mut self, key: LineKey) -> Result<u32, SessionError> {
        self.ensure_open()?;
        self.accumulator
            .increment(key)
            .ok_or(SessionError::LineNotFound(key))
    }

    pub fn decrement(&mut self, key: LineKey) -> Result<u32, SessionError> {
        self.ensure_open()?;
        self.accumulator
            .decrement(key)
            .ok_or(SessionError::LineNotFound(key))
    }

    pub fn set_quantity(&mut self, key: LineKey, quantity: u32) -> Result<u32, SessionError> {
        self.ensure_open()?;
        self.accumulator
            .set_quantity(key, quantity)
            .ok_or(SessionError::LineNotFound(key))
    }

    pub fn set_note(&mut self, key: LineKey, note: impl Into<String>) -> Result<(), SessionError> {
        self.ensure_open()?;
        if self.accumulator.set_note(key, note) {
            Ok(())
        } else {
            Err(SessionError::LineNotFound(key))
        }
    }

    pub fn remove(&mut self, key: LineKey) -> Result<AccumulatedLine, SessionError> {
        self.ensure_open()?;
        self.accumulator
            .remove(key)
            .ok_or(SessionError::LineNotFound(key))
    }

    /// Lines that switching to `target` would invalidate.
    ///
    /// A different source invalidates everything; a different position in the
    /// same source invalidates the lines counted at the current position.
    fn affected_by(&self, target: &ScanContext) -> Vec<LineKey> {
        if target.source != self.scan_context.source {
            self.accumulator.lines().iter().map(AccumulatedLine::key).collect()
        } else if target.position.id != self.scan_context.position.id {
            self.accumulator.keys_at(self.scan_context.position.id)
        } else {
            Vec::new()
        }
    }

    /// The session context after switching to `target`, if the source moves.
    ///
    /// A saved record stays bound to the source it was created for.
    fn rebased_context(
        &self,
        target: &ScanContext,
    ) -> Result<Option<SessionContext>, SessionError> {
        if target.source == self.context.source {
            return Ok(None);
        }
        if let Some(record_id) = self.context.record_id {
            return Err(DomainError::conflict(format!(
                "record {record_id} belongs to source {}",
                self.context.source
            ))
            .into());
        }
        let mut next = self.context.clone();
        next.source = target.source.clone();
        next.validate()?;
        Ok(Some(next))
    }

    fn switch_to(&mut self, target: ScanContext, next: Option<SessionContext>) {
        if let Some(next) = next {
            self.context = next;
        }
        self.scan_context = target;
    }

    /// Ask to switch source/position. Discarding lines needs a confirmation.
    pub fn request_context_change(
        &mut self,
        target: ScanContext,
    ) -> Result<ContextChange, SessionError> {
        self.ensure_open()?;
        self.ensure_idle()?;
        let next = self.rebased_context(&target)?;
        let discarded = self.affected_by(&target);
        if discarded.is_empty() {
            self.switch_to(target, next);
            return Ok(ContextChange::Applied);
        }
        Ok(ContextChange::NeedsConfirmation(PendingContextChange {
            origin: self.scan_context.clone(),
            target,
            discarded,
        }))
    }

    /// Apply a confirmed context change. Returns the number of lines discarded.
    ///
    /// Fails with a conflict when the scan context or the affected lines moved
    /// on since the change was requested; ask again in that case.
    pub fn confirm_context_change(
        &mut self,
        pending: PendingContextChange,
    ) -> Result<usize, SessionError> {
        self.ensure_open()?;
        self.ensure_idle()?;
        let stale = pending.origin != self.scan_context
            || self.affected_by(&pending.target) != pending.discarded;
        if stale {
            tracing::warn!(
                session_id = %self.context.session_id,
                requested_from = %pending.origin.position.label,
                current = %self.scan_context.position.label,
                "stale context change confirmation refused"
            );
            return Err(DomainError::conflict(
                "session changed since the context switch was requested",
            )
            .into());
        }
        let next = self.rebased_context(&pending.target)?;

        let target = pending.target;
        let dropped = if target.source != self.scan_context.source {
            self.accumulator.reset_all()
        } else {
            self.accumulator
                .reset_for_position(self.scan_context.position.id)
        };
        tracing::info!(
            session_id = %self.context.session_id,
            from = %self.scan_context.position.label,
            to = %target.position.label,
            dropped,
            "scan context changed; lines discarded"
        );
        self.switch_to(target, next);
        Ok(dropped)
    }

    /// Persist the lines. On failure nothing in the session changes.
    pub async fn save<S: MovementStore + ?Sized>(
        &mut self,
        store: &S,
        mode: SaveMode,
    ) -> Result<SaveReceipt, SessionError> {
        self.ensure_open()?;
        self.ensure_idle()?;
        if mode == SaveMode::Complete && self.accumulator.is_empty() {
            return Err(SessionError::Empty);
        }

        let payload = to_payload(self.accumulator.lines(), &self.context, mode, Utc::now());
        match store.save(&payload, mode).await {
            Ok(receipt) => {
                self.context.record_id = Some(receipt.record_id);
                if mode == SaveMode::Complete {
                    self.state = SessionState::Completed;
                }
                tracing::info!(
                    session_id = %self.context.session_id,
                    record_id = %receipt.record_id,
                    ?mode,
                    items = payload.items.len(),
                    "movement saved"
                );
                Ok(receipt)
            }
            Err(err) => {
                tracing::warn!(
                    session_id = %self.context.session_id,
                    ?mode,
                    error = %err,
                    "movement save failed; scanned lines kept"
                );
                self.feedback
                    .notify(&format!("save failed: {err}"), Severity::Error);
                Err(SessionError::Submission(err))
            }
        }
    }
}

fn ensure_same_source(context: &SessionContext, scan: &ScanContext) -> Result<(), SessionError> {
    if context.source != scan.source {
        return Err(DomainError::validation(format!(
            "scanning at source {} but the movement is for source {}",
            scan.source, context.source
        ))
        .into());
    }
    Ok(())
}
