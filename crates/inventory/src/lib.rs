//! Stock-movement scanning core.
//!
//! This crate contains the barcode-scan accumulation workflow shared by the
//! ingress, egress and transfer screens, implemented as deterministic logic
//! behind narrow collaborator traits (no HTTP, no storage, no audio).
//!
//! Data flow: raw code → [`scan::resolve`] → [`Accumulator::apply`] →
//! [`FeedbackEmitter`] → … → [`summarize`] → [`to_payload`] + [`MovementStore`].

pub mod accumulator;
pub mod feedback;
pub mod reconcile;
pub mod scan;
pub mod session;
pub mod submission;

pub use accumulator::{Accumulator, AccumulatedLine, ApplyOutcome, LineKey};
pub use feedback::{FeedbackEmitter, FeedbackSink, Severity, Tone, TracingFeedback};
pub use reconcile::{Summary, summarize};
pub use scan::{
    LookupError, LookupNotFound, NotFoundReason, Position, ProductLookup, ScanCode, ScanContext,
    ScanResult,
};
pub use session::{
    ContextChange, PendingContextChange, PendingScan, ScanOutcome, ScanReport, ScanSession,
    SessionError, SessionOptions, SessionState,
};
pub use submission::{
    BackendPayload, Destination, MovementKind, MovementStore, PayloadItem, RecordStatus,
    RemoteLine, RemoteRecord, SaveMode, SaveReceipt, SessionContext, SubmissionError,
    to_payload,
};
