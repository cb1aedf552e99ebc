//! `bodega-core`: shared building blocks for the stock-movement workspace.
//!
//! This crate contains **pure** primitives (no network, no storage).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{PositionId, ProductId, RecordId, SessionId, SourceCode};
