//! `bodega-client`
//!
//! **Responsibility:** REST adapters between the scanning core and the
//! commerce backend.
//!
//! This crate provides:
//! - Product lookup by barcode/SKU at a source position
//! - Movement record load/save (partial and complete)
//! - Normalization of the backend's mixed `[success, data]` / object replies
//!
//! The backend remains the inventory authority; this client only stages and
//! submits what was scanned.

pub mod config;
pub mod envelope;
pub mod hooks;
pub mod rest;

pub use config::{ClientConfig, ClientError};
pub use hooks::{AuthHooks, NoopAuthHooks};
pub use rest::RestBackend;
