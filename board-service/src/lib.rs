//! Board service core.
//!
//! Write-path backbone for a bulletin-board backend: keyed mutation
//! guards, composed listing queries, view-count dedup, and per-entity
//! services over pluggable stores. Transport, auth, and rendering live
//! elsewhere; this crate owns the business rules.

pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod query;
pub mod services;
pub mod store;

pub use config::BoardConfig;
pub use error::{BoardError, Result};
