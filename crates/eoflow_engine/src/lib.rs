//! Job Client for the remote compute engine.
//!
//! - [`ComputeEngine`]: the engine contract (submit, status, cancel, listings)
//! - [`JobClient`]: what the orchestrator calls; returns [`JobHandle`]s and
//!   folds engine states into ACTIVE / SUCCEEDED / FAILED
//! - [`HttpComputeEngine`]: reqwest implementation against a JSON gateway

pub mod client;
pub mod engine;
pub mod error;
pub mod http;
pub mod types;

pub use client::JobClient;
pub use engine::ComputeEngine;
pub use error::{EngineError, Result};
pub use http::HttpComputeEngine;
pub use types::{AssetListing, JobHandle, JobKind, JobSpec, JobStatusReport, SourceAvailability};
