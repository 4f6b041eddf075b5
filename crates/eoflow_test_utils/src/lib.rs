//! eoflow Test Utilities
//!
//! In-memory stand-ins for the remote services a run talks to, so the
//! whole pipeline can be driven from a test without network or GDAL.
//!
//! # Usage
//!
//! ```rust,ignore
//! use eoflow_test_utils::{day, TestHarness, SAMPLE_COLLECTION};
//!
//! #[tokio::test]
//! async fn test_run_publishes() {
//!     let harness = TestHarness::new();
//!     harness.engine.add_asset(SAMPLE_COLLECTION, day(2024, 1, 10));
//!
//!     let report = harness.pipeline().run(day(2024, 1, 10)).await.unwrap();
//!     // Export jobs are now RUNNING on the fake engine
//!     harness.engine.complete_all();
//!     // ...
//! }
//! ```

pub mod catalog;
pub mod engine;
pub mod fixtures;
pub mod raster;

// Re-exports for convenience
pub use catalog::InMemoryCatalog;
pub use engine::FakeEngine;
pub use fixtures::{
    day, sample_config, sample_environment, TestHarness, SAMPLE_COLLECTION, SAMPLE_PRODUCT,
};
pub use raster::{FakeRasterToolkit, SAMPLE_LV95_BOUNDS};
