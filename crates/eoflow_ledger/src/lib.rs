//! Ledger Store: durable CSV records of in-flight jobs, job history,
//! per-product run status, and the empty-date denylist.
//!
//! Pure storage. The orchestration crates decide what to write.

pub mod error;
pub mod lock;
pub mod records;
pub mod store;

pub use error::{LedgerError, Result};
pub use lock::RunLock;
pub use records::{DenylistEntry, HistoryRecord, LedgerRecord, ProductStatusRecord, RunningJob};
pub use store::{LedgerPaths, LedgerStore};
