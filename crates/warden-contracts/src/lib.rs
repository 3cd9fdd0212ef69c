//! # warden-contracts
//!
//! Shared types for the Warden governed execution pipeline.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions and error types.

pub mod entry;
pub mod error;
pub mod execution;

pub use entry::{outcome, AuditEntry, EntryStatus, FailureCategory, LedgerRecord};
pub use error::{ErrorCode, WardenError, WardenResult};
pub use execution::{ActionRequest, ExecutionId, ExecutionMode};
