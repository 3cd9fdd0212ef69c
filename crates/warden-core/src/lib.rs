//! # warden-core
//!
//! The governed execution runtime.
//!
//! This crate provides:
//! - The two trust seams (`AuditLedger`, `AdmissionPolicy`)
//! - The `ExecutionRegistry` (per-file locks, cooldowns, caller rate windows)
//! - The `Governor`, which drives a file through
//!   staging → working → final/error under audit
//! - Startup recovery, which repairs the ledger/filesystem after a crash
//!
//! ## Usage
//!
//! ```rust,ignore
//! use warden_core::{Governor, GovernorConfig};
//!
//! let report = warden_core::recovery::run_startup_recovery(ledger.as_ref(), &layout, mode)?;
//! let governor = Governor::new(config, policy, ledger);
//! let admission = governor.request_action(&inbox, request).await?;
//! ```

pub mod governor;
pub mod layout;
pub mod recovery;
pub mod registry;
pub mod supervisor;
pub mod traits;

#[cfg(test)]
mod testing;

pub use governor::{hash_file, Admission, Governor, GovernorConfig};
pub use layout::DirectoryLayout;
pub use recovery::{run_startup_recovery, RecoveryReport};
pub use registry::{ExecutionRegistry, RegistryLease};
pub use supervisor::{ExtractorCommand, ExtractorExit, ExtractorReport};
