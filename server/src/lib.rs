//! # warden-server
//!
//! HTTP surface of the Warden governed execution pipeline.
//!
//! `Server::new` wires the file ledger, rule policy and governor together
//! and runs startup recovery.  The router exposes the governed actions
//! (`/api/process`, `/api/finalize`) and the audit lookups under `/api`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use warden_server::{Server, WardenConfig};
//!
//! let config = WardenConfig::load(Some(Path::new("warden.toml")))?;
//! Server::new(config)?.run().await?;
//! ```

pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{ConfigOverrides, ExtractorConfig, WardenConfig};
pub use error::{ApiError, ApiResult};
pub use routes::build_router;
pub use server::Server;
pub use state::AppState;

// ── Tests ─────────────────────────────────────────────────────────────────────
