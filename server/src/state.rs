//! Application state shared by the handlers.

use std::path::PathBuf;
use std::sync::Arc;

use warden_core::Governor;

#[derive(Clone)]
pub struct AppState {
    pub governor: Arc<Governor>,

    /// Source directory for `/process`.
    pub inbox: PathBuf,

    /// Source directory for `/finalize`.
    pub review: PathBuf,
}

impl AppState {
    pub fn new(governor: Arc<Governor>, inbox: PathBuf, review: PathBuf) -> Self {
        Self {
            governor,
            inbox,
            review,
        }
    }
}
