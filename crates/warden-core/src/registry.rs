//! In-memory execution registry.
//!
//! Holds the three pieces of process-local admission state: the per-file
//! lock map, the per-file cooldown timestamps, and the per-caller sliding
//! rate windows.  Nothing here is persisted; after a crash the ledger and
//! startup recovery reconstruct the truth.
//!
//! Every check-then-set happens inside one critical section with no
//! suspension point, so two concurrent requests can never both observe a
//! file as unlocked.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use warden_contracts::{WardenError, WardenResult};

/// Length of the per-caller rate window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Default)]
struct RegistryState {
    /// Resource → execution currently holding it.
    locks: HashMap<PathBuf, String>,
    /// Resource → when it was last admitted.
    last_action: HashMap<PathBuf, Instant>,
    /// Caller → admission timestamps inside the current window.
    windows: HashMap<String, VecDeque<Instant>>,
}

/// Process-local lock, cooldown, and rate state owned by one governor.
#[derive(Default)]
pub struct ExecutionRegistry {
    state: Mutex<RegistryState>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // The state holds plain maps with no invariant a panic could break
    // halfway, so a poisoned lock is still safe to use.
    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count one request from `caller` against a sliding 60-second window.
    ///
    /// Timestamps older than the window are discarded first.  Rejected
    /// requests are not recorded, so a caller regains capacity as soon as
    /// its oldest admitted request ages out.
    pub fn check_rate(&self, caller: &str, ceiling: u32, now: Instant) -> WardenResult<()> {
        let mut state = self.state();
        state.windows.retain(|_, window| {
            expire_window(window, now);
            !window.is_empty()
        });
        let window = state.windows.entry(caller.to_string()).or_default();

        if window.len() >= ceiling as usize {
            return Err(WardenError::RateLimited {
                caller: caller.to_string(),
            });
        }

        window.push_back(now);
        Ok(())
    }

    /// Take the lock for `resource` on behalf of `execution_id`.
    ///
    /// Fails with `ResourceLocked` if another execution holds it, then with
    /// `CooldownActive` if the resource was admitted less than `cooldown`
    /// ago.  On success the lock is held and the cooldown clock restarts.
    pub fn acquire(
        self: &Arc<Self>,
        resource: &Path,
        execution_id: &str,
        cooldown: Duration,
        now: Instant,
    ) -> WardenResult<RegistryLease> {
        let mut state = self.state();
        state
            .last_action
            .retain(|_, last| now.saturating_duration_since(*last) < cooldown);

        if let Some(holder) = state.locks.get(resource) {
            return Err(WardenError::ResourceLocked {
                resource: resource.display().to_string(),
                holder: holder.clone(),
            });
        }

        if let Some(last) = state.last_action.get(resource) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < cooldown {
                return Err(WardenError::CooldownActive {
                    resource: resource.display().to_string(),
                    remaining_ms: (cooldown - elapsed).as_millis() as u64,
                });
            }
        }

        state
            .locks
            .insert(resource.to_path_buf(), execution_id.to_string());
        state.last_action.insert(resource.to_path_buf(), now);

        debug!(
            execution_id = %execution_id,
            resource = %resource.display(),
            "registry lock acquired"
        );

        Ok(RegistryLease {
            registry: Arc::clone(self),
            resource: resource.to_path_buf(),
            execution_id: execution_id.to_string(),
        })
    }

    /// The execution currently holding `resource`, if any.
    pub fn holder(&self, resource: &Path) -> Option<String> {
        self.state().locks.get(resource).cloned()
    }

    /// Number of resources currently locked.
    pub fn active_locks(&self) -> usize {
        self.state().locks.len()
    }

    /// Remove the lock only if `execution_id` still holds it.
    fn release(&self, resource: &Path, execution_id: &str) -> bool {
        let mut state = self.state();
        match state.locks.get(resource) {
            Some(holder) if holder == execution_id => {
                state.locks.remove(resource);
                debug!(
                    execution_id = %execution_id,
                    resource = %resource.display(),
                    "registry lock released"
                );
                true
            }
            _ => false,
        }
    }
}

/// Drop timestamps that have left the rate window.
fn expire_window(window: &mut VecDeque<Instant>, now: Instant) {
    while let Some(oldest) = window.front() {
        if now.saturating_duration_since(*oldest) >= RATE_WINDOW {
            window.pop_front();
        } else {
            break;
        }
    }
}

/// Proof that an execution holds a resource lock.
///
/// The lock is released exactly once: either explicitly through
/// [`RegistryLease::release`] or when the lease is dropped.
#[derive(Debug)]
pub struct RegistryLease {
    registry: Arc<ExecutionRegistry>,
    resource: PathBuf,
    execution_id: String,
}

impl RegistryLease {
    pub fn resource(&self) -> &Path {
        &self.resource
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Release the lock now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for RegistryLease {
    fn drop(&mut self) {
        self.registry.release(&self.resource, &self.execution_id);
    }
}

impl std::fmt::Debug for ExecutionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRegistry")
            .field("active_locks", &self.active_locks())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
