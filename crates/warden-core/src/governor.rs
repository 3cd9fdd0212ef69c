//! The Warden governor: the admission-controlled execution state machine.
//!
//! The governor enforces the execution model for every action request:
//!
//!   Rate → Confirm → Name → Location → Size → Lock → Cooldown
//!     → Hash → STARTED → [move + extract] → terminal entry → final move
//!
//! The ordering invariant is absolute: the `STARTED` entry is in the ledger
//! before the target file is touched.  Audit precedes action, never the
//! reverse.  The registry lock taken at admission is released exactly once,
//! after the terminal entry has been written.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use warden_contracts::{
    outcome, ActionRequest, AuditEntry, EntryStatus, ExecutionId, ExecutionMode, FailureCategory,
    LedgerRecord, WardenError, WardenResult,
};

use crate::layout::DirectoryLayout;
use crate::registry::{ExecutionRegistry, RegistryLease};
use crate::supervisor::{ExtractorCommand, ExtractorExit, ExtractorReport};
use crate::traits::{AdmissionPolicy, AuditLedger};

/// Minimum spacing between two admissions of the same file.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);

/// Default per-caller request ceiling per minute.
pub const DEFAULT_RATE_LIMIT_PER_MIN: u32 = 60;

/// Static configuration of a governor.
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    pub mode: ExecutionMode,
    pub layout: DirectoryLayout,
    pub extractor: ExtractorCommand,
    pub rate_limit_per_min: u32,
    pub cooldown: Duration,
}

impl GovernorConfig {
    pub fn new(mode: ExecutionMode, layout: DirectoryLayout, extractor: ExtractorCommand) -> Self {
        Self {
            mode,
            layout,
            extractor,
            rate_limit_per_min: DEFAULT_RATE_LIMIT_PER_MIN,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// An accepted request.
#[derive(Debug)]
pub struct Admission {
    pub execution_id: String,

    /// Observe mode: the terminal `COMPLETED_SUCCESS` entry.
    /// Live mode: the `STARTED` entry; poll the ledger for the outcome.
    pub entry: LedgerRecord,

    /// Live mode only: the background supervision task, resolving to the
    /// terminal record once the extractor has finished.
    pub supervision: Option<JoinHandle<WardenResult<LedgerRecord>>>,
}

/// The central governor.  One instance owns the registry for the whole
/// process and serves every concurrent request.
pub struct Governor {
    config: GovernorConfig,
    policy: Arc<dyn AdmissionPolicy>,
    ledger: Arc<dyn AuditLedger>,
    registry: Arc<ExecutionRegistry>,
}

impl Governor {
    pub fn new(
        config: GovernorConfig,
        policy: Arc<dyn AdmissionPolicy>,
        ledger: Arc<dyn AuditLedger>,
    ) -> Self {
        Self {
            config,
            policy,
            ledger,
            registry: Arc::new(ExecutionRegistry::new()),
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.config.mode
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    pub fn policy(&self) -> &Arc<dyn AdmissionPolicy> {
        &self.policy
    }

    pub fn ledger(&self) -> &Arc<dyn AuditLedger> {
        &self.ledger
    }

    pub fn registry(&self) -> &Arc<ExecutionRegistry> {
        &self.registry
    }

    /// Validate and run one action request against a file in `source_dir`.
    ///
    /// # Pipeline
    ///
    /// 1. Caller rate window → `RateLimited`
    /// 2. Explicit confirmation → `GovernanceBlocked`
    /// 3. File name allow-pattern → `InvalidResource`
    /// 4. Path confinement and existence → `FileNotFound`
    /// 5. Size ceiling → `InvalidResource`
    /// 6. Registry lock → `ResourceLocked`
    /// 7. Cooldown → `CooldownActive`
    /// 8. Content hash → `InternalFailure` (lock released, nothing written)
    /// 9. `STARTED` entry → ledger errors propagate (lock released, file untouched)
    /// 10. Observe: `COMPLETED_SUCCESS`/`SIMULATED`.  Live: stage, launch,
    ///     `EXECUTING`, then supervise in the background.
    ///
    /// # Errors
    ///
    /// Gates 1–7 return admission rejections without side effects.  After
    /// admission, failures in the live move sequence or extractor launch are
    /// recorded as terminal entries and surface as
    /// `WardenError::ExecutionAborted` carrying the last ledger entry.
    pub async fn request_action(
        &self,
        source_dir: &Path,
        request: ActionRequest,
    ) -> WardenResult<Admission> {
        let caller = request.caller.clone();
        let lease = match self.check_admission(source_dir, request).await {
            Ok(lease) => lease,
            Err(e) => {
                warn!(caller = %caller, code = %e.code(), reason = %e, "request rejected");
                return Err(e);
            }
        };

        self.admit(lease).await
    }

    // ── Admission gates ──────────────────────────────────────────────────────

    async fn check_admission(
        &self,
        source_dir: &Path,
        request: ActionRequest,
    ) -> WardenResult<RegistryLease> {
        let ActionRequest {
            caller,
            filename,
            confirm,
        } = request;

        // Gate 1: rate.
        self.registry
            .check_rate(&caller, self.config.rate_limit_per_min, Instant::now())?;

        // Gate 2: consent is never inferred.
        if !confirm {
            return Err(WardenError::GovernanceBlocked {
                reason: "explicit confirmation is required".to_string(),
            });
        }

        // Gate 3: name.
        let filename = filename
            .filter(|name| !name.is_empty())
            .ok_or_else(|| WardenError::InvalidResource {
                reason: "filename is required".to_string(),
            })?;
        self.policy.admit_filename(&filename)?;

        // Gates 4 and 5: location, existence, size.
        let (resource, size) = self.resolve(source_dir, &filename).await?;
        self.policy.admit_size(size)?;

        // Gates 6 and 7 run inside one registry critical section.
        let execution_id = ExecutionId::new().to_string();
        self.registry.acquire(
            &resource,
            &execution_id,
            self.config.cooldown,
            Instant::now(),
        )
    }

    /// Canonicalize `source_dir/filename`, confine it to `source_dir`, and
    /// return it with its size.
    async fn resolve(&self, source_dir: &Path, filename: &str) -> WardenResult<(PathBuf, u64)> {
        let not_found = || WardenError::FileNotFound {
            resource: filename.to_string(),
        };

        let root = tokio::fs::canonicalize(source_dir)
            .await
            .map_err(|_| not_found())?;
        let candidate = match tokio::fs::canonicalize(root.join(filename)).await {
            Ok(candidate) => candidate,
            Err(_) => return Err(self.missing_or_in_flight(&root, filename)),
        };
        self.policy.admit_location(&root, &candidate)?;

        let metadata = tokio::fs::metadata(&candidate)
            .await
            .map_err(|_| not_found())?;
        if !metadata.is_file() {
            return Err(not_found());
        }

        Ok((candidate, metadata.len()))
    }

    /// A live execution moves its file out of the source directory, so an
    /// absent file may still be locked.
    fn missing_or_in_flight(&self, root: &Path, filename: &str) -> WardenError {
        let resource = root.join(filename);
        match self.registry.holder(&resource) {
            Some(holder) => WardenError::ResourceLocked {
                resource: resource.display().to_string(),
                holder,
            },
            None => WardenError::FileNotFound {
                resource: filename.to_string(),
            },
        }
    }

    // ── Execution ────────────────────────────────────────────────────────────

    async fn admit(&self, lease: RegistryLease) -> WardenResult<Admission> {
        let file_hash = hash_file(lease.resource()).await;
        self.admit_hashed(lease, file_hash).await
    }

    /// Continue admission once the content hash is known.  A failed hash
    /// releases the lock and writes nothing.
    async fn admit_hashed(
        &self,
        lease: RegistryLease,
        file_hash: std::io::Result<String>,
    ) -> WardenResult<Admission> {
        let started = Instant::now();
        let execution_id = lease.execution_id().to_string();
        let resource = lease.resource().to_path_buf();

        let file_hash = match file_hash {
            Ok(hash) => hash,
            Err(e) => {
                error!(
                    execution_id = %execution_id,
                    file = %resource.display(),
                    error = %e,
                    "hash calculation failed"
                );
                lease.release();
                return Err(WardenError::InternalFailure {
                    reason: format!("hash calculation failed: {e}"),
                });
            }
        };

        let context = ExecutionContext {
            filename: resource
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            execution_id,
            mode: self.config.mode,
            resource,
            file_hash,
            started,
        };

        // Audit precedes action: nothing below runs without this entry.
        let started_record =
            match append_entry(&self.ledger, context.entry(EntryStatus::Started)).await {
                Ok(record) => record,
                Err(e) => {
                    error!(
                        execution_id = %context.execution_id,
                        error = %e,
                        "STARTED entry rejected by ledger; file left untouched"
                    );
                    lease.release();
                    return Err(e);
                }
            };

        info!(
            execution_id = %context.execution_id,
            file = %context.resource.display(),
            mode = %context.mode,
            "execution started"
        );

        match context.mode {
            ExecutionMode::Observe => self.simulate(context, lease).await,
            ExecutionMode::Live => self.launch(context, lease, started_record).await,
        }
    }

    /// Observe mode: record the decision, touch nothing.
    async fn simulate(
        &self,
        context: ExecutionContext,
        lease: RegistryLease,
    ) -> WardenResult<Admission> {
        let entry = context
            .entry(EntryStatus::CompletedSuccess)
            .with_outcome(outcome::SIMULATED)
            .with_runtime_ms(context.runtime_ms());
        let appended = append_entry(&self.ledger, entry).await;
        lease.release();
        let record = appended?;

        info!(execution_id = %context.execution_id, "execution simulated");

        Ok(Admission {
            execution_id: context.execution_id,
            entry: record,
            supervision: None,
        })
    }

    /// Live mode: source → staging → working, launch, record `EXECUTING`,
    /// and hand the running extractor to a background supervisor.
    async fn launch(
        &self,
        context: ExecutionContext,
        lease: RegistryLease,
        started_record: LedgerRecord,
    ) -> WardenResult<Admission> {
        let transition = TerminalTransition {
            ledger: Arc::clone(&self.ledger),
            layout: self.config.layout.clone(),
            context,
            lease,
        };

        let working = match stage(&transition.layout, &transition.context).await {
            Ok(path) => path,
            Err(e) => {
                return Err(transition
                    .abort(TerminalOutcome::FileSystem(format!(
                        "lifecycle move failed: {e}"
                    )))
                    .await)
            }
        };

        let running = match self.config.extractor.spawn(&working) {
            Ok(running) => running,
            Err(e) => {
                return Err(transition
                    .abort(TerminalOutcome::LaunchFailed(format!(
                        "failed to launch extractor: {e}"
                    )))
                    .await)
            }
        };

        let pid = running.pid();
        let executing = transition
            .context
            .entry(EntryStatus::Executing)
            .with_pid(pid);
        if let Err(e) = append_entry(&self.ledger, executing).await {
            error!(
                execution_id = %transition.context.execution_id,
                pid,
                error = %e,
                "EXECUTING entry rejected by ledger; killing extractor"
            );
            running.abort().await;
            transition.quarantine().await;
            return Err(e);
        }

        info!(
            execution_id = %transition.context.execution_id,
            pid,
            "extractor executing"
        );

        let execution_id = transition.context.execution_id.clone();
        let timeout = self.config.extractor.timeout;
        let supervision = tokio::spawn(async move {
            let report = running.supervise(timeout).await;
            transition.commit(TerminalOutcome::Extractor(report)).await
        });

        Ok(Admission {
            execution_id,
            entry: started_record,
            supervision: Some(supervision),
        })
    }
}

/// Hex SHA-256 of a file's content.
pub async fn hash_file(path: &Path) -> std::io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Append on the blocking pool.  Ledger writes take a file lock and fsync,
/// which must not stall a runtime worker.
async fn append_entry(
    ledger: &Arc<dyn AuditLedger>,
    entry: AuditEntry,
) -> WardenResult<LedgerRecord> {
    let ledger = Arc::clone(ledger);
    tokio::task::spawn_blocking(move || ledger.append(entry))
        .await
        .map_err(|e| WardenError::AuditWriteFailed {
            reason: format!("ledger append task failed: {e}"),
        })?
}

/// Two-phase move into the working directory.  A crash between the two
/// renames leaves `<execution_id>.tmp` in staging for startup recovery.
async fn stage(layout: &DirectoryLayout, context: &ExecutionContext) -> std::io::Result<PathBuf> {
    let staging = layout.staging_path(&context.execution_id);
    tokio::fs::rename(&context.resource, &staging).await?;
    debug!(execution_id = %context.execution_id, staging = %staging.display(), "file staged");

    let working = layout.working_path(&context.execution_id, &context.filename);
    tokio::fs::rename(&staging, &working).await?;
    debug!(execution_id = %context.execution_id, working = %working.display(), "file in working");

    Ok(working)
}

// ── Per-execution state ──────────────────────────────────────────────────────

/// Facts fixed at admission and carried into every entry of an execution.
#[derive(Debug, Clone)]
struct ExecutionContext {
    execution_id: String,
    mode: ExecutionMode,
    resource: PathBuf,
    filename: String,
    file_hash: String,
    started: Instant,
}

impl ExecutionContext {
    fn entry(&self, status: EntryStatus) -> AuditEntry {
        AuditEntry::new(
            &self.execution_id,
            status,
            self.mode,
            self.resource.display().to_string(),
            &self.file_hash,
        )
    }

    fn runtime_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// How a live execution ended.
enum TerminalOutcome {
    Extractor(ExtractorReport),
    FileSystem(String),
    LaunchFailed(String),
}

impl TerminalOutcome {
    fn entry(&self, context: &ExecutionContext) -> AuditEntry {
        let entry = match self {
            TerminalOutcome::Extractor(report) => {
                let entry = match report.exit {
                    ExtractorExit::Exited { code: 0 } => context
                        .entry(EntryStatus::CompletedSuccess)
                        .with_outcome(outcome::SUCCESS)
                        .with_exit_code(0),
                    ExtractorExit::Exited { code } => context
                        .entry(EntryStatus::CompletedFailure)
                        .with_outcome(outcome::FAILURE)
                        .with_failure(FailureCategory::RuntimeError)
                        .with_exit_code(code)
                        .with_errors([format!("Exit {code}")]),
                    ExtractorExit::TimedOut => context
                        .entry(EntryStatus::Timeout)
                        .with_outcome(outcome::TIMEOUT)
                        .with_failure(FailureCategory::Timeout)
                        .with_errors(["Timeout"]),
                };
                entry.with_output(report.stdout.as_str(), report.stderr.as_str())
            }
            TerminalOutcome::FileSystem(reason) => context
                .entry(EntryStatus::CompletedFailure)
                .with_outcome(outcome::FAILURE)
                .with_failure(FailureCategory::FileSystemError)
                .with_errors([reason.as_str()]),
            TerminalOutcome::LaunchFailed(reason) => context
                .entry(EntryStatus::CompletedFailure)
                .with_outcome(outcome::FAILURE)
                .with_failure(FailureCategory::RuntimeError)
                .with_errors([reason.as_str()]),
        };
        entry.with_runtime_ms(context.runtime_ms())
    }

    fn reason(&self) -> String {
        match self {
            TerminalOutcome::Extractor(report) => format!("{:?}", report.exit),
            TerminalOutcome::FileSystem(reason) | TerminalOutcome::LaunchFailed(reason) => {
                reason.clone()
            }
        }
    }
}

/// The single path to an execution's terminal state.
///
/// Every method takes `self` by value, so at most one terminal entry can be
/// written per execution no matter how completion signals interleave.  The
/// lease moves in with it and is released after the final file move.
struct TerminalTransition {
    ledger: Arc<dyn AuditLedger>,
    layout: DirectoryLayout,
    context: ExecutionContext,
    lease: RegistryLease,
}

impl TerminalTransition {
    /// Write the terminal entry, move the file to its resting place, and
    /// release the lock.
    async fn commit(self, outcome: TerminalOutcome) -> WardenResult<LedgerRecord> {
        let entry = outcome.entry(&self.context);
        let success = entry.status == EntryStatus::CompletedSuccess;

        let appended = append_entry(&self.ledger, entry).await;
        match &appended {
            Ok(record) => info!(
                execution_id = %self.context.execution_id,
                status = record.status().as_str(),
                failure_category = ?record.entry.failure_category,
                runtime_ms = record.entry.runtime_ms,
                "execution reached terminal state"
            ),
            Err(e) => error!(
                execution_id = %self.context.execution_id,
                error = %e,
                "terminal entry rejected by ledger"
            ),
        }

        self.settle_file(success).await;
        self.lease.release();
        appended
    }

    /// Commit a failure that happened before supervision started and turn it
    /// into the error returned to the caller.
    async fn abort(self, outcome: TerminalOutcome) -> WardenError {
        let execution_id = self.context.execution_id.clone();
        let reason = outcome.reason();
        let ledger = Arc::clone(&self.ledger);

        let last_entry = match self.commit(outcome).await {
            Ok(record) => Some(record),
            Err(_) => {
                let id = execution_id.clone();
                tokio::task::spawn_blocking(move || ledger.latest_for_execution(&id))
                    .await
                    .ok()
                    .and_then(Result::ok)
                    .flatten()
            }
        };

        WardenError::ExecutionAborted {
            execution_id,
            reason,
            last_entry: last_entry.map(Box::new),
        }
    }

    /// Move the file to the error directory without writing a terminal
    /// entry.  Used when the ledger itself refused a write; startup recovery
    /// will close the execution.
    async fn quarantine(self) {
        self.settle_file(false).await;
        self.lease.release();
    }

    /// Move whatever is in flight (working copy, or staged copy if the
    /// second rename never happened) to final on success, else to error.
    async fn settle_file(&self, success: bool) {
        let id = &self.context.execution_id;
        let name = &self.context.filename;
        let working = self.layout.working_path(id, name);
        let staging = self.layout.staging_path(id);

        let source = if tokio::fs::try_exists(&working).await.unwrap_or(false) {
            working
        } else if tokio::fs::try_exists(&staging).await.unwrap_or(false) {
            staging
        } else {
            return;
        };
        let destination = if success {
            self.layout.final_path(id, name)
        } else {
            self.layout.error_path(id, name)
        };

        match tokio::fs::rename(&source, &destination).await {
            Ok(()) => debug!(
                execution_id = %id,
                destination = %destination.display(),
                "file settled"
            ),
            Err(e) => error!(
                execution_id = %id,
                source = %source.display(),
                destination = %destination.display(),
                error = %e,
                "final move failed"
            ),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
