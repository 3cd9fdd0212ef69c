//! Configuration for wardend.
//!
//! Resolution order, lowest to highest precedence:
//!   1. built-in defaults
//!   2. the TOML file passed with `--config`
//!   3. `WARDEN_*` environment variables (a `.env` file is honoured)
//!   4. command-line flags
//!
//! Layers 3 and 4 are both handled by clap through `ConfigOverrides`.
//!
//! Example:
//! ```toml
//! listen = "0.0.0.0:5000"
//! execution_mode = "live"
//! base_dir = "/srv/warden"
//! rate_limit_per_min = 30
//!
//! [extractor]
//! program = "python3"
//! args = ["pipelines/runner.py"]
//! timeout_ms = 30000
//!
//! [policy]
//! allowed_file_regex = '^[a-zA-Z0-9_\-\.]+\.pdf$'
//! max_file_size_mb = 50
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use warden_contracts::{ExecutionMode, WardenError, WardenResult};
use warden_core::governor::{DEFAULT_COOLDOWN, DEFAULT_RATE_LIMIT_PER_MIN};
use warden_core::{DirectoryLayout, ExtractorCommand, GovernorConfig};
use warden_policy::PolicyConfig;

/// Top-level daemon configuration.  Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub listen: SocketAddr,

    /// `live` (case-insensitive) enables real execution; anything else
    /// observes.
    pub execution_mode: String,

    /// Root for the derived default paths; working directory of the
    /// extractor.
    pub base_dir: PathBuf,

    pub inbox_path: Option<PathBuf>,
    pub review_path: Option<PathBuf>,
    pub processing_path: Option<PathBuf>,
    pub final_path: Option<PathBuf>,
    pub ledger_path: Option<PathBuf>,

    pub rate_limit_per_min: u32,

    pub extractor: ExtractorConfig,
    pub policy: PolicyConfig,
}

/// How to launch the extraction subprocess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Bare command name (looked up on `PATH`) or a path.  Relative paths
    /// are resolved against `base_dir`.
    pub program: PathBuf,

    /// Arguments placed before `--file <path>`.
    pub args: Vec<String>,

    pub timeout_ms: u64,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 5000)),
            execution_mode: ExecutionMode::Observe.as_str().to_string(),
            base_dir: PathBuf::from("."),
            inbox_path: None,
            review_path: None,
            processing_path: None,
            final_path: None,
            ledger_path: None,
            rate_limit_per_min: DEFAULT_RATE_LIMIT_PER_MIN,
            extractor: ExtractorConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("python3"),
            args: Vec::new(),
            timeout_ms: 30_000,
        }
    }
}

impl WardenConfig {
    /// Parse `s` as TOML configuration.
    pub fn from_toml_str(s: &str) -> WardenResult<Self> {
        toml::from_str(s).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to parse config TOML: {}", e),
        })
    }

    /// Load from `path`, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> WardenResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Anchor `base_dir` and every explicit path at the current directory.
    ///
    /// The extractor runs with `base_dir` as its working directory, so any
    /// relative path handed to it would resolve against the wrong root.
    pub fn absolutize(mut self) -> WardenResult<Self> {
        self.base_dir = absolute(&self.base_dir)?;
        for path in [
            &mut self.inbox_path,
            &mut self.review_path,
            &mut self.processing_path,
            &mut self.final_path,
            &mut self.ledger_path,
        ]
        .into_iter()
        .flatten()
        {
            *path = absolute(path)?;
        }
        Ok(self)
    }

    pub fn mode(&self) -> ExecutionMode {
        ExecutionMode::from_config_value(&self.execution_mode)
    }

    pub fn inbox(&self) -> PathBuf {
        self.inbox_path
            .clone()
            .unwrap_or_else(|| self.base_dir.join("inbox"))
    }

    pub fn review(&self) -> PathBuf {
        self.review_path
            .clone()
            .unwrap_or_else(|| self.base_dir.join("inbox").join("review"))
    }

    pub fn processing(&self) -> PathBuf {
        self.processing_path
            .clone()
            .unwrap_or_else(|| self.base_dir.join("processing"))
    }

    pub fn final_dir(&self) -> PathBuf {
        self.final_path
            .clone()
            .unwrap_or_else(|| self.base_dir.join("archive"))
    }

    pub fn ledger(&self) -> PathBuf {
        self.ledger_path
            .clone()
            .unwrap_or_else(|| self.base_dir.join("logs").join("warden-audit.log"))
    }

    pub fn layout(&self) -> DirectoryLayout {
        DirectoryLayout::under(&self.processing(), self.final_dir())
    }

    /// The extractor program, with path-like relative programs anchored at
    /// `base_dir`.
    pub fn extractor_program(&self) -> PathBuf {
        let program = &self.extractor.program;
        if is_path_like(program) && program.is_relative() {
            self.base_dir.join(program)
        } else {
            program.clone()
        }
    }

    pub fn extractor_command(&self) -> ExtractorCommand {
        ExtractorCommand::new(
            self.extractor_program(),
            Duration::from_millis(self.extractor.timeout_ms),
        )
        .with_args(self.extractor.args.iter().cloned())
        .with_cwd(&self.base_dir)
    }

    pub fn governor_config(&self) -> GovernorConfig {
        GovernorConfig {
            mode: self.mode(),
            layout: self.layout(),
            extractor: self.extractor_command(),
            rate_limit_per_min: self.rate_limit_per_min,
            cooldown: DEFAULT_COOLDOWN,
        }
    }

    /// Reject configurations the daemon cannot serve with.
    ///
    /// In live mode an extractor given as a path must exist; a bare command
    /// name is left to `PATH` lookup at launch.
    pub fn validate(&self) -> WardenResult<()> {
        if self.rate_limit_per_min == 0 {
            return Err(WardenError::ConfigError {
                reason: "rate_limit_per_min must be at least 1".to_string(),
            });
        }
        if self.extractor.timeout_ms == 0 {
            return Err(WardenError::ConfigError {
                reason: "extractor timeout_ms must be at least 1".to_string(),
            });
        }
        if self.mode() == ExecutionMode::Live && is_path_like(&self.extractor.program) {
            let program = self.extractor_program();
            if !program.is_file() {
                return Err(WardenError::ConfigError {
                    reason: format!("extractor program '{}' does not exist", program.display()),
                });
            }
        }
        Ok(())
    }
}

fn absolute(path: &Path) -> WardenResult<PathBuf> {
    std::path::absolute(path).map_err(|e| WardenError::ConfigError {
        reason: format!("cannot resolve path '{}': {}", path.display(), e),
    })
}

fn is_path_like(program: &Path) -> bool {
    program.is_absolute() || program.components().count() > 1
}

/// Environment and command-line overrides, applied over the file config.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigOverrides {
    /// Address to listen on.
    #[arg(long, global = true, env = "WARDEN_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// `observe` or `live`.
    #[arg(long = "mode", global = true, env = "WARDEN_EXECUTION_MODE")]
    pub execution_mode: Option<String>,

    #[arg(long, global = true, env = "WARDEN_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    #[arg(long, global = true, env = "WARDEN_INBOX_PATH")]
    pub inbox_path: Option<PathBuf>,

    #[arg(long, global = true, env = "WARDEN_REVIEW_PATH")]
    pub review_path: Option<PathBuf>,

    #[arg(long, global = true, env = "WARDEN_PROCESSING_PATH")]
    pub processing_path: Option<PathBuf>,

    #[arg(long, global = true, env = "WARDEN_FINAL_PATH")]
    pub final_path: Option<PathBuf>,

    #[arg(long = "ledger", global = true, env = "WARDEN_LEDGER_PATH")]
    pub ledger_path: Option<PathBuf>,

    #[arg(long, global = true, env = "WARDEN_EXTRACTOR_PROGRAM")]
    pub extractor_program: Option<PathBuf>,

    /// Comma-separated arguments placed before `--file <path>`.
    #[arg(long, global = true, env = "WARDEN_EXTRACTOR_ARGS", value_delimiter = ',')]
    pub extractor_args: Option<Vec<String>>,

    #[arg(long, global = true, env = "WARDEN_EXTRACTOR_TIMEOUT_MS")]
    pub extractor_timeout_ms: Option<u64>,

    #[arg(long, global = true, env = "WARDEN_MAX_FILE_SIZE_MB")]
    pub max_file_size_mb: Option<u64>,

    #[arg(long, global = true, env = "WARDEN_ALLOWED_FILE_REGEX")]
    pub allowed_file_regex: Option<String>,

    #[arg(long, global = true, env = "WARDEN_RATE_LIMIT_PER_MIN")]
    pub rate_limit_per_min: Option<u32>,
}

impl ConfigOverrides {
    pub fn apply(self, config: &mut WardenConfig) {
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(mode) = self.execution_mode {
            config.execution_mode = mode;
        }
        if let Some(base_dir) = self.base_dir {
            config.base_dir = base_dir;
        }
        if self.inbox_path.is_some() {
            config.inbox_path = self.inbox_path;
        }
        if self.review_path.is_some() {
            config.review_path = self.review_path;
        }
        if self.processing_path.is_some() {
            config.processing_path = self.processing_path;
        }
        if self.final_path.is_some() {
            config.final_path = self.final_path;
        }
        if self.ledger_path.is_some() {
            config.ledger_path = self.ledger_path;
        }
        if let Some(program) = self.extractor_program {
            config.extractor.program = program;
        }
        if let Some(args) = self.extractor_args {
            config.extractor.args = args.into_iter().filter(|a| !a.is_empty()).collect();
        }
        if let Some(timeout_ms) = self.extractor_timeout_ms {
            config.extractor.timeout_ms = timeout_ms;
        }
        if let Some(max) = self.max_file_size_mb {
            config.policy.max_file_size_mb = max;
        }
        if let Some(pattern) = self.allowed_file_regex {
            config.policy.allowed_file_regex = pattern;
        }
        if let Some(rate) = self.rate_limit_per_min {
            config.rate_limit_per_min = rate;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
