use crate::error::{OverseerError, Result};
use crate::paths;
use crate::target::MutationTarget;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// DeciderConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeciderConfig {
    Llm {
        #[serde(default = "default_model")]
        model: String,
        #[serde(default = "default_endpoint")]
        endpoint: String,
        #[serde(default = "default_api_key_env")]
        api_key_env: String,
        #[serde(default = "default_max_tokens")]
        max_tokens: u32,
    },
    Human,
    Static {
        approve: bool,
    },
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    16
}

impl Default for DeciderConfig {
    fn default() -> Self {
        DeciderConfig::Llm {
            model: default_model(),
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
        }
    }
}

// ---------------------------------------------------------------------------
// GateConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Seconds to wait for the decider. `0` waits indefinitely.
    #[serde(default = "default_gate_timeout")]
    pub timeout_seconds: u64,
}

fn default_gate_timeout() -> u64 {
    60
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_gate_timeout(),
        }
    }
}

impl GateConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }
}

// ---------------------------------------------------------------------------
// SnapshotConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Keep only the newest `n` snapshots of a target when pruning.
    /// `None` keeps everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_last: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Defaults to `<state dir>/backups`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,
    /// `0` disables the copy deadline.
    #[serde(default = "default_copy_timeout")]
    pub copy_timeout_seconds: u64,
    #[serde(default)]
    pub retention: RetentionPolicy,
}

fn default_copy_timeout() -> u64 {
    600
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            backup_dir: None,
            copy_timeout_seconds: default_copy_timeout(),
            retention: RetentionPolicy::default(),
        }
    }
}

impl SnapshotConfig {
    pub fn copy_timeout(&self) -> Option<Duration> {
        (self.copy_timeout_seconds > 0).then(|| Duration::from_secs(self.copy_timeout_seconds))
    }

    /// Relative `backup_dir` values are resolved against the state dir.
    pub fn backup_dir(&self, state_dir: &Path) -> PathBuf {
        match &self.backup_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => state_dir.join(dir),
            None => paths::default_backup_dir(state_dir),
        }
    }
}

// ---------------------------------------------------------------------------
// VcsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VcsConfig {
    Git {
        #[serde(default = "default_include_untracked")]
        include_untracked: bool,
    },
    None,
}

fn default_include_untracked() -> bool {
    true
}

impl Default for VcsConfig {
    fn default() -> Self {
        VcsConfig::Git {
            include_untracked: default_include_untracked(),
        }
    }
}

// ---------------------------------------------------------------------------
// ScanConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_markers")]
    pub markers: Vec<String>,
}

fn default_extensions() -> Vec<String> {
    vec!["md".to_string()]
}

fn default_markers() -> Vec<String> {
    vec!["TODO".to_string(), "FIXME".to_string()]
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            markers: default_markers(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub decider: DeciderConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub vcs: VcsConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            decider: DeciderConfig::default(),
            gate: GateConfig::default(),
            snapshot: SnapshotConfig::default(),
            vcs: VcsConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}

impl Config {
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = paths::config_path(state_dir);
        if !path.exists() {
            return Err(OverseerError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, state_dir: &Path) -> Result<()> {
        let path = paths::config_path(state_dir);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self, target: &MutationTarget, state_dir: &Path) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        // 1. Nothing we write may land inside the protected tree
        if target.contains(state_dir) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "state directory {} is inside the target",
                    state_dir.display()
                ),
            });
        }
        let backup_dir = self.snapshot.backup_dir(state_dir);
        if target.contains(&backup_dir) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "snapshot.backup_dir {} is inside the target",
                    backup_dir.display()
                ),
            });
        }

        // 2. Retention
        if self.snapshot.retention.keep_last == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "snapshot.retention.keep_last=0 would prune every snapshot".to_string(),
            });
        }

        // 3. Decider
        match &self.decider {
            DeciderConfig::Llm { model, .. } if model.trim().is_empty() => {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: "decider.model is empty".to_string(),
                });
            }
            DeciderConfig::Static { approve: true } => {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: "static decider approves every step".to_string(),
                });
            }
            _ => {}
        }

        // 4. Timeouts
        if self.gate.timeout_seconds == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "gate.timeout_seconds=0 waits on the decider indefinitely".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
