use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "WHISPER_TOGGLE_CONFIG";

/// Name of the worker entry point looked up when `script_path` is unset
pub const WORKER_SCRIPT: &str = "transcribe.py";

/// What to do when the worker neither registers nor reports an error in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupTimeoutPolicy {
    /// Assume the worker is still initializing and show nothing
    #[default]
    Silent,
    /// Report a generic startup failure
    ReportGeneric,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub python_path: Option<String>,

    #[serde(default)]
    pub script_path: Option<String>,

    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub openai_api_key: Option<String>,

    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_ms: u64,

    #[serde(default = "default_transcription_timeout")]
    pub transcription_timeout_ms: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub on_startup_timeout: StartupTimeoutPolicy,

    #[serde(default = "default_paste_mode")]
    pub paste_mode: String,

    #[serde(default = "default_notifications")]
    pub notifications: bool,
}

fn default_startup_timeout() -> u64 {
    2000
}

fn default_transcription_timeout() -> u64 {
    60_000
}

fn default_poll_interval() -> u64 {
    100
}

fn default_paste_mode() -> String {
    "ctrl_shift".to_string()
}

fn default_notifications() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            python_path: None,
            script_path: None,
            language: None,
            openai_api_key: None,
            startup_timeout_ms: default_startup_timeout(),
            transcription_timeout_ms: default_transcription_timeout(),
            poll_interval_ms: default_poll_interval(),
            on_startup_timeout: StartupTimeoutPolicy::default(),
            paste_mode: default_paste_mode(),
            notifications: default_notifications(),
        }
    }
}

/// Polling windows used by the supervisors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub startup: Duration,
    pub transcription: Duration,
    pub poll: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Config::default().timeouts()
    }
}

/// Everything needed to launch the worker, resolved once per invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerConfig {
    pub interpreter: Option<PathBuf>,
    pub entry_point: Option<PathBuf>,
    pub language: Option<String>,
    pub credential: Option<String>,
}

impl Config {
    /// Load configuration from the default location
    /// (~/.config/whisper-toggle/config.json, or $WHISPER_TOGGLE_CONFIG)
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!(
                "Config file not found at {:?}, creating default config",
                config_path
            );
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    /// Load and validate, falling back to defaults on failure.
    ///
    /// The failure is handed back rather than returned as an error so that a
    /// broken config file cannot prevent stopping a worker that is already
    /// recording.
    pub fn load_or_default() -> (Self, Option<anyhow::Error>) {
        Self::or_default(Self::load())
    }

    fn or_default(loaded: Result<Self>) -> (Self, Option<anyhow::Error>) {
        match loaded.and_then(|config| config.validate().map(|()| config)) {
            Ok(config) => (config, None),
            Err(e) => {
                tracing::warn!("Using default configuration: {:#}", e);
                (Self::default(), Some(e))
            }
        }
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        tracing::debug!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        tracing::info!("Saved config to {:?}", config_path);
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        if let Some(path) = non_empty_env(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = match non_empty_env("XDG_CONFIG_HOME") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = std::env::var("HOME").context("HOME environment variable not set")?;
                PathBuf::from(home).join(".config")
            }
        };

        Ok(config_dir.join("whisper-toggle").join("config.json"))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("poll_interval_ms must be greater than 0"));
        }

        if self.startup_timeout_ms == 0 || self.transcription_timeout_ms == 0 {
            return Err(anyhow::anyhow!(
                "startup_timeout_ms and transcription_timeout_ms must be greater than 0"
            ));
        }

        if !["super", "ctrl_shift", "ctrl", "none"].contains(&self.paste_mode.as_str()) {
            return Err(anyhow::anyhow!(
                "paste_mode must be one of: super, ctrl_shift, ctrl, none"
            ));
        }

        Ok(())
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            startup: Duration::from_millis(self.startup_timeout_ms),
            transcription: Duration::from_millis(self.transcription_timeout_ms),
            poll: Duration::from_millis(self.poll_interval_ms),
        }
    }

    /// Resolve the worker settings, filling unset paths by auto-detection
    pub fn resolve_worker(&self) -> WorkerConfig {
        let interpreter = non_empty(&self.python_path)
            .map(PathBuf::from)
            .or_else(|| first_existing(&python_candidates()));

        let entry_point = non_empty(&self.script_path)
            .map(PathBuf::from)
            .or_else(|| first_existing(&script_candidates()));

        WorkerConfig {
            interpreter,
            entry_point,
            language: non_empty(&self.language).map(str::to_string),
            credential: non_empty(&self.openai_api_key).map(str::to_string),
        }
    }
}

impl WorkerConfig {
    /// Check that the worker can be launched. The first problem found wins.
    pub fn validate(&self) -> Result<()> {
        let entry_point = self
            .entry_point
            .as_deref()
            .context("Worker script path not configured")?;
        if !entry_point.is_file() {
            return Err(anyhow::anyhow!("Worker script not found: {}", entry_point.display()));
        }

        let interpreter = self
            .interpreter
            .as_deref()
            .context("Python path not configured")?;
        if !interpreter.exists() {
            return Err(anyhow::anyhow!("Python not found: {}", interpreter.display()));
        }
        if !is_executable(interpreter) {
            return Err(anyhow::anyhow!(
                "Python is not executable: {}",
                interpreter.display()
            ));
        }

        Ok(())
    }
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|path| path.exists()).cloned()
}

/// Known interpreter locations in priority order
fn python_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(home) = non_empty_env("HOME") {
        let home = PathBuf::from(home);
        candidates.push(home.join(".pyenv/shims/python3"));
        candidates.push(home.join(".pyenv/shims/python"));
    }

    candidates.extend(
        ["/opt/homebrew/bin/python3", "/usr/local/bin/python3", "/usr/bin/python3"]
            .into_iter()
            .map(PathBuf::from),
    );

    candidates
}

/// The worker script next to our executable, then in the data directory
fn script_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(dir.join(WORKER_SCRIPT));
    }

    let data_dir = non_empty_env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| non_empty_env("HOME").map(|home| PathBuf::from(home).join(".local/share")));
    if let Some(dir) = data_dir {
        candidates.push(dir.join("whisper-toggle").join(WORKER_SCRIPT));
    }

    candidates
}
