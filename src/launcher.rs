use crate::config::WorkerConfig;
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Flag putting the worker script into background recording mode
pub const DAEMON_FLAG: &str = "--record-daemon";
/// Environment variable carrying the optional API credential
pub const CREDENTIAL_ENV: &str = "OPENAI_API_KEY";

/// Program, arguments and environment overlay for one worker launch
#[derive(Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Applied on top of the inherited environment
    pub env: Vec<(String, String)>,
}

// Overlay values carry the API key; only variable names are shown
impl fmt::Debug for LaunchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field(
                "env",
                &self
                    .env
                    .iter()
                    .map(|(key, _)| (key.as_str(), "<redacted>"))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl LaunchSpec {
    /// Derive the launch from a resolved worker configuration:
    /// `<interpreter> <entry point> --record-daemon [--language <lang>]`
    pub fn for_worker(worker: &WorkerConfig) -> Result<Self> {
        let program = worker
            .interpreter
            .clone()
            .context("Python path not configured")?;
        let entry_point = worker
            .entry_point
            .clone()
            .context("Worker script path not configured")?;

        let mut args = vec![entry_point.into_os_string(), DAEMON_FLAG.into()];
        if let Some(language) = &worker.language {
            args.push("--language".into());
            args.push(language.into());
        }

        let env = worker
            .credential
            .iter()
            .map(|key| (CREDENTIAL_ENV.to_string(), key.clone()))
            .collect();

        Ok(Self { program, args, env })
    }
}

/// Starts the worker process
pub trait Launcher: Send + Sync {
    /// Start the worker and return its PID without waiting on it
    fn launch(&self, spec: &LaunchSpec) -> Result<u32>;
}

/// Spawns the worker in its own session with no inherited stdio.
///
/// The child handle is dropped right away: the worker outlives us and is never
/// waited on.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedLauncher;

impl Launcher for DetachedLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<u32> {
        tracing::info!("Spawning worker: {:?} {:?}", spec.program, spec.args);

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);

        // SAFETY: setsid is async-signal-safe and touches no parent state
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid()?;
                Ok(())
            });
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {:?}", spec.program))?;

        let pid = child
            .id()
            .context("Worker exited before its PID could be read")?;

        tracing::debug!("Worker spawned with PID {}", pid);
        Ok(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::{Pid, getsid};
    use std::path::Path;
    use std::time::Duration;

    fn worker(language: Option<&str>, credential: Option<&str>) -> WorkerConfig {
        WorkerConfig {
            interpreter: Some(PathBuf::from("/usr/bin/python3")),
            entry_point: Some(PathBuf::from("/opt/whisper/transcribe.py")),
            language: language.map(str::to_string),
            credential: credential.map(str::to_string),
        }
    }

    #[test]
    fn test_args_without_language() {
        let spec = LaunchSpec::for_worker(&worker(None, None)).unwrap();

        assert_eq!(spec.program, PathBuf::from("/usr/bin/python3"));
        assert_eq!(
            spec.args,
            vec![
                OsString::from("/opt/whisper/transcribe.py"),
                OsString::from("--record-daemon")
            ]
        );
        assert!(spec.env.is_empty());
    }

    #[test]
    fn test_args_with_language_and_credential() {
        let spec = LaunchSpec::for_worker(&worker(Some("de"), Some("sk-123"))).unwrap();

        assert_eq!(
            spec.args,
            vec![
                OsString::from("/opt/whisper/transcribe.py"),
                OsString::from("--record-daemon"),
                OsString::from("--language"),
                OsString::from("de"),
            ]
        );
        assert_eq!(
            spec.env,
            vec![("OPENAI_API_KEY".to_string(), "sk-123".to_string())]
        );
    }

    #[test]
    fn test_debug_output_hides_credential() {
        let spec = LaunchSpec::for_worker(&worker(None, Some("sk-secret-123"))).unwrap();

        let debug = format!("{:?}", spec);

        assert!(!debug.contains("sk-secret-123"), "{}", debug);
        assert!(debug.contains("OPENAI_API_KEY"));
        assert!(debug.contains("--record-daemon"));
    }

    #[test]
    fn test_unresolved_worker_is_rejected() {
        let worker = WorkerConfig {
            interpreter: None,
            ..worker(None, None)
        };

        assert!(LaunchSpec::for_worker(&worker).is_err());
    }

    async fn wait_for(path: &Path) -> String {
        for _ in 0..100 {
            if let Ok(content) = std::fs::read_to_string(path) {
                if content.ends_with('\n') {
                    return content.trim().to_string();
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("{:?} never appeared", path);
    }

    #[tokio::test]
    async fn test_detached_worker_runs_in_own_session() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let env_file = dir.path().join("env");

        let spec = LaunchSpec {
            program: PathBuf::from("/bin/sh"),
            args: vec![
                "-c".into(),
                format!(
                    "echo \"$OPENAI_API_KEY\" > {env}; echo $$ > {pid}; sleep 2",
                    env = env_file.display(),
                    pid = pid_file.display()
                )
                .into(),
            ],
            env: vec![("OPENAI_API_KEY".to_string(), "sk-overlay".to_string())],
        };

        let pid = DetachedLauncher.launch(&spec).unwrap();

        assert_eq!(wait_for(&pid_file).await, pid.to_string());
        assert_eq!(wait_for(&env_file).await, "sk-overlay");

        let raw = Pid::from_raw(pid as i32);
        assert_eq!(getsid(Some(raw)).unwrap(), raw);

        let _ = nix::sys::signal::kill(raw, nix::sys::signal::Signal::SIGKILL);
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_launch() {
        let spec = LaunchSpec {
            program: PathBuf::from("/nonexistent/python3"),
            args: vec![],
            env: vec![],
        };

        assert!(DetachedLauncher.launch(&spec).is_err());
    }
}
