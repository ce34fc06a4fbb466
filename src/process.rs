use anyhow::{Context, Result};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

/// Signal the worker understands as "stop recording and transcribe"
pub const STOP_SIGNAL: Signal = Signal::SIGUSR1;

/// Liveness probing and signalling of the worker process.
///
/// The coordinator never owns the worker. It only holds the PID long enough to
/// probe or signal it.
pub trait ProcessControl: Send + Sync {
    /// Whether a process with this PID currently exists. Never affects the target.
    fn is_alive(&self, pid: u32) -> bool;

    /// Ask the worker to finish its capture and transcribe
    fn send_stop(&self, pid: u32) -> Result<()>;
}

/// `ProcessControl` backed by `kill(2)`
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixProcesses;

impl ProcessControl for UnixProcesses {
    fn is_alive(&self, pid: u32) -> bool {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };

        // EPERM counts as dead as well: the worker always runs as our own user
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            Err(errno) => {
                tracing::debug!("Liveness probe for {} failed: {}", pid, errno);
                false
            }
        }
    }

    fn send_stop(&self, pid: u32) -> Result<()> {
        let raw = i32::try_from(pid).with_context(|| format!("Invalid PID {}", pid))?;

        kill(Pid::from_raw(raw), STOP_SIGNAL)
            .with_context(|| format!("Failed to send {} to {}", STOP_SIGNAL, pid))?;

        tracing::info!("Sent {} to worker {}", STOP_SIGNAL, pid);
        Ok(())
    }
}
