use crate::config::{Config, StartupTimeoutPolicy, Timeouts, WorkerConfig};
use crate::launcher::{DetachedLauncher, LaunchSpec, Launcher};
use crate::mailbox::{Channel, Mailbox, Marker};
use crate::messages::{AppState, HarvestOutcome, Outcome, StartupOutcome};
use crate::presenter::Presenter;
use crate::process::{ProcessControl, UnixProcesses};
use crate::services::{StopSignalFailed, await_startup, stop_and_harvest};

use anyhow::Result;
use std::time::Instant;

/// Toggle controller: starts a worker when none is recording, otherwise stops
/// the running one and collects its transcript.
///
/// There is no state between invocations beyond the mailbox. Each call looks at
/// the liveness marker and the process it names to decide what to do.
pub struct App {
    worker: WorkerConfig,
    timeouts: Timeouts,
    startup_policy: StartupTimeoutPolicy,
    mailbox: Mailbox,
    launcher: Box<dyn Launcher>,
    processes: Box<dyn ProcessControl>,
    /// Why the configuration could not be loaded; only blocks starting
    config_error: Option<String>,
    invoked_at: Instant,
}

impl App {
    pub fn new(config: &Config) -> Self {
        Self::with_parts(
            config.resolve_worker(),
            config.timeouts(),
            config.on_startup_timeout,
            Mailbox::default(),
            Box::new(DetachedLauncher),
            Box::new(UnixProcesses),
        )
    }

    pub fn with_parts(
        worker: WorkerConfig,
        timeouts: Timeouts,
        startup_policy: StartupTimeoutPolicy,
        mailbox: Mailbox,
        launcher: Box<dyn Launcher>,
        processes: Box<dyn ProcessControl>,
    ) -> Self {
        Self {
            worker,
            timeouts,
            startup_policy,
            mailbox,
            launcher,
            processes,
            config_error: None,
            invoked_at: Instant::now(),
        }
    }

    /// Record a configuration load failure. Stopping a running worker still
    /// works; starting a new one reports the failure instead.
    pub fn with_config_error(mut self, error: Option<String>) -> Self {
        self.config_error = error;
        self
    }

    /// Handle one invocation and hand its outcome to the presenter exactly once
    pub async fn run(&self, presenter: &dyn Presenter) -> Result<Outcome> {
        let outcome = self.handle_toggle().await?;
        self.log_timing("outcome ready");

        presenter.present(&outcome).await?;
        self.log_timing("outcome presented");

        Ok(outcome)
    }

    pub async fn handle_toggle(&self) -> Result<Outcome> {
        let state = self.current_state()?;
        self.log_timing(&format!("state = {:?}", state));

        match state {
            AppState::Idle => self.handle_start_recording().await,
            AppState::Recording { pid } => {
                tracing::debug!("Worker {} is recording", pid);
                self.handle_stop_and_harvest().await
            }
        }
    }

    /// Recording means the marker names a live process. A stale or malformed
    /// marker is removed on the spot.
    pub fn current_state(&self) -> Result<AppState> {
        match self.live_worker_pid()? {
            Some(pid) => Ok(AppState::Recording { pid }),
            None => Ok(AppState::Idle),
        }
    }

    /// PID from the marker if that process is alive, purging the marker otherwise
    fn live_worker_pid(&self) -> Result<Option<u32>> {
        match self.mailbox.read_marker()? {
            Marker::Absent => Ok(None),
            Marker::Invalid(content) => {
                tracing::warn!("Removing marker with invalid PID {:?}", content);
                self.mailbox.clear(Channel::Marker)?;
                Ok(None)
            }
            Marker::Pid(pid) if !self.processes.is_alive(pid) => {
                tracing::info!("Removing stale marker for exited worker {}", pid);
                self.mailbox.clear(Channel::Marker)?;
                Ok(None)
            }
            Marker::Pid(pid) => Ok(Some(pid)),
        }
    }

    async fn handle_start_recording(&self) -> Result<Outcome> {
        if let Some(error) = &self.config_error {
            tracing::error!("Not starting worker: {}", error);
            return Ok(Outcome::ConfigurationError(error.clone()));
        }
        if let Err(e) = self.worker.validate() {
            tracing::error!("Not starting worker: {:#}", e);
            return Ok(Outcome::ConfigurationError(format!("{:#}", e)));
        }
        let spec = match LaunchSpec::for_worker(&self.worker) {
            Ok(spec) => spec,
            Err(e) => return Ok(Outcome::ConfigurationError(format!("{:#}", e))),
        };

        // Leftovers from a crashed cycle must not be read as this cycle's result
        self.mailbox.clear(Channel::Error)?;
        self.mailbox.clear(Channel::Transcript)?;

        tracing::info!("Starting recording");
        let pid = match self.launcher.launch(&spec) {
            Ok(pid) => pid,
            Err(e) => {
                tracing::error!("Failed to launch worker: {:#}", e);
                return Ok(Outcome::Startup(StartupOutcome::FailedWithMessage(format!(
                    "Failed to start recorder: {:#}",
                    e
                ))));
            }
        };
        self.log_timing(&format!("worker {} spawned", pid));

        let outcome =
            await_startup(&self.mailbox, self.timeouts.startup, self.timeouts.poll).await?;
        self.log_timing(&format!("startup {:?}", outcome));

        let outcome = match (outcome, self.startup_policy) {
            (StartupOutcome::TimedOutSilently, StartupTimeoutPolicy::ReportGeneric) => {
                StartupOutcome::FailedWithMessage(format!(
                    "Recorder did not confirm startup within {} ms",
                    self.timeouts.startup.as_millis()
                ))
            }
            (outcome, _) => outcome,
        };

        Ok(Outcome::Startup(outcome))
    }

    async fn handle_stop_and_harvest(&self) -> Result<Outcome> {
        // The worker may have exited since the state was decided
        if !self.mailbox.exists(Channel::Marker) {
            return Ok(Outcome::NoActiveRecording(
                "Start a recording first".to_string(),
            ));
        }
        let Some(pid) = self.live_worker_pid()? else {
            return Ok(no_longer_recording());
        };

        tracing::info!("Stopping recording of worker {}", pid);
        let harvest = stop_and_harvest(
            &self.mailbox,
            self.processes.as_ref(),
            pid,
            self.timeouts.transcription,
            self.timeouts.poll,
        )
        .await;

        let outcome = match harvest {
            Ok(outcome) => outcome,
            Err(e)
                if e.downcast_ref::<StopSignalFailed>().is_some()
                    && !self.processes.is_alive(pid) =>
            {
                tracing::warn!("Worker {} vanished before it could be stopped: {:#}", pid, e);
                self.mailbox.clear(Channel::Marker)?;
                return Ok(no_longer_recording());
            }
            Err(e) => return Err(e),
        };
        self.log_timing(&format!("harvest {:?}", outcome));

        if matches!(
            outcome,
            HarvestOutcome::Success(_) | HarvestOutcome::EmptyResult
        ) {
            self.mailbox.clear(Channel::Marker)?;
        }

        Ok(Outcome::Harvest(outcome))
    }

    fn log_timing(&self, label: &str) {
        tracing::debug!("+{}ms: {}", self.invoked_at.elapsed().as_millis(), label);
    }
}

fn no_longer_recording() -> Outcome {
    Outcome::NoActiveRecording("Recording has already ended".to_string())
}
