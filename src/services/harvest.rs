use crate::mailbox::{Channel, Mailbox};
use crate::messages::HarvestOutcome;
use crate::process::ProcessControl;
use anyhow::Result;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Context attached when the stop signal could not be delivered. Failures
/// while collecting the result never carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopSignalFailed {
    pub pid: u32,
}

impl fmt::Display for StopSignalFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Could not signal worker {} to stop", self.pid)
    }
}

/// Signal a recording worker to stop, then wait for its result.
///
/// Every tick takes the error channel before the transcript channel, so a
/// worker that writes both within one poll interval is reported as failed.
pub async fn stop_and_harvest(
    mailbox: &Mailbox,
    processes: &dyn ProcessControl,
    pid: u32,
    window: Duration,
    poll: Duration,
) -> Result<HarvestOutcome> {
    processes
        .send_stop(pid)
        .map_err(|e| e.context(StopSignalFailed { pid }))?;

    let started = Instant::now();
    let deadline = started + window;

    loop {
        if let Some(message) = mailbox.take(Channel::Error)? {
            tracing::warn!("Worker reported an error: {}", message);
            return Ok(HarvestOutcome::FailedWithMessage(message));
        }

        if let Some(text) = mailbox.take(Channel::Transcript)? {
            tracing::info!(
                "Transcript received after {:?}: {} chars",
                started.elapsed(),
                text.len()
            );
            return Ok(if text.is_empty() {
                HarvestOutcome::EmptyResult
            } else {
                HarvestOutcome::Success(text)
            });
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::warn!("No result from worker {} within {:?}", pid, window);
            return Ok(HarvestOutcome::TimedOut);
        }
        tokio::time::sleep(poll.min(deadline - now)).await;
    }
}
