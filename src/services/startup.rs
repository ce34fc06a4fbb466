use crate::mailbox::{Channel, Mailbox};
use crate::messages::StartupOutcome;
use anyhow::Result;
use std::time::Duration;
use tokio::time::Instant;

/// Wait for a freshly launched worker to register itself.
///
/// Each tick checks for the liveness marker first, then for an error report.
/// When the window runs out the error channel is checked one last time; if it
/// is still empty the worker is presumed slow rather than broken.
pub async fn await_startup(
    mailbox: &Mailbox,
    window: Duration,
    poll: Duration,
) -> Result<StartupOutcome> {
    let started = Instant::now();
    let deadline = started + window;
    let mut polls = 0u32;

    loop {
        if mailbox.exists(Channel::Marker) {
            tracing::debug!(
                "Marker found after {} polls ({:?})",
                polls,
                started.elapsed()
            );
            return Ok(StartupOutcome::Started);
        }

        if mailbox.exists(Channel::Error) {
            break;
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tokio::time::sleep(poll.min(deadline - now)).await;
        polls += 1;
    }

    match mailbox.take(Channel::Error)? {
        Some(message) => {
            tracing::warn!("Worker reported a startup error: {}", message);
            Ok(StartupOutcome::FailedWithMessage(message))
        }
        None => {
            tracing::debug!("No marker after {:?}, worker may still be starting", window);
            Ok(StartupOutcome::TimedOutSilently)
        }
    }
}
