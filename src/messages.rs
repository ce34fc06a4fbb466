/// Whether a worker is recording, decided afresh on every invocation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppState {
    Idle,
    Recording { pid: u32 },
}

/// Result of waiting for a freshly launched worker to register
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StartupOutcome {
    Started,
    FailedWithMessage(String),
    /// Neither the marker nor an error appeared within the window
    TimedOutSilently,
}

/// Result of stopping a worker and waiting for its transcript
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HarvestOutcome {
    Success(String),
    /// The worker finished but heard nothing
    EmptyResult,
    FailedWithMessage(String),
    TimedOut,
}

/// The single result of one invocation, handed to the presenter
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    ConfigurationError(String),
    Startup(StartupOutcome),
    NoActiveRecording(String),
    Harvest(HarvestOutcome),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        match self {
            Outcome::ConfigurationError(_) | Outcome::NoActiveRecording(_) => true,
            Outcome::Startup(outcome) => matches!(outcome, StartupOutcome::FailedWithMessage(_)),
            Outcome::Harvest(outcome) => matches!(
                outcome,
                HarvestOutcome::FailedWithMessage(_) | HarvestOutcome::TimedOut
            ),
        }
    }

    /// Short heading for a notification, if this outcome warrants one
    pub fn title(&self) -> Option<&'static str> {
        match self {
            Outcome::ConfigurationError(_) => Some("Configuration error"),
            Outcome::Startup(StartupOutcome::FailedWithMessage(_)) => Some("Recording failed"),
            Outcome::Startup(_) => None,
            Outcome::NoActiveRecording(_) => Some("No active recording"),
            Outcome::Harvest(HarvestOutcome::Success(_)) => None,
            Outcome::Harvest(HarvestOutcome::EmptyResult) => Some("No speech detected"),
            Outcome::Harvest(HarvestOutcome::FailedWithMessage(_)) => Some("Transcription failed"),
            Outcome::Harvest(HarvestOutcome::TimedOut) => Some("Timeout"),
        }
    }

    /// Body text for a notification
    pub fn message(&self) -> &str {
        match self {
            Outcome::ConfigurationError(message)
            | Outcome::NoActiveRecording(message)
            | Outcome::Startup(StartupOutcome::FailedWithMessage(message))
            | Outcome::Harvest(HarvestOutcome::FailedWithMessage(message)) => message.as_str(),
            Outcome::Startup(StartupOutcome::Started) => "Recording started",
            Outcome::Startup(StartupOutcome::TimedOutSilently) => "Recorder is still starting",
            Outcome::Harvest(HarvestOutcome::Success(text)) => text.as_str(),
            Outcome::Harvest(HarvestOutcome::EmptyResult) => "Recording was too short or too quiet",
            Outcome::Harvest(HarvestOutcome::TimedOut) => "Transcription took too long",
        }
    }
}
