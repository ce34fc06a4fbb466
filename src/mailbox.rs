use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Where the worker writes its PID once it is recording
pub const MARKER_PATH: &str = "/tmp/whisper_go.pid";
/// Where the worker writes the transcript on success
pub const TRANSCRIPT_PATH: &str = "/tmp/whisper_go.transcript";
/// Where the worker writes a human-readable message on failure
pub const ERROR_PATH: &str = "/tmp/whisper_go.error";

/// One of the three single-writer files shared with the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Marker,
    Transcript,
    Error,
}

/// Contents of the liveness marker as seen by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Absent,
    /// Present but not a positive PID
    Invalid(String),
    Pid(u32),
}

/// File-backed mailbox between the coordinator and the worker.
///
/// The worker is the only writer of every channel. The coordinator only reads
/// and deletes, and it is the only reader, so a read followed by a delete is one
/// logical "take". A worker recreating a file between those two steps is an
/// accepted race.
#[derive(Debug, Clone)]
pub struct Mailbox {
    marker: PathBuf,
    transcript: PathBuf,
    error: PathBuf,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self {
            marker: PathBuf::from(MARKER_PATH),
            transcript: PathBuf::from(TRANSCRIPT_PATH),
            error: PathBuf::from(ERROR_PATH),
        }
    }
}

impl Mailbox {
    /// Mailbox with all three channels inside `dir`, using the same file names
    /// as the well-known paths
    #[cfg(test)]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            marker: dir.join("whisper_go.pid"),
            transcript: dir.join("whisper_go.transcript"),
            error: dir.join("whisper_go.error"),
        }
    }

    pub fn path(&self, channel: Channel) -> &Path {
        match channel {
            Channel::Marker => &self.marker,
            Channel::Transcript => &self.transcript,
            Channel::Error => &self.error,
        }
    }

    pub fn exists(&self, channel: Channel) -> bool {
        self.path(channel).exists()
    }

    /// Read the trimmed content of a channel and delete it.
    ///
    /// Returns `None` when the channel is empty. Any error other than not-found
    /// is propagated.
    pub fn take(&self, channel: Channel) -> Result<Option<String>> {
        let path = self.path(channel);

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
        };

        self.clear(channel)?;
        Ok(Some(content.trim().to_string()))
    }

    /// Delete a channel if it exists
    pub fn clear(&self, channel: Channel) -> Result<()> {
        let path = self.path(channel);

        match std::fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!("Removed {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {:?}", path)),
        }
    }

    /// Read the liveness marker without consuming it
    pub fn read_marker(&self) -> Result<Marker> {
        let path = self.path(Channel::Marker);

        match std::fs::read_to_string(path) {
            Ok(content) => {
                let content = content.trim();
                Ok(match parse_pid(content) {
                    Some(pid) => Marker::Pid(pid),
                    None => Marker::Invalid(content.to_string()),
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Marker::Absent),
            Err(e) => Err(e).with_context(|| format!("Failed to read {:?}", path)),
        }
    }
}

/// Parse a decimal PID. Zero, negatives and values outside `pid_t` are rejected.
pub fn parse_pid(content: &str) -> Option<u32> {
    let pid: i32 = content.trim().parse().ok()?;
    (pid > 0).then_some(pid as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mailbox() -> (TempDir, Mailbox) {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = Mailbox::in_dir(dir.path());
        (dir, mailbox)
    }

    #[test]
    fn test_default_paths_match_worker() {
        let mailbox = Mailbox::default();

        assert_eq!(mailbox.path(Channel::Marker), Path::new("/tmp/whisper_go.pid"));
        assert_eq!(
            mailbox.path(Channel::Transcript),
            Path::new("/tmp/whisper_go.transcript")
        );
        assert_eq!(mailbox.path(Channel::Error), Path::new("/tmp/whisper_go.error"));
    }

    #[test]
    fn test_take_trims_and_removes() {
        let (_dir, mailbox) = mailbox();
        std::fs::write(mailbox.path(Channel::Transcript), "  hello world\n").unwrap();

        assert_eq!(
            mailbox.take(Channel::Transcript).unwrap(),
            Some("hello world".to_string())
        );
        assert!(!mailbox.exists(Channel::Transcript));
    }

    #[test]
    fn test_second_take_returns_none() {
        let (_dir, mailbox) = mailbox();
        std::fs::write(mailbox.path(Channel::Error), "boom").unwrap();

        assert_eq!(mailbox.take(Channel::Error).unwrap(), Some("boom".to_string()));
        assert_eq!(mailbox.take(Channel::Error).unwrap(), None);
    }

    #[test]
    fn test_take_empty_file_is_some_empty() {
        let (_dir, mailbox) = mailbox();
        std::fs::write(mailbox.path(Channel::Transcript), "\n").unwrap();

        assert_eq!(mailbox.take(Channel::Transcript).unwrap(), Some(String::new()));
    }

    #[test]
    fn test_clear_missing_is_noop() {
        let (_dir, mailbox) = mailbox();

        mailbox.clear(Channel::Error).unwrap();
        mailbox.clear(Channel::Error).unwrap();
        assert!(!mailbox.exists(Channel::Error));
    }

    #[test]
    fn test_read_marker() {
        let (_dir, mailbox) = mailbox();
        assert_eq!(mailbox.read_marker().unwrap(), Marker::Absent);

        std::fs::write(mailbox.path(Channel::Marker), "4242\n").unwrap();
        assert_eq!(mailbox.read_marker().unwrap(), Marker::Pid(4242));
        // Reading does not consume the marker
        assert!(mailbox.exists(Channel::Marker));

        std::fs::write(mailbox.path(Channel::Marker), "not-a-number").unwrap();
        assert_eq!(
            mailbox.read_marker().unwrap(),
            Marker::Invalid("not-a-number".to_string())
        );
    }

    #[test]
    fn test_parse_pid() {
        assert_eq!(parse_pid("123"), Some(123));
        assert_eq!(parse_pid(" 7 "), Some(7));
        assert_eq!(parse_pid("0"), None);
        assert_eq!(parse_pid("-5"), None);
        assert_eq!(parse_pid(""), None);
        assert_eq!(parse_pid("12abc"), None);
        assert_eq!(parse_pid("99999999999"), None);
    }
}
