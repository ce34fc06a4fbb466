use crate::config::Config;
use crate::messages::{HarvestOutcome, Outcome};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::task;

/// Delivers the outcome of an invocation to the user
#[async_trait]
pub trait Presenter: Send + Sync {
    async fn present(&self, outcome: &Outcome) -> Result<()>;
}

/// Pastes transcripts into the focused window and shows notices as desktop
/// notifications.
///
/// With `paste_mode = "none"`, or when pasting fails, the transcript is
/// written to stdout instead.
pub struct DesktopPresenter {
    paste_mode: String,
    notifications: bool,
}

impl DesktopPresenter {
    pub fn new(config: &Config) -> Self {
        Self {
            paste_mode: config.paste_mode.clone(),
            notifications: config.notifications,
        }
    }

    async fn deliver_text(&self, text: &str) -> Result<()> {
        match paste_keycodes(&self.paste_mode) {
            Some(keycodes) => {
                if let Err(e) = inject_text(text.to_string(), keycodes).await {
                    tracing::warn!("Paste failed, printing transcript instead: {:#}", e);
                    print_text(text)?;
                }
            }
            None => print_text(text)?,
        }

        Ok(())
    }
}

#[async_trait]
impl Presenter for DesktopPresenter {
    async fn present(&self, outcome: &Outcome) -> Result<()> {
        if let Outcome::Harvest(HarvestOutcome::Success(text)) = outcome {
            return self.deliver_text(text).await;
        }

        let Some(title) = outcome.title() else {
            tracing::info!("{}", outcome.message());
            return Ok(());
        };

        if outcome.is_failure() {
            tracing::error!("{}: {}", title, outcome.message());
        } else {
            tracing::info!("{}: {}", title, outcome.message());
        }

        if self.notifications {
            notify(title, outcome.message()).await;
        }

        Ok(())
    }
}

/// ydotool key sequence for a paste mode, `None` for stdout delivery
fn paste_keycodes(paste_mode: &str) -> Option<&'static str> {
    match paste_mode {
        "none" => None,
        "super" => Some("125:1 47:1 47:0 125:0"), // Super+V
        "ctrl_shift" => Some("29:1 42:1 47:1 47:0 42:0 29:0"), // Ctrl+Shift+V
        _ => Some("29:1 47:1 47:0 29:0"), // Ctrl+V
    }
}

fn print_text(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", text).context("Failed to write transcript to stdout")?;
    stdout.flush().context("Failed to flush stdout")
}

/// Copy text to the clipboard via wl-copy and trigger a paste via ydotool
async fn inject_text(text: String, keycodes: &'static str) -> Result<()> {
    tracing::info!("Injecting text: {} chars", text.len());

    task::spawn_blocking(move || {
        let mut child = Command::new("wl-copy")
            .stdin(Stdio::piped())
            .spawn()
            .context("Failed to spawn wl-copy")?;

        child
            .stdin
            .as_mut()
            .context("Failed to get wl-copy stdin")?
            .write_all(text.as_bytes())
            .context("Failed to write to wl-copy")?;

        let status = child.wait().context("wl-copy failed")?;
        if !status.success() {
            return Err(anyhow::anyhow!("wl-copy exited with {}", status));
        }

        // Wait for clipboard to settle
        std::thread::sleep(Duration::from_millis(120));

        let output = Command::new("ydotool")
            .args(["key", keycodes])
            .output()
            .context("Failed to execute ydotool")?;
        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "ydotool exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        tracing::info!("Text injected successfully");
        Ok::<(), anyhow::Error>(())
    })
    .await
    .context("spawn_blocking failed")??;

    Ok(())
}

/// Best-effort desktop notification; failures are only logged
async fn notify(title: &str, message: &str) {
    let result = tokio::process::Command::new("notify-send")
        .args(["--app-name=whisper-toggle", title, message])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match result {
        Ok(status) if !status.success() => {
            tracing::warn!("notify-send exited with {}", status)
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Failed to run notify-send: {}", e),
    }
}
