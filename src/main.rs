mod app;
mod config;
mod launcher;
mod mailbox;
mod messages;
mod presenter;
mod process;
mod services;

use app::App;
use config::Config;
use presenter::DesktopPresenter;

use anyhow::Result;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr; stdout may carry the transcript
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("whisper-toggle invoked");

    // A broken config only blocks starting; a running worker can still be stopped
    let (config, config_error) = Config::load_or_default();

    let app = App::new(&config).with_config_error(config_error.map(|e| format!("{:#}", e)));
    let presenter = DesktopPresenter::new(&config);

    let outcome = app.run(&presenter).await?;

    Ok(if outcome.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
