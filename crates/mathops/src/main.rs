use log::{error, info};
use mathops::{access_log_enabled, get_log_level, get_settings, setup_logger, Application};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = get_settings()?;
    let level = get_log_level(settings.level.clone());
    setup_logger(level, vec![String::from("hyper")])?;
    info!(
        "Resolved log level {} (access log: {})",
        level,
        access_log_enabled(level)
    );

    let application = match Application::build(settings, level).await {
        Ok(application) => application,
        Err(e) => {
            error!(target: "http_error", "Failed to start service: {}", e);
            return Err(e);
        }
    };

    application.run_until_stopped().await?;
    Ok(())
}
