use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use voxlink_lib::session::{SessionController, TracingObserver};
use voxlink_lib::state::config::ConfigManager;
use voxlink_lib::utils::logging::init_logging;
use voxlink_lib::utils::AppError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let path = ConfigManager::path_from_env().context("Failed to resolve config path")?;
    let config = ConfigManager::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    let mut session = SessionController::new(config.session_config(), config.basic_auth())
        .with_observer(TracingObserver);
    let mut states = session.subscribe();

    if let Err(e) = session.connect().await {
        let err = AppError::from(e);
        if let Some(hint) = err.recovery_hint() {
            warn!("{}", hint);
        }
        return Err(err).context("Failed to start session");
    }

    info!("Connected, type JSON messages to send them (Ctrl+C to quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if let Err(e) = session.send(line).await {
                        error!("Failed to send message: {}", AppError::from(e).user_message());
                    }
                }
                Ok(None) => {
                    info!("Input closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            },

            Some(state) = states.recv() => {
                if state.is_terminal() {
                    info!("Session ended: {}", state);
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    session.disconnect().await.context("Failed to disconnect")?;
    if let Some(uid) = session.uid() {
        info!(uid = %uid, "Session closed");
    }

    Ok(())
}
