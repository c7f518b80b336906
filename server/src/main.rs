use cja::{
    server::run_server,
    setup::{setup_sentry, setup_tracing},
};
use tracing::info;

use clipdeck::{routes, state::AppState};

fn main() -> color_eyre::Result<()> {
    // Initialize Sentry for error tracking
    let _sentry_guard = setup_sentry();

    // Create and run the tokio runtime
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()?
        .block_on(async { run_application().await })
}

async fn run_application() -> cja::Result<()> {
    // Initialize tracing
    setup_tracing("clipdeck")?;

    let app_state = AppState::from_env().await?;

    // Spawn application tasks
    info!("Spawning application tasks");
    let futures = spawn_application_tasks(app_state).await?;

    // Wait for all tasks to complete
    futures::future::try_join_all(futures).await?;

    Ok(())
}

/// Spawn all application background tasks
async fn spawn_application_tasks(
    app_state: AppState,
) -> cja::Result<Vec<tokio::task::JoinHandle<cja::Result<()>>>> {
    let mut futures = vec![];

    if is_feature_enabled("SERVER") {
        info!("Server Enabled");
        futures.push(tokio::spawn(run_server(routes::routes(app_state.clone()))));
    } else {
        info!("Server Disabled");
    }

    info!("All application tasks spawned successfully");
    Ok(futures)
}

/// Check if a feature is enabled based on environment variables
fn is_feature_enabled(feature: &str) -> bool {
    std::env::var(format!("{}_DISABLED", feature)).unwrap_or_else(|_| "false".to_string()) != "true"
}
