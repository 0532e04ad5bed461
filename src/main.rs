use std::sync::Arc;

use mimalloc::MiMalloc;
use tracing::info;
use weekly_dashboard::{AppState, Config, SystemClock, logging, router};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();

    let config = Config::load()?;
    let addr = config.bind_addr()?;
    info!(
        data_dir = %config.data_dir.display(),
        archive_dir = %config.archive_dir.display(),
        "configuration loaded"
    );

    let app = router(AppState::new(config, Arc::new(SystemClock)));

    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
