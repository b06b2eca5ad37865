use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use docs_rag::core::config::AppPaths;
use docs_rag::core::logging;
use docs_rag::server;
use docs_rag::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = Arc::new(AppPaths::new());
    logging::init(&paths);

    let state = AppState::initialize(paths)
        .await
        .context("Failed to initialize docs server")?;

    let bind_addr = format!("{}:{}", state.settings.server.host, state.settings.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    tracing::info!(
        "Serving docs from {} on {}",
        state.settings.docs.dir.display(),
        addr
    );

    let app: Router = server::router::router(state.clone());
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
