/**
 * Chatline Server Entry Point
 *
 * Loads `.env`, initializes tracing from `RUST_LOG` (default `info`), builds
 * the application and serves it until Ctrl-C.
 */

use chatline::backend::server::{create_app, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let config = ServerConfig::from_env()?;
    let addr = config.bind_address();
    let app = create_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("[Server] Listening on {}", addr);

    let token = app.shutdown_token();
    axum::serve(listener, app.router.clone())
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("[Server] Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            token.cancel();
        })
        .await?;

    app.shutdown().await;
    Ok(())
}
