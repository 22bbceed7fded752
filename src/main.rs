// Xcion Server - social feed API over SQLite

use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use xcion::{api::create_app_router, app_state::AppState, config::Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.prepare_local_dirs()?;
    let addr = config.server_address();

    // Initialize application state
    let app_state = AppState::new(config).await?;

    let app = create_app_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    info!(%addr, "Xcion server starting");
    println!("🚀 Xcion server starting on http://{}", addr);
    println!("📋 API Documentation:");
    println!("  POST   /api/v1/auth/signup | signin | signout");
    println!("  GET    /api/v1/feed?feed_type=&user_id=&parent_id=&cursor=");
    println!("  POST   /api/v1/posts                   GET|PATCH|DELETE /api/v1/posts/{{id}}");
    println!("  POST   /api/v1/posts/{{id}}/like        POST /api/v1/posts/{{id}}/bookmark");
    println!("  GET    /api/v1/profiles/{{username}}    PATCH /api/v1/profiles/me");
    println!("  GET|POST /api/v1/follows/{{id}}");
    println!("  GET    /api/v1/search/profiles?q=      GET /api/v1/search/posts?q=");
    println!("  GET    /api/v1/admin/users             PATCH /api/v1/admin/users/{{id}}/role");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
