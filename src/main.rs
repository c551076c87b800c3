use std::net::SocketAddr;
use std::sync::Arc;
use tenorpool::orchestration::{InMemoryCustody, SystemClock};
use tenorpool::{api, config::Config, db::init_db, Orchestrator, Repository};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    // Initialize database and dependencies
    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));
    let orchestrator = Arc::new(Orchestrator::new(
        repo,
        Arc::new(InMemoryCustody::unlimited()),
        Arc::new(SystemClock),
        config.default_fees(),
        config.pool_queue_depth,
    ));
    match orchestrator.load().await {
        Ok(loaded) => tracing::info!(pools = loaded, "Pool actors started"),
        Err(e) => {
            eprintln!("Failed to load pools: {}", e);
            std::process::exit(1);
        }
    }

    // Create router
    let app = api::create_router(api::AppState::new(orchestrator));

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Server listening on {} (default fees {}/{})",
        addr, config.default_fee, config.default_protocol_fee
    );

    // Run server
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Could not install shutdown handler");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutting down");
    };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
