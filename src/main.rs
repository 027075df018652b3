use std::sync::Arc;

use tower_http::cors::CorsLayer;

use fluentpro::ai::{HttpSearchClient, create_embedding_client};
use fluentpro::config::Config;
use fluentpro::matching::{RoleIndexer, RoleMatchingEngine};
use fluentpro::onboarding::{OnboardingManager, OnboardingRouteState, onboarding_routes};
use fluentpro::store::LibSqlBackend;

/// Industries seeded into an empty catalog on first start.
const DEFAULT_INDUSTRIES: &[&str] = &[
    "Technology",
    "Healthcare",
    "Finance",
    "Education",
    "Hospitality",
    "Retail",
];

/// Communication partners seeded into an empty catalog on first start.
const DEFAULT_PARTNERS: &[&str] = &[
    "Clients",
    "Colleagues",
    "Senior Management",
    "Suppliers",
    "Stakeholders",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("  export OPENAI_API_KEY=sk-...");
            eprintln!("  export FLUENTPRO_SEARCH_ENDPOINT=https://...");
            eprintln!("  export FLUENTPRO_SEARCH_API_KEY=...");
            std::process::exit(1);
        }
    };

    eprintln!("🌐 FluentPro onboarding API v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Embedding model: {}", config.embedding.model);
    eprintln!("   Search endpoint: {}", config.search.endpoint);
    eprintln!("   API: http://0.0.0.0:{}/api\n", config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let db = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
    eprintln!("   Database: {}", config.db_path.display());

    // Idempotent catalog seeding — INSERT OR IGNORE keyed on name.
    for name in DEFAULT_INDUSTRIES {
        db.insert_industry(name).await?;
    }
    for name in DEFAULT_PARTNERS {
        db.insert_partner(name, true).await?;
    }

    // ── AI clients ──────────────────────────────────────────────────────
    let embedder = create_embedding_client(&config.embedding)?;
    let search = Arc::new(HttpSearchClient::new(&config.search)?);

    // ── Role matching ───────────────────────────────────────────────────
    let (indexer, _indexer_handle) = RoleIndexer::spawn(
        config.indexer.clone(),
        embedder.clone(),
        search.clone(),
        db.clone(),
    );
    let engine = Arc::new(RoleMatchingEngine::new(
        embedder,
        search,
        db.clone(),
        indexer,
    ));

    // ── Onboarding ──────────────────────────────────────────────────────
    let manager = Arc::new(OnboardingManager::new(
        db.clone(),
        db.clone(),
        db.clone(),
        db.clone(),
        engine.clone(),
    ));

    let app = onboarding_routes(OnboardingRouteState { manager, engine })
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Onboarding API started");
    axum::serve(listener, app).await?;

    Ok(())
}
