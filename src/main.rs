use triage::{app, config::AppConfig, state::AppState, users::services::seed_admin};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "triage=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let (state, pool) = AppState::init(config).await?;

    if let Some(pool) = &pool {
        sqlx::migrate!("./migrations").run(pool).await?;
        tracing::info!("migrations applied");
    }

    if let Some(seed) = &state.config.admin {
        seed_admin(state.store.as_ref(), seed).await?;
    }

    let config = state.config.clone();
    app::serve(app::build_app(state), &config).await
}
