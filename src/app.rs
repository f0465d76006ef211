use std::net::SocketAddr;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::config::{AppConfig, StorageConfig};
use crate::state::AppState;
use crate::{mail, profiles, results, users};

pub fn build_app(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    let uploads = match &state.config.storage {
        StorageConfig::Local { root, .. } => Some(ServeDir::new(root)),
        StorageConfig::S3 { .. } => None,
    };

    let mut app = Router::new().nest(
        "/api/v1",
        Router::new()
            .merge(users::router())
            .merge(profiles::router())
            .merge(results::router())
            .merge(mail::router())
            .route("/health", get(|| async { "ok" })),
    );
    if let Some(dir) = uploads {
        app = app.nest_service("/uploads", dir);
    }

    app.with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, ms, "response");
                        } else {
                            tracing::info!(%status, ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
