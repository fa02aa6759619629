// Numan Thabit 2025
use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::{net::TcpListener, time::Instant};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{collector::SolanaCollector, exposition, metrics::ExporterMetrics, rpc::SolanaRpc};

struct AppState<C> {
    collector: Arc<SolanaCollector<C>>,
    metrics: ExporterMetrics,
}

impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            collector: self.collector.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

pub fn router<C>(collector: Arc<SolanaCollector<C>>, metrics: ExporterMetrics) -> Router
where
    C: SolanaRpc + 'static,
{
    Router::new()
        .route("/metrics", get(metrics_handler::<C>))
        .route("/healthz", get(health_handler))
        .with_state(AppState { collector, metrics })
        .layer(TraceLayer::new_for_http())
}

pub async fn serve<C, F>(
    bind: SocketAddr,
    collector: Arc<SolanaCollector<C>>,
    metrics: ExporterMetrics,
    shutdown: F,
) -> Result<()>
where
    C: SolanaRpc + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let router = router(collector, metrics);

    info!(bind = %bind, "HTTP server listening");
    let listener = TcpListener::bind(bind).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

async fn metrics_handler<C: SolanaRpc>(State(state): State<AppState<C>>) -> Response {
    let started = Instant::now();
    let emissions = state.collector.collect().await;
    state
        .metrics
        .observe_scrape(started.elapsed().as_secs_f64());

    match exposition::render(state.collector.descriptors(), &emissions, &state.metrics) {
        Ok(body) => {
            (StatusCode::OK, [(CONTENT_TYPE, exposition::CONTENT_TYPE)], body).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
