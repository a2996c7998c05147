use crate::{
    classifier::Classifier, config::Config, model_service::ModelService, routes::api_routes,
    telemetry::Metrics,
};
use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    Router,
};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;

/// Room for multipart boundaries and part headers on top of the image itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub struct SharedState<M: ModelService> {
    pub classifier: Arc<Classifier<M>>,
    pub metrics: Arc<Metrics>,
    pub max_upload_bytes: usize,
}

impl<M: ModelService> SharedState<M> {
    pub fn new(classifier: Arc<Classifier<M>>, metrics: Arc<Metrics>, max_upload_bytes: usize) -> Self {
        Self {
            classifier,
            metrics,
            max_upload_bytes,
        }
    }
}

impl<M: ModelService> Clone for SharedState<M> {
    fn clone(&self) -> Self {
        Self {
            classifier: self.classifier.clone(),
            metrics: self.metrics.clone(),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}

fn cors_layer(allowed_origin: &str) -> anyhow::Result<CorsLayer> {
    let origin: HeaderValue = allowed_origin
        .parse()
        .with_context(|| format!("invalid CORS origin: {}", allowed_origin))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]))
}

pub fn build_router<M: ModelService>(
    state: SharedState<M>,
    allowed_origin: &str,
) -> anyhow::Result<Router> {
    let body_limit = state.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Ok(Router::new()
        .merge(api_routes::<M>())
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(allowed_origin)?))
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<M: ModelService>(
        classifier: Arc<Classifier<M>>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let addr = config.server.get_address();

        let metrics = Arc::new(Metrics::new()?);
        let metrics_layer = HttpMetricsLayerBuilder::new().build();

        let state = SharedState::new(classifier, metrics, config.prediction.max_upload_bytes);
        let router = build_router(state, &config.cors.allowed_origin)?.layer(metrics_layer);

        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {}", addr))?;

        Ok(Self { router, listener })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async {
                shutdown_signal().await;
                tracing::info!("Shutdown signal received, starting graceful shutdown");
            })
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
