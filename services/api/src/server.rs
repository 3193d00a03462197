use crate::cli::ServeArgs;
use crate::infra::{
    seed_staff_identity, AppState, InMemoryDocumentStore, LoggingMailer, DEFAULT_STAFF_EMAIL,
};
use crate::routes::with_onboarding_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use fleet_onboarding::config::AppConfig;
use fleet_onboarding::error::AppError;
use fleet_onboarding::telemetry;
use fleet_onboarding::workflows::onboarding::{
    DriverOnboardingService, InMemoryOnboardingStore, OnboardingPolicy,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let policy = OnboardingPolicy::from_config(&config.onboarding)?;
    let store = Arc::new(InMemoryOnboardingStore::new());
    let staff_email = args
        .staff_email
        .take()
        .unwrap_or_else(|| DEFAULT_STAFF_EMAIL.to_string());
    let staff_id = seed_staff_identity(&store, &staff_email).await?;

    let onboarding_service = Arc::new(DriverOnboardingService::new(
        store,
        Arc::new(InMemoryDocumentStore::default()),
        Arc::new(LoggingMailer::default()),
        policy,
    ));

    let app = with_onboarding_routes(onboarding_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, %staff_id, "driver onboarding service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
