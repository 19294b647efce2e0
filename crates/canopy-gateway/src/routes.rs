//! HTTP route definitions

use crate::config::API_PREFIX;
use crate::handlers::{self, publish};
use crate::{middleware, AppState};
use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Create the main router
pub fn create_router(state: Arc<AppState>) -> Router {
    let versions = format!("{}/v1", state.config.normalized_mount_path());
    let provider_versions = format!("{}/v1", state.config.normalized_provider_mount_path());
    let api = format!("{}/v1", API_PREFIX);

    let modules = Router::new()
        .route(
            "/{organization}/{name}/{provider}/versions",
            get(handlers::list_module_versions),
        )
        .route(
            "/{organization}/{name}/{provider}/{version}/download",
            get(handlers::download_module),
        )
        .route(
            "/{organization}/{name}/{provider}/{version}/archive",
            get(handlers::module_archive),
        );

    // Checksum files share their route position with the platform segment
    // of the archive route
    let providers = Router::new()
        .route(
            "/{organization}/{name}/versions",
            get(handlers::list_provider_versions),
        )
        .route(
            "/{organization}/{name}/{version}/download/{os}/{arch}",
            get(handlers::download_provider),
        )
        .route(
            "/{organization}/{name}/{version}/{os}/{arch}/{file}",
            get(handlers::provider_archive),
        )
        .route(
            "/{organization}/{name}/{version}/{os}",
            get(handlers::provider_release_file),
        );

    let publishing = Router::new()
        .route("/modules", post(publish::register_module))
        .route("/modules/tags", post(publish::publish_tag))
        .route("/modules/configure", post(publish::configure_module))
        .route("/modules/versions/begin", post(publish::begin_module_version))
        .route("/modules/versions/end", post(publish::end_module_version))
        .route(
            "/modules/dependencies",
            post(publish::register_module_dependencies),
        )
        .route(
            "/modules/container-dependencies",
            post(publish::register_container_dependencies),
        )
        .route(
            "/modules/{organization}/{name}/{provider}/{version}/dependencies",
            get(publish::retrieve_module_dependencies),
        )
        .route(
            "/modules/{organization}/{name}/{provider}/{version}/container-dependencies",
            get(publish::retrieve_container_dependencies),
        )
        .route(
            "/modules/{organization}/{name}/{provider}/{version}/source-zip",
            put(publish::upload_source_zip),
        )
        .route("/providers", post(publish::register_provider))
        .route(
            "/providers/versions/begin",
            post(publish::begin_provider_version),
        )
        .route("/providers/versions/end", post(publish::end_provider_version))
        .route(
            "/providers/{organization}/{name}/{version}/binary/{os}/{arch}",
            put(publish::upload_provider_binary_zip),
        )
        .route(
            "/providers/{organization}/{name}/{version}/shasum",
            put(publish::upload_shasum),
        )
        .route(
            "/providers/{organization}/{name}/{version}/shasum-signature",
            put(publish::upload_shasum_signature),
        )
        .route("/releases", post(publish::publish_release));

    Router::new()
        .route("/healthz", get(handlers::health_check))
        .nest(&versions, modules)
        .nest(&provider_versions, providers)
        .nest(&api, publishing)
        // Request ids are assigned before logging sees the request
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
