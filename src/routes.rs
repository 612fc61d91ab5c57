use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{data, find, public, tenant};
use crate::middleware::tenant_guard;
use crate::state::AppState;

pub fn app(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        // Tenant-scoped API
        .merge(tenant_routes(state.clone()))
        .with_state(state)
        // Global middleware
        .layer(cors(cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn tenant_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/data/:entity", get(data::list).post(data::create))
        .route(
            "/api/data/:entity/:id",
            get(data::get)
                .put(data::update)
                .patch(data::update)
                .delete(data::delete),
        )
        .route("/api/find/:entity", post(find::find).delete(find::delete))
        .route("/api/tenant", get(tenant::current))
        .route_layer(from_fn_with_state(state, tenant_guard))
}

fn cors(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new().allow_origin(allowed).allow_methods(Any).allow_headers(Any)
}
