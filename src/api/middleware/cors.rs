use axum::Router;
use tower_http::cors::{Any, CorsLayer};

/// The dashboard front-end may be served from a different origin.
pub fn add_cors(router: Router) -> Router {
    router.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}
