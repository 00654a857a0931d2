use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{api, auth, auth::SharedState, users};

/// Assemble the whole HTTP surface. Everything under `/api/tasks`,
/// `/api/users` and logout requires a valid bearer token.
pub fn build_router(state: SharedState, cors_origin: Option<&str>) -> Router {
    let protected = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route(
            "/api/tasks",
            get(api::list_tasks)
                .post(api::create_task)
                .layer(DefaultBodyLimit::max(state.max_upload_bytes)),
        )
        .route(
            "/api/tasks/:id",
            get(api::get_task).put(api::update_task).delete(api::delete_task),
        )
        .route("/api/tasks/:id/documents/:stored_name", get(api::download_document))
        .route("/api/users", get(users::list_users))
        .route(
            "/api/users/:id",
            get(users::get_user).put(users::update_user).delete(users::delete_user),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::auth_middleware));

    Router::new()
        .route("/", get(api::index))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origin))
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origin.and_then(|o| o.parse::<HeaderValue>().ok()) {
        Some(origin) => layer.allow_origin(origin),
        None => layer.allow_origin(Any),
    }
}
