use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState};
use crate::cards;
use crate::middleware::{optional_auth, require_auth};
use crate::profile;

/// Upper bound on any request body, multipart uploads included.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// The full HTTP surface: `/api/*` plus static assets under `/uploads`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    // Readable by anyone; a valid token only personalizes `is_liked`.
    let viewer_routes = Router::new()
        .route("/cards", get(cards::list_cards))
        .route("/cards/{card_id}", get(cards::get_card))
        .route("/cards/user/{user_id}", get(cards::list_user_cards))
        .route_layer(middleware::from_fn_with_state(state.clone(), optional_auth))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/profile", put(profile::update_profile))
        .route("/profile/image", post(profile::upload_profile_image))
        .route("/profile/banner", post(profile::upload_profile_banner))
        .route("/cards", post(cards::create_card))
        .route(
            "/cards/{card_id}",
            put(cards::update_card).delete(cards::delete_card),
        )
        .route(
            "/cards/{card_id}/like",
            post(cards::like_card).delete(cards::unlike_card),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let api = Router::new()
        .merge(public_routes)
        .merge(viewer_routes)
        .merge(protected_routes);

    Router::new()
        .nest("/api", api)
        .nest_service("/uploads", ServeDir::new(state.assets.dir()))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
