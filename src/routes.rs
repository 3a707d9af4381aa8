// src/routes.rs

use std::sync::Arc;

use axum::{
    Router, http::Method, middleware,
    routing::{delete, get, post},
};
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, quizzes, user_groups},
    state::AppState,
    utils::jwt::{auth_middleware, optional_auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, quizzes, groups).
/// * Applies global middleware (Trace, CORS) and rate limiting on auth.
/// * Injects global state (Database Pool + Config).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    // Credential endpoints are the brute-force target; keep them slow.
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(5)
        .burst_size(20)
        .finish()
        .unwrap();
    let governor_conf = Arc::new(governor_conf);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(GovernorLayer::new(governor_conf));

    // Quiz routes serve anonymous visitors (public quizzes) and signed-in
    // users alike; handlers that mutate require claims themselves.
    let quiz_routes = Router::new()
        .route("/", get(quizzes::list_quizzes).post(quizzes::create_quiz))
        .route(
            "/{id}",
            get(quizzes::get_quiz)
                .put(quizzes::update_quiz)
                .delete(quizzes::delete_quiz),
        )
        .route("/{id}/evaluation", post(quizzes::evaluate_quiz))
        .route("/{id}/history", get(quizzes::quiz_history))
        .route("/{id}/shares", post(quizzes::share_quiz))
        .route("/{id}/shares/{group_id}", delete(quizzes::unshare_quiz))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            optional_auth_middleware,
        ));

    let group_routes = Router::new()
        .route(
            "/",
            get(user_groups::list_groups).post(user_groups::create_group),
        )
        .route(
            "/{id}",
            get(user_groups::get_group)
                .put(user_groups::update_group)
                .delete(user_groups::delete_group),
        )
        .route("/{id}/members", post(user_groups::add_member))
        .route(
            "/{id}/members/{user_id}",
            delete(user_groups::remove_member),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/groups", group_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
