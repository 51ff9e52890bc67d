//! HTTP UI and JSON API.
//!
//! Everything under `/api` except `/api/login` sits behind the cookie
//! middleware in [`auth`]. UI pages are static and talk to the API from the
//! browser.

pub mod assets;
pub mod auth;
pub mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::app::{AppContext, Result};

pub type AppState = Arc<AppContext>;

pub fn router(ctx: AppState) -> Router {
    let api = Router::new()
        .route(
            "/configuration",
            get(handlers::get_configuration).post(handlers::save_configuration),
        )
        .route("/feed", get(handlers::feed))
        .route(
            "/items/:key",
            get(handlers::get_item).post(handlers::set_item_read),
        )
        .route("/refresh", get(handlers::refresh))
        .route("/status", get(handlers::status))
        .route_layer(from_fn_with_state(ctx.clone(), auth::require_user))
        .route("/login", post(handlers::login));

    Router::new()
        .route("/", get(handlers::index))
        .route("/login", get(handlers::login_page))
        .route("/logout", get(handlers::logout))
        .route("/feed", get(handlers::feed_page))
        .route("/settings", get(handlers::settings_page))
        .route("/status", get(handlers::status_page))
        .route("/favicon.ico", get(handlers::favicon))
        .route("/static/*path", get(handlers::static_file))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Serves until `shutdown` resolves.
pub async fn serve<F>(ctx: AppState, address: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(address).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(ctx).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
