pub mod health;
pub mod media;
pub mod proxy;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree: the catch-all proxies plus the media proxy.
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(proxy::router()).merge(media::router())
}
