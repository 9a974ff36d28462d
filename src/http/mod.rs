use axum::Router;

use crate::AppState;

mod auth;
mod error;
mod handlers;
mod routes;

pub use auth::{AdminToken, AuthUser};
pub use error::AppError;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(routes::auth())
        .merge(routes::users())
        .merge(routes::categories())
        .merge(routes::posts())
        .merge(routes::moderation())
        .merge(routes::demands())
        .merge(routes::notifications());

    Router::new()
        .merge(routes::health())
        .nest("/v1", api)
        .with_state(state)
}
