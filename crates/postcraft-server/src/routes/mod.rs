pub mod generate;
pub mod health;

use crate::state::AppState;
use axum::Router;

pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(generate::routes(state))
        .merge(health::routes())
}
