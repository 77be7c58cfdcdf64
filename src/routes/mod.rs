use axum::{routing::get, Router};

use crate::state::AppState;

pub mod activity;
pub mod buildings;
pub mod complaints;
pub mod employees;
pub mod expenses;
pub mod handovers;
pub mod health;
pub mod identity;
pub mod notices;
pub mod payments;
pub mod reports;
pub mod tenants;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/me", get(identity::me))
        .merge(buildings::router())
        .merge(tenants::router())
        .merge(payments::router())
        .merge(expenses::router())
        .merge(employees::router())
        .merge(handovers::router())
        .merge(notices::router())
        .merge(complaints::router())
        .merge(reports::router())
        .merge(activity::router())
}
