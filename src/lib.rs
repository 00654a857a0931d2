pub mod api;
pub mod auth;
pub mod blob;
pub mod engine;
pub mod error;
pub mod gate;
pub mod models;
pub mod persist;
pub mod query;
pub mod registry;
pub mod routes;
pub mod scope;
pub mod settings;
pub mod store;
pub mod uploads;
pub mod users;

pub use auth::{AppState, SharedState};
pub use routes::build_router;
pub use settings::Settings;
