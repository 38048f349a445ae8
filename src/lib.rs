pub mod error;
pub mod extract;
pub mod hasher;
pub mod models;
pub mod openapi;
pub mod rate_limit; // in-memory rate limiting
pub mod replies;
pub mod repo;
pub mod routes;
pub mod security;
pub mod settings;
pub mod threads;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
