// Xcion - social feed core: feeds, session state and content segmentation

// Infrastructure - store, auth, storage and request plumbing
pub mod infrastructure;

// Domain models
pub mod models;

// Stateful cores
pub mod feed;
pub mod session;

// Pure post-body segmentation
pub mod content;

// Domain services and HTTP surface
pub mod api;
pub mod app_state;
pub mod services;

// Common utilities
pub mod config;
pub mod data_seeder;
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};
