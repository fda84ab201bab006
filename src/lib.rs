pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod scrapers;
pub mod store;
