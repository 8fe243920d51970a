pub mod agent;
pub mod cache;
pub mod config;
pub mod error;
pub mod ingestor;
pub mod models;
pub mod scraper;
pub mod store;
pub mod validation;

pub use config::Config;
pub use error::{ApiError, ScraperError, StoreError};
