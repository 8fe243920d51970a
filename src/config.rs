use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_dbname: String,
    pub scraping_agent_api_url: String,
    pub scraping_agent_token: String,
    pub api_access_token: String,
    pub redis_url: String,
    pub maximum_batch_size: usize,
    pub maximum_batches_to_process: usize,
    pub scraper_cache_max_size: usize,
    pub max_listing_pages: u32,
    pub timezone: String,
    pub agent_bind_addr: String,
    pub ingestor_bind_addr: String,
    pub admin_password: String,
    pub session_secret: String,
}

impl Config {
    /// Load configuration from environment variables, loading a `.env` file
    /// first if one is present (development convenience).
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            mongo_uri: env::var("MONGO_URI").context("MONGO_URI must be set")?,
            mongo_dbname: env::var("MONGO_DBNAME").context("MONGO_DBNAME must be set")?,
            scraping_agent_api_url: env::var("SCRAPING_AGENT_API_URL")
                .context("SCRAPING_AGENT_API_URL must be set")?,
            scraping_agent_token: env::var("SCRAPING_AGENT_TOKEN")
                .context("SCRAPING_AGENT_TOKEN must be set")?,
            api_access_token: env::var("API_ACCESS_TOKEN")
                .context("API_ACCESS_TOKEN must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            maximum_batch_size: env::var("MAXIMUM_BATCH_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("MAXIMUM_BATCH_SIZE must be a valid number")?,
            maximum_batches_to_process: env::var("MAXIMUM_BATCHES_TO_PROCESS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("MAXIMUM_BATCHES_TO_PROCESS must be a valid number")?,
            scraper_cache_max_size: env::var("SCRAPER_CACHE_MAX_SIZE")
                .unwrap_or_else(|_| "17".to_string())
                .parse()
                .context("SCRAPER_CACHE_MAX_SIZE must be a valid number")?,
            max_listing_pages: env::var("MAX_LISTING_PAGES")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("MAX_LISTING_PAGES must be a valid number")?,
            timezone: env::var("TIMEZONE").unwrap_or_else(|_| "Asia/Kolkata".to_string()),
            agent_bind_addr: env::var("AGENT_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8001".to_string()),
            ingestor_bind_addr: env::var("INGESTOR_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            admin_password: env::var("ADMIN_PASSWORD")
                .context("ADMIN_PASSWORD must be set")?,
            session_secret: env::var("SESSION_SECRET").unwrap_or_default(),
        })
    }
}
