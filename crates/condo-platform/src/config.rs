use std::path::PathBuf;

use anyhow::{Context, Result};

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub database_url: String,
    pub http_addr: String,
    pub upload_dir: PathBuf,
    /// Raw `NAME=rate,NAME=rate` overrides for the correction index table.
    pub correction_index_rates: Option<String>,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let http_addr =
            std::env::var("HTTP_ADDR").unwrap_or_else(|_| default_http_addr.to_string());
        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string());
        let correction_index_rates = std::env::var("CORRECTION_INDEX_RATES")
            .ok()
            .filter(|raw| !raw.trim().is_empty());

        Ok(Self {
            database_url,
            http_addr,
            upload_dir: PathBuf::from(upload_dir),
            correction_index_rates,
        })
    }
}
