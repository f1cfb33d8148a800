use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub storage_dir: PathBuf,
    pub public_url: String,
    pub jwt_secret: String,
    pub max_upload_mb: usize,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = var("THREADLINE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("THREADLINE_JWT_SECRET is unset or still a placeholder");
        }

        let port = match var("THREADLINE_PORT") {
            Some(v) => v.parse().context("THREADLINE_PORT is not a port number")?,
            None => 3000,
        };
        let max_upload_mb = match var("THREADLINE_MAX_UPLOAD_MB") {
            Some(v) => v.parse().context("THREADLINE_MAX_UPLOAD_MB is not a number")?,
            None => 20,
        };

        Ok(Self {
            host: var("THREADLINE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: var("THREADLINE_DB_PATH")
                .unwrap_or_else(|| "threadline.db".into())
                .into(),
            storage_dir: var("THREADLINE_STORAGE_DIR")
                .unwrap_or_else(|| "./attachments".into())
                .into(),
            public_url: var("THREADLINE_PUBLIC_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", port)),
            jwt_secret,
            max_upload_mb,
            openai_api_key: var("OPENAI_API_KEY").filter(|k| !k.is_empty()),
            openai_base_url: var("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".into()),
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}
