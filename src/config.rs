use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub log_level: String,
    pub fallback_dir: PathBuf,
    pub backlog_interval_secs: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let db_host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
        let db_port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
        let db_name = env::var("DB_DATABASE").unwrap_or_else(|_| "crowdguard".to_string());
        let db_user = env::var("DB_USER").unwrap_or_else(|_| "crowdguard".to_string());
        let db_pwd = env::var("DB_PWD").unwrap_or_else(|_| "crowdguard".to_string());

        let database_url = format!(
            "postgres://{}:{}@{}:{}/{}",
            db_user, db_pwd, db_host, db_port, db_name
        );

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let fallback_dir = env::var("FALLBACK_DIR")
            .unwrap_or_else(|_| "./local-fallback".to_string())
            .into();

        let backlog_interval_secs = env::var("BACKLOG_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .unwrap_or(60);

        Ok(Self {
            database_url,
            log_level,
            fallback_dir,
            backlog_interval_secs,
        })
    }
}
