// src/ingest/config.rs
use std::time::Duration;

use crate::error::IngestError;

pub const ENV_HOST: &str = "WAREHOUSE_HOST";
pub const ENV_PORT: &str = "WAREHOUSE_PORT";
pub const ENV_DATABASE: &str = "WAREHOUSE_DATABASE";
pub const ENV_USER: &str = "WAREHOUSE_USER";
pub const ENV_PASSWORD: &str = "WAREHOUSE_PASSWORD";
pub const ENV_SCHEMA: &str = "WAREHOUSE_SCHEMA";

const DEFAULT_PORT: u16 = 5432;

/// Warehouse credentials. Built once at the process boundary and handed to
/// the warehouse sink by reference; the core never reads the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct WarehouseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub schema: Option<String>,
    pub connect_timeout: Duration,
}

// Keeps the password out of logs.
impl std::fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password_len", &self.password.len())
            .field("schema", &self.schema)
            .finish()
    }
}

impl WarehouseConfig {
    /// Reads `WAREHOUSE_*` variables. All missing required variables are
    /// reported in one error.
    pub fn from_env() -> Result<Self, IngestError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as [`Self::from_env`] over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IngestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        let mut missing = Vec::new();
        let mut required = |k: &'static str| {
            let v = get(k);
            if v.is_none() {
                missing.push(k);
            }
            v.unwrap_or_default()
        };
        let host = required(ENV_HOST);
        let database = required(ENV_DATABASE);
        let user = required(ENV_USER);
        let password = required(ENV_PASSWORD);

        if !missing.is_empty() {
            return Err(IngestError::Config(format!(
                "missing warehouse env vars: {}",
                missing.join(", ")
            )));
        }

        let port = match get(ENV_PORT) {
            Some(p) => p
                .trim()
                .parse::<u16>()
                .map_err(|_| IngestError::Config(format!("{ENV_PORT} is not a port: {p:?}")))?,
            None => DEFAULT_PORT,
        };

        let schema = get(ENV_SCHEMA).map(|s| s.trim().to_string());
        if let Some(s) = schema.as_deref() {
            if s.contains('.') {
                return Err(IngestError::Config(format!("invalid {ENV_SCHEMA}: {s:?}")));
            }
            crate::sink::warehouse::validate_table_name(s)
                .map_err(|_| IngestError::Config(format!("invalid {ENV_SCHEMA}: {s:?}")))?;
        }

        Ok(Self {
            host,
            port,
            database,
            user,
            password,
            schema,
            connect_timeout: Duration::from_secs(30),
        })
    }

    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut c = tokio_postgres::Config::new();
        c.host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .password(&self.password)
            .application_name("who-gho-ingest")
            .connect_timeout(self.connect_timeout);
        c
    }
}
