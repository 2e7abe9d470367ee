use std::env;
use std::time::Duration;
use anyhow::{Context, Result};

/// Reason reported when the service starts without database settings.
pub const NOT_CONFIGURED_REASON: &str = "DATABASE_URL or DATABASE_NAME not configured";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub request_timeout: Duration,
    /// `Err` carries why storage is unusable: settings missing or invalid.
    /// Never fatal; the service starts with storage unavailable.
    pub database: Result<DatabaseConfig, String>,
    pub environment: Environment,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub name: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Local,
    Production,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse::<u16>()
            .context("PORT must be a valid port number")?;

        let request_timeout_secs = lookup("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|| "30".to_string())
            .parse::<u64>()
            .context("REQUEST_TIMEOUT_SECS must be a valid number of seconds")?;

        let database = DatabaseConfig::from_lookup(&lookup);

        let environment = match lookup("ENV").unwrap_or_else(|| "local".to_string()).as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Local,
        };

        let config = Config {
            port,
            request_timeout: Duration::from_secs(request_timeout_secs),
            database,
            environment,
        };
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("PORT must be greater than 0");
        }

        if self.request_timeout.as_secs() == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than 0");
        }

        Ok(())
    }
}

impl DatabaseConfig {
    /// Reads the database section. Missing or invalid settings come back as
    /// the reason storage is unavailable instead of a startup error.
    pub fn from_lookup<F>(lookup: &F) -> std::result::Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        let name = lookup("DATABASE_NAME").filter(|v| !v.trim().is_empty());

        let (url, name) = match (url, name) {
            (Some(url), Some(name)) => (url, name),
            _ => return Err(NOT_CONFIGURED_REASON.to_string()),
        };

        Self::parse(lookup, url, name)
            .and_then(|config| config.validate().map(|_| config))
            .map_err(|e| format!("Invalid database configuration: {:#}", e))
    }

    fn parse<F>(lookup: &F, url: String, name: String) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_connections = lookup("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be a valid number")?;

        let connection_timeout_secs = lookup("DATABASE_CONNECTION_TIMEOUT")
            .unwrap_or_else(|| "30".to_string())
            .parse::<u64>()
            .context("DATABASE_CONNECTION_TIMEOUT must be a valid number of seconds")?;

        Ok(DatabaseConfig {
            url: url.trim().to_string(),
            name: name.trim().to_string(),
            max_connections,
            connection_timeout: Duration::from_secs(connection_timeout_secs),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.url.starts_with("postgresql://") && !self.url.starts_with("postgres://") {
            anyhow::bail!("DATABASE_URL must start with 'postgresql://' or 'postgres://'");
        }

        if self.name.is_empty() {
            anyhow::bail!("Database name cannot be empty");
        }

        if self.max_connections == 0 {
            anyhow::bail!("Max connections must be greater than 0");
        }

        if self.connection_timeout.as_secs() == 0 {
            anyhow::bail!("Connection timeout must be greater than 0");
        }

        Ok(())
    }

    /// Connection string with the credentials masked, safe for logs.
    pub fn redacted_url(&self) -> String {
        let Some((scheme, rest)) = self.url.split_once("://") else {
            return "<invalid>".to_string();
        };

        match rest.rsplit_once('@') {
            Some((_, host)) => format!("{}://***@{}", scheme, host),
            None => self.url.clone(),
        }
    }
}

/// Log output style, picked from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Production logs are JSON for collectors; local runs get readable text.
    pub fn log_format(&self) -> LogFormat {
        if self.is_production() {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}
