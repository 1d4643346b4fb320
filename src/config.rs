use thiserror::Error;

const DEFAULT_DATABASE_URL: &str = "sqlite://tabkeeper.db";
const DEFAULT_HISTORY_LIMIT: u32 = 10;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub database_url: String,
    /// Number of entries shown by the History action
    pub history_limit: u32,
    pub db_max_connections: u32,
}

impl Config {
    /// Read configuration from the process environment (after `dotenv`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let discord_token = lookup("DISCORD_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;

        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let history_limit = parse_positive(&lookup, "HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?;
        let db_max_connections = parse_positive(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?;

        Ok(Config {
            discord_token,
            database_url,
            history_limit,
            db_max_connections,
        })
    }
}

fn parse_positive<F>(lookup: &F, key: &'static str, default: u32) -> Result<u32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => match value.trim().parse::<u32>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::Invalid { key, value }),
        },
    }
}
