use std::env;

use dotenv::dotenv;
use log::*;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/**
 * Runtime settings, read from the environment (and a `.env` file when present)
 */
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub listen_addr: String,
    pub max_connections: u32,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_vars(|name| env::var(name).ok())
    }

    /**
     * Build the settings from any source of variables, `lookup` returns `None` for unset ones
     */
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let listen_addr = lookup("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(value) => match value.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "DATABASE_MAX_CONNECTIONS",
                        value,
                    })
                }
            },
        };

        let settings = Self {
            database_url,
            listen_addr,
            max_connections,
        };
        debug!("Loaded settings: listening on {}, {} database connections", settings.listen_addr, settings.max_connections);
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults() {
        let vars = vars(&[("DATABASE_URL", "postgres://localhost/polls")]);
        let settings = Settings::from_vars(|name| vars.get(name).cloned()).expect("settings");
        assert_eq!(settings.listen_addr, "127.0.0.1:8000");
        assert_eq!(settings.max_connections, 5);
    }

    #[test]
    fn test_database_url_required() {
        let vars = vars(&[]);
        assert!(matches!(
            Settings::from_vars(|name| vars.get(name).cloned()),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));
    }

    #[test]
    fn test_invalid_pool_size() {
        let vars = vars(&[
            ("DATABASE_URL", "postgres://localhost/polls"),
            ("DATABASE_MAX_CONNECTIONS", "many"),
        ]);
        assert!(Settings::from_vars(|name| vars.get(name).cloned()).is_err());
    }
}
