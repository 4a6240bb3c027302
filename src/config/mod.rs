//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origin for CORS (comma-separated)
    pub client_origin: String,

    /// HMAC secret for JWT verification
    pub jwt_secret: String,

    /// Physics step length in milliseconds
    pub physics_tick_ms: u64,
    /// Snapshot broadcast period in milliseconds
    pub network_tick_ms: u64,
    /// Regulation time in seconds
    pub game_duration_secs: u64,
    /// Overtime length in seconds, granted once on a tie
    pub overtime_secs: u64,
    /// Minimum interval between successful kicks by one player
    pub kick_cooldown_ms: u64,
    /// How far back kick validation may rewind entity history
    pub lag_comp_window_ms: u64,

    /// Path to the collision rectangle data file
    pub collision_file: String,
    /// Path to the goal zone data file
    pub goal_file: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,

            physics_tick_ms: parse_var("PHYSICS_TICK_MS", 16)?,
            network_tick_ms: parse_var("NETWORK_TICK_MS", 25)?,
            game_duration_secs: parse_var("GAME_DURATION_SECS", 300)?,
            overtime_secs: parse_var("OVERTIME_SECS", 60)?,
            kick_cooldown_ms: parse_var("KICK_COOLDOWN_MS", 300)?,
            lag_comp_window_ms: parse_var("LAG_COMP_WINDOW_MS", 500)?,

            collision_file: env::var("COLLISION_FILE")
                .unwrap_or_else(|_| "data/collisions.json".to_string()),
            goal_file: env::var("GOAL_FILE").unwrap_or_else(|_| "data/goals.json".to_string()),
        })
    }
}

fn parse_var(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidNumber(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Environment variable {0} is not a valid number")]
    InvalidNumber(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_uses_default_when_unset() {
        assert_eq!(parse_var("GOALLINE_TEST_UNSET_VAR", 42).unwrap(), 42);
    }
}
