use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Whether the WebSocket route pushes a fresh user list to everyone on
    /// connect/disconnect. Broadcasting is caller policy, not router policy,
    /// so it lives here rather than in the router itself.
    pub broadcast_user_list: bool,
}

impl Config {
    fn parse_bool(value: &str) -> bool {
        value.eq_ignore_ascii_case("true") || value == "1"
    }

    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let broadcast_user_list = env::var("BROADCAST_USER_LIST")
            .ok()
            .map(|v| Self::parse_bool(&v))
            .unwrap_or(true);

        Ok(Self {
            port,
            broadcast_user_list,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            broadcast_user_list: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_true_and_one() {
        assert!(Config::parse_bool("true"));
        assert!(Config::parse_bool("TRUE"));
        assert!(Config::parse_bool("1"));
        assert!(!Config::parse_bool("0"));
        assert!(!Config::parse_bool("false"));
        assert!(!Config::parse_bool("yes"));
    }

    #[test]
    fn default_config_broadcasts_user_list() {
        let cfg = Config::default();
        assert_eq!(cfg.port, 3000);
        assert!(cfg.broadcast_user_list);
    }
}
