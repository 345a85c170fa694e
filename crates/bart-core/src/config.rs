//! Server configuration loaded from the environment.
//!
//! Provider credentials are deliberately *not* read here: each gateway reads
//! its own key at request time (`MISTRAL_API_KEY`, `STABILITY_API_KEY`,
//! `DEEPGRAM_API_KEY`) so a key added to the environment is picked up without
//! a restart and is never held in shared state.

/// Bind settings for the HTTP gateway.
///
/// | Env | Default |
/// |-----|---------|
/// | BART_HOST | 127.0.0.1 |
/// | BART_PORT | 3000 |
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Load from environment; unset or unparsable values fall back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: env_string("BART_HOST", "127.0.0.1"),
            port: env_u16("BART_PORT", 3000),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_addr_joins_host_and_port() {
        let config = ServerConfig {
            host: "0.0.0.0".into(),
            port: 8080,
        };
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn defaults_match_the_documented_table() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
    }
}
