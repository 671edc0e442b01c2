use std::time::Duration;
use tracing::warn;

pub const DEFAULT_ANALYSIS_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PORT: u16 = 3000;

/// Configuration for the client service, read from the environment at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the analysis/report backend
    pub analysis_api_url: String,
    pub request_timeout: Duration,
    pub port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            analysis_api_url: DEFAULT_ANALYSIS_API_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            port: DEFAULT_PORT,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let analysis_api_url = lookup("ANALYSIS_API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.analysis_api_url);

        let request_timeout = parse_or(&lookup, "REQUEST_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);
        let port = parse_or(&lookup, "PORT", DEFAULT_PORT);

        Self {
            analysis_api_url,
            request_timeout: Duration::from_secs(request_timeout),
            port,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid {} value {:?}, using {}", key, raw, default);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(ClientConfig::from_lookup(lookup(&[])), ClientConfig::default());
    }

    #[test]
    fn reads_and_normalizes_values() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("ANALYSIS_API_URL", "https://analysis.internal/"),
            ("REQUEST_TIMEOUT_SECS", "45"),
            ("PORT", "8080"),
        ]));
        assert_eq!(config.analysis_api_url, "https://analysis.internal");
        assert_eq!(config.request_timeout, Duration::from_secs(45));
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let config = ClientConfig::from_lookup(lookup(&[("PORT", "eighty"), ("REQUEST_TIMEOUT_SECS", "-1")]));
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.request_timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }
}
