// Application configuration, read from the environment

use tracing::warn;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_RUNNER_TIMEOUT_MS: u64 = 5000;
pub const MIN_RUNNER_TIMEOUT_MS: u64 = 1;
pub const DEFAULT_HISTORY_PAGE_SIZE: usize = 20;
pub const MAX_HISTORY_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerBackend {
    /// Fixed output for every run, no execution at all
    Placeholder,
    /// Hand runs to an external executor over the Redis runner queue
    Queue,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub bind_addr: String,
    pub store_backend: StoreBackend,
    pub runner_backend: RunnerBackend,
    pub runner_timeout_ms: u64,
    pub history_page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            store_backend: StoreBackend::Memory,
            runner_backend: RunnerBackend::Placeholder,
            runner_timeout_ms: DEFAULT_RUNNER_TIMEOUT_MS,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unknown or malformed values keep the default
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let store_backend = match lookup("STORE_BACKEND").as_deref().map(str::to_lowercase) {
            None => defaults.store_backend,
            Some(value) => match value.as_str() {
                "memory" => StoreBackend::Memory,
                "redis" => StoreBackend::Redis,
                other => {
                    warn!(value = %other, "Unknown STORE_BACKEND, using memory");
                    defaults.store_backend
                }
            },
        };

        let runner_backend = match lookup("RUNNER_BACKEND").as_deref().map(str::to_lowercase) {
            None => defaults.runner_backend,
            Some(value) => match value.as_str() {
                "placeholder" => RunnerBackend::Placeholder,
                "queue" => RunnerBackend::Queue,
                other => {
                    warn!(value = %other, "Unknown RUNNER_BACKEND, using placeholder");
                    defaults.runner_backend
                }
            },
        };

        let history_page_size = parse_or(
            "HISTORY_PAGE_SIZE",
            lookup("HISTORY_PAGE_SIZE"),
            defaults.history_page_size,
        )
        .clamp(1, MAX_HISTORY_PAGE_SIZE);

        let mut runner_timeout_ms = parse_or(
            "RUNNER_TIMEOUT_MS",
            lookup("RUNNER_TIMEOUT_MS"),
            defaults.runner_timeout_ms,
        );
        if runner_timeout_ms < MIN_RUNNER_TIMEOUT_MS {
            warn!(value = runner_timeout_ms, "RUNNER_TIMEOUT_MS too small, raising it");
            runner_timeout_ms = MIN_RUNNER_TIMEOUT_MS;
        }

        Self {
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            store_backend,
            runner_backend,
            runner_timeout_ms,
            history_page_size,
        }
    }
}

fn parse_or<T: std::str::FromStr + Copy>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key = %key, value = %raw, "Invalid numeric setting, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.redis_url, DEFAULT_REDIS_URL);
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.runner_backend, RunnerBackend::Placeholder);
        assert_eq!(config.runner_timeout_ms, 5000);
        assert_eq!(config.history_page_size, 20);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("REDIS_URL", "redis://cache:6379"),
            ("STORE_BACKEND", "Redis"),
            ("RUNNER_BACKEND", "queue"),
            ("RUNNER_TIMEOUT_MS", "1500"),
            ("HISTORY_PAGE_SIZE", "500"),
        ]));
        assert_eq!(config.redis_url, "redis://cache:6379");
        assert_eq!(config.store_backend, StoreBackend::Redis);
        assert_eq!(config.runner_backend, RunnerBackend::Queue);
        assert_eq!(config.runner_timeout_ms, 1500);
        assert_eq!(config.history_page_size, MAX_HISTORY_PAGE_SIZE);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let config = Config::from_lookup(lookup_from(&[
            ("STORE_BACKEND", "mongo"),
            ("RUNNER_TIMEOUT_MS", "soon"),
        ]));
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.runner_timeout_ms, DEFAULT_RUNNER_TIMEOUT_MS);
    }

    #[test]
    fn test_zero_runner_timeout_is_raised() {
        let config = Config::from_lookup(lookup_from(&[("RUNNER_TIMEOUT_MS", "0")]));
        assert_eq!(config.runner_timeout_ms, MIN_RUNNER_TIMEOUT_MS);
    }
}
