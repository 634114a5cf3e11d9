//! Hub configuration
//!
//! Values come from `CHAT_*` environment variables (a `.env` file is
//! loaded by the binary) on top of built-in defaults.

use std::env;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::warn;

use crate::error::AppError;

/// Default WebSocket bind address
pub const DEFAULT_ADDR: &str = "127.0.0.1:2066";
/// Default offline ring capacity
pub const DEFAULT_OFFLINE_NUM: usize = 10;
/// Default broadcast queue capacity
pub const DEFAULT_MESSAGE_QUEUE_LEN: usize = 8;
/// Default per-user mailbox capacity
pub const DEFAULT_MAILBOX_CAPACITY: usize = 32;
/// Default idle timeout for the TCP line transport
pub const DEFAULT_TCP_IDLE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket listener address
    pub addr: String,
    /// Optional TCP line transport address
    pub tcp_addr: Option<String>,
    /// Capacity of every offline ring
    pub offline_num: usize,
    /// Key for reconnection tokens
    pub token_secret: String,
    /// Words masked out of every message
    pub sensitive_words: Vec<String>,
    /// Broadcast queue capacity
    pub message_queue_len: usize,
    pub mailbox_capacity: usize,
    pub tcp_idle_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            tcp_addr: None,
            offline_num: DEFAULT_OFFLINE_NUM,
            token_secret: random_secret(),
            sensitive_words: Vec::new(),
            message_queue_len: DEFAULT_MESSAGE_QUEUE_LEN,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            tcp_idle_timeout: DEFAULT_TCP_IDLE,
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("CHAT_ADDR") {
            config.addr = addr;
        }
        config.tcp_addr = lookup("CHAT_TCP_ADDR").filter(|a| !a.is_empty());

        match lookup("CHAT_TOKEN_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => config.token_secret = secret,
            None => warn!("CHAT_TOKEN_SECRET not set, tokens will not survive a restart"),
        }

        if let Some(words) = lookup("CHAT_SENSITIVE_WORDS") {
            config.sensitive_words = words
                .split(',')
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(raw) = lookup("CHAT_OFFLINE_NUM") {
            config.offline_num = parse_positive("CHAT_OFFLINE_NUM", &raw)?;
        }
        if let Some(raw) = lookup("CHAT_MESSAGE_QUEUE_LEN") {
            config.message_queue_len = parse_positive("CHAT_MESSAGE_QUEUE_LEN", &raw)?;
        }
        if let Some(raw) = lookup("CHAT_MAILBOX_CAPACITY") {
            config.mailbox_capacity = parse_positive("CHAT_MAILBOX_CAPACITY", &raw)?;
        }
        if let Some(raw) = lookup("CHAT_TCP_IDLE_SECS") {
            let secs = parse_positive("CHAT_TCP_IDLE_SECS", &raw)?;
            config.tcp_idle_timeout = Duration::from_secs(secs as u64);
        }

        Ok(config)
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<usize, AppError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(AppError::Config(format!(
            "{} must be a positive integer, got {:?}",
            key, raw
        ))),
    }
}

fn random_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, AppError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.addr, DEFAULT_ADDR);
        assert_eq!(config.offline_num, DEFAULT_OFFLINE_NUM);
        assert_eq!(config.message_queue_len, 8);
        assert_eq!(config.token_secret.len(), 32);
        assert!(config.tcp_addr.is_none());
        assert!(config.sensitive_words.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("CHAT_ADDR", "0.0.0.0:9000"),
            ("CHAT_TCP_ADDR", "0.0.0.0:2020"),
            ("CHAT_OFFLINE_NUM", "5"),
            ("CHAT_TOKEN_SECRET", "s3cret"),
            ("CHAT_SENSITIVE_WORDS", "foo, bar,,baz"),
            ("CHAT_TCP_IDLE_SECS", "30"),
        ])
        .unwrap();

        assert_eq!(config.addr, "0.0.0.0:9000");
        assert_eq!(config.tcp_addr.as_deref(), Some("0.0.0.0:2020"));
        assert_eq!(config.offline_num, 5);
        assert_eq!(config.token_secret, "s3cret");
        assert_eq!(config.sensitive_words, vec!["foo", "bar", "baz"]);
        assert_eq!(config.tcp_idle_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_rejects_zero_capacity() {
        assert!(matches!(
            load(&[("CHAT_MESSAGE_QUEUE_LEN", "0")]),
            Err(AppError::Config(_))
        ));
        assert!(load(&[("CHAT_OFFLINE_NUM", "many")]).is_err());
    }
}
