//! Core configuration knobs.
//!
//! Every value ships with the documented default and can be overridden from
//! the environment (`NESTBOARD_*`). The surrounding process loads `.env`
//! before calling [`CoreConfig::from_env`].

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

/// Tunables recognized by the core services.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Hard ceiling for comment nesting. Env: `NESTBOARD_MAX_COMMENT_DEPTH`.
    pub max_comment_depth: i32,
    /// Ceiling for `first`/`last`. Env: `NESTBOARD_MAX_PAGE_SIZE`.
    pub max_page_size: i32,
    /// Page size when post listings omit `first`/`last`.
    /// Env: `NESTBOARD_DEFAULT_POST_PAGE_SIZE`.
    pub default_post_page_size: i32,
    /// Page size when comment listings omit `first`/`last`.
    /// Env: `NESTBOARD_DEFAULT_COMMENT_PAGE_SIZE`.
    pub default_comment_page_size: i32,
    /// Buffered events per subscriber before drops begin.
    /// Env: `NESTBOARD_SUBSCRIBER_CHANNEL_CAPACITY`.
    pub subscriber_channel_capacity: usize,
    /// Cadence of the idle-subscriber reaper.
    /// Env: `NESTBOARD_SUBSCRIBER_CLEANUP_INTERVAL_SECS`.
    pub subscriber_cleanup_interval: Duration,
    /// Idle span after which a subscriber is reaped.
    /// Env: `NESTBOARD_SUBSCRIBER_MAX_IDLE_TIME_SECS`.
    pub subscriber_max_idle_time: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            max_comment_depth: 50,
            max_page_size: 100,
            default_post_page_size: 20,
            default_comment_page_size: 50,
            subscriber_channel_capacity: 100,
            subscriber_cleanup_interval: Duration::from_secs(30 * 60),
            subscriber_max_idle_time: Duration::from_secs(60 * 60),
        }
    }
}

fn env_parse<T: FromStr>(key: &'static str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| AppError::validation(key, format!("cannot parse '{raw}'"))),
        Err(_) => Ok(None),
    }
}

impl CoreConfig {
    /// Defaults overlaid with any `NESTBOARD_*` environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut cfg = CoreConfig::default();

        if let Some(v) = env_parse("NESTBOARD_MAX_COMMENT_DEPTH")? {
            cfg.max_comment_depth = v;
        }
        if let Some(v) = env_parse("NESTBOARD_MAX_PAGE_SIZE")? {
            cfg.max_page_size = v;
        }
        if let Some(v) = env_parse("NESTBOARD_DEFAULT_POST_PAGE_SIZE")? {
            cfg.default_post_page_size = v;
        }
        if let Some(v) = env_parse("NESTBOARD_DEFAULT_COMMENT_PAGE_SIZE")? {
            cfg.default_comment_page_size = v;
        }
        if let Some(v) = env_parse::<u64>("NESTBOARD_SUBSCRIBER_CHANNEL_CAPACITY")? {
            cfg.subscriber_channel_capacity = v as usize;
        }
        if let Some(secs) = env_parse::<u64>("NESTBOARD_SUBSCRIBER_CLEANUP_INTERVAL_SECS")? {
            cfg.subscriber_cleanup_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("NESTBOARD_SUBSCRIBER_MAX_IDLE_TIME_SECS")? {
            cfg.subscriber_max_idle_time = Duration::from_secs(secs);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_comment_depth < 0 {
            return Err(AppError::validation(
                "max_comment_depth",
                "must be non-negative",
            ));
        }
        if self.max_page_size <= 0 {
            return Err(AppError::validation("max_page_size", "must be positive"));
        }
        if self.default_post_page_size <= 0 || self.default_post_page_size > self.max_page_size {
            return Err(AppError::validation(
                "default_post_page_size",
                "must be within (0, max_page_size]",
            ));
        }
        if self.default_comment_page_size <= 0
            || self.default_comment_page_size > self.max_page_size
        {
            return Err(AppError::validation(
                "default_comment_page_size",
                "must be within (0, max_page_size]",
            ));
        }
        if self.subscriber_channel_capacity == 0 {
            return Err(AppError::validation(
                "subscriber_channel_capacity",
                "must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.max_comment_depth, 50);
        assert_eq!(cfg.max_page_size, 100);
        assert_eq!(cfg.default_post_page_size, 20);
        assert_eq!(cfg.default_comment_page_size, 50);
        assert_eq!(cfg.subscriber_channel_capacity, 100);
        assert_eq!(cfg.subscriber_cleanup_interval, Duration::from_secs(1800));
        assert_eq!(cfg.subscriber_max_idle_time, Duration::from_secs(3600));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn oversized_default_page_is_rejected() {
        let cfg = CoreConfig {
            default_post_page_size: 500,
            ..CoreConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
