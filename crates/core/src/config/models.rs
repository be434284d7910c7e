use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::validation::{ConfigValidator, ValidationUtils};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://rrrspec.db?mode=rwc".to_string(),
            max_connections: 5,
            min_connections: 1,
            connection_timeout_seconds: 30,
            idle_timeout_seconds: 600,
        }
    }
}

impl ConfigValidator for DatabaseConfig {
    fn validate(&self) -> Result<()> {
        ValidationUtils::validate_not_empty(&self.url, "database.url")?;
        if !self.url.starts_with("sqlite:") {
            bail!("database.url must start with sqlite:");
        }

        ValidationUtils::validate_count(
            self.max_connections as usize,
            "database.max_connections",
            1000,
        )?;
        if self.min_connections > self.max_connections {
            bail!("database.min_connections must be less than or equal to max_connections");
        }

        ValidationUtils::validate_timeout_seconds(
            self.connection_timeout_seconds,
            "database.connection_timeout_seconds",
        )?;
        ValidationUtils::validate_timeout_seconds(
            self.idle_timeout_seconds,
            "database.idle_timeout_seconds",
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersisterConfig {
    /// 外部化日志文件的根目录
    pub execute_log_text_path: String,
    /// JSON缓存根目录，文件写到 `<path>/v1/tasksets/`
    pub json_cache_path: String,
    /// 超过该字节数的日志写入外部文件
    pub log_externalize_threshold_bytes: usize,
}

impl Default for PersisterConfig {
    fn default() -> Self {
        Self {
            execute_log_text_path: "data/log_text".to_string(),
            json_cache_path: "data/json_cache".to_string(),
            log_externalize_threshold_bytes: 64 * 1024,
        }
    }
}

impl ConfigValidator for PersisterConfig {
    fn validate(&self) -> Result<()> {
        ValidationUtils::validate_not_empty(
            &self.execute_log_text_path,
            "persister.execute_log_text_path",
        )?;
        ValidationUtils::validate_not_empty(&self.json_cache_path, "persister.json_cache_path")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// 失败Task的重新入队位置: front | back
    pub retry_ordering: String,
    /// 每个监听者的事件队列容量
    pub notification_buffer: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            retry_ordering: "front".to_string(),
            notification_buffer: 256,
        }
    }
}

impl ConfigValidator for DispatcherConfig {
    fn validate(&self) -> Result<()> {
        ValidationUtils::validate_one_of(
            &self.retry_ordering,
            "dispatcher.retry_ordering",
            &["front", "back"],
        )?;
        ValidationUtils::validate_count(
            self.notification_buffer,
            "dispatcher.notification_buffer",
            65536,
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// json | pretty
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl ConfigValidator for LoggingConfig {
    fn validate(&self) -> Result<()> {
        ValidationUtils::validate_one_of(
            &self.level.to_lowercase(),
            "logging.level",
            &["trace", "debug", "info", "warn", "error"],
        )?;
        ValidationUtils::validate_one_of(&self.format, "logging.format", &["json", "pretty"])?;
        Ok(())
    }
}
