//! 服务配置
//!
//! 加载顺序：内置默认值 → TOML配置文件 → `RRRSPEC__` 前缀的环境变量，
//! 后者覆盖前者。例如 `RRRSPEC__PERSISTER__JSON_CACHE_PATH=/var/cache/rrrspec`。

pub mod models;
pub mod validation;

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

pub use models::{DatabaseConfig, DispatcherConfig, LoggingConfig, PersisterConfig};
pub use validation::{ConfigValidator, ValidationUtils};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub database: DatabaseConfig,
    pub persister: PersisterConfig,
    pub dispatcher: DispatcherConfig,
    pub logging: LoggingConfig,
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults =
            ConfigBuilder::try_from(&ServerConfig::default()).context("生成默认配置失败")?;
        let mut builder = ConfigBuilder::builder().add_source(defaults);

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("RRRSPEC")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: ServerConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: ServerConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for ServerConfig {
    fn validate(&self) -> Result<()> {
        self.database.validate()?;
        self.persister.validate()?;
        self.dispatcher.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
