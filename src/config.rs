//! 运行配置
//! 数据库、日志与角色模板文件，全部来自环境变量

use config::{Config, ConfigError, Environment};
use secrecy::Secret;
use serde::Deserialize;
use std::path::Path;

/// 授权库连接参数
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 连接串，Secret 包装后不会出现在 Debug 输出中；
    /// 只读取内置模板的命令不需要
    pub url: Option<Secret<String>>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

impl DatabaseConfig {
    fn check(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 || self.max_connections < self.min_connections {
            return Err(ConfigError::Message(format!(
                "database pool bounds are inconsistent (min {}, max {})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// trace / debug / info / warn / error
    pub level: String,
    /// json / pretty / compact
    pub format: String,
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["json", "pretty", "compact"];

impl LoggingConfig {
    fn check(&self) -> Result<(), ConfigError> {
        let level = self.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Message(format!(
                "logging.level '{}' is not one of {}",
                self.level,
                LOG_LEVELS.join(", ")
            )));
        }
        let format = self.format.to_lowercase();
        if !LOG_FORMATS.contains(&format.as_str()) {
            return Err(ConfigError::Message(format!(
                "logging.format '{}' is not one of {}",
                self.format,
                LOG_FORMATS.join(", ")
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplatesConfig {
    /// 额外的角色模板文件（toml/json/yaml），与内置模板合并，同名时文件优先
    pub path: Option<String>,
}

impl TemplatesConfig {
    fn check(&self) -> Result<(), ConfigError> {
        match &self.path {
            Some(path) if !Path::new(path).is_file() => Err(ConfigError::Message(format!(
                "templates.path {} does not exist",
                path
            ))),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
}

impl AppConfig {
    /// 读取 AUTHZ_ 前缀的环境变量，层级用双下划线分隔（AUTHZ_DATABASE__URL）
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: AppConfig = Config::builder()
            .set_default("database.max_connections", 4)?
            .set_default("database.min_connections", 1)?
            .set_default("database.acquire_timeout_secs", 10)?
            .set_default("database.idle_timeout_secs", 300)?
            .set_default("database.max_lifetime_secs", 1800)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "compact")?
            .add_source(
                Environment::with_prefix("AUTHZ")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.check()?;
        self.logging.check()?;
        self.templates.check()
    }
}
