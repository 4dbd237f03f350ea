// src/config/adapters.rs

use std::fs;

use crate::config::config_manager::ConfigData;
use crate::error::ConfigError;

/// 配置来源
pub trait ConfigAdapter: Send + Sync {
    fn load(&self) -> Result<ConfigData, ConfigError>;
}

/// 从 JSON 文件读取配置
pub struct FileConfigAdapter {
    pub path: String,
}

impl FileConfigAdapter {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }
}

impl ConfigAdapter for FileConfigAdapter {
    fn load(&self) -> Result<ConfigData, ConfigError> {
        let content = fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}
