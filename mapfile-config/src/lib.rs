use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_ENV: &str = "MAPFILE_CONFIG";

/// 配置根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MapConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub paths: PathConfig,
    #[serde(default)]
    pub formats: FormatConfig,
}

impl MapConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `MAPFILE_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 读取与写出地图时使用的根目录。
#[derive(Debug, Clone, Deserialize)]
pub struct PathConfig {
    /// 非 OS 路径的地图名相对于此目录解析。
    #[serde(default = "PathConfig::default_base_path")]
    pub base_path: PathBuf,
    /// 写出时的开发目录；未设置则沿用 `base_path`。
    #[serde(default)]
    pub dev_path: Option<PathBuf>,
}

impl PathConfig {
    fn default_base_path() -> PathBuf {
        PathBuf::from(".")
    }

    pub fn write_root(&self) -> &Path {
        self.dev_path.as_deref().unwrap_or(&self.base_path)
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            base_path: Self::default_base_path(),
            dev_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormatConfig {
    #[serde(default = "FormatConfig::default_map_extension")]
    pub map_extension: String,
    #[serde(default = "FormatConfig::default_region_extension")]
    pub region_extension: String,
}

impl FormatConfig {
    fn default_map_extension() -> String {
        "map".to_string()
    }

    fn default_region_extension() -> String {
        "reg".to_string()
    }
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            map_extension: Self::default_map_extension(),
            region_extension: Self::default_region_extension(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
