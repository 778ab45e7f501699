use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use mapfile_config::{FormatConfig, MapConfig, PathConfig};
use mapfile_core::document::MapFile;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod lexer;
mod parser;
mod writer;

pub use parser::parse_map;
pub use writer::{map_to_string, write_map};

#[derive(Debug, Error)]
pub enum MapError {
    #[error("failed to read file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("map not found: {name}")]
    NotFound { name: String },
    #[error("malformed primitive at line {line}: {message}")]
    MalformedPrimitive { line: usize, message: String },
    #[error("malformed entity at line {line}: {message}")]
    MalformedEntity { line: usize, message: String },
    #[error("malformed document at line {line}: {message}")]
    MalformedDocument { line: usize, message: String },
}

impl MapError {
    /// 读写失败或文件缺失，区别于内容格式错误。
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            MapError::Read { .. } | MapError::Write { .. } | MapError::NotFound { .. }
        )
    }

    /// 格式错误所在的行号。
    pub fn line(&self) -> Option<usize> {
        match self {
            MapError::MalformedPrimitive { line, .. }
            | MapError::MalformedEntity { line, .. }
            | MapError::MalformedDocument { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// 地图文本与修改时间的来源。
pub trait MapSource {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;
}

/// 直接访问本地文件系统。
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSource;

impl MapSource for FsSource {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        fs::metadata(path)?.modified()
    }
}

impl<T: MapSource + ?Sized> MapSource for &T {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        (**self).read_to_string(path)
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        (**self).modified(path)
    }
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<MapFile, MapError>;
}

pub trait DocumentSaver {
    fn save(&self, map: &MapFile, path: &Path) -> Result<(), MapError>;
}

/// 地图读写入口：负责路径解析、区域文件优先、加载指令与过期检查。
pub struct MapFacade<S = FsSource> {
    source: S,
    paths: PathConfig,
    formats: FormatConfig,
}

impl MapFacade<FsSource> {
    pub fn new() -> Self {
        Self::from_config(&MapConfig::default())
    }

    pub fn from_config(config: &MapConfig) -> Self {
        Self::with_source(FsSource, config)
    }
}

impl Default for MapFacade<FsSource> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: MapSource> MapFacade<S> {
    pub fn with_source(source: S, config: &MapConfig) -> Self {
        Self {
            source,
            paths: config.paths.clone(),
            formats: config.formats.clone(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// 解析地图。`name` 的扩展名会被忽略：除非 `ignore_region`，
    /// 先尝试区域文件（默认 `.reg`），再尝试 `.map`。
    ///
    /// `os_path` 为假时，名称相对于配置的 `base_path` 解析。
    /// 任何失败都不会产生部分文档。
    pub fn parse(&self, name: &str, ignore_region: bool, os_path: bool) -> Result<MapFile, MapError> {
        let logical = logical_name(name);
        let mut extensions = Vec::with_capacity(2);
        if !ignore_region {
            extensions.push(self.formats.region_extension.as_str());
        }
        extensions.push(self.formats.map_extension.as_str());

        for extension in extensions {
            let path = self.resolve_read_path(&logical, extension, os_path);
            let text = match self.source.read_to_string(&path) {
                Ok(text) => text,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "候选地图文件不存在");
                    continue;
                }
                Err(source) => return Err(MapError::Read { path, source }),
            };
            let file_time = self
                .source
                .modified(&path)
                .map_err(|source| MapError::Read {
                    path: path.clone(),
                    source,
                })?;

            let mut map = parse_map(&text).inspect_err(|err| {
                warn!(path = %path.display(), error = %err, "地图解析失败");
            })?;
            map.mark_loaded(logical.as_str(), path.as_path(), file_time);

            let directives = map.apply_world_directives();
            if !directives.is_empty() {
                info!(
                    removed = directives.removed_entities,
                    override_material = directives.override_material.as_deref().unwrap_or(""),
                    forced_names = directives.forced_names,
                    moved_groups = directives.moved_groups,
                    "已执行世界实体加载指令"
                );
                // 指纹描述指令执行后的文档，写出再读入时保持一致
                map.refresh_geometry_crc();
            }
            info!(
                path = %path.display(),
                version = map.version().number(),
                entities = map.num_entities(),
                crc = %format!("{:08x}", map.geometry_crc()),
                "地图加载完成"
            );
            return Ok(map);
        }

        Err(MapError::NotFound { name: logical })
    }

    /// 以当前格式写出文档，返回实际写入的路径。
    ///
    /// `from_base_path` 为真时写入配置的开发目录（未配置则为 `base_path`）。
    /// 不会修改内存中的文档，也不会刷新其修改时间和指纹。
    pub fn write(
        &self,
        map: &MapFile,
        name: &str,
        extension: &str,
        from_base_path: bool,
    ) -> Result<PathBuf, MapError> {
        let relative = with_extension(name, extension);
        let path = if from_base_path {
            self.paths.write_root().join(relative)
        } else {
            relative
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| MapError::Write {
                path: path.clone(),
                source,
            })?;
        }

        let result = File::create(&path).and_then(|file| {
            let mut out = BufWriter::new(file);
            write_map(map, &mut out)?;
            out.flush()
        });
        result.map_err(|source| MapError::Write {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), entities = map.num_entities(), "地图写出完成");
        Ok(path)
    }

    /// 来源文件的修改时间是否与解析时记录的不同。
    /// 从未解析过或无法获取修改时间时同样返回真。
    pub fn needs_reload(&self, map: &MapFile) -> bool {
        let (Some(path), Some(recorded)) = (map.source_path(), map.file_time()) else {
            return true;
        };
        match self.source.modified(path) {
            Ok(current) => current != recorded,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "无法获取地图修改时间");
                true
            }
        }
    }

    fn resolve_read_path(&self, logical: &str, extension: &str, os_path: bool) -> PathBuf {
        let relative = with_extension(logical, extension);
        if os_path {
            relative
        } else {
            self.paths.base_path.join(relative)
        }
    }
}

impl<S: MapSource> DocumentLoader for MapFacade<S> {
    /// 按文件系统路径加载 `.map`，不查找区域文件。
    fn load(&self, path: &Path) -> Result<MapFile, MapError> {
        self.parse(&path.to_string_lossy(), true, true)
    }
}

impl<S: MapSource> DocumentSaver for MapFacade<S> {
    /// 写到给定路径；路径没有扩展名时使用 `.map`。
    fn save(&self, map: &MapFile, path: &Path) -> Result<(), MapError> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.formats.map_extension.clone());
        self.write(map, &path.to_string_lossy(), &extension, false)
            .map(|_| ())
    }
}

/// 替换扩展名，允许传入带前导点的 `.map`。
fn with_extension(name: &str, extension: &str) -> PathBuf {
    Path::new(name).with_extension(extension.trim_start_matches('.'))
}

/// 去掉扩展名后的逻辑名称。
fn logical_name(name: &str) -> String {
    Path::new(name)
        .with_extension("")
        .to_string_lossy()
        .into_owned()
}
