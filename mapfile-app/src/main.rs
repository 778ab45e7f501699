use std::path::PathBuf;

use mapfile_config::{ConfigError, MapConfig};
use mapfile_core::{document::MapFile, primitive::PrimitiveKind};
use mapfile_io::{MapError, MapFacade};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// 命令行子命令。
enum Command {
    Info { map: String },
    Rewrite { map: String, out: String, extension: Option<String> },
}

/// 读取阶段的选项。
#[derive(Clone, Copy)]
struct ReadOptions {
    ignore_region: bool,
    from_base_path: bool,
}

fn usage() -> ! {
    eprintln!(
        "用法: mapfile [--config <文件>] [--ignore-region] [--base] info <地图>\n       \
         mapfile [--config <文件>] [--ignore-region] [--base] rewrite <地图> <输出> [扩展名]"
    );
    std::process::exit(1);
}

fn main() {
    let mut args = std::env::args().skip(1);
    let mut config_override: Option<PathBuf> = None;
    let mut options = ReadOptions {
        ignore_region: false,
        from_base_path: false,
    };
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(path) = args.next() else {
                    eprintln!("`--config` 需要提供配置文件路径");
                    std::process::exit(1);
                };
                config_override = Some(PathBuf::from(path));
            }
            "--ignore-region" => options.ignore_region = true,
            "--base" => options.from_base_path = true,
            other if other.starts_with("--") => {
                eprintln!("未知参数：{other}");
                std::process::exit(1);
            }
            _ => positional.push(arg),
        }
    }

    let command = parse_command(positional);
    let config = load_configuration(config_override);
    init_logging(&config);

    let facade = MapFacade::from_config(&config);
    if let Err(err) = run(&facade, command, options, &config.formats.map_extension) {
        error!(error = %err, "执行命令失败");
        std::process::exit(if err.is_io() { 2 } else { 1 });
    }
}

fn parse_command(positional: Vec<String>) -> Command {
    let mut iter = positional.into_iter();
    match iter.next().as_deref() {
        Some("info") => {
            let Some(map) = iter.next() else { usage() };
            Command::Info { map }
        }
        Some("rewrite") => {
            let (Some(map), Some(out)) = (iter.next(), iter.next()) else {
                usage()
            };
            Command::Rewrite {
                map,
                out,
                extension: iter.next(),
            }
        }
        _ => usage(),
    }
}

fn run(
    facade: &MapFacade,
    command: Command,
    options: ReadOptions,
    default_extension: &str,
) -> Result<(), MapError> {
    let os_path = !options.from_base_path;
    match command {
        Command::Info { map } => {
            let document = facade.parse(&map, options.ignore_region, os_path)?;
            print_summary(&document);
        }
        Command::Rewrite {
            map,
            out,
            extension,
        } => {
            let document = facade.parse(&map, options.ignore_region, os_path)?;
            let extension = extension.as_deref().unwrap_or(default_extension);
            let written = facade.write(&document, &out, extension, options.from_base_path)?;
            info!(source = %map, target = %written.display(), "已按当前格式重写地图");
            println!("{}", written.display());
        }
    }
    Ok(())
}

fn print_summary(map: &MapFile) {
    let (mut brushes, mut patches) = (0usize, 0usize);
    for primitive in map.entities().flat_map(|entity| entity.primitives()) {
        match primitive.kind() {
            PrimitiveKind::Brush => brushes += 1,
            PrimitiveKind::Patch => patches += 1,
        }
    }
    println!("名称: {}", map.name());
    if let Some(path) = map.source_path() {
        println!("来源: {}", path.display());
    }
    println!("版本: {}", map.version().number());
    println!("实体: {}", map.num_entities());
    println!("图元: {} 个笔刷, {} 个曲面", brushes, patches);
    println!("几何指纹: 0x{:08x}", map.geometry_crc());
}

fn load_configuration(override_path: Option<PathBuf>) -> MapConfig {
    match override_path {
        Some(path) => MapConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            MapConfig::default()
        }),
        None => match MapConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                MapConfig::default()
            }
        },
    }
}

fn init_logging(config: &MapConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
