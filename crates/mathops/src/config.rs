use anyhow::anyhow;
use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::{self, File},
    io::{Read, Write},
    path::PathBuf,
};
use time::{format_description::well_known::Iso8601, OffsetDateTime};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to Settings.toml file holding configuration options
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level to run with the service (default: info, or LOG_LEVEL env)
    #[arg(short, long)]
    pub level: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Settings {
    pub config: Option<String>,
    pub level: Option<String>,
    pub db_settings: DBSettings,
    pub api_settings: APISettings,
    pub worker_settings: WorkerSettings,
}

impl ConfigurableSettings for Settings {
    fn apply_cli_overrides(&mut self, cli_settings: &CliSettings) {
        if let Some(level) = &cli_settings.level {
            self.level = Some(level.clone());
        }
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("./config/local.toml")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DBSettings {
    pub data_folder: String,
    pub read_max_connections: u32,
    pub read_min_connections: u32,
    pub write_max_connections: u32,
    pub write_min_connections: u32,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub sqlite_config: SqliteConfigSerde,
}

impl Default for DBSettings {
    fn default() -> Self {
        DBSettings {
            data_folder: String::from("./data"),
            read_max_connections: 8,
            read_min_connections: 2,
            write_max_connections: 3,
            write_min_connections: 1,
            idle_timeout_secs: 600,   // 10 minutes
            acquire_timeout_secs: 15, // 15 seconds
            sqlite_config: SqliteConfigSerde::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SqliteConfigSerde {
    pub mode: String,
    pub busy_timeout_ms: u32,
    pub journal_mode: String,
    pub synchronous: String,
    pub cache_size: i32,
    pub foreign_keys: bool,
}

impl Default for SqliteConfigSerde {
    fn default() -> Self {
        Self {
            mode: "ReadWriteCreate".to_string(),
            busy_timeout_ms: 5000,
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
            cache_size: 1000000,
            foreign_keys: true,
        }
    }
}

impl SqliteConfigSerde {
    /// Preset for tests: shared-cache in-memory database with journal and
    /// sync overhead turned off.
    pub fn testing() -> Self {
        Self {
            mode: "Memory".to_string(),
            busy_timeout_ms: 1000,
            journal_mode: "MEMORY".to_string(),
            synchronous: "OFF".to_string(),
            cache_size: 10000,
            foreign_keys: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct APISettings {
    pub domain: String,
    pub port: String,
    pub origins: Vec<String>,
}

impl Default for APISettings {
    fn default() -> Self {
        APISettings {
            domain: String::from("0.0.0.0"),
            port: String::from("8000"),
            origins: vec![String::from("http://localhost:8000")],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Interval in seconds between polls for pending operations
    pub poll_interval_secs: u64,
    /// Maximum pending operations drained per poll
    pub batch_size: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        WorkerSettings {
            poll_interval_secs: 5,
            batch_size: 50,
        }
    }
}

pub fn get_settings() -> Result<Settings, anyhow::Error> {
    get_settings_with_cli(Cli::parse().into())
}

pub struct CliSettings {
    pub config: Option<String>,
    pub level: Option<String>,
}

impl From<Cli> for CliSettings {
    fn from(cli: Cli) -> Self {
        Self {
            config: cli.config,
            level: cli.level,
        }
    }
}

pub trait ConfigurableSettings: Serialize + for<'de> Deserialize<'de> + Default {
    /// Apply CLI settings after loading from file
    fn apply_cli_overrides(&mut self, cli_settings: &CliSettings);

    /// Get the default config file path
    fn default_config_path() -> PathBuf {
        PathBuf::from("./config/settings.toml")
    }

    /// Get the config directory path
    fn config_directory() -> PathBuf {
        PathBuf::from("./config")
    }
}

pub fn get_settings_with_cli<T: ConfigurableSettings>(
    cli_settings: CliSettings,
) -> Result<T, anyhow::Error> {
    let mut settings = if let Some(config_path) = cli_settings.config.clone() {
        let path = PathBuf::from(config_path);

        let absolute_path = if path.is_absolute() {
            path
        } else {
            env::current_dir()?.join(path)
        };

        match File::open(absolute_path) {
            Ok(mut file) => {
                let mut content = String::new();
                file.read_to_string(&mut content)
                    .map_err(|e| anyhow!("Failed to read config: {}", e))?;
                toml::from_str(&content)
                    .map_err(|e| anyhow!("Failed to map config to settings: {}", e))?
            }
            Err(err) => return Err(anyhow!("Failed to find file: {}", err)),
        }
    } else {
        let default_path = T::default_config_path();
        match File::open(&default_path) {
            Ok(mut file) => {
                let mut content = String::new();
                file.read_to_string(&mut content)
                    .map_err(|e| anyhow!("Failed to read default config: {}", e))?;
                toml::from_str(&content)
                    .map_err(|e| anyhow!("Failed to parse default config: {}", e))?
            }
            Err(_) => {
                let default_settings = T::default();

                fs::create_dir_all(T::config_directory())
                    .map_err(|e| anyhow!("Failed to create config directory: {}", e))?;

                let toml_content = toml::to_string(&default_settings)
                    .map_err(|e| anyhow!("Failed to serialize default settings: {}", e))?;

                let mut file = fs::File::create(&default_path)
                    .map_err(|e| anyhow!("Failed to create config file: {}", e))?;
                file.write_all(toml_content.as_bytes())
                    .map_err(|e| anyhow!("Failed to write default config: {}", e))?;

                default_settings
            }
        }
    };

    settings.apply_cli_overrides(&cli_settings);

    Ok(settings)
}

/// Maps a severity token to a level. Case-insensitive; `warning` and
/// `critical` map to their closest levels; anything unrecognized (including
/// empty input) falls back to info.
pub fn parse_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" | "warning" => LevelFilter::Warn,
        "error" | "critical" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// Resolves the process log level once at startup: explicit value (CLI or
/// settings file) wins, then the LOG_LEVEL environment variable, then info.
pub fn get_log_level(level: Option<String>) -> LevelFilter {
    match level {
        Some(level) => parse_log_level(&level),
        None => {
            let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| String::from(""));
            parse_log_level(&log_level)
        }
    }
}

/// Per-request access logging is suppressed once the level reaches error.
pub fn access_log_enabled(level: LevelFilter) -> bool {
    level > LevelFilter::Error
}

/// Builds the single process-wide dispatch. The `http_error` and
/// `http_access` sinks default independently, so both are pinned to the
/// resolved level here and nowhere else.
pub fn setup_logger(
    level: LevelFilter,
    filter_targets: Vec<String>,
) -> Result<(), fern::InitError> {
    let colors = ColoredLevelConfig::new()
        .trace(Color::White)
        .debug(Color::Cyan)
        .info(Color::Blue)
        .warn(Color::Yellow)
        .error(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {}] {}: {}",
                OffsetDateTime::now_utc().format(&Iso8601::DEFAULT).unwrap(),
                colors.color(record.level()),
                record.target(),
                message
            ));
        })
        .level(level)
        .level_for("http_error", level)
        .level_for("http_access", level)
        .filter(move |metadata| {
            !filter_targets
                .iter()
                .any(|filter| metadata.target().starts_with(filter))
        })
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level_recognized_tokens() {
        assert_eq!(parse_log_level("trace"), LevelFilter::Trace);
        assert_eq!(parse_log_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_log_level("info"), LevelFilter::Info);
        assert_eq!(parse_log_level("warn"), LevelFilter::Warn);
        assert_eq!(parse_log_level("warning"), LevelFilter::Warn);
        assert_eq!(parse_log_level("error"), LevelFilter::Error);
        assert_eq!(parse_log_level("critical"), LevelFilter::Error);
    }

    #[test]
    fn test_parse_log_level_is_case_insensitive() {
        assert_eq!(parse_log_level("DEBUG"), LevelFilter::Debug);
        assert_eq!(parse_log_level("Warning"), LevelFilter::Warn);
        assert_eq!(parse_log_level("ERROR"), LevelFilter::Error);
        assert_eq!(parse_log_level("CrItIcAl"), LevelFilter::Error);
    }

    #[test]
    fn test_parse_log_level_falls_back_to_info() {
        assert_eq!(parse_log_level(""), LevelFilter::Info);
        assert_eq!(parse_log_level("bogus"), LevelFilter::Info);
        assert_eq!(parse_log_level("verbose"), LevelFilter::Info);
    }

    #[test]
    fn test_get_log_level_prefers_explicit_value() {
        assert_eq!(
            get_log_level(Some("error".to_string())),
            LevelFilter::Error
        );
        assert_eq!(get_log_level(Some("bogus".to_string())), LevelFilter::Info);
    }

    #[test]
    fn test_get_log_level_reads_environment() {
        // Only this test touches LOG_LEVEL, so no races with parallel tests
        env::remove_var("LOG_LEVEL");
        assert_eq!(get_log_level(None), LevelFilter::Info);

        env::set_var("LOG_LEVEL", "ERROR");
        assert_eq!(get_log_level(None), LevelFilter::Error);

        env::set_var("LOG_LEVEL", "bogus");
        assert_eq!(get_log_level(None), LevelFilter::Info);

        env::remove_var("LOG_LEVEL");
    }

    #[test]
    fn test_access_log_enabled_matrix() {
        assert!(access_log_enabled(LevelFilter::Trace));
        assert!(access_log_enabled(LevelFilter::Debug));
        assert!(access_log_enabled(LevelFilter::Info));
        assert!(access_log_enabled(LevelFilter::Warn));
        assert!(!access_log_enabled(LevelFilter::Error));
        assert!(!access_log_enabled(LevelFilter::Off));
    }
}
