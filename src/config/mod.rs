//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    fmt,
    net::SocketAddr,
    num::NonZeroUsize,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

mod cli;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const ENV_PREFIX: &str = "FOLIO";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_CACHE_DATABASE_PATH: &str = "cache.db";
const DEFAULT_LRU_MAX_ENTRIES: u64 = 5000;
const DEFAULT_PROJECTS_SOURCE: &str = "content/data/projects.yml";
const DEFAULT_DECOY_REDIRECT_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub content: ContentSettings,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub database_path: PathBuf,
    pub lru_max_entries: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub environment: ContentEnvironment,
    pub projects_source: ProjectsSource,
}

/// Production caches content; development always reloads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentEnvironment {
    #[default]
    Production,
    Development,
}

impl ContentEnvironment {
    pub fn is_development(self) -> bool {
        matches!(self, ContentEnvironment::Development)
    }
}

impl FromStr for ContentEnvironment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(ContentEnvironment::Production),
            "development" | "dev" => Ok(ContentEnvironment::Development),
            other => Err(format!(
                "expected `production` or `development`, got `{other}`"
            )),
        }
    }
}

/// Where the project list YAML lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectsSource {
    File(PathBuf),
    Remote(Url),
}

impl FromStr for ProjectsSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("source must not be empty".to_string());
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Url::parse(trimmed)
                .map(ProjectsSource::Remote)
                .map_err(|err| format!("invalid url `{trimmed}`: {err}"));
        }
        Ok(ProjectsSource::File(PathBuf::from(trimmed)))
    }
}

impl fmt::Display for ProjectsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectsSource::File(path) => write!(f, "{}", path.display()),
            ProjectsSource::Remote(url) => write!(f, "{url}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub admin_token: Option<Secret>,
    pub internal_command_token: Option<Secret>,
    pub decoy_redirect_url: Url,
}

/// A credential that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    content: RawContentSettings,
    auth: RawAuthSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(path) = overrides.cache_database_path.as_ref() {
            self.cache.database_path = Some(path.clone());
        }
        if let Some(max) = overrides.cache_lru_max_entries {
            self.cache.lru_max_entries = Some(max);
        }
        if let Some(environment) = overrides.content_environment.as_ref() {
            self.content.environment = Some(environment.clone());
        }
        if let Some(source) = overrides.content_projects_source.as_ref() {
            self.content.projects_source = Some(source.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            content,
            auth,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            content: build_content_settings(content)?,
            auth: build_auth_settings(auth)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let database_path = cache
        .database_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DATABASE_PATH));
    if database_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.database_path",
            "path must not be empty",
        ));
    }

    let max_entries = cache.lru_max_entries.unwrap_or(DEFAULT_LRU_MAX_ENTRIES);
    let lru_max_entries = non_zero_usize(max_entries, "cache.lru_max_entries")?;

    Ok(CacheSettings {
        database_path,
        lru_max_entries,
    })
}

fn build_content_settings(content: RawContentSettings) -> Result<ContentSettings, LoadError> {
    let environment = match content.environment {
        Some(value) => ContentEnvironment::from_str(&value)
            .map_err(|reason| LoadError::invalid("content.environment", reason))?,
        None => ContentEnvironment::default(),
    };

    let source = content
        .projects_source
        .unwrap_or_else(|| DEFAULT_PROJECTS_SOURCE.to_string());
    let projects_source = ProjectsSource::from_str(&source)
        .map_err(|reason| LoadError::invalid("content.projects_source", reason))?;

    Ok(ContentSettings {
        environment,
        projects_source,
    })
}

fn build_auth_settings(auth: RawAuthSettings) -> Result<AuthSettings, LoadError> {
    let decoy = auth
        .decoy_redirect_url
        .unwrap_or_else(|| DEFAULT_DECOY_REDIRECT_URL.to_string());
    let decoy_redirect_url = Url::parse(decoy.trim()).map_err(|err| {
        LoadError::invalid("auth.decoy_redirect_url", format!("invalid url: {err}"))
    })?;

    Ok(AuthSettings {
        admin_token: non_empty_secret(auth.admin_token),
        internal_command_token: non_empty_secret(auth.internal_command_token),
        decoy_redirect_url,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    database_path: Option<PathBuf>,
    lru_max_entries: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawContentSettings {
    environment: Option<String>,
    projects_source: Option<String>,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    admin_token: Option<String>,
    internal_command_token: Option<String>,
    decoy_redirect_url: Option<String>,
}

impl fmt::Debug for RawAuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawAuthSettings")
            .field("admin_token", &self.admin_token.as_ref().map(|_| "***"))
            .field(
                "internal_command_token",
                &self.internal_command_token.as_ref().map(|_| "***"),
            )
            .field("decoy_redirect_url", &self.decoy_redirect_url)
            .finish()
    }
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_empty_secret(value: Option<String>) -> Option<Secret> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| Secret::new(trimmed))
    })
}
