use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use hub_registry::CatalogConfig;
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 8090;
pub const DEFAULT_HOSTNAME: &str = "0.0.0.0";
pub const DEFAULT_TEMPLATES_DIR: &str = "./templates";
pub const DEFAULT_APPS_DIR: &str = "./apps";
pub const DEFAULT_CACHE_TTL_MINUTES: u64 = 60;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

/// Optional `hub.toml` settings. Every key can also be given on the command
/// line or through the environment, which take precedence.
#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HubConfig {
    pub port: Option<u16>,
    pub hostname: Option<String>,
    pub templates_dir: Option<PathBuf>,
    pub apps_dir: Option<PathBuf>,
    pub cache_ttl_minutes: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
    pub watch: Option<bool>,
}

impl HubConfig {
    /// Load configuration from a TOML file, falling back to defaults if the file
    /// doesn't exist or cannot be parsed.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

/// Directory arguments shared by every subcommand that reads the catalog.
#[derive(Args, Debug, Clone, Default)]
pub struct RootArgs {
    /// Templates directory
    #[arg(short = 't', long = "templates", env = "HUB_TEMPLATES_DIR")]
    pub templates: Option<PathBuf>,

    /// Apps directory
    #[arg(short = 'a', long = "apps", env = "HUB_APPS_DIR")]
    pub apps: Option<PathBuf>,

    /// Path to config file
    #[arg(short = 'c', long = "config", default_value = "hub.toml")]
    pub config: PathBuf,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    #[command(flatten)]
    pub roots: RootArgs,

    /// Port to listen on
    #[arg(short = 'p', long = "port", env = "HUB_PORT")]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long = "hostname", env = "HUB_HOSTNAME")]
    pub hostname: Option<String>,

    /// Cache TTL in minutes
    #[arg(long = "cache-ttl", env = "HUB_CACHE_TTL")]
    pub cache_ttl: Option<u64>,

    /// Rescan a directory as soon as files in it change
    #[arg(short = 'w', long = "watch")]
    pub watch: bool,

    /// Seconds to let in-flight requests finish after a shutdown signal
    #[arg(long = "shutdown-grace")]
    pub shutdown_grace: Option<u64>,
}

/// Fully resolved server settings.
#[derive(Debug, Clone)]
pub struct ServeSettings {
    pub hostname: String,
    pub port: u16,
    pub catalog: CatalogConfig,
    pub watch: bool,
    pub shutdown_grace: Duration,
}

impl ServeSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }
}

/// CLI args (including their env vars) override config file values, which
/// override defaults.
pub fn resolve_catalog(roots: &RootArgs, config: &HubConfig) -> CatalogConfig {
    CatalogConfig {
        templates_dir: roots
            .templates
            .clone()
            .or_else(|| config.templates_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATES_DIR)),
        apps_dir: roots
            .apps
            .clone()
            .or_else(|| config.apps_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_APPS_DIR)),
        cache_ttl: Duration::from_secs(60 * DEFAULT_CACHE_TTL_MINUTES),
    }
}

pub fn resolve_serve(args: &ServeArgs, config: &HubConfig) -> ServeSettings {
    let ttl_minutes = args
        .cache_ttl
        .or(config.cache_ttl_minutes)
        .unwrap_or(DEFAULT_CACHE_TTL_MINUTES);
    let mut catalog = resolve_catalog(&args.roots, config);
    catalog.cache_ttl = Duration::from_secs(ttl_minutes.saturating_mul(60));

    ServeSettings {
        hostname: args
            .hostname
            .clone()
            .or_else(|| config.hostname.clone())
            .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string()),
        port: args.port.or(config.port).unwrap_or(DEFAULT_PORT),
        catalog,
        watch: args.watch || config.watch.unwrap_or(false),
        shutdown_grace: Duration::from_secs(
            args.shutdown_grace
                .or(config.shutdown_grace_secs)
                .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
        ),
    }
}
