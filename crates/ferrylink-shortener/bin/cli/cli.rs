use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::{Display, Formatter};

pub const STORAGE_BACKEND_ENV: &str = "FERRYLINK_STORAGE_BACKEND";
pub const POSTGRES_DSN_ENV: &str = "FERRYLINK_POSTGRES_DSN";
pub const CACHE_BACKEND_ENV: &str = "FERRYLINK_CACHE_BACKEND";
pub const REDIS_URL_ENV: &str = "FERRYLINK_REDIS_URL";
pub const CACHE_TTL_SECS_ENV: &str = "FERRYLINK_CACHE_TTL_SECS";
pub const KEY_LENGTH_ENV: &str = "FERRYLINK_KEY_LENGTH";
pub const MAX_ATTEMPTS_ENV: &str = "FERRYLINK_MAX_ATTEMPTS";
pub const OP_TIMEOUT_MS_ENV: &str = "FERRYLINK_OP_TIMEOUT_MS";
pub const MIGRATE_ENV: &str = "FERRYLINK_MIGRATE";
pub const LOG_FORMAT_ENV: &str = "FERRYLINK_LOG_FORMAT";
pub const BASE_URL_ENV: &str = "FERRYLINK_BASE_URL";

pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
pub const DEFAULT_KEY_LENGTH: usize = 6;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 16;
pub const DEFAULT_OP_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_POSTGRES_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "postgres")]
    Postgres,
    /// Postgres fronted by a cache tier.
    #[value(name = "cached")]
    Cached,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::Postgres => write!(f, "postgres"),
            StorageBackendArg::Cached => write!(f, "cached"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheBackendArg {
    #[value(name = "redis")]
    Redis,
    #[value(name = "moka")]
    Moka,
}

impl Display for CacheBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackendArg::Redis => write!(f, "redis"),
            CacheBackendArg::Moka => write!(f, "moka"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    #[value(name = "text")]
    Text,
    #[value(name = "json")]
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "ferrylink", version, about = "Manage ferrylink short links")]
pub struct CLI {
    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    #[arg(
        long,
        env = POSTGRES_DSN_ENV,
        required_if_eq_any([("storage", "postgres"), ("storage", "cached")])
    )]
    pub postgres_dsn: Option<String>,

    #[arg(
        long,
        env = CACHE_BACKEND_ENV,
        value_enum,
        default_value_t = CacheBackendArg::Moka
    )]
    pub cache: CacheBackendArg,

    #[arg(long, env = REDIS_URL_ENV, required_if_eq("cache", "redis"))]
    pub redis_url: Option<String>,

    #[arg(long, env = CACHE_TTL_SECS_ENV, default_value_t = DEFAULT_CACHE_TTL_SECS)]
    pub cache_ttl_secs: u64,

    #[arg(long, env = KEY_LENGTH_ENV, default_value_t = DEFAULT_KEY_LENGTH)]
    pub key_length: usize,

    #[arg(long, env = MAX_ATTEMPTS_ENV, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    #[arg(long, env = OP_TIMEOUT_MS_ENV, default_value_t = DEFAULT_OP_TIMEOUT_MS)]
    pub op_timeout_ms: u64,

    /// Create the Postgres schema before running the command.
    #[arg(long, env = MIGRATE_ENV)]
    pub migrate: bool,

    #[arg(
        long,
        env = LOG_FORMAT_ENV,
        value_enum,
        default_value_t = LogFormatArg::Text
    )]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten a URL, reusing its key if it is already mapped.
    Shorten {
        url: String,
        #[arg(long)]
        owner: Option<String>,
        /// Print the full short link under this base URL.
        #[arg(long, env = BASE_URL_ENV)]
        base_url: Option<String>,
    },
    /// Print the URL a key points to.
    Resolve { key: String },
    /// Print the key a URL is mapped to.
    Lookup { url: String },
    /// Point an existing key at a new URL.
    Update { key: String, url: String },
    Delete { key: String },
    /// List the mappings created by an owner, newest first.
    List {
        #[arg(long)]
        owner: String,
    },
    /// Register a user, or print the stored one if the id is known.
    AddUser {
        #[arg(long)]
        id: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        picture: Option<String>,
    },
}
