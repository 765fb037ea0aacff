mod cli;

use crate::cli::{CacheBackendArg, Command, LogFormatArg, StorageBackendArg, CLI};
use anyhow::{bail, Context};
use clap::Parser;
use ferrylink_cache::{MokaStore, RedisStore};
use ferrylink_core::{NewUser, ShortenParams, Shortener, UrlStore, UserStore};
use ferrylink_generator::RandomGenerator;
use ferrylink_shortener::{parse_key, MintPolicy, ShortenerService};
use ferrylink_storage::{CachedStore, InMemoryStore, PostgresStore, TimeoutStore};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    init_tracing(config.log_format);

    info!(
        storage_backend = %config.storage,
        cache_backend = %config.cache,
        key_length = config.key_length,
        max_attempts = config.max_attempts,
        "starting ferrylink"
    );

    let op_timeout = Duration::from_millis(config.op_timeout_ms);

    match config.storage {
        StorageBackendArg::InMemory => {
            run(&config, TimeoutStore::new(InMemoryStore::new(), op_timeout)).await
        }
        StorageBackendArg::Postgres => {
            let durable = connect_postgres(&config).await?;
            run(&config, TimeoutStore::new(durable, op_timeout)).await
        }
        StorageBackendArg::Cached => {
            let durable = connect_postgres(&config).await?;
            let cache_ttl = Duration::from_secs(config.cache_ttl_secs);

            match config.cache {
                CacheBackendArg::Redis => {
                    let redis_url = config
                        .redis_url
                        .as_deref()
                        .context("redis url is required when cache backend is redis")?;
                    let cache = match RedisStore::connect(redis_url, cache_ttl).await {
                        Ok(cache) => cache,
                        Err(e) => {
                            close_quietly(&durable).await;
                            return Err(e.into());
                        }
                    };
                    let store = CachedStore::new(cache, durable);
                    run(&config, TimeoutStore::new(store, op_timeout)).await
                }
                CacheBackendArg::Moka => {
                    let store = CachedStore::new(MokaStore::new(cache_ttl), durable);
                    run(&config, TimeoutStore::new(store, op_timeout)).await
                }
            }
        }
    }
}

fn init_tracing(format: LogFormatArg) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormatArg::Text => builder.init(),
        LogFormatArg::Json => builder.json().init(),
    }
}

async fn connect_postgres(config: &CLI) -> anyhow::Result<PostgresStore> {
    let dsn = config
        .postgres_dsn
        .as_deref()
        .context("postgres dsn is required when storage backend is postgres or cached")?;
    let store = PostgresStore::connect(dsn, cli::DEFAULT_POSTGRES_MAX_CONNECTIONS).await?;

    if config.migrate {
        if let Err(e) = store.migrate().await {
            close_quietly(&store).await;
            return Err(e.into());
        }
    }

    Ok(store)
}

async fn close_quietly<S: UrlStore>(store: &S) {
    if let Err(e) = store.shutdown().await {
        warn!(error = %e, "Failed to shut down store");
    }
}

/// Runs the command, then shuts the store down on every path.
///
/// A command error wins over a shutdown error.
async fn run<S: UrlStore + UserStore>(config: &CLI, store: S) -> anyhow::Result<()> {
    let policy = MintPolicy::builder()
        .key_length(config.key_length)
        .max_attempts(config.max_attempts)
        .build();
    let service = ShortenerService::with_policy(store, RandomGenerator::new(), policy);

    let outcome = execute(&service, &config.command).await;
    let closed = service.store().shutdown().await;

    match (outcome, closed) {
        (Err(e), Err(close_err)) => {
            warn!(error = %close_err, "Failed to shut down store after command error");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), closed) => Ok(closed?),
    }
}

async fn execute<S: UrlStore + UserStore>(
    service: &ShortenerService<S, RandomGenerator>,
    command: &Command,
) -> anyhow::Result<()> {
    match command {
        Command::Shorten {
            url,
            owner,
            base_url,
        } => {
            let params = ShortenParams {
                original_url: url.clone(),
                owner_id: owner.clone(),
            };
            let key = service.shorten(params).await?;
            match base_url {
                Some(base) => println!("{}", key.to_url(base)),
                None => println!("{key}"),
            }
        }
        Command::Resolve { key } => {
            let key = parse_key(key)?;
            let Some(record) = service.resolve(&key).await? else {
                bail!("no mapping for key {key}");
            };
            println!(
                "{}\t{}",
                record.original_url,
                record.owner_id.as_deref().unwrap_or("-")
            );
        }
        Command::Lookup { url } => {
            let Some(record) = service.lookup(url).await? else {
                bail!("no key for url {url}");
            };
            println!(
                "{}\t{}",
                record.key,
                record.owner_id.as_deref().unwrap_or("-")
            );
        }
        Command::Update { key, url } => {
            let key = parse_key(key)?;
            if !service.update(&key, url).await? {
                bail!("key {key} does not exist or {url} is already mapped to another key");
            }
            println!("{key}\t{url}");
        }
        Command::Delete { key } => {
            let key = parse_key(key)?;
            if !service.delete(&key).await? {
                bail!("no mapping for key {key}");
            }
            println!("deleted {key}");
        }
        Command::List { owner } => {
            for mapping in service.list_by_owner(owner).await? {
                println!(
                    "{}\t{}\t{}",
                    mapping.key, mapping.original_url, mapping.created_at
                );
            }
        }
        Command::AddUser {
            id,
            email,
            name,
            picture,
        } => {
            let user = service
                .get_or_create_user(NewUser {
                    id: id.clone(),
                    email: email.clone(),
                    name: name.clone(),
                    picture: picture.clone(),
                })
                .await?;
            println!("{}\t{}\t{}", user.id, user.email, user.created_at);
        }
    }

    Ok(())
}
