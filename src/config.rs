use once_cell::sync::OnceCell;

use crate::error::IndexerError;

static GLOBAL_CONFIG: OnceCell<Config> = OnceCell::new();

/// Process-wide configuration, read once from the environment at startup.
///
/// Missing required variables or unparseable integers are fatal (§7 item 7
/// of the error-handling design): there is no sensible runtime fallback for
/// "which node do I talk to".
#[derive(Debug, Clone)]
pub struct Config {
    pub bitcoin_node_uri: String,
    pub bitcoin_node_user: String,
    pub bitcoin_node_password: String,
    pub spaces_node_uri: String,
    pub postgres_uri: String,
    pub activation_height: i32,
    pub fast_sync_height: i32,
    pub update_db_interval: u64,
    pub mempool_chunk_size: usize,
    pub sync_end_height: i32,
}

impl Config {
    pub fn from_env() -> Result<Self, IndexerError> {
        let bitcoin_node_uri = require_env("BITCOIN_NODE_URI")?;
        let bitcoin_node_user = require_env("BITCOIN_NODE_USER")?;
        let bitcoin_node_password = require_env("BITCOIN_NODE_PASSWORD")?;
        let spaces_node_uri = require_env("SPACES_NODE_URI")?;
        let postgres_uri = require_env("POSTGRES_URI")?;

        let activation_height = parse_env_or("ACTIVATION_BLOCK_HEIGHT", -1)?;
        // Stored internally as value - 1: a block at exactly the configured
        // boundary still runs the full-sync write path, not spender-only.
        let fast_sync_height = parse_env_or("FAST_SYNC_BLOCK_HEIGHT", -1)? - 1;
        let update_db_interval = parse_env_or("UPDATE_DB_INTERVAL", 10u64)?;
        let mempool_chunk_size = parse_env_or("MEMPOOL_CHUNK_SIZE", 200usize)?;
        let sync_end_height = parse_env_or("SYNC_END_HEIGHT", -1)?;

        Ok(Self {
            bitcoin_node_uri,
            bitcoin_node_user,
            bitcoin_node_password,
            spaces_node_uri,
            postgres_uri,
            activation_height,
            fast_sync_height,
            update_db_interval,
            mempool_chunk_size,
            sync_end_height,
        })
    }
}

fn require_env(name: &str) -> Result<String, IndexerError> {
    std::env::var(name).map_err(|_| IndexerError::Config {
        reason: format!("missing required environment variable {name}"),
    })
}

fn parse_env_or<T>(name: &str, default: T) -> Result<T, IndexerError>
where
    T: std::str::FromStr,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| IndexerError::Config {
            reason: format!("{name} is not a valid value: {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}

pub fn init_global_config() -> Result<(), IndexerError> {
    let config = Config::from_env()?;
    GLOBAL_CONFIG
        .set(config)
        .map_err(|_| IndexerError::Config { reason: "config already set".into() })
}

pub fn get_global_config() -> &'static Config {
    GLOBAL_CONFIG.get().unwrap_or_else(|| {
        eprintln!("FATAL: config not initialized - call init_global_config() first");
        std::process::exit(1);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_or_falls_back_to_default() {
        std::env::remove_var("MEMPOOL_CHUNK_SIZE_TEST_ONLY");
        let v: usize = parse_env_or("MEMPOOL_CHUNK_SIZE_TEST_ONLY", 200usize).unwrap();
        assert_eq!(v, 200);
    }

    #[test]
    fn parse_env_or_rejects_unparseable_values() {
        std::env::set_var("ACTIVATION_BLOCK_HEIGHT_TEST_ONLY", "not-a-number");
        let err = parse_env_or::<i32>("ACTIVATION_BLOCK_HEIGHT_TEST_ONLY", -1).unwrap_err();
        assert!(matches!(err, IndexerError::Config { .. }));
        std::env::remove_var("ACTIVATION_BLOCK_HEIGHT_TEST_ONLY");
    }
}
