use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Postgres {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub listen: String,
}

#[derive(Debug, Deserialize)]
pub struct Services {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
    pub backend: StorageBackend,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub postgres: Postgres,
    pub server: Server,
    pub services: Services,
    pub storage: Storage,
}

fn default_max_connections() -> u32 {
    5
}

fn default_channel_capacity() -> usize {
    512
}

impl Settings {
    /// Reads `path` and overlays `LEDGER__<SECTION>__<KEY>` environment variables.
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("services.channel_capacity", 512)?
            .set_default("storage.backend", "postgres")?
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("LEDGER").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
