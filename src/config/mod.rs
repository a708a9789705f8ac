mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{BrokerSettings, LogSettings, ServerSettings, Settings, StoreSettings};

/// Prefix for environment overrides, e.g. `STORECAST__SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "STORECAST";

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
/// Returns a `Settings` struct containing every section
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Same as [`load_config`] but reads the file source from `path`
/// (extension optional, the file itself optional).
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(merge(partial, Settings::default()))
}

fn merge(partial: PartialSettings, default: Settings) -> Settings {
    let server = partial.server.as_ref();
    let broker = partial.broker.as_ref();
    let stores = partial.stores.as_ref();
    let log = partial.log.as_ref();

    Settings {
        server: ServerSettings {
            host: server
                .and_then(|s| s.host.clone())
                .unwrap_or(default.server.host),
            port: server.and_then(|s| s.port).unwrap_or(default.server.port),
            keep_alive_secs: server
                .and_then(|s| s.keep_alive_secs)
                .unwrap_or(default.server.keep_alive_secs),
        },
        broker: BrokerSettings {
            max_connections: broker
                .and_then(|b| b.max_connections)
                .unwrap_or(default.broker.max_connections),
            channel_capacity: broker
                .and_then(|b| b.channel_capacity)
                .unwrap_or(default.broker.channel_capacity),
            lock_timeout_ms: broker
                .and_then(|b| b.lock_timeout_ms)
                .unwrap_or(default.broker.lock_timeout_ms),
            publish_interval_secs: broker
                .and_then(|b| b.publish_interval_secs)
                .unwrap_or(default.broker.publish_interval_secs),
            idle_grace_secs: broker
                .and_then(|b| b.idle_grace_secs)
                .unwrap_or(default.broker.idle_grace_secs),
        },
        stores: StoreSettings {
            count: stores.and_then(|s| s.count).unwrap_or(default.stores.count),
            tables_per_store: stores
                .and_then(|s| s.tables_per_store)
                .unwrap_or(default.stores.tables_per_store),
        },
        log: LogSettings {
            level: log
                .and_then(|l| l.level.clone())
                .unwrap_or(default.log.level),
        },
    }
}
